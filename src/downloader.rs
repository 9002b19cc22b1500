use crate::table::Table;
use rust_xlsxwriter::{Workbook, Worksheet, XlsxError};
use thiserror::Error;

/// Worksheet limits of the XLSX format.
pub const MAX_SHEET_ROWS: usize = 1_048_576;
pub const MAX_SHEET_COLUMNS: usize = 16_384;

#[derive(Error, Debug)]
pub enum DownloadError {
    #[error("Failed to write CSV: {0}")]
    Csv(#[from] csv::Error),

    #[error("Failed to write XLSX: {0}")]
    Xlsx(#[from] XlsxError),

    #[error("Unknown download format: {0}")]
    UnknownFormat(String),

    #[error("Table of {rows} rows by {columns} columns does not fit in a worksheet")]
    TooLarge { rows: usize, columns: usize },
}

/// File formats a table can be downloaded as.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DownloadFormat {
    Csv,
    Xlsx,
}

impl DownloadFormat {
    pub fn parse(name: &str) -> Result<Self, DownloadError> {
        match name.trim().to_ascii_lowercase().as_str() {
            "csv" => Ok(DownloadFormat::Csv),
            "xlsx" => Ok(DownloadFormat::Xlsx),
            other => Err(DownloadError::UnknownFormat(other.to_string())),
        }
    }

    pub fn content_type(&self) -> &'static str {
        match self {
            DownloadFormat::Csv => "text/csv; charset=utf-8",
            DownloadFormat::Xlsx => {
                "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet"
            }
        }
    }

    pub fn file_name(&self) -> &'static str {
        match self {
            DownloadFormat::Csv => "transactions.csv",
            DownloadFormat::Xlsx => "transactions.xlsx",
        }
    }

    pub fn render(&self, table: &Table) -> Result<Vec<u8>, DownloadError> {
        match self {
            DownloadFormat::Csv => to_csv(table).map(String::into_bytes),
            DownloadFormat::Xlsx => to_xlsx(table),
        }
    }
}

/// Header and data rows as CSV text. Quoting follows RFC 4180.
pub fn to_csv(table: &Table) -> Result<String, DownloadError> {
    let mut writer = csv::WriterBuilder::new()
        .flexible(true)
        .from_writer(Vec::new());
    for row in table.rows() {
        writer.write_record(row)?;
    }
    let bytes = writer
        .into_inner()
        .map_err(|e| DownloadError::Csv(e.into_error().into()))?;
    Ok(String::from_utf8_lossy(&bytes).into_owned())
}

/// One worksheet with every cell written as a string, header in bold.
pub fn to_xlsx(table: &Table) -> Result<Vec<u8>, DownloadError> {
    let rows = table.rows().len();
    let columns = table.rows().iter().map(Vec::len).max().unwrap_or_default();
    if rows > MAX_SHEET_ROWS || columns > MAX_SHEET_COLUMNS {
        return Err(DownloadError::TooLarge { rows, columns });
    }

    let mut workbook = Workbook::new();
    let mut worksheet = Worksheet::new();
    let bold = rust_xlsxwriter::Format::new().set_bold();

    for (r, row) in table.rows().iter().enumerate() {
        for (c, value) in row.iter().enumerate() {
            let (Ok(sheet_row), Ok(sheet_col)) = (u32::try_from(r), u16::try_from(c)) else {
                return Err(DownloadError::TooLarge { rows, columns });
            };
            if r == 0 {
                worksheet.write_string_with_format(sheet_row, sheet_col, value, &bold)?;
            } else {
                worksheet.write_string(sheet_row, sheet_col, value)?;
            }
        }
    }

    workbook.push_worksheet(worksheet);
    Ok(workbook.save_to_buffer()?)
}
