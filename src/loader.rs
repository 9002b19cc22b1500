use crate::range::RangeDescriptor;
use crate::table::{Row, Table};
use calamine::{Data, Reader, open_workbook_auto_from_rs};
use chrono::{NaiveDate, TimeDelta};
use std::io::Cursor;
use std::path::Path;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ExtractError {
    #[error("Unsupported file extension: {0}")]
    UnsupportedExtension(String),

    #[error("File has no extension")]
    NoExtension,

    #[error("Failed to open workbook: {0}")]
    Workbook(#[from] calamine::Error),

    #[error("Workbook contains no sheets")]
    NoSheets,

    #[error("Failed to read CSV: {0}")]
    Csv(#[from] csv::Error),

    #[error("Range covers {cells} cells, more than the limit of {limit}")]
    TooLarge { cells: usize, limit: usize },
}

/// Largest number of cells one upload may produce.
pub const DEFAULT_MAX_CELLS: usize = 1_000_000;

/// Container types the extractor knows how to decode.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TabularFormat {
    /// Any workbook calamine can sniff: xlsx, xlsm, xlsb, xls, ods.
    Workbook,
    Csv,
}

impl TabularFormat {
    pub fn from_file_name(file_name: &str) -> Result<Self, ExtractError> {
        let extension = Path::new(file_name)
            .extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| ext.to_lowercase());

        match extension.as_deref() {
            Some("xlsx") | Some("xlsm") | Some("xlsb") | Some("xls") | Some("ods") => {
                Ok(TabularFormat::Workbook)
            }
            Some("csv") => Ok(TabularFormat::Csv),
            Some(ext) => Err(ExtractError::UnsupportedExtension(ext.to_string())),
            None => Err(ExtractError::NoExtension),
        }
    }
}

/// Slice `range` out of the first sheet of an uploaded file.
///
/// Never fails: an unknown extension or undecodable bytes produce an empty
/// table, which the caller shows as "no data".
pub fn extract(bytes: &[u8], file_name: &str, range: &RangeDescriptor) -> Table {
    extract_with_limit(bytes, file_name, range, DEFAULT_MAX_CELLS)
}

/// [`extract`] with an explicit cap on the number of cells produced.
pub fn extract_with_limit(
    bytes: &[u8],
    file_name: &str,
    range: &RangeDescriptor,
    max_cells: usize,
) -> Table {
    match try_extract(bytes, file_name, range, max_cells) {
        Ok(table) => table,
        Err(e @ (ExtractError::UnsupportedExtension(_) | ExtractError::NoExtension)) => {
            log::info!("Skipping upload '{}': {}", file_name, e);
            Table::empty()
        }
        Err(e) => {
            log::warn!("Could not extract {} from '{}': {}", range.to_a1(), file_name, e);
            Table::empty()
        }
    }
}

/// Same as [`extract`] but reports why nothing could be read.
///
/// Every returned row is exactly `range.width()` cells wide. Rows past the
/// last used row of the sheet are dropped, but the header row is always
/// present, so an empty sheet yields a header of empty cells. A span that
/// would hold more than `max_cells` cells after clipping is refused.
pub fn try_extract(
    bytes: &[u8],
    file_name: &str,
    range: &RangeDescriptor,
    max_cells: usize,
) -> Result<Table, ExtractError> {
    match TabularFormat::from_file_name(file_name)? {
        TabularFormat::Workbook => from_workbook(bytes, range, max_cells),
        TabularFormat::Csv => from_csv(bytes, range, max_cells),
    }
}

fn from_workbook(
    bytes: &[u8],
    range: &RangeDescriptor,
    max_cells: usize,
) -> Result<Table, ExtractError> {
    let mut workbook = open_workbook_auto_from_rs(Cursor::new(bytes.to_vec()))?;
    let sheet = workbook.worksheet_range_at(0).ok_or(ExtractError::NoSheets)??;

    // `end` is absolute and 0-based
    let last_used_row = sheet.end().map_or(0, |(row, _)| row + 1);

    slice(range, last_used_row, max_cells, |row, col| {
        sheet.get_value((row - 1, col - 1)).map(cell_text)
    })
}

fn from_csv(
    bytes: &[u8],
    range: &RangeDescriptor,
    max_cells: usize,
) -> Result<Table, ExtractError> {
    let text = String::from_utf8_lossy(bytes);
    let text = text.strip_prefix('\u{feff}').unwrap_or(&text);

    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_reader(text.as_bytes());

    let mut lines: Vec<Vec<String>> = Vec::new();
    for record in reader.records() {
        let record = record?;
        lines.push(record.iter().map(str::to_string).collect());
    }

    let last_used_row = u32::try_from(lines.len()).unwrap_or(u32::MAX);
    slice(range, last_used_row, max_cells, |row, col| {
        lines
            .get((row - 1) as usize)
            .and_then(|line| line.get((col - 1) as usize))
            .cloned()
    })
}

/// Walk the rectangle with 1-based coordinates, padding missing cells.
fn slice<F>(
    range: &RangeDescriptor,
    last_used_row: u32,
    max_cells: usize,
    cell_at: F,
) -> Result<Table, ExtractError>
where
    F: Fn(u32, u32) -> Option<String>,
{
    let last_row = range.end_row.min(last_used_row).max(range.start_row);

    let height = (last_row - range.start_row + 1) as usize;
    let cells = height.saturating_mul(range.width());
    if cells > max_cells {
        return Err(ExtractError::TooLarge {
            cells,
            limit: max_cells,
        });
    }

    let rows: Vec<Row> = (range.start_row..=last_row)
        .map(|row| {
            (range.start_col..=range.end_col)
                .map(|col| cell_at(row, col).unwrap_or_default())
                .collect()
        })
        .collect();

    Ok(Table::new(rows))
}

fn cell_text(cell: &Data) -> String {
    match cell {
        Data::Empty => String::new(),
        Data::String(s) => s.clone(),
        Data::Float(n) => format_number(*n),
        Data::Int(n) => n.to_string(),
        Data::Bool(b) => if *b { "TRUE" } else { "FALSE" }.to_string(),
        Data::Error(e) => e.to_string(),
        Data::DateTime(dt) => {
            let serial = dt.as_f64();
            serial_to_text(serial).unwrap_or_else(|| format_number(serial))
        }
        Data::DateTimeIso(s) => s.clone(),
        Data::DurationIso(s) => s.clone(),
    }
}

/// Integers print without decimals, everything else in shortest form.
fn format_number(n: f64) -> String {
    if n.fract() == 0.0 && n.abs() < 1e15 {
        format!("{}", n as i64)
    } else {
        format!("{}", n)
    }
}

/// Render a workbook date serial (1900 date system) as ISO text.
fn serial_to_text(serial: f64) -> Option<String> {
    let epoch = NaiveDate::from_ymd_opt(1899, 12, 30)?.and_hms_opt(0, 0, 0)?;
    let mut days = serial.floor() as i64;
    let mut seconds = ((serial - serial.floor()) * 86_400.0).round() as i64;
    if seconds == 86_400 {
        days += 1;
        seconds = 0;
    }

    let moment = epoch
        .checked_add_signed(TimeDelta::try_days(days)?)?
        .checked_add_signed(TimeDelta::try_seconds(seconds)?)?;

    if seconds == 0 {
        Some(moment.format("%Y-%m-%d").to_string())
    } else {
        Some(moment.format("%Y-%m-%d %H:%M:%S").to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::table::table_of;
    use rust_xlsxwriter::Workbook;

    fn range(start_row: &str, end_row: &str, start_col: &str, end_col: &str) -> RangeDescriptor {
        RangeDescriptor::parse(start_row, end_row, start_col, end_col).unwrap()
    }

    fn workbook_bytes() -> Vec<u8> {
        let mut workbook = Workbook::new();
        let worksheet = workbook.add_worksheet();
        worksheet.write_string(0, 0, "Statement").unwrap();
        worksheet.write_string(1, 0, "Date").unwrap();
        worksheet.write_string(1, 1, "Merchant").unwrap();
        worksheet.write_string(1, 2, "Desc").unwrap();
        worksheet.write_string(1, 3, "Amount").unwrap();
        worksheet.write_string(2, 0, "1/1/2024").unwrap();
        worksheet.write_string(2, 1, "A").unwrap();
        worksheet.write_string(2, 2, "coffee").unwrap();
        worksheet.write_number(2, 3, 4.5).unwrap();
        worksheet.write_string(3, 0, "1/2/2024").unwrap();
        worksheet.write_string(3, 1, "B").unwrap();
        worksheet.write_number(3, 3, 12.0).unwrap();
        workbook.save_to_buffer().unwrap()
    }

    #[test]
    fn recognizes_extensions() {
        assert_eq!(TabularFormat::from_file_name("a.XLSX").unwrap(), TabularFormat::Workbook);
        assert_eq!(TabularFormat::from_file_name("a.xls").unwrap(), TabularFormat::Workbook);
        assert_eq!(TabularFormat::from_file_name("a.csv").unwrap(), TabularFormat::Csv);
        assert!(matches!(
            TabularFormat::from_file_name("a.pdf"),
            Err(ExtractError::UnsupportedExtension(_))
        ));
        assert!(matches!(
            TabularFormat::from_file_name("statement"),
            Err(ExtractError::NoExtension)
        ));
    }

    #[test]
    fn slices_workbook_range() {
        let table = extract(&workbook_bytes(), "statement.xlsx", &range("2", "10", "A", "D"));

        assert_eq!(
            table,
            table_of(&[
                &["Date", "Merchant", "Desc", "Amount"],
                &["1/1/2024", "A", "coffee", "4.5"],
                &["1/2/2024", "B", "", "12"],
            ])
        );
    }

    #[test]
    fn pads_columns_past_the_used_area() {
        let table = extract(&workbook_bytes(), "statement.xlsx", &range("2", "3", "C", "F"));
        assert_eq!(table.rows().len(), 2);
        assert!(table.rows().iter().all(|row| row.len() == 4));
        assert_eq!(table.rows()[0], vec!["Desc", "Amount", "", ""]);
    }

    #[test]
    fn header_is_kept_when_range_starts_below_data() {
        let table = extract(&workbook_bytes(), "statement.xlsx", &range("50", "60", "A", "B"));
        assert_eq!(table, table_of(&[&["", ""]]));
        assert_eq!(table.data_row_count(), 0);
    }

    #[test]
    fn slices_csv_range() {
        let csv = "\u{feff}Date,Merchant,Desc\n1/1/2024,A,\"coffee, large\"\n1/2/2024,B\n";
        let table = extract(csv.as_bytes(), "export.csv", &range("1", "3", "A", "C"));

        assert_eq!(
            table,
            table_of(&[
                &["Date", "Merchant", "Desc"],
                &["1/1/2024", "A", "coffee, large"],
                &["1/2/2024", "B", ""],
            ])
        );
    }

    #[test]
    fn unknown_extension_yields_empty_table() {
        let table = extract(b"Date,Desc\n", "notes.txt", &range("1", "2", "A", "B"));
        assert!(table.is_empty());
    }

    #[test]
    fn garbage_workbook_yields_empty_table() {
        let bytes = b"definitely not a workbook";
        assert!(try_extract(bytes, "broken.xlsx", &range("1", "2", "A", "B"), DEFAULT_MAX_CELLS).is_err());
        assert!(extract(bytes, "broken.xlsx", &range("1", "2", "A", "B")).is_empty());
    }

    #[test]
    fn cell_limit_counts_only_rows_in_use() {
        let csv = "Date,Desc\n1/1/2024,coffee\n";

        // XFD is the last worksheet column; rows past the data are clipped first.
        let wide = range("1", "1048576", "A", "XFD");
        assert!(matches!(
            try_extract(csv.as_bytes(), "export.csv", &wide, 10_000),
            Err(ExtractError::TooLarge { cells: 32_768, limit: 10_000 })
        ));
        assert!(extract_with_limit(csv.as_bytes(), "export.csv", &wide, 10_000).is_empty());

        let tall = range("1", "1048576", "A", "B");
        let table = extract_with_limit(csv.as_bytes(), "export.csv", &tall, 4);
        assert_eq!(table, table_of(&[&["Date", "Desc"], &["1/1/2024", "coffee"]]));
    }

    #[test]
    fn formats_numbers_and_serials() {
        assert_eq!(format_number(12.0), "12");
        assert_eq!(format_number(-3.25), "-3.25");
        assert_eq!(serial_to_text(45292.0).unwrap(), "2024-01-01");
        assert_eq!(serial_to_text(45292.5).unwrap(), "2024-01-01 12:00:00");
    }
}
