use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};
use thiserror::Error;

lazy_static! {
    static ref COLUMN_REGEX: Regex = Regex::new(r"^[A-Za-z]{1,3}$").unwrap();
}

/// Last column a workbook can address (XFD).
pub const MAX_COLUMN: u32 = 16_384;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum RangeError {
    #[error("Invalid row number '{0}'")]
    InvalidRow(String),

    #[error("Invalid column letters '{0}'")]
    InvalidColumn(String),

    #[error("Start row {start} is after end row {end}")]
    ReversedRows { start: u32, end: u32 },

    #[error("Start column {start} is after end column {end}")]
    ReversedColumns { start: String, end: String },
}

/// Rectangular region to slice out of an uploaded sheet.
///
/// Rows are 1-based, columns are stored 1-based as well and converted from
/// spreadsheet letters (`A` = 1, `AA` = 27).
#[derive(Clone, Copy, Serialize, Deserialize, Debug, PartialEq, Eq)]
pub struct RangeDescriptor {
    pub start_row: u32,
    pub end_row: u32,
    pub start_col: u32,
    pub end_col: u32,
}

impl RangeDescriptor {
    /// Parses the four text fields of the upload form.
    pub fn parse(
        start_row: &str,
        end_row: &str,
        start_col: &str,
        end_col: &str,
    ) -> Result<Self, RangeError> {
        let start_row = parse_row(start_row)?;
        let end_row = parse_row(end_row)?;
        if start_row > end_row {
            return Err(RangeError::ReversedRows {
                start: start_row,
                end: end_row,
            });
        }

        let first = letter_to_col(start_col)?;
        let last = letter_to_col(end_col)?;
        if first > last {
            return Err(RangeError::ReversedColumns {
                start: start_col.trim().to_ascii_uppercase(),
                end: end_col.trim().to_ascii_uppercase(),
            });
        }

        Ok(RangeDescriptor {
            start_row,
            end_row,
            start_col: first,
            end_col: last,
        })
    }

    pub fn width(&self) -> usize {
        (self.end_col - self.start_col + 1) as usize
    }

    pub fn height(&self) -> usize {
        (self.end_row - self.start_row + 1) as usize
    }

    /// A1-style rendering, e.g. `A1:D20`.
    pub fn to_a1(&self) -> String {
        format!(
            "{}{}:{}{}",
            col_to_letter(self.start_col),
            self.start_row,
            col_to_letter(self.end_col),
            self.end_row
        )
    }
}

fn parse_row(value: &str) -> Result<u32, RangeError> {
    match value.trim().parse::<u32>() {
        Ok(row) if row > 0 => Ok(row),
        _ => Err(RangeError::InvalidRow(value.to_string())),
    }
}

/// Convert column letters to a 1-based column number (A=1, Z=26, AA=27).
pub fn letter_to_col(letters: &str) -> Result<u32, RangeError> {
    let trimmed = letters.trim();
    if !COLUMN_REGEX.is_match(trimmed) {
        return Err(RangeError::InvalidColumn(letters.to_string()));
    }

    let col = trimmed
        .to_ascii_uppercase()
        .bytes()
        .fold(0u32, |acc, c| acc * 26 + (c - b'A' + 1) as u32);

    if col > MAX_COLUMN {
        return Err(RangeError::InvalidColumn(letters.to_string()));
    }
    Ok(col)
}

/// Convert a 1-based column number to its letters.
pub fn col_to_letter(col: u32) -> String {
    let mut col = col;
    let mut result = String::new();
    while col > 0 {
        col -= 1;
        result.push(((col % 26) as u8 + b'A') as char);
        col /= 26;
    }
    result.chars().rev().collect()
}
