use serde::{Deserialize, Serialize};

/// A single cell. Numbers and dates travel as their textual form.
pub type Cell = String;

/// An ordered sequence of cells.
pub type Row = Vec<Cell>;

/// A rectangular table whose first row is the header row.
///
/// Serializes as a plain nested array (`[["Date", ...], ["1/1/2024", ...]]`),
/// which is the wire and snapshot format of the table.
#[derive(Clone, Serialize, Deserialize, Debug, Default, PartialEq, Eq)]
#[serde(transparent)]
pub struct Table {
    rows: Vec<Row>,
}

impl Table {
    pub fn new(rows: Vec<Row>) -> Self {
        Table { rows }
    }

    pub fn empty() -> Self {
        Table { rows: Vec::new() }
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn header(&self) -> Option<&Row> {
        self.rows.first()
    }

    /// Every row except the header.
    pub fn data_rows(&self) -> &[Row] {
        self.rows.get(1..).unwrap_or(&[])
    }

    pub fn data_row_count(&self) -> usize {
        self.rows.len().saturating_sub(1)
    }

    /// Width of the header row, 0 for an empty table.
    pub fn width(&self) -> usize {
        self.header().map_or(0, |header| header.len())
    }

    pub fn rows(&self) -> &[Row] {
        &self.rows
    }

    pub fn into_rows(self) -> Vec<Row> {
        self.rows
    }

    /// True when every data row has as many cells as the header.
    pub fn is_rectangular(&self) -> bool {
        let width = self.width();
        self.data_rows().iter().all(|row| row.len() == width)
    }
}

impl From<Vec<Row>> for Table {
    fn from(rows: Vec<Row>) -> Self {
        Table::new(rows)
    }
}

/// Builds a table from string literals; handy in tests and fixtures.
pub fn table_of(rows: &[&[&str]]) -> Table {
    Table::new(
        rows.iter()
            .map(|row| row.iter().map(|cell| cell.to_string()).collect())
            .collect(),
    )
}
