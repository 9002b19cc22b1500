//! Presentation-only view of a [`TableEditor`]. Nothing here mutates cells.

use crate::category::{CATEGORY_COLUMN, Category};
use crate::editor::TableEditor;
use chrono::{DateTime, NaiveDate, NaiveDateTime};
use lazy_static::lazy_static;
use regex::Regex;
use serde::Serialize;

lazy_static! {
    static ref SLASH_DATE_REGEX: Regex = Regex::new(r"^(\d{1,2})/(\d{1,2})/(\d{2}|\d{4})$").unwrap();
}

/// Header names whose cells are shown as dates.
pub const DATE_COLUMNS: [&str; 2] = ["Date", "Date Processed"];

const DATE_FORMATS: [&str; 6] = [
    "%Y-%m-%d",
    "%Y/%m/%d",
    "%d %b %Y",
    "%b %d, %Y",
    "%B %d, %Y",
    "%b %d %Y",
];

const DATETIME_FORMATS: [&str; 3] = ["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M"];

#[derive(Clone, Copy, Serialize, Debug, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum CellKind {
    Text,
    Category,
    Date,
}

impl CellKind {
    pub fn for_header(name: &str) -> Self {
        if name == CATEGORY_COLUMN {
            CellKind::Category
        } else if DATE_COLUMNS.contains(&name) {
            CellKind::Date
        } else {
            CellKind::Text
        }
    }
}

#[derive(Serialize, Debug)]
pub struct CellView {
    pub value: String,
    pub display: String,
    pub kind: CellKind,
}

#[derive(Serialize, Debug)]
pub struct RowView {
    pub index: usize,
    pub id: u64,
    pub selected: bool,
    pub cells: Vec<CellView>,
}

#[derive(Serialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct TableView {
    pub headers: Vec<String>,
    pub rows: Vec<RowView>,
    pub selected_count: usize,
    pub all_selected: bool,
    /// Options for the category dropdown.
    pub categories: Vec<&'static str>,
}

/// Parse common date spellings and show them as `MM/DD/YYYY`. Anything
/// unparseable comes back unchanged.
pub fn format_date(raw: &str) -> String {
    parse_date(raw.trim())
        .map(|date| date.format("%m/%d/%Y").to_string())
        .unwrap_or_else(|| raw.to_string())
}

fn parse_date(text: &str) -> Option<NaiveDate> {
    if text.is_empty() {
        return None;
    }

    if let Some(caps) = SLASH_DATE_REGEX.captures(text) {
        let month: u32 = caps[1].parse().ok()?;
        let day: u32 = caps[2].parse().ok()?;
        let mut year: i32 = caps[3].parse().ok()?;
        if caps[3].len() == 2 {
            year += if year < 50 { 2000 } else { 1900 };
        }
        return NaiveDate::from_ymd_opt(year, month, day);
    }

    if let Ok(moment) = DateTime::parse_from_rfc3339(text) {
        return Some(moment.date_naive());
    }

    DATE_FORMATS
        .iter()
        .find_map(|format| NaiveDate::parse_from_str(text, format).ok())
        .or_else(|| {
            DATETIME_FORMATS
                .iter()
                .find_map(|format| NaiveDateTime::parse_from_str(text, format).ok())
                .map(|moment| moment.date())
        })
}

/// Text to show for `raw` in a column named `header`.
pub fn display_value(header: &str, raw: &str) -> String {
    match CellKind::for_header(header) {
        CellKind::Date => format_date(raw),
        CellKind::Text | CellKind::Category => raw.to_string(),
    }
}

pub fn render(editor: &TableEditor) -> TableView {
    let headers = editor.header().clone();

    let rows = editor
        .rows()
        .iter()
        .enumerate()
        .map(|(index, row)| RowView {
            index,
            id: row.id.0,
            selected: editor.is_selected(index),
            cells: row
                .cells
                .iter()
                .enumerate()
                .map(|(column, value)| {
                    let header = headers.get(column).map(String::as_str).unwrap_or_default();
                    CellView {
                        value: value.clone(),
                        display: display_value(header, value),
                        kind: CellKind::for_header(header),
                    }
                })
                .collect(),
        })
        .collect();

    TableView {
        headers,
        rows,
        selected_count: editor.selection_len(),
        all_selected: editor.all_selected(),
        categories: Category::labels(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::table::table_of;

    #[test]
    fn formats_common_date_spellings() {
        assert_eq!(format_date("1/1/2024"), "01/01/2024");
        assert_eq!(format_date("12/31/99"), "12/31/1999");
        assert_eq!(format_date("3/4/24"), "03/04/2024");
        assert_eq!(format_date("2024-01-15"), "01/15/2024");
        assert_eq!(format_date("2024-01-15 08:30:00"), "01/15/2024");
        assert_eq!(format_date("2024-01-15T08:30:00Z"), "01/15/2024");
        assert_eq!(format_date("Jan 5, 2024"), "01/05/2024");
        assert_eq!(format_date("5 Jan 2024"), "01/05/2024");
    }

    #[test]
    fn unparseable_dates_pass_through() {
        assert_eq!(format_date("pending"), "pending");
        assert_eq!(format_date("13/45/2024"), "13/45/2024");
        assert_eq!(format_date(""), "");
    }

    #[test]
    fn only_date_columns_are_formatted() {
        assert_eq!(display_value("Date", "1/2/2024"), "01/02/2024");
        assert_eq!(display_value("Date Processed", "2024-01-02"), "01/02/2024");
        assert_eq!(display_value("date", "1/2/2024"), "1/2/2024");
        assert_eq!(display_value("Desc", "1/2/2024"), "1/2/2024");
    }

    #[test]
    fn render_leaves_stored_values_alone() {
        let mut editor = TableEditor::from_table(table_of(&[
            &["Date", "Desc", "Category"],
            &["1/1/2024", "coffee", "Dine-in"],
            &["soon", "bus", "Transportation"],
        ]));
        editor.toggle_row_selection(1);

        let view = render(&editor);

        assert_eq!(view.headers, vec!["Date", "Desc", "Category"]);
        assert_eq!(view.rows[0].cells[0].value, "1/1/2024");
        assert_eq!(view.rows[0].cells[0].display, "01/01/2024");
        assert_eq!(view.rows[0].cells[0].kind, CellKind::Date);
        assert_eq!(view.rows[0].cells[2].kind, CellKind::Category);
        assert_eq!(view.rows[1].cells[0].display, "soon");
        assert!(view.rows[1].selected);
        assert_eq!(view.selected_count, 1);
        assert!(!view.all_selected);
        assert_eq!(view.categories.len(), 8);
        assert_eq!(editor.cell(0, 0).unwrap(), "1/1/2024");
    }
}
