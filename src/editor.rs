use crate::table::{Cell, Row, Table};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Stable identity of a data row, assigned when the editor is seeded.
#[derive(Clone, Copy, Serialize, Deserialize, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RowId(pub u64);

#[derive(Clone, Debug)]
pub struct DataRow {
    pub id: RowId,
    pub cells: Row,
}

/// Where a new column goes relative to its anchor.
#[derive(Clone, Copy, Serialize, Deserialize, Debug, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum InsertPosition {
    Before,
    #[default]
    After,
}

/// Editable categorized table plus the rows picked for bulk deletion.
///
/// Callers address data rows by their 0-based position (the header is not
/// counted). Selection is tracked by [`RowId`], so deleting a row never
/// shifts the selection onto a neighbouring row.
#[derive(Clone, Debug, Default)]
pub struct TableEditor {
    header: Row,
    rows: Vec<DataRow>,
    selection: BTreeSet<RowId>,
    next_id: u64,
}

impl TableEditor {
    /// Seed from a table, squaring up ragged rows so every row has the
    /// header's width.
    pub fn from_table(table: Table) -> Self {
        let mut rows = table.into_rows().into_iter();
        let mut header = rows.next().unwrap_or_default();
        let data: Vec<Row> = rows.collect();

        let width = data.iter().map(Vec::len).fold(header.len(), usize::max);
        header.resize(width, Cell::new());

        let mut editor = TableEditor {
            header,
            rows: Vec::with_capacity(data.len()),
            selection: BTreeSet::new(),
            next_id: 0,
        };
        for mut cells in data {
            cells.resize(width, Cell::new());
            let id = editor.allocate_id();
            editor.rows.push(DataRow { id, cells });
        }
        editor
    }

    /// The nested-array form: header first, then every data row.
    pub fn to_table(&self) -> Table {
        if self.header.is_empty() && self.rows.is_empty() {
            return Table::empty();
        }
        let mut rows = Vec::with_capacity(self.rows.len() + 1);
        rows.push(self.header.clone());
        rows.extend(self.rows.iter().map(|row| row.cells.clone()));
        Table::new(rows)
    }

    fn allocate_id(&mut self) -> RowId {
        let id = RowId(self.next_id);
        self.next_id += 1;
        id
    }

    pub fn header(&self) -> &Row {
        &self.header
    }

    pub fn rows(&self) -> &[DataRow] {
        &self.rows
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    pub fn width(&self) -> usize {
        self.header.len()
    }

    pub fn cell(&self, row: usize, column: usize) -> Option<&Cell> {
        self.rows.get(row)?.cells.get(column)
    }

    /// Replace one cell. Out-of-range coordinates leave the table untouched.
    pub fn edit_cell(&mut self, row: usize, column: usize, value: impl Into<Cell>) -> bool {
        match self.rows.get_mut(row).and_then(|r| r.cells.get_mut(column)) {
            Some(cell) => {
                *cell = value.into();
                true
            }
            None => false,
        }
    }

    pub fn delete_row(&mut self, row: usize) -> bool {
        if row >= self.rows.len() {
            return false;
        }
        let removed = self.rows.remove(row);
        self.selection.remove(&removed.id);
        true
    }

    /// Remove every selected row and clear the selection. Returns how many
    /// rows were removed.
    pub fn delete_selected_rows(&mut self) -> usize {
        if self.selection.is_empty() {
            return 0;
        }
        let before = self.rows.len();
        let selection = std::mem::take(&mut self.selection);
        self.rows.retain(|row| !selection.contains(&row.id));
        before - self.rows.len()
    }

    /// Insert a column named `name` (trimmed) and return where it landed.
    ///
    /// With an anchor the column goes before or after it; without one it is
    /// appended. A blank name is ignored.
    pub fn insert_column(
        &mut self,
        name: &str,
        anchor: Option<usize>,
        position: InsertPosition,
    ) -> Option<usize> {
        let name = name.trim();
        if name.is_empty() {
            return None;
        }

        let width = self.header.len();
        let index = match (anchor, position) {
            (Some(anchor), InsertPosition::Before) => anchor,
            (Some(anchor), InsertPosition::After) => anchor.saturating_add(1),
            (None, _) => width,
        }
        .min(width);

        self.header.insert(index, name.to_string());
        for row in &mut self.rows {
            row.cells.insert(index, Cell::new());
        }
        Some(index)
    }

    /// Remove a column from the header and every row. Removing the last
    /// column leaves a zero-width table.
    pub fn delete_column(&mut self, column: usize) -> bool {
        if column >= self.header.len() {
            return false;
        }
        self.header.remove(column);
        for row in &mut self.rows {
            row.cells.remove(column);
        }
        true
    }

    pub fn toggle_row_selection(&mut self, row: usize) -> bool {
        let Some(id) = self.rows.get(row).map(|r| r.id) else {
            return false;
        };
        if !self.selection.remove(&id) {
            self.selection.insert(id);
        }
        true
    }

    pub fn select_all(&mut self) {
        self.selection = self.rows.iter().map(|row| row.id).collect();
    }

    pub fn clear_selection(&mut self) {
        self.selection.clear();
    }

    pub fn is_selected(&self, row: usize) -> bool {
        self.rows
            .get(row)
            .is_some_and(|r| self.selection.contains(&r.id))
    }

    /// Current positions of the selected rows, ascending.
    pub fn selected_rows(&self) -> Vec<usize> {
        self.rows
            .iter()
            .enumerate()
            .filter(|(_, row)| self.selection.contains(&row.id))
            .map(|(index, _)| index)
            .collect()
    }

    pub fn selection_len(&self) -> usize {
        self.selection.len()
    }

    /// True when every row is selected (and there is at least one row).
    pub fn all_selected(&self) -> bool {
        !self.rows.is_empty() && self.selection.len() == self.rows.len()
    }
}
