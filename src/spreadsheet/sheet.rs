use crate::spreadsheet::cell::Cell;
use std::collections::HashMap;

/// The non-empty cells of one worksheet, addressable by (row, column).
#[derive(Debug, Default)]
pub struct Sheet {
    /// Source file name
    pub file_name: String,
    /// Worksheet name
    pub name: String,
    cells: Vec<Cell>,
    /// (row, col) to position in `cells`
    indexes: HashMap<(usize, usize), usize>,
    row_upper_bound: Option<usize>,
    col_upper_bound: Option<usize>,
}

impl Sheet {
    pub fn new(file_name: &str, name: &str) -> Self {
        Sheet {
            file_name: file_name.to_owned(),
            name: name.to_owned(),
            ..Default::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    /// Adds a cell. A later cell at the same position replaces the earlier one.
    pub fn push(&mut self, cell: Cell) {
        self.row_upper_bound = self.row_upper_bound.max(Some(cell.row));
        self.col_upper_bound = self.col_upper_bound.max(Some(cell.col));
        match self.indexes.get(&(cell.row, cell.col)) {
            Some(index) => self.cells[*index] = cell,
            None => {
                self.indexes.insert((cell.row, cell.col), self.cells.len());
                self.cells.push(cell);
            }
        }
    }

    pub fn get(&self, row: usize, col: usize) -> Option<&Cell> {
        self.indexes.get(&(row, col)).and_then(|index| self.cells.get(*index))
    }

    /// Number of rows from A1 down to the last row holding a cell.
    pub fn row_count(&self) -> usize {
        self.row_upper_bound.map(|row| row + 1).unwrap_or(0)
    }

    /// Number of columns from column A to the rightmost cell.
    pub fn col_count(&self) -> usize {
        self.col_upper_bound.map(|col| col + 1).unwrap_or(0)
    }

    /// Mutable access for readers that resolve values after the scan, such as shared strings.
    pub(crate) fn cells_mut(&mut self) -> impl Iterator<Item = &mut Cell> {
        self.cells.iter_mut()
    }
}
