//! Remote spreadsheet access
//!
//! [`SheetStore`] is the narrow slice of a spreadsheet API the tracker needs:
//! whole-sheet reads, single and batched cell writes, row appends and full
//! rewrites. Rows and columns are 1-based, as in A1 notation.

pub mod auth;
pub mod google;
pub mod memory;

use async_trait::async_trait;
use std::collections::HashMap;

use crate::error::TrackerResult;

pub use google::GoogleSheets;
pub use memory::MemorySheets;

/// A single cell write inside a batch
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CellUpdate {
    pub row: u32,
    pub col: u32,
    pub value: String,
}

impl CellUpdate {
    pub fn new(row: u32, col: u32, value: impl Into<String>) -> Self {
        Self {
            row,
            col,
            value: value.into(),
        }
    }
}

/// A cell returned by a search
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CellRef {
    pub row: u32,
    pub col: u32,
    pub value: String,
}

#[async_trait]
pub trait SheetStore: Send + Sync {
    /// Worksheet titles in tab order; the first one holds the tasks
    async fn worksheet_titles(&self) -> TrackerResult<Vec<String>>;

    async fn add_worksheet(&self, title: &str, rows: u32, cols: u32) -> TrackerResult<()>;

    /// Every non-empty row, trailing empty cells trimmed
    async fn get_values(&self, sheet: &str) -> TrackerResult<Vec<Vec<String>>>;

    async fn row_values(&self, sheet: &str, row: u32) -> TrackerResult<Vec<String>>;

    async fn col_values(&self, sheet: &str, col: u32) -> TrackerResult<Vec<String>>;

    /// Cell content, `None` when the cell is empty
    async fn cell(&self, sheet: &str, row: u32, col: u32) -> TrackerResult<Option<String>>;

    async fn update_cell(&self, sheet: &str, row: u32, col: u32, value: &str) -> TrackerResult<()>;

    async fn batch_update(&self, sheet: &str, updates: &[CellUpdate]) -> TrackerResult<()>;

    /// Append rows after the last non-empty row, parsing input like a user would type it
    async fn append_rows(&self, sheet: &str, rows: &[Vec<String>]) -> TrackerResult<()>;

    async fn clear(&self, sheet: &str) -> TrackerResult<()>;

    /// Write `rows` starting at A1
    async fn update(&self, sheet: &str, rows: &[Vec<String>]) -> TrackerResult<()>;

    async fn append_row(&self, sheet: &str, row: &[String]) -> TrackerResult<()> {
        self.append_rows(sheet, &[row.to_vec()]).await
    }

    /// First cell whose content equals `value`, scanning row by row
    async fn find(&self, sheet: &str, value: &str) -> TrackerResult<Option<CellRef>> {
        Ok(self.find_all(sheet, value).await?.into_iter().next())
    }

    /// Every cell whose content equals `value`
    async fn find_all(&self, sheet: &str, value: &str) -> TrackerResult<Vec<CellRef>> {
        let rows = self.get_values(sheet).await?;
        Ok(rows
            .iter()
            .enumerate()
            .flat_map(|(r, row)| {
                row.iter().enumerate().filter_map(move |(c, cell)| {
                    (cell == value).then(|| CellRef {
                        row: r as u32 + 1,
                        col: c as u32 + 1,
                        value: cell.clone(),
                    })
                })
            })
            .collect())
    }
}

/// Convert column number to letter (A=1, B=2, ..., Z=26, AA=27)
pub fn column_to_letter(col: u32) -> String {
    let mut name = String::new();
    let mut n = col;

    while n > 0 {
        n -= 1;
        name.insert(0, (b'A' + (n % 26) as u8) as char);
        n /= 26;
    }

    name
}

/// Sheet title quoted for use in a range, e.g. `'Tasks Devs'`
pub fn quote_sheet(sheet: &str) -> String {
    format!("'{}'", sheet.replace('\'', "''"))
}

/// A1 reference of one cell, e.g. `'Logs'!C7`
pub fn a1(sheet: &str, row: u32, col: u32) -> String {
    format!("{}!{}{}", quote_sheet(sheet), column_to_letter(col), row)
}

/// Pair a data row with the header row; missing cells read as empty
pub fn record<'r>(header: &'r [String], row: &'r [String]) -> HashMap<&'r str, &'r str> {
    header
        .iter()
        .enumerate()
        .map(|(i, h)| (h.as_str(), row.get(i).map(String::as_str).unwrap_or("")))
        .collect()
}

/// Drop trailing empty cells, the way the API reports rows
pub(crate) fn trim_row(mut row: Vec<String>) -> Vec<String> {
    while row.last().is_some_and(|v| v.is_empty()) {
        row.pop();
    }
    row
}
