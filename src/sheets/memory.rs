use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use super::{CellUpdate, SheetStore, trim_row};
use crate::error::{TrackerError, TrackerResult};

/// Kinds of calls, for fault injection and call counting
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Op {
    Read,
    AddWorksheet,
    UpdateCell,
    BatchUpdate,
    Append,
    /// An append carrying more than one row
    BulkAppend,
    Clear,
    Update,
}

#[derive(Debug, Default)]
struct Worksheet {
    title: String,
    cells: Vec<Vec<String>>,
}

impl Worksheet {
    fn set(&mut self, row: u32, col: u32, value: &str) {
        let (r, c) = (row.max(1) as usize - 1, col.max(1) as usize - 1);
        if self.cells.len() <= r {
            self.cells.resize_with(r + 1, Vec::new);
        }
        let line = &mut self.cells[r];
        if line.len() <= c {
            line.resize(c + 1, String::new());
        }
        line[c] = value.to_string();
    }

    fn get(&self, row: u32, col: u32) -> Option<&str> {
        let (r, c) = ((row as usize).checked_sub(1)?, (col as usize).checked_sub(1)?);
        self.cells
            .get(r)
            .and_then(|line| line.get(c))
            .map(String::as_str)
            .filter(|v| !v.is_empty())
    }

    fn last_used_row(&self) -> usize {
        self.cells
            .iter()
            .rposition(|line| line.iter().any(|v| !v.is_empty()))
            .map(|i| i + 1)
            .unwrap_or(0)
    }
}

#[derive(Debug, Default)]
struct Workbook {
    sheets: Vec<Worksheet>,
    rate_limited: u32,
    failures: HashMap<Op, u32>,
    echo_appends: u32,
    calls: HashMap<Op, usize>,
}

impl Workbook {
    fn sheet(&self, title: &str) -> TrackerResult<&Worksheet> {
        self.sheets
            .iter()
            .find(|s| s.title == title)
            .ok_or_else(|| TrackerError::NotFound(format!("Worksheet '{}'", title)))
    }

    fn sheet_mut(&mut self, title: &str) -> TrackerResult<&mut Worksheet> {
        self.sheets
            .iter_mut()
            .find(|s| s.title == title)
            .ok_or_else(|| TrackerError::NotFound(format!("Worksheet '{}'", title)))
    }

    /// Count the call and fire any pending fault for it
    fn enter(&mut self, op: Op) -> TrackerResult<()> {
        *self.calls.entry(op).or_default() += 1;
        if self.rate_limited > 0 {
            self.rate_limited -= 1;
            return Err(TrackerError::RateLimited(
                "RATE_LIMIT_EXCEEDED: Quota exceeded for quota metric 'Read requests'".to_string(),
            ));
        }
        if let Some(left) = self.failures.get_mut(&op) {
            if *left > 0 {
                *left -= 1;
                return Err(TrackerError::Api {
                    status: 500,
                    message: format!("injected {:?} failure", op),
                });
            }
        }
        Ok(())
    }
}

/// In-process workbook implementing [`SheetStore`]
///
/// Backs the `memory` backend and the test-suite. Faults can be queued so
/// the retry and fallback paths run without a network.
#[derive(Debug, Default)]
pub struct MemorySheets {
    book: Mutex<Workbook>,
}

impl MemorySheets {
    /// Workbook with a single empty worksheet
    pub fn new(first_sheet: &str) -> Self {
        let sheets = MemorySheets::default();
        sheets.lock().sheets.push(Worksheet {
            title: first_sheet.to_string(),
            cells: Vec::new(),
        });
        sheets
    }

    /// Workbook whose first worksheet already holds `rows`
    pub fn with_rows(first_sheet: &str, rows: Vec<Vec<String>>) -> Self {
        let sheets = MemorySheets::new(first_sheet);
        if let Some(sheet) = sheets.lock().sheets.first_mut() {
            sheet.cells = rows;
        }
        sheets
    }

    fn lock(&self) -> MutexGuard<'_, Workbook> {
        self.book.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// The next `times` calls of any kind answer with a rate-limit error
    pub fn rate_limit_next(&self, times: u32) {
        self.lock().rate_limited = times;
    }

    /// The next `times` calls of kind `op` fail with a server error
    pub fn fail_next(&self, op: Op, times: u32) {
        self.lock().failures.insert(op, times);
    }

    /// The next `times` appends land twice, as if another session wrote the
    /// same rows at the same moment
    pub fn echo_next_appends(&self, times: u32) {
        self.lock().echo_appends = times;
    }

    /// How many calls of kind `op` were made, failed ones included
    pub fn calls(&self, op: Op) -> usize {
        self.lock().calls.get(&op).copied().unwrap_or(0)
    }

    /// Raw copy of a worksheet's cells
    pub fn snapshot(&self, sheet: &str) -> Vec<Vec<String>> {
        self.lock()
            .sheet(sheet)
            .map(|s| s.cells.iter().cloned().map(trim_row).collect())
            .unwrap_or_default()
    }
}

#[async_trait]
impl SheetStore for MemorySheets {
    async fn worksheet_titles(&self) -> TrackerResult<Vec<String>> {
        let mut book = self.lock();
        book.enter(Op::Read)?;
        Ok(book.sheets.iter().map(|s| s.title.clone()).collect())
    }

    async fn add_worksheet(&self, title: &str, _rows: u32, _cols: u32) -> TrackerResult<()> {
        let mut book = self.lock();
        book.enter(Op::AddWorksheet)?;
        if book.sheet(title).is_ok() {
            return Err(TrackerError::Api {
                status: 400,
                message: format!("A sheet with the name \"{}\" already exists", title),
            });
        }
        book.sheets.push(Worksheet {
            title: title.to_string(),
            cells: Vec::new(),
        });
        Ok(())
    }

    async fn get_values(&self, sheet: &str) -> TrackerResult<Vec<Vec<String>>> {
        let mut book = self.lock();
        book.enter(Op::Read)?;
        let ws = book.sheet(sheet)?;
        let used = ws.last_used_row();
        Ok(ws.cells[..used].iter().cloned().map(trim_row).collect())
    }

    async fn row_values(&self, sheet: &str, row: u32) -> TrackerResult<Vec<String>> {
        let mut book = self.lock();
        book.enter(Op::Read)?;
        let ws = book.sheet(sheet)?;
        Ok((row as usize)
            .checked_sub(1)
            .and_then(|r| ws.cells.get(r))
            .cloned()
            .map(trim_row)
            .unwrap_or_default())
    }

    async fn col_values(&self, sheet: &str, col: u32) -> TrackerResult<Vec<String>> {
        let mut book = self.lock();
        book.enter(Op::Read)?;
        let ws = book.sheet(sheet)?;
        let column = ws
            .cells
            .iter()
            .map(|line| {
                (col as usize)
                    .checked_sub(1)
                    .and_then(|c| line.get(c))
                    .cloned()
                    .unwrap_or_default()
            })
            .collect();
        Ok(trim_row(column))
    }

    async fn cell(&self, sheet: &str, row: u32, col: u32) -> TrackerResult<Option<String>> {
        let mut book = self.lock();
        book.enter(Op::Read)?;
        Ok(book.sheet(sheet)?.get(row, col).map(str::to_string))
    }

    async fn update_cell(&self, sheet: &str, row: u32, col: u32, value: &str) -> TrackerResult<()> {
        let mut book = self.lock();
        book.enter(Op::UpdateCell)?;
        book.sheet_mut(sheet)?.set(row, col, value);
        Ok(())
    }

    async fn batch_update(&self, sheet: &str, updates: &[CellUpdate]) -> TrackerResult<()> {
        let mut book = self.lock();
        book.enter(Op::BatchUpdate)?;
        let ws = book.sheet_mut(sheet)?;
        for update in updates {
            ws.set(update.row, update.col, &update.value);
        }
        Ok(())
    }

    async fn append_rows(&self, sheet: &str, rows: &[Vec<String>]) -> TrackerResult<()> {
        let mut book = self.lock();
        let op = if rows.len() > 1 { Op::BulkAppend } else { Op::Append };
        book.enter(op)?;
        let copies = if book.echo_appends > 0 {
            book.echo_appends -= 1;
            2
        } else {
            1
        };
        let ws = book.sheet_mut(sheet)?;
        for _ in 0..copies {
            let start = ws.last_used_row();
            ws.cells.truncate(start);
            ws.cells.extend(rows.iter().cloned());
        }
        Ok(())
    }

    async fn clear(&self, sheet: &str) -> TrackerResult<()> {
        let mut book = self.lock();
        book.enter(Op::Clear)?;
        book.sheet_mut(sheet)?.cells.clear();
        Ok(())
    }

    async fn update(&self, sheet: &str, rows: &[Vec<String>]) -> TrackerResult<()> {
        let mut book = self.lock();
        book.enter(Op::Update)?;
        let ws = book.sheet_mut(sheet)?;
        for (r, line) in rows.iter().enumerate() {
            for (c, value) in line.iter().enumerate() {
                ws.set(r as u32 + 1, c as u32 + 1, value);
            }
        }
        Ok(())
    }
}
