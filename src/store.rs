//! Tasks persisted in the first worksheet
//!
//! Reads coerce and validate the rows, rebuilding the seed dataset when the
//! sheet is empty or corrupt. Writes are incremental where possible (one
//! cell, a batch of cells, one appended row) and fall back to rewriting the
//! whole sheet from the cached task list when the incremental path fails.
//! Every change lands in the audit log.

use chrono::{Local, NaiveDate};
use log::{error, info, warn};
use std::time::Duration;

use crate::audit::{AuditLog, Change, LogAction, LogEntry};
use crate::config::REQUIRED_COLUMNS;
use crate::connector::{Connector, SheetHandle};
use crate::error::{TrackerError, TrackerResult};
use crate::retry::RetryPolicy;
use crate::sheets::{CellUpdate, record};
use crate::task::{Stage, Task, TaskDraft, TaskField, parse_id, seed_tasks};

/// Why the sheet was replaced with the seed dataset
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResetReason {
    ReadFailed(String),
    Empty,
    MissingColumns(Vec<String>),
    Corrupt,
}

impl std::fmt::Display for ResetReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ResetReason::ReadFailed(e) => write!(f, "could not read the sheet ({})", e),
            ResetReason::Empty => write!(f, "the sheet is empty"),
            ResetReason::MissingColumns(cols) => write!(f, "missing columns: {}", cols.join(", ")),
            ResetReason::Corrupt => write!(f, "no row has a valid id"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct LoadOutcome {
    pub tasks: Vec<Task>,
    /// Set when the seed dataset was written instead of reading the sheet
    pub reset: Option<ResetReason>,
}

/// Which write path persisted a change
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SavePath {
    Incremental,
    FullRewrite,
}

#[derive(Debug, Clone)]
pub struct MoveOutcome {
    pub task: Task,
    pub path: SavePath,
    /// Progress hit 100 and pulled the task into the terminal stage
    pub auto_completed: bool,
}

/// Check that every required column is present in `headers`
pub fn validate_structure(headers: &[String]) -> (bool, Vec<String>) {
    let missing: Vec<String> = REQUIRED_COLUMNS
        .iter()
        .filter(|col| !headers.iter().any(|h| h.trim() == **col))
        .map(|col| col.to_string())
        .collect();
    (missing.is_empty(), missing)
}

pub fn today() -> NaiveDate {
    Local::now().date_naive()
}

pub struct TaskStore {
    connector: Connector,
    retry: RetryPolicy,
    verify_delay: Duration,
}

impl TaskStore {
    pub fn new(connector: Connector) -> Self {
        Self {
            connector,
            retry: RetryPolicy::default(),
            verify_delay: Duration::from_millis(500),
        }
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Pause before re-checking a freshly appended id
    pub fn with_verify_delay(mut self, delay: Duration) -> Self {
        self.verify_delay = delay;
        self
    }

    pub fn connector(&self) -> &Connector {
        &self.connector
    }

    async fn handle(&self) -> TrackerResult<SheetHandle> {
        self.connector.handle().await
    }

    /// Read every task, replacing the sheet with seed data when it cannot be used
    pub async fn load_tasks(&self) -> TrackerResult<LoadOutcome> {
        let handle = self.handle().await?;
        let rows = match handle.store.get_values(&handle.tasks_sheet).await {
            Ok(rows) => rows,
            Err(e) => {
                warn!("Failed to read the task sheet: {}", e);
                return self.reset(ResetReason::ReadFailed(e.to_string())).await;
            }
        };

        let Some((header, body)) = rows.split_first() else {
            return self.reset(ResetReason::Empty).await;
        };
        if body.is_empty() {
            return self.reset(ResetReason::Empty).await;
        }

        let (valid, missing) = validate_structure(header);
        if !valid {
            error!("Invalid sheet structure, missing columns: {}", missing.join(", "));
            return self.reset(ResetReason::MissingColumns(missing)).await;
        }

        let tasks: Vec<Task> = body
            .iter()
            .filter_map(|row| Task::from_record(&record(header, row)))
            .collect();
        if tasks.is_empty() {
            warn!("No row with a valid id, reinitialising");
            return self.reset(ResetReason::Corrupt).await;
        }

        info!("Loaded {} tasks", tasks.len());
        Ok(LoadOutcome { tasks, reset: None })
    }

    async fn reset(&self, reason: ResetReason) -> TrackerResult<LoadOutcome> {
        warn!("Writing seed data: {}", reason);
        let tasks = self.seed().await?;
        Ok(LoadOutcome {
            tasks,
            reset: Some(reason),
        })
    }

    /// Overwrite the sheet with the default dataset
    pub async fn seed(&self) -> TrackerResult<Vec<Task>> {
        let tasks = seed_tasks(today());
        self.save_all(&tasks).await?;
        info!("Initial structure created");
        Ok(tasks)
    }

    /// Clear the sheet and write header plus every task
    pub async fn save_all(&self, tasks: &[Task]) -> TrackerResult<()> {
        let handle = self.handle().await?;
        let header: Vec<String> = REQUIRED_COLUMNS.iter().map(|c| c.to_string()).collect();
        let mut rows = Vec::with_capacity(tasks.len() + 1);
        rows.push(header.clone());
        rows.extend(tasks.iter().map(|t| t.to_row(&header)));

        handle.store.clear(&handle.tasks_sheet).await?;
        handle.store.update(&handle.tasks_sheet, &rows).await?;
        info!("Rewrote the task sheet with {} tasks", tasks.len());
        Ok(())
    }

    /// Header row of the task sheet
    pub async fn headers(&self) -> TrackerResult<Vec<String>> {
        let handle = self.handle().await?;
        handle.store.row_values(&handle.tasks_sheet, 1).await
    }

    /// Sheet row holding task `id`, searching the id column below the header
    async fn locate(&self, handle: &SheetHandle, id: u32) -> TrackerResult<Option<u32>> {
        let ids = handle.store.col_values(&handle.tasks_sheet, 1).await?;
        Ok(ids
            .iter()
            .enumerate()
            .skip(1)
            .find(|(_, v)| parse_id(v) == Some(id))
            .map(|(i, _)| i as u32 + 1))
    }

    /// Write one field of one task and log the change
    pub async fn update_field(&self, id: u32, field: &str, value: &str, user: &str) -> TrackerResult<()> {
        let handle = self.handle().await?;
        let sheet = handle.tasks_sheet.as_str();

        let row = self
            .locate(&handle, id)
            .await?
            .ok_or_else(|| TrackerError::NotFound(format!("Task #{}", id)))?;
        let headers = handle.store.row_values(sheet, 1).await?;
        let col = headers
            .iter()
            .position(|h| h == field)
            .map(|i| i as u32 + 1)
            .ok_or_else(|| TrackerError::UnknownField(field.to_string()))?;

        let old = handle.store.cell(sheet, row, col).await?;
        handle.store.update_cell(sheet, row, col, value).await?;

        let change = Change::new(field, old, Some(value.to_string()));
        AuditLog::new(handle.store.as_ref())
            .record(LogAction::Update, id, &[change], user)
            .await
    }

    /// Write several fields of one task in a single batch.
    /// Fields missing from the header are skipped.
    pub async fn update_fields(&self, id: u32, fields: &[(&str, String)], user: &str) -> TrackerResult<()> {
        let handle = self.handle().await?;
        let sheet = handle.tasks_sheet.as_str();

        let row = self
            .locate(&handle, id)
            .await?
            .ok_or_else(|| TrackerError::NotFound(format!("Task #{}", id)))?;
        let headers = handle.store.row_values(sheet, 1).await?;
        let current = handle.store.row_values(sheet, row).await?;

        let mut updates = Vec::new();
        let mut changes = Vec::new();
        for (field, value) in fields {
            let Some(i) = headers.iter().position(|h| h == field) else {
                warn!("Skipping unknown field '{}' for task #{}", field, id);
                continue;
            };
            updates.push(CellUpdate::new(row, i as u32 + 1, value.clone()));
            let old = current.get(i).cloned().unwrap_or_default();
            changes.push(Change::new(*field, Some(old), Some(value.clone())));
        }

        if !updates.is_empty() {
            handle.store.batch_update(sheet, &updates).await?;
        }
        AuditLog::new(handle.store.as_ref())
            .record(LogAction::Update, id, &changes, user)
            .await
    }

    /// Next free id: the largest numeric id plus one, retried through rate limits
    pub async fn next_id(&self) -> TrackerResult<u32> {
        let id = self
            .retry
            .run("Generating task id", |_| self.read_next_id())
            .await?;
        info!("Reserved id #{}", id);
        Ok(id)
    }

    async fn read_next_id(&self) -> TrackerResult<u32> {
        let handle = self.handle().await?;
        let ids = handle.store.col_values(&handle.tasks_sheet, 1).await?;
        let max = ids.iter().skip(1).filter_map(|v| parse_id(v)).max();
        Ok(max.map_or(1, |m| m + 1))
    }

    /// Whether `id` occurs at most once in the id column.
    /// A failed check reports the id as unique.
    pub async fn is_id_unique(&self, id: u32) -> bool {
        let check = async {
            let handle = self.handle().await?;
            let ids = handle.store.col_values(&handle.tasks_sheet, 1).await?;
            Ok::<usize, TrackerError>(ids.iter().skip(1).filter(|v| parse_id(v) == Some(id)).count())
        };
        match check.await {
            Ok(count) if count > 1 => {
                error!("Id {} is duplicated: {} occurrences", id, count);
                false
            }
            Ok(_) => true,
            Err(e) => {
                warn!("Could not check uniqueness of id {}: {}", id, e);
                true
            }
        }
    }

    /// Append one task row in header order and log its creation.
    /// With `verify`, re-reads the id column afterwards to catch a concurrent writer.
    pub async fn append_task(&self, task: &Task, user: &str, verify: bool) -> TrackerResult<()> {
        let handle = self.handle().await?;
        let headers = handle.store.row_values(&handle.tasks_sheet, 1).await?;
        if headers.is_empty() {
            return Err(TrackerError::MissingHeaders);
        }

        let row = task.to_row(&headers);
        handle.store.append_row(&handle.tasks_sheet, &row).await?;

        let changes: Vec<Change> = headers
            .iter()
            .map(|h| Change::new(h.as_str(), None, task.field_value(h)))
            .collect();
        AuditLog::new(handle.store.as_ref())
            .record(LogAction::Creation, task.id, &changes, user)
            .await?;

        if verify {
            tokio::time::sleep(self.verify_delay).await;
            if !self.is_id_unique(task.id).await {
                return Err(TrackerError::Conflict(format!("id {} was duplicated", task.id)));
            }
        }
        Ok(())
    }

    /// Persist a new task: the fast append first, then a full rewrite from
    /// `cache`. The task is added to `cache` on success.
    pub async fn add_task(&self, task: Task, cache: &mut Vec<Task>, user: &str) -> TrackerResult<SavePath> {
        match self.append_task(&task, user, true).await {
            Ok(()) => {
                info!("Task #{} added (incremental)", task.id);
                cache.push(task);
                return Ok(SavePath::Incremental);
            }
            Err(e) => warn!("Incremental append of task #{} failed: {}. Rewriting the sheet", task.id, e),
        }

        let mut next = cache.clone();
        next.push(task.clone());
        self.save_all(&next).await?;

        let changes: Vec<Change> = REQUIRED_COLUMNS
            .iter()
            .map(|c| Change::new(*c, None, task.field_value(c)))
            .collect();
        let handle = self.handle().await?;
        AuditLog::new(handle.store.as_ref())
            .record(LogAction::Creation, task.id, &changes, user)
            .await?;

        info!("Task #{} added (full rewrite)", task.id);
        *cache = next;
        Ok(SavePath::FullRewrite)
    }

    /// Validate a form, reserve an id and persist the new task
    pub async fn create_task(
        &self,
        draft: TaskDraft,
        cache: &mut Vec<Task>,
        user: &str,
    ) -> TrackerResult<(Task, SavePath)> {
        let today = today();
        draft.validate(today)?;
        let id = self.next_id().await?;
        let task = draft.into_task(id, today);
        let path = self.add_task(task.clone(), cache, user).await?;
        Ok((task, path))
    }

    /// Kanban move: set stage and progress (100% forces the terminal stage),
    /// update the cached copy, then the sheet
    pub async fn move_task(
        &self,
        id: u32,
        status: Stage,
        progress: u8,
        cache: &mut [Task],
        user: &str,
    ) -> TrackerResult<MoveOutcome> {
        let task = cache
            .iter_mut()
            .find(|t| t.id == id)
            .ok_or_else(|| TrackerError::NotFound(format!("Task #{}", id)))?;
        task.set_progress(status, progress);
        let auto_completed = task.status != status;
        let task = task.clone();
        if auto_completed {
            info!("Task #{} completed", id);
        }

        let fields = [
            (TaskField::Status.column(), task.status.label().to_string()),
            (TaskField::Progress.column(), task.progress.to_string()),
        ];
        let path = match self.update_fields(id, &fields, user).await {
            Ok(()) => SavePath::Incremental,
            Err(e) => {
                warn!("Batch update of task #{} failed: {}. Rewriting the sheet", id, e);
                self.save_all(cache).await?;
                SavePath::FullRewrite
            }
        };

        Ok(MoveOutcome {
            task,
            path,
            auto_completed,
        })
    }

    /// Every audit log row
    pub async fn log_entries(&self) -> TrackerResult<Vec<LogEntry>> {
        let handle = self.handle().await?;
        AuditLog::new(handle.store.as_ref()).entries().await
    }
}
