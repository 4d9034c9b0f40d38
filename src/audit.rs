//! Append-only change log kept in its own worksheet

use chrono::{Local, NaiveDateTime};
use log::{debug, warn};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};

use crate::config::{LOG_COLUMNS, LOG_SHEET};
use crate::error::TrackerResult;
use crate::sheets::{SheetStore, record};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LogAction {
    #[serde(rename = "criacao")]
    Creation,
    #[serde(rename = "atualizacao")]
    Update,
}

impl LogAction {
    pub fn label(self) -> &'static str {
        match self {
            LogAction::Creation => "criacao",
            LogAction::Update => "atualizacao",
        }
    }
}

/// One field going from `old` to `new`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Change {
    pub field: String,
    pub old: Option<String>,
    pub new: Option<String>,
}

impl Change {
    pub fn new(field: impl Into<String>, old: Option<String>, new: Option<String>) -> Self {
        Self {
            field: field.into(),
            old,
            new,
        }
    }

    /// A field set for the first time, as on creation
    pub fn created(field: impl Into<String>, new: impl Into<String>) -> Self {
        Self::new(field, None, Some(new.into()))
    }
}

/// A row of the log worksheet
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LogEntry {
    pub timestamp: String,
    pub action: String,
    pub task_id: String,
    pub field: String,
    pub old_value: String,
    pub new_value: String,
    pub user: String,
}

impl LogEntry {
    fn from_record(record: &HashMap<&str, &str>) -> Self {
        let get = |column: &str| record.get(column).copied().unwrap_or("").to_string();
        Self {
            timestamp: get("timestamp"),
            action: get("acao"),
            task_id: get("task_id"),
            field: get("campo"),
            old_value: get("valor_antigo"),
            new_value: get("valor_novo"),
            user: get("usuario"),
        }
    }

    pub fn to_row(&self) -> Vec<String> {
        vec![
            self.timestamp.clone(),
            self.action.clone(),
            self.task_id.clone(),
            self.field.clone(),
            self.old_value.clone(),
            self.new_value.clone(),
            self.user.clone(),
        ]
    }

    /// Parsed timestamp; `None` when the cell is not an ISO datetime
    pub fn parsed_timestamp(&self) -> Option<NaiveDateTime> {
        let raw = self.timestamp.trim();
        NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f")
            .or_else(|_| NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S%.f"))
            .ok()
    }
}

/// Local time in the log's ISO format, microsecond precision
pub fn now_timestamp() -> String {
    Local::now()
        .naive_local()
        .format("%Y-%m-%dT%H:%M:%S%.6f")
        .to_string()
}

/// Writer and reader for the `Logs` worksheet
pub struct AuditLog<'a> {
    store: &'a dyn SheetStore,
}

impl<'a> AuditLog<'a> {
    pub fn new(store: &'a dyn SheetStore) -> Self {
        Self { store }
    }

    /// Create the log worksheet with its header when it does not exist yet
    pub async fn ensure_sheet(&self) -> TrackerResult<()> {
        let titles = self.store.worksheet_titles().await?;
        if titles.iter().any(|t| t == LOG_SHEET) {
            return Ok(());
        }
        self.store
            .add_worksheet(LOG_SHEET, 1, LOG_COLUMNS.len() as u32)
            .await?;
        let header = vec![LOG_COLUMNS.iter().map(|c| c.to_string()).collect()];
        self.store.update(LOG_SHEET, &header).await
    }

    /// Append one row per change, all sharing the same timestamp.
    /// Falls back to appending row by row when the bulk append fails.
    pub async fn record(
        &self,
        action: LogAction,
        task_id: u32,
        changes: &[Change],
        user: &str,
    ) -> TrackerResult<()> {
        if changes.is_empty() {
            return Ok(());
        }
        self.ensure_sheet().await?;

        let timestamp = now_timestamp();
        let rows: Vec<Vec<String>> = changes
            .iter()
            .map(|change| {
                LogEntry {
                    timestamp: timestamp.clone(),
                    action: action.label().to_string(),
                    task_id: task_id.to_string(),
                    field: change.field.clone(),
                    old_value: change.old.clone().unwrap_or_default(),
                    new_value: change.new.clone().unwrap_or_default(),
                    user: user.to_string(),
                }
                .to_row()
            })
            .collect();

        if let Err(e) = self.store.append_rows(LOG_SHEET, &rows).await {
            warn!("Bulk log append failed ({}), appending one row at a time", e);
            for row in &rows {
                self.store.append_row(LOG_SHEET, row).await?;
            }
        }
        debug!(
            "Logged {} change(s) of task {} ({})",
            rows.len(),
            task_id,
            action.label()
        );
        Ok(())
    }

    /// Every log row, keyed by the header row
    pub async fn entries(&self) -> TrackerResult<Vec<LogEntry>> {
        self.ensure_sheet().await?;
        let rows = self.store.get_values(LOG_SHEET).await?;
        let Some((header, body)) = rows.split_first() else {
            return Ok(Vec::new());
        };
        Ok(body
            .iter()
            .filter(|row| row.iter().any(|v| !v.is_empty()))
            .map(|row| LogEntry::from_record(&record(header, row)))
            .collect())
    }
}

/// History page filters; empty fields do not constrain
#[derive(Debug, Clone, Default)]
pub struct LogFilter {
    pub task_id: Option<String>,
    pub actions: Vec<String>,
    pub users: Vec<String>,
    pub fields: Vec<String>,
}

impl LogFilter {
    pub fn matches(&self, entry: &LogEntry) -> bool {
        let id_ok = match self.task_id.as_deref().map(str::trim) {
            Some(id) if !id.is_empty() => entry.task_id.trim() == id,
            _ => true,
        };
        let in_set = |set: &[String], value: &str| set.is_empty() || set.iter().any(|s| s == value);
        id_ok
            && in_set(&self.actions, &entry.action)
            && in_set(&self.users, &entry.user)
            && in_set(&self.fields, &entry.field)
    }

    /// Matching entries, newest first; rows without a readable timestamp go last
    pub fn apply(&self, entries: Vec<LogEntry>) -> Vec<LogEntry> {
        let mut kept: Vec<LogEntry> = entries.into_iter().filter(|e| self.matches(e)).collect();
        kept.sort_by(|a, b| match (a.parsed_timestamp(), b.parsed_timestamp()) {
            (Some(x), Some(y)) => y.cmp(&x),
            (Some(_), None) => std::cmp::Ordering::Less,
            (None, Some(_)) => std::cmp::Ordering::Greater,
            (None, None) => std::cmp::Ordering::Equal,
        });
        kept
    }
}

/// Sorted distinct non-empty values of one column, for the filter pickers
pub fn distinct<F>(entries: &[LogEntry], column: F) -> Vec<String>
where
    F: Fn(&LogEntry) -> &str,
{
    entries
        .iter()
        .map(|e| column(e))
        .filter(|v| !v.is_empty())
        .map(str::to_string)
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}
