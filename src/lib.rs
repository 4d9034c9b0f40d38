/*!
# Task Tracker

A Kanban task tracker for a small development team, with a Google Sheets
spreadsheet as its only database.

## Overview

Tasks live in the first worksheet of a shared spreadsheet, one row per task,
and every change is appended to a `Logs` worksheet. The web UI shows a
dashboard, a Kanban board, a creation form and the change history. There is
no local database: the spreadsheet is re-read on demand and the task list is
cached in memory between requests.

## Architecture

### Synchronization Layer
- **Connector** - Opens the spreadsheet and keeps the handle for one hour
- **Loader** - Reads and coerces rows, rebuilding sample data when the sheet is unusable
- **Incremental Writer** - Single-cell and batch updates, row appends, full rewrite fallback
- **Id Generator** - Largest id plus one, retried with backoff through rate limits
- **Audit Log** - Append-only rows recording every created or changed field

### Remote API
- Google Sheets v4 and Drive v3 over HTTPS (`reqwest`)
- Service account JWT or a pre-issued bearer token
- An in-memory workbook with the same interface, for tests and offline use

### Presentation Layer
- **Technologies**: Rust, axum, handlebars, plotters
- Dashboard metrics, Kanban columns, history filters
- CSV and XLSX export, PNG charts

## Modules

- **sheets**: `SheetStore` trait, Google Sheets client, in-memory workbook
- **connector**: Cached spreadsheet handle
- **retry**: Exponential backoff with jitter
- **store**: Loader, incremental writer and id generator
- **audit**: Change log worksheet and its filters
- **task**: Task model, labels and coercion rules
- **board**: Kanban columns and card deadlines
- **dashboard**: Metrics, workload and type distribution
- **downloader**: Export functionality (CSV, XLSX)
- **graph**: Chart generation (workload bars, type donut)
- **session**: Acting-user cookie
- **app**: Routing and handlers
- **config**: Settings and constants
- **error**: Error type shared by every module

## Routes

- `/` - Dashboard
- `/kanban` - Board with assignee, type and priority filters; `POST /kanban/{id}` moves a card
- `/tasks/new`, `POST /tasks` - Creation form
- `/history`, `/history.csv` - Audit log and its export
- `/settings` - Connection status, structure check, cache controls
- `/export.csv`, `/export.xlsx` - Task table downloads
- `/charts/workload.png`, `/charts/types.png` - Dashboard charts
- `/api/tasks` - Cached tasks as JSON
*/

pub mod audit;
pub mod board;
pub mod config;
pub mod connector;
pub mod dashboard;
pub mod downloader;
pub mod error;
pub mod retry;
pub mod sheets;
pub mod store;
pub mod task;

#[cfg(feature = "web")]
pub mod app;
#[cfg(feature = "web")]
pub mod graph;
#[cfg(feature = "web")]
pub mod session;

/// Re-export the types most callers need
pub use config::Settings;
pub use connector::Connector;
pub use error::{TrackerError, TrackerResult};
pub use sheets::{MemorySheets, SheetStore};
pub use store::TaskStore;
pub use task::{Priority, Stage, Task, TaskDraft, TaskKind};
