use std::sync::Arc;
use std::time::Duration;

use chrono::NaiveDate;
use task_tracker::config::{LOG_SHEET, REQUIRED_COLUMNS};
use task_tracker::connector::Connector;
use task_tracker::retry::RetryPolicy;
use task_tracker::sheets::MemorySheets;
use task_tracker::sheets::memory::Op;
use task_tracker::store::{ResetReason, SavePath, TaskStore, today, validate_structure};
use task_tracker::task::{Priority, Stage, Task, TaskDraft, TaskKind, seed_tasks};
use task_tracker::TrackerError;

const SHEET: &str = "Tarefas";

fn header() -> Vec<String> {
    REQUIRED_COLUMNS.iter().map(|c| c.to_string()).collect()
}

fn seeded_rows() -> Vec<Vec<String>> {
    let header = header();
    let date = NaiveDate::from_ymd_opt(2025, 11, 1).unwrap();
    let mut rows = vec![header.clone()];
    rows.extend(seed_tasks(date).iter().map(|t| t.to_row(&header)));
    rows
}

fn fixture(rows: Vec<Vec<String>>) -> (Arc<MemorySheets>, TaskStore) {
    let sheets = Arc::new(MemorySheets::with_rows(SHEET, rows));
    let store = TaskStore::new(Connector::with_store(sheets.clone()))
        .with_retry(RetryPolicy::immediate(5))
        .with_verify_delay(Duration::ZERO);
    (sheets, store)
}

fn row(values: &[&str]) -> Vec<String> {
    values.iter().map(|v| v.to_string()).collect()
}

fn draft(title: &str) -> TaskDraft {
    TaskDraft {
        title: title.to_string(),
        description: "  Some details  ".to_string(),
        assignee: "Israel".to_string(),
        kind: TaskKind::Bugfix,
        priority: Priority::High,
        status: Stage::Backlog,
        due_date: today() + chrono::Duration::days(3),
    }
}

fn log_rows(sheets: &MemorySheets) -> Vec<Vec<String>> {
    sheets.snapshot(LOG_SHEET).into_iter().skip(1).collect()
}

#[test]
fn test_validate_structure_reports_missing_columns() {
    let (ok, missing) = validate_structure(&header());
    assert!(ok);
    assert!(missing.is_empty());

    let partial = row(&["id", "titulo", "status"]);
    let (ok, missing) = validate_structure(&partial);
    assert!(!ok);
    assert!(missing.contains(&"progresso".to_string()));
    assert!(!missing.contains(&"titulo".to_string()));
}

#[tokio::test]
async fn test_load_parses_and_coerces_rows() {
    let mut rows = vec![header()];
    rows.push(row(&[
        "7", "Fix login", "", "Pedro", "Unknown stage", "Bugfix (Correção)", "🔴 Urgente", "2025-12-01", "250", "2025-11-01",
    ]));
    rows.push(row(&[
        "8.0", "Docs", "", "Israel", "Concluído", "Refatoração", "⚪ Baixa", "not a date", "abc", "",
    ]));
    rows.push(row(&["x", "Dropped", "", "Pedro", "", "", "", "", "", ""]));
    let (_, store) = fixture(rows);

    let outcome = store.load_tasks().await.unwrap();
    assert!(outcome.reset.is_none());
    assert_eq!(outcome.tasks.len(), 2);

    let first = &outcome.tasks[0];
    assert_eq!(first.id, 7);
    assert_eq!(first.status, Stage::Backlog);
    assert_eq!(first.progress, 100);
    assert_eq!(first.due_date, NaiveDate::from_ymd_opt(2025, 12, 1));

    let second = &outcome.tasks[1];
    assert_eq!(second.id, 8);
    assert_eq!(second.progress, 0);
    assert_eq!(second.due_date, None);
    assert_eq!(second.status, Stage::Done);
}

#[tokio::test]
async fn test_load_reseeds_empty_sheet() {
    let (sheets, store) = fixture(Vec::new());
    let outcome = store.load_tasks().await.unwrap();

    assert_eq!(outcome.reset, Some(ResetReason::Empty));
    assert_eq!(outcome.tasks.len(), 5);
    let written = sheets.snapshot(SHEET);
    assert_eq!(written[0], header());
    assert_eq!(written.len(), 6);
}

#[tokio::test]
async fn test_load_reseeds_header_only_sheet() {
    let (_, store) = fixture(vec![header()]);
    let outcome = store.load_tasks().await.unwrap();
    assert_eq!(outcome.reset, Some(ResetReason::Empty));
}

#[tokio::test]
async fn test_load_reseeds_when_columns_are_missing() {
    let rows = vec![row(&["id", "titulo"]), row(&["1", "Anything"])];
    let (sheets, store) = fixture(rows);

    let outcome = store.load_tasks().await.unwrap();
    match outcome.reset {
        Some(ResetReason::MissingColumns(missing)) => assert!(missing.contains(&"status".to_string())),
        other => panic!("unexpected reset: {:?}", other),
    }
    assert_eq!(sheets.snapshot(SHEET)[0], header());
}

#[tokio::test]
async fn test_load_reseeds_when_no_id_is_numeric() {
    let mut rows = vec![header()];
    rows.push(row(&["abc", "Broken row", "", "", "", "", "", "", "", ""]));
    let (_, store) = fixture(rows);

    let outcome = store.load_tasks().await.unwrap();
    assert_eq!(outcome.reset, Some(ResetReason::Corrupt));
    assert_eq!(outcome.tasks.len(), 5);
}

#[tokio::test]
async fn test_load_reseeds_after_read_failure() {
    let (sheets, store) = fixture(seeded_rows());
    // Connect first so the injected failure hits the value read
    store.connector().handle().await.unwrap();
    sheets.fail_next(Op::Read, 1);

    let outcome = store.load_tasks().await.unwrap();
    assert!(matches!(outcome.reset, Some(ResetReason::ReadFailed(_))));
}

#[tokio::test]
async fn test_next_id_is_max_plus_one() {
    let mut rows = seeded_rows();
    rows.push(row(&["42", "Late", "", "Pedro", "", "", "", "", "", ""]));
    rows.push(row(&["n/a", "Junk", "", "Pedro", "", "", "", "", "", ""]));
    let (_, store) = fixture(rows);

    assert_eq!(store.next_id().await.unwrap(), 43);
}

#[tokio::test]
async fn test_next_id_on_empty_sheet_is_one() {
    let (_, store) = fixture(vec![header()]);
    assert_eq!(store.next_id().await.unwrap(), 1);
}

#[tokio::test]
async fn test_next_id_retries_through_rate_limits() {
    let (sheets, store) = fixture(seeded_rows());
    sheets.rate_limit_next(3);

    assert_eq!(store.next_id().await.unwrap(), 6);
    assert!(sheets.calls(Op::Read) >= 4);
}

#[tokio::test]
async fn test_next_id_gives_up_after_max_attempts() {
    let sheets = Arc::new(MemorySheets::with_rows(SHEET, seeded_rows()));
    let store = TaskStore::new(Connector::with_store(sheets.clone())).with_retry(RetryPolicy::immediate(3));
    sheets.rate_limit_next(10);

    let err = store.next_id().await.unwrap_err();
    assert!(err.is_rate_limit());
    assert_eq!(sheets.calls(Op::Read), 3);
}

#[tokio::test]
async fn test_is_id_unique_counts_the_id_column() {
    let mut rows = seeded_rows();
    rows.push(row(&["3", "Same id", "", "Pedro", "", "", "", "", "", ""]));
    let (_, store) = fixture(rows);

    assert!(store.is_id_unique(1).await);
    assert!(!store.is_id_unique(3).await);
    assert!(store.is_id_unique(99).await);
}

#[tokio::test]
async fn test_is_id_unique_treats_failed_check_as_unique() {
    let (sheets, store) = fixture(seeded_rows());
    sheets.rate_limit_next(5);
    assert!(store.is_id_unique(1).await);
}

#[tokio::test]
async fn test_update_field_writes_one_cell_and_logs() {
    let (sheets, store) = fixture(seeded_rows());

    store.update_field(2, "progresso", "80", "Israel").await.unwrap();

    let rows = sheets.snapshot(SHEET);
    assert_eq!(rows[2][8], "80");
    assert_eq!(sheets.calls(Op::UpdateCell), 1);

    let logs = log_rows(&sheets);
    assert_eq!(logs.len(), 1);
    assert_eq!(&logs[0][1..], &row(&["atualizacao", "2", "progresso", "60", "80", "Israel"])[..]);
}

#[tokio::test]
async fn test_update_field_rejects_unknown_field_and_id() {
    let (sheets, store) = fixture(seeded_rows());

    let err = store.update_field(2, "cor", "azul", "Pedro").await.unwrap_err();
    assert!(matches!(err, TrackerError::UnknownField(f) if f == "cor"));

    let err = store.update_field(99, "progresso", "10", "Pedro").await.unwrap_err();
    assert!(matches!(err, TrackerError::NotFound(_)));

    assert_eq!(sheets.calls(Op::UpdateCell), 0);
    assert!(log_rows(&sheets).is_empty());
}

#[tokio::test]
async fn test_update_field_matches_id_column_only() {
    let mut rows = vec![header()];
    // Task 10 has "4" in its progress column; task 4 must still be found by id
    rows.push(row(&["10", "Ten", "", "Pedro", "Backlog/A Fazer", "", "", "", "4", ""]));
    rows.push(row(&["4", "Four", "", "Pedro", "Backlog/A Fazer", "", "", "", "0", ""]));
    let (sheets, store) = fixture(rows);

    store.update_field(4, "titulo", "Four updated", "Pedro").await.unwrap();

    let rows = sheets.snapshot(SHEET);
    assert_eq!(rows[1][1], "Ten");
    assert_eq!(rows[2][1], "Four updated");
}

#[tokio::test]
async fn test_update_fields_batches_and_skips_unknown() {
    let (sheets, store) = fixture(seeded_rows());
    let fields = [
        ("status", "Code Review/QA".to_string()),
        ("progresso", "70".to_string()),
        ("nope", "x".to_string()),
    ];

    store.update_fields(4, &fields, "Eduardo").await.unwrap();

    let rows = sheets.snapshot(SHEET);
    assert_eq!(rows[4][4], "Code Review/QA");
    assert_eq!(rows[4][8], "70");
    assert_eq!(sheets.calls(Op::BatchUpdate), 1);

    let logs = log_rows(&sheets);
    assert_eq!(logs.len(), 2);
    assert_eq!(logs[0][3], "status");
    assert_eq!(logs[0][4], "Backlog/A Fazer");
    assert_eq!(logs[1][3], "progresso");
    assert_eq!(logs[1][5], "70");
    assert_eq!(logs[0][0], logs[1][0]);
}

#[tokio::test]
async fn test_append_task_logs_every_column() {
    let (sheets, store) = fixture(seeded_rows());
    let task = draft("Novo relatório").into_task(6, today());

    store.append_task(&task, "Israel", true).await.unwrap();

    let rows = sheets.snapshot(SHEET);
    assert_eq!(rows.len(), 7);
    assert_eq!(rows[6][0], "6");
    assert_eq!(rows[6][2], "Some details");

    let logs = log_rows(&sheets);
    assert_eq!(logs.len(), REQUIRED_COLUMNS.len());
    assert!(logs.iter().all(|l| l[1] == "criacao" && l[2] == "6" && l[4].is_empty()));
}

#[tokio::test]
async fn test_append_task_without_header_fails() {
    let (_, store) = fixture(Vec::new());
    let task = draft("Novo relatório").into_task(1, today());
    let err = store.append_task(&task, "Israel", false).await.unwrap_err();
    assert!(matches!(err, TrackerError::MissingHeaders));
}

#[tokio::test]
async fn test_append_task_detects_concurrent_duplicate() {
    let (sheets, store) = fixture(seeded_rows());
    sheets.echo_next_appends(1);
    let task = draft("Novo relatório").into_task(6, today());

    let err = store.append_task(&task, "Israel", true).await.unwrap_err();
    assert!(matches!(err, TrackerError::Conflict(_)));
}

#[tokio::test]
async fn test_add_task_incremental_path() {
    let (sheets, store) = fixture(seeded_rows());
    let mut cache = store.load_tasks().await.unwrap().tasks;
    let task = draft("Novo relatório").into_task(6, today());

    let path = store.add_task(task, &mut cache, "Israel").await.unwrap();

    assert_eq!(path, SavePath::Incremental);
    assert_eq!(cache.len(), 6);
    assert_eq!(cache.iter().filter(|t| t.id == 6).count(), 1);
    assert_eq!(sheets.calls(Op::Clear), 0);
}

#[tokio::test]
async fn test_add_task_falls_back_to_full_rewrite() {
    let (sheets, store) = fixture(seeded_rows());
    let mut cache = store.load_tasks().await.unwrap().tasks;
    sheets.fail_next(Op::Append, 1);
    let task = draft("Novo relatório").into_task(6, today());

    let path = store.add_task(task, &mut cache, "Israel").await.unwrap();

    assert_eq!(path, SavePath::FullRewrite);
    assert_eq!(cache.len(), 6);
    let rows = sheets.snapshot(SHEET);
    assert_eq!(rows.len(), 7);
    assert_eq!(rows[6][1], "Novo relatório");
    assert!(log_rows(&sheets).iter().any(|l| l[1] == "criacao" && l[2] == "6"));
}

#[tokio::test]
async fn test_add_task_rewrite_removes_duplicate_row() {
    let (sheets, store) = fixture(seeded_rows());
    let mut cache = store.load_tasks().await.unwrap().tasks;
    sheets.echo_next_appends(1);
    let task = draft("Novo relatório").into_task(6, today());

    let path = store.add_task(task, &mut cache, "Israel").await.unwrap();

    assert_eq!(path, SavePath::FullRewrite);
    let ids: Vec<String> = sheets.snapshot(SHEET).iter().skip(1).map(|r| r[0].clone()).collect();
    assert_eq!(ids, row(&["1", "2", "3", "4", "5", "6"]));
}

#[tokio::test]
async fn test_create_task_validates_before_writing() {
    let (sheets, store) = fixture(seeded_rows());
    let mut cache = store.load_tasks().await.unwrap().tasks;

    let err = store.create_task(draft("Tiny"), &mut cache, "Pedro").await.unwrap_err();
    assert!(matches!(err, TrackerError::Validation(_)));

    let mut past = draft("Past due task");
    past.due_date = today() - chrono::Duration::days(1);
    let err = store.create_task(past, &mut cache, "Pedro").await.unwrap_err();
    assert!(matches!(err, TrackerError::Validation(_)));

    assert_eq!(sheets.calls(Op::Append), 0);
    assert_eq!(cache.len(), 5);
}

#[tokio::test]
async fn test_create_task_assigns_next_id() {
    let (_, store) = fixture(seeded_rows());
    let mut cache = store.load_tasks().await.unwrap().tasks;

    let (task, path) = store
        .create_task(draft("  Painel de métricas "), &mut cache, "Pedro")
        .await
        .unwrap();

    assert_eq!(task.id, 6);
    assert_eq!(task.title, "Painel de métricas");
    assert_eq!(task.progress, 0);
    assert_eq!(task.created_at, Some(today()));
    assert_eq!(path, SavePath::Incremental);
}

#[tokio::test]
async fn test_move_task_to_full_progress_completes() {
    let (sheets, store) = fixture(seeded_rows());
    let mut cache = store.load_tasks().await.unwrap().tasks;

    let outcome = store
        .move_task(2, Stage::InDevelopment, 100, &mut cache, "Israel")
        .await
        .unwrap();

    assert!(outcome.auto_completed);
    assert_eq!(outcome.task.status, Stage::Done);
    assert_eq!(outcome.path, SavePath::Incremental);
    let cached: &Task = cache.iter().find(|t| t.id == 2).unwrap();
    assert_eq!(cached.status, Stage::Done);
    assert_eq!(sheets.snapshot(SHEET)[2][4], "Concluído");
}

#[tokio::test]
async fn test_move_task_falls_back_to_full_rewrite() {
    let (sheets, store) = fixture(seeded_rows());
    let mut cache = store.load_tasks().await.unwrap().tasks;
    sheets.fail_next(Op::BatchUpdate, 1);

    let outcome = store
        .move_task(4, Stage::Review, 50, &mut cache, "Eduardo")
        .await
        .unwrap();

    assert_eq!(outcome.path, SavePath::FullRewrite);
    assert!(!outcome.auto_completed);
    let rows = sheets.snapshot(SHEET);
    assert_eq!(rows[4][4], "Code Review/QA");
    assert_eq!(rows[4][8], "50");
}

#[tokio::test]
async fn test_move_unknown_task_is_not_found() {
    let (_, store) = fixture(seeded_rows());
    let mut cache = store.load_tasks().await.unwrap().tasks;
    let err = store
        .move_task(77, Stage::Review, 50, &mut cache, "Eduardo")
        .await
        .unwrap_err();
    assert!(matches!(err, TrackerError::NotFound(_)));
}
