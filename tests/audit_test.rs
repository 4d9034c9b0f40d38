use task_tracker::audit::{AuditLog, Change, LogAction, LogEntry, LogFilter, distinct, now_timestamp};
use task_tracker::config::{LOG_COLUMNS, LOG_SHEET};
use task_tracker::downloader::log_to_csv;
use task_tracker::sheets::memory::Op;
use task_tracker::sheets::MemorySheets;

fn entry(timestamp: &str, action: &str, task_id: &str, field: &str, user: &str) -> LogEntry {
    LogEntry {
        timestamp: timestamp.to_string(),
        action: action.to_string(),
        task_id: task_id.to_string(),
        field: field.to_string(),
        old_value: String::new(),
        new_value: "x".to_string(),
        user: user.to_string(),
    }
}

fn sample() -> Vec<LogEntry> {
    vec![
        entry("2025-11-20T10:00:00.000001", "criacao", "1", "titulo", "Pedro"),
        entry("2025-11-21T09:30:00.000000", "atualizacao", "1", "status", "Israel"),
        entry("garbage", "atualizacao", "2", "progresso", "Pedro"),
        entry("2025-11-22T08:00:00.123456", "atualizacao", "2", "status", "Vinícius"),
    ]
}

#[tokio::test]
async fn test_log_sheet_is_created_with_header() {
    let sheets = MemorySheets::new("Tarefas");
    let log = AuditLog::new(&sheets);

    log.ensure_sheet().await.unwrap();
    log.ensure_sheet().await.unwrap();

    assert_eq!(sheets.calls(Op::AddWorksheet), 1);
    let rows = sheets.snapshot(LOG_SHEET);
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0], LOG_COLUMNS.iter().map(|c| c.to_string()).collect::<Vec<_>>());
}

#[tokio::test]
async fn test_record_writes_one_row_per_change() {
    let sheets = MemorySheets::new("Tarefas");
    let log = AuditLog::new(&sheets);
    let changes = [
        Change::new("status", Some("Backlog/A Fazer".to_string()), Some("Concluído".to_string())),
        Change::created("progresso", "100"),
    ];

    log.record(LogAction::Update, 3, &changes, "Pedro").await.unwrap();

    let entries = log.entries().await.unwrap();
    assert_eq!(entries.len(), 2);
    assert_eq!(entries[0].action, "atualizacao");
    assert_eq!(entries[0].task_id, "3");
    assert_eq!(entries[0].old_value, "Backlog/A Fazer");
    assert_eq!(entries[1].old_value, "");
    assert_eq!(entries[1].new_value, "100");
    assert_eq!(entries[0].timestamp, entries[1].timestamp);
    assert!(entries[0].parsed_timestamp().is_some());
}

#[tokio::test]
async fn test_record_without_changes_writes_nothing() {
    let sheets = MemorySheets::new("Tarefas");
    AuditLog::new(&sheets)
        .record(LogAction::Creation, 1, &[], "Pedro")
        .await
        .unwrap();
    assert_eq!(sheets.calls(Op::AddWorksheet), 0);
}

#[tokio::test]
async fn test_record_falls_back_to_single_appends() {
    let sheets = MemorySheets::new("Tarefas");
    sheets.fail_next(Op::BulkAppend, 1);
    let log = AuditLog::new(&sheets);
    let changes = [Change::created("id", "9"), Change::created("titulo", "Nova")];

    log.record(LogAction::Creation, 9, &changes, "Israel").await.unwrap();

    assert_eq!(sheets.calls(Op::Append), 2);
    let entries = log.entries().await.unwrap();
    assert_eq!(entries.len(), 2);
    assert!(entries.iter().all(|e| e.action == "criacao"));
}

#[test]
fn test_timestamp_format_round_trips() {
    let e = entry(&now_timestamp(), "criacao", "1", "id", "Pedro");
    assert!(e.parsed_timestamp().is_some());
    assert_eq!(e.timestamp.len(), "2025-11-20T10:00:00.000001".len());
}

#[test]
fn test_filter_sorts_newest_first_with_unparsed_last() {
    let sorted = LogFilter::default().apply(sample());
    let stamps: Vec<&str> = sorted.iter().map(|e| e.timestamp.as_str()).collect();
    assert_eq!(
        stamps,
        vec![
            "2025-11-22T08:00:00.123456",
            "2025-11-21T09:30:00.000000",
            "2025-11-20T10:00:00.000001",
            "garbage",
        ]
    );
}

#[test]
fn test_filter_combines_criteria() {
    let filter = LogFilter {
        task_id: Some(" 2 ".to_string()),
        actions: vec!["atualizacao".to_string()],
        users: vec!["Pedro".to_string(), "Vinícius".to_string()],
        fields: Vec::new(),
    };
    let kept = filter.apply(sample());
    assert_eq!(kept.len(), 2);
    assert!(kept.iter().all(|e| e.task_id == "2"));

    let filter = LogFilter {
        fields: vec!["status".to_string()],
        ..LogFilter::default()
    };
    assert_eq!(filter.apply(sample()).len(), 2);
}

#[test]
fn test_distinct_values_are_sorted() {
    let users = distinct(&sample(), |e| &e.user);
    assert_eq!(users, vec!["Israel", "Pedro", "Vinícius"]);
    let actions = distinct(&sample(), |e| &e.action);
    assert_eq!(actions, vec!["atualizacao", "criacao"]);
}

#[test]
fn test_log_csv_has_header_and_rows() {
    let csv = log_to_csv(&sample()[..1]);
    let lines: Vec<&str> = csv.lines().collect();
    assert_eq!(lines[0], "timestamp,acao,task_id,campo,valor_antigo,valor_novo,usuario");
    assert_eq!(lines[1], "2025-11-20T10:00:00.000001,criacao,1,titulo,,x,Pedro");
}
