use std::collections::HashMap;
use std::time::Duration;

use chrono::NaiveDate;
use task_tracker::config::{Backend, CredentialSource, Settings, UNKNOWN_USER};
use task_tracker::downloader::{XlsxCell, tasks_to_csv, xlsx_row};
use task_tracker::task::{
    Priority, Stage, Task, TaskDraft, TaskKind, apply_progress_rule, parse_date, parse_id, parse_progress,
    seed_tasks,
};
use task_tracker::TrackerError;

fn day(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

#[test]
fn test_labels_round_trip() {
    for stage in Stage::ALL {
        assert_eq!(Stage::from_label(stage.label()), Some(stage));
    }
    for kind in TaskKind::ALL {
        assert_eq!(TaskKind::from_label(kind.label()), Some(kind));
    }
    for priority in Priority::ALL {
        assert_eq!(Priority::from_label(priority.label()), Some(priority));
    }
    assert_eq!(Stage::from_label("Doing"), None);
    assert_eq!(TaskKind::Bugfix.short_label(), "Bugfix");
    assert!(Priority::Urgent.is_high() && Priority::High.is_high());
    assert!(!Priority::Medium.is_high());
    assert!(Stage::Done.is_terminal());
}

#[test]
fn test_labels_serialize_as_sheet_text() {
    assert_eq!(serde_json::to_string(&Stage::Review).unwrap(), "\"Code Review/QA\"");
    assert_eq!(serde_json::to_string(&Priority::Urgent).unwrap(), "\"🔴 Urgente\"");
    let kind: TaskKind = serde_json::from_str("\"Infraestrutura\"").unwrap();
    assert_eq!(kind, TaskKind::Infrastructure);
}

#[test]
fn test_progress_rule() {
    assert_eq!(apply_progress_rule(Stage::Backlog, 100), Stage::Done);
    assert_eq!(apply_progress_rule(Stage::Review, 90), Stage::Review);

    let mut task = seed_tasks(day(2025, 11, 20)).remove(1);
    task.set_progress(Stage::Review, 150);
    assert_eq!(task.progress, 100);
    assert_eq!(task.status, Stage::Done);
}

#[test]
fn test_parse_id() {
    assert_eq!(parse_id("12"), Some(12));
    assert_eq!(parse_id(" 3.0 "), Some(3));
    assert_eq!(parse_id("3.5"), None);
    assert_eq!(parse_id("-1"), None);
    assert_eq!(parse_id(""), None);
    assert_eq!(parse_id("id"), None);
}

#[test]
fn test_parse_progress() {
    assert_eq!(parse_progress("45"), 45);
    assert_eq!(parse_progress("45%"), 45);
    assert_eq!(parse_progress("99.6"), 100);
    assert_eq!(parse_progress("-20"), 0);
    assert_eq!(parse_progress("300"), 100);
    assert_eq!(parse_progress("lots"), 0);
}

#[test]
fn test_parse_date() {
    assert_eq!(parse_date("2025-12-01"), Some(day(2025, 12, 1)));
    assert_eq!(parse_date("2025-12-01T00:00:00"), Some(day(2025, 12, 1)));
    assert_eq!(parse_date("01/12/2025"), Some(day(2025, 12, 1)));
    assert_eq!(parse_date(""), None);
    assert_eq!(parse_date("soon"), None);
}

#[test]
fn test_from_record_defaults_unknown_labels() {
    let record: HashMap<&str, &str> = [
        ("id", "4"),
        ("titulo", " Title "),
        ("status", "???"),
        ("tipo", "Other"),
        ("prioridade", ""),
    ]
    .into_iter()
    .collect();
    let task = Task::from_record(&record).unwrap();
    assert_eq!(task.title, "Title");
    assert_eq!(task.status, Stage::Backlog);
    assert_eq!(task.kind, TaskKind::Feature);
    assert_eq!(task.priority, Priority::Medium);
    assert_eq!(task.progress, 0);
    assert_eq!(task.due_date, None);

    let no_id: HashMap<&str, &str> = [("titulo", "x")].into_iter().collect();
    assert!(Task::from_record(&no_id).is_none());
}

#[test]
fn test_to_row_follows_header_order() {
    let task = seed_tasks(day(2025, 11, 20)).remove(0);
    let header = vec!["progresso".to_string(), "id".to_string(), "extra".to_string()];
    assert_eq!(task.to_row(&header), vec!["100", "1", ""]);
    assert_eq!(task.field_value("data_entrega").as_deref(), Some("2025-12-01"));
    assert_eq!(task.field_value("extra"), None);
}

fn draft() -> TaskDraft {
    TaskDraft {
        title: "Nova tela".to_string(),
        description: String::new(),
        assignee: "Pedro".to_string(),
        kind: TaskKind::Feature,
        priority: Priority::Low,
        status: Stage::InDevelopment,
        due_date: day(2025, 11, 20),
    }
}

#[test]
fn test_draft_validation() {
    let today = day(2025, 11, 20);
    assert!(draft().validate(today).is_ok());

    let mut blank = draft();
    blank.title = "   ".to_string();
    assert!(matches!(blank.validate(today), Err(TrackerError::Validation(m)) if m.contains("required")));

    let mut short = draft();
    short.title = " abcd ".to_string();
    assert!(short.validate(today).is_err());

    let mut stranger = draft();
    stranger.assignee = "Ana".to_string();
    assert!(stranger.validate(today).is_err());

    let mut late = draft();
    late.due_date = day(2025, 11, 19);
    assert!(late.validate(today).is_err());
}

#[test]
fn test_draft_deserializes_from_form_labels() {
    let json = r#"{
        "title": "Nova tela",
        "assignee": "Israel",
        "kind": "Bugfix (Correção)",
        "priority": "🟡 Alta",
        "status": "Backlog/A Fazer",
        "due_date": "2025-12-24"
    }"#;
    let draft: TaskDraft = serde_json::from_str(json).unwrap();
    assert_eq!(draft.kind, TaskKind::Bugfix);
    assert_eq!(draft.priority, Priority::High);
    assert_eq!(draft.description, "");

    let task = draft.into_task(9, day(2025, 11, 20));
    assert_eq!(task.id, 9);
    assert_eq!(task.progress, 0);
    assert_eq!(task.created_at, Some(day(2025, 11, 20)));
}

#[test]
fn test_csv_export_quotes_special_values() {
    let mut tasks = seed_tasks(day(2025, 11, 20));
    tasks.truncate(1);
    tasks[0].description = "Uses \"quotes\", commas\nand lines".to_string();

    let csv = tasks_to_csv(&tasks);
    let header = csv.lines().next().unwrap();
    assert_eq!(
        header,
        "id,titulo,descricao,responsavel,status,tipo,prioridade,data_entrega,progresso,data_criacao"
    );
    assert!(csv.contains("\"Uses \"\"quotes\"\", commas\nand lines\""));
    assert!(csv.ends_with("2025-11-20\n"));
}

#[test]
fn test_xlsx_keeps_id_and_progress_numeric() {
    let task = seed_tasks(day(2025, 11, 20)).remove(1);
    let cells = xlsx_row(&task);
    assert_eq!(cells.len(), 10);
    assert_eq!(cells[0], XlsxCell::Number(2.0));
    assert_eq!(cells[1], XlsxCell::Text(task.title.clone()));
    assert_eq!(cells[8], XlsxCell::Number(task.progress as f64));
    assert_eq!(cells[7], XlsxCell::Text("2025-11-25".to_string()));
}

#[cfg(feature = "web")]
#[test]
fn test_xlsx_export_is_a_zip_workbook() {
    let bytes = task_tracker::downloader::tasks_to_xlsx(&seed_tasks(day(2025, 11, 20))).unwrap();
    assert!(bytes.starts_with(b"PK"));
    assert!(task_tracker::downloader::tasks_to_xlsx(&[]).unwrap().starts_with(b"PK"));
}

fn lookup(pairs: &'static [(&'static str, &'static str)]) -> impl Fn(&str) -> Option<String> {
    move |key: &str| {
        pairs
            .iter()
            .find(|(k, _)| *k == key)
            .map(|(_, v)| v.to_string())
    }
}

#[test]
fn test_settings_defaults() {
    let settings = Settings::from_lookup(|_| None).unwrap();
    assert_eq!(settings.bind, "127.0.0.1:3000");
    assert_eq!(settings.backend, Backend::Google);
    assert_eq!(settings.spreadsheet_name, "Tasks Devs");
    assert_eq!(settings.verify_delay, Duration::from_millis(500));
    assert_eq!(settings.acting_user(), UNKNOWN_USER);
}

#[test]
fn test_settings_from_lookup() {
    let settings = Settings::from_lookup(lookup(&[
        ("TRACKER_BACKEND", "Memory"),
        ("TRACKER_SPREADSHEET_ID", "abc123"),
        ("TRACKER_SPREADSHEET_NAME", ""),
        ("TRACKER_VERIFY_DELAY_MS", "0"),
        ("USER", "pedro"),
    ]))
    .unwrap();
    assert_eq!(settings.backend, Backend::Memory);
    assert_eq!(settings.spreadsheet_id.as_deref(), Some("abc123"));
    assert_eq!(settings.spreadsheet_name, "Tasks Devs");
    assert_eq!(settings.verify_delay, Duration::ZERO);
    assert_eq!(settings.acting_user(), "pedro");
}

#[test]
fn test_settings_reject_bad_values() {
    let err = Settings::from_lookup(lookup(&[("TRACKER_BACKEND", "excel")])).unwrap_err();
    assert!(matches!(err, TrackerError::Config(_)));
    let err = Settings::from_lookup(lookup(&[("TRACKER_VERIFY_DELAY_MS", "fast")])).unwrap_err();
    assert!(matches!(err, TrackerError::Config(_)));
}

#[test]
fn test_credential_source_order() {
    let settings = Settings::from_lookup(lookup(&[
        ("TRACKER_SERVICE_ACCOUNT_JSON", "{}"),
        ("TRACKER_ACCESS_TOKEN", "tok"),
        ("TRACKER_CREDENTIALS", "/definitely/missing.json"),
    ]))
    .unwrap();
    assert_eq!(settings.credential_source().unwrap(), CredentialSource::Inline("{}".to_string()));

    let settings = Settings::from_lookup(lookup(&[
        ("TRACKER_ACCESS_TOKEN", "tok"),
        ("TRACKER_CREDENTIALS", "/definitely/missing.json"),
    ]))
    .unwrap();
    assert_eq!(settings.credential_source().unwrap(), CredentialSource::AccessToken("tok".to_string()));

    let settings = Settings::from_lookup(lookup(&[("TRACKER_CREDENTIALS", "/definitely/missing.json")])).unwrap();
    assert!(matches!(settings.credential_source(), Err(TrackerError::Config(_))));
}

#[test]
fn test_credentials_file_is_used_when_present() {
    let file = tempfile::NamedTempFile::new().unwrap();
    let settings = Settings {
        credentials_file: file.path().to_path_buf(),
        access_token: Some("tok".to_string()),
        ..Settings::default()
    };
    assert_eq!(
        settings.credential_source().unwrap(),
        CredentialSource::File(file.path().to_path_buf())
    );
}
