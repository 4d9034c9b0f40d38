use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

use crate::config::DEVELOPERS;
use crate::error::{TrackerError, TrackerResult};

pub const DATE_FORMAT: &str = "%Y-%m-%d";
pub const MIN_TITLE_LEN: usize = 5;

/// Kanban stage a task sits in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Stage {
    #[serde(rename = "Backlog/A Fazer")]
    Backlog,
    #[serde(rename = "Em Desenvolvimento")]
    InDevelopment,
    #[serde(rename = "Code Review/QA")]
    Review,
    #[serde(rename = "Concluído")]
    Done,
}

impl Stage {
    pub const ALL: [Stage; 4] = [
        Stage::Backlog,
        Stage::InDevelopment,
        Stage::Review,
        Stage::Done,
    ];

    /// Text stored in the `status` column
    pub fn label(self) -> &'static str {
        match self {
            Stage::Backlog => "Backlog/A Fazer",
            Stage::InDevelopment => "Em Desenvolvimento",
            Stage::Review => "Code Review/QA",
            Stage::Done => "Concluído",
        }
    }

    pub fn from_label(label: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|s| s.label() == label.trim())
    }

    /// Board column accent color
    pub fn accent(self) -> &'static str {
        match self {
            Stage::Backlog => "#EAB308",
            Stage::InDevelopment => "#3B82F6",
            Stage::Review => "#EC4899",
            Stage::Done => "#22C55E",
        }
    }

    pub fn is_terminal(self) -> bool {
        self == Stage::Done
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.label())
    }
}

/// Category of work
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum TaskKind {
    #[serde(rename = "Feature (Nova Funcionalidade)")]
    Feature,
    #[serde(rename = "Bugfix (Correção)")]
    Bugfix,
    #[serde(rename = "Refatoração")]
    Refactor,
    #[serde(rename = "Infraestrutura")]
    Infrastructure,
}

impl TaskKind {
    pub const ALL: [TaskKind; 4] = [
        TaskKind::Feature,
        TaskKind::Bugfix,
        TaskKind::Refactor,
        TaskKind::Infrastructure,
    ];

    pub fn label(self) -> &'static str {
        match self {
            TaskKind::Feature => "Feature (Nova Funcionalidade)",
            TaskKind::Bugfix => "Bugfix (Correção)",
            TaskKind::Refactor => "Refatoração",
            TaskKind::Infrastructure => "Infraestrutura",
        }
    }

    /// First word of the label, used on cards
    pub fn short_label(self) -> &'static str {
        self.label().split_whitespace().next().unwrap_or_default()
    }

    pub fn from_label(label: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|k| k.label() == label.trim())
    }
}

impl fmt::Display for TaskKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.label())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Priority {
    #[serde(rename = "🔴 Urgente")]
    Urgent,
    #[serde(rename = "🟡 Alta")]
    High,
    #[serde(rename = "🟢 Média")]
    Medium,
    #[serde(rename = "⚪ Baixa")]
    Low,
}

impl Priority {
    pub const ALL: [Priority; 4] = [
        Priority::Urgent,
        Priority::High,
        Priority::Medium,
        Priority::Low,
    ];

    pub fn label(self) -> &'static str {
        match self {
            Priority::Urgent => "🔴 Urgente",
            Priority::High => "🟡 Alta",
            Priority::Medium => "🟢 Média",
            Priority::Low => "⚪ Baixa",
        }
    }

    pub fn from_label(label: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|p| p.label() == label.trim())
    }

    /// Urgent and high priority tasks are surfaced on the dashboard
    pub fn is_high(self) -> bool {
        matches!(self, Priority::Urgent | Priority::High)
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.label())
    }
}

/// Task columns as they appear in the sheet header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskField {
    Id,
    Title,
    Description,
    Assignee,
    Status,
    Kind,
    Priority,
    DueDate,
    Progress,
    CreatedAt,
}

impl TaskField {
    pub fn column(self) -> &'static str {
        match self {
            TaskField::Id => "id",
            TaskField::Title => "titulo",
            TaskField::Description => "descricao",
            TaskField::Assignee => "responsavel",
            TaskField::Status => "status",
            TaskField::Kind => "tipo",
            TaskField::Priority => "prioridade",
            TaskField::DueDate => "data_entrega",
            TaskField::Progress => "progresso",
            TaskField::CreatedAt => "data_criacao",
        }
    }
}

/// One row of the task sheet
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    pub id: u32,
    pub title: String,
    pub description: String,
    pub assignee: String,
    pub status: Stage,
    pub kind: TaskKind,
    pub priority: Priority,
    pub due_date: Option<NaiveDate>,
    pub progress: u8,
    pub created_at: Option<NaiveDate>,
}

impl Task {
    /// Value of a sheet column, `None` for columns a task does not own
    pub fn field_value(&self, column: &str) -> Option<String> {
        let value = match column {
            "id" => self.id.to_string(),
            "titulo" => self.title.clone(),
            "descricao" => self.description.clone(),
            "responsavel" => self.assignee.clone(),
            "status" => self.status.label().to_string(),
            "tipo" => self.kind.label().to_string(),
            "prioridade" => self.priority.label().to_string(),
            "data_entrega" => format_date(self.due_date),
            "progresso" => self.progress.to_string(),
            "data_criacao" => format_date(self.created_at),
            _ => return None,
        };
        Some(value)
    }

    /// Row laid out in the order of `headers`; unknown headers get an empty cell
    pub fn to_row(&self, headers: &[String]) -> Vec<String> {
        headers
            .iter()
            .map(|h| self.field_value(h).unwrap_or_default())
            .collect()
    }

    /// Parse a header-keyed record, coercing types the lenient way.
    /// Returns `None` when the id is not a number.
    pub fn from_record(record: &HashMap<&str, &str>) -> Option<Task> {
        let get = |column: &str| record.get(column).copied().unwrap_or("").trim();

        let id = parse_id(get("id"))?;
        Some(Task {
            id,
            title: get("titulo").to_string(),
            description: get("descricao").to_string(),
            assignee: get("responsavel").to_string(),
            status: Stage::from_label(get("status")).unwrap_or(Stage::Backlog),
            kind: TaskKind::from_label(get("tipo")).unwrap_or(TaskKind::Feature),
            priority: Priority::from_label(get("prioridade")).unwrap_or(Priority::Medium),
            due_date: parse_date(get("data_entrega")),
            progress: parse_progress(get("progresso")),
            created_at: parse_date(get("data_criacao")),
        })
    }

    /// Days until the due date; `None` when undated
    pub fn days_remaining(&self, today: NaiveDate) -> Option<i64> {
        self.due_date.map(|due| (due - today).num_days())
    }

    pub fn is_done(&self) -> bool {
        self.status.is_terminal()
    }

    pub fn is_overdue(&self, today: NaiveDate) -> bool {
        !self.is_done() && self.due_date.is_some_and(|due| due < today)
    }

    /// Set status and progress together, honouring the completion rule
    pub fn set_progress(&mut self, status: Stage, progress: u8) {
        let progress = progress.min(100);
        self.progress = progress;
        self.status = apply_progress_rule(status, progress);
    }
}

/// A task that reaches 100% is done, whatever stage it was moved to
pub fn apply_progress_rule(status: Stage, progress: u8) -> Stage {
    if progress >= 100 { Stage::Done } else { status }
}

/// Ids are integers, but the sheet may hand back "3.0"
pub fn parse_id(raw: &str) -> Option<u32> {
    let raw = raw.trim();
    if let Ok(id) = raw.parse::<u32>() {
        return Some(id);
    }
    let value = raw.parse::<f64>().ok()?;
    if value.is_finite() && value >= 0.0 && value.fract() == 0.0 && value <= u32::MAX as f64 {
        Some(value as u32)
    } else {
        None
    }
}

/// Progress coerces to 0 when it is not a number and is clamped into 0..=100
pub fn parse_progress(raw: &str) -> u8 {
    match raw.trim().trim_end_matches('%').trim().parse::<f64>() {
        Ok(value) if value.is_finite() => value.round().clamp(0.0, 100.0) as u8,
        _ => 0,
    }
}

/// Accepts ISO dates, ISO datetimes and the dd/mm/yyyy form the sheet
/// renders USER_ENTERED dates in
pub fn parse_date(raw: &str) -> Option<NaiveDate> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }
    let head = raw.get(..10).unwrap_or(raw);
    NaiveDate::parse_from_str(head, DATE_FORMAT)
        .or_else(|_| NaiveDate::parse_from_str(raw, "%d/%m/%Y"))
        .ok()
}

pub fn format_date(date: Option<NaiveDate>) -> String {
    date.map(|d| d.format(DATE_FORMAT).to_string())
        .unwrap_or_default()
}

/// Form input for a new task, before an id is assigned
#[derive(Debug, Clone, Deserialize)]
pub struct TaskDraft {
    pub title: String,
    #[serde(default)]
    pub description: String,
    pub assignee: String,
    pub kind: TaskKind,
    pub priority: Priority,
    pub status: Stage,
    pub due_date: NaiveDate,
}

impl TaskDraft {
    /// Check the form the way the creation page does
    pub fn validate(&self, today: NaiveDate) -> TrackerResult<()> {
        let title = self.title.trim();
        if title.is_empty() {
            return Err(TrackerError::Validation("The task title is required".to_string()));
        }
        if title.chars().count() < MIN_TITLE_LEN {
            return Err(TrackerError::Validation(format!(
                "The title must be at least {} characters long",
                MIN_TITLE_LEN
            )));
        }
        if !DEVELOPERS.contains(&self.assignee.as_str()) {
            return Err(TrackerError::Validation(format!(
                "Unknown developer '{}'",
                self.assignee
            )));
        }
        if self.due_date < today {
            return Err(TrackerError::Validation(
                "The due date cannot be in the past".to_string(),
            ));
        }
        Ok(())
    }

    pub fn into_task(self, id: u32, today: NaiveDate) -> Task {
        Task {
            id,
            title: self.title.trim().to_string(),
            description: self.description.trim().to_string(),
            assignee: self.assignee,
            status: self.status,
            kind: self.kind,
            priority: self.priority,
            due_date: Some(self.due_date),
            progress: 0,
            created_at: Some(today),
        }
    }
}

/// Default dataset written when the sheet is empty or corrupt
pub fn seed_tasks(today: NaiveDate) -> Vec<Task> {
    let rows: [(&str, &str, &str, Stage, TaskKind, Priority, (i32, u32, u32), u8); 5] = [
        (
            "Landing Page Vestibular",
            "Criar página responsiva para captação de alunos",
            "Pedro",
            Stage::Done,
            TaskKind::Feature,
            Priority::Medium,
            (2025, 12, 1),
            100,
        ),
        (
            "Correção Menu Mobile",
            "Ajustar menu collapse no mobile",
            "Israel",
            Stage::InDevelopment,
            TaskKind::Bugfix,
            Priority::Urgent,
            (2025, 11, 25),
            60,
        ),
        (
            "API de Notas",
            "Desenvolver API REST para consulta de notas",
            "Vinícius",
            Stage::Review,
            TaskKind::Feature,
            Priority::High,
            (2025, 11, 30),
            90,
        ),
        (
            "Otimização de SEO",
            "Melhorar ranqueamento no Google",
            "Eduardo",
            Stage::Backlog,
            TaskKind::Refactor,
            Priority::Low,
            (2025, 12, 15),
            0,
        ),
        (
            "Migração de Servidor",
            "Migrar para servidor AWS",
            "Pedro",
            Stage::Backlog,
            TaskKind::Infrastructure,
            Priority::High,
            (2026, 1, 10),
            10,
        ),
    ];

    rows.into_iter()
        .enumerate()
        .map(
            |(i, (title, description, assignee, status, kind, priority, (y, m, d), progress))| Task {
                id: i as u32 + 1,
                title: title.to_string(),
                description: description.to_string(),
                assignee: assignee.to_string(),
                status,
                kind,
                priority,
                due_date: NaiveDate::from_ymd_opt(y, m, d),
                progress,
                created_at: Some(today),
            },
        )
        .collect()
}
