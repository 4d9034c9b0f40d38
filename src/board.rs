//! Kanban board: filtering and per-stage columns

use chrono::NaiveDate;
use serde::Serialize;

use crate::task::{Priority, Stage, Task, TaskKind};

pub const PROGRESS_STEP: u8 = 10;
/// Cards due within this many days get the alarm icon
pub const DUE_SOON_DAYS: i64 = 3;

/// Multi-select filters; an empty list lets everything through
#[derive(Debug, Clone, Default)]
pub struct BoardFilter {
    pub assignees: Vec<String>,
    pub kinds: Vec<TaskKind>,
    pub priorities: Vec<Priority>,
}

impl BoardFilter {
    pub fn matches(&self, task: &Task) -> bool {
        (self.assignees.is_empty() || self.assignees.contains(&task.assignee))
            && (self.kinds.is_empty() || self.kinds.contains(&task.kind))
            && (self.priorities.is_empty() || self.priorities.contains(&task.priority))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DeadlineColor {
    Red,
    Orange,
    Green,
    Gray,
}

/// Deadline badge of a card
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Deadline {
    pub days_remaining: Option<i64>,
    pub icon: &'static str,
    pub color: DeadlineColor,
    /// Due date as dd/mm/yyyy, empty when undated
    pub display: String,
}

impl Deadline {
    pub fn for_task(task: &Task, today: NaiveDate) -> Self {
        let days = task.days_remaining(today);
        let (icon, color) = match days {
            None => ("📅", DeadlineColor::Gray),
            Some(d) if d < 0 => ("⏰", DeadlineColor::Red),
            Some(d) if d <= DUE_SOON_DAYS => ("⏰", DeadlineColor::Orange),
            Some(_) => ("📅", DeadlineColor::Green),
        };
        Self {
            days_remaining: days,
            icon,
            color,
            display: task
                .due_date
                .map(|d| d.format("%d/%m/%Y").to_string())
                .unwrap_or_default(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct StageOption {
    pub label: &'static str,
    pub selected: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct Card {
    #[serde(flatten)]
    pub task: Task,
    pub kind_short: &'static str,
    pub deadline: Deadline,
    pub stage_options: Vec<StageOption>,
}

#[derive(Debug, Clone, Serialize)]
pub struct BoardColumn {
    pub stage: Stage,
    pub accent: &'static str,
    pub count: usize,
    /// Integer mean of the cards' progress, `None` for an empty column
    pub average_progress: Option<u8>,
    pub cards: Vec<Card>,
}

/// Undated tasks sort after dated ones; the sort is stable
pub fn sort_by_due(tasks: &mut [&Task]) {
    tasks.sort_by_key(|t| (t.due_date.is_none(), t.due_date));
}

/// One column per stage, in workflow order
pub fn build_board(tasks: &[Task], filter: &BoardFilter, today: NaiveDate) -> Vec<BoardColumn> {
    Stage::ALL
        .into_iter()
        .map(|stage| {
            let mut in_stage: Vec<&Task> = tasks
                .iter()
                .filter(|t| t.status == stage && filter.matches(t))
                .collect();
            sort_by_due(&mut in_stage);

            let average_progress = (!in_stage.is_empty()).then(|| {
                let sum: u32 = in_stage.iter().map(|t| t.progress as u32).sum();
                (sum / in_stage.len() as u32) as u8
            });

            let cards = in_stage
                .into_iter()
                .map(|task| Card {
                    task: task.clone(),
                    kind_short: task.kind.short_label(),
                    deadline: Deadline::for_task(task, today),
                    stage_options: Stage::ALL
                        .into_iter()
                        .map(|s| StageOption {
                            label: s.label(),
                            selected: s == task.status,
                        })
                        .collect(),
                })
                .collect::<Vec<_>>();

            BoardColumn {
                stage,
                accent: stage.accent(),
                count: cards.len(),
                average_progress,
                cards,
            }
        })
        .collect()
}
