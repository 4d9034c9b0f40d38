use chrono::{Duration, NaiveDate};
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};

use crate::board::sort_by_due;
use crate::config::DEVELOPERS;
use crate::task::{Stage, Task, TaskKind};

/// Window of the "upcoming deliveries" list, in days
pub const UPCOMING_DAYS: i64 = 15;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Metrics {
    pub total: usize,
    pub done: usize,
    /// Completion rate formatted for display, e.g. `40.0%`
    pub completion_rate: String,
    pub in_progress: usize,
    pub overdue: usize,
    /// Tasks not in the terminal stage
    pub active: usize,
}

pub fn metrics(tasks: &[Task], today: NaiveDate) -> Metrics {
    let total = tasks.len();
    let done = tasks.iter().filter(|t| t.is_done()).count();
    let completion_rate = if total > 0 {
        format!("{:.1}%", done as f64 / total as f64 * 100.0)
    } else {
        "0%".to_string()
    };
    Metrics {
        total,
        done,
        completion_rate,
        in_progress: tasks.iter().filter(|t| t.status == Stage::InDevelopment).count(),
        overdue: tasks.iter().filter(|t| t.is_overdue(today)).count(),
        active: total - done,
    }
}

/// Open urgent and high priority tasks, soonest first
pub fn high_priority(tasks: &[Task]) -> Vec<&Task> {
    let mut open: Vec<&Task> = tasks
        .iter()
        .filter(|t| t.priority.is_high() && !t.is_done())
        .collect();
    sort_by_due(&mut open);
    open
}

/// Open tasks due between today and today + 15 days, soonest first
pub fn upcoming(tasks: &[Task], today: NaiveDate) -> Vec<&Task> {
    let horizon = today + Duration::days(UPCOMING_DAYS);
    let mut soon: Vec<&Task> = tasks
        .iter()
        .filter(|t| !t.is_done())
        .filter(|t| t.due_date.is_some_and(|d| d >= today && d <= horizon))
        .collect();
    sort_by_due(&mut soon);
    soon
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Workload {
    pub assignee: String,
    /// Task counts in `Stage::ALL` order
    pub per_stage: [usize; 4],
}

impl Workload {
    pub fn total(&self) -> usize {
        self.per_stage.iter().sum()
    }
}

/// Tasks per assignee and stage; roster members first, then anyone else
/// found in the sheet, alphabetically
pub fn workload(tasks: &[Task]) -> Vec<Workload> {
    let mut counts: BTreeMap<&str, [usize; 4]> = BTreeMap::new();
    for task in tasks {
        let slot = Stage::ALL.iter().position(|s| *s == task.status).unwrap_or(0);
        counts.entry(task.assignee.as_str()).or_default()[slot] += 1;
    }

    let mut rows: Vec<Workload> = DEVELOPERS
        .iter()
        .filter_map(|dev| {
            counts.remove(dev).map(|per_stage| Workload {
                assignee: dev.to_string(),
                per_stage,
            })
        })
        .collect();
    rows.extend(counts.into_iter().map(|(assignee, per_stage)| Workload {
        assignee: assignee.to_string(),
        per_stage,
    }));
    rows
}

/// Task count per type, skipping types with no tasks
pub fn type_distribution(tasks: &[Task]) -> Vec<(TaskKind, usize)> {
    TaskKind::ALL
        .into_iter()
        .map(|kind| (kind, tasks.iter().filter(|t| t.kind == kind).count()))
        .filter(|(_, n)| *n > 0)
        .collect()
}

/// Largest id plus one, 1 for an empty list
pub fn next_free_id(tasks: &[Task]) -> u32 {
    tasks.iter().map(|t| t.id).max().map_or(1, |m| m + 1)
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SystemStats {
    pub total: usize,
    pub assignees: usize,
    pub kinds: usize,
    pub next_id: u32,
}

pub fn system_stats(tasks: &[Task]) -> SystemStats {
    SystemStats {
        total: tasks.len(),
        assignees: tasks
            .iter()
            .map(|t| t.assignee.as_str())
            .collect::<BTreeSet<_>>()
            .len(),
        kinds: tasks.iter().map(|t| t.kind).collect::<BTreeSet<_>>().len(),
        next_id: next_free_id(tasks),
    }
}
