//! Built-in data for first runs.

use im::Vector;

use crate::records::{Task, TaskStatus};

/// The task board's first-run contents: returned when the `tasks` slot has
/// never been written.
pub fn default_tasks() -> Vector<Task> {
    let titles_and_status = [
        ("Confirm permit approvals", TaskStatus::InProgress),
        ("Order rebar delivery", TaskStatus::Todo),
        ("Schedule concrete pour", TaskStatus::Todo),
        ("Update safety briefing log", TaskStatus::Todo),
        ("Walk the site with the client", TaskStatus::Todo),
    ];
    titles_and_status
        .iter()
        .enumerate()
        .map(|(index, (title, status))| Task {
            id: format!("seed-{}", index + 1),
            title: (*title).to_string(),
            status: *status,
            due_date: None,
            assignee: None,
            notes: Vec::new(),
        })
        .collect()
}
