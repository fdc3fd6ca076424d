//! Domain records for the dashboard: projects, tasks, and crew schedule
//! entries. Each is one document in its collection; ids are assigned at
//! creation time by the owning store or the remote database.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use tether::Record;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ProjectStatus {
    #[default]
    Planning,
    Active,
    OnHold,
    Complete,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PhaseStatus {
    #[default]
    Pending,
    InProgress,
    Done,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum IssueSeverity {
    #[default]
    Low,
    Medium,
    High,
}

/// One phase of a project's build plan. `progress` is 0–100.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Phase {
    pub name: String,
    #[serde(default)]
    pub progress: u8,
    #[serde(default)]
    pub status: PhaseStatus,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Issue {
    pub title: String,
    #[serde(default)]
    pub severity: IssueSeverity,
    #[serde(default = "default_true")]
    pub open: bool,
}

fn default_true() -> bool {
    true
}

/// A construction or engineering project.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Project {
    #[serde(default)]
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub client: String,
    #[serde(default)]
    pub status: ProjectStatus,
    #[serde(default)]
    pub start_date: Option<NaiveDate>,
    #[serde(default)]
    pub end_date: Option<NaiveDate>,
    #[serde(default)]
    pub budget: f64,
    #[serde(default)]
    pub phases: Vec<Phase>,
    #[serde(default)]
    pub issues: Vec<Issue>,
    #[serde(default)]
    pub pending_items: Vec<String>,
    /// Server-assigned stamps; absent for records that never hit the remote.
    #[serde(default)]
    pub created: Option<DateTime<Utc>>,
    #[serde(default)]
    pub updated: Option<DateTime<Utc>>,
}

impl Project {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            id: String::new(),
            name: name.into(),
            client: String::new(),
            status: ProjectStatus::default(),
            start_date: None,
            end_date: None,
            budget: 0.0,
            phases: Vec::new(),
            issues: Vec::new(),
            pending_items: Vec::new(),
            created: None,
            updated: None,
        }
    }

    /// Overall progress: mean of phase progress, 0 when no phases exist.
    pub fn progress(&self) -> u8 {
        if self.phases.is_empty() {
            return 0;
        }
        let total: u32 = self.phases.iter().map(|p| u32::from(p.progress)).sum();
        (total / self.phases.len() as u32) as u8
    }

    pub fn open_issues(&self) -> impl Iterator<Item = &Issue> {
        self.issues.iter().filter(|issue| issue.open)
    }
}

impl Record for Project {
    fn id(&self) -> &str {
        &self.id
    }
    fn set_id(&mut self, id: String) {
        self.id = id;
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TaskStatus {
    #[default]
    Todo,
    InProgress,
    Blocked,
    Done,
}

/// One item on the task board.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Task {
    #[serde(default)]
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub status: TaskStatus,
    #[serde(default)]
    pub due_date: Option<NaiveDate>,
    #[serde(default)]
    pub assignee: Option<String>,
    #[serde(default)]
    pub notes: Vec<String>,
}

impl Task {
    pub fn titled(title: impl Into<String>) -> Self {
        Self {
            id: String::new(),
            title: title.into(),
            status: TaskStatus::default(),
            due_date: None,
            assignee: None,
            notes: Vec::new(),
        }
    }
}

impl Record for Task {
    fn id(&self) -> &str {
        &self.id
    }
    fn set_id(&mut self, id: String) {
        self.id = id;
    }
}

/// One block on the crew schedule.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ScheduleEntry {
    #[serde(default)]
    pub id: String,
    pub title: String,
    pub crew: String,
    pub starts: NaiveDate,
    pub ends: NaiveDate,
    #[serde(default)]
    pub site: String,
}

impl Record for ScheduleEntry {
    fn id(&self) -> &str {
        &self.id
    }
    fn set_id(&mut self, id: String) {
        self.id = id;
    }
}
