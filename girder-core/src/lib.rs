//! Domain layer of the girder dashboard: the records pages display and the
//! collection contexts they read and write through. All synchronization
//! mechanics live in the `tether` crate; this crate only names the
//! collections and injects their backings.

pub mod contexts;
pub mod records;
pub mod seed;

pub use contexts::{
    CrewScheduleContext, LocalProjectsContext, PROJECTS_KEY, ProjectsFeedContext, SCHEDULE_KEY,
    TASKS_KEY, TaskBoardContext, crew_schedule, local_projects, projects_feed, task_board,
};
pub use records::{
    Issue, IssueSeverity, Phase, PhaseStatus, Project, ProjectStatus, ScheduleEntry, Task,
    TaskStatus,
};
