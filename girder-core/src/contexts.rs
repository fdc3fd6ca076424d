//! The wired collection contexts pages consume, one per collection per page
//! tree. Backings are injected here; nothing below this layer reaches for
//! storage or the remote client on its own.
//!
//! Projects deliberately have two independent sources of truth — the remote
//! feed and the local store — mirroring the product as shipped; nothing
//! reconciles them.

use std::rc::Rc;

use im::Vector;

use tether::{
    CollectionContext, LocalBacking, LocalCollectionStore, RemoteBacking, RemoteFeed,
    StorageHandle,
};

use crate::records::{Project, ScheduleEntry, Task};
use crate::seed;

pub const PROJECTS_KEY: &str = "projects";
pub const TASKS_KEY: &str = "tasks";
pub const SCHEDULE_KEY: &str = "schedule";

pub type ProjectsFeedContext = CollectionContext<Project, RemoteBacking<Project>>;
pub type LocalProjectsContext = CollectionContext<Project, LocalBacking<Project>>;
pub type TaskBoardContext = CollectionContext<Task, LocalBacking<Task>>;
pub type CrewScheduleContext = CollectionContext<ScheduleEntry, LocalBacking<ScheduleEntry>>;

/// Projects mirrored from the remote database, with classified change events
/// for UI feedback.
pub fn projects_feed(feed: Rc<dyn RemoteFeed<Project>>) -> ProjectsFeedContext {
    CollectionContext::open(RemoteBacking::new(feed))
}

/// Projects kept in local storage only.
pub fn local_projects(storage: StorageHandle) -> LocalProjectsContext {
    let store = LocalCollectionStore::open(storage, PROJECTS_KEY, Vector::new());
    CollectionContext::open(LocalBacking::new(store))
}

/// The task board; seeded with the built-in tasks on first run.
pub fn task_board(storage: StorageHandle) -> TaskBoardContext {
    let store = LocalCollectionStore::open(storage, TASKS_KEY, seed::default_tasks());
    CollectionContext::open(LocalBacking::new(store))
}

/// The crew schedule, local-only like the task board but starting empty.
pub fn crew_schedule(storage: StorageHandle) -> CrewScheduleContext {
    let store = LocalCollectionStore::open(storage, SCHEDULE_KEY, Vector::new());
    CollectionContext::open(LocalBacking::new(store))
}
