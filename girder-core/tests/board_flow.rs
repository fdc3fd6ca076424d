//! End-to-end flows across the wired contexts: first-run seeding, appends,
//! cross-tab convergence, and the remote projects feed.

use std::rc::Rc;

use serde_json::json;

use girder_core::{
    Project, ProjectStatus, Task, local_projects, projects_feed, task_board,
};
use tether::{ChangeKind, InMemoryRemote, Mutation, RemoteFeed as _, StorageHub};

#[test]
fn first_run_seeds_then_append_lands_sixth() {
    let hub = StorageHub::in_memory();
    let mut board = task_board(hub.handle());

    let seeded = board.snapshot().records;
    assert_eq!(seeded.len(), 5);

    board.mutate(Mutation::Append(Task::titled("X")));

    let after = board.snapshot().records;
    assert_eq!(after.len(), 6);
    let appended = &after[5];
    assert_eq!(appended.title, "X");
    assert!(!appended.id.is_empty());
    assert!(seeded.iter().all(|t| t.id != appended.id));
}

#[test]
fn reopened_board_sees_the_persisted_list_not_the_seeds() {
    let dir = tempfile::tempdir().unwrap();
    {
        let hub = StorageHub::on_disk(dir.path()).unwrap();
        let mut board = task_board(hub.handle());
        board.mutate(Mutation::Append(Task::titled("X")));
    }
    let hub = StorageHub::on_disk(dir.path()).unwrap();
    let board = task_board(hub.handle());
    assert_eq!(board.snapshot().records.len(), 6);
}

#[test]
fn sequential_appends_preserve_insertion_order() {
    let hub = StorageHub::in_memory();
    let mut projects = local_projects(hub.handle());

    projects.mutate(Mutation::Append(Project::named("First street")));
    projects.mutate(Mutation::Append(Project::named("Second avenue")));

    let records = projects.snapshot().records;
    assert_eq!(records.len(), 2);
    assert_eq!(records[0].name, "First street");
    assert_eq!(records[1].name, "Second avenue");
}

#[test]
fn two_tabs_on_the_task_board_converge() {
    let hub = StorageHub::in_memory();
    let mut tab_a = task_board(hub.handle());
    let tab_b = task_board(hub.handle());

    tab_a.mutate(Mutation::Append(Task::titled("Stake out footings")));

    let a = tab_a.snapshot().records;
    let b = tab_b.snapshot().records;
    assert_eq!(a, b);
    assert_eq!(b.len(), 6);
}

#[test]
fn status_update_through_the_context_is_a_shallow_patch() {
    let hub = StorageHub::in_memory();
    let mut projects = local_projects(hub.handle());
    projects.mutate(Mutation::Append(Project::named("Harbor crane pad")));

    let id = projects.snapshot().records[0].id.clone();
    projects.mutate(Mutation::Update(id, json!({ "status": "active" })));

    let record = projects.snapshot().records[0].clone();
    assert_eq!(record.status, ProjectStatus::Active);
    assert_eq!(record.name, "Harbor crane pad");
}

#[test]
fn remote_feed_orders_newest_first_and_reports_changes() {
    let remote = InMemoryRemote::<Project>::new();
    let mut feed = projects_feed(Rc::new(remote.clone()));

    feed.mutate(Mutation::Append(Project::named("Old yard")));
    feed.mutate(Mutation::Append(Project::named("New yard")));

    let records = feed.snapshot().records;
    assert_eq!(records.len(), 2);
    assert_eq!(records[0].name, "New yard");
    assert_eq!(records[1].name, "Old yard");

    let changes = feed.recent_changes(chrono::Utc::now());
    assert_eq!(
        changes
            .iter()
            .filter(|c| c.kind == ChangeKind::Added)
            .count(),
        2
    );

    let id = records[0].id.clone();
    remote.delete(&id).unwrap();
    assert_eq!(feed.snapshot().records.len(), 1);
}
