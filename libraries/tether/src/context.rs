//! The consumer-facing context: one per page scope, owning its backing.
//!
//! Presentation code never touches storage or the remote client directly; it
//! reads a [`ContextSnapshot`] and routes writes through [`Mutation`]s. The
//! context owns exactly one backing, so a scope can never end up with
//! duplicate subscriptions or storage listeners, and teardown happens exactly
//! once even when the scope is recreated repeatedly.

use std::cell::RefCell;
use std::rc::Rc;

use chrono::{DateTime, TimeDelta, Utc};
use im::Vector;
use serde_json::Value;

use crate::Record;
use crate::error::RemoteError;
use crate::local::{ListenerKey, LocalCollectionStore};
use crate::remote::{
    ChangeEvent, RemoteCollectionSync, RemoteFeed, Subscription, SyncCallbacks,
};

const CHANGE_DISPLAY_WINDOW_SECS: i64 = 3;

/// How long a classified change stays in [`CollectionContext::recent_changes`].
/// Expiry is cosmetic (UI badges), not a correctness mechanism.
pub fn change_display_window() -> TimeDelta {
    TimeDelta::seconds(CHANGE_DISPLAY_WINDOW_SECS)
}

/// Point-in-time view of a context.
#[derive(Clone, Debug)]
pub struct ContextSnapshot<R: Clone> {
    pub records: Vector<R>,
    /// True from scope creation until the first load or snapshot lands.
    pub loading: bool,
    /// Set on subscription failure; forces `loading` false.
    pub error: Option<String>,
}

/// A write routed through the context.
pub enum Mutation<R> {
    Append(R),
    Update(String, Value),
    Remove(String),
}

struct ContextState<R> {
    records: Vector<R>,
    loading: bool,
    error: Option<String>,
    recent: Vec<(DateTime<Utc>, ChangeEvent<R>)>,
}

/// Shared mutable context state, handed to backings so their callbacks can
/// publish into it.
pub struct StateCell<R>(Rc<RefCell<ContextState<R>>>);

impl<R> Clone for StateCell<R> {
    fn clone(&self) -> Self {
        Self(Rc::clone(&self.0))
    }
}

impl<R: Record> StateCell<R> {
    fn new() -> Self {
        Self(Rc::new(RefCell::new(ContextState {
            records: Vector::new(),
            loading: true,
            error: None,
            recent: Vec::new(),
        })))
    }

    /// Publish a fresh list; clears `loading`.
    pub fn replace_records(&self, records: Vector<R>) {
        let mut state = self.0.borrow_mut();
        state.records = records;
        state.loading = false;
    }

    /// Publish a subscription failure; clears `loading`.
    pub fn record_error(&self, error: RemoteError) {
        let mut state = self.0.borrow_mut();
        state.error = Some(error.to_string());
        state.loading = false;
    }

    /// Retain a classified change for the display window.
    pub fn record_change(&self, at: DateTime<Utc>, change: ChangeEvent<R>) {
        self.0.borrow_mut().recent.push((at, change));
    }

    fn snapshot(&self) -> ContextSnapshot<R> {
        let state = self.0.borrow();
        ContextSnapshot {
            records: state.records.clone(),
            loading: state.loading,
            error: state.error.clone(),
        }
    }

    fn recent_changes(&self, now: DateTime<Utc>) -> Vec<ChangeEvent<R>> {
        let mut state = self.0.borrow_mut();
        let window = change_display_window();
        state.recent.retain(|(at, _)| now - *at <= window);
        state.recent.iter().map(|(_, c)| c.clone()).collect()
    }
}

/// Strategy seam between a context and whatever holds its collection.
pub trait CollectionBacking<R: Record> {
    /// Wire callbacks into `state` and deliver the initial load/snapshot.
    fn attach(&mut self, state: StateCell<R>);
    fn append(&mut self, record: R);
    fn update(&mut self, id: &str, patch: &Value);
    fn remove(&mut self, id: &str);
    /// Release subscriptions and listeners. Called at most once.
    fn detach(&mut self);
}

/// Backing over a [`LocalCollectionStore`]: mutations are visible in the
/// snapshot synchronously.
pub struct LocalBacking<R: Record> {
    store: LocalCollectionStore<R>,
    listener: Option<ListenerKey>,
}

impl<R: Record> LocalBacking<R> {
    pub fn new(store: LocalCollectionStore<R>) -> Self {
        Self {
            store,
            listener: None,
        }
    }
}

impl<R: Record> CollectionBacking<R> for LocalBacking<R> {
    fn attach(&mut self, state: StateCell<R>) {
        state.replace_records(self.store.records());
        let listener_state = state.clone();
        self.listener = Some(
            self.store
                .subscribe(move |list| listener_state.replace_records(list.clone())),
        );
    }

    fn append(&mut self, record: R) {
        self.store.append(record);
    }

    fn update(&mut self, id: &str, patch: &Value) {
        self.store.update(id, patch);
    }

    fn remove(&mut self, id: &str) {
        self.store.remove(id);
    }

    fn detach(&mut self) {
        if let Some(listener) = self.listener.take() {
            self.store.unsubscribe(listener);
        }
    }
}

/// Backing over a remote feed: writes are fire-and-forget and become visible
/// only when the subscription delivers the batch containing them.
pub struct RemoteBacking<R: Record> {
    sync: RemoteCollectionSync<R>,
    subscription: Option<Subscription>,
}

impl<R: Record> RemoteBacking<R> {
    pub fn new(feed: Rc<dyn RemoteFeed<R>>) -> Self {
        Self {
            sync: RemoteCollectionSync::new(feed),
            subscription: None,
        }
    }
}

impl<R: Record> CollectionBacking<R> for RemoteBacking<R> {
    fn attach(&mut self, state: StateCell<R>) {
        let snapshot_state = state.clone();
        let error_state = state.clone();
        let change_state = state;
        self.subscription = Some(self.sync.subscribe(SyncCallbacks {
            on_snapshot: Box::new(move |records| snapshot_state.replace_records(records)),
            on_error: Box::new(move |error| error_state.record_error(error)),
            on_change: Some(Box::new(move |change| {
                change_state.record_change(Utc::now(), change)
            })),
        }));
    }

    fn append(&mut self, record: R) {
        if let Err(e) = self.sync.feed().create(record) {
            log::error!("remote create failed: {e}");
        }
    }

    fn update(&mut self, id: &str, patch: &Value) {
        if let Err(e) = self.sync.feed().update(id, patch) {
            log::error!("remote update of {id:?} failed: {e}");
        }
    }

    fn remove(&mut self, id: &str) {
        if let Err(e) = self.sync.feed().delete(id) {
            log::error!("remote delete of {id:?} failed: {e}");
        }
    }

    fn detach(&mut self) {
        if let Some(subscription) = self.subscription.take() {
            subscription.unsubscribe();
        }
    }
}

/// The single access point a page tree uses for one collection.
pub struct CollectionContext<R: Record, B: CollectionBacking<R>> {
    state: StateCell<R>,
    backing: B,
    active: bool,
}

impl<R: Record, B: CollectionBacking<R>> CollectionContext<R, B> {
    /// Create the context and attach its backing. Ownership of the backing is
    /// the one-instance-per-scope guarantee.
    pub fn open(mut backing: B) -> Self {
        let state = StateCell::new();
        backing.attach(state.clone());
        Self {
            state,
            backing,
            active: true,
        }
    }

    pub fn snapshot(&self) -> ContextSnapshot<R> {
        self.state.snapshot()
    }

    /// Route a write to the backing. Visibility follows the backing's
    /// consistency policy: synchronous for local, eventual for remote.
    pub fn mutate(&mut self, mutation: Mutation<R>) {
        match mutation {
            Mutation::Append(record) => self.backing.append(record),
            Mutation::Update(id, patch) => self.backing.update(&id, &patch),
            Mutation::Remove(id) => self.backing.remove(&id),
        }
    }

    /// Classified changes younger than the display window, pruning the rest.
    pub fn recent_changes(&self, now: DateTime<Utc>) -> Vec<ChangeEvent<R>> {
        self.state.recent_changes(now)
    }

    /// Tear down the backing. Idempotent; also runs on drop.
    pub fn shutdown(&mut self) {
        if self.active {
            self.active = false;
            self.backing.detach();
        }
    }
}

impl<R: Record, B: CollectionBacking<R>> Drop for CollectionContext<R, B> {
    fn drop(&mut self) {
        self.shutdown();
    }
}
