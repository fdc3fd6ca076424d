//! Mirroring a remote document collection, with per-document change
//! classification.
//!
//! [`RemoteFeed`] is the seam to the external document database: it delivers
//! full materialized lists (ordered by creation, newest first) and accepts
//! writes. Writes are fire-and-forget with respect to local state — a create
//! is not visible locally until the subscription delivers the batch that
//! contains it. [`RemoteCollectionSync`] sits on top and classifies each
//! batch into added/modified/removed deltas. [`InMemoryRemote`] is the
//! in-process reference feed used by tests and demos.

use std::cell::{Cell, RefCell};
use std::collections::{HashMap, HashSet};
use std::rc::{Rc, Weak};

use chrono::{DateTime, Utc};
use im::Vector;
use indexmap::IndexMap;
use serde_json::Value;
use slotmap::SlotMap;

use crate::error::RemoteError;
use crate::{Record, ids, patch};

slotmap::new_key_type! {
    struct SubscriberKey;
}

/// Classification of one document delta within a notification batch.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ChangeKind {
    Added,
    Modified,
    Removed,
}

/// One classified delta. `record` carries the new field values for added and
/// modified documents and is `None` for removed ones.
#[derive(Clone, Debug)]
pub struct ChangeEvent<R> {
    pub kind: ChangeKind,
    pub id: String,
    pub record: Option<R>,
}

/// Callbacks a feed delivers into. `on_batch` receives the full ordered list
/// current as of the notification; `on_error` ends the subscription.
pub struct FeedCallbacks<R> {
    pub on_batch: Box<dyn FnMut(Vector<R>)>,
    pub on_error: Box<dyn FnMut(RemoteError)>,
}

/// Cancellation handle for a feed subscription. Idempotent; dropping the
/// guard cancels.
pub struct FeedGuard {
    cancel: Cell<Option<Box<dyn FnOnce()>>>,
}

impl FeedGuard {
    pub fn new(cancel: impl FnOnce() + 'static) -> Self {
        Self {
            cancel: Cell::new(Some(Box::new(cancel))),
        }
    }

    pub fn cancel(&self) {
        if let Some(cancel) = self.cancel.take() {
            cancel();
        }
    }
}

impl Drop for FeedGuard {
    fn drop(&mut self) {
        self.cancel();
    }
}

/// Client seam to the external document database. The database's own
/// concurrency control governs write conflicts; this layer only observes.
pub trait RemoteFeed<R: Record> {
    /// Open a live subscription. The current list is delivered as the first
    /// batch, then one batch per change notification.
    fn subscribe(&self, callbacks: FeedCallbacks<R>) -> FeedGuard;

    /// Fetch one document by id.
    fn get(&self, id: &str) -> Result<Option<R>, RemoteError>;

    /// Create a document. The server assigns the id and the `created` /
    /// `updated` stamps; the assigned id is returned.
    fn create(&self, record: R) -> Result<String, RemoteError>;

    /// Shallow-merge `patch` into the document, refreshing `updated`.
    /// Silent no-op when the id is unknown.
    fn update(&self, id: &str, patch: &Value) -> Result<(), RemoteError>;

    /// Hard delete, no tombstone. Silent no-op when the id is unknown.
    fn delete(&self, id: &str) -> Result<(), RemoteError>;
}

struct Doc<R> {
    record: R,
    created: DateTime<Utc>,
    updated: DateTime<Utc>,
}

struct RemoteInner<R> {
    docs: IndexMap<String, Doc<R>>,
    subscribers: SlotMap<SubscriberKey, Rc<RefCell<FeedCallbacks<R>>>>,
}

/// In-process document collection with live notifications; the reference
/// [`RemoteFeed`] implementation.
pub struct InMemoryRemote<R: Record> {
    inner: Rc<RefCell<RemoteInner<R>>>,
}

impl<R: Record> Clone for InMemoryRemote<R> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl<R: Record> Default for InMemoryRemote<R> {
    fn default() -> Self {
        Self::new()
    }
}

impl<R: Record> InMemoryRemote<R> {
    pub fn new() -> Self {
        Self {
            inner: Rc::new(RefCell::new(RemoteInner {
                docs: IndexMap::new(),
                subscribers: SlotMap::with_key(),
            })),
        }
    }

    /// Fail every live subscription with `error`. Subscribers are dropped;
    /// nothing further is delivered until they subscribe again.
    pub fn inject_error(&self, error: RemoteError) {
        let failed: Vec<_> = {
            let mut inner = self.inner.borrow_mut();
            let failed = inner
                .subscribers
                .iter()
                .map(|(_, cb)| Rc::clone(cb))
                .collect();
            inner.subscribers.clear();
            failed
        };
        for callbacks in failed {
            (callbacks.borrow_mut().on_error)(error.clone());
        }
    }

    /// `created` stamp of a document, for tests asserting ordering.
    pub fn created_at(&self, id: &str) -> Option<DateTime<Utc>> {
        self.inner.borrow().docs.get(id).map(|doc| doc.created)
    }

    /// `updated` stamp of a document.
    pub fn updated_at(&self, id: &str) -> Option<DateTime<Utc>> {
        self.inner.borrow().docs.get(id).map(|doc| doc.updated)
    }

    fn materialize(inner: &RemoteInner<R>) -> Vector<R> {
        let mut docs: Vec<&Doc<R>> = inner.docs.values().collect();
        // Creation order, newest first. Stamps come from the id clock, so
        // they are unique and the ordering is stable.
        docs.sort_by(|a, b| b.created.cmp(&a.created));
        docs.iter().map(|doc| doc.record.clone()).collect()
    }

    fn broadcast(&self) {
        let (list, subscribers): (Vector<R>, Vec<_>) = {
            let inner = self.inner.borrow();
            (
                Self::materialize(&inner),
                inner
                    .subscribers
                    .iter()
                    .map(|(key, cb)| (key, Rc::clone(cb)))
                    .collect(),
            )
        };
        for (key, callbacks) in subscribers {
            // Skip anything that unsubscribed while this batch was in flight.
            if !self.inner.borrow().subscribers.contains_key(key) {
                continue;
            }
            (callbacks.borrow_mut().on_batch)(list.clone());
        }
    }
}

impl<R: Record> RemoteFeed<R> for InMemoryRemote<R> {
    fn subscribe(&self, callbacks: FeedCallbacks<R>) -> FeedGuard {
        let callbacks = Rc::new(RefCell::new(callbacks));
        let key = self
            .inner
            .borrow_mut()
            .subscribers
            .insert(Rc::clone(&callbacks));

        // Initial batch: the collection as it stands.
        let list = Self::materialize(&self.inner.borrow());
        (callbacks.borrow_mut().on_batch)(list);

        let inner: Weak<RefCell<RemoteInner<R>>> = Rc::downgrade(&self.inner);
        FeedGuard::new(move || {
            if let Some(inner) = inner.upgrade() {
                inner.borrow_mut().subscribers.remove(key);
            }
        })
    }

    fn get(&self, id: &str) -> Result<Option<R>, RemoteError> {
        Ok(self
            .inner
            .borrow()
            .docs
            .get(id)
            .map(|doc| doc.record.clone()))
    }

    fn create(&self, mut record: R) -> Result<String, RemoteError> {
        let (id, stamp) = ids::next_stamped(Utc::now());
        record.set_id(id.clone());
        self.inner.borrow_mut().docs.insert(
            id.clone(),
            Doc {
                record,
                created: stamp,
                updated: stamp,
            },
        );
        self.broadcast();
        Ok(id)
    }

    fn update(&self, id: &str, patch: &Value) -> Result<(), RemoteError> {
        let changed = {
            let mut inner = self.inner.borrow_mut();
            match inner.docs.get_mut(id) {
                Some(doc) => match patch::shallow_merge(&doc.record, patch) {
                    Some(merged) => {
                        doc.record = merged;
                        doc.updated = Utc::now();
                        true
                    }
                    None => false,
                },
                None => false,
            }
        };
        if changed {
            self.broadcast();
        }
        Ok(())
    }

    fn delete(&self, id: &str) -> Result<(), RemoteError> {
        let removed = self.inner.borrow_mut().docs.shift_remove(id).is_some();
        if removed {
            self.broadcast();
        }
        Ok(())
    }
}

/// Consumer callbacks for a classified subscription.
pub struct SyncCallbacks<R> {
    pub on_snapshot: Box<dyn FnMut(Vector<R>)>,
    pub on_error: Box<dyn FnMut(RemoteError)>,
    pub on_change: Option<Box<dyn FnMut(ChangeEvent<R>)>>,
}

/// Live handle for a classified subscription. `unsubscribe` is idempotent and
/// implied by drop; any notification arriving afterwards is silently dropped.
pub struct Subscription {
    live: Rc<Cell<bool>>,
    guard: FeedGuard,
}

impl Subscription {
    pub fn unsubscribe(&self) {
        self.live.set(false);
        self.guard.cancel();
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.unsubscribe();
    }
}

/// Mirrors a remote collection and classifies each batch into deltas by
/// diffing against the previously materialized state.
pub struct RemoteCollectionSync<R: Record> {
    feed: Rc<dyn RemoteFeed<R>>,
}

impl<R: Record> RemoteCollectionSync<R> {
    pub fn new(feed: Rc<dyn RemoteFeed<R>>) -> Self {
        Self { feed }
    }

    pub fn feed(&self) -> &Rc<dyn RemoteFeed<R>> {
        &self.feed
    }

    /// Subscribe with consumer callbacks. Per batch, `on_snapshot` fires
    /// exactly once with the full list, then `on_change` fires exactly once
    /// per delta (per-document order unspecified). After `on_error` nothing
    /// further is delivered; resubscribing is the caller's decision.
    pub fn subscribe(&self, callbacks: SyncCallbacks<R>) -> Subscription {
        let SyncCallbacks {
            mut on_snapshot,
            mut on_error,
            mut on_change,
        } = callbacks;

        let live = Rc::new(Cell::new(true));

        let batch_live = Rc::clone(&live);
        let mut previous: HashMap<String, R> = HashMap::new();
        let on_batch = Box::new(move |records: Vector<R>| {
            if !batch_live.get() {
                return;
            }
            on_snapshot(records.clone());
            let deltas = classify(&previous, &records);
            if let Some(on_change) = on_change.as_mut() {
                for delta in deltas {
                    on_change(delta);
                }
            }
            previous = records
                .iter()
                .map(|r| (r.id().to_string(), r.clone()))
                .collect();
        });

        let error_live = Rc::clone(&live);
        let on_error = Box::new(move |error: RemoteError| {
            if !error_live.get() {
                return;
            }
            // A failed subscription is dead; drop anything delivered late.
            error_live.set(false);
            on_error(error);
        });

        let guard = self.feed.subscribe(FeedCallbacks { on_batch, on_error });
        Subscription { live, guard }
    }
}

fn classify<R: Record>(previous: &HashMap<String, R>, next: &Vector<R>) -> Vec<ChangeEvent<R>> {
    let mut deltas = Vec::new();
    for record in next {
        match previous.get(record.id()) {
            None => deltas.push(ChangeEvent {
                kind: ChangeKind::Added,
                id: record.id().to_string(),
                record: Some(record.clone()),
            }),
            Some(old) if old != record => deltas.push(ChangeEvent {
                kind: ChangeKind::Modified,
                id: record.id().to_string(),
                record: Some(record.clone()),
            }),
            Some(_) => {}
        }
    }
    let next_ids: HashSet<&str> = next.iter().map(Record::id).collect();
    for id in previous.keys() {
        if !next_ids.contains(id.as_str()) {
            deltas.push(ChangeEvent {
                kind: ChangeKind::Removed,
                id: id.clone(),
                record: None,
            });
        }
    }
    deltas
}
