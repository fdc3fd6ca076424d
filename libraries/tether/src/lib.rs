//! Observable synchronized collections for a dashboard-style client.
//!
//! The same pattern shows up wherever a page tracks a list of documents: an
//! in-memory collection mirrored to somewhere durable, observers told about
//! each change, and a single context the page reads through. This crate
//! implements that pattern once, parameterized by a backing strategy:
//!
//! 1. [`local::LocalCollectionStore`] mirrors a collection to one named slot
//!    in local storage, write-through on every mutation, and reloads
//!    wholesale when another tab rewrites the slot (last-writer-wins).
//! 2. [`remote::RemoteCollectionSync`] mirrors a remote document collection
//!    and classifies each notification batch into added / modified / removed
//!    deltas.
//! 3. [`context::CollectionContext`] is the one per-scope facade presentation
//!    code talks to; it owns its backing, so duplicate subscriptions cannot
//!    happen and teardown is exactly-once.
//!
//! Everything is single-threaded and callback-driven; cancellation handles
//! (`StorageWatch`, `Subscription`) are idempotent and implied by drop.

pub mod context;
pub mod error;
pub mod ids;
pub mod local;
pub mod patch;
pub mod remote;
pub mod storage;

pub use context::{
    CollectionBacking, CollectionContext, ContextSnapshot, LocalBacking, Mutation, RemoteBacking,
    StateCell, change_display_window,
};
pub use error::{RemoteError, StorageError};
pub use local::{ListenerKey, LocalCollectionStore};
pub use remote::{ChangeEvent, ChangeKind, InMemoryRemote, RemoteCollectionSync, RemoteFeed};
pub use storage::{StorageHandle, StorageHub, StorageWatch};

/// One domain document in a collection.
///
/// Ids are stable for the record's lifetime and unique within a collection;
/// the empty string means "not yet assigned" and is replaced on append or
/// create. Consumers rely on insertion order, never on id ordering.
pub trait Record:
    Clone + PartialEq + serde::Serialize + serde::de::DeserializeOwned + 'static
{
    fn id(&self) -> &str;
    fn set_id(&mut self, id: String);
}
