//! A collection mirrored write-through to one local storage slot.
//!
//! The in-memory list and the slot move in lockstep: every mutator rewrites
//! the full snapshot synchronously, and a write to the same slot from another
//! tab reloads the list wholesale. Concurrent tabs are last-writer-wins by
//! design; no merge is attempted.

use std::cell::RefCell;
use std::rc::Rc;

use chrono::Utc;
use im::Vector;
use serde_json::Value;
use slotmap::SlotMap;

use crate::storage::{StorageHandle, StorageWatch};
use crate::{Record, ids, patch};

slotmap::new_key_type! {
    /// Registration handle for a store observer.
    pub struct ListenerKey;
}

struct StoreInner<R: Record> {
    records: Vector<R>,
    defaults: Vector<R>,
    listeners: SlotMap<ListenerKey, Rc<RefCell<dyn FnMut(&Vector<R>)>>>,
}

/// In-memory collection kept consistent with a named storage slot.
pub struct LocalCollectionStore<R: Record> {
    inner: Rc<RefCell<StoreInner<R>>>,
    storage: StorageHandle,
    key: String,
    // Held for its registration; dropping the store cancels the watch.
    _watch: StorageWatch,
}

impl<R: Record> LocalCollectionStore<R> {
    /// Open the store over `key`, loading the current snapshot (or `defaults`
    /// when the slot is absent) and watching the slot for writes from other
    /// tabs.
    pub fn open(storage: StorageHandle, key: impl Into<String>, defaults: Vector<R>) -> Self {
        let key = key.into();
        let records = load_slot(&storage, &key, &defaults);
        let inner = Rc::new(RefCell::new(StoreInner {
            records,
            defaults,
            listeners: SlotMap::with_key(),
        }));

        let watch = {
            let inner = Rc::clone(&inner);
            let watch_storage = storage.clone();
            let watch_key = key.clone();
            storage.watch(&key, move |_| {
                // Another tab rewrote the slot: replace the list wholesale.
                let defaults = inner.borrow().defaults.clone();
                let fresh = load_slot(&watch_storage, &watch_key, &defaults);
                inner.borrow_mut().records = fresh;
                notify_listeners(&inner);
            })
        };

        Self {
            inner,
            storage,
            key,
            _watch: watch,
        }
    }

    /// Re-read the slot. Absent slot yields the default list; a snapshot that
    /// does not parse yields an empty list (logged, never an error).
    pub fn load(&self) -> Vector<R> {
        let defaults = self.inner.borrow().defaults.clone();
        load_slot(&self.storage, &self.key, &defaults)
    }

    /// Current in-memory list.
    pub fn records(&self) -> Vector<R> {
        self.inner.borrow().records.clone()
    }

    pub fn storage_key(&self) -> &str {
        &self.key
    }

    /// Append a record, assigning an id when it has none, and write the new
    /// snapshot through synchronously.
    pub fn append(&self, mut record: R) -> Vector<R> {
        if record.id().is_empty() {
            record.set_id(ids::next_id(Utc::now()));
        }
        let list = {
            let mut inner = self.inner.borrow_mut();
            inner.records.push_back(record);
            inner.records.clone()
        };
        self.write_through(&list);
        notify_listeners(&self.inner);
        list
    }

    /// Remove the record with `id`. Silent no-op when absent.
    pub fn remove(&self, id: &str) -> Vector<R> {
        let (list, changed) = {
            let mut inner = self.inner.borrow_mut();
            let before = inner.records.len();
            let filtered: Vector<R> = inner
                .records
                .iter()
                .filter(|r| r.id() != id)
                .cloned()
                .collect();
            let changed = filtered.len() != before;
            if changed {
                inner.records = filtered;
            }
            (inner.records.clone(), changed)
        };
        if changed {
            self.write_through(&list);
            notify_listeners(&self.inner);
        }
        list
    }

    /// Shallow-merge `patch` into the record with `id`. Silent no-op when the
    /// id is absent or the merged document no longer parses.
    pub fn update(&self, id: &str, patch: &Value) -> Vector<R> {
        let (list, changed) = {
            let mut inner = self.inner.borrow_mut();
            let merged = inner
                .records
                .iter()
                .position(|r| r.id() == id)
                .and_then(|index| {
                    patch::shallow_merge(&inner.records[index], patch).map(|m| (index, m))
                });
            match merged {
                Some((index, merged)) => {
                    inner.records.set(index, merged);
                    (inner.records.clone(), true)
                }
                None => (inner.records.clone(), false),
            }
        };
        if changed {
            self.write_through(&list);
            notify_listeners(&self.inner);
        }
        list
    }

    /// Observe the in-memory list. Fires on local mutators and on external
    /// reloads alike, with the new list.
    pub fn subscribe(&self, callback: impl FnMut(&Vector<R>) + 'static) -> ListenerKey {
        let callback: Rc<RefCell<dyn FnMut(&Vector<R>)>> = Rc::new(RefCell::new(callback));
        self.inner.borrow_mut().listeners.insert(callback)
    }

    pub fn unsubscribe(&self, key: ListenerKey) {
        self.inner.borrow_mut().listeners.remove(key);
    }

    fn write_through(&self, list: &Vector<R>) {
        match serde_json::to_string(list) {
            Ok(snapshot) => self.storage.write(&self.key, &snapshot),
            Err(e) => log::error!("snapshot for slot {:?} failed to serialize: {e}", self.key),
        }
    }
}

fn load_slot<R: Record>(storage: &StorageHandle, key: &str, defaults: &Vector<R>) -> Vector<R> {
    let Some(raw) = storage.read(key) else {
        return defaults.clone();
    };
    match serde_json::from_str::<Vector<R>>(&raw) {
        Ok(list) => list,
        Err(e) => {
            log::warn!("discarding malformed snapshot under {key:?}: {e}");
            Vector::new()
        }
    }
}

fn notify_listeners<R: Record>(inner: &Rc<RefCell<StoreInner<R>>>) {
    let (list, listeners): (Vector<R>, Vec<_>) = {
        let inner = inner.borrow();
        (
            inner.records.clone(),
            inner
                .listeners
                .iter()
                .map(|(key, cb)| (key, Rc::clone(cb)))
                .collect(),
        )
    };
    for (key, callback) in listeners {
        // Skip anything unsubscribed by an earlier callback in this round.
        if !inner.borrow().listeners.contains_key(key) {
            continue;
        }
        (callback.borrow_mut())(&list);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::StorageHub;
    use serde::{Deserialize, Serialize};
    use serde_json::json;

    #[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
    struct Item {
        #[serde(default)]
        id: String,
        label: String,
        #[serde(default)]
        done: bool,
    }

    impl Record for Item {
        fn id(&self) -> &str {
            &self.id
        }
        fn set_id(&mut self, id: String) {
            self.id = id;
        }
    }

    fn item(id: &str, label: &str) -> Item {
        Item {
            id: id.to_string(),
            label: label.to_string(),
            done: false,
        }
    }

    fn store(hub: &StorageHub) -> LocalCollectionStore<Item> {
        LocalCollectionStore::open(hub.handle(), "items", Vector::new())
    }

    #[test]
    fn every_mutator_writes_through() {
        let hub = StorageHub::in_memory();
        let store = store(&hub);

        let after_append = store.append(item("a", "one"));
        assert_eq!(store.load(), after_append);

        let after_update = store.update("a", &json!({ "done": true }));
        assert_eq!(store.load(), after_update);

        let after_remove = store.remove("a");
        assert_eq!(store.load(), after_remove);
    }

    #[test]
    fn append_assigns_missing_ids_and_preserves_order() {
        let hub = StorageHub::in_memory();
        let store = store(&hub);
        store.append(item("", "first"));
        let list = store.append(item("", "second"));
        assert_eq!(list.len(), 2);
        assert_eq!(list[0].label, "first");
        assert_eq!(list[1].label, "second");
        assert!(!list[0].id.is_empty());
        assert_ne!(list[0].id, list[1].id);
    }

    #[test]
    fn remove_is_idempotent() {
        let hub = StorageHub::in_memory();
        let store = store(&hub);
        store.append(item("a", "one"));
        let once = store.remove("a");
        let twice = store.remove("a");
        assert_eq!(once, twice);
        assert!(twice.is_empty());
    }

    #[test]
    fn update_of_missing_id_changes_nothing() {
        let hub = StorageHub::in_memory();
        let store = store(&hub);
        store.append(item("a", "one"));
        let before = store.load();
        let after = store.update("ghost", &json!({ "done": true }));
        assert_eq!(before, after);
        assert_eq!(store.load(), before);
    }

    #[test]
    fn absent_slot_yields_defaults() {
        let hub = StorageHub::in_memory();
        let defaults = Vector::from(vec![item("d1", "seeded")]);
        let store = LocalCollectionStore::open(hub.handle(), "items", defaults.clone());
        assert_eq!(store.records(), defaults);
        assert_eq!(store.load(), defaults);
    }

    #[test]
    fn malformed_snapshot_degrades_to_empty() {
        let hub = StorageHub::in_memory();
        hub.handle().write("items", "{not json");
        let defaults = Vector::from(vec![item("d1", "seeded")]);
        let store = LocalCollectionStore::open(hub.handle(), "items", defaults);
        assert!(store.records().is_empty());
    }

    #[test]
    fn external_write_replaces_the_list_wholesale() {
        let hub = StorageHub::in_memory();
        let store = store(&hub);
        store.append(item("a", "mine"));

        let other_tab = hub.handle();
        other_tab.write("items", &json!([{ "id": "z", "label": "theirs" }]).to_string());

        assert_eq!(store.records().len(), 1);
        assert_eq!(store.records()[0].id, "z");
    }

    #[test]
    fn listeners_hear_local_and_external_changes() {
        let hub = StorageHub::in_memory();
        let store = store(&hub);
        let heard = Rc::new(RefCell::new(Vec::new()));
        let heard_in_cb = Rc::clone(&heard);
        let key = store.subscribe(move |list| heard_in_cb.borrow_mut().push(list.len()));

        store.append(item("a", "one"));
        hub.handle().write("items", "[]");
        assert_eq!(*heard.borrow(), vec![1, 0]);

        store.unsubscribe(key);
        store.append(item("b", "two"));
        assert_eq!(heard.borrow().len(), 2);
    }

    #[test]
    fn two_stores_on_one_slot_converge() {
        let hub = StorageHub::in_memory();
        let a = LocalCollectionStore::<Item>::open(hub.handle(), "items", Vector::new());
        let b = LocalCollectionStore::<Item>::open(hub.handle(), "items", Vector::new());

        a.append(item("1", "from a"));
        assert_eq!(b.records(), a.records());

        b.remove("1");
        assert!(a.records().is_empty());
    }
}
