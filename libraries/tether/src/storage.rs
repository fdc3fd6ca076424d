//! Named key/value storage slots with cross-tab change notifications.
//!
//! A [`StorageHub`] wraps one persistence backend and hands out
//! [`StorageHandle`]s, each standing in for one browser tab. Writing a slot
//! through one handle notifies watchers of the same key registered from
//! *other* handles — the writing tab never hears its own write, exactly the
//! browser `storage` event rule. Whoever writes a slot last wins; there is no
//! merging of concurrent writers.

use std::cell::RefCell;
use std::collections::BTreeMap;
use std::io::Write as _;
use std::path::PathBuf;
use std::rc::{Rc, Weak};

use slotmap::SlotMap;

use crate::error::StorageError;

slotmap::new_key_type! {
    /// Registration handle for a storage watcher.
    pub struct WatchKey;
}

/// Durable slot storage. Keys are simple names ("projects", "tasks"), one
/// serialized value per key.
pub trait PersistBackend {
    fn load(&self, key: &str) -> Option<String>;
    fn store(&mut self, key: &str, value: &str) -> Result<(), StorageError>;
    fn remove(&mut self, key: &str) -> Result<(), StorageError>;
    fn keys(&self) -> Vec<String>;
}

/// Ephemeral backend for tests and demos.
#[derive(Default)]
pub struct MemoryBackend {
    slots: BTreeMap<String, String>,
}

impl PersistBackend for MemoryBackend {
    fn load(&self, key: &str) -> Option<String> {
        self.slots.get(key).cloned()
    }

    fn store(&mut self, key: &str, value: &str) -> Result<(), StorageError> {
        self.slots.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&mut self, key: &str) -> Result<(), StorageError> {
        self.slots.remove(key);
        Ok(())
    }

    fn keys(&self) -> Vec<String> {
        self.slots.keys().cloned().collect()
    }
}

/// One JSON file per key under a directory. Writes land in a temp file in the
/// same directory and are renamed into place, so a reader never observes a
/// partial snapshot.
pub struct FileBackend {
    dir: PathBuf,
}

impl FileBackend {
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self, StorageError> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    fn slot_path(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{key}.json"))
    }
}

impl PersistBackend for FileBackend {
    fn load(&self, key: &str) -> Option<String> {
        match std::fs::read_to_string(self.slot_path(key)) {
            Ok(value) => Some(value),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => None,
            Err(e) => {
                log::warn!("treating unreadable slot {key:?} as absent: {e}");
                None
            }
        }
    }

    fn store(&mut self, key: &str, value: &str) -> Result<(), StorageError> {
        let mut staged = tempfile::NamedTempFile::new_in(&self.dir)?;
        staged.write_all(value.as_bytes())?;
        staged
            .persist(self.slot_path(key))
            .map_err(|e| StorageError::Io(e.error))?;
        Ok(())
    }

    fn remove(&mut self, key: &str) -> Result<(), StorageError> {
        match std::fs::remove_file(self.slot_path(key)) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    fn keys(&self) -> Vec<String> {
        let Ok(entries) = std::fs::read_dir(&self.dir) else {
            return Vec::new();
        };
        let mut keys: Vec<String> = entries
            .filter_map(|entry| {
                let path = entry.ok()?.path();
                if path.extension()? != "json" {
                    return None;
                }
                Some(path.file_stem()?.to_string_lossy().into_owned())
            })
            .collect();
        keys.sort();
        keys
    }
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
struct TabId(u64);

struct Watcher {
    key: String,
    tab: TabId,
    callback: Rc<RefCell<dyn FnMut(&str)>>,
}

struct HubInner {
    backend: Box<dyn PersistBackend>,
    watchers: SlotMap<WatchKey, Watcher>,
    next_tab: u64,
}

/// Shared bus over one backend; the factory for [`StorageHandle`]s.
#[derive(Clone)]
pub struct StorageHub {
    inner: Rc<RefCell<HubInner>>,
}

impl StorageHub {
    pub fn new(backend: Box<dyn PersistBackend>) -> Self {
        Self {
            inner: Rc::new(RefCell::new(HubInner {
                backend,
                watchers: SlotMap::with_key(),
                next_tab: 0,
            })),
        }
    }

    pub fn in_memory() -> Self {
        Self::new(Box::new(MemoryBackend::default()))
    }

    pub fn on_disk(dir: impl Into<PathBuf>) -> Result<Self, StorageError> {
        Ok(Self::new(Box::new(FileBackend::open(dir)?)))
    }

    /// A new handle with its own tab identity. Clones of the handle share it.
    pub fn handle(&self) -> StorageHandle {
        let tab = {
            let mut inner = self.inner.borrow_mut();
            inner.next_tab += 1;
            TabId(inner.next_tab)
        };
        StorageHandle {
            hub: Rc::clone(&self.inner),
            tab,
        }
    }

    pub fn keys(&self) -> Vec<String> {
        self.inner.borrow().backend.keys()
    }
}

/// One tab's view of the hub.
#[derive(Clone)]
pub struct StorageHandle {
    hub: Rc<RefCell<HubInner>>,
    tab: TabId,
}

impl StorageHandle {
    pub fn read(&self, key: &str) -> Option<String> {
        self.hub.borrow().backend.load(key)
    }

    /// Persist `value` under `key` and notify other tabs' watchers of that
    /// key. A backend failure is logged and swallowed; the notification still
    /// fires so sibling tabs converge on the in-memory value.
    pub fn write(&self, key: &str, value: &str) {
        if let Err(e) = self.hub.borrow_mut().backend.store(key, value) {
            log::error!("write to slot {key:?} failed: {e}");
        }
        self.notify(key);
    }

    /// Drop the slot entirely, with the same notification rule as `write`.
    pub fn clear(&self, key: &str) {
        if let Err(e) = self.hub.borrow_mut().backend.remove(key) {
            log::error!("clear of slot {key:?} failed: {e}");
        }
        self.notify(key);
    }

    /// Watch `key` for writes from other tabs. The callback receives the key
    /// name; re-read the slot to see the new value. Dropping the returned
    /// guard (or calling [`StorageWatch::unwatch`]) cancels the watch.
    pub fn watch(&self, key: &str, callback: impl FnMut(&str) + 'static) -> StorageWatch {
        let callback: Rc<RefCell<dyn FnMut(&str)>> = Rc::new(RefCell::new(callback));
        let watch_key = self.hub.borrow_mut().watchers.insert(Watcher {
            key: key.to_string(),
            tab: self.tab,
            callback,
        });
        StorageWatch {
            hub: Rc::downgrade(&self.hub),
            key: std::cell::Cell::new(Some(watch_key)),
        }
    }

    fn notify(&self, key: &str) {
        // Snapshot the matching callbacks first so a callback may register or
        // cancel watchers, or write back, without holding the hub borrow.
        let matching: Vec<(WatchKey, Rc<RefCell<dyn FnMut(&str)>>)> = self
            .hub
            .borrow()
            .watchers
            .iter()
            .filter(|(_, w)| w.key == key && w.tab != self.tab)
            .map(|(k, w)| (k, Rc::clone(&w.callback)))
            .collect();

        for (watch_key, callback) in matching {
            // A watch cancelled mid-notification is silently skipped.
            if !self.hub.borrow().watchers.contains_key(watch_key) {
                continue;
            }
            (callback.borrow_mut())(key);
        }
    }
}

/// Guard for a registered watcher. Cancellation is idempotent and implied by
/// drop; a notification in flight when the watch is cancelled is dropped.
pub struct StorageWatch {
    hub: Weak<RefCell<HubInner>>,
    key: std::cell::Cell<Option<WatchKey>>,
}

impl StorageWatch {
    pub fn unwatch(&self) {
        let Some(watch_key) = self.key.take() else {
            return;
        };
        if let Some(hub) = self.hub.upgrade() {
            hub.borrow_mut().watchers.remove(watch_key);
        }
    }
}

impl Drop for StorageWatch {
    fn drop(&mut self) {
        self.unwatch();
    }
}
