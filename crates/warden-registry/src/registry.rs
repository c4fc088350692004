//! Live-object registry with reference-counted ownership.

use std::collections::HashMap;
use std::fmt;
use std::hash::Hash;
use std::ops::Deref;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use parking_lot::Mutex;
use tracing::{debug, error, info};

/// Capabilities a registry needs from the objects it owns.
pub trait Owned: Send + Sync {
    /// Release buffers, secrets and back-references.
    ///
    /// Runs exactly once, after the last reference is gone and outside the
    /// registry's lock.
    fn destroy(&self);

    /// Ask the underlying connection to close.
    ///
    /// Must not block or call back into the registry synchronously; teardown
    /// completes later through [`Registry::unregister`].
    fn force_close(&self);
}

/// A registered object and its reference count.
struct Slot<T> {
    value: T,
    refs: AtomicUsize,
}

impl<T: Owned> Slot<T> {
    /// Drop one reference, destroying the value if it was the last.
    fn release(&self) {
        let previous = self.refs.fetch_sub(1, Ordering::AcqRel);
        debug_assert!(previous > 0, "registry reference count went negative");
        if previous == 1 {
            self.value.destroy();
        }
    }
}

/// A borrowed reference obtained from [`Registry::get`].
///
/// Holding a handle keeps the object alive even after it is unregistered.
/// Dropping the handle (or passing it to [`Registry::release`]) gives the
/// reference back.
pub struct Handle<T: Owned> {
    slot: Arc<Slot<T>>,
}

impl<T: Owned> Handle<T> {
    /// Number of live references to the underlying object.
    #[must_use]
    pub fn refcount(&self) -> usize {
        self.slot.refs.load(Ordering::Acquire)
    }
}

impl<T: Owned> Deref for Handle<T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.slot.value
    }
}

impl<T: Owned> Drop for Handle<T> {
    fn drop(&mut self) {
        self.slot.release();
    }
}

impl<T: Owned + fmt::Debug> fmt::Debug for Handle<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Handle")
            .field("value", &self.slot.value)
            .field("refs", &self.refcount())
            .finish()
    }
}

/// Table of live objects keyed by connection identity.
///
/// Registration holds one reference; every [`get`](Self::get) adds one. The
/// object is destroyed exactly once, when the count reaches zero.
pub struct Registry<K, T> {
    table: Mutex<HashMap<K, Arc<Slot<T>>>>,
}

impl<K, T> Registry<K, T>
where
    K: Eq + Hash + Clone + fmt::Debug,
    T: Owned,
{
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self {
            table: Mutex::new(HashMap::new()),
        }
    }

    /// Register `value` under `id` with a reference count of one.
    ///
    /// # Panics
    ///
    /// Panics if `id` already maps to a live object. An id must be
    /// unregistered before it is reused; anything else is a broken contract
    /// in the caller, not a recoverable condition.
    pub fn register(&self, id: K, value: T) {
        let mut table = self.table.lock();
        let duplicate = table.contains_key(&id);
        if !duplicate {
            table.insert(
                id.clone(),
                Arc::new(Slot {
                    value,
                    refs: AtomicUsize::new(1),
                }),
            );
        }
        let live = table.len();
        drop(table);

        if duplicate {
            error!(id = ?id, "Registry invariant violated: id registered while still live");
        }
        assert!(!duplicate, "registry id {id:?} registered twice while still live");
        debug!(id = ?id, live, "Registered");
    }

    /// Remove `id` and drop the registration's reference.
    ///
    /// The id stops resolving immediately even if borrowed handles are still
    /// out. Returns `false` if `id` was not registered.
    pub fn unregister(&self, id: &K) -> bool {
        let slot = self.table.lock().remove(id);
        match slot {
            Some(slot) => {
                debug!(id = ?id, refs = slot.refs.load(Ordering::Acquire), "Unregistered");
                slot.release();
                true
            }
            None => false,
        }
    }

    /// Borrow the object registered under `id`, adding a reference.
    #[must_use]
    pub fn get(&self, id: &K) -> Option<Handle<T>> {
        let table = self.table.lock();
        let slot = table.get(id)?;
        slot.refs.fetch_add(1, Ordering::AcqRel);
        Some(Handle {
            slot: Arc::clone(slot),
        })
    }

    /// Give back a borrowed reference.
    pub fn release(&self, handle: Handle<T>) {
        drop(handle);
    }

    /// Request every live object to close.
    ///
    /// Entries stay registered; each is removed later by its own
    /// [`unregister`](Self::unregister) call. Returns the number of close
    /// requests issued.
    pub fn clear(&self) -> usize {
        let slots: Vec<Arc<Slot<T>>> = self.table.lock().values().cloned().collect();
        info!(live = slots.len(), "Requesting close of all registered objects");
        for slot in &slots {
            slot.value.force_close();
        }
        slots.len()
    }

    /// Check whether `id` is registered.
    #[must_use]
    pub fn contains(&self, id: &K) -> bool {
        self.table.lock().contains_key(id)
    }

    /// Reference count of the object under `id`, if registered.
    #[must_use]
    pub fn refcount(&self, id: &K) -> Option<usize> {
        self.table
            .lock()
            .get(id)
            .map(|slot| slot.refs.load(Ordering::Acquire))
    }

    /// Ids currently registered.
    #[must_use]
    pub fn ids(&self) -> Vec<K> {
        self.table.lock().keys().cloned().collect()
    }

    /// Number of registered objects.
    #[must_use]
    pub fn len(&self) -> usize {
        self.table.lock().len()
    }

    /// Check if the registry is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.table.lock().is_empty()
    }
}

impl<K, T> Default for Registry<K, T>
where
    K: Eq + Hash + Clone + fmt::Debug,
    T: Owned,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<K, T> fmt::Debug for Registry<K, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Registry")
            .field("live", &self.table.lock().len())
            .finish()
    }
}
