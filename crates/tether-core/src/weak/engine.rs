//! Engine-owned object store and the UI-side [`WeakRef`] wrapper.
//!
//! [`EngineObjects`] pairs the realtime engine's objects (behind the coarse
//! engine lock) with the [`WeakRegistry`] that tracks every outstanding
//! [`WeakRef`]. Removing an object is the destruction hook: it invalidates
//! all flags for that owner before anyone can observe the empty slot.
//!
//! Lock order is always engine lock → registry lock. Neither lock is
//! reentrant, so do not create or drop a [`WeakRef`] from the same store
//! while holding one of its guards.

use core::fmt;
use std::sync::Arc;

use parking_lot::{MappedMutexGuard, Mutex, MutexGuard};

use super::arena::{ObjectArena, OwnerId};
use super::registry::{WeakFlag, WeakRegistry};

/// Realtime-owned objects shared with UI-side weak references.
///
/// Cloning is cheap and yields another handle to the same store.
///
/// # Example
///
/// ```rust
/// use tether_core::EngineObjects;
///
/// let engine = EngineObjects::new();
/// let id = engine.insert(0.5_f32);
///
/// let weak = engine.weak_ref(id);
/// assert_eq!(weak.get().map(|v| *v), Some(0.5));
///
/// engine.remove(id);
/// assert!(!weak.is_alive());
/// assert!(weak.get().is_none());
/// ```
pub struct EngineObjects<T> {
    objects: Arc<Mutex<ObjectArena<T>>>,
    registry: Arc<WeakRegistry>,
}

impl<T> EngineObjects<T> {
    /// Create an empty store with its own registry.
    pub fn new() -> Self {
        Self::with_registry(Arc::new(WeakRegistry::new()))
    }

    /// Create an empty store with room for `capacity` objects, so inserts
    /// up to that count never reallocate under the engine lock.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            objects: Arc::new(Mutex::new(ObjectArena::with_capacity(capacity))),
            registry: Arc::new(WeakRegistry::new()),
        }
    }

    /// Create an empty store that reports to an existing registry.
    pub fn with_registry(registry: Arc<WeakRegistry>) -> Self {
        Self {
            objects: Arc::new(Mutex::new(ObjectArena::new())),
            registry,
        }
    }

    /// The registry tracking this store's weak references.
    pub fn registry(&self) -> &Arc<WeakRegistry> {
        &self.registry
    }

    /// Add an object and return its identity.
    pub fn insert(&self, value: T) -> OwnerId {
        let id = self.objects.lock().insert(value);

        #[cfg(feature = "tracing")]
        tracing::debug!("engine_insert: owner {id}");

        id
    }

    /// Destroy the object behind `id`, invalidating every weak reference to it.
    ///
    /// The flags are cleared while the engine lock is still held, so no
    /// [`WeakRef::get`] can observe a live flag for a removed object.
    pub fn remove(&self, id: OwnerId) -> Option<T> {
        let mut objects = self.objects.lock();
        let removed = objects.remove(id);
        self.registry.clear_all(id);
        drop(objects);

        #[cfg(feature = "tracing")]
        tracing::debug!("engine_remove: owner {id}, present={}", removed.is_some());

        removed
    }

    /// Take the engine lock (blocking).
    pub fn lock(&self) -> MutexGuard<'_, ObjectArena<T>> {
        self.objects.lock()
    }

    /// Take the engine lock if it is free.
    pub fn try_lock(&self) -> Option<MutexGuard<'_, ObjectArena<T>>> {
        self.objects.try_lock()
    }

    /// Create a UI-side weak reference to `id`.
    ///
    /// If `id` is already dead the returned reference is stale from the
    /// start.
    pub fn weak_ref(&self, id: OwnerId) -> WeakRef<T> {
        let flag = WeakFlag::new();
        {
            let objects = self.objects.lock();
            if objects.contains(id) {
                self.registry.register(id, &flag);
            } else {
                flag.invalidate();
            }
        }

        WeakRef {
            owner: id,
            flag,
            objects: Arc::clone(&self.objects),
            registry: Arc::clone(&self.registry),
        }
    }

    /// Number of live objects.
    pub fn len(&self) -> usize {
        self.objects.lock().len()
    }

    /// Whether the store is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<T> Clone for EngineObjects<T> {
    fn clone(&self) -> Self {
        Self {
            objects: Arc::clone(&self.objects),
            registry: Arc::clone(&self.registry),
        }
    }
}

impl<T> Default for EngineObjects<T> {
    fn default() -> Self {
        Self::new()
    }
}

/// UI-side reference to a realtime-owned object.
///
/// Does not keep the object alive. Every access is fallible: a `None`
/// means the owner is gone (or, for [`try_get`](Self::try_get), the engine
/// is busy) and the caller should skip this cycle's work.
///
/// Dropping the reference unregisters its flag regardless of owner state.
pub struct WeakRef<T> {
    owner: OwnerId,
    flag: WeakFlag,
    objects: Arc<Mutex<ObjectArena<T>>>,
    registry: Arc<WeakRegistry>,
}

impl<T> WeakRef<T> {
    /// Identity of the referenced owner.
    pub fn owner(&self) -> OwnerId {
        self.owner
    }

    /// Lock-free liveness check. Advisory only; the owner may die right after.
    #[inline]
    pub fn is_alive(&self) -> bool {
        self.flag.is_alive()
    }

    /// Take the engine lock and borrow the object if it is still alive.
    pub fn get(&self) -> Option<MappedMutexGuard<'_, T>> {
        self.access(self.objects.lock())
    }

    /// Like [`get`](Self::get), but gives up instead of waiting for the
    /// engine lock.
    pub fn try_get(&self) -> Option<MappedMutexGuard<'_, T>> {
        self.access(self.objects.try_lock()?)
    }

    fn access<'a>(
        &self,
        guard: MutexGuard<'a, ObjectArena<T>>,
    ) -> Option<MappedMutexGuard<'a, T>> {
        if !self.flag.is_alive() {
            return None;
        }
        let owner = self.owner;
        MutexGuard::try_map(guard, |arena| arena.get_mut(owner)).ok()
    }
}

impl<T> Drop for WeakRef<T> {
    fn drop(&mut self) {
        self.registry.unregister(self.owner, &self.flag);
    }
}

impl<T> fmt::Debug for WeakRef<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WeakRef")
            .field("owner", &self.owner)
            .field("alive", &self.is_alive())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn get_yields_live_object() {
        let engine = EngineObjects::new();
        let id = engine.insert(String::from("osc~"));
        let weak = engine.weak_ref(id);

        assert!(weak.is_alive());
        assert_eq!(weak.get().as_deref().map(String::as_str), Some("osc~"));
    }

    #[test]
    fn presized_store_tracks_refs() {
        let engine = EngineObjects::with_capacity(4);
        let ids: Vec<OwnerId> = (0..6_u32).map(|n| engine.insert(n)).collect();
        let weak = engine.weak_ref(ids[5]);

        assert_eq!(engine.len(), 6);
        assert_eq!(engine.registry().flag_count(ids[5]), 1);
        assert_eq!(weak.get().map(|v| *v), Some(5));

        engine.remove(ids[5]);
        assert!(weak.get().is_none());
    }

    #[test]
    fn debug_shows_owner_and_liveness() {
        let engine = EngineObjects::new();
        let id = engine.insert(0_u8);
        let weak = engine.weak_ref(id);
        let text = format!("{weak:?}");

        assert!(text.starts_with("WeakRef {"));
        assert!(text.contains("alive: true"));
        assert!(text.ends_with(".. }"));
    }

    #[test]
    fn get_allows_mutation_under_engine_lock() {
        let engine = EngineObjects::new();
        let id = engine.insert(1_u32);
        let weak = engine.weak_ref(id);

        if let Some(mut value) = weak.get() {
            *value += 1;
        }
        assert_eq!(engine.lock().get(id), Some(&2));
    }

    #[test]
    fn remove_invalidates_all_refs() {
        let engine = EngineObjects::new();
        let id = engine.insert(());
        let a = engine.weak_ref(id);
        let b = engine.weak_ref(id);
        assert_eq!(engine.registry().flag_count(id), 2);

        assert_eq!(engine.remove(id), Some(()));

        assert!(!a.is_alive());
        assert!(!b.is_alive());
        assert!(a.get().is_none());
        assert!(b.try_get().is_none());
        assert_eq!(engine.registry().owner_count(), 0);
    }

    #[test]
    fn weak_ref_to_dead_owner_is_stale() {
        let engine = EngineObjects::new();
        let id = engine.insert(5);
        engine.remove(id);

        let weak = engine.weak_ref(id);
        assert!(!weak.is_alive());
        assert!(weak.get().is_none());
        assert_eq!(engine.registry().owner_count(), 0);
    }

    #[test]
    fn stale_ref_does_not_see_slot_reuse() {
        let engine = EngineObjects::new();
        let old = engine.insert("old");
        let weak = engine.weak_ref(old);
        engine.remove(old);

        let new = engine.insert("new");
        assert_eq!(old.index(), new.index());
        assert!(weak.get().is_none());
    }

    #[test]
    fn drop_unregisters_flag() {
        let engine = EngineObjects::new();
        let id = engine.insert(0);
        {
            let _weak = engine.weak_ref(id);
            assert_eq!(engine.registry().flag_count(id), 1);
        }
        assert_eq!(engine.registry().flag_count(id), 0);
        assert_eq!(engine.len(), 1);
    }

    #[test]
    fn try_get_gives_up_while_engine_locked() {
        let engine = EngineObjects::new();
        let id = engine.insert(3);
        let weak = engine.weak_ref(id);

        let guard = engine.lock();
        assert!(weak.try_get().is_none());
        drop(guard);

        assert_eq!(weak.try_get().map(|v| *v), Some(3));
    }

    #[test]
    fn clones_share_the_store() {
        let engine = EngineObjects::new();
        let handle = engine.clone();
        let id = handle.insert(9);
        let weak = engine.weak_ref(id);

        handle.remove(id);
        assert!(!weak.is_alive());
        assert!(engine.is_empty());
    }
}
