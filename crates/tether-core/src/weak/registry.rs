//! Owner → weak flag bookkeeping.
//!
//! [`WeakRegistry`] maps each [`OwnerId`] to the liveness flags that UI-side
//! wrappers hold for it. Destroying the owner flips every flag to `false`
//! before the entry is erased, so a wrapper can always test liveness instead
//! of touching freed state.
//!
//! The registry lock is a plain mutex. It is only taken at lifecycle edges
//! (wrapper creation/destruction, owner destruction), never from a
//! steady-state audio block.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::Mutex;

use super::arena::OwnerId;

/// Shared liveness token for one UI-side reference.
///
/// Created `true`. Flipped to `false` exactly once, when the owner dies.
/// Clones share the same underlying atomic; registry identity is the
/// shared allocation, see [`ptr_eq`](Self::ptr_eq).
#[derive(Clone, Debug)]
pub struct WeakFlag(Arc<AtomicBool>);

impl WeakFlag {
    /// Create a flag reading "owner alive".
    pub fn new() -> Self {
        Self(Arc::new(AtomicBool::new(true)))
    }

    /// Whether the owner is still alive.
    #[inline]
    pub fn is_alive(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }

    /// Mark the owner as gone. Idempotent.
    #[inline]
    pub fn invalidate(&self) {
        self.0.store(false, Ordering::Release);
    }

    /// Whether two handles refer to the same flag.
    #[inline]
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl Default for WeakFlag {
    fn default() -> Self {
        Self::new()
    }
}

/// Per-engine registry of weak flags, keyed by owner.
///
/// One instance per engine/session, passed down explicitly. Nothing here
/// is process-global.
///
/// # Example
///
/// ```rust
/// use tether_core::{ObjectArena, WeakFlag, WeakRegistry};
///
/// let mut arena = ObjectArena::new();
/// let owner = arena.insert("line~");
///
/// let registry = WeakRegistry::new();
/// let f1 = WeakFlag::new();
/// let f2 = WeakFlag::new();
/// registry.register(owner, &f1);
/// registry.register(owner, &f2);
///
/// registry.clear_all(owner);
/// assert!(!f1.is_alive());
/// assert!(!f2.is_alive());
///
/// // Late unregister is a harmless no-op.
/// registry.unregister(owner, &f1);
/// ```
#[derive(Debug, Default)]
pub struct WeakRegistry {
    owners: Mutex<HashMap<OwnerId, Vec<WeakFlag>>>,
}

impl WeakRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add `flag` to `owner`'s set, creating the entry on first use.
    ///
    /// Each flag must be registered exactly once.
    pub fn register(&self, owner: OwnerId, flag: &WeakFlag) {
        let mut owners = self.owners.lock();
        owners.entry(owner).or_default().push(flag.clone());

        #[cfg(feature = "tracing")]
        tracing::debug!(
            "weak_register: owner {owner}, {} flag(s)",
            owners[&owner].len()
        );
    }

    /// Remove `flag` from `owner`'s set.
    ///
    /// No-op when the owner was already cleared or the flag was never
    /// registered. An entry left with no flags is erased.
    pub fn unregister(&self, owner: OwnerId, flag: &WeakFlag) {
        let mut owners = self.owners.lock();
        let Some(flags) = owners.get_mut(&owner) else {
            return;
        };

        if let Some(pos) = flags.iter().position(|f| f.ptr_eq(flag)) {
            flags.swap_remove(pos);
        }
        if flags.is_empty() {
            owners.remove(&owner);
        }

        #[cfg(feature = "tracing")]
        tracing::debug!("weak_unregister: owner {owner}");
    }

    /// Invalidate every flag registered for `owner`, then erase its entry.
    ///
    /// Called once from the owner's destruction path.
    pub fn clear_all(&self, owner: OwnerId) {
        let mut owners = self.owners.lock();
        let Some(flags) = owners.remove(&owner) else {
            return;
        };

        for flag in &flags {
            flag.invalidate();
        }

        #[cfg(feature = "tracing")]
        tracing::debug!(
            "weak_clear_all: owner {owner}, {} flag(s) invalidated",
            flags.len()
        );
    }

    /// Number of owners with at least one registered flag.
    pub fn owner_count(&self) -> usize {
        self.owners.lock().len()
    }

    /// Number of flags currently registered for `owner`.
    pub fn flag_count(&self, owner: OwnerId) -> usize {
        self.owners.lock().get(&owner).map_or(0, Vec::len)
    }
}

#[cfg(test)]
mod tests {
    use super::super::arena::ObjectArena;
    use super::*;

    fn owners(n: usize) -> Vec<OwnerId> {
        let mut arena = ObjectArena::new();
        (0..n).map(|i| arena.insert(i)).collect()
    }

    #[test]
    fn flags_start_alive() {
        let flag = WeakFlag::new();
        assert!(flag.is_alive());
        assert!(flag.clone().is_alive());
    }

    #[test]
    fn clear_all_invalidates_every_flag() {
        let ids = owners(1);
        let registry = WeakRegistry::new();
        let f1 = WeakFlag::new();
        let f2 = WeakFlag::new();
        registry.register(ids[0], &f1);
        registry.register(ids[0], &f2);

        registry.clear_all(ids[0]);

        assert!(!f1.is_alive());
        assert!(!f2.is_alive());
        assert_eq!(registry.owner_count(), 0);
    }

    #[test]
    fn unregister_after_clear_is_noop() {
        let ids = owners(1);
        let registry = WeakRegistry::new();
        let flag = WeakFlag::new();
        registry.register(ids[0], &flag);
        registry.clear_all(ids[0]);

        registry.unregister(ids[0], &flag);
        registry.clear_all(ids[0]);

        assert!(!flag.is_alive());
        assert_eq!(registry.owner_count(), 0);
    }

    #[test]
    fn unregister_unknown_flag_is_noop() {
        let ids = owners(1);
        let registry = WeakRegistry::new();
        let registered = WeakFlag::new();
        let stranger = WeakFlag::new();
        registry.register(ids[0], &registered);

        registry.unregister(ids[0], &stranger);

        assert_eq!(registry.flag_count(ids[0]), 1);
    }

    #[test]
    fn unregistered_flag_survives_owner_clear() {
        let ids = owners(1);
        let registry = WeakRegistry::new();
        let kept = WeakFlag::new();
        let dropped = WeakFlag::new();
        registry.register(ids[0], &kept);
        registry.register(ids[0], &dropped);

        registry.unregister(ids[0], &dropped);
        registry.clear_all(ids[0]);

        assert!(!kept.is_alive());
        assert!(dropped.is_alive(), "unregistered flag is no longer tracked");
    }

    #[test]
    fn clearing_one_owner_leaves_others_alone() {
        let ids = owners(2);
        let registry = WeakRegistry::new();
        let a = WeakFlag::new();
        let b = WeakFlag::new();
        registry.register(ids[0], &a);
        registry.register(ids[1], &b);

        registry.clear_all(ids[0]);

        assert!(!a.is_alive());
        assert!(b.is_alive());
        assert_eq!(registry.flag_count(ids[1]), 1);
    }

    #[test]
    fn empty_entry_is_erased_on_last_unregister() {
        let ids = owners(1);
        let registry = WeakRegistry::new();
        let flag = WeakFlag::new();
        registry.register(ids[0], &flag);
        assert_eq!(registry.owner_count(), 1);

        registry.unregister(ids[0], &flag);
        assert_eq!(registry.owner_count(), 0);
    }
}
