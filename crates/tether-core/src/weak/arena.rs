//! Generational arena for realtime-owned objects.
//!
//! Slots are reused after removal, but every reuse bumps the slot's
//! generation. An [`OwnerId`] minted before the removal therefore never
//! resolves to the object that later occupies the same slot.

use core::fmt;

/// Identity of a realtime-owned object.
///
/// A generation-tagged index into an [`ObjectArena`]. It is only ever used
/// as a key; holding one does not keep the object alive.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct OwnerId {
    index: u32,
    generation: u32,
}

impl OwnerId {
    /// Slot index inside the arena.
    #[inline]
    pub fn index(self) -> u32 {
        self.index
    }

    /// Generation of the slot at the time this id was minted.
    #[inline]
    pub fn generation(self) -> u32 {
        self.generation
    }
}

impl fmt::Display for OwnerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}v{}", self.index, self.generation)
    }
}

enum Entry<T> {
    Occupied { generation: u32, value: T },
    Vacant { generation: u32, next_free: Option<u32> },
}

/// Slot storage with generation-checked lookups.
///
/// # Example
///
/// ```rust
/// use tether_core::ObjectArena;
///
/// let mut arena = ObjectArena::new();
/// let a = arena.insert("osc~");
/// assert_eq!(arena.remove(a), Some("osc~"));
///
/// // The slot is reused, but the old id stays dead.
/// let b = arena.insert("dac~");
/// assert_eq!(a.index(), b.index());
/// assert!(arena.get(a).is_none());
/// assert_eq!(arena.get(b), Some(&"dac~"));
/// ```
pub struct ObjectArena<T> {
    entries: Vec<Entry<T>>,
    free_head: Option<u32>,
    len: usize,
}

impl<T> ObjectArena<T> {
    /// Create an empty arena.
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
            free_head: None,
            len: 0,
        }
    }

    /// Create an empty arena with room for `capacity` objects.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            entries: Vec::with_capacity(capacity),
            free_head: None,
            len: 0,
        }
    }

    /// Store `value` and return its id.
    pub fn insert(&mut self, value: T) -> OwnerId {
        self.len += 1;

        if let Some(index) = self.free_head {
            let slot = &mut self.entries[index as usize];
            let (generation, next_free) = match *slot {
                Entry::Vacant {
                    generation,
                    next_free,
                } => (generation, next_free),
                Entry::Occupied { .. } => unreachable!("free list points at an occupied slot"),
            };
            *slot = Entry::Occupied { generation, value };
            self.free_head = next_free;
            return OwnerId { index, generation };
        }

        assert!(
            self.entries.len() < u32::MAX as usize,
            "ObjectArena index space exhausted"
        );
        let index = self.entries.len() as u32;
        self.entries.push(Entry::Occupied {
            generation: 0,
            value,
        });
        OwnerId {
            index,
            generation: 0,
        }
    }

    /// Remove the object behind `id`, if it is still alive.
    ///
    /// The slot's generation is bumped so `id` (and every copy of it) stays
    /// dead even after the slot is reused.
    pub fn remove(&mut self, id: OwnerId) -> Option<T> {
        let slot = self.entries.get_mut(id.index as usize)?;
        match slot {
            Entry::Occupied { generation, .. } if *generation == id.generation => {}
            _ => return None,
        }

        let vacant = Entry::Vacant {
            generation: id.generation.wrapping_add(1),
            next_free: self.free_head,
        };
        let Entry::Occupied { value, .. } = core::mem::replace(slot, vacant) else {
            unreachable!("slot checked occupied above");
        };
        self.free_head = Some(id.index);
        self.len -= 1;
        Some(value)
    }

    /// Borrow the object behind `id`.
    pub fn get(&self, id: OwnerId) -> Option<&T> {
        match self.entries.get(id.index as usize)? {
            Entry::Occupied { generation, value } if *generation == id.generation => Some(value),
            _ => None,
        }
    }

    /// Mutably borrow the object behind `id`.
    pub fn get_mut(&mut self, id: OwnerId) -> Option<&mut T> {
        match self.entries.get_mut(id.index as usize)? {
            Entry::Occupied { generation, value } if *generation == id.generation => Some(value),
            _ => None,
        }
    }

    /// Whether `id` still names a live object.
    pub fn contains(&self, id: OwnerId) -> bool {
        self.get(id).is_some()
    }

    /// Number of live objects.
    pub fn len(&self) -> usize {
        self.len
    }

    /// Whether the arena holds no live objects.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Iterate over live objects with their ids.
    pub fn iter(&self) -> impl Iterator<Item = (OwnerId, &T)> {
        self.entries
            .iter()
            .enumerate()
            .filter_map(|(index, entry)| match entry {
                Entry::Occupied { generation, value } => Some((
                    OwnerId {
                        index: index as u32,
                        generation: *generation,
                    },
                    value,
                )),
                Entry::Vacant { .. } => None,
            })
    }

    /// Iterate mutably over live objects with their ids.
    pub fn iter_mut(&mut self) -> impl Iterator<Item = (OwnerId, &mut T)> {
        self.entries
            .iter_mut()
            .enumerate()
            .filter_map(|(index, entry)| match entry {
                Entry::Occupied { generation, value } => Some((
                    OwnerId {
                        index: index as u32,
                        generation: *generation,
                    },
                    value,
                )),
                Entry::Vacant { .. } => None,
            })
    }
}

impl<T> Default for ObjectArena<T> {
    fn default() -> Self {
        Self::new()
    }
}
