//! Weak references from the UI thread to realtime-owned objects.
//!
//! The realtime engine owns its objects; the UI only ever holds a
//! [`WeakRef`], which can test whether the owner still exists instead of
//! dereferencing freed state.
//!
//! # Architecture
//!
//! - [`ObjectArena`] - generational slot storage. Owners are identified by
//!   [`OwnerId`] (index + generation), so a destroyed owner's id never
//!   aliases whatever later reuses its slot.
//! - [`WeakRegistry`] - per-engine map from owner to the [`WeakFlag`]s held
//!   against it. `clear_all` flips every flag to `false` and erases the entry.
//! - [`EngineObjects`] - the arena behind the coarse engine lock, wired to a
//!   registry. `remove` is the owner's destruction hook.
//! - [`WeakRef`] - UI-side wrapper. `get`/`try_get` take the engine lock and
//!   yield the object only while its flag is still `true`.
//!
//! The registry lock is only taken at lifecycle edges. Steady-state audio
//! processing never touches it.

pub mod arena;
pub mod engine;
pub mod registry;

pub use arena::{ObjectArena, OwnerId};
pub use engine::{EngineObjects, WeakRef};
pub use registry::{WeakFlag, WeakRegistry};
