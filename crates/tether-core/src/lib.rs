//! Tether Core - audio thread → UI thread synchronization primitives
//!
//! This crate provides the small set of containers a realtime audio host needs
//! so that a non-realtime consumer (UI/message thread) can observe state
//! produced by the audio callback, without the audio thread blocking
//! unboundedly or allocating, and without the UI ever touching freed memory.
//!
//! # Core Abstractions
//!
//! ## Object Lifetime
//!
//! - [`EngineObjects`] - Realtime-owned objects behind the coarse engine lock
//! - [`WeakRef`] - UI-side reference that tests liveness before every access
//! - [`WeakRegistry`] - Per-engine owner → [`WeakFlag`] map, invalidated on destroy
//! - [`ObjectArena`] / [`OwnerId`] - Generational storage, ids never alias after reuse
//!
//! ## Discrete Events
//!
//! - [`event_stack`] - Double-buffered, overwrite-on-full SPSC stack
//!   ([`EventProducer`] / [`EventConsumer`])
//!
//! ## Continuous Samples
//!
//! - [`peak_ring_buffer`] - Timestamp-reconstructed metering ring
//!   ([`PeakWriter`] / [`PeakReader`])
//! - [`LevelMeter`] - UI-side peak-hold ballistics for the readings
//! - [`Clock`] - Time source seam ([`MonotonicClock`], [`ManualClock`])
//!
//! # Example
//!
//! ```rust
//! use tether_core::{EngineObjects, MeterSettings, event_stack, peak_ring_buffer};
//!
//! // Audio side
//! let engine = EngineObjects::new();
//! let osc = engine.insert(440.0_f32);
//! let (mut events_tx, mut events_rx) = event_stack::<u32, 64>();
//! let (mut meter_tx, mut meter_rx) = peak_ring_buffer(MeterSettings::default());
//! meter_tx.reset(48000.0, 128, 1);
//!
//! events_tx.push(1);
//! meter_tx.write(&[&[0.5; 128][..]]);
//!
//! // UI side
//! let weak = engine.weak_ref(osc);
//! if let Some(freq) = weak.try_get() {
//!     assert_eq!(*freq, 440.0);
//! }
//! assert_eq!(events_rx.drain().collect::<Vec<_>>(), vec![1]);
//! let _peaks = meter_rx.get_peak();
//! ```
//!
//! # Design Principles
//!
//! - **Realtime safe**: `push` and `write` never allocate; `push` never blocks
//! - **Explicit ownership**: producer and consumer ends are separate,
//!   non-cloneable handles, so SPSC discipline is enforced by the type system
//! - **Signal-based failure**: stale references, empty drains, and an
//!   unconfigured meter surface as `None`/`false`/zeros, never as errors

pub mod clock;
pub mod event_stack;
pub mod meter;
pub mod peak;
pub mod weak;

// Re-export main types at crate root
pub use clock::{Clock, ManualClock, MonotonicClock};
pub use event_stack::{Drain, EventConsumer, EventProducer, event_stack};
pub use meter::{LevelMeter, display_curve, tick_decay};
pub use peak::{
    MeterSettings, PeakReader, PeakWriter, peak_ring_buffer, peak_ring_buffer_with_clock,
};
pub use weak::{EngineObjects, ObjectArena, OwnerId, WeakFlag, WeakRef, WeakRegistry};
