//! Lock-free, double-buffered SPSC event stack.
//!
//! The realtime thread pushes bursts of small `Copy` events (log lines,
//! diagnostics) into the `back` buffer; the UI thread periodically swaps
//! roles and pops the `front` buffer in LIFO order. The two threads never
//! touch the same buffer at the same time.
//!
//! # Overwrite on full
//!
//! Each buffer holds `N` slots. Pushing into a full buffer overwrites the
//! oldest entry, so after `N + k` pushes only the newest `N` survive. There
//! is no backpressure and no allocation after construction.
//!
//! # Swap protocol
//!
//! Buffer roles live in a single atomic state word:
//!
//! | bits | meaning |
//! |------|---------|
//! | 0    | index of the `back` buffer |
//! | 1    | producer busy (a push is in flight) |
//! | 2..  | swap generation |
//!
//! `push` raises the busy bit and reads the back-buffer index in one
//! `fetch_or`, writes, then clears busy. `swap_buffers` only flips the index
//! with a compare-and-swap that expects busy to be clear, so a push always
//! lands in the buffer that was `back` for its whole duration and every
//! completed push is visible to the consumer after the swap. The producer
//! never waits; the consumer waits out at most one in-flight push.
//!
//! # Example
//!
//! ```rust
//! use tether_core::event_stack;
//!
//! let (mut tx, mut rx) = event_stack::<i32, 4>();
//! for v in 1..=6 {
//!     tx.push(v);
//! }
//!
//! rx.swap_buffers();
//! let drained: Vec<_> = core::iter::from_fn(|| rx.pop()).collect();
//! assert_eq!(drained, vec![6, 5, 4, 3]);
//! ```

use core::cell::UnsafeCell;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

const BACK_SELECT: usize = 0b01;
const BUSY: usize = 0b10;
const GENERATION_SHIFT: u32 = 2;

/// Spins before the consumer starts yielding to a preempted producer.
const SPINS_BEFORE_YIELD: u32 = 64;

/// One half of the double buffer.
///
/// `head` is the next write slot (wrapping at `N`); `len` saturates at `N`.
/// Both are only written by whichever side currently owns the buffer's role.
struct Buffer<T> {
    head: AtomicUsize,
    len: AtomicUsize,
    slots: Box<[UnsafeCell<T>]>,
}

impl<T: Copy + Default> Buffer<T> {
    fn new(capacity: usize) -> Self {
        Self {
            head: AtomicUsize::new(0),
            len: AtomicUsize::new(0),
            slots: (0..capacity).map(|_| UnsafeCell::new(T::default())).collect(),
        }
    }
}

struct Shared<T, const N: usize> {
    state: AtomicUsize,
    buffers: [Buffer<T>; 2],
}

impl<T, const N: usize> Shared<T, N> {
    #[inline]
    fn back(&self, state: usize) -> &Buffer<T> {
        &self.buffers[state & BACK_SELECT]
    }

    #[inline]
    fn front(&self, state: usize) -> &Buffer<T> {
        &self.buffers[(state & BACK_SELECT) ^ 1]
    }
}

#[allow(unsafe_code)]
// SAFETY: slot contents are only accessed through `EventProducer::push` and
// `EventConsumer::pop`. Both take `&mut self` on non-cloneable handles, so
// there is at most one writer and one reader. The writer only touches the
// buffer selected by the state word it marked busy, and the reader only
// touches the other one; `swap_buffers` cannot change the selection while
// busy is set. Acquire/release on the state word orders slot accesses
// across role changes.
unsafe impl<T: Send, const N: usize> Sync for Shared<T, N> {}

/// Create a stack with `N` slots per buffer and split it into its two ends.
pub fn event_stack<T, const N: usize>() -> (EventProducer<T, N>, EventConsumer<T, N>)
where
    T: Copy + Default + Send,
{
    const { assert!(N > 0, "event stack capacity must be non-zero") };

    let shared = Arc::new(Shared {
        state: AtomicUsize::new(0),
        buffers: [Buffer::new(N), Buffer::new(N)],
    });

    #[cfg(feature = "tracing")]
    tracing::debug!("event_stack: capacity {N} per buffer");

    (
        EventProducer {
            shared: Arc::clone(&shared),
        },
        EventConsumer { shared },
    )
}

/// Realtime-side handle. Wait-free, allocation-free.
pub struct EventProducer<T, const N: usize> {
    shared: Arc<Shared<T, N>>,
}

impl<T: Copy, const N: usize> EventProducer<T, N> {
    /// Append `value` to the back buffer, overwriting the oldest entry when
    /// the buffer is full.
    #[allow(unsafe_code)]
    #[inline]
    pub fn push(&mut self, value: T) {
        let shared = &*self.shared;
        let state = shared.state.fetch_or(BUSY, Ordering::Acquire);
        debug_assert_eq!(state & BUSY, 0, "producer already busy");

        let buffer = shared.back(state);
        let head = buffer.head.load(Ordering::Relaxed);

        // SAFETY: `head < N` by construction. The busy bit pins this buffer
        // as `back` until the `fetch_and` below, so the consumer is not
        // reading it.
        unsafe {
            *buffer.slots[head].get() = value;
        }

        buffer.head.store((head + 1) % N, Ordering::Relaxed);
        let len = buffer.len.load(Ordering::Relaxed);
        buffer.len.store((len + 1).min(N), Ordering::Relaxed);

        shared.state.fetch_and(!BUSY, Ordering::Release);
    }

    /// Advisory count of events waiting in the back buffer.
    pub fn num_elements(&self) -> usize {
        num_elements(&self.shared)
    }

    /// Slots per buffer.
    pub const fn capacity(&self) -> usize {
        N
    }
}

/// UI-side handle.
pub struct EventConsumer<T, const N: usize> {
    shared: Arc<Shared<T, N>>,
}

impl<T: Copy, const N: usize> EventConsumer<T, N> {
    /// Exchange the `front` and `back` roles.
    ///
    /// The buffer the producer was filling becomes drainable, and the
    /// previously drained buffer goes back to the producer, emptied. Events
    /// left unpopped from the previous epoch are discarded. Waits out an
    /// in-flight push, if any.
    pub fn swap_buffers(&mut self) {
        let state_word = &self.shared.state;
        let mut state = state_word.load(Ordering::Relaxed);
        let mut spins = 0_u32;

        // Only this handle moves the back selection, so `front` is stable
        // here. The release CAS below publishes the reset to the producer.
        let front = self.shared.front(state);
        front.head.store(0, Ordering::Relaxed);
        front.len.store(0, Ordering::Relaxed);

        loop {
            if state & BUSY != 0 {
                if spins < SPINS_BEFORE_YIELD {
                    spins += 1;
                    core::hint::spin_loop();
                } else {
                    std::thread::yield_now();
                }
                state = state_word.load(Ordering::Relaxed);
                continue;
            }

            let next = (state ^ BACK_SELECT).wrapping_add(1 << GENERATION_SHIFT);
            match state_word.compare_exchange_weak(
                state,
                next,
                Ordering::AcqRel,
                Ordering::Relaxed,
            ) {
                Ok(_) => return,
                Err(actual) => state = actual,
            }
        }
    }

    /// Pop the most recently pushed value from the front buffer.
    ///
    /// Returns `None` once the front buffer is empty.
    #[allow(unsafe_code)]
    pub fn pop(&mut self) -> Option<T> {
        let state = self.shared.state.load(Ordering::Acquire);
        let buffer = self.shared.front(state);

        let len = buffer.len.load(Ordering::Relaxed);
        if len == 0 {
            return None;
        }
        let slot = (buffer.head.load(Ordering::Relaxed) + N - 1) % N;

        // SAFETY: only the consumer changes the back selection, so the front
        // buffer stays front for this call, and no push can be in flight on
        // it (swaps wait for the busy bit to clear).
        let value = unsafe { *buffer.slots[slot].get() };

        buffer.head.store(slot, Ordering::Relaxed);
        buffer.len.store(len - 1, Ordering::Relaxed);
        Some(value)
    }

    /// Swap buffers and pop everything that was pending, newest first.
    pub fn drain(&mut self) -> Drain<'_, T, N> {
        self.swap_buffers();
        Drain { consumer: self }
    }

    /// Advisory count of events waiting in the back buffer.
    pub fn num_elements(&self) -> usize {
        num_elements(&self.shared)
    }

    /// Number of completed swaps. Wraps on overflow.
    pub fn generation(&self) -> usize {
        self.shared.state.load(Ordering::Acquire) >> GENERATION_SHIFT
    }

    /// Slots per buffer.
    pub const fn capacity(&self) -> usize {
        N
    }
}

/// Iterator returned by [`EventConsumer::drain`].
pub struct Drain<'a, T: Copy, const N: usize> {
    consumer: &'a mut EventConsumer<T, N>,
}

impl<T: Copy, const N: usize> Iterator for Drain<'_, T, N> {
    type Item = T;

    fn next(&mut self) -> Option<T> {
        self.consumer.pop()
    }
}

fn num_elements<T, const N: usize>(shared: &Shared<T, N>) -> usize {
    let state = shared.state.load(Ordering::Acquire);
    shared.back(state).len.load(Ordering::Relaxed)
}
