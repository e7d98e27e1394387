//! Engine clock and the deferred-action queue.
//!
//! The engine never sleeps on its own. Handlers that want something to
//! happen later return [`Action::Defer`]; the engine schedules the
//! payload here with a due instant and drains whatever has come due at
//! the top of each iteration. The clock behind those instants is
//! swappable so tests can advance time by hand instead of sleeping.

use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use overlink_types::Action;

// ---------------------------------------------------------------------------
// Clock
// ---------------------------------------------------------------------------

/// Source of the engine's notion of "now".
pub trait Clock {
    /// The current instant.
    fn now(&self) -> Instant;
}

/// The process monotonic clock. Used outside of tests.
#[derive(Clone, Copy, Debug, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

/// Clock advanced by hand.
///
/// Clones share the same instant, so a test can keep one handle while
/// the engine owns another and move both forward together.
#[derive(Clone)]
pub struct ManualClock {
    now: Arc<Mutex<Instant>>,
}

impl ManualClock {
    /// Creates a clock frozen at the current instant.
    pub fn new() -> Self {
        Self {
            now: Arc::new(Mutex::new(Instant::now())),
        }
    }

    /// Moves the clock forward by `step`.
    pub fn advance(&self, step: Duration) {
        // A poisoned lock means a test thread panicked; the instant
        // inside is still valid.
        let mut now = self.now.lock().unwrap_or_else(|e| e.into_inner());
        *now += step;
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Instant {
        *self.now.lock().unwrap_or_else(|e| e.into_inner())
    }
}

// ---------------------------------------------------------------------------
// DeferredQueue
// ---------------------------------------------------------------------------

/// One scheduled batch of actions.
struct DeferredEntry {
    due: Instant,
    /// Tie-breaker: batches scheduled for the same instant run in
    /// scheduling order.
    seq: u64,
    actions: Vec<Action>,
}

// `BinaryHeap` is a max-heap; the ordering is reversed on (due, seq) so
// the earliest batch surfaces first.
impl Ord for DeferredEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .due
            .cmp(&self.due)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

impl PartialOrd for DeferredEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for DeferredEntry {
    fn eq(&self, other: &Self) -> bool {
        self.due == other.due && self.seq == other.seq
    }
}

impl Eq for DeferredEntry {}

/// Priority queue of action batches keyed by due instant.
#[derive(Default)]
pub struct DeferredQueue {
    heap: BinaryHeap<DeferredEntry>,
    next_seq: u64,
}

impl DeferredQueue {
    /// Creates an empty queue.
    pub fn new() -> Self {
        Self::default()
    }

    /// Schedules `actions` to run at `due`.
    pub fn schedule(&mut self, due: Instant, actions: Vec<Action>) {
        let seq = self.next_seq;
        self.next_seq += 1;
        self.heap.push(DeferredEntry { due, seq, actions });
    }

    /// Removes and returns every batch due at or before `now`, earliest
    /// first.
    pub fn pop_due(&mut self, now: Instant) -> Vec<Vec<Action>> {
        let mut due = Vec::new();
        loop {
            match self.heap.peek() {
                Some(entry) if entry.due <= now => {}
                _ => break,
            }
            if let Some(entry) = self.heap.pop() {
                due.push(entry.actions);
            }
        }
        due
    }

    /// The earliest due instant, if any batch is queued.
    pub fn next_due(&self) -> Option<Instant> {
        self.heap.peek().map(|entry| entry.due)
    }

    /// Number of queued batches.
    pub fn len(&self) -> usize {
        self.heap.len()
    }

    /// True if nothing is queued.
    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
