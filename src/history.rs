// ============================================================================
// QUEUE OCCUPANCY HISTORY
// ============================================================================
// Bounded, per-socket memory of recent queue occupancy.
//
// === WHAT IS KEPT ===
// - Samples: (round timestamp, occupancy) for every round a socket was
//   reported
// - Events: (start, peak, end) triples built by the caller to describe one
//   congestion episode
//
// Both live in fixed-capacity rings. Inserting into a full ring overwrites
// the oldest element; there is no notification and no reallocation.
//
// === READING A RING ===
// - `samples()` / `events()`: look without touching the ring
// - `drain_samples()` / `drain_events()`: hand items out and forget them,
//   one at a time, so a consumer that stops early leaves the rest in place
// - `map_active_*` / `consume_active_*`: the same two traversals driven by
//   a closure that can stop them with `ControlFlow::Break`

use std::collections::HashMap;
use std::iter::FusedIterator;
use std::net::SocketAddr;
use std::ops::ControlFlow;

use crate::procnet::RoundTimestamp;

// ============================================================================
// CONSTANTS
// ============================================================================

/// Samples kept per socket pair unless the operator asks otherwise
///
/// With the default 10 ms sleep that is the last 100 ms of a busy socket.
pub const DEFAULT_SAMPLE_CAPACITY: usize = 10;

/// Events kept per socket pair
pub const DEFAULT_EVENT_CAPACITY: usize = 4;

// ============================================================================
// RECORDS
// ============================================================================

/// Queue occupancy of one socket in one round
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Sample {
    pub timestamp: RoundTimestamp,
    /// Bytes queued
    pub occupancy: u32,
}

impl Sample {
    #[must_use]
    pub const fn new(timestamp: RoundTimestamp, occupancy: u32) -> Self {
        Self {
            timestamp,
            occupancy,
        }
    }
}

/// One congestion episode: where it started, peaked and ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Event {
    pub start: Sample,
    pub peak: Sample,
    pub end: Sample,
}

// ============================================================================
// RING
// ============================================================================

/// Fixed-capacity ring that overwrites its oldest item when full
///
/// `slots` grows by push until it reaches `capacity` and is then reused in
/// place. The valid window is `len` items starting at `first`, wrapping.
#[derive(Debug, Clone)]
struct Ring<T> {
    slots: Vec<T>,
    capacity: usize,
    first: usize,
    len: usize,
}

impl<T: Copy> Ring<T> {
    fn with_capacity(capacity: usize) -> Self {
        Self {
            slots: Vec::with_capacity(capacity),
            capacity,
            first: 0,
            len: 0,
        }
    }

    fn insert(&mut self, item: T) {
        if self.capacity == 0 {
            return;
        }

        // While the ring has never wrapped, first + len == slots.len()
        let index = (self.first + self.len) % self.capacity;
        if index == self.slots.len() {
            self.slots.push(item);
        } else {
            self.slots[index] = item;
        }

        if self.len == self.capacity {
            self.first = (self.first + 1) % self.capacity;
        } else {
            self.len += 1;
        }
    }

    fn iter(&self) -> Iter<'_, T> {
        Iter {
            ring: self,
            offset: 0,
        }
    }

    fn drain(&mut self) -> Drain<'_, T> {
        Drain { ring: self }
    }

    /// Remove and return the oldest item
    fn pop_oldest(&mut self) -> Option<T> {
        if self.len == 0 {
            return None;
        }
        let item = self.slots[self.first];
        self.first = (self.first + 1) % self.capacity;
        self.len -= 1;
        Some(item)
    }

    fn visit<F>(&self, mut f: F) -> usize
    where
        F: FnMut(&T) -> ControlFlow<()>,
    {
        let mut visited = 0;
        for item in self.iter() {
            visited += 1;
            if f(item).is_break() {
                break;
            }
        }
        visited
    }

    fn consume<F>(&mut self, mut f: F) -> usize
    where
        F: FnMut(&T) -> ControlFlow<()>,
    {
        let mut delivered = 0;
        for item in self.drain() {
            delivered += 1;
            if f(&item).is_break() {
                break;
            }
        }
        delivered
    }
}

/// Oldest-to-newest view of a ring's valid window
#[derive(Debug)]
pub struct Iter<'a, T> {
    ring: &'a Ring<T>,
    offset: usize,
}

impl<'a, T> Iterator for Iter<'a, T> {
    type Item = &'a T;

    fn next(&mut self) -> Option<Self::Item> {
        if self.offset >= self.ring.len {
            return None;
        }
        let index = (self.ring.first + self.offset) % self.ring.capacity;
        self.offset += 1;
        Some(&self.ring.slots[index])
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let left = self.ring.len - self.offset;
        (left, Some(left))
    }
}

impl<T> ExactSizeIterator for Iter<'_, T> {}
impl<T> FusedIterator for Iter<'_, T> {}

/// Consuming oldest-to-newest traversal
///
/// Each `next()` removes the item it returns. Dropping the iterator early
/// keeps whatever was not yielded.
#[derive(Debug)]
pub struct Drain<'a, T> {
    ring: &'a mut Ring<T>,
}

impl<T: Copy> Iterator for Drain<'_, T> {
    type Item = T;

    fn next(&mut self) -> Option<T> {
        self.ring.pop_oldest()
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.ring.len, Some(self.ring.len))
    }
}

impl<T: Copy> ExactSizeIterator for Drain<'_, T> {}
impl<T: Copy> FusedIterator for Drain<'_, T> {}

// ============================================================================
// PER-SOCKET HISTORY
// ============================================================================

/// Sample and event rings of one socket pair
#[derive(Debug, Clone)]
pub struct History {
    samples: Ring<Sample>,
    events: Ring<Event>,
    last_updated: Option<RoundTimestamp>,
}

impl History {
    /// Empty history; a capacity of zero keeps nothing of that kind
    #[must_use]
    pub fn new(sample_capacity: usize, event_capacity: usize) -> Self {
        Self {
            samples: Ring::with_capacity(sample_capacity),
            events: Ring::with_capacity(event_capacity),
            last_updated: None,
        }
    }

    pub fn insert_sample(&mut self, timestamp: RoundTimestamp, occupancy: u32) {
        self.samples.insert(Sample::new(timestamp, occupancy));
        self.last_updated = Some(timestamp);
    }

    pub fn insert_event(&mut self, event: Event) {
        self.events.insert(event);
    }

    #[must_use]
    pub const fn sample_count(&self) -> usize {
        self.samples.len
    }

    #[must_use]
    pub const fn sample_capacity(&self) -> usize {
        self.samples.capacity
    }

    #[must_use]
    pub const fn event_count(&self) -> usize {
        self.events.len
    }

    #[must_use]
    pub const fn event_capacity(&self) -> usize {
        self.events.capacity
    }

    /// Timestamp of the newest sample ever inserted, drained or not
    #[must_use]
    pub const fn last_updated(&self) -> Option<RoundTimestamp> {
        self.last_updated
    }

    pub fn samples(&self) -> Iter<'_, Sample> {
        self.samples.iter()
    }

    pub fn drain_samples(&mut self) -> Drain<'_, Sample> {
        self.samples.drain()
    }

    pub fn events(&self) -> Iter<'_, Event> {
        self.events.iter()
    }

    pub fn drain_events(&mut self) -> Drain<'_, Event> {
        self.events.drain()
    }

    /// Visit the current samples oldest first, returning how many were seen
    pub fn map_active_samples<F>(&self, f: F) -> usize
    where
        F: FnMut(&Sample) -> ControlFlow<()>,
    {
        self.samples.visit(f)
    }

    /// Like `map_active_samples`, but every visited sample is removed,
    /// including the one that returned `Break`
    pub fn consume_active_samples<F>(&mut self, f: F) -> usize
    where
        F: FnMut(&Sample) -> ControlFlow<()>,
    {
        self.samples.consume(f)
    }

    pub fn map_active_events<F>(&self, f: F) -> usize
    where
        F: FnMut(&Event) -> ControlFlow<()>,
    {
        self.events.visit(f)
    }

    pub fn consume_active_events<F>(&mut self, f: F) -> usize
    where
        F: FnMut(&Event) -> ControlFlow<()>,
    {
        self.events.consume(f)
    }

    /// Largest occupancy among the current samples (the newest on ties)
    #[must_use]
    pub fn peak_sample(&self) -> Option<Sample> {
        self.samples().copied().max_by_key(|s| s.occupancy)
    }
}

impl Default for History {
    fn default() -> Self {
        Self::new(DEFAULT_SAMPLE_CAPACITY, DEFAULT_EVENT_CAPACITY)
    }
}

// ============================================================================
// HISTORY MANAGER
// ============================================================================

/// `(local, remote)` addresses identifying one socket
pub type SocketPair = (SocketAddr, SocketAddr);

#[derive(Debug)]
struct Tracked {
    history: History,
    /// Manager round in which the pair last got a sample
    last_round: u64,
}

/// Histories of every socket pair seen, created on first sample
#[derive(Debug)]
pub struct HistoryManager {
    histories: HashMap<SocketPair, Tracked>,
    sample_capacity: usize,
    event_capacity: usize,
    round: u64,
}

impl HistoryManager {
    #[must_use]
    pub fn new(sample_capacity: usize, event_capacity: usize) -> Self {
        Self {
            histories: HashMap::new(),
            sample_capacity,
            event_capacity,
            round: 0,
        }
    }

    /// Record one sample for `(local, remote)`
    pub fn add_sample(
        &mut self,
        local: SocketAddr,
        remote: SocketAddr,
        timestamp: RoundTimestamp,
        occupancy: u32,
    ) {
        let (sample_capacity, event_capacity) = (self.sample_capacity, self.event_capacity);
        let tracked = self
            .histories
            .entry((local, remote))
            .or_insert_with(|| Tracked {
                history: History::new(sample_capacity, event_capacity),
                last_round: 0,
            });
        tracked.history.insert_sample(timestamp, occupancy);
        tracked.last_round = self.round;
    }

    #[must_use]
    pub fn get(&self, local: SocketAddr, remote: SocketAddr) -> Option<&History> {
        self.histories.get(&(local, remote)).map(|t| &t.history)
    }

    pub fn get_mut(&mut self, local: SocketAddr, remote: SocketAddr) -> Option<&mut History> {
        self.histories
            .get_mut(&(local, remote))
            .map(|t| &mut t.history)
    }

    /// Number of socket pairs tracked
    #[must_use]
    pub fn len(&self) -> usize {
        self.histories.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.histories.is_empty()
    }

    /// Tracked pairs in no particular order
    pub fn iter(&self) -> impl Iterator<Item = (&SocketPair, &History)> {
        self.histories.iter().map(|(pair, t)| (pair, &t.history))
    }

    /// Close the current round and forget pairs idle for `max_idle_rounds`
    ///
    /// A pair sampled in the round being closed has been idle for zero
    /// rounds. Returns how many pairs were forgotten.
    pub fn forget_idle(&mut self, max_idle_rounds: u64) -> usize {
        let current = self.round;
        let before = self.histories.len();
        self.histories
            .retain(|_, t| current - t.last_round < max_idle_rounds);
        self.round += 1;
        before - self.histories.len()
    }
}

impl Default for HistoryManager {
    fn default() -> Self {
        Self::new(DEFAULT_SAMPLE_CAPACITY, DEFAULT_EVENT_CAPACITY)
    }
}
