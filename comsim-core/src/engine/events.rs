//! Event entries and their ordering in the scheduler queue.

use std::cmp::Ordering;

use super::clock::SimTime;

/// Priority levels for events that share a timestamp.
///
/// Lower numeric values run first. Deliveries use `High` so a reception is
/// processed before the medium is released at the same instant.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum EventPriority {
    /// Message deliveries
    High = 0,
    /// Timers, transmissions and medium releases
    #[default]
    Normal = 1,
    /// Work that should observe everything else at the same instant
    Low = 2,
}

/// Event payload scheduled for a specific `(time, priority)`.
///
/// The sequence number records insertion order and breaks remaining ties,
/// so equal `(time, priority)` keys run first-in first-out.
#[derive(Debug, Clone)]
pub struct ScheduledEvent<E> {
    /// Scheduled execution time
    pub time: SimTime,
    /// Priority for events at the same time
    pub priority: EventPriority,
    /// Insertion order
    pub sequence: u64,
    /// Deferred work
    pub event: E,
}

impl<E> ScheduledEvent<E> {
    fn key(&self) -> (SimTime, EventPriority, u64) {
        (self.time, self.priority, self.sequence)
    }
}

impl<E> PartialEq for ScheduledEvent<E> {
    fn eq(&self, other: &Self) -> bool {
        self.sequence == other.sequence
    }
}

impl<E> Eq for ScheduledEvent<E> {}

impl<E> Ord for ScheduledEvent<E> {
    fn cmp(&self, other: &Self) -> Ordering {
        // Reversed: BinaryHeap is a max-heap, the earliest key must pop first
        other.key().cmp(&self.key())
    }
}

impl<E> PartialOrd for ScheduledEvent<E> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}
