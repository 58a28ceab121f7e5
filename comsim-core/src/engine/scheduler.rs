//! Single-threaded discrete-event scheduler.

use std::collections::BinaryHeap;

use tracing::trace;

use super::clock::SimTime;
use super::events::{EventPriority, ScheduledEvent};
use crate::{Result, SimulationError};

/// Time-ordered event queue that owns simulation time.
///
/// Events run in non-decreasing time order; equal times are ordered by
/// [`EventPriority`] and then by insertion order. Scheduling into the past is
/// rejected, so time never moves backwards.
#[derive(Debug)]
pub struct Scheduler<E> {
    current_time: SimTime,
    queue: BinaryHeap<ScheduledEvent<E>>,
    next_sequence: u64,
    events_processed: u64,
}

impl<E> Default for Scheduler<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E> Scheduler<E> {
    /// Creates an empty scheduler at time zero.
    pub fn new() -> Self {
        Self {
            current_time: SimTime::ZERO,
            queue: BinaryHeap::new(),
            next_sequence: 0,
            events_processed: 0,
        }
    }

    /// Returns current simulation time.
    pub fn now(&self) -> SimTime {
        self.current_time
    }

    /// Returns true iff no events are pending.
    pub fn is_idle(&self) -> bool {
        self.queue.is_empty()
    }

    /// Returns number of pending events.
    pub fn pending(&self) -> usize {
        self.queue.len()
    }

    /// Returns number of events executed so far.
    pub fn events_processed(&self) -> u64 {
        self.events_processed
    }

    /// Checks if any pending event satisfies `predicate`.
    pub fn any_pending(&self, predicate: impl Fn(&E) -> bool) -> bool {
        self.queue.iter().any(|entry| predicate(&entry.event))
    }

    /// Returns the time of the next pending event.
    pub fn next_event_time(&self) -> Option<SimTime> {
        self.queue.peek().map(|entry| entry.time)
    }

    /// Schedules an event at an absolute time and returns that time.
    ///
    /// # Errors
    /// - `SimulationError::InvalidTime` - Time is not finite
    /// - `SimulationError::PastScheduling` - Time lies before the current time
    pub fn schedule_at(
        &mut self,
        event: E,
        time: SimTime,
        priority: EventPriority,
    ) -> Result<SimTime> {
        if !time.is_finite() {
            return Err(SimulationError::InvalidTime {
                value: time.as_secs(),
            });
        }
        if time < self.current_time {
            return Err(SimulationError::PastScheduling {
                requested: time,
                now: self.current_time,
            });
        }

        let sequence = self.next_sequence;
        self.next_sequence += 1;
        self.queue.push(ScheduledEvent {
            time,
            priority,
            sequence,
            event,
        });

        Ok(time)
    }

    /// Schedules an event `delay` seconds after the current time.
    ///
    /// # Errors
    /// - `SimulationError::InvalidTime` - Delay is not finite
    /// - `SimulationError::PastScheduling` - Delay is negative
    pub fn schedule_after(
        &mut self,
        event: E,
        delay: f64,
        priority: EventPriority,
    ) -> Result<SimTime> {
        if !delay.is_finite() {
            return Err(SimulationError::InvalidTime { value: delay });
        }
        self.schedule_at(event, self.current_time.after(delay), priority)
    }

    /// Pops the earliest event and advances time to it.
    ///
    /// Returns `None` without touching the clock when the queue is empty.
    ///
    /// # Errors
    /// - `SimulationError::PastEvent` - Popped event lies before the current time
    pub fn pop_next(&mut self) -> Result<Option<ScheduledEvent<E>>> {
        let Some(entry) = self.queue.pop() else {
            return Ok(None);
        };

        if entry.time < self.current_time {
            return Err(SimulationError::PastEvent {
                event_time: entry.time,
                now: self.current_time,
            });
        }

        self.current_time = entry.time;
        self.events_processed += 1;
        trace!(
            time = entry.time.as_secs(),
            sequence = entry.sequence,
            "Dispatching event"
        );

        Ok(Some(entry))
    }

    /// Executes the earliest event with `handler` and returns the new time.
    ///
    /// The handler receives the scheduler so it can schedule follow-up work,
    /// including at the current instant.
    ///
    /// # Errors
    /// - `SimulationError::PastEvent` - Popped event lies before the current time
    /// - Any error returned by `handler`
    pub fn run_step<F>(&mut self, mut handler: F) -> Result<SimTime>
    where
        F: FnMut(&mut Self, E) -> Result<()>,
    {
        if let Some(entry) = self.pop_next()? {
            handler(self, entry.event)?;
        }
        Ok(self.current_time)
    }

    /// Executes events until the queue is empty.
    ///
    /// # Errors
    /// - `SimulationError::PastEvent` - Popped event lies before the current time
    /// - Any error returned by `handler`
    pub fn run<F>(&mut self, mut handler: F) -> Result<()>
    where
        F: FnMut(&mut Self, E) -> Result<()>,
    {
        while !self.is_idle() {
            self.run_step(&mut handler)?;
        }
        Ok(())
    }

    /// Discards all pending events and rewinds time to zero.
    pub fn reset(&mut self) {
        self.current_time = SimTime::ZERO;
        self.queue.clear();
        self.next_sequence = 0;
        self.events_processed = 0;
    }
}
