//! Discrete-event engine: simulated time, event ordering and the scheduler.
//!
//! The engine is single threaded. Concurrency between agents is simulated by
//! interleaving event timestamps, never by real threads.

mod clock;
mod events;
mod scheduler;

pub use clock::{DeterministicRng, SimTime};
pub use events::{EventPriority, ScheduledEvent};
pub use scheduler::Scheduler;
