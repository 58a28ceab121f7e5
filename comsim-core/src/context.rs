//! Event payloads and the context handed to components while an event runs.

use crate::agent::{AgentId, AgentTimer};
use crate::engine::{DeterministicRng, EventPriority, Scheduler, SimTime};
use crate::log::Transcript;
use crate::medium::{MediumId, Transmission};
use crate::message::Message;
use crate::Result;

/// Deferred work understood by [`Simulation`](crate::Simulation).
#[derive(Debug, Clone)]
pub(crate) enum SimEvent {
    /// Occupancy episode ends; the medium is offered again
    Unblock { medium: MediumId },
    /// Slot reached; the medium decides who receives the message
    Transmit {
        medium: MediumId,
        transmission: Transmission,
    },
    /// Message arrives at a receiver
    Deliver {
        receiver: AgentId,
        sender: AgentId,
        message: Message,
    },
    /// Agent-owned timer fires
    Timer { agent: AgentId, timer: AgentTimer },
}

impl SimEvent {
    /// Checks if the event only keeps interference going.
    ///
    /// Medium releases count as background: an agent waiting behind one
    /// still has queued work.
    pub(crate) fn is_background(&self) -> bool {
        matches!(
            self,
            SimEvent::Unblock { .. }
                | SimEvent::Timer {
                    timer: AgentTimer::BlockerTick { .. } | AgentTimer::SeparationElapsed,
                    ..
                }
        )
    }
}

/// Follow-up work collected while an event runs and applied afterwards.
#[derive(Debug, Default)]
pub(crate) struct Requests {
    pub(crate) arbitration: Vec<MediumId>,
    pub(crate) stops: Vec<AgentId>,
}

impl Requests {
    pub(crate) fn is_empty(&self) -> bool {
        self.arbitration.is_empty() && self.stops.is_empty()
    }
}

/// Access to time, scheduling, randomness and the transcript during an event.
///
/// Components never call each other re-entrantly. Instead they record
/// requests here (arbitrate a medium, stop an agent) which the simulation
/// applies once the current handler returns, still at the same instant.
pub struct SimContext<'a> {
    pub(crate) scheduler: &'a mut Scheduler<SimEvent>,
    pub(crate) rng: &'a mut DeterministicRng,
    pub(crate) transcript: &'a mut Transcript,
    pub(crate) names: &'a [String],
    pub(crate) requests: &'a mut Requests,
}

impl SimContext<'_> {
    /// Returns current simulation time.
    pub fn now(&self) -> SimTime {
        self.scheduler.now()
    }

    /// Writes a line to the transcript.
    pub fn log(&mut self, text: impl AsRef<str>) {
        let now = self.scheduler.now();
        self.transcript.log(now, text.as_ref());
    }

    /// Returns the name of an agent, or `"?"` for unknown identifiers.
    pub fn agent_name(&self, agent: AgentId) -> &str {
        self.names
            .get(agent.index())
            .map(String::as_str)
            .unwrap_or("?")
    }

    /// Schedules `timer` for `agent` after `delay` seconds.
    ///
    /// # Errors
    /// - `SimulationError::InvalidTime` - Delay is not finite
    /// - `SimulationError::PastScheduling` - Delay is negative
    pub fn schedule_timer(
        &mut self,
        agent: AgentId,
        delay: f64,
        timer: AgentTimer,
    ) -> Result<SimTime> {
        self.schedule(SimEvent::Timer { agent, timer }, delay, EventPriority::Normal)
    }

    /// Asks the simulation to offer `medium` once the current handler returns.
    pub fn request_arbitration(&mut self, medium: MediumId) {
        if !self.requests.arbitration.contains(&medium) {
            self.requests.arbitration.push(medium);
        }
    }

    /// Asks the simulation to stop `agent` once the current handler returns.
    pub fn request_stop(&mut self, agent: AgentId) {
        if !self.requests.stops.contains(&agent) {
            self.requests.stops.push(agent);
        }
    }

    pub(crate) fn schedule(
        &mut self,
        event: SimEvent,
        delay: f64,
        priority: EventPriority,
    ) -> Result<SimTime> {
        self.scheduler.schedule_after(event, delay, priority)
    }

    pub(crate) fn random_bool(&mut self, probability: f64) -> bool {
        self.rng.random_bool(probability)
    }
}
