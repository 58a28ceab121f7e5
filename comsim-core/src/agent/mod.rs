//! Participants registered with a medium.
//!
//! Every agent answers one question when the medium is offered to it: "do I
//! need the channel right now?" If yes, it uses the channel and claims it.
//! Interference generators ([`BlockingAgent`]) and handshake participants
//! ([`ProtocolAgent`]) are the two concrete kinds.

mod blocking;
mod flights;
mod handshake;
mod policy;
mod protocol;
mod role;

use std::any::Any;
use std::fmt;
use std::marker::PhantomData;

use serde::{Deserialize, Serialize};

pub use blocking::BlockingAgent;
pub use flights::FlightStructure;
pub use policy::RetransmissionPolicy;
pub use protocol::{CompletionHook, ProtocolAgent};
pub use role::{Client, Role, Server};

use crate::context::SimContext;
use crate::medium::{Medium, MediumId};
use crate::message::Message;
use crate::report::AgentStatistics;
use crate::{Result, SimulationError};

/// Identifier of an agent within a [`Simulation`](crate::Simulation).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct AgentId(pub(crate) usize);

impl AgentId {
    /// Returns the raw index.
    pub fn index(self) -> usize {
        self.0
    }
}

impl fmt::Display for AgentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "agent#{}", self.0)
    }
}

/// Typed reference to an agent owned by a simulation.
///
/// Returned by [`Simulation::add_agent`](crate::Simulation::add_agent) so the
/// concrete agent can be read back after a run without guessing its type.
pub struct AgentHandle<T> {
    id: AgentId,
    _marker: PhantomData<fn() -> T>,
}

impl<T> AgentHandle<T> {
    pub(crate) fn new(id: AgentId) -> Self {
        Self {
            id,
            _marker: PhantomData,
        }
    }

    /// Returns the untyped identifier.
    pub fn id(self) -> AgentId {
        self.id
    }
}

impl<T> Clone for AgentHandle<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for AgentHandle<T> {}

impl<T> fmt::Debug for AgentHandle<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("AgentHandle").field(&self.id).finish()
    }
}

impl<T> From<AgentHandle<T>> for AgentId {
    fn from(handle: AgentHandle<T>) -> Self {
        handle.id
    }
}

/// Timers an agent can schedule for itself.
///
/// Timers are never cancelled. A timer that became irrelevant is recognised
/// and ignored when it fires.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AgentTimer {
    /// Start the agent's protocol activity
    Trigger,
    /// Retransmission timeout guarding a flight
    FlightTimeout {
        /// Flight index
        flight: usize,
    },
    /// Periodic interference request
    BlockerTick {
        /// Start/stop cycle the tick belongs to
        generation: u64,
    },
    /// Minimum separation after an own occupancy has elapsed
    SeparationElapsed,
    /// Timer of an agent defined outside this crate
    Custom(u64),
}

/// Participant registered with exactly one [`Medium`].
pub trait Agent: Any {
    /// Returns the agent's unique name.
    fn name(&self) -> &str;

    /// Returns the medium the agent is registered with.
    fn medium(&self) -> Option<MediumId>;

    /// Records the agent's identity and medium on registration.
    fn attach(&mut self, id: AgentId, medium: MediumId);

    /// Offers the free medium; returns true if the agent claimed it.
    ///
    /// # Errors
    /// Returns any error raised while occupying the medium.
    fn offer(&mut self, medium: &mut Medium, ctx: &mut SimContext<'_>) -> Result<bool>;

    /// Handles a delivered message.
    ///
    /// # Errors
    /// Returns any error raised by the agent's reaction to the message.
    fn receive(&mut self, message: Message, sender: AgentId, ctx: &mut SimContext<'_>) -> Result<()> {
        let text = format!(
            "{} received {message} from {}",
            self.name(),
            ctx.agent_name(sender)
        );
        ctx.log(text);
        Ok(())
    }

    /// Handles one of the agent's own timers.
    ///
    /// # Errors
    /// Returns any error raised by the agent's reaction to the timer.
    fn on_timer(&mut self, _timer: AgentTimer, _ctx: &mut SimContext<'_>) -> Result<()> {
        Ok(())
    }

    /// Starts the agent's protocol activity.
    ///
    /// # Errors
    /// Returns any error raised while starting.
    fn trigger(&mut self, _ctx: &mut SimContext<'_>) -> Result<()> {
        Ok(())
    }

    /// Starts periodic background activity.
    ///
    /// # Errors
    /// Returns any error raised while starting.
    fn start(&mut self, _ctx: &mut SimContext<'_>) -> Result<()> {
        Ok(())
    }

    /// Stops periodic background activity.
    fn stop(&mut self, _ctx: &mut SimContext<'_>) {}

    /// Checks if the agent holds work that has not reached the medium yet.
    fn has_pending_work(&self) -> bool {
        false
    }

    /// Returns protocol statistics, if the agent keeps any.
    fn statistics(&self) -> Option<AgentStatistics> {
        None
    }

    /// Returns the agent as `Any` for typed access.
    fn as_any(&self) -> &dyn Any;

    /// Returns the agent as mutable `Any` for typed access.
    fn as_any_mut(&mut self) -> &mut dyn Any;
}

/// Identity and registration state shared by the concrete agents.
#[derive(Debug, Clone)]
pub(crate) struct AgentCore {
    name: String,
    id: Option<AgentId>,
    medium: Option<MediumId>,
}

impl AgentCore {
    pub(crate) fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            id: None,
            medium: None,
        }
    }

    pub(crate) fn name(&self) -> &str {
        &self.name
    }

    pub(crate) fn medium(&self) -> Option<MediumId> {
        self.medium
    }

    pub(crate) fn attach(&mut self, id: AgentId, medium: MediumId) {
        self.id = Some(id);
        self.medium = Some(medium);
    }

    /// Returns identity and medium, failing for unregistered agents.
    pub(crate) fn registration(&self) -> Result<(AgentId, MediumId)> {
        match (self.id, self.medium) {
            (Some(id), Some(medium)) => Ok((id, medium)),
            _ => Err(SimulationError::NotRegistered {
                name: self.name.clone(),
            }),
        }
    }
}
