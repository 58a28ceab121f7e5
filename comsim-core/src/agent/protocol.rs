//! Protocol participant: outbound queue, byte counters and the agent glue.

use std::any::Any;
use std::collections::VecDeque;
use std::fmt;

use tracing::warn;

use super::flights::FlightStructure;
use super::handshake::HandshakeState;
use super::policy::RetransmissionPolicy;
use super::role::{Client, Role, Server};
use super::{Agent, AgentCore, AgentId, AgentTimer};
use crate::context::SimContext;
use crate::engine::SimTime;
use crate::medium::{Medium, MediumId};
use crate::message::Message;
use crate::report::AgentStatistics;
use crate::Result;

/// Callback invoked once when the handshake completes on this agent.
///
/// The context gives access to the completion time and can request other
/// agents to stop, e.g. switching off interference.
pub type CompletionHook = Box<dyn FnMut(&mut SimContext<'_>)>;

#[derive(Debug, Clone)]
pub(super) struct QueuedMessage {
    pub(super) message: Message,
    pub(super) receiver: Option<AgentId>,
    pub(super) enqueued_at: SimTime,
}

/// One side of a flight-based handshake.
///
/// Owns the outbound queue and byte counters, and drives the flight state
/// machine. The [`Role`] decides which flights this side transmits.
pub struct ProtocolAgent {
    pub(super) core: AgentCore,
    pub(super) role: Box<dyn Role>,
    pub(super) flights: FlightStructure,
    pub(super) policy: RetransmissionPolicy,
    pub(super) peer: Option<AgentId>,
    pub(super) queue: VecDeque<QueuedMessage>,
    pub(super) tx_bytes: u64,
    pub(super) rx_bytes: u64,
    pub(super) state: HandshakeState,
    pub(super) on_complete: Option<CompletionHook>,
}

impl ProtocolAgent {
    /// Creates a handshake participant with an explicit role.
    pub fn new(
        name: impl Into<String>,
        role: impl Role + 'static,
        flights: FlightStructure,
        policy: RetransmissionPolicy,
    ) -> Self {
        let state = HandshakeState::new(&flights);
        Self {
            core: AgentCore::new(name),
            role: Box::new(role),
            flights,
            policy,
            peer: None,
            queue: VecDeque::new(),
            tx_bytes: 0,
            rx_bytes: 0,
            state,
            on_complete: None,
        }
    }

    /// Creates the initiating side (even flights).
    pub fn client(
        name: impl Into<String>,
        flights: FlightStructure,
        policy: RetransmissionPolicy,
    ) -> Self {
        Self::new(name, Client, flights, policy)
    }

    /// Creates the responding side (odd flights).
    pub fn server(
        name: impl Into<String>,
        flights: FlightStructure,
        policy: RetransmissionPolicy,
    ) -> Self {
        Self::new(name, Server, flights, policy)
    }

    /// Sets the hook invoked once on handshake completion.
    pub fn with_completion_hook(
        mut self,
        hook: impl FnMut(&mut SimContext<'_>) + 'static,
    ) -> Self {
        self.on_complete = Some(Box::new(hook));
        self
    }

    /// Sends flights to `peer` only instead of broadcasting them.
    pub fn set_peer(&mut self, peer: AgentId) {
        self.peer = Some(peer);
    }

    /// Returns the role of this side.
    pub fn role(&self) -> &dyn Role {
        self.role.as_ref()
    }

    /// Returns the flight structure.
    pub fn flights(&self) -> &FlightStructure {
        &self.flights
    }

    /// Returns the retransmission policy.
    pub fn policy(&self) -> &RetransmissionPolicy {
        &self.policy
    }

    /// Returns bytes handed to the medium.
    pub fn tx_bytes(&self) -> u64 {
        self.tx_bytes
    }

    /// Returns bytes delivered to this agent.
    pub fn rx_bytes(&self) -> u64 {
        self.rx_bytes
    }

    /// Returns number of messages waiting for the medium.
    pub fn queue_len(&self) -> usize {
        self.queue.len()
    }

    /// Appends `message` to the outbound queue and asks for the medium.
    ///
    /// # Errors
    /// - `SimulationError::NotRegistered` - Agent has no medium
    pub fn enqueue(
        &mut self,
        message: Message,
        receiver: Option<AgentId>,
        ctx: &mut SimContext<'_>,
    ) -> Result<()> {
        let (_, medium) = self.core.registration()?;

        self.queue.push_back(QueuedMessage {
            message,
            receiver,
            enqueued_at: ctx.now(),
        });

        if let (Some(oldest), Some(newest)) = (self.queue.front(), self.queue.back()) {
            let backlog = newest.enqueued_at.since(oldest.enqueued_at);
            if backlog > 0.0 {
                warn!(
                    agent = self.core.name(),
                    backlog,
                    queued = self.queue.len(),
                    "Outbound queue congested"
                );
                let text = format!(
                    "{} queue congested: oldest message waiting {backlog:.3}s",
                    self.core.name()
                );
                ctx.log(text);
            }
        }

        ctx.request_arbitration(medium);
        Ok(())
    }

    /// Queues an unmodelled message outside the handshake.
    ///
    /// # Errors
    /// - `SimulationError::NotRegistered` - Agent has no medium
    pub fn send_plain(
        &mut self,
        name: impl Into<String>,
        receiver: Option<AgentId>,
        ctx: &mut SimContext<'_>,
    ) -> Result<()> {
        self.enqueue(Message::plain(name), receiver, ctx)
    }
}

impl fmt::Debug for ProtocolAgent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProtocolAgent")
            .field("name", &self.core.name())
            .field("role", &self.role.label())
            .field("current_flight", &self.state.current_flight)
            .field("done", &self.state.done)
            .field("queued", &self.queue.len())
            .finish()
    }
}

impl Agent for ProtocolAgent {
    fn name(&self) -> &str {
        self.core.name()
    }

    fn medium(&self) -> Option<MediumId> {
        self.core.medium()
    }

    fn attach(&mut self, id: AgentId, medium: MediumId) {
        self.core.attach(id, medium);
    }

    fn offer(&mut self, medium: &mut Medium, ctx: &mut SimContext<'_>) -> Result<bool> {
        let (id, _) = self.core.registration()?;
        let Some(queued) = self.queue.pop_front() else {
            return Ok(false);
        };

        let length = queued.message.length() as u64;
        medium.initiate_transmission(queued.message, id, queued.receiver, ctx)?;
        self.tx_bytes += length;
        Ok(true)
    }

    fn receive(&mut self, message: Message, sender: AgentId, ctx: &mut SimContext<'_>) -> Result<()> {
        self.handle_reception(message, sender, ctx)
    }

    fn on_timer(&mut self, timer: AgentTimer, ctx: &mut SimContext<'_>) -> Result<()> {
        match timer {
            AgentTimer::FlightTimeout { flight } => self.check_flight(flight, ctx),
            _ => Ok(()),
        }
    }

    fn trigger(&mut self, ctx: &mut SimContext<'_>) -> Result<()> {
        let text = format!("{} starting handshake", self.core.name());
        ctx.log(text);
        self.transmit_flight(self.state.current_flight, ctx)
    }

    fn has_pending_work(&self) -> bool {
        !self.queue.is_empty()
    }

    fn statistics(&self) -> Option<AgentStatistics> {
        Some(self.handshake_statistics())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}
