//! Flight state machine of a handshake participant.
//!
//! Each side transmits its flights in turn and waits for the peer's next
//! flight. A retransmission timeout guards every flight but the last one; a
//! flight is resent when the peer shows no sign of having received it. The
//! last flight has no timeout of its own: its sender repeats it whenever the
//! complete penultimate flight arrives again, which is how the peer signals
//! that the last flight got lost (implicit acknowledgement).

use tracing::{debug, info, trace};

use super::flights::FlightStructure;
use super::protocol::ProtocolAgent;
use super::{AgentId, AgentTimer};
use crate::context::SimContext;
use crate::engine::SimTime;
use crate::message::{Message, ProtocolMessage};
use crate::report::{AgentStatistics, FlightStatistics, MessageStatistics};
use crate::{Result, SimulationError};

/// Per-run progress of one side of the handshake.
#[derive(Debug, Clone, Default)]
pub(crate) struct HandshakeState {
    /// Flight currently being transmitted or awaited
    pub(crate) current_flight: usize,
    /// Transmissions per flight
    pub(crate) tx_count: Vec<u32>,
    /// Receptions per flight and message
    pub(crate) rx_count: Vec<Vec<u32>>,
    /// Reception instants per flight and message
    pub(crate) rx_time: Vec<Vec<Vec<SimTime>>>,
    /// Penultimate-flight messages seen since the last flight was last sent
    pub(crate) penultimate_seen: Vec<bool>,
    pub(crate) done: bool,
    pub(crate) done_at: Option<SimTime>,
}

impl HandshakeState {
    pub(crate) fn new(flights: &FlightStructure) -> Self {
        Self {
            current_flight: 0,
            tx_count: vec![0; flights.len()],
            rx_count: flights.flights().iter().map(|f| vec![0; f.len()]).collect(),
            rx_time: flights
                .flights()
                .iter()
                .map(|f| vec![Vec::new(); f.len()])
                .collect(),
            penultimate_seen: flights
                .penultimate()
                .map(|p| vec![false; flights.messages(p).len()])
                .unwrap_or_default(),
            done: false,
            done_at: None,
        }
    }

    fn flight_complete(&self, flight: usize) -> bool {
        self.rx_count[flight].iter().all(|&count| count > 0)
    }
}

impl ProtocolAgent {
    /// Returns the flight currently being transmitted or awaited.
    pub fn current_flight(&self) -> usize {
        self.state.current_flight
    }

    /// Returns true once this side has received the complete last flight.
    pub fn is_done(&self) -> bool {
        self.state.done
    }

    /// Returns the completion instant, if the handshake completed here.
    pub fn done_at(&self) -> Option<SimTime> {
        self.state.done_at
    }

    /// Returns how often `flight` was transmitted by this side.
    pub fn tx_count(&self, flight: usize) -> u32 {
        self.state.tx_count.get(flight).copied().unwrap_or(0)
    }

    /// Returns per-message reception counts of `flight`.
    pub fn rx_count(&self, flight: usize) -> &[u32] {
        self.state.rx_count.get(flight).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Returns reception instants of message `message` of `flight`.
    pub fn rx_time(&self, flight: usize, message: usize) -> &[SimTime] {
        self.state
            .rx_time
            .get(flight)
            .and_then(|f| f.get(message))
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Returns number of retransmissions over all flights.
    pub fn retransmissions(&self) -> u32 {
        self.state.tx_count.iter().map(|c| c.saturating_sub(1)).sum()
    }

    /// Returns the agent to its initial state.
    ///
    /// Counters, completion state and the outbound queue are cleared. Timeouts
    /// that are already scheduled are not cancelled.
    pub fn reset(&mut self) {
        self.state = HandshakeState::new(&self.flights);
        self.queue.clear();
        self.tx_bytes = 0;
        self.rx_bytes = 0;
    }

    /// Enqueues one transmission of `flight` and arms its timeout.
    ///
    /// # Errors
    /// - `SimulationError::InvalidFlight` - Flight out of range or owned by the peer
    /// - `SimulationError::NotRegistered` - Agent has no medium
    pub fn transmit_flight(&mut self, flight: usize, ctx: &mut SimContext<'_>) -> Result<()> {
        if flight >= self.flights.len() || !self.role.is_tx_flight(flight) {
            return Err(SimulationError::InvalidFlight {
                agent: self.core.name().to_string(),
                flight,
            });
        }
        let (id, _) = self.core.registration()?;

        let attempt = self.state.tx_count[flight] as usize;
        self.state.tx_count[flight] += 1;

        let text = format!(
            "{} transmitting flight {flight} (attempt {})",
            self.core.name(),
            attempt + 1
        );
        ctx.log(text);
        debug!(agent = self.core.name(), flight, attempt, "Transmitting flight");

        // Fresh copies so repeated transmissions stay independent
        let messages = self.flights.messages(flight).to_vec();
        let receiver = self.peer;
        for message in messages {
            self.enqueue(Message::Protocol(message), receiver, ctx)?;
        }

        let last = self.flights.last();
        if flight == last {
            // Another complete penultimate flight is needed before repeating
            self.state.penultimate_seen.fill(false);
        } else {
            match self.policy.timeout(attempt) {
                Some(delay) => {
                    ctx.schedule_timer(id, delay, AgentTimer::FlightTimeout { flight })?;
                }
                None => {
                    let text = format!(
                        "{} gives up retransmitting flight {flight}",
                        self.core.name()
                    );
                    ctx.log(text);
                    info!(agent = self.core.name(), flight, attempt, "Retransmission budget exhausted");
                }
            }
        }

        if attempt == 0 && flight == self.state.current_flight && flight < last {
            self.state.current_flight = flight + 1;
        }

        Ok(())
    }

    /// Handles the timeout guarding `flight`.
    ///
    /// The penultimate flight is resent unless the complete last flight has
    /// arrived; earlier flights are resent only if nothing of the following
    /// flight has arrived.
    ///
    /// # Errors
    /// - `SimulationError::NotRegistered` - Agent has no medium
    pub fn check_flight(&mut self, flight: usize, ctx: &mut SimContext<'_>) -> Result<()> {
        let next = flight + 1;
        if next >= self.flights.len() {
            return Ok(());
        }

        let answers = &self.state.rx_count[next];
        let retransmit = if Some(flight) == self.flights.penultimate() {
            answers.iter().any(|&count| count == 0)
        } else {
            answers.iter().all(|&count| count == 0)
        };

        if !retransmit {
            trace!(agent = self.core.name(), flight, "Flight answered, timeout ignored");
            return Ok(());
        }

        let text = format!("{} timeout for flight {flight}", self.core.name());
        ctx.log(text);
        self.transmit_flight(flight, ctx)
    }

    /// Processes a delivered message.
    pub(super) fn handle_reception(
        &mut self,
        message: Message,
        sender: AgentId,
        ctx: &mut SimContext<'_>,
    ) -> Result<()> {
        self.rx_bytes += message.length() as u64;
        let text = format!(
            "{} received {message} from {}",
            self.core.name(),
            ctx.agent_name(sender)
        );
        ctx.log(text);

        let Message::Protocol(message) = message else {
            return Ok(());
        };

        let last = self.flights.last();
        let current = self.state.current_flight;
        let sends_last = self.role.is_tx_flight(last);

        // After sending the last flight, repeated penultimate flights matter
        let expected = match self.flights.penultimate() {
            Some(penultimate) if current == last && sends_last => penultimate,
            _ => current,
        };

        let Some(index) = self.flights.position(expected, message.name()) else {
            self.log_stray(&message, expected, ctx);
            return Ok(());
        };

        let now = ctx.now();
        self.state.rx_count[expected][index] += 1;
        self.state.rx_time[expected][index].push(now);
        if Some(expected) == self.flights.penultimate() {
            self.state.penultimate_seen[index] = true;
        }

        if current < last {
            if self.state.flight_complete(current) {
                self.state.current_flight = current + 1;
                self.transmit_flight(current + 1, ctx)?;
            }
        } else if sends_last {
            let repeated = self.flights.penultimate().is_some()
                && self.state.penultimate_seen.iter().all(|&seen| seen);
            if repeated {
                let text = format!(
                    "{} received penultimate flight again, last flight was lost",
                    self.core.name()
                );
                ctx.log(text);
                self.transmit_flight(last, ctx)?;
            }
        } else if !self.state.done && self.state.flight_complete(last) {
            self.state.done = true;
            self.state.done_at = Some(now);

            let text = format!("{} handshake complete", self.core.name());
            ctx.log(text);
            info!(
                agent = self.core.name(),
                time = now.as_secs(),
                retransmissions = self.retransmissions(),
                "Handshake complete"
            );

            if let Some(hook) = self.on_complete.as_mut() {
                hook(ctx);
            }
        }

        Ok(())
    }

    fn log_stray(&self, message: &ProtocolMessage, expected: usize, ctx: &mut SimContext<'_>) {
        let origins: Vec<usize> = self
            .flights
            .flights_containing(message.name())
            .into_iter()
            .filter(|&flight| flight != expected)
            .collect();

        let name = self.core.name();
        let text = match origins.as_slice() {
            [] => format!("{name} dropped unknown message {message}"),
            [flight] => format!(
                "{name} dropped {message} of flight {flight}, expecting flight {expected}"
            ),
            _ => format!("{name} dropped ambiguous message {message} (flights {origins:?})"),
        };
        ctx.log(text);
        trace!(agent = name, message = message.name(), expected, "Stray message dropped");
    }

    pub(super) fn handshake_statistics(&self) -> AgentStatistics {
        let flights = self
            .flights
            .flights()
            .iter()
            .enumerate()
            .map(|(index, messages)| FlightStatistics {
                index,
                transmitted_by_self: self.role.is_tx_flight(index),
                tx_count: self.state.tx_count[index],
                messages: messages
                    .iter()
                    .enumerate()
                    .map(|(position, message)| MessageStatistics {
                        name: message.name().to_string(),
                        length: message.length(),
                        rx_count: self.state.rx_count[index][position],
                        rx_times: self.state.rx_time[index][position].clone(),
                    })
                    .collect(),
            })
            .collect();

        AgentStatistics {
            name: self.core.name().to_string(),
            role: self.role.label().to_string(),
            done: self.state.done,
            done_at: self.state.done_at,
            current_flight: self.state.current_flight,
            tx_bytes: self.tx_bytes,
            rx_bytes: self.rx_bytes,
            flights,
        }
    }
}
