//! Shared channel model: bandwidth, slotting, loss, arbitration and airtime.
//!
//! A medium alternates between free and blocked. While blocked, nobody else
//! may start an occupancy episode. When an episode ends the medium is offered
//! to its registered agents again, in priority order, so queued agents can
//! transmit back-to-back.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::agent::AgentId;
use crate::config::MediumConfig;
use crate::context::{SimContext, SimEvent};
use crate::engine::{EventPriority, SimTime};
use crate::message::Message;
use crate::{Result, SimulationError};

/// Identifier of a medium within a [`Simulation`](crate::Simulation).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct MediumId(pub(crate) usize);

impl MediumId {
    /// Returns the raw index.
    pub fn index(self) -> usize {
        self.0
    }
}

impl fmt::Display for MediumId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Message on its way from the slot boundary to the receivers.
#[derive(Debug, Clone)]
pub(crate) struct Transmission {
    pub(crate) message: Message,
    pub(crate) sender: AgentId,
    pub(crate) receiver: Option<AgentId>,
    /// Airtime; `None` delivers at the instant of transmission
    pub(crate) duration: Option<f64>,
}

#[derive(Debug, Clone)]
struct Registration {
    agent: AgentId,
    name: String,
    priority: Option<i32>,
}

/// Shared, bandwidth-limited and lossy channel.
#[derive(Debug)]
pub struct Medium {
    id: MediumId,
    config: MediumConfig,
    /// Kept in arbitration order: prioritized ascending, then unprioritized
    registrations: Vec<Registration>,
    blocked: bool,
    blocked_until: Option<SimTime>,
    usage: BTreeMap<AgentId, f64>,
    transmissions: u64,
    losses: u64,
}

impl Medium {
    /// Creates a free medium.
    ///
    /// # Errors
    /// - `SimulationError::Configuration` - Invalid medium parameters
    pub(crate) fn new(id: MediumId, config: MediumConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            id,
            config,
            registrations: Vec::new(),
            blocked: false,
            blocked_until: None,
            usage: BTreeMap::new(),
            transmissions: 0,
            losses: 0,
        })
    }

    /// Returns this medium's identifier.
    pub fn id(&self) -> MediumId {
        self.id
    }

    /// Returns the channel parameters.
    pub fn config(&self) -> &MediumConfig {
        &self.config
    }

    /// Returns true while an occupancy episode is active.
    pub fn is_blocked(&self) -> bool {
        self.blocked
    }

    /// Returns the end of the active occupancy episode.
    pub fn blocked_until(&self) -> Option<SimTime> {
        self.blocked_until
    }

    /// Returns registered agents in arbitration order.
    pub fn arbitration_order(&self) -> Vec<AgentId> {
        self.registrations.iter().map(|r| r.agent).collect()
    }

    /// Checks if `agent` is registered with this medium.
    pub fn is_registered(&self, agent: AgentId) -> bool {
        self.registrations.iter().any(|r| r.agent == agent)
    }

    /// Returns number of transmissions put on air.
    pub fn transmissions(&self) -> u64 {
        self.transmissions
    }

    /// Returns number of per-receiver losses.
    pub fn losses(&self) -> u64 {
        self.losses
    }

    /// Adds an agent to the arbitration order.
    ///
    /// Agents with a priority come first, ascending; equal priorities and
    /// unprioritized agents keep registration order.
    ///
    /// # Errors
    /// - `SimulationError::DuplicateAgent` - Name already registered here
    pub(crate) fn register(
        &mut self,
        agent: AgentId,
        name: &str,
        priority: Option<i32>,
    ) -> Result<()> {
        if self.registrations.iter().any(|r| r.name == name) {
            return Err(SimulationError::DuplicateAgent {
                name: name.to_string(),
                medium: self.id,
            });
        }

        let registration = Registration {
            agent,
            name: name.to_string(),
            priority,
        };

        match priority {
            Some(priority) => {
                let position = self
                    .registrations
                    .iter()
                    .position(|r| r.priority.is_none_or(|p| p > priority))
                    .unwrap_or(self.registrations.len());
                self.registrations.insert(position, registration);
            }
            None => self.registrations.push(registration),
        }

        debug!(medium = %self.id, agent = name, ?priority, "Agent registered");
        Ok(())
    }

    /// Starts an exclusive occupancy episode of `duration` seconds.
    ///
    /// The episode ends with an unblock event, after which the medium is
    /// offered to its agents again.
    ///
    /// # Errors
    /// - `SimulationError::MediumBusy` - An episode is already active
    /// - `SimulationError::InvalidTime` - Duration is not finite
    /// - `SimulationError::PastScheduling` - Duration is negative
    pub fn block(&mut self, duration: f64, ctx: &mut SimContext<'_>) -> Result<()> {
        if self.blocked {
            return Err(SimulationError::MediumBusy { medium: self.id });
        }

        let until = ctx.schedule(
            SimEvent::Unblock { medium: self.id },
            duration,
            EventPriority::Normal,
        )?;
        self.blocked = true;
        self.blocked_until = Some(until);

        debug!(medium = %self.id, until = until.as_secs(), "Medium blocked");
        Ok(())
    }

    /// Ends the active occupancy episode.
    pub(crate) fn unblock(&mut self) {
        self.blocked = false;
        self.blocked_until = None;
        debug!(medium = %self.id, "Medium released");
    }

    /// Blocks the medium on behalf of `agent` and accounts the airtime.
    ///
    /// # Errors
    /// - `SimulationError::MediumBusy` - An episode is already active
    /// - `SimulationError::InvalidTime` - Duration is not finite
    /// - `SimulationError::PastScheduling` - Duration is negative
    pub fn occupy(&mut self, agent: AgentId, duration: f64, ctx: &mut SimContext<'_>) -> Result<()> {
        self.block(duration, ctx)?;
        self.account(agent, duration);
        Ok(())
    }

    fn account(&mut self, agent: AgentId, seconds: f64) {
        *self.usage.entry(agent).or_insert(0.0) += seconds;
    }

    /// Returns seconds until the next slot boundary (zero without slotting).
    ///
    /// A time exactly on the grid waits for the following boundary.
    pub fn time_to_next_slot(&self, now: SimTime) -> f64 {
        match self.config.msg_slot_distance {
            Some(distance) => {
                let phase = (now.as_secs() / distance).fract();
                distance * (1.0 - phase)
            }
            None => 0.0,
        }
    }

    /// Returns the airtime of `message` in seconds.
    pub fn airtime(&self, message: &Message) -> f64 {
        match (message, self.config.data_rate) {
            (Message::Protocol(message), Some(rate)) => message.length() as f64 / rate,
            _ => 0.0,
        }
    }

    /// Puts `message` on the channel at the next slot boundary.
    ///
    /// Protocol messages block the medium for slot wait, airtime and the
    /// inter-message gap, and count towards the sender's airtime. Plain
    /// messages have no airtime and are never lost.
    ///
    /// # Errors
    /// - `SimulationError::UnknownAgent` - Unicast receiver not registered here
    /// - `SimulationError::MediumBusy` - Medium is already blocked
    pub fn initiate_transmission(
        &mut self,
        message: Message,
        sender: AgentId,
        receiver: Option<AgentId>,
        ctx: &mut SimContext<'_>,
    ) -> Result<()> {
        if let Some(receiver) = receiver {
            if !self.is_registered(receiver) {
                return Err(SimulationError::UnknownAgent {
                    kind: "receiver",
                    id: receiver.index(),
                });
            }
        }

        let slot_wait = self.time_to_next_slot(ctx.now());
        let duration = match message {
            Message::Protocol(_) => {
                let airtime = self.airtime(&message);
                self.block(slot_wait + airtime + self.config.inter_msg_time, ctx)?;
                self.account(sender, airtime);
                Some(airtime)
            }
            Message::Plain(_) => {
                self.block(slot_wait + self.config.inter_msg_time, ctx)?;
                None
            }
        };

        ctx.schedule(
            SimEvent::Transmit {
                medium: self.id,
                transmission: Transmission {
                    message,
                    sender,
                    receiver,
                    duration,
                },
            },
            slot_wait,
            EventPriority::Normal,
        )?;

        Ok(())
    }

    /// Delivers a transmission to every surviving receiver.
    ///
    /// Broadcasts draw loss independently for each registered agent except
    /// the sender; unicasts draw once for the named receiver.
    ///
    /// # Errors
    /// - `SimulationError::InvalidTime` - Airtime is not finite
    pub(crate) fn do_transmit(
        &mut self,
        transmission: Transmission,
        ctx: &mut SimContext<'_>,
    ) -> Result<()> {
        let Transmission {
            message,
            sender,
            receiver,
            duration,
        } = transmission;

        let loss_probability = self.loss_probability(&message);
        let sender_name = ctx.agent_name(sender).to_string();
        ctx.log(format!(
            "{sender_name} sending {message} (loss prob. = {loss_probability:.4})"
        ));
        self.transmissions += 1;

        let receivers: Vec<AgentId> = match receiver {
            Some(receiver) => vec![receiver],
            None => self
                .registrations
                .iter()
                .map(|r| r.agent)
                .filter(|agent| *agent != sender)
                .collect(),
        };

        for receiver in receivers {
            if ctx.random_bool(loss_probability) {
                self.losses += 1;
                let receiver_name = ctx.agent_name(receiver).to_string();
                ctx.log(format!("{message} to {receiver_name} lost"));
                debug!(medium = %self.id, message = message.name(), receiver = %receiver_name, "Message lost");
                continue;
            }

            ctx.schedule(
                SimEvent::Deliver {
                    receiver,
                    sender,
                    message: message.clone(),
                },
                duration.unwrap_or(0.0),
                EventPriority::High,
            )?;
        }

        Ok(())
    }

    /// Returns the probability that `message` does not reach a receiver.
    ///
    /// A message is lost if any of its bits is corrupted or the whole message
    /// is dropped; the two causes are independent.
    pub fn loss_probability(&self, message: &Message) -> f64 {
        let Message::Protocol(message) = message else {
            return 0.0;
        };

        let bits = 8.0 * message.length() as f64;
        let bit_corrupt = 1.0 - (1.0 - self.config.bit_loss_rate).powf(bits);
        let msg_loss = self.config.msg_loss_rate;
        bit_corrupt + msg_loss - bit_corrupt * msg_loss
    }

    /// Returns occupied seconds for one agent, or for all agents combined.
    pub fn usage(&self, agent: Option<AgentId>) -> f64 {
        match agent {
            Some(agent) => self.usage.get(&agent).copied().unwrap_or(0.0),
            None => self.usage.values().sum(),
        }
    }
}
