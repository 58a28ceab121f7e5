//! Periodic channel occupation simulating co-channel interference.

use std::any::Any;

use tracing::{debug, trace};

use super::{Agent, AgentCore, AgentId, AgentTimer};
use crate::config::BlockingAgentConfig;
use crate::context::SimContext;
use crate::medium::{Medium, MediumId};
use crate::message::Message;
use crate::Result;

/// Interferer that occupies the medium `frequency` times per second.
///
/// Each tick adds one occupancy request. Requests wait until the medium is
/// offered and the minimum separation since the previous own occupancy has
/// passed. Without queuing at most one request is outstanding; with queuing
/// missed requests accumulate as backlog.
#[derive(Debug)]
pub struct BlockingAgent {
    core: AgentCore,
    config: BlockingAgentConfig,
    running: bool,
    /// Invalidates ticks scheduled before the last stop
    generation: u64,
    pending: u32,
    holding: bool,
    ticks: u64,
    missed: u64,
    occupancies: u64,
}

impl BlockingAgent {
    /// Creates a stopped interferer.
    ///
    /// # Errors
    /// - `SimulationError::Configuration` - Occupancy pattern cannot be satisfied
    pub fn new(name: impl Into<String>, config: BlockingAgentConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            core: AgentCore::new(name),
            config,
            running: false,
            generation: 0,
            pending: 0,
            holding: false,
            ticks: 0,
            missed: 0,
            occupancies: 0,
        })
    }

    /// Returns the occupancy pattern.
    pub fn config(&self) -> &BlockingAgentConfig {
        &self.config
    }

    /// Returns true between `start` and `stop`.
    pub fn is_running(&self) -> bool {
        self.running
    }

    /// Returns outstanding occupancy requests.
    pub fn pending_requests(&self) -> u32 {
        self.pending
    }

    /// Returns number of ticks so far.
    pub fn ticks(&self) -> u64 {
        self.ticks
    }

    /// Returns ticks that found the previous request still outstanding.
    pub fn missed_requests(&self) -> u64 {
        self.missed
    }

    /// Returns number of occupancy episodes performed.
    pub fn occupancies(&self) -> u64 {
        self.occupancies
    }

    fn tick(&mut self, id: AgentId, medium: MediumId, ctx: &mut SimContext<'_>) -> Result<()> {
        self.ticks += 1;
        if self.pending > 0 {
            self.missed += 1;
            trace!(agent = self.core.name(), pending = self.pending, "Occupancy request still outstanding");
        }

        self.pending += 1;
        if !self.config.queuing {
            self.pending = self.pending.min(1);
        }

        ctx.schedule_timer(
            id,
            self.config.period(),
            AgentTimer::BlockerTick {
                generation: self.generation,
            },
        )?;
        ctx.request_arbitration(medium);
        Ok(())
    }
}

impl Agent for BlockingAgent {
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
        if !self.running || self.pending == 0 || self.holding {
            return Ok(false);
        }
        let (id, _) = self.core.registration()?;

        medium.occupy(id, self.config.duration, ctx)?;
        self.pending -= 1;
        self.occupancies += 1;

        let text = format!(
            "{} blocking medium for {:.3}s",
            self.core.name(),
            self.config.duration
        );
        ctx.log(text);

        if self.config.min_sep_time > 0.0 {
            self.holding = true;
            ctx.schedule_timer(
                id,
                self.config.duration + self.config.min_sep_time,
                AgentTimer::SeparationElapsed,
            )?;
        }
        Ok(true)
    }

    // Interference does not listen
    fn receive(&mut self, _message: Message, _sender: AgentId, _ctx: &mut SimContext<'_>) -> Result<()> {
        Ok(())
    }

    fn on_timer(&mut self, timer: AgentTimer, ctx: &mut SimContext<'_>) -> Result<()> {
        let (id, medium) = self.core.registration()?;
        match timer {
            AgentTimer::BlockerTick { generation } if generation == self.generation && self.running => {
                self.tick(id, medium, ctx)
            }
            AgentTimer::SeparationElapsed => {
                self.holding = false;
                if self.pending > 0 {
                    ctx.request_arbitration(medium);
                }
                Ok(())
            }
            _ => Ok(()),
        }
    }

    fn start(&mut self, ctx: &mut SimContext<'_>) -> Result<()> {
        if self.running {
            return Ok(());
        }
        let (id, _) = self.core.registration()?;

        self.running = true;
        self.generation += 1;
        ctx.schedule_timer(
            id,
            0.0,
            AgentTimer::BlockerTick {
                generation: self.generation,
            },
        )?;

        let text = format!("{} started", self.core.name());
        ctx.log(text);
        debug!(agent = self.core.name(), frequency = self.config.frequency, "Interferer started");
        Ok(())
    }

    fn stop(&mut self, ctx: &mut SimContext<'_>) {
        if !self.running {
            return;
        }
        self.running = false;
        self.pending = 0;

        let text = format!("{} stopped", self.core.name());
        ctx.log(text);
        debug!(agent = self.core.name(), occupancies = self.occupancies, "Interferer stopped");
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}
