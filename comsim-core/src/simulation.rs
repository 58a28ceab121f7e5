//! World owning the scheduler, media and agents, and dispatching events.

use tracing::{debug, info, trace};

use crate::agent::{Agent, AgentHandle, AgentId, AgentTimer, ProtocolAgent};
use crate::config::{MediumConfig, SimulationConfig};
use crate::context::{Requests, SimContext, SimEvent};
use crate::engine::{DeterministicRng, EventPriority, Scheduler, SimTime};
use crate::log::{LogSink, Transcript};
use crate::medium::{Medium, MediumId};
use crate::message::Message;
use crate::report::{AirtimeStatistics, RunReport};
use crate::{Result, SimulationError};

/// Deterministic simulation of agents sharing one or more media.
///
/// External calls (`trigger`, `start`, `stop`, `send`, `with_agent`) run
/// immediately at the current simulation time; everything else happens as
/// scheduled events during `run`.
pub struct Simulation {
    seed: u64,
    scheduler: Scheduler<SimEvent>,
    rng: DeterministicRng,
    transcript: Transcript,
    media: Vec<Medium>,
    agents: Vec<Box<dyn Agent>>,
    names: Vec<String>,
    requests: Requests,
}

impl Simulation {
    /// Creates a simulation with one medium configured from `config`.
    ///
    /// # Errors
    /// - `SimulationError::Configuration` - Invalid medium parameters
    pub fn new(config: &SimulationConfig) -> Result<Self> {
        let mut simulation = Self {
            seed: config.seed,
            scheduler: Scheduler::new(),
            rng: DeterministicRng::from_seed(config.seed),
            transcript: Transcript::default(),
            media: Vec::new(),
            agents: Vec::new(),
            names: Vec::new(),
            requests: Requests::default(),
        };
        simulation.add_medium(config.medium.clone())?;

        info!(seed = config.seed, "Simulation created");
        Ok(simulation)
    }

    /// Sends the transcript to `sink`.
    pub fn with_log_sink(mut self, sink: impl LogSink + 'static) -> Self {
        self.set_log_sink(sink);
        self
    }

    /// Replaces the transcript sink.
    pub fn set_log_sink(&mut self, sink: impl LogSink + 'static) {
        self.transcript.set_sink(Box::new(sink));
    }

    /// Returns the medium created from the simulation config.
    pub fn primary_medium(&self) -> MediumId {
        MediumId(0)
    }

    /// Adds another independent medium.
    ///
    /// # Errors
    /// - `SimulationError::Configuration` - Invalid medium parameters
    pub fn add_medium(&mut self, config: MediumConfig) -> Result<MediumId> {
        let id = MediumId(self.media.len());
        self.media.push(Medium::new(id, config)?);
        debug!(medium = %id, "Medium added");
        Ok(id)
    }

    /// Returns a medium.
    ///
    /// # Errors
    /// - `SimulationError::UnknownAgent` - No such medium
    pub fn medium(&self, id: MediumId) -> Result<&Medium> {
        self.media.get(id.index()).ok_or(SimulationError::UnknownAgent {
            kind: "medium",
            id: id.index(),
        })
    }

    /// Takes ownership of `agent` and returns a typed handle to it.
    ///
    /// The agent takes part in nothing until it is registered with a medium.
    pub fn add_agent<T: Agent>(&mut self, agent: T) -> AgentHandle<T> {
        let id = AgentId(self.agents.len());
        self.names.push(agent.name().to_string());
        self.agents.push(Box::new(agent));
        AgentHandle::new(id)
    }

    /// Registers an agent with a medium.
    ///
    /// Agents with a priority are offered the medium first (lowest value
    /// first); the others follow in registration order.
    ///
    /// # Errors
    /// - `SimulationError::UnknownAgent` - Agent or medium does not exist
    /// - `SimulationError::AlreadyRegistered` - Agent already has a medium
    /// - `SimulationError::DuplicateAgent` - Name already registered with the medium
    pub fn register<T>(
        &mut self,
        agent: AgentHandle<T>,
        medium: MediumId,
        priority: Option<i32>,
    ) -> Result<()> {
        let id = agent.id();
        let entry = self
            .agents
            .get_mut(id.index())
            .ok_or(SimulationError::UnknownAgent {
                kind: "agent",
                id: id.index(),
            })?;
        if entry.medium().is_some() {
            return Err(SimulationError::AlreadyRegistered {
                name: entry.name().to_string(),
            });
        }

        let target = self
            .media
            .get_mut(medium.index())
            .ok_or(SimulationError::UnknownAgent {
                kind: "medium",
                id: medium.index(),
            })?;
        target.register(id, entry.name(), priority)?;
        entry.attach(id, medium);
        Ok(())
    }

    /// Returns the concrete agent behind `handle`.
    ///
    /// # Errors
    /// - `SimulationError::UnknownAgent` - Handle belongs to another simulation
    pub fn agent<T: Agent>(&self, handle: AgentHandle<T>) -> Result<&T> {
        self.agents
            .get(handle.id().index())
            .and_then(|agent| agent.as_any().downcast_ref::<T>())
            .ok_or(SimulationError::UnknownAgent {
                kind: "agent",
                id: handle.id().index(),
            })
    }

    /// Returns the concrete agent behind `handle` for modification.
    ///
    /// # Errors
    /// - `SimulationError::UnknownAgent` - Handle belongs to another simulation
    pub fn agent_mut<T: Agent>(&mut self, handle: AgentHandle<T>) -> Result<&mut T> {
        self.agents
            .get_mut(handle.id().index())
            .and_then(|agent| agent.as_any_mut().downcast_mut::<T>())
            .ok_or(SimulationError::UnknownAgent {
                kind: "agent",
                id: handle.id().index(),
            })
    }

    /// Runs `f` on the concrete agent with access to the event context.
    ///
    /// Follow-up requests (arbitration, stops) are applied before returning.
    ///
    /// # Errors
    /// - `SimulationError::UnknownAgent` - Handle belongs to another simulation
    /// - Any error returned by `f` or by the follow-up work
    pub fn with_agent<T, R, F>(&mut self, handle: AgentHandle<T>, f: F) -> Result<R>
    where
        T: Agent,
        F: FnOnce(&mut T, &mut SimContext<'_>) -> Result<R>,
    {
        self.transcript.begin_event();
        let (agents, _, mut ctx) = self.split();
        let agent = agents
            .get_mut(handle.id().index())
            .and_then(|agent| agent.as_any_mut().downcast_mut::<T>())
            .ok_or(SimulationError::UnknownAgent {
                kind: "agent",
                id: handle.id().index(),
            })?;
        let result = match f(agent, &mut ctx) {
            Ok(result) => result,
            Err(error) => {
                self.discard_requests();
                return Err(error);
            }
        };
        self.flush_requests()?;
        Ok(result)
    }

    /// Starts the protocol activity of an agent now.
    ///
    /// # Errors
    /// - `SimulationError::UnknownAgent` - Agent does not exist
    /// - Any error raised by the agent, e.g. `NotRegistered` or `InvalidFlight`
    pub fn trigger(&mut self, agent: impl Into<AgentId>) -> Result<()> {
        let agent = agent.into();
        self.external(agent, |agent, ctx| agent.trigger(ctx))
    }

    /// Schedules the protocol activity of an agent to start at `time`.
    ///
    /// # Errors
    /// - `SimulationError::InvalidTime` - Time is not finite
    /// - `SimulationError::PastScheduling` - Time lies in the past
    pub fn trigger_at(&mut self, agent: impl Into<AgentId>, time: SimTime) -> Result<()> {
        let agent = agent.into();
        self.scheduler.schedule_at(
            SimEvent::Timer {
                agent,
                timer: AgentTimer::Trigger,
            },
            time,
            EventPriority::Normal,
        )?;
        Ok(())
    }

    /// Starts the background activity of an agent, e.g. interference.
    ///
    /// # Errors
    /// - `SimulationError::UnknownAgent` - Agent does not exist
    /// - Any error raised by the agent while starting
    pub fn start(&mut self, agent: impl Into<AgentId>) -> Result<()> {
        let agent = agent.into();
        self.external(agent, |agent, ctx| agent.start(ctx))
    }

    /// Stops the background activity of an agent.
    ///
    /// # Errors
    /// - `SimulationError::UnknownAgent` - Agent does not exist
    pub fn stop(&mut self, agent: impl Into<AgentId>) -> Result<()> {
        let agent = agent.into();
        self.external(agent, |agent, ctx| {
            agent.stop(ctx);
            Ok(())
        })
    }

    /// Queues `message` on a protocol agent, outside its handshake.
    ///
    /// # Errors
    /// - `SimulationError::UnknownAgent` - Agent does not exist
    /// - `SimulationError::NotRegistered` - Agent has no medium
    pub fn send(
        &mut self,
        agent: AgentHandle<ProtocolAgent>,
        message: Message,
        receiver: Option<AgentId>,
    ) -> Result<()> {
        self.with_agent(agent, |agent, ctx| agent.enqueue(message, receiver, ctx))
    }

    /// Processes the next event; returns false if none is pending.
    ///
    /// # Errors
    /// Returns the first error raised while handling the event.
    pub fn run_step(&mut self) -> Result<bool> {
        let Some(scheduled) = self.scheduler.pop_next()? else {
            return Ok(false);
        };
        trace!(time = scheduled.time.as_secs(), event = ?scheduled.event, "Dispatching event");
        self.dispatch(scheduled.event)?;
        Ok(true)
    }

    /// Processes events until none is pending.
    ///
    /// Never returns while a periodic agent keeps running; use
    /// [`run_until`](Self::run_until) in that case.
    ///
    /// # Errors
    /// Returns the first error raised while handling an event.
    pub fn run(&mut self) -> Result<()> {
        while self.run_step()? {}
        info!(
            time = self.now().as_secs(),
            events = self.scheduler.events_processed(),
            "Simulation finished"
        );
        Ok(())
    }

    /// Processes events scheduled at or before `limit`.
    ///
    /// # Errors
    /// Returns the first error raised while handling an event.
    pub fn run_until(&mut self, limit: SimTime) -> Result<()> {
        while let Some(next) = self.scheduler.next_event_time() {
            if next > limit {
                break;
            }
            self.run_step()?;
        }
        debug!(
            time = self.now().as_secs(),
            limit = limit.as_secs(),
            pending = self.scheduler.pending(),
            "Bounded run finished"
        );
        Ok(())
    }

    /// Processes events until only background activity remains, then stops
    /// every agent and drains what is left.
    ///
    /// Unlike [`run`](Self::run) this terminates while interference is
    /// running, also when a handshake stalls after its retransmission budget
    /// is exhausted.
    ///
    /// # Errors
    /// Returns the first error raised while handling an event.
    pub fn run_until_settled(&mut self) -> Result<()> {
        while self.has_protocol_work() {
            if !self.run_step()? {
                break;
            }
        }

        debug!(time = self.now().as_secs(), "Protocol activity settled");
        for index in 0..self.agents.len() {
            self.stop(AgentId(index))?;
        }
        self.run()
    }

    /// Returns true while a protocol event is pending or an agent has queued
    /// work.
    ///
    /// Interference ticks and medium releases alone do not count.
    pub fn has_protocol_work(&self) -> bool {
        self.scheduler.any_pending(|event| !event.is_background())
            || self.agents.iter().any(|agent| agent.has_pending_work())
    }

    /// Returns true if no event is pending.
    pub fn is_idle(&self) -> bool {
        self.scheduler.is_idle()
    }

    /// Returns current simulation time.
    pub fn now(&self) -> SimTime {
        self.scheduler.now()
    }

    /// Returns number of events processed so far.
    pub fn events_processed(&self) -> u64 {
        self.scheduler.events_processed()
    }

    /// Collects statistics of all agents and media.
    pub fn report(&self) -> RunReport {
        let airtime = self
            .media
            .iter()
            .flat_map(|medium| {
                medium
                    .arbitration_order()
                    .into_iter()
                    .map(move |agent| (medium, agent))
            })
            .map(|(medium, agent)| AirtimeStatistics {
                agent: self.names[agent.index()].clone(),
                medium: medium.id().index(),
                seconds: medium.usage(Some(agent)),
            })
            .collect();

        RunReport {
            seed: self.seed,
            time: self.now(),
            events_processed: self.scheduler.events_processed(),
            agents: self.agents.iter().filter_map(|a| a.statistics()).collect(),
            airtime,
            total_usage: self.media.iter().map(|m| m.usage(None)).sum(),
            transmissions: self.media.iter().map(Medium::transmissions).sum(),
            losses: self.media.iter().map(Medium::losses).sum(),
        }
    }

    fn split(&mut self) -> (&mut Vec<Box<dyn Agent>>, &mut Vec<Medium>, SimContext<'_>) {
        let ctx = SimContext {
            scheduler: &mut self.scheduler,
            rng: &mut self.rng,
            transcript: &mut self.transcript,
            names: &self.names,
            requests: &mut self.requests,
        };
        (&mut self.agents, &mut self.media, ctx)
    }

    fn external<F>(&mut self, agent: AgentId, f: F) -> Result<()>
    where
        F: FnOnce(&mut dyn Agent, &mut SimContext<'_>) -> Result<()>,
    {
        self.transcript.begin_event();
        let (agents, _, mut ctx) = self.split();
        let outcome = agent_mut(agents, agent).and_then(|agent| f(agent, &mut ctx));
        if let Err(error) = outcome {
            self.discard_requests();
            return Err(error);
        }
        self.flush_requests()
    }

    fn dispatch(&mut self, event: SimEvent) -> Result<()> {
        self.transcript.begin_event();
        let (agents, media, mut ctx) = self.split();

        match event {
            SimEvent::Unblock { medium } => {
                medium_mut(media, medium)?.unblock();
                ctx.request_arbitration(medium);
            }
            SimEvent::Transmit {
                medium,
                transmission,
            } => medium_mut(media, medium)?.do_transmit(transmission, &mut ctx)?,
            SimEvent::Deliver {
                receiver,
                sender,
                message,
            } => agent_mut(agents, receiver)?.receive(message, sender, &mut ctx)?,
            SimEvent::Timer {
                agent,
                timer: AgentTimer::Trigger,
            } => agent_mut(agents, agent)?.trigger(&mut ctx)?,
            SimEvent::Timer { agent, timer } => agent_mut(agents, agent)?.on_timer(timer, &mut ctx)?,
        }

        self.flush_requests()
    }

    /// Drops follow-up work recorded by a call that failed.
    fn discard_requests(&mut self) {
        if !self.requests.is_empty() {
            debug!(
                arbitration = self.requests.arbitration.len(),
                stops = self.requests.stops.len(),
                "Discarding requests of failed call"
            );
        }
        self.requests = Requests::default();
    }

    /// Applies stops first, then offers every medium that asked for it.
    fn flush_requests(&mut self) -> Result<()> {
        while !self.requests.is_empty() {
            let stops = std::mem::take(&mut self.requests.stops);
            for agent in stops {
                let (agents, _, mut ctx) = self.split();
                agent_mut(agents, agent)?.stop(&mut ctx);
            }

            let media = std::mem::take(&mut self.requests.arbitration);
            for medium in media {
                self.arbitrate(medium)?;
            }
        }
        Ok(())
    }

    /// Offers a free medium to its agents in priority order until one claims it.
    fn arbitrate(&mut self, medium: MediumId) -> Result<()> {
        let (agents, media, mut ctx) = self.split();
        let medium = medium_mut(media, medium)?;
        if medium.is_blocked() {
            return Ok(());
        }

        for agent in medium.arbitration_order() {
            if agent_mut(agents, agent)?.offer(medium, &mut ctx)? {
                break;
            }
        }
        Ok(())
    }
}

impl std::fmt::Debug for Simulation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Simulation")
            .field("seed", &self.seed)
            .field("now", &self.now())
            .field("media", &self.media.len())
            .field("agents", &self.names)
            .field("pending", &self.scheduler.pending())
            .finish()
    }
}

fn agent_mut(agents: &mut [Box<dyn Agent>], id: AgentId) -> Result<&mut (dyn Agent + 'static)> {
    agents
        .get_mut(id.index())
        .map(|agent| agent.as_mut())
        .ok_or(SimulationError::UnknownAgent {
            kind: "agent",
            id: id.index(),
        })
}

fn medium_mut(media: &mut [Medium], id: MediumId) -> Result<&mut Medium> {
    media.get_mut(id.index()).ok_or(SimulationError::UnknownAgent {
        kind: "medium",
        id: id.index(),
    })
}
