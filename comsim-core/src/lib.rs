//! Comsim Core - Discrete-event simulation of handshakes over a shared medium.

#![warn(missing_docs)]
#![warn(clippy::missing_errors_doc)]
#![deny(clippy::missing_panics_doc)]
//!
//! This crate simulates a reliable, flight-based handshake (DTLS/TLS style)
//! running over an unreliable, bandwidth-limited and contended channel. It
//! answers questions such as "how long does the handshake take at 10% loss
//! with exponential backoff?" without touching a socket.
//!
//! # Example
//!
//! ```rust,no_run
//! use comsim_core::{
//!     FlightStructure, ProtocolAgent, RetransmissionPolicy, Simulation, SimulationConfig,
//! };
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let mut sim = Simulation::new(&SimulationConfig::deterministic_testing())?;
//! let medium = sim.primary_medium();
//!
//! let flights = FlightStructure::dtls_certificate();
//! let policy = RetransmissionPolicy::exponential();
//! let server = sim.add_agent(ProtocolAgent::server("server1", flights.clone(), policy.clone()));
//! let client = sim.add_agent(ProtocolAgent::client("client1", flights, policy));
//! sim.register(server, medium, None)?;
//! sim.register(client, medium, None)?;
//!
//! sim.trigger(client)?;
//! sim.run()?;
//!
//! println!("{}", sim.report().summary());
//! # Ok(())
//! # }
//! ```
//!
//! # Architecture
//!
//! - **Engine**: time-ordered event heap with priority and FIFO tie-breaks
//! - **Medium**: bandwidth, slot alignment, loss, arbitration and airtime
//! - **Agents**: interference generators and protocol participants
//! - **Handshake**: flight state machine with retransmission timeouts and an
//!   implicit acknowledgement of the final flight
//! - **Simulation**: owns all of the above and dispatches events between them

pub mod agent;
pub mod config;
pub mod context;
pub mod engine;
pub mod log;
pub mod medium;
pub mod message;
pub mod report;
pub mod simulation;
pub mod tracing_setup;

pub use agent::{
    Agent, AgentHandle, AgentId, AgentTimer, BlockingAgent, Client, CompletionHook,
    FlightStructure, ProtocolAgent, RetransmissionPolicy, Role, Server,
};
pub use config::{BlockingAgentConfig, MediumConfig, SimulationConfig};
pub use context::SimContext;
pub use engine::{DeterministicRng, EventPriority, ScheduledEvent, Scheduler, SimTime};
pub use log::{ConsoleLogSink, LogRecord, LogSink, MemoryLogSink, TracingLogSink};
pub use medium::{Medium, MediumId};
pub use message::{Message, ProtocolMessage};
pub use report::{
    AgentStatistics, AirtimeStatistics, FlightStatistics, MessageStatistics, RunReport,
};
pub use simulation::Simulation;

/// Errors that abort a simulation run.
///
/// Every variant signals a programming or configuration defect. Protocol
/// anomalies such as lost, duplicated or stray messages are not errors; they
/// are logged and absorbed by the state machine.
#[derive(Debug, thiserror::Error)]
pub enum SimulationError {
    /// Event was scheduled before the current simulation time
    #[error("Cannot schedule event in the past: requested {requested}, now {now}")]
    PastScheduling {
        /// Requested execution time
        requested: SimTime,
        /// Current simulation time
        now: SimTime,
    },

    /// Event popped from the queue lies before the current simulation time
    #[error("Cannot handle event from the past: event at {event_time}, now {now}")]
    PastEvent {
        /// Timestamp of the offending event
        event_time: SimTime,
        /// Current simulation time
        now: SimTime,
    },

    /// Time or delay is not a finite number
    #[error("Invalid simulation time: {value}")]
    InvalidTime {
        /// Offending value in seconds
        value: f64,
    },

    /// Another agent with the same name is already registered with the medium
    #[error("Agent '{name}' already registered with medium {medium}")]
    DuplicateAgent {
        /// Colliding agent name
        name: String,
        /// Medium rejecting the registration
        medium: MediumId,
    },

    /// Agent is already attached to a medium
    #[error("Agent '{name}' already registered with a medium")]
    AlreadyRegistered {
        /// Agent name
        name: String,
    },

    /// Agent tried to use the channel without being registered
    #[error("Agent '{name}' not registered with any medium")]
    NotRegistered {
        /// Agent name
        name: String,
    },

    /// Agent or medium identifier does not belong to this simulation
    #[error("Unknown {kind}: {id}")]
    UnknownAgent {
        /// What kind of identifier was looked up
        kind: &'static str,
        /// Raw identifier
        id: usize,
    },

    /// Medium was blocked while already occupied
    #[error("Medium {medium} is busy")]
    MediumBusy {
        /// Medium that rejected the occupancy
        medium: MediumId,
    },

    /// Agent tried to transmit a flight it does not own
    #[error("Agent '{agent}' cannot transmit flight {flight}")]
    InvalidFlight {
        /// Agent name
        agent: String,
        /// Flight index
        flight: usize,
    },

    /// Message cannot be fragmented with the requested parameters
    #[error("Invalid fragmentation of '{message}': {reason}")]
    InvalidFragmentation {
        /// Message name
        message: String,
        /// Why fragmentation was rejected
        reason: String,
    },

    /// Component parameters are inconsistent
    #[error("Configuration error: {reason}")]
    Configuration {
        /// Description of the inconsistency
        reason: String,
    },
}

impl SimulationError {
    /// Checks if this error stems from setup rather than from a run.
    pub fn is_setup_error(&self) -> bool {
        matches!(
            self,
            SimulationError::DuplicateAgent { .. }
                | SimulationError::AlreadyRegistered { .. }
                | SimulationError::Configuration { .. }
                | SimulationError::InvalidFragmentation { .. }
        )
    }
}

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, SimulationError>;
