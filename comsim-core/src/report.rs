//! Run statistics collected from agents and media.

use serde::{Deserialize, Serialize};

use crate::engine::SimTime;

/// Reception record of one message of a flight.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessageStatistics {
    /// Message name
    pub name: String,
    /// Message length in bytes
    pub length: usize,
    /// Number of receptions
    pub rx_count: u32,
    /// Reception instants
    pub rx_times: Vec<SimTime>,
}

/// Transmission and reception record of one flight.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlightStatistics {
    /// Flight index
    pub index: usize,
    /// Whether this side transmits the flight
    pub transmitted_by_self: bool,
    /// Number of transmissions by this side
    pub tx_count: u32,
    /// Per-message reception records
    pub messages: Vec<MessageStatistics>,
}

/// Handshake statistics of one protocol agent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentStatistics {
    /// Agent name
    pub name: String,
    /// Role label
    pub role: String,
    /// Whether the complete last flight was received
    pub done: bool,
    /// Completion instant
    pub done_at: Option<SimTime>,
    /// Flight currently transmitted or awaited
    pub current_flight: usize,
    /// Bytes handed to the medium
    pub tx_bytes: u64,
    /// Bytes delivered
    pub rx_bytes: u64,
    /// Per-flight records
    pub flights: Vec<FlightStatistics>,
}

impl AgentStatistics {
    /// Returns transmissions beyond the first one, over all flights.
    pub fn retransmissions(&self) -> u32 {
        self.flights
            .iter()
            .map(|flight| flight.tx_count.saturating_sub(1))
            .sum()
    }

    /// Returns the number of receptions beyond the first, over all messages.
    pub fn duplicates(&self) -> u32 {
        self.flights
            .iter()
            .flat_map(|flight| &flight.messages)
            .map(|message| message.rx_count.saturating_sub(1))
            .sum()
    }
}

/// Airtime one agent spent on one medium.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AirtimeStatistics {
    /// Agent name
    pub agent: String,
    /// Medium index
    pub medium: usize,
    /// Occupied seconds
    pub seconds: f64,
}

/// Result of a simulation run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunReport {
    /// Seed used for reproduction
    pub seed: u64,
    /// Simulation time when the report was taken
    pub time: SimTime,
    /// Total events processed
    pub events_processed: u64,
    /// Statistics of agents that keep them
    pub agents: Vec<AgentStatistics>,
    /// Airtime per registered agent
    pub airtime: Vec<AirtimeStatistics>,
    /// Occupied seconds over all media and agents
    pub total_usage: f64,
    /// Messages put on air
    pub transmissions: u64,
    /// Per-receiver losses
    pub losses: u64,
}

impl RunReport {
    /// Returns the earliest completion instant of any agent.
    pub fn handshake_time(&self) -> Option<SimTime> {
        self.agents.iter().filter_map(|agent| agent.done_at).min()
    }

    /// Returns true if at least one agent completed the handshake.
    pub fn completed(&self) -> bool {
        self.agents.iter().any(|agent| agent.done)
    }

    /// Generates human-readable summary.
    pub fn summary(&self) -> String {
        let mut summary = String::new();
        summary.push_str(&format!("Simulation Report (seed: {})\n", self.seed));
        summary.push_str(&format!("Simulated time: {}\n", self.time));
        summary.push_str(&format!("Events processed: {}\n", self.events_processed));
        summary.push_str(&format!(
            "Transmissions: {} ({} losses)\n",
            self.transmissions, self.losses
        ));

        match self.handshake_time() {
            Some(time) => summary.push_str(&format!("Handshake completed at {time}\n")),
            None => summary.push_str("Handshake did not complete\n"),
        }

        if !self.agents.is_empty() {
            summary.push_str("\nAgents:\n");
            for agent in &self.agents {
                summary.push_str(&format!(
                    "  {} ({}): flight {}, tx {} B, rx {} B, {} retransmissions{}\n",
                    agent.name,
                    agent.role,
                    agent.current_flight,
                    agent.tx_bytes,
                    agent.rx_bytes,
                    agent.retransmissions(),
                    if agent.done { ", done" } else { "" }
                ));
            }
        }

        summary.push_str("\nAirtime:\n");
        for entry in &self.airtime {
            summary.push_str(&format!(
                "  {} on medium #{}: {:.3}s\n",
                entry.agent, entry.medium, entry.seconds
            ));
        }
        summary.push_str(&format!("  total: {:.3}s\n", self.total_usage));

        summary
    }
}
