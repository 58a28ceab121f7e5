//! Which side transmits which flight.

use std::fmt;

/// Flight ownership of a handshake participant.
///
/// This is the only asymmetry between the two sides of a handshake; the
/// rest of the state machine is shared.
pub trait Role: fmt::Debug {
    /// Returns true if this side transmits flight `flight`.
    fn is_tx_flight(&self, flight: usize) -> bool;

    /// Returns a short label for reports.
    fn label(&self) -> &'static str;
}

/// Initiator; transmits the even flights.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Client;

impl Role for Client {
    fn is_tx_flight(&self, flight: usize) -> bool {
        flight % 2 == 0
    }

    fn label(&self) -> &'static str {
        "client"
    }
}

/// Responder; transmits the odd flights.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Server;

impl Role for Server {
    fn is_tx_flight(&self, flight: usize) -> bool {
        flight % 2 == 1
    }

    fn label(&self) -> &'static str {
        "server"
    }
}
