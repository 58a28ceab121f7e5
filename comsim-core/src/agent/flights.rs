//! Ordered flights of a handshake.

use serde::{Deserialize, Serialize};

use crate::message::ProtocolMessage;
use crate::{Result, SimulationError};

/// Ordered sequence of flights, each an ordered sequence of messages.
///
/// Guaranteed non-empty, with non-empty flights and unique message names
/// within each flight (names identify messages on reception).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(
    try_from = "Vec<Vec<ProtocolMessage>>",
    into = "Vec<Vec<ProtocolMessage>>"
)]
pub struct FlightStructure {
    flights: Vec<Vec<ProtocolMessage>>,
}

impl TryFrom<Vec<Vec<ProtocolMessage>>> for FlightStructure {
    type Error = SimulationError;

    fn try_from(flights: Vec<Vec<ProtocolMessage>>) -> Result<Self> {
        Self::new(flights)
    }
}

impl From<FlightStructure> for Vec<Vec<ProtocolMessage>> {
    fn from(structure: FlightStructure) -> Self {
        structure.flights
    }
}

impl FlightStructure {
    /// Creates a validated flight structure.
    ///
    /// # Errors
    /// - `SimulationError::Configuration` - No flights, an empty flight, or a
    ///   message name repeated within one flight
    pub fn new(flights: Vec<Vec<ProtocolMessage>>) -> Result<Self> {
        if flights.is_empty() {
            return Err(SimulationError::Configuration {
                reason: "flight structure has no flights".to_string(),
            });
        }

        for (index, flight) in flights.iter().enumerate() {
            if flight.is_empty() {
                return Err(SimulationError::Configuration {
                    reason: format!("flight {index} has no messages"),
                });
            }
            for (position, message) in flight.iter().enumerate() {
                if flight[..position].iter().any(|m| m.name() == message.name()) {
                    return Err(SimulationError::Configuration {
                        reason: format!(
                            "message '{}' appears twice in flight {index}",
                            message.name()
                        ),
                    });
                }
            }
        }

        Ok(Self { flights })
    }

    /// Full DTLS 1.2 handshake with certificate authentication.
    ///
    /// ```text
    /// [0] client: ClientHello
    /// [1] server: ServerHello, Certificate, ServerKeyExchange,
    ///             CertificateRequest, ServerHelloDone
    /// [2] client: Certificate, ClientKeyExchange, CertificateVerify,
    ///             ChangeCipherSpec, Finished
    /// [3] server: ChangeCipherSpec, Finished
    /// ```
    pub fn dtls_certificate() -> Self {
        Self {
            flights: vec![
                vec![ProtocolMessage::new("ClientHello", 87)],
                vec![
                    ProtocolMessage::new("ServerHello", 107),
                    ProtocolMessage::new("Certificate", 834),
                    ProtocolMessage::new("ServerKeyExchange", 165),
                    ProtocolMessage::new("CertificateRequest", 71),
                    ProtocolMessage::new("ServerHelloDone", 25),
                ],
                vec![
                    ProtocolMessage::new("Certificate", 834),
                    ProtocolMessage::new("ClientKeyExchange", 91),
                    ProtocolMessage::new("CertificateVerify", 97),
                    ProtocolMessage::new("ChangeCipherSpec", 14),
                    ProtocolMessage::new("Finished", 53),
                ],
                vec![
                    ProtocolMessage::new("ChangeCipherSpec", 14),
                    ProtocolMessage::new("Finished", 53),
                ],
            ],
        }
    }

    /// Abbreviated (session resumption) handshake in three flights.
    pub fn dtls_abbreviated() -> Self {
        Self {
            flights: vec![
                vec![ProtocolMessage::new("ClientHello", 87)],
                vec![
                    ProtocolMessage::new("ServerHello", 107),
                    ProtocolMessage::new("ChangeCipherSpec", 14),
                    ProtocolMessage::new("Finished", 53),
                ],
                vec![
                    ProtocolMessage::new("ChangeCipherSpec", 14),
                    ProtocolMessage::new("Finished", 53),
                ],
            ],
        }
    }

    /// Returns a structure whose messages are split into fragments.
    ///
    /// # Errors
    /// - `SimulationError::InvalidFragmentation` - `payload_len` is zero
    /// - `SimulationError::Configuration` - A flight ends up empty
    pub fn fragmented(&self, payload_len: usize, fixed_overhead: usize) -> Result<Self> {
        let mut flights = Vec::with_capacity(self.flights.len());
        for flight in &self.flights {
            let mut fragments = Vec::new();
            for message in flight {
                fragments.extend(message.fragment(payload_len, fixed_overhead)?);
            }
            flights.push(fragments);
        }
        Self::new(flights)
    }

    /// Returns number of flights.
    pub fn len(&self) -> usize {
        self.flights.len()
    }

    /// Always false; kept for API symmetry with `len`.
    pub fn is_empty(&self) -> bool {
        self.flights.is_empty()
    }

    /// Returns index of the final flight.
    pub fn last(&self) -> usize {
        self.flights.len() - 1
    }

    /// Returns index of the second-to-last flight, if there is one.
    pub fn penultimate(&self) -> Option<usize> {
        self.flights.len().checked_sub(2)
    }

    /// Returns the messages of `flight`.
    pub fn messages(&self, flight: usize) -> &[ProtocolMessage] {
        self.flights.get(flight).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Returns all flights.
    pub fn flights(&self) -> &[Vec<ProtocolMessage>] {
        &self.flights
    }

    /// Returns the position of message `name` within `flight`.
    pub fn position(&self, flight: usize, name: &str) -> Option<usize> {
        self.messages(flight).iter().position(|m| m.name() == name)
    }

    /// Returns every flight containing a message named `name`.
    pub fn flights_containing(&self, name: &str) -> Vec<usize> {
        self.flights
            .iter()
            .enumerate()
            .filter(|(_, flight)| flight.iter().any(|m| m.name() == name))
            .map(|(index, _)| index)
            .collect()
    }

    /// Returns total bytes of `flight`.
    pub fn flight_length(&self, flight: usize) -> usize {
        self.messages(flight).iter().map(ProtocolMessage::length).sum()
    }
}
