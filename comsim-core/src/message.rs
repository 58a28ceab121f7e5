//! Opaque, named and sized message tokens.
//!
//! Messages carry no payload. Only the name (to match flights) and the
//! length (to derive airtime and loss probability) matter to the simulation.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::{Result, SimulationError};

/// Unit handed to the medium for delivery.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Message {
    /// Control token, delivered instantly and never lost
    Plain(String),
    /// Sized protocol message subject to bandwidth and loss modelling
    Protocol(ProtocolMessage),
}

impl Message {
    /// Creates an unmodelled control message.
    pub fn plain(name: impl Into<String>) -> Self {
        Message::Plain(name.into())
    }

    /// Returns the message name.
    pub fn name(&self) -> &str {
        match self {
            Message::Plain(name) => name,
            Message::Protocol(message) => message.name(),
        }
    }

    /// Returns the modelled length in bytes (zero for plain messages).
    pub fn length(&self) -> usize {
        match self {
            Message::Plain(_) => 0,
            Message::Protocol(message) => message.length(),
        }
    }

    /// Returns the protocol message, if this is one.
    pub fn as_protocol(&self) -> Option<&ProtocolMessage> {
        match self {
            Message::Plain(_) => None,
            Message::Protocol(message) => Some(message),
        }
    }
}

impl From<ProtocolMessage> for Message {
    fn from(message: ProtocolMessage) -> Self {
        Message::Protocol(message)
    }
}

impl fmt::Display for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Message::Plain(name) => write!(f, "{name}"),
            Message::Protocol(message) => message.fmt(f),
        }
    }
}

/// Protocol message with a length in bytes.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ProtocolMessage {
    name: String,
    length: usize,
}

impl ProtocolMessage {
    /// Creates a protocol message.
    pub fn new(name: impl Into<String>, length: usize) -> Self {
        Self {
            name: name.into(),
            length,
        }
    }

    /// Returns the message name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the length in bytes.
    pub fn length(&self) -> usize {
        self.length
    }

    /// Splits the message into fragments of at most `payload_len` payload bytes.
    ///
    /// Each fragment carries `fixed_overhead` extra bytes and is named
    /// `<name>.f<index>` starting at index 0. A zero-length message yields no
    /// fragments.
    ///
    /// # Errors
    /// - `SimulationError::InvalidFragmentation` - `payload_len` is zero
    pub fn fragment(&self, payload_len: usize, fixed_overhead: usize) -> Result<Vec<ProtocolMessage>> {
        if payload_len == 0 {
            return Err(SimulationError::InvalidFragmentation {
                message: self.name.clone(),
                reason: "payload length must be positive".to_string(),
            });
        }

        let count = self.length.div_ceil(payload_len);
        let fragments = (0..count)
            .map(|index| {
                let offset = index * payload_len;
                let payload = payload_len.min(self.length - offset);
                ProtocolMessage::new(
                    format!("{}.f{index}", self.name),
                    payload + fixed_overhead,
                )
            })
            .collect();

        Ok(fragments)
    }
}

impl fmt::Display for ProtocolMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}(L={})", self.name, self.length)
    }
}
