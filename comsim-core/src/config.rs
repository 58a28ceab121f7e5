//! Centralized configuration for Comsim.
//!
//! All tunable parameters of the medium, interference agents and the
//! simulation itself are defined here with documented defaults.

use serde::{Deserialize, Serialize};

use crate::{Result, SimulationError};

/// Shared channel parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MediumConfig {
    /// Channel capacity in bytes per second (None = unlimited)
    pub data_rate: Option<f64>,
    /// Slot grid in seconds transmissions must align to (None = no slotting)
    pub msg_slot_distance: Option<f64>,
    /// Probability that a whole message is lost (0.0 to 1.0)
    pub msg_loss_rate: f64,
    /// Probability that a single bit is corrupted (0.0 to 1.0)
    pub bit_loss_rate: f64,
    /// Mandatory idle gap after each transmission in seconds
    pub inter_msg_time: f64,
}

impl Default for MediumConfig {
    fn default() -> Self {
        Self {
            data_rate: None,
            msg_slot_distance: None,
            msg_loss_rate: 0.0,
            bit_loss_rate: 0.0,
            inter_msg_time: 0.0,
        }
    }
}

impl MediumConfig {
    /// Creates a 2400 bit/s radio link with a 1 ms inter-message gap.
    pub fn low_rate_radio() -> Self {
        Self {
            data_rate: Some(2400.0 / 8.0), // 300 B/s
            inter_msg_time: 0.001,
            ..Default::default()
        }
    }

    /// Returns a copy with the given whole-message loss rate.
    pub fn with_msg_loss_rate(mut self, rate: f64) -> Self {
        self.msg_loss_rate = rate;
        self
    }

    /// Returns a copy with the given bit error rate.
    pub fn with_bit_loss_rate(mut self, rate: f64) -> Self {
        self.bit_loss_rate = rate;
        self
    }

    /// Checks that all parameters are within their valid ranges.
    ///
    /// # Errors
    /// - `SimulationError::Configuration` - A parameter is out of range
    pub fn validate(&self) -> Result<()> {
        for (label, rate) in [
            ("msg_loss_rate", self.msg_loss_rate),
            ("bit_loss_rate", self.bit_loss_rate),
        ] {
            if !(0.0..=1.0).contains(&rate) {
                return Err(SimulationError::Configuration {
                    reason: format!("{label} must be within [0, 1], got {rate}"),
                });
            }
        }

        if let Some(rate) = self.data_rate {
            if !(rate > 0.0 && rate.is_finite()) {
                return Err(SimulationError::Configuration {
                    reason: format!("data_rate must be positive, got {rate}"),
                });
            }
        }

        if let Some(distance) = self.msg_slot_distance {
            if !(distance > 0.0 && distance.is_finite()) {
                return Err(SimulationError::Configuration {
                    reason: format!("msg_slot_distance must be positive, got {distance}"),
                });
            }
        }

        if !(self.inter_msg_time >= 0.0 && self.inter_msg_time.is_finite()) {
            return Err(SimulationError::Configuration {
                reason: format!(
                    "inter_msg_time must be non-negative, got {}",
                    self.inter_msg_time
                ),
            });
        }

        Ok(())
    }
}

/// Periodic channel occupation simulating co-channel interference.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BlockingAgentConfig {
    /// Occupancy requests per second
    pub frequency: f64,
    /// Length of each occupancy in seconds
    pub duration: f64,
    /// Minimum idle time between two own occupancies in seconds
    pub min_sep_time: f64,
    /// Whether missed requests accumulate as backlog
    pub queuing: bool,
}

impl Default for BlockingAgentConfig {
    fn default() -> Self {
        Self {
            frequency: 1.0,
            duration: 0.1,
            min_sep_time: 0.0,
            queuing: true,
        }
    }
}

impl BlockingAgentConfig {
    /// Creates the high-rate, short-burst interferer used in DTLS experiments.
    pub fn short_bursts() -> Self {
        Self {
            frequency: 500.0,
            duration: 0.001,
            min_sep_time: 0.00099,
            queuing: false,
        }
    }

    /// Returns the interval between occupancy requests in seconds.
    pub fn period(&self) -> f64 {
        1.0 / self.frequency
    }

    /// Checks that the occupancy pattern is satisfiable.
    ///
    /// # Errors
    /// - `SimulationError::Configuration` - Non-positive frequency, negative
    ///   times, or a period not longer than `duration + min_sep_time`
    pub fn validate(&self) -> Result<()> {
        if !(self.frequency > 0.0 && self.frequency.is_finite()) {
            return Err(SimulationError::Configuration {
                reason: format!("frequency must be positive, got {}", self.frequency),
            });
        }
        if !(self.duration >= 0.0 && self.min_sep_time >= 0.0) {
            return Err(SimulationError::Configuration {
                reason: "duration and min_sep_time must be non-negative".to_string(),
            });
        }
        if self.period() <= self.duration + self.min_sep_time {
            return Err(SimulationError::Configuration {
                reason: format!(
                    "period {:.6}s must exceed duration {:.6}s plus separation {:.6}s",
                    self.period(),
                    self.duration,
                    self.min_sep_time
                ),
            });
        }
        Ok(())
    }
}

/// Top-level simulation settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimulationConfig {
    /// Seed for all loss draws
    pub seed: u64,
    /// Parameters of the primary medium
    pub medium: MediumConfig,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            seed: 0,
            medium: MediumConfig::low_rate_radio(),
        }
    }
}

impl SimulationConfig {
    /// Creates a configuration for deterministic testing.
    pub fn deterministic_testing() -> Self {
        Self {
            seed: 42,                         // Fixed seed for reproducible tests
            medium: MediumConfig::default(), // Unlimited, lossless channel
        }
    }

    /// Creates configuration with environment variable overrides.
    ///
    /// Reads `COMSIM_SEED`, `COMSIM_MSG_LOSS_RATE`, `COMSIM_BIT_LOSS_RATE`
    /// and `COMSIM_DATA_RATE`. Unparseable values are ignored.
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Some(seed) = env_value::<u64>("COMSIM_SEED") {
            config.seed = seed;
        }

        if let Some(rate) = env_value::<f64>("COMSIM_MSG_LOSS_RATE") {
            config.medium.msg_loss_rate = rate;
        }

        if let Some(rate) = env_value::<f64>("COMSIM_BIT_LOSS_RATE") {
            config.medium.bit_loss_rate = rate;
        }

        if let Some(rate) = env_value::<f64>("COMSIM_DATA_RATE") {
            config.medium.data_rate = Some(rate);
        }

        config
    }
}

fn env_value<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok()?.parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_medium_is_valid() {
        assert!(MediumConfig::default().validate().is_ok());
        assert!(MediumConfig::low_rate_radio().validate().is_ok());
        assert_eq!(MediumConfig::low_rate_radio().data_rate, Some(300.0));
    }

    #[test]
    fn test_medium_rejects_out_of_range_rates() {
        let config = MediumConfig::default().with_msg_loss_rate(1.5);
        assert!(config.validate().is_err());

        let config = MediumConfig::default().with_bit_loss_rate(-0.1);
        assert!(config.validate().is_err());

        let config = MediumConfig {
            data_rate: Some(0.0),
            ..Default::default()
        };
        assert!(config.validate().is_err());

        let config = MediumConfig {
            inter_msg_time: -0.5,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_blocking_period_must_exceed_occupancy() {
        let config = BlockingAgentConfig {
            frequency: 2.0,
            duration: 0.3,
            min_sep_time: 0.1,
            queuing: true,
        };
        assert!(config.validate().is_ok());

        // Period equal to occupancy plus separation is unsatisfiable
        let config = BlockingAgentConfig {
            frequency: 2.0,
            duration: 0.4,
            min_sep_time: 0.1,
            queuing: true,
        };
        assert!(matches!(
            config.validate(),
            Err(SimulationError::Configuration { .. })
        ));

        let config = BlockingAgentConfig {
            frequency: 2.0,
            duration: 0.6,
            min_sep_time: 0.0,
            queuing: false,
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_short_bursts_preset_is_valid() {
        let config = BlockingAgentConfig::short_bursts();
        assert!(config.validate().is_ok());
        assert!((config.period() - 0.002).abs() < 1e-12);
    }

    #[test]
    fn test_deterministic_testing_preset() {
        let config = SimulationConfig::deterministic_testing();
        assert_eq!(config.seed, 42);
        assert_eq!(config.medium.data_rate, None);
        assert_eq!(config.medium.msg_loss_rate, 0.0);
    }
}
