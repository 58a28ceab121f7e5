//! Retransmission timeout policies.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

/// Default delay before the first retransmission, in seconds.
pub const DEFAULT_BASE_TIMEOUT: f64 = 10.0;

/// Maps a retransmission attempt index to the timeout guarding it.
///
/// `timeout(i)` is the delay armed after the `i`-th transmission of a flight
/// (starting at 0). `None` means "stop retrying"; an unfinished handshake then
/// stalls.
#[derive(Clone)]
pub enum RetransmissionPolicy {
    /// `base * 2^i`
    Exponential {
        /// Delay for attempt 0
        base: f64,
        /// Number of timeouts before giving up (None = unlimited)
        max_attempts: Option<usize>,
    },
    /// `base * (i + 1)`
    Linear {
        /// Delay for attempt 0
        base: f64,
        /// Number of timeouts before giving up (None = unlimited)
        max_attempts: Option<usize>,
    },
    /// Same delay for every attempt
    Fixed {
        /// Delay for every attempt
        delay: f64,
        /// Number of timeouts before giving up (None = unlimited)
        max_attempts: Option<usize>,
    },
    /// Never retransmit
    Disabled,
    /// Caller-supplied function
    Custom(Arc<dyn Fn(usize) -> Option<f64> + Send + Sync>),
}

impl RetransmissionPolicy {
    /// Creates unlimited exponential backoff starting at 10 s.
    pub fn exponential() -> Self {
        RetransmissionPolicy::Exponential {
            base: DEFAULT_BASE_TIMEOUT,
            max_attempts: None,
        }
    }

    /// Creates unlimited linear backoff starting at 10 s.
    pub fn linear() -> Self {
        RetransmissionPolicy::Linear {
            base: DEFAULT_BASE_TIMEOUT,
            max_attempts: None,
        }
    }

    /// Creates a policy from a closure.
    pub fn custom(timeout: impl Fn(usize) -> Option<f64> + Send + Sync + 'static) -> Self {
        RetransmissionPolicy::Custom(Arc::new(timeout))
    }

    /// Returns a copy limited to `max_attempts` timeouts.
    ///
    /// Has no effect on `Disabled` and `Custom` policies.
    pub fn with_max_attempts(self, max_attempts: usize) -> Self {
        match self {
            RetransmissionPolicy::Exponential { base, .. } => RetransmissionPolicy::Exponential {
                base,
                max_attempts: Some(max_attempts),
            },
            RetransmissionPolicy::Linear { base, .. } => RetransmissionPolicy::Linear {
                base,
                max_attempts: Some(max_attempts),
            },
            RetransmissionPolicy::Fixed { delay, .. } => RetransmissionPolicy::Fixed {
                delay,
                max_attempts: Some(max_attempts),
            },
            other => other,
        }
    }

    /// Returns the timeout for attempt `attempt`, or `None` once exhausted.
    pub fn timeout(&self, attempt: usize) -> Option<f64> {
        let within = |max: &Option<usize>| max.is_none_or(|max| attempt < max);

        let delay = match self {
            RetransmissionPolicy::Exponential { base, max_attempts } if within(max_attempts) => {
                base * 2f64.powi(i32::try_from(attempt).unwrap_or(i32::MAX))
            }
            RetransmissionPolicy::Linear { base, max_attempts } if within(max_attempts) => {
                base * (attempt as f64 + 1.0)
            }
            RetransmissionPolicy::Fixed { delay, max_attempts } if within(max_attempts) => *delay,
            RetransmissionPolicy::Custom(timeout) => timeout(attempt)?,
            _ => return None,
        };

        // Backoff that overflowed is as good as giving up
        delay.is_finite().then_some(delay)
    }
}

impl fmt::Debug for RetransmissionPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RetransmissionPolicy::Exponential { base, max_attempts } => f
                .debug_struct("Exponential")
                .field("base", base)
                .field("max_attempts", max_attempts)
                .finish(),
            RetransmissionPolicy::Linear { base, max_attempts } => f
                .debug_struct("Linear")
                .field("base", base)
                .field("max_attempts", max_attempts)
                .finish(),
            RetransmissionPolicy::Fixed {
                delay,
                max_attempts,
            } => f
                .debug_struct("Fixed")
                .field("delay", delay)
                .field("max_attempts", max_attempts)
                .finish(),
            RetransmissionPolicy::Disabled => write!(f, "Disabled"),
            RetransmissionPolicy::Custom(_) => write!(f, "Custom(..)"),
        }
    }
}

impl FromStr for RetransmissionPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "exponential" => Ok(RetransmissionPolicy::exponential()),
            "linear" => Ok(RetransmissionPolicy::linear()),
            "none" | "disabled" => Ok(RetransmissionPolicy::Disabled),
            _ => Err(format!("Invalid retransmission policy: {s}")),
        }
    }
}
