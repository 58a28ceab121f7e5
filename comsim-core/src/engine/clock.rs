//! Simulation time and random number generation for deterministic runs.

use std::cmp::Ordering;
use std::fmt;

use rand::{RngCore, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};

/// Point in simulated time, in seconds since the start of the run.
///
/// Totally ordered so it can key the event heap. Time is independent of the
/// wall clock and only ever moves forward through [`Scheduler`](super::Scheduler).
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SimTime(f64);

impl SimTime {
    /// Start of every simulation.
    pub const ZERO: SimTime = SimTime(0.0);

    /// Creates a time from seconds.
    ///
    /// `-0.0` is stored as `0.0` so it compares equal to [`SimTime::ZERO`].
    pub fn from_secs(secs: f64) -> Self {
        if secs == 0.0 { Self(0.0) } else { Self(secs) }
    }

    /// Returns the time in seconds.
    pub fn as_secs(self) -> f64 {
        self.0
    }

    /// Returns the time `delay` seconds after this one.
    pub fn after(self, delay: f64) -> Self {
        Self(self.0 + delay)
    }

    /// Returns seconds elapsed since `earlier`.
    pub fn since(self, earlier: SimTime) -> f64 {
        self.0 - earlier.0
    }

    /// Checks if the time is a finite number.
    pub fn is_finite(self) -> bool {
        self.0.is_finite()
    }
}

impl PartialEq for SimTime {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for SimTime {}

impl PartialOrd for SimTime {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for SimTime {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0.total_cmp(&other.0)
    }
}

impl fmt::Display for SimTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.3}s", self.0)
    }
}

/// Deterministic random number generator for reproducible simulations.
///
/// Uses ChaCha8 for fast, high-quality pseudorandom numbers with
/// deterministic seed-based generation.
#[derive(Debug)]
pub struct DeterministicRng {
    rng: ChaCha8Rng,
    seed: u64,
}

impl DeterministicRng {
    /// Creates deterministic RNG from seed value.
    pub fn from_seed(seed: u64) -> Self {
        Self {
            rng: ChaCha8Rng::seed_from_u64(seed),
            seed,
        }
    }

    /// Returns the seed used for this RNG.
    pub fn seed(&self) -> u64 {
        self.seed
    }

    /// Generates random number in range [0, 1).
    pub fn random_f64(&mut self) -> f64 {
        // 53 random mantissa bits keep the result strictly below 1.0
        (self.rng.next_u64() >> 11) as f64 * (1.0 / (1u64 << 53) as f64)
    }

    /// Generates random boolean with given probability.
    ///
    /// A probability of 0 never yields `true`, a probability of 1 always does.
    pub fn random_bool(&mut self, probability: f64) -> bool {
        self.random_f64() < probability
    }
}
