//! The service-time oracle: `next_service_time(kind) -> Duration`.
//!
//! Spec §1 treats the underlying random distribution as a black box; this
//! module supplies one concrete, reasonable implementation per the config
//! surface named in spec §6 (`service_time_type` and its parameters), using
//! `rand_distr` the way `espresso-network`/`dataforge` do for simulated
//! service/arrival durations.

use rand::Rng;
use rand_distr::{Distribution, Exp, Normal, Uniform};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// One configured service-time distribution, shared by every kind unless a
/// future extension wants per-kind distributions (the spec does not ask
/// for that, so one distribution serves `Z1`, `Z2`, and `Z3` alike).
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(tag = "service_time_type", rename_all = "UPPERCASE")]
pub enum ServiceTimeDistribution {
    Fixed { seconds: f64 },
    Uniform { min_seconds: f64, max_seconds: f64 },
    Exponential { mean_seconds: f64 },
    Normal { mean_seconds: f64, stddev_seconds: f64 },
}

impl ServiceTimeDistribution {
    /// Draws one service-time sample, clamped to be non-negative.
    pub fn sample(&self, rng: &mut impl Rng) -> Duration {
        let seconds = match *self {
            Self::Fixed { seconds } => seconds,
            Self::Uniform { min_seconds, max_seconds } => {
                Uniform::new(min_seconds, max_seconds.max(min_seconds + f64::EPSILON))
                    .expect("uniform bounds validated at startup")
                    .sample(rng)
            }
            Self::Exponential { mean_seconds } => {
                let rate = 1.0 / mean_seconds.max(f64::EPSILON);
                Exp::new(rate)
                    .expect("exponential rate validated at startup")
                    .sample(rng)
            }
            Self::Normal { mean_seconds, stddev_seconds } => Normal::new(mean_seconds, stddev_seconds.max(0.0))
                .expect("normal stddev validated at startup")
                .sample(rng),
        };
        Duration::from_secs_f64(seconds.max(0.0))
    }

    /// Validates the distribution's parameters, returning a human-readable
    /// reason on failure. Called from `qnet-engine`'s config validation so
    /// bad parameters surface as `Error::ConfigError` before any node
    /// launches.
    pub fn validate(&self) -> Result<(), String> {
        match *self {
            Self::Fixed { seconds } if seconds < 0.0 => {
                Err("FIXED service time must be >= 0".to_string())
            }
            Self::Uniform { min_seconds, max_seconds } if min_seconds < 0.0 || max_seconds < min_seconds => {
                Err("UNIFORM requires 0 <= min_seconds <= max_seconds".to_string())
            }
            Self::Exponential { mean_seconds } if mean_seconds <= 0.0 => {
                Err("EXPONENTIAL mean_seconds must be > 0".to_string())
            }
            Self::Normal { stddev_seconds, .. } if stddev_seconds < 0.0 => {
                Err("NORMAL stddev_seconds must be >= 0".to_string())
            }
            _ => Ok(()),
        }
    }
}

impl Default for ServiceTimeDistribution {
    fn default() -> Self {
        Self::Fixed { seconds: 0.05 }
    }
}

/// Derives a deterministic, per-entity RNG substream from a global seed so
/// that clients and workers can draw independently without contending on a
/// shared generator, while keeping the whole run reproducible (spec §9
/// "Stochastic state").
pub fn sub_rng(seed: u64, domain: &str, index: u64) -> rand::rngs::StdRng {
    use rand::SeedableRng;
    use std::hash::{Hash, Hasher};

    let mut hasher = std::collections::hash_map::DefaultHasher::new();
    seed.hash(&mut hasher);
    domain.hash(&mut hasher);
    index.hash(&mut hasher);
    rand::rngs::StdRng::seed_from_u64(hasher.finish())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fixed_is_deterministic_regardless_of_rng_state() {
        let dist = ServiceTimeDistribution::Fixed { seconds: 1.5 };
        let mut rng = sub_rng(1, "test", 0);
        assert_eq!(dist.sample(&mut rng), Duration::from_secs_f64(1.5));
    }

    #[test]
    fn sub_rng_is_reproducible() {
        let mut a = sub_rng(42, "client", 3);
        let mut b = sub_rng(42, "client", 3);
        let dist = ServiceTimeDistribution::Exponential { mean_seconds: 1.0 };
        assert_eq!(dist.sample(&mut a), dist.sample(&mut b));
    }

    #[test]
    fn sub_rng_differs_per_index() {
        let mut a = sub_rng(42, "client", 3);
        let mut b = sub_rng(42, "client", 4);
        let dist = ServiceTimeDistribution::Exponential { mean_seconds: 1.0 };
        assert_ne!(dist.sample(&mut a), dist.sample(&mut b));
    }

    #[test]
    fn validate_rejects_bad_params() {
        assert!(ServiceTimeDistribution::Exponential { mean_seconds: 0.0 }.validate().is_err());
        assert!(ServiceTimeDistribution::Uniform { min_seconds: 2.0, max_seconds: 1.0 }.validate().is_err());
        assert!(ServiceTimeDistribution::Normal { mean_seconds: 1.0, stddev_seconds: -1.0 }.validate().is_err());
    }
}
