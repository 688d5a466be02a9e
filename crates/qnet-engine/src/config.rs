//! Runtime configuration for the `qnet-sim` binary.
//!
//! All settings are parsed from CLI arguments or environment variables, with
//! defaults matching spec §6's config surface. Every field is independently
//! tunable, mirroring `ferroid-tonic-server::server::config`'s one
//! doc-comment-per-field style.

use anyhow::bail;
use clap::{Parser, ValueEnum};
use qnet_core::ServiceTimeDistribution;
use std::time::Duration;

/// A request kind distribution a client node generates from, named for the
/// CLI rather than importing `qnet_core::Kind` directly into the argument
/// surface.
#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum ServiceTimeTypeArg {
    Fixed,
    Uniform,
    Exponential,
    Normal,
}

#[derive(Parser, Debug, Clone)]
#[command(
    name = "qnet-sim",
    version,
    about = "A distributed queuing-network simulator: priority dispatch, broadcast fan-out, fallible fan-in, and wait-time-driven autoscaling"
)]
pub struct CliArgs {
    /// Wall-clock duration the simulation runs traffic generation for.
    ///
    /// Environment variable: `DURATION`
    ///
    /// Default: `60`
    #[arg(long, env = "DURATION", default_value_t = 60)]
    pub duration: u64,

    /// Target aggregate arrival rate, in requests per second, per client.
    ///
    /// Environment variable: `RATE`
    ///
    /// Default: `2.0`
    #[arg(long, env = "RATE", default_value_t = 2.0)]
    pub rate: f64,

    /// Seed for the global pseudo-random source. Every client and worker
    /// derives its own substream from this seed and its entity index, so a
    /// fixed seed yields a fully reproducible run (spec §9 "Stochastic
    /// state").
    ///
    /// Environment variable: `SEED`
    ///
    /// Default: `325`
    #[arg(long, env = "SEED", default_value_t = 325)]
    pub seed: u64,

    /// Number of K1 clients (generate from `{z1, z2}`).
    ///
    /// Environment variable: `NUM_K1_CLIENTS`
    ///
    /// Default: `2`
    #[arg(long, env = "NUM_K1_CLIENTS", default_value_t = 2)]
    pub num_k1_clients: usize,

    /// Number of K2 clients (generate from `{z2, z3}`).
    ///
    /// Environment variable: `NUM_K2_CLIENTS`
    ///
    /// Default: `2`
    #[arg(long, env = "NUM_K2_CLIENTS", default_value_t = 2)]
    pub num_k2_clients: usize,

    /// Which service-time distribution `P1x`/`P2x` workers sample from.
    ///
    /// Environment variable: `SERVICE_TIME_TYPE`
    ///
    /// Default: `fixed`
    #[arg(long, env = "SERVICE_TIME_TYPE", value_enum, default_value_t = ServiceTimeTypeArg::Fixed)]
    pub service_time_type: ServiceTimeTypeArg,

    /// `FIXED` distribution's constant duration, in seconds.
    ///
    /// Environment variable: `SERVICE_TIME_FIXED_SECONDS`
    ///
    /// Default: `0.05`
    #[arg(long, env = "SERVICE_TIME_FIXED_SECONDS", default_value_t = 0.05)]
    pub service_time_fixed_seconds: f64,

    /// `UNIFORM` distribution's lower bound, in seconds.
    ///
    /// Environment variable: `SERVICE_TIME_UNIFORM_MIN_SECONDS`
    ///
    /// Default: `0.01`
    #[arg(long, env = "SERVICE_TIME_UNIFORM_MIN_SECONDS", default_value_t = 0.01)]
    pub service_time_uniform_min_seconds: f64,

    /// `UNIFORM` distribution's upper bound, in seconds.
    ///
    /// Environment variable: `SERVICE_TIME_UNIFORM_MAX_SECONDS`
    ///
    /// Default: `0.1`
    #[arg(long, env = "SERVICE_TIME_UNIFORM_MAX_SECONDS", default_value_t = 0.1)]
    pub service_time_uniform_max_seconds: f64,

    /// `EXPONENTIAL` distribution's mean, in seconds.
    ///
    /// Environment variable: `SERVICE_TIME_EXP_MEAN_SECONDS`
    ///
    /// Default: `0.05`
    #[arg(long, env = "SERVICE_TIME_EXP_MEAN_SECONDS", default_value_t = 0.05)]
    pub service_time_exp_mean_seconds: f64,

    /// `NORMAL` distribution's mean, in seconds.
    ///
    /// Environment variable: `SERVICE_TIME_NORMAL_MEAN_SECONDS`
    ///
    /// Default: `0.05`
    #[arg(long, env = "SERVICE_TIME_NORMAL_MEAN_SECONDS", default_value_t = 0.05)]
    pub service_time_normal_mean_seconds: f64,

    /// `NORMAL` distribution's standard deviation, in seconds.
    ///
    /// Environment variable: `SERVICE_TIME_NORMAL_STDDEV_SECONDS`
    ///
    /// Default: `0.01`
    #[arg(long, env = "SERVICE_TIME_NORMAL_STDDEV_SECONDS", default_value_t = 0.01)]
    pub service_time_normal_stddev_seconds: f64,

    /// `Q1.avg_wait` threshold above which the autoscaler grows a kind's
    /// `P1x` pool.
    ///
    /// Environment variable: `AVG_WAIT_TIME_THRESHOLD`
    ///
    /// Default: `5.0`
    #[arg(long, env = "AVG_WAIT_TIME_THRESHOLD", default_value_t = 5.0)]
    pub avg_wait_time_threshold: f64,

    /// `Q1.avg_wait` threshold below which the autoscaler shrinks a kind's
    /// `P1x` pool. Must be strictly less than `avg_wait_time_threshold`;
    /// the band between the two is the hysteresis region where no scaling
    /// action is taken.
    ///
    /// Environment variable: `SCALE_DOWN_THRESHOLD`
    ///
    /// Default: `1.0`
    #[arg(long, env = "SCALE_DOWN_THRESHOLD", default_value_t = 1.0)]
    pub scale_down_threshold: f64,

    /// Minimum wall-clock interval between two successive scaling actions
    /// for the same kind, and the observation window `avg_wait` is
    /// computed over.
    ///
    /// Environment variable: `SCALING_COOLDOWN`
    ///
    /// Default: `5.0`
    #[arg(long, env = "SCALING_COOLDOWN", default_value_t = 5.0)]
    pub scaling_cooldown: f64,

    /// How often the autoscaler evaluates each kind's pool.
    ///
    /// Environment variable: `SCALING_CHECK_INTERVAL`
    ///
    /// Default: `1.0`
    #[arg(long, env = "SCALING_CHECK_INTERVAL", default_value_t = 1.0)]
    pub scaling_check_interval: f64,

    /// Minimum number of `P1x` workers kept alive per kind, regardless of
    /// observed wait time.
    ///
    /// Environment variable: `MIN_PROCESSORS_PER_TYPE`
    ///
    /// Default: `1`
    #[arg(long, env = "MIN_PROCESSORS_PER_TYPE", default_value_t = 1)]
    pub min_processors_per_type: usize,

    /// Maximum number of `P1x` workers allowed per kind.
    ///
    /// Environment variable: `MAX_PROCESSORS_PER_TYPE`
    ///
    /// Default: `5`
    #[arg(long, env = "MAX_PROCESSORS_PER_TYPE", default_value_t = 5)]
    pub max_processors_per_type: usize,

    /// Probability that a `P2x` worker answers a leg with `ok=false`
    /// instead of performing the simulated work.
    ///
    /// Environment variable: `P2X_FAILURE_PROBABILITY`
    ///
    /// Default: `0.05`
    #[arg(long, env = "P2X_FAILURE_PROBABILITY", default_value_t = 0.05)]
    pub p2x_failure_probability: f64,

    /// How long a `P2x` worker may sit idle (no dequeued work) before it
    /// considers itself failed, exits, and is replaced.
    ///
    /// Environment variable: `IDLE_TIMEOUT`
    ///
    /// Default: `30.0`
    #[arg(long, env = "IDLE_TIMEOUT", default_value_t = 30.0)]
    pub idle_timeout: f64,

    /// Deadline for one client request attempt: the time within which all
    /// three legs must answer `ok=true` or the attempt is retried/failed.
    ///
    /// Environment variable: `CLIENT_REQUEST_TIMEOUT`
    ///
    /// Default: `5.0`
    #[arg(long, env = "CLIENT_REQUEST_TIMEOUT", default_value_t = 5.0)]
    pub client_request_timeout: f64,

    /// Maximum number of retries per logical request before it is recorded
    /// as a final failure.
    ///
    /// Environment variable: `MAX_RETRIES`
    ///
    /// Default: `3`
    #[arg(long, env = "MAX_RETRIES", default_value_t = 3)]
    pub max_retries: u32,

    /// Path the final JSON report is written to on shutdown.
    ///
    /// Environment variable: `OUTPUT_PATH`
    ///
    /// Default: `"simulation_results.json"`
    #[arg(long, env = "OUTPUT_PATH", default_value_t = String::from("simulation_results.json"))]
    pub output_path: String,

    /// Base TCP port a socket-backed transport would listen from. Accepted
    /// for config-surface compatibility with spec §6; inert here, since
    /// this implementation's transport is always in-process channels (spec
    /// §9 "Do NOT replicate the source's per-node TCP server").
    ///
    /// Environment variable: `TCP_PORT_BASE`
    ///
    /// Default: `50000`
    #[arg(long, env = "TCP_PORT_BASE", default_value_t = 50000)]
    pub tcp_port_base: u16,

    /// Length-prefix buffer size a socket-backed transport would frame
    /// messages with. Accepted for config-surface compatibility; inert for
    /// the same reason as `tcp_port_base`.
    ///
    /// Environment variable: `BUFFER_SIZE`
    ///
    /// Default: `4096`
    #[arg(long, env = "BUFFER_SIZE", default_value_t = 4096)]
    pub buffer_size: usize,
}

/// Validated, immutable simulation configuration, passed by `Arc` to every
/// subsystem the way `ServerConfig` is passed to `IdService` in the
/// teacher.
#[derive(Debug, Clone)]
pub struct SimConfig {
    pub duration: Duration,
    pub rate: f64,
    pub seed: u64,
    pub num_k1_clients: usize,
    pub num_k2_clients: usize,
    pub service_time: ServiceTimeDistribution,
    pub avg_wait_time_threshold: Duration,
    pub scale_down_threshold: Duration,
    pub scaling_cooldown: Duration,
    pub scaling_check_interval: Duration,
    pub min_processors_per_type: usize,
    pub max_processors_per_type: usize,
    pub p2x_failure_probability: f64,
    pub idle_timeout: Duration,
    pub client_request_timeout: Duration,
    pub max_retries: u32,
    pub output_path: String,
}

impl TryFrom<CliArgs> for SimConfig {
    type Error = anyhow::Error;

    fn try_from(args: CliArgs) -> Result<Self, Self::Error> {
        if args.duration == 0 {
            bail!("DURATION must be greater than 0");
        }
        if args.rate <= 0.0 {
            bail!("RATE must be greater than 0");
        }
        if args.num_k1_clients == 0 && args.num_k2_clients == 0 {
            bail!("at least one of NUM_K1_CLIENTS/NUM_K2_CLIENTS must be non-zero");
        }
        if args.min_processors_per_type == 0 {
            bail!("MIN_PROCESSORS_PER_TYPE must be at least 1");
        }
        if args.min_processors_per_type > args.max_processors_per_type {
            bail!(
                "MIN_PROCESSORS_PER_TYPE ({}) must not exceed MAX_PROCESSORS_PER_TYPE ({})",
                args.min_processors_per_type,
                args.max_processors_per_type
            );
        }
        if args.scale_down_threshold >= args.avg_wait_time_threshold {
            bail!(
                "SCALE_DOWN_THRESHOLD ({}) must be strictly less than AVG_WAIT_TIME_THRESHOLD ({})",
                args.scale_down_threshold,
                args.avg_wait_time_threshold
            );
        }
        if !(0.0..=1.0).contains(&args.p2x_failure_probability) {
            bail!("P2X_FAILURE_PROBABILITY must be within [0.0, 1.0]");
        }
        if args.scaling_cooldown <= 0.0 {
            bail!("SCALING_COOLDOWN must be greater than 0");
        }
        if args.scaling_check_interval <= 0.0 {
            bail!("SCALING_CHECK_INTERVAL must be greater than 0");
        }
        if args.idle_timeout <= 0.0 {
            bail!("IDLE_TIMEOUT must be greater than 0");
        }
        if args.client_request_timeout <= 0.0 {
            bail!("CLIENT_REQUEST_TIMEOUT must be greater than 0");
        }

        let service_time = match args.service_time_type {
            ServiceTimeTypeArg::Fixed => ServiceTimeDistribution::Fixed {
                seconds: args.service_time_fixed_seconds,
            },
            ServiceTimeTypeArg::Uniform => ServiceTimeDistribution::Uniform {
                min_seconds: args.service_time_uniform_min_seconds,
                max_seconds: args.service_time_uniform_max_seconds,
            },
            ServiceTimeTypeArg::Exponential => ServiceTimeDistribution::Exponential {
                mean_seconds: args.service_time_exp_mean_seconds,
            },
            ServiceTimeTypeArg::Normal => ServiceTimeDistribution::Normal {
                mean_seconds: args.service_time_normal_mean_seconds,
                stddev_seconds: args.service_time_normal_stddev_seconds,
            },
        };
        service_time.validate().map_err(|reason| anyhow::anyhow!(reason))?;

        Ok(Self {
            duration: Duration::from_secs(args.duration),
            rate: args.rate,
            seed: args.seed,
            num_k1_clients: args.num_k1_clients,
            num_k2_clients: args.num_k2_clients,
            service_time,
            avg_wait_time_threshold: Duration::from_secs_f64(args.avg_wait_time_threshold),
            scale_down_threshold: Duration::from_secs_f64(args.scale_down_threshold),
            scaling_cooldown: Duration::from_secs_f64(args.scaling_cooldown),
            scaling_check_interval: Duration::from_secs_f64(args.scaling_check_interval),
            min_processors_per_type: args.min_processors_per_type,
            max_processors_per_type: args.max_processors_per_type,
            p2x_failure_probability: args.p2x_failure_probability,
            idle_timeout: Duration::from_secs_f64(args.idle_timeout),
            client_request_timeout: Duration::from_secs_f64(args.client_request_timeout),
            max_retries: args.max_retries,
            output_path: args.output_path,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_args() -> CliArgs {
        CliArgs::parse_from(["qnet-sim"])
    }

    #[test]
    fn defaults_validate_cleanly() {
        let config = SimConfig::try_from(base_args()).unwrap();
        assert_eq!(config.min_processors_per_type, 1);
        assert_eq!(config.max_processors_per_type, 5);
    }

    #[test]
    fn rejects_inverted_processor_bounds() {
        let mut args = base_args();
        args.min_processors_per_type = 5;
        args.max_processors_per_type = 1;
        assert!(SimConfig::try_from(args).is_err());
    }

    #[test]
    fn rejects_threshold_band_inverted() {
        let mut args = base_args();
        args.scale_down_threshold = 10.0;
        args.avg_wait_time_threshold = 1.0;
        assert!(SimConfig::try_from(args).is_err());
    }

    #[test]
    fn rejects_out_of_range_failure_probability() {
        let mut args = base_args();
        args.p2x_failure_probability = 1.5;
        assert!(SimConfig::try_from(args).is_err());
    }

    #[test]
    fn rejects_bad_service_time_params() {
        let mut args = base_args();
        args.service_time_type = ServiceTimeTypeArg::Exponential;
        args.service_time_exp_mean_seconds = 0.0;
        assert!(SimConfig::try_from(args).is_err());
    }
}
