//! The queueing network: `Q1`, the `P1x` pools, the distributor, `Q2x`/
//! `P2x`, clients, the autoscaler, and the simulation engine tying them
//! together. Split into a library so `benches/` and integration tests can
//! reach the internals directly, with `src/main.rs` as a thin binary
//! wrapper — mirroring how `ferroid-tonic-core`/`ferroid-tonic-server` keep
//! domain logic out of the bin crate.

pub mod autoscaler;
pub mod client;
pub mod config;
pub mod distributor;
pub mod engine;
pub mod metrics;
pub mod p2x;
pub mod pool1;
pub mod queue1;
pub mod queue2;
pub mod registry;
pub mod telemetry;
