//! Error types shared across the queueing network.
//!
//! This module defines the central `Error` enum, capturing all recoverable
//! and reportable error cases within the simulator.
//!
//! ## Error Cases
//! - `Closed`: an operation was attempted on a queue or channel that has
//!   already been shut down.
//! - `Timeout`: a deadline elapsed before a fan-in completed.
//! - `LegFailed`: a stage-2 processor returned an explicit negative
//!   response for one leg of a request.
//! - `Exhausted`: a request used up `max_retries` without succeeding.
//! - `TransportError`: the underlying channel was lost mid-flight; treated
//!   as a leg failure by the client, never as a crash.
//! - `ChannelError`: an internal send/receive failure between tasks.
//! - `ConfigError`: a fatal, startup-time configuration problem.

pub type Result<T> = core::result::Result<T, Error>;

/// Unified error type for the simulator.
#[derive(Clone, thiserror::Error, Debug)]
#[non_exhaustive]
pub enum Error {
    /// Operation attempted on a queue or channel after it was closed.
    #[error("queue or channel is closed")]
    Closed,

    /// A client's fan-in deadline elapsed before all legs completed.
    #[error("deadline elapsed waiting for request {request_id}")]
    Timeout { request_id: u64 },

    /// A stage-2 processor returned `ok=false` for one leg.
    #[error("leg {producer_kind:?} failed for request {request_id}")]
    LegFailed { request_id: u64, producer_kind: crate::Kind },

    /// A request exhausted `max_retries` without succeeding.
    #[error("request {request_id} exhausted retries")]
    Exhausted { request_id: u64 },

    /// The underlying transport was lost mid-flight for one leg. Promoted to
    /// a leg failure by the client; never aborts the simulation.
    #[error("transport lost: {context}")]
    TransportError { context: String },

    /// Internal channel send/receive failure (e.g. closed or full channel).
    #[error("channel error: {context}")]
    ChannelError { context: String },

    /// A fatal configuration problem detected before any node was launched.
    #[error("configuration error: {0}")]
    ConfigError(String),
}
