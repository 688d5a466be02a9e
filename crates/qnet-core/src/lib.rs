//! Domain types, error kinds, and the service-time oracle shared by
//! `qnet-engine`'s stage-1/stage-2 pipeline, client fan-in, and autoscaler.

mod error;
mod kind;
mod request;
mod service_time;

pub use error::{Error, Result};
pub use kind::Kind;
pub use request::{ClientId, Disposition, QueueItem, Request, Response};
pub use service_time::{sub_rng, ServiceTimeDistribution};
