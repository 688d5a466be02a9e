//! Request/response wire types and their lifecycle bookkeeping.
//!
//! These types cross every stage of the pipeline (`K -> Q1 -> P1x -> D ->
//! Q2x -> P2x -> K`). They are immutable after creation; retries produce a
//! fresh `Request` rather than mutating one in flight.

use crate::Kind;
use std::time::Instant;

/// Identifier of the client node that produced a request.
pub type ClientId = u64;

/// An immutable unit of work flowing through the pipeline.
#[derive(Debug, Clone)]
pub struct Request {
    pub id: u64,
    pub kind: Kind,
    pub origin: ClientId,
    pub created_at: Instant,
    pub attempt: u32,
}

impl Request {
    /// The set of stage-2 producer kinds a client must hear from before a
    /// request can be marked successful. Always all three kinds,
    /// regardless of the request's own `kind` — see spec §3.
    pub fn legs_required() -> [Kind; 3] {
        Kind::ALL
    }
}

/// A reply from one stage-2 processor for one leg of a request.
#[derive(Debug, Clone)]
pub struct Response {
    pub request_id: u64,
    pub producer_kind: Kind,
    pub ok: bool,
    pub completed_at: Instant,
}

/// An item as it sits inside a stage-1 subqueue: the request plus the
/// instant it was enqueued, used to compute `Q1::avg_wait`.
#[derive(Debug, Clone)]
pub struct QueueItem {
    pub request: Request,
    pub enqueued_at: Instant,
}

/// The final outcome recorded for a logical request (an original send plus
/// all of its retries), per spec §7.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    Success,
    Timeout,
    MaxRetriesExhausted,
}
