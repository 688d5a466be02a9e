//! The distributor (`D`): stateless broadcast fan-out after stage 1.
//!
//! Spec §4.3: on `submit(req)`, deliver `req` to each of the three stage-2
//! queues in undefined order; no state beyond the three downstream queue
//! handles.

use crate::queue2::Queue2;
use qnet_core::Request;
use std::sync::Arc;

pub struct Distributor {
    queues: [Arc<Queue2>; 3],
}

impl Distributor {
    pub fn new(queues: [Arc<Queue2>; 3]) -> Self {
        Self { queues }
    }

    /// Delivers a copy of `req` to every stage-2 queue. Queues are unbounded
    /// in-memory FIFOs (spec §4.3 default), so this never blocks and never
    /// fails under normal operation; a closed downstream queue (shutdown in
    /// progress) is logged and otherwise ignored; the leg will simply never
    /// answer, which the client's own timeout already covers.
    pub async fn submit(&self, req: Request) {
        for queue in &self.queues {
            if let Err(err) = queue.enqueue(req.clone()) {
                tracing::debug!(
                    request_id = req.id,
                    target_kind = %queue.kind(),
                    %err,
                    "distributor leg dropped, queue closed"
                );
            }
        }
    }
}
