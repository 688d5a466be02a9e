//! Stage-2 fallible processors (`P2x`): spec §4.4 point 1-3. One logical
//! processor per kind; a supervisor respawns its worker task whenever it
//! self-terminates on idle timeout, so `Q2x` always has exactly one live
//! consumer without the engine needing to notice the handoff.

use crate::metrics::Metrics;
use crate::queue2::{DequeueOutcome, Queue2};
use crate::registry::ClientRegistry;
use qnet_core::{sub_rng, Kind, Response, ServiceTimeDistribution};
use rand::Rng;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;

enum WorkerOutcome {
    IdleTimeout,
    Closed,
    ShutDown,
}

/// Runs the supervisor loop for one kind's `P2x`: spawns a worker, waits
/// for it to exit, and respawns a fresh one unless the exit was due to
/// shutdown or the queue being permanently closed.
pub async fn run_supervisor(
    kind: Kind,
    queue2: Arc<Queue2>,
    registry: Arc<ClientRegistry>,
    metrics: Arc<Metrics>,
    service_time: ServiceTimeDistribution,
    failure_probability: f64,
    idle_timeout: Duration,
    seed: u64,
    shutdown: CancellationToken,
) {
    let mut generation = 0u64;
    loop {
        let processor_id = format!("p2-{kind}-{generation}");
        let rng = sub_rng(seed, "p2x", ((kind as u64) << 32) | generation);
        let outcome = worker_loop(
            kind,
            &processor_id,
            queue2.clone(),
            registry.clone(),
            metrics.clone(),
            service_time,
            failure_probability,
            idle_timeout,
            rng,
            shutdown.clone(),
        )
        .await;

        match outcome {
            WorkerOutcome::IdleTimeout => {
                tracing::debug!(kind = %kind, processor_id, "p2x worker idle-timed-out, respawning");
                generation += 1;
            }
            WorkerOutcome::Closed | WorkerOutcome::ShutDown => break,
        }
    }
}

async fn worker_loop(
    kind: Kind,
    processor_id: &str,
    queue2: Arc<Queue2>,
    registry: Arc<ClientRegistry>,
    metrics: Arc<Metrics>,
    service_time: ServiceTimeDistribution,
    failure_probability: f64,
    idle_timeout: Duration,
    mut rng: rand::rngs::StdRng,
    shutdown: CancellationToken,
) -> WorkerOutcome {
    loop {
        let outcome = tokio::select! {
            biased;
            _ = shutdown.cancelled() => return WorkerOutcome::ShutDown,
            outcome = queue2.dequeue_timeout(idle_timeout) => outcome,
        };

        let request = match outcome {
            DequeueOutcome::Item(req) => req,
            DequeueOutcome::Idle => return WorkerOutcome::IdleTimeout,
            DequeueOutcome::Closed => return WorkerOutcome::Closed,
        };

        let fails = rng.random_bool(failure_probability);
        if !fails {
            let dur = service_time.sample(&mut rng);
            tokio::time::sleep(dur).await;
        }

        let response = Response {
            request_id: request.id,
            producer_kind: kind,
            ok: !fails,
            completed_at: Instant::now(),
        };
        registry.route(response, request.origin).await;
        metrics.record_p2_served(processor_id, kind).await;
    }
}
