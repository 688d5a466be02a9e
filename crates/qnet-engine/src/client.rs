//! Client nodes (`K`): request generation, multi-leg fan-in, timeout and
//! retry (spec §4.5).

use crate::config::SimConfig;
use crate::metrics::Metrics;
use crate::queue1::Queue1;
use qnet_core::{sub_rng, ClientId, Disposition, Kind, Request, Response};
use rand::seq::IndexedRandom;
use rand::Rng;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// Tracks the still-outstanding legs of one in-flight attempt.
struct LegTracker {
    request: Request,
    first_created_at: Instant,
    awaiting: HashSet<Kind>,
    leg_failed: bool,
    deadline: Instant,
}

/// One client node. `kinds` is the set it draws request kinds from
/// uniformly (`K1` => `{z1,z2}`, `K2` => `{z2,z3}` per spec §4.5).
pub struct Client {
    pub id: ClientId,
    kinds: Vec<Kind>,
    queue1: Arc<Queue1>,
    metrics: Arc<Metrics>,
    request_ids: Arc<AtomicU64>,
    config: Arc<SimConfig>,
}

impl Client {
    pub fn new(
        id: ClientId,
        kinds: Vec<Kind>,
        queue1: Arc<Queue1>,
        metrics: Arc<Metrics>,
        request_ids: Arc<AtomicU64>,
        config: Arc<SimConfig>,
    ) -> Self {
        Self {
            id,
            kinds,
            queue1,
            metrics,
            request_ids,
            config,
        }
    }

    fn next_request_id(&self) -> u64 {
        self.request_ids.fetch_add(1, Ordering::Relaxed)
    }

    /// Runs this client's generation + fan-in loop until `shutdown` is
    /// cancelled, then drains any still-outstanding trackers up to
    /// `drain_grace` before returning.
    pub async fn run(
        self,
        mut responses: mpsc::UnboundedReceiver<Response>,
        shutdown: CancellationToken,
        drain_grace: Duration,
    ) {
        self.metrics.register_client(self.id).await;
        let mut rng = sub_rng(self.config.seed, "client", self.id);
        let interarrival_mean = 1.0 / self.config.rate.max(f64::EPSILON);
        let mut trackers: HashMap<u64, LegTracker> = HashMap::new();

        let mut next_arrival = tokio::time::Instant::now() + next_interarrival(&mut rng, interarrival_mean);
        let mut housekeeping = tokio::time::interval(Duration::from_millis(50));

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = tokio::time::sleep_until(next_arrival) => {
                    self.generate(&mut rng, &mut trackers).await;
                    next_arrival = tokio::time::Instant::now() + next_interarrival(&mut rng, interarrival_mean);
                }
                Some(resp) = responses.recv() => {
                    self.handle_response(resp, &mut trackers).await;
                }
                _ = housekeeping.tick() => {
                    self.check_deadlines(&mut trackers).await;
                }
            }
        }

        let _ = tokio::time::timeout(drain_grace, async {
            while !trackers.is_empty() {
                tokio::select! {
                    Some(resp) = responses.recv() => self.handle_response(resp, &mut trackers).await,
                    _ = tokio::time::sleep(Duration::from_millis(20)) => self.check_deadlines(&mut trackers).await,
                }
            }
        })
        .await;

        // Anything left over after the grace period is a final timeout.
        for (_, tracker) in trackers.drain() {
            self.finalize(tracker, Disposition::Timeout).await;
        }
    }

    async fn generate(&self, rng: &mut rand::rngs::StdRng, trackers: &mut HashMap<u64, LegTracker>) {
        let kind = *self.kinds.choose(rng).expect("client always has at least one kind");
        let id = self.next_request_id();
        let now = Instant::now();
        let request = Request {
            id,
            kind,
            origin: self.id,
            created_at: now,
            attempt: 0,
        };
        self.metrics.record_sent(self.id).await;
        if self.queue1.enqueue(request.clone()).await.is_err() {
            return;
        }
        trackers.insert(
            id,
            LegTracker {
                request,
                first_created_at: now,
                awaiting: Kind::ALL.into_iter().collect(),
                leg_failed: false,
                deadline: now + self.config.client_request_timeout,
            },
        );
    }

    async fn handle_response(&self, resp: Response, trackers: &mut HashMap<u64, LegTracker>) {
        let Some(tracker) = trackers.get_mut(&resp.request_id) else {
            return; // late, duplicate, or already finalized — discard silently.
        };
        if resp.ok {
            tracker.awaiting.remove(&resp.producer_kind);
            if tracker.awaiting.is_empty() {
                let tracker = trackers.remove(&resp.request_id).unwrap();
                let latency = tracker.first_created_at.elapsed();
                self.metrics.record_success(self.id, latency).await;
            }
        } else {
            tracker.leg_failed = true;
        }
    }

    async fn check_deadlines(&self, trackers: &mut HashMap<u64, LegTracker>) {
        let now = Instant::now();
        let expired: Vec<u64> = trackers
            .iter()
            .filter(|(_, t)| t.leg_failed || now >= t.deadline)
            .map(|(id, _)| *id)
            .collect();

        for id in expired {
            let Some(tracker) = trackers.remove(&id) else { continue };
            if tracker.request.attempt < self.config.max_retries {
                self.retry(tracker, trackers).await;
            } else {
                self.finalize(tracker, Disposition::MaxRetriesExhausted).await;
            }
        }
    }

    async fn retry(&self, old: LegTracker, trackers: &mut HashMap<u64, LegTracker>) {
        let now = Instant::now();
        let new_request = Request {
            id: self.next_request_id(),
            kind: old.request.kind,
            origin: self.id,
            created_at: now,
            attempt: old.request.attempt + 1,
        };
        if self.queue1.enqueue(new_request.clone()).await.is_err() {
            self.finalize(old, Disposition::Timeout).await;
            return;
        }
        self.metrics.record_retry(self.id).await;
        trackers.insert(
            new_request.id,
            LegTracker {
                request: new_request,
                first_created_at: old.first_created_at,
                awaiting: Kind::ALL.into_iter().collect(),
                leg_failed: false,
                deadline: now + self.config.client_request_timeout,
            },
        );
    }

    async fn finalize(&self, tracker: LegTracker, disposition: Disposition) {
        debug_assert_ne!(disposition, Disposition::Success, "successes finalize via handle_response");
        self.metrics.record_failure(self.id).await;
        tracing::debug!(
            client = self.id,
            request_id = tracker.request.id,
            attempt = tracker.request.attempt,
            ?disposition,
            "request finalized"
        );
    }
}

fn next_interarrival(rng: &mut rand::rngs::StdRng, mean: f64) -> Duration {
    // Poisson process: exponentially distributed inter-arrival times.
    let u: f64 = rng.random_range(f64::EPSILON..1.0);
    Duration::from_secs_f64(-mean * u.ln())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CliArgs;
    use clap::Parser;

    fn test_config() -> Arc<SimConfig> {
        Arc::new(SimConfig::try_from(CliArgs::parse_from(["qnet-sim"])).unwrap())
    }

    #[tokio::test]
    async fn success_requires_all_three_legs() {
        let queue1 = Arc::new(Queue1::new());
        let metrics = Arc::new(Metrics::new());
        let config = test_config();
        let client = Client::new(1, vec![Kind::Z2], queue1.clone(), metrics.clone(), Arc::new(AtomicU64::new(0)), config);

        let (tx, rx) = mpsc::unbounded_channel();
        let shutdown = CancellationToken::new();

        let handle = tokio::spawn(client.run(rx, shutdown.clone(), Duration::from_millis(200)));

        let request = queue1.dequeue_for(Kind::Z2).await.unwrap();
        for kind in Kind::ALL {
            tx.send(Response {
                request_id: request.id,
                producer_kind: kind,
                ok: true,
                completed_at: Instant::now(),
            })
            .unwrap();
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
        shutdown.cancel();
        drop(tx);
        handle.await.unwrap();

        let report = metrics.snapshot().await;
        assert_eq!(report.successful, 1);
        assert_eq!(report.failed, 0);
    }

    #[tokio::test]
    async fn leg_failure_short_circuits_into_retry() {
        let queue1 = Arc::new(Queue1::new());
        let metrics = Arc::new(Metrics::new());
        let mut args = CliArgs::parse_from(["qnet-sim"]);
        args.max_retries = 1;
        args.client_request_timeout = 5.0;
        let config = Arc::new(SimConfig::try_from(args).unwrap());
        let client = Client::new(1, vec![Kind::Z1], queue1.clone(), metrics.clone(), Arc::new(AtomicU64::new(0)), config);

        let (tx, rx) = mpsc::unbounded_channel();
        let shutdown = CancellationToken::new();
        let handle = tokio::spawn(client.run(rx, shutdown.clone(), Duration::from_millis(500)));

        let first = queue1.dequeue_for(Kind::Z1).await.unwrap();
        tx.send(Response {
            request_id: first.id,
            producer_kind: Kind::Z1,
            ok: false,
            completed_at: Instant::now(),
        })
        .unwrap();

        // Short-circuit should cause a retry well before the 5s deadline.
        let retried = tokio::time::timeout(Duration::from_millis(300), queue1.dequeue_for(Kind::Z1))
            .await
            .expect("expected a retried request promptly")
            .unwrap();
        assert_eq!(retried.attempt, 1);

        shutdown.cancel();
        drop(tx);
        handle.await.unwrap();
    }
}
