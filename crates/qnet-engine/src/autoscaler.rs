//! The autoscaler (spec §4.6): a periodic task that grows or shrinks each
//! kind's `P1x` pool based on `Q1::avg_wait`, subject to bounds, a
//! hysteresis band, and a per-kind cooldown.

use crate::config::SimConfig;
use crate::pool1::Pool1;
use crate::queue1::Queue1;
use qnet_core::Kind;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;

pub struct Autoscaler {
    pools: HashMap<Kind, Arc<Pool1>>,
    queue1: Arc<Queue1>,
    config: Arc<SimConfig>,
    last_scale_event: Mutex<HashMap<Kind, Instant>>,
}

impl Autoscaler {
    pub fn new(pools: HashMap<Kind, Arc<Pool1>>, queue1: Arc<Queue1>, config: Arc<SimConfig>) -> Self {
        Self {
            pools,
            queue1,
            config,
            last_scale_event: Mutex::new(HashMap::new()),
        }
    }

    /// Runs the periodic scaling loop until `shutdown` is cancelled.
    pub async fn run(self: Arc<Self>, shutdown: CancellationToken) {
        let mut ticker = tokio::time::interval(self.config.scaling_check_interval);
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = ticker.tick() => {
                    for kind in Kind::ALL {
                        self.check_one(kind).await;
                    }
                }
            }
        }
    }

    async fn cooldown_elapsed(&self, kind: Kind, now: Instant) -> bool {
        let last = self.last_scale_event.lock().await;
        match last.get(&kind) {
            Some(t) => now.duration_since(*t) >= self.config.scaling_cooldown,
            None => true,
        }
    }

    async fn check_one(&self, kind: Kind) {
        let now = Instant::now();
        if !self.cooldown_elapsed(kind, now).await {
            return;
        }

        let Some(avg_wait) = self.queue1.avg_wait(kind, self.config.scaling_cooldown).await else {
            return; // fewer than the minimum sample count: no action.
        };

        let pool = &self.pools[&kind];
        let size = pool.size().await;

        if avg_wait > self.config.avg_wait_time_threshold && size < self.config.max_processors_per_type {
            pool.spawn_worker().await;
            self.last_scale_event.lock().await.insert(kind, now);
            tracing::info!(kind = %kind, ?avg_wait, new_size = size + 1, "scaled up");
        } else if avg_wait < self.config.scale_down_threshold && size > self.config.min_processors_per_type {
            pool.retire_one().await;
            self.last_scale_event.lock().await.insert(kind, now);
            tracing::info!(kind = %kind, ?avg_wait, new_size = size - 1, "scaled down");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CliArgs;
    use crate::distributor::Distributor;
    use crate::metrics::Metrics;
    use crate::queue2::Queue2;
    use clap::Parser;
    use qnet_core::{Request, ServiceTimeDistribution};
    use std::time::Duration;

    fn test_config(overrides: impl FnOnce(&mut CliArgs)) -> Arc<SimConfig> {
        let mut args = CliArgs::parse_from(["qnet-sim"]);
        overrides(&mut args);
        Arc::new(SimConfig::try_from(args).unwrap())
    }

    fn test_distributor() -> Arc<Distributor> {
        Arc::new(Distributor::new([
            Arc::new(Queue2::new(Kind::Z1)),
            Arc::new(Queue2::new(Kind::Z2)),
            Arc::new(Queue2::new(Kind::Z3)),
        ]))
    }

    #[tokio::test]
    async fn scales_up_past_threshold_and_respects_max() {
        let config = test_config(|a| {
            a.avg_wait_time_threshold = 0.01;
            a.scale_down_threshold = 0.0;
            a.max_processors_per_type = 2;
            a.min_processors_per_type = 1;
            a.scaling_cooldown = 1.0;
        });
        let queue1 = Arc::new(Queue1::new());
        let metrics = Arc::new(Metrics::new());
        let mut pools = HashMap::new();
        for kind in Kind::ALL {
            let pool = Arc::new(Pool1::new(kind, test_distributor(), metrics.clone(), ServiceTimeDistribution::Fixed { seconds: 0.0 }, 1));
            pool.spawn_worker().await;
            pools.insert(kind, pool);
        }
        let autoscaler = Autoscaler::new(pools.clone(), queue1.clone(), config);

        // Manufacture an avg_wait above threshold by enqueueing and slowly
        // dequeuing z3 items (simulating accumulated wait).
        for i in 0..5u64 {
            queue1
                .enqueue(Request { id: i, kind: Kind::Z3, origin: 1, created_at: Instant::now(), attempt: 0 })
                .await
                .unwrap();
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
        for _ in 0..5 {
            queue1.dequeue_for(Kind::Z3).await;
        }

        autoscaler.check_one(Kind::Z3).await;
        assert_eq!(pools[&Kind::Z3].size().await, 2);

        // Already at max: a further check must not exceed it.
        for i in 5..10u64 {
            queue1
                .enqueue(Request { id: i, kind: Kind::Z3, origin: 1, created_at: Instant::now(), attempt: 0 })
                .await
                .unwrap();
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
        for _ in 0..5 {
            queue1.dequeue_for(Kind::Z3).await;
        }
        autoscaler.check_one(Kind::Z3).await;
        assert_eq!(pools[&Kind::Z3].size().await, 2);
    }

    #[tokio::test]
    async fn cooldown_suppresses_repeat_actions() {
        let config = test_config(|a| {
            a.avg_wait_time_threshold = 0.01;
            a.scale_down_threshold = 0.0;
            a.scaling_cooldown = 60.0;
            a.max_processors_per_type = 5;
        });
        let queue1 = Arc::new(Queue1::new());
        let metrics = Arc::new(Metrics::new());
        let pool = Arc::new(Pool1::new(Kind::Z1, test_distributor(), metrics.clone(), ServiceTimeDistribution::Fixed { seconds: 0.0 }, 1));
        pool.spawn_worker().await;
        let mut pools = HashMap::new();
        pools.insert(Kind::Z1, pool.clone());
        for kind in [Kind::Z2, Kind::Z3] {
            let p = Arc::new(Pool1::new(kind, test_distributor(), metrics.clone(), ServiceTimeDistribution::Fixed { seconds: 0.0 }, 1));
            p.spawn_worker().await;
            pools.insert(kind, p);
        }
        let autoscaler = Autoscaler::new(pools, queue1.clone(), config);

        for i in 0..5u64 {
            queue1
                .enqueue(Request { id: i, kind: Kind::Z1, origin: 1, created_at: Instant::now(), attempt: 0 })
                .await
                .unwrap();
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
        for _ in 0..5 {
            queue1.dequeue_for(Kind::Z1).await;
        }

        autoscaler.check_one(Kind::Z1).await;
        assert_eq!(pool.size().await, 2);

        // Cooldown just started: immediate re-check must not scale again.
        autoscaler.check_one(Kind::Z1).await;
        assert_eq!(pool.size().await, 2);
    }
}
