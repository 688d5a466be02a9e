//! The simulation engine (spec §4.7): builds the topology, runs traffic for
//! `duration`, performs an orderly drain shutdown, and aggregates metrics
//! into the final report.

use crate::autoscaler::Autoscaler;
use crate::client::Client;
use crate::config::SimConfig;
use crate::distributor::Distributor;
use crate::metrics::Metrics;
use crate::p2x;
use crate::pool1::Pool1;
use crate::queue1::Queue1;
use crate::queue2::Queue2;
use crate::registry::ClientRegistry;
use qnet_core::Kind;
use std::collections::HashMap;
use std::sync::atomic::AtomicU64;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Owns every long-lived task handle so shutdown can join them in the
/// order spec §4.7/§9 describes: clients first, then processors, then
/// queues.
pub struct Engine {
    config: Arc<SimConfig>,
    metrics: Arc<Metrics>,
    queue1: Arc<Queue1>,
    pools: HashMap<Kind, Arc<Pool1>>,
    client_shutdown: CancellationToken,
    p2x_shutdown: CancellationToken,
    autoscaler_shutdown: CancellationToken,
    intake_handles: Vec<tokio::task::JoinHandle<()>>,
    p2x_handles: Vec<tokio::task::JoinHandle<()>>,
    client_handles: Vec<tokio::task::JoinHandle<()>>,
    autoscaler_handle: Option<tokio::task::JoinHandle<()>>,
}

impl Engine {
    pub async fn build(config: Arc<SimConfig>) -> Self {
        let metrics = Arc::new(Metrics::new());
        let queue1 = Arc::new(Queue1::new());

        let queues2: HashMap<Kind, Arc<Queue2>> =
            Kind::ALL.into_iter().map(|k| (k, Arc::new(Queue2::new(k)))).collect();
        let distributor = Arc::new(Distributor::new([
            queues2[&Kind::Z1].clone(),
            queues2[&Kind::Z2].clone(),
            queues2[&Kind::Z3].clone(),
        ]));

        let mut pools = HashMap::new();
        let mut intake_handles = Vec::new();
        for kind in Kind::ALL {
            let pool = Arc::new(Pool1::new(kind, distributor.clone(), metrics.clone(), config.service_time, config.seed));
            for _ in 0..config.min_processors_per_type {
                pool.spawn_worker().await;
            }
            intake_handles.push(tokio::spawn(pool.clone().run_intake(queue1.clone())));
            pools.insert(kind, pool);
        }

        let registry = Arc::new(ClientRegistry::new());
        let p2x_shutdown = CancellationToken::new();
        let mut p2x_handles = Vec::new();
        for kind in Kind::ALL {
            p2x_handles.push(tokio::spawn(p2x::run_supervisor(
                kind,
                queues2[&kind].clone(),
                registry.clone(),
                metrics.clone(),
                config.service_time,
                config.p2x_failure_probability,
                config.idle_timeout,
                config.seed,
                p2x_shutdown.clone(),
            )));
        }

        let request_ids = Arc::new(AtomicU64::new(0));
        let client_shutdown = CancellationToken::new();
        let mut client_handles = Vec::new();
        let mut next_client_id = 0u64;
        for _ in 0..config.num_k1_clients {
            next_client_id += 1;
            client_handles.push(Self::spawn_client(
                next_client_id,
                vec![Kind::Z1, Kind::Z2],
                queue1.clone(),
                registry.clone(),
                metrics.clone(),
                request_ids.clone(),
                config.clone(),
                client_shutdown.clone(),
            ));
        }
        for _ in 0..config.num_k2_clients {
            next_client_id += 1;
            client_handles.push(Self::spawn_client(
                next_client_id,
                vec![Kind::Z2, Kind::Z3],
                queue1.clone(),
                registry.clone(),
                metrics.clone(),
                request_ids.clone(),
                config.clone(),
                client_shutdown.clone(),
            ));
        }

        let autoscaler = Arc::new(Autoscaler::new(pools.clone(), queue1.clone(), config.clone()));
        let autoscaler_shutdown = CancellationToken::new();
        let autoscaler_handle = tokio::spawn(autoscaler.run(autoscaler_shutdown.clone()));

        Self {
            config,
            metrics,
            queue1,
            pools,
            client_shutdown,
            p2x_shutdown,
            autoscaler_shutdown,
            intake_handles,
            p2x_handles,
            client_handles,
            autoscaler_handle: Some(autoscaler_handle),
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn spawn_client(
        id: u64,
        kinds: Vec<Kind>,
        queue1: Arc<Queue1>,
        registry: Arc<ClientRegistry>,
        metrics: Arc<Metrics>,
        request_ids: Arc<AtomicU64>,
        config: Arc<SimConfig>,
        shutdown: CancellationToken,
    ) -> tokio::task::JoinHandle<()> {
        let drain_grace = config.client_request_timeout + Duration::from_secs(1);
        tokio::spawn(async move {
            let rx = registry.register(id).await;
            let client = Client::new(id, kinds, queue1, metrics, request_ids, config);
            client.run(rx, shutdown, drain_grace).await;
        })
    }

    /// Runs traffic generation for `config.duration`, then performs the
    /// drain shutdown sequence and writes the final report.
    pub async fn run(mut self, shutdown: CancellationToken) -> anyhow::Result<()> {
        tokio::select! {
            _ = tokio::time::sleep(self.config.duration) => {
                tracing::info!(duration = ?self.config.duration, "duration elapsed, starting shutdown");
            }
            _ = shutdown.cancelled() => {
                tracing::info!("external shutdown signal received");
            }
        }

        self.shutdown().await;
        self.metrics.write_json(&self.config.output_path).await?;
        tracing::info!(path = %self.config.output_path, "wrote simulation report");
        Ok(())
    }

    /// Drain shutdown per spec §4.7/§9: stop clients, wait for in-flight
    /// requests, retire processors, close queues, stop the autoscaler.
    async fn shutdown(&mut self) {
        tracing::info!("stopping client traffic generation");
        self.client_shutdown.cancel();
        let client_handles = std::mem::take(&mut self.client_handles);
        futures::future::join_all(client_handles).await;

        self.autoscaler_shutdown.cancel();
        if let Some(handle) = self.autoscaler_handle.take() {
            let _ = tokio::time::timeout(Duration::from_secs(1), handle).await;
        }

        tracing::info!("retiring stage-1 processor pools");
        for kind in Kind::ALL {
            self.pools[&kind].shutdown().await;
        }
        self.queue1.close_all();
        let intake_handles = std::mem::take(&mut self.intake_handles);
        futures::future::join_all(intake_handles).await;

        tracing::info!("stopping stage-2 processors");
        self.p2x_shutdown.cancel();
        let p2x_handles = std::mem::take(&mut self.p2x_handles);
        let _ = tokio::time::timeout(Duration::from_secs(3), futures::future::join_all(p2x_handles)).await;

        tracing::info!("shutdown complete");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CliArgs;
    use clap::Parser;

    fn test_config(overrides: impl FnOnce(&mut CliArgs)) -> Arc<SimConfig> {
        let mut args = CliArgs::parse_from(["qnet-sim"]);
        overrides(&mut args);
        Arc::new(SimConfig::try_from(args).unwrap())
    }

    /// Spec §8 Law: with zero leg-failure probability and zero retries
    /// allowed, every request that completes within the timeout succeeds,
    /// so `success_rate == 1.0` and no client ever records a retry.
    #[tokio::test]
    async fn zero_failure_zero_retries_yields_full_success_rate() {
        let output_path = std::env::temp_dir().join(format!(
            "qnet_sim_test_{}.json",
            std::time::SystemTime::now()
                .duration_since(std::time::UNIX_EPOCH)
                .unwrap()
                .as_nanos()
        ));
        let config = test_config(|a| {
            a.duration = 1;
            a.rate = 20.0;
            a.num_k1_clients = 1;
            a.num_k2_clients = 1;
            a.p2x_failure_probability = 0.0;
            a.max_retries = 0;
            a.service_time_fixed_seconds = 0.0;
            a.client_request_timeout = 2.0;
            a.output_path = output_path.to_string_lossy().into_owned();
        });

        let engine = Engine::build(config).await;
        let shutdown = CancellationToken::new();
        engine.run(shutdown).await.unwrap();

        let written = tokio::fs::read_to_string(&output_path).await.unwrap();
        let report: serde_json::Value = serde_json::from_str(&written).unwrap();
        let _ = tokio::fs::remove_file(&output_path).await;

        assert!(report["total_requests"].as_u64().unwrap() > 0);
        assert_eq!(report["success_rate"].as_f64().unwrap(), 1.0);
        assert_eq!(report["failed"].as_u64().unwrap(), 0);
        for stats in report["per_client"].as_object().unwrap().values() {
            assert_eq!(stats["retries"].as_u64().unwrap(), 0);
        }
    }
}
