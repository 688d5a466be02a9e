//! Append-only run metrics and the final JSON report (spec §6 Output).
//!
//! Counters are atomic or mutex-guarded append-only collections during the
//! run; a consistent snapshot is only taken once, at shutdown, mirroring
//! the teacher's "counters during the run, snapshot at drain" split (see
//! `server::service::handler`'s in-flight/shutdown atomics).

use qnet_core::{ClientId, Kind};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::sync::Mutex;

#[derive(Debug, Default, Clone, Serialize)]
pub struct PerClientStats {
    pub sent: u64,
    pub ok: u64,
    pub failed: u64,
    pub retries: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct PerProcessorStats {
    pub served: u64,
    pub kind: Kind,
}

pub struct Metrics {
    total_requests: AtomicU64,
    successful: AtomicU64,
    failed: AtomicU64,
    latencies_secs: Mutex<Vec<f64>>,
    per_client: Mutex<HashMap<ClientId, PerClientStats>>,
    per_processor: Mutex<HashMap<String, PerProcessorStats>>,
    queue_wait_secs: Mutex<HashMap<Kind, Vec<f64>>>,
    started_at: std::time::Instant,
}

impl Metrics {
    pub fn new() -> Self {
        Self {
            total_requests: AtomicU64::new(0),
            successful: AtomicU64::new(0),
            failed: AtomicU64::new(0),
            latencies_secs: Mutex::new(Vec::new()),
            per_client: Mutex::new(HashMap::new()),
            per_processor: Mutex::new(HashMap::new()),
            queue_wait_secs: Mutex::new(HashMap::new()),
            started_at: std::time::Instant::now(),
        }
    }

    pub async fn record_sent(&self, client: ClientId) {
        self.total_requests.fetch_add(1, Ordering::Relaxed);
        self.per_client.lock().await.entry(client).or_default().sent += 1;
    }

    pub async fn record_retry(&self, client: ClientId) {
        self.per_client.lock().await.entry(client).or_default().retries += 1;
    }

    pub async fn record_success(&self, client: ClientId, latency: Duration) {
        self.successful.fetch_add(1, Ordering::Relaxed);
        self.per_client.lock().await.entry(client).or_default().ok += 1;
        self.latencies_secs.lock().await.push(latency.as_secs_f64());
    }

    pub async fn record_failure(&self, client: ClientId) {
        self.failed.fetch_add(1, Ordering::Relaxed);
        self.per_client.lock().await.entry(client).or_default().failed += 1;
    }

    /// Registers a client so it appears in the report even if it never
    /// sends a request (e.g. a zero-duration run).
    pub async fn register_client(&self, client: ClientId) {
        self.per_client.lock().await.entry(client).or_default();
    }

    pub async fn record_p1_served(&self, kind: Kind) {
        // Stage-1 workers are anonymous for reporting purposes (the report
        // shape in spec §6 keys `per_processor` by stage-2 processor id);
        // still useful as a `tracing` event, not a metrics entry.
        tracing::trace!(kind = %kind, "p1 worker completed one job");
    }

    pub async fn record_p2_served(&self, processor_id: &str, kind: Kind) {
        let mut map = self.per_processor.lock().await;
        let entry = map.entry(processor_id.to_string()).or_insert(PerProcessorStats { served: 0, kind });
        entry.served += 1;
    }

    pub async fn record_queue_wait(&self, kind: Kind, wait: Duration) {
        self.queue_wait_secs.lock().await.entry(kind).or_default().push(wait.as_secs_f64());
    }

    pub async fn snapshot(&self) -> SimulationReport {
        let total_requests = self.total_requests.load(Ordering::Relaxed);
        let successful = self.successful.load(Ordering::Relaxed);
        let failed = self.failed.load(Ordering::Relaxed);
        let success_rate = if total_requests == 0 {
            0.0
        } else {
            successful as f64 / total_requests as f64
        };

        let latencies = self.latencies_secs.lock().await;
        let avg_latency_seconds = if latencies.is_empty() {
            0.0
        } else {
            latencies.iter().sum::<f64>() / latencies.len() as f64
        };
        drop(latencies);

        let elapsed = self.started_at.elapsed().as_secs_f64().max(f64::EPSILON);
        let throughput_per_second = total_requests as f64 / elapsed;

        let per_client = self.per_client.lock().await.clone();
        let per_processor = self.per_processor.lock().await.clone();

        let waits = self.queue_wait_secs.lock().await;
        let mut queue_wait = HashMap::new();
        for kind in Kind::ALL {
            let samples = waits.get(&kind).cloned().unwrap_or_default();
            queue_wait.insert(kind, percentiles(&samples));
        }
        drop(waits);

        SimulationReport {
            total_requests,
            successful,
            failed,
            success_rate,
            avg_latency_seconds,
            throughput_per_second,
            per_client,
            per_processor,
            queue_wait: queue_wait
                .into_iter()
                .map(|(k, v)| (k.to_string(), v))
                .collect(),
        }
    }

    pub async fn write_json(&self, path: &str) -> anyhow::Result<()> {
        let report = self.snapshot().await;
        let json = serde_json::to_string_pretty(&report)?;
        tokio::fs::write(path, json).await?;
        Ok(())
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct QueueWaitPercentiles {
    pub p50: f64,
    pub p95: f64,
    pub p99: f64,
}

fn percentiles(samples: &[f64]) -> QueueWaitPercentiles {
    if samples.is_empty() {
        return QueueWaitPercentiles { p50: 0.0, p95: 0.0, p99: 0.0 };
    }
    let mut sorted = samples.to_vec();
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap());
    let at = |q: f64| -> f64 {
        let idx = ((sorted.len() as f64 - 1.0) * q).round() as usize;
        sorted[idx.min(sorted.len() - 1)]
    };
    QueueWaitPercentiles {
        p50: at(0.50),
        p95: at(0.95),
        p99: at(0.99),
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SimulationReport {
    pub total_requests: u64,
    pub successful: u64,
    pub failed: u64,
    pub success_rate: f64,
    pub avg_latency_seconds: f64,
    pub throughput_per_second: f64,
    pub per_client: HashMap<ClientId, PerClientStats>,
    pub per_processor: HashMap<String, PerProcessorStats>,
    pub queue_wait: HashMap<String, QueueWaitPercentiles>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn snapshot_accounts_for_sent_ok_failed() {
        let m = Metrics::new();
        m.record_sent(1).await;
        m.record_sent(1).await;
        m.record_success(1, Duration::from_millis(10)).await;
        m.record_failure(1).await;

        let report = m.snapshot().await;
        assert_eq!(report.total_requests, 2);
        assert_eq!(report.successful, 1);
        assert_eq!(report.failed, 1);
        assert_eq!(report.per_client[&1].sent, 2);
        assert_eq!(report.per_client[&1].ok, 1);
        assert_eq!(report.per_client[&1].failed, 1);
    }

    #[test]
    fn percentiles_are_monotonic() {
        let samples: Vec<f64> = (0..100).map(|i| i as f64).collect();
        let p = percentiles(&samples);
        assert!(p.p50 <= p.p95);
        assert!(p.p95 <= p.p99);
    }

    #[test]
    fn percentiles_of_empty_are_zero() {
        let p = percentiles(&[]);
        assert_eq!(p.p50, 0.0);
        assert_eq!(p.p99, 0.0);
    }
}
