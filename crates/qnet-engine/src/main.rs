//! `qnet-sim`: a distributed queuing-network simulator. See SPEC_FULL.md
//! for the full component and concurrency model.

use clap::Parser;
use qnet_engine::config::{CliArgs, SimConfig};
use qnet_engine::engine::Engine;
use qnet_engine::telemetry;
use std::sync::Arc;
use tokio::signal;
use tokio_util::sync::CancellationToken;

// Using mimalloc for better performance under contention, same rationale as
// the teacher's server binary.
#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();
    telemetry::init_telemetry();

    let args = CliArgs::parse();
    let config = Arc::new(SimConfig::try_from(args)?);

    tracing::info!(?config, "starting simulation");

    let engine = Engine::build(config).await;
    let shutdown = CancellationToken::new();

    tokio::spawn({
        let shutdown = shutdown.clone();
        async move {
            wait_for_shutdown_signal().await;
            shutdown.cancel();
        }
    });

    engine.run(shutdown).await
}

async fn wait_for_shutdown_signal() {
    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    let ctrl_c = async {
        signal::ctrl_c().await.expect("failed to install Ctrl+C handler");
    };

    tokio::select! {
        () = ctrl_c => tracing::info!("received Ctrl+C signal"),
        () = terminate => tracing::info!("received SIGTERM signal"),
    }
}
