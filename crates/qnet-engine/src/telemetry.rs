//! Logging initialization.
//!
//! Carries only the teacher's always-on local layer: a `fmt` layer plus an
//! `EnvFilter` defaulting to `info`. The teacher's OpenTelemetry exporter
//! feature matrix (Honeycomb/stdout OTLP) is not carried — see DESIGN.md.

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

pub fn init_telemetry() {
    let registry = tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .with(
            tracing_subscriber::fmt::layer()
                .with_thread_ids(true)
                .with_line_number(true),
        );
    registry.init();
}
