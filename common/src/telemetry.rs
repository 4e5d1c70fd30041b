// Telemetry module for structured logging and metrics

use crate::models::ActionKind;
use anyhow::Result;
use metrics::{counter, describe_counter, describe_gauge, gauge};
use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

/// Initialize structured logging with JSON formatting
///
/// `RUST_LOG` takes precedence over the configured level.
pub fn init_logging(log_level: &str) -> Result<()> {
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(log_level))
        .map_err(|e| anyhow::anyhow!("Failed to create env filter: {}", e))?;

    let json_layer = fmt::layer()
        .json()
        .with_current_span(true)
        .with_span_list(true)
        .with_target(true)
        .with_thread_ids(true)
        .with_filter(env_filter);

    tracing_subscriber::registry()
        .with(json_layer)
        .try_init()
        .map_err(|e| anyhow::anyhow!("Failed to initialize tracing subscriber: {}", e))?;

    tracing::info!(log_level = log_level, "Structured logging initialized");
    Ok(())
}

/// Initialize the Prometheus exporter and describe the trigger metrics.
/// A port of 0 leaves metrics unexported; the recording calls stay no-ops.
pub fn init_metrics(metrics_port: u16) -> Result<()> {
    if metrics_port == 0 {
        tracing::info!("Metrics exporter disabled");
        return Ok(());
    }

    let addr: SocketAddr = format!("0.0.0.0:{}", metrics_port)
        .parse()
        .map_err(|e| anyhow::anyhow!("Invalid metrics port: {}", e))?;

    PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .map_err(|e| anyhow::anyhow!("Failed to install Prometheus exporter: {}", e))?;

    describe_counter!(
        "reminder_actions_fired_total",
        "Actions delivered, by action kind"
    );
    describe_counter!(
        "reminder_actions_failed_total",
        "Actions whose delivery failed, by action kind and reason"
    );
    describe_counter!(
        "reminder_invalid_events_total",
        "Calendar records skipped for a missing or malformed start time"
    );
    describe_gauge!(
        "reminder_events_seen",
        "Calendar events evaluated on the last tick"
    );

    tracing::info!(metrics_port = metrics_port, "Prometheus metrics exporter initialized");
    Ok(())
}

#[inline]
pub fn record_action_fired(kind: ActionKind) {
    counter!("reminder_actions_fired_total", "action" => kind.as_str()).increment(1);
}

#[inline]
pub fn record_action_failed(kind: ActionKind, reason: &'static str) {
    counter!(
        "reminder_actions_failed_total",
        "action" => kind.as_str(),
        "reason" => reason
    )
    .increment(1);
}

#[inline]
pub fn record_invalid_event() {
    counter!("reminder_invalid_events_total").increment(1);
}

#[inline]
pub fn update_events_seen(count: usize) {
    gauge!("reminder_events_seen").set(count as f64);
}
