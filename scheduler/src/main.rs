// Reminder scheduler binary entry point

use common::bootstrap;
use common::config::Settings;
use common::scheduler::Scheduler;
use common::telemetry;
use std::sync::Arc;
use tracing::{error, info};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let settings = Settings::load()?;

    telemetry::init_logging(&settings.observability.log_level)?;
    info!("Starting reminder scheduler");

    settings.validate().map_err(|e| {
        error!(error = %e, "Invalid configuration");
        anyhow::anyhow!(e)
    })?;

    info!(
        reference_timezone = %settings.trigger.reference_timezone,
        poll_interval_seconds = settings.trigger.poll_interval_seconds,
        calendar_mode = ?settings.calendar.mode,
        store_mode = ?settings.store.mode,
        delivery_mode = ?settings.delivery.mode,
        "Configuration loaded"
    );

    telemetry::init_metrics(settings.observability.metrics_port)?;

    let scheduler = Arc::new(bootstrap::init_scheduler(&settings).await.map_err(|e| {
        error!(error = %e, "Failed to initialize scheduler");
        e
    })?);
    info!("Scheduler engine created");

    // Set up graceful shutdown on SIGINT
    let scheduler_for_shutdown = scheduler.clone();
    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "Failed to listen for Ctrl+C");
            return;
        }
        info!("Received Ctrl+C signal, initiating graceful shutdown");
        if let Err(e) = scheduler_for_shutdown.stop().await {
            error!(error = %e, "Error during scheduler shutdown");
        }
    });

    if let Err(e) = scheduler.start().await {
        error!(error = %e, "Scheduler error");
        return Err(e.into());
    }

    info!("Scheduler stopped");
    Ok(())
}
