// Bootstrap utilities for binary initialization
// Builds the trigger loop collaborators selected by configuration

use crate::calendar::{CalendarSource, FileCalendarSource, HttpCalendarSource};
use crate::config::{CalendarMode, DeliveryMode, Settings, StoreMode};
use crate::delivery::{Delivery, LogDelivery, TelegramDelivery};
use crate::fired::{FiredStore, InMemoryFiredStore, RedisFiredStore};
use crate::retry::ExponentialBackoff;
use crate::scheduler::{SchedulerConfig, SchedulerEngine};
use anyhow::{Context, Result};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

/// Initialize the calendar source
///
/// # Errors
/// Returns error if the configured mode lacks its location or the HTTP client cannot be built
#[tracing::instrument(skip(settings))]
pub fn init_calendar_source(settings: &Settings) -> Result<Arc<dyn CalendarSource>> {
    let calendar = &settings.calendar;
    match calendar.mode {
        CalendarMode::Http => {
            let base_url = calendar
                .base_url
                .clone()
                .context("calendar.base_url is required in http mode")?;
            info!(base_url = %base_url, "Initializing HTTP calendar source");
            let source = HttpCalendarSource::new(
                base_url,
                calendar.api_token.clone(),
                calendar.timeout_seconds,
            )
            .context("Failed to initialize HTTP calendar source")?;
            Ok(Arc::new(source))
        }
        CalendarMode::File => {
            let path = calendar
                .path
                .clone()
                .context("calendar.path is required in file mode")?;
            info!(path = %path, "Initializing file calendar source");
            Ok(Arc::new(FileCalendarSource::new(
                path,
                settings.trigger.reference_timezone,
            )))
        }
    }
}

/// Initialize the fired-record store
///
/// # Errors
/// Returns error if Redis cannot be reached
#[tracing::instrument(skip(settings))]
pub async fn init_fired_store(settings: &Settings) -> Result<Arc<dyn FiredStore>> {
    let ttl = Duration::from_secs(settings.store.fired_ttl_seconds);
    match settings.store.mode {
        StoreMode::Redis => {
            info!("Initializing Redis fired-record store");
            let store = RedisFiredStore::connect(&settings.redis.url, ttl)
                .await
                .context("Failed to connect fired-record store to Redis")?;
            store
                .health_check()
                .await
                .context("Redis health check failed")?;
            Ok(Arc::new(store))
        }
        StoreMode::Memory => {
            warn!("Using in-memory fired-record store; records are lost on restart");
            Ok(Arc::new(InMemoryFiredStore::new()))
        }
    }
}

/// Initialize the delivery channel
///
/// # Errors
/// Returns error if Telegram mode has no bot token
#[tracing::instrument(skip(settings))]
pub fn init_delivery(settings: &Settings) -> Result<Arc<dyn Delivery>> {
    let delivery = &settings.delivery;
    match delivery.mode {
        DeliveryMode::Telegram => {
            let token = delivery
                .bot_token
                .clone()
                .context("delivery.bot_token is required in telegram mode")?;
            info!(max_retries = delivery.max_retries, "Initializing Telegram delivery");
            let retry = ExponentialBackoff::new().with_max_retries(delivery.max_retries);
            let telegram = TelegramDelivery::new(
                delivery.api_base_url.clone(),
                token,
                delivery.timeout_seconds,
            )
            .context("Failed to initialize Telegram delivery")?
            .with_retry(Arc::new(retry));
            Ok(Arc::new(telegram))
        }
        DeliveryMode::Log => {
            info!("Initializing log-only delivery");
            Ok(Arc::new(LogDelivery))
        }
    }
}

/// Wire every collaborator into a ready trigger loop
///
/// # Errors
/// Returns error if any collaborator fails to initialize
pub async fn init_scheduler(settings: &Settings) -> Result<SchedulerEngine> {
    let calendar = init_calendar_source(settings)?;
    let store = init_fired_store(settings).await?;
    let delivery = init_delivery(settings)?;

    Ok(SchedulerEngine::new(
        SchedulerConfig::from_settings(settings),
        calendar,
        store,
        delivery,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_http_calendar_requires_base_url() {
        let mut settings = Settings::default();
        settings.calendar.mode = CalendarMode::Http;
        settings.calendar.base_url = None;
        assert!(init_calendar_source(&settings).is_err());
    }

    #[test]
    fn test_telegram_delivery_requires_token() {
        let mut settings = Settings::default();
        settings.delivery.mode = DeliveryMode::Telegram;
        settings.delivery.bot_token = Some(String::new());
        assert!(init_delivery(&settings).is_err());
    }

    #[tokio::test]
    async fn test_default_settings_build_a_scheduler() {
        let settings = Settings::default();
        let engine = init_scheduler(&settings).await.unwrap();
        assert_eq!(engine.config().reference_timezone, chrono_tz::Europe::Berlin);
    }
}
