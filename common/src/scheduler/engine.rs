// Trigger loop: each tick pulls candidate events, evaluates both action
// windows, claims due actions in the fired-record store and delivers them.

use crate::calendar::{CalendarEvent, CalendarSource};
use crate::config::Settings;
use crate::delivery::{Delivery, Destination};
use crate::eligibility::is_within_window;
use crate::errors::SchedulerError;
use crate::fired::FiredStore;
use crate::message::render;
use crate::models::ActionKind;
use crate::telemetry;
use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use chrono_tz::Tz;
use futures::stream::{self, StreamExt};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, error, info, instrument, warn};

/// Configuration for the trigger loop
#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    pub reference_timezone: Tz,
    /// How often to evaluate events (in seconds)
    pub poll_interval_seconds: u64,
    /// How far ahead to fetch calendar events (in hours)
    pub lookahead_hours: u32,
    pub category: Option<String>,
    pub admin_chat_id: String,
    pub group_chat_id: String,
    /// Maximum number of actions delivered concurrently per tick
    pub max_concurrent_actions: usize,
}

impl SchedulerConfig {
    pub fn new(
        reference_timezone: Tz,
        admin_chat_id: impl Into<String>,
        group_chat_id: impl Into<String>,
    ) -> Self {
        Self {
            reference_timezone,
            poll_interval_seconds: 60,
            lookahead_hours: 48,
            category: None,
            admin_chat_id: admin_chat_id.into(),
            group_chat_id: group_chat_id.into(),
            max_concurrent_actions: 4,
        }
    }

    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            reference_timezone: settings.trigger.reference_timezone,
            poll_interval_seconds: settings.trigger.poll_interval_seconds,
            lookahead_hours: settings.trigger.lookahead_hours,
            category: settings.trigger.category.clone(),
            admin_chat_id: settings.delivery.admin_chat_id.clone(),
            group_chat_id: settings.delivery.group_chat_id.clone(),
            max_concurrent_actions: settings.trigger.max_concurrent_actions,
        }
    }

    /// Poll goes to the group, the notification to the administrator
    pub fn destination_for(&self, kind: ActionKind) -> Destination {
        match kind {
            ActionKind::Poll => Destination::new(self.group_chat_id.clone()),
            ActionKind::Notification => Destination::new(self.admin_chat_id.clone()),
        }
    }
}

/// What happened during one tick
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TickReport {
    pub events_seen: usize,
    pub invalid_events: usize,
    pub fired: usize,
    pub already_fired: usize,
    pub failed: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ActionOutcome {
    Fired,
    AlreadyFired,
    Failed,
}

/// Scheduler trait for the periodic trigger loop
#[async_trait]
pub trait Scheduler: Send + Sync {
    /// Run the polling loop until stopped
    async fn start(&self) -> Result<(), SchedulerError>;

    /// Stop the polling loop after the current tick
    async fn stop(&self) -> Result<(), SchedulerError>;

    /// Evaluate every candidate event at `now` and fire due actions
    async fn process_tick(&self, now: DateTime<Utc>) -> Result<TickReport, SchedulerError>;
}

/// Identity of one occurrence of a calendar item. Recurring items may share
/// a source id, so the start instant is part of the key.
pub fn occurrence_id(event: &CalendarEvent) -> String {
    format!("{}@{}", event.id, event.occurs_at.timestamp())
}

/// Main trigger loop implementation
pub struct SchedulerEngine {
    config: SchedulerConfig,
    calendar: Arc<dyn CalendarSource>,
    store: Arc<dyn FiredStore>,
    delivery: Arc<dyn Delivery>,
    shutdown_tx: watch::Sender<bool>,
}

impl SchedulerEngine {
    pub fn new(
        config: SchedulerConfig,
        calendar: Arc<dyn CalendarSource>,
        store: Arc<dyn FiredStore>,
        delivery: Arc<dyn Delivery>,
    ) -> Self {
        let (shutdown_tx, _shutdown_rx) = watch::channel(false);
        Self {
            config,
            calendar,
            store,
            delivery,
            shutdown_tx,
        }
    }

    pub fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    /// Actions whose firing window contains `now`
    pub fn due_actions(&self, event: &CalendarEvent, now: DateTime<Utc>) -> Vec<ActionKind> {
        ActionKind::ALL
            .into_iter()
            .filter(|kind| {
                is_within_window(*kind, event.occurs_at, now, self.config.reference_timezone)
            })
            .collect()
    }

    /// Claim, render and deliver one action.
    ///
    /// The claim is taken before delivery so concurrent workers cannot both
    /// send; a failed delivery releases it so a later tick inside the window
    /// retries.
    ///
    /// A transport failure reported after the message was actually accepted
    /// (for example a response timeout) is indistinguishable from one where
    /// nothing was sent, so both the transport retry and the released claim
    /// can send that message a second time.
    #[instrument(skip(self, event), fields(event_id = %event.id, action = %kind))]
    async fn fire_action(&self, event: &CalendarEvent, kind: ActionKind) -> ActionOutcome {
        let key = occurrence_id(event);

        match self.store.try_mark_fired(&key, kind).await {
            Ok(true) => {}
            Ok(false) => {
                debug!("Action already fired, skipping");
                return ActionOutcome::AlreadyFired;
            }
            Err(e) => {
                error!(error = %e, "Failed to claim fired record");
                telemetry::record_action_failed(kind, "store");
                return ActionOutcome::Failed;
            }
        }

        let payload = render(kind, event, self.config.reference_timezone);
        let destination = self.config.destination_for(kind);

        match self.delivery.deliver(&destination, &payload).await {
            Ok(()) => {
                info!(occurs_at = %event.occurs_at, "Action fired");
                telemetry::record_action_fired(kind);
                ActionOutcome::Fired
            }
            Err(e) => {
                error!(error = %e, "Delivery failed");
                telemetry::record_action_failed(kind, e.reason());
                if let Err(clear_err) = self.store.clear(&key, kind).await {
                    warn!(
                        error = %clear_err,
                        "Failed to release claim; action will not be retried"
                    );
                }
                ActionOutcome::Failed
            }
        }
    }
}

#[async_trait]
impl Scheduler for SchedulerEngine {
    #[instrument(skip(self))]
    async fn start(&self) -> Result<(), SchedulerError> {
        info!(
            poll_interval_seconds = self.config.poll_interval_seconds,
            reference_timezone = %self.config.reference_timezone,
            "Starting trigger loop"
        );

        let mut poll_interval = interval(Duration::from_secs(self.config.poll_interval_seconds));
        poll_interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut shutdown_rx = self.shutdown_tx.subscribe();

        while !*shutdown_rx.borrow() {
            tokio::select! {
                _ = poll_interval.tick() => {
                    match self.process_tick(Utc::now()).await {
                        Ok(report) if report.fired > 0 || report.failed > 0 => {
                            info!(?report, "Tick processed");
                        }
                        Ok(report) => {
                            debug!(?report, "Tick processed, nothing due");
                        }
                        Err(e) => {
                            // Windows are wider than one tick, so the next tick retries
                            error!(error = %e, "Tick failed");
                        }
                    }
                }
                _ = shutdown_rx.changed() => {
                    info!("Shutdown signal received, stopping trigger loop");
                }
            }
        }

        info!("Trigger loop stopped");
        Ok(())
    }

    async fn stop(&self) -> Result<(), SchedulerError> {
        info!("Stopping trigger loop");
        self.shutdown_tx.send_replace(true);
        Ok(())
    }

    #[instrument(skip(self), fields(now = %now))]
    async fn process_tick(&self, now: DateTime<Utc>) -> Result<TickReport, SchedulerError> {
        let tz = self.config.reference_timezone;
        let until = now
            .checked_add_signed(ChronoDuration::hours(i64::from(self.config.lookahead_hours)))
            .unwrap_or(DateTime::<Utc>::MAX_UTC);

        let records = self
            .calendar
            .fetch_events(now, until, self.config.category.as_deref())
            .await?;

        let mut report = TickReport::default();
        let mut due = Vec::new();

        for record in records {
            match record.into_event(tz) {
                Ok(event) => {
                    report.events_seen += 1;
                    for kind in self.due_actions(&event, now) {
                        due.push((event.clone(), kind));
                    }
                }
                Err(e) => {
                    warn!(error = %e, "Skipping invalid calendar event");
                    telemetry::record_invalid_event();
                    report.invalid_events += 1;
                }
            }
        }

        debug!(
            events_seen = report.events_seen,
            due_actions = due.len(),
            "Evaluated calendar events"
        );

        let actions: Vec<_> = due
            .iter()
            .map(|(event, kind)| self.fire_action(event, *kind))
            .collect();
        let outcomes: Vec<ActionOutcome> = stream::iter(actions)
            .buffer_unordered(self.config.max_concurrent_actions.max(1))
            .collect()
            .await;

        for outcome in outcomes {
            match outcome {
                ActionOutcome::Fired => report.fired += 1,
                ActionOutcome::AlreadyFired => report.already_fired += 1,
                ActionOutcome::Failed => report.failed += 1,
            }
        }

        telemetry::update_events_seen(report.events_seen);
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn config() -> SchedulerConfig {
        SchedulerConfig::new(chrono_tz::Europe::Berlin, "admin", "group")
    }

    #[test]
    fn test_scheduler_config_new_defaults() {
        let config = config();
        assert_eq!(config.poll_interval_seconds, 60);
        assert_eq!(config.lookahead_hours, 48);
        assert_eq!(config.max_concurrent_actions, 4);
        assert!(config.category.is_none());
    }

    #[test]
    fn test_scheduler_config_from_settings() {
        let mut settings = Settings::default();
        settings.trigger.category = Some("service".to_string());
        settings.trigger.reference_timezone = chrono_tz::America::New_York;
        let config = SchedulerConfig::from_settings(&settings);
        assert_eq!(config.category.as_deref(), Some("service"));
        assert_eq!(config.reference_timezone, chrono_tz::America::New_York);
        assert_eq!(config.admin_chat_id, settings.delivery.admin_chat_id);
    }

    #[test]
    fn test_destinations_by_action() {
        let config = config();
        assert_eq!(config.destination_for(ActionKind::Poll).chat_id, "group");
        assert_eq!(config.destination_for(ActionKind::Notification).chat_id, "admin");
    }

    #[test]
    fn test_occurrence_id_includes_start_instant() {
        let event = CalendarEvent {
            id: "weekly".to_string(),
            title: String::new(),
            theme: None,
            occurs_at: Utc.with_ymd_and_hms(2024, 6, 16, 8, 0, 0).unwrap(),
        };
        let next_week = CalendarEvent {
            occurs_at: event.occurs_at + ChronoDuration::days(7),
            ..event.clone()
        };
        assert_ne!(occurrence_id(&event), occurrence_id(&next_week));
        assert!(occurrence_id(&event).starts_with("weekly@"));
    }
}
