// Calendar source collaborators
//
// Records arrive as loosely typed JSON; turning them into events is where
// an absent or unparseable start instant is rejected.

use crate::errors::{CalendarError, EventError};
use crate::models::EventDescriptor;
use crate::schedule::resolve_local;
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use chrono_tz::Tz;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use tracing::{debug, instrument};

const NAIVE_DATETIME_FORMATS: [&str; 4] = [
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M",
];

/// Raw calendar record as returned by the calendar service
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CalendarRecord {
    pub id: String,
    #[serde(default)]
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub starts_at: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub theme: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
}

/// A calendar record with a parsed start instant
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CalendarEvent {
    pub id: String,
    pub title: String,
    pub theme: Option<String>,
    pub occurs_at: DateTime<Utc>,
}

impl CalendarEvent {
    /// The descriptor the trigger engine evaluates
    pub fn descriptor(&self, tz: Tz) -> EventDescriptor {
        EventDescriptor::new(self.occurs_at, self.theme.as_deref(), tz)
    }
}

impl CalendarRecord {
    /// Parse the start instant, failing fast when it is missing or malformed
    pub fn into_event(self, tz: Tz) -> Result<CalendarEvent, EventError> {
        let raw = match self.starts_at.as_deref().map(str::trim) {
            Some(raw) if !raw.is_empty() => raw,
            _ => {
                return Err(EventError::InvalidEvent {
                    event_id: self.id,
                    reason: "missing start time".to_string(),
                })
            }
        };

        let occurs_at = parse_event_instant(raw, tz).ok_or_else(|| EventError::InvalidEvent {
            event_id: self.id.clone(),
            reason: format!("unparseable start time '{}'", raw),
        })?;

        Ok(CalendarEvent {
            id: self.id,
            title: self.title,
            theme: self.theme,
            occurs_at,
        })
    }

    fn matches_category(&self, category: Option<&str>) -> bool {
        match category {
            None => true,
            Some(wanted) => self
                .category
                .as_deref()
                .map(|c| c.eq_ignore_ascii_case(wanted))
                .unwrap_or(false),
        }
    }
}

/// Parse a start instant.
///
/// Accepts RFC 3339 with an offset, a naive local date-time (read in `tz`),
/// or a bare date, which becomes local midnight in `tz`.
pub fn parse_event_instant(raw: &str, tz: Tz) -> Option<DateTime<Utc>> {
    if let Ok(instant) = DateTime::parse_from_rfc3339(raw) {
        return Some(instant.with_timezone(&Utc));
    }

    for format in NAIVE_DATETIME_FORMATS {
        if let Ok(naive) = NaiveDateTime::parse_from_str(raw, format) {
            return Some(resolve_local(naive, tz));
        }
    }

    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .map(|date| resolve_local(date.and_time(NaiveTime::MIN), tz))
}

/// CalendarSource returns candidate records for a time range
#[async_trait]
pub trait CalendarSource: Send + Sync {
    /// Fetch records starting within `[from, to]`, optionally restricted to a category
    async fn fetch_events(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
        category: Option<&str>,
    ) -> Result<Vec<CalendarRecord>, CalendarError>;
}

/// HTTP calendar source reading `GET {base_url}/events`
pub struct HttpCalendarSource {
    client: Client,
    base_url: String,
    api_token: Option<String>,
}

impl HttpCalendarSource {
    /// Create a new HttpCalendarSource with the specified timeout
    pub fn new(
        base_url: impl Into<String>,
        api_token: Option<String>,
        timeout_seconds: u64,
    ) -> Result<Self, CalendarError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(timeout_seconds))
            .build()
            .map_err(|e| {
                CalendarError::RequestFailed(format!("Failed to create HTTP client: {}", e))
            })?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_token,
        })
    }
}

#[async_trait]
impl CalendarSource for HttpCalendarSource {
    #[instrument(skip(self), fields(base_url = %self.base_url))]
    async fn fetch_events(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
        category: Option<&str>,
    ) -> Result<Vec<CalendarRecord>, CalendarError> {
        let mut query = vec![("from", from.to_rfc3339()), ("to", to.to_rfc3339())];
        if let Some(category) = category {
            query.push(("category", category.to_string()));
        }

        let mut request = self
            .client
            .get(format!("{}/events", self.base_url))
            .query(&query);
        if let Some(token) = &self.api_token {
            request = request.bearer_auth(token);
        }

        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(CalendarError::UnexpectedStatus {
                status: status.as_u16(),
                body,
            });
        }

        let records: Vec<CalendarRecord> = response
            .json()
            .await
            .map_err(|e| CalendarError::InvalidPayload(e.to_string()))?;

        debug!(record_count = records.len(), "Fetched calendar records");
        Ok(records)
    }
}

/// File-backed calendar source holding a JSON array of records
pub struct FileCalendarSource {
    path: PathBuf,
    timezone: Tz,
}

impl FileCalendarSource {
    pub fn new(path: impl Into<PathBuf>, timezone: Tz) -> Self {
        Self {
            path: path.into(),
            timezone,
        }
    }
}

#[async_trait]
impl CalendarSource for FileCalendarSource {
    #[instrument(skip(self), fields(path = %self.path.display()))]
    async fn fetch_events(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
        category: Option<&str>,
    ) -> Result<Vec<CalendarRecord>, CalendarError> {
        let content = tokio::fs::read_to_string(&self.path)
            .await
            .map_err(|e| CalendarError::FileSystemError(e.to_string()))?;
        let records: Vec<CalendarRecord> = serde_json::from_str(&content)?;

        // Unparseable records are kept so the caller can report them
        let records = records
            .into_iter()
            .filter(|record| record.matches_category(category))
            .filter(|record| {
                record
                    .starts_at
                    .as_deref()
                    .and_then(|raw| parse_event_instant(raw.trim(), self.timezone))
                    .map(|at| at >= from && at <= to)
                    .unwrap_or(true)
            })
            .collect::<Vec<_>>();

        debug!(record_count = records.len(), "Loaded calendar records from file");
        Ok(records)
    }
}
