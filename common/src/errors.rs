// Error handling framework
// One enum per collaborator boundary; the window math itself never fails.

use thiserror::Error;

/// Event-level errors raised while turning calendar records into events
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EventError {
    #[error("Invalid event '{event_id}': {reason}")]
    InvalidEvent { event_id: String, reason: String },
}

/// Calendar source errors
#[derive(Error, Debug)]
pub enum CalendarError {
    #[error("Calendar request failed: {0}")]
    RequestFailed(String),

    #[error("Calendar responded with status {status}: {body}")]
    UnexpectedStatus { status: u16, body: String },

    #[error("Invalid calendar payload: {0}")]
    InvalidPayload(String),

    #[error("Calendar file error: {0}")]
    FileSystemError(String),
}

/// Fired-record store errors
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Redis error: {0}")]
    RedisError(String),

    #[error("Connection failed: {0}")]
    ConnectionFailed(String),
}

/// Delivery errors
#[derive(Error, Debug)]
pub enum DeliveryError {
    #[error("Delivery request failed: {0}")]
    RequestFailed(String),

    #[error("Delivery rejected by transport: {0}")]
    Rejected(String),

    #[error("Maximum retries ({0}) exceeded")]
    MaxRetriesExceeded(u32),

    #[error("Invalid delivery configuration: {0}")]
    InvalidConfiguration(String),
}

impl DeliveryError {
    /// Short label used for metrics
    pub fn reason(&self) -> &'static str {
        match self {
            DeliveryError::RequestFailed(_) => "request_failed",
            DeliveryError::Rejected(_) => "rejected",
            DeliveryError::MaxRetriesExceeded(_) => "max_retries",
            DeliveryError::InvalidConfiguration(_) => "configuration",
        }
    }
}

/// Errors that abort a whole tick. Store and delivery failures only affect
/// one action and are reported in the tick report instead.
#[derive(Error, Debug)]
pub enum SchedulerError {
    #[error("Failed to fetch calendar events: {0}")]
    Calendar(#[from] CalendarError),
}

impl From<redis::RedisError> for StoreError {
    fn from(err: redis::RedisError) -> Self {
        StoreError::RedisError(err.to_string())
    }
}

impl From<serde_json::Error> for CalendarError {
    fn from(err: serde_json::Error) -> Self {
        CalendarError::InvalidPayload(err.to_string())
    }
}

impl From<reqwest::Error> for CalendarError {
    fn from(err: reqwest::Error) -> Self {
        CalendarError::RequestFailed(err.to_string())
    }
}

impl From<reqwest::Error> for DeliveryError {
    fn from(err: reqwest::Error) -> Self {
        DeliveryError::RequestFailed(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_event_display() {
        let err = EventError::InvalidEvent {
            event_id: "evt-1".to_string(),
            reason: "missing start time".to_string(),
        };
        assert!(err.to_string().contains("evt-1"));
        assert!(err.to_string().contains("missing start time"));
    }

    #[test]
    fn test_unexpected_status_display() {
        let err = CalendarError::UnexpectedStatus {
            status: 503,
            body: "maintenance".to_string(),
        };
        assert!(err.to_string().contains("503"));
    }

    #[test]
    fn test_delivery_error_reason_labels() {
        assert_eq!(DeliveryError::MaxRetriesExceeded(3).reason(), "max_retries");
        assert_eq!(
            DeliveryError::Rejected("chat not found".to_string()).reason(),
            "rejected"
        );
    }

    #[test]
    fn test_scheduler_error_wraps_calendar_error() {
        let err: SchedulerError = CalendarError::FileSystemError("no such file".to_string()).into();
        assert!(matches!(err, SchedulerError::Calendar(_)));
        assert!(err.to_string().contains("no such file"));
    }
}
