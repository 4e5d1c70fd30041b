use chrono::{DateTime, Duration, NaiveTime, Utc};
use chrono_tz::Tz;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::str::FromStr;

// Helper functions for Tz serialization
pub(crate) fn serialize_tz<S>(tz: &Tz, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    serializer.serialize_str(&tz.to_string())
}

pub(crate) fn deserialize_tz<'de, D>(deserializer: D) -> Result<Tz, D::Error>
where
    D: Deserializer<'de>,
{
    let s = String::deserialize(deserializer)?;
    Tz::from_str(&s).map_err(serde::de::Error::custom)
}

// ============================================================================
// Event Models
// ============================================================================

/// EventDescriptor is the minimal view of a calendar event the trigger
/// engine works with: when it happens and whether it is fully described.
///
/// `occurs_at` cannot be changed after construction; window calculations
/// always derive new instants from it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EventDescriptor {
    occurs_at: DateTime<Utc>,
    has_theme: bool,
    has_explicit_time: bool,
}

impl EventDescriptor {
    /// Build a descriptor from the raw theme text, deriving both flags.
    ///
    /// `tz` is the organization's reference timezone; the explicit-time flag
    /// is evaluated against the local clock there, not against UTC.
    pub fn new(occurs_at: DateTime<Utc>, theme: Option<&str>, tz: Tz) -> Self {
        Self {
            occurs_at,
            has_theme: theme_present(theme),
            has_explicit_time: has_explicit_time(occurs_at, tz),
        }
    }

    /// Build a descriptor from precomputed flags
    pub fn from_flags(occurs_at: DateTime<Utc>, has_theme: bool, has_explicit_time: bool) -> Self {
        Self {
            occurs_at,
            has_theme,
            has_explicit_time,
        }
    }

    pub fn occurs_at(&self) -> DateTime<Utc> {
        self.occurs_at
    }

    pub fn has_theme(&self) -> bool {
        self.has_theme
    }

    pub fn has_explicit_time(&self) -> bool {
        self.has_explicit_time
    }
}

/// True when the theme is present and not blank
pub fn theme_present(theme: Option<&str>) -> bool {
    theme.map(|t| !t.trim().is_empty()).unwrap_or(false)
}

/// True when the local time of day in `tz` is anything other than exactly
/// midnight. Midnight is treated as a date-only placeholder, so an event
/// genuinely scheduled at 00:00 local is reported as lacking a time.
pub fn has_explicit_time(occurs_at: DateTime<Utc>, tz: Tz) -> bool {
    crate::schedule::local_clock(occurs_at, tz)
        .map(|local| local.time() != NaiveTime::MIN)
        .unwrap_or(true)
}

/// ActionKind identifies one of the two independent actions per event
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ActionKind {
    /// Group poll, one civil day before the event
    Poll,
    /// Administrator notification, three hours before the event
    Notification,
}

impl ActionKind {
    pub const ALL: [ActionKind; 2] = [ActionKind::Poll, ActionKind::Notification];

    pub fn as_str(&self) -> &'static str {
        match self {
            ActionKind::Poll => "poll",
            ActionKind::Notification => "notification",
        }
    }
}

impl std::fmt::Display for ActionKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ActionKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "poll" => Ok(ActionKind::Poll),
            "notification" => Ok(ActionKind::Notification),
            _ => Err(format!("Invalid action kind: {}", s)),
        }
    }
}

/// TargetInstant is the ideal firing instant of one action together with
/// the width of its eligibility window. Recomputed on every evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TargetInstant {
    pub kind: ActionKind,
    pub at: DateTime<Utc>,
    pub window: Duration,
}

/// DegradedReason names the information an event is missing
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum DegradedReason {
    None,
    MissingTheme,
    MissingTime,
    MissingBoth,
}
