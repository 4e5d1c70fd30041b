// Firing window evaluation
//
// Decides whether a given "now" falls inside the inclusive window
// [target, target + width] of an action. Callers always pass `now`; nothing
// here reads a clock.

use crate::models::{ActionKind, TargetInstant};
use crate::schedule::{notification_target_instant, poll_target_instant, target_instant};
use crate::schedule::{notification_window, poll_window};
use chrono::{DateTime, Duration, Utc};
use chrono_tz::Tz;

impl TargetInstant {
    /// Last instant at which the action is still due, `None` past the
    /// representable range
    pub fn window_end(&self) -> Option<DateTime<Utc>> {
        self.at.checked_add_signed(self.window)
    }

    /// Whether `now` lies inside the inclusive firing window
    pub fn contains(&self, now: DateTime<Utc>) -> bool {
        within(self.at, self.window, now)
    }
}

/// True iff `poll_target <= now <= poll_target + 2min`
pub fn is_within_poll_window(occurs_at: DateTime<Utc>, now: DateTime<Utc>, tz: Tz) -> bool {
    within(poll_target_instant(occurs_at, tz), poll_window(), now)
}

/// True iff `notification_target <= now <= notification_target + 10min`
pub fn is_within_notification_window(occurs_at: DateTime<Utc>, now: DateTime<Utc>) -> bool {
    within(notification_target_instant(occurs_at), notification_window(), now)
}

/// Dispatch on the action kind
pub fn is_within_window(
    kind: ActionKind,
    occurs_at: DateTime<Utc>,
    now: DateTime<Utc>,
    tz: Tz,
) -> bool {
    target_instant(kind, occurs_at, tz).contains(now)
}

fn within(target: DateTime<Utc>, width: Duration, now: DateTime<Utc>) -> bool {
    if now < target {
        return false;
    }
    // A window running past the end of time has no upper bound
    match target.checked_add_signed(width) {
        Some(end) => now <= end,
        None => true,
    }
}
