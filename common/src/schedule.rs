// Trigger target calculation
//
// Derives the instant each action should fire at from the event instant.
// The poll target is a civil-day subtraction in the reference timezone; the
// notification target is a plain duration subtraction.

use crate::models::{ActionKind, TargetInstant};
use chrono::{DateTime, Duration, LocalResult, NaiveDateTime, Offset, TimeZone, Utc};
use chrono_tz::Tz;

/// Minutes after its target instant a poll is still due
pub const POLL_WINDOW_MINUTES: i64 = 2;

/// Minutes after its target instant a notification is still due
pub const NOTIFICATION_WINDOW_MINUTES: i64 = 10;

/// Lead time of the administrator notification, in hours
pub const NOTIFICATION_LEAD_HOURS: i64 = 3;

pub fn poll_window() -> Duration {
    Duration::minutes(POLL_WINDOW_MINUTES)
}

pub fn notification_window() -> Duration {
    Duration::minutes(NOTIFICATION_WINDOW_MINUTES)
}

pub fn notification_lead() -> Duration {
    Duration::hours(NOTIFICATION_LEAD_HOURS)
}

/// Instant one civil day before `occurs_at`, at the same local clock time.
///
/// Across a DST transition the elapsed duration is 23h or 25h. When the
/// previous day's clock reading is ambiguous (fall back) the earlier of the
/// two instants is used. When it does not exist (spring forward gap) the
/// reading is resolved with the offset in effect before the gap, which lands
/// the same distance past the transition as the reading was into the gap.
///
/// A zone that skipped the whole previous date (Kwajalein, August 1993) has
/// no such reading at all; the target then falls back to 24 elapsed hours.
/// Instants whose local reading lies outside the representable range do the
/// same, saturating at the minimum instant.
pub fn poll_target_instant(occurs_at: DateTime<Utc>, tz: Tz) -> DateTime<Utc> {
    let one_day_earlier = || saturating_sub(occurs_at, Duration::days(1));

    let Some(local) = local_clock(occurs_at, tz) else {
        return one_day_earlier();
    };
    let Some(previous_day) = local.date().pred_opt() else {
        return one_day_earlier();
    };

    let target = resolve_local(previous_day.and_time(local.time()), tz);
    if target >= occurs_at {
        return one_day_earlier();
    }
    target
}

/// Local clock reading of `occurs_at` in `tz`, or None when it falls outside
/// the representable range
pub fn local_clock(occurs_at: DateTime<Utc>, tz: Tz) -> Option<NaiveDateTime> {
    let utc = occurs_at.naive_utc();
    let offset_seconds = tz.offset_from_utc_datetime(&utc).fix().local_minus_utc();
    utc.checked_add_signed(Duration::seconds(i64::from(offset_seconds)))
}

/// Map a local clock reading in `tz` to an instant. Ambiguous readings take
/// the earlier instant; readings inside a DST gap use the pre-gap offset.
pub fn resolve_local(naive: NaiveDateTime, tz: Tz) -> DateTime<Utc> {
    match tz.from_local_datetime(&naive) {
        LocalResult::Single(t) => t.with_timezone(&Utc),
        LocalResult::Ambiguous(earliest, _) => earliest.with_timezone(&Utc),
        LocalResult::None => resolve_in_gap(naive, tz),
    }
}

/// Instant exactly three hours before `occurs_at`
pub fn notification_target_instant(occurs_at: DateTime<Utc>) -> DateTime<Utc> {
    saturating_sub(occurs_at, notification_lead())
}

/// Target instant and window width for the given action
pub fn target_instant(kind: ActionKind, occurs_at: DateTime<Utc>, tz: Tz) -> TargetInstant {
    match kind {
        ActionKind::Poll => TargetInstant {
            kind,
            at: poll_target_instant(occurs_at, tz),
            window: poll_window(),
        },
        ActionKind::Notification => TargetInstant {
            kind,
            at: notification_target_instant(occurs_at),
            window: notification_window(),
        },
    }
}

/// Lead time between the earliest possible target and the event, used to
/// size the calendar lookahead. A civil day is at most 25 hours.
pub fn max_lead(kind: ActionKind) -> Duration {
    match kind {
        ActionKind::Poll => Duration::hours(25),
        ActionKind::Notification => notification_lead(),
    }
}

fn resolve_in_gap(naive: NaiveDateTime, tz: Tz) -> DateTime<Utc> {
    // Transitions are months apart, so a day earlier is safely before the gap
    let before_gap = naive.checked_sub_signed(Duration::days(1)).unwrap_or(naive);
    let offset_seconds = tz.offset_from_utc_datetime(&before_gap).fix().local_minus_utc();
    let utc_naive = naive
        .checked_sub_signed(Duration::seconds(i64::from(offset_seconds)))
        .unwrap_or(naive);
    Utc.from_utc_datetime(&utc_naive)
}

fn saturating_sub(at: DateTime<Utc>, delta: Duration) -> DateTime<Utc> {
    at.checked_sub_signed(delta).unwrap_or(DateTime::<Utc>::MIN_UTC)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Timelike;

    fn local(tz: Tz, y: i32, m: u32, d: u32, h: u32, min: u32) -> DateTime<Utc> {
        tz.with_ymd_and_hms(y, m, d, h, min, 0)
            .single()
            .expect("unambiguous local time")
            .with_timezone(&Utc)
    }

    #[test]
    fn test_poll_target_is_previous_day_same_clock_time() {
        let tz = chrono_tz::Europe::Berlin;
        let occurs_at = local(tz, 2024, 6, 16, 19, 0);
        let target = poll_target_instant(occurs_at, tz);
        assert_eq!(target, local(tz, 2024, 6, 15, 19, 0));
        assert_eq!(occurs_at - target, Duration::hours(24));
    }

    #[test]
    fn test_poll_target_across_spring_forward_is_23_hours() {
        // US DST starts 2024-03-10 at 02:00 local
        let tz = chrono_tz::America::New_York;
        let occurs_at = local(tz, 2024, 3, 10, 19, 0);
        let target = poll_target_instant(occurs_at, tz);
        assert_eq!(target, local(tz, 2024, 3, 9, 19, 0));
        assert_eq!(occurs_at - target, Duration::hours(23));
        assert_eq!(target.with_timezone(&tz).hour(), 19);
    }

    #[test]
    fn test_poll_target_across_fall_back_is_25_hours() {
        // EU DST ends 2024-10-27 at 03:00 local
        let tz = chrono_tz::Europe::Berlin;
        let occurs_at = local(tz, 2024, 10, 27, 10, 30);
        let target = poll_target_instant(occurs_at, tz);
        assert_eq!(target, local(tz, 2024, 10, 26, 10, 30));
        assert_eq!(occurs_at - target, Duration::hours(25));
    }

    #[test]
    fn test_poll_target_ambiguous_previous_day_picks_earliest() {
        // 2024-11-03 01:30 happens twice in New York; the event is a day later
        let tz = chrono_tz::America::New_York;
        let occurs_at = local(tz, 2024, 11, 4, 1, 30);
        let target = poll_target_instant(occurs_at, tz);
        let earliest = tz
            .with_ymd_and_hms(2024, 11, 3, 1, 30, 0)
            .earliest()
            .unwrap()
            .with_timezone(&Utc);
        assert_eq!(target, earliest);
    }

    #[test]
    fn test_poll_target_in_gap_shifts_past_transition() {
        // 2024-03-10 02:30 does not exist in New York
        let tz = chrono_tz::America::New_York;
        let occurs_at = local(tz, 2024, 3, 11, 2, 30);
        let target = poll_target_instant(occurs_at, tz);
        assert_eq!(target, local(tz, 2024, 3, 10, 3, 30));
    }

    #[test]
    fn test_poll_target_on_leap_day() {
        let tz = chrono_tz::Europe::Berlin;
        let occurs_at = local(tz, 2024, 3, 1, 9, 0);
        assert_eq!(poll_target_instant(occurs_at, tz), local(tz, 2024, 2, 29, 9, 0));
    }

    #[test]
    fn test_notification_target_is_three_hours_earlier() {
        let tz = chrono_tz::America::New_York;
        // Spans the spring-forward gap: elapsed time still counts, not clock time
        let occurs_at = local(tz, 2024, 3, 10, 4, 0);
        let target = notification_target_instant(occurs_at);
        assert_eq!(occurs_at - target, Duration::hours(3));
        assert_eq!(target.with_timezone(&tz).hour(), 0);
    }

    #[test]
    fn test_target_instant_carries_window() {
        let tz = chrono_tz::Europe::Berlin;
        let occurs_at = local(tz, 2024, 6, 16, 19, 0);
        let poll = target_instant(ActionKind::Poll, occurs_at, tz);
        assert_eq!(poll.window, poll_window());
        assert_eq!(poll.kind, ActionKind::Poll);
        let notification = target_instant(ActionKind::Notification, occurs_at, tz);
        assert_eq!(notification.window, notification_window());
        assert_eq!(notification.at, occurs_at - notification_lead());
    }

    #[test]
    fn test_poll_target_when_previous_date_was_skipped() {
        // Kwajalein moved across the date line: 1993-08-21 never happened
        let tz = chrono_tz::Pacific::Kwajalein;
        let occurs_at = local(tz, 1993, 8, 22, 10, 0);
        let target = poll_target_instant(occurs_at, tz);
        assert_eq!(occurs_at - target, Duration::hours(24));
    }

    #[test]
    fn test_poll_target_at_ends_of_time_does_not_panic() {
        let max = DateTime::<Utc>::MAX_UTC;
        let min = DateTime::<Utc>::MIN_UTC;
        for tz in [
            chrono_tz::Europe::Berlin,
            chrono_tz::America::New_York,
            chrono_tz::Pacific::Kiritimati,
            chrono_tz::UTC,
        ] {
            assert!(poll_target_instant(max, tz) < max);
            assert_eq!(poll_target_instant(min, tz), min);
        }
        assert_eq!(
            poll_target_instant(max, chrono_tz::Europe::Berlin),
            max - Duration::days(1)
        );
    }

    #[test]
    fn test_local_clock_out_of_range() {
        assert!(local_clock(DateTime::<Utc>::MAX_UTC, chrono_tz::Europe::Berlin).is_none());
        assert!(local_clock(DateTime::<Utc>::MIN_UTC, chrono_tz::America::New_York).is_none());
        let at = local(chrono_tz::Europe::Berlin, 2024, 6, 16, 19, 0);
        assert_eq!(
            local_clock(at, chrono_tz::Europe::Berlin).map(|l| l.hour()),
            Some(19)
        );
    }

    #[test]
    fn test_notification_target_saturates_at_minimum() {
        let min = DateTime::<Utc>::MIN_UTC;
        assert_eq!(notification_target_instant(min), min);
    }
}
