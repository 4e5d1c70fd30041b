// Message rendering for both actions.
// Wording follows the completeness classification; dates and times are shown
// in the reference timezone.

use crate::calendar::CalendarEvent;
use crate::completeness::degraded_reason;
use crate::delivery::Payload;
use crate::models::{ActionKind, DegradedReason};
use chrono_tz::Tz;

/// Telegram caps poll questions at 300 characters
pub const MAX_POLL_QUESTION_CHARS: usize = 300;

pub const POLL_OPTIONS: [&str; 3] = ["Yes", "No", "Maybe"];

/// Render the payload of `kind` for `event`
pub fn render(kind: ActionKind, event: &CalendarEvent, tz: Tz) -> Payload {
    let reason = degraded_reason(&event.descriptor(tz));
    let local = event.occurs_at.with_timezone(&tz);
    let title = match event.title.trim() {
        "" => "Event",
        t => t,
    };
    let date = local.format("%A, %d %B %Y").to_string();
    let time = local.format("%H:%M").to_string();
    let theme = event.theme.as_deref().map(str::trim).unwrap_or_default();

    match kind {
        ActionKind::Notification => Payload::Text {
            text: notification_text(reason, title, &date, &time, theme),
        },
        ActionKind::Poll => Payload::Poll {
            question: truncate_chars(
                &poll_question(reason, title, &date, &time, theme),
                MAX_POLL_QUESTION_CHARS,
            ),
            options: POLL_OPTIONS.iter().map(|o| o.to_string()).collect(),
        },
    }
}

fn notification_text(
    reason: DegradedReason,
    title: &str,
    date: &str,
    time: &str,
    theme: &str,
) -> String {
    match reason {
        DegradedReason::None => format!(
            "Reminder: {} starts at {} on {}.\nTheme: {}",
            title, time, date, theme
        ),
        DegradedReason::MissingTheme => format!(
            "Reminder: {} starts at {} on {}.\nWarning: no theme has been set for this event.",
            title, time, date
        ),
        DegradedReason::MissingTime => format!(
            "Reminder: {} on {}.\nTheme: {}\nWarning: the calendar entry has no start time.",
            title, date, theme
        ),
        DegradedReason::MissingBoth => format!(
            "Reminder: {} on {}.\n\
             Warning: the calendar entry has neither a theme nor a start time.",
            title, date
        ),
    }
}

fn poll_question(
    reason: DegradedReason,
    title: &str,
    date: &str,
    time: &str,
    theme: &str,
) -> String {
    match reason {
        DegradedReason::None => format!(
            "{} on {} at {} ({}). Will you attend?",
            title, date, time, theme
        ),
        DegradedReason::MissingTheme => {
            format!("{} on {} at {}. Will you attend?", title, date, time)
        }
        DegradedReason::MissingTime => format!(
            "{} on {} ({}), time to be announced. Will you attend?",
            title, date, theme
        ),
        DegradedReason::MissingBoth => {
            format!("{} on {}, time to be announced. Will you attend?", title, date)
        }
    }
}

fn truncate_chars(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        return s.to_string();
    }
    let mut out: String = s.chars().take(max.saturating_sub(1)).collect();
    out.push('…');
    out
}
