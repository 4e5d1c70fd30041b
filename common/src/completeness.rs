// Completeness classification for message phrasing.
// Never consulted for the send decision; see `eligibility`.

use crate::models::{DegradedReason, EventDescriptor};

/// An event is complete when it carries both a theme and an explicit time
pub fn is_complete(event: &EventDescriptor) -> bool {
    event.has_theme() && event.has_explicit_time()
}

/// Which piece of information is missing, if any
pub fn degraded_reason(event: &EventDescriptor) -> DegradedReason {
    match (event.has_theme(), event.has_explicit_time()) {
        (true, true) => DegradedReason::None,
        (false, true) => DegradedReason::MissingTheme,
        (true, false) => DegradedReason::MissingTime,
        (false, false) => DegradedReason::MissingBoth,
    }
}
