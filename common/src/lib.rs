// Trigger-window evaluation for calendar events: when to send the attendance
// poll and the administrator notification, and exactly-once firing.

pub mod bootstrap;
pub mod calendar;
pub mod completeness;
pub mod config;
pub mod delivery;
pub mod eligibility;
pub mod errors;
pub mod fired;
pub mod message;
pub mod models;
pub mod retry;
pub mod schedule;
pub mod scheduler;
pub mod telemetry;
