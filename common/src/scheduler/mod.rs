// Trigger loop driving the window evaluation on a periodic tick

pub mod engine;

pub use engine::{occurrence_id, Scheduler, SchedulerConfig, SchedulerEngine, TickReport};
