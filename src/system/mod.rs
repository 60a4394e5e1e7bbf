//! Process-level concerns: logging setup, service wiring and the scheduled job loop.

pub mod jobs;
pub mod logging;
pub mod startup;

pub use jobs::{JobRunReport, PayoutSchedule, ScheduledJobs, run_scheduled_jobs};
pub use logging::init_logging;
pub use startup::{StartupContext, build_services, prepare_startup};
