//! Engine wiring: the cycle scheduler and its report type.

pub mod scheduler;

pub use scheduler::{CycleReport, RecheckScheduler, SchedulerConfig};
