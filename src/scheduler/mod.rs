//! Scheduler module
//!
//! Periodic reconciliation: event status, reminders and no-shows.

pub mod runner;
pub mod sweeps;

pub use runner::SchedulerRunner;
pub use sweeps::{run_no_show_sweep, run_reminder_sweep, run_status_sweep, run_sweep, Sweep, SweepReport};
