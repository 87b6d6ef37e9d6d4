//! SchoolEvents
//!
//! Registration lifecycle, ticket check-in and scheduled reconciliation for
//! school events. The routing layer calls into [`ServiceFactory`]; the
//! [`SchedulerRunner`] keeps event status, reminders and no-shows in step with
//! the clock.

#![allow(non_snake_case)]

pub mod config;
pub mod database;
pub mod models;
pub mod scheduler;
pub mod services;
pub mod utils;

// Re-export commonly used types
pub use config::Settings;
pub use utils::errors::{SchoolEventsError, Result};

// Re-export main components for easy access
pub use database::{DatabaseService, MemoryStore, Store};
pub use scheduler::SchedulerRunner;
pub use services::ServiceFactory;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Library name
pub const NAME: &str = env!("CARGO_PKG_NAME");

/// Get library information
pub fn info() -> String {
    format!("{} v{}", NAME, VERSION)
}
