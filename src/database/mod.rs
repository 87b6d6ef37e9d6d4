//! Database module
//!
//! This module handles database connections and operations

pub mod connection;
pub mod repositories;
pub mod service;
pub mod store;
pub mod memory;

// Re-export commonly used database components
pub use connection::{DatabasePool, create_pool, run_migrations, health_check};
pub use repositories::{UserRepository, EventRepository, RegistrationRepository, WatermarkRepository};
pub use service::DatabaseService;
pub use store::{Attendance, Store, NO_SHOW_SWEEP};
pub use memory::MemoryStore;
