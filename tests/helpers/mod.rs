//! Test helpers module
//!
//! Shared fixtures and context setup for the SchoolEvents integration tests.

#![allow(dead_code)]

pub mod database_helper;
pub mod notification_mock;
pub mod test_context;
pub mod test_data;

pub use database_helper::*;
pub use notification_mock::*;
pub use test_context::*;
pub use test_data::*;
