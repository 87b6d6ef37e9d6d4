//! Logging configuration and setup
//!
//! This module provides logging initialization and structured logging utilities
//! for the SchoolEvents application.

use tracing::{info, warn, error, debug};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use crate::config::LoggingConfig;
use crate::utils::errors::{SchoolEventsError, Result};

/// Initialize logging based on configuration.
///
/// The returned guard flushes the file writer on drop and must be held for the
/// lifetime of the process.
pub fn init_logging(config: &LoggingConfig) -> Result<WorkerGuard> {
    let file_appender = tracing_appender::rolling::daily(&config.directory, &config.file_prefix);
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(&config.level))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stdout))
        .with(tracing_subscriber::fmt::layer().with_ansi(false).with_writer(non_blocking))
        .try_init()
        .map_err(|e| SchoolEventsError::Config(format!("Failed to initialize logging: {}", e)))?;

    info!("Logging initialized with level: {}", config.level);
    Ok(guard)
}

/// Log registration lifecycle actions with structured data
pub fn log_registration_action(registration_id: i64, event_id: i64, user_id: i64, action: &str) {
    info!(
        registration_id = registration_id,
        event_id = event_id,
        user_id = user_id,
        action = action,
        "Registration action performed"
    );
}

/// Log a rejected request; rejections are normal business outcomes
pub fn log_rejection(operation: &str, error: &SchoolEventsError) {
    debug!(
        operation = operation,
        error = %error,
        severity = %error.severity(),
        "Request rejected"
    );
}

/// Log check-in attempts
pub fn log_check_in(registration_id: i64, event_id: i64, staff_id: i64, method: &str) {
    info!(
        registration_id = registration_id,
        event_id = event_id,
        staff_id = staff_id,
        method = method,
        "Attendee checked in"
    );
}

/// Log the outcome of a scheduler sweep
pub fn log_sweep_result(sweep: &str, examined: usize, updated: usize, failed: usize) {
    if failed > 0 {
        warn!(
            sweep = sweep,
            examined = examined,
            updated = updated,
            failed = failed,
            "Sweep completed with failures"
        );
    } else {
        info!(
            sweep = sweep,
            examined = examined,
            updated = updated,
            "Sweep completed"
        );
    }
}

/// Log a per-entity failure inside a sweep
pub fn log_sweep_entity_failure(sweep: &str, entity: &str, entity_id: i64, error: &SchoolEventsError) {
    error!(
        sweep = sweep,
        entity = entity,
        entity_id = entity_id,
        error = %error,
        "Sweep failed to process entity, continuing"
    );
}

/// Log swallowed dispatch failures
pub fn log_dispatch_failure(channel: &str, target: &str, error: &SchoolEventsError) {
    warn!(
        channel = channel,
        target = target,
        error = %error,
        "Dispatch failed"
    );
}
