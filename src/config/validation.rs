//! Configuration validation module
//!
//! This module provides validation functions for application configuration
//! to ensure all required settings are properly configured.

use crate::utils::errors::{SchoolEventsError, Result};
use super::Settings;

/// Validate all configuration settings
pub fn validate_settings(settings: &Settings) -> Result<()> {
    validate_database_config(&settings.database)?;
    validate_redis_config(&settings.redis)?;
    validate_scheduler_config(&settings.scheduler)?;
    validate_tickets_config(&settings.tickets)?;
    validate_logging_config(&settings.logging)?;

    Ok(())
}

/// Validate database configuration
fn validate_database_config(config: &super::DatabaseConfig) -> Result<()> {
    if config.url.is_empty() {
        return Err(SchoolEventsError::Config(
            "Database URL is required".to_string()
        ));
    }

    if config.max_connections == 0 {
        return Err(SchoolEventsError::Config(
            "Max connections must be greater than 0".to_string()
        ));
    }

    if config.min_connections > config.max_connections {
        return Err(SchoolEventsError::Config(
            "Min connections cannot be greater than max connections".to_string()
        ));
    }

    Ok(())
}

/// Validate Redis configuration
fn validate_redis_config(config: &super::RedisConfig) -> Result<()> {
    if config.enabled && config.url.is_empty() {
        return Err(SchoolEventsError::Config(
            "Redis URL is required when realtime broadcasts are enabled".to_string()
        ));
    }

    Ok(())
}

/// Validate scheduler configuration
fn validate_scheduler_config(config: &super::SchedulerConfig) -> Result<()> {
    if config.status_interval_seconds == 0 || config.no_show_interval_seconds == 0 {
        return Err(SchoolEventsError::Config(
            "Sweep intervals must be greater than 0".to_string()
        ));
    }

    if config.reminder_hour > 23 {
        return Err(SchoolEventsError::Config(
            format!("Invalid reminder hour: {}", config.reminder_hour)
        ));
    }

    if config.utc_offset_minutes.abs() >= 24 * 60 {
        return Err(SchoolEventsError::Config(
            format!("Invalid UTC offset: {} minutes", config.utc_offset_minutes)
        ));
    }

    Ok(())
}

/// Validate ticket configuration
fn validate_tickets_config(config: &super::TicketsConfig) -> Result<()> {
    if config.prefix.is_empty() || !config.prefix.chars().all(|c| c.is_ascii_uppercase()) {
        return Err(SchoolEventsError::Config(
            "Ticket prefix must be non-empty uppercase ASCII".to_string()
        ));
    }

    if config.suffix_length < 4 {
        return Err(SchoolEventsError::Config(
            "Ticket suffix must be at least 4 characters".to_string()
        ));
    }

    if config.max_generation_attempts == 0 {
        return Err(SchoolEventsError::Config(
            "Ticket generation needs at least one attempt".to_string()
        ));
    }

    Ok(())
}

/// Validate logging configuration
fn validate_logging_config(config: &super::LoggingConfig) -> Result<()> {
    if config.level.is_empty() {
        return Err(SchoolEventsError::Config(
            "Log level is required".to_string()
        ));
    }

    let valid_levels = ["trace", "debug", "info", "warn", "error"];
    if !valid_levels.contains(&config.level.as_str()) {
        return Err(SchoolEventsError::Config(
            format!("Invalid log level: {}. Valid levels: {:?}", config.level, valid_levels)
        ));
    }

    Ok(())
}
