//! Application settings management
//!
//! This module defines the configuration structure and provides methods
//! for loading settings from TOML files and environment variables.

use chrono::{FixedOffset, Offset, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Main application configuration structure
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Settings {
    pub database: DatabaseConfig,
    pub redis: RedisConfig,
    pub scheduler: SchedulerConfig,
    pub tickets: TicketsConfig,
    pub logging: LoggingConfig,
}

/// Database configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub min_connections: u32,
    pub acquire_timeout_seconds: u64,
}

/// Redis configuration for realtime broadcasts
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RedisConfig {
    pub enabled: bool,
    pub url: String,
    pub channel_prefix: String,
}

/// Scheduled sweep configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SchedulerConfig {
    pub enabled: bool,
    pub status_interval_seconds: u64,
    pub no_show_interval_seconds: u64,
    /// How far before its watermark each no-show sweep looks again
    pub no_show_lookback_seconds: u64,
    /// Local wall-clock hour at which reminders go out
    pub reminder_hour: u32,
    /// Offset of the school's local time from UTC, in minutes
    pub utc_offset_minutes: i32,
}

impl SchedulerConfig {
    pub fn status_interval(&self) -> Duration {
        Duration::from_secs(self.status_interval_seconds)
    }

    pub fn no_show_interval(&self) -> Duration {
        Duration::from_secs(self.no_show_interval_seconds)
    }

    pub fn no_show_lookback(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.no_show_lookback_seconds as i64)
    }

    pub fn local_offset(&self) -> FixedOffset {
        FixedOffset::east_opt(self.utc_offset_minutes * 60)
            .unwrap_or_else(|| Utc.fix())
    }
}

/// Ticket identity configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TicketsConfig {
    pub prefix: String,
    pub suffix_length: usize,
    /// Attempts at generating a non-colliding ticket before giving up
    pub max_generation_attempts: u32,
}

impl Default for TicketsConfig {
    fn default() -> Self {
        Self {
            prefix: "EVT".to_string(),
            suffix_length: 5,
            max_generation_attempts: 5,
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LoggingConfig {
    pub level: String,
    pub directory: String,
    pub file_prefix: String,
}

impl Settings {
    /// Load settings from configuration file and environment variables
    pub fn new() -> Result<Self, config::ConfigError> {
        Self::from_file("config")
    }

    /// Load settings layered over the defaults from `path` (optional) and the environment
    pub fn from_file(path: &str) -> Result<Self, config::ConfigError> {
        let defaults = config::Config::try_from(&Settings::default())?;

        let settings = config::Config::builder()
            .add_source(defaults)
            .add_source(config::File::with_name(path).required(false))
            .add_source(config::Environment::with_prefix("SCHOOL_EVENTS").separator("__"))
            .build()?;

        settings.try_deserialize()
    }

    /// Validate configuration settings
    pub fn validate(&self) -> Result<(), crate::utils::errors::SchoolEventsError> {
        super::validation::validate_settings(self)
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            database: DatabaseConfig {
                url: "postgresql://localhost/school_events".to_string(),
                max_connections: 10,
                min_connections: 1,
                acquire_timeout_seconds: 30,
            },
            redis: RedisConfig {
                enabled: false,
                url: "redis://localhost:6379".to_string(),
                channel_prefix: "school_events:".to_string(),
            },
            scheduler: SchedulerConfig {
                enabled: true,
                status_interval_seconds: 3600,
                no_show_interval_seconds: 3600,
                no_show_lookback_seconds: 3600,
                reminder_hour: 9,
                utc_offset_minutes: 0,
            },
            tickets: TicketsConfig::default(),
            logging: LoggingConfig {
                level: "info".to_string(),
                directory: "logs".to_string(),
                file_prefix: "school_events.log".to_string(),
            },
        }
    }
}
