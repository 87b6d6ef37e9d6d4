//! Error handling for SchoolEvents
//!
//! This module defines the main error types used throughout the application
//! and provides a unified error handling strategy.

use chrono::{DateTime, Utc};
use thiserror::Error;

/// Main error type for SchoolEvents
#[derive(Error, Debug)]
pub enum SchoolEventsError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Database migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Event not found: {event_id}")]
    EventNotFound { event_id: i64 },

    #[error("Registration not found: {registration_id}")]
    RegistrationNotFound { registration_id: i64 },

    #[error("User not found: {user_id}")]
    UserNotFound { user_id: i64 },

    #[error("Invalid code")]
    InvalidTicket,

    #[error("Registration closed")]
    RegistrationClosed { event_id: i64 },

    #[error("Already registered")]
    AlreadyRegistered { event_id: i64, user_id: i64 },

    #[error("Event is at capacity")]
    CapacityExceeded { event_id: i64, capacity: i32 },

    #[error("Registration already cancelled")]
    AlreadyCancelled { registration_id: i64 },

    #[error("Permission denied: {0}")]
    Forbidden(String),

    #[error("Ticket expired")]
    TicketExpired { event_end: DateTime<Utc> },

    #[error("Already checked in")]
    AlreadyCheckedIn { attended_at: Option<DateTime<Utc>> },

    #[error("Registration cancelled")]
    RegistrationCancelled { cancelled_at: Option<DateTime<Utc>> },

    #[error("Payment required")]
    PaymentRequired { amount_cents: i64 },

    #[error("Invalid state transition: {from} -> {to}")]
    InvalidStateTransition { from: String, to: String },

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Ticket identifier collision")]
    TicketCollision,

    #[error("Service unavailable: {0}")]
    ServiceUnavailable(String),
}

/// Result type alias for SchoolEvents operations
pub type Result<T> = std::result::Result<T, SchoolEventsError>;

/// Coarse error classes surfaced to the routing layer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    NotFound,
    Conflict,
    CapacityExceeded,
    Forbidden,
    InvalidState,
    InvalidInput,
    TransientStore,
    Internal,
}

impl SchoolEventsError {
    /// Check if the error is recoverable
    pub fn is_recoverable(&self) -> bool {
        match self {
            SchoolEventsError::Database(_) => true,
            SchoolEventsError::Redis(_) => true,
            SchoolEventsError::Io(_) => true,
            SchoolEventsError::ServiceUnavailable(_) => true,
            SchoolEventsError::TicketCollision => true,
            SchoolEventsError::Migration(_) => false,
            SchoolEventsError::Serialization(_) => false,
            SchoolEventsError::Config(_) => false,
            SchoolEventsError::EventNotFound { .. } => false,
            SchoolEventsError::RegistrationNotFound { .. } => false,
            SchoolEventsError::UserNotFound { .. } => false,
            SchoolEventsError::InvalidTicket => false,
            SchoolEventsError::RegistrationClosed { .. } => false,
            SchoolEventsError::AlreadyRegistered { .. } => false,
            SchoolEventsError::CapacityExceeded { .. } => false,
            SchoolEventsError::AlreadyCancelled { .. } => false,
            SchoolEventsError::Forbidden(_) => false,
            SchoolEventsError::TicketExpired { .. } => false,
            SchoolEventsError::AlreadyCheckedIn { .. } => false,
            SchoolEventsError::RegistrationCancelled { .. } => false,
            SchoolEventsError::PaymentRequired { .. } => false,
            SchoolEventsError::InvalidStateTransition { .. } => false,
            SchoolEventsError::InvalidInput(_) => false,
        }
    }

    /// Map the error onto the class the routing layer reports
    pub fn kind(&self) -> ErrorKind {
        match self {
            SchoolEventsError::EventNotFound { .. }
            | SchoolEventsError::RegistrationNotFound { .. }
            | SchoolEventsError::UserNotFound { .. }
            | SchoolEventsError::InvalidTicket => ErrorKind::NotFound,
            SchoolEventsError::AlreadyRegistered { .. }
            | SchoolEventsError::AlreadyCancelled { .. } => ErrorKind::Conflict,
            SchoolEventsError::CapacityExceeded { .. } => ErrorKind::CapacityExceeded,
            SchoolEventsError::Forbidden(_) => ErrorKind::Forbidden,
            SchoolEventsError::RegistrationClosed { .. }
            | SchoolEventsError::TicketExpired { .. }
            | SchoolEventsError::AlreadyCheckedIn { .. }
            | SchoolEventsError::RegistrationCancelled { .. }
            | SchoolEventsError::PaymentRequired { .. }
            | SchoolEventsError::InvalidStateTransition { .. } => ErrorKind::InvalidState,
            SchoolEventsError::InvalidInput(_) => ErrorKind::InvalidInput,
            SchoolEventsError::Database(_)
            | SchoolEventsError::Redis(_)
            | SchoolEventsError::Io(_)
            | SchoolEventsError::ServiceUnavailable(_)
            | SchoolEventsError::TicketCollision => ErrorKind::TransientStore,
            SchoolEventsError::Migration(_)
            | SchoolEventsError::Serialization(_)
            | SchoolEventsError::Config(_) => ErrorKind::Internal,
        }
    }

    /// Get error severity level
    pub fn severity(&self) -> ErrorSeverity {
        match self {
            SchoolEventsError::Database(_) => ErrorSeverity::Critical,
            SchoolEventsError::Migration(_) => ErrorSeverity::Critical,
            SchoolEventsError::Config(_) => ErrorSeverity::Critical,
            SchoolEventsError::Forbidden(_) => ErrorSeverity::Warning,
            SchoolEventsError::ServiceUnavailable(_) => ErrorSeverity::Warning,
            SchoolEventsError::InvalidInput(_) => ErrorSeverity::Info,
            _ if self.kind() == ErrorKind::InvalidState => ErrorSeverity::Info,
            _ if self.kind() == ErrorKind::Conflict => ErrorSeverity::Info,
            SchoolEventsError::CapacityExceeded { .. } => ErrorSeverity::Info,
            _ => ErrorSeverity::Error,
        }
    }
}

/// Error severity levels
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorSeverity {
    Info,
    Warning,
    Error,
    Critical,
}

impl std::fmt::Display for ErrorSeverity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ErrorSeverity::Info => write!(f, "INFO"),
            ErrorSeverity::Warning => write!(f, "WARN"),
            ErrorSeverity::Error => write!(f, "ERROR"),
            ErrorSeverity::Critical => write!(f, "CRITICAL"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rejections_are_not_recoverable() {
        let err = SchoolEventsError::CapacityExceeded { event_id: 1, capacity: 10 };
        assert!(!err.is_recoverable());
        assert_eq!(err.kind(), ErrorKind::CapacityExceeded);
        assert_eq!(err.severity(), ErrorSeverity::Info);
    }

    #[test]
    fn test_store_errors_are_transient() {
        let err = SchoolEventsError::ServiceUnavailable("store lock poisoned".to_string());
        assert!(err.is_recoverable());
        assert_eq!(err.kind(), ErrorKind::TransientStore);
    }

    #[test]
    fn test_rejection_messages() {
        assert_eq!(SchoolEventsError::InvalidTicket.to_string(), "Invalid code");
        assert_eq!(
            SchoolEventsError::RegistrationClosed { event_id: 3 }.to_string(),
            "Registration closed"
        );
        assert_eq!(
            SchoolEventsError::PaymentRequired { amount_cents: 500 }.to_string(),
            "Payment required"
        );
        assert_eq!(
            SchoolEventsError::AlreadyCheckedIn { attended_at: None }.kind(),
            ErrorKind::InvalidState
        );
        assert_eq!(
            SchoolEventsError::AlreadyRegistered { event_id: 1, user_id: 2 }.kind(),
            ErrorKind::Conflict
        );
    }
}
