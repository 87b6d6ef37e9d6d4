//! Services module
//!
//! This module contains business logic services

pub mod check_in;
pub mod event;
pub mod notification;
pub mod redis;
pub mod registration;

// Re-export commonly used services
pub use check_in::{CheckInService, CheckInResult, TicketVerification};
pub use event::EventService;
pub use notification::{
    Broadcaster, Dispatcher, LogNotifier, NoopBroadcaster, Notification, NotificationType, Notifier,
};
pub use redis::RedisBroadcaster;
pub use registration::RegistrationService;

use std::sync::Arc;

use crate::config::settings::Settings;
use crate::database::Store;
use crate::utils::clock::Clock;

/// Service factory for creating and managing all services
#[derive(Clone)]
pub struct ServiceFactory {
    pub event_service: EventService,
    pub registration_service: RegistrationService,
    pub check_in_service: CheckInService,
    pub dispatcher: Dispatcher,
    store: Arc<dyn Store>,
    redis_broadcaster: Option<RedisBroadcaster>,
}

impl ServiceFactory {
    /// Create a new ServiceFactory with all services sharing one store, dispatcher and clock
    pub fn new(
        settings: &Settings,
        store: Arc<dyn Store>,
        dispatcher: Dispatcher,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            event_service: EventService::new(store.clone(), dispatcher.clone(), clock.clone()),
            registration_service: RegistrationService::new(
                store.clone(),
                dispatcher.clone(),
                clock.clone(),
                settings.tickets.clone(),
            ),
            check_in_service: CheckInService::new(store.clone(), dispatcher.clone(), clock),
            dispatcher,
            store,
            redis_broadcaster: None,
        }
    }

    /// Keep a handle on the Redis broadcaster for health checks
    pub fn with_redis(mut self, broadcaster: RedisBroadcaster) -> Self {
        self.redis_broadcaster = Some(broadcaster);
        self
    }

    /// Health check for all services
    pub async fn health_check(&self) -> ServiceHealthStatus {
        let database_healthy = match self.store.health_check().await {
            Ok(()) => true,
            Err(e) => {
                tracing::error!(error = %e, "Database health check failed");
                false
            }
        };

        let redis_healthy = match &self.redis_broadcaster {
            Some(broadcaster) => Some(broadcaster.health_check().await.unwrap_or(false)),
            None => None,
        };

        ServiceHealthStatus {
            database_healthy,
            redis_healthy,
            registration_service_ready: true,
            check_in_service_ready: true,
            event_service_ready: true,
        }
    }
}

/// Health status for all services
#[derive(Debug, Clone)]
pub struct ServiceHealthStatus {
    pub database_healthy: bool,
    /// `None` when realtime broadcasts are disabled
    pub redis_healthy: Option<bool>,
    pub registration_service_ready: bool,
    pub check_in_service_ready: bool,
    pub event_service_ready: bool,
}

impl ServiceHealthStatus {
    /// Check if all critical services are healthy; realtime is best-effort and never critical
    pub fn is_healthy(&self) -> bool {
        self.database_healthy
            && self.registration_service_ready
            && self.check_in_service_ready
            && self.event_service_ready
    }

    /// Get list of unhealthy services
    pub fn get_issues(&self) -> Vec<String> {
        let mut issues = Vec::new();

        if !self.database_healthy {
            issues.push("Database connection failed".to_string());
        }
        if self.redis_healthy == Some(false) {
            issues.push("Redis connection failed".to_string());
        }
        if !self.registration_service_ready {
            issues.push("Registration service not ready".to_string());
        }
        if !self.check_in_service_ready {
            issues.push("Check-in service not ready".to_string());
        }
        if !self.event_service_ready {
            issues.push("Event service not ready".to_string());
        }

        issues
    }
}
