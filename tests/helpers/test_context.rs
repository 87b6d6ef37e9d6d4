//! Test context for unified test setup
//!
//! Wires the services over an in-memory store, a pinned clock and recording
//! transports so tests can drive time and inspect every dispatch.

use std::sync::{Arc, Once};

use chrono::{DateTime, Duration, Utc};
use SchoolEvents::{
    config::{SchedulerConfig, Settings},
    database::{MemoryStore, Store},
    models::{Event, Registration, User, UserRole},
    scheduler::{self, SweepReport},
    services::{Dispatcher, ServiceFactory},
    utils::{Clock, FixedClock},
};

use super::notification_mock::{RecordingBroadcaster, RecordingNotifier};
use super::test_data::*;

static INIT: Once = Once::new();

/// Install a test subscriber once per binary
pub fn init_tracing() {
    INIT.call_once(|| {
        let _ = tracing_subscriber::fmt().with_test_writer().try_init();
    });
}

pub struct TestContext {
    pub store: Arc<MemoryStore>,
    pub clock: FixedClock,
    pub notifier: RecordingNotifier,
    pub broadcaster: RecordingBroadcaster,
    pub dispatcher: Dispatcher,
    pub services: ServiceFactory,
    pub settings: Settings,
    pub staff: User,
}

impl TestContext {
    pub async fn new() -> Self {
        Self::with_settings(Settings::default()).await
    }

    pub async fn with_settings(settings: Settings) -> Self {
        init_tracing();

        let store = Arc::new(MemoryStore::new());
        let clock = FixedClock::new(base_time());
        let notifier = RecordingNotifier::new();
        let broadcaster = RecordingBroadcaster::new();
        let dispatcher = Dispatcher::new(Arc::new(notifier.clone()), Arc::new(broadcaster.clone()));

        let services = ServiceFactory::new(
            &settings,
            store.clone() as Arc<dyn Store>,
            dispatcher.clone(),
            Arc::new(clock.clone()) as Arc<dyn Clock>,
        );

        let staff = store
            .create_user(user_request("Ms Teacher", UserRole::Teacher))
            .await
            .expect("Failed to create staff user");

        Self {
            store,
            clock,
            notifier,
            broadcaster,
            dispatcher,
            services,
            settings,
            staff,
        }
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    pub fn scheduler_config(&self) -> SchedulerConfig {
        self.settings.scheduler.clone()
    }

    pub async fn user(&self, name: &str, role: UserRole) -> User {
        self.store
            .create_user(user_request(name, role))
            .await
            .expect("Failed to create user")
    }

    pub async fn student(&self, name: &str) -> User {
        self.user(name, UserRole::Student).await
    }

    /// Create an event through the service, organized by the staff user
    pub async fn event(&self, start_in: Duration, capacity: i32, price_cents: i64) -> Event {
        let request = event_request("Science Fair", self.now() + start_in, capacity, price_cents);
        self.services
            .event_service
            .create(request, requester(&self.staff))
            .await
            .expect("Failed to create event")
    }

    pub async fn register(&self, event: &Event, user: &User) -> Registration {
        self.services
            .registration_service
            .register(event.id, user.id, None)
            .await
            .expect("Failed to register")
    }

    pub async fn reload_event(&self, event_id: i64) -> Event {
        self.store
            .find_event(event_id)
            .await
            .expect("Store failed")
            .expect("Event vanished")
    }

    pub async fn reload_registration(&self, registration_id: i64) -> Registration {
        self.store
            .find_registration(registration_id)
            .await
            .expect("Store failed")
            .expect("Registration vanished")
    }

    pub async fn status_sweep(&self) -> SweepReport {
        scheduler::run_status_sweep(self.store.as_ref(), &self.dispatcher, self.now())
            .await
            .expect("Status sweep failed")
    }

    pub async fn reminder_sweep(&self) -> SweepReport {
        scheduler::run_reminder_sweep(self.store.as_ref(), &self.dispatcher, self.now(), &self.scheduler_config())
            .await
            .expect("Reminder sweep failed")
    }

    pub async fn no_show_sweep(&self) -> SweepReport {
        scheduler::run_no_show_sweep(self.store.as_ref(), self.now(), &self.scheduler_config())
            .await
            .expect("No-show sweep failed")
    }

    /// Wait for fire-and-forget notifications and broadcasts
    pub async fn settle(&self) {
        self.dispatcher.settle().await;
    }
}
