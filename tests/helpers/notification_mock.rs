//! Recording transports for testing
//!
//! Stand-ins for the mail and realtime transports that keep every call so
//! tests can assert on what was dispatched. The notifier can be switched to
//! fail to simulate a broken transport.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::Value;
use SchoolEvents::{
    models::{Event, Ticket, User},
    services::{Broadcaster, Notification, NotificationType, Notifier},
    Result, SchoolEventsError,
};

#[derive(Debug, Clone, Default)]
pub struct RecordingNotifier {
    pub confirmations: Arc<Mutex<Vec<(i64, i64, String)>>>,
    pub reminders: Arc<Mutex<Vec<(i64, i64)>>>,
    pub notifications: Arc<Mutex<Vec<Notification>>>,
    fail: Arc<AtomicBool>,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_failing(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }

    pub fn reminder_count(&self) -> usize {
        self.reminders.lock().unwrap().len()
    }

    pub fn confirmation_count(&self) -> usize {
        self.confirmations.lock().unwrap().len()
    }

    pub fn notifications_of(&self, notification_type: NotificationType) -> Vec<Notification> {
        self.notifications
            .lock()
            .unwrap()
            .iter()
            .filter(|n| n.notification_type == notification_type)
            .cloned()
            .collect()
    }

    fn check(&self) -> Result<()> {
        if self.fail.load(Ordering::SeqCst) {
            Err(SchoolEventsError::ServiceUnavailable("notifier offline".to_string()))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn send_registration_confirmation(&self, user: &User, event: &Event, ticket: &Ticket) -> Result<()> {
        self.check()?;
        self.confirmations
            .lock()
            .unwrap()
            .push((user.id, event.id, ticket.ticket_number.clone()));
        Ok(())
    }

    async fn send_reminder(&self, user: &User, event: &Event) -> Result<()> {
        self.check()?;
        self.reminders.lock().unwrap().push((user.id, event.id));
        Ok(())
    }

    async fn create_notification(&self, notification: &Notification) -> Result<()> {
        self.check()?;
        self.notifications.lock().unwrap().push(notification.clone());
        Ok(())
    }
}

/// Broadcaster that keeps `(topic, payload)` pairs
#[derive(Debug, Clone, Default)]
pub struct RecordingBroadcaster {
    pub messages: Arc<Mutex<Vec<(String, Value)>>>,
}

impl RecordingBroadcaster {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on_topic(&self, topic: &str) -> Vec<Value> {
        self.messages
            .lock()
            .unwrap()
            .iter()
            .filter(|(t, _)| t == topic)
            .map(|(_, payload)| payload.clone())
            .collect()
    }
}

#[async_trait]
impl Broadcaster for RecordingBroadcaster {
    async fn emit(&self, topic: &str, payload: Value) -> Result<()> {
        self.messages.lock().unwrap().push((topic.to_string(), payload));
        Ok(())
    }
}
