//! Notification dispatch
//!
//! The core decides what must be sent and when; delivery belongs to the
//! [`Notifier`] and [`Broadcaster`] collaborators. [`Dispatcher`] runs each
//! send on its own tokio task and only logs failures; a broken transport never
//! fails or rolls back the operation that triggered it. Reminders are the one
//! awaited send.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::models::{Event, Ticket, User};
use crate::utils::errors::{SchoolEventsError, Result};
use crate::utils::helpers::format_timestamp;
use crate::utils::logging::log_dispatch_failure;

/// In-app notification categories
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationType {
    EventReminder,
    EventUpdate,
    RegistrationConfirmed,
    EventCancelled,
    System,
}

impl NotificationType {
    pub fn as_str(&self) -> &'static str {
        match self {
            NotificationType::EventReminder => "event_reminder",
            NotificationType::EventUpdate => "event_update",
            NotificationType::RegistrationConfirmed => "registration_confirmed",
            NotificationType::EventCancelled => "event_cancelled",
            NotificationType::System => "system",
        }
    }
}

/// In-app notification addressed to one user
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    pub user_id: i64,
    pub notification_type: NotificationType,
    pub title: String,
    pub message: String,
    pub related_event_id: Option<i64>,
}

impl Notification {
    /// Build a notification from one of the default templates
    pub fn from_template(user_id: i64, notification_type: NotificationType, event: &Event) -> Self {
        let (title, body) = default_template(notification_type);
        let mut parameters = HashMap::new();
        parameters.insert("event_title", event.title.clone());
        parameters.insert("event_location", event.location.clone());
        parameters.insert("event_date", format_timestamp(event.start_date));

        Self {
            user_id,
            notification_type,
            title: format_message(title, &parameters),
            message: format_message(body, &parameters),
            related_event_id: Some(event.id),
        }
    }
}

fn default_template(notification_type: NotificationType) -> (&'static str, &'static str) {
    match notification_type {
        NotificationType::EventReminder => (
            "Event Reminder",
            "{event_title} starts {event_date} at {event_location}. Don't forget about this event!",
        ),
        NotificationType::EventUpdate => (
            "Event Updated",
            "{event_title} has changed. It now takes place {event_date} at {event_location}.",
        ),
        NotificationType::RegistrationConfirmed => (
            "Registration Confirmed",
            "You are registered for {event_title} on {event_date} at {event_location}.",
        ),
        NotificationType::EventCancelled => (
            "Event Cancelled",
            "{event_title} scheduled for {event_date} has been cancelled.",
        ),
        NotificationType::System => ("System", "{event_title}"),
    }
}

/// Replace `{key}` placeholders in a template
pub fn format_message(template: &str, parameters: &HashMap<&str, String>) -> String {
    let mut formatted = template.to_string();
    for (key, value) in parameters {
        let placeholder = format!("{{{}}}", key);
        formatted = formatted.replace(&placeholder, value);
    }
    formatted
}

/// Email and in-app delivery
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send_registration_confirmation(&self, user: &User, event: &Event, ticket: &Ticket) -> Result<()>;

    async fn send_reminder(&self, user: &User, event: &Event) -> Result<()>;

    async fn create_notification(&self, notification: &Notification) -> Result<()>;
}

/// Best-effort pub/sub broadcast
#[async_trait]
pub trait Broadcaster: Send + Sync {
    async fn emit(&self, topic: &str, payload: Value) -> Result<()>;
}

/// Topic carrying one event's live registration count
pub fn event_topic(event_id: i64) -> String {
    format!("event:{}", event_id)
}

/// Topic carrying one user's notifications
pub fn user_topic(user_id: i64) -> String {
    format!("user:{}", user_id)
}

pub const ATTENDANCE_TOPIC: &str = "attendance:checked_in";

/// Notifier that only writes to the log, for deployments without a mail transport
#[derive(Debug, Clone, Default)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn send_registration_confirmation(&self, user: &User, event: &Event, ticket: &Ticket) -> Result<()> {
        info!(
            user_id = user.id,
            email = %user.email,
            event_id = event.id,
            ticket_number = %ticket.ticket_number,
            "Registration confirmation"
        );
        Ok(())
    }

    async fn send_reminder(&self, user: &User, event: &Event) -> Result<()> {
        info!(user_id = user.id, email = %user.email, event_id = event.id, "Event reminder");
        Ok(())
    }

    async fn create_notification(&self, notification: &Notification) -> Result<()> {
        info!(
            user_id = notification.user_id,
            notification_type = notification.notification_type.as_str(),
            title = %notification.title,
            "Notification created"
        );
        Ok(())
    }
}

#[derive(Debug, Clone, Default)]
pub struct NoopBroadcaster;

#[async_trait]
impl Broadcaster for NoopBroadcaster {
    async fn emit(&self, topic: &str, _payload: Value) -> Result<()> {
        debug!(topic = topic, "Broadcast dropped, no transport configured");
        Ok(())
    }
}

/// Fire-and-forget front for the notifier and broadcaster
#[derive(Clone)]
pub struct Dispatcher {
    notifier: Arc<dyn Notifier>,
    broadcaster: Arc<dyn Broadcaster>,
    in_flight: Arc<Mutex<Vec<JoinHandle<()>>>>,
}

impl Dispatcher {
    pub fn new(notifier: Arc<dyn Notifier>, broadcaster: Arc<dyn Broadcaster>) -> Self {
        Self {
            notifier,
            broadcaster,
            in_flight: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Dispatcher that logs notifications and drops broadcasts
    pub fn logging() -> Self {
        Self::new(Arc::new(LogNotifier), Arc::new(NoopBroadcaster))
    }

    pub fn confirm_registration(&self, user: User, event: Event, ticket: Ticket) {
        let notifier = self.notifier.clone();
        self.spawn(async move {
            if let Err(e) = notifier.send_registration_confirmation(&user, &event, &ticket).await {
                log_dispatch_failure("confirmation", &user.email, &e);
            }
        });
    }

    /// Store an in-app notification and push it to the user's topic
    pub fn notify(&self, notification: Notification) {
        let notifier = self.notifier.clone();
        let broadcaster = self.broadcaster.clone();
        self.spawn(async move {
            let topic = user_topic(notification.user_id);
            if let Err(e) = notifier.create_notification(&notification).await {
                log_dispatch_failure("notification", &topic, &e);
                return;
            }

            let payload = match serde_json::to_value(&notification) {
                Ok(payload) => json!({ "type": "notification", "notification": payload }),
                Err(e) => {
                    log_dispatch_failure("broadcast", &topic, &SchoolEventsError::from(e));
                    return;
                }
            };
            if let Err(e) = broadcaster.emit(&topic, payload).await {
                log_dispatch_failure("broadcast", &topic, &e);
            }
        });
    }

    pub fn broadcast(&self, topic: String, payload: Value) {
        let broadcaster = self.broadcaster.clone();
        self.spawn(async move {
            if let Err(e) = broadcaster.emit(&topic, payload).await {
                log_dispatch_failure("broadcast", &topic, &e);
            }
        });
    }

    /// Broadcast an event's live registration count
    pub fn broadcast_count(&self, event: &Event) {
        self.broadcast(
            event_topic(event.id),
            json!({
                "type": "registration:count",
                "event_id": event.id,
                "registered_count": event.registered_count,
                "available_slots": event.available_slots(),
            }),
        );
    }

    /// Send a reminder and wait for the transport to acknowledge it.
    ///
    /// Unlike the other sends this one is awaited: the reminder flag may only be
    /// set once delivery was accepted.
    pub async fn send_reminder(&self, user: &User, event: &Event) -> Result<()> {
        self.notifier.send_reminder(user, event).await
    }

    /// Wait for every dispatch spawned so far
    pub async fn settle(&self) {
        let handles = {
            let mut in_flight = self.in_flight.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
            std::mem::take(&mut *in_flight)
        };
        futures::future::join_all(handles).await;
    }

    fn spawn<F>(&self, task: F)
    where
        F: std::future::Future<Output = ()> + Send + 'static,
    {
        let handle = tokio::spawn(task);
        let mut in_flight = self.in_flight.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        in_flight.retain(|h| !h.is_finished());
        in_flight.push(handle);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{EventCategory, EventStatus};
    use chrono::Utc;

    fn event() -> Event {
        let now = Utc::now();
        Event {
            id: 5,
            title: "Book Fair".to_string(),
            description: "Used books".to_string(),
            category: EventCategory::Exhibition,
            start_date: now,
            end_date: now,
            location: "Gym".to_string(),
            capacity: 50,
            registered_count: 3,
            attended_count: 0,
            price_cents: 0,
            status: EventStatus::Upcoming,
            registration_deadline: None,
            requires_registration: true,
            is_published: true,
            organizer_id: None,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn test_format_message() {
        let mut parameters = HashMap::new();
        parameters.insert("event_title", "Book Fair".to_string());
        let result = format_message("Welcome to {event_title}!", &parameters);
        assert_eq!(result, "Welcome to Book Fair!");
    }

    #[test]
    fn test_notification_from_template() {
        let notification = Notification::from_template(9, NotificationType::EventCancelled, &event());
        assert_eq!(notification.title, "Event Cancelled");
        assert!(notification.message.contains("Book Fair"));
        assert_eq!(notification.related_event_id, Some(5));
        assert_eq!(notification.notification_type.as_str(), "event_cancelled");
    }
}
