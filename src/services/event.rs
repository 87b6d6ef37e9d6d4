//! Event service implementation
//!
//! Event creation, updates, cancellation and deletion. Status is derived from
//! the event window on every write; cancellation is manual and sticky.

use std::sync::Arc;
use chrono::{DateTime, Utc};
use serde_json::json;
use tracing::{debug, info, warn};

use crate::database::{Store, NO_SHOW_SWEEP};
use crate::models::{
    derive_status, CreateEventRequest, Event, EventStatus, RegistrationStats, Requester, UpdateEventRequest,
};
use crate::services::notification::{Dispatcher, Notification, NotificationType};
use crate::utils::clock::Clock;
use crate::utils::errors::{SchoolEventsError, Result};
use crate::utils::logging::log_rejection;

/// Topic for catalogue-wide event changes
pub const EVENTS_TOPIC: &str = "events";

#[derive(Clone)]
pub struct EventService {
    store: Arc<dyn Store>,
    dispatcher: Dispatcher,
    clock: Arc<dyn Clock>,
}

impl EventService {
    pub fn new(store: Arc<dyn Store>, dispatcher: Dispatcher, clock: Arc<dyn Clock>) -> Self {
        Self { store, dispatcher, clock }
    }

    /// Create an event organized by the requester
    pub async fn create(&self, mut request: CreateEventRequest, requester: Requester) -> Result<Event> {
        debug!(requester_id = requester.user_id, title = %request.title, "Creating event");

        if !requester.role.is_staff() {
            let err = SchoolEventsError::Forbidden("Only teachers and admins can create events".to_string());
            log_rejection("create_event", &err);
            return Err(err);
        }

        if let Err(e) = request.validate() {
            log_rejection("create_event", &e);
            return Err(e);
        }

        request.organizer_id.get_or_insert(requester.user_id);
        let event = self.store.create_event(request, self.clock.now()).await?;

        info!(event_id = event.id, status = %event.status, "Event created");
        self.dispatcher.broadcast(EVENTS_TOPIC.to_string(), json!({ "type": "event:created", "event_id": event.id }));
        Ok(event)
    }

    pub async fn get(&self, event_id: i64) -> Result<Event> {
        self.store
            .find_event(event_id)
            .await?
            .ok_or(SchoolEventsError::EventNotFound { event_id })
    }

    pub async fn list(&self, limit: i64, offset: i64) -> Result<Vec<Event>> {
        self.store.list_events(limit, offset).await
    }

    /// Update an event; the organizer or an admin only
    pub async fn update(&self, event_id: i64, request: UpdateEventRequest, requester: Requester) -> Result<Event> {
        debug!(event_id = event_id, requester_id = requester.user_id, "Updating event");

        let result = self.try_update(event_id, request, requester).await;
        if let Err(e) = &result {
            log_rejection("update_event", e);
        }
        result
    }

    async fn try_update(&self, event_id: i64, request: UpdateEventRequest, requester: Requester) -> Result<Event> {
        let current = self.get(event_id).await?;
        ensure_organizer(&current, requester)?;

        let now = self.clock.now();
        let changed = request.apply(&current, now)?;
        let updated = self.store.update_event_details(&changed).await?;

        info!(event_id = updated.id, status = %updated.status, "Event updated");
        self.settle_no_shows_behind_watermark(&updated, now).await?;
        self.dispatcher.broadcast(EVENTS_TOPIC.to_string(), json!({ "type": "event:updated", "event_id": updated.id }));

        let logistics_changed = current.start_date != updated.start_date
            || current.end_date != updated.end_date
            || current.location != updated.location;
        if logistics_changed {
            self.notify_registrants(&updated, NotificationType::EventUpdate).await;
        }

        Ok(updated)
    }

    /// Cancel an event and tell every active registrant
    pub async fn cancel(&self, event_id: i64, requester: Requester) -> Result<Event> {
        debug!(event_id = event_id, requester_id = requester.user_id, "Cancelling event");

        let result = self.try_cancel(event_id, requester).await;
        if let Err(e) = &result {
            log_rejection("cancel_event", e);
        }
        result
    }

    async fn try_cancel(&self, event_id: i64, requester: Requester) -> Result<Event> {
        let current = self.get(event_id).await?;
        ensure_organizer(&current, requester)?;

        let cancelled = self
            .store
            .cancel_event(event_id, self.clock.now())
            .await?
            .ok_or_else(|| SchoolEventsError::InvalidStateTransition {
                from: current.status.to_string(),
                to: "cancelled".to_string(),
            })?;

        info!(event_id = cancelled.id, "Event cancelled");
        self.dispatcher.broadcast(EVENTS_TOPIC.to_string(), json!({ "type": "event:cancelled", "event_id": cancelled.id }));
        self.notify_registrants(&cancelled, NotificationType::EventCancelled).await;
        Ok(cancelled)
    }

    /// Delete an event together with its registrations
    pub async fn delete(&self, event_id: i64, requester: Requester) -> Result<()> {
        debug!(event_id = event_id, requester_id = requester.user_id, "Deleting event");

        let current = self.get(event_id).await?;
        if let Err(e) = ensure_organizer(&current, requester) {
            log_rejection("delete_event", &e);
            return Err(e);
        }

        if !self.store.delete_event(event_id).await? {
            return Err(SchoolEventsError::EventNotFound { event_id });
        }

        info!(event_id = event_id, "Event deleted");
        self.dispatcher.broadcast(EVENTS_TOPIC.to_string(), json!({ "type": "event:deleted", "event_id": event_id }));
        Ok(())
    }

    /// Per-status registration counts, for the organizer or an admin
    pub async fn stats(&self, event_id: i64, requester: Requester) -> Result<RegistrationStats> {
        let event = self.get(event_id).await?;
        ensure_organizer(&event, requester)?;
        self.store.registration_stats(event_id).await
    }

    /// An end date moved behind the no-show watermark falls outside every future
    /// sweep window, so its registrants are settled here instead
    async fn settle_no_shows_behind_watermark(&self, event: &Event, now: DateTime<Utc>) -> Result<()> {
        if derive_status(now, event) != EventStatus::Completed {
            return Ok(());
        }
        let Some(watermark) = self.store.load_watermark(NO_SHOW_SWEEP).await? else {
            return Ok(());
        };
        if event.end_date >= watermark {
            return Ok(());
        }

        let moved = self.store.mark_no_shows(event.id, now).await?;
        if moved > 0 {
            info!(event_id = event.id, no_shows = moved, "Registrations marked no-show after end date moved");
        }
        Ok(())
    }

    async fn notify_registrants(&self, event: &Event, notification_type: NotificationType) {
        let registrations = match self.store.list_event_registrations(event.id).await {
            Ok(registrations) => registrations,
            Err(e) => {
                warn!(event_id = event.id, error = %e, "Failed to load registrants for notification");
                return;
            }
        };

        let mut notified = 0;
        for registration in registrations.iter().filter(|r| r.is_active()) {
            self.dispatcher
                .notify(Notification::from_template(registration.user_id, notification_type, event));
            notified += 1;
        }
        debug!(event_id = event.id, notified = notified, notification_type = notification_type.as_str(), "Registrants notified");
    }
}

fn ensure_organizer(event: &Event, requester: Requester) -> Result<()> {
    let is_organizer = event.organizer_id == Some(requester.user_id);
    if is_organizer || requester.role.is_admin() {
        Ok(())
    } else {
        Err(SchoolEventsError::Forbidden("Not authorized to manage this event".to_string()))
    }
}
