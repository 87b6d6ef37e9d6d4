//! Event model

use serde::{Deserialize, Serialize};
use chrono::{DateTime, Utc};
use sqlx::FromRow;

use crate::utils::errors::{SchoolEventsError, Result};

pub const MAX_TITLE_LENGTH: usize = 100;
pub const MAX_DESCRIPTION_LENGTH: usize = 2000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "event_category", rename_all = "PascalCase")]
pub enum EventCategory {
    Sports,
    Academic,
    Cultural,
    Exhibition,
    Debate,
    Workshop,
    Social,
    Other,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "event_status", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum EventStatus {
    Upcoming,
    Ongoing,
    Completed,
    Cancelled,
}

impl EventStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventStatus::Upcoming => "upcoming",
            EventStatus::Ongoing => "ongoing",
            EventStatus::Completed => "completed",
            EventStatus::Cancelled => "cancelled",
        }
    }
}

impl std::fmt::Display for EventStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Event {
    pub id: i64,
    pub title: String,
    pub description: String,
    pub category: EventCategory,
    pub start_date: DateTime<Utc>,
    pub end_date: DateTime<Utc>,
    pub location: String,
    pub capacity: i32,
    pub registered_count: i32,
    pub attended_count: i32,
    pub price_cents: i64,
    pub status: EventStatus,
    pub registration_deadline: Option<DateTime<Utc>>,
    pub requires_registration: bool,
    pub is_published: bool,
    pub organizer_id: Option<i64>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Status an event should carry at `now`.
///
/// Cancellation is manual and sticky, so a cancelled event is returned unchanged.
pub fn derive_status(now: DateTime<Utc>, event: &Event) -> EventStatus {
    status_for_window(now, event.start_date, event.end_date, event.status)
}

fn status_for_window(
    now: DateTime<Utc>,
    start_date: DateTime<Utc>,
    end_date: DateTime<Utc>,
    current: EventStatus,
) -> EventStatus {
    if current == EventStatus::Cancelled {
        EventStatus::Cancelled
    } else if now < start_date {
        EventStatus::Upcoming
    } else if now <= end_date {
        EventStatus::Ongoing
    } else {
        EventStatus::Completed
    }
}

impl Event {
    pub fn available_slots(&self) -> i32 {
        (self.capacity - self.registered_count).max(0)
    }

    pub fn is_full(&self) -> bool {
        self.registered_count >= self.capacity
    }

    pub fn is_free(&self) -> bool {
        self.price_cents == 0
    }

    /// Whether new registrations are accepted at `now`
    pub fn is_registration_open(&self, now: DateTime<Utc>) -> bool {
        if !self.requires_registration || self.status == EventStatus::Cancelled || self.is_full() {
            return false;
        }

        match self.registration_deadline {
            Some(deadline) => now <= deadline,
            None => now < self.end_date,
        }
    }

    /// A ticket for this event can be redeemed up to and including its end
    pub fn accepts_check_in(&self, now: DateTime<Utc>) -> bool {
        now <= self.end_date
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateEventRequest {
    pub title: String,
    pub description: String,
    pub category: EventCategory,
    pub start_date: DateTime<Utc>,
    pub end_date: DateTime<Utc>,
    pub location: String,
    pub capacity: i32,
    pub price_cents: i64,
    pub registration_deadline: Option<DateTime<Utc>>,
    pub requires_registration: bool,
    pub is_published: bool,
    pub organizer_id: Option<i64>,
}

impl CreateEventRequest {
    pub fn validate(&self) -> Result<()> {
        validate_details(&self.title, &self.description, &self.location)?;
        validate_window(self.start_date, self.end_date)?;

        if self.capacity < 1 {
            return Err(SchoolEventsError::InvalidInput("Capacity must be at least 1".to_string()));
        }

        if self.price_cents < 0 {
            return Err(SchoolEventsError::InvalidInput("Price cannot be negative".to_string()));
        }

        Ok(())
    }

    /// Status the event is stored with when created at `now`
    pub fn initial_status(&self, now: DateTime<Utc>) -> EventStatus {
        status_for_window(now, self.start_date, self.end_date, EventStatus::Upcoming)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UpdateEventRequest {
    pub title: Option<String>,
    pub description: Option<String>,
    pub category: Option<EventCategory>,
    pub start_date: Option<DateTime<Utc>>,
    pub end_date: Option<DateTime<Utc>>,
    pub location: Option<String>,
    pub capacity: Option<i32>,
    pub price_cents: Option<i64>,
    pub registration_deadline: Option<DateTime<Utc>>,
    pub requires_registration: Option<bool>,
    pub is_published: Option<bool>,
}

impl UpdateEventRequest {
    /// Apply the changes to a copy of `event`, validate the result and re-derive its status.
    ///
    /// Counters are carried over untouched; the store never writes them from this path.
    pub fn apply(&self, event: &Event, now: DateTime<Utc>) -> Result<Event> {
        let mut updated = event.clone();

        if let Some(title) = &self.title {
            updated.title = title.clone();
        }
        if let Some(description) = &self.description {
            updated.description = description.clone();
        }
        if let Some(category) = self.category {
            updated.category = category;
        }
        if let Some(start_date) = self.start_date {
            updated.start_date = start_date;
        }
        if let Some(end_date) = self.end_date {
            updated.end_date = end_date;
        }
        if let Some(location) = &self.location {
            updated.location = location.clone();
        }
        if let Some(capacity) = self.capacity {
            updated.capacity = capacity;
        }
        if let Some(price_cents) = self.price_cents {
            updated.price_cents = price_cents;
        }
        if self.registration_deadline.is_some() {
            updated.registration_deadline = self.registration_deadline;
        }
        if let Some(requires_registration) = self.requires_registration {
            updated.requires_registration = requires_registration;
        }
        if let Some(is_published) = self.is_published {
            updated.is_published = is_published;
        }

        validate_details(&updated.title, &updated.description, &updated.location)?;
        validate_window(updated.start_date, updated.end_date)?;

        if updated.capacity < 1 {
            return Err(SchoolEventsError::InvalidInput("Capacity must be at least 1".to_string()));
        }
        if updated.capacity < updated.registered_count {
            return Err(SchoolEventsError::InvalidInput(format!(
                "Capacity cannot drop below the {} existing registrations",
                updated.registered_count
            )));
        }
        if updated.price_cents < 0 {
            return Err(SchoolEventsError::InvalidInput("Price cannot be negative".to_string()));
        }

        updated.status = derive_status(now, &updated);
        updated.updated_at = now;
        Ok(updated)
    }
}

fn validate_details(title: &str, description: &str, location: &str) -> Result<()> {
    if title.trim().is_empty() {
        return Err(SchoolEventsError::InvalidInput("Please provide an event title".to_string()));
    }
    if title.chars().count() > MAX_TITLE_LENGTH {
        return Err(SchoolEventsError::InvalidInput(format!(
            "Title cannot be more than {} characters",
            MAX_TITLE_LENGTH
        )));
    }
    if description.trim().is_empty() {
        return Err(SchoolEventsError::InvalidInput("Please provide an event description".to_string()));
    }
    if description.chars().count() > MAX_DESCRIPTION_LENGTH {
        return Err(SchoolEventsError::InvalidInput(format!(
            "Description cannot be more than {} characters",
            MAX_DESCRIPTION_LENGTH
        )));
    }
    if location.trim().is_empty() {
        return Err(SchoolEventsError::InvalidInput("Please provide a location".to_string()));
    }
    Ok(())
}

fn validate_window(start_date: DateTime<Utc>, end_date: DateTime<Utc>) -> Result<()> {
    if end_date < start_date {
        return Err(SchoolEventsError::InvalidInput("End date must be after start date".to_string()));
    }
    Ok(())
}

/// Per-status registration counts for one event
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistrationStats {
    pub total: i64,
    pub registered: i64,
    pub attended: i64,
    pub cancelled: i64,
    pub no_show: i64,
}
