//! Event repository implementation

use sqlx::PgPool;
use chrono::{DateTime, Utc};
use crate::models::event::{Event, EventStatus, CreateEventRequest, RegistrationStats};
use crate::utils::errors::SchoolEventsError;

#[derive(Debug, Clone)]
pub struct EventRepository {
    pool: PgPool,
}

impl EventRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Create a new event
    pub async fn create(&self, request: CreateEventRequest, now: DateTime<Utc>) -> Result<Event, SchoolEventsError> {
        let status = request.initial_status(now);
        let event = sqlx::query_as::<_, Event>(
            r#"
            INSERT INTO events (title, description, category, start_date, end_date, location, capacity,
                                price_cents, status, registration_deadline, requires_registration,
                                is_published, organizer_id, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $14)
            RETURNING *
            "#
        )
        .bind(request.title)
        .bind(request.description)
        .bind(request.category)
        .bind(request.start_date)
        .bind(request.end_date)
        .bind(request.location)
        .bind(request.capacity)
        .bind(request.price_cents)
        .bind(status)
        .bind(request.registration_deadline)
        .bind(request.requires_registration)
        .bind(request.is_published)
        .bind(request.organizer_id)
        .bind(now)
        .fetch_one(&self.pool)
        .await?;

        Ok(event)
    }

    /// Find event by ID
    pub async fn find_by_id(&self, id: i64) -> Result<Option<Event>, SchoolEventsError> {
        let event = sqlx::query_as::<_, Event>("SELECT * FROM events WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(event)
    }

    /// Update descriptive fields and status; counters stay untouched
    pub async fn update_details(&self, event: &Event) -> Result<Event, SchoolEventsError> {
        let updated = sqlx::query_as::<_, Event>(
            r#"
            UPDATE events
            SET title = $2,
                description = $3,
                category = $4,
                start_date = $5,
                end_date = $6,
                location = $7,
                capacity = $8,
                price_cents = $9,
                status = CASE WHEN status = 'cancelled' THEN status ELSE $10 END,
                registration_deadline = $11,
                requires_registration = $12,
                is_published = $13,
                updated_at = $14
            WHERE id = $1 AND registered_count <= $8
            RETURNING *
            "#
        )
        .bind(event.id)
        .bind(&event.title)
        .bind(&event.description)
        .bind(event.category)
        .bind(event.start_date)
        .bind(event.end_date)
        .bind(&event.location)
        .bind(event.capacity)
        .bind(event.price_cents)
        .bind(event.status)
        .bind(event.registration_deadline)
        .bind(event.requires_registration)
        .bind(event.is_published)
        .bind(event.updated_at)
        .fetch_optional(&self.pool)
        .await?;

        match updated {
            Some(event) => Ok(event),
            None if self.find_by_id(event.id).await?.is_none() => {
                Err(SchoolEventsError::EventNotFound { event_id: event.id })
            }
            None => Err(SchoolEventsError::InvalidInput(
                "Capacity cannot drop below the existing registrations".to_string(),
            )),
        }
    }

    /// Compare-and-set the status of a non-cancelled event
    pub async fn transition_status(&self, id: i64, expected: EventStatus, next: EventStatus) -> Result<bool, SchoolEventsError> {
        let result = sqlx::query(
            r#"
            UPDATE events
            SET status = $3, updated_at = NOW()
            WHERE id = $1 AND status = $2 AND status <> 'cancelled'
            "#
        )
        .bind(id)
        .bind(expected)
        .bind(next)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    /// Cancel event; `None` if it was already cancelled or does not exist
    pub async fn cancel(&self, id: i64, now: DateTime<Utc>) -> Result<Option<Event>, SchoolEventsError> {
        let event = sqlx::query_as::<_, Event>(
            r#"
            UPDATE events
            SET status = 'cancelled', updated_at = $2
            WHERE id = $1 AND status <> 'cancelled'
            RETURNING *
            "#
        )
        .bind(id)
        .bind(now)
        .fetch_optional(&self.pool)
        .await?;

        Ok(event)
    }

    /// Delete event; registrations go with it through ON DELETE CASCADE
    pub async fn delete(&self, id: i64) -> Result<bool, SchoolEventsError> {
        let result = sqlx::query("DELETE FROM events WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    /// List events with pagination
    pub async fn list(&self, limit: i64, offset: i64) -> Result<Vec<Event>, SchoolEventsError> {
        let events = sqlx::query_as::<_, Event>(
            "SELECT * FROM events ORDER BY start_date ASC LIMIT $1 OFFSET $2"
        )
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await?;

        Ok(events)
    }

    /// All events whose status may still change with time
    pub async fn list_non_cancelled(&self) -> Result<Vec<Event>, SchoolEventsError> {
        let events = sqlx::query_as::<_, Event>(
            "SELECT * FROM events WHERE status <> 'cancelled' ORDER BY start_date ASC"
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(events)
    }

    /// Non-cancelled events starting in `[from, to)`
    pub async fn list_starting_between(&self, from: DateTime<Utc>, to: DateTime<Utc>) -> Result<Vec<Event>, SchoolEventsError> {
        let events = sqlx::query_as::<_, Event>(
            r#"
            SELECT * FROM events
            WHERE start_date >= $1 AND start_date < $2 AND status <> 'cancelled'
            ORDER BY start_date ASC
            "#
        )
        .bind(from)
        .bind(to)
        .fetch_all(&self.pool)
        .await?;

        Ok(events)
    }

    /// Non-cancelled events that ended in `[from, to)`
    pub async fn list_ended_between(&self, from: DateTime<Utc>, to: DateTime<Utc>) -> Result<Vec<Event>, SchoolEventsError> {
        let events = sqlx::query_as::<_, Event>(
            r#"
            SELECT * FROM events
            WHERE end_date >= $1 AND end_date < $2 AND status <> 'cancelled'
            ORDER BY end_date ASC
            "#
        )
        .bind(from)
        .bind(to)
        .fetch_all(&self.pool)
        .await?;

        Ok(events)
    }

    /// Non-cancelled events that ended before `before` and still have `registered` rows
    pub async fn list_ended_with_open_registrations(&self, before: DateTime<Utc>) -> Result<Vec<Event>, SchoolEventsError> {
        let events = sqlx::query_as::<_, Event>(
            r#"
            SELECT e.* FROM events e
            WHERE e.end_date < $1 AND e.status <> 'cancelled'
              AND EXISTS (
                  SELECT 1 FROM registrations r
                  WHERE r.event_id = e.id AND r.status = 'registered'
              )
            ORDER BY e.end_date ASC
            "#
        )
        .bind(before)
        .fetch_all(&self.pool)
        .await?;

        Ok(events)
    }

    /// Per-status registration counts for an event
    pub async fn registration_stats(&self, id: i64) -> Result<RegistrationStats, SchoolEventsError> {
        let row: (i64, i64, i64, i64, i64) = sqlx::query_as(
            r#"
            SELECT COUNT(*),
                   COUNT(*) FILTER (WHERE status = 'registered'),
                   COUNT(*) FILTER (WHERE status = 'attended'),
                   COUNT(*) FILTER (WHERE status = 'cancelled'),
                   COUNT(*) FILTER (WHERE status = 'no-show')
            FROM registrations
            WHERE event_id = $1
            "#
        )
        .bind(id)
        .fetch_one(&self.pool)
        .await?;

        Ok(RegistrationStats {
            total: row.0,
            registered: row.1,
            attended: row.2,
            cancelled: row.3,
            no_show: row.4,
        })
    }
}
