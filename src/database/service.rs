//! Database service layer
//!
//! Postgres-backed [`Store`] built from the repositories.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::database::store::{Attendance, Store};
use crate::database::{connection, DatabasePool, UserRepository, EventRepository, RegistrationRepository, WatermarkRepository};
use crate::models::*;
use crate::utils::errors::Result;

#[derive(Debug, Clone)]
pub struct DatabaseService {
    pub users: UserRepository,
    pub events: EventRepository,
    pub registrations: RegistrationRepository,
    pub watermarks: WatermarkRepository,
    pool: DatabasePool,
}

impl DatabaseService {
    pub fn new(pool: DatabasePool) -> Self {
        Self {
            users: UserRepository::new(pool.clone()),
            events: EventRepository::new(pool.clone()),
            registrations: RegistrationRepository::new(pool.clone()),
            watermarks: WatermarkRepository::new(pool.clone()),
            pool,
        }
    }
}

#[async_trait]
impl Store for DatabaseService {
    async fn health_check(&self) -> Result<()> {
        connection::health_check(&self.pool).await
    }

    async fn create_user(&self, request: CreateUserRequest) -> Result<User> {
        self.users.create(request).await
    }

    async fn find_user(&self, user_id: i64) -> Result<Option<User>> {
        self.users.find_by_id(user_id).await
    }

    async fn create_event(&self, request: CreateEventRequest, now: DateTime<Utc>) -> Result<Event> {
        self.events.create(request, now).await
    }

    async fn find_event(&self, event_id: i64) -> Result<Option<Event>> {
        self.events.find_by_id(event_id).await
    }

    async fn update_event_details(&self, event: &Event) -> Result<Event> {
        self.events.update_details(event).await
    }

    async fn transition_event_status(&self, event_id: i64, expected: EventStatus, next: EventStatus) -> Result<bool> {
        self.events.transition_status(event_id, expected, next).await
    }

    async fn cancel_event(&self, event_id: i64, now: DateTime<Utc>) -> Result<Option<Event>> {
        self.events.cancel(event_id, now).await
    }

    async fn delete_event(&self, event_id: i64) -> Result<bool> {
        self.events.delete(event_id).await
    }

    async fn list_events(&self, limit: i64, offset: i64) -> Result<Vec<Event>> {
        self.events.list(limit, offset).await
    }

    async fn list_non_cancelled_events(&self) -> Result<Vec<Event>> {
        self.events.list_non_cancelled().await
    }

    async fn list_events_starting_between(&self, from: DateTime<Utc>, to: DateTime<Utc>) -> Result<Vec<Event>> {
        self.events.list_starting_between(from, to).await
    }

    async fn list_events_ended_between(&self, from: DateTime<Utc>, to: DateTime<Utc>) -> Result<Vec<Event>> {
        self.events.list_ended_between(from, to).await
    }

    async fn list_ended_events_with_open_registrations(&self, before: DateTime<Utc>) -> Result<Vec<Event>> {
        self.events.list_ended_with_open_registrations(before).await
    }

    async fn insert_registration(&self, registration: NewRegistration) -> Result<Registration> {
        self.registrations.create(registration).await
    }

    async fn find_registration(&self, registration_id: i64) -> Result<Option<Registration>> {
        self.registrations.find_by_id(registration_id).await
    }

    async fn find_registration_by_qr_code(&self, qr_code: &str) -> Result<Option<Registration>> {
        self.registrations.find_by_qr_code(qr_code).await
    }

    async fn find_registration_by_ticket_number(&self, ticket_number: &str) -> Result<Option<Registration>> {
        self.registrations.find_by_ticket_number(ticket_number).await
    }

    async fn find_active_registration(&self, event_id: i64, user_id: i64) -> Result<Option<Registration>> {
        self.registrations.find_active(event_id, user_id).await
    }

    async fn list_event_registrations(&self, event_id: i64) -> Result<Vec<Registration>> {
        self.registrations.list_for_event(event_id).await
    }

    async fn list_user_registrations(&self, user_id: i64) -> Result<Vec<Registration>> {
        self.registrations.list_for_user(user_id).await
    }

    async fn cancel_registration(
        &self,
        registration_id: i64,
        reason: Option<String>,
        now: DateTime<Utc>,
    ) -> Result<Option<Registration>> {
        self.registrations.cancel(registration_id, reason, now).await
    }

    async fn mark_attended(
        &self,
        registration_id: i64,
        method: CheckInMethod,
        now: DateTime<Utc>,
    ) -> Result<Option<Attendance>> {
        self.registrations.mark_attended(registration_id, method, now).await
    }

    async fn complete_payment(
        &self,
        registration_id: i64,
        payment: &AcceptedPayment,
        now: DateTime<Utc>,
    ) -> Result<Option<Registration>> {
        self.registrations.complete_payment(registration_id, payment, now).await
    }

    async fn list_pending_reminders(&self, event_id: i64) -> Result<Vec<Registration>> {
        self.registrations.list_pending_reminders(event_id).await
    }

    async fn mark_reminder_sent(&self, registration_id: i64, now: DateTime<Utc>) -> Result<bool> {
        self.registrations.mark_reminder_sent(registration_id, now).await
    }

    async fn mark_no_shows(&self, event_id: i64, now: DateTime<Utc>) -> Result<u64> {
        self.registrations.mark_no_shows(event_id, now).await
    }

    async fn registration_stats(&self, event_id: i64) -> Result<RegistrationStats> {
        self.events.registration_stats(event_id).await
    }

    async fn load_watermark(&self, job_name: &str) -> Result<Option<DateTime<Utc>>> {
        self.watermarks.load(job_name).await
    }

    async fn save_watermark(&self, job_name: &str, at: DateTime<Utc>) -> Result<()> {
        self.watermarks.save(job_name, at).await
    }
}
