//! Store abstraction used by the services and the scheduler
//!
//! Every compound write (counter change plus registration change) is a single
//! call on this trait so that implementations can make it atomic: Postgres with
//! a transaction around a conditional update, the in-memory store with a
//! per-event lock.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::models::{
    AcceptedPayment, CheckInMethod, CreateEventRequest, CreateUserRequest, Event, EventStatus,
    NewRegistration, Registration, RegistrationStats, User,
};
use crate::utils::errors::Result;

/// Watermark key of the no-show sweep
pub const NO_SHOW_SWEEP: &str = "no_show_sweep";

/// A registration just moved to `attended`, with the event counter it committed
#[derive(Debug, Clone)]
pub struct Attendance {
    pub registration: Registration,
    pub attended_count: i32,
}

#[async_trait]
pub trait Store: Send + Sync {
    /// Fails when the backing store cannot serve requests
    async fn health_check(&self) -> Result<()>;

    // Users

    async fn create_user(&self, request: CreateUserRequest) -> Result<User>;

    async fn find_user(&self, user_id: i64) -> Result<Option<User>>;

    // Events

    async fn create_event(&self, request: CreateEventRequest, now: DateTime<Utc>) -> Result<Event>;

    async fn find_event(&self, event_id: i64) -> Result<Option<Event>>;

    /// Persist descriptive fields and status of `event`. Counters are never written
    /// from here; fails with `InvalidInput` if the new capacity is below the live count.
    async fn update_event_details(&self, event: &Event) -> Result<Event>;

    /// Conditionally move an event from `expected` to `next`.
    ///
    /// Returns `false` without writing if the stored status is no longer `expected`
    /// or the event is cancelled.
    async fn transition_event_status(&self, event_id: i64, expected: EventStatus, next: EventStatus) -> Result<bool>;

    /// Mark an event cancelled; `None` if it was already cancelled
    async fn cancel_event(&self, event_id: i64, now: DateTime<Utc>) -> Result<Option<Event>>;

    /// Delete an event and, by cascade, all of its registrations
    async fn delete_event(&self, event_id: i64) -> Result<bool>;

    async fn list_events(&self, limit: i64, offset: i64) -> Result<Vec<Event>>;

    async fn list_non_cancelled_events(&self) -> Result<Vec<Event>>;

    /// Non-cancelled events with `from <= start_date < to`
    async fn list_events_starting_between(&self, from: DateTime<Utc>, to: DateTime<Utc>) -> Result<Vec<Event>>;

    /// Non-cancelled events with `from <= end_date < to`
    async fn list_events_ended_between(&self, from: DateTime<Utc>, to: DateTime<Utc>) -> Result<Vec<Event>>;

    /// Non-cancelled events with `end_date < before` that still hold `registered` registrations
    async fn list_ended_events_with_open_registrations(&self, before: DateTime<Utc>) -> Result<Vec<Event>>;

    // Registrations

    /// Insert a registration and increment the event's `registered_count` as one unit.
    ///
    /// Fails with `EventNotFound`, `CapacityExceeded` (also for a cancelled event),
    /// `AlreadyRegistered` when an active registration exists for the pair, or
    /// `TicketCollision` when the QR code or ticket number is already taken.
    async fn insert_registration(&self, registration: NewRegistration) -> Result<Registration>;

    async fn find_registration(&self, registration_id: i64) -> Result<Option<Registration>>;

    async fn find_registration_by_qr_code(&self, qr_code: &str) -> Result<Option<Registration>>;

    async fn find_registration_by_ticket_number(&self, ticket_number: &str) -> Result<Option<Registration>>;

    async fn find_active_registration(&self, event_id: i64, user_id: i64) -> Result<Option<Registration>>;

    async fn list_event_registrations(&self, event_id: i64) -> Result<Vec<Registration>>;

    async fn list_user_registrations(&self, user_id: i64) -> Result<Vec<Registration>>;

    /// Cancel a `registered` registration, refund a completed payment and decrement
    /// the event counter (floored at zero). `None` if the registration was not in
    /// `registered` state.
    async fn cancel_registration(
        &self,
        registration_id: i64,
        reason: Option<String>,
        now: DateTime<Utc>,
    ) -> Result<Option<Registration>>;

    /// Mark a `registered`, non-pending registration attended and increment the
    /// event's `attended_count`. `None` if those conditions no longer hold.
    async fn mark_attended(
        &self,
        registration_id: i64,
        method: CheckInMethod,
        now: DateTime<Utc>,
    ) -> Result<Option<Attendance>>;

    /// Move a pending payment to completed. `None` if it is not pending.
    async fn complete_payment(
        &self,
        registration_id: i64,
        payment: &AcceptedPayment,
        now: DateTime<Utc>,
    ) -> Result<Option<Registration>>;

    /// Registrations on `event_id` still `registered` with no reminder sent
    async fn list_pending_reminders(&self, event_id: i64) -> Result<Vec<Registration>>;

    /// Flip `reminder_sent`; `false` if another run already did
    async fn mark_reminder_sent(&self, registration_id: i64, now: DateTime<Utc>) -> Result<bool>;

    /// Move every `registered` registration of the event to `no-show`; returns how many moved
    async fn mark_no_shows(&self, event_id: i64, now: DateTime<Utc>) -> Result<u64>;

    async fn registration_stats(&self, event_id: i64) -> Result<RegistrationStats>;

    // Scheduler bookkeeping

    async fn load_watermark(&self, job_name: &str) -> Result<Option<DateTime<Utc>>>;

    async fn save_watermark(&self, job_name: &str, at: DateTime<Utc>) -> Result<()>;
}
