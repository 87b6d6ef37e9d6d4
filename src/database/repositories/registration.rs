//! Registration repository implementation
//!
//! Writes that touch both a registration and its event's counters run inside a
//! single transaction. The event row is locked by the conditional counter update,
//! which serializes concurrent registrations for the same event only.

use sqlx::PgPool;
use chrono::{DateTime, Utc};
use crate::database::store::Attendance;
use crate::models::registration::{AcceptedPayment, CheckInMethod, NewRegistration, Registration};
use crate::utils::errors::SchoolEventsError;

const ACTIVE_PAIR_INDEX: &str = "registrations_active_pair_idx";
const QR_CODE_KEY: &str = "registrations_qr_code_key";
const TICKET_NUMBER_KEY: &str = "registrations_ticket_number_key";

#[derive(Debug, Clone)]
pub struct RegistrationRepository {
    pool: PgPool,
}

impl RegistrationRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Claim a seat and insert the registration in one transaction
    pub async fn create(&self, request: NewRegistration) -> Result<Registration, SchoolEventsError> {
        let mut tx = self.pool.begin().await?;

        let claimed: Option<(i64,)> = sqlx::query_as(
            r#"
            UPDATE events
            SET registered_count = registered_count + 1, updated_at = NOW()
            WHERE id = $1 AND registered_count < capacity AND status <> 'cancelled'
            RETURNING id
            "#
        )
        .bind(request.event_id)
        .fetch_optional(&mut *tx)
        .await?;

        if claimed.is_none() {
            let capacity: Option<(i32,)> = sqlx::query_as("SELECT capacity FROM events WHERE id = $1")
                .bind(request.event_id)
                .fetch_optional(&mut *tx)
                .await?;

            // Dropping the transaction rolls it back
            return Err(match capacity {
                Some((capacity,)) => SchoolEventsError::CapacityExceeded { event_id: request.event_id, capacity },
                None => SchoolEventsError::EventNotFound { event_id: request.event_id },
            });
        }

        let (payment_method, transaction_id, card_last4, payment_date) = match &request.payment {
            Some(payment) => (
                Some(payment.method),
                Some(payment.transaction_id.clone()),
                payment.card_last4.clone(),
                Some(payment.paid_at),
            ),
            None => (None, None, None, None),
        };

        let inserted = sqlx::query_as::<_, Registration>(
            r#"
            INSERT INTO registrations (event_id, user_id, qr_code, ticket_number, status, registered_at,
                                       payment_status, payment_amount_cents, payment_method,
                                       transaction_id, card_last4, payment_date, created_at, updated_at)
            VALUES ($1, $2, $3, $4, 'registered', $5, $6, $7, $8, $9, $10, $11, $5, $5)
            RETURNING *
            "#
        )
        .bind(request.event_id)
        .bind(request.user_id)
        .bind(&request.qr_code)
        .bind(&request.ticket_number)
        .bind(request.registered_at)
        .bind(request.payment_status)
        .bind(request.payment_amount_cents)
        .bind(payment_method)
        .bind(transaction_id)
        .bind(card_last4)
        .bind(payment_date)
        .fetch_one(&mut *tx)
        .await;

        let registration = match inserted {
            Ok(registration) => registration,
            Err(sqlx::Error::Database(db_error)) => {
                let constraint = db_error.constraint().map(str::to_owned);
                return Err(match constraint.as_deref() {
                    Some(ACTIVE_PAIR_INDEX) => SchoolEventsError::AlreadyRegistered {
                        event_id: request.event_id,
                        user_id: request.user_id,
                    },
                    Some(QR_CODE_KEY) | Some(TICKET_NUMBER_KEY) => SchoolEventsError::TicketCollision,
                    _ => SchoolEventsError::Database(sqlx::Error::Database(db_error)),
                });
            }
            Err(e) => return Err(e.into()),
        };

        tx.commit().await?;
        Ok(registration)
    }

    /// Find registration by ID
    pub async fn find_by_id(&self, id: i64) -> Result<Option<Registration>, SchoolEventsError> {
        let registration = sqlx::query_as::<_, Registration>("SELECT * FROM registrations WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(registration)
    }

    /// Find registration by scanned QR token
    pub async fn find_by_qr_code(&self, qr_code: &str) -> Result<Option<Registration>, SchoolEventsError> {
        let registration = sqlx::query_as::<_, Registration>("SELECT * FROM registrations WHERE qr_code = $1")
            .bind(qr_code)
            .fetch_optional(&self.pool)
            .await?;

        Ok(registration)
    }

    /// Find registration by human-readable ticket number
    pub async fn find_by_ticket_number(&self, ticket_number: &str) -> Result<Option<Registration>, SchoolEventsError> {
        let registration = sqlx::query_as::<_, Registration>("SELECT * FROM registrations WHERE ticket_number = $1")
            .bind(ticket_number)
            .fetch_optional(&self.pool)
            .await?;

        Ok(registration)
    }

    /// The non-cancelled registration of a user for an event, if any
    pub async fn find_active(&self, event_id: i64, user_id: i64) -> Result<Option<Registration>, SchoolEventsError> {
        let registration = sqlx::query_as::<_, Registration>(
            "SELECT * FROM registrations WHERE event_id = $1 AND user_id = $2 AND status <> 'cancelled'"
        )
        .bind(event_id)
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(registration)
    }

    /// Get event registrations
    pub async fn list_for_event(&self, event_id: i64) -> Result<Vec<Registration>, SchoolEventsError> {
        let registrations = sqlx::query_as::<_, Registration>(
            "SELECT * FROM registrations WHERE event_id = $1 ORDER BY registered_at ASC"
        )
        .bind(event_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(registrations)
    }

    /// Get user registrations, newest first
    pub async fn list_for_user(&self, user_id: i64) -> Result<Vec<Registration>, SchoolEventsError> {
        let registrations = sqlx::query_as::<_, Registration>(
            "SELECT * FROM registrations WHERE user_id = $1 ORDER BY registered_at DESC"
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(registrations)
    }

    /// Cancel and release the seat in one transaction
    pub async fn cancel(&self, id: i64, reason: Option<String>, now: DateTime<Utc>) -> Result<Option<Registration>, SchoolEventsError> {
        let mut tx = self.pool.begin().await?;

        let cancelled = sqlx::query_as::<_, Registration>(
            r#"
            UPDATE registrations
            SET status = 'cancelled',
                cancelled_at = $2,
                cancellation_reason = $3,
                payment_status = CASE WHEN payment_status = 'completed' THEN 'refunded' ELSE payment_status END,
                updated_at = $2
            WHERE id = $1 AND status = 'registered'
            RETURNING *
            "#
        )
        .bind(id)
        .bind(now)
        .bind(reason)
        .fetch_optional(&mut *tx)
        .await?;

        let Some(registration) = cancelled else {
            return Ok(None);
        };

        sqlx::query(
            r#"
            UPDATE events
            SET registered_count = GREATEST(registered_count - 1, 0), updated_at = $2
            WHERE id = $1
            "#
        )
        .bind(registration.event_id)
        .bind(now)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(Some(registration))
    }

    /// Check in and bump the attendance counter in one transaction
    pub async fn mark_attended(&self, id: i64, method: CheckInMethod, now: DateTime<Utc>) -> Result<Option<Attendance>, SchoolEventsError> {
        let mut tx = self.pool.begin().await?;

        let attended = sqlx::query_as::<_, Registration>(
            r#"
            UPDATE registrations
            SET status = 'attended', attended_at = $2, check_in_method = $3, updated_at = $2
            WHERE id = $1 AND status = 'registered' AND payment_status <> 'pending'
            RETURNING *
            "#
        )
        .bind(id)
        .bind(now)
        .bind(method)
        .fetch_optional(&mut *tx)
        .await?;

        let Some(registration) = attended else {
            return Ok(None);
        };

        let attended_count: i32 = sqlx::query_scalar(
            "UPDATE events SET attended_count = attended_count + 1, updated_at = $2 WHERE id = $1 RETURNING attended_count"
        )
        .bind(registration.event_id)
        .bind(now)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(Some(Attendance { registration, attended_count }))
    }

    /// Record a completed payment for a pending registration
    pub async fn complete_payment(&self, id: i64, payment: &AcceptedPayment, now: DateTime<Utc>) -> Result<Option<Registration>, SchoolEventsError> {
        let registration = sqlx::query_as::<_, Registration>(
            r#"
            UPDATE registrations
            SET payment_status = 'completed',
                payment_amount_cents = $2,
                payment_method = $3,
                transaction_id = $4,
                card_last4 = $5,
                payment_date = $6,
                updated_at = $7
            WHERE id = $1 AND payment_status = 'pending'
            RETURNING *
            "#
        )
        .bind(id)
        .bind(payment.amount_cents)
        .bind(payment.method)
        .bind(&payment.transaction_id)
        .bind(&payment.card_last4)
        .bind(payment.paid_at)
        .bind(now)
        .fetch_optional(&self.pool)
        .await?;

        Ok(registration)
    }

    /// Registrations awaiting a reminder
    pub async fn list_pending_reminders(&self, event_id: i64) -> Result<Vec<Registration>, SchoolEventsError> {
        let registrations = sqlx::query_as::<_, Registration>(
            r#"
            SELECT * FROM registrations
            WHERE event_id = $1 AND status = 'registered' AND reminder_sent = FALSE
            ORDER BY registered_at ASC
            "#
        )
        .bind(event_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(registrations)
    }

    /// Set the reminder flag once
    pub async fn mark_reminder_sent(&self, id: i64, now: DateTime<Utc>) -> Result<bool, SchoolEventsError> {
        let result = sqlx::query(
            r#"
            UPDATE registrations
            SET reminder_sent = TRUE, reminder_sent_at = $2, updated_at = $2
            WHERE id = $1 AND reminder_sent = FALSE
            "#
        )
        .bind(id)
        .bind(now)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    /// Reconcile registrations left in `registered` after the event ended
    pub async fn mark_no_shows(&self, event_id: i64, now: DateTime<Utc>) -> Result<u64, SchoolEventsError> {
        let result = sqlx::query(
            r#"
            UPDATE registrations
            SET status = 'no-show', updated_at = $2
            WHERE event_id = $1 AND status = 'registered'
            "#
        )
        .bind(event_id)
        .bind(now)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }
}
