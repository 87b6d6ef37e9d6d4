//! Registration model
//!
//! A registration is one user's claim on one event's capacity. It carries the
//! ticket identity (QR token and human-readable ticket number), the attendance
//! state machine and the payment state.

use serde::{Deserialize, Serialize};
use chrono::{DateTime, Utc};
use sqlx::FromRow;

use crate::config::TicketsConfig;
use crate::models::event::Event;
use crate::utils::errors::{SchoolEventsError, Result};
use crate::utils::helpers::{generate_qr_token, generate_ticket_number};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "registration_status", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum RegistrationStatus {
    Registered,
    Attended,
    Cancelled,
    #[sqlx(rename = "no-show")]
    #[serde(rename = "no-show")]
    NoShow,
}

impl RegistrationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RegistrationStatus::Registered => "registered",
            RegistrationStatus::Attended => "attended",
            RegistrationStatus::Cancelled => "cancelled",
            RegistrationStatus::NoShow => "no-show",
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, RegistrationStatus::Registered)
    }

    /// Only `registered` moves, and only to one of the three terminal states
    pub fn can_transition_to(&self, next: RegistrationStatus) -> bool {
        matches!(
            (self, next),
            (
                RegistrationStatus::Registered,
                RegistrationStatus::Attended | RegistrationStatus::Cancelled | RegistrationStatus::NoShow
            )
        )
    }
}

impl std::fmt::Display for RegistrationStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "check_in_method", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum CheckInMethod {
    Qr,
    Manual,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "payment_status", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    Pending,
    Completed,
    Failed,
    Refunded,
    NotRequired,
}

impl PaymentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentStatus::Pending => "pending",
            PaymentStatus::Completed => "completed",
            PaymentStatus::Failed => "failed",
            PaymentStatus::Refunded => "refunded",
            PaymentStatus::NotRequired => "not_required",
        }
    }

    /// Payments only move forward: pending -> completed -> refunded, or pending -> failed
    pub fn can_transition_to(&self, next: PaymentStatus) -> bool {
        matches!(
            (self, next),
            (PaymentStatus::Pending, PaymentStatus::Completed)
                | (PaymentStatus::Pending, PaymentStatus::Failed)
                | (PaymentStatus::Pending, PaymentStatus::NotRequired)
                | (PaymentStatus::Completed, PaymentStatus::Refunded)
        )
    }

    /// Payment status after the owning registration is cancelled
    pub fn after_cancellation(&self) -> PaymentStatus {
        match self {
            PaymentStatus::Completed => PaymentStatus::Refunded,
            other => *other,
        }
    }
}

impl std::fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "payment_method", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum PaymentMethod {
    Card,
    Cash,
    Free,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Registration {
    pub id: i64,
    pub event_id: i64,
    pub user_id: i64,
    pub qr_code: String,
    pub ticket_number: String,
    pub status: RegistrationStatus,
    pub registered_at: DateTime<Utc>,
    pub attended_at: Option<DateTime<Utc>>,
    pub cancelled_at: Option<DateTime<Utc>>,
    pub cancellation_reason: Option<String>,
    pub check_in_method: Option<CheckInMethod>,
    pub reminder_sent: bool,
    pub reminder_sent_at: Option<DateTime<Utc>>,
    pub payment_status: PaymentStatus,
    pub payment_amount_cents: i64,
    pub payment_method: Option<PaymentMethod>,
    pub transaction_id: Option<String>,
    pub card_last4: Option<String>,
    pub payment_date: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Registration {
    pub fn is_active(&self) -> bool {
        self.status != RegistrationStatus::Cancelled
    }

    pub fn ticket(&self) -> Ticket {
        Ticket {
            registration_id: self.id,
            qr_code: self.qr_code.clone(),
            ticket_number: self.ticket_number.clone(),
        }
    }

    pub fn payment_details(&self) -> Option<PaymentDetails> {
        self.payment_date.map(|payment_date| PaymentDetails {
            transaction_id: self.transaction_id.clone(),
            card_last4: self.card_last4.clone(),
            payment_date,
        })
    }

    /// Ticket-valid predicate: not cancelled and the event has not ended yet
    pub fn is_ticket_valid(&self, event: &Event, now: DateTime<Utc>) -> bool {
        self.status != RegistrationStatus::Cancelled && event.accepts_check_in(now)
    }

    /// Apply a cancellation to an in-memory copy; stores use the same rules in SQL
    pub fn cancelled(&self, reason: Option<String>, now: DateTime<Utc>) -> Result<Registration> {
        self.ensure_transition(RegistrationStatus::Cancelled)?;
        let mut updated = self.clone();
        updated.status = RegistrationStatus::Cancelled;
        updated.cancelled_at = Some(now);
        updated.cancellation_reason = reason;
        updated.payment_status = self.payment_status.after_cancellation();
        updated.updated_at = now;
        Ok(updated)
    }

    pub fn attended(&self, method: CheckInMethod, now: DateTime<Utc>) -> Result<Registration> {
        self.ensure_transition(RegistrationStatus::Attended)?;
        let mut updated = self.clone();
        updated.status = RegistrationStatus::Attended;
        updated.attended_at = Some(now);
        updated.check_in_method = Some(method);
        updated.updated_at = now;
        Ok(updated)
    }

    pub fn no_show(&self, now: DateTime<Utc>) -> Result<Registration> {
        self.ensure_transition(RegistrationStatus::NoShow)?;
        let mut updated = self.clone();
        updated.status = RegistrationStatus::NoShow;
        updated.updated_at = now;
        Ok(updated)
    }

    pub fn paid(&self, payment: &AcceptedPayment, now: DateTime<Utc>) -> Result<Registration> {
        if !self.payment_status.can_transition_to(PaymentStatus::Completed) {
            return Err(SchoolEventsError::InvalidStateTransition {
                from: self.payment_status.to_string(),
                to: PaymentStatus::Completed.to_string(),
            });
        }
        let mut updated = self.clone();
        updated.payment_status = PaymentStatus::Completed;
        updated.payment_amount_cents = payment.amount_cents;
        updated.payment_method = Some(payment.method);
        updated.transaction_id = Some(payment.transaction_id.clone());
        updated.card_last4 = payment.card_last4.clone();
        updated.payment_date = Some(payment.paid_at);
        updated.updated_at = now;
        Ok(updated)
    }

    fn ensure_transition(&self, next: RegistrationStatus) -> Result<()> {
        if self.status.can_transition_to(next) {
            Ok(())
        } else {
            Err(SchoolEventsError::InvalidStateTransition {
                from: self.status.to_string(),
                to: next.to_string(),
            })
        }
    }
}

/// Public identity of a registration used for display and check-in
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ticket {
    pub registration_id: i64,
    pub qr_code: String,
    pub ticket_number: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentDetails {
    pub transaction_id: Option<String>,
    pub card_last4: Option<String>,
    pub payment_date: DateTime<Utc>,
}

/// Payment details submitted with a registration or afterwards
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentRequest {
    pub amount_cents: i64,
    pub method: PaymentMethod,
    pub transaction_id: Option<String>,
    pub card_last4: Option<String>,
}

impl PaymentRequest {
    /// Simulated gateway: the amount must match the price and cards need their last four digits
    pub fn accept(&self, price_cents: i64, now: DateTime<Utc>) -> Result<AcceptedPayment> {
        if self.amount_cents != price_cents {
            return Err(SchoolEventsError::InvalidInput(format!(
                "Payment amount {} does not match price {}",
                self.amount_cents, price_cents
            )));
        }

        if self.method == PaymentMethod::Card {
            let valid_last4 = self
                .card_last4
                .as_deref()
                .map(|digits| digits.len() == 4 && digits.chars().all(|c| c.is_ascii_digit()))
                .unwrap_or(false);
            if !valid_last4 {
                return Err(SchoolEventsError::InvalidInput(
                    "Card payments require the last four card digits".to_string(),
                ));
            }
        }

        let transaction_id = self
            .transaction_id
            .clone()
            .unwrap_or_else(|| format!("TXN-{}", uuid::Uuid::new_v4().simple()).to_uppercase());

        Ok(AcceptedPayment {
            amount_cents: self.amount_cents,
            method: self.method,
            transaction_id,
            card_last4: self.card_last4.clone(),
            paid_at: now,
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AcceptedPayment {
    pub amount_cents: i64,
    pub method: PaymentMethod,
    pub transaction_id: String,
    pub card_last4: Option<String>,
    pub paid_at: DateTime<Utc>,
}

/// A registration about to be inserted.
///
/// Ticket identity is computed here, once. Retrying after a store-side collision
/// builds a fresh `NewRegistration`; an inserted row never has its ticket reassigned.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewRegistration {
    pub event_id: i64,
    pub user_id: i64,
    pub qr_code: String,
    pub ticket_number: String,
    pub registered_at: DateTime<Utc>,
    pub payment_status: PaymentStatus,
    pub payment_amount_cents: i64,
    pub payment: Option<AcceptedPayment>,
}

impl NewRegistration {
    pub fn new(
        event: &Event,
        user_id: i64,
        payment: Option<AcceptedPayment>,
        now: DateTime<Utc>,
        tickets: &TicketsConfig,
    ) -> Self {
        let payment_status = if event.is_free() {
            PaymentStatus::NotRequired
        } else if payment.is_some() {
            PaymentStatus::Completed
        } else {
            PaymentStatus::Pending
        };

        // Free events never carry payment details
        let payment = if event.is_free() { None } else { payment };

        Self {
            event_id: event.id,
            user_id,
            qr_code: generate_qr_token(),
            ticket_number: generate_ticket_number(&tickets.prefix, now, tickets.suffix_length),
            registered_at: now,
            payment_status,
            payment_amount_cents: event.price_cents,
            payment,
        }
    }

    /// Materialize the row as a store would persist it
    pub fn into_registration(self, id: i64) -> Registration {
        let (payment_method, transaction_id, card_last4, payment_date) = match self.payment {
            Some(payment) => (
                Some(payment.method),
                Some(payment.transaction_id),
                payment.card_last4,
                Some(payment.paid_at),
            ),
            None => (None, None, None, None),
        };

        Registration {
            id,
            event_id: self.event_id,
            user_id: self.user_id,
            qr_code: self.qr_code,
            ticket_number: self.ticket_number,
            status: RegistrationStatus::Registered,
            registered_at: self.registered_at,
            attended_at: None,
            cancelled_at: None,
            cancellation_reason: None,
            check_in_method: None,
            reminder_sent: false,
            reminder_sent_at: None,
            payment_status: self.payment_status,
            payment_amount_cents: self.payment_amount_cents,
            payment_method,
            transaction_id,
            card_last4,
            payment_date,
            created_at: self.registered_at,
            updated_at: self.registered_at,
        }
    }
}
