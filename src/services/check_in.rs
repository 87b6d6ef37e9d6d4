//! Check-in service implementation
//!
//! Resolves a scanned QR token (or, for the manual path, a registration id) to
//! a registration, validates it against the event window and payment state and
//! marks it attended.

use std::sync::Arc;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{debug, info, warn};

use crate::database::{Attendance, Store};
use crate::models::{
    CheckInMethod, Event, PaymentStatus, Registration, RegistrationStatus, Requester, Ticket, User,
};
use crate::services::notification::{Dispatcher, ATTENDANCE_TOPIC};
use crate::utils::clock::Clock;
use crate::utils::errors::{SchoolEventsError, Result};
use crate::utils::logging::{log_check_in, log_rejection};

/// Payload returned to the scanning operator
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckInResult {
    pub registration_id: i64,
    pub ticket: Ticket,
    pub attended_at: DateTime<Utc>,
    pub check_in_method: CheckInMethod,
    pub user: Option<User>,
    pub event_id: i64,
    pub event_title: String,
}

/// Read-only validity report for a scanned code
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TicketVerification {
    pub valid: bool,
    /// Why the ticket would be rejected right now, if it would
    pub reason: Option<String>,
    pub registration: Registration,
    pub user: Option<User>,
    pub event_title: String,
    pub event_start: DateTime<Utc>,
    pub event_end: DateTime<Utc>,
}

#[derive(Clone)]
pub struct CheckInService {
    store: Arc<dyn Store>,
    dispatcher: Dispatcher,
    clock: Arc<dyn Clock>,
}

impl CheckInService {
    pub fn new(store: Arc<dyn Store>, dispatcher: Dispatcher, clock: Arc<dyn Clock>) -> Self {
        Self { store, dispatcher, clock }
    }

    /// Redeem a scanned QR code
    pub async fn check_in(&self, qr_code: &str, requester: Requester) -> Result<CheckInResult> {
        debug!(staff_id = requester.user_id, "Checking in by QR code");

        let result = self.try_check_in(qr_code, requester).await;

        if let Err(e) = &result {
            log_rejection("check_in", e);
        }
        result
    }

    /// Check in by registration id, for attendees without their code
    pub async fn manual_check_in(&self, registration_id: i64, requester: Requester) -> Result<CheckInResult> {
        debug!(registration_id = registration_id, staff_id = requester.user_id, "Manual check-in");

        let result = self.try_manual_check_in(registration_id, requester).await;

        if let Err(e) = &result {
            log_rejection("manual_check_in", e);
        }
        result
    }

    async fn try_check_in(&self, qr_code: &str, requester: Requester) -> Result<CheckInResult> {
        ensure_staff(requester)?;
        let registration = self
            .store
            .find_registration_by_qr_code(qr_code)
            .await?
            .ok_or(SchoolEventsError::InvalidTicket)?;
        self.redeem(registration, requester, CheckInMethod::Qr).await
    }

    async fn try_manual_check_in(&self, registration_id: i64, requester: Requester) -> Result<CheckInResult> {
        ensure_staff(requester)?;
        let registration = self
            .store
            .find_registration(registration_id)
            .await?
            .ok_or(SchoolEventsError::RegistrationNotFound { registration_id })?;
        self.redeem(registration, requester, CheckInMethod::Manual).await
    }

    /// Report whether a code would be accepted now, without changing anything
    pub async fn verify_ticket(&self, qr_code: &str, requester: Requester) -> Result<TicketVerification> {
        ensure_staff(requester)?;

        let registration = self
            .store
            .find_registration_by_qr_code(qr_code)
            .await?
            .ok_or(SchoolEventsError::InvalidTicket)?;
        let event = self.load_event(registration.event_id).await?;
        let user = self.store.find_user(registration.user_id).await?;

        let reason = redeem_check(&registration, &event, self.clock.now())
            .err()
            .map(|e| e.to_string());

        Ok(TicketVerification {
            valid: reason.is_none(),
            reason,
            event_title: event.title,
            event_start: event.start_date,
            event_end: event.end_date,
            registration,
            user,
        })
    }

    async fn redeem(&self, registration: Registration, requester: Requester, method: CheckInMethod) -> Result<CheckInResult> {
        let event = self.load_event(registration.event_id).await?;
        let now = self.clock.now();

        redeem_check(&registration, &event, now)?;

        let attendance = self.store.mark_attended(registration.id, method, now).await?;
        let Attendance { registration: attended, attended_count } = match attendance {
            Some(attendance) => attendance,
            None => {
                // Another scanner or the no-show sweep got there first
                let current = self
                    .store
                    .find_registration(registration.id)
                    .await?
                    .ok_or(SchoolEventsError::RegistrationNotFound { registration_id: registration.id })?;
                warn!(registration_id = current.id, status = %current.status, "Check-in lost a concurrent transition");
                redeem_check(&current, &event, now)?;
                return Err(SchoolEventsError::InvalidStateTransition {
                    from: current.status.to_string(),
                    to: RegistrationStatus::Attended.to_string(),
                });
            }
        };

        let attended_at = attended.attended_at.unwrap_or(now);
        log_check_in(attended.id, event.id, requester.user_id, method_name(method));

        let user = match self.store.find_user(attended.user_id).await {
            Ok(user) => user,
            Err(e) => {
                warn!(user_id = attended.user_id, error = %e, "Failed to load attendee for check-in payload");
                None
            }
        };

        self.dispatcher.broadcast(
            ATTENDANCE_TOPIC.to_string(),
            json!({
                "event_id": event.id,
                "registration_id": attended.id,
                "attended_count": attended_count,
                "attended_at": attended_at,
            }),
        );

        info!(registration_id = attended.id, event_id = event.id, "Check-in completed");

        Ok(CheckInResult {
            registration_id: attended.id,
            ticket: attended.ticket(),
            attended_at,
            check_in_method: method,
            user,
            event_id: event.id,
            event_title: event.title,
        })
    }

    async fn load_event(&self, event_id: i64) -> Result<Event> {
        self.store
            .find_event(event_id)
            .await?
            .ok_or(SchoolEventsError::EventNotFound { event_id })
    }
}

fn ensure_staff(requester: Requester) -> Result<()> {
    if requester.role.is_staff() {
        Ok(())
    } else {
        Err(SchoolEventsError::Forbidden("Staff role required for check-in".to_string()))
    }
}

/// Rejections in the order the operator sees them: expiry, prior check-in,
/// cancellation, no-show, unpaid
fn redeem_check(registration: &Registration, event: &Event, now: DateTime<Utc>) -> Result<()> {
    if !event.accepts_check_in(now) {
        return Err(SchoolEventsError::TicketExpired { event_end: event.end_date });
    }

    match registration.status {
        RegistrationStatus::Attended => {
            return Err(SchoolEventsError::AlreadyCheckedIn { attended_at: registration.attended_at });
        }
        RegistrationStatus::Cancelled => {
            return Err(SchoolEventsError::RegistrationCancelled { cancelled_at: registration.cancelled_at });
        }
        RegistrationStatus::NoShow => {
            return Err(SchoolEventsError::InvalidStateTransition {
                from: RegistrationStatus::NoShow.to_string(),
                to: RegistrationStatus::Attended.to_string(),
            });
        }
        RegistrationStatus::Registered => {}
    }

    if registration.payment_status == PaymentStatus::Pending {
        return Err(SchoolEventsError::PaymentRequired { amount_cents: registration.payment_amount_cents });
    }

    Ok(())
}

fn method_name(method: CheckInMethod) -> &'static str {
    match method {
        CheckInMethod::Qr => "qr",
        CheckInMethod::Manual => "manual",
    }
}
