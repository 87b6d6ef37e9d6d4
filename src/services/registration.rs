//! Registration service implementation
//!
//! This service handles event registration, cancellation, payment completion
//! and the registration queries used by attendees and staff.

use std::sync::Arc;
use chrono::{DateTime, Utc};
use tracing::{info, warn, debug};

use crate::config::TicketsConfig;
use crate::database::Store;
use crate::models::{
    AcceptedPayment, Event, NewRegistration, PaymentRequest, PaymentStatus, Registration,
    RegistrationStatus, Requester,
};
use crate::services::notification::{Dispatcher, Notification, NotificationType};
use crate::utils::clock::Clock;
use crate::utils::errors::{SchoolEventsError, Result};
use crate::utils::helpers::is_valid_ticket_number;
use crate::utils::logging::{log_registration_action, log_rejection};

/// Registration service for the registration lifecycle
#[derive(Clone)]
pub struct RegistrationService {
    store: Arc<dyn Store>,
    dispatcher: Dispatcher,
    clock: Arc<dyn Clock>,
    tickets: TicketsConfig,
}

impl RegistrationService {
    /// Create a new RegistrationService instance
    pub fn new(store: Arc<dyn Store>, dispatcher: Dispatcher, clock: Arc<dyn Clock>, tickets: TicketsConfig) -> Self {
        Self {
            store,
            dispatcher,
            clock,
            tickets,
        }
    }

    /// Register a user for an event.
    ///
    /// Checks run in order: the event exists, registration is open, the user has
    /// no active registration, then the seat is claimed atomically by the store.
    pub async fn register(&self, event_id: i64, user_id: i64, payment: Option<PaymentRequest>) -> Result<Registration> {
        debug!(event_id = event_id, user_id = user_id, "Registering user for event");

        let result = self.try_register(event_id, user_id, payment).await;
        if let Err(e) = &result {
            log_rejection("register", e);
        }
        result
    }

    async fn try_register(&self, event_id: i64, user_id: i64, payment: Option<PaymentRequest>) -> Result<Registration> {
        let now = self.clock.now();

        let event = self.load_event(event_id).await?;

        if !event.is_registration_open(now) {
            return Err(SchoolEventsError::RegistrationClosed { event_id });
        }

        if self.store.find_active_registration(event_id, user_id).await?.is_some() {
            return Err(SchoolEventsError::AlreadyRegistered { event_id, user_id });
        }

        let user = self
            .store
            .find_user(user_id)
            .await?
            .ok_or(SchoolEventsError::UserNotFound { user_id })?;

        let accepted = match (&payment, event.is_free()) {
            (Some(request), false) => Some(request.accept(event.price_cents, now)?),
            _ => None,
        };

        let registration = self.insert_with_fresh_ticket(&event, user_id, accepted, now).await?;

        log_registration_action(registration.id, event_id, user_id, "registered");
        info!(
            registration_id = registration.id,
            ticket_number = %registration.ticket_number,
            payment_status = %registration.payment_status,
            "Registration created"
        );

        self.dispatcher.confirm_registration(user, event.clone(), registration.ticket());
        self.dispatcher.notify(Notification::from_template(
            user_id,
            NotificationType::RegistrationConfirmed,
            &event,
        ));
        self.publish_count(event_id).await;

        Ok(registration)
    }

    /// Insert, regenerating the ticket identity if the store reports a collision
    async fn insert_with_fresh_ticket(
        &self,
        event: &Event,
        user_id: i64,
        payment: Option<AcceptedPayment>,
        now: DateTime<Utc>,
    ) -> Result<Registration> {
        let attempts = self.tickets.max_generation_attempts.max(1);

        for attempt in 1..=attempts {
            let candidate = NewRegistration::new(event, user_id, payment.clone(), now, &self.tickets);
            match self.store.insert_registration(candidate).await {
                Err(SchoolEventsError::TicketCollision) => {
                    warn!(event_id = event.id, attempt = attempt, "Ticket identifier collision, regenerating");
                }
                other => return other,
            }
        }

        Err(SchoolEventsError::TicketCollision)
    }

    /// Cancel a registration on behalf of its owner or an admin
    pub async fn cancel(&self, registration_id: i64, requester: Requester, reason: Option<String>) -> Result<Registration> {
        debug!(registration_id = registration_id, requester_id = requester.user_id, "Cancelling registration");

        let result = self.try_cancel(registration_id, requester, reason).await;
        if let Err(e) = &result {
            log_rejection("cancel", e);
        }
        result
    }

    async fn try_cancel(&self, registration_id: i64, requester: Requester, reason: Option<String>) -> Result<Registration> {
        let registration = self.load_registration(registration_id).await?;

        if !requester.can_act_for(registration.user_id) {
            return Err(SchoolEventsError::Forbidden(
                "Only the registrant or an admin may cancel this registration".to_string(),
            ));
        }

        ensure_cancellable(&registration)?;

        let now = self.clock.now();
        let cancelled = match self.store.cancel_registration(registration_id, reason, now).await? {
            Some(cancelled) => cancelled,
            None => {
                // Lost a race with another transition; report what it became
                let current = self.load_registration(registration_id).await?;
                ensure_cancellable(&current)?;
                return Err(SchoolEventsError::InvalidStateTransition {
                    from: current.status.to_string(),
                    to: RegistrationStatus::Cancelled.to_string(),
                });
            }
        };

        log_registration_action(cancelled.id, cancelled.event_id, cancelled.user_id, "cancelled");
        if cancelled.payment_status == PaymentStatus::Refunded {
            info!(
                registration_id = cancelled.id,
                amount_cents = cancelled.payment_amount_cents,
                "Completed payment marked refunded"
            );
        }

        self.publish_count(cancelled.event_id).await;
        Ok(cancelled)
    }

    /// Complete the payment of a pending registration (simulated gateway)
    pub async fn complete_payment(&self, registration_id: i64, requester: Requester, payment: PaymentRequest) -> Result<Registration> {
        debug!(registration_id = registration_id, requester_id = requester.user_id, "Completing payment");

        let result = self.try_complete_payment(registration_id, requester, payment).await;
        if let Err(e) = &result {
            log_rejection("complete_payment", e);
        }
        result
    }

    async fn try_complete_payment(&self, registration_id: i64, requester: Requester, payment: PaymentRequest) -> Result<Registration> {
        let registration = self.load_registration(registration_id).await?;

        if !requester.can_act_for(registration.user_id) {
            return Err(SchoolEventsError::Forbidden(
                "Only the registrant or an admin may pay for this registration".to_string(),
            ));
        }

        if registration.status == RegistrationStatus::Cancelled {
            return Err(SchoolEventsError::RegistrationCancelled { cancelled_at: registration.cancelled_at });
        }

        if registration.payment_status != PaymentStatus::Pending {
            return Err(SchoolEventsError::InvalidStateTransition {
                from: registration.payment_status.to_string(),
                to: PaymentStatus::Completed.to_string(),
            });
        }

        let now = self.clock.now();
        let accepted = payment.accept(registration.payment_amount_cents, now)?;

        let paid = self
            .store
            .complete_payment(registration_id, &accepted, now)
            .await?
            .ok_or_else(|| SchoolEventsError::InvalidStateTransition {
                from: registration.payment_status.to_string(),
                to: PaymentStatus::Completed.to_string(),
            })?;

        log_registration_action(paid.id, paid.event_id, paid.user_id, "paid");
        info!(
            registration_id = paid.id,
            transaction_id = ?paid.transaction_id,
            amount_cents = paid.payment_amount_cents,
            "Payment completed"
        );

        Ok(paid)
    }

    /// Get a registration visible to the requester
    pub async fn get(&self, registration_id: i64, requester: Requester) -> Result<Registration> {
        let registration = self.load_registration(registration_id).await?;
        ensure_visible(&registration, requester)?;
        Ok(registration)
    }

    /// Look a registration up by its printed ticket number, as typed at the desk
    pub async fn find_by_ticket_number(&self, ticket_number: &str, requester: Requester) -> Result<Registration> {
        let ticket_number = ticket_number.trim().to_ascii_uppercase();
        debug!(ticket_number = %ticket_number, "Looking up registration by ticket number");

        if !is_valid_ticket_number(&ticket_number) {
            return Err(SchoolEventsError::InvalidTicket);
        }

        let registration = self
            .store
            .find_registration_by_ticket_number(&ticket_number)
            .await?
            .ok_or(SchoolEventsError::InvalidTicket)?;
        ensure_visible(&registration, requester)?;
        Ok(registration)
    }

    /// The requester's own registrations, newest first
    pub async fn my_registrations(&self, requester: Requester) -> Result<Vec<Registration>> {
        debug!(user_id = requester.user_id, "Listing user registrations");
        self.store.list_user_registrations(requester.user_id).await
    }

    /// Attended registrations of a user, for their attendance history
    pub async fn attendance_history(&self, user_id: i64, requester: Requester) -> Result<Vec<Registration>> {
        if !requester.can_act_for(user_id) {
            return Err(SchoolEventsError::Forbidden("Not authorized".to_string()));
        }

        let mut registrations = self.store.list_user_registrations(user_id).await?;
        registrations.retain(|r| r.status == RegistrationStatus::Attended);
        registrations.sort_by(|a, b| b.attended_at.cmp(&a.attended_at));
        Ok(registrations)
    }

    /// Every registration of an event, for staff
    pub async fn event_registrations(&self, event_id: i64, requester: Requester) -> Result<Vec<Registration>> {
        if !requester.role.is_staff() {
            return Err(SchoolEventsError::Forbidden("Staff role required".to_string()));
        }

        self.load_event(event_id).await?;
        self.store.list_event_registrations(event_id).await
    }

    async fn load_event(&self, event_id: i64) -> Result<Event> {
        self.store
            .find_event(event_id)
            .await?
            .ok_or(SchoolEventsError::EventNotFound { event_id })
    }

    async fn load_registration(&self, registration_id: i64) -> Result<Registration> {
        self.store
            .find_registration(registration_id)
            .await?
            .ok_or(SchoolEventsError::RegistrationNotFound { registration_id })
    }

    /// Broadcast the live count; failures only reach the log
    async fn publish_count(&self, event_id: i64) {
        match self.store.find_event(event_id).await {
            Ok(Some(event)) => self.dispatcher.broadcast_count(&event),
            Ok(None) => {}
            Err(e) => warn!(event_id = event_id, error = %e, "Failed to load event for count broadcast"),
        }
    }
}

fn ensure_cancellable(registration: &Registration) -> Result<()> {
    match registration.status {
        RegistrationStatus::Registered => Ok(()),
        RegistrationStatus::Cancelled => Err(SchoolEventsError::AlreadyCancelled { registration_id: registration.id }),
        other => Err(SchoolEventsError::InvalidStateTransition {
            from: other.to_string(),
            to: RegistrationStatus::Cancelled.to_string(),
        }),
    }
}

fn ensure_visible(registration: &Registration, requester: Requester) -> Result<()> {
    if requester.can_act_for(registration.user_id) || requester.role.is_staff() {
        Ok(())
    } else {
        Err(SchoolEventsError::Forbidden("Not authorized".to_string()))
    }
}
