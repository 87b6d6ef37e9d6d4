//! Test data builders

use chrono::{DateTime, Duration, TimeZone, Utc};
use SchoolEvents::models::{
    CreateEventRequest, CreateUserRequest, EventCategory, PaymentMethod, PaymentRequest, Requester, User, UserRole,
};

/// Wednesday 2024-05-01 09:00 UTC; every test clock starts here
pub fn base_time() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 5, 1, 9, 0, 0).unwrap()
}

pub fn user_request(name: &str, role: UserRole) -> CreateUserRequest {
    CreateUserRequest {
        name: name.to_string(),
        email: format!("{}@school.test", name.to_lowercase().replace(' ', ".")),
        role,
    }
}

/// A published event running from `start` for two hours
pub fn event_request(title: &str, start: DateTime<Utc>, capacity: i32, price_cents: i64) -> CreateEventRequest {
    CreateEventRequest {
        title: title.to_string(),
        description: format!("{} for the whole school", title),
        category: EventCategory::Academic,
        start_date: start,
        end_date: start + Duration::hours(2),
        location: "Main Hall".to_string(),
        capacity,
        price_cents,
        registration_deadline: None,
        requires_registration: true,
        is_published: true,
        organizer_id: None,
    }
}

pub fn card_payment(amount_cents: i64) -> PaymentRequest {
    PaymentRequest {
        amount_cents,
        method: PaymentMethod::Card,
        transaction_id: None,
        card_last4: Some("4242".to_string()),
    }
}

pub fn cash_payment(amount_cents: i64) -> PaymentRequest {
    PaymentRequest {
        amount_cents,
        method: PaymentMethod::Cash,
        transaction_id: Some("CASH-0001".to_string()),
        card_last4: None,
    }
}

pub fn requester(user: &User) -> Requester {
    Requester::new(user.id, user.role)
}
