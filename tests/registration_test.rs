//! Registration lifecycle tests over the in-memory store

mod helpers;

use assert_matches::assert_matches;
use chrono::Duration;
use helpers::*;
use SchoolEvents::{
    database::Store,
    models::{PaymentStatus, RegistrationStatus, UserRole},
    services::{notification::event_topic, NotificationType},
    utils::helpers::is_valid_ticket_number,
    SchoolEventsError,
};

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_registrations_never_oversell() {
    let ctx = TestContext::new().await;
    let event = ctx.event(Duration::days(3), 5, 0).await;

    let mut students = Vec::new();
    for i in 0..20 {
        students.push(ctx.student(&format!("Student {}", i)).await);
    }

    let tasks: Vec<_> = students
        .iter()
        .map(|student| {
            let service = ctx.services.registration_service.clone();
            let (event_id, user_id) = (event.id, student.id);
            tokio::spawn(async move { service.register(event_id, user_id, None).await })
        })
        .collect();

    let results: Vec<_> = futures::future::join_all(tasks)
        .await
        .into_iter()
        .map(|joined| joined.expect("Registration task panicked"))
        .collect();

    let accepted = results.iter().filter(|r| r.is_ok()).count();
    assert_eq!(accepted, 5);
    for rejected in results.iter().filter_map(|r| r.as_ref().err()) {
        assert_matches!(
            rejected,
            SchoolEventsError::CapacityExceeded { .. } | SchoolEventsError::RegistrationClosed { .. }
        );
    }

    let event = ctx.reload_event(event.id).await;
    assert_eq!(event.registered_count, 5);
    assert_eq!(event.available_slots(), 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_duplicate_registrations_keep_one() {
    let ctx = TestContext::new().await;
    let event = ctx.event(Duration::days(3), 30, 0).await;
    let student = ctx.student("Ada").await;

    let tasks: Vec<_> = (0..10)
        .map(|_| {
            let service = ctx.services.registration_service.clone();
            let (event_id, user_id) = (event.id, student.id);
            tokio::spawn(async move { service.register(event_id, user_id, None).await })
        })
        .collect();

    let results: Vec<_> = futures::future::join_all(tasks)
        .await
        .into_iter()
        .map(|joined| joined.expect("Registration task panicked"))
        .collect();

    assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
    for rejected in results.iter().filter_map(|r| r.as_ref().err()) {
        assert_matches!(rejected, SchoolEventsError::AlreadyRegistered { .. });
    }

    assert_eq!(ctx.reload_event(event.id).await.registered_count, 1);
    let registrations = ctx.store.list_event_registrations(event.id).await.unwrap();
    assert_eq!(registrations.len(), 1);
    assert_eq!(registrations[0].user_id, student.id);
}

#[tokio::test]
async fn test_register_confirms_and_broadcasts_count() {
    let ctx = TestContext::new().await;
    let event = ctx.event(Duration::days(2), 30, 0).await;
    let student = ctx.student("Ada").await;

    let registration = ctx.register(&event, &student).await;
    ctx.settle().await;

    assert_eq!(registration.status, RegistrationStatus::Registered);
    assert_eq!(registration.payment_status, PaymentStatus::NotRequired);
    assert_eq!(ctx.notifier.confirmation_count(), 1);
    assert_eq!(ctx.notifier.notifications_of(NotificationType::RegistrationConfirmed).len(), 1);

    let counts = ctx.broadcaster.on_topic(&event_topic(event.id));
    let last = counts.last().expect("No count broadcast");
    assert_eq!(last["type"], "registration:count");
    assert_eq!(last["registered_count"], 1);
    assert_eq!(last["available_slots"], 29);
}

#[tokio::test]
async fn test_ticket_identity() {
    let ctx = TestContext::new().await;
    let event = ctx.event(Duration::days(2), 30, 0).await;
    let first = ctx.register(&event, &ctx.student("Ada").await).await;
    let second = ctx.register(&event, &ctx.student("Grace").await).await;

    assert!(is_valid_ticket_number(&first.ticket_number));
    assert!(first.ticket_number.starts_with("EVT-20240501-"));
    assert_ne!(first.ticket_number, second.ticket_number);
    assert_ne!(first.qr_code, second.qr_code);

    let found = ctx
        .services
        .registration_service
        .find_by_ticket_number(&first.ticket_number, requester(&ctx.staff))
        .await
        .unwrap();
    assert_eq!(found.id, first.id);
    assert_eq!(found.qr_code, first.qr_code);

    assert_matches!(
        ctx.services
            .registration_service
            .find_by_ticket_number("EVT-20240501-NOPE0", requester(&ctx.staff))
            .await,
        Err(SchoolEventsError::InvalidTicket)
    );
}

#[tokio::test]
async fn test_duplicate_registration_and_re_registration() {
    let ctx = TestContext::new().await;
    let event = ctx.event(Duration::days(2), 30, 0).await;
    let student = ctx.student("Ada").await;
    let service = &ctx.services.registration_service;

    let first = ctx.register(&event, &student).await;
    assert_matches!(
        service.register(event.id, student.id, None).await,
        Err(SchoolEventsError::AlreadyRegistered { .. })
    );

    let cancelled = service
        .cancel(first.id, requester(&student), Some("Family trip".to_string()))
        .await
        .unwrap();
    assert_eq!(cancelled.status, RegistrationStatus::Cancelled);
    assert_eq!(cancelled.cancellation_reason.as_deref(), Some("Family trip"));
    assert_eq!(cancelled.cancelled_at, Some(ctx.now()));
    assert_eq!(ctx.reload_event(event.id).await.registered_count, 0);

    assert_matches!(
        service.cancel(first.id, requester(&student), None).await,
        Err(SchoolEventsError::AlreadyCancelled { .. })
    );

    let again = service.register(event.id, student.id, None).await.unwrap();
    assert_ne!(again.id, first.id);
    assert_ne!(again.ticket_number, first.ticket_number);
    assert_eq!(ctx.reload_event(event.id).await.registered_count, 1);

    // The cancelled row keeps its ticket
    let old = ctx.reload_registration(first.id).await;
    assert_eq!(old.ticket_number, first.ticket_number);
    assert_eq!(old.status, RegistrationStatus::Cancelled);
}

#[tokio::test]
async fn test_cancel_permissions() {
    let ctx = TestContext::new().await;
    let event = ctx.event(Duration::days(2), 30, 0).await;
    let owner = ctx.student("Ada").await;
    let other = ctx.student("Grace").await;
    let admin = ctx.user("Principal", UserRole::Admin).await;
    let registration = ctx.register(&event, &owner).await;
    let service = &ctx.services.registration_service;

    assert_matches!(
        service.cancel(registration.id, requester(&other), None).await,
        Err(SchoolEventsError::Forbidden(_))
    );
    assert_matches!(
        service.cancel(999, requester(&admin), None).await,
        Err(SchoolEventsError::RegistrationNotFound { registration_id: 999 })
    );

    let cancelled = service.cancel(registration.id, requester(&admin), None).await.unwrap();
    assert_eq!(cancelled.status, RegistrationStatus::Cancelled);
}

#[tokio::test]
async fn test_registration_closed_cases() {
    let ctx = TestContext::new().await;
    let service = &ctx.services.registration_service;
    let student = ctx.student("Ada").await;

    assert_matches!(
        service.register(404, student.id, None).await,
        Err(SchoolEventsError::EventNotFound { event_id: 404 })
    );

    let full = ctx.event(Duration::days(1), 1, 0).await;
    ctx.register(&full, &ctx.student("Grace").await).await;
    assert_matches!(
        service.register(full.id, student.id, None).await,
        Err(SchoolEventsError::RegistrationClosed { .. })
    );

    let open = ctx.event(Duration::hours(1), 10, 0).await;
    assert_matches!(
        service.register(open.id, 777, None).await,
        Err(SchoolEventsError::UserNotFound { user_id: 777 })
    );

    ctx.clock.advance(Duration::hours(4));
    assert_matches!(
        service.register(open.id, student.id, None).await,
        Err(SchoolEventsError::RegistrationClosed { .. })
    );
}

#[tokio::test]
async fn test_paid_registration_lifecycle() {
    let ctx = TestContext::new().await;
    let event = ctx.event(Duration::days(2), 30, 1500).await;
    let student = ctx.student("Ada").await;
    let service = &ctx.services.registration_service;

    let pending = ctx.register(&event, &student).await;
    assert_eq!(pending.payment_status, PaymentStatus::Pending);
    assert_eq!(pending.payment_amount_cents, 1500);
    assert!(pending.transaction_id.is_none());

    assert_matches!(
        service.complete_payment(pending.id, requester(&student), card_payment(1000)).await,
        Err(SchoolEventsError::InvalidInput(_))
    );

    let paid = service
        .complete_payment(pending.id, requester(&student), card_payment(1500))
        .await
        .unwrap();
    assert_eq!(paid.payment_status, PaymentStatus::Completed);
    assert_eq!(paid.payment_date, Some(ctx.now()));
    assert!(paid.transaction_id.as_deref().unwrap_or_default().starts_with("TXN-"));

    assert_matches!(
        service.complete_payment(pending.id, requester(&student), card_payment(1500)).await,
        Err(SchoolEventsError::InvalidStateTransition { .. })
    );

    let cancelled = service.cancel(paid.id, requester(&student), None).await.unwrap();
    assert_eq!(cancelled.payment_status, PaymentStatus::Refunded);
}

#[tokio::test]
async fn test_payment_at_registration() {
    let ctx = TestContext::new().await;
    let event = ctx.event(Duration::days(2), 30, 800).await;
    let service = &ctx.services.registration_service;
    let student = ctx.student("Ada").await;

    assert_matches!(
        service.register(event.id, student.id, Some(cash_payment(500))).await,
        Err(SchoolEventsError::InvalidInput(_))
    );
    assert_eq!(ctx.reload_event(event.id).await.registered_count, 0);
    assert!(ctx.store.find_active_registration(event.id, student.id).await.unwrap().is_none());

    let paid = service
        .register(event.id, student.id, Some(cash_payment(800)))
        .await
        .unwrap();
    assert_eq!(paid.payment_status, PaymentStatus::Completed);
    assert_eq!(paid.transaction_id.as_deref(), Some("CASH-0001"));
}

#[tokio::test]
async fn test_cancelled_registration_cannot_be_paid() {
    let ctx = TestContext::new().await;
    let event = ctx.event(Duration::days(2), 30, 800).await;
    let student = ctx.student("Ada").await;
    let service = &ctx.services.registration_service;

    let registration = ctx.register(&event, &student).await;
    service.cancel(registration.id, requester(&student), None).await.unwrap();

    let cancelled = ctx.reload_registration(registration.id).await;
    assert_eq!(cancelled.payment_status, PaymentStatus::Pending);
    assert_matches!(
        service.complete_payment(registration.id, requester(&student), cash_payment(800)).await,
        Err(SchoolEventsError::RegistrationCancelled { .. })
    );
}

#[tokio::test]
async fn test_registration_queries() {
    let ctx = TestContext::new().await;
    let first = ctx.event(Duration::days(1), 30, 0).await;
    let second = ctx.event(Duration::days(2), 30, 0).await;
    let student = ctx.student("Ada").await;
    let other = ctx.student("Grace").await;
    let service = &ctx.services.registration_service;

    let registration = ctx.register(&first, &student).await;
    ctx.register(&second, &student).await;

    let mine = service.my_registrations(requester(&student)).await.unwrap();
    assert_eq!(mine.len(), 2);
    assert!(service.my_registrations(requester(&other)).await.unwrap().is_empty());

    assert_matches!(
        service.get(registration.id, requester(&other)).await,
        Err(SchoolEventsError::Forbidden(_))
    );
    assert_eq!(service.get(registration.id, requester(&ctx.staff)).await.unwrap().id, registration.id);

    assert_matches!(
        service.event_registrations(first.id, requester(&student)).await,
        Err(SchoolEventsError::Forbidden(_))
    );
    assert_eq!(service.event_registrations(first.id, requester(&ctx.staff)).await.unwrap().len(), 1);

    let typed = format!("  {} ", registration.ticket_number.to_lowercase());
    assert_eq!(service.find_by_ticket_number(&typed, requester(&student)).await.unwrap().id, registration.id);
    assert_matches!(
        service.find_by_ticket_number("TICKET-1", requester(&student)).await,
        Err(SchoolEventsError::InvalidTicket)
    );
    assert_matches!(
        service.find_by_ticket_number(&registration.ticket_number, requester(&other)).await,
        Err(SchoolEventsError::Forbidden(_))
    );

    assert!(service.attendance_history(student.id, requester(&student)).await.unwrap().is_empty());
    assert_matches!(
        service.attendance_history(student.id, requester(&other)).await,
        Err(SchoolEventsError::Forbidden(_))
    );
}
