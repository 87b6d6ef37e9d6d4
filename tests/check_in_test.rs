//! Ticket check-in tests

mod helpers;

use assert_matches::assert_matches;
use chrono::Duration;
use helpers::*;
use SchoolEvents::{
    models::{CheckInMethod, RegistrationStatus, UserRole},
    services::notification::ATTENDANCE_TOPIC,
    SchoolEventsError,
};

#[tokio::test]
async fn test_qr_check_in() {
    let ctx = TestContext::new().await;
    let event = ctx.event(Duration::hours(1), 30, 0).await;
    let student = ctx.student("Ada").await;
    let registration = ctx.register(&event, &student).await;
    let service = &ctx.services.check_in_service;

    ctx.clock.advance(Duration::minutes(70));
    let result = service.check_in(&registration.qr_code, requester(&ctx.staff)).await.unwrap();

    assert_eq!(result.registration_id, registration.id);
    assert_eq!(result.check_in_method, CheckInMethod::Qr);
    assert_eq!(result.attended_at, ctx.now());
    assert_eq!(result.ticket.ticket_number, registration.ticket_number);
    assert_eq!(result.user.as_ref().map(|u| u.id), Some(student.id));
    assert_eq!(result.event_title, event.title);

    let stored = ctx.reload_registration(registration.id).await;
    assert_eq!(stored.status, RegistrationStatus::Attended);
    assert_eq!(stored.check_in_method, Some(CheckInMethod::Qr));

    let event = ctx.reload_event(event.id).await;
    assert_eq!(event.attended_count, 1);
    assert_eq!(event.registered_count, 1);

    ctx.settle().await;
    let broadcasts = ctx.broadcaster.on_topic(ATTENDANCE_TOPIC);
    assert_eq!(broadcasts.len(), 1);
    assert_eq!(broadcasts[0]["registration_id"], registration.id);
    assert_eq!(broadcasts[0]["attended_count"], 1);

    let history = ctx
        .services
        .registration_service
        .attendance_history(student.id, requester(&student))
        .await
        .unwrap();
    assert_eq!(history.len(), 1);
}

#[tokio::test]
async fn test_second_scan_is_rejected() {
    let ctx = TestContext::new().await;
    let event = ctx.event(Duration::hours(1), 30, 0).await;
    let registration = ctx.register(&event, &ctx.student("Ada").await).await;
    let service = &ctx.services.check_in_service;

    let first = service.check_in(&registration.qr_code, requester(&ctx.staff)).await.unwrap();
    ctx.clock.advance(Duration::minutes(5));

    assert_matches!(
        service.check_in(&registration.qr_code, requester(&ctx.staff)).await,
        Err(SchoolEventsError::AlreadyCheckedIn { attended_at: Some(at) }) if at == first.attended_at
    );
    assert_eq!(ctx.reload_event(event.id).await.attended_count, 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_scans_count_once() {
    let ctx = TestContext::new().await;
    let event = ctx.event(Duration::hours(1), 30, 0).await;
    let registration = ctx.register(&event, &ctx.student("Ada").await).await;
    let staff = requester(&ctx.staff);

    let tasks: Vec<_> = (0..8)
        .map(|_| {
            let service = ctx.services.check_in_service.clone();
            let qr_code = registration.qr_code.clone();
            tokio::spawn(async move { service.check_in(&qr_code, staff).await })
        })
        .collect();

    let results: Vec<_> = futures::future::join_all(tasks)
        .await
        .into_iter()
        .map(|joined| joined.expect("Check-in task panicked"))
        .collect();

    assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
    for rejected in results.iter().filter_map(|r| r.as_ref().err()) {
        assert_matches!(rejected, SchoolEventsError::AlreadyCheckedIn { .. });
    }
    assert_eq!(ctx.reload_event(event.id).await.attended_count, 1);

    ctx.settle().await;
    let broadcasts = ctx.broadcaster.on_topic(ATTENDANCE_TOPIC);
    assert_eq!(broadcasts.len(), 1);
    assert_eq!(broadcasts[0]["attended_count"], 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_check_ins_broadcast_distinct_counts() {
    let ctx = TestContext::new().await;
    let event = ctx.event(Duration::hours(1), 30, 0).await;
    let staff = requester(&ctx.staff);

    let mut tickets = Vec::new();
    for i in 0..6 {
        tickets.push(ctx.register(&event, &ctx.student(&format!("Student {}", i)).await).await.qr_code);
    }

    let tasks: Vec<_> = tickets
        .into_iter()
        .map(|qr_code| {
            let service = ctx.services.check_in_service.clone();
            tokio::spawn(async move { service.check_in(&qr_code, staff).await })
        })
        .collect();

    for joined in futures::future::join_all(tasks).await {
        joined.expect("Check-in task panicked").unwrap();
    }

    ctx.settle().await;
    let mut counts: Vec<i64> = ctx
        .broadcaster
        .on_topic(ATTENDANCE_TOPIC)
        .iter()
        .map(|m| m["attended_count"].as_i64().unwrap())
        .collect();
    counts.sort_unstable();
    assert_eq!(counts, vec![1, 2, 3, 4, 5, 6]);
    assert_eq!(ctx.reload_event(event.id).await.attended_count, 6);
}

#[tokio::test]
async fn test_pending_payment_blocks_check_in() {
    let ctx = TestContext::new().await;
    let event = ctx.event(Duration::hours(1), 30, 1200).await;
    let student = ctx.student("Ada").await;
    let registration = ctx.register(&event, &student).await;
    let service = &ctx.services.check_in_service;

    assert_matches!(
        service.check_in(&registration.qr_code, requester(&ctx.staff)).await,
        Err(SchoolEventsError::PaymentRequired { amount_cents: 1200 })
    );
    assert_eq!(ctx.reload_registration(registration.id).await.status, RegistrationStatus::Registered);

    ctx.services
        .registration_service
        .complete_payment(registration.id, requester(&student), cash_payment(1200))
        .await
        .unwrap();

    let result = service.check_in(&registration.qr_code, requester(&ctx.staff)).await.unwrap();
    assert_eq!(result.registration_id, registration.id);
}

#[tokio::test]
async fn test_rejections() {
    let ctx = TestContext::new().await;
    let event = ctx.event(Duration::hours(1), 30, 0).await;
    let student = ctx.student("Ada").await;
    let registration = ctx.register(&event, &student).await;
    let cancelled = ctx.register(&event, &ctx.student("Grace").await).await;
    let service = &ctx.services.check_in_service;

    assert_matches!(
        service.check_in(&registration.qr_code, requester(&student)).await,
        Err(SchoolEventsError::Forbidden(_))
    );
    assert_matches!(
        service.check_in("not-a-real-code", requester(&ctx.staff)).await,
        Err(SchoolEventsError::InvalidTicket)
    );

    ctx.services
        .registration_service
        .cancel(cancelled.id, requester(&ctx.user("Principal", UserRole::Admin).await), None)
        .await
        .unwrap();
    assert_matches!(
        service.check_in(&cancelled.qr_code, requester(&ctx.staff)).await,
        Err(SchoolEventsError::RegistrationCancelled { cancelled_at: Some(_) })
    );

    // One second past the end of the event
    ctx.clock.advance(Duration::hours(3) + Duration::seconds(1));
    assert_matches!(
        service.check_in(&registration.qr_code, requester(&ctx.staff)).await,
        Err(SchoolEventsError::TicketExpired { .. })
    );
    assert_eq!(ctx.reload_event(event.id).await.attended_count, 0);
}

#[tokio::test]
async fn test_check_in_at_exact_end_is_accepted() {
    let ctx = TestContext::new().await;
    let event = ctx.event(Duration::hours(1), 30, 0).await;
    let registration = ctx.register(&event, &ctx.student("Ada").await).await;

    ctx.clock.set(event.end_date);
    let result = ctx
        .services
        .check_in_service
        .check_in(&registration.qr_code, requester(&ctx.staff))
        .await
        .unwrap();
    assert_eq!(result.attended_at, event.end_date);
}

#[tokio::test]
async fn test_manual_check_in() {
    let ctx = TestContext::new().await;
    let event = ctx.event(Duration::hours(1), 30, 0).await;
    let registration = ctx.register(&event, &ctx.student("Ada").await).await;
    let service = &ctx.services.check_in_service;

    assert_matches!(
        service.manual_check_in(9_999, requester(&ctx.staff)).await,
        Err(SchoolEventsError::RegistrationNotFound { registration_id: 9_999 })
    );

    let result = service.manual_check_in(registration.id, requester(&ctx.staff)).await.unwrap();
    assert_eq!(result.check_in_method, CheckInMethod::Manual);
    assert_eq!(
        ctx.reload_registration(registration.id).await.check_in_method,
        Some(CheckInMethod::Manual)
    );
}

#[tokio::test]
async fn test_verify_ticket_is_read_only() {
    let ctx = TestContext::new().await;
    let event = ctx.event(Duration::hours(1), 30, 500).await;
    let student = ctx.student("Ada").await;
    let registration = ctx.register(&event, &student).await;
    let service = &ctx.services.check_in_service;

    let report = service.verify_ticket(&registration.qr_code, requester(&ctx.staff)).await.unwrap();
    assert!(!report.valid);
    assert_eq!(report.reason.as_deref(), Some("Payment required"));
    assert_eq!(report.event_start, event.start_date);
    assert_eq!(report.user.map(|u| u.id), Some(student.id));

    ctx.services
        .registration_service
        .complete_payment(registration.id, requester(&student), card_payment(500))
        .await
        .unwrap();

    let report = service.verify_ticket(&registration.qr_code, requester(&ctx.staff)).await.unwrap();
    assert!(report.valid);
    assert!(report.reason.is_none());

    let stored = ctx.reload_registration(registration.id).await;
    assert_eq!(stored.status, RegistrationStatus::Registered);
    assert_eq!(ctx.reload_event(event.id).await.attended_count, 0);
}
