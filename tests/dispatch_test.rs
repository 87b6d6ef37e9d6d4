//! Dispatcher tests: fire-and-forget sends and realtime fan-out

mod helpers;

use chrono::Duration;
use helpers::*;
use SchoolEvents::services::{
    notification::{event_topic, user_topic},
    Notification, NotificationType,
};

#[tokio::test]
async fn test_dispatcher_swallows_failures() {
    let ctx = TestContext::new().await;
    let event = ctx.event(Duration::days(1), 50, 0).await;
    let student = ctx.student("Ada").await;
    ctx.settle().await;

    ctx.notifier.set_failing(true);
    ctx.dispatcher
        .notify(Notification::from_template(student.id, NotificationType::System, &event));
    ctx.dispatcher.broadcast_count(&event);
    ctx.settle().await;

    assert!(ctx.notifier.notifications_of(NotificationType::System).is_empty());
    assert!(ctx.broadcaster.on_topic(&user_topic(student.id)).is_empty());
    let counts = ctx.broadcaster.on_topic(&event_topic(event.id));
    assert_eq!(counts.len(), 1);
    assert_eq!(counts[0]["registered_count"], 0);
    assert_eq!(counts[0]["available_slots"], 50);
}

#[tokio::test]
async fn test_notification_is_pushed_to_user_topic() {
    let ctx = TestContext::new().await;
    let event = ctx.event(Duration::days(1), 50, 0).await;
    let student = ctx.student("Ada").await;

    ctx.dispatcher
        .notify(Notification::from_template(student.id, NotificationType::EventReminder, &event));
    ctx.settle().await;

    assert_eq!(ctx.notifier.notifications_of(NotificationType::EventReminder).len(), 1);
    let pushed = ctx.broadcaster.on_topic(&user_topic(student.id));
    assert_eq!(pushed.len(), 1);
    assert_eq!(pushed[0]["notification"]["notification_type"], "event_reminder");
}
