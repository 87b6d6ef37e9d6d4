//! Scheduled sweeps
//!
//! Each sweep is a plain async function of the store, the dispatcher and the
//! current time. They are safe to run alongside live traffic and to re-run after
//! a crash: every write is conditional, so a repeated run only finds less to do.
//! A failure on one event or registration is logged and the sweep moves on.

use chrono::{DateTime, Utc};
use serde_json::json;
use tracing::{debug, info};

use crate::config::SchedulerConfig;
use crate::database::{Store, NO_SHOW_SWEEP};
use crate::models::{derive_status, Event, EventStatus, Registration};
use crate::services::notification::{event_topic, Dispatcher, Notification, NotificationType};
use crate::utils::errors::{SchoolEventsError, Result};
use crate::utils::helpers::next_local_day_window;
use crate::utils::logging::{log_sweep_entity_failure, log_sweep_result};

/// The sweeps the scheduler knows how to run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Sweep {
    Status,
    Reminder,
    NoShow,
}

impl Sweep {
    pub fn name(&self) -> &'static str {
        match self {
            Sweep::Status => "status_sweep",
            Sweep::Reminder => "reminder_sweep",
            Sweep::NoShow => NO_SHOW_SWEEP,
        }
    }
}

/// Outcome of one sweep run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    /// Entities looked at: events for the status and no-show sweeps, registrations for reminders
    pub examined: usize,
    /// Writes that took effect
    pub updated: usize,
    pub failed: usize,
}

/// Run one sweep by name
pub async fn run_sweep(
    sweep: Sweep,
    store: &dyn Store,
    dispatcher: &Dispatcher,
    now: DateTime<Utc>,
    config: &SchedulerConfig,
) -> Result<SweepReport> {
    match sweep {
        Sweep::Status => run_status_sweep(store, dispatcher, now).await,
        Sweep::Reminder => run_reminder_sweep(store, dispatcher, now, config).await,
        Sweep::NoShow => run_no_show_sweep(store, now, config).await,
    }
}

/// Re-derive the status of every non-cancelled event and persist the ones that changed
pub async fn run_status_sweep(store: &dyn Store, dispatcher: &Dispatcher, now: DateTime<Utc>) -> Result<SweepReport> {
    let sweep = Sweep::Status.name();
    let events = store.list_non_cancelled_events().await?;
    let mut report = SweepReport::default();

    for event in events {
        report.examined += 1;

        let next = derive_status(now, &event);
        if next == event.status {
            continue;
        }

        match store.transition_event_status(event.id, event.status, next).await {
            Ok(true) => {
                report.updated += 1;
                debug!(event_id = event.id, from = %event.status, to = %next, "Event status advanced");
                dispatcher.broadcast(
                    event_topic(event.id),
                    json!({ "type": "event:status", "event_id": event.id, "status": next }),
                );
            }
            Ok(false) => {
                debug!(event_id = event.id, "Event status changed concurrently, skipping");
            }
            Err(e) => {
                report.failed += 1;
                log_sweep_entity_failure(sweep, "event", event.id, &e);
            }
        }
    }

    log_sweep_result(sweep, report.examined, report.updated, report.failed);
    Ok(report)
}

/// Remind registrants of events starting during the next local calendar day.
///
/// The reminder flag is set only after the notifier acknowledged the send. A
/// crash in between can cause one duplicate reminder, never a missing one, and
/// a flagged registration is never offered to the notifier again.
pub async fn run_reminder_sweep(
    store: &dyn Store,
    dispatcher: &Dispatcher,
    now: DateTime<Utc>,
    config: &SchedulerConfig,
) -> Result<SweepReport> {
    let sweep = Sweep::Reminder.name();
    let (from, to) = next_local_day_window(now, config.local_offset());
    let events = store.list_events_starting_between(from, to).await?;
    let mut report = SweepReport::default();

    info!(from = %from, to = %to, events = events.len(), "Sending event reminders");

    for event in events {
        if event.status == EventStatus::Cancelled {
            continue;
        }

        let pending = match store.list_pending_reminders(event.id).await {
            Ok(pending) => pending,
            Err(e) => {
                report.failed += 1;
                log_sweep_entity_failure(sweep, "event", event.id, &e);
                continue;
            }
        };

        for registration in pending {
            report.examined += 1;
            match remind(store, dispatcher, &event, &registration, now).await {
                Ok(true) => report.updated += 1,
                Ok(false) => {}
                Err(e) => {
                    report.failed += 1;
                    log_sweep_entity_failure(sweep, "registration", registration.id, &e);
                }
            }
        }
    }

    log_sweep_result(sweep, report.examined, report.updated, report.failed);
    Ok(report)
}

async fn remind(
    store: &dyn Store,
    dispatcher: &Dispatcher,
    event: &Event,
    registration: &Registration,
    now: DateTime<Utc>,
) -> Result<bool> {
    let user = store
        .find_user(registration.user_id)
        .await?
        .ok_or(SchoolEventsError::UserNotFound { user_id: registration.user_id })?;

    dispatcher.send_reminder(&user, event).await?;

    let flagged = store.mark_reminder_sent(registration.id, now).await?;
    if flagged {
        dispatcher.notify(Notification::from_template(user.id, NotificationType::EventReminder, event));
    } else {
        debug!(registration_id = registration.id, "Reminder flag already set by a concurrent run");
    }
    Ok(flagged)
}

/// Move registrations still `registered` on completed events to `no-show`.
///
/// Covers events that ended in `[watermark - no_show_lookback, now)`.
/// The first run, with no watermark yet, instead catches up on every ended
/// event that still holds `registered` rows. The watermark only advances when
/// every event in the window was processed, so downtime or a failed event
/// widens the next window instead of skipping it.
pub async fn run_no_show_sweep(store: &dyn Store, now: DateTime<Utc>, config: &SchedulerConfig) -> Result<SweepReport> {
    let sweep = Sweep::NoShow.name();
    let events = match store.load_watermark(sweep).await? {
        Some(watermark) => {
            store.list_events_ended_between(watermark.min(now) - config.no_show_lookback(), now).await?
        }
        None => {
            info!("No previous no-show sweep recorded, catching up on every ended event");
            store.list_ended_events_with_open_registrations(now).await?
        }
    };

    let mut report = SweepReport::default();

    for event in events {
        if derive_status(now, &event) != EventStatus::Completed {
            continue;
        }
        report.examined += 1;

        match store.mark_no_shows(event.id, now).await {
            Ok(moved) => {
                report.updated += moved as usize;
                if moved > 0 {
                    info!(event_id = event.id, no_shows = moved, "Registrations marked no-show");
                }
            }
            Err(e) => {
                report.failed += 1;
                log_sweep_entity_failure(sweep, "event", event.id, &e);
            }
        }
    }

    if report.failed == 0 {
        store.save_watermark(sweep, now).await?;
    }

    log_sweep_result(sweep, report.examined, report.updated, report.failed);
    Ok(report)
}
