//! In-memory store
//!
//! Keeps every event together with its registrations behind one mutex, so
//! compound writes are serialized per event and never across events. Ticket
//! identifiers live in a global index checked under the partition lock.

use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, RwLock, RwLockReadGuard, RwLockWriteGuard};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tracing::debug;

use crate::database::store::{Attendance, Store};
use crate::models::*;
use crate::utils::errors::{SchoolEventsError, Result};

struct EventPartition {
    event: Event,
    registrations: Vec<Registration>,
}

impl EventPartition {
    fn registration_mut(&mut self, registration_id: i64) -> Option<&mut Registration> {
        self.registrations.iter_mut().find(|r| r.id == registration_id)
    }
}

#[derive(Default)]
struct TicketIndex {
    by_qr_code: HashMap<String, i64>,
    by_ticket_number: HashMap<String, i64>,
    event_of: HashMap<i64, i64>,
}

/// Store used by tests and single-process deployments
#[derive(Default)]
pub struct MemoryStore {
    next_user_id: AtomicI64,
    next_event_id: AtomicI64,
    next_registration_id: AtomicI64,
    users: RwLock<HashMap<i64, User>>,
    events: RwLock<HashMap<i64, Arc<Mutex<EventPartition>>>>,
    index: Mutex<TicketIndex>,
    watermarks: Mutex<HashMap<String, DateTime<Utc>>>,
}

fn lock<T>(mutex: &Mutex<T>) -> Result<MutexGuard<'_, T>> {
    mutex
        .lock()
        .map_err(|_| SchoolEventsError::ServiceUnavailable("memory store lock poisoned".to_string()))
}

fn read<T>(lock: &RwLock<T>) -> Result<RwLockReadGuard<'_, T>> {
    lock.read()
        .map_err(|_| SchoolEventsError::ServiceUnavailable("memory store lock poisoned".to_string()))
}

fn write<T>(lock: &RwLock<T>) -> Result<RwLockWriteGuard<'_, T>> {
    lock.write()
        .map_err(|_| SchoolEventsError::ServiceUnavailable("memory store lock poisoned".to_string()))
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn partition(&self, event_id: i64) -> Result<Option<Arc<Mutex<EventPartition>>>> {
        Ok(read(&self.events)?.get(&event_id).cloned())
    }

    fn partition_of_registration(&self, registration_id: i64) -> Result<Option<Arc<Mutex<EventPartition>>>> {
        let event_id = lock(&self.index)?.event_of.get(&registration_id).copied();
        match event_id {
            Some(event_id) => self.partition(event_id),
            None => Ok(None),
        }
    }

    fn all_events(&self) -> Result<Vec<Event>> {
        let partitions: Vec<_> = read(&self.events)?.values().cloned().collect();
        let mut events = Vec::with_capacity(partitions.len());
        for partition in partitions {
            events.push(lock(&partition)?.event.clone());
        }
        events.sort_by_key(|e| (e.start_date, e.id));
        Ok(events)
    }

    fn registration_by_id(&self, registration_id: i64) -> Result<Option<Registration>> {
        let Some(partition) = self.partition_of_registration(registration_id)? else {
            return Ok(None);
        };
        let partition = lock(&partition)?;
        Ok(partition.registrations.iter().find(|r| r.id == registration_id).cloned())
    }

    /// Run `apply` on one registration under its event lock
    fn update_registration<F>(&self, registration_id: i64, apply: F) -> Result<Option<Registration>>
    where
        F: FnOnce(&mut EventPartition, usize) -> Result<Option<Registration>>,
    {
        let Some(partition) = self.partition_of_registration(registration_id)? else {
            return Ok(None);
        };
        let mut partition = lock(&partition)?;
        let Some(position) = partition.registrations.iter().position(|r| r.id == registration_id) else {
            return Ok(None);
        };
        apply(&mut *partition, position)
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn health_check(&self) -> Result<()> {
        drop(read(&self.users)?);
        drop(read(&self.events)?);
        drop(lock(&self.index)?);
        Ok(())
    }

    async fn create_user(&self, request: CreateUserRequest) -> Result<User> {
        let mut users = write(&self.users)?;
        if users.values().any(|u| u.email.eq_ignore_ascii_case(&request.email)) {
            return Err(SchoolEventsError::InvalidInput(format!("Email {} is already in use", request.email)));
        }

        let now = Utc::now();
        let user = User {
            id: self.next_user_id.fetch_add(1, Ordering::SeqCst) + 1,
            name: request.name,
            email: request.email,
            role: request.role,
            created_at: now,
            updated_at: now,
        };
        users.insert(user.id, user.clone());
        Ok(user)
    }

    async fn find_user(&self, user_id: i64) -> Result<Option<User>> {
        Ok(read(&self.users)?.get(&user_id).cloned())
    }

    async fn create_event(&self, request: CreateEventRequest, now: DateTime<Utc>) -> Result<Event> {
        let status = request.initial_status(now);
        let event = Event {
            id: self.next_event_id.fetch_add(1, Ordering::SeqCst) + 1,
            title: request.title,
            description: request.description,
            category: request.category,
            start_date: request.start_date,
            end_date: request.end_date,
            location: request.location,
            capacity: request.capacity,
            registered_count: 0,
            attended_count: 0,
            price_cents: request.price_cents,
            status,
            registration_deadline: request.registration_deadline,
            requires_registration: request.requires_registration,
            is_published: request.is_published,
            organizer_id: request.organizer_id,
            created_at: now,
            updated_at: now,
        };

        write(&self.events)?.insert(
            event.id,
            Arc::new(Mutex::new(EventPartition { event: event.clone(), registrations: Vec::new() })),
        );
        Ok(event)
    }

    async fn find_event(&self, event_id: i64) -> Result<Option<Event>> {
        match self.partition(event_id)? {
            Some(partition) => Ok(Some(lock(&partition)?.event.clone())),
            None => Ok(None),
        }
    }

    async fn update_event_details(&self, event: &Event) -> Result<Event> {
        let partition = self
            .partition(event.id)?
            .ok_or(SchoolEventsError::EventNotFound { event_id: event.id })?;
        let mut partition = lock(&partition)?;
        let stored = &mut partition.event;

        if event.capacity < stored.registered_count {
            return Err(SchoolEventsError::InvalidInput(
                "Capacity cannot drop below the existing registrations".to_string(),
            ));
        }

        stored.title = event.title.clone();
        stored.description = event.description.clone();
        stored.category = event.category;
        stored.start_date = event.start_date;
        stored.end_date = event.end_date;
        stored.location = event.location.clone();
        stored.capacity = event.capacity;
        stored.price_cents = event.price_cents;
        if stored.status != EventStatus::Cancelled {
            stored.status = event.status;
        }
        stored.registration_deadline = event.registration_deadline;
        stored.requires_registration = event.requires_registration;
        stored.is_published = event.is_published;
        stored.updated_at = event.updated_at;
        Ok(stored.clone())
    }

    async fn transition_event_status(&self, event_id: i64, expected: EventStatus, next: EventStatus) -> Result<bool> {
        let Some(partition) = self.partition(event_id)? else {
            return Ok(false);
        };
        let mut partition = lock(&partition)?;
        let event = &mut partition.event;
        if event.status != expected || event.status == EventStatus::Cancelled {
            return Ok(false);
        }
        event.status = next;
        event.updated_at = Utc::now();
        Ok(true)
    }

    async fn cancel_event(&self, event_id: i64, now: DateTime<Utc>) -> Result<Option<Event>> {
        let Some(partition) = self.partition(event_id)? else {
            return Ok(None);
        };
        let mut partition = lock(&partition)?;
        if partition.event.status == EventStatus::Cancelled {
            return Ok(None);
        }
        partition.event.status = EventStatus::Cancelled;
        partition.event.updated_at = now;
        Ok(Some(partition.event.clone()))
    }

    async fn delete_event(&self, event_id: i64) -> Result<bool> {
        let Some(partition) = write(&self.events)?.remove(&event_id) else {
            return Ok(false);
        };
        let partition = lock(&partition)?;
        let mut index = lock(&self.index)?;
        for registration in &partition.registrations {
            index.by_qr_code.remove(&registration.qr_code);
            index.by_ticket_number.remove(&registration.ticket_number);
            index.event_of.remove(&registration.id);
        }
        debug!(event_id, removed = partition.registrations.len(), "Deleted event with its registrations");
        Ok(true)
    }

    async fn list_events(&self, limit: i64, offset: i64) -> Result<Vec<Event>> {
        let events = self.all_events()?;
        Ok(events
            .into_iter()
            .skip(offset.max(0) as usize)
            .take(limit.max(0) as usize)
            .collect())
    }

    async fn list_non_cancelled_events(&self) -> Result<Vec<Event>> {
        let mut events = self.all_events()?;
        events.retain(|e| e.status != EventStatus::Cancelled);
        Ok(events)
    }

    async fn list_events_starting_between(&self, from: DateTime<Utc>, to: DateTime<Utc>) -> Result<Vec<Event>> {
        let mut events = self.all_events()?;
        events.retain(|e| e.status != EventStatus::Cancelled && e.start_date >= from && e.start_date < to);
        Ok(events)
    }

    async fn list_events_ended_between(&self, from: DateTime<Utc>, to: DateTime<Utc>) -> Result<Vec<Event>> {
        let mut events = self.all_events()?;
        events.retain(|e| e.status != EventStatus::Cancelled && e.end_date >= from && e.end_date < to);
        events.sort_by_key(|e| (e.end_date, e.id));
        Ok(events)
    }

    async fn list_ended_events_with_open_registrations(&self, before: DateTime<Utc>) -> Result<Vec<Event>> {
        let partitions: Vec<_> = read(&self.events)?.values().cloned().collect();
        let mut events = Vec::new();
        for partition in partitions {
            let partition = lock(&partition)?;
            let event = &partition.event;
            if event.status == EventStatus::Cancelled || event.end_date >= before {
                continue;
            }
            if partition.registrations.iter().any(|r| r.status == RegistrationStatus::Registered) {
                events.push(event.clone());
            }
        }
        events.sort_by_key(|e| (e.end_date, e.id));
        Ok(events)
    }

    async fn insert_registration(&self, registration: NewRegistration) -> Result<Registration> {
        let event_id = registration.event_id;
        let partition = self
            .partition(event_id)?
            .ok_or(SchoolEventsError::EventNotFound { event_id })?;
        let mut partition = lock(&partition)?;

        if partition.event.status == EventStatus::Cancelled || partition.event.is_full() {
            return Err(SchoolEventsError::CapacityExceeded { event_id, capacity: partition.event.capacity });
        }

        if partition
            .registrations
            .iter()
            .any(|r| r.user_id == registration.user_id && r.is_active())
        {
            return Err(SchoolEventsError::AlreadyRegistered { event_id, user_id: registration.user_id });
        }

        let mut index = lock(&self.index)?;
        if index.by_qr_code.contains_key(&registration.qr_code)
            || index.by_ticket_number.contains_key(&registration.ticket_number)
        {
            return Err(SchoolEventsError::TicketCollision);
        }

        let id = self.next_registration_id.fetch_add(1, Ordering::SeqCst) + 1;
        let registered_at = registration.registered_at;
        let inserted = registration.into_registration(id);

        index.by_qr_code.insert(inserted.qr_code.clone(), id);
        index.by_ticket_number.insert(inserted.ticket_number.clone(), id);
        index.event_of.insert(id, event_id);

        partition.event.registered_count += 1;
        partition.event.updated_at = registered_at;
        partition.registrations.push(inserted.clone());
        Ok(inserted)
    }

    async fn find_registration(&self, registration_id: i64) -> Result<Option<Registration>> {
        self.registration_by_id(registration_id)
    }

    async fn find_registration_by_qr_code(&self, qr_code: &str) -> Result<Option<Registration>> {
        let id = lock(&self.index)?.by_qr_code.get(qr_code).copied();
        match id {
            Some(id) => self.registration_by_id(id),
            None => Ok(None),
        }
    }

    async fn find_registration_by_ticket_number(&self, ticket_number: &str) -> Result<Option<Registration>> {
        let id = lock(&self.index)?.by_ticket_number.get(ticket_number).copied();
        match id {
            Some(id) => self.registration_by_id(id),
            None => Ok(None),
        }
    }

    async fn find_active_registration(&self, event_id: i64, user_id: i64) -> Result<Option<Registration>> {
        let Some(partition) = self.partition(event_id)? else {
            return Ok(None);
        };
        let partition = lock(&partition)?;
        Ok(partition
            .registrations
            .iter()
            .find(|r| r.user_id == user_id && r.is_active())
            .cloned())
    }

    async fn list_event_registrations(&self, event_id: i64) -> Result<Vec<Registration>> {
        let Some(partition) = self.partition(event_id)? else {
            return Ok(Vec::new());
        };
        let mut registrations = lock(&partition)?.registrations.clone();
        registrations.sort_by_key(|r| (r.registered_at, r.id));
        Ok(registrations)
    }

    async fn list_user_registrations(&self, user_id: i64) -> Result<Vec<Registration>> {
        let partitions: Vec<_> = read(&self.events)?.values().cloned().collect();
        let mut registrations = Vec::new();
        for partition in partitions {
            let partition = lock(&partition)?;
            registrations.extend(partition.registrations.iter().filter(|r| r.user_id == user_id).cloned());
        }
        registrations.sort_by(|a, b| b.registered_at.cmp(&a.registered_at).then(b.id.cmp(&a.id)));
        Ok(registrations)
    }

    async fn cancel_registration(
        &self,
        registration_id: i64,
        reason: Option<String>,
        now: DateTime<Utc>,
    ) -> Result<Option<Registration>> {
        self.update_registration(registration_id, |partition, position| {
            let current = &partition.registrations[position];
            if current.status != RegistrationStatus::Registered {
                return Ok(None);
            }
            let cancelled = current.cancelled(reason, now)?;
            partition.registrations[position] = cancelled.clone();
            partition.event.registered_count = (partition.event.registered_count - 1).max(0);
            partition.event.updated_at = now;
            Ok(Some(cancelled))
        })
    }

    async fn mark_attended(
        &self,
        registration_id: i64,
        method: CheckInMethod,
        now: DateTime<Utc>,
    ) -> Result<Option<Attendance>> {
        let Some(partition) = self.partition_of_registration(registration_id)? else {
            return Ok(None);
        };
        let mut partition = lock(&partition)?;
        let Some(position) = partition.registrations.iter().position(|r| r.id == registration_id) else {
            return Ok(None);
        };

        let current = &partition.registrations[position];
        if current.status != RegistrationStatus::Registered || current.payment_status == PaymentStatus::Pending {
            return Ok(None);
        }
        let attended = current.attended(method, now)?;
        partition.registrations[position] = attended.clone();
        partition.event.attended_count += 1;
        partition.event.updated_at = now;

        Ok(Some(Attendance { registration: attended, attended_count: partition.event.attended_count }))
    }

    async fn complete_payment(
        &self,
        registration_id: i64,
        payment: &AcceptedPayment,
        now: DateTime<Utc>,
    ) -> Result<Option<Registration>> {
        self.update_registration(registration_id, |partition, position| {
            let current = &partition.registrations[position];
            if current.payment_status != PaymentStatus::Pending {
                return Ok(None);
            }
            let paid = current.paid(payment, now)?;
            partition.registrations[position] = paid.clone();
            Ok(Some(paid))
        })
    }

    async fn list_pending_reminders(&self, event_id: i64) -> Result<Vec<Registration>> {
        let Some(partition) = self.partition(event_id)? else {
            return Ok(Vec::new());
        };
        let partition = lock(&partition)?;
        let mut pending: Vec<_> = partition
            .registrations
            .iter()
            .filter(|r| r.status == RegistrationStatus::Registered && !r.reminder_sent)
            .cloned()
            .collect();
        pending.sort_by_key(|r| (r.registered_at, r.id));
        Ok(pending)
    }

    async fn mark_reminder_sent(&self, registration_id: i64, now: DateTime<Utc>) -> Result<bool> {
        let Some(partition) = self.partition_of_registration(registration_id)? else {
            return Ok(false);
        };
        let mut partition = lock(&partition)?;
        match partition.registration_mut(registration_id) {
            Some(registration) if !registration.reminder_sent => {
                registration.reminder_sent = true;
                registration.reminder_sent_at = Some(now);
                registration.updated_at = now;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn mark_no_shows(&self, event_id: i64, now: DateTime<Utc>) -> Result<u64> {
        let Some(partition) = self.partition(event_id)? else {
            return Ok(0);
        };
        let mut partition = lock(&partition)?;
        let mut moved = 0;
        for registration in partition.registrations.iter_mut() {
            if registration.status == RegistrationStatus::Registered {
                *registration = registration.no_show(now)?;
                moved += 1;
            }
        }
        Ok(moved)
    }

    async fn registration_stats(&self, event_id: i64) -> Result<RegistrationStats> {
        let Some(partition) = self.partition(event_id)? else {
            return Ok(RegistrationStats::default());
        };
        let partition = lock(&partition)?;
        let mut stats = RegistrationStats::default();
        for registration in &partition.registrations {
            stats.total += 1;
            match registration.status {
                RegistrationStatus::Registered => stats.registered += 1,
                RegistrationStatus::Attended => stats.attended += 1,
                RegistrationStatus::Cancelled => stats.cancelled += 1,
                RegistrationStatus::NoShow => stats.no_show += 1,
            }
        }
        Ok(stats)
    }

    async fn load_watermark(&self, job_name: &str) -> Result<Option<DateTime<Utc>>> {
        Ok(lock(&self.watermarks)?.get(job_name).copied())
    }

    async fn save_watermark(&self, job_name: &str, at: DateTime<Utc>) -> Result<()> {
        let mut watermarks = lock(&self.watermarks)?;
        let entry = watermarks.entry(job_name.to_string()).or_insert(at);
        if at > *entry {
            *entry = at;
        }
        Ok(())
    }
}
