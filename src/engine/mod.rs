mod availability;
mod conflict;
mod error;
mod lifecycle;
mod queries;

pub use availability::{determine_status, free_slots, month_days, summarize_day, time_conflicts};
pub use conflict::{now_ms, validate_range};
pub use error::EngineError;
pub use lifecycle::{BookingChanges, BookingEdit, NewBooking, VenueChanges};
pub use queries::{BookingFilter, BookingOrder};

use std::collections::HashMap;
use std::io;
use std::path::PathBuf;
use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::{OwnedRwLockWriteGuard, RwLock, mpsc, oneshot};
use ulid::Ulid;

use crate::model::*;
use crate::notify::NotifyHub;
use crate::timeslot::TimeRange;
use crate::wal::Wal;

pub type SharedDaySchedule = Arc<RwLock<DaySchedule>>;

/// Attempts to pin a booking's day before giving up; a booking only moves
/// between days when its date is edited, so contention here is rare.
const RESOLVE_ATTEMPTS: usize = 8;

// ── Group-commit WAL channel ─────────────────────────────

pub(super) enum WalCommand {
    Append {
        event: Event,
        response: oneshot::Sender<io::Result<()>>,
    },
    Compact {
        events: Vec<Event>,
        response: oneshot::Sender<io::Result<()>>,
    },
    AppendsSinceCompact {
        response: oneshot::Sender<u64>,
    },
}

/// Background task that owns the WAL and batches appends for group commit.
/// 1. Block until the first Append arrives.
/// 2. Buffer it (no fsync).
/// 3. Drain all immediately available Appends (the batch window).
/// 4. Single flush_sync for the whole batch.
/// 5. Respond to all senders.
async fn wal_writer_loop(mut wal: Wal, mut rx: mpsc::Receiver<WalCommand>) {
    while let Some(cmd) = rx.recv().await {
        match cmd {
            WalCommand::Append { event, response } => {
                let mut batch = vec![(event, response)];
                let mut deferred = None;

                loop {
                    match rx.try_recv() {
                        Ok(WalCommand::Append { event, response }) => batch.push((event, response)),
                        Ok(other) => {
                            deferred = Some(other);
                            break;
                        }
                        Err(_) => break,
                    }
                }

                commit_batch(&mut wal, &mut batch);
                if let Some(other) = deferred {
                    handle_non_append(&mut wal, other);
                }
            }
            other => handle_non_append(&mut wal, other),
        }
    }
    tracing::debug!("WAL writer for {} stopped", wal.path().display());
}

fn commit_batch(wal: &mut Wal, batch: &mut Vec<(Event, oneshot::Sender<io::Result<()>>)>) {
    metrics::histogram!(crate::observability::WAL_FLUSH_BATCH_SIZE).record(batch.len() as f64);
    let flush_start = std::time::Instant::now();
    let result = flush_batch(wal, batch);
    metrics::histogram!(crate::observability::WAL_FLUSH_DURATION_SECONDS)
        .record(flush_start.elapsed().as_secs_f64());
    if let Err(e) = &result {
        tracing::error!("WAL flush of {} events failed: {e}", batch.len());
    }
    for (_, tx) in batch.drain(..) {
        let r = match &result {
            Ok(()) => Ok(()),
            Err(e) => Err(io::Error::new(e.kind(), e.to_string())),
        };
        let _ = tx.send(r);
    }
}

fn flush_batch(wal: &mut Wal, batch: &[(Event, oneshot::Sender<io::Result<()>>)]) -> io::Result<()> {
    let mut append_err: Option<io::Error> = None;
    for (event, _) in batch {
        if let Err(e) = wal.append_buffered(event) {
            append_err = Some(e);
            break;
        }
    }
    // Flush even after an append error so half-buffered bytes don't leak into
    // the next batch.
    let flush_err = wal.flush_sync().err();
    match (append_err, flush_err) {
        (Some(e), _) | (None, Some(e)) => Err(e),
        (None, None) => Ok(()),
    }
}

fn handle_non_append(wal: &mut Wal, cmd: WalCommand) {
    match cmd {
        WalCommand::Compact { events, response } => {
            let result = Wal::write_compact_file(wal.path(), &events)
                .and_then(|()| wal.swap_compact_file());
            let _ = response.send(result);
        }
        WalCommand::AppendsSinceCompact { response } => {
            let _ = response.send(wal.appends_since_compact());
        }
        WalCommand::Append { .. } => unreachable!("appends are batched by the writer loop"),
    }
}

/// Booking store and venue directory.
///
/// Bookings are grouped per (venue, date) behind their own lock, so the
/// availability check and the insert that follows it happen under one write
/// lock while other venue-days proceed independently.
pub struct Engine {
    pub(super) venues: DashMap<Ulid, Venue>,
    pub(super) days: DashMap<DayKey, SharedDaySchedule>,
    /// Reverse lookup: booking id → the day it currently lives in.
    pub(super) booking_index: DashMap<Ulid, DayKey>,
    pub(super) wal_tx: mpsc::Sender<WalCommand>,
    /// Mutations hold this shared; compaction holds it exclusively so its
    /// snapshot never misses an in-flight write.
    pub(super) write_gate: RwLock<()>,
    pub notify: Arc<NotifyHub>,
    pub(super) business_hours: TimeRange,
}

/// Apply a booking event to one day's schedule (caller holds the lock).
/// A `BookingUpdated` is applied to both its old and its new day.
fn apply_to_day(day: &mut DaySchedule, event: &Event, index: &DashMap<Ulid, DayKey>) {
    match event {
        Event::BookingCreated { booking } => {
            day.insert_booking(booking.clone());
            index.insert(booking.id, day.key);
        }
        Event::BookingUpdated { booking, .. } => {
            day.remove_booking(booking.id);
            if booking.day() == day.key {
                day.insert_booking(booking.clone());
                index.insert(booking.id, day.key);
            }
        }
        Event::BookingStatusChanged { id, status, at, .. } => {
            if let Some(b) = day.get_mut(*id) {
                b.status = *status;
                b.updated_at = *at;
                if *status == BookingStatus::Approved {
                    b.approved_at = Some(*at);
                }
            }
        }
        Event::BookingDeleted { id, .. } => {
            day.remove_booking(*id);
            index.remove(id);
        }
        Event::PaymentRecorded {
            id,
            method,
            transaction_id,
            at,
            ..
        } => {
            if let Some(b) = day.get_mut(*id) {
                b.payment_status = PaymentStatus::Paid;
                b.payment_method = Some(*method);
                b.transaction_id = transaction_id.clone();
                b.paid_at = Some(*at);
                b.status = BookingStatus::Confirmed;
                b.updated_at = *at;
            }
        }
        Event::PaymentRefunded { id, at, .. } => {
            if let Some(b) = day.get_mut(*id) {
                b.payment_status = PaymentStatus::Refunded;
                b.status = BookingStatus::Cancelled;
                b.updated_at = *at;
            }
        }
        // Venue records live in the directory map, not in day schedules.
        Event::VenueRegistered { .. } | Event::VenueUpdated { .. } => {}
    }
}

/// Day schedules touched by a booking event, in lock order.
fn event_days(event: &Event) -> Vec<DayKey> {
    match event {
        Event::BookingCreated { booking } => vec![booking.day()],
        Event::BookingUpdated { previous_date, booking } => {
            let old = DayKey::new(booking.venue_id, *previous_date);
            let new = booking.day();
            let mut keys = vec![old, new];
            keys.sort();
            keys.dedup();
            keys
        }
        Event::BookingStatusChanged { venue_id, date, .. }
        | Event::BookingDeleted { venue_id, date, .. }
        | Event::PaymentRecorded { venue_id, date, .. }
        | Event::PaymentRefunded { venue_id, date, .. } => vec![DayKey::new(*venue_id, *date)],
        Event::VenueRegistered { .. } | Event::VenueUpdated { .. } => Vec::new(),
    }
}

impl Engine {
    pub fn new(wal_path: PathBuf, notify: Arc<NotifyHub>, business_hours: TimeRange) -> io::Result<Self> {
        let events = Wal::replay(&wal_path)?;
        let wal = Wal::open(&wal_path)?;
        let (wal_tx, wal_rx) = mpsc::channel(4096);
        tokio::spawn(wal_writer_loop(wal, wal_rx));

        let engine = Self {
            venues: DashMap::new(),
            days: DashMap::new(),
            booking_index: DashMap::new(),
            wal_tx,
            write_gate: RwLock::new(()),
            notify,
            business_hours,
        };

        // Replay into plain schedules, then publish them behind their locks.
        let mut replayed: HashMap<DayKey, DaySchedule> = HashMap::new();
        for event in &events {
            match event {
                Event::VenueRegistered { venue } | Event::VenueUpdated { venue } => {
                    engine.venues.insert(venue.id, venue.clone());
                }
                other => {
                    for key in event_days(other) {
                        let day = replayed.entry(key).or_insert_with(|| DaySchedule::new(key));
                        apply_to_day(day, other, &engine.booking_index);
                    }
                }
            }
        }
        for (key, day) in replayed {
            engine.days.insert(key, Arc::new(RwLock::new(day)));
        }
        tracing::info!(
            "replayed {} events: {} venues, {} bookings",
            events.len(),
            engine.venues.len(),
            engine.booking_index.len()
        );

        Ok(engine)
    }

    pub fn business_hours(&self) -> TimeRange {
        self.business_hours
    }

    /// Write event to WAL via the background group-commit writer.
    async fn wal_append(&self, event: &Event) -> Result<(), EngineError> {
        let (tx, rx) = oneshot::channel();
        self.wal_tx
            .send(WalCommand::Append {
                event: event.clone(),
                response: tx,
            })
            .await
            .map_err(|_| EngineError::WalError("WAL writer shut down".into()))?;
        rx.await
            .map_err(|_| EngineError::WalError("WAL writer dropped response".into()))?
            .map_err(|e| EngineError::WalError(e.to_string()))
    }

    /// Existing schedule for a venue-day, if any booking ever landed there.
    pub(super) fn existing_day(&self, key: &DayKey) -> Option<SharedDaySchedule> {
        self.days.get(key).map(|e| e.value().clone())
    }

    /// Schedule for a venue-day, created empty on first use.
    pub(super) fn day_schedule(&self, key: DayKey) -> SharedDaySchedule {
        self.days
            .entry(key)
            .or_insert_with(|| Arc::new(RwLock::new(DaySchedule::new(key))))
            .value()
            .clone()
    }

    /// WAL-append + apply to every held day + notify.
    pub(super) async fn persist_and_apply(
        &self,
        days: &mut [&mut DaySchedule],
        event: &Event,
    ) -> Result<(), EngineError> {
        self.wal_append(event).await?;
        for day in days.iter_mut() {
            apply_to_day(day, event, &self.booking_index);
        }
        self.notify.send(event);
        Ok(())
    }

    /// WAL-append + directory update + notify.
    pub(super) async fn persist_venue(&self, event: Event) -> Result<(), EngineError> {
        self.wal_append(&event).await?;
        if let Event::VenueRegistered { venue } | Event::VenueUpdated { venue } = &event {
            self.venues.insert(venue.id, venue.clone());
        }
        self.notify.send(&event);
        Ok(())
    }

    /// Lookup booking → day, acquire that day's write lock, and confirm the
    /// booking is still there (a concurrent date edit may have moved it).
    pub(super) async fn resolve_booking_write(
        &self,
        id: Ulid,
    ) -> Result<(DayKey, OwnedRwLockWriteGuard<DaySchedule>), EngineError> {
        for _ in 0..RESOLVE_ATTEMPTS {
            let key = self
                .booking_index
                .get(&id)
                .map(|e| *e.value())
                .ok_or(EngineError::BookingNotFound(id))?;
            let guard = self.day_schedule(key).write_owned().await;
            if guard.get(id).is_some() {
                return Ok((key, guard));
            }
        }
        Err(EngineError::BookingNotFound(id))
    }

    /// Write-lock two venue-days in key order. Returns `(first, second)`
    /// matching the order of `a` and `b` as passed, not lock order.
    pub(super) async fn lock_two_days(
        &self,
        a: DayKey,
        b: DayKey,
    ) -> (OwnedRwLockWriteGuard<DaySchedule>, OwnedRwLockWriteGuard<DaySchedule>) {
        let (day_a, day_b) = (self.day_schedule(a), self.day_schedule(b));
        if a < b {
            let ga = day_a.write_owned().await;
            let gb = day_b.write_owned().await;
            (ga, gb)
        } else {
            let gb = day_b.write_owned().await;
            let ga = day_a.write_owned().await;
            (ga, gb)
        }
    }
}
