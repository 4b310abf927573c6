use chrono::NaiveDate;
use rust_decimal::Decimal;
use tokio::sync::oneshot;
use ulid::Ulid;

use crate::limits::*;
use crate::model::*;
use crate::timeslot::{TimeOfDay, TimeRange};

use super::conflict::{
    check_no_conflict, now_ms, validate_event_name, validate_notes, validate_range, validate_transaction_id,
};
use super::{Engine, EngineError, SharedDaySchedule, WalCommand};

/// Booking request as submitted by an organizer. Id, cost, status and
/// timestamps are assigned by the engine.
#[derive(Debug, Clone, PartialEq)]
pub struct NewBooking {
    pub venue_id: Ulid,
    pub organizer_id: Ulid,
    pub event_name: String,
    pub event_date: NaiveDate,
    pub start_time: TimeOfDay,
    pub end_time: TimeOfDay,
    pub notes: Option<String>,
}

/// Partial edit of a pending booking; `None` leaves a field unchanged.
/// Blank notes clear them.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BookingChanges {
    pub event_name: Option<String>,
    pub event_date: Option<NaiveDate>,
    pub start_time: Option<TimeOfDay>,
    pub end_time: Option<TimeOfDay>,
    pub notes: Option<String>,
}

impl BookingChanges {
    fn moves_slot(&self, current: &Booking) -> bool {
        self.event_date.is_some_and(|d| d != current.event_date)
            || self.start_time.is_some_and(|t| t != current.start_time)
            || self.end_time.is_some_and(|t| t != current.end_time)
    }
}

/// An applied edit and the date the booking held before it.
#[derive(Debug, Clone)]
pub struct BookingEdit {
    pub booking: Booking,
    pub previous_date: NaiveDate,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct VenueChanges {
    pub name: Option<String>,
    pub price: Option<Decimal>,
    pub is_active: Option<bool>,
    pub venue_status: Option<VenueStatus>,
    /// `Some(None)` falls back to the deployment's hours.
    pub business_hours: Option<Option<TimeRange>>,
}

fn validate_venue(venue: &Venue) -> Result<(), EngineError> {
    let len = venue.name.trim().chars().count();
    if len == 0 {
        return Err(EngineError::Validation("venue name is required".into()));
    }
    if len > MAX_VENUE_NAME_LEN {
        return Err(EngineError::LimitExceeded("venue name too long"));
    }
    if venue.price.is_sign_negative() {
        return Err(EngineError::Validation("venue price cannot be negative".into()));
    }
    Ok(())
}

/// Build the edited booking. Fails without side effects on invalid input.
fn apply_changes(current: &Booking, changes: &BookingChanges, now: Ms) -> Result<Booking, EngineError> {
    let mut next = current.clone();
    if let Some(name) = &changes.event_name {
        next.event_name = validate_event_name(name)?;
    }
    if let Some(date) = changes.event_date {
        next.event_date = date;
    }
    next.start_time = changes.start_time.unwrap_or(current.start_time);
    next.end_time = changes.end_time.unwrap_or(current.end_time);
    validate_range(next.start_time, next.end_time)?;
    if changes.notes.is_some() {
        next.notes = validate_notes(changes.notes.clone())?;
    }
    next.updated_at = now;
    Ok(next)
}

impl Engine {
    // ── Venue directory ──────────────────────────────────────────

    pub async fn register_venue(&self, venue: Venue) -> Result<(), EngineError> {
        validate_venue(&venue)?;
        if self.venues.len() >= MAX_VENUES {
            return Err(EngineError::LimitExceeded("too many venues"));
        }
        let _gate = self.write_gate.read().await;
        if self.venues.contains_key(&venue.id) {
            return Err(EngineError::VenueAlreadyExists(venue.id));
        }
        tracing::info!("venue {} registered: {}", venue.id, venue.name);
        self.persist_venue(Event::VenueRegistered { venue }).await
    }

    pub async fn update_venue(&self, id: Ulid, changes: VenueChanges) -> Result<Venue, EngineError> {
        let _gate = self.write_gate.read().await;
        let mut venue = self.require_venue(id)?;
        if let Some(name) = changes.name {
            venue.name = name.trim().to_string();
        }
        if let Some(price) = changes.price {
            venue.price = price;
        }
        if let Some(active) = changes.is_active {
            venue.is_active = active;
        }
        if let Some(status) = changes.venue_status {
            venue.venue_status = status;
        }
        if let Some(hours) = changes.business_hours {
            venue.business_hours = hours;
        }
        validate_venue(&venue)?;
        self.persist_venue(Event::VenueUpdated { venue: venue.clone() }).await?;
        Ok(venue)
    }

    // ── Bookings ─────────────────────────────────────────────────

    /// Check and insert under the venue-day write lock: two overlapping
    /// requests for the same venue-day serialize here and only one wins.
    pub async fn create_booking(&self, req: NewBooking) -> Result<Booking, EngineError> {
        let range = validate_range(req.start_time, req.end_time)?;
        let event_name = validate_event_name(&req.event_name)?;
        let notes = validate_notes(req.notes)?;
        let venue = self.require_venue(req.venue_id)?;
        if let Some(reason) = venue.unavailable_reason() {
            return Err(EngineError::VenueUnavailable { id: venue.id, reason });
        }

        let _gate = self.write_gate.read().await;
        let key = DayKey::new(req.venue_id, req.event_date);
        let day = self.day_schedule(key);
        let mut guard = day.write().await;
        if guard.bookings.len() >= MAX_BOOKINGS_PER_DAY {
            return Err(EngineError::LimitExceeded("too many bookings on this day"));
        }
        check_no_conflict(&guard, &range, None)?;

        let now = now_ms();
        let booking = Booking {
            id: Ulid::new(),
            venue_id: req.venue_id,
            organizer_id: req.organizer_id,
            event_name,
            event_date: req.event_date,
            start_time: range.start,
            end_time: range.end,
            status: BookingStatus::Pending,
            total_cost: venue.price,
            notes,
            created_at: now,
            updated_at: now,
            approved_at: None,
            payment_status: PaymentStatus::Unpaid,
            payment_method: None,
            transaction_id: None,
            paid_at: None,
        };
        let event = Event::BookingCreated { booking: booking.clone() };
        self.persist_and_apply(&mut [&mut *guard], &event).await?;

        metrics::counter!(crate::observability::BOOKINGS_CREATED_TOTAL).increment(1);
        tracing::info!(
            "booking {} created for venue {} on {} {range}",
            booking.id,
            booking.venue_id,
            booking.event_date
        );
        Ok(booking)
    }

    /// Edit a pending booking. A changed date or time is re-checked against
    /// the target day, ignoring the booking itself.
    pub async fn update_booking(&self, id: Ulid, changes: BookingChanges) -> Result<Booking, EngineError> {
        self.edit_booking(id, changes).await.map(|edit| edit.booking)
    }

    /// `update_booking`, also reporting the date the booking was read from
    /// under its day lock.
    pub async fn edit_booking(&self, id: Ulid, changes: BookingChanges) -> Result<BookingEdit, EngineError> {
        let _gate = self.write_gate.read().await;
        let (key, mut guard) = self.resolve_booking_write(id).await?;
        let current = guard.get(id).cloned().ok_or(EngineError::BookingNotFound(id))?;
        let target = DayKey::new(key.venue_id, changes.event_date.unwrap_or(current.event_date));

        if target == key {
            let updated = self.checked_update(&guard, &current, &changes)?;
            let event = Event::BookingUpdated {
                previous_date: key.date,
                booking: updated.clone(),
            };
            self.persist_and_apply(&mut [&mut *guard], &event).await?;
            tracing::info!("booking {id} updated");
            return Ok(BookingEdit {
                booking: updated,
                previous_date: key.date,
            });
        }

        // Moving days: release, then take both day locks in key order.
        drop(guard);
        let (mut old_day, mut new_day) = self.lock_two_days(key, target).await;
        let current = old_day.get(id).cloned().ok_or(EngineError::BookingNotFound(id))?;
        if new_day.bookings.len() >= MAX_BOOKINGS_PER_DAY {
            return Err(EngineError::LimitExceeded("too many bookings on this day"));
        }
        let updated = self.checked_update(&new_day, &current, &changes)?;
        let event = Event::BookingUpdated {
            previous_date: key.date,
            booking: updated.clone(),
        };
        self.persist_and_apply(&mut [&mut *old_day, &mut *new_day], &event).await?;
        tracing::info!("booking {id} moved from {} to {}", key.date, target.date);
        Ok(BookingEdit {
            booking: updated,
            previous_date: key.date,
        })
    }

    /// Pending check, field validation and (when the slot moves) the conflict
    /// check against `target_day`.
    fn checked_update(
        &self,
        target_day: &DaySchedule,
        current: &Booking,
        changes: &BookingChanges,
    ) -> Result<Booking, EngineError> {
        if current.status != BookingStatus::Pending {
            return Err(EngineError::InvalidState {
                id: current.id,
                status: current.status,
                operation: "update",
            });
        }
        let updated = apply_changes(current, changes, now_ms())?;
        if changes.moves_slot(current) {
            check_no_conflict(target_day, &updated.range(), Some(current.id))?;
        }
        Ok(updated)
    }

    pub async fn delete_booking(&self, id: Ulid) -> Result<Booking, EngineError> {
        let _gate = self.write_gate.read().await;
        let (key, mut guard) = self.resolve_booking_write(id).await?;
        let current = guard.get(id).cloned().ok_or(EngineError::BookingNotFound(id))?;
        if current.status != BookingStatus::Pending {
            return Err(EngineError::InvalidState {
                id,
                status: current.status,
                operation: "delete",
            });
        }
        let event = Event::BookingDeleted {
            id,
            venue_id: key.venue_id,
            date: key.date,
        };
        self.persist_and_apply(&mut [&mut *guard], &event).await?;
        tracing::info!("booking {id} deleted");
        Ok(current)
    }

    /// Move a booking along the status machine. No availability re-check:
    /// every non-terminal status already holds its slot.
    pub async fn change_status(&self, id: Ulid, to: BookingStatus) -> Result<Booking, EngineError> {
        let _gate = self.write_gate.read().await;
        let (key, mut guard) = self.resolve_booking_write(id).await?;
        let from = guard.get(id).map(|b| b.status).ok_or(EngineError::BookingNotFound(id))?;
        if !from.can_transition_to(to) {
            return Err(EngineError::InvalidTransition { from, to });
        }
        let event = Event::BookingStatusChanged {
            id,
            venue_id: key.venue_id,
            date: key.date,
            status: to,
            at: now_ms(),
        };
        self.persist_and_apply(&mut [&mut *guard], &event).await?;

        metrics::counter!(crate::observability::BOOKING_TRANSITIONS_TOTAL, "to" => to.as_str()).increment(1);
        tracing::info!("booking {id}: {from} -> {to}");
        guard.get(id).cloned().ok_or(EngineError::BookingNotFound(id))
    }

    pub async fn approve_booking(&self, id: Ulid) -> Result<Booking, EngineError> {
        self.change_status(id, BookingStatus::Approved).await
    }

    pub async fn confirm_booking(&self, id: Ulid) -> Result<Booking, EngineError> {
        self.change_status(id, BookingStatus::Confirmed).await
    }

    pub async fn reject_booking(&self, id: Ulid) -> Result<Booking, EngineError> {
        self.change_status(id, BookingStatus::Rejected).await
    }

    pub async fn cancel_booking(&self, id: Ulid) -> Result<Booking, EngineError> {
        self.change_status(id, BookingStatus::Cancelled).await
    }

    // ── Payments ─────────────────────────────────────────────────

    /// Record an offline payment. Only approved, unpaid bookings qualify,
    /// and paying confirms the booking.
    pub async fn record_payment(
        &self,
        id: Ulid,
        method: PaymentMethod,
        transaction_id: Option<String>,
    ) -> Result<Booking, EngineError> {
        let transaction_id = validate_transaction_id(transaction_id)?;
        let _gate = self.write_gate.read().await;
        let (key, mut guard) = self.resolve_booking_write(id).await?;
        let current = guard.get(id).ok_or(EngineError::BookingNotFound(id))?;
        if current.payment_status == PaymentStatus::Paid {
            return Err(EngineError::PaymentNotAllowed {
                id,
                reason: "booking is already paid",
            });
        }
        if current.status != BookingStatus::Approved {
            return Err(EngineError::PaymentNotAllowed {
                id,
                reason: "booking must be approved before payment can be made",
            });
        }
        let event = Event::PaymentRecorded {
            id,
            venue_id: key.venue_id,
            date: key.date,
            method,
            transaction_id,
            at: now_ms(),
        };
        self.persist_and_apply(&mut [&mut *guard], &event).await?;

        metrics::counter!(crate::observability::BOOKING_PAYMENTS_TOTAL, "outcome" => "paid").increment(1);
        metrics::counter!(crate::observability::BOOKING_TRANSITIONS_TOTAL, "to" => BookingStatus::Confirmed.as_str())
            .increment(1);
        tracing::info!("booking {id} paid by {method}, now confirmed");
        guard.get(id).cloned().ok_or(EngineError::BookingNotFound(id))
    }

    /// Refund a paid booking. The booking is cancelled and its slot released.
    pub async fn refund_payment(&self, id: Ulid) -> Result<Booking, EngineError> {
        let _gate = self.write_gate.read().await;
        let (key, mut guard) = self.resolve_booking_write(id).await?;
        let current = guard.get(id).ok_or(EngineError::BookingNotFound(id))?;
        if current.payment_status != PaymentStatus::Paid {
            return Err(EngineError::PaymentNotAllowed {
                id,
                reason: "cannot refund an unpaid booking",
            });
        }
        let event = Event::PaymentRefunded {
            id,
            venue_id: key.venue_id,
            date: key.date,
            at: now_ms(),
        };
        self.persist_and_apply(&mut [&mut *guard], &event).await?;

        metrics::counter!(crate::observability::BOOKING_PAYMENTS_TOTAL, "outcome" => "refunded").increment(1);
        tracing::info!("booking {id} refunded and cancelled");
        guard.get(id).cloned().ok_or(EngineError::BookingNotFound(id))
    }

    // ── WAL maintenance ──────────────────────────────────────────

    /// Rewrite the WAL as the minimal event set for the current state.
    /// Holds the write gate exclusively, so no mutation is in flight.
    pub async fn compact_wal(&self) -> Result<(), EngineError> {
        let _gate = self.write_gate.write().await;

        let mut events: Vec<Event> = self
            .venues
            .iter()
            .map(|e| Event::VenueRegistered { venue: e.value().clone() })
            .collect();

        let days: Vec<SharedDaySchedule> = self.days.iter().map(|e| e.value().clone()).collect();
        for day in days {
            let guard = day.read().await;
            events.extend(
                guard
                    .bookings
                    .iter()
                    .map(|b| Event::BookingCreated { booking: b.clone() }),
            );
        }
        // Empty schedules are left behind by rejected or deleted bookings.
        self.days
            .retain(|_, day| day.try_read().map(|g| !g.bookings.is_empty()).unwrap_or(true));

        let count = events.len();
        let (tx, rx) = oneshot::channel();
        self.wal_tx
            .send(WalCommand::Compact { events, response: tx })
            .await
            .map_err(|_| EngineError::WalError("WAL writer shut down".into()))?;
        rx.await
            .map_err(|_| EngineError::WalError("WAL writer dropped response".into()))?
            .map_err(|e| EngineError::WalError(e.to_string()))?;
        tracing::info!("WAL compacted to {count} events");
        Ok(())
    }

    pub async fn wal_appends_since_compact(&self) -> u64 {
        let (tx, rx) = oneshot::channel();
        if self
            .wal_tx
            .send(WalCommand::AppendsSinceCompact { response: tx })
            .await
            .is_err()
        {
            return 0;
        }
        rx.await.unwrap_or(0)
    }
}
