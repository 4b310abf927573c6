use chrono::{Datelike, NaiveDate};
use ulid::Ulid;

use crate::limits::*;
use crate::model::*;
use crate::timeslot::{TimeOfDay, TimeRange, generate_slots};

use super::conflict::validate_range;
use super::{Engine, EngineError};

// ── Pure helpers ──────────────────────────────────────────────────

/// Collapse a set of holding bookings into one label: any confirmed booking
/// wins, any other booking means pending, nothing means available.
pub fn determine_status<'a>(bookings: impl IntoIterator<Item = &'a Booking>) -> AvailabilityStatus {
    bookings
        .into_iter()
        .filter(|b| b.status.is_active())
        .map(|b| AvailabilityStatus::of_booking(b.status))
        .max()
        .unwrap_or(AvailabilityStatus::Available)
}

/// Active bookings of `day` overlapping `range`, in start order.
pub fn time_conflicts(day: &DaySchedule, range: &TimeRange) -> Vec<ConflictDescriptor> {
    day.overlapping(range).map(ConflictDescriptor::from).collect()
}

/// Slots of `slot_minutes` over `window` that overlap none of `bookings`.
/// Inactive bookings are ignored.
pub fn free_slots(bookings: &[Booking], window: TimeRange, slot_minutes: u16) -> Vec<TimeRange> {
    let busy: Vec<TimeRange> = bookings
        .iter()
        .filter(|b| b.status.is_active())
        .map(Booking::range)
        .collect();
    generate_slots(window.start, window.end, slot_minutes)
        .filter(|slot| !busy.iter().any(|b| b.overlaps(slot)))
        .collect()
}

pub fn summarize_day(day: Option<&DaySchedule>) -> DayAvailability {
    let Some(day) = day else {
        return DayAvailability {
            available: true,
            status: AvailabilityStatus::Available,
            booking_count: 0,
        };
    };
    let booking_count = day.active().count();
    DayAvailability {
        available: booking_count == 0,
        status: determine_status(&day.bookings),
        booking_count,
    }
}

/// Every date of a calendar month, or `None` for an invalid month.
pub fn month_days(year: i32, month: u32) -> Option<Vec<NaiveDate>> {
    let first = NaiveDate::from_ymd_opt(year, month, 1)?;
    Some(
        first
            .iter_days()
            .take_while(|d| d.month() == month && d.year() == year)
            .collect(),
    )
}

// ── Engine queries ────────────────────────────────────────────────

impl Engine {
    pub(super) fn require_venue(&self, id: Ulid) -> Result<Venue, EngineError> {
        self.venues
            .get(&id)
            .map(|v| v.value().clone())
            .ok_or(EngineError::VenueNotFound(id))
    }

    /// Window for slot suggestions: the venue's own hours if set, else the
    /// deployment default.
    fn window_for(&self, venue: &Venue) -> TimeRange {
        venue.business_hours.unwrap_or(self.business_hours)
    }

    /// Snapshot of a venue-day. Days nobody has booked yield an empty list.
    async fn day_bookings(&self, key: DayKey) -> Vec<Booking> {
        match self.existing_day(&key) {
            Some(day) => day.read().await.bookings.clone(),
            None => Vec::new(),
        }
    }

    pub async fn check_date_availability(
        &self,
        venue_id: Ulid,
        date: NaiveDate,
    ) -> Result<DateAvailability, EngineError> {
        self.require_venue(venue_id)?;
        let bookings = self.day_bookings(DayKey::new(venue_id, date)).await;
        let active: Vec<&Booking> = bookings.iter().filter(|b| b.status.is_active()).collect();
        Ok(DateAvailability {
            available: active.is_empty(),
            status: determine_status(active.iter().copied()),
            booking_count: active.len(),
            bookings: active.into_iter().map(ConflictDescriptor::from).collect(),
        })
    }

    pub async fn check_time_slot_availability(
        &self,
        venue_id: Ulid,
        date: NaiveDate,
        start: TimeOfDay,
        end: TimeOfDay,
    ) -> Result<TimeSlotAvailability, EngineError> {
        let range = validate_range(start, end)?;
        self.require_venue(venue_id)?;
        let key = DayKey::new(venue_id, date);
        let Some(day) = self.existing_day(&key) else {
            return Ok(TimeSlotAvailability {
                available: true,
                conflicts: Vec::new(),
                conflict_count: 0,
                status: AvailabilityStatus::Available,
                total_bookings_on_date: 0,
            });
        };
        let guard = day.read().await;
        let conflicts = time_conflicts(&guard, &range);
        Ok(TimeSlotAvailability {
            available: conflicts.is_empty(),
            conflict_count: conflicts.len(),
            conflicts,
            status: determine_status(guard.overlapping(&range)),
            total_bookings_on_date: guard.active().count(),
        })
    }

    pub async fn get_available_time_slots(
        &self,
        venue_id: Ulid,
        date: NaiveDate,
        slot_minutes: u16,
    ) -> Result<Vec<TimeRange>, EngineError> {
        if !(MIN_SLOT_MINUTES..=MAX_SLOT_MINUTES).contains(&slot_minutes) {
            return Err(EngineError::Validation(format!(
                "slot length must be {MIN_SLOT_MINUTES}-{MAX_SLOT_MINUTES} minutes, got {slot_minutes}"
            )));
        }
        let venue = self.require_venue(venue_id)?;
        let bookings = self.day_bookings(DayKey::new(venue_id, date)).await;
        Ok(free_slots(&bookings, self.window_for(&venue), slot_minutes))
    }

    pub async fn get_monthly_availability(
        &self,
        venue_id: Ulid,
        year: i32,
        month: u32,
    ) -> Result<MonthlyAvailability, EngineError> {
        let days = month_days(year, month)
            .ok_or_else(|| EngineError::Validation(format!("invalid month {year}-{month:02}")))?;
        self.require_venue(venue_id)?;

        let mut calendar = MonthlyAvailability::new();
        for date in days {
            let summary = match self.existing_day(&DayKey::new(venue_id, date)) {
                Some(day) => summarize_day(Some(&*day.read().await)),
                None => summarize_day(None),
            };
            calendar.insert(date.to_string(), summary);
        }
        Ok(calendar)
    }

    pub async fn get_conflict_details(
        &self,
        venue_id: Ulid,
        date: NaiveDate,
        start: TimeOfDay,
        end: TimeOfDay,
    ) -> Result<ConflictDetails, EngineError> {
        let slot = self.check_time_slot_availability(venue_id, date, start, end).await?;
        let available_slots = self
            .get_available_time_slots(venue_id, date, DEFAULT_SLOT_MINUTES)
            .await?;
        let message = if slot.conflicts.is_empty() {
            "Time slot is available".to_string()
        } else {
            format!("Found {} conflicting booking(s)", slot.conflict_count)
        };
        Ok(ConflictDetails {
            has_conflict: !slot.conflicts.is_empty(),
            conflicts: slot
                .conflicts
                .into_iter()
                .map(|c| ConflictDetail {
                    duration: crate::timeslot::duration(c.start_time, c.end_time),
                    conflict: c,
                })
                .collect(),
            available_slots,
            message,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal::Decimal;

    fn t(s: &str) -> TimeOfDay {
        s.parse().unwrap()
    }

    fn booking(start: &str, end: &str, status: BookingStatus) -> Booking {
        Booking {
            id: Ulid::new(),
            venue_id: Ulid::nil(),
            organizer_id: Ulid::nil(),
            event_name: format!("event {start}"),
            event_date: NaiveDate::from_ymd_opt(2025, 6, 1).unwrap(),
            start_time: t(start),
            end_time: t(end),
            status,
            total_cost: Decimal::ZERO,
            notes: None,
            created_at: 0,
            updated_at: 0,
            approved_at: None,
            payment_status: PaymentStatus::Unpaid,
            payment_method: None,
            transaction_id: None,
            paid_at: None,
        }
    }

    #[test]
    fn status_confirmed_wins() {
        let set = [
            booking("09:00", "10:00", BookingStatus::Pending),
            booking("11:00", "12:00", BookingStatus::Confirmed),
        ];
        assert_eq!(determine_status(&set), AvailabilityStatus::Confirmed);
    }

    #[test]
    fn status_pending_and_approved_are_pending() {
        let set = [
            booking("09:00", "10:00", BookingStatus::Pending),
            booking("11:00", "12:00", BookingStatus::Approved),
        ];
        assert_eq!(determine_status(&set), AvailabilityStatus::Pending);
    }

    #[test]
    fn status_ignores_inactive() {
        let set = [
            booking("09:00", "10:00", BookingStatus::Cancelled),
            booking("11:00", "12:00", BookingStatus::Rejected),
        ];
        assert_eq!(determine_status(&set), AvailabilityStatus::Available);
        assert_eq!(determine_status(std::iter::empty()), AvailabilityStatus::Available);
    }

    #[test]
    fn free_slots_skip_busy_hours() {
        let bookings = [
            booking("10:00", "12:00", BookingStatus::Confirmed),
            booking("14:30", "15:00", BookingStatus::Pending),
            booking("16:00", "20:00", BookingStatus::Cancelled),
        ];
        let window = TimeRange::new(t("09:00"), t("18:00")).unwrap();
        let free: Vec<String> = free_slots(&bookings, window, 60)
            .into_iter()
            .map(|s| s.to_string())
            .collect();
        assert_eq!(
            free,
            vec!["09:00-10:00", "12:00-13:00", "13:00-14:00", "15:00-16:00", "16:00-17:00", "17:00-18:00"]
        );
    }

    #[test]
    fn summarize_empty_and_busy_day() {
        assert_eq!(summarize_day(None).status, AvailabilityStatus::Available);

        let mut day = DaySchedule::new(DayKey::new(Ulid::nil(), NaiveDate::from_ymd_opt(2025, 6, 1).unwrap()));
        day.insert_booking(booking("09:00", "10:00", BookingStatus::Pending));
        day.insert_booking(booking("10:00", "11:00", BookingStatus::Cancelled));
        let s = summarize_day(Some(&day));
        assert!(!s.available);
        assert_eq!(s.booking_count, 1);
        assert_eq!(s.status, AvailabilityStatus::Pending);
    }

    #[test]
    fn month_lengths() {
        assert_eq!(month_days(2024, 2).unwrap().len(), 29);
        assert_eq!(month_days(2025, 2).unwrap().len(), 28);
        assert_eq!(month_days(2025, 12).unwrap().len(), 31);
        assert_eq!(month_days(2025, 4).unwrap().last().unwrap().to_string(), "2025-04-30");
        assert!(month_days(2025, 13).is_none());
        assert!(month_days(2025, 0).is_none());
    }
}
