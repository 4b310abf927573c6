use chrono::NaiveDate;
use ulid::Ulid;

use crate::limits::*;
use crate::model::*;

use super::{Engine, EngineError, SharedDaySchedule};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BookingOrder {
    /// By event date, then start time.
    #[default]
    Chronological,
    /// Most recently created first.
    NewestFirst,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct BookingFilter {
    pub venue_id: Option<Ulid>,
    pub organizer_id: Option<Ulid>,
    pub status: Option<BookingStatus>,
    pub event_date: Option<NaiveDate>,
    pub order: BookingOrder,
    /// Page size; defaults to `DEFAULT_PAGE_SIZE`, capped at `MAX_PAGE_SIZE`.
    pub limit: Option<usize>,
    pub offset: usize,
}

impl BookingFilter {
    fn matches(&self, b: &Booking) -> bool {
        self.organizer_id.is_none_or(|o| b.organizer_id == o) && self.status.is_none_or(|s| b.status == s)
    }

    fn covers_day(&self, key: &DayKey) -> bool {
        self.venue_id.is_none_or(|v| key.venue_id == v) && self.event_date.is_none_or(|d| key.date == d)
    }
}

impl Engine {
    pub fn get_venue(&self, id: Ulid) -> Result<Venue, EngineError> {
        self.require_venue(id)
    }

    /// Every venue, ordered by name.
    pub fn list_venues(&self) -> Vec<Venue> {
        let mut venues: Vec<Venue> = self.venues.iter().map(|e| e.value().clone()).collect();
        venues.sort_by(|a, b| a.name.cmp(&b.name).then(a.id.cmp(&b.id)));
        venues
    }

    pub async fn get_booking(&self, id: Ulid) -> Result<Booking, EngineError> {
        let key = self
            .booking_index
            .get(&id)
            .map(|e| *e.value())
            .ok_or(EngineError::BookingNotFound(id))?;
        let day = self.existing_day(&key).ok_or(EngineError::BookingNotFound(id))?;
        let guard = day.read().await;
        guard.get(id).cloned().ok_or(EngineError::BookingNotFound(id))
    }

    pub async fn list_bookings(&self, filter: &BookingFilter) -> Result<Vec<Booking>, EngineError> {
        if let Some(venue_id) = filter.venue_id {
            self.require_venue(venue_id)?;
        }

        // Collect Arcs first so no DashMap shard is held across an await.
        let days: Vec<SharedDaySchedule> = match (filter.venue_id, filter.event_date) {
            (Some(v), Some(d)) => self.existing_day(&DayKey::new(v, d)).into_iter().collect(),
            _ => self
                .days
                .iter()
                .filter(|e| filter.covers_day(e.key()))
                .map(|e| e.value().clone())
                .collect(),
        };

        let mut bookings = Vec::new();
        for day in days {
            let guard = day.read().await;
            bookings.extend(guard.bookings.iter().filter(|b| filter.matches(b)).cloned());
        }

        match filter.order {
            BookingOrder::Chronological => {
                bookings.sort_by(|a, b| (a.event_date, a.start_time, a.id).cmp(&(b.event_date, b.start_time, b.id)))
            }
            BookingOrder::NewestFirst => {
                bookings.sort_by(|a, b| (b.created_at, b.id).cmp(&(a.created_at, a.id)))
            }
        }

        let limit = filter.limit.unwrap_or(DEFAULT_PAGE_SIZE).min(MAX_PAGE_SIZE);
        Ok(bookings.into_iter().skip(filter.offset).take(limit).collect())
    }

    /// Payment record of one booking.
    pub async fn payment_summary(&self, id: Ulid) -> Result<PaymentSummary, EngineError> {
        let booking = self.get_booking(id).await?;
        Ok(PaymentSummary::from(&booking))
    }

    /// Booking plus derived timing figures relative to `today`. An event
    /// happening today counts as upcoming.
    pub async fn booking_stats(&self, id: Ulid, today: NaiveDate) -> Result<BookingStats, EngineError> {
        let booking = self.get_booking(id).await?;
        let days_until_event = (booking.event_date - today).num_days();
        Ok(BookingStats {
            days_until_event,
            is_upcoming: days_until_event >= 0,
            is_past: days_until_event < 0,
            duration: booking.range().duration(),
            booking,
        })
    }
}
