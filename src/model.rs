use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use ulid::Ulid;

use crate::timeslot::{SlotDuration, TimeOfDay, TimeRange};

/// Unix milliseconds, used for record timestamps.
pub type Ms = i64;

// ── Statuses ─────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BookingStatus {
    Pending,
    Approved,
    Confirmed,
    Cancelled,
    Rejected,
}

impl BookingStatus {
    pub const ALL: [BookingStatus; 5] = [
        BookingStatus::Pending,
        BookingStatus::Approved,
        BookingStatus::Confirmed,
        BookingStatus::Cancelled,
        BookingStatus::Rejected,
    ];

    /// Whether a booking in this status holds its slot against other requests.
    pub fn is_active(self) -> bool {
        match self {
            BookingStatus::Pending | BookingStatus::Approved | BookingStatus::Confirmed => true,
            BookingStatus::Cancelled | BookingStatus::Rejected => false,
        }
    }

    /// Statuses reachable from `self` in one step.
    pub fn next_states(self) -> &'static [BookingStatus] {
        match self {
            BookingStatus::Pending => &[
                BookingStatus::Approved,
                BookingStatus::Cancelled,
                BookingStatus::Rejected,
            ],
            BookingStatus::Approved => &[BookingStatus::Confirmed, BookingStatus::Cancelled],
            BookingStatus::Confirmed | BookingStatus::Cancelled | BookingStatus::Rejected => &[],
        }
    }

    pub fn can_transition_to(self, to: BookingStatus) -> bool {
        self.next_states().contains(&to)
    }

    pub fn is_terminal(self) -> bool {
        self.next_states().is_empty()
    }

    pub fn as_str(self) -> &'static str {
        match self {
            BookingStatus::Pending => "pending",
            BookingStatus::Approved => "approved",
            BookingStatus::Confirmed => "confirmed",
            BookingStatus::Cancelled => "cancelled",
            BookingStatus::Rejected => "rejected",
        }
    }
}

impl fmt::Display for BookingStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BookingStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        BookingStatus::ALL
            .into_iter()
            .find(|st| st.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| format!("unknown booking status: {s}"))
    }
}

/// Collapsed label for a set of bookings. Ordered so that `max` picks the
/// label that wins: `Confirmed > Pending > Available`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum AvailabilityStatus {
    Available,
    Pending,
    Confirmed,
}

impl AvailabilityStatus {
    /// Label contributed by a single booking. Only confirmed bookings count as
    /// `Confirmed`; every other holding status is still awaiting confirmation.
    pub fn of_booking(status: BookingStatus) -> Self {
        match status {
            BookingStatus::Confirmed => AvailabilityStatus::Confirmed,
            BookingStatus::Pending | BookingStatus::Approved => AvailabilityStatus::Pending,
            BookingStatus::Cancelled | BookingStatus::Rejected => AvailabilityStatus::Available,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PaymentStatus {
    #[default]
    Unpaid,
    Paid,
    Refunded,
}

impl PaymentStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            PaymentStatus::Unpaid => "unpaid",
            PaymentStatus::Paid => "paid",
            PaymentStatus::Refunded => "refunded",
        }
    }
}

impl fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How the organizer settled the booking. Recorded, never processed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentMethod {
    Cash,
    MobileMoney,
    BankTransfer,
    Card,
    Other,
}

impl PaymentMethod {
    pub const ALL: [PaymentMethod; 5] = [
        PaymentMethod::Cash,
        PaymentMethod::MobileMoney,
        PaymentMethod::BankTransfer,
        PaymentMethod::Card,
        PaymentMethod::Other,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            PaymentMethod::Cash => "cash",
            PaymentMethod::MobileMoney => "mobile_money",
            PaymentMethod::BankTransfer => "bank_transfer",
            PaymentMethod::Card => "card",
            PaymentMethod::Other => "other",
        }
    }
}

impl fmt::Display for PaymentMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PaymentMethod {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        PaymentMethod::ALL
            .into_iter()
            .find(|m| m.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| format!("unknown payment method: {s}"))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VenueStatus {
    Active,
    Unavailable,
    Inactive,
}

impl FromStr for VenueStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "active" => Ok(VenueStatus::Active),
            "unavailable" => Ok(VenueStatus::Unavailable),
            "inactive" => Ok(VenueStatus::Inactive),
            other => Err(format!("unknown venue status: {other}")),
        }
    }
}

// ── Records ──────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Venue {
    pub id: Ulid,
    pub name: String,
    #[serde(with = "rust_decimal::serde::str")]
    pub price: Decimal,
    pub is_active: bool,
    pub venue_status: VenueStatus,
    /// Overrides the deployment-wide business hours for slot suggestions.
    pub business_hours: Option<TimeRange>,
}

impl Venue {
    pub fn is_bookable(&self) -> bool {
        self.is_active && self.venue_status == VenueStatus::Active
    }

    pub fn unavailable_reason(&self) -> Option<&'static str> {
        match (self.venue_status, self.is_active) {
            (VenueStatus::Unavailable, _) => {
                Some("venue is temporarily closed and cannot be booked at this time")
            }
            (VenueStatus::Inactive, _) => Some("venue is suspended and cannot be booked"),
            (VenueStatus::Active, false) => Some("venue is not available for booking"),
            (VenueStatus::Active, true) => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Booking {
    pub id: Ulid,
    pub venue_id: Ulid,
    pub organizer_id: Ulid,
    pub event_name: String,
    pub event_date: NaiveDate,
    pub start_time: TimeOfDay,
    pub end_time: TimeOfDay,
    pub status: BookingStatus,
    #[serde(with = "rust_decimal::serde::str")]
    pub total_cost: Decimal,
    pub notes: Option<String>,
    pub created_at: Ms,
    pub updated_at: Ms,
    pub approved_at: Option<Ms>,
    pub payment_status: PaymentStatus,
    pub payment_method: Option<PaymentMethod>,
    pub transaction_id: Option<String>,
    pub paid_at: Option<Ms>,
}

impl Booking {
    pub fn range(&self) -> TimeRange {
        // end > start is enforced before any booking is stored.
        TimeRange {
            start: self.start_time,
            end: self.end_time,
        }
    }

    pub fn day(&self) -> DayKey {
        DayKey::new(self.venue_id, self.event_date)
    }
}

/// Lock and index key: all bookings of one venue on one calendar day.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct DayKey {
    pub venue_id: Ulid,
    pub date: NaiveDate,
}

impl DayKey {
    pub fn new(venue_id: Ulid, date: NaiveDate) -> Self {
        Self { venue_id, date }
    }
}

/// Every booking (any status) of one venue-day, sorted by start time.
#[derive(Debug, Clone)]
pub struct DaySchedule {
    pub key: DayKey,
    pub bookings: Vec<Booking>,
}

impl DaySchedule {
    pub fn new(key: DayKey) -> Self {
        Self {
            key,
            bookings: Vec::new(),
        }
    }

    /// Insert maintaining sort order by start time.
    pub fn insert_booking(&mut self, booking: Booking) {
        let pos = self
            .bookings
            .partition_point(|b| b.start_time <= booking.start_time);
        self.bookings.insert(pos, booking);
    }

    pub fn remove_booking(&mut self, id: Ulid) -> Option<Booking> {
        let pos = self.bookings.iter().position(|b| b.id == id)?;
        Some(self.bookings.remove(pos))
    }

    pub fn get(&self, id: Ulid) -> Option<&Booking> {
        self.bookings.iter().find(|b| b.id == id)
    }

    pub fn get_mut(&mut self, id: Ulid) -> Option<&mut Booking> {
        self.bookings.iter_mut().find(|b| b.id == id)
    }

    pub fn active(&self) -> impl Iterator<Item = &Booking> {
        self.bookings.iter().filter(|b| b.status.is_active())
    }

    /// Active bookings whose interval overlaps `range`.
    /// Binary search skips bookings starting at or after `range.end`.
    pub fn overlapping(&self, range: &TimeRange) -> impl Iterator<Item = &Booking> {
        let right_bound = self
            .bookings
            .partition_point(|b| b.start_time < range.end);
        self.bookings[..right_bound]
            .iter()
            .filter(move |b| b.status.is_active() && b.end_time > range.start)
    }
}

/// WAL record format, also broadcast to LISTEN subscribers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all_fields = "camelCase")]
pub enum Event {
    VenueRegistered {
        venue: Venue,
    },
    VenueUpdated {
        venue: Venue,
    },
    BookingCreated {
        booking: Booking,
    },
    BookingUpdated {
        previous_date: NaiveDate,
        booking: Booking,
    },
    BookingStatusChanged {
        id: Ulid,
        venue_id: Ulid,
        date: NaiveDate,
        status: BookingStatus,
        at: Ms,
    },
    BookingDeleted {
        id: Ulid,
        venue_id: Ulid,
        date: NaiveDate,
    },
    /// Payment recorded against an approved booking; confirms it.
    PaymentRecorded {
        id: Ulid,
        venue_id: Ulid,
        date: NaiveDate,
        method: PaymentMethod,
        transaction_id: Option<String>,
        at: Ms,
    },
    /// Refund of a paid booking; cancels it and frees the slot.
    PaymentRefunded {
        id: Ulid,
        venue_id: Ulid,
        date: NaiveDate,
        at: Ms,
    },
}

impl Event {
    pub fn venue_id(&self) -> Ulid {
        match self {
            Event::VenueRegistered { venue } | Event::VenueUpdated { venue } => venue.id,
            Event::BookingCreated { booking } | Event::BookingUpdated { booking, .. } => {
                booking.venue_id
            }
            Event::BookingStatusChanged { venue_id, .. }
            | Event::BookingDeleted { venue_id, .. }
            | Event::PaymentRecorded { venue_id, .. }
            | Event::PaymentRefunded { venue_id, .. } => *venue_id,
        }
    }
}

// ── Query result types ───────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConflictDescriptor {
    pub event_name: String,
    pub start_time: TimeOfDay,
    pub end_time: TimeOfDay,
    pub status: BookingStatus,
}

impl From<&Booking> for ConflictDescriptor {
    fn from(b: &Booking) -> Self {
        Self {
            event_name: b.event_name.clone(),
            start_time: b.start_time,
            end_time: b.end_time,
            status: b.status,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DateAvailability {
    pub available: bool,
    pub status: AvailabilityStatus,
    pub booking_count: usize,
    pub bookings: Vec<ConflictDescriptor>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimeSlotAvailability {
    pub available: bool,
    pub conflicts: Vec<ConflictDescriptor>,
    pub conflict_count: usize,
    pub status: AvailabilityStatus,
    pub total_bookings_on_date: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DayAvailability {
    pub available: bool,
    pub status: AvailabilityStatus,
    pub booking_count: usize,
}

/// ISO date (`YYYY-MM-DD`) to that day's summary, in calendar order.
pub type MonthlyAvailability = BTreeMap<String, DayAvailability>;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConflictDetail {
    #[serde(flatten)]
    pub conflict: ConflictDescriptor,
    pub duration: SlotDuration,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConflictDetails {
    pub has_conflict: bool,
    pub conflicts: Vec<ConflictDetail>,
    pub available_slots: Vec<TimeRange>,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentSummary {
    pub booking_id: Ulid,
    pub status: PaymentStatus,
    pub method: Option<PaymentMethod>,
    pub transaction_id: Option<String>,
    pub paid_at: Option<Ms>,
    #[serde(with = "rust_decimal::serde::str")]
    pub amount: Decimal,
    pub booking_status: BookingStatus,
}

impl From<&Booking> for PaymentSummary {
    fn from(b: &Booking) -> Self {
        Self {
            booking_id: b.id,
            status: b.payment_status,
            method: b.payment_method,
            transaction_id: b.transaction_id.clone(),
            paid_at: b.paid_at,
            amount: b.total_cost,
            booking_status: b.status,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BookingStats {
    pub booking: Booking,
    pub days_until_event: i64,
    pub is_upcoming: bool,
    pub is_past: bool,
    pub duration: SlotDuration,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn t(s: &str) -> TimeOfDay {
        s.parse().unwrap()
    }

    fn booking(start: &str, end: &str, status: BookingStatus) -> Booking {
        Booking {
            id: Ulid::new(),
            venue_id: Ulid::new(),
            organizer_id: Ulid::new(),
            event_name: format!("event {start}"),
            event_date: NaiveDate::from_ymd_opt(2025, 6, 1).unwrap(),
            start_time: t(start),
            end_time: t(end),
            status,
            total_cost: Decimal::new(10000, 2),
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
    fn transition_table() {
        use BookingStatus::*;
        assert!(Pending.can_transition_to(Approved));
        assert!(Pending.can_transition_to(Rejected));
        assert!(Pending.can_transition_to(Cancelled));
        assert!(!Pending.can_transition_to(Confirmed));
        assert!(Approved.can_transition_to(Confirmed));
        assert!(Approved.can_transition_to(Cancelled));
        assert!(!Approved.can_transition_to(Rejected));
        for terminal in [Confirmed, Cancelled, Rejected] {
            assert!(terminal.is_terminal());
            for to in BookingStatus::ALL {
                assert!(!terminal.can_transition_to(to));
            }
        }
        for st in BookingStatus::ALL {
            assert!(!st.can_transition_to(st), "{st} must not transition to itself");
        }
    }

    #[test]
    fn status_parse_and_display() {
        for st in BookingStatus::ALL {
            assert_eq!(st.to_string().parse::<BookingStatus>().unwrap(), st);
        }
        assert_eq!("Confirmed".parse::<BookingStatus>().unwrap(), BookingStatus::Confirmed);
        assert!("archived".parse::<BookingStatus>().is_err());
        assert_eq!(
            serde_json::to_string(&BookingStatus::Approved).unwrap(),
            "\"approved\""
        );
        assert_eq!(
            serde_json::to_string(&AvailabilityStatus::Confirmed).unwrap(),
            "\"Confirmed\""
        );
    }

    #[test]
    fn availability_status_ordering() {
        assert!(AvailabilityStatus::Confirmed > AvailabilityStatus::Pending);
        assert!(AvailabilityStatus::Pending > AvailabilityStatus::Available);
    }

    #[test]
    fn schedule_keeps_start_order() {
        let mut day = DaySchedule::new(DayKey::new(Ulid::new(), NaiveDate::from_ymd_opt(2025, 6, 1).unwrap()));
        day.insert_booking(booking("14:00", "15:00", BookingStatus::Pending));
        day.insert_booking(booking("09:00", "10:00", BookingStatus::Pending));
        day.insert_booking(booking("11:00", "12:00", BookingStatus::Confirmed));
        let starts: Vec<String> = day.bookings.iter().map(|b| b.start_time.to_string()).collect();
        assert_eq!(starts, vec!["09:00", "11:00", "14:00"]);
    }

    #[test]
    fn schedule_overlapping_skips_inactive_and_adjacent() {
        let mut day = DaySchedule::new(DayKey::new(Ulid::new(), NaiveDate::from_ymd_opt(2025, 6, 1).unwrap()));
        day.insert_booking(booking("09:00", "10:00", BookingStatus::Confirmed));
        day.insert_booking(booking("10:00", "11:00", BookingStatus::Cancelled));
        day.insert_booking(booking("10:30", "12:00", BookingStatus::Pending));
        day.insert_booking(booking("12:00", "13:00", BookingStatus::Pending));

        let query = TimeRange::new(t("10:00"), t("12:00")).unwrap();
        let hits: Vec<String> = day.overlapping(&query).map(|b| b.start_time.to_string()).collect();
        assert_eq!(hits, vec!["10:30"]);
    }

    #[test]
    fn schedule_remove() {
        let mut day = DaySchedule::new(DayKey::new(Ulid::new(), NaiveDate::from_ymd_opt(2025, 6, 1).unwrap()));
        let b = booking("09:00", "10:00", BookingStatus::Pending);
        let id = b.id;
        day.insert_booking(b);
        assert!(day.remove_booking(Ulid::new()).is_none());
        assert_eq!(day.remove_booking(id).map(|b| b.id), Some(id));
        assert!(day.bookings.is_empty());
    }

    #[test]
    fn venue_bookable() {
        let mut v = Venue {
            id: Ulid::new(),
            name: "Hall".into(),
            price: Decimal::new(500, 0),
            is_active: true,
            venue_status: VenueStatus::Active,
            business_hours: None,
        };
        assert!(v.is_bookable());
        assert!(v.unavailable_reason().is_none());
        v.venue_status = VenueStatus::Unavailable;
        assert!(!v.is_bookable());
        assert!(v.unavailable_reason().unwrap().contains("temporarily closed"));
        v.venue_status = VenueStatus::Active;
        v.is_active = false;
        assert!(!v.is_bookable());
    }

    #[test]
    fn event_serialization_roundtrip() {
        let event = Event::BookingCreated {
            booking: booking("09:00", "10:00", BookingStatus::Pending),
        };
        let bytes = bincode::serialize(&event).unwrap();
        let decoded: Event = bincode::deserialize(&bytes).unwrap();
        assert_eq!(event, decoded);
    }

    #[test]
    fn booking_json_uses_camel_case() {
        let b = booking("09:00", "10:30", BookingStatus::Pending);
        let json = serde_json::to_value(&b).unwrap();
        assert_eq!(json["startTime"], "09:00");
        assert_eq!(json["endTime"], "10:30");
        assert_eq!(json["eventDate"], "2025-06-01");
        assert_eq!(json["status"], "pending");
        assert_eq!(json["totalCost"], "100.00");
        assert_eq!(json["paymentStatus"], "unpaid");
        assert!(json["paymentMethod"].is_null());
    }

    #[test]
    fn payment_method_names() {
        for m in PaymentMethod::ALL {
            assert_eq!(m.as_str().parse::<PaymentMethod>().unwrap(), m);
            assert_eq!(serde_json::to_value(m).unwrap(), m.as_str());
        }
        assert_eq!("Mobile_Money".parse::<PaymentMethod>().unwrap(), PaymentMethod::MobileMoney);
        assert!("cheque".parse::<PaymentMethod>().is_err());
    }
}
