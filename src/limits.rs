pub const MAX_VENUES: usize = 100_000;
pub const MAX_BOOKINGS_PER_DAY: usize = 1_000;
pub const MAX_VENUE_NAME_LEN: usize = 100;

pub const MIN_EVENT_NAME_LEN: usize = 2;
pub const MAX_EVENT_NAME_LEN: usize = 100;
pub const MAX_NOTES_LEN: usize = 500;
pub const MAX_TRANSACTION_ID_LEN: usize = 100;

/// Slot suggestions narrower than this are rejected as validation errors.
pub const MIN_SLOT_MINUTES: u16 = 5;
pub const MAX_SLOT_MINUTES: u16 = 24 * 60;
pub const DEFAULT_SLOT_MINUTES: u16 = 60;

pub const DEFAULT_PAGE_SIZE: usize = 20;
pub const MAX_PAGE_SIZE: usize = 500;

/// Longest accepted SQL line, in bytes.
pub const MAX_LINE_LEN: usize = 64 * 1024;
