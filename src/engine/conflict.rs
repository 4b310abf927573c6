use ulid::Ulid;

use crate::limits::*;
use crate::model::*;
use crate::timeslot::{TimeOfDay, TimeRange};

use super::EngineError;

pub fn now_ms() -> Ms {
    chrono::Utc::now().timestamp_millis()
}

/// Reject zero-length and inverted intervals.
pub fn validate_range(start: TimeOfDay, end: TimeOfDay) -> Result<TimeRange, EngineError> {
    TimeRange::new(start, end).ok_or_else(|| {
        EngineError::Validation(format!("end time {end} must be after start time {start}"))
    })
}

pub(crate) fn validate_event_name(name: &str) -> Result<String, EngineError> {
    let trimmed = name.trim();
    let len = trimmed.chars().count();
    if !(MIN_EVENT_NAME_LEN..=MAX_EVENT_NAME_LEN).contains(&len) {
        return Err(EngineError::Validation(format!(
            "event name must be {MIN_EVENT_NAME_LEN}-{MAX_EVENT_NAME_LEN} characters"
        )));
    }
    Ok(trimmed.to_string())
}

pub(crate) fn validate_notes(notes: Option<String>) -> Result<Option<String>, EngineError> {
    match notes {
        Some(n) if n.chars().count() > MAX_NOTES_LEN => Err(EngineError::Validation(format!(
            "notes cannot exceed {MAX_NOTES_LEN} characters"
        ))),
        Some(n) if n.trim().is_empty() => Ok(None),
        other => Ok(other),
    }
}

/// Trimmed transaction reference; blank counts as none.
pub(crate) fn validate_transaction_id(id: Option<String>) -> Result<Option<String>, EngineError> {
    let Some(id) = id.map(|s| s.trim().to_string()).filter(|s| !s.is_empty()) else {
        return Ok(None);
    };
    if id.chars().count() > MAX_TRANSACTION_ID_LEN {
        return Err(EngineError::LimitExceeded("transaction id too long"));
    }
    Ok(Some(id))
}

/// Fails with every active booking overlapping `range`, in start order.
/// `exclude` skips the booking being edited.
pub(crate) fn check_no_conflict(
    day: &DaySchedule,
    range: &TimeRange,
    exclude: Option<Ulid>,
) -> Result<(), EngineError> {
    let conflicts: Vec<ConflictDescriptor> = day
        .overlapping(range)
        .filter(|b| Some(b.id) != exclude)
        .map(ConflictDescriptor::from)
        .collect();
    if conflicts.is_empty() {
        return Ok(());
    }
    metrics::counter!(crate::observability::BOOKING_CONFLICTS_TOTAL).increment(1);
    tracing::debug!(
        "{} conflict(s) for {range} on venue {} {}",
        conflicts.len(),
        day.key.venue_id,
        day.key.date
    );
    Err(EngineError::BookingConflict(conflicts))
}
