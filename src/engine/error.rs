use ulid::Ulid;

use crate::model::{BookingStatus, ConflictDescriptor};

#[derive(Debug)]
pub enum EngineError {
    VenueNotFound(Ulid),
    BookingNotFound(Ulid),
    VenueAlreadyExists(Ulid),
    VenueUnavailable {
        id: Ulid,
        reason: &'static str,
    },
    BookingConflict(Vec<ConflictDescriptor>),
    InvalidState {
        id: Ulid,
        status: BookingStatus,
        operation: &'static str,
    },
    InvalidTransition {
        from: BookingStatus,
        to: BookingStatus,
    },
    PaymentNotAllowed {
        id: Ulid,
        reason: &'static str,
    },
    Validation(String),
    LimitExceeded(&'static str),
    WalError(String),
}

impl EngineError {
    /// Stable kind name surfaced to clients.
    pub fn kind(&self) -> &'static str {
        match self {
            EngineError::VenueNotFound(_) | EngineError::BookingNotFound(_) => "NotFound",
            EngineError::VenueAlreadyExists(_) => "AlreadyExists",
            EngineError::VenueUnavailable { .. } => "VenueUnavailable",
            EngineError::BookingConflict(_) => "BookingConflict",
            EngineError::InvalidState { .. } | EngineError::PaymentNotAllowed { .. } => "InvalidState",
            EngineError::InvalidTransition { .. } => "InvalidTransition",
            EngineError::Validation(_) => "ValidationError",
            EngineError::LimitExceeded(_) => "LimitExceeded",
            EngineError::WalError(_) => "StoreError",
        }
    }

    /// Domain errors are the caller's fault; everything else is infrastructure.
    pub fn is_domain(&self) -> bool {
        !matches!(self, EngineError::WalError(_))
    }
}

impl std::fmt::Display for EngineError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EngineError::VenueNotFound(id) => write!(f, "venue not found: {id}"),
            EngineError::BookingNotFound(id) => write!(f, "booking not found: {id}"),
            EngineError::VenueAlreadyExists(id) => write!(f, "venue already exists: {id}"),
            EngineError::VenueUnavailable { id, reason } => {
                write!(f, "venue {id} is not available for booking: {reason}")
            }
            EngineError::BookingConflict(conflicts) => {
                write!(f, "time slot conflict detected: {} conflicting booking(s)", conflicts.len())
            }
            EngineError::InvalidState { id, status, operation } => {
                write!(f, "cannot {operation} booking {id}: status is {status}, only pending bookings can be modified")
            }
            EngineError::InvalidTransition { from, to } => {
                write!(f, "invalid status transition: {from} -> {to}")
            }
            EngineError::PaymentNotAllowed { id, reason } => write!(f, "booking {id}: {reason}"),
            EngineError::Validation(msg) => write!(f, "validation failed: {msg}"),
            EngineError::LimitExceeded(msg) => write!(f, "limit exceeded: {msg}"),
            EngineError::WalError(e) => write!(f, "WAL error: {e}"),
        }
    }
}

impl std::error::Error for EngineError {}
