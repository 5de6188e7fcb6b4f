use ulid::Ulid;

use crate::lifecycle::LifecycleStatus;
use crate::model::Day;

#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("invalid {field}: {reason}")]
    Validation { field: &'static str, reason: String },
    #[error("resource not found: {0}")]
    ResourceNotFound(Ulid),
    #[error("reservation not found: {0}")]
    ReservationNotFound(Ulid),
    #[error("report not found: {0}")]
    ReportNotFound(Ulid),
    /// Only the holder's email is disclosed to the losing booker.
    #[error("resource {resource_id} is already booked on {date} by {holder_email}")]
    Conflict {
        resource_id: Ulid,
        date: Day,
        holder_email: String,
    },
    #[error("forbidden: {0}")]
    Forbidden(&'static str),
    #[error("invalid transition: {from} -> {to}")]
    InvalidTransition {
        from: LifecycleStatus,
        to: LifecycleStatus,
    },
    #[error("stale revision on {id}: expected {expected}, found {found}")]
    StaleRevision { id: Ulid, expected: u64, found: u64 },
    #[error("already exists: {0}")]
    AlreadyExists(String),
    #[error("limit exceeded: {0}")]
    LimitExceeded(&'static str),
    #[error("WAL error: {0}")]
    WalError(String),
}

impl EngineError {
    pub(crate) fn validation(field: &'static str, reason: impl Into<String>) -> Self {
        EngineError::Validation {
            field,
            reason: reason.into(),
        }
    }

    /// Short label for metrics.
    pub fn label(&self) -> &'static str {
        match self {
            EngineError::Validation { .. } => "validation",
            EngineError::ResourceNotFound(_)
            | EngineError::ReservationNotFound(_)
            | EngineError::ReportNotFound(_) => "not_found",
            EngineError::Conflict { .. } => "conflict",
            EngineError::Forbidden(_) => "forbidden",
            EngineError::InvalidTransition { .. } => "invalid_transition",
            EngineError::StaleRevision { .. } => "stale_revision",
            EngineError::AlreadyExists(_) => "already_exists",
            EngineError::LimitExceeded(_) => "limit_exceeded",
            EngineError::WalError(_) => "wal_error",
        }
    }
}
