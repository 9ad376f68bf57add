use ulid::Ulid;

use crate::model::Ms;
use crate::status::{AppointmentStatus, TransitionError};
use crate::store::StoreError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineError {
    NotFound(Ulid),
    /// `end` does not come strictly after `start`.
    InvalidInterval { start: Ms, end: Ms },
    PastStart { start: Ms, now: Ms },
    /// The requested status is already the current one. Callers retrying an
    /// operation treat this as success.
    SameState(AppointmentStatus),
    IllegalTransition {
        current: AppointmentStatus,
        attempted: AppointmentStatus,
        allowed: &'static [AppointmentStatus],
    },
    Conflict {
        practitioner_id: Ulid,
        appointment_id: Ulid,
    },
    LimitExceeded(&'static str),
    StorageFailure(String),
}

impl EngineError {
    /// Only storage failures are worth retrying; everything else is caller input.
    pub fn is_retryable(&self) -> bool {
        matches!(self, EngineError::StorageFailure(_))
    }

    pub fn is_already_applied(&self) -> bool {
        matches!(self, EngineError::SameState(_))
    }

    /// Short label for metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            EngineError::NotFound(_) => "not_found",
            EngineError::InvalidInterval { .. } => "invalid_interval",
            EngineError::PastStart { .. } => "past_start",
            EngineError::SameState(_) => "same_state",
            EngineError::IllegalTransition { .. } => "illegal_transition",
            EngineError::Conflict { .. } => "conflict",
            EngineError::LimitExceeded(_) => "limit_exceeded",
            EngineError::StorageFailure(_) => "storage_failure",
        }
    }
}

impl std::fmt::Display for EngineError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EngineError::NotFound(id) => write!(f, "appointment not found: {id}"),
            EngineError::InvalidInterval { start, end } => {
                write!(f, "invalid interval [{start}, {end}): end must be after start")
            }
            EngineError::PastStart { start, now } => {
                write!(f, "start {start} is in the past (now {now})")
            }
            EngineError::SameState(status) => {
                write!(f, "{}", TransitionError::SameState(*status))
            }
            EngineError::IllegalTransition {
                current,
                attempted,
                allowed,
            } => write!(
                f,
                "{}",
                TransitionError::IllegalTransition {
                    current: *current,
                    attempted: *attempted,
                    allowed: *allowed,
                }
            ),
            EngineError::Conflict {
                practitioner_id,
                appointment_id,
            } => write!(
                f,
                "practitioner {practitioner_id} is booked by appointment {appointment_id}"
            ),
            EngineError::LimitExceeded(msg) => write!(f, "limit exceeded: {msg}"),
            EngineError::StorageFailure(e) => write!(f, "storage failure: {e}"),
        }
    }
}

impl std::error::Error for EngineError {}

impl From<TransitionError> for EngineError {
    fn from(e: TransitionError) -> Self {
        match e {
            TransitionError::SameState(status) => EngineError::SameState(status),
            TransitionError::IllegalTransition {
                current,
                attempted,
                allowed,
            } => EngineError::IllegalTransition {
                current,
                attempted,
                allowed,
            },
        }
    }
}

impl From<StoreError> for EngineError {
    fn from(e: StoreError) -> Self {
        EngineError::StorageFailure(e.to_string())
    }
}
