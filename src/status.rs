use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AppointmentStatus {
    Scheduled,
    Confirmed,
    InProgress,
    Finished,
    Cancelled,
    NoShow,
    Rescheduled,
}

use AppointmentStatus::*;

/// Legal transitions, source → allowed targets. Terminal statuses have no row
/// entries. Adding a status means adding one row here.
const TRANSITIONS: [(AppointmentStatus, &[AppointmentStatus]); 7] = [
    (Scheduled, &[Confirmed, Cancelled, NoShow]),
    (Confirmed, &[InProgress, Cancelled]),
    (InProgress, &[Finished, Cancelled]),
    (Rescheduled, &[Scheduled, Cancelled]),
    (Finished, &[]),
    (Cancelled, &[]),
    (NoShow, &[]),
];

impl AppointmentStatus {
    pub const ALL: [AppointmentStatus; 7] = [
        Scheduled,
        Confirmed,
        InProgress,
        Finished,
        Cancelled,
        NoShow,
        Rescheduled,
    ];

    /// Statuses that hold their slot and take part in conflict checks.
    pub const CALENDAR_OCCUPYING: [AppointmentStatus; 4] =
        [Scheduled, Confirmed, InProgress, Rescheduled];

    pub fn allowed_targets(self) -> &'static [AppointmentStatus] {
        TRANSITIONS
            .iter()
            .find(|(from, _)| *from == self)
            .map(|(_, to)| *to)
            .unwrap_or(&[])
    }

    pub fn can_transition_to(self, target: AppointmentStatus) -> bool {
        self.allowed_targets().contains(&target)
    }

    pub fn is_terminal(self) -> bool {
        self.allowed_targets().is_empty()
    }

    /// May the appointment's interval still change.
    pub fn is_modifiable(self) -> bool {
        matches!(self, Scheduled | Confirmed | Rescheduled)
    }

    pub fn can_be_cancelled(self) -> bool {
        matches!(self, Scheduled | Confirmed | Rescheduled)
    }

    pub fn occupies_calendar(self) -> bool {
        !self.is_terminal()
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Scheduled => "scheduled",
            Confirmed => "confirmed",
            InProgress => "in_progress",
            Finished => "finished",
            Cancelled => "cancelled",
            NoShow => "no_show",
            Rescheduled => "rescheduled",
        }
    }
}

impl fmt::Display for AppointmentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AppointmentStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        AppointmentStatus::ALL
            .into_iter()
            .find(|status| status.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| format!("unknown status: {s}"))
    }
}

/// Why a status change was refused.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransitionError {
    SameState(AppointmentStatus),
    IllegalTransition {
        current: AppointmentStatus,
        attempted: AppointmentStatus,
        allowed: &'static [AppointmentStatus],
    },
}

impl fmt::Display for TransitionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransitionError::SameState(s) => write!(f, "appointment is already {s}"),
            TransitionError::IllegalTransition {
                current,
                attempted,
                allowed,
            } => {
                write!(f, "illegal transition {current} -> {attempted}; allowed: [")?;
                for (i, s) in allowed.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{s}")?;
                }
                f.write_str("]")
            }
        }
    }
}

impl std::error::Error for TransitionError {}

/// Check that `current -> target` is in the transition table.
pub fn validate(current: AppointmentStatus, target: AppointmentStatus) -> Result<(), TransitionError> {
    if current == target {
        return Err(TransitionError::SameState(current));
    }
    if !current.can_transition_to(target) {
        return Err(TransitionError::IllegalTransition {
            current,
            attempted: target,
            allowed: current.allowed_targets(),
        });
    }
    Ok(())
}
