use serde::{Deserialize, Serialize};
use ulid::Ulid;

use crate::status::AppointmentStatus;

/// Unix milliseconds, the only time type.
pub type Ms = i64;

pub const MINUTE: Ms = 60_000;
pub const HOUR: Ms = 60 * MINUTE;
pub const DAY: Ms = 24 * HOUR;

/// Half-open interval `[start, end)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Span {
    pub start: Ms,
    pub end: Ms,
}

impl Span {
    pub fn new(start: Ms, end: Ms) -> Self {
        debug_assert!(start < end, "Span start must be before end");
        Self { start, end }
    }

    pub fn duration_ms(&self) -> Ms {
        self.end - self.start
    }

    /// Zero-length spans never overlap anything, themselves included.
    pub fn overlaps(&self, other: &Span) -> bool {
        self.start < other.end && other.start < self.end
    }

    pub fn contains_instant(&self, t: Ms) -> bool {
        self.start <= t && t < self.end
    }
}

/// A requested time slot: the end may be left open until the visit finishes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Slot {
    pub start: Ms,
    pub end: Option<Ms>,
}

impl Slot {
    pub fn new(start: Ms, end: Option<Ms>) -> Self {
        Self { start, end }
    }

    pub fn closed(start: Ms, end: Ms) -> Self {
        Self { start, end: Some(end) }
    }

    pub fn open(start: Ms) -> Self {
        Self { start, end: None }
    }

    /// True when an explicit end does not come strictly after the start.
    pub fn is_degenerate(&self) -> bool {
        self.end.is_some_and(|end| end <= self.start)
    }

    /// The span this slot occupies on the calendar. An open end counts as
    /// `default_duration`.
    pub fn occupied(&self, default_duration: Ms) -> Span {
        let end = self.end.unwrap_or(self.start.saturating_add(default_duration));
        Span { start: self.start, end }
    }
}

/// A scheduled occupation of a practitioner's time for a patient.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Appointment {
    pub id: Ulid,
    pub practitioner_id: Ulid,
    pub patient_id: Ulid,
    pub start: Ms,
    pub end: Option<Ms>,
    pub status: AppointmentStatus,
    pub reason: String,
    pub reschedule_count: u32,
    pub created_at: Ms,
    pub updated_at: Ms,
}

impl Appointment {
    pub fn slot(&self) -> Slot {
        Slot::new(self.start, self.end)
    }

    pub fn occupied(&self, default_duration: Ms) -> Span {
        self.slot().occupied(default_duration)
    }

    /// Whether this appointment currently holds its slot on the calendar.
    pub fn occupies_calendar(&self) -> bool {
        self.status.occupies_calendar()
    }
}

/// The event types. This is the WAL record format.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Event {
    /// Full snapshot of an appointment after a write. Replay keeps the last one per id.
    AppointmentSaved(Appointment),
}

impl Event {
    pub fn appointment_id(&self) -> Ulid {
        match self {
            Event::AppointmentSaved(appt) => appt.id,
        }
    }
}
