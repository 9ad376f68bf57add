use std::sync::Arc;

use ulid::Ulid;

use crate::limits::*;
use crate::model::*;
use crate::status::AppointmentStatus;
use crate::store::AppointmentStore;

use super::EngineError;

/// Reject degenerate or out-of-range slots before anything touches the store.
/// Range checks come first so the duration arithmetic cannot overflow.
pub(crate) fn validate_slot(slot: &Slot) -> Result<(), EngineError> {
    if !(MIN_VALID_TIMESTAMP_MS..=MAX_VALID_TIMESTAMP_MS).contains(&slot.start) {
        return Err(EngineError::LimitExceeded("timestamp out of range"));
    }
    if let Some(end) = slot.end {
        if end <= slot.start {
            return Err(EngineError::InvalidInterval {
                start: slot.start,
                end,
            });
        }
        if end > MAX_VALID_TIMESTAMP_MS {
            return Err(EngineError::LimitExceeded("timestamp out of range"));
        }
        if end - slot.start > MAX_APPOINTMENT_DURATION_MS {
            return Err(EngineError::LimitExceeded("appointment too long"));
        }
    }
    Ok(())
}

/// First appointment in `candidates` whose occupied span overlaps `span`.
/// Terminal appointments and `exclude` are skipped.
pub(crate) fn first_overlap(
    candidates: &[Appointment],
    span: &Span,
    exclude: Option<Ulid>,
    default_duration: Ms,
) -> Option<Ulid> {
    candidates
        .iter()
        .filter(|a| a.occupies_calendar())
        .filter(|a| Some(a.id) != exclude)
        .find(|a| a.occupied(default_duration).overlaps(span))
        .map(|a| a.id)
}

/// Answers "is this practitioner free for this slot" against the store.
pub struct ConflictDetector {
    store: Arc<dyn AppointmentStore>,
    default_duration: Ms,
}

impl ConflictDetector {
    pub fn new(store: Arc<dyn AppointmentStore>, default_duration: Ms) -> Self {
        Self {
            store,
            default_duration,
        }
    }

    pub fn default_duration(&self) -> Ms {
        self.default_duration
    }

    /// Id of an appointment blocking `slot`, if any. The store query is coarse;
    /// the exact overlap test happens here.
    pub async fn find_conflict(
        &self,
        practitioner_id: Ulid,
        slot: Slot,
        exclude: Option<Ulid>,
    ) -> Result<Option<Ulid>, EngineError> {
        validate_slot(&slot)?;
        let span = slot.occupied(self.default_duration);
        let candidates = self
            .store
            .find_by_practitioner_and_status_in(
                practitioner_id,
                &AppointmentStatus::CALENDAR_OCCUPYING,
                Some(span),
            )
            .await?;
        Ok(first_overlap(&candidates, &span, exclude, self.default_duration))
    }

    pub async fn has_conflict(
        &self,
        practitioner_id: Ulid,
        slot: Slot,
        exclude: Option<Ulid>,
    ) -> Result<bool, EngineError> {
        Ok(self.find_conflict(practitioner_id, slot, exclude).await?.is_some())
    }
}
