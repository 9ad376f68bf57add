use std::time::Instant;

use tracing::{debug, info, warn};
use ulid::Ulid;

use crate::limits::*;
use crate::model::*;
use crate::observability::record_operation;
use crate::status::{self, AppointmentStatus};

use super::conflict::validate_slot;
use super::{Engine, EngineError};

fn validate_reason(reason: &str) -> Result<(), EngineError> {
    if reason.len() > MAX_REASON_LEN {
        return Err(EngineError::LimitExceeded("reason too long"));
    }
    Ok(())
}

impl Engine {
    /// Book a new appointment in `Scheduled`.
    pub async fn create(
        &self,
        practitioner_id: Ulid,
        patient_id: Ulid,
        slot: Slot,
        reason: String,
    ) -> Result<Appointment, EngineError> {
        let started = Instant::now();
        let result = self.create_inner(practitioner_id, patient_id, slot, reason).await;
        record_operation("create", started, &result);
        result
    }

    async fn create_inner(
        &self,
        practitioner_id: Ulid,
        patient_id: Ulid,
        slot: Slot,
        reason: String,
    ) -> Result<Appointment, EngineError> {
        validate_slot(&slot)?;
        validate_reason(&reason)?;
        let now = self.clock.now();
        if slot.start < now {
            return Err(EngineError::PastStart {
                start: slot.start,
                now,
            });
        }

        let _calendar = self.lock_calendar(practitioner_id).await;
        if let Some(appointment_id) = self.detector.find_conflict(practitioner_id, slot, None).await? {
            warn!("create rejected: practitioner {practitioner_id} busy with {appointment_id}");
            return Err(EngineError::Conflict {
                practitioner_id,
                appointment_id,
            });
        }

        let appt = Appointment {
            id: Ulid::new(),
            practitioner_id,
            patient_id,
            start: slot.start,
            end: slot.end,
            status: AppointmentStatus::Scheduled,
            reason,
            reschedule_count: 0,
            created_at: now,
            updated_at: now,
        };
        self.store.save(&appt).await?;
        info!(
            "appointment {} created for practitioner {practitioner_id} at {}",
            appt.id, appt.start
        );
        Ok(appt)
    }

    pub async fn confirm(&self, id: Ulid) -> Result<Appointment, EngineError> {
        self.transition("confirm", id, AppointmentStatus::Confirmed).await
    }

    pub async fn start(&self, id: Ulid) -> Result<Appointment, EngineError> {
        self.transition("start", id, AppointmentStatus::InProgress).await
    }

    /// Irrevocable completion. Follow-up work (records, invoicing) is the caller's.
    pub async fn finish(&self, id: Ulid) -> Result<Appointment, EngineError> {
        self.transition("finish", id, AppointmentStatus::Finished).await
    }

    /// Cancel from any non-terminal status. The slot is free as soon as this returns.
    pub async fn cancel(&self, id: Ulid) -> Result<Appointment, EngineError> {
        self.transition("cancel", id, AppointmentStatus::Cancelled).await
    }

    pub async fn mark_no_show(&self, id: Ulid) -> Result<Appointment, EngineError> {
        self.transition("no_show", id, AppointmentStatus::NoShow).await
    }

    async fn transition(
        &self,
        operation: &'static str,
        id: Ulid,
        target: AppointmentStatus,
    ) -> Result<Appointment, EngineError> {
        let started = Instant::now();
        let result = self.transition_inner(id, target).await;
        record_operation(operation, started, &result);
        result
    }

    async fn transition_inner(
        &self,
        id: Ulid,
        target: AppointmentStatus,
    ) -> Result<Appointment, EngineError> {
        let (mut appt, _calendar) = self.resolve_for_write(id).await?;
        if let Err(e) = status::validate(appt.status, target) {
            debug!("appointment {id}: {e}");
            return Err(e.into());
        }

        let from = appt.status;
        appt.status = target;
        appt.updated_at = self.clock.now();
        self.store.save(&appt).await?;
        info!("appointment {id}: {from} -> {target}");
        Ok(appt)
    }

    /// Move an appointment to a new slot. Allowed only while the status
    /// `is_modifiable`; the result is always `Scheduled`, so a confirmed visit
    /// must be confirmed again. `new_reason` of `None` keeps the current reason.
    pub async fn reschedule(
        &self,
        id: Ulid,
        slot: Slot,
        new_reason: Option<String>,
    ) -> Result<Appointment, EngineError> {
        let started = Instant::now();
        let result = self.reschedule_inner(id, slot, new_reason).await;
        record_operation("reschedule", started, &result);
        result
    }

    async fn reschedule_inner(
        &self,
        id: Ulid,
        slot: Slot,
        new_reason: Option<String>,
    ) -> Result<Appointment, EngineError> {
        validate_slot(&slot)?;
        if let Some(reason) = &new_reason {
            validate_reason(reason)?;
        }
        let now = self.clock.now();
        if slot.start < now {
            return Err(EngineError::PastStart {
                start: slot.start,
                now,
            });
        }

        let (mut appt, _calendar) = self.resolve_for_write(id).await?;
        if !appt.status.is_modifiable() {
            debug!("appointment {id}: cannot reschedule while {}", appt.status);
            return Err(EngineError::IllegalTransition {
                current: appt.status,
                attempted: AppointmentStatus::Rescheduled,
                allowed: appt.status.allowed_targets(),
            });
        }

        let practitioner_id = appt.practitioner_id;
        if let Some(appointment_id) = self
            .detector
            .find_conflict(practitioner_id, slot, Some(id))
            .await?
        {
            warn!("reschedule of {id} rejected: practitioner {practitioner_id} busy with {appointment_id}");
            return Err(EngineError::Conflict {
                practitioner_id,
                appointment_id,
            });
        }

        let from = appt.status;
        appt.start = slot.start;
        appt.end = slot.end;
        if let Some(reason) = new_reason {
            appt.reason = reason;
        }
        appt.status = AppointmentStatus::Scheduled;
        appt.reschedule_count += 1;
        appt.updated_at = now;
        self.store.save(&appt).await?;
        info!("appointment {id} rescheduled ({from} -> scheduled), now at {}", appt.start);
        Ok(appt)
    }
}
