mod availability;
mod conflict;
mod error;
mod mutations;
mod queries;
#[cfg(test)]
mod tests;

pub use availability::{coalesce, free_within};
pub use conflict::ConflictDetector;
pub use error::EngineError;

use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::{Mutex, OwnedMutexGuard};
use ulid::Ulid;

use crate::clock::Clock;
use crate::model::*;
use crate::store::AppointmentStore;

pub const DEFAULT_DURATION_MS: Ms = 30 * MINUTE;

/// Appointment lifecycle service. The only writer of appointment status and interval.
///
/// Every write runs under the practitioner's calendar lock, so a conflict check
/// and the save that follows it cannot interleave with another write to the
/// same calendar.
pub struct Engine {
    store: Arc<dyn AppointmentStore>,
    clock: Arc<dyn Clock>,
    detector: ConflictDetector,
    calendars: DashMap<Ulid, Arc<Mutex<()>>>,
}

impl Engine {
    pub fn new(store: Arc<dyn AppointmentStore>, clock: Arc<dyn Clock>) -> Self {
        Self::with_default_duration(store, clock, DEFAULT_DURATION_MS)
    }

    /// `default_duration` is the span an open-ended appointment occupies for
    /// conflict checks. It is never written to the appointment.
    pub fn with_default_duration(
        store: Arc<dyn AppointmentStore>,
        clock: Arc<dyn Clock>,
        default_duration: Ms,
    ) -> Self {
        Self {
            detector: ConflictDetector::new(store.clone(), default_duration),
            store,
            clock,
            calendars: DashMap::new(),
        }
    }

    pub fn default_duration(&self) -> Ms {
        self.detector.default_duration()
    }

    pub fn detector(&self) -> &ConflictDetector {
        &self.detector
    }

    async fn lock_calendar(&self, practitioner_id: Ulid) -> OwnedMutexGuard<()> {
        let lock = self.calendars.entry(practitioner_id).or_default().clone();
        lock.lock_owned().await
    }

    /// Load an appointment and take its practitioner's calendar lock. The
    /// returned copy is re-read under the lock.
    async fn resolve_for_write(
        &self,
        id: Ulid,
    ) -> Result<(Appointment, OwnedMutexGuard<()>), EngineError> {
        let practitioner_id = self
            .store
            .get_by_id(id)
            .await?
            .ok_or(EngineError::NotFound(id))?
            .practitioner_id;
        let guard = self.lock_calendar(practitioner_id).await;
        let appt = self
            .store
            .get_by_id(id)
            .await?
            .ok_or(EngineError::NotFound(id))?;
        Ok((appt, guard))
    }
}
