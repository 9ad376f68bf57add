use chrono::{NaiveDate, NaiveTime};
use ulid::Ulid;

use crate::limits::*;
use crate::model::*;
use crate::status::AppointmentStatus;

use super::availability::free_within;
use super::{Engine, EngineError};

fn query_window(from: Ms, to: Ms) -> Result<Span, EngineError> {
    if to <= from {
        return Err(EngineError::InvalidInterval {
            start: from,
            end: to,
        });
    }
    let in_range = MIN_VALID_TIMESTAMP_MS..=MAX_VALID_TIMESTAMP_MS;
    if !in_range.contains(&from) || !in_range.contains(&to) {
        return Err(EngineError::LimitExceeded("timestamp out of range"));
    }
    if to - from > MAX_QUERY_WINDOW_MS {
        return Err(EngineError::LimitExceeded("query window too wide"));
    }
    Ok(Span::new(from, to))
}

/// The UTC day `[00:00, next 00:00)` for `date`.
pub(crate) fn day_span(date: NaiveDate) -> Span {
    let start = date.and_time(NaiveTime::MIN).and_utc().timestamp_millis();
    Span::new(start, start + DAY)
}

impl Engine {
    pub async fn get(&self, id: Ulid) -> Result<Appointment, EngineError> {
        self.store
            .get_by_id(id)
            .await?
            .ok_or(EngineError::NotFound(id))
    }

    /// Every appointment of `practitioner_id` starting in `[from, to)`, any status.
    pub async fn list_by_practitioner_and_range(
        &self,
        practitioner_id: Ulid,
        from: Ms,
        to: Ms,
    ) -> Result<Vec<Appointment>, EngineError> {
        let window = query_window(from, to)?;
        Ok(self.store.find_starting_in(Some(practitioner_id), window).await?)
    }

    pub async fn list_by_status(
        &self,
        status: AppointmentStatus,
    ) -> Result<Vec<Appointment>, EngineError> {
        Ok(self.store.find_by_status(status).await?)
    }

    /// Appointments starting on `date` (UTC), across all practitioners.
    pub async fn list_by_date(&self, date: NaiveDate) -> Result<Vec<Appointment>, EngineError> {
        Ok(self.store.find_starting_in(None, day_span(date)).await?)
    }

    /// Whether `slot` could be booked for `practitioner_id` right now. Does not
    /// reserve anything.
    pub async fn is_available(&self, practitioner_id: Ulid, slot: Slot) -> Result<bool, EngineError> {
        Ok(!self.detector.has_conflict(practitioner_id, slot, None).await?)
    }

    /// Free gaps in `practitioner_id`'s calendar within `[from, to)`, optionally
    /// dropping gaps shorter than `min_duration`.
    pub async fn free_spans(
        &self,
        practitioner_id: Ulid,
        from: Ms,
        to: Ms,
        min_duration: Option<Ms>,
    ) -> Result<Vec<Span>, EngineError> {
        let window = query_window(from, to)?;
        let default_duration = self.default_duration();
        let occupied: Vec<Span> = self
            .store
            .find_by_practitioner_and_status_in(
                practitioner_id,
                &AppointmentStatus::CALENDAR_OCCUPYING,
                Some(window),
            )
            .await?
            .iter()
            .map(|a| a.occupied(default_duration))
            .collect();

        let mut free = free_within(&window, &occupied);
        if let Some(min) = min_duration {
            free.retain(|span| span.duration_ms() >= min);
        }
        Ok(free)
    }
}
