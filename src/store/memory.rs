use async_trait::async_trait;
use dashmap::DashMap;
use ulid::Ulid;

use crate::model::*;
use crate::status::AppointmentStatus;

use super::{AppointmentStore, StoreError};

pub struct InMemoryStore {
    appointments: DashMap<Ulid, Appointment>,
    /// Practitioner → appointment ids, for per-calendar scans.
    by_practitioner: DashMap<Ulid, Vec<Ulid>>,
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

fn sort_by_start(appointments: &mut [Appointment]) {
    appointments.sort_by(|a, b| a.start.cmp(&b.start).then(a.id.cmp(&b.id)));
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self {
            appointments: DashMap::new(),
            by_practitioner: DashMap::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.appointments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.appointments.is_empty()
    }

    pub fn get(&self, id: &Ulid) -> Option<Appointment> {
        self.appointments.get(id).map(|e| e.value().clone())
    }

    pub fn put(&self, appointment: Appointment) {
        let id = appointment.id;
        let practitioner_id = appointment.practitioner_id;
        let previous = self.appointments.insert(id, appointment);

        match previous {
            Some(prev) if prev.practitioner_id == practitioner_id => {}
            Some(prev) => {
                if let Some(mut ids) = self.by_practitioner.get_mut(&prev.practitioner_id) {
                    ids.retain(|a| a != &id);
                }
                self.by_practitioner.entry(practitioner_id).or_default().push(id);
            }
            None => self.by_practitioner.entry(practitioner_id).or_default().push(id),
        }
    }

    /// Snapshot of every stored appointment, in no particular order.
    pub fn all(&self) -> Vec<Appointment> {
        self.appointments.iter().map(|e| e.value().clone()).collect()
    }

    fn practitioner_appointments(&self, practitioner_id: &Ulid) -> Vec<Appointment> {
        let ids = self
            .by_practitioner
            .get(practitioner_id)
            .map(|e| e.value().clone())
            .unwrap_or_default();
        ids.iter().filter_map(|id| self.get(id)).collect()
    }

    pub fn practitioner_and_status_in(
        &self,
        practitioner_id: Ulid,
        statuses: &[AppointmentStatus],
        rough_range: Option<Span>,
    ) -> Vec<Appointment> {
        let mut found: Vec<Appointment> = self
            .practitioner_appointments(&practitioner_id)
            .into_iter()
            .filter(|a| statuses.contains(&a.status))
            .filter(|a| {
                rough_range.is_none_or(|range| {
                    a.start < range.end && a.end.is_none_or(|end| end > range.start)
                })
            })
            .collect();
        sort_by_start(&mut found);
        found
    }

    pub fn with_status(&self, status: AppointmentStatus) -> Vec<Appointment> {
        let mut found: Vec<Appointment> = self
            .appointments
            .iter()
            .filter(|e| e.value().status == status)
            .map(|e| e.value().clone())
            .collect();
        sort_by_start(&mut found);
        found
    }

    pub fn starting_in(&self, practitioner_id: Option<Ulid>, range: Span) -> Vec<Appointment> {
        let candidates = match practitioner_id {
            Some(pid) => self.practitioner_appointments(&pid),
            None => self.all(),
        };
        let mut found: Vec<Appointment> = candidates
            .into_iter()
            .filter(|a| range.contains_instant(a.start))
            .collect();
        sort_by_start(&mut found);
        found
    }
}

#[async_trait]
impl AppointmentStore for InMemoryStore {
    async fn get_by_id(&self, id: Ulid) -> Result<Option<Appointment>, StoreError> {
        Ok(self.get(&id))
    }

    async fn save(&self, appointment: &Appointment) -> Result<(), StoreError> {
        self.put(appointment.clone());
        Ok(())
    }

    async fn find_by_practitioner_and_status_in(
        &self,
        practitioner_id: Ulid,
        statuses: &[AppointmentStatus],
        rough_range: Option<Span>,
    ) -> Result<Vec<Appointment>, StoreError> {
        Ok(self.practitioner_and_status_in(practitioner_id, statuses, rough_range))
    }

    async fn find_by_status(&self, status: AppointmentStatus) -> Result<Vec<Appointment>, StoreError> {
        Ok(self.with_status(status))
    }

    async fn find_starting_in(
        &self,
        practitioner_id: Option<Ulid>,
        range: Span,
    ) -> Result<Vec<Appointment>, StoreError> {
        Ok(self.starting_in(practitioner_id, range))
    }
}
