mod memory;
mod wal_store;

pub use memory::InMemoryStore;
pub use wal_store::WalStore;

use async_trait::async_trait;
use ulid::Ulid;

use crate::model::{Appointment, Span};
use crate::status::AppointmentStatus;

/// Persistence collaborator for appointments. The lifecycle engine is the only writer.
#[async_trait]
pub trait AppointmentStore: Send + Sync {
    async fn get_by_id(&self, id: Ulid) -> Result<Option<Appointment>, StoreError>;

    /// Insert or overwrite the appointment with the same id.
    async fn save(&self, appointment: &Appointment) -> Result<(), StoreError>;

    /// Appointments of one practitioner whose status is in `statuses`.
    ///
    /// With `rough_range`, the result may be a superset of the appointments
    /// intersecting that range but must never miss one. Open-ended appointments
    /// starting before `range.end` are always included.
    async fn find_by_practitioner_and_status_in(
        &self,
        practitioner_id: Ulid,
        statuses: &[AppointmentStatus],
        rough_range: Option<Span>,
    ) -> Result<Vec<Appointment>, StoreError>;

    async fn find_by_status(&self, status: AppointmentStatus) -> Result<Vec<Appointment>, StoreError>;

    /// Appointments whose start lies in `[range.start, range.end)`, optionally
    /// restricted to one practitioner. Sorted by start.
    async fn find_starting_in(
        &self,
        practitioner_id: Option<Ulid>,
        range: Span,
    ) -> Result<Vec<Appointment>, StoreError>;
}

#[derive(Debug)]
pub enum StoreError {
    Io(String),
    Closed,
}

impl std::fmt::Display for StoreError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StoreError::Io(e) => write!(f, "storage I/O error: {e}"),
            StoreError::Closed => write!(f, "storage writer shut down"),
        }
    }
}

impl std::error::Error for StoreError {}
