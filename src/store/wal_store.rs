use std::io;
use std::path::Path;

use async_trait::async_trait;
use tokio::sync::{RwLock, mpsc, oneshot};
use ulid::Ulid;

use crate::model::*;
use crate::status::AppointmentStatus;
use crate::wal::Wal;

use super::{AppointmentStore, InMemoryStore, StoreError};

// ── Group-commit WAL channel ─────────────────────────────

enum WalCommand {
    Append {
        event: Event,
        response: oneshot::Sender<io::Result<()>>,
    },
    Compact {
        events: Vec<Event>,
        response: oneshot::Sender<io::Result<()>>,
    },
    AppendsSinceCompact {
        response: oneshot::Sender<u64>,
    },
}

/// Background task that owns the WAL and batches appends for group commit.
/// 1. Block until the first Append arrives.
/// 2. Buffer it (no fsync).
/// 3. Drain all immediately available Appends (the batch window).
/// 4. Single flush_sync for the whole batch.
/// 5. Respond to all senders.
async fn wal_writer_loop(mut wal: Wal, mut rx: mpsc::Receiver<WalCommand>) {
    while let Some(cmd) = rx.recv().await {
        match cmd {
            WalCommand::Append { event, response } => {
                let mut batch = vec![(event, response)];
                let mut pending = None;

                loop {
                    match rx.try_recv() {
                        Ok(WalCommand::Append { event, response }) => batch.push((event, response)),
                        Ok(other) => {
                            pending = Some(other);
                            break;
                        }
                        Err(_) => break, // drained, flush the batch
                    }
                }

                commit_batch(&mut wal, &mut batch);
                if let Some(other) = pending {
                    handle_non_append(&mut wal, other);
                }
            }
            other => handle_non_append(&mut wal, other),
        }
    }
}

fn commit_batch(wal: &mut Wal, batch: &mut Vec<(Event, oneshot::Sender<io::Result<()>>)>) {
    metrics::histogram!(crate::observability::WAL_FLUSH_BATCH_SIZE).record(batch.len() as f64);
    let flush_start = std::time::Instant::now();
    let result = flush_batch(wal, batch);
    metrics::histogram!(crate::observability::WAL_FLUSH_DURATION_SECONDS)
        .record(flush_start.elapsed().as_secs_f64());
    if let Err(e) = &result {
        tracing::error!("WAL flush of {} events failed: {e}", batch.len());
    }
    for (_, tx) in batch.drain(..) {
        let r = match &result {
            Ok(()) => Ok(()),
            Err(e) => Err(io::Error::new(e.kind(), e.to_string())),
        };
        let _ = tx.send(r);
    }
}

/// Append and sync the whole batch, or leave the log as it was before it.
fn flush_batch(wal: &mut Wal, batch: &[(Event, oneshot::Sender<io::Result<()>>)]) -> io::Result<()> {
    let result = batch
        .iter()
        .try_for_each(|(event, _)| wal.append_buffered(event))
        .and_then(|()| wal.flush_sync());
    if result.is_err()
        && let Err(e) = wal.rollback()
    {
        tracing::error!("WAL rollback after failed batch also failed: {e}");
    }
    result
}

fn handle_non_append(wal: &mut Wal, cmd: WalCommand) {
    match cmd {
        WalCommand::Compact { events, response } => {
            let result = Wal::write_compact_file(wal.path(), &events)
                .and_then(|()| wal.swap_compact_file());
            let _ = response.send(result);
        }
        WalCommand::AppendsSinceCompact { response } => {
            let _ = response.send(wal.appends_since_compact());
        }
        WalCommand::Append { .. } => unreachable!(),
    }
}

/// Durable appointment store: every save is a WAL snapshot record, and the
/// in-memory index is rebuilt from the log on open.
pub struct WalStore {
    index: InMemoryStore,
    wal_tx: mpsc::Sender<WalCommand>,
    /// Saves hold it shared from WAL append to index update; compaction holds
    /// it exclusively so its snapshot cannot miss an appended record.
    compaction: RwLock<()>,
}

impl WalStore {
    /// Replay `wal_path` and start the group-commit writer. Must be called
    /// inside a tokio runtime.
    pub fn open(wal_path: &Path) -> io::Result<Self> {
        let (wal, events) = Wal::recover(wal_path)?;
        let (wal_tx, wal_rx) = mpsc::channel(4096);
        tokio::spawn(wal_writer_loop(wal, wal_rx));

        let index = InMemoryStore::new();
        for event in events {
            match event {
                Event::AppointmentSaved(appt) => index.put(appt),
            }
        }
        tracing::info!("replayed {} appointments from {}", index.len(), wal_path.display());

        Ok(Self {
            index,
            wal_tx,
            compaction: RwLock::new(()),
        })
    }

    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    async fn wal_append(&self, event: Event) -> Result<(), StoreError> {
        let (tx, rx) = oneshot::channel();
        self.wal_tx
            .send(WalCommand::Append { event, response: tx })
            .await
            .map_err(|_| StoreError::Closed)?;
        rx.await
            .map_err(|_| StoreError::Closed)?
            .map_err(|e| StoreError::Io(e.to_string()))
    }

    /// Rewrite the WAL with one snapshot per appointment.
    pub async fn compact(&self) -> Result<(), StoreError> {
        let _exclusive = self.compaction.write().await;
        let mut appointments = self.index.all();
        appointments.sort_by_key(|a| a.id);
        let events = appointments.into_iter().map(Event::AppointmentSaved).collect();

        let (tx, rx) = oneshot::channel();
        self.wal_tx
            .send(WalCommand::Compact { events, response: tx })
            .await
            .map_err(|_| StoreError::Closed)?;
        rx.await
            .map_err(|_| StoreError::Closed)?
            .map_err(|e| StoreError::Io(e.to_string()))
    }

    pub async fn appends_since_compact(&self) -> u64 {
        let (tx, rx) = oneshot::channel();
        if self
            .wal_tx
            .send(WalCommand::AppendsSinceCompact { response: tx })
            .await
            .is_err()
        {
            return 0;
        }
        rx.await.unwrap_or(0)
    }
}

#[async_trait]
impl AppointmentStore for WalStore {
    async fn get_by_id(&self, id: Ulid) -> Result<Option<Appointment>, StoreError> {
        Ok(self.index.get(&id))
    }

    /// Durable before visible: the index only changes once the WAL record is synced.
    async fn save(&self, appointment: &Appointment) -> Result<(), StoreError> {
        let _shared = self.compaction.read().await;
        self.wal_append(Event::AppointmentSaved(appointment.clone())).await?;
        self.index.put(appointment.clone());
        Ok(())
    }

    async fn find_by_practitioner_and_status_in(
        &self,
        practitioner_id: Ulid,
        statuses: &[AppointmentStatus],
        rough_range: Option<Span>,
    ) -> Result<Vec<Appointment>, StoreError> {
        Ok(self.index.practitioner_and_status_in(practitioner_id, statuses, rough_range))
    }

    async fn find_by_status(&self, status: AppointmentStatus) -> Result<Vec<Appointment>, StoreError> {
        Ok(self.index.with_status(status))
    }

    async fn find_starting_in(
        &self,
        practitioner_id: Option<Ulid>,
        range: Span,
    ) -> Result<Vec<Appointment>, StoreError> {
        Ok(self.index.starting_in(practitioner_id, range))
    }
}
