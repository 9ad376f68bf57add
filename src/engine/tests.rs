use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use chrono::NaiveDate;

use super::*;
use crate::clock::FixedClock;
use crate::status::AppointmentStatus::{self, *};
use crate::store::{InMemoryStore, StoreError};

const M: Ms = MINUTE;
const H: Ms = HOUR;

fn at(year: i32, month: u32, day: u32, hour: u32, min: u32) -> Ms {
    NaiveDate::from_ymd_opt(year, month, day)
        .unwrap()
        .and_hms_opt(hour, min, 0)
        .unwrap()
        .and_utc()
        .timestamp_millis()
}

/// 2025-03-01T09:00Z
fn nine() -> Ms {
    at(2025, 3, 1, 9, 0)
}

fn setup() -> (Engine, Arc<InMemoryStore>, Arc<FixedClock>) {
    let store = Arc::new(InMemoryStore::new());
    let clock = Arc::new(FixedClock::new(at(2025, 2, 28, 12, 0)));
    let engine = Engine::new(store.clone(), clock.clone());
    (engine, store, clock)
}

async fn book(engine: &Engine, vet: Ulid, start: Ms, end: Ms) -> Result<Appointment, EngineError> {
    engine
        .create(vet, Ulid::new(), Slot::closed(start, end), "Checkup".into())
        .await
}

// ── Creation and conflicts ───────────────────────────────

#[tokio::test]
async fn end_to_end_visit() {
    let (engine, store, _) = setup();
    let (vet_a, pet_x) = (Ulid::new(), Ulid::new());

    let appt = engine
        .create(vet_a, pet_x, Slot::closed(nine(), nine() + 30 * M), "Annual vaccination".into())
        .await
        .unwrap();
    assert_eq!(appt.status, Scheduled);
    assert_eq!(appt.patient_id, pet_x);

    assert_eq!(engine.confirm(appt.id).await.unwrap().status, Confirmed);
    assert_eq!(engine.start(appt.id).await.unwrap().status, InProgress);
    let done = engine.finish(appt.id).await.unwrap();
    assert_eq!(done.status, Finished);
    assert!(done.status.is_terminal());
    assert_eq!(store.get(&appt.id), Some(done));

    // Finished no longer holds the slot.
    assert!(engine
        .is_available(vet_a, Slot::closed(nine(), nine() + 30 * M))
        .await
        .unwrap());
}

#[tokio::test]
async fn overlapping_booking_conflicts_adjacent_succeeds() {
    let (engine, _, _) = setup();
    let vet = Ulid::new();
    let first = book(&engine, vet, nine(), nine() + 30 * M).await.unwrap();

    let overlap = book(&engine, vet, nine() + 15 * M, nine() + 45 * M).await;
    assert_eq!(
        overlap,
        Err(EngineError::Conflict {
            practitioner_id: vet,
            appointment_id: first.id,
        })
    );

    book(&engine, vet, nine() + 30 * M, nine() + 60 * M).await.unwrap();
    book(&engine, vet, nine() - 30 * M, nine()).await.unwrap();
}

#[tokio::test]
async fn other_practitioner_unaffected() {
    let (engine, _, _) = setup();
    book(&engine, Ulid::new(), nine(), nine() + H).await.unwrap();
    book(&engine, Ulid::new(), nine(), nine() + H).await.unwrap();
}

#[tokio::test]
async fn containing_booking_conflicts() {
    let (engine, _, _) = setup();
    let vet = Ulid::new();
    book(&engine, vet, nine() + 10 * M, nine() + 20 * M).await.unwrap();
    let result = book(&engine, vet, nine(), nine() + H).await;
    assert!(matches!(result, Err(EngineError::Conflict { .. })));
}

#[tokio::test]
async fn open_ended_appointment_blocks_default_duration() {
    let (engine, store, _) = setup();
    let vet = Ulid::new();
    let open = engine
        .create(vet, Ulid::new(), Slot::open(nine()), "Walk-in".into())
        .await
        .unwrap();
    assert_eq!(open.end, None);
    assert_eq!(store.get(&open.id).unwrap().end, None);

    let result = book(&engine, vet, nine() + 20 * M, nine() + 40 * M).await;
    assert!(matches!(result, Err(EngineError::Conflict { appointment_id, .. }) if appointment_id == open.id));

    book(&engine, vet, nine() + 30 * M, nine() + 60 * M).await.unwrap();
}

#[tokio::test]
async fn open_ended_candidate_uses_default_duration() {
    let (engine, _, _) = setup();
    let vet = Ulid::new();
    book(&engine, vet, nine() + 25 * M, nine() + 40 * M).await.unwrap();

    let result = engine
        .create(vet, Ulid::new(), Slot::open(nine()), "Walk-in".into())
        .await;
    assert!(matches!(result, Err(EngineError::Conflict { .. })));

    engine
        .create(vet, Ulid::new(), Slot::open(nine() - 30 * M), "Walk-in".into())
        .await
        .unwrap();
}

#[tokio::test]
async fn custom_default_duration() {
    let store = Arc::new(InMemoryStore::new());
    let clock = Arc::new(FixedClock::new(0));
    let engine = Engine::with_default_duration(store, clock, H);
    assert_eq!(engine.default_duration(), H);

    let vet = Ulid::new();
    engine
        .create(vet, Ulid::new(), Slot::open(nine()), "Surgery consult".into())
        .await
        .unwrap();
    let result = book(&engine, vet, nine() + 45 * M, nine() + 50 * M).await;
    assert!(matches!(result, Err(EngineError::Conflict { .. })));
}

#[tokio::test]
async fn degenerate_interval_rejected_before_store() {
    let (engine, store, _) = setup();
    let vet = Ulid::new();

    let zero = book(&engine, vet, nine(), nine()).await;
    assert_eq!(zero, Err(EngineError::InvalidInterval { start: nine(), end: nine() }));

    let backwards = book(&engine, vet, nine(), nine() - M).await;
    assert!(matches!(backwards, Err(EngineError::InvalidInterval { .. })));

    assert!(store.is_empty());
}

#[tokio::test]
async fn past_start_rejected() {
    let (engine, store, clock) = setup();
    let vet = Ulid::new();
    clock.set(nine() + M);

    let result = book(&engine, vet, nine(), nine() + 30 * M).await;
    assert_eq!(result, Err(EngineError::PastStart { start: nine(), now: nine() + M }));
    assert!(store.is_empty());

    // Starting exactly now is fine.
    clock.set(nine());
    book(&engine, vet, nine(), nine() + 30 * M).await.unwrap();
}

#[tokio::test]
async fn limits_enforced() {
    let (engine, store, _) = setup();
    let vet = Ulid::new();

    let long_reason = "x".repeat(crate::limits::MAX_REASON_LEN + 1);
    let result = engine
        .create(vet, Ulid::new(), Slot::closed(nine(), nine() + H), long_reason)
        .await;
    assert_eq!(result, Err(EngineError::LimitExceeded("reason too long")));

    let result = book(&engine, vet, nine(), nine() + 25 * H).await;
    assert_eq!(result, Err(EngineError::LimitExceeded("appointment too long")));

    let result = book(&engine, vet, 0, 30 * M).await;
    assert_eq!(result, Err(EngineError::LimitExceeded("timestamp out of range")));

    assert!(store.is_empty());
}

#[tokio::test]
async fn extreme_timestamps_are_rejected_not_overflowed() {
    let (engine, store, _) = setup();
    let vet = Ulid::new();
    let out_of_range = EngineError::LimitExceeded("timestamp out of range");

    assert_eq!(book(&engine, vet, i64::MIN, 0).await.unwrap_err(), out_of_range);
    assert_eq!(book(&engine, vet, nine(), i64::MAX).await.unwrap_err(), out_of_range);
    let open = engine
        .create(vet, Ulid::new(), Slot::open(i64::MAX), String::new())
        .await;
    assert_eq!(open.unwrap_err(), out_of_range);

    let appt = book(&engine, vet, nine(), nine() + 30 * M).await.unwrap();
    let moved = engine.reschedule(appt.id, Slot::closed(i64::MIN, i64::MAX), None).await;
    assert_eq!(moved.unwrap_err(), out_of_range);

    let listed = engine.list_by_practitioner_and_range(vet, i64::MIN, 0).await;
    assert_eq!(listed.unwrap_err(), out_of_range);
    let listed = engine.list_by_practitioner_and_range(vet, nine(), i64::MAX).await;
    assert_eq!(listed.unwrap_err(), out_of_range);
    let free = engine.free_spans(vet, i64::MIN, i64::MAX, None).await;
    assert_eq!(free.unwrap_err(), out_of_range);

    let available = engine.is_available(vet, Slot::open(i64::MAX)).await;
    assert_eq!(available.unwrap_err(), out_of_range);
    let conflict = engine
        .detector()
        .has_conflict(vet, Slot::closed(i64::MIN, 0), None)
        .await;
    assert_eq!(conflict.unwrap_err(), out_of_range);

    assert_eq!(store.len(), 1);
}

// ── Status transitions ───────────────────────────────────

#[tokio::test]
async fn start_requires_confirmation() {
    let (engine, store, _) = setup();
    let appt = book(&engine, Ulid::new(), nine(), nine() + 30 * M).await.unwrap();

    let result = engine.start(appt.id).await;
    assert_eq!(
        result,
        Err(EngineError::IllegalTransition {
            current: Scheduled,
            attempted: InProgress,
            allowed: &[Confirmed, Cancelled, NoShow],
        })
    );
    assert_eq!(store.get(&appt.id), Some(appt));
}

#[tokio::test]
async fn repeated_confirm_is_same_state() {
    let (engine, store, clock) = setup();
    let appt = book(&engine, Ulid::new(), nine(), nine() + 30 * M).await.unwrap();
    clock.advance(M);
    let confirmed = engine.confirm(appt.id).await.unwrap();
    assert_eq!(confirmed.updated_at, appt.updated_at + M);

    clock.advance(M);
    let err = engine.confirm(appt.id).await.unwrap_err();
    assert_eq!(err, EngineError::SameState(Confirmed));
    assert!(err.is_already_applied());
    assert!(!err.is_retryable());
    assert_eq!(store.get(&appt.id), Some(confirmed));
}

#[tokio::test]
async fn terminal_statuses_reject_everything() {
    let (engine, store, _) = setup();
    let vet = Ulid::new();

    let finished = book(&engine, vet, nine(), nine() + 30 * M).await.unwrap();
    engine.confirm(finished.id).await.unwrap();
    engine.start(finished.id).await.unwrap();
    engine.finish(finished.id).await.unwrap();

    let cancelled = book(&engine, vet, nine() + H, nine() + 2 * H).await.unwrap();
    engine.cancel(cancelled.id).await.unwrap();

    let no_show = book(&engine, vet, nine() + 2 * H, nine() + 3 * H).await.unwrap();
    engine.mark_no_show(no_show.id).await.unwrap();

    for (id, terminal) in [(finished.id, Finished), (cancelled.id, Cancelled), (no_show.id, NoShow)] {
        let before = store.get(&id).unwrap();
        let attempts = [
            (Confirmed, engine.confirm(id).await),
            (InProgress, engine.start(id).await),
            (Finished, engine.finish(id).await),
            (Cancelled, engine.cancel(id).await),
            (NoShow, engine.mark_no_show(id).await),
        ];
        for (target, result) in attempts {
            if target == terminal {
                assert_eq!(result, Err(EngineError::SameState(terminal)));
            } else {
                assert_eq!(
                    result,
                    Err(EngineError::IllegalTransition {
                        current: terminal,
                        attempted: target,
                        allowed: &[],
                    }),
                );
            }
        }

        let moved = engine
            .reschedule(id, Slot::closed(nine() + 5 * H, nine() + 6 * H), None)
            .await;
        assert!(matches!(moved, Err(EngineError::IllegalTransition { current, .. }) if current == terminal));
        assert_eq!(store.get(&id), Some(before));
    }
}

#[tokio::test]
async fn cancel_frees_slot() {
    let (engine, _, _) = setup();
    let vet = Ulid::new();
    let appt = book(&engine, vet, nine(), nine() + 30 * M).await.unwrap();
    assert!(book(&engine, vet, nine(), nine() + 30 * M).await.is_err());

    let cancelled = engine.cancel(appt.id).await.unwrap();
    assert_eq!(cancelled.status, Cancelled);

    book(&engine, vet, nine(), nine() + 30 * M).await.unwrap();
}

#[tokio::test]
async fn no_show_frees_slot() {
    let (engine, _, _) = setup();
    let vet = Ulid::new();
    let appt = book(&engine, vet, nine(), nine() + 30 * M).await.unwrap();
    engine.mark_no_show(appt.id).await.unwrap();
    book(&engine, vet, nine(), nine() + 30 * M).await.unwrap();
}

#[tokio::test]
async fn cancel_in_progress_is_allowed() {
    let (engine, _, _) = setup();
    let appt = book(&engine, Ulid::new(), nine(), nine() + 30 * M).await.unwrap();
    engine.confirm(appt.id).await.unwrap();
    let started = engine.start(appt.id).await.unwrap();
    assert!(!started.status.can_be_cancelled());

    assert_eq!(engine.cancel(appt.id).await.unwrap().status, Cancelled);
}

#[tokio::test]
async fn no_show_only_from_scheduled() {
    let (engine, _, _) = setup();
    let appt = book(&engine, Ulid::new(), nine(), nine() + 30 * M).await.unwrap();
    engine.confirm(appt.id).await.unwrap();
    let result = engine.mark_no_show(appt.id).await;
    assert!(matches!(
        result,
        Err(EngineError::IllegalTransition { current: Confirmed, attempted: NoShow, .. })
    ));
}

#[tokio::test]
async fn unknown_id_not_found() {
    let (engine, _, _) = setup();
    let id = Ulid::new();
    assert_eq!(engine.get(id).await, Err(EngineError::NotFound(id)));
    assert_eq!(engine.confirm(id).await, Err(EngineError::NotFound(id)));
    assert_eq!(engine.start(id).await, Err(EngineError::NotFound(id)));
    assert_eq!(engine.finish(id).await, Err(EngineError::NotFound(id)));
    assert_eq!(engine.cancel(id).await, Err(EngineError::NotFound(id)));
    assert_eq!(engine.mark_no_show(id).await, Err(EngineError::NotFound(id)));
    assert_eq!(
        engine.reschedule(id, Slot::closed(nine(), nine() + H), None).await,
        Err(EngineError::NotFound(id))
    );
}

// ── Reschedule ───────────────────────────────────────────

#[tokio::test]
async fn reschedule_into_other_appointment_conflicts() {
    let (engine, store, _) = setup();
    let vet = Ulid::new();
    let first = book(&engine, vet, nine(), nine() + 30 * M).await.unwrap();
    let second = book(&engine, vet, nine() + H, nine() + H + 30 * M).await.unwrap();

    let result = engine
        .reschedule(second.id, Slot::closed(nine() + 15 * M, nine() + 45 * M), None)
        .await;
    assert_eq!(
        result,
        Err(EngineError::Conflict {
            practitioner_id: vet,
            appointment_id: first.id,
        })
    );
    assert_eq!(store.get(&second.id), Some(second));
}

#[tokio::test]
async fn reschedule_overlapping_own_slot() {
    let (engine, store, _) = setup();
    let vet = Ulid::new();
    let appt = book(&engine, vet, nine(), nine() + 30 * M).await.unwrap();

    let moved = engine
        .reschedule(appt.id, Slot::closed(nine() + 15 * M, nine() + 45 * M), None)
        .await
        .unwrap();
    assert_eq!(moved.start, nine() + 15 * M);
    assert_eq!(moved.end, Some(nine() + 45 * M));
    assert_eq!(moved.status, Scheduled);
    assert_eq!(moved.reschedule_count, 1);
    assert_eq!(moved.reason, "Checkup");
    assert_eq!(store.get(&appt.id), Some(moved));

    // The old slot start is free again.
    book(&engine, vet, nine(), nine() + 15 * M).await.unwrap();
}

#[tokio::test]
async fn reschedule_confirmed_requires_reconfirmation() {
    let (engine, _, _) = setup();
    let appt = book(&engine, Ulid::new(), nine(), nine() + 30 * M).await.unwrap();
    engine.confirm(appt.id).await.unwrap();

    let moved = engine
        .reschedule(
            appt.id,
            Slot::closed(nine() + 2 * H, nine() + 3 * H),
            Some("Follow-up bloodwork".into()),
        )
        .await
        .unwrap();
    assert_eq!(moved.status, Scheduled);
    assert_eq!(moved.reason, "Follow-up bloodwork");

    assert!(matches!(engine.start(appt.id).await, Err(EngineError::IllegalTransition { .. })));
    engine.confirm(appt.id).await.unwrap();
    engine.start(appt.id).await.unwrap();
}

#[tokio::test]
async fn reschedule_from_rescheduled_status() {
    let (engine, store, _) = setup();
    let mut appt = book(&engine, Ulid::new(), nine(), nine() + 30 * M).await.unwrap();
    appt.status = Rescheduled;
    store.put(appt.clone());

    let moved = engine
        .reschedule(appt.id, Slot::closed(nine() + H, nine() + 2 * H), None)
        .await
        .unwrap();
    assert_eq!(moved.status, Scheduled);
}

#[tokio::test]
async fn reschedule_in_progress_refused() {
    let (engine, store, _) = setup();
    let appt = book(&engine, Ulid::new(), nine(), nine() + 30 * M).await.unwrap();
    engine.confirm(appt.id).await.unwrap();
    let started = engine.start(appt.id).await.unwrap();

    let result = engine
        .reschedule(appt.id, Slot::closed(nine() + H, nine() + 2 * H), None)
        .await;
    assert_eq!(
        result,
        Err(EngineError::IllegalTransition {
            current: InProgress,
            attempted: Rescheduled,
            allowed: &[Finished, Cancelled],
        })
    );
    assert_eq!(store.get(&appt.id), Some(started));
}

#[tokio::test]
async fn reschedule_validates_new_slot() {
    let (engine, store, clock) = setup();
    let appt = book(&engine, Ulid::new(), nine(), nine() + 30 * M).await.unwrap();

    let zero = engine.reschedule(appt.id, Slot::closed(nine() + H, nine() + H), None).await;
    assert!(matches!(zero, Err(EngineError::InvalidInterval { .. })));

    clock.set(nine() - M);
    let past = engine.reschedule(appt.id, Slot::closed(nine() - H, nine() - 30 * M), None).await;
    assert!(matches!(past, Err(EngineError::PastStart { .. })));

    assert_eq!(store.get(&appt.id), Some(appt));
}

// ── Concurrency ──────────────────────────────────────────

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_creates_never_double_book() {
    let (engine, store, _) = setup();
    let engine = Arc::new(engine);
    let vet = Ulid::new();

    let attempts = (0..32).map(|i| {
        let engine = engine.clone();
        tokio::spawn(async move {
            // All overlap each other around 09:15.
            let start = nine() + (i % 4) * 5 * M;
            book(&engine, vet, start, start + 30 * M).await
        })
    });
    let results: Vec<_> = futures::future::join_all(attempts)
        .await
        .into_iter()
        .map(|r| r.unwrap())
        .collect();

    let booked = results.iter().filter(|r| r.is_ok()).count();
    assert_eq!(booked, 1);
    assert!(results
        .iter()
        .filter_map(|r| r.as_ref().err())
        .all(|e| matches!(e, EngineError::Conflict { .. })));
    assert_eq!(store.len(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_reschedules_into_same_slot() {
    let (engine, store, _) = setup();
    let engine = Arc::new(engine);
    let vet = Ulid::new();

    let mut ids = Vec::new();
    for i in 0..8 {
        let appt = book(&engine, vet, nine() + i * H, nine() + i * H + 30 * M).await.unwrap();
        ids.push(appt.id);
    }

    let target = Slot::closed(nine() + 20 * H, nine() + 20 * H + 30 * M);
    let attempts = ids.iter().map(|&id| {
        let engine = engine.clone();
        tokio::spawn(async move { engine.reschedule(id, target, None).await })
    });
    let results: Vec<_> = futures::future::join_all(attempts)
        .await
        .into_iter()
        .map(|r| r.unwrap())
        .collect();

    assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
    let in_target = store
        .practitioner_and_status_in(vet, &AppointmentStatus::CALENDAR_OCCUPYING, None)
        .into_iter()
        .filter(|a| a.start == target.start)
        .count();
    assert_eq!(in_target, 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_confirm_and_cancel_settle_on_one_history() {
    let (engine, store, _) = setup();
    let engine = Arc::new(engine);
    let appt = book(&engine, Ulid::new(), nine(), nine() + 30 * M).await.unwrap();

    let (e1, e2) = (engine.clone(), engine.clone());
    let confirm = tokio::spawn(async move { e1.confirm(appt.id).await });
    let cancel = tokio::spawn(async move { e2.cancel(appt.id).await });
    let confirm = confirm.await.unwrap();
    let cancel = cancel.await.unwrap();

    // Cancel is legal from both Scheduled and Confirmed; it always wins the final state.
    assert!(cancel.is_ok());
    assert_eq!(store.get(&appt.id).unwrap().status, Cancelled);
    if let Err(e) = confirm {
        assert!(matches!(e, EngineError::IllegalTransition { current: Cancelled, .. }));
    }
}

// ── Storage failures ─────────────────────────────────────

/// Store that can be told to fail writes.
#[derive(Default)]
struct FlakyStore {
    inner: InMemoryStore,
    fail_saves: AtomicBool,
}

#[async_trait]
impl AppointmentStore for FlakyStore {
    async fn get_by_id(&self, id: Ulid) -> Result<Option<Appointment>, StoreError> {
        self.inner.get_by_id(id).await
    }

    async fn save(&self, appointment: &Appointment) -> Result<(), StoreError> {
        if self.fail_saves.load(Ordering::SeqCst) {
            return Err(StoreError::Io("disk full".into()));
        }
        self.inner.save(appointment).await
    }

    async fn find_by_practitioner_and_status_in(
        &self,
        practitioner_id: Ulid,
        statuses: &[AppointmentStatus],
        rough_range: Option<Span>,
    ) -> Result<Vec<Appointment>, StoreError> {
        self.inner
            .find_by_practitioner_and_status_in(practitioner_id, statuses, rough_range)
            .await
    }

    async fn find_by_status(&self, status: AppointmentStatus) -> Result<Vec<Appointment>, StoreError> {
        self.inner.find_by_status(status).await
    }

    async fn find_starting_in(
        &self,
        practitioner_id: Option<Ulid>,
        range: Span,
    ) -> Result<Vec<Appointment>, StoreError> {
        self.inner.find_starting_in(practitioner_id, range).await
    }
}

#[tokio::test]
async fn storage_failure_is_retryable_and_leaves_no_trace() {
    let store = Arc::new(FlakyStore::default());
    let clock = Arc::new(FixedClock::new(0));
    let engine = Engine::new(store.clone(), clock);
    let vet = Ulid::new();

    let appt = book(&engine, vet, nine(), nine() + 30 * M).await.unwrap();

    store.fail_saves.store(true, Ordering::SeqCst);
    let err = engine.confirm(appt.id).await.unwrap_err();
    assert!(matches!(err, EngineError::StorageFailure(_)));
    assert!(err.is_retryable());
    assert_eq!(store.inner.get(&appt.id), Some(appt.clone()));

    let err = book(&engine, vet, nine() + H, nine() + 2 * H).await.unwrap_err();
    assert!(err.is_retryable());
    assert_eq!(store.inner.len(), 1);

    // Retry after recovery succeeds; a second retry reports the change as already applied.
    store.fail_saves.store(false, Ordering::SeqCst);
    assert_eq!(engine.confirm(appt.id).await.unwrap().status, Confirmed);
    assert!(engine.confirm(appt.id).await.unwrap_err().is_already_applied());
}

// ── Queries ──────────────────────────────────────────────

#[tokio::test]
async fn is_available_does_not_reserve() {
    let (engine, store, _) = setup();
    let vet = Ulid::new();
    let slot = Slot::closed(nine(), nine() + 30 * M);

    assert!(engine.is_available(vet, slot).await.unwrap());
    assert!(engine.is_available(vet, slot).await.unwrap());
    assert!(store.is_empty());

    book(&engine, vet, nine() + 10 * M, nine() + 20 * M).await.unwrap();
    assert!(!engine.is_available(vet, slot).await.unwrap());
    assert!(engine
        .is_available(vet, Slot::closed(nine() + 20 * M, nine() + 30 * M))
        .await
        .unwrap());

    let degenerate = engine.is_available(vet, Slot::closed(nine(), nine())).await;
    assert!(matches!(degenerate, Err(EngineError::InvalidInterval { .. })));
}

#[tokio::test]
async fn detector_excludes_given_appointment() {
    let (engine, _, _) = setup();
    let vet = Ulid::new();
    let appt = book(&engine, vet, nine(), nine() + 30 * M).await.unwrap();
    let slot = Slot::closed(nine(), nine() + 30 * M);

    assert!(engine.detector().has_conflict(vet, slot, None).await.unwrap());
    assert!(!engine.detector().has_conflict(vet, slot, Some(appt.id)).await.unwrap());
}

#[tokio::test]
async fn list_projections() {
    let (engine, _, _) = setup();
    let (vet_a, vet_b) = (Ulid::new(), Ulid::new());

    let a1 = book(&engine, vet_a, nine(), nine() + 30 * M).await.unwrap();
    let a2 = book(&engine, vet_a, nine() + 2 * H, nine() + 3 * H).await.unwrap();
    let b1 = book(&engine, vet_b, nine() + H, nine() + 2 * H).await.unwrap();
    let next_day = book(&engine, vet_a, at(2025, 3, 2, 9, 0), at(2025, 3, 2, 10, 0)).await.unwrap();
    let a1 = engine.cancel(a1.id).await.unwrap();

    let ranged = engine
        .list_by_practitioner_and_range(vet_a, nine(), nine() + 3 * H)
        .await
        .unwrap();
    assert_eq!(ranged, vec![a1.clone(), a2.clone()]);

    let day = engine
        .list_by_date(NaiveDate::from_ymd_opt(2025, 3, 1).unwrap())
        .await
        .unwrap();
    assert_eq!(day, vec![a1.clone(), b1.clone(), a2.clone()]);

    let scheduled = engine.list_by_status(Scheduled).await.unwrap();
    assert_eq!(scheduled, vec![b1, a2, next_day]);
    assert_eq!(engine.list_by_status(Cancelled).await.unwrap(), vec![a1]);

    let bad = engine.list_by_practitioner_and_range(vet_a, nine(), nine()).await;
    assert!(matches!(bad, Err(EngineError::InvalidInterval { .. })));
    let wide = engine
        .list_by_practitioner_and_range(vet_a, nine(), nine() + crate::limits::MAX_QUERY_WINDOW_MS + 1)
        .await;
    assert_eq!(wide, Err(EngineError::LimitExceeded("query window too wide")));
}

#[tokio::test]
async fn free_spans_skip_terminal_and_honor_min_duration() {
    let (engine, _, _) = setup();
    let vet = Ulid::new();
    book(&engine, vet, nine(), nine() + 30 * M).await.unwrap();
    let cancelled = book(&engine, vet, nine() + H, nine() + 2 * H).await.unwrap();
    engine.cancel(cancelled.id).await.unwrap();
    engine
        .create(vet, Ulid::new(), Slot::open(nine() + 2 * H + 45 * M), "Walk-in".into())
        .await
        .unwrap();

    let free = engine
        .free_spans(vet, nine(), nine() + 4 * H, None)
        .await
        .unwrap();
    assert_eq!(
        free,
        vec![
            Span::new(nine() + 30 * M, nine() + 2 * H + 45 * M),
            Span::new(nine() + 3 * H + 15 * M, nine() + 4 * H),
        ]
    );

    let long_only = engine
        .free_spans(vet, nine(), nine() + 4 * H, Some(H))
        .await
        .unwrap();
    assert_eq!(long_only, vec![Span::new(nine() + 30 * M, nine() + 2 * H + 45 * M)]);
}

#[tokio::test]
async fn day_span_is_utc_midnight_to_midnight() {
    let span = super::queries::day_span(NaiveDate::from_ymd_opt(2025, 3, 1).unwrap());
    assert_eq!(span, Span::new(at(2025, 3, 1, 0, 0), at(2025, 3, 2, 0, 0)));
}
