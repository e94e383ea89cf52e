#![forbid(unsafe_code)]

use std::sync::Mutex;

use leadline_contracts::MonotonicTimeNs;
use leadline_storage::{LeadRepo, LeadStoreCounters};
use tracing::{debug, error, info};

use crate::dispatch::{CallDispatchWiring, CallPlacementEngine, DispatchError, DispatchOutcome};

pub const DISPATCH_WORKER_MAX_ITEMS: usize = 16;
pub const DISPATCH_DELAY_MS_DEFAULT: u64 = 30_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DispatchWorkerPassMetrics {
    pub due_count: u16,
    pub dispatched_count: u16,
    pub skipped_count: u16,
    pub failed_count: u16,
    pub store_after: LeadStoreCounters,
}

/// Runs every due deferred dispatch once. Each row is consumed before its attempt,
/// so a failed call is not retried automatically.
pub fn run_dispatch_worker_pass<R, E>(
    store: &Mutex<R>,
    wiring: &CallDispatchWiring<E>,
    now: MonotonicTimeNs,
    max_items: usize,
) -> Result<DispatchWorkerPassMetrics, DispatchError>
where
    R: LeadRepo,
    E: CallPlacementEngine,
{
    // Per-pass counters are u16.
    let limit = max_items.clamp(1, usize::from(u16::MAX));
    let due = {
        let guard = store.lock().map_err(|_| DispatchError::LockPoisoned)?;
        guard.due_dispatch_schedule_rows(now, limit)
    };
    let mut metrics = DispatchWorkerPassMetrics {
        due_count: u16::try_from(due.len()).unwrap_or(u16::MAX),
        ..DispatchWorkerPassMetrics::default()
    };

    for row in due {
        let consumed = {
            let mut guard = store.lock().map_err(|_| DispatchError::LockPoisoned)?;
            guard.consume_dispatch_schedule_row(row.lead_id)?
        };
        if !consumed {
            debug!(lead_id = %row.lead_id, "schedule row already consumed");
            continue;
        }
        match wiring.dispatch(store, row.lead_id) {
            Ok(DispatchOutcome::Triggered { .. }) => {
                metrics.dispatched_count = metrics.dispatched_count.saturating_add(1);
            }
            Ok(DispatchOutcome::Skipped(_)) => {
                metrics.skipped_count = metrics.skipped_count.saturating_add(1);
            }
            Err(DispatchError::LockPoisoned) => return Err(DispatchError::LockPoisoned),
            Err(err) => {
                error!(lead_id = %row.lead_id, error = %err, "deferred dispatch failed");
                metrics.failed_count = metrics.failed_count.saturating_add(1);
            }
        }
    }

    metrics.store_after = {
        let guard = store.lock().map_err(|_| DispatchError::LockPoisoned)?;
        guard.lead_store_counters(now)
    };
    if metrics.due_count > 0 {
        info!(
            due = metrics.due_count,
            dispatched = metrics.dispatched_count,
            skipped = metrics.skipped_count,
            failed = metrics.failed_count,
            "dispatch worker pass"
        );
    }
    Ok(metrics)
}

#[cfg(test)]
mod tests {
    use super::*;
    use leadline_contracts::dispatch::{
        CallTarget, CallTargetTable, OutboundCallRequest, PlacedCall,
    };
    use leadline_contracts::lead::{LeadId, LeadInput, SubmitLeadRequest};
    use leadline_engines::vapi::ProviderCallError;
    use leadline_storage::{DispatchScheduleState, LeadStore};
    use std::cell::Cell;

    const MS: u64 = 1_000_000;

    struct CountingEngine {
        fail: bool,
        calls: Cell<u32>,
    }

    impl CallPlacementEngine for CountingEngine {
        fn place_call(&self, _req: &OutboundCallRequest) -> Result<PlacedCall, ProviderCallError> {
            self.calls.set(self.calls.get() + 1);
            if self.fail {
                return Err(ProviderCallError::new("timeout", None, None));
            }
            Ok(PlacedCall {
                call_id: Some(format!("call_{}", self.calls.get())),
            })
        }
    }

    fn wiring(fail: bool) -> CallDispatchWiring<CountingEngine> {
        CallDispatchWiring::new(
            CallTargetTable::new(CallTarget::new("asst", "phone").unwrap()),
            CountingEngine {
                fail,
                calls: Cell::new(0),
            },
        )
    }

    fn insert(store: &mut LeadStore, opt_in_call: bool, at_ms: u64) -> LeadId {
        let input = LeadInput::from_request(SubmitLeadRequest {
            first_name: "Ann".to_string(),
            last_name: "Lee".to_string(),
            phone_number: "+15550001111".to_string(),
            email: "ann@example.com".to_string(),
            opt_in_call,
            ..SubmitLeadRequest::default()
        })
        .unwrap();
        store
            .insert_lead(input, MonotonicTimeNs(at_ms * MS), DISPATCH_DELAY_MS_DEFAULT)
            .unwrap()
            .lead_id
    }

    #[test]
    fn nothing_runs_before_the_delay_elapses() {
        let mut s = LeadStore::new_in_memory();
        let lead_id = insert(&mut s, true, 1);
        let store = Mutex::new(s);
        let w = wiring(false);
        let m = run_dispatch_worker_pass(&store, &w, MonotonicTimeNs(30_000 * MS), 16).unwrap();
        assert_eq!(m.due_count, 0);
        assert_eq!(w.engine().calls.get(), 0);
        assert!(!store.lock().unwrap().lead_row(&lead_id).unwrap().call_scheduled);
    }

    #[test]
    fn due_rows_are_dispatched_once_and_consumed() {
        let mut s = LeadStore::new_in_memory();
        let a = insert(&mut s, true, 1);
        let _opted_out = insert(&mut s, false, 1);
        let store = Mutex::new(s);
        let w = wiring(false);
        let now = MonotonicTimeNs(30_001 * MS);

        let m = run_dispatch_worker_pass(&store, &w, now, 16).unwrap();
        assert_eq!(m.due_count, 1);
        assert_eq!(m.dispatched_count, 1);
        assert_eq!(m.store_after.scheduled_count, 1);
        assert_eq!(m.store_after.consumed_schedule_count, 1);

        let again = run_dispatch_worker_pass(&store, &w, now, 16).unwrap();
        assert_eq!(again.due_count, 0);
        assert_eq!(w.engine().calls.get(), 1);
        let guard = store.lock().unwrap();
        assert_eq!(
            guard.dispatch_schedule_row(&a).unwrap().state,
            DispatchScheduleState::Consumed
        );
    }

    #[test]
    fn failed_attempt_is_consumed_and_counted() {
        let mut s = LeadStore::new_in_memory();
        let lead_id = insert(&mut s, true, 1);
        let store = Mutex::new(s);
        let w = wiring(true);
        let now = MonotonicTimeNs(40_000 * MS);

        let m = run_dispatch_worker_pass(&store, &w, now, 16).unwrap();
        assert_eq!(m.failed_count, 1);
        assert_eq!(m.store_after.pending_dispatch_count, 1);
        assert_eq!(m.store_after.in_flight_count, 0);
        assert_eq!(run_dispatch_worker_pass(&store, &w, now, 16).unwrap().due_count, 0);
        assert!(!store.lock().unwrap().lead_row(&lead_id).unwrap().call_scheduled);
    }

    #[test]
    fn already_triggered_lead_counts_as_skipped() {
        let mut s = LeadStore::new_in_memory();
        let lead_id = insert(&mut s, true, 1);
        let store = Mutex::new(s);
        let w = wiring(false);
        w.dispatch(&store, lead_id).unwrap();

        let m = run_dispatch_worker_pass(&store, &w, MonotonicTimeNs(31_000 * MS), 16).unwrap();
        assert_eq!(m.skipped_count, 1);
        assert_eq!(w.engine().calls.get(), 1);
    }

    #[test]
    fn pass_is_bounded_by_max_items() {
        let mut s = LeadStore::new_in_memory();
        for i in 0..5 {
            insert(&mut s, true, i + 1);
        }
        let store = Mutex::new(s);
        let w = wiring(false);
        let now = MonotonicTimeNs(60_000 * MS);
        assert_eq!(run_dispatch_worker_pass(&store, &w, now, 2).unwrap().dispatched_count, 2);
        assert_eq!(run_dispatch_worker_pass(&store, &w, now, 16).unwrap().dispatched_count, 3);
    }

    #[test]
    fn oversized_max_items_is_clamped_to_the_counter_range() {
        let mut s = LeadStore::new_in_memory();
        for i in 0..3 {
            insert(&mut s, true, i + 1);
        }
        let store = Mutex::new(s);
        let w = wiring(false);
        let m = run_dispatch_worker_pass(&store, &w, MonotonicTimeNs(60_000 * MS), usize::MAX)
            .unwrap();
        assert_eq!(m.due_count, 3);
        assert_eq!(m.dispatched_count, 3);
    }
}
