#![forbid(unsafe_code)]

use std::collections::{BTreeMap, BTreeSet};
use std::path::PathBuf;

use leadline_contracts::common::trim_non_empty;
use leadline_contracts::lead::{CallStatus, LeadId, LeadInput, LeadRecord};
use leadline_contracts::{ContractViolation, MonotonicTimeNs, Validate};
use thiserror::Error;
use tracing::{debug, info};

use crate::journal::{LeadJournal, LeadStoreEvent};

#[derive(Debug, Clone, PartialEq, Error)]
pub enum StorageError {
    #[error("Lead not found")]
    LeadNotFound(LeadId),
    #[error("contract violation: {0}")]
    ContractViolation(#[from] ContractViolation),
    #[error("journal error: {0}")]
    Journal(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchScheduleState {
    Due,
    Consumed,
}

/// Row of the `dispatch_schedule` table: one deferred dispatch per opted-in lead.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DispatchScheduleRow {
    pub lead_id: LeadId,
    pub due_at: MonotonicTimeNs,
    pub state: DispatchScheduleState,
}

/// Result of the conditional claim taken before placing a call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchClaim {
    Claimed(LeadRecord),
    NotOptedIn,
    AlreadyScheduled,
    InFlight,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct LeadStoreCounters {
    pub lead_count: u32,
    pub opted_in_count: u32,
    pub pending_dispatch_count: u32,
    pub scheduled_count: u32,
    pub in_flight_count: u32,
    pub due_schedule_count: u32,
    pub consumed_schedule_count: u32,
}

#[derive(Debug)]
pub struct LeadStore {
    leads: BTreeMap<LeadId, LeadRecord>,
    dispatch_schedule: BTreeMap<LeadId, DispatchScheduleRow>,
    dispatch_claims: BTreeSet<LeadId>,
    next_lead_id: u64,
    journal: Option<LeadJournal>,
}

impl LeadStore {
    pub fn new_in_memory() -> Self {
        Self {
            leads: BTreeMap::new(),
            dispatch_schedule: BTreeMap::new(),
            dispatch_claims: BTreeSet::new(),
            next_lead_id: 1,
            journal: None,
        }
    }

    /// Opens a journaled store, replaying every committed event from `path`.
    pub fn open_with_journal(path: impl Into<PathBuf>) -> Result<Self, StorageError> {
        let journal = LeadJournal::open(path)?;
        let mut store = Self::new_in_memory();
        let events = journal.read_events()?;
        let replayed = events.len();
        for event in events {
            store.apply_event(event)?;
        }
        info!(
            journal = %journal.path().display(),
            replayed,
            leads = store.leads.len(),
            "lead journal replayed"
        );
        store.journal = Some(journal);
        Ok(store)
    }

    pub fn is_journaled(&self) -> bool {
        self.journal.is_some()
    }

    pub fn insert_lead(
        &mut self,
        input: LeadInput,
        now: MonotonicTimeNs,
        dispatch_delay_ms: u64,
    ) -> Result<LeadRecord, StorageError> {
        input.validate()?;
        let lead_id = LeadId(self.next_lead_id);
        let record = LeadRecord::v1(lead_id, input, now)?;
        let dispatch_due_at = record
            .opt_in_call
            .then(|| now.saturating_add_ms(dispatch_delay_ms));
        self.commit(LeadStoreEvent::LeadInserted {
            record: record.clone(),
            dispatch_due_at,
        })?;
        debug!(lead_id = %lead_id, opt_in_call = record.opt_in_call, "lead row inserted");
        Ok(record)
    }

    pub fn lead_row(&self, lead_id: &LeadId) -> Option<&LeadRecord> {
        self.leads.get(lead_id)
    }

    pub fn lead_rows(&self) -> &BTreeMap<LeadId, LeadRecord> {
        &self.leads
    }

    /// Claims a lead for dispatch in one step. Only `PendingDispatch` rows without a
    /// live claim are claimable; an in-flight claim reads as already scheduled to callers.
    pub fn claim_dispatch(&mut self, lead_id: LeadId) -> Result<DispatchClaim, StorageError> {
        let lead = self
            .leads
            .get(&lead_id)
            .ok_or(StorageError::LeadNotFound(lead_id))?;
        match lead.call_status() {
            CallStatus::NotRequested => Ok(DispatchClaim::NotOptedIn),
            CallStatus::Scheduled => Ok(DispatchClaim::AlreadyScheduled),
            CallStatus::PendingDispatch => {
                if !self.dispatch_claims.insert(lead_id) {
                    return Ok(DispatchClaim::InFlight);
                }
                Ok(DispatchClaim::Claimed(lead.clone()))
            }
        }
    }

    pub fn release_dispatch_claim(&mut self, lead_id: LeadId) -> bool {
        self.dispatch_claims.remove(&lead_id)
    }

    /// Update-if-not-already-scheduled. Returns whether a row was affected.
    /// A blank `call_sid` is stored as `None`; the call still counts as scheduled.
    pub fn mark_call_scheduled(
        &mut self,
        lead_id: LeadId,
        call_sid: Option<String>,
    ) -> Result<bool, StorageError> {
        let lead = self
            .leads
            .get(&lead_id)
            .ok_or(StorageError::LeadNotFound(lead_id))?;
        if lead.call_status() != CallStatus::PendingDispatch {
            return Ok(false);
        }
        let call_sid = trim_non_empty(call_sid);
        self.commit(LeadStoreEvent::CallScheduled { lead_id, call_sid })?;
        Ok(true)
    }

    pub fn dispatch_schedule_row(&self, lead_id: &LeadId) -> Option<&DispatchScheduleRow> {
        self.dispatch_schedule.get(lead_id)
    }

    /// Due rows ordered by due time, then lead id.
    pub fn due_dispatch_rows(
        &self,
        now: MonotonicTimeNs,
        limit: usize,
    ) -> Vec<DispatchScheduleRow> {
        let mut rows: Vec<DispatchScheduleRow> = self
            .dispatch_schedule
            .values()
            .filter(|row| row.state == DispatchScheduleState::Due && row.due_at <= now)
            .copied()
            .collect();
        rows.sort_by_key(|row| (row.due_at, row.lead_id));
        rows.truncate(limit);
        rows
    }

    /// Marks a schedule row consumed. Returns false when it was not due.
    pub fn consume_dispatch_schedule(&mut self, lead_id: LeadId) -> Result<bool, StorageError> {
        match self.dispatch_schedule.get(&lead_id) {
            Some(row) if row.state == DispatchScheduleState::Due => {
                self.commit(LeadStoreEvent::DispatchConsumed { lead_id })?;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    pub fn counters(&self, now: MonotonicTimeNs) -> LeadStoreCounters {
        let mut out = LeadStoreCounters::default();
        for lead in self.leads.values() {
            out.lead_count = out.lead_count.saturating_add(1);
            if lead.opt_in_call {
                out.opted_in_count = out.opted_in_count.saturating_add(1);
            }
            match lead.call_status() {
                CallStatus::PendingDispatch => {
                    out.pending_dispatch_count = out.pending_dispatch_count.saturating_add(1)
                }
                CallStatus::Scheduled => {
                    out.scheduled_count = out.scheduled_count.saturating_add(1)
                }
                CallStatus::NotRequested => {}
            }
        }
        out.in_flight_count = self.dispatch_claims.len() as u32;
        for row in self.dispatch_schedule.values() {
            match row.state {
                DispatchScheduleState::Due if row.due_at <= now => {
                    out.due_schedule_count = out.due_schedule_count.saturating_add(1)
                }
                DispatchScheduleState::Due => {}
                DispatchScheduleState::Consumed => {
                    out.consumed_schedule_count = out.consumed_schedule_count.saturating_add(1)
                }
            }
        }
        out
    }

    fn commit(&mut self, event: LeadStoreEvent) -> Result<(), StorageError> {
        if let Some(journal) = self.journal.as_ref() {
            journal.append(&event)?;
        }
        self.apply_event(event)
    }

    fn apply_event(&mut self, event: LeadStoreEvent) -> Result<(), StorageError> {
        match event {
            LeadStoreEvent::LeadInserted {
                record,
                dispatch_due_at,
            } => {
                record.validate()?;
                let lead_id = record.lead_id;
                if self.leads.contains_key(&lead_id) {
                    return Err(StorageError::Journal(format!(
                        "duplicate lead_id={lead_id} in lead table"
                    )));
                }
                if let Some(due_at) = dispatch_due_at {
                    self.dispatch_schedule.insert(
                        lead_id,
                        DispatchScheduleRow {
                            lead_id,
                            due_at,
                            state: DispatchScheduleState::Due,
                        },
                    );
                }
                self.leads.insert(lead_id, record);
                self.next_lead_id = self.next_lead_id.max(lead_id.0.saturating_add(1));
            }
            LeadStoreEvent::DispatchConsumed { lead_id } => {
                let row = self
                    .dispatch_schedule
                    .get_mut(&lead_id)
                    .ok_or(StorageError::LeadNotFound(lead_id))?;
                row.state = DispatchScheduleState::Consumed;
            }
            LeadStoreEvent::CallScheduled { lead_id, call_sid } => {
                let lead = self
                    .leads
                    .get_mut(&lead_id)
                    .ok_or(StorageError::LeadNotFound(lead_id))?;
                lead.call_scheduled = true;
                lead.call_sid = call_sid;
                self.dispatch_claims.remove(&lead_id);
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use leadline_contracts::lead::SubmitLeadRequest;

    fn input(opt_in_call: bool) -> LeadInput {
        LeadInput::from_request(SubmitLeadRequest {
            first_name: "John".to_string(),
            last_name: "Doe".to_string(),
            phone_number: "5551234567".to_string(),
            email: "john@example.com".to_string(),
            opt_in_call,
            ..SubmitLeadRequest::default()
        })
        .unwrap()
    }

    #[test]
    fn lead_ids_are_assigned_in_insert_order() {
        let mut s = LeadStore::new_in_memory();
        let a = s.insert_lead(input(false), MonotonicTimeNs(1), 0).unwrap();
        let b = s.insert_lead(input(true), MonotonicTimeNs(2), 0).unwrap();
        assert_eq!(a.lead_id, LeadId(1));
        assert_eq!(b.lead_id, LeadId(2));
    }

    #[test]
    fn claim_is_exclusive_until_released() {
        let mut s = LeadStore::new_in_memory();
        let lead = s.insert_lead(input(true), MonotonicTimeNs(1), 0).unwrap();
        assert!(matches!(
            s.claim_dispatch(lead.lead_id).unwrap(),
            DispatchClaim::Claimed(_)
        ));
        assert_eq!(s.claim_dispatch(lead.lead_id).unwrap(), DispatchClaim::InFlight);
        assert!(s.release_dispatch_claim(lead.lead_id));
        assert!(matches!(
            s.claim_dispatch(lead.lead_id).unwrap(),
            DispatchClaim::Claimed(_)
        ));
    }

    #[test]
    fn mark_call_scheduled_clears_claim_and_affects_one_row_once() {
        let mut s = LeadStore::new_in_memory();
        let lead = s.insert_lead(input(true), MonotonicTimeNs(1), 0).unwrap();
        let _ = s.claim_dispatch(lead.lead_id).unwrap();
        assert!(s.mark_call_scheduled(lead.lead_id, Some("call_1".to_string())).unwrap());
        assert!(!s.mark_call_scheduled(lead.lead_id, Some("call_2".to_string())).unwrap());
        let row = s.lead_row(&lead.lead_id).unwrap();
        assert_eq!(row.call_sid.as_deref(), Some("call_1"));
        assert_eq!(s.counters(MonotonicTimeNs(1)).in_flight_count, 0);
    }

    #[test]
    fn accepted_call_without_sid_still_counts_as_scheduled() {
        let mut s = LeadStore::new_in_memory();
        let lead = s.insert_lead(input(true), MonotonicTimeNs(1), 0).unwrap();
        let _ = s.claim_dispatch(lead.lead_id).unwrap();
        assert!(s.mark_call_scheduled(lead.lead_id, Some("  ".to_string())).unwrap());
        let row = s.lead_row(&lead.lead_id).unwrap();
        assert!(row.call_scheduled);
        assert_eq!(row.call_sid, None);
        assert_eq!(
            s.claim_dispatch(lead.lead_id).unwrap(),
            DispatchClaim::AlreadyScheduled
        );
    }
}
