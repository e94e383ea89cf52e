#![forbid(unsafe_code)]

use leadline_contracts::lead::{LeadId, LeadInput, LeadRecord};
use leadline_contracts::MonotonicTimeNs;

use crate::lead_store::{
    DispatchClaim, DispatchScheduleRow, LeadStore, LeadStoreCounters, StorageError,
};

/// Typed repository interface for the lead and dispatch-schedule tables.
pub trait LeadRepo {
    fn insert_lead_row(
        &mut self,
        input: LeadInput,
        now: MonotonicTimeNs,
        dispatch_delay_ms: u64,
    ) -> Result<LeadRecord, StorageError>;

    fn get_lead_row(&self, lead_id: &LeadId) -> Option<&LeadRecord>;

    fn claim_dispatch_row(&mut self, lead_id: LeadId) -> Result<DispatchClaim, StorageError>;
    fn release_dispatch_claim_row(&mut self, lead_id: LeadId) -> bool;
    fn mark_call_scheduled_row(
        &mut self,
        lead_id: LeadId,
        call_sid: Option<String>,
    ) -> Result<bool, StorageError>;

    fn due_dispatch_schedule_rows(
        &self,
        now: MonotonicTimeNs,
        limit: usize,
    ) -> Vec<DispatchScheduleRow>;
    fn consume_dispatch_schedule_row(&mut self, lead_id: LeadId) -> Result<bool, StorageError>;

    fn lead_store_counters(&self, now: MonotonicTimeNs) -> LeadStoreCounters;
}

impl LeadRepo for LeadStore {
    fn insert_lead_row(
        &mut self,
        input: LeadInput,
        now: MonotonicTimeNs,
        dispatch_delay_ms: u64,
    ) -> Result<LeadRecord, StorageError> {
        self.insert_lead(input, now, dispatch_delay_ms)
    }

    fn get_lead_row(&self, lead_id: &LeadId) -> Option<&LeadRecord> {
        self.lead_row(lead_id)
    }

    fn claim_dispatch_row(&mut self, lead_id: LeadId) -> Result<DispatchClaim, StorageError> {
        self.claim_dispatch(lead_id)
    }

    fn release_dispatch_claim_row(&mut self, lead_id: LeadId) -> bool {
        self.release_dispatch_claim(lead_id)
    }

    fn mark_call_scheduled_row(
        &mut self,
        lead_id: LeadId,
        call_sid: Option<String>,
    ) -> Result<bool, StorageError> {
        self.mark_call_scheduled(lead_id, call_sid)
    }

    fn due_dispatch_schedule_rows(
        &self,
        now: MonotonicTimeNs,
        limit: usize,
    ) -> Vec<DispatchScheduleRow> {
        self.due_dispatch_rows(now, limit)
    }

    fn consume_dispatch_schedule_row(&mut self, lead_id: LeadId) -> Result<bool, StorageError> {
        self.consume_dispatch_schedule(lead_id)
    }

    fn lead_store_counters(&self, now: MonotonicTimeNs) -> LeadStoreCounters {
        self.counters(now)
    }
}
