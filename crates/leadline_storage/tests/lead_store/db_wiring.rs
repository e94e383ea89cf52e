#![forbid(unsafe_code)]

use std::time::{SystemTime, UNIX_EPOCH};

use leadline_contracts::lead::{CallStatus, LeadId, LeadInput, SubmitLeadRequest};
use leadline_contracts::MonotonicTimeNs;
use leadline_storage::repo::LeadRepo;
use leadline_storage::{DispatchClaim, LeadStore, StorageError};

fn input(phone: &str, opt_in_call: bool) -> LeadInput {
    LeadInput::from_request(SubmitLeadRequest {
        first_name: "John".to_string(),
        last_name: "Doe".to_string(),
        phone_number: phone.to_string(),
        email: "john@example.com".to_string(),
        language: Some("french".to_string()),
        opt_in_call,
        ..SubmitLeadRequest::default()
    })
    .unwrap()
}

fn temp_journal(name: &str) -> std::path::PathBuf {
    let seed = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("clock must be >= unix epoch")
        .as_nanos();
    std::env::temp_dir()
        .join(format!("leadline-db-wiring-{name}-{seed}"))
        .join("leads.jsonl")
}

#[test]
fn at_lead_db_01_phone_is_stored_normalized() {
    let mut s = LeadStore::new_in_memory();
    let plain = s
        .insert_lead_row(input("5551234567", false), MonotonicTimeNs(1), 30_000)
        .unwrap();
    let prefixed = s
        .insert_lead_row(input("+5551234567", false), MonotonicTimeNs(2), 30_000)
        .unwrap();
    assert_eq!(
        s.get_lead_row(&plain.lead_id).unwrap().phone_number.as_str(),
        "+5551234567"
    );
    assert_eq!(
        s.get_lead_row(&prefixed.lead_id)
            .unwrap()
            .phone_number
            .as_str(),
        "+5551234567"
    );
}

#[test]
fn at_lead_db_02_new_rows_start_unscheduled() {
    let mut s = LeadStore::new_in_memory();
    let lead = s
        .insert_lead_row(input("5551234567", true), MonotonicTimeNs(1), 0)
        .unwrap();
    assert!(!lead.call_scheduled);
    assert_eq!(lead.call_sid, None);
    assert_eq!(lead.call_status(), CallStatus::PendingDispatch);
}

#[test]
fn at_lead_db_03_opted_out_rows_are_never_claimable() {
    let mut s = LeadStore::new_in_memory();
    let lead = s
        .insert_lead_row(input("5551234567", false), MonotonicTimeNs(1), 0)
        .unwrap();
    assert_eq!(
        s.claim_dispatch_row(lead.lead_id).unwrap(),
        DispatchClaim::NotOptedIn
    );
    assert!(s
        .mark_call_scheduled_row(lead.lead_id, Some("call_x".to_string()))
        .map(|affected| !affected)
        .unwrap());
    assert!(!s.get_lead_row(&lead.lead_id).unwrap().call_scheduled);
}

#[test]
fn at_lead_db_04_call_scheduled_flips_exactly_once() {
    let mut s = LeadStore::new_in_memory();
    let lead = s
        .insert_lead_row(input("5551234567", true), MonotonicTimeNs(1), 0)
        .unwrap();
    assert!(s
        .mark_call_scheduled_row(lead.lead_id, Some("call_first".to_string()))
        .unwrap());
    assert!(!s
        .mark_call_scheduled_row(lead.lead_id, Some("call_second".to_string()))
        .unwrap());
    assert_eq!(
        s.claim_dispatch_row(lead.lead_id).unwrap(),
        DispatchClaim::AlreadyScheduled
    );
    let row = s.get_lead_row(&lead.lead_id).unwrap();
    assert_eq!(row.call_sid.as_deref(), Some("call_first"));
}

#[test]
fn at_lead_db_05_released_claim_leaves_row_untouched() {
    let mut s = LeadStore::new_in_memory();
    let lead = s
        .insert_lead_row(input("5551234567", true), MonotonicTimeNs(1), 0)
        .unwrap();
    let before = s.get_lead_row(&lead.lead_id).unwrap().clone();
    assert!(matches!(
        s.claim_dispatch_row(lead.lead_id).unwrap(),
        DispatchClaim::Claimed(_)
    ));
    assert!(s.release_dispatch_claim_row(lead.lead_id));
    assert_eq!(s.get_lead_row(&lead.lead_id).unwrap(), &before);
}

#[test]
fn at_lead_db_06_unknown_lead_is_reported() {
    let mut s = LeadStore::new_in_memory();
    assert_eq!(
        s.claim_dispatch_row(LeadId(42)),
        Err(StorageError::LeadNotFound(LeadId(42)))
    );
}

#[test]
fn at_lead_db_07_journal_replay_restores_rows_and_ids() {
    let path = temp_journal("replay");
    let scheduled_id = {
        let mut s = LeadStore::open_with_journal(&path).unwrap();
        let a = s
            .insert_lead_row(input("5551234567", true), MonotonicTimeNs(1), 0)
            .unwrap();
        s.insert_lead_row(input("5550000000", false), MonotonicTimeNs(2), 0)
            .unwrap();
        let _ = s.claim_dispatch_row(a.lead_id).unwrap();
        assert!(s
            .mark_call_scheduled_row(a.lead_id, Some("call_a".to_string()))
            .unwrap());
        a.lead_id
    };

    let mut reopened = LeadStore::open_with_journal(&path).unwrap();
    assert_eq!(reopened.lead_rows().len(), 2);
    let row = reopened.get_lead_row(&scheduled_id).unwrap();
    assert!(row.call_scheduled);
    assert_eq!(row.call_sid.as_deref(), Some("call_a"));
    let next = reopened
        .insert_lead_row(input("5551111111", false), MonotonicTimeNs(3), 0)
        .unwrap();
    assert_eq!(next.lead_id, LeadId(3));
    let _ = std::fs::remove_dir_all(path.parent().unwrap());
}

#[test]
fn at_lead_db_08_claims_are_not_journaled() {
    let path = temp_journal("claims");
    let lead_id = {
        let mut s = LeadStore::open_with_journal(&path).unwrap();
        let lead = s
            .insert_lead_row(input("5551234567", true), MonotonicTimeNs(1), 0)
            .unwrap();
        assert!(matches!(
            s.claim_dispatch_row(lead.lead_id).unwrap(),
            DispatchClaim::Claimed(_)
        ));
        lead.lead_id
    };
    let mut reopened = LeadStore::open_with_journal(&path).unwrap();
    assert!(matches!(
        reopened.claim_dispatch_row(lead_id).unwrap(),
        DispatchClaim::Claimed(_)
    ));
    let _ = std::fs::remove_dir_all(path.parent().unwrap());
}

#[test]
fn at_lead_db_09_torn_journal_tail_is_dropped_on_reopen() {
    let path = temp_journal("torn");
    {
        let mut s = LeadStore::open_with_journal(&path).unwrap();
        s.insert_lead_row(input("5551234567", true), MonotonicTimeNs(1), 0)
            .unwrap();
    }
    let mut raw = std::fs::read_to_string(&path).unwrap();
    raw.push_str("{\"schema_version\":1,\"event\":\"dispatch_con");
    std::fs::write(&path, &raw).unwrap();

    let mut reopened = LeadStore::open_with_journal(&path).unwrap();
    assert_eq!(reopened.lead_rows().len(), 1);
    assert!(reopened.dispatch_schedule_row(&LeadId(1)).is_some());
    reopened
        .insert_lead_row(input("5550000000", false), MonotonicTimeNs(2), 0)
        .unwrap();
    drop(reopened);

    let again = LeadStore::open_with_journal(&path).unwrap();
    assert_eq!(again.lead_rows().len(), 2);
    let raw = std::fs::read_to_string(&path).unwrap();
    assert_eq!(raw.lines().count(), 2);
    assert!(!raw.contains("dispatch_con\""));
    let _ = std::fs::remove_dir_all(path.parent().unwrap());
}

#[test]
fn at_lead_db_10_corrupt_line_before_committed_entries_fails_open() {
    let path = temp_journal("corrupt-middle");
    {
        let mut s = LeadStore::open_with_journal(&path).unwrap();
        s.insert_lead_row(input("5551234567", true), MonotonicTimeNs(1), 0)
            .unwrap();
    }
    let committed = std::fs::read_to_string(&path).unwrap();
    std::fs::write(&path, format!("{{\"schema_version\":1,\"eve\n{committed}")).unwrap();

    let err = LeadStore::open_with_journal(&path).unwrap_err();
    assert!(matches!(err, StorageError::Journal(msg) if msg.contains("at line 1")));
    let _ = std::fs::remove_dir_all(path.parent().unwrap());
}
