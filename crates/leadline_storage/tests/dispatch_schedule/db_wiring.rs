#![forbid(unsafe_code)]

use std::time::{SystemTime, UNIX_EPOCH};

use leadline_contracts::lead::{LeadInput, SubmitLeadRequest};
use leadline_contracts::MonotonicTimeNs;
use leadline_storage::repo::LeadRepo;
use leadline_storage::{DispatchScheduleState, LeadStore};

const DELAY_MS: u64 = 30_000;

fn input(opt_in_call: bool) -> LeadInput {
    LeadInput::from_request(SubmitLeadRequest {
        first_name: "Ada".to_string(),
        last_name: "Lovelace".to_string(),
        phone_number: "+441234567".to_string(),
        email: "ada@example.com".to_string(),
        opt_in_call,
        ..SubmitLeadRequest::default()
    })
    .unwrap()
}

fn ms(v: u64) -> MonotonicTimeNs {
    MonotonicTimeNs(v * 1_000_000)
}

#[test]
fn at_schedule_db_01_only_opted_in_rows_get_a_schedule() {
    let mut s = LeadStore::new_in_memory();
    let opted_in = s.insert_lead_row(input(true), ms(1_000), DELAY_MS).unwrap();
    let opted_out = s.insert_lead_row(input(false), ms(1_000), DELAY_MS).unwrap();

    let row = s.dispatch_schedule_row(&opted_in.lead_id).unwrap();
    assert_eq!(row.due_at, ms(31_000));
    assert_eq!(row.state, DispatchScheduleState::Due);
    assert!(s.dispatch_schedule_row(&opted_out.lead_id).is_none());
}

#[test]
fn at_schedule_db_02_rows_become_due_at_their_due_time() {
    let mut s = LeadStore::new_in_memory();
    let lead = s.insert_lead_row(input(true), ms(1_000), DELAY_MS).unwrap();
    assert!(s.due_dispatch_schedule_rows(ms(30_999), 10).is_empty());
    let due = s.due_dispatch_schedule_rows(ms(31_000), 10);
    assert_eq!(due.len(), 1);
    assert_eq!(due[0].lead_id, lead.lead_id);
}

#[test]
fn at_schedule_db_03_due_rows_are_ordered_and_bounded() {
    let mut s = LeadStore::new_in_memory();
    let late = s.insert_lead_row(input(true), ms(5_000), DELAY_MS).unwrap();
    let early = s.insert_lead_row(input(true), ms(1_000), DELAY_MS).unwrap();
    let _ = s.insert_lead_row(input(true), ms(2_000), DELAY_MS).unwrap();

    let due = s.due_dispatch_schedule_rows(ms(100_000), 2);
    assert_eq!(due.len(), 2);
    assert_eq!(due[0].lead_id, early.lead_id);
    assert_ne!(due[1].lead_id, late.lead_id);
}

#[test]
fn at_schedule_db_04_consume_is_one_shot() {
    let mut s = LeadStore::new_in_memory();
    let lead = s.insert_lead_row(input(true), ms(0), 0).unwrap();
    assert!(s.consume_dispatch_schedule_row(lead.lead_id).unwrap());
    assert!(!s.consume_dispatch_schedule_row(lead.lead_id).unwrap());
    assert!(s.due_dispatch_schedule_rows(ms(1), 10).is_empty());
    assert_eq!(s.lead_store_counters(ms(1)).consumed_schedule_count, 1);
}

#[test]
fn at_schedule_db_05_pending_schedule_survives_restart() {
    let seed = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("clock must be >= unix epoch")
        .as_nanos();
    let path = std::env::temp_dir()
        .join(format!("leadline-schedule-restart-{seed}"))
        .join("leads.jsonl");
    let (pending_id, consumed_id) = {
        let mut s = LeadStore::open_with_journal(&path).unwrap();
        let pending = s.insert_lead_row(input(true), ms(1_000), DELAY_MS).unwrap();
        let consumed = s.insert_lead_row(input(true), ms(1_000), 0).unwrap();
        assert!(s.consume_dispatch_schedule_row(consumed.lead_id).unwrap());
        (pending.lead_id, consumed.lead_id)
    };

    let s = LeadStore::open_with_journal(&path).unwrap();
    let due = s.due_dispatch_schedule_rows(ms(31_000), 10);
    assert_eq!(due.len(), 1);
    assert_eq!(due[0].lead_id, pending_id);
    assert_eq!(
        s.dispatch_schedule_row(&consumed_id).unwrap().state,
        DispatchScheduleState::Consumed
    );
    let _ = std::fs::remove_dir_all(path.parent().unwrap());
}
