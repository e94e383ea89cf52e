#![forbid(unsafe_code)]

pub mod journal;
pub mod lead_store;
pub mod repo;

pub use lead_store::{
    DispatchClaim, DispatchScheduleRow, DispatchScheduleState, LeadStore, LeadStoreCounters,
    StorageError,
};
pub use repo::LeadRepo;
