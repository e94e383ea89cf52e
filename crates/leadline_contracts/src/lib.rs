#![forbid(unsafe_code)]

pub mod common;
pub mod dispatch;
pub mod lead;
pub mod provider_secrets;

pub use common::{ContractViolation, MonotonicTimeNs, SchemaVersion, Validate};
