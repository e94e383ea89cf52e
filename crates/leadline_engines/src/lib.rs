#![forbid(unsafe_code)]

pub mod secret_vault;
pub mod vapi;
