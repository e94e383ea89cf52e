#![forbid(unsafe_code)]

pub mod submit_cli;
pub mod vault_cli;
