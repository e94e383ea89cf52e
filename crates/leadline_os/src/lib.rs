#![forbid(unsafe_code)]

pub mod dispatch;
pub mod dispatch_schedule;
pub mod lead_form;
pub mod submission;
