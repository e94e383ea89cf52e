#![forbid(unsafe_code)]

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SchemaVersion(pub u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MonotonicTimeNs(pub u64);

impl MonotonicTimeNs {
    pub fn saturating_add_ms(self, ms: u64) -> Self {
        Self(self.0.saturating_add(ms.saturating_mul(1_000_000)))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ContractViolation {
    InvalidValue {
        field: &'static str,
        reason: &'static str,
    },
    MissingRequired {
        field: &'static str,
    },
}

impl ContractViolation {
    pub fn field(&self) -> &'static str {
        match self {
            Self::InvalidValue { field, .. } | Self::MissingRequired { field } => field,
        }
    }
}

impl std::fmt::Display for ContractViolation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidValue { field, reason } => write!(f, "invalid {field}: {reason}"),
            Self::MissingRequired { field } => write!(f, "missing required field: {field}"),
        }
    }
}

impl std::error::Error for ContractViolation {}

pub trait Validate {
    fn validate(&self) -> Result<(), ContractViolation>;
}

pub(crate) fn validate_required_text(
    field: &'static str,
    value: &str,
    max_len: usize,
) -> Result<(), ContractViolation> {
    if value.trim().is_empty() {
        return Err(ContractViolation::MissingRequired { field });
    }
    if value.len() > max_len {
        return Err(ContractViolation::InvalidValue {
            field,
            reason: "exceeds max length",
        });
    }
    Ok(())
}

pub(crate) fn validate_opt_text(
    field: &'static str,
    value: &Option<String>,
    max_len: usize,
) -> Result<(), ContractViolation> {
    if let Some(v) = value {
        if v.trim().is_empty() {
            return Err(ContractViolation::InvalidValue {
                field,
                reason: "must not be empty when provided",
            });
        }
        if v.len() > max_len {
            return Err(ContractViolation::InvalidValue {
                field,
                reason: "exceeds max length",
            });
        }
    }
    Ok(())
}

/// Collapses a wire value into `None` when it is absent or blank.
pub fn trim_non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn monotonic_time_adds_milliseconds_without_overflow() {
        assert_eq!(
            MonotonicTimeNs(5).saturating_add_ms(30_000),
            MonotonicTimeNs(30_000_000_005)
        );
        assert_eq!(
            MonotonicTimeNs(u64::MAX - 1).saturating_add_ms(1),
            MonotonicTimeNs(u64::MAX)
        );
    }

    #[test]
    fn required_text_rejects_blank_values() {
        assert_eq!(
            validate_required_text("first_name", "   ", 16),
            Err(ContractViolation::MissingRequired {
                field: "first_name"
            })
        );
        assert!(validate_required_text("first_name", "John", 16).is_ok());
    }

    #[test]
    fn trim_non_empty_drops_blank_wire_values() {
        assert_eq!(trim_non_empty(Some("  ".to_string())), None);
        assert_eq!(
            trim_non_empty(Some(" buy ".to_string())),
            Some("buy".to_string())
        );
        assert_eq!(trim_non_empty(None), None);
    }
}
