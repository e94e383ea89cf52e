#![forbid(unsafe_code)]

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::common::validate_required_text;
use crate::lead::{LanguageTag, LeadId, LeadRecord};
use crate::{ContractViolation, Validate};

const TARGET_ID_MAX_LEN: usize = 128;

/// Assistant identity plus outbound phone-number identity used to place a call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallTarget {
    pub assistant_id: String,
    pub phone_number_id: String,
}

impl CallTarget {
    pub fn new(
        assistant_id: impl Into<String>,
        phone_number_id: impl Into<String>,
    ) -> Result<Self, ContractViolation> {
        let target = Self {
            assistant_id: assistant_id.into().trim().to_string(),
            phone_number_id: phone_number_id.into().trim().to_string(),
        };
        target.validate()?;
        Ok(target)
    }

    /// Parses `<assistant_id>:<phone_number_id>`.
    pub fn parse_pair(raw: &str) -> Result<Self, ContractViolation> {
        let Some((assistant_id, phone_number_id)) = raw.split_once(':') else {
            return Err(ContractViolation::InvalidValue {
                field: "call_target",
                reason: "expected <assistant_id>:<phone_number_id>",
            });
        };
        Self::new(assistant_id, phone_number_id)
    }
}

impl Validate for CallTarget {
    fn validate(&self) -> Result<(), ContractViolation> {
        validate_required_text("call_target.assistant_id", &self.assistant_id, TARGET_ID_MAX_LEN)?;
        validate_required_text(
            "call_target.phone_number_id",
            &self.phone_number_id,
            TARGET_ID_MAX_LEN,
        )?;
        if self.assistant_id.contains(':') || self.phone_number_id.contains(':') {
            return Err(ContractViolation::InvalidValue {
                field: "call_target",
                reason: "ids must not contain ':'",
            });
        }
        Ok(())
    }
}

/// Language tag -> call target, with a declared default for unknown or absent tags.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallTargetTable {
    default_target: CallTarget,
    by_language: BTreeMap<LanguageTag, CallTarget>,
}

impl CallTargetTable {
    pub const BUILTIN_DEFAULT_ASSISTANT_ID: &'static str = "123a00af-f502-4254-a15c-6718542bec65";
    pub const BUILTIN_DEFAULT_PHONE_NUMBER_ID: &'static str =
        "65c2cf1e-dafd-4f9f-aee0-a544d8d0421d";

    pub fn new(default_target: CallTarget) -> Self {
        Self {
            default_target,
            by_language: BTreeMap::new(),
        }
    }

    pub fn builtin() -> Self {
        Self::new(CallTarget {
            assistant_id: Self::BUILTIN_DEFAULT_ASSISTANT_ID.to_string(),
            phone_number_id: Self::BUILTIN_DEFAULT_PHONE_NUMBER_ID.to_string(),
        })
    }

    pub fn with_language(mut self, language: LanguageTag, target: CallTarget) -> Self {
        self.by_language.insert(language, target);
        self
    }

    pub fn set_default(&mut self, target: CallTarget) {
        self.default_target = target;
    }

    pub fn insert(&mut self, language: LanguageTag, target: CallTarget) {
        self.by_language.insert(language, target);
    }

    pub fn default_target(&self) -> &CallTarget {
        &self.default_target
    }

    pub fn select(&self, language: Option<&LanguageTag>) -> &CallTarget {
        language
            .and_then(|tag| self.by_language.get(tag))
            .unwrap_or(&self.default_target)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallCustomer {
    pub number: String,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssistantOverrides {
    pub variable_values: BTreeMap<String, String>,
}

/// Body of the calling API's create-call request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OutboundCallRequest {
    pub assistant_id: String,
    pub phone_number_id: String,
    pub customer: CallCustomer,
    pub assistant_overrides: AssistantOverrides,
}

impl OutboundCallRequest {
    pub fn for_lead(lead: &LeadRecord, target: &CallTarget) -> Self {
        let mut variable_values = BTreeMap::new();
        variable_values.insert("firstName".to_string(), lead.first_name.clone());
        variable_values.insert("lastName".to_string(), lead.last_name.clone());
        variable_values.insert("email".to_string(), lead.email.clone());
        let optional = [
            ("intent", lead.intent.as_deref()),
            ("language", lead.language.as_ref().map(LanguageTag::as_str)),
            ("serviceType", lead.service_type.as_deref()),
            ("urgency", lead.urgency.as_deref()),
            ("propertyType", lead.property_type.as_deref()),
            ("address", lead.address.as_deref()),
            ("projectDescription", lead.project_description.as_deref()),
        ];
        for (key, value) in optional {
            if let Some(value) = value {
                variable_values.insert(key.to_string(), value.to_string());
            }
        }
        Self {
            assistant_id: target.assistant_id.clone(),
            phone_number_id: target.phone_number_id.clone(),
            customer: CallCustomer {
                number: lead.phone_number.as_str().to_string(),
                name: lead.full_name(),
            },
            assistant_overrides: AssistantOverrides { variable_values },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlacedCall {
    /// `None` when the provider accepted the call but did not report an id.
    pub call_id: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchSkipReason {
    NotOptedIn,
    AlreadyScheduled,
}

impl DispatchSkipReason {
    pub const fn message(self) -> &'static str {
        match self {
            Self::NotOptedIn => "Lead did not opt in for call",
            Self::AlreadyScheduled => "Call already scheduled",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TriggerCallRequest {
    pub lead_id: LeadId,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TriggerCallResponse {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub call_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl TriggerCallResponse {
    pub fn triggered(call_id: Option<String>) -> Self {
        Self {
            success: true,
            call_id,
            message: Some("Call triggered successfully".to_string()),
            error: None,
        }
    }

    pub fn skipped(reason: DispatchSkipReason) -> Self {
        Self {
            success: false,
            call_id: None,
            message: Some(reason.message().to_string()),
            error: None,
        }
    }

    pub fn failed(error: String) -> Self {
        Self {
            success: false,
            call_id: None,
            message: None,
            error: Some(error),
        }
    }
}
