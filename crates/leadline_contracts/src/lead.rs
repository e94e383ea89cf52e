#![forbid(unsafe_code)]

use serde::{Deserialize, Serialize};

use crate::common::{trim_non_empty, validate_opt_text, validate_required_text};
use crate::{ContractViolation, MonotonicTimeNs, SchemaVersion, Validate};

pub const LEAD_CONTRACT_VERSION: SchemaVersion = SchemaVersion(1);

const NAME_MAX_LEN: usize = 128;
const EMAIL_MAX_LEN: usize = 254;
const PHONE_MAX_LEN: usize = 32;
const TAG_MAX_LEN: usize = 64;
const ADDRESS_MAX_LEN: usize = 256;
const DESCRIPTION_MAX_LEN: usize = 4_096;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LeadId(pub u64);

impl Validate for LeadId {
    fn validate(&self) -> Result<(), ContractViolation> {
        if self.0 == 0 {
            return Err(ContractViolation::InvalidValue {
                field: "lead_id",
                reason: "must be > 0",
            });
        }
        Ok(())
    }
}

impl std::fmt::Display for LeadId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Trims the raw input and guarantees a single leading `+`.
pub fn normalize_phone_number(raw: &str) -> String {
    let trimmed = raw.trim();
    if trimmed.starts_with('+') {
        trimmed.to_string()
    } else {
        format!("+{trimmed}")
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PhoneNumber(String);

impl PhoneNumber {
    pub fn normalize(raw: &str) -> Result<Self, ContractViolation> {
        validate_required_text("phone_number", raw, PHONE_MAX_LEN)?;
        let phone = Self(normalize_phone_number(raw));
        phone.validate()?;
        Ok(phone)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Validate for PhoneNumber {
    fn validate(&self) -> Result<(), ContractViolation> {
        if !self.0.starts_with('+') {
            return Err(ContractViolation::InvalidValue {
                field: "phone_number",
                reason: "must start with '+'",
            });
        }
        if self.0.len() < 2 {
            return Err(ContractViolation::MissingRequired {
                field: "phone_number",
            });
        }
        if self.0.len() > PHONE_MAX_LEN + 1 {
            return Err(ContractViolation::InvalidValue {
                field: "phone_number",
                reason: "exceeds max length",
            });
        }
        Ok(())
    }
}

/// Lowercase language/category tag used to pick a call target.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LanguageTag(String);

impl LanguageTag {
    pub fn parse(raw: &str) -> Option<Self> {
        let normalized = raw.trim().to_ascii_lowercase();
        if normalized.is_empty() {
            return None;
        }
        Some(Self(normalized))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Validate for LanguageTag {
    fn validate(&self) -> Result<(), ContractViolation> {
        validate_required_text("language", &self.0, TAG_MAX_LEN)?;
        if self.0.chars().any(|c| c.is_ascii_uppercase() || c.is_whitespace()) {
            return Err(ContractViolation::InvalidValue {
                field: "language",
                reason: "must be lowercase without whitespace",
            });
        }
        Ok(())
    }
}

pub fn validate_email(field: &'static str, value: &str) -> Result<(), ContractViolation> {
    validate_required_text(field, value, EMAIL_MAX_LEN)?;
    let Some((local, domain)) = value.trim().split_once('@') else {
        return Err(ContractViolation::InvalidValue {
            field,
            reason: "must contain '@'",
        });
    };
    if local.is_empty() || domain.is_empty() || domain.contains('@') {
        return Err(ContractViolation::InvalidValue {
            field,
            reason: "must be local@domain",
        });
    }
    if value.trim().chars().any(char::is_whitespace) {
        return Err(ContractViolation::InvalidValue {
            field,
            reason: "must not contain whitespace",
        });
    }
    Ok(())
}

/// Submission body accepted by the submit-lead endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmitLeadRequest {
    #[serde(default)]
    pub first_name: String,
    #[serde(default)]
    pub last_name: String,
    #[serde(default)]
    pub phone_number: String,
    #[serde(default)]
    pub email: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub intent: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub service_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub urgency: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub property_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub project_description: Option<String>,
    #[serde(default)]
    pub opt_in_call: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmitLeadResponse {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lead_id: Option<LeadId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl SubmitLeadResponse {
    pub fn accepted(lead_id: LeadId, message: String) -> Self {
        Self {
            success: true,
            lead_id: Some(lead_id),
            message: Some(message),
            error: None,
        }
    }

    pub fn failed(error: String) -> Self {
        Self {
            success: false,
            lead_id: None,
            message: None,
            error: Some(error),
        }
    }
}

/// Validated, normalized form of a submission, ready for insert.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LeadInput {
    pub first_name: String,
    pub last_name: String,
    pub phone_number: PhoneNumber,
    pub email: String,
    pub intent: Option<String>,
    pub language: Option<LanguageTag>,
    pub service_type: Option<String>,
    pub urgency: Option<String>,
    pub property_type: Option<String>,
    pub address: Option<String>,
    pub project_description: Option<String>,
    pub opt_in_call: bool,
}

impl LeadInput {
    pub fn from_request(req: SubmitLeadRequest) -> Result<Self, ContractViolation> {
        let input = Self {
            first_name: req.first_name.trim().to_string(),
            last_name: req.last_name.trim().to_string(),
            phone_number: PhoneNumber::normalize(&req.phone_number)?,
            email: req.email.trim().to_string(),
            intent: trim_non_empty(req.intent),
            language: req.language.as_deref().and_then(LanguageTag::parse),
            service_type: trim_non_empty(req.service_type),
            urgency: trim_non_empty(req.urgency),
            property_type: trim_non_empty(req.property_type),
            address: trim_non_empty(req.address),
            project_description: trim_non_empty(req.project_description),
            opt_in_call: req.opt_in_call,
        };
        input.validate()?;
        Ok(input)
    }
}

impl Validate for LeadInput {
    fn validate(&self) -> Result<(), ContractViolation> {
        validate_required_text("first_name", &self.first_name, NAME_MAX_LEN)?;
        validate_required_text("last_name", &self.last_name, NAME_MAX_LEN)?;
        self.phone_number.validate()?;
        validate_email("email", &self.email)?;
        validate_opt_text("intent", &self.intent, TAG_MAX_LEN)?;
        if let Some(language) = &self.language {
            language.validate()?;
        }
        validate_opt_text("service_type", &self.service_type, TAG_MAX_LEN)?;
        validate_opt_text("urgency", &self.urgency, TAG_MAX_LEN)?;
        validate_opt_text("property_type", &self.property_type, TAG_MAX_LEN)?;
        validate_opt_text("address", &self.address, ADDRESS_MAX_LEN)?;
        validate_opt_text(
            "project_description",
            &self.project_description,
            DESCRIPTION_MAX_LEN,
        )?;
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CallStatus {
    NotRequested,
    PendingDispatch,
    Scheduled,
}

/// One row of the `leads` table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LeadRecord {
    pub schema_version: SchemaVersion,
    pub lead_id: LeadId,
    pub first_name: String,
    pub last_name: String,
    pub phone_number: PhoneNumber,
    pub email: String,
    pub intent: Option<String>,
    pub language: Option<LanguageTag>,
    pub service_type: Option<String>,
    pub urgency: Option<String>,
    pub property_type: Option<String>,
    pub address: Option<String>,
    pub project_description: Option<String>,
    pub opt_in_call: bool,
    pub call_scheduled: bool,
    pub call_sid: Option<String>,
    pub created_at: MonotonicTimeNs,
}

impl LeadRecord {
    pub fn v1(
        lead_id: LeadId,
        input: LeadInput,
        created_at: MonotonicTimeNs,
    ) -> Result<Self, ContractViolation> {
        let record = Self {
            schema_version: LEAD_CONTRACT_VERSION,
            lead_id,
            first_name: input.first_name,
            last_name: input.last_name,
            phone_number: input.phone_number,
            email: input.email,
            intent: input.intent,
            language: input.language,
            service_type: input.service_type,
            urgency: input.urgency,
            property_type: input.property_type,
            address: input.address,
            project_description: input.project_description,
            opt_in_call: input.opt_in_call,
            call_scheduled: false,
            call_sid: None,
            created_at,
        };
        record.validate()?;
        Ok(record)
    }

    pub fn call_status(&self) -> CallStatus {
        if !self.opt_in_call {
            CallStatus::NotRequested
        } else if self.call_scheduled {
            CallStatus::Scheduled
        } else {
            CallStatus::PendingDispatch
        }
    }

    pub fn full_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
    }
}

impl Validate for LeadRecord {
    fn validate(&self) -> Result<(), ContractViolation> {
        if self.schema_version != LEAD_CONTRACT_VERSION {
            return Err(ContractViolation::InvalidValue {
                field: "lead_record.schema_version",
                reason: "unsupported schema version",
            });
        }
        self.lead_id.validate()?;
        validate_required_text("first_name", &self.first_name, NAME_MAX_LEN)?;
        validate_required_text("last_name", &self.last_name, NAME_MAX_LEN)?;
        self.phone_number.validate()?;
        validate_email("email", &self.email)?;
        if self.call_scheduled && !self.opt_in_call {
            return Err(ContractViolation::InvalidValue {
                field: "call_scheduled",
                reason: "must be false when opt_in_call is false",
            });
        }
        validate_opt_text("call_sid", &self.call_sid, 128)?;
        Ok(())
    }
}
