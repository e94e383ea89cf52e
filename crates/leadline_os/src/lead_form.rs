#![forbid(unsafe_code)]

use leadline_contracts::lead::{normalize_phone_number, validate_email, SubmitLeadRequest};

pub const DEFAULT_SERVICE_TYPE: &str = "electrical_repair";
pub const DEFAULT_URGENCY: &str = "routine";
pub const DEFAULT_PROPERTY_TYPE: &str = "residential";

/// Snapshot of the lead form. Transitions only happen through [`reduce`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LeadFormState {
    pub first_name: String,
    pub last_name: String,
    pub phone_number: String,
    pub email: String,
    pub intent: String,
    pub language: String,
    pub service_type: String,
    pub urgency: String,
    pub property_type: String,
    pub address: String,
    pub project_description: String,
    pub opt_in_call: bool,
}

impl Default for LeadFormState {
    fn default() -> Self {
        Self {
            first_name: String::new(),
            last_name: String::new(),
            phone_number: String::new(),
            email: String::new(),
            intent: String::new(),
            language: String::new(),
            service_type: DEFAULT_SERVICE_TYPE.to_string(),
            urgency: DEFAULT_URGENCY.to_string(),
            property_type: DEFAULT_PROPERTY_TYPE.to_string(),
            address: String::new(),
            project_description: String::new(),
            opt_in_call: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LeadFormAction {
    SetFirstName(String),
    SetLastName(String),
    SetPhoneNumber(String),
    SetEmail(String),
    SetIntent(String),
    SetLanguage(String),
    SetServiceType(String),
    SetUrgency(String),
    SetPropertyType(String),
    SetAddress(String),
    SetProjectDescription(String),
    SetOptInCall(bool),
    Reset,
}

pub fn reduce(state: &LeadFormState, action: LeadFormAction) -> LeadFormState {
    let mut next = state.clone();
    match action {
        LeadFormAction::SetFirstName(v) => next.first_name = v,
        LeadFormAction::SetLastName(v) => next.last_name = v,
        LeadFormAction::SetPhoneNumber(v) => next.phone_number = v,
        LeadFormAction::SetEmail(v) => next.email = v,
        LeadFormAction::SetIntent(v) => next.intent = v,
        LeadFormAction::SetLanguage(v) => next.language = v,
        LeadFormAction::SetServiceType(v) => next.service_type = v,
        LeadFormAction::SetUrgency(v) => next.urgency = v,
        LeadFormAction::SetPropertyType(v) => next.property_type = v,
        LeadFormAction::SetAddress(v) => next.address = v,
        LeadFormAction::SetProjectDescription(v) => next.project_description = v,
        LeadFormAction::SetOptInCall(v) => next.opt_in_call = v,
        LeadFormAction::Reset => return LeadFormState::default(),
    }
    next
}

/// First failing required-field check, phrased for display.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FormValidationError {
    pub field_label: &'static str,
}

impl FormValidationError {
    pub fn notice_text(self) -> String {
        format!("Please fill in {}.", self.field_label)
    }
}

impl LeadFormState {
    pub fn validate_required(&self) -> Result<(), FormValidationError> {
        let required = [
            ("first name", &self.first_name),
            ("last name", &self.last_name),
            ("phone number", &self.phone_number),
            ("email", &self.email),
        ];
        for (field_label, value) in required {
            if value.trim().is_empty() {
                return Err(FormValidationError { field_label });
            }
        }
        if validate_email("email", &self.email).is_err() {
            return Err(FormValidationError {
                field_label: "a valid email address",
            });
        }
        Ok(())
    }

    /// Request body for the submit endpoint, with the phone number normalized.
    pub fn to_submit_request(&self) -> SubmitLeadRequest {
        SubmitLeadRequest {
            first_name: self.first_name.trim().to_string(),
            last_name: self.last_name.trim().to_string(),
            phone_number: normalize_phone_number(&self.phone_number),
            email: self.email.trim().to_string(),
            intent: non_empty(&self.intent),
            language: non_empty(&self.language),
            service_type: non_empty(&self.service_type),
            urgency: non_empty(&self.urgency),
            property_type: non_empty(&self.property_type),
            address: non_empty(&self.address),
            project_description: non_empty(&self.project_description),
            opt_in_call: self.opt_in_call,
        }
    }
}

fn non_empty(value: &str) -> Option<String> {
    let trimmed = value.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}
