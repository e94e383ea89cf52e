#![forbid(unsafe_code)]

use std::time::Duration;

use leadline_contracts::lead::SubmitLeadRequest;
use leadline_contracts::provider_secrets::ProviderSecretId;
use serde_json::Value;
use thiserror::Error;
use tracing::{error, info};

use crate::dispatch::contact_hash_hex;
use crate::lead_form::{reduce, LeadFormAction, LeadFormState};

pub const DEFAULT_SUBMIT_URL: &str = "http://127.0.0.1:8080/functions/v1/submit-lead";
pub const SUCCESS_NOTICE_DURATION_MS: u32 = 5_000;
pub const ERROR_NOTICE_DURATION_MS: u32 = 7_000;

pub const NOTICE_SUCCESS_OPTED_IN: &str = "Success! Our assistant will call you shortly.";
pub const NOTICE_SUCCESS: &str =
    "Thank you! We've received your request and will be in touch soon.";
pub const NOTICE_NETWORK: &str =
    "Network error. Please check your internet connection and try again.";
pub const NOTICE_NOT_DEPLOYED: &str =
    "Service not available. Please ensure the lead functions are deployed.";
pub const NOTICE_FALLBACK: &str = "Failed to submit form. Please try again.";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SubmissionTransportError {
    #[error("network failure: {0}")]
    Network(String),
    #[error("http status {status}")]
    Http { status: u16, body: String },
    #[error("response decode failed: {0}")]
    Decode(String),
}

/// One request to the submit endpoint; 2xx bodies come back as parsed JSON.
pub trait SubmissionTransport {
    fn post_submit_lead(&self, req: &SubmitLeadRequest) -> Result<Value, SubmissionTransportError>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UreqSubmissionTransport {
    pub endpoint: String,
    pub anon_key: Option<String>,
    pub timeout_ms: u64,
}

impl UreqSubmissionTransport {
    pub fn new(endpoint: impl Into<String>, anon_key: Option<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            anon_key,
            timeout_ms: 10_000,
        }
    }

    pub fn from_env_var_map<F>(mut env_getter: F) -> Self
    where
        F: FnMut(&str) -> Option<String>,
    {
        let endpoint = env_getter("LEADLINE_SUBMIT_URL")
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
            .unwrap_or_else(|| DEFAULT_SUBMIT_URL.to_string());
        let anon_key = env_getter(ProviderSecretId::SubmitAnonKey.env_var())
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty());
        Self::new(endpoint, anon_key)
    }
}

impl SubmissionTransport for UreqSubmissionTransport {
    fn post_submit_lead(&self, req: &SubmitLeadRequest) -> Result<Value, SubmissionTransportError> {
        let timeout = Duration::from_millis(self.timeout_ms.max(100));
        let agent = ureq::AgentBuilder::new()
            .timeout_connect(timeout)
            .timeout_read(timeout)
            .build();
        let mut request = agent
            .post(&self.endpoint)
            .set("Content-Type", "application/json");
        if let Some(key) = self.anon_key.as_deref() {
            request = request
                .set("Authorization", &format!("Bearer {key}"))
                .set("apikey", key);
        }
        let response = match request.send_json(req) {
            Ok(resp) => resp,
            Err(ureq::Error::Status(status, resp)) => {
                let body = resp.into_string().unwrap_or_default();
                return Err(SubmissionTransportError::Http { status, body });
            }
            Err(ureq::Error::Transport(err)) => {
                return Err(SubmissionTransportError::Network(err.to_string()));
            }
        };
        response
            .into_json::<Value>()
            .map_err(|err| SubmissionTransportError::Decode(err.to_string()))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoticeKind {
    Success,
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notice {
    pub kind: NoticeKind,
    pub message: String,
    pub duration_ms: u32,
}

impl Notice {
    pub fn success(message: impl Into<String>) -> Self {
        Self {
            kind: NoticeKind::Success,
            message: message.into(),
            duration_ms: SUCCESS_NOTICE_DURATION_MS,
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            kind: NoticeKind::Error,
            message: message.into(),
            duration_ms: ERROR_NOTICE_DURATION_MS,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubmissionOutcome {
    pub form: LeadFormState,
    pub notice: Notice,
    pub lead_id: Option<u64>,
}

impl SubmissionOutcome {
    pub fn is_success(&self) -> bool {
        self.notice.kind == NoticeKind::Success
    }
}

#[derive(Debug, Clone)]
pub struct SubmissionClient<T>
where
    T: SubmissionTransport,
{
    transport: T,
}

impl<T> SubmissionClient<T>
where
    T: SubmissionTransport,
{
    pub fn new(transport: T) -> Self {
        Self { transport }
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Sends the form once. Success resets the form; any failure hands it back as-is.
    pub fn submit(&self, state: &LeadFormState) -> SubmissionOutcome {
        if let Err(err) = state.validate_required() {
            return failed(state, err.notice_text());
        }
        let req = state.to_submit_request();
        let contact_hash = contact_hash_hex(&req.phone_number);
        info!(contact_hash = %contact_hash, opt_in_call = req.opt_in_call, "submitting lead");

        let body = match self.transport.post_submit_lead(&req) {
            Ok(body) => body,
            Err(err) => {
                error!(contact_hash = %contact_hash, error = %err, "lead submission failed");
                return failed(state, transport_error_notice_text(&err));
            }
        };

        let succeeded = body.get("success").and_then(Value::as_bool) == Some(true);
        match (succeeded, body.get("leadId").and_then(Value::as_u64)) {
            (true, Some(lead_id)) => {
                info!(lead_id, "lead submitted");
                let message = if state.opt_in_call {
                    NOTICE_SUCCESS_OPTED_IN
                } else {
                    NOTICE_SUCCESS
                };
                SubmissionOutcome {
                    form: reduce(state, LeadFormAction::Reset),
                    notice: Notice::success(message),
                    lead_id: Some(lead_id),
                }
            }
            _ => {
                let text = remote_error_message(&body)
                    .map(|msg| message_notice_text(&msg))
                    .unwrap_or_else(|| NOTICE_FALLBACK.to_string());
                error!(contact_hash = %contact_hash, "lead submission rejected");
                failed(state, text)
            }
        }
    }
}

fn failed(state: &LeadFormState, message: String) -> SubmissionOutcome {
    SubmissionOutcome {
        form: state.clone(),
        notice: Notice::error(message),
        lead_id: None,
    }
}

pub fn transport_error_notice_text(err: &SubmissionTransportError) -> String {
    match err {
        SubmissionTransportError::Network(_) => NOTICE_NETWORK.to_string(),
        SubmissionTransportError::Http { status: 404, .. } => NOTICE_NOT_DEPLOYED.to_string(),
        SubmissionTransportError::Http { body, .. } => serde_json::from_str::<Value>(body)
            .ok()
            .and_then(|v| remote_error_message(&v))
            .or_else(|| {
                let trimmed = body.trim();
                (!trimmed.is_empty() && trimmed.to_ascii_lowercase().contains("not found"))
                    .then(|| trimmed.to_string())
            })
            .map(|msg| message_notice_text(&msg))
            .unwrap_or_else(|| NOTICE_FALLBACK.to_string()),
        SubmissionTransportError::Decode(_) => NOTICE_FALLBACK.to_string(),
    }
}

fn message_notice_text(message: &str) -> String {
    let lower = message.to_ascii_lowercase();
    if lower.contains("not found") || lower.contains("404") {
        NOTICE_NOT_DEPLOYED.to_string()
    } else {
        format!("Error: {message}")
    }
}

fn remote_error_message(body: &Value) -> Option<String> {
    body.get("error")
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|msg| !msg.is_empty())
        .map(ToString::to_string)
}
