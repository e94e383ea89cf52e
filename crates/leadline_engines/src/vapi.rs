#![forbid(unsafe_code)]

use std::time::Duration;

use leadline_contracts::common::trim_non_empty;
use leadline_contracts::dispatch::{OutboundCallRequest, PlacedCall};
use leadline_contracts::provider_secrets::ProviderSecretId;
use serde_json::Value;
use tracing::{debug, error, warn};

use crate::secret_vault::SecretVault;

const PROVIDER: &str = "vapi";
const DETAIL_MAX_LEN: usize = 512;

pub const VAPI_DEFAULT_BASE_URL: &str = "https://api.vapi.ai";
pub const VAPI_DEFAULT_TIMEOUT_MS: u32 = 10_000;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderCallError {
    pub provider: &'static str,
    pub error_kind: &'static str,
    pub http_status: Option<u16>,
    pub detail: Option<String>,
}

impl ProviderCallError {
    pub fn new(error_kind: &'static str, http_status: Option<u16>, detail: Option<String>) -> Self {
        Self {
            provider: PROVIDER,
            error_kind,
            http_status,
            detail: detail.map(|d| truncate_chars(&d, DETAIL_MAX_LEN)),
        }
    }

    pub fn safe_detail(&self) -> String {
        match self.http_status {
            Some(status) => format!(
                "provider={} error={} status={}",
                self.provider, self.error_kind, status
            ),
            None => format!("provider={} error={}", self.provider, self.error_kind),
        }
    }
}

impl std::fmt::Display for ProviderCallError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match (self.error_kind, self.detail.as_deref()) {
            ("missing_api_key", _) => write!(f, "Vapi API key not configured"),
            ("http_non_2xx", Some(body)) => write!(f, "Vapi API error: {body}"),
            (_, Some(detail)) => write!(f, "{} ({detail})", self.safe_detail()),
            (_, None) => write!(f, "{}", self.safe_detail()),
        }
    }
}

impl std::error::Error for ProviderCallError {}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VapiCallConfig {
    pub base_url: String,
    pub timeout_ms: u32,
    pub api_key: Option<String>,
    pub user_agent: String,
}

impl VapiCallConfig {
    pub fn mvp_v1() -> Self {
        Self {
            base_url: VAPI_DEFAULT_BASE_URL.to_string(),
            timeout_ms: VAPI_DEFAULT_TIMEOUT_MS,
            api_key: None,
            user_agent: format!("leadline/{}", env!("CARGO_PKG_VERSION")),
        }
    }

    /// Reads `LEADLINE_VAPI_BASE_URL`, `LEADLINE_VAPI_TIMEOUT_MS` and the API key env var.
    pub fn from_env_var_map<F>(mut env_getter: F) -> Self
    where
        F: FnMut(&str) -> Option<String>,
    {
        let mut config = Self::mvp_v1();
        if let Some(base_url) = env_getter("LEADLINE_VAPI_BASE_URL")
            .map(|v| v.trim().trim_end_matches('/').to_string())
            .filter(|v| !v.is_empty())
        {
            config.base_url = base_url;
        }
        if let Some(timeout_ms) = env_getter("LEADLINE_VAPI_TIMEOUT_MS")
            .and_then(|v| v.trim().parse::<u32>().ok())
            .filter(|v| (100..=120_000).contains(v))
        {
            config.timeout_ms = timeout_ms;
        }
        config.api_key = env_getter(ProviderSecretId::VapiApiKey.env_var())
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty());
        config
    }

    fn call_endpoint(&self) -> String {
        format!("{}/call", self.base_url.trim_end_matches('/'))
    }
}

/// Places outbound calls against the Vapi REST API.
#[derive(Debug, Clone)]
pub struct VapiCallRuntime {
    config: VapiCallConfig,
    vault: Option<SecretVault>,
}

impl VapiCallRuntime {
    pub fn new(config: VapiCallConfig) -> Self {
        Self {
            config,
            vault: None,
        }
    }

    pub fn with_vault(mut self, vault: SecretVault) -> Self {
        self.vault = Some(vault);
        self
    }

    pub fn config(&self) -> &VapiCallConfig {
        &self.config
    }

    pub fn place_call(&self, req: &OutboundCallRequest) -> Result<PlacedCall, ProviderCallError> {
        let api_key = self
            .resolve_api_key()
            .ok_or_else(|| ProviderCallError::new("missing_api_key", None, None))?;
        let payload = serde_json::to_value(req).map_err(|err| {
            ProviderCallError::new("json_encode", None, Some(err.to_string()))
        })?;
        let agent = build_http_agent(&self.config);
        let endpoint = self.config.call_endpoint();
        debug!(endpoint = %endpoint, assistant_id = %req.assistant_id, "placing outbound call");

        let response = agent
            .post(&endpoint)
            .set("Content-Type", "application/json")
            .set("Authorization", &format!("Bearer {api_key}"))
            .set("Accept", "application/json")
            .send_json(payload)
            .map_err(provider_error_from_ureq)?;
        // Past this point the call exists; a missing id is logged, not returned as an error.
        let status = response.status();
        let call_id = match serde_json::from_reader::<_, Value>(response.into_reader()) {
            Ok(body) => extract_call_id(&body),
            Err(err) => {
                error!(status, error = %err, "vapi accepted the call with an unreadable body");
                None
            }
        };
        if call_id.is_none() {
            error!(status, "vapi accepted the call without a call id");
        }
        Ok(PlacedCall { call_id })
    }

    fn resolve_api_key(&self) -> Option<String> {
        trim_non_empty(self.config.api_key.clone())
            .or_else(|| self.resolve_api_key_from_vault())
    }

    fn resolve_api_key_from_vault(&self) -> Option<String> {
        let vault = self.vault.as_ref()?;
        match vault.resolve_secret(ProviderSecretId::VapiApiKey) {
            Ok(secret) => trim_non_empty(secret),
            Err(err) => {
                warn!(error = %err, "vapi api key could not be read from the secret vault");
                None
            }
        }
    }
}

fn build_http_agent(config: &VapiCallConfig) -> ureq::Agent {
    let timeout = Duration::from_millis(u64::from(config.timeout_ms).max(100));
    ureq::AgentBuilder::new()
        .timeout_connect(timeout)
        .timeout_read(timeout)
        .timeout_write(timeout)
        .user_agent(&config.user_agent)
        .build()
}

/// The calling API reports the created call as `id`; some responses use `callId`.
pub fn extract_call_id(body: &Value) -> Option<String> {
    ["id", "callId"]
        .iter()
        .filter_map(|key| body.get(*key).and_then(Value::as_str))
        .map(str::trim)
        .find(|id| !id.is_empty())
        .map(ToString::to_string)
}

fn provider_error_from_ureq(err: ureq::Error) -> ProviderCallError {
    match err {
        ureq::Error::Status(status, resp) => {
            let detail = trim_non_empty(resp.into_string().ok());
            ProviderCallError::new("http_non_2xx", Some(status), detail)
        }
        ureq::Error::Transport(transport) => {
            let combined = format!("{:?} {}", transport.kind(), transport);
            ProviderCallError::new(classify_transport_error_kind(&combined), None, None)
        }
    }
}

pub fn classify_transport_error_kind(raw: &str) -> &'static str {
    let lower = raw.to_ascii_lowercase();
    if lower.contains("timeout") || lower.contains("timed out") {
        "timeout"
    } else if lower.contains("tls") || lower.contains("ssl") {
        "tls"
    } else if lower.contains("dns") {
        "dns"
    } else if lower.contains("connection") || lower.contains("connect") {
        "connection"
    } else {
        "transport"
    }
}

fn truncate_chars(value: &str, max_len: usize) -> String {
    value.chars().take(max_len).collect()
}
