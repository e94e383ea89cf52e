#![forbid(unsafe_code)]

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ProviderSecretId {
    VapiApiKey,
    SubmitAnonKey,
}

impl ProviderSecretId {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::VapiApiKey => "vapi_api_key",
            Self::SubmitAnonKey => "submit_anon_key",
        }
    }

    /// Environment variable consulted before the local vault.
    pub const fn env_var(self) -> &'static str {
        match self {
            Self::VapiApiKey => "VAPI_API_KEY",
            Self::SubmitAnonKey => "LEADLINE_ANON_KEY",
        }
    }

    pub const fn all() -> &'static [Self] {
        &[Self::VapiApiKey, Self::SubmitAnonKey]
    }

    pub fn parse(raw: &str) -> Option<Self> {
        let normalized = raw.trim().to_ascii_lowercase();
        match normalized.as_str() {
            "vapi_api_key" => Some(Self::VapiApiKey),
            "submit_anon_key" => Some(Self::SubmitAnonKey),
            _ => None,
        }
    }

    pub fn allowed_key_names() -> Vec<&'static str> {
        Self::all().iter().map(|id| id.as_str()).collect()
    }
}
