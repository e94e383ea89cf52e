#![forbid(unsafe_code)]

use leadline_contracts::provider_secrets::ProviderSecretId;
use leadline_engines::secret_vault::SecretVault;

pub const VAULT_USAGE: &str = "usage: leadline vault <set|has|del|ls> [key_id]";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VaultCommand {
    Set(ProviderSecretId),
    Has(ProviderSecretId),
    Del(ProviderSecretId),
    Ls,
}

impl VaultCommand {
    pub fn parse(subcommand: &str, key_id: Option<&str>) -> Result<Self, String> {
        match subcommand {
            "set" => Ok(Self::Set(require_key_id(key_id)?)),
            "has" => Ok(Self::Has(require_key_id(key_id)?)),
            "del" => Ok(Self::Del(require_key_id(key_id)?)),
            "ls" => Ok(Self::Ls),
            _ => Err(format!(
                "unknown vault subcommand: {subcommand}. expected one of: set, has, del, ls"
            )),
        }
    }
}

/// Runs one vault command. Output never echoes a secret value.
pub fn execute_vault_command(
    vault: &SecretVault,
    command: VaultCommand,
    value: Option<&str>,
) -> Result<String, String> {
    match command {
        VaultCommand::Set(key) => {
            let raw = value.ok_or_else(|| "missing secret input value".to_string())?;
            vault
                .set_secret(key, raw)
                .map_err(|e| format!("failed to store {}: {e}", key.as_str()))?;
            Ok(format!("stored {}", key.as_str()))
        }
        VaultCommand::Has(key) => {
            let present = vault
                .has_secret(key)
                .map_err(|e| format!("failed to check {}: {e}", key.as_str()))?;
            Ok(if present { "YES" } else { "NO" }.to_string())
        }
        VaultCommand::Del(key) => {
            let removed = vault
                .delete_secret(key)
                .map_err(|e| format!("failed to delete {}: {e}", key.as_str()))?;
            Ok(if removed {
                format!("deleted {}", key.as_str())
            } else {
                format!("{} was not set", key.as_str())
            })
        }
        VaultCommand::Ls => {
            let keys = vault
                .list_secret_ids()
                .map_err(|e| format!("failed to list keys: {e}"))?;
            Ok(keys
                .iter()
                .map(|key| format!("{}\t(env {})", key.as_str(), key.env_var()))
                .collect::<Vec<_>>()
                .join("\n"))
        }
    }
}

pub fn parse_provider_secret_id(raw: &str) -> Result<ProviderSecretId, String> {
    ProviderSecretId::parse(raw).ok_or_else(|| {
        let allowed = ProviderSecretId::allowed_key_names().join(", ");
        format!("unknown key id '{raw}'. allowed: {allowed}")
    })
}

fn require_key_id(raw: Option<&str>) -> Result<ProviderSecretId, String> {
    let Some(raw) = raw else {
        let allowed = ProviderSecretId::allowed_key_names().join(", ");
        return Err(format!("missing key id. allowed: {allowed}"));
    };
    parse_provider_secret_id(raw)
}
