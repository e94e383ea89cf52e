#![forbid(unsafe_code)]

use std::collections::BTreeMap;
use std::env;
use std::fs::{self, OpenOptions};
use std::io::{self, ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use aes_gcm::aead::Aead;
use aes_gcm::{Aes256Gcm, KeyInit, Nonce};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use leadline_contracts::provider_secrets::ProviderSecretId;
use rand::rngs::OsRng;
use rand::RngCore;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

const VAULT_FILE_VERSION: u8 = 1;
const MASTER_KEY_BYTES: usize = 32;
const NONCE_BYTES: usize = 12;

pub const SECRET_VAULT_PATH_ENV: &str = "LEADLINE_SECRET_VAULT_PATH";

#[derive(Debug, Error)]
pub enum VaultError {
    #[error("secret value must not be blank")]
    BlankSecret,
    #[error("secret vault file version {0} is not supported")]
    UnsupportedVersion(u8),
    #[error("secret vault master key is malformed")]
    MalformedMasterKey,
    #[error("secret '{0}' could not be encrypted")]
    Unsealable(&'static str),
    #[error("secret '{0}' could not be decrypted")]
    Undecryptable(&'static str),
    #[error("secret vault io: {0}")]
    Io(#[from] io::Error),
    #[error("secret vault json: {0}")]
    Json(#[from] serde_json::Error),
    #[error("secret vault base64: {0}")]
    Base64(#[from] base64::DecodeError),
}

/// One encrypted credential as written to disk.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct SealedSecret {
    nonce: String,
    sealed: String,
    stored_at_ms: u64,
}

impl SealedSecret {
    fn seal(cipher: &Aes256Gcm, id: ProviderSecretId, plaintext: &str) -> Result<Self, VaultError> {
        let mut nonce = [0u8; NONCE_BYTES];
        OsRng.fill_bytes(&mut nonce);
        let sealed = cipher
            .encrypt(Nonce::from_slice(&nonce), plaintext.as_bytes())
            .map_err(|_| VaultError::Unsealable(id.as_str()))?;
        Ok(Self {
            nonce: BASE64.encode(nonce),
            sealed: BASE64.encode(sealed),
            stored_at_ms: unix_ms_now(),
        })
    }

    fn open(&self, cipher: &Aes256Gcm, id: ProviderSecretId) -> Result<String, VaultError> {
        let nonce = BASE64.decode(&self.nonce)?;
        if nonce.len() != NONCE_BYTES {
            return Err(VaultError::Undecryptable(id.as_str()));
        }
        let sealed = BASE64.decode(&self.sealed)?;
        cipher
            .decrypt(Nonce::from_slice(&nonce), sealed.as_slice())
            .ok()
            .and_then(|plain| String::from_utf8(plain).ok())
            .ok_or(VaultError::Undecryptable(id.as_str()))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct VaultFile {
    version: u8,
    secrets: BTreeMap<String, SealedSecret>,
}

impl Default for VaultFile {
    fn default() -> Self {
        Self {
            version: VAULT_FILE_VERSION,
            secrets: BTreeMap::new(),
        }
    }
}

/// Provider credentials (Vapi key, submit anon key) sealed with AES-256-GCM under a
/// host-local master key kept beside the vault file.
#[derive(Debug, Clone)]
pub struct SecretVault {
    vault_path: PathBuf,
    key_path: PathBuf,
}

impl SecretVault {
    /// `$LEADLINE_SECRET_VAULT_PATH`, else `~/.leadline/secrets.json`.
    pub fn default_local() -> Self {
        let vault_path = env::var(SECRET_VAULT_PATH_ENV)
            .ok()
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
            .map(PathBuf::from)
            .unwrap_or_else(|| leadline_home().join("secrets.json"));
        let key_path = vault_path.with_extension("key");
        Self::for_paths(vault_path, key_path)
    }

    pub fn for_paths(vault_path: PathBuf, key_path: PathBuf) -> Self {
        Self {
            vault_path,
            key_path,
        }
    }

    pub fn set_secret(&self, id: ProviderSecretId, value: &str) -> Result<(), VaultError> {
        let value = value.trim();
        if value.is_empty() {
            return Err(VaultError::BlankSecret);
        }
        let sealed = SealedSecret::seal(&self.cipher(true)?, id, value)?;
        let mut file = self.load()?.unwrap_or_default();
        file.secrets.insert(id.as_str().to_string(), sealed);
        self.store(&file)?;
        debug!(secret = id.as_str(), "secret stored in vault");
        Ok(())
    }

    /// `Ok(None)` when the vault, or this entry, does not exist.
    pub fn resolve_secret(&self, id: ProviderSecretId) -> Result<Option<String>, VaultError> {
        let Some(sealed) = self
            .load()?
            .and_then(|mut file| file.secrets.remove(id.as_str()))
        else {
            return Ok(None);
        };
        let value = sealed.open(&self.cipher(false)?, id)?;
        Ok(Some(value).filter(|v| !v.trim().is_empty()))
    }

    pub fn has_secret(&self, id: ProviderSecretId) -> Result<bool, VaultError> {
        self.resolve_secret(id).map(|v| v.is_some())
    }

    pub fn delete_secret(&self, id: ProviderSecretId) -> Result<bool, VaultError> {
        let Some(mut file) = self.load()? else {
            return Ok(false);
        };
        if file.secrets.remove(id.as_str()).is_none() {
            return Ok(false);
        }
        self.store(&file)?;
        Ok(true)
    }

    pub fn list_secret_ids(&self) -> Result<Vec<ProviderSecretId>, VaultError> {
        Ok(self
            .load()?
            .map(|file| {
                file.secrets
                    .keys()
                    .filter_map(|key| ProviderSecretId::parse(key))
                    .collect()
            })
            .unwrap_or_default())
    }

    fn load(&self) -> Result<Option<VaultFile>, VaultError> {
        let raw = match fs::read(&self.vault_path) {
            Ok(raw) => raw,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(None),
            Err(err) => return Err(err.into()),
        };
        if raw.iter().all(u8::is_ascii_whitespace) {
            return Ok(Some(VaultFile::default()));
        }
        let file: VaultFile = serde_json::from_slice(&raw)?;
        if file.version != VAULT_FILE_VERSION {
            return Err(VaultError::UnsupportedVersion(file.version));
        }
        Ok(Some(file))
    }

    fn store(&self, file: &VaultFile) -> Result<(), VaultError> {
        create_parent(&self.vault_path)?;
        let staged = self
            .vault_path
            .with_extension(format!("tmp.{}", std::process::id()));
        fs::write(&staged, serde_json::to_vec_pretty(file)?)?;
        fs::rename(&staged, &self.vault_path)?;
        Ok(())
    }

    /// Reads the master key; with `create`, a missing key is generated first.
    fn cipher(&self, create: bool) -> Result<Aes256Gcm, VaultError> {
        let key = match fs::read_to_string(&self.key_path) {
            Ok(encoded) => {
                let decoded = BASE64.decode(encoded.trim())?;
                <[u8; MASTER_KEY_BYTES]>::try_from(decoded.as_slice())
                    .map_err(|_| VaultError::MalformedMasterKey)?
            }
            Err(err) if err.kind() == ErrorKind::NotFound && create => self.create_master_key()?,
            Err(err) => return Err(err.into()),
        };
        Aes256Gcm::new_from_slice(&key).map_err(|_| VaultError::MalformedMasterKey)
    }

    fn create_master_key(&self) -> Result<[u8; MASTER_KEY_BYTES], VaultError> {
        create_parent(&self.key_path)?;
        let mut key = [0u8; MASTER_KEY_BYTES];
        OsRng.fill_bytes(&mut key);
        let mut options = OpenOptions::new();
        options.write(true).create_new(true);
        #[cfg(unix)]
        {
            use std::os::unix::fs::OpenOptionsExt;
            options.mode(0o600);
        }
        let mut out = options.open(&self.key_path)?;
        out.write_all(BASE64.encode(key).as_bytes())?;
        out.sync_all()?;
        debug!(key_path = %self.key_path.display(), "vault master key created");
        Ok(key)
    }
}

fn leadline_home() -> PathBuf {
    env::var("HOME")
        .ok()
        .filter(|home| !home.trim().is_empty())
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".leadline")
}

fn create_parent(path: &Path) -> io::Result<()> {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => fs::create_dir_all(parent),
        _ => Ok(()),
    }
}

fn unix_ms_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| u64::try_from(d.as_millis()).unwrap_or(u64::MAX))
        .unwrap_or(1)
}
