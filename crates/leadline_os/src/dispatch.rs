#![forbid(unsafe_code)]

use std::sync::Mutex;

use leadline_contracts::dispatch::{
    CallTarget, CallTargetTable, DispatchSkipReason, OutboundCallRequest, PlacedCall,
};
use leadline_contracts::lead::{LanguageTag, LeadId};
use leadline_contracts::ContractViolation;
use leadline_engines::vapi::{ProviderCallError, VapiCallRuntime};
use leadline_storage::{DispatchClaim, LeadRepo, StorageError};
use sha2::{Digest, Sha256};
use thiserror::Error;
use tracing::{error, info, warn};

pub const CALL_TARGET_ENV_PREFIX: &str = "LEADLINE_CALL_TARGET_";
pub const CALL_TARGET_DEFAULT_ENV: &str = "LEADLINE_CALL_TARGET_DEFAULT";

pub trait CallPlacementEngine {
    fn place_call(&self, req: &OutboundCallRequest) -> Result<PlacedCall, ProviderCallError>;
}

impl CallPlacementEngine for VapiCallRuntime {
    fn place_call(&self, req: &OutboundCallRequest) -> Result<PlacedCall, ProviderCallError> {
        VapiCallRuntime::place_call(self, req)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchOutcome {
    Triggered { call_id: Option<String> },
    Skipped(DispatchSkipReason),
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum DispatchError {
    #[error("Lead not found")]
    LeadNotFound(LeadId),
    #[error("{0}")]
    Provider(#[from] ProviderCallError),
    #[error("{0}")]
    Storage(StorageError),
    #[error("lead store lock poisoned")]
    LockPoisoned,
}

impl From<StorageError> for DispatchError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::LeadNotFound(lead_id) => Self::LeadNotFound(lead_id),
            other => Self::Storage(other),
        }
    }
}

/// Claims a lead, places its call outside the store lock, then records the result.
#[derive(Debug, Clone)]
pub struct CallDispatchWiring<E>
where
    E: CallPlacementEngine,
{
    call_targets: CallTargetTable,
    engine: E,
}

impl<E> CallDispatchWiring<E>
where
    E: CallPlacementEngine,
{
    pub fn new(call_targets: CallTargetTable, engine: E) -> Self {
        Self {
            call_targets,
            engine,
        }
    }

    pub fn engine(&self) -> &E {
        &self.engine
    }

    pub fn dispatch<R>(
        &self,
        store: &Mutex<R>,
        lead_id: LeadId,
    ) -> Result<DispatchOutcome, DispatchError>
    where
        R: LeadRepo,
    {
        let claim = {
            let mut guard = store.lock().map_err(|_| DispatchError::LockPoisoned)?;
            guard.claim_dispatch_row(lead_id)?
        };
        let lead = match claim {
            DispatchClaim::Claimed(lead) => lead,
            DispatchClaim::NotOptedIn => {
                warn!(lead_id = %lead_id, "dispatch skipped: lead did not opt in");
                return Ok(DispatchOutcome::Skipped(DispatchSkipReason::NotOptedIn));
            }
            DispatchClaim::AlreadyScheduled | DispatchClaim::InFlight => {
                warn!(lead_id = %lead_id, "dispatch skipped: call already scheduled");
                return Ok(DispatchOutcome::Skipped(
                    DispatchSkipReason::AlreadyScheduled,
                ));
            }
        };

        let target = self.call_targets.select(lead.language.as_ref());
        let req = OutboundCallRequest::for_lead(&lead, target);
        let contact_hash = contact_hash_hex(lead.phone_number.as_str());
        info!(
            lead_id = %lead_id,
            contact_hash = %contact_hash,
            assistant_id = %target.assistant_id,
            "placing outbound call"
        );

        let placed = match self.engine.place_call(&req) {
            Ok(placed) => placed,
            Err(err) => {
                error!(
                    lead_id = %lead_id,
                    error_kind = err.error_kind,
                    detail = %err.safe_detail(),
                    "outbound call failed"
                );
                let mut guard = store.lock().map_err(|_| DispatchError::LockPoisoned)?;
                guard.release_dispatch_claim_row(lead_id);
                return Err(DispatchError::Provider(err));
            }
        };

        let mut guard = store.lock().map_err(|_| DispatchError::LockPoisoned)?;
        match guard.mark_call_scheduled_row(lead_id, placed.call_id.clone()) {
            Ok(true) => {}
            Ok(false) => {
                warn!(
                    lead_id = %lead_id,
                    call_id = ?placed.call_id,
                    "lead was already marked scheduled"
                );
            }
            Err(err) => {
                // The call exists: keep the claim so this lead is not called again.
                error!(
                    lead_id = %lead_id,
                    call_id = ?placed.call_id,
                    error = %err,
                    "call placed but not recorded"
                );
                return Err(err.into());
            }
        }
        info!(lead_id = %lead_id, call_id = ?placed.call_id, "call triggered");
        Ok(DispatchOutcome::Triggered {
            call_id: placed.call_id,
        })
    }
}

/// Builds the call-target table from `LEADLINE_CALL_TARGET_*` pairs over the built-in default.
pub fn call_target_table_from_env_pairs<I, K, V>(
    pairs: I,
) -> Result<CallTargetTable, ContractViolation>
where
    I: IntoIterator<Item = (K, V)>,
    K: AsRef<str>,
    V: AsRef<str>,
{
    let mut table = CallTargetTable::builtin();
    for (key, value) in pairs {
        let key = key.as_ref();
        let Some(suffix) = key.strip_prefix(CALL_TARGET_ENV_PREFIX) else {
            continue;
        };
        let target = CallTarget::parse_pair(value.as_ref())?;
        if key == CALL_TARGET_DEFAULT_ENV {
            table.set_default(target);
            continue;
        }
        let Some(tag) = LanguageTag::parse(suffix) else {
            return Err(ContractViolation::InvalidValue {
                field: "call_target.language",
                reason: "must not be empty",
            });
        };
        table.insert(tag, target);
    }
    Ok(table)
}

/// Stable short hash for log lines that would otherwise carry a phone number.
pub fn contact_hash_hex(phone_number: &str) -> String {
    let digest = Sha256::digest(phone_number.trim().as_bytes());
    digest[..8].iter().map(|b| format!("{b:02x}")).collect()
}
