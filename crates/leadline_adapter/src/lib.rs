#![forbid(unsafe_code)]

use std::env;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::{SystemTime, UNIX_EPOCH};

use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::http::{header, HeaderName, Method, StatusCode};
use axum::routing::{get, post};
use axum::{Json, Router};
use leadline_contracts::dispatch::{TriggerCallRequest, TriggerCallResponse};
use leadline_contracts::lead::{LeadId, LeadInput, SubmitLeadRequest, SubmitLeadResponse};
use leadline_contracts::{ContractViolation, MonotonicTimeNs};
use leadline_engines::secret_vault::SecretVault;
use leadline_engines::vapi::{VapiCallConfig, VapiCallRuntime};
use leadline_os::dispatch::{
    call_target_table_from_env_pairs, contact_hash_hex, CallDispatchWiring, CallPlacementEngine,
    DispatchError, DispatchOutcome,
};
use leadline_os::dispatch_schedule::{
    run_dispatch_worker_pass, DispatchWorkerPassMetrics, DISPATCH_DELAY_MS_DEFAULT,
    DISPATCH_WORKER_MAX_ITEMS,
};
use leadline_storage::{LeadRepo, LeadStore, LeadStoreCounters, StorageError};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{error, info};

pub const SUBMIT_LEAD_PATH: &str = "/functions/v1/submit-lead";
pub const TRIGGER_CALL_PATH: &str = "/functions/v1/trigger-call";
pub const DISPATCH_DELAY_MS_MAX: u64 = 3_600_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AdapterConfig {
    pub dispatch_delay_ms: u64,
    pub worker_max_items: usize,
}

impl AdapterConfig {
    pub fn mvp_v1() -> Self {
        Self {
            dispatch_delay_ms: DISPATCH_DELAY_MS_DEFAULT,
            worker_max_items: DISPATCH_WORKER_MAX_ITEMS,
        }
    }

    pub fn from_env_var_map<F>(mut env_getter: F) -> Self
    where
        F: FnMut(&str) -> Option<String>,
    {
        let dispatch_delay_ms = env_getter("LEADLINE_DISPATCH_DELAY_MS")
            .and_then(|v| v.trim().parse::<u64>().ok())
            .filter(|v| *v <= DISPATCH_DELAY_MS_MAX)
            .unwrap_or(DISPATCH_DELAY_MS_DEFAULT);
        Self {
            dispatch_delay_ms,
            ..Self::mvp_v1()
        }
    }
}

#[derive(Debug, Error)]
pub enum AdapterError {
    #[error("{0}")]
    Validation(#[from] ContractViolation),
    #[error("{0}")]
    Storage(StorageError),
    #[error("{0}")]
    Dispatch(#[from] DispatchError),
    #[error("adapter store lock poisoned")]
    LockPoisoned,
}

impl From<StorageError> for AdapterError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::ContractViolation(violation) => Self::Validation(violation),
            other => Self::Storage(other),
        }
    }
}

impl AdapterError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::Validation(_) => StatusCode::BAD_REQUEST,
            Self::Storage(StorageError::LeadNotFound(_))
            | Self::Dispatch(DispatchError::LeadNotFound(_)) => StatusCode::NOT_FOUND,
            Self::Dispatch(DispatchError::Provider(_)) => StatusCode::BAD_GATEWAY,
            Self::Storage(_) | Self::Dispatch(_) | Self::LockPoisoned => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdapterDispatchWorkerCounters {
    pub pass_count: u64,
    pub dispatched_count: u64,
    pub skipped_count: u64,
    pub failed_count: u64,
    pub pass_error_count: u64,
    pub last_pass_at_ns: Option<u64>,
    pub last_error: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdapterStoreHealth {
    pub journaled: bool,
    pub lead_count: u32,
    pub opted_in_count: u32,
    pub pending_dispatch_count: u32,
    pub scheduled_count: u32,
    pub in_flight_count: u32,
    pub due_schedule_count: u32,
    pub consumed_schedule_count: u32,
}

impl AdapterStoreHealth {
    fn from_counters(journaled: bool, c: LeadStoreCounters) -> Self {
        Self {
            journaled,
            lead_count: c.lead_count,
            opted_in_count: c.opted_in_count,
            pending_dispatch_count: c.pending_dispatch_count,
            scheduled_count: c.scheduled_count,
            in_flight_count: c.in_flight_count,
            due_schedule_count: c.due_schedule_count,
            consumed_schedule_count: c.consumed_schedule_count,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdapterHealthResponse {
    pub status: String,
    pub outcome: String,
    pub reason: Option<String>,
    pub store: AdapterStoreHealth,
    pub worker: AdapterDispatchWorkerCounters,
}

/// Shared state behind the HTTP surface: the lead store, the dispatcher and worker counters.
#[derive(Debug)]
pub struct AdapterRuntime<E = VapiCallRuntime>
where
    E: CallPlacementEngine,
{
    store: Arc<Mutex<LeadStore>>,
    wiring: CallDispatchWiring<E>,
    worker_counters: Mutex<AdapterDispatchWorkerCounters>,
    config: AdapterConfig,
}

impl AdapterRuntime<VapiCallRuntime> {
    pub fn default_from_env() -> Result<Self, String> {
        let config = AdapterConfig::from_env_var_map(|key| env::var(key).ok());
        let journal_path = env::var("LEADLINE_STORE_PATH")
            .ok()
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
            .map(PathBuf::from)
            .unwrap_or_else(default_adapter_store_path);
        let store = LeadStore::open_with_journal(journal_path)
            .map_err(|err| format!("failed to open lead store: {err}"))?;
        let call_targets = call_target_table_from_env_pairs(env::vars())
            .map_err(|err| format!("invalid call target configuration: {err}"))?;
        let vapi = VapiCallRuntime::new(VapiCallConfig::from_env_var_map(|key| env::var(key).ok()))
            .with_vault(SecretVault::default_local());
        Ok(Self::new(
            store,
            CallDispatchWiring::new(call_targets, vapi),
            config,
        ))
    }
}

impl<E> AdapterRuntime<E>
where
    E: CallPlacementEngine,
{
    pub fn new(store: LeadStore, wiring: CallDispatchWiring<E>, config: AdapterConfig) -> Self {
        Self {
            store: Arc::new(Mutex::new(store)),
            wiring,
            worker_counters: Mutex::new(AdapterDispatchWorkerCounters::default()),
            config,
        }
    }

    pub fn config(&self) -> AdapterConfig {
        self.config
    }

    pub fn store(&self) -> &Arc<Mutex<LeadStore>> {
        &self.store
    }

    pub fn wiring(&self) -> &CallDispatchWiring<E> {
        &self.wiring
    }

    pub fn submit_lead(
        &self,
        request: SubmitLeadRequest,
        now_ns: Option<u64>,
    ) -> Result<SubmitLeadResponse, AdapterError> {
        let now = MonotonicTimeNs(now_ns.unwrap_or_else(system_time_now_ns).max(1));
        let input = LeadInput::from_request(request)?;
        let contact_hash = contact_hash_hex(input.phone_number.as_str());
        let record = {
            let mut store = self.store.lock().map_err(|_| AdapterError::LockPoisoned)?;
            store.insert_lead_row(input, now, self.config.dispatch_delay_ms)?
        };
        info!(
            lead_id = %record.lead_id,
            contact_hash = %contact_hash,
            opt_in_call = record.opt_in_call,
            "lead stored"
        );
        let message = if record.opt_in_call {
            format!(
                "Lead submitted! You will receive a call in {} seconds.",
                self.config.dispatch_delay_ms / 1_000
            )
        } else {
            "Lead submitted successfully!".to_string()
        };
        Ok(SubmitLeadResponse::accepted(record.lead_id, message))
    }

    pub fn trigger_call(&self, lead_id: LeadId) -> Result<TriggerCallResponse, AdapterError> {
        match self.wiring.dispatch(&self.store, lead_id)? {
            DispatchOutcome::Triggered { call_id } => Ok(TriggerCallResponse::triggered(call_id)),
            DispatchOutcome::Skipped(reason) => Ok(TriggerCallResponse::skipped(reason)),
        }
    }

    pub fn run_dispatch_worker_pass(
        &self,
        now_ns: Option<u64>,
    ) -> Result<DispatchWorkerPassMetrics, AdapterError> {
        let now_ns = now_ns.unwrap_or_else(system_time_now_ns).max(1);
        let result = run_dispatch_worker_pass(
            &self.store,
            &self.wiring,
            MonotonicTimeNs(now_ns),
            self.config.worker_max_items,
        );
        let mut counters = self
            .worker_counters
            .lock()
            .map_err(|_| AdapterError::LockPoisoned)?;
        counters.pass_count = counters.pass_count.saturating_add(1);
        counters.last_pass_at_ns = Some(now_ns);
        match result {
            Ok(metrics) => {
                counters.dispatched_count = counters
                    .dispatched_count
                    .saturating_add(u64::from(metrics.dispatched_count));
                counters.skipped_count = counters
                    .skipped_count
                    .saturating_add(u64::from(metrics.skipped_count));
                counters.failed_count = counters
                    .failed_count
                    .saturating_add(u64::from(metrics.failed_count));
                Ok(metrics)
            }
            Err(err) => {
                counters.pass_error_count = counters.pass_error_count.saturating_add(1);
                counters.last_error = Some(err.to_string());
                Err(err.into())
            }
        }
    }

    pub fn health_report(&self, now_ns: Option<u64>) -> Result<AdapterHealthResponse, String> {
        let now = MonotonicTimeNs(now_ns.unwrap_or_else(system_time_now_ns).max(1));
        let store = self
            .store
            .lock()
            .map_err(|_| "adapter store lock poisoned".to_string())?;
        let store_health = AdapterStoreHealth::from_counters(
            store.is_journaled(),
            store.lead_store_counters(now),
        );
        drop(store);
        let worker = self
            .worker_counters
            .lock()
            .map_err(|_| "adapter worker counters lock poisoned".to_string())?
            .clone();
        Ok(AdapterHealthResponse {
            status: "ok".to_string(),
            outcome: "HEALTHY".to_string(),
            reason: None,
            store: store_health,
            worker,
        })
    }
}

pub fn create_router<E>(runtime: Arc<AdapterRuntime<E>>) -> Router
where
    E: CallPlacementEngine + Send + Sync + 'static,
{
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([
            header::AUTHORIZATION,
            header::CONTENT_TYPE,
            HeaderName::from_static("x-client-info"),
            HeaderName::from_static("apikey"),
        ]);

    Router::new()
        .route("/healthz", get(healthz::<E>))
        .route(SUBMIT_LEAD_PATH, post(submit_lead::<E>))
        .route(TRIGGER_CALL_PATH, post(trigger_call::<E>))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(runtime)
}

async fn healthz<E>(
    State(runtime): State<Arc<AdapterRuntime<E>>>,
) -> (StatusCode, Json<AdapterHealthResponse>)
where
    E: CallPlacementEngine + Send + Sync + 'static,
{
    match runtime.health_report(None) {
        Ok(response) => (StatusCode::OK, Json(response)),
        Err(reason) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(AdapterHealthResponse {
                status: "error".to_string(),
                outcome: "UNHEALTHY".to_string(),
                reason: Some(reason),
                ..AdapterHealthResponse::default()
            }),
        ),
    }
}

async fn submit_lead<E>(
    State(runtime): State<Arc<AdapterRuntime<E>>>,
    body: Result<Json<SubmitLeadRequest>, JsonRejection>,
) -> (StatusCode, Json<SubmitLeadResponse>)
where
    E: CallPlacementEngine + Send + Sync + 'static,
{
    let Json(request) = match body {
        Ok(body) => body,
        Err(rejection) => {
            return (
                StatusCode::BAD_REQUEST,
                Json(SubmitLeadResponse::failed(rejection.body_text())),
            )
        }
    };
    let joined = tokio::task::spawn_blocking(move || runtime.submit_lead(request, None)).await;
    match joined {
        Ok(Ok(response)) => (StatusCode::OK, Json(response)),
        Ok(Err(err)) => {
            error!(error = %err, "submit-lead failed");
            (
                err.status_code(),
                Json(SubmitLeadResponse::failed(err.to_string())),
            )
        }
        Err(join_err) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(SubmitLeadResponse::failed(format!(
                "submit task failed: {join_err}"
            ))),
        ),
    }
}

async fn trigger_call<E>(
    State(runtime): State<Arc<AdapterRuntime<E>>>,
    body: Result<Json<TriggerCallRequest>, JsonRejection>,
) -> (StatusCode, Json<TriggerCallResponse>)
where
    E: CallPlacementEngine + Send + Sync + 'static,
{
    let Json(request) = match body {
        Ok(body) => body,
        Err(rejection) => {
            return (
                StatusCode::BAD_REQUEST,
                Json(TriggerCallResponse::failed(rejection.body_text())),
            )
        }
    };
    let lead_id = request.lead_id;
    let joined = tokio::task::spawn_blocking(move || runtime.trigger_call(lead_id)).await;
    match joined {
        Ok(Ok(response)) => (StatusCode::OK, Json(response)),
        Ok(Err(err)) => {
            error!(lead_id = %lead_id, error = %err, "trigger-call failed");
            (
                err.status_code(),
                Json(TriggerCallResponse::failed(err.to_string())),
            )
        }
        Err(join_err) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(TriggerCallResponse::failed(format!(
                "dispatch task failed: {join_err}"
            ))),
        ),
    }
}

fn system_time_now_ns() -> u64 {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos())
        .unwrap_or(1);
    u64::try_from(nanos).unwrap_or(u64::MAX)
}

fn default_adapter_store_path() -> PathBuf {
    if let Ok(home) = env::var("HOME") {
        let home = home.trim();
        if !home.is_empty() {
            return PathBuf::from(home).join(".leadline/adapter/leads.jsonl");
        }
    }
    PathBuf::from(".leadline/adapter/leads.jsonl")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dispatch_delay_env_is_range_checked() {
        let cfg = AdapterConfig::from_env_var_map(|_| Some("5000".to_string()));
        assert_eq!(cfg.dispatch_delay_ms, 5_000);
        let cfg = AdapterConfig::from_env_var_map(|_| Some("3600001".to_string()));
        assert_eq!(cfg.dispatch_delay_ms, DISPATCH_DELAY_MS_DEFAULT);
        let cfg = AdapterConfig::from_env_var_map(|_| None);
        assert_eq!(cfg, AdapterConfig::mvp_v1());
    }

    #[test]
    fn error_status_codes_follow_error_class() {
        let not_found = AdapterError::Dispatch(DispatchError::LeadNotFound(LeadId(4)));
        assert_eq!(not_found.status_code(), StatusCode::NOT_FOUND);
        let invalid: AdapterError = StorageError::ContractViolation(
            ContractViolation::MissingRequired { field: "email" },
        )
        .into();
        assert_eq!(invalid.status_code(), StatusCode::BAD_REQUEST);
        let journal: AdapterError = StorageError::Journal("disk full".to_string()).into();
        assert_eq!(journal.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
