#![forbid(unsafe_code)]

use std::{env, net::SocketAddr, sync::Arc, time::Duration};

use leadline_adapter::{create_router, AdapterRuntime};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let bind = env::var("LEADLINE_HTTP_BIND").unwrap_or_else(|_| "127.0.0.1:8080".to_string());
    let addr: SocketAddr = bind.parse()?;
    let worker_enabled = parse_dispatch_worker_enabled_from_env();
    let worker_interval_ms = parse_dispatch_worker_interval_ms_from_env();

    let runtime = Arc::new(AdapterRuntime::default_from_env()?);
    if worker_enabled {
        let runtime_for_worker = runtime.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(Duration::from_millis(worker_interval_ms));
            loop {
                ticker.tick().await;
                let runtime = runtime_for_worker.clone();
                match tokio::task::spawn_blocking(move || runtime.run_dispatch_worker_pass(None))
                    .await
                {
                    Ok(Ok(_metrics)) => {}
                    Ok(Err(err)) => error!(error = %err, "dispatch worker pass failed"),
                    Err(err) => error!(error = %err, "dispatch worker task panicked"),
                }
            }
        });
    }
    let app = create_router(runtime);

    info!(
        %addr,
        worker_enabled,
        worker_interval_ms,
        "leadline_adapter_http listening"
    );
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}

fn parse_dispatch_worker_enabled_from_env() -> bool {
    match env::var("LEADLINE_DISPATCH_WORKER_ENABLED") {
        Ok(v) => !matches!(
            v.trim().to_ascii_lowercase().as_str(),
            "0" | "false" | "off" | "no"
        ),
        Err(_) => true,
    }
}

fn parse_dispatch_worker_interval_ms_from_env() -> u64 {
    env::var("LEADLINE_DISPATCH_WORKER_INTERVAL_MS")
        .ok()
        .and_then(|v| v.trim().parse::<u64>().ok())
        .filter(|v| (100..=60_000).contains(v))
        .unwrap_or(1_000)
}
