//! REST API server demo
//!
//! Runs a job manager with the control API enabled.
//!
//! After starting, you can:
//! - View Swagger UI at http://localhost:8420/swagger-ui
//! - Submit an archive via POST http://localhost:8420/jobs
//! - Follow jobs via GET http://localhost:8420/jobs
//! - Stream events via GET http://localhost:8420/events
//!
//! Pass a JSON config file as the first argument to override the defaults.
//! Log verbosity follows `RUST_LOG` (default `info`).

use backup_ingest::api::start_api_server;
use backup_ingest::{Config, JobManager, run_with_shutdown};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = match std::env::args().nth(1) {
        Some(path) => Config::from_file(&path)?,
        None => Config::default(),
    };
    let bind_address = config.api.bind_address;

    let manager = Arc::new(JobManager::new(config.clone()).await?);
    let resumed = manager.startup().await?;
    tracing::info!(resumed = resumed.len(), "job manager ready");

    let api = tokio::spawn(start_api_server(manager.clone(), Arc::new(config)));

    println!("Swagger UI: http://{bind_address}/swagger-ui");
    println!();
    println!("Example commands:");
    println!("  curl -X POST http://{bind_address}/jobs \\");
    println!("    -H 'Content-Type: application/json' \\");
    println!("    -d '{{\"url\": \"https://example.com/export.zip\"}}'");
    println!("  curl http://{bind_address}/jobs");
    println!("  curl 'http://{bind_address}/jobs/<id>/search?q=holiday'");
    println!("  curl -N http://{bind_address}/events");

    run_with_shutdown(&manager).await?;
    api.abort();
    Ok(())
}
