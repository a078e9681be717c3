//! Coherent entry point
//!
//! Loads configuration from the environment, starts the configured strategy
//! over the in-memory collaborators and runs until Ctrl-C.

use std::sync::Arc;

use coherent_core::CoherentConfig;
use coherent_service::{init_tracing, CacheRuntime, ServiceError, ServiceResult, TelemetryConfig};
use coherent_storage::{CacheBackend, InMemoryCacheBackend, InMemoryRecordStore, RecordStore};

#[tokio::main]
async fn main() -> ServiceResult<()> {
    let telemetry_config = TelemetryConfig::from_env();
    init_tracing(&telemetry_config)?;

    let config = CoherentConfig::from_env()?;
    let store: Arc<dyn RecordStore> = Arc::new(InMemoryRecordStore::new());
    let backend: Arc<dyn CacheBackend> = Arc::new(InMemoryCacheBackend::new());

    let runtime = CacheRuntime::start(config, store, backend)?;
    tracing::info!(strategy = %runtime.strategy(), "Coherent running; press Ctrl-C to stop");

    tokio::signal::ctrl_c()
        .await
        .map_err(|e| ServiceError::task(format!("Failed to listen for shutdown signal: {}", e)))?;
    tracing::info!("Shutdown signal received");

    runtime.shutdown().await?;
    Ok(())
}
