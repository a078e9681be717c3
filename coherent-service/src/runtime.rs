//! Cache Runtime
//!
//! Owns the deployed strategy for the life of the process. The service is
//! built exactly once from the configuration; under write-back the runtime
//! also owns the background flush task and drains the dirty set one last
//! time on shutdown.

use std::sync::Arc;

use coherent_core::{CoherentConfig, StrategyKind};
use coherent_storage::{
    build_service, flush_task, CacheBackend, CustomerService, Deployment, FlushJob,
    FlushMetricsSnapshot, FlushOutcome, RecordStore,
};
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::error::{ServiceError, ServiceResult};

type DynFlushJob = FlushJob<dyn RecordStore, dyn CacheBackend>;

/// Handle to the running flush task.
struct FlushWorker {
    job: Arc<DynFlushJob>,
    shutdown_tx: watch::Sender<bool>,
    handle: JoinHandle<Arc<coherent_storage::FlushMetrics>>,
}

/// The configured strategy plus any background work it needs.
pub struct CacheRuntime {
    config: CoherentConfig,
    deployment: Deployment,
    flush: Option<FlushWorker>,
}

impl CacheRuntime {
    /// Validate the configuration, build the service and start background work.
    ///
    /// Must be called from within a Tokio runtime when the strategy is
    /// write-back.
    pub fn start(
        config: CoherentConfig,
        store: Arc<dyn RecordStore>,
        backend: Arc<dyn CacheBackend>,
    ) -> ServiceResult<Self> {
        config.validate()?;
        tracing::info!(
            strategy = %config.strategy,
            cache_address = %config.cache_address,
            ttl_secs = config.entry_ttl.as_secs(),
            "Starting cache runtime"
        );

        let deployment = build_service(&config, store, backend);
        let flush = deployment.write_back().map(|queue| {
            let job = Arc::new(FlushJob::new(queue).with_batch_size(config.flush_batch_size));
            let (shutdown_tx, shutdown_rx) = watch::channel(false);
            let handle = tokio::spawn(flush_task(
                Arc::clone(&job),
                config.flush_interval,
                shutdown_rx,
            ));
            FlushWorker {
                job,
                shutdown_tx,
                handle,
            }
        });

        Ok(Self {
            config,
            deployment,
            flush,
        })
    }

    pub fn service(&self) -> Arc<dyn CustomerService> {
        self.deployment.service()
    }

    pub fn strategy(&self) -> StrategyKind {
        self.deployment.kind()
    }

    pub fn config(&self) -> &CoherentConfig {
        &self.config
    }

    /// Flush counters, when a flush task is running.
    pub fn flush_metrics(&self) -> Option<FlushMetricsSnapshot> {
        self.flush
            .as_ref()
            .map(|worker| worker.job.metrics().snapshot())
    }

    /// Run a flush tick now instead of waiting for the interval.
    pub async fn flush_now(&self) -> Option<FlushOutcome> {
        match &self.flush {
            Some(worker) => Some(worker.job.tick().await),
            None => None,
        }
    }

    /// Stop background work and persist whatever is still dirty.
    ///
    /// Returns the final flush counters under write-back.
    pub async fn shutdown(self) -> ServiceResult<Option<FlushMetricsSnapshot>> {
        let Some(worker) = self.flush else {
            tracing::info!(strategy = %self.config.strategy, "Cache runtime stopped");
            return Ok(None);
        };

        let _ = worker.shutdown_tx.send(true);
        worker
            .handle
            .await
            .map_err(|e| ServiceError::task(format!("Flush task join failed: {}", e)))?;

        match worker.job.tick().await {
            FlushOutcome::Partial { persisted, error } => {
                tracing::error!(
                    error = %error,
                    persisted,
                    "Final flush incomplete; dirty customers remain in the cache"
                );
            }
            outcome => tracing::info!(?outcome, "Final flush done"),
        }

        let snapshot = worker.job.metrics().snapshot();
        tracing::info!(
            ticks = snapshot.ticks,
            persisted = snapshot.persisted,
            errors = snapshot.errors,
            "Cache runtime stopped"
        );
        Ok(Some(snapshot))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use coherent_test_utils::fixtures::{config_for, empty_collaborators};
    use coherent_test_utils::Customer;
    use std::time::Duration;

    fn start(kind: StrategyKind) -> (Arc<coherent_test_utils::InMemoryRecordStore>, CacheRuntime) {
        let (store, backend) = empty_collaborators();
        let runtime = CacheRuntime::start(
            config_for(kind).with_flush_interval(Duration::from_secs(3600)),
            Arc::clone(&store) as Arc<dyn RecordStore>,
            backend as Arc<dyn CacheBackend>,
        )
        .unwrap();
        (store, runtime)
    }

    #[tokio::test]
    async fn test_invalid_config_is_rejected() {
        let (store, backend) = empty_collaborators();
        let config = CoherentConfig::default().with_flush_batch_size(0);
        let result = CacheRuntime::start(
            config,
            store as Arc<dyn RecordStore>,
            backend as Arc<dyn CacheBackend>,
        );
        assert!(matches!(result, Err(ServiceError::Core(_))));
    }

    #[tokio::test]
    async fn test_only_write_back_runs_a_flush_task() {
        for kind in [StrategyKind::ReadWriteThrough, StrategyKind::CacheAside] {
            let (_store, runtime) = start(kind);
            assert_eq!(runtime.strategy(), kind);
            assert!(runtime.flush_metrics().is_none());
            assert!(runtime.flush_now().await.is_none());
            assert_eq!(runtime.shutdown().await.unwrap(), None);
        }

        let (_store, runtime) = start(StrategyKind::WriteBack);
        assert!(runtime.flush_metrics().is_some());
        runtime.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_shutdown_persists_dirty_records() {
        let (store, runtime) = start(StrategyKind::WriteBack);
        let service = runtime.service();

        let saved = service
            .save(Customer::new("Last", "Minute", 41))
            .await
            .unwrap();
        let id = saved.id.clone().unwrap();

        let snapshot = runtime.shutdown().await.unwrap().unwrap();
        assert_eq!(store.snapshot(&id), Some(saved));
        assert!(snapshot.persisted >= 1);
        assert_eq!(snapshot.errors, 0);
    }

    #[tokio::test]
    async fn test_flush_now_drains_without_waiting() {
        let (store, runtime) = start(StrategyKind::WriteBack);
        runtime
            .service()
            .save(Customer::new("Eager", "Flush", 29))
            .await
            .unwrap();

        // the first interval tick fires immediately, so the record may
        // already be durable
        let outcome = runtime.flush_now().await.unwrap();
        assert!(matches!(
            outcome,
            FlushOutcome::Completed { persisted: 1 } | FlushOutcome::Idle | FlushOutcome::Skipped
        ));
        if !matches!(outcome, FlushOutcome::Skipped) {
            assert_eq!(store.len(), 1);
        }
        runtime.shutdown().await.unwrap();
        assert_eq!(store.len(), 1);
    }
}
