//! Strategy-independent customer service interface.
//!
//! The three consistency strategies implement one capability interface and
//! are picked at deployment time from [`StrategyKind`].

use std::sync::Arc;

use async_trait::async_trait;
use coherent_core::{
    CoherentConfig, CoherentResult, Customer, CustomerId, CustomerPatch, FilterCriteria, Page,
    PageRequest, StrategyKind,
};

use crate::cache::{CacheAsideService, CacheBackend, ReadWriteThroughService, WriteBackQueue};
use crate::store::RecordStore;

/// CRUD surface exposed to request handlers.
///
/// Empty query results are an empty `Vec`, never an error. Keyed reads,
/// updates and (except under write-back) deletes of an unknown id fail with
/// `NotFound`.
#[async_trait]
pub trait CustomerService: Send + Sync {
    /// Persist a new or existing customer, assigning an id when absent.
    async fn save(&self, customer: Customer) -> CoherentResult<Customer>;

    async fn get_by_id(&self, id: &CustomerId) -> CoherentResult<Customer>;

    /// Customers matching every populated field of the criteria.
    async fn query(&self, criteria: &FilterCriteria) -> CoherentResult<Vec<Customer>>;

    /// Merge a partial update onto the current value.
    async fn update_by_id(&self, id: &CustomerId, patch: &CustomerPatch)
        -> CoherentResult<Customer>;

    async fn delete_by_id(&self, id: &CustomerId) -> CoherentResult<()>;

    /// One page of the full listing, read from the store.
    async fn list_page(&self, request: &PageRequest) -> CoherentResult<Page<Customer>>;
}

/// The strategy wired for a deployment.
pub enum Deployment {
    ReadWriteThrough(Arc<ReadWriteThroughService<dyn RecordStore, dyn CacheBackend>>),
    CacheAside(Arc<CacheAsideService<dyn RecordStore, dyn CacheBackend>>),
    WriteBack(Arc<WriteBackQueue<dyn RecordStore, dyn CacheBackend>>),
}

impl Deployment {
    pub fn kind(&self) -> StrategyKind {
        match self {
            Self::ReadWriteThrough(_) => StrategyKind::ReadWriteThrough,
            Self::CacheAside(_) => StrategyKind::CacheAside,
            Self::WriteBack(_) => StrategyKind::WriteBack,
        }
    }

    /// The strategy as a capability object.
    pub fn service(&self) -> Arc<dyn CustomerService> {
        match self {
            Self::ReadWriteThrough(service) => Arc::clone(service) as Arc<dyn CustomerService>,
            Self::CacheAside(service) => Arc::clone(service) as Arc<dyn CustomerService>,
            Self::WriteBack(queue) => Arc::clone(queue) as Arc<dyn CustomerService>,
        }
    }

    /// The write-back queue, when that strategy is deployed.
    pub fn write_back(&self) -> Option<Arc<WriteBackQueue<dyn RecordStore, dyn CacheBackend>>> {
        match self {
            Self::WriteBack(queue) => Some(Arc::clone(queue)),
            _ => None,
        }
    }
}

/// Build the strategy selected by `config.strategy` over the given collaborators.
pub fn build_service(
    config: &CoherentConfig,
    store: Arc<dyn RecordStore>,
    backend: Arc<dyn CacheBackend>,
) -> Deployment {
    tracing::info!(strategy = %config.strategy, "Building customer service");
    match config.strategy {
        StrategyKind::ReadWriteThrough => Deployment::ReadWriteThrough(Arc::new(
            ReadWriteThroughService::new(store, backend, config.entry_ttl),
        )),
        StrategyKind::CacheAside => Deployment::CacheAside(Arc::new(
            CacheAsideService::new(store, backend, config.entry_ttl)
                .with_widening_ceiling(config.widening_ceiling),
        )),
        StrategyKind::WriteBack => Deployment::WriteBack(Arc::new(
            WriteBackQueue::new(store, backend).with_store_timeout(config.operation_timeout),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::InMemoryCacheBackend;
    use crate::InMemoryRecordStore;

    fn collaborators() -> (Arc<dyn RecordStore>, Arc<dyn CacheBackend>) {
        (
            Arc::new(InMemoryRecordStore::new()),
            Arc::new(InMemoryCacheBackend::new()),
        )
    }

    #[test]
    fn test_build_service_honours_strategy() {
        for kind in [
            StrategyKind::ReadWriteThrough,
            StrategyKind::CacheAside,
            StrategyKind::WriteBack,
        ] {
            let (store, backend) = collaborators();
            let config = CoherentConfig::default().with_strategy(kind);
            let deployment = build_service(&config, store, backend);
            assert_eq!(deployment.kind(), kind);
            assert_eq!(
                deployment.write_back().is_some(),
                kind == StrategyKind::WriteBack
            );
        }
    }

    #[tokio::test]
    async fn test_every_strategy_round_trips_save_and_get() {
        for kind in [
            StrategyKind::ReadWriteThrough,
            StrategyKind::CacheAside,
            StrategyKind::WriteBack,
        ] {
            let (store, backend) = collaborators();
            let config = CoherentConfig::default().with_strategy(kind);
            let service = build_service(&config, store, backend).service();

            let saved = service
                .save(Customer::new("Ada", "Lovelace", 36))
                .await
                .unwrap();
            let id = saved.id.clone().unwrap();
            assert_eq!(service.get_by_id(&id).await.unwrap(), saved, "{}", kind);
        }
    }
}
