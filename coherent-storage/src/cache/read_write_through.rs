//! Read/write-through keyed cache.
//!
//! The cache owns the store interaction: a miss asks the [`Loader`] and
//! populates the cache, a put asks the [`Writer`] to persist before the
//! cache is updated, and a delete removes from the store before evicting.
//! Callers never talk to the store for keyed operations.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use coherent_core::constants::KEY_ENUMERATION_PAGE_SIZE;
use coherent_core::{
    CoherentError, CoherentResult, Customer, CustomerId, CustomerPatch, FilterCriteria, Page,
    PageRequest,
};
use futures_util::stream::BoxStream;
use futures_util::TryStreamExt;

use super::codec::{decode, encode, record_key};
use super::traits::CacheBackend;
use crate::service::CustomerService;
use crate::store::{all_ids, RecordStore};

/// Fills the cache from the store on a miss.
#[async_trait]
pub trait Loader: Send + Sync {
    /// Load one record; `None` when the store has no such identity.
    async fn load(&self, id: &CustomerId) -> CoherentResult<Option<Customer>>;

    /// Every identity in the store, for warm-up and full scans.
    fn load_all_keys(&self) -> BoxStream<'_, CoherentResult<CustomerId>>;
}

/// Persists cache writes and deletes to the store.
#[async_trait]
pub trait Writer: Send + Sync {
    /// Persist every entry; stops at the first failure.
    async fn write(&self, entries: &[(CustomerId, Customer)]) -> CoherentResult<()>;

    /// Remove a record. Fails with `NotFound` when the store has no such identity.
    async fn delete(&self, id: &CustomerId) -> CoherentResult<()>;
}

/// [`Loader`] backed by a [`RecordStore`].
pub struct StoreLoader<S: ?Sized> {
    store: Arc<S>,
    page_size: usize,
}

impl<S: RecordStore + ?Sized> StoreLoader<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self {
            store,
            page_size: KEY_ENUMERATION_PAGE_SIZE,
        }
    }

    /// Set the page size used to enumerate identities.
    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.max(1);
        self
    }
}

#[async_trait]
impl<S: RecordStore + ?Sized> Loader for StoreLoader<S> {
    async fn load(&self, id: &CustomerId) -> CoherentResult<Option<Customer>> {
        tracing::debug!(customer_id = %id, "Loading customer from the store");
        self.store.get_by_id(id).await
    }

    fn load_all_keys(&self) -> BoxStream<'_, CoherentResult<CustomerId>> {
        all_ids(self.store.as_ref(), self.page_size)
    }
}

/// [`Writer`] backed by a [`RecordStore`].
pub struct StoreWriter<S: ?Sized> {
    store: Arc<S>,
}

impl<S: RecordStore + ?Sized> StoreWriter<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl<S: RecordStore + ?Sized> Writer for StoreWriter<S> {
    async fn write(&self, entries: &[(CustomerId, Customer)]) -> CoherentResult<()> {
        for (id, customer) in entries {
            let mut customer = customer.clone();
            customer.id = Some(id.clone());
            self.store.save(customer).await?;
            tracing::info!(customer_id = %id, "Customer saved in the store from the cache");
        }
        Ok(())
    }

    async fn delete(&self, id: &CustomerId) -> CoherentResult<()> {
        if self.store.get_by_id(id).await?.is_none() {
            return Err(CoherentError::not_found(id.clone()));
        }
        self.store.delete_by_id(id).await?;
        tracing::info!(customer_id = %id, "Customer deleted from the store by the cache");
        Ok(())
    }
}

/// Keyed cache whose reads and writes pass through to the store.
///
/// # Type Parameters
///
/// - `C`: The cache backend holding the `customer:<id>` entries
/// - `L`: The loader consulted on a miss
/// - `W`: The writer that persists puts and deletes
pub struct ReadWriteThroughCache<C: ?Sized, L: ?Sized, W: ?Sized> {
    backend: Arc<C>,
    loader: Arc<L>,
    writer: Arc<W>,
    ttl: Duration,
}

impl<C, L, W> ReadWriteThroughCache<C, L, W>
where
    C: CacheBackend + ?Sized,
    L: Loader + ?Sized,
    W: Writer + ?Sized,
{
    pub fn new(backend: Arc<C>, loader: Arc<L>, writer: Arc<W>, ttl: Duration) -> Self {
        Self {
            backend,
            loader,
            writer,
            ttl,
        }
    }

    /// Get a record, loading it through on a miss.
    pub async fn get(&self, id: &CustomerId) -> CoherentResult<Customer> {
        let key = record_key(id);
        if let Some(raw) = self.backend.get(&key).await? {
            tracing::debug!(customer_id = %id, "Customer served from the cache");
            return decode(&raw);
        }

        let customer = self
            .loader
            .load(id)
            .await?
            .ok_or_else(|| CoherentError::not_found(id.clone()))?;
        self.backend
            .set(&key, encode(&customer)?, Some(self.ttl))
            .await?;
        Ok(customer)
    }

    /// Persist a record through the writer, then cache it.
    ///
    /// If the cache update fails after the store accepted the write, the
    /// key is evicted so the next read loads the persisted value.
    pub async fn put(&self, id: &CustomerId, mut customer: Customer) -> CoherentResult<Customer> {
        customer.id = Some(id.clone());
        self.writer
            .write(&[(id.clone(), customer.clone())])
            .await?;

        let key = record_key(id);
        let cached = match encode(&customer) {
            Ok(raw) => self.backend.set(&key, raw, Some(self.ttl)).await,
            Err(e) => Err(e),
        };
        if let Err(e) = cached {
            tracing::warn!(customer_id = %id, error = %e, "Cache update failed after store write; evicting");
            if let Err(evict) = self.backend.delete(&key).await {
                tracing::warn!(customer_id = %id, error = %evict, "Eviction failed; cached entry may be stale");
            }
            return Err(e);
        }
        Ok(customer)
    }

    /// Delete records from the store and then from the cache, one key at a time.
    pub async fn delete(&self, ids: &[CustomerId]) -> CoherentResult<()> {
        for id in ids {
            self.writer.delete(id).await?;
            self.backend.delete(&record_key(id)).await?;
        }
        Ok(())
    }

    /// Every identity the loader knows about.
    pub fn load_all_keys(&self) -> BoxStream<'_, CoherentResult<CustomerId>> {
        self.loader.load_all_keys()
    }

    /// Load every record into the cache. Returns how many were cached.
    pub async fn warm_up(&self) -> CoherentResult<usize> {
        let ids: Vec<CustomerId> = self.load_all_keys().try_collect().await?;
        let mut cached = 0;
        for id in &ids {
            match self.get(id).await {
                Ok(_) => cached += 1,
                Err(e) if e.is_not_found() => {}
                Err(e) => return Err(e),
            }
        }
        tracing::info!(cached, "Cache warm-up complete");
        Ok(cached)
    }
}

/// Customer service backed by a [`ReadWriteThroughCache`].
///
/// Keyed operations go through the cache; criteria queries and listings
/// are answered by the store directly.
pub struct ReadWriteThroughService<S: ?Sized, C: ?Sized> {
    store: Arc<S>,
    cache: ReadWriteThroughCache<C, StoreLoader<S>, StoreWriter<S>>,
}

impl<S, C> ReadWriteThroughService<S, C>
where
    S: RecordStore + ?Sized,
    C: CacheBackend + ?Sized,
{
    pub fn new(store: Arc<S>, backend: Arc<C>, ttl: Duration) -> Self {
        let loader = Arc::new(StoreLoader::new(Arc::clone(&store)));
        let writer = Arc::new(StoreWriter::new(Arc::clone(&store)));
        Self {
            store,
            cache: ReadWriteThroughCache::new(backend, loader, writer, ttl),
        }
    }

    pub fn cache(&self) -> &ReadWriteThroughCache<C, StoreLoader<S>, StoreWriter<S>> {
        &self.cache
    }
}

#[async_trait]
impl<S, C> CustomerService for ReadWriteThroughService<S, C>
where
    S: RecordStore + ?Sized,
    C: CacheBackend + ?Sized,
{
    async fn save(&self, mut customer: Customer) -> CoherentResult<Customer> {
        let id = customer.ensure_id();
        self.cache.put(&id, customer).await
    }

    async fn get_by_id(&self, id: &CustomerId) -> CoherentResult<Customer> {
        self.cache.get(id).await
    }

    async fn query(&self, criteria: &FilterCriteria) -> CoherentResult<Vec<Customer>> {
        self.store.query(criteria).await
    }

    async fn update_by_id(
        &self,
        id: &CustomerId,
        patch: &CustomerPatch,
    ) -> CoherentResult<Customer> {
        let current = self.cache.get(id).await?;
        self.cache.put(id, current.patched(patch)).await
    }

    async fn delete_by_id(&self, id: &CustomerId) -> CoherentResult<()> {
        self.cache.delete(std::slice::from_ref(id)).await
    }

    async fn list_page(&self, request: &PageRequest) -> CoherentResult<Page<Customer>> {
        self.store.find_all_paged(request).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::InMemoryCacheBackend;
    use crate::InMemoryRecordStore;

    fn setup() -> (
        Arc<InMemoryRecordStore>,
        Arc<InMemoryCacheBackend>,
        ReadWriteThroughService<InMemoryRecordStore, InMemoryCacheBackend>,
    ) {
        let store = Arc::new(InMemoryRecordStore::new());
        let backend = Arc::new(InMemoryCacheBackend::new());
        let service = ReadWriteThroughService::new(
            Arc::clone(&store),
            Arc::clone(&backend),
            Duration::from_secs(300),
        );
        (store, backend, service)
    }

    #[tokio::test]
    async fn test_put_persists_before_returning() {
        let (store, backend, service) = setup();
        let saved = service
            .save(Customer::new("Ada", "Lovelace", 36))
            .await
            .unwrap();
        let id = saved.id.clone().unwrap();

        assert_eq!(store.snapshot(&id), Some(saved));
        assert!(backend.contains_key(&record_key(&id)));
    }

    #[tokio::test]
    async fn test_get_miss_loads_and_caches() {
        let (store, _backend, service) = setup();
        let seeded = store
            .save(Customer::new("Ada", "Lovelace", 36))
            .await
            .unwrap();
        let id = seeded.id.clone().unwrap();

        assert_eq!(service.get_by_id(&id).await.unwrap(), seeded);
        assert_eq!(service.get_by_id(&id).await.unwrap(), seeded);
        assert_eq!(store.reads(), 1);
    }

    #[tokio::test]
    async fn test_get_absent_everywhere_is_not_found() {
        let (_store, _backend, service) = setup();
        let err = service
            .get_by_id(&CustomerId::new("ghost"))
            .await
            .unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_failed_store_write_leaves_cache_untouched() {
        let (store, backend, service) = setup();
        store.fail_writes_after(0);

        let customer = Customer::new("Ada", "Lovelace", 36).with_id("c-1");
        let err = service.save(customer).await.unwrap_err();

        assert!(err.is_store_unavailable());
        assert!(!backend.contains_key("customer:c-1"));
    }

    #[tokio::test]
    async fn test_failed_cache_update_is_reported() {
        let (store, backend, service) = setup();
        backend.set_unavailable(true);

        let customer = Customer::new("Ada", "Lovelace", 36).with_id("c-1");
        let err = service.save(customer).await.unwrap_err();

        assert!(err.is_cache_unavailable());
        assert!(store.snapshot(&CustomerId::new("c-1")).is_some());
    }

    #[tokio::test]
    async fn test_update_merges_patch() {
        let (store, _backend, service) = setup();
        let saved = service
            .save(Customer::new("Ada", "Lovelace", 36))
            .await
            .unwrap();
        let id = saved.id.clone().unwrap();

        let patch = CustomerPatch {
            age: Some(37),
            ..Default::default()
        };
        let updated = service.update_by_id(&id, &patch).await.unwrap();

        assert_eq!(updated.age, 37);
        assert_eq!(updated.first_name, "Ada");
        assert_eq!(store.snapshot(&id).unwrap().age, 37);
    }

    #[tokio::test]
    async fn test_delete_removes_store_then_cache() {
        let (store, backend, service) = setup();
        let saved = service
            .save(Customer::new("Ada", "Lovelace", 36))
            .await
            .unwrap();
        let id = saved.id.clone().unwrap();

        service.delete_by_id(&id).await.unwrap();
        assert!(store.snapshot(&id).is_none());
        assert!(!backend.contains_key(&record_key(&id)));

        let err = service.delete_by_id(&id).await.unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_multi_key_delete_keeps_earlier_deletions() {
        let (store, backend, service) = setup();
        let mut ids = Vec::new();
        for age in [20, 30] {
            let saved = service
                .save(Customer::new("Multi", "Delete", age))
                .await
                .unwrap();
            ids.push(saved.id.unwrap());
        }
        let (a, b) = (ids[0].clone(), ids[1].clone());

        let err = service
            .cache()
            .delete(&[a.clone(), CustomerId::new("ghost"), b.clone()])
            .await
            .unwrap_err();
        assert!(err.is_not_found());

        assert!(store.snapshot(&a).is_none());
        assert!(!backend.contains_key(&record_key(&a)));
        assert!(store.snapshot(&b).is_some());
        assert!(backend.contains_key(&record_key(&b)));
    }

    #[tokio::test]
    async fn test_load_all_keys_is_restartable() {
        let store = Arc::new(InMemoryRecordStore::new());
        for age in [20, 30, 40, 50, 60] {
            store
                .save(Customer::new("Key", "Walk", age))
                .await
                .unwrap();
        }
        let cache = ReadWriteThroughCache::new(
            Arc::new(InMemoryCacheBackend::new()),
            Arc::new(StoreLoader::new(Arc::clone(&store)).with_page_size(2)),
            Arc::new(StoreWriter::new(Arc::clone(&store))),
            Duration::from_secs(300),
        );

        let first: Vec<CustomerId> = cache.load_all_keys().try_collect().await.unwrap();
        let second: Vec<CustomerId> = cache.load_all_keys().try_collect().await.unwrap();
        assert_eq!(first.len(), 5);
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn test_failed_eviction_still_reports_cache_error() {
        let (store, backend, service) = setup();
        let saved = service
            .save(Customer::new("Ada", "Lovelace", 36))
            .await
            .unwrap();
        let id = saved.id.clone().unwrap();

        backend.set_unavailable(true);
        let err = service
            .save(saved.clone().with_email("new@example.com"))
            .await
            .unwrap_err();
        assert!(err.is_cache_unavailable());
        backend.set_unavailable(false);

        assert_eq!(
            store.snapshot(&id).unwrap().email_id.as_deref(),
            Some("new@example.com")
        );
    }

    #[tokio::test]
    async fn test_warm_up_caches_every_record() {
        let (store, backend, service) = setup();
        for age in [20, 30, 40] {
            store
                .save(Customer::new("Warm", "Up", age))
                .await
                .unwrap();
        }

        assert_eq!(service.cache().warm_up().await.unwrap(), 3);
        assert_eq!(backend.stats().await.unwrap().entry_count, 3);
    }
}
