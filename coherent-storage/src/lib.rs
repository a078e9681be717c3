//! Coherent Storage - Store and Cache Contracts, Consistency Strategies
//!
//! Defines the durable store and cache backend abstractions plus the three
//! strategies that keep them consistent:
//!
//! - [`ReadWriteThroughCache`]: synchronous loader/writer pair behind a keyed cache
//! - [`CacheAsideRangeResolver`]: criteria-keyed query cache with range widening
//! - [`WriteBackQueue`] + [`FlushJob`]: cache-first writes drained by a periodic flush

pub mod cache;
pub mod service;
pub mod store;

pub use cache::{
    flush_task, record_key, scan_members, CacheAsideRangeResolver, CacheAsideService,
    CacheBackend, CacheStats, DrainReport, FlushJob, FlushMetrics, FlushMetricsSnapshot,
    FlushOutcome, InMemoryCacheBackend, Loader, ReadWriteThroughCache, ReadWriteThroughService,
    Resolution, ResolutionSource, ScanPage, StoreLoader, StoreWriter, WriteBackQueue, Writer,
};
pub use service::{build_service, CustomerService, Deployment};
pub use store::{all_ids, RecordStore};

use async_trait::async_trait;
use coherent_core::{
    CoherentError, CoherentResult, Customer, CustomerId, Page, PageRequest, SortDirection,
    StorageError,
};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, RwLock};

// ============================================================================
// IN-MEMORY STORE
// ============================================================================

/// In-memory record store for tests and the local binary.
///
/// Records are kept ordered by identity. Counters expose how often the store
/// was hit so tests can tell cache hits from store round trips, and two
/// failure switches simulate an unreachable store.
#[derive(Debug, Clone, Default)]
pub struct InMemoryRecordStore {
    records: Arc<RwLock<BTreeMap<CustomerId, Customer>>>,
    reads: Arc<AtomicU64>,
    queries: Arc<AtomicU64>,
    writes: Arc<AtomicU64>,
    unavailable: Arc<AtomicBool>,
    write_limit_armed: Arc<AtomicBool>,
    /// Writes still allowed while the limit is armed.
    write_budget: Arc<AtomicU64>,
}

impl InMemoryRecordStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store pre-populated with records. Records without an
    /// identity are assigned one.
    pub fn with_records(records: impl IntoIterator<Item = Customer>) -> Self {
        let store = Self::new();
        if let Ok(mut map) = store.records.write() {
            for mut customer in records {
                let id = customer.ensure_id();
                map.insert(id, customer);
            }
        }
        store
    }

    /// Number of keyed reads served.
    pub fn reads(&self) -> u64 {
        self.reads.load(Ordering::Relaxed)
    }

    /// Number of filtered lookups and listings served.
    pub fn queries(&self) -> u64 {
        self.queries.load(Ordering::Relaxed)
    }

    /// Number of successful saves and deletes.
    pub fn writes(&self) -> u64 {
        self.writes.load(Ordering::Relaxed)
    }

    /// Number of records currently stored.
    pub fn len(&self) -> usize {
        self.records.read().map(|map| map.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Peek at a record without touching the counters.
    pub fn snapshot(&self, id: &CustomerId) -> Option<Customer> {
        self.records.read().ok().and_then(|map| map.get(id).cloned())
    }

    /// Make every call fail with `StoreUnavailable` while set.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Allow `n` more writes to succeed, then fail every write after.
    pub fn fail_writes_after(&self, n: u64) {
        self.write_budget.store(n, Ordering::SeqCst);
        self.write_limit_armed.store(true, Ordering::SeqCst);
    }

    /// Let writes succeed again.
    pub fn clear_write_failures(&self) {
        self.write_limit_armed.store(false, Ordering::SeqCst);
    }

    fn check_available(&self) -> CoherentResult<()> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(CoherentError::store_unavailable("store is unreachable"));
        }
        Ok(())
    }

    fn check_writable(&self) -> CoherentResult<()> {
        self.check_available()?;
        if !self.write_limit_armed.load(Ordering::SeqCst) {
            return Ok(());
        }
        self.write_budget
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .map(|_| ())
            .map_err(|_| CoherentError::store_unavailable("store rejected the write"))
    }

    fn select<F>(&self, predicate: F) -> CoherentResult<Vec<Customer>>
    where
        F: Fn(&Customer) -> bool,
    {
        self.check_available()?;
        self.queries.fetch_add(1, Ordering::Relaxed);
        let map = self
            .records
            .read()
            .map_err(|_| StorageError::LockPoisoned)?;
        Ok(map.values().filter(|c| predicate(c)).cloned().collect())
    }
}

#[async_trait]
impl RecordStore for InMemoryRecordStore {
    async fn get_by_id(&self, id: &CustomerId) -> CoherentResult<Option<Customer>> {
        self.check_available()?;
        self.reads.fetch_add(1, Ordering::Relaxed);
        let map = self
            .records
            .read()
            .map_err(|_| StorageError::LockPoisoned)?;
        Ok(map.get(id).cloned())
    }

    async fn save(&self, mut customer: Customer) -> CoherentResult<Customer> {
        self.check_writable()?;
        let id = customer.ensure_id();
        let mut map = self
            .records
            .write()
            .map_err(|_| StorageError::LockPoisoned)?;
        map.insert(id, customer.clone());
        self.writes.fetch_add(1, Ordering::Relaxed);
        Ok(customer)
    }

    async fn delete_by_id(&self, id: &CustomerId) -> CoherentResult<()> {
        self.check_writable()?;
        let mut map = self
            .records
            .write()
            .map_err(|_| StorageError::LockPoisoned)?;
        if map.remove(id).is_none() {
            return Err(CoherentError::not_found(id.clone()));
        }
        self.writes.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    async fn find_by_age(&self, age: u32) -> CoherentResult<Vec<Customer>> {
        self.select(|c| c.age == age)
    }

    async fn find_by_age_between(&self, min: u32, max: u32) -> CoherentResult<Vec<Customer>> {
        self.select(|c| c.age >= min && c.age <= max)
    }

    async fn find_by_age_greater_than(&self, min: u32) -> CoherentResult<Vec<Customer>> {
        self.select(|c| c.age > min)
    }

    async fn find_by_age_less_than(&self, max: u32) -> CoherentResult<Vec<Customer>> {
        self.select(|c| c.age < max)
    }

    async fn find_by_email(&self, email: &str) -> CoherentResult<Vec<Customer>> {
        self.select(|c| c.email_id.as_deref() == Some(email))
    }

    async fn find_by_gender(&self, gender: &str) -> CoherentResult<Vec<Customer>> {
        self.select(|c| c.gender.as_deref() == Some(gender))
    }

    async fn find_all_paged(&self, request: &PageRequest) -> CoherentResult<Page<Customer>> {
        request.validate()?;
        let mut all = self.select(|_| true)?;
        all.sort_by(|a, b| {
            let ordering = request.sort_by.compare(a, b);
            match request.direction {
                SortDirection::Asc => ordering,
                SortDirection::Desc => ordering.reverse(),
            }
        });
        Ok(Page::from_sorted(all, request))
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use coherent_core::{FilterCriteria, SortField};
    use futures_util::TryStreamExt;

    fn customer(first: &str, age: u32) -> Customer {
        Customer::new(first, "Tester", age).with_email(format!("{}@example.com", first))
    }

    fn seeded() -> InMemoryRecordStore {
        InMemoryRecordStore::with_records(vec![
            customer("ada", 20).with_gender("F"),
            customer("bob", 30).with_gender("M"),
            customer("cy", 40).with_gender("M"),
        ])
    }

    #[tokio::test]
    async fn test_save_assigns_id_and_upserts() {
        let store = InMemoryRecordStore::new();
        let saved = store.save(customer("ada", 20)).await.unwrap();
        let id = saved.id.clone().unwrap();

        let updated = store.save(saved.with_email("new@example.com")).await.unwrap();
        assert_eq!(updated.id.as_ref(), Some(&id));
        assert_eq!(store.len(), 1);
        assert_eq!(
            store.snapshot(&id).unwrap().email_id.as_deref(),
            Some("new@example.com")
        );
        assert_eq!(store.writes(), 2);
    }

    #[tokio::test]
    async fn test_delete_missing_is_not_found() {
        let store = InMemoryRecordStore::new();
        let err = store
            .delete_by_id(&CustomerId::new("ghost"))
            .await
            .unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_range_bounds() {
        let store = seeded();
        assert_eq!(store.find_by_age_between(20, 30).await.unwrap().len(), 2);
        assert_eq!(store.find_by_age_greater_than(30).await.unwrap().len(), 1);
        assert_eq!(store.find_by_age_less_than(30).await.unwrap().len(), 1);
        assert_eq!(store.find_by_age(40).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_query_narrows_by_every_field() {
        let store = seeded();
        let criteria = FilterCriteria::new().with_min_age(20).with_gender("M");
        let rows = store.query(&criteria).await.unwrap();
        let names: Vec<_> = rows.iter().map(|c| c.first_name.as_str()).collect();
        assert_eq!(names, vec!["bob", "cy"]);
        assert!(rows.iter().all(|c| criteria.matches(c)));
    }

    #[tokio::test]
    async fn test_query_rejects_empty_criteria() {
        let store = seeded();
        let err = store.query(&FilterCriteria::new()).await.unwrap_err();
        assert!(err.is_invalid_criteria());
        assert_eq!(store.queries(), 0);
    }

    #[tokio::test]
    async fn test_paged_listing_sorted_desc() {
        let store = seeded();
        let request = PageRequest::new(0, 2).sorted(SortField::Age, SortDirection::Desc);
        let page = store.find_all_paged(&request).await.unwrap();
        let ages: Vec<u32> = page.content.iter().map(|c| c.age).collect();
        assert_eq!(ages, vec![40, 30]);
        assert_eq!(page.count, 3);
        assert_eq!(page.total_pages, 2);
        assert!(!page.last);
    }

    #[tokio::test]
    async fn test_all_ids_walks_every_page() {
        let store = seeded();
        let ids: Vec<CustomerId> = all_ids(&store, 2).try_collect().await.unwrap();
        assert_eq!(ids.len(), 3);
    }

    #[tokio::test]
    async fn test_unavailable_store_fails_every_call() {
        let store = seeded();
        store.set_unavailable(true);
        assert!(store
            .find_by_age(20)
            .await
            .unwrap_err()
            .is_store_unavailable());
        assert!(store
            .save(customer("dee", 50))
            .await
            .unwrap_err()
            .is_store_unavailable());

        store.set_unavailable(false);
        assert!(store.find_by_age(20).await.is_ok());
    }

    #[tokio::test]
    async fn test_fail_writes_after() {
        let store = InMemoryRecordStore::new();
        store.fail_writes_after(1);
        assert!(store.save(customer("ada", 20)).await.is_ok());
        assert!(store.save(customer("bob", 30)).await.is_err());
        store.clear_write_failures();
        assert!(store.save(customer("bob", 30)).await.is_ok());
    }
}

#[cfg(test)]
mod prop_tests {
    use super::*;
    use coherent_core::FilterCriteria;
    use proptest::prelude::*;

    fn arb_customer() -> impl Strategy<Value = Customer> {
        (
            "[a-z]{1,8}",
            0u32..=100,
            prop::option::of(prop::sample::select(vec!["F", "M", "X"])),
        )
            .prop_map(|(name, age, gender)| {
                let customer = Customer::new(name, "Prop", age);
                match gender {
                    Some(g) => customer.with_gender(g),
                    None => customer,
                }
            })
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(64))]

        /// Store query results always satisfy the whole criteria.
        #[test]
        fn prop_query_results_match_criteria(
            customers in prop::collection::vec(arb_customer(), 0..20),
            min in 0u32..=100,
            span in 0u32..=50,
        ) {
            let rt = tokio::runtime::Builder::new_current_thread().build().unwrap();
            let store = InMemoryRecordStore::with_records(customers.clone());
            let criteria = FilterCriteria::new().with_bounds(Some(min), Some(min + span));

            let rows = rt.block_on(store.query(&criteria)).unwrap();
            let expected = customers
                .iter()
                .filter(|c| c.age >= min && c.age <= min + span)
                .count();

            prop_assert!(rows.iter().all(|c| criteria.matches(c)));
            prop_assert_eq!(rows.len(), expected);
        }
    }
}
