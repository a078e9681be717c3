//! Write-back queue.
//!
//! Writes land in the keyed cache and in a dirty set; the store is only
//! written when the flush job drains that set. Reads are served from the
//! cache, falling back to the store on a miss.
//!
//! # Dirty set members
//!
//! A member is the encoded snapshot of a record at the time it was written.
//! Members are removed by exact value: an update removes the snapshot it
//! replaces and adds the new one, and a flush removes only the snapshot it
//! persisted. A record updated while a flush is persisting its older
//! snapshot therefore stays dirty and is picked up by the next tick.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use coherent_core::constants::WRITE_BACK_SET_KEY;
use coherent_core::{
    CoherentError, CoherentResult, Customer, CustomerId, CustomerPatch, FilterCriteria, Page,
    PageRequest,
};
use futures_util::stream::BoxStream;
use futures_util::StreamExt;

use super::codec::{decode, encode, record_key};
use super::traits::{scan_members, CacheBackend};
use crate::service::CustomerService;
use crate::store::RecordStore;

/// Result of draining the dirty set once.
#[derive(Debug, Clone, Default)]
pub struct DrainReport {
    /// Dirty members present when the drain started.
    pub pending: usize,
    /// Members persisted and removed from the dirty set.
    pub persisted: usize,
    /// Undecodable members discarded.
    pub discarded: usize,
    /// The error that stopped the drain, if any.
    pub error: Option<CoherentError>,
}

/// Cache-first customer service with deferred persistence.
pub struct WriteBackQueue<S: ?Sized, C: ?Sized> {
    store: Arc<S>,
    backend: Arc<C>,
    dirty_set: String,
    store_timeout: Option<Duration>,
}

impl<S, C> WriteBackQueue<S, C>
where
    S: RecordStore + ?Sized,
    C: CacheBackend + ?Sized,
{
    pub fn new(store: Arc<S>, backend: Arc<C>) -> Self {
        Self {
            store,
            backend,
            dirty_set: WRITE_BACK_SET_KEY.to_string(),
            store_timeout: None,
        }
    }

    /// Bound each store write made while draining.
    pub fn with_store_timeout(mut self, timeout: Duration) -> Self {
        self.store_timeout = Some(timeout);
        self
    }

    /// Name of the dirty set.
    pub fn dirty_set(&self) -> &str {
        &self.dirty_set
    }

    /// Number of records awaiting persistence.
    pub async fn pending(&self) -> CoherentResult<usize> {
        self.backend.set_len(&self.dirty_set).await
    }

    /// Walk the dirty set in batches of `batch` members.
    pub fn dirty_members(&self, batch: usize) -> BoxStream<'_, CoherentResult<String>> {
        scan_members(self.backend.as_ref(), &self.dirty_set, batch)
    }

    /// Drop the cached snapshot of `id` from the dirty set, returning it.
    ///
    /// Runs before staging a replacement so at most one snapshot per record
    /// is dirty.
    async fn unstage(&self, id: &CustomerId) -> CoherentResult<Option<String>> {
        let previous = self.backend.get(&record_key(id)).await?;
        if let Some(raw) = &previous {
            self.backend.set_remove(&self.dirty_set, raw).await?;
        }
        Ok(previous)
    }

    /// Cache a record and mark it dirty.
    async fn stage(&self, id: &CustomerId, customer: &Customer) -> CoherentResult<()> {
        let raw = encode(customer)?;
        self.backend.set(&record_key(id), raw.clone(), None).await?;
        self.backend.set_add(&self.dirty_set, raw).await?;
        Ok(())
    }

    /// Persist every dirty member once.
    ///
    /// Members are persisted one at a time. A member is removed from the
    /// dirty set only after its store write succeeded. The first store or
    /// cache error stops the drain; whatever was not persisted stays dirty.
    pub async fn drain(&self, batch: usize) -> DrainReport {
        let pending = match self.pending().await {
            Ok(0) => {
                tracing::info!("No customers to write back");
                return DrainReport::default();
            }
            Ok(pending) => pending,
            Err(e) => {
                return DrainReport {
                    error: Some(e),
                    ..Default::default()
                };
            }
        };
        tracing::info!(pending, "Writing back dirty customers");

        let mut report = DrainReport {
            pending,
            ..Default::default()
        };

        let mut members = self.dirty_members(batch);
        while let Some(member) = members.next().await {
            let outcome = match member {
                Ok(member) => self.persist_member(&member).await,
                Err(e) => Err(e),
            };
            match outcome {
                Ok(true) => report.persisted += 1,
                Ok(false) => report.discarded += 1,
                Err(e) => {
                    report.error = Some(e);
                    break;
                }
            }
        }
        report
    }

    /// Persist one member and clear it. Returns `false` when the member
    /// could not be decoded and was dropped instead.
    async fn persist_member(&self, member: &str) -> CoherentResult<bool> {
        let customer: Customer = match decode(member) {
            Ok(customer) => customer,
            Err(e) => {
                tracing::warn!(error = %e, "Discarding undecodable dirty-set member");
                self.backend.set_remove(&self.dirty_set, member).await?;
                return Ok(false);
            }
        };

        let id = customer.id.clone();
        let save = self.store.save(customer);
        match self.store_timeout {
            Some(limit) => tokio::time::timeout(limit, save)
                .await
                .map_err(|_| CoherentError::store_unavailable("store write timed out"))??,
            None => save.await?,
        };
        self.backend.set_remove(&self.dirty_set, member).await?;

        if let Some(id) = id {
            tracing::info!(customer_id = %id, "Customer written back to the store");
        }
        Ok(true)
    }
}

#[async_trait]
impl<S, C> CustomerService for WriteBackQueue<S, C>
where
    S: RecordStore + ?Sized,
    C: CacheBackend + ?Sized,
{
    async fn save(&self, mut customer: Customer) -> CoherentResult<Customer> {
        let id = customer.ensure_id();
        self.unstage(&id).await?;
        self.stage(&id, &customer).await?;
        tracing::info!(customer_id = %id, "Customer saved in the cache");
        Ok(customer)
    }

    async fn get_by_id(&self, id: &CustomerId) -> CoherentResult<Customer> {
        if let Some(raw) = self.backend.get(&record_key(id)).await? {
            tracing::info!(customer_id = %id, "Fetching customer from the cache");
            return decode(&raw);
        }

        let customer = self
            .store
            .get_by_id(id)
            .await?
            .ok_or_else(|| CoherentError::not_found(id.clone()))?;
        self.stage(id, &customer).await?;
        tracing::info!(customer_id = %id, "Customer loaded from the store into the cache");
        Ok(customer)
    }

    async fn query(&self, criteria: &FilterCriteria) -> CoherentResult<Vec<Customer>> {
        self.store.query(criteria).await
    }

    async fn update_by_id(
        &self,
        id: &CustomerId,
        patch: &CustomerPatch,
    ) -> CoherentResult<Customer> {
        let current = match self.unstage(id).await? {
            Some(raw) => decode::<Customer>(&raw)?,
            None => self
                .store
                .get_by_id(id)
                .await?
                .ok_or_else(|| CoherentError::not_found(id.clone()))?,
        };

        let mut updated = current.patched(patch);
        updated.id = Some(id.clone());
        self.stage(id, &updated).await?;
        tracing::info!(customer_id = %id, "Customer updated in the cache");
        Ok(updated)
    }

    async fn delete_by_id(&self, id: &CustomerId) -> CoherentResult<()> {
        let key = record_key(id);
        match self.backend.get(&key).await? {
            Some(raw) => {
                self.backend.set_remove(&self.dirty_set, &raw).await?;
                self.backend.delete(&key).await?;
                tracing::info!(customer_id = %id, "Customer removed from the cache");
            }
            None => tracing::info!(customer_id = %id, "Customer not present in the cache"),
        }

        if self.store.get_by_id(id).await?.is_some() {
            self.store.delete_by_id(id).await?;
            tracing::info!(customer_id = %id, "Customer deleted from the store");
        } else {
            tracing::info!(customer_id = %id, "Customer not present in the store");
        }
        Ok(())
    }

    async fn list_page(&self, request: &PageRequest) -> CoherentResult<Page<Customer>> {
        self.store.find_all_paged(request).await
    }
}
