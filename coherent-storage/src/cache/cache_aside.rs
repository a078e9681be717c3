//! Cache-aside query cache with range widening.
//!
//! Query results are cached under the canonical key of the criteria that
//! produced them. A miss on a range query first looks for a cached superset
//! by relaxing the requested bounds one step at a time; only when no probe
//! yields a non-empty match does the store get queried.
//!
//! The cache is advisory here: if the backend is unreachable the resolver
//! answers from the store and logs a warning instead of failing.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use coherent_core::constants::DEFAULT_WIDENING_CEILING;
use coherent_core::{
    CacheKey, CoherentError, CoherentResult, Customer, CustomerId, CustomerPatch, FilterCriteria,
    Page, PageRequest, RangeRequest,
};

use super::codec::{decode, encode, record_key};
use super::traits::CacheBackend;
use crate::service::CustomerService;
use crate::store::RecordStore;

/// Where a query result came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResolutionSource {
    /// An entry cached under the exact key of the criteria.
    Cache,
    /// A superset entry found by relaxing the bounds.
    Widened { probe: CacheKey },
    /// A store query.
    Store,
}

/// Records answering a query plus their provenance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolution {
    pub records: Vec<Customer>,
    pub source: ResolutionSource,
}

impl Resolution {
    /// Whether any record matched. An empty result is a valid answer, not an error.
    pub fn is_found(&self) -> bool {
        !self.records.is_empty()
    }
}

enum Lookup {
    Hit(Vec<Customer>),
    Miss,
    Unavailable,
}

enum Widening {
    Found(Resolution),
    Exhausted,
    Unavailable,
}

type Bounds = (Option<u32>, Option<u32>);

/// Relaxed bound pairs to probe for a range request, closest first.
///
/// Min bounds step down to 0 and max bounds step up to `ceiling`. A min
/// bound above the ceiling starts relaxing from the ceiling, and a max
/// bound already above the ceiling is never relaxed, so each bound takes at
/// most `ceiling + 1` relaxed values. Bounded requests walk the nested
/// pairs (outer min, inner max) and then fall back to the open-ended
/// min-only and max-only supersets.
fn relaxed_bounds(range: RangeRequest, ceiling: u32) -> Box<dyn Iterator<Item = Bounds> + Send> {
    let lower = move |min: u32| (0..=min.min(ceiling)).rev();
    let upper = move |max: u32| max..=ceiling;

    match range {
        RangeRequest::MinOnly(min) => Box::new(lower(min).map(|lo| (Some(lo), None))),
        RangeRequest::MaxOnly(max) => Box::new(upper(max).map(|hi| (None, Some(hi)))),
        RangeRequest::Bounded { min, max } => {
            let nested = lower(min)
                .flat_map(move |lo| upper(max).map(move |hi| (Some(lo), Some(hi))));
            let min_only = lower(min).map(|lo| (Some(lo), None));
            let max_only = upper(max).map(|hi| (None, Some(hi)));
            Box::new(nested.chain(min_only).chain(max_only))
        }
    }
}

/// Criteria-keyed query cache backed by a record store.
pub struct CacheAsideRangeResolver<S: ?Sized, C: ?Sized> {
    store: Arc<S>,
    backend: Arc<C>,
    ttl: Duration,
    widening_ceiling: u32,
}

impl<S, C> CacheAsideRangeResolver<S, C>
where
    S: RecordStore + ?Sized,
    C: CacheBackend + ?Sized,
{
    pub fn new(store: Arc<S>, backend: Arc<C>, ttl: Duration) -> Self {
        Self {
            store,
            backend,
            ttl,
            widening_ceiling: DEFAULT_WIDENING_CEILING,
        }
    }

    /// Set the upper bound max-bound relaxation may reach.
    pub fn with_widening_ceiling(mut self, ceiling: u32) -> Self {
        self.widening_ceiling = ceiling;
        self
    }

    /// Records matching the criteria; empty when nothing matches.
    pub async fn get(&self, criteria: &FilterCriteria) -> CoherentResult<Vec<Customer>> {
        Ok(self.resolve(criteria).await?.records)
    }

    /// Answer a query from the cache, a widened cache entry, or the store.
    pub async fn resolve(&self, criteria: &FilterCriteria) -> CoherentResult<Resolution> {
        criteria.validate()?;
        let key = criteria.cache_key();

        let mut cache_up = true;
        match self.lookup(&key).await {
            Lookup::Hit(records) => {
                tracing::info!(cache_key = %key, count = records.len(), "Fetching data from the cache");
                return Ok(Resolution {
                    records: criteria.filter(&records),
                    source: ResolutionSource::Cache,
                });
            }
            Lookup::Miss => {}
            Lookup::Unavailable => cache_up = false,
        }

        if cache_up {
            if let Some(range) = criteria.range_request() {
                match self.widen(criteria, &key, range).await {
                    Widening::Found(resolution) => return Ok(resolution),
                    Widening::Exhausted => {}
                    Widening::Unavailable => cache_up = false,
                }
            }
        }

        tracing::info!(cache_key = %key, "Fetching data from the store");
        let records = self.store.query(criteria).await?;
        if cache_up && !records.is_empty() {
            self.populate(&key, &records).await;
        }

        Ok(Resolution {
            records,
            source: ResolutionSource::Store,
        })
    }

    async fn widen(
        &self,
        criteria: &FilterCriteria,
        key: &CacheKey,
        range: RangeRequest,
    ) -> Widening {
        for (min, max) in relaxed_bounds(range, self.widening_ceiling) {
            let probe = criteria.with_bounds(min, max).cache_key();
            if &probe == key {
                continue;
            }

            let cached = match self.lookup(&probe).await {
                Lookup::Hit(cached) => cached,
                Lookup::Miss => continue,
                Lookup::Unavailable => return Widening::Unavailable,
            };

            let records = criteria.filter(&cached);
            if records.is_empty() {
                continue;
            }

            tracing::info!(
                cache_key = %key,
                probe = %probe,
                count = records.len(),
                "Fetching data from the cache via a widened range"
            );
            self.populate(key, &records).await;
            return Widening::Found(Resolution {
                records,
                source: ResolutionSource::Widened { probe },
            });
        }
        Widening::Exhausted
    }

    async fn lookup(&self, key: &CacheKey) -> Lookup {
        match self.backend.get(key.as_str()).await {
            Ok(Some(raw)) => match decode::<Vec<Customer>>(&raw) {
                Ok(records) => Lookup::Hit(records),
                Err(e) => {
                    tracing::warn!(cache_key = %key, error = %e, "Ignoring undecodable cache entry");
                    Lookup::Miss
                }
            },
            Ok(None) => Lookup::Miss,
            Err(e) => {
                tracing::warn!(cache_key = %key, error = %e, "Cache unavailable, answering from the store");
                Lookup::Unavailable
            }
        }
    }

    async fn populate(&self, key: &CacheKey, records: &[Customer]) {
        let stored = match encode(&records) {
            Ok(raw) => self.backend.set(key.as_str(), raw, Some(self.ttl)).await,
            Err(e) => Err(e),
        };
        if let Err(e) = stored {
            tracing::warn!(cache_key = %key, error = %e, "Failed to cache query result");
        }
    }
}

/// Cache-aside customer service.
///
/// Keyed reads cache `customer:<id>` on a miss, updates refresh that entry
/// after the store write, deletes evict it after the store delete, and
/// criteria queries go through the [`CacheAsideRangeResolver`].
pub struct CacheAsideService<S: ?Sized, C: ?Sized> {
    store: Arc<S>,
    backend: Arc<C>,
    resolver: CacheAsideRangeResolver<S, C>,
    ttl: Duration,
}

impl<S, C> CacheAsideService<S, C>
where
    S: RecordStore + ?Sized,
    C: CacheBackend + ?Sized,
{
    pub fn new(store: Arc<S>, backend: Arc<C>, ttl: Duration) -> Self {
        let resolver = CacheAsideRangeResolver::new(Arc::clone(&store), Arc::clone(&backend), ttl);
        Self {
            store,
            backend,
            resolver,
            ttl,
        }
    }

    pub fn with_widening_ceiling(mut self, ceiling: u32) -> Self {
        self.resolver = self.resolver.with_widening_ceiling(ceiling);
        self
    }

    pub fn resolver(&self) -> &CacheAsideRangeResolver<S, C> {
        &self.resolver
    }

    async fn cache_record(&self, customer: &Customer) {
        let Some(id) = customer.id.as_ref() else {
            return;
        };
        let stored = match encode(customer) {
            Ok(raw) => self.backend.set(&record_key(id), raw, Some(self.ttl)).await,
            Err(e) => Err(e),
        };
        if let Err(e) = stored {
            tracing::warn!(customer_id = %id, error = %e, "Failed to cache customer");
        }
    }

    async fn evict_record(&self, id: &CustomerId) {
        if let Err(e) = self.backend.delete(&record_key(id)).await {
            tracing::warn!(customer_id = %id, error = %e, "Failed to evict customer from the cache");
        }
    }
}

#[async_trait]
impl<S, C> CustomerService for CacheAsideService<S, C>
where
    S: RecordStore + ?Sized,
    C: CacheBackend + ?Sized,
{
    async fn save(&self, customer: Customer) -> CoherentResult<Customer> {
        self.store.save(customer).await
    }

    async fn get_by_id(&self, id: &CustomerId) -> CoherentResult<Customer> {
        match self.backend.get(&record_key(id)).await {
            Ok(Some(raw)) => match decode::<Customer>(&raw) {
                Ok(customer) => {
                    tracing::info!(customer_id = %id, "Fetching customer from the cache");
                    return Ok(customer);
                }
                Err(e) => {
                    tracing::warn!(customer_id = %id, error = %e, "Ignoring undecodable cache entry")
                }
            },
            Ok(None) => {}
            Err(e) => {
                tracing::warn!(customer_id = %id, error = %e, "Cache unavailable, reading from the store")
            }
        }

        let customer = self
            .store
            .get_by_id(id)
            .await?
            .ok_or_else(|| CoherentError::not_found(id.clone()))?;
        self.cache_record(&customer).await;
        Ok(customer)
    }

    async fn query(&self, criteria: &FilterCriteria) -> CoherentResult<Vec<Customer>> {
        self.resolver.get(criteria).await
    }

    async fn update_by_id(
        &self,
        id: &CustomerId,
        patch: &CustomerPatch,
    ) -> CoherentResult<Customer> {
        let current = self
            .store
            .get_by_id(id)
            .await?
            .ok_or_else(|| CoherentError::not_found(id.clone()))?;
        let updated = self.store.save(current.patched(patch)).await?;
        self.cache_record(&updated).await;
        Ok(updated)
    }

    async fn delete_by_id(&self, id: &CustomerId) -> CoherentResult<()> {
        if self.store.get_by_id(id).await?.is_none() {
            return Err(CoherentError::not_found(id.clone()));
        }
        self.store.delete_by_id(id).await?;
        self.evict_record(id).await;
        Ok(())
    }

    async fn list_page(&self, request: &PageRequest) -> CoherentResult<Page<Customer>> {
        self.store.find_all_paged(request).await
    }
}
