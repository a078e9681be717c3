//! Durable record store contract.
//!
//! The store is the system of record. Every consistency strategy reads
//! through it on a cache miss and writes to it either synchronously
//! (read/write-through, cache-aside) or from the flush job (write-back).

use async_trait::async_trait;
use coherent_core::{
    CoherentError, CoherentResult, Customer, CustomerId, FilterCriteria, Page, PageRequest, QueryBranch,
};
use futures_util::stream::{self, BoxStream, StreamExt};

/// Async record store for customer records.
///
/// Implementations should be thread-safe. Range lookups follow the store's
/// own bound semantics: `between` is inclusive on both ends while
/// `greater_than` and `less_than` are strict.
#[async_trait]
pub trait RecordStore: Send + Sync {
    // ========================================================================
    // KEYED OPERATIONS
    // ========================================================================

    /// Get a customer by identity.
    async fn get_by_id(&self, id: &CustomerId) -> CoherentResult<Option<Customer>>;

    /// Upsert a customer, assigning an identity when it has none.
    async fn save(&self, customer: Customer) -> CoherentResult<Customer>;

    /// Delete a customer. Fails with `NotFound` when absent.
    async fn delete_by_id(&self, id: &CustomerId) -> CoherentResult<()>;

    // ========================================================================
    // FILTERED LOOKUPS
    // ========================================================================

    async fn find_by_age(&self, age: u32) -> CoherentResult<Vec<Customer>>;

    async fn find_by_age_between(&self, min: u32, max: u32) -> CoherentResult<Vec<Customer>>;

    async fn find_by_age_greater_than(&self, min: u32) -> CoherentResult<Vec<Customer>>;

    async fn find_by_age_less_than(&self, max: u32) -> CoherentResult<Vec<Customer>>;

    async fn find_by_email(&self, email: &str) -> CoherentResult<Vec<Customer>>;

    async fn find_by_gender(&self, gender: &str) -> CoherentResult<Vec<Customer>>;

    /// One page of the full listing, sorted as requested.
    async fn find_all_paged(&self, request: &PageRequest) -> CoherentResult<Page<Customer>>;

    // ========================================================================
    // PROVIDED
    // ========================================================================

    /// Run the single lookup selected by a query branch.
    async fn find(&self, branch: &QueryBranch) -> CoherentResult<Vec<Customer>> {
        match branch {
            QueryBranch::Id(id) => Ok(self.get_by_id(id).await?.into_iter().collect()),
            QueryBranch::ExactAge(age) => self.find_by_age(*age).await,
            QueryBranch::AgeBetween { min, max } => self.find_by_age_between(*min, *max).await,
            QueryBranch::Email(email) => self.find_by_email(email).await,
            QueryBranch::AgeGreaterThan(min) => self.find_by_age_greater_than(*min).await,
            QueryBranch::AgeLessThan(max) => self.find_by_age_less_than(*max).await,
            QueryBranch::Gender(gender) => self.find_by_gender(gender).await,
        }
    }

    /// Answer filter criteria from the store.
    ///
    /// Exactly one lookup runs, chosen by branch precedence; its rows are
    /// then narrowed by every populated field of the criteria.
    async fn query(&self, criteria: &FilterCriteria) -> CoherentResult<Vec<Customer>> {
        criteria.validate()?;
        let Some(branch) = criteria.branch() else {
            return Ok(Vec::new());
        };
        tracing::debug!(branch = %branch, "Fetching data from the store");
        let rows = self.find(&branch).await?;
        Ok(criteria.filter(&rows))
    }
}

/// Stream every identity in the store, paging the listing by id.
///
/// The listing is re-read page by page, so records inserted or removed
/// while the stream is consumed may or may not be observed.
pub fn all_ids<S>(store: &S, page_size: usize) -> BoxStream<'_, CoherentResult<CustomerId>>
where
    S: RecordStore + ?Sized,
{
    stream::try_unfold(Some(0usize), move |page_no| async move {
        let Some(page_no) = page_no else {
            return Ok::<_, CoherentError>(None);
        };
        let page = store
            .find_all_paged(&PageRequest::new(page_no, page_size))
            .await?;
        let next = if page.last { None } else { Some(page_no + 1) };
        let ids: Vec<CoherentResult<CustomerId>> =
            page.content.into_iter().filter_map(|c| c.id).map(Ok).collect();
        Ok(Some((stream::iter(ids), next)))
    })
    .map(|page| match page {
        Ok(ids) => ids.left_stream(),
        Err(e) => stream::once(async move { Err(e) }).right_stream(),
    })
    .flatten()
    .boxed()
}
