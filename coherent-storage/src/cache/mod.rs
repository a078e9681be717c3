//! Cache layer and the consistency strategies built on it.
//!
//! Every strategy talks to a [`CacheBackend`] and a [`crate::RecordStore`];
//! they differ in when the store sees a write:
//!
//! - [`ReadWriteThroughCache`]: before the cache is updated (synchronous)
//! - [`CacheAsideService`]: the application writes the store, then refreshes
//!   or evicts the cached entry
//! - [`WriteBackQueue`]: later, when the [`FlushJob`] drains the dirty set
//!
//! # Key Format
//!
//! Records are cached under `customer:<id>`. Cache-aside query results are
//! cached under the canonical [`coherent_core::CacheKey`] of their criteria.
//! The write-back dirty set lives at `customer:write_back`.

pub mod cache_aside;
pub mod codec;
pub mod flush;
pub mod memory_backend;
pub mod read_write_through;
pub mod traits;
pub mod write_back;

pub use cache_aside::{CacheAsideRangeResolver, CacheAsideService, Resolution, ResolutionSource};
pub use codec::record_key;
pub use flush::{flush_task, FlushJob, FlushMetrics, FlushMetricsSnapshot, FlushOutcome};
pub use memory_backend::InMemoryCacheBackend;
pub use read_write_through::{
    Loader, ReadWriteThroughCache, ReadWriteThroughService, StoreLoader, StoreWriter, Writer,
};
pub use traits::{scan_members, CacheBackend, CacheStats, ScanPage};
pub use write_back::{DrainReport, WriteBackQueue};
