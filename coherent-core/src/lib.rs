//! Coherent Core - Record, Filter and Error Types
//!
//! Pure data structures shared by every strategy of the consistency layer.
//! This crate performs no I/O: the durable store and cache backend contracts
//! live in `coherent-storage`.

pub mod config;
pub mod constants;
pub mod entities;
pub mod error;
pub mod filter;
pub mod identity;
pub mod paging;

pub use config::{CoherentConfig, StrategyKind};
pub use entities::{Customer, CustomerPatch};
pub use error::{
    CacheError, CoherentError, CoherentResult, ConfigError, StorageError, ValidationError,
};
pub use filter::{CacheKey, FilterCriteria, QueryBranch, RangeRequest};
pub use identity::CustomerId;
pub use paging::{Page, PageRequest, SortDirection, SortField};
