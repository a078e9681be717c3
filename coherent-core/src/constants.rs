//! Constants for the consistency layer
//!
//! Defaults for every configurable value live here so they are easy to find
//! and share between the config loader and the components that use them.

// ============================================================================
// CACHE
// ============================================================================

/// Default TTL for cached entries in seconds (5 minutes)
pub const DEFAULT_CACHE_TTL_SECS: u64 = 300;

/// Default cache backend address
pub const DEFAULT_CACHE_ADDRESS: &str = "redis://localhost:6379";

/// Namespace prefix for per-record cache keys
pub const RECORD_KEY_PREFIX: &str = "customer:";

/// Name of the dirty set drained by the write-back flush
pub const WRITE_BACK_SET_KEY: &str = "customer:write_back";

// ============================================================================
// RANGE WIDENING
// ============================================================================

/// Upper bound of the numeric field when relaxing a max bound
pub const DEFAULT_WIDENING_CEILING: u32 = 100;

// ============================================================================
// WRITE-BACK FLUSH
// ============================================================================

/// Default interval between flush ticks in milliseconds
pub const DEFAULT_FLUSH_INTERVAL_MS: u64 = 5_000;

/// Default number of dirty-set members fetched per scan step
pub const DEFAULT_FLUSH_BATCH_SIZE: usize = 100;

// ============================================================================
// I/O
// ============================================================================

/// Default timeout for a single store or cache call in milliseconds
pub const DEFAULT_OPERATION_TIMEOUT_MS: u64 = 2_000;

/// Page size used when enumerating all store identities
pub const KEY_ENUMERATION_PAGE_SIZE: usize = 500;
