//! Cache backend trait and statistics.
//!
//! This module defines the contract every cache backend must satisfy: a
//! string key/value space with optional TTL, plus named unordered sets that
//! can be walked with a cursor.

use async_trait::async_trait;
use coherent_core::{CoherentError, CoherentResult};
use futures_util::stream::{self, BoxStream, StreamExt};
use std::collections::VecDeque;
use std::time::Duration;

/// Cache backend trait for pluggable cache implementations.
///
/// This trait abstracts over different cache backends (e.g. Redis,
/// in-memory). Implementations should be thread-safe and support concurrent
/// access. Values are opaque strings; callers encode records with
/// [`super::codec`].
///
/// # Sets
///
/// Set members are compared by value. `set_scan` follows cursor semantics:
/// start with cursor `0` and keep calling with the returned cursor until it
/// comes back as `0`. A member present for the whole walk is returned at
/// least once; members added or removed during the walk may or may not be.
#[async_trait]
pub trait CacheBackend: Send + Sync {
    /// Get a value, or `None` when absent or expired.
    async fn get(&self, key: &str) -> CoherentResult<Option<String>>;

    /// Store a value, replacing any previous one. `None` means no expiry.
    async fn set(&self, key: &str, value: String, ttl: Option<Duration>) -> CoherentResult<()>;

    /// Remove a key. Returns whether it was present.
    async fn delete(&self, key: &str) -> CoherentResult<bool>;

    /// Add a member to a set. Returns whether it was newly added.
    async fn set_add(&self, set: &str, member: String) -> CoherentResult<bool>;

    /// Remove a member from a set. Returns whether it was present.
    async fn set_remove(&self, set: &str, member: &str) -> CoherentResult<bool>;

    /// Number of members in a set.
    async fn set_len(&self, set: &str) -> CoherentResult<usize>;

    /// One cursor step over a set, returning up to roughly `count` members.
    async fn set_scan(&self, set: &str, cursor: u64, count: usize) -> CoherentResult<ScanPage>;

    /// Get cache statistics.
    async fn stats(&self) -> CoherentResult<CacheStats>;
}

/// One step of a cursor walk over a set.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScanPage {
    /// Cursor for the next step; `0` when the walk is complete.
    pub cursor: u64,
    pub members: Vec<String>,
}

/// Statistics about cache usage.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CacheStats {
    /// Number of cache hits.
    pub hits: u64,
    /// Number of cache misses.
    pub misses: u64,
    /// Number of keyed entries currently in cache.
    pub entry_count: u64,
    /// Number of members across all sets.
    pub set_members: u64,
    /// Number of entries dropped because their TTL elapsed.
    pub expirations: u64,
}

impl CacheStats {
    /// Calculate the hit rate (0.0 to 1.0).
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

enum Cursor {
    Start,
    At(u64),
    Done,
}

/// Walk every member of a set as a stream, fetching `batch` at a time.
///
/// The stream ends after the backend reports cursor `0`. A backend error is
/// yielded once and ends the stream.
pub fn scan_members<'a, C>(
    backend: &'a C,
    set: &'a str,
    batch: usize,
) -> BoxStream<'a, CoherentResult<String>>
where
    C: CacheBackend + ?Sized,
{
    let batch = batch.max(1);
    stream::try_unfold(
        (Cursor::Start, VecDeque::new()),
        move |(mut cursor, mut buffered)| async move {
            loop {
                if let Some(member) = buffered.pop_front() {
                    return Ok::<_, CoherentError>(Some((member, (cursor, buffered))));
                }
                let position = match cursor {
                    Cursor::Done => return Ok(None),
                    Cursor::Start => 0,
                    Cursor::At(position) => position,
                };
                let page = backend.set_scan(set, position, batch).await?;
                buffered.extend(page.members);
                cursor = if page.cursor == 0 {
                    Cursor::Done
                } else {
                    Cursor::At(page.cursor)
                };
            }
        },
    )
    .boxed()
}
