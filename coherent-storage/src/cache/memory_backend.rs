//! In-memory cache backend.
//!
//! Stands in for a remote cache server in tests and in the local binary.
//! Keyed entries carry an optional expiry; expired entries are dropped the
//! next time they are read. Sets remember insertion order so cursor walks
//! are stable while members are removed mid-walk.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::RwLock;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use coherent_core::{CoherentError, CoherentResult};

use super::traits::{CacheBackend, CacheStats, ScanPage};

#[derive(Debug, Clone)]
struct CachedValue {
    value: String,
    expires_at: Option<DateTime<Utc>>,
}

impl CachedValue {
    fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|at| at <= now)
    }
}

/// Set members indexed by insertion sequence. Sequences start at 1 so a
/// cursor of `0` always means "from the beginning".
#[derive(Debug, Default)]
struct MemberSet {
    next_seq: u64,
    by_seq: BTreeMap<u64, String>,
    seqs: HashMap<String, u64>,
}

impl MemberSet {
    fn insert(&mut self, member: String) -> bool {
        if self.seqs.contains_key(&member) {
            return false;
        }
        self.next_seq += 1;
        self.by_seq.insert(self.next_seq, member.clone());
        self.seqs.insert(member, self.next_seq);
        true
    }

    fn remove(&mut self, member: &str) -> bool {
        match self.seqs.remove(member) {
            Some(seq) => {
                self.by_seq.remove(&seq);
                true
            }
            None => false,
        }
    }

    fn scan(&self, cursor: u64, count: usize) -> ScanPage {
        let mut members = Vec::with_capacity(count.min(self.by_seq.len()));
        let mut last_seq = None;
        for (seq, member) in self.by_seq.range(cursor.max(1)..) {
            if members.len() == count {
                break;
            }
            members.push(member.clone());
            last_seq = Some(*seq);
        }

        let more = last_seq.is_some_and(|seq| self.by_seq.range(seq + 1..).next().is_some());
        let cursor = match (more, last_seq) {
            (true, Some(seq)) => seq + 1,
            _ => 0,
        };
        ScanPage { cursor, members }
    }
}

/// Thread-safe in-memory cache backend.
#[derive(Debug, Default)]
pub struct InMemoryCacheBackend {
    entries: RwLock<HashMap<String, CachedValue>>,
    sets: RwLock<HashMap<String, MemberSet>>,
    hits: AtomicU64,
    misses: AtomicU64,
    expirations: AtomicU64,
    unavailable: AtomicBool,
}

impl InMemoryCacheBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every call fail with `CacheUnavailable` while set.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Whether a live entry exists, without touching hit counters.
    pub fn contains_key(&self, key: &str) -> bool {
        let now = Utc::now();
        self.entries
            .read()
            .map(|entries| entries.get(key).is_some_and(|v| !v.is_expired(now)))
            .unwrap_or(false)
    }

    /// Current members of a set in insertion order.
    pub fn members(&self, set: &str) -> Vec<String> {
        self.sets
            .read()
            .ok()
            .and_then(|sets| sets.get(set).map(|s| s.by_seq.values().cloned().collect()))
            .unwrap_or_default()
    }

    fn check_available(&self) -> CoherentResult<()> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(CoherentError::cache_unavailable("cache backend is unreachable"));
        }
        Ok(())
    }
}

fn poisoned() -> CoherentError {
    CoherentError::cache_unavailable("cache lock poisoned")
}

fn expiry(ttl: Option<Duration>) -> Option<DateTime<Utc>> {
    ttl.map(|ttl| {
        let ttl = chrono::Duration::from_std(ttl).unwrap_or(chrono::Duration::MAX);
        Utc::now()
            .checked_add_signed(ttl)
            .unwrap_or(DateTime::<Utc>::MAX_UTC)
    })
}

#[async_trait]
impl CacheBackend for InMemoryCacheBackend {
    async fn get(&self, key: &str) -> CoherentResult<Option<String>> {
        self.check_available()?;
        let now = Utc::now();
        let found = {
            let entries = self.entries.read().map_err(|_| poisoned())?;
            entries.get(key).cloned()
        };

        match found {
            Some(entry) if entry.is_expired(now) => {
                let mut entries = self.entries.write().map_err(|_| poisoned())?;
                if entries.get(key).is_some_and(|v| v.is_expired(now)) {
                    entries.remove(key);
                    self.expirations.fetch_add(1, Ordering::Relaxed);
                }
                self.misses.fetch_add(1, Ordering::Relaxed);
                Ok(None)
            }
            Some(entry) => {
                self.hits.fetch_add(1, Ordering::Relaxed);
                Ok(Some(entry.value))
            }
            None => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                Ok(None)
            }
        }
    }

    async fn set(&self, key: &str, value: String, ttl: Option<Duration>) -> CoherentResult<()> {
        self.check_available()?;
        let mut entries = self.entries.write().map_err(|_| poisoned())?;
        entries.insert(
            key.to_string(),
            CachedValue {
                value,
                expires_at: expiry(ttl),
            },
        );
        Ok(())
    }

    async fn delete(&self, key: &str) -> CoherentResult<bool> {
        self.check_available()?;
        let mut entries = self.entries.write().map_err(|_| poisoned())?;
        Ok(entries.remove(key).is_some())
    }

    async fn set_add(&self, set: &str, member: String) -> CoherentResult<bool> {
        self.check_available()?;
        let mut sets = self.sets.write().map_err(|_| poisoned())?;
        Ok(sets.entry(set.to_string()).or_default().insert(member))
    }

    async fn set_remove(&self, set: &str, member: &str) -> CoherentResult<bool> {
        self.check_available()?;
        let mut sets = self.sets.write().map_err(|_| poisoned())?;
        let removed = sets.get_mut(set).is_some_and(|s| s.remove(member));
        if sets.get(set).is_some_and(|s| s.seqs.is_empty()) {
            sets.remove(set);
        }
        Ok(removed)
    }

    async fn set_len(&self, set: &str) -> CoherentResult<usize> {
        self.check_available()?;
        let sets = self.sets.read().map_err(|_| poisoned())?;
        Ok(sets.get(set).map_or(0, |s| s.seqs.len()))
    }

    async fn set_scan(&self, set: &str, cursor: u64, count: usize) -> CoherentResult<ScanPage> {
        self.check_available()?;
        let sets = self.sets.read().map_err(|_| poisoned())?;
        Ok(sets
            .get(set)
            .map(|s| s.scan(cursor, count.max(1)))
            .unwrap_or_default())
    }

    async fn stats(&self) -> CoherentResult<CacheStats> {
        self.check_available()?;
        let now = Utc::now();
        let entry_count = {
            let entries = self.entries.read().map_err(|_| poisoned())?;
            entries.values().filter(|v| !v.is_expired(now)).count() as u64
        };
        let set_members = {
            let sets = self.sets.read().map_err(|_| poisoned())?;
            sets.values().map(|s| s.seqs.len() as u64).sum()
        };

        Ok(CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            entry_count,
            set_members,
            expirations: self.expirations.load(Ordering::Relaxed),
        })
    }
}
