//! In-memory summary cache keyed by thread and last-activity timestamp.
//!
//! Holds at most one live entry per thread: storing a summary for a new
//! timestamp drops whatever was cached for older activity. Entries expire
//! after a TTL, checked both on access and by a background sweeper.

use crate::config::CacheConfig;
use crate::summary::SummaryData;
use chrono::{DateTime, Utc};
use lazy_static::lazy_static;
use regex::Regex;
use serde::Serialize;
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

const KEY_PREFIX: &str = "summary_";

/// `tokio::time::interval` rejects a zero period
const MIN_CLEANUP_INTERVAL: Duration = Duration::from_millis(1);

/// Share of entries dropped when the cache is full
const EVICTION_FRACTION: f64 = 0.1;

lazy_static! {
    static ref KEY_PATTERN: Regex = Regex::new(r"(?s)^summary_(.+)_(\d+)$").unwrap();
    static ref DIGITS: Regex = Regex::new(r"^\d+$").unwrap();
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CacheError {
    #[error("invalid cache key: thread id must not be empty")]
    EmptyThreadId,
    #[error("invalid cache key: timestamp must be decimal digits, got {0:?}")]
    InvalidTimestamp(String),
}

/// A validated `summary_<threadId>_<lastPostTimestamp>` key
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey(String);

impl CacheKey {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Components recovered from a cache key
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedKey {
    pub thread_id: String,
    pub last_post_timestamp: String,
}

/// Build the cache key for a thread at a given activity timestamp
pub fn generate_cache_key(thread_id: &str, last_post_timestamp: &str) -> Result<CacheKey, CacheError> {
    if thread_id.trim().is_empty() {
        return Err(CacheError::EmptyThreadId);
    }
    if !DIGITS.is_match(last_post_timestamp) {
        return Err(CacheError::InvalidTimestamp(last_post_timestamp.to_string()));
    }
    Ok(CacheKey(format!(
        "{}{}_{}",
        KEY_PREFIX, thread_id, last_post_timestamp
    )))
}

/// Reverse of [`generate_cache_key`]; `None` for anything not of that shape
pub fn parse_cache_key(key: &str) -> Option<ParsedKey> {
    let caps = KEY_PATTERN.captures(key)?;
    let thread_id = caps.get(1)?.as_str();
    if thread_id.trim().is_empty() {
        return None;
    }
    Some(ParsedKey {
        thread_id: thread_id.to_string(),
        last_post_timestamp: caps.get(2)?.as_str().to_string(),
    })
}

/// Numeric comparison of two digit-only timestamps of any length
fn is_later_timestamp(a: &str, b: &str) -> bool {
    let a = a.trim_start_matches('0');
    let b = b.trim_start_matches('0');
    (a.len(), a) > (b.len(), b)
}

/// A cached summary with its bookkeeping
#[derive(Debug, Clone)]
pub struct CacheEntry {
    pub data: SummaryData,
    pub inserted_at: Instant,
    pub thread_id: String,
    pub last_post_timestamp: String,
    pub generated_at: DateTime<Utc>,
}

impl CacheEntry {
    fn is_expired(&self, ttl: Duration) -> bool {
        self.inserted_at.elapsed() > ttl
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub total_requests: u64,
    pub hit_rate: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheSize {
    pub entries: usize,
    pub max_entries: usize,
    pub utilization_percent: f64,
}

#[derive(Default)]
struct CacheState {
    entries: HashMap<CacheKey, CacheEntry>,
    hits: u64,
    misses: u64,
    total_requests: u64,
}

impl CacheState {
    fn remove_expired(&mut self, ttl: Duration) -> usize {
        let before = self.entries.len();
        self.entries.retain(|_, entry| !entry.is_expired(ttl));
        before - self.entries.len()
    }

    fn evict_oldest(&mut self, max_entries: usize) -> usize {
        let count = ((max_entries as f64 * EVICTION_FRACTION).ceil() as usize).max(1);
        let mut by_age: Vec<(CacheKey, Instant)> = self
            .entries
            .iter()
            .map(|(key, entry)| (key.clone(), entry.inserted_at))
            .collect();
        by_age.sort_by_key(|(_, inserted_at)| *inserted_at);

        // Enough to get back under the cap even if the cap shrank
        let excess = self.entries.len().saturating_sub(max_entries) + 1;
        let count = count.max(excess).min(by_age.len());
        for (key, _) in by_age.into_iter().take(count) {
            self.entries.remove(&key);
        }
        count
    }
}

struct Sweeper {
    token: CancellationToken,
    handle: JoinHandle<()>,
}

/// Thread-safe summary cache.
///
/// All counters and the entry map live behind one mutex so compound
/// operations like "invalidate stale, check capacity, insert" are atomic.
pub struct CacheManager {
    state: Arc<Mutex<CacheState>>,
    ttl: Duration,
    max_entries: usize,
    cleanup_interval: Duration,
    sweeper: Mutex<Option<Sweeper>>,
}

impl CacheManager {
    pub fn new(config: &CacheConfig) -> Self {
        Self {
            state: Arc::new(Mutex::new(CacheState::default())),
            ttl: Duration::from_secs(config.ttl_secs),
            max_entries: config.max_entries.max(1),
            cleanup_interval: Duration::from_secs(config.cleanup_interval_secs.max(1)),
            sweeper: Mutex::new(None),
        }
    }

    /// Create a cache with explicit limits
    pub fn with_limits(ttl: Duration, max_entries: usize, cleanup_interval: Duration) -> Self {
        Self {
            state: Arc::new(Mutex::new(CacheState::default())),
            ttl,
            max_entries: max_entries.max(1),
            cleanup_interval: cleanup_interval.max(MIN_CLEANUP_INTERVAL),
            sweeper: Mutex::new(None),
        }
    }

    fn lock(&self) -> MutexGuard<'_, CacheState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Store a summary, superseding any entry for other timestamps of the thread
    pub fn set(
        &self,
        thread_id: &str,
        last_post_timestamp: &str,
        data: SummaryData,
    ) -> Result<(), CacheError> {
        let key = generate_cache_key(thread_id, last_post_timestamp)?;
        let mut state = self.lock();
        self.insert(&mut state, key, thread_id, last_post_timestamp, data);
        Ok(())
    }

    /// Like [`CacheManager::set`], but keeps a live entry for newer activity.
    ///
    /// Returns `false` when the summary was not stored because the thread
    /// already has a fresher one.
    pub fn set_unless_superseded(
        &self,
        thread_id: &str,
        last_post_timestamp: &str,
        data: SummaryData,
    ) -> Result<bool, CacheError> {
        let key = generate_cache_key(thread_id, last_post_timestamp)?;
        let mut state = self.lock();

        let newer = state.entries.values().any(|entry| {
            entry.thread_id == thread_id
                && !entry.is_expired(self.ttl)
                && is_later_timestamp(&entry.last_post_timestamp, last_post_timestamp)
        });
        if newer {
            tracing::debug!(thread_id, last_post_timestamp, "Newer summary already cached");
            return Ok(false);
        }

        self.insert(&mut state, key, thread_id, last_post_timestamp, data);
        Ok(true)
    }

    fn insert(
        &self,
        state: &mut CacheState,
        key: CacheKey,
        thread_id: &str,
        last_post_timestamp: &str,
        data: SummaryData,
    ) {
        let before = state.entries.len();
        state.entries.retain(|_, entry| {
            entry.thread_id != thread_id || entry.last_post_timestamp == last_post_timestamp
        });
        let superseded = before - state.entries.len();
        if superseded > 0 {
            tracing::debug!(thread_id, superseded, "Dropped stale summaries");
        }

        if !state.entries.contains_key(&key) && state.entries.len() >= self.max_entries {
            let evicted = state.evict_oldest(self.max_entries);
            tracing::debug!(evicted, max_entries = self.max_entries, "Cache full, evicted oldest entries");
        }

        state.entries.insert(
            key,
            CacheEntry {
                data,
                inserted_at: Instant::now(),
                thread_id: thread_id.to_string(),
                last_post_timestamp: last_post_timestamp.to_string(),
                generated_at: Utc::now(),
            },
        );
    }

    /// Look up a summary; expired entries are evicted and count as misses
    pub fn get(
        &self,
        thread_id: &str,
        last_post_timestamp: &str,
    ) -> Result<Option<CacheEntry>, CacheError> {
        let key = generate_cache_key(thread_id, last_post_timestamp)?;
        let mut state = self.lock();
        state.total_requests += 1;

        match state.entries.get(&key).cloned() {
            Some(entry) if !entry.is_expired(self.ttl) => {
                state.hits += 1;
                Ok(Some(entry))
            }
            Some(_) => {
                state.entries.remove(&key);
                state.misses += 1;
                tracing::debug!(key = %key, "Cache entry expired");
                Ok(None)
            }
            None => {
                state.misses += 1;
                Ok(None)
            }
        }
    }

    pub fn has(&self, thread_id: &str, last_post_timestamp: &str) -> Result<bool, CacheError> {
        Ok(self.get(thread_id, last_post_timestamp)?.is_some())
    }

    /// Drop every entry for a thread, whatever its timestamp
    pub fn invalidate_thread(&self, thread_id: &str) -> usize {
        let mut state = self.lock();
        let before = state.entries.len();
        state.entries.retain(|_, entry| entry.thread_id != thread_id);
        let removed = before - state.entries.len();
        if removed > 0 {
            tracing::debug!(thread_id, removed, "Invalidated thread summaries");
        }
        removed
    }

    /// Remove every entry older than the TTL; returns how many were removed
    pub fn sweep_expired(&self) -> usize {
        self.lock().remove_expired(self.ttl)
    }

    pub fn clear(&self) {
        self.lock().entries.clear();
    }

    pub fn stats(&self) -> CacheStats {
        let state = self.lock();
        let hit_rate = if state.total_requests == 0 {
            0.0
        } else {
            state.hits as f64 / state.total_requests as f64
        };
        CacheStats {
            hits: state.hits,
            misses: state.misses,
            total_requests: state.total_requests,
            hit_rate,
        }
    }

    pub fn size(&self) -> CacheSize {
        let entries = self.lock().entries.len();
        CacheSize {
            entries,
            max_entries: self.max_entries,
            utilization_percent: entries as f64 / self.max_entries as f64 * 100.0,
        }
    }

    /// Spawn the background TTL sweep. Must be called inside a tokio runtime.
    ///
    /// Calling it again while a sweeper is running is a no-op.
    pub fn start_sweeper(&self) {
        let mut slot = self.sweeper.lock().unwrap_or_else(PoisonError::into_inner);
        if slot.is_some() {
            return;
        }

        let token = CancellationToken::new();
        let state = Arc::clone(&self.state);
        let ttl = self.ttl;
        let period = self.cleanup_interval;
        let cancelled = token.clone();

        let handle = tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            // first tick completes immediately
            interval.tick().await;
            loop {
                tokio::select! {
                    _ = cancelled.cancelled() => break,
                    _ = interval.tick() => {
                        let removed = state
                            .lock()
                            .unwrap_or_else(PoisonError::into_inner)
                            .remove_expired(ttl);
                        if removed > 0 {
                            tracing::debug!(removed, "Swept expired summaries");
                        }
                    }
                }
            }
        });

        *slot = Some(Sweeper { token, handle });
    }

    /// Stop the background sweep and wait for it to finish
    pub async fn stop_sweeper(&self) {
        let sweeper = self
            .sweeper
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(Sweeper { token, handle }) = sweeper {
            token.cancel();
            if let Err(e) = handle.await {
                tracing::warn!("Cache sweeper ended abnormally: {}", e);
            }
        }
    }

    pub fn is_sweeping(&self) -> bool {
        self.sweeper
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }
}

impl Drop for CacheManager {
    fn drop(&mut self) {
        if let Some(sweeper) = self
            .sweeper
            .get_mut()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
        {
            sweeper.token.cancel();
        }
    }
}
