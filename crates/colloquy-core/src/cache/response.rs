//! Content-keyed response cache.
//!
//! Entries are keyed by a SHA-256 digest of the requested model and the last
//! three prompt messages. Expiry is checked on every read (an expired entry
//! is removed and counted as a miss); the periodic sweep only reclaims memory.
//! Capacity eviction drops the earliest-inserted entry, regardless of how
//! often it has been read.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use colloquy_types::cache::{CacheStats, CachedResponse};
use colloquy_types::config::{CacheConfig, CacheLookupPolicy};
use colloquy_types::llm::Message;
use sha2::{Digest, Sha256};

/// Number of trailing messages that make up the cache key.
const KEY_MESSAGES: usize = 3;

/// Number of trailing messages compared by the similarity fallback.
const SIMILARITY_MESSAGES: usize = 2;

#[derive(Debug, Clone)]
struct CacheEntry {
    response: String,
    inserted_at: Instant,
    ttl: Duration,
    hit_count: u64,
    model: String,
    words: HashSet<String>,
    scope: Option<String>,
}

impl CacheEntry {
    fn is_expired(&self, now: Instant) -> bool {
        now.saturating_duration_since(self.inserted_at) >= self.ttl
    }
}

#[derive(Default)]
struct CacheInner {
    entries: HashMap<String, CacheEntry>,
    /// Keys in insertion order, oldest at the front.
    order: VecDeque<String>,
}

impl CacheInner {
    fn remove(&mut self, key: &str) -> Option<CacheEntry> {
        let removed = self.entries.remove(key);
        if removed.is_some() {
            self.order.retain(|k| k != key);
        }
        removed
    }

    fn remove_where(&mut self, mut pred: impl FnMut(&CacheEntry) -> bool) -> usize {
        let before = self.entries.len();
        self.entries.retain(|_, entry| !pred(entry));
        let entries = &self.entries;
        self.order.retain(|k| entries.contains_key(k));
        before - self.entries.len()
    }
}

/// Deterministic cache key for `(model, last 3 messages)`.
pub fn cache_key(messages: &[Message], model: &str) -> String {
    let start = messages.len().saturating_sub(KEY_MESSAGES);
    let mut material = model.to_string();
    for message in &messages[start..] {
        material.push('|');
        material.push_str(&format!("{}:{}", message.role, message.content).to_lowercase());
    }
    format!("{:x}", Sha256::digest(material.as_bytes()))
}

/// Lower-cased words longer than three characters from the last two messages.
fn word_set(messages: &[Message]) -> HashSet<String> {
    let start = messages.len().saturating_sub(SIMILARITY_MESSAGES);
    messages[start..]
        .iter()
        .flat_map(|m| m.content.split_whitespace())
        .map(|w| {
            w.trim_matches(|c: char| !c.is_alphanumeric())
                .to_lowercase()
        })
        .filter(|w| w.chars().count() > 3)
        .collect()
}

fn jaccard(a: &HashSet<String>, b: &HashSet<String>) -> f64 {
    if a.is_empty() && b.is_empty() {
        return 0.0;
    }
    let intersection = a.intersection(b).count();
    let union = a.union(b).count();
    intersection as f64 / union as f64
}

/// Process-wide response cache, safe under concurrent get/set.
pub struct ResponseCache {
    inner: Mutex<CacheInner>,
    max_size: usize,
    default_ttl: Duration,
    min_response_len: usize,
    similarity_threshold: f64,
    policy: CacheLookupPolicy,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl ResponseCache {
    pub fn new(config: &CacheConfig) -> Self {
        Self {
            inner: Mutex::new(CacheInner::default()),
            max_size: config.max_size.max(1),
            default_ttl: Duration::from_secs(config.ttl_secs),
            min_response_len: config.min_response_len,
            similarity_threshold: config.similarity_threshold,
            policy: config.lookup,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, CacheInner> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn policy(&self) -> CacheLookupPolicy {
        self.policy
    }

    /// Exact-key probe without touching the global counters.
    fn probe(&self, key: &str, now: Instant) -> Option<CachedResponse> {
        let mut inner = self.lock();
        let expired = inner.entries.get(key)?.is_expired(now);
        if expired {
            inner.remove(key);
            tracing::debug!(key = %&key[..12], "Cache entry expired on read");
            return None;
        }
        let entry = inner.entries.get_mut(key)?;
        entry.hit_count += 1;
        Some(CachedResponse {
            response: entry.response.clone(),
            from_cache: true,
            hit_count: entry.hit_count,
            model: Some(entry.model.clone()),
            fuzzy: false,
        })
    }

    fn record(&self, result: &Option<CachedResponse>) {
        if result.is_some() {
            self.hits.fetch_add(1, Ordering::Relaxed);
        } else {
            self.misses.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Exact lookup. Expired and absent entries both count as a miss.
    pub fn get(&self, messages: &[Message], model: &str) -> Option<CachedResponse> {
        let result = self.probe(&cache_key(messages, model), Instant::now());
        self.record(&result);
        result
    }

    /// Lookup according to the configured policy.
    ///
    /// Each call counts as exactly one hit or one miss.
    pub fn lookup(&self, messages: &[Message], model: &str) -> Option<CachedResponse> {
        let result = match self.policy {
            CacheLookupPolicy::Disabled => return None,
            CacheLookupPolicy::Exact => self.probe(&cache_key(messages, model), Instant::now()),
            CacheLookupPolicy::ExactThenFuzzy => self
                .probe(&cache_key(messages, model), Instant::now())
                .or_else(|| self.find_similar(messages, self.similarity_threshold)),
        };
        self.record(&result);
        result
    }

    /// Insert with the default TTL.
    pub fn set(&self, messages: &[Message], response: &str, model: &str) -> bool {
        self.insert(messages, response, model, None, None)
    }

    /// Insert, recording the conversation that produced the entry so it can
    /// be dropped with [`ResponseCache::invalidate_scope`].
    pub fn set_scoped(
        &self,
        messages: &[Message],
        response: &str,
        model: &str,
        scope: &str,
    ) -> bool {
        self.insert(messages, response, model, None, Some(scope))
    }

    /// Insert or replace an entry. Returns false when the response is too
    /// short to be worth caching.
    ///
    /// Replacing an existing key moves it to the back of the eviction order.
    pub fn insert(
        &self,
        messages: &[Message],
        response: &str,
        model: &str,
        ttl: Option<Duration>,
        scope: Option<&str>,
    ) -> bool {
        if response.chars().count() < self.min_response_len {
            return false;
        }
        let key = cache_key(messages, model);
        let entry = CacheEntry {
            response: response.to_string(),
            inserted_at: Instant::now(),
            ttl: ttl.unwrap_or(self.default_ttl),
            hit_count: 0,
            model: model.to_string(),
            words: word_set(messages),
            scope: scope.map(str::to_string),
        };

        let mut inner = self.lock();
        inner.remove(&key);
        while inner.entries.len() >= self.max_size {
            let Some(oldest) = inner.order.pop_front() else {
                break;
            };
            inner.entries.remove(&oldest);
            tracing::debug!(key = %&oldest[..12], "Evicted oldest cache entry");
        }
        inner.order.push_back(key.clone());
        inner.entries.insert(key, entry);
        true
    }

    /// First live entry (insertion order) whose word set has Jaccard
    /// similarity above `threshold` with the last two messages.
    pub fn find_similar(&self, messages: &[Message], threshold: f64) -> Option<CachedResponse> {
        let words = word_set(messages);
        if words.is_empty() {
            return None;
        }
        let now = Instant::now();
        let mut inner = self.lock();
        let CacheInner { entries, order } = &mut *inner;
        for key in order.iter() {
            let Some(entry) = entries.get_mut(key) else {
                continue;
            };
            if entry.is_expired(now) {
                continue;
            }
            let similarity = jaccard(&words, &entry.words);
            if similarity > threshold {
                entry.hit_count += 1;
                tracing::debug!(similarity, "Similar cache entry found");
                return Some(CachedResponse {
                    response: entry.response.clone(),
                    from_cache: true,
                    hit_count: entry.hit_count,
                    model: Some(entry.model.clone()),
                    fuzzy: true,
                });
            }
        }
        None
    }

    /// Remove expired entries. Returns the number removed.
    pub fn sweep_expired(&self) -> usize {
        let now = Instant::now();
        let removed = self.lock().remove_where(|e| e.is_expired(now));
        if removed > 0 {
            tracing::info!(removed, "Swept expired cache entries");
        }
        removed
    }

    /// Drop every entry produced by the given conversation.
    pub fn invalidate_scope(&self, scope: &str) -> usize {
        self.lock()
            .remove_where(|e| e.scope.as_deref() == Some(scope))
    }

    pub fn clear(&self) {
        let mut inner = self.lock();
        inner.entries.clear();
        inner.order.clear();
    }

    pub fn len(&self) -> usize {
        self.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn stats(&self) -> CacheStats {
        let hits = self.hits.load(Ordering::Relaxed);
        let misses = self.misses.load(Ordering::Relaxed);
        CacheStats {
            size: self.len(),
            max_size: self.max_size,
            hit_count: hits,
            miss_count: misses,
            hit_rate: CacheStats::compute_hit_rate(hits, misses),
        }
    }
}
