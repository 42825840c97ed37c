//! Bounded LRU cache with per-entry expiry.
//!
//! Entries expire lazily (a lookup never returns an expired value) and are
//! also removed by a timer once their TTL elapses, so expired entries do not
//! keep occupying capacity. Each entry owns its timer: replacing, evicting, or
//! removing an entry aborts it, so pending timers never outnumber the cache
//! capacity. Each insertion gets a generation number; a timer only removes the
//! entry it was scheduled for, never a newer value stored under the same key.

use std::borrow::Borrow;
use std::hash::Hash;
use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use lru::LruCache;
use parking_lot::Mutex;
use thiserror::Error;
use tokio::task::AbortHandle;
use tokio::time::Instant;

/// Deadline used when `now + ttl` is not representable.
const FAR_FUTURE: Duration = Duration::from_secs(100 * 365 * 24 * 3600);

/// Cache construction failures.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum CacheError {
    /// Capacity must be at least one.
    #[error("cache capacity must be positive")]
    ZeroCapacity,
}

/// Cache statistics.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CacheStats {
    /// Lookups that returned a live value.
    pub hits: u64,
    /// Lookups that found nothing or an expired value.
    pub misses: u64,
    /// Entries displaced by capacity.
    pub evictions: u64,
    /// Entries removed after their TTL.
    pub expirations: u64,
    /// Entries currently held.
    pub size: usize,
    /// Configured capacity.
    pub capacity: usize,
}

#[derive(Debug)]
struct Entry<V> {
    value: V,
    expires_at: Instant,
    generation: u64,
    timer: Option<ExpiryTimer>,
}

/// Aborts the expiry task when its entry leaves the cache.
#[derive(Debug)]
struct ExpiryTimer(AbortHandle);

impl Drop for ExpiryTimer {
    fn drop(&mut self) {
        self.0.abort();
    }
}

#[derive(Debug)]
struct Shared<K: Hash + Eq, V> {
    entries: Mutex<LruCache<K, Entry<V>>>,
    next_generation: AtomicU64,
    hits: AtomicU64,
    misses: AtomicU64,
    evictions: AtomicU64,
    expirations: AtomicU64,
}

impl<K: Hash + Eq, V> Shared<K, V> {
    fn expire(&self, key: &K, generation: u64) {
        let mut entries = self.entries.lock();
        if entries
            .peek(key)
            .is_some_and(|entry| entry.generation == generation)
        {
            entries.pop(key);
            self.expirations.fetch_add(1, Ordering::Relaxed);
        }
    }
}

/// Thread-safe LRU cache whose entries expire after a per-entry TTL.
///
/// Cloning is cheap and yields a handle to the same cache.
#[derive(Debug)]
pub struct ExpiringLruCache<K: Hash + Eq, V> {
    shared: Arc<Shared<K, V>>,
}

impl<K: Hash + Eq, V> Clone for ExpiringLruCache<K, V> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<K, V> ExpiringLruCache<K, V>
where
    K: Hash + Eq + Clone + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    /// Creates a cache holding at most `capacity` entries.
    ///
    /// # Errors
    ///
    /// Returns `CacheError::ZeroCapacity` when `capacity` is zero.
    pub fn new(capacity: usize) -> Result<Self, CacheError> {
        let capacity = NonZeroUsize::new(capacity).ok_or(CacheError::ZeroCapacity)?;
        Ok(Self {
            shared: Arc::new(Shared {
                entries: Mutex::new(LruCache::new(capacity)),
                next_generation: AtomicU64::new(0),
                hits: AtomicU64::new(0),
                misses: AtomicU64::new(0),
                evictions: AtomicU64::new(0),
                expirations: AtomicU64::new(0),
            }),
        })
    }

    /// Inserts or replaces `key`, evicting the least recently used entry
    /// when full, and schedules its removal after `ttl`.
    ///
    /// A zero TTL stores an entry that is already expired. A TTL too large
    /// to represent is capped at a deadline a century away. Outside a Tokio
    /// runtime no timer is scheduled and expiry is purely lazy.
    pub fn add(&self, key: K, value: V, ttl: Duration) {
        let generation = self.shared.next_generation.fetch_add(1, Ordering::Relaxed);
        let now = Instant::now();
        let expires_at = now
            .checked_add(ttl)
            .or_else(|| now.checked_add(FAR_FUTURE))
            .unwrap_or(now);

        // The timer is spawned under the lock so it cannot run before its
        // entry is stored.
        let mut entries = self.shared.entries.lock();
        let timer = self.schedule_expiry(key.clone(), generation, expires_at);
        let displaced = entries.push(
            key.clone(),
            Entry {
                value,
                expires_at,
                generation,
                timer,
            },
        );
        drop(entries);

        if displaced.is_some_and(|(old_key, _)| old_key != key) {
            self.shared.evictions.fetch_add(1, Ordering::Relaxed);
        }
    }

    fn schedule_expiry(
        &self,
        key: K,
        generation: u64,
        expires_at: Instant,
    ) -> Option<ExpiryTimer> {
        let runtime = tokio::runtime::Handle::try_current().ok()?;
        let shared: Weak<Shared<K, V>> = Arc::downgrade(&self.shared);
        let timer = runtime.spawn(async move {
            tokio::time::sleep_until(expires_at).await;
            if let Some(shared) = shared.upgrade() {
                shared.expire(&key, generation);
            }
        });
        Some(ExpiryTimer(timer.abort_handle()))
    }

    /// Returns a live value for `key` and marks it most recently used.
    ///
    /// An expired entry is removed and reported as absent.
    pub fn get<Q>(&self, key: &Q) -> Option<V>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        let mut entries = self.shared.entries.lock();
        let expired = entries
            .peek(key)
            .map(|entry| Instant::now() >= entry.expires_at);
        let found = match expired {
            None => None,
            Some(true) => {
                entries.pop(key);
                self.shared.expirations.fetch_add(1, Ordering::Relaxed);
                None
            }
            Some(false) => entries.get(key).map(|entry| entry.value.clone()),
        };
        drop(entries);

        let counter = if found.is_some() {
            &self.shared.hits
        } else {
            &self.shared.misses
        };
        counter.fetch_add(1, Ordering::Relaxed);
        found
    }

    /// Removes `key`, returning its value if it was present.
    pub fn remove<Q>(&self, key: &Q) -> Option<V>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.shared.entries.lock().pop(key).map(|entry| entry.value)
    }

    /// Number of entries held, including expired ones not yet removed.
    pub fn len(&self) -> usize {
        self.shared.entries.lock().len()
    }

    /// True if the cache holds no entries.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Snapshot of the cache counters.
    pub fn stats(&self) -> CacheStats {
        let (size, capacity) = {
            let entries = self.shared.entries.lock();
            (entries.len(), entries.cap().get())
        };
        CacheStats {
            hits: self.shared.hits.load(Ordering::Relaxed),
            misses: self.shared.misses.load(Ordering::Relaxed),
            evictions: self.shared.evictions.load(Ordering::Relaxed),
            expirations: self.shared.expirations.load(Ordering::Relaxed),
            size,
            capacity,
        }
    }
}
