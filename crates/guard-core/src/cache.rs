//! Response Cache (C7, spec §4.7).
//!
//! `get(fp) -> Option<CacheEntry>` and `set(fp, entry)`, plus the
//! at-most-one-build primitive: concurrent misses for the same fingerprint
//! collapse into a single build, with every waiter observing the same
//! result (spec §8 "Cache at-most-one-build"). `get_or_build(fp, build_fn)`
//! is the self-contained form for callers that can express the build as a
//! single awaitable closure; `acquire_or_wait`/`release_build` is the split
//! form C11 uses, since its "build" is an external completion call that
//! happens outside the function that reserves the slot.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::Utc;
use dashmap::DashMap;
use tokio::sync::broadcast;

use crate::error::{Error, Result};
use crate::model::{CacheEntry, Fingerprint};

enum BuildSlot {
    /// A build is in flight; late arrivals subscribe to the outcome.
    InFlight(broadcast::Sender<std::result::Result<CacheEntry, String>>),
}

/// Outcome of [`ResponseCache::acquire_or_wait`]: either the value was
/// already cached (or another caller's build arrived while we waited), or
/// this call is now the one and only builder for `fp` and must eventually
/// call [`ResponseCache::release_build`].
pub enum CacheLease {
    /// The value is available; no build is needed.
    Cached(CacheEntry),
    /// This caller must build the value and call `release_build` when done.
    Builder,
    /// Another caller was the builder but errored or was dropped before
    /// producing a result; no value is cached. Mirrors `get_or_build`'s
    /// error propagation to waiters without this call becoming a builder
    /// itself.
    BuildFailed(String),
}

/// Monotone counters reported by the cache (spec §4.7 "Statistics").
#[derive(Debug, Default)]
pub struct CacheStats {
    hits: AtomicU64,
    misses: AtomicU64,
    tokens_saved: AtomicU64,
}

impl CacheStats {
    /// Total cache hits so far.
    pub fn hits(&self) -> u64 {
        self.hits.load(Ordering::Relaxed)
    }
    /// Total cache misses so far.
    pub fn misses(&self) -> u64 {
        self.misses.load(Ordering::Relaxed)
    }
    /// Sum of `token_count` over every hit.
    pub fn tokens_saved(&self) -> u64 {
        self.tokens_saved.load(Ordering::Relaxed)
    }
}

/// The response cache, bounded at `max_entries` with LRU eviction and a
/// hard TTL, plus the single-builder primitive.
pub struct ResponseCache {
    entries: parking_lot::Mutex<lru::LruCache<Fingerprint, CacheEntry>>,
    in_flight: DashMap<Fingerprint, BuildSlot>,
    stats: CacheStats,
    default_ttl: chrono::Duration,
}

impl ResponseCache {
    /// Construct a cache with the given entry capacity and default TTL.
    #[must_use]
    pub fn new(max_entries: usize, default_ttl: chrono::Duration) -> Self {
        ResponseCache {
            entries: parking_lot::Mutex::new(lru::LruCache::new(
                std::num::NonZeroUsize::new(max_entries.max(1)).expect("max_entries clamped to >= 1"),
            )),
            in_flight: DashMap::new(),
            stats: CacheStats::default(),
            default_ttl,
        }
    }

    /// Statistics snapshot accessor.
    #[must_use]
    pub fn stats(&self) -> &CacheStats {
        &self.stats
    }

    /// Current entry count.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    /// Whether the cache has no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Look up a fingerprint, treating an expired entry as a miss (without
    /// evicting it here — eviction happens on the next `set` via LRU).
    #[must_use]
    pub fn get(&self, fp: Fingerprint) -> Option<CacheEntry> {
        let mut guard = self.entries.lock();
        let entry = guard.get_mut(&fp)?;
        if entry.is_expired(Utc::now()) {
            return None;
        }
        entry.hit_count += 1;
        let out = entry.clone();
        self.stats.hits.fetch_add(1, Ordering::Relaxed);
        self.stats.tokens_saved.fetch_add(out.token_count, Ordering::Relaxed);
        Some(out)
    }

    /// Insert or overwrite an entry.
    pub fn set(&self, fp: Fingerprint, entry: CacheEntry) {
        self.entries.lock().put(fp, entry);
    }

    /// The split half of the at-most-one-build primitive (spec §4.7):
    /// returns the cached value if present, reserving nothing; otherwise
    /// exactly one concurrent caller for a given `fp` comes back as
    /// [`CacheLease::Builder`] and is responsible for eventually calling
    /// [`Self::release_build`] — every other concurrent caller waits on
    /// the builder's shared handle and comes back `Cached` with the same
    /// result once it resolves. If a builder is dropped (errors or never
    /// finishes), a waiter falls back to becoming the builder itself
    /// rather than hanging forever.
    ///
    /// This is what [`crate::guard::RuntimeGuard::before_request`] calls
    /// directly: the "build" there is an external completion call the
    /// guard doesn't itself perform, so it cannot be expressed as a single
    /// `FnOnce` closure the way [`Self::get_or_build`] wants it. A
    /// `Builder` lease must eventually be resolved via `release_build`,
    /// including on every early-exit path, or concurrent waiters for the
    /// same fingerprint hang forever.
    pub async fn acquire_or_wait(&self, fp: Fingerprint) -> CacheLease {
        if let Some(entry) = self.get(fp) {
            return CacheLease::Cached(entry);
        }

        let rx_if_waiter = {
            use dashmap::mapref::entry::Entry;
            match self.in_flight.entry(fp) {
                Entry::Occupied(occ) => {
                    let BuildSlot::InFlight(tx) = occ.get();
                    Some(tx.subscribe())
                }
                Entry::Vacant(vac) => {
                    let (tx, _rx) = broadcast::channel(1);
                    vac.insert(BuildSlot::InFlight(tx));
                    None
                }
            }
        };

        self.stats.misses.fetch_add(1, Ordering::Relaxed);

        let Some(mut rx) = rx_if_waiter else {
            return CacheLease::Builder;
        };

        match rx.recv().await {
            Ok(Ok(entry)) => CacheLease::Cached(entry),
            Ok(Err(msg)) => CacheLease::BuildFailed(msg),
            Err(_) => CacheLease::BuildFailed("builder dropped without a result".to_string()),
        }
    }

    /// Resolve the builder slot reserved by [`Self::acquire_or_wait`]:
    /// caches `result` on success and wakes every waiter with the same
    /// outcome. Must be called exactly once per `Builder` lease.
    pub fn release_build(&self, fp: Fingerprint, result: &Result<CacheEntry>) {
        let broadcast_result = match result {
            Ok(entry) => Ok(entry.clone()),
            Err(e) => Err(e.to_string()),
        };

        if let Ok(entry) = result {
            self.set(fp, entry.clone());
        }

        if let Some((_, BuildSlot::InFlight(tx))) = self.in_flight.remove(&fp) {
            let _ = tx.send(broadcast_result);
        }
    }

    /// At-most-one-build primitive (spec §4.7). Returns the cached value if
    /// present; otherwise exactly one caller runs `build_fn`, other callers
    /// observing the same fingerprint wait on a shared handle. On
    /// `build_fn` error, all waiters receive the same error and nothing is
    /// cached.
    pub async fn get_or_build<F, Fut>(&self, fp: Fingerprint, build_fn: F) -> Result<CacheEntry>
    where
        F: FnOnce() -> Fut,
        Fut: std::future::Future<Output = Result<CacheEntry>>,
    {
        match self.acquire_or_wait(fp).await {
            CacheLease::Cached(entry) => Ok(entry),
            CacheLease::Builder => {
                let result = build_fn().await;
                self.release_build(fp, &result);
                result
            }
            CacheLease::BuildFailed(msg) => Err(Error::CacheBuild(msg)),
        }
    }

    /// Build a fresh [`CacheEntry`] for a completion, using this cache's
    /// default TTL.
    #[must_use]
    pub fn make_entry(&self, fingerprint: Fingerprint, response_text: String, token_count: u64) -> CacheEntry {
        CacheEntry {
            fingerprint,
            response_text,
            token_count,
            created_at: Utc::now(),
            ttl: self.default_ttl,
            hit_count: 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    fn fp(n: u64) -> Fingerprint {
        Fingerprint(n)
    }

    #[test]
    fn get_on_empty_cache_is_none() {
        let cache = ResponseCache::new(10, chrono::Duration::seconds(60));
        assert!(cache.get(fp(1)).is_none());
    }

    #[test]
    fn set_then_get_round_trips() {
        let cache = ResponseCache::new(10, chrono::Duration::seconds(60));
        let entry = cache.make_entry(fp(1), "hello".to_string(), 5);
        cache.set(fp(1), entry);
        let got = cache.get(fp(1)).unwrap();
        assert_eq!(got.response_text, "hello");
        assert_eq!(cache.stats().hits(), 1);
    }

    #[test]
    fn expired_entry_is_treated_as_miss() {
        let cache = ResponseCache::new(10, chrono::Duration::seconds(-1));
        let entry = cache.make_entry(fp(1), "hello".to_string(), 5);
        cache.set(fp(1), entry);
        assert!(cache.get(fp(1)).is_none());
    }

    #[tokio::test]
    async fn get_or_build_invokes_build_fn_once_for_concurrent_waiters() {
        let cache = Arc::new(ResponseCache::new(10, chrono::Duration::seconds(60)));
        let call_count = Arc::new(AtomicUsize::new(0));

        let mut handles = Vec::new();
        for _ in 0..8 {
            let cache = cache.clone();
            let call_count = call_count.clone();
            handles.push(tokio::spawn(async move {
                cache
                    .get_or_build(fp(42), || {
                        let call_count = call_count.clone();
                        async move {
                            call_count.fetch_add(1, Ordering::SeqCst);
                            tokio::time::sleep(std::time::Duration::from_millis(20)).await;
                            Ok(CacheEntry {
                                fingerprint: fp(42),
                                response_text: "built".to_string(),
                                token_count: 10,
                                created_at: Utc::now(),
                                ttl: chrono::Duration::seconds(60),
                                hit_count: 0,
                            })
                        }
                    })
                    .await
            }));
        }

        let mut results = Vec::new();
        for h in handles {
            results.push(h.await.unwrap().unwrap());
        }

        assert_eq!(call_count.load(Ordering::SeqCst), 1);
        assert!(results.iter().all(|r| r.response_text == "built"));
    }

    #[tokio::test]
    async fn get_or_build_propagates_error_to_all_waiters() {
        let cache = Arc::new(ResponseCache::new(10, chrono::Duration::seconds(60)));
        let mut handles = Vec::new();
        for _ in 0..4 {
            let cache = cache.clone();
            handles.push(tokio::spawn(async move {
                cache
                    .get_or_build(fp(7), || async {
                        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
                        Err(Error::CacheBuild("provider 500".to_string()))
                    })
                    .await
            }));
        }
        for h in handles {
            assert!(h.await.unwrap().is_err());
        }
        assert!(cache.get(fp(7)).is_none());
    }
}
