//! Content-addressed cache for segmentation results
//!
//! Results are keyed by the SHA-256 digest of the exact input bytes. Each key
//! owns an async once-cell holding the outcome of a single flight, so
//! concurrent requests for the same key share one computation: the first
//! caller runs it, later callers await its outcome, success or failure.
//! A failed flight is dropped from the map once it settles, so the next fresh
//! request computes again.

use crate::error::Result;
use image::RgbaImage;
use sha2::{Digest, Sha256};
use std::collections::{HashMap, VecDeque};
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::OnceCell;
use tracing::debug;

/// Identity of an input byte sequence
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct CacheKey([u8; 32]);

impl CacheKey {
    /// Derive the key from raw input bytes
    #[must_use]
    pub fn from_bytes(bytes: &[u8]) -> Self {
        let digest = Sha256::digest(bytes);
        Self(digest.into())
    }

    /// Full lowercase hex digest
    #[must_use]
    pub fn to_hex(&self) -> String {
        self.0.iter().map(|b| format!("{:02x}", b)).collect()
    }
}

impl std::fmt::Debug for CacheKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "CacheKey({})", self)
    }
}

impl std::fmt::Display for CacheKey {
    /// Abbreviated digest (first 8 bytes) for log lines
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for byte in self.0.iter().take(8) {
            write!(f, "{:02x}", byte)?;
        }
        Ok(())
    }
}

/// Cache statistics
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    /// Requests served by an existing or in-flight computation
    pub hits: u64,
    /// Requests that ran the computation
    pub misses: u64,
    /// Keys currently tracked, completed or in flight
    pub entries: usize,
}

/// Outcome of one flight, shared with every caller that awaited it
type Outcome = Result<Arc<RgbaImage>>;

type Slot = Arc<OnceCell<Outcome>>;

#[derive(Default)]
struct CacheState {
    entries: HashMap<CacheKey, Slot>,
    /// Insertion order, oldest first
    order: VecDeque<CacheKey>,
}

/// Single-flight cache of segmented images
pub struct SegmentationCache {
    state: Mutex<CacheState>,
    capacity: Option<usize>,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl SegmentationCache {
    /// Create an unbounded cache
    #[must_use]
    pub fn new() -> Self {
        Self::with_capacity(None)
    }

    /// Create a cache holding at most `capacity` keys (None = unbounded)
    ///
    /// When full, the oldest completed key is evicted to make room. Keys still
    /// in flight are never evicted, so the cache may briefly exceed `capacity`
    /// while more than `capacity` computations run at once.
    #[must_use]
    pub fn with_capacity(capacity: Option<usize>) -> Self {
        Self {
            state: Mutex::new(CacheState::default()),
            capacity,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    /// Return the cached value for `key`, or compute it at most once
    ///
    /// The returned flag is `true` when this caller did not run `compute`
    /// itself (the value was cached or produced by a concurrent caller).
    ///
    /// # Errors
    /// - Whatever `compute` returns. Callers that awaited the same flight
    ///   receive the same error; the failure is not kept afterwards
    pub async fn get_or_compute<F, Fut>(
        &self,
        key: CacheKey,
        compute: F,
    ) -> Result<(Arc<RgbaImage>, bool)>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<RgbaImage>>,
    {
        let slot = self.slot(key);

        let mut computed = false;
        let outcome = slot
            .get_or_init(|| {
                computed = true;
                let pending = compute();
                async move { pending.await.map(Arc::new) }
            })
            .await
            .clone();

        if computed {
            self.misses.fetch_add(1, Ordering::Relaxed);
        } else {
            self.hits.fetch_add(1, Ordering::Relaxed);
        }

        if outcome.is_err() {
            self.discard(key, &slot);
        }

        let value = outcome?;
        debug!(key = %key, hit = !computed, "Segmentation cache lookup");
        Ok((value, !computed))
    }

    /// Whether a completed result is stored for `key`
    #[must_use]
    pub fn contains(&self, key: &CacheKey) -> bool {
        self.lock()
            .entries
            .get(key)
            .is_some_and(|slot| matches!(slot.get(), Some(Ok(_))))
    }

    #[must_use]
    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            entries: self.lock().entries.len(),
        }
    }

    /// Drop every stored entry; in-flight computations still complete for their callers
    pub fn clear(&self) {
        let mut state = self.lock();
        state.entries.clear();
        state.order.clear();
    }

    fn slot(&self, key: CacheKey) -> Slot {
        let mut guard = self.lock();
        let CacheState { entries, order } = &mut *guard;
        if let Some(slot) = entries.get(&key) {
            return Arc::clone(slot);
        }

        if let Some(capacity) = self.capacity {
            while entries.len() >= capacity {
                let settled = order
                    .iter()
                    .position(|k| entries.get(k).is_some_and(|slot| slot.initialized()));
                let Some(oldest) = settled.and_then(|index| order.remove(index)) else {
                    break;
                };
                entries.remove(&oldest);
                debug!(key = %oldest, "Evicted segmentation cache entry");
            }
        }

        let slot = Slot::default();
        entries.insert(key, Arc::clone(&slot));
        order.push_back(key);
        slot
    }

    /// Forget a failed flight, unless the key was already replaced
    fn discard(&self, key: CacheKey, slot: &Slot) {
        let mut guard = self.lock();
        let CacheState { entries, order } = &mut *guard;
        if entries.get(&key).is_some_and(|current| Arc::ptr_eq(current, slot)) {
            entries.remove(&key);
            order.retain(|k| *k != key);
        }
    }

    fn lock(&self) -> MutexGuard<'_, CacheState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for SegmentationCache {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::PipelineError;
    use image::Rgba;
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;

    fn image(value: u8) -> RgbaImage {
        RgbaImage::from_pixel(2, 2, Rgba([value, value, value, 255]))
    }

    #[test]
    fn test_cache_key_identity() {
        let a = CacheKey::from_bytes(b"same bytes");
        let b = CacheKey::from_bytes(b"same bytes");
        let c = CacheKey::from_bytes(b"same bytes!");
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(a.to_hex().len(), 64);
        assert_eq!(a.to_string().len(), 16);
        assert!(a.to_hex().starts_with(&a.to_string()));
    }

    #[tokio::test]
    async fn test_second_lookup_is_a_hit() {
        let cache = SegmentationCache::new();
        let key = CacheKey::from_bytes(b"input");
        let calls = AtomicUsize::new(0);
        let counter = &calls;

        let (first, first_hit) = cache
            .get_or_compute(key, move || async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(image(1))
            })
            .await
            .unwrap();
        let (second, second_hit) = cache
            .get_or_compute(key, move || async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(image(2))
            })
            .await
            .unwrap();

        assert!(!first_hit);
        assert!(second_hit);
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(cache.contains(&key));
        assert_eq!(
            cache.stats(),
            CacheStats {
                hits: 1,
                misses: 1,
                entries: 1
            }
        );
    }

    #[tokio::test]
    async fn test_failures_are_not_cached() {
        let cache = SegmentationCache::new();
        let key = CacheKey::from_bytes(b"flaky");

        let failed = cache
            .get_or_compute(key, || async {
                Err(PipelineError::segmentation("backend offline"))
            })
            .await;
        assert!(failed.is_err());
        assert!(!cache.contains(&key));
        assert_eq!(cache.stats().entries, 0);

        let (value, hit) = cache
            .get_or_compute(key, || async { Ok(image(9)) })
            .await
            .unwrap();
        assert!(!hit);
        assert_eq!(*value, image(9));
    }

    #[tokio::test]
    async fn test_capacity_evicts_oldest() {
        let cache = SegmentationCache::with_capacity(Some(2));
        let keys: Vec<CacheKey> = (0u8..3).map(|i| CacheKey::from_bytes(&[i])).collect();

        for (i, key) in keys.iter().enumerate() {
            cache
                .get_or_compute(*key, move || async move { Ok(image(i as u8)) })
                .await
                .unwrap();
        }

        assert_eq!(cache.stats().entries, 2);
        assert!(!cache.contains(&keys[0]));
        assert!(cache.contains(&keys[1]));
        assert!(cache.contains(&keys[2]));
    }

    #[tokio::test(start_paused = true)]
    async fn test_waiters_share_a_failure() {
        let cache = SegmentationCache::new();
        let key = CacheKey::from_bytes(b"doomed");
        let calls = AtomicUsize::new(0);
        let counter = &calls;

        let attempt = || {
            cache.get_or_compute(key, move || async move {
                counter.fetch_add(1, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(50)).await;
                Err::<RgbaImage, _>(PipelineError::segmentation("backend offline"))
            })
        };
        let (first, second, third) = tokio::join!(attempt(), attempt(), attempt());

        assert!([first, second, third]
            .iter()
            .all(|r| r.as_ref().is_err_and(PipelineError::is_capability_error)));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(
            cache.stats(),
            CacheStats {
                hits: 2,
                misses: 1,
                entries: 0
            }
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_eviction_skips_in_flight_keys() {
        let cache = SegmentationCache::with_capacity(Some(1));
        let slow = CacheKey::from_bytes(b"slow");
        let other = CacheKey::from_bytes(b"other");
        let calls = AtomicUsize::new(0);
        let counter = &calls;

        let compute = move |value: u8| {
            move || async move {
                counter.fetch_add(1, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(100)).await;
                Ok(image(value))
            }
        };

        let first = cache.get_or_compute(slow, compute(1));
        let second = async {
            tokio::time::sleep(Duration::from_millis(10)).await;
            cache.get_or_compute(other, compute(2)).await
        };
        let third = async {
            tokio::time::sleep(Duration::from_millis(20)).await;
            cache.get_or_compute(slow, compute(3)).await
        };
        let (first, second, third) = tokio::join!(first, second, third);

        assert_eq!(calls.load(Ordering::SeqCst), 2);
        let (first, _) = first.unwrap();
        let (third, third_hit) = third.unwrap();
        assert!(second.is_ok());
        assert!(third_hit);
        assert!(Arc::ptr_eq(&first, &third));
        // Both flights overlapped, so the cache ran over capacity
        assert_eq!(cache.stats().entries, 2);

        // The next insert brings it back to capacity, oldest first
        cache
            .get_or_compute(CacheKey::from_bytes(b"late"), compute(4))
            .await
            .unwrap();
        assert_eq!(cache.stats().entries, 1);
        assert!(!cache.contains(&slow));
        assert!(!cache.contains(&other));
    }

    #[tokio::test]
    async fn test_clear_forces_recompute() {
        let cache = SegmentationCache::new();
        let key = CacheKey::from_bytes(b"x");
        cache
            .get_or_compute(key, || async { Ok(image(1)) })
            .await
            .unwrap();
        cache.clear();
        let (_, hit) = cache
            .get_or_compute(key, || async { Ok(image(1)) })
            .await
            .unwrap();
        assert!(!hit);
    }
}
