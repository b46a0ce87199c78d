/*!
 * Single-slot result cache with a time-to-live
 *
 * Holds the latest computed value behind an `Arc`. Readers clone the `Arc`
 * under a short read lock, so a refresh never exposes a partially built
 * value and never invalidates a value a reader already holds. Refreshes are
 * serialized by a separate lock; a failed refresh leaves the previous value
 * in place.
 */

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use std::time::{Duration, Instant};

use log::debug;

/// Default lifetime of a cached value
pub const DEFAULT_TTL: Duration = Duration::from_secs(3600);

struct CacheSlot<T> {
    value: Arc<T>,
    computed_at: Instant,
}

impl<T> Clone for CacheSlot<T> {
    fn clone(&self) -> Self {
        Self {
            value: Arc::clone(&self.value),
            computed_at: self.computed_at,
        }
    }
}

/// Hit/miss counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
}

pub struct ResultCache<T> {
    ttl: Duration,
    slot: RwLock<Option<CacheSlot<T>>>,
    refresh_lock: Mutex<()>,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl<T> Default for ResultCache<T> {
    fn default() -> Self {
        Self::new(DEFAULT_TTL)
    }
}

impl<T> ResultCache<T> {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            slot: RwLock::new(None),
            refresh_lock: Mutex::new(()),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    fn current(&self) -> Option<CacheSlot<T>> {
        match self.slot.read() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    fn fresh(&self) -> Option<Arc<T>> {
        self.current()
            .filter(|slot| slot.computed_at.elapsed() < self.ttl)
            .map(|slot| slot.value)
    }

    /// Cached value regardless of age
    pub fn peek(&self) -> Option<Arc<T>> {
        self.current().map(|slot| slot.value)
    }

    /// Whether a value exists and is younger than the TTL
    pub fn is_fresh(&self) -> bool {
        self.fresh().is_some()
    }

    /// Age of the cached value
    pub fn age(&self) -> Option<Duration> {
        self.current().map(|slot| slot.computed_at.elapsed())
    }

    /// Drop the cached value
    pub fn invalidate(&self) {
        match self.slot.write() {
            Ok(mut guard) => *guard = None,
            Err(poisoned) => *poisoned.into_inner() = None,
        }
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
        }
    }

    /// Return the cached value, computing it when stale, absent, or forced
    ///
    /// Only one computation runs at a time. A caller that waited for another
    /// caller's refresh reuses its result unless it asked to force one.
    pub fn get_or_compute<E, F>(&self, force_refresh: bool, compute: F) -> Result<Arc<T>, E>
    where
        F: FnOnce() -> Result<T, E>,
    {
        if !force_refresh {
            if let Some(value) = self.fresh() {
                self.hits.fetch_add(1, Ordering::Relaxed);
                return Ok(value);
            }
        }

        let _guard = match self.refresh_lock.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };

        if !force_refresh {
            if let Some(value) = self.fresh() {
                self.hits.fetch_add(1, Ordering::Relaxed);
                return Ok(value);
            }
        }

        self.misses.fetch_add(1, Ordering::Relaxed);
        debug!("Recomputing cached result (forced: {})", force_refresh);

        let value = Arc::new(compute()?);
        let slot = CacheSlot {
            value: Arc::clone(&value),
            computed_at: Instant::now(),
        };

        match self.slot.write() {
            Ok(mut guard) => *guard = Some(slot),
            Err(poisoned) => *poisoned.into_inner() = Some(slot),
        }

        Ok(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::thread;

    #[test]
    fn test_fresh_value_is_reused() {
        let cache = ResultCache::new(Duration::from_secs(60));
        let calls = AtomicUsize::new(0);

        for _ in 0..3 {
            let value = cache
                .get_or_compute(false, || -> Result<u32, String> {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Ok(7)
                })
                .unwrap();
            assert_eq!(*value, 7);
        }

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(cache.stats(), CacheStats { hits: 2, misses: 1 });
    }

    #[test]
    fn test_force_refresh_recomputes() {
        let cache = ResultCache::new(Duration::from_secs(60));
        cache.get_or_compute(false, || Ok::<_, String>(1)).unwrap();
        let value = cache.get_or_compute(true, || Ok::<_, String>(2)).unwrap();
        assert_eq!(*value, 2);
        assert_eq!(cache.peek().map(|v| *v), Some(2));
    }

    #[test]
    fn test_expired_value_is_recomputed() {
        let cache = ResultCache::new(Duration::ZERO);
        cache.get_or_compute(false, || Ok::<_, String>(1)).unwrap();
        assert!(!cache.is_fresh());
        let value = cache.get_or_compute(false, || Ok::<_, String>(2)).unwrap();
        assert_eq!(*value, 2);
    }

    #[test]
    fn test_failed_refresh_keeps_previous_value() {
        let cache = ResultCache::new(Duration::from_secs(60));
        let held = cache.get_or_compute(false, || Ok::<_, String>(vec![1, 2, 3])).unwrap();

        let err = cache
            .get_or_compute(true, || Err::<Vec<i32>, _>("directory unreadable".to_string()))
            .unwrap_err();
        assert_eq!(err, "directory unreadable");

        assert_eq!(*held, vec![1, 2, 3]);
        assert_eq!(cache.peek().map(|v| v.len()), Some(3));
        assert!(cache.is_fresh());
    }

    #[test]
    fn test_concurrent_readers_share_one_computation() {
        let cache = Arc::new(ResultCache::new(Duration::from_secs(60)));
        let calls = Arc::new(AtomicUsize::new(0));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let cache = Arc::clone(&cache);
                let calls = Arc::clone(&calls);
                thread::spawn(move || {
                    let value = cache
                        .get_or_compute(false, || {
                            calls.fetch_add(1, Ordering::SeqCst);
                            thread::sleep(Duration::from_millis(20));
                            Ok::<_, String>(42)
                        })
                        .unwrap();
                    *value
                })
            })
            .collect();

        for handle in handles {
            assert_eq!(handle.join().unwrap(), 42);
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_invalidate() {
        let cache = ResultCache::<u8>::default();
        cache.get_or_compute(false, || Ok::<_, String>(1)).unwrap();
        cache.invalidate();
        assert!(cache.peek().is_none());
        assert_eq!(cache.ttl(), DEFAULT_TTL);
    }
}
