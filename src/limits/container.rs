use std::num::NonZeroUsize;
use std::sync::{Mutex, PoisonError};
use std::time::Instant;

use lru::LruCache;

/// Objects that implement this interface can serve as token bucket
/// containers for the [`Usage`](super::Usage) filter.
///
/// Alternative backing stores (a shared cache, say) implement this trait;
/// the in-memory [`MemBucket`] is the default.
pub trait Container: Send + Sync {
    /// The max number of tokens per client.
    fn capacity(&self) -> u64;

    /// Take `n` tokens from the bucket for `key`. Returns the tokens left,
    /// the seconds until enough tokens are available, and whether the tokens
    /// were consumed.
    fn consume(&self, key: &str, n: u64) -> (u64, u64, bool);

    /// Fill up a bucket regardless of time or count.
    fn reset(&self, key: &str);
}

struct TokenBucket {
    tokens: u64,
    last_check: Instant,
}

/// In-memory [`Container`] backed by a bounded LRU of per-client buckets.
/// Suited to single-host deployments; safe for concurrent use.
///
/// Refill is lazy: each consume adds `rate × minutes-since-last-check`
/// tokens, clamped to capacity.
pub struct MemBucket {
    size: u64,
    rate: u64,
    cache: Mutex<LruCache<String, TokenBucket>>,
}

impl MemBucket {
    /// A container monitoring at most `max_keys` clients, each with
    /// `capacity` tokens refilled at `rate` tokens per minute.
    pub fn new(max_keys: usize, capacity: u64, rate: u64) -> Self {
        let max_keys = NonZeroUsize::new(max_keys).unwrap_or(NonZeroUsize::MIN);
        Self {
            size: capacity,
            rate: rate.max(1),
            cache: Mutex::new(LruCache::new(max_keys)),
        }
    }

    /// Seconds until `needed` tokens have been refilled.
    fn wait(&self, needed: u64) -> u64 {
        needed.div_ceil(self.rate) * 60
    }
}

impl Container for MemBucket {
    fn capacity(&self) -> u64 {
        self.size
    }

    fn consume(&self, key: &str, n: u64) -> (u64, u64, bool) {
        let mut cache = self.cache.lock().unwrap_or_else(PoisonError::into_inner);
        let now = Instant::now();

        if !cache.contains(key) {
            cache.put(
                key.to_string(),
                TokenBucket {
                    tokens: self.size,
                    last_check: now,
                },
            );
        }
        let bucket = cache.get_mut(key).expect("bucket present after fill");
        if bucket.tokens < self.size {
            let minutes = now.duration_since(bucket.last_check).as_secs_f64() / 60.0;
            let delta = (self.rate as f64 * minutes) as u64;
            bucket.tokens = self.size.min(bucket.tokens + delta);
        }
        bucket.last_check = now;

        if bucket.tokens < n {
            let missing = n - bucket.tokens;
            return (bucket.tokens, self.wait(missing), false);
        }
        bucket.tokens -= n;
        (bucket.tokens, self.wait(self.size), true)
    }

    fn reset(&self, key: &str) {
        let mut cache = self.cache.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(bucket) = cache.get_mut(key) {
            bucket.tokens = self.size;
            bucket.last_check = Instant::now();
        }
    }
}
