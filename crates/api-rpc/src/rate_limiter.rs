//! Token bucket rate limiter for mutating RPC methods

use std::sync::Mutex;
use std::time::Instant;

pub const DEFAULT_BURST: u32 = 20;
pub const DEFAULT_RATE_PER_SEC: u32 = 5;

struct Bucket {
    tokens: f64,
    refilled_at: Instant,
}

pub struct RateLimiter {
    bucket: Mutex<Bucket>,
    burst: f64,
    rate_per_sec: f64,
}

impl RateLimiter {
    /// `burst` requests at once, refilled at `rate_per_sec`
    pub fn new(burst: u32, rate_per_sec: u32) -> Self {
        let burst = f64::from(burst.max(1));
        Self {
            bucket: Mutex::new(Bucket {
                tokens: burst,
                refilled_at: Instant::now(),
            }),
            burst,
            rate_per_sec: f64::from(rate_per_sec),
        }
    }

    /// Take one token; false when the caller should be throttled
    pub fn try_acquire(&self) -> bool {
        let mut bucket = match self.bucket.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };

        let now = Instant::now();
        let elapsed = now.duration_since(bucket.refilled_at).as_secs_f64();
        bucket.tokens = (bucket.tokens + elapsed * self.rate_per_sec).min(self.burst);
        bucket.refilled_at = now;

        if bucket.tokens >= 1.0 {
            bucket.tokens -= 1.0;
            true
        } else {
            false
        }
    }
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new(DEFAULT_BURST, DEFAULT_RATE_PER_SEC)
    }
}
