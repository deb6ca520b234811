//! Request and token budgeting for rate-limited inference backends.
//!
//! One [`RateLimiter`] is shared (behind an `Arc`) by every task that talks
//! to a backend. It keeps two token buckets that refill continuously over a
//! one-minute window:
//!
//! | Bucket | Capacity | Cost per call |
//! |--------|----------|---------------|
//! | requests | `requests_per_minute` | 1 |
//! | tokens | `tokens_per_minute` | estimated tokens, reconciled afterwards |
//!
//! Callers queue on a fair (FIFO) async mutex, so the caller at the head of
//! the queue sleeps until whichever bucket is scarcer has room and nobody
//! behind it can jump ahead. Time comes from `tokio::time`, which lets tests
//! drive the limiter on a paused clock.
//!
//! [`RateLimiter::call_with_retry`] wraps one backend call: it acquires a
//! permit, runs the call, reconciles the token estimate against reported
//! usage, and retries throttled or timed-out calls with capped exponential
//! backoff plus jitter.

use std::future::Future;
use std::sync::Mutex as StdMutex;
use std::time::Duration;

use project_indexer_core::error::BackendError;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::config::RateLimitConfig;

const WINDOW_SECS: f64 = 60.0;

#[derive(Debug, Clone)]
pub struct RateLimitSettings {
    pub requests_per_minute: u32,
    pub tokens_per_minute: u64,
    pub max_retries: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl From<&RateLimitConfig> for RateLimitSettings {
    fn from(c: &RateLimitConfig) -> Self {
        Self {
            requests_per_minute: c.requests_per_minute,
            tokens_per_minute: c.tokens_per_minute,
            max_retries: c.max_retries,
            base_delay: Duration::from_millis(c.base_delay_ms),
            max_delay: Duration::from_millis(c.max_delay_ms),
        }
    }
}

/// Output of a metered backend call.
#[derive(Debug, Clone)]
pub struct Metered<T> {
    pub value: T,
    /// Tokens the backend reports it consumed, when it reports usage.
    pub tokens_used: Option<u64>,
}

impl<T> Metered<T> {
    pub fn new(value: T, tokens_used: Option<u64>) -> Self {
        Self { value, tokens_used }
    }
}

/// Proof of admission. Hand it back to [`RateLimiter::release_actual`].
#[derive(Debug)]
#[must_use]
pub struct RatePermit {
    charged_tokens: u64,
}

impl RatePermit {
    pub fn charged_tokens(&self) -> u64 {
        self.charged_tokens
    }
}

#[derive(Debug)]
struct Bucket {
    capacity: f64,
    available: f64,
    refill_per_sec: f64,
}

impl Bucket {
    fn full(per_minute: f64) -> Self {
        let capacity = per_minute.max(1.0);
        Self {
            capacity,
            available: capacity,
            refill_per_sec: capacity / WINDOW_SECS,
        }
    }

    fn refill(&mut self, elapsed_secs: f64) {
        if elapsed_secs > 0.0 {
            self.available = (self.available + elapsed_secs * self.refill_per_sec).min(self.capacity);
        }
    }

    /// Time until `amount` is available, zero if it already is.
    fn wait_for(&self, amount: f64) -> Duration {
        let deficit = amount - self.available;
        if deficit <= 0.0 {
            Duration::ZERO
        } else {
            Duration::from_secs_f64(deficit / self.refill_per_sec)
        }
    }
}

#[derive(Debug)]
struct Budgets {
    requests: Bucket,
    tokens: Bucket,
    last_refill: Instant,
}

impl Budgets {
    fn refill(&mut self) {
        let now = Instant::now();
        let elapsed = now.duration_since(self.last_refill).as_secs_f64();
        self.requests.refill(elapsed);
        self.tokens.refill(elapsed);
        self.last_refill = now;
    }
}

#[derive(Debug)]
pub struct RateLimiter {
    settings: RateLimitSettings,
    /// Fair admission queue. Held by the caller at the head while it waits.
    queue: Mutex<()>,
    budgets: StdMutex<Budgets>,
}

impl RateLimiter {
    pub fn new(settings: RateLimitSettings) -> Self {
        let budgets = Budgets {
            requests: Bucket::full(settings.requests_per_minute as f64),
            tokens: Bucket::full(settings.tokens_per_minute as f64),
            last_refill: Instant::now(),
        };
        Self {
            settings,
            queue: Mutex::new(()),
            budgets: StdMutex::new(budgets),
        }
    }

    pub fn settings(&self) -> &RateLimitSettings {
        &self.settings
    }

    fn budgets(&self) -> std::sync::MutexGuard<'_, Budgets> {
        self.budgets.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Wait until both budgets have room for one request of
    /// `estimated_tokens`. Estimates above the token budget are clamped to
    /// it so oversized calls are still admitted once the bucket is full.
    pub async fn acquire(&self, estimated_tokens: u64) -> RatePermit {
        let charged = estimated_tokens.min(self.settings.tokens_per_minute.max(1));
        let _turn = self.queue.lock().await;

        loop {
            let wait = {
                let mut b = self.budgets();
                b.refill();
                let wait = b
                    .requests
                    .wait_for(1.0)
                    .max(b.tokens.wait_for(charged as f64));
                if wait.is_zero() {
                    b.requests.available -= 1.0;
                    b.tokens.available -= charged as f64;
                    return RatePermit {
                        charged_tokens: charged,
                    };
                }
                wait
            };
            debug!(wait_ms = wait.as_millis() as u64, "rate limiter waiting for budget");
            tokio::time::sleep(wait).await;
        }
    }

    /// Reconcile a permit's estimate with what the call actually cost:
    /// over-estimates are refunded, under-estimates charged.
    pub fn release_actual(&self, permit: RatePermit, actual_tokens: u64) {
        let diff = actual_tokens as f64 - permit.charged_tokens as f64;
        if diff == 0.0 {
            return;
        }
        let mut b = self.budgets();
        b.refill();
        b.tokens.available = (b.tokens.available - diff).min(b.tokens.capacity);
    }

    /// Backoff before retry `attempt` (1-based): `base * 2^(attempt-1)`,
    /// capped at `max_delay`, then jittered into `[cap/2, cap]`.
    pub fn backoff_delay(&self, attempt: u32) -> Duration {
        let exp = attempt.saturating_sub(1).min(16);
        let raw = self.settings.base_delay.saturating_mul(1u32 << exp);
        let capped = raw.min(self.settings.max_delay);
        let half = capped / 2;
        half + half.mul_f64(jitter_fraction())
    }

    /// Run one backend call under the limiter, retrying transient failures.
    ///
    /// `call` is invoked once per attempt. Throttled and timed-out attempts
    /// are retried up to `max_retries` times; any other error returns
    /// immediately. After the final attempt the last transient error is
    /// returned with the attempt count appended.
    pub async fn call_with_retry<T, F, Fut>(
        &self,
        estimated_tokens: u64,
        mut call: F,
    ) -> Result<T, BackendError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<Metered<T>, BackendError>>,
    {
        let mut attempt: u32 = 0;
        loop {
            let permit = self.acquire(estimated_tokens).await;
            match call().await {
                Ok(out) => {
                    let actual = out.tokens_used.unwrap_or(permit.charged_tokens());
                    self.release_actual(permit, actual);
                    return Ok(out.value);
                }
                Err(e) if e.is_retryable() && attempt < self.settings.max_retries => {
                    drop(permit);
                    attempt += 1;
                    let delay = self.backoff_delay(attempt);
                    warn!(
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "retrying backend call"
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(e) if e.is_retryable() => {
                    drop(permit);
                    let attempts = attempt + 1;
                    return Err(match e {
                        BackendError::Throttled(m) => {
                            BackendError::Throttled(format!("{m} (after {attempts} attempts)"))
                        }
                        BackendError::Timeout(m) => {
                            BackendError::Timeout(format!("{m} (after {attempts} attempts)"))
                        }
                        other => other,
                    });
                }
                Err(e) => {
                    drop(permit);
                    return Err(e);
                }
            }
        }
    }
}

/// Uniform value in `[0, 1)` for backoff jitter.
///
/// The low 62 bits of a v4 UUID are random (the variant occupies the two
/// bits above them), so 53 of those bits make an evenly spread `f64`.
fn jitter_fraction() -> f64 {
    let random = (uuid::Uuid::new_v4().as_u128() as u64) & ((1u64 << 62) - 1);
    (random >> 9) as f64 / (1u64 << 53) as f64
}
