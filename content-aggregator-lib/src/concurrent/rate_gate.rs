//! Admission control for outbound fetches.
//!
//! Implements a token bucket shared by every worker of a pipeline. Permits
//! refill at a steady rate up to a burst capacity; a worker that finds the
//! bucket empty sleeps until the next permit is due or its cancellation
//! token fires.

use crate::error::AggregatorError;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::trace;

/// Permit state guarded by the gate's mutex.
#[derive(Debug)]
struct Bucket {
    /// Current number of permits (fractional while refilling).
    tokens: f64,
    /// Last refill time.
    last_refill: Instant,
}

impl Bucket {
    fn refill(&mut self, rate: f64, burst: f64) {
        let now = Instant::now();
        let elapsed = now.duration_since(self.last_refill);
        self.tokens = (self.tokens + elapsed.as_secs_f64() * rate).min(burst);
        self.last_refill = now;
    }
}

/// Token-bucket rate gate.
///
/// The bucket starts full, so the first `burst` acquisitions succeed
/// immediately and later ones are spaced `1 / permits_per_second` apart.
#[derive(Debug)]
pub struct RateGate {
    bucket: Mutex<Bucket>,
    permits_per_second: f64,
    burst: u32,
}

impl RateGate {
    /// Create a gate refilling at `permits_per_second` with room for `burst` permits.
    ///
    /// # Errors
    ///
    /// Returns [`AggregatorError::InvalidRate`] if the rate is not a positive
    /// finite number or the burst is zero.
    pub fn new(permits_per_second: f64, burst: u32) -> Result<Self, AggregatorError> {
        if !permits_per_second.is_finite() || permits_per_second <= 0.0 || burst == 0 {
            return Err(AggregatorError::InvalidRate {
                permits_per_second,
                burst,
            });
        }

        Ok(Self {
            bucket: Mutex::new(Bucket {
                tokens: f64::from(burst),
                last_refill: Instant::now(),
            }),
            permits_per_second,
            burst,
        })
    }

    /// Steady-state refill rate.
    pub fn permits_per_second(&self) -> f64 {
        self.permits_per_second
    }

    /// Burst capacity.
    pub fn burst(&self) -> u32 {
        self.burst
    }

    /// Take a permit if one is available right now.
    pub async fn try_acquire(&self) -> bool {
        let mut bucket = self.bucket.lock().await;
        bucket.refill(self.permits_per_second, f64::from(self.burst));
        if bucket.tokens >= 1.0 {
            bucket.tokens -= 1.0;
            true
        } else {
            false
        }
    }

    /// Wait for a permit.
    ///
    /// Returns how long the caller waited.
    ///
    /// # Errors
    ///
    /// Returns [`AggregatorError::RateLimitExceeded`] when `cancel` fires
    /// (or has already fired) before a permit is granted. No permit is
    /// consumed in that case.
    ///
    /// # Cancel Safety
    ///
    /// The mutex is never held across the sleep, so dropping the future
    /// leaves the bucket consistent.
    pub async fn acquire(&self, cancel: &CancellationToken) -> Result<Duration, AggregatorError> {
        if cancel.is_cancelled() {
            return Err(AggregatorError::rate_limited(
                "cancelled before a permit was available",
            ));
        }

        let mut total_wait = Duration::ZERO;

        loop {
            let wait = {
                let mut bucket = self.bucket.lock().await;
                bucket.refill(self.permits_per_second, f64::from(self.burst));

                if bucket.tokens >= 1.0 {
                    bucket.tokens -= 1.0;
                    return Ok(total_wait);
                }

                Duration::from_secs_f64((1.0 - bucket.tokens) / self.permits_per_second)
            };

            trace!(wait = ?wait, "rate gate closed, waiting for next permit");

            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    return Err(AggregatorError::rate_limited(format!(
                        "cancelled after waiting {:?} for a permit",
                        total_wait
                    )));
                }
                _ = tokio::time::sleep(wait) => {
                    total_wait += wait;
                }
            }
        }
    }

    /// Permits currently available (fractional while refilling).
    pub async fn available_permits(&self) -> f64 {
        let mut bucket = self.bucket.lock().await;
        bucket.refill(self.permits_per_second, f64::from(self.burst));
        bucket.tokens
    }
}
