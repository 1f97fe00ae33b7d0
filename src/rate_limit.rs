//! Catalog request pacing with adaptive backoff.
//!
//! The limiter is an explicit object owned by the catalog client and
//! injected by the caller — never process-global state.

use std::time::{Duration, Instant};

/// Enforces a minimum interval between requests. Failures double the
/// interval (up to a cap); enough consecutive successes halve it back
/// toward the base.
pub struct RateLimiter {
    name: String,
    last_request: Option<Instant>,
    current_interval: Duration,
    base_interval: Duration,
    max_interval: Duration,
    success_count: u32,
    successes_to_reduce: u32,
}

impl RateLimiter {
    /// * `name` — label for log messages (e.g. "catalog")
    /// * `base_interval` — minimum time between requests
    /// * `max_interval` — upper bound after repeated failures
    /// * `successes_to_reduce` — consecutive successes before halving the
    ///   interval (0 disables adaptive reduction)
    pub fn new(
        name: &str,
        base_interval: Duration,
        max_interval: Duration,
        successes_to_reduce: u32,
    ) -> Self {
        RateLimiter {
            name: name.to_string(),
            last_request: None,
            current_interval: base_interval,
            base_interval,
            max_interval,
            success_count: 0,
            successes_to_reduce,
        }
    }

    /// Convenience: base interval in milliseconds, max = 16× base, reduce
    /// after 10 consecutive successes.
    pub fn from_millis(name: &str, millis: u64) -> Self {
        let base = Duration::from_millis(millis);
        Self::new(name, base, base * 16, 10)
    }

    /// Sleep until the interval since the last request has elapsed.
    /// Must be called *before* making a request.
    pub async fn wait_if_needed(&mut self) {
        if let Some(last) = self.last_request {
            let elapsed = last.elapsed();
            if elapsed < self.current_interval {
                let wait_time = self.current_interval - elapsed;
                log::debug!(
                    "[{}] rate limiting: waiting {:.1}s",
                    self.name,
                    wait_time.as_secs_f64()
                );
                tokio::time::sleep(wait_time).await;
            }
        }
        self.last_request = Some(Instant::now());
    }

    /// Report a successful request. After enough consecutive successes the
    /// interval is halved (down to the base).
    pub fn report_success(&mut self) {
        if self.successes_to_reduce == 0 {
            return;
        }

        self.success_count += 1;

        if self.success_count >= self.successes_to_reduce
            && self.current_interval > self.base_interval
        {
            self.current_interval = (self.current_interval / 2).max(self.base_interval);
            log::info!(
                "[{}] rate limit reduced to {:.1}s after {} successes",
                self.name,
                self.current_interval.as_secs_f64(),
                self.success_count
            );
            self.success_count = 0;
        }
    }

    /// Report a failed request. Doubles the interval (up to the max).
    pub fn report_failure(&mut self) {
        self.current_interval = (self.current_interval * 2).min(self.max_interval);
        log::info!(
            "[{}] rate limit increased to {:.1}s due to error",
            self.name,
            self.current_interval.as_secs_f64()
        );
        self.success_count = 0;
    }

    pub fn current_interval(&self) -> Duration {
        self.current_interval
    }
}
