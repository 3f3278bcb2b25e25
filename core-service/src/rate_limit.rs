//! Minimum spacing between calls through a front-door entry point.

use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::debug;

/// Enforces `min_interval` between consecutive `acquire` returns.
///
/// Callers queue on the internal lock, so concurrent callers are released
/// one interval apart. A zero interval disables limiting.
pub struct RateLimiter {
    name: &'static str,
    min_interval: Duration,
    last_call: Mutex<Option<Instant>>,
}

impl RateLimiter {
    pub fn new(name: &'static str, min_interval: Duration) -> Self {
        Self {
            name,
            min_interval,
            last_call: Mutex::new(None),
        }
    }

    pub fn min_interval(&self) -> Duration {
        self.min_interval
    }

    pub fn is_enabled(&self) -> bool {
        !self.min_interval.is_zero()
    }

    pub async fn acquire(&self) {
        if !self.is_enabled() {
            return;
        }

        let mut last_call = self.last_call.lock().await;
        if let Some(last) = *last_call {
            let elapsed = last.elapsed();
            if elapsed < self.min_interval {
                let wait_time = self.min_interval - elapsed;
                debug!(limiter = self.name, "Rate limiting: waiting {:?}", wait_time);
                tokio::time::sleep(wait_time).await;
            }
        }
        *last_call = Some(Instant::now());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[tokio::test(start_paused = true)]
    async fn test_spaces_consecutive_calls() {
        let limiter = RateLimiter::new("link", Duration::from_secs(1));
        let start = Instant::now();

        limiter.acquire().await;
        assert!(start.elapsed() < Duration::from_millis(10));

        limiter.acquire().await;
        assert!(start.elapsed() >= Duration::from_secs(1));
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_callers_are_released_in_turn() {
        let limiter = Arc::new(RateLimiter::new("list", Duration::from_millis(250)));
        let start = Instant::now();

        let tasks: Vec<_> = (0..4)
            .map(|_| {
                let limiter = Arc::clone(&limiter);
                tokio::spawn(async move {
                    limiter.acquire().await;
                    Instant::now()
                })
            })
            .collect();

        let mut released = Vec::new();
        for task in tasks {
            released.push(task.await.unwrap());
        }
        released.sort();

        assert!(released[3] - start >= Duration::from_millis(750));
        for pair in released.windows(2) {
            assert!(pair[1] - pair[0] >= Duration::from_millis(250));
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_zero_interval_disables() {
        let limiter = RateLimiter::new("list", Duration::ZERO);
        let start = Instant::now();

        for _ in 0..10 {
            limiter.acquire().await;
        }

        assert!(!limiter.is_enabled());
        assert_eq!(start.elapsed(), Duration::ZERO);
    }
}
