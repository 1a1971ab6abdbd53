//! Fixed-window request limiter with a quota penalty.
//! 10 requests per 60s window. Callers over the ceiling are delayed, never
//! rejected. A quota error from upstream blocks every caller for 5 minutes.

use std::time::Duration;

use parking_lot::Mutex;
use tokio::time::Instant;
use tracing::{info, warn};

pub const REQUESTS_PER_MINUTE: u32 = 10;
pub const RATE_WINDOW: Duration = Duration::from_secs(60);
pub const QUOTA_PENALTY: Duration = Duration::from_secs(5 * 60);

struct RateLimitState {
    window_start: Instant,
    request_count: u32,
    penalty_until: Option<Instant>,
}

/// Point-in-time view of the limiter, for diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitSnapshot {
    pub request_count: u32,
    pub window_remaining: Duration,
    pub penalty_remaining: Option<Duration>,
}

pub struct RateLimiter {
    state: Mutex<RateLimitState>,
    max_requests: u32,
    window: Duration,
    penalty: Duration,
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new(REQUESTS_PER_MINUTE, RATE_WINDOW, QUOTA_PENALTY)
    }
}

impl RateLimiter {
    pub fn new(max_requests: u32, window: Duration, penalty: Duration) -> Self {
        Self {
            state: Mutex::new(RateLimitState {
                window_start: Instant::now(),
                request_count: 0,
                penalty_until: None,
            }),
            max_requests: max_requests.max(1),
            window,
            penalty,
        }
    }

    /// Wait until a request may be dispatched, then count it.
    ///
    /// The lock is never held across the sleep; waiters re-check the state
    /// after waking, so callers that wake together cannot overrun a window.
    pub async fn acquire(&self) {
        loop {
            match self.try_acquire() {
                Ok(()) => return,
                Err(wait) => {
                    warn!(
                        wait_ms = wait.as_millis() as u64,
                        "rate limit reached, delaying request"
                    );
                    tokio::time::sleep(wait).await;
                }
            }
        }
    }

    /// Count a dispatch if one is permitted now, else return how long to wait.
    fn try_acquire(&self) -> Result<(), Duration> {
        let mut state = self.state.lock();
        let now = Instant::now();

        if let Some(until) = state.penalty_until {
            if now < until {
                return Err(until - now);
            }
            state.penalty_until = None;
            state.window_start = now;
            state.request_count = 0;
            info!("quota penalty elapsed, rate window reset");
        }

        if now.saturating_duration_since(state.window_start) >= self.window {
            state.window_start = now;
            state.request_count = 0;
        }

        if state.request_count >= self.max_requests {
            return Err((state.window_start + self.window).saturating_duration_since(now));
        }

        state.request_count += 1;
        Ok(())
    }

    /// Upstream reported quota exhaustion: pin the counter and block all
    /// dispatches until the penalty has passed.
    pub fn report_quota_exceeded(&self) {
        let mut state = self.state.lock();
        let until = Instant::now() + self.penalty;
        state.penalty_until = Some(until);
        state.request_count = self.max_requests;
        warn!(
            penalty_secs = self.penalty.as_secs(),
            "quota exceeded, rate limiter penalty armed"
        );
    }

    pub fn snapshot(&self) -> RateLimitSnapshot {
        let state = self.state.lock();
        let now = Instant::now();
        let window_end = state.window_start + self.window;
        RateLimitSnapshot {
            request_count: state.request_count,
            window_remaining: window_end.saturating_duration_since(now),
            penalty_remaining: state
                .penalty_until
                .map(|until| until.saturating_duration_since(now))
                .filter(|d| !d.is_zero()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_waited(elapsed: Duration, expected: Duration) {
        assert!(
            elapsed >= expected && elapsed < expected + Duration::from_millis(5),
            "waited {elapsed:?}, expected about {expected:?}"
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_under_limit_does_not_wait() {
        let limiter = RateLimiter::default();
        let start = Instant::now();
        for _ in 0..REQUESTS_PER_MINUTE {
            limiter.acquire().await;
        }
        assert_eq!(start.elapsed(), Duration::ZERO);
        assert_eq!(limiter.snapshot().request_count, REQUESTS_PER_MINUTE);
    }

    #[tokio::test(start_paused = true)]
    async fn test_eleventh_call_is_delayed_not_rejected() {
        let limiter = RateLimiter::default();
        let start = Instant::now();
        for _ in 0..REQUESTS_PER_MINUTE {
            limiter.acquire().await;
        }
        tokio::time::advance(Duration::from_secs(15)).await;

        limiter.acquire().await;

        assert_waited(start.elapsed(), RATE_WINDOW);
        assert_eq!(limiter.snapshot().request_count, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_window_resets_after_elapsed() {
        let limiter = RateLimiter::default();
        for _ in 0..REQUESTS_PER_MINUTE {
            limiter.acquire().await;
        }
        tokio::time::advance(RATE_WINDOW).await;
        let before = Instant::now();
        limiter.acquire().await;
        assert_eq!(before.elapsed(), Duration::ZERO);
        assert_eq!(limiter.snapshot().request_count, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_quota_penalty_blocks_for_five_minutes() {
        let limiter = RateLimiter::default();
        limiter.acquire().await;
        limiter.report_quota_exceeded();

        let snap = limiter.snapshot();
        assert_eq!(snap.request_count, REQUESTS_PER_MINUTE);
        assert_eq!(snap.penalty_remaining, Some(QUOTA_PENALTY));

        let start = Instant::now();
        limiter.acquire().await;
        assert_waited(start.elapsed(), QUOTA_PENALTY);

        let snap = limiter.snapshot();
        assert_eq!(snap.request_count, 1);
        assert_eq!(snap.penalty_remaining, None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_waiters_never_overrun_window() {
        use std::sync::Arc;

        let limiter = Arc::new(RateLimiter::default());
        let start = Instant::now();
        let mut handles = Vec::new();
        for _ in 0..25 {
            let limiter = Arc::clone(&limiter);
            handles.push(tokio::spawn(async move {
                limiter.acquire().await;
                start.elapsed()
            }));
        }

        let mut elapsed = Vec::new();
        for h in handles {
            elapsed.push(h.await.unwrap());
        }
        elapsed.sort();

        // 10 immediately, 10 after one window, 5 after two.
        let per_window = |w: u32| {
            elapsed
                .iter()
                .filter(|d| **d >= RATE_WINDOW * w && **d < RATE_WINDOW * (w + 1))
                .count()
        };
        assert_eq!(per_window(0), 10);
        assert_eq!(per_window(1), 10);
        assert_eq!(per_window(2), 5);
    }
}
