//! Client-side rate limiting
//!
//! Mirrors the provider's published limits: 100 requests per 10 seconds
//! and 200,000 requests per day. Callers are never rejected; `acquire`
//! waits until both windows have room.

use std::collections::VecDeque;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use super::error::{GhlError, Result};

/// Burst limit enforced by the provider
pub const SHORT_WINDOW_LIMIT: u32 = 100;
pub const SHORT_WINDOW_DURATION: Duration = Duration::from_secs(10);

/// Daily limit enforced by the provider
pub const DAILY_WINDOW_LIMIT: u32 = 200_000;
pub const DAILY_WINDOW_DURATION: Duration = Duration::from_secs(86_400);

/// Admissions closer together than `duration / BUCKETS_PER_WINDOW` share a bucket
const BUCKETS_PER_WINDOW: u32 = 1_000;

/// Admissions grouped by time; a bucket expires `duration` after its last admission
#[derive(Debug, Clone, Copy)]
struct Bucket {
    first: Instant,
    last: Instant,
    count: u32,
}

/// Sliding-window counter: every span of `duration` holds at most `limit` admissions
#[derive(Debug, Clone)]
pub struct RateWindow {
    buckets: VecDeque<Bucket>,
    count: u32,
    limit: u32,
    duration: Duration,
    resolution: Duration,
}

impl RateWindow {
    pub fn new(limit: u32, duration: Duration) -> Self {
        Self {
            buckets: VecDeque::new(),
            count: 0,
            limit: limit.max(1),
            duration,
            resolution: duration / BUCKETS_PER_WINDOW,
        }
    }

    /// Drop buckets whose newest admission has left the window
    fn expire(&mut self, now: Instant) {
        while let Some(front) = self.buckets.front() {
            if front.last + self.duration > now {
                break;
            }
            self.count -= front.count;
            self.buckets.pop_front();
        }
    }

    /// How long the caller must wait before this window admits another request
    pub fn wait_time(&mut self, now: Instant) -> Option<Duration> {
        self.expire(now);
        if self.count < self.limit {
            return None;
        }
        self.buckets
            .front()
            .map(|front| (front.last + self.duration).saturating_duration_since(now))
    }

    fn record(&mut self, now: Instant) {
        self.count += 1;
        if let Some(back) = self.buckets.back_mut() {
            if now.saturating_duration_since(back.first) < self.resolution {
                back.last = back.last.max(now);
                back.count += 1;
                return;
            }
        }
        self.buckets.push_back(Bucket {
            first: now,
            last: now,
            count: 1,
        });
    }

    pub fn count(&self) -> u32 {
        self.count
    }

    pub fn limit(&self) -> u32 {
        self.limit
    }
}

/// Admission control shared by every request of one process.
///
/// The window check, any wait and the increment all happen under one
/// lock, so concurrent callers are admitted strictly one at a time.
#[derive(Debug)]
pub struct RateLimiter {
    windows: Mutex<[RateWindow; 2]>,
}

impl RateLimiter {
    pub fn new() -> Self {
        Self::with_limits(
            (SHORT_WINDOW_LIMIT, SHORT_WINDOW_DURATION),
            (DAILY_WINDOW_LIMIT, DAILY_WINDOW_DURATION),
        )
    }

    /// Build a limiter with custom `(limit, duration)` pairs for the short and daily windows
    pub fn with_limits(short: (u32, Duration), daily: (u32, Duration)) -> Self {
        Self {
            windows: Mutex::new([
                RateWindow::new(short.0, short.1),
                RateWindow::new(daily.0, daily.1),
            ]),
        }
    }

    /// Wait until both windows have capacity, then count one request against them
    pub async fn acquire(&self) {
        let mut windows = self.windows.lock().await;
        let now = loop {
            let now = Instant::now();
            let wait = windows.iter_mut().filter_map(|w| w.wait_time(now)).max();
            match wait {
                Some(delay) => {
                    tracing::warn!("Local rate limit reached, waiting {:?}", delay);
                    tokio::time::sleep(delay).await;
                }
                None => break now,
            }
        };
        for window in windows.iter_mut() {
            window.record(now);
        }
    }

    /// Like [`acquire`](Self::acquire) but gives up when `cancel` fires
    pub async fn acquire_cancellable(&self, cancel: &CancellationToken) -> Result<()> {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(GhlError::Cancelled),
            _ = self.acquire() => Ok(()),
        }
    }

    /// Requests counted in the current short and daily windows
    pub async fn usage(&self) -> (u32, u32) {
        let mut windows = self.windows.lock().await;
        let now = Instant::now();
        for window in windows.iter_mut() {
            window.expire(now);
        }
        (windows[0].count(), windows[1].count())
    }
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::sync::Arc;

    #[tokio::test(start_paused = true)]
    async fn test_first_hundred_requests_are_immediate() {
        let limiter = RateLimiter::new();
        let start = Instant::now();
        for _ in 0..SHORT_WINDOW_LIMIT {
            limiter.acquire().await;
        }
        assert_eq!(start.elapsed(), Duration::ZERO);
        assert_eq!(limiter.usage().await, (100, 100));
    }

    #[tokio::test(start_paused = true)]
    async fn test_request_over_limit_waits_for_window() {
        let limiter = RateLimiter::new();
        let start = Instant::now();
        for _ in 0..=SHORT_WINDOW_LIMIT {
            limiter.acquire().await;
        }
        assert!(start.elapsed() >= SHORT_WINDOW_DURATION);
        // The 101st request opened a fresh short window
        assert_eq!(limiter.usage().await, (1, 101));
    }

    #[tokio::test(start_paused = true)]
    async fn test_daily_window_blocks_even_when_short_window_is_free() {
        let limiter = RateLimiter::with_limits(
            (10, Duration::from_secs(1)),
            (15, Duration::from_secs(60)),
        );
        let start = Instant::now();
        for _ in 0..15 {
            limiter.acquire().await;
        }
        let before_daily = start.elapsed();
        assert!(before_daily < Duration::from_secs(60));

        limiter.acquire().await;
        assert!(start.elapsed() >= Duration::from_secs(60));
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_callers_never_overshoot() {
        let limiter = Arc::new(RateLimiter::with_limits(
            (5, Duration::from_secs(10)),
            (1_000, Duration::from_secs(86_400)),
        ));
        let start = Instant::now();

        let mut handles = Vec::new();
        for _ in 0..12 {
            let limiter = limiter.clone();
            handles.push(tokio::spawn(async move {
                limiter.acquire().await;
                Instant::now()
            }));
        }

        let mut admitted = Vec::new();
        for handle in handles {
            admitted.push(handle.await.unwrap());
        }

        let in_first_window = admitted
            .iter()
            .filter(|t| t.duration_since(start) < Duration::from_secs(10))
            .count();
        assert_eq!(in_first_window, 5);
        let in_second_window = admitted
            .iter()
            .filter(|t| {
                let d = t.duration_since(start);
                d >= Duration::from_secs(10) && d < Duration::from_secs(20)
            })
            .count();
        assert_eq!(in_second_window, 5);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancelled_while_waiting() {
        let limiter = RateLimiter::with_limits(
            (1, Duration::from_secs(3_600)),
            (100, Duration::from_secs(86_400)),
        );
        limiter.acquire().await;

        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(1)).await;
            trigger.cancel();
        });

        let result = limiter.acquire_cancellable(&cancel).await;
        assert!(matches!(result, Err(GhlError::Cancelled)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_no_burst_across_window_boundary() {
        let limiter = RateLimiter::new();
        let start = Instant::now();
        let mut admitted = vec![start];
        limiter.acquire().await;

        tokio::time::advance(Duration::from_millis(9_900)).await;
        for _ in 0..199 {
            limiter.acquire().await;
            admitted.push(Instant::now());
        }

        for (i, t) in admitted.iter().enumerate() {
            let within = admitted[i..]
                .iter()
                .take_while(|u| u.duration_since(*t) < SHORT_WINDOW_DURATION)
                .count();
            assert!(within <= SHORT_WINDOW_LIMIT as usize, "{within} admitted within 10s");
        }
        // 99 fit beside the first request, the rest waited for it to expire
        assert!(start.elapsed() >= SHORT_WINDOW_DURATION);
    }

    proptest! {
        /// Admitting requests only when `wait_time` is None never lets more
        /// than `limit` through inside any window of `duration`.
        #[test]
        fn prop_window_never_exceeds_limit(
            limit in 1u32..20,
            gaps in prop::collection::vec(0u64..400, 1..200),
        ) {
            let base = Instant::now();
            let duration = Duration::from_millis(1_000);
            let mut window = RateWindow::new(limit, duration);
            let mut now = base;
            let mut admitted: Vec<Instant> = Vec::new();

            for gap in gaps {
                now += Duration::from_millis(gap);
                if let Some(wait) = window.wait_time(now) {
                    now += wait;
                    prop_assert!(window.wait_time(now).is_none());
                }
                window.record(now);
                admitted.push(now);
                prop_assert!(window.count() <= window.limit());
            }

            for (i, t) in admitted.iter().enumerate() {
                let within = admitted[i..]
                    .iter()
                    .take_while(|u| u.duration_since(*t) < duration)
                    .count();
                prop_assert!(within <= limit as usize);
            }
        }

        /// Bucketing never holds more entries than the window has slices
        #[test]
        fn prop_daily_window_memory_is_bounded(gaps in prop::collection::vec(0u64..600, 1..3_000)) {
            let mut window = RateWindow::new(DAILY_WINDOW_LIMIT, DAILY_WINDOW_DURATION);
            let mut now = Instant::now();
            for gap in gaps {
                now += Duration::from_secs(gap);
                prop_assert!(window.wait_time(now).is_none());
                window.record(now);
                prop_assert!(window.buckets.len() <= BUCKETS_PER_WINDOW as usize + 2);
            }
        }
    }
}
