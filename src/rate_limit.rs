use std::collections::VecDeque;
use std::sync::Mutex;
use std::thread;
use std::time::{Duration, Instant};

/// Sliding-window limiter: at most `max_calls` acquisitions in any `window`.
#[derive(Debug)]
pub struct RateLimiter {
    calls: Mutex<VecDeque<Instant>>,
    max_calls: usize,
    window: Duration,
}

impl RateLimiter {
    pub fn new(max_calls: usize, window: Duration) -> Self {
        Self {
            calls: Mutex::new(VecDeque::new()),
            max_calls: max_calls.max(1),
            window,
        }
    }

    pub fn per_second(max_calls: usize) -> Self {
        Self::new(max_calls, Duration::from_secs(1))
    }

    /// Block until a call fits in the window, then record it.
    pub fn acquire(&self) {
        loop {
            let wait = {
                let mut calls = self
                    .calls
                    .lock()
                    .unwrap_or_else(|poisoned| poisoned.into_inner());
                let now = Instant::now();
                while calls
                    .front()
                    .is_some_and(|t| now.duration_since(*t) >= self.window)
                {
                    calls.pop_front();
                }
                if calls.len() < self.max_calls {
                    calls.push_back(now);
                    return;
                }
                match calls.front() {
                    Some(oldest) => self.window.saturating_sub(now.duration_since(*oldest)),
                    None => Duration::ZERO,
                }
            };
            tracing::debug!("asset rate limit reached, waiting {wait:?}");
            thread::sleep(wait);
        }
    }
}
