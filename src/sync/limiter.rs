//! Client-side rate limiter for the downstream API: a rolling window cap
//! plus a minimum gap between consecutive calls.

use std::collections::VecDeque;
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::debug;

use crate::util::env::env_parse;

pub struct RateLimiter {
    cap: usize,
    window: Duration,
    min_gap: Duration,
    state: Mutex<LimiterState>,
}

struct LimiterState {
    calls: VecDeque<Instant>,
    last_call: Option<Instant>,
}

impl RateLimiter {
    pub fn new(cap: usize, window: Duration, min_gap: Duration) -> Self {
        Self {
            // a zero cap would never grant a slot
            cap: cap.max(1),
            window,
            min_gap,
            state: Mutex::new(LimiterState {
                calls: VecDeque::new(),
                last_call: None,
            }),
        }
    }

    /// `SYNC_CALLS_PER_MINUTE` over a fixed 60s window, with
    /// `SYNC_MIN_DELAY_MS` between consecutive calls.
    pub fn from_env() -> Self {
        Self::new(
            env_parse("SYNC_CALLS_PER_MINUTE", 30),
            Duration::from_secs(60),
            Duration::from_millis(env_parse("SYNC_MIN_DELAY_MS", 500)),
        )
    }

    /// Waits until a slot is free, records the call and returns. Sleeps
    /// happen outside the lock so other holders are not blocked.
    pub async fn acquire(&self) {
        loop {
            let wait = {
                let mut state = self.state.lock().await;
                let now = Instant::now();
                while let Some(front) = state.calls.front() {
                    if now.duration_since(*front) >= self.window {
                        state.calls.pop_front();
                    } else {
                        break;
                    }
                }

                if state.calls.len() >= self.cap {
                    state
                        .calls
                        .front()
                        .map(|oldest| self.window.saturating_sub(now.duration_since(*oldest)))
                } else {
                    let gap_wait = state.last_call.and_then(|last| {
                        let since = now.duration_since(last);
                        (since < self.min_gap).then(|| self.min_gap - since)
                    });
                    match gap_wait {
                        Some(gap) => Some(gap),
                        None => {
                            state.calls.push_back(now);
                            state.last_call = Some(now);
                            None
                        }
                    }
                }
            };
            match wait {
                Some(delay) => {
                    let delay = delay.max(Duration::from_millis(5));
                    debug!(?delay, "rate limit reached, waiting");
                    tokio::time::sleep(delay).await;
                }
                None => return,
            }
        }
    }
}
