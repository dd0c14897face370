//! Fixed-window request limiting per caller.

use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use tokio::time::Instant;

use webextract_shared::{LimitsConfig, Result, WebExtractError};

/// Windows kept before expired ones are swept.
const SWEEP_THRESHOLD: usize = 1024;

#[derive(Debug, Clone, Copy)]
struct Window {
    started: Instant,
    count: u32,
}

/// Allows `max_requests` per caller in each window of length `window`.
#[derive(Debug)]
pub struct FixedWindowLimiter {
    max_requests: u32,
    window: Duration,
    windows: Mutex<HashMap<String, Window>>,
}

impl FixedWindowLimiter {
    pub fn new(max_requests: u32, window: Duration) -> Self {
        Self {
            max_requests,
            window,
            windows: Mutex::new(HashMap::new()),
        }
    }

    pub fn from_config(limits: &LimitsConfig) -> Self {
        Self::new(
            limits.rate_limit_requests,
            Duration::from_secs(limits.rate_limit_window_secs),
        )
    }

    /// Count one request for `caller`, failing once the window is exhausted.
    pub fn check(&self, caller: &str) -> Result<()> {
        let now = Instant::now();
        let mut windows = self.windows.lock().unwrap_or_else(PoisonError::into_inner);

        if windows.len() >= SWEEP_THRESHOLD {
            let window = self.window;
            windows.retain(|_, w| now.duration_since(w.started) < window);
        }

        let entry = windows.entry(caller.to_string()).or_insert(Window {
            started: now,
            count: 0,
        });
        if now.duration_since(entry.started) >= self.window {
            *entry = Window {
                started: now,
                count: 0,
            };
        }

        if entry.count >= self.max_requests {
            let remaining = self.window.saturating_sub(now.duration_since(entry.started));
            return Err(WebExtractError::RateLimited {
                retry_after_secs: remaining.as_secs_f64().ceil() as u64,
            });
        }
        entry.count += 1;
        Ok(())
    }
}
