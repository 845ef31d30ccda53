// SPDX-FileCopyrightText: 2025 Joost van der Laan <joost@fashionunited.com>
//
// SPDX-License-Identifier: AGPL-3.0-only

//! Per-key minimum-interval gate.
//!
//! Call sites share one limiter and pick a key per upstream API. A caller
//! waits until `interval + jitter` has passed since the previous call under
//! the same key. There is no fairness between waiters: whoever re-checks
//! first after the delay wins, the jitter spreads wake-ups apart.

use rand::Rng;
use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::{sleep, Instant};
use tracing::trace;

#[derive(Debug)]
pub struct RateLimiter {
    interval: Duration,
    max_jitter: Duration,
    overrides: HashMap<String, Duration>,
    last_call: Mutex<HashMap<String, Instant>>,
}

impl RateLimiter {
    pub fn new(interval: Duration, max_jitter: Duration) -> Self {
        Self {
            interval,
            max_jitter,
            overrides: HashMap::new(),
            last_call: Mutex::new(HashMap::new()),
        }
    }

    /// Use a different interval for one key
    pub fn with_interval(mut self, key: &str, interval: Duration) -> Self {
        self.overrides.insert(key.to_string(), interval);
        self
    }

    pub fn interval_for(&self, key: &str) -> Duration {
        self.overrides.get(key).copied().unwrap_or(self.interval)
    }

    fn jitter(&self) -> Duration {
        if self.max_jitter.is_zero() {
            return Duration::ZERO;
        }
        let ms = rand::thread_rng().gen_range(0..=self.max_jitter.as_millis() as u64);
        Duration::from_millis(ms)
    }

    pub async fn acquire(&self, key: &str) {
        let required = self.interval_for(key) + self.jitter();
        loop {
            let wait = {
                let mut last_call = self.last_call.lock().await;
                let now = Instant::now();
                match last_call.get(key) {
                    Some(last) if now.duration_since(*last) < required => {
                        required - now.duration_since(*last)
                    }
                    _ => {
                        last_call.insert(key.to_string(), now);
                        return;
                    }
                }
            };
            trace!("Rate limiting {} for {:?}", key, wait);
            sleep(wait).await;
        }
    }
}
