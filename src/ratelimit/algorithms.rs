//! The three rate-limit algorithms over the storage abstraction: token
//! bucket, sliding window, fixed window. Each implements a common
//! `consume(key) -> (allowed, remaining, resetAt)` surface. See spec.md
//! §4.4 "Token bucket" / "Sliding window" / "Fixed window".

use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use serde_json::json;

use crate::error::FrameworkError;
use crate::ratelimit::config::{FixedWindowOptions, SlidingWindowOptions, TokenBucketOptions};
use crate::ratelimit::storage::RateLimitStore;

/// The outcome of one `consume` call, common across all three algorithms
/// (spec.md §4.4 "Common surface").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Decision {
    pub allowed: bool,
    pub remaining: u64,
    pub reset_at_epoch_sec: u64,
}

#[async_trait]
pub trait RateLimitAlgorithm: Send + Sync {
    async fn consume(&self, key: &str) -> Result<Decision, FrameworkError>;
}

fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

/// Token bucket: `{tokens, lastRefillMs}` per key, refilled lazily on each
/// `consume`. See spec.md §4.4 "Token bucket" for the exact refill formula.
pub struct TokenBucket {
    store: Arc<dyn RateLimitStore>,
    max_requests: u64,
    window_seconds: u64,
    options: TokenBucketOptions,
}

impl TokenBucket {
    pub fn new(
        store: Arc<dyn RateLimitStore>,
        max_requests: u64,
        window_seconds: u64,
        options: TokenBucketOptions,
    ) -> Self {
        TokenBucket {
            store,
            max_requests,
            window_seconds,
            options,
        }
    }

    fn burst_size(&self) -> f64 {
        self.options.burst_size.unwrap_or(self.max_requests) as f64
    }

    fn refill_rate(&self) -> f64 {
        self.options
            .refill_rate
            .unwrap_or(self.max_requests as f64 / self.window_seconds.max(1) as f64)
    }
}

#[async_trait]
impl RateLimitAlgorithm for TokenBucket {
    async fn consume(&self, key: &str) -> Result<Decision, FrameworkError> {
        let now = now_ms();
        let burst_size = self.burst_size();
        let refill_rate = self.refill_rate();

        let existing = self.store.get(key).await?;
        let (mut tokens, last_refill_ms) = match existing {
            None => {
                // First contact: initialize at `burstSize - 1` and allow.
                let tokens = burst_size - 1.0;
                self.store
                    .set(
                        key,
                        json!({"tokens": tokens, "last_refill_ms": now}),
                        self.window_seconds,
                    )
                    .await?;
                return Ok(Decision {
                    allowed: true,
                    remaining: tokens.floor().max(0.0) as u64,
                    reset_at_epoch_sec: now / 1000 + self.window_seconds,
                });
            }
            Some(record) => (
                record["tokens"].as_f64().unwrap_or(0.0),
                record["last_refill_ms"].as_u64().unwrap_or(now),
            ),
        };

        let refill = ((now.saturating_sub(last_refill_ms)) as f64 * refill_rate / 1000.0).floor();
        tokens = (tokens + refill).min(burst_size);

        if tokens < 1.0 {
            let reset_at_epoch_sec =
                (now as f64 + ((1.0 - tokens) / refill_rate * 1000.0).ceil()) as u64 / 1000;
            self.store
                .set(
                    key,
                    json!({"tokens": tokens, "last_refill_ms": now}),
                    self.window_seconds,
                )
                .await?;
            return Ok(Decision {
                allowed: false,
                remaining: 0,
                reset_at_epoch_sec,
            });
        }

        tokens -= 1.0;
        self.store
            .set(
                key,
                json!({"tokens": tokens, "last_refill_ms": now}),
                self.window_seconds,
            )
            .await?;
        Ok(Decision {
            allowed: true,
            remaining: tokens.floor().max(0.0) as u64,
            reset_at_epoch_sec: now / 1000 + self.window_seconds,
        })
    }
}

/// Sliding window: a list of request timestamps, counted against a current
/// and previous sub-window with configurable weights. See spec.md §4.4
/// "Sliding window".
pub struct SlidingWindow {
    store: Arc<dyn RateLimitStore>,
    max_requests: u64,
    window_seconds: u64,
    options: SlidingWindowOptions,
}

impl SlidingWindow {
    pub fn new(
        store: Arc<dyn RateLimitStore>,
        max_requests: u64,
        window_seconds: u64,
        options: SlidingWindowOptions,
    ) -> Self {
        SlidingWindow {
            store,
            max_requests,
            window_seconds,
            options,
        }
    }
}

#[async_trait]
impl RateLimitAlgorithm for SlidingWindow {
    async fn consume(&self, key: &str) -> Result<Decision, FrameworkError> {
        let now = now_ms();
        let granularity_ms = self.options.granularity_ms;
        let current_start = (now / granularity_ms) * granularity_ms;
        let previous_start = current_start.saturating_sub(self.window_seconds * 1000);

        let timestamps: Vec<u64> = match self.store.get(key).await? {
            Some(record) => serde_json::from_value(record["timestamps"].clone()).unwrap_or_default(),
            None => Vec::new(),
        };

        let current_count = timestamps
            .iter()
            .filter(|&&t| t >= current_start && t <= now)
            .count() as f64;
        let previous_count = timestamps
            .iter()
            .filter(|&&t| t >= previous_start && t < current_start)
            .count() as f64;

        let weighted =
            current_count * self.options.weight_current + previous_count * self.options.weight_previous;

        if weighted >= self.max_requests as f64 {
            return Ok(Decision {
                allowed: false,
                remaining: 0,
                reset_at_epoch_sec: current_start / 1000 + self.window_seconds,
            });
        }

        let mut retained: Vec<u64> = timestamps.into_iter().filter(|&t| t >= previous_start).collect();
        retained.push(now);
        self.store
            .set(key, json!({"timestamps": retained}), self.window_seconds)
            .await?;

        let remaining = (self.max_requests as f64 - (weighted + self.options.weight_current))
            .max(0.0)
            .floor() as u64;
        Ok(Decision {
            allowed: true,
            remaining,
            reset_at_epoch_sec: current_start / 1000 + self.window_seconds,
        })
    }
}

/// Fixed window: a single `{counter, windowStart}` record per key, reset
/// when the computed window start has moved on. See spec.md §4.4 "Fixed
/// window".
pub struct FixedWindow {
    store: Arc<dyn RateLimitStore>,
    max_requests: u64,
    window_seconds: u64,
    options: FixedWindowOptions,
}

impl FixedWindow {
    pub fn new(
        store: Arc<dyn RateLimitStore>,
        max_requests: u64,
        window_seconds: u64,
        options: FixedWindowOptions,
    ) -> Self {
        FixedWindow {
            store,
            max_requests,
            window_seconds,
            options,
        }
    }
}

#[async_trait]
impl RateLimitAlgorithm for FixedWindow {
    async fn consume(&self, key: &str) -> Result<Decision, FrameworkError> {
        let now = now_ms();
        let window_ms = self.window_seconds * 1000;

        let existing: Option<(i64, u64)> = match self.store.get(key).await? {
            Some(record) => Some((
                record["counter"].as_i64().unwrap_or(0),
                record["window_start_ms"].as_u64().unwrap_or(now),
            )),
            None => None,
        };

        let Some((counter, window_start)) = existing else {
            let window_start = if self.options.strict_window {
                (now / window_ms) * window_ms
            } else {
                now
            };
            self.store
                .set(
                    key,
                    json!({"counter": 1, "window_start_ms": window_start}),
                    self.window_seconds,
                )
                .await?;
            return Ok(Decision {
                allowed: true,
                remaining: self.max_requests.saturating_sub(1),
                reset_at_epoch_sec: window_start / 1000 + self.window_seconds,
            });
        };

        let is_stale = if self.options.strict_window {
            let computed_start = (now / window_ms) * window_ms;
            window_start < computed_start
        } else {
            window_start < now.saturating_sub(window_ms)
        };

        if is_stale {
            let window_start = if self.options.strict_window {
                (now / window_ms) * window_ms
            } else {
                now
            };
            self.store
                .set(
                    key,
                    json!({"counter": 1, "window_start_ms": window_start}),
                    self.window_seconds,
                )
                .await?;
            return Ok(Decision {
                allowed: true,
                remaining: self.max_requests.saturating_sub(1),
                reset_at_epoch_sec: window_start / 1000 + self.window_seconds,
            });
        }

        if counter as u64 >= self.max_requests {
            return Ok(Decision {
                allowed: false,
                remaining: 0,
                reset_at_epoch_sec: window_start / 1000 + self.window_seconds,
            });
        }

        let next_counter = counter + 1;
        self.store
            .set(
                key,
                json!({"counter": next_counter, "window_start_ms": window_start}),
                self.window_seconds,
            )
            .await?;
        Ok(Decision {
            allowed: true,
            remaining: self.max_requests.saturating_sub(next_counter as u64),
            reset_at_epoch_sec: window_start / 1000 + self.window_seconds,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ratelimit::storage::MemoryStore;

    fn store() -> Arc<dyn RateLimitStore> {
        Arc::new(MemoryStore::new())
    }

    #[tokio::test]
    async fn token_bucket_allows_up_to_burst_then_rejects() {
        let bucket = TokenBucket::new(
            store(),
            5,
            60,
            TokenBucketOptions {
                refill_rate: Some(1.0),
                burst_size: Some(5),
            },
        );
        for _ in 0..5 {
            let d = bucket.consume("k").await.unwrap();
            assert!(d.allowed);
        }
        let d = bucket.consume("k").await.unwrap();
        assert!(!d.allowed);
    }

    #[tokio::test]
    async fn fixed_window_rejects_after_max_requests() {
        let window = FixedWindow::new(
            store(),
            3,
            60,
            FixedWindowOptions {
                strict_window: false,
            },
        );
        assert!(window.consume("k").await.unwrap().allowed);
        assert!(window.consume("k").await.unwrap().allowed);
        let third = window.consume("k").await.unwrap();
        assert!(third.allowed);
        assert_eq!(third.remaining, 0);
        let fourth = window.consume("k").await.unwrap();
        assert!(!fourth.allowed);
    }

    #[tokio::test]
    async fn sliding_window_counts_within_window() {
        let window = SlidingWindow::new(
            store(),
            2,
            60,
            SlidingWindowOptions {
                granularity_ms: 1000,
                weight_current: 1.0,
                weight_previous: 0.0,
            },
        );
        assert!(window.consume("k").await.unwrap().allowed);
        assert!(window.consume("k").await.unwrap().allowed);
        assert!(!window.consume("k").await.unwrap().allowed);
    }
}
