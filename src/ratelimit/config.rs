//! The rate limiter's recognised configuration options, mirroring the table
//! in spec.md §4.4 exactly: caps, window, storage backend, algorithm choice
//! and its per-algorithm sub-options, and header emission format.

use std::sync::Arc;

use crate::rc::RequestContext;

fn default_max_requests() -> u64 {
    60
}

fn default_time_window_seconds() -> u64 {
    60
}

fn default_key_prefix() -> String {
    "rl:".to_string()
}

/// Selects one of the three concrete algorithms; exactly one is active per
/// limiter instance (spec.md §4.4 "`algorithm` | selects one of the three;
/// exactly one allowed").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Algorithm {
    TokenBucket,
    SlidingWindow,
    FixedWindow,
}

/// Where rate-limit records live: an in-process map, or Redis.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreKind {
    Memory,
    Redis { url: String },
}

#[derive(Debug, Clone, Copy)]
pub struct TokenBucketOptions {
    /// Tokens per second. Defaults to `maxRequests / timeWindowSeconds`.
    pub refill_rate: Option<f64>,
    /// Bucket capacity. Defaults to `maxRequests`.
    pub burst_size: Option<u64>,
}

impl Default for TokenBucketOptions {
    fn default() -> Self {
        TokenBucketOptions {
            refill_rate: None,
            burst_size: None,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct SlidingWindowOptions {
    pub granularity_ms: u64,
    pub weight_current: f64,
    pub weight_previous: f64,
}

impl Default for SlidingWindowOptions {
    fn default() -> Self {
        SlidingWindowOptions {
            granularity_ms: 1000,
            weight_current: 1.0,
            weight_previous: 0.0,
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct FixedWindowOptions {
    pub strict_window: bool,
}

/// Which rate-limit headers to emit, and in which vocabulary (spec.md §4.4
/// "Middleware factory").
#[derive(Debug, Clone, Copy)]
pub struct HeaderFormat {
    pub style: HeaderStyle,
    /// Emit `RateLimit-Policy: <limit>;w=<window>`.
    pub draft7: bool,
    /// Emit the reset header as delta-seconds rather than an epoch.
    pub draft8: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeaderStyle {
    /// `RateLimit-Limit` / `RateLimit-Remaining` / `RateLimit-Reset`.
    Standard,
    /// `X-RateLimit-*` equivalents.
    Legacy,
    Both,
}

impl Default for HeaderFormat {
    fn default() -> Self {
        HeaderFormat {
            style: HeaderStyle::Standard,
            draft7: false,
            draft8: false,
        }
    }
}

/// Produces the storage-key suffix for a request; defaults to the client IP
/// (spec.md §4.4 "`keyGenerator` | function RC → key suffix. Default: client IP").
pub type KeyGenerator = Arc<dyn Fn(&RequestContext) -> String + Send + Sync>;

/// Optional terminal override invoked instead of the default 429 send
/// (spec.md §4.4 "`onRateLimited` | optional terminal function").
pub type OnRateLimited = Arc<dyn Fn(RequestContext) -> RequestContext + Send + Sync>;

/// The full, typed configuration for one rate limiter instance. Mirrors the
/// "Configuration recognised options" table in spec.md §4.4.
#[derive(Clone)]
pub struct RateLimiterConfig {
    pub max_requests: u64,
    pub time_window_seconds: u64,
    pub key_prefix: String,
    pub store: StoreKind,
    pub algorithm: Algorithm,
    pub token_bucket: TokenBucketOptions,
    pub sliding_window: SlidingWindowOptions,
    pub fixed_window: FixedWindowOptions,
    pub header_format: HeaderFormat,
    pub key_generator: Option<KeyGenerator>,
    pub on_rate_limited: Option<OnRateLimited>,
}

impl Default for RateLimiterConfig {
    fn default() -> Self {
        RateLimiterConfig {
            max_requests: default_max_requests(),
            time_window_seconds: default_time_window_seconds(),
            key_prefix: default_key_prefix(),
            store: StoreKind::Memory,
            algorithm: Algorithm::FixedWindow,
            token_bucket: TokenBucketOptions::default(),
            sliding_window: SlidingWindowOptions::default(),
            fixed_window: FixedWindowOptions::default(),
            header_format: HeaderFormat::default(),
            key_generator: None,
            on_rate_limited: None,
        }
    }
}

impl RateLimiterConfig {
    pub fn max_requests(mut self, n: u64) -> Self {
        self.max_requests = n;
        self
    }

    pub fn time_window_seconds(mut self, s: u64) -> Self {
        self.time_window_seconds = s;
        self
    }

    pub fn key_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.key_prefix = prefix.into();
        self
    }

    pub fn store(mut self, store: StoreKind) -> Self {
        self.store = store;
        self
    }

    pub fn algorithm(mut self, algorithm: Algorithm) -> Self {
        self.algorithm = algorithm;
        self
    }

    pub fn token_bucket(mut self, options: TokenBucketOptions) -> Self {
        self.token_bucket = options;
        self
    }

    pub fn sliding_window(mut self, options: SlidingWindowOptions) -> Self {
        self.sliding_window = options;
        self
    }

    pub fn fixed_window(mut self, options: FixedWindowOptions) -> Self {
        self.fixed_window = options;
        self
    }

    pub fn header_format(mut self, format: HeaderFormat) -> Self {
        self.header_format = format;
        self
    }

    pub fn key_generator(mut self, f: KeyGenerator) -> Self {
        self.key_generator = Some(f);
        self
    }

    pub fn on_rate_limited(mut self, f: OnRateLimited) -> Self {
        self.on_rate_limited = Some(f);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_spec_table() {
        let cfg = RateLimiterConfig::default();
        assert_eq!(cfg.max_requests, 60);
        assert_eq!(cfg.time_window_seconds, 60);
        assert_eq!(cfg.key_prefix, "rl:");
        assert_eq!(cfg.store, StoreKind::Memory);
    }
}
