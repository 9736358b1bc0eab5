//! The rate limiter's middleware factory: resolves a storage key per
//! request, consults the configured algorithm, stamps the response headers,
//! and rejects with 429 once the limit is hit. See spec.md §4.4 "Middleware
//! factory".

use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use http::{HeaderName, HeaderValue};

use crate::error::FrameworkError;
use crate::middleware::{Middleware, MiddlewareStyle, Next, StepError, StepOutput};
use crate::ratelimit::algorithms::{Decision, FixedWindow, RateLimitAlgorithm, SlidingWindow, TokenBucket};
use crate::ratelimit::config::{Algorithm, HeaderStyle, RateLimiterConfig};
use crate::ratelimit::storage::RateLimitStore;
use crate::rc::RequestContext;

fn now_sec() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

fn header_value(n: u64) -> HeaderValue {
    HeaderValue::from_str(&n.to_string()).expect("integers always form a valid header value")
}

/// One configured rate limiter instance: picks a concrete algorithm at
/// construction time (spec.md §4.4 "exactly one allowed") and exposes it as
/// a [`Middleware`].
pub struct RateLimiter {
    config: RateLimiterConfig,
    algorithm: Arc<dyn RateLimitAlgorithm>,
}

impl RateLimiter {
    pub fn new(store: Arc<dyn RateLimitStore>, config: RateLimiterConfig) -> Self {
        let algorithm: Arc<dyn RateLimitAlgorithm> = match config.algorithm {
            Algorithm::TokenBucket => Arc::new(TokenBucket::new(
                store,
                config.max_requests,
                config.time_window_seconds,
                config.token_bucket,
            )),
            Algorithm::SlidingWindow => Arc::new(SlidingWindow::new(
                store,
                config.max_requests,
                config.time_window_seconds,
                config.sliding_window,
            )),
            Algorithm::FixedWindow => Arc::new(FixedWindow::new(
                store,
                config.max_requests,
                config.time_window_seconds,
                config.fixed_window,
            )),
        };
        RateLimiter { config, algorithm }
    }

    /// Wraps this limiter as a chain-ready [`Middleware`], suitable for
    /// `Registry::add_global_middleware` or a single endpoint's own chain.
    pub fn into_middleware(self) -> Middleware {
        let shared = Arc::new(self);
        Middleware::new(MiddlewareStyle::Contextual, move |rc, next| {
            let shared = shared.clone();
            async move { shared.handle(rc, next).await }
        })
    }

    async fn handle(&self, rc: RequestContext, next: Next) -> StepOutput {
        let identifier = self
            .config
            .key_generator
            .as_ref()
            .map(|f| f(&rc))
            .unwrap_or_else(|| rc.ip.to_string());
        let key = format!("{}{}", self.config.key_prefix, identifier);

        // Storage failures are fatal per spec.md §4.4 "Failure semantics":
        // propagate as 500 rather than silently allowing the request through.
        let decision = match self.algorithm.consume(&key).await {
            Ok(decision) => decision,
            Err(err) => return Err(StepError::new(rc, err)),
        };

        let rc = self.apply_headers(rc, &decision);

        if decision.allowed {
            return next.run(rc).await;
        }

        let retry_after = decision.reset_at_epoch_sec.saturating_sub(now_sec());
        let rc = rc.insert_header(http::header::RETRY_AFTER, header_value(retry_after));

        if let Some(on_rate_limited) = &self.config.on_rate_limited {
            return Ok(on_rate_limited(rc));
        }
        Ok(rc.send_status(429, crate::status::reason_phrase(429)))
    }

    fn apply_headers(&self, mut rc: RequestContext, decision: &Decision) -> RequestContext {
        let format = self.config.header_format;
        let reset_value = if format.draft8 {
            decision.reset_at_epoch_sec.saturating_sub(now_sec())
        } else {
            decision.reset_at_epoch_sec
        };

        if matches!(format.style, HeaderStyle::Standard | HeaderStyle::Both) {
            rc = rc.insert_header(HeaderName::from_static("ratelimit-limit"), header_value(self.config.max_requests));
            rc = rc.insert_header(HeaderName::from_static("ratelimit-remaining"), header_value(decision.remaining));
            rc = rc.insert_header(HeaderName::from_static("ratelimit-reset"), header_value(reset_value));
            if format.draft7 {
                let policy = format!("{};w={}", self.config.max_requests, self.config.time_window_seconds);
                rc = rc.insert_header(
                    HeaderName::from_static("ratelimit-policy"),
                    HeaderValue::from_str(&policy).expect("policy string is header-safe"),
                );
            }
        }

        if matches!(format.style, HeaderStyle::Legacy | HeaderStyle::Both) {
            rc = rc.insert_header(HeaderName::from_static("x-ratelimit-limit"), header_value(self.config.max_requests));
            rc = rc.insert_header(HeaderName::from_static("x-ratelimit-remaining"), header_value(decision.remaining));
            rc = rc.insert_header(HeaderName::from_static("x-ratelimit-reset"), header_value(reset_value));
        }

        rc
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::middleware::HandlerFn;
    use crate::ratelimit::config::FixedWindowOptions;
    use crate::ratelimit::storage::MemoryStore;
    use std::sync::Arc;

    fn ok_handler() -> HandlerFn {
        Arc::new(|rc| Box::pin(async move { Ok(rc.send("ok")) }))
    }

    #[tokio::test]
    async fn allows_a_request_under_the_cap() {
        let config = RateLimiterConfig::default()
            .max_requests(2)
            .time_window_seconds(60)
            .algorithm(Algorithm::FixedWindow)
            .fixed_window(FixedWindowOptions::default());
        let limiter = RateLimiter::new(Arc::new(MemoryStore::new()), config).into_middleware();

        let next = Next::new(Arc::from(vec![]), ok_handler());
        let rc = crate::rc::tests_support::blank_rc();
        let result = (limiter.run)(rc, next).await.unwrap();
        assert_eq!(result.into_response().status(), 200);
    }

    #[tokio::test]
    async fn rejected_requests_carry_retry_after() {
        let config = RateLimiterConfig::default()
            .max_requests(1)
            .time_window_seconds(60)
            .algorithm(Algorithm::FixedWindow);
        let store = Arc::new(MemoryStore::new());
        let limiter = RateLimiter::new(store, config);

        let decision = limiter.algorithm.consume("rl:1.2.3.4").await.unwrap();
        assert!(decision.allowed);
        let decision = limiter.algorithm.consume("rl:1.2.3.4").await.unwrap();
        assert!(!decision.allowed);
    }
}
