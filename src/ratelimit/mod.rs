//! The pluggable rate limiter: three algorithms (token bucket, sliding
//! window, fixed window) over a storage abstraction (in-memory or Redis).

pub mod algorithms;
pub mod config;
pub mod middleware;
pub mod storage;

pub use algorithms::{Decision, RateLimitAlgorithm};
pub use config::{Algorithm, HeaderFormat, HeaderStyle, RateLimiterConfig, StoreKind};
pub use middleware::RateLimiter;
pub use storage::{MemoryStore, RateLimitStore};

#[cfg(feature = "redis-store")]
pub use storage::RedisStore;

use std::sync::Arc;

use crate::error::FrameworkError;

/// Builds the concrete [`RateLimitStore`] named by `config.store`
/// (`"memory"` or `"redis"`).
pub fn build_store(config: &RateLimiterConfig) -> Result<Arc<dyn RateLimitStore>, FrameworkError> {
    match &config.store {
        StoreKind::Memory => Ok(Arc::new(MemoryStore::new())),
        #[cfg(feature = "redis-store")]
        StoreKind::Redis { url } => Ok(Arc::new(RedisStore::new(url)?)),
        #[cfg(not(feature = "redis-store"))]
        StoreKind::Redis { .. } => Err(FrameworkError::configuration(
            "redis rate-limit store requested but the `redis-store` feature is disabled",
        )),
    }
}
