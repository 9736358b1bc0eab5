//! The framework shell: wires together everything a running process needs
//! around the core engine. See spec.md §4.9 / SPEC_FULL.md §4.9.
//!
//! Loads the merged [`Config`], runs compiled-in target discovery, registers
//! the global rate limiter when configured, builds the cache store and
//! connection manager, and starts the listener. `main.rs` is a thin wrapper
//! around [`Shell::boot`] and [`Shell::run`].

use std::sync::Arc;

use tokio::net::TcpListener;

use crate::cache::{self, CacheStore};
use crate::config::Config;
use crate::connections::{ConnectionKind, ConnectionManager, ConnectionConfig, MongoConnectionConfig, RedisConnectionConfig};
use crate::dispatcher::Dispatcher;
use crate::ratelimit::{self, RateLimiter, RateLimiterConfig, StoreKind};
use crate::registry::Registry;

/// Everything the running process holds onto: the route registry, merged
/// config, cache store, and connection manager.
pub struct Shell {
    pub registry: Arc<Registry>,
    pub config: Arc<Config>,
    pub cache: Arc<CacheStore>,
    pub connections: Arc<ConnectionManager>,
}

impl Shell {
    /// Assembles a [`Shell`] from merged configuration: loads `Config`,
    /// discovers every compiled-in handler target, wires the global rate
    /// limiter if enabled, and resolves the cache store. Does not bind a
    /// listener or touch the network — see [`Shell::run`].
    pub async fn boot(explicit: Option<serde_json::Value>) -> anyhow::Result<Self> {
        if std::env::var("LOG_HTTP_REQUESTS").is_ok() || std::env::var("LOG_EXCEPTIONS").is_ok() {
            let _ = tracing_subscriber::fmt().with_env_filter(tracing_subscriber::EnvFilter::from_default_env()).try_init();
        }

        let config = Arc::new(crate::config::load(explicit)?);

        let registry = Arc::new(Registry::new());
        registry.discover();

        if let Some(dir_targets) = &config.dir_targets {
            tracing::info!(
                dir_targets = %dir_targets,
                "DIR_TARGETS is set but handler discovery is compiled-in; no filesystem scan is performed"
            );
        }

        if config.rate_limiter_enabled {
            let rate_limiter_config = RateLimiterConfig::default()
                .max_requests(config.rate_limiter_max_requests)
                .time_window_seconds(config.rate_limiter_time_window_seconds)
                .store(resolve_store_kind(&config)?);
            let store = ratelimit::build_store(&rate_limiter_config)?;
            let limiter = RateLimiter::new(store, rate_limiter_config);
            registry.add_global_middleware(limiter.into_middleware());
        }

        let cache = Arc::new(cache::build_store(&config.cache_max_bytes, config.log_http_requests)?);
        let connections = Arc::new(ConnectionManager::new());

        if let Some(url) = &config.redis_url {
            connections
                .initialize_connection(
                    ConnectionKind::Redis,
                    ConnectionConfig::Redis(RedisConnectionConfig {
                        url: url.clone(),
                        ..Default::default()
                    }),
                )
                .await?;
        }
        if let Some(url) = &config.mongo_url {
            connections
                .initialize_connection(
                    ConnectionKind::Mongo,
                    ConnectionConfig::Mongo(MongoConnectionConfig {
                        url: url.clone(),
                        ..Default::default()
                    }),
                )
                .await?;
        }

        Ok(Shell {
            registry,
            config,
            cache,
            connections,
        })
    }

    /// Binds the configured port and serves forever.
    pub async fn run(self) -> anyhow::Result<()> {
        let listener = TcpListener::bind(("0.0.0.0", self.config.port)).await?;
        let dispatcher = Dispatcher::new(self.registry, self.config);
        crate::server::serve(listener, dispatcher).await;
        Ok(())
    }
}

fn resolve_store_kind(config: &Config) -> anyhow::Result<StoreKind> {
    match config.rate_limiter_store.as_str() {
        "memory" => Ok(StoreKind::Memory),
        "redis" => {
            let url = config
                .redis_url
                .clone()
                .ok_or_else(|| anyhow::anyhow!("RATE_LIMITER_STORE=redis requires REDIS_URL"))?;
            Ok(StoreKind::Redis { url })
        }
        other => Err(anyhow::anyhow!("unrecognised RATE_LIMITER_STORE: {other:?}")),
    }
}
