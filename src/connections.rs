//! The connection manager: a process-singleton, named pool of typed
//! database connections (Redis, Mongo) with idempotent lazy initialization.
//! See spec.md §4.6.
//!
//! Grounded in the teacher's event-driven lifecycle shape (connect →
//! ready/error/end) reinterpreted for Rust's async connect-or-fail model:
//! there is no long-lived "ready" event to subscribe to once a `redis`/
//! `mongodb` client handle is constructed, so the connect-timeout and
//! retry budget from spec.md §4.6 are applied around the initial connect
//! attempt instead of around event callbacks.

use std::collections::HashSet;
use std::time::Duration;

use tokio::sync::Mutex as AsyncMutex;
use tokio::time::timeout;
use tracing::{info, warn};

use crate::error::FrameworkError;

/// The two connection kinds spec.md §4.6 names. Kept as an enum rather than
/// a free-form string so an unknown type is a compile-time impossibility
/// once past the config-parsing boundary (spec.md "Unknown type → `Unsupported`"
/// is still enforced at that boundary, in [`ConnectionKind::parse`]).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConnectionKind {
    Redis,
    Mongo,
}

impl ConnectionKind {
    pub fn parse(type_name: &str) -> Result<Self, FrameworkError> {
        match type_name.to_ascii_lowercase().as_str() {
            "redis" => Ok(ConnectionKind::Redis),
            "mongodb" | "mongo" => Ok(ConnectionKind::Mongo),
            other => Err(FrameworkError::unsupported(format!(
                "unsupported connection type: {other:?}"
            ))),
        }
    }
}

#[derive(Clone)]
pub struct RedisConnectionConfig {
    pub url: String,
    pub cluster: bool,
    pub max_retries: u32,
    pub connect_timeout: Duration,
}

impl Default for RedisConnectionConfig {
    fn default() -> Self {
        RedisConnectionConfig {
            url: "redis://127.0.0.1:6379".to_string(),
            cluster: false,
            max_retries: 3,
            connect_timeout: Duration::from_secs(10),
        }
    }
}

#[derive(Clone)]
pub struct MongoConnectionConfig {
    pub url: String,
    pub connect_timeout: Duration,
}

impl Default for MongoConnectionConfig {
    fn default() -> Self {
        MongoConnectionConfig {
            url: "mongodb://127.0.0.1:27017".to_string(),
            connect_timeout: Duration::from_secs(10),
        }
    }
}

pub enum ConnectionConfig {
    Redis(RedisConnectionConfig),
    Mongo(MongoConnectionConfig),
}

/// A live, typed connection handle. Cheap to clone: both drivers hand out
/// internally-pooled, reference-counted clients.
#[derive(Clone)]
pub enum Connection {
    #[cfg(feature = "redis-store")]
    Redis(redis::Client),
    #[cfg(feature = "mongo")]
    Mongo(mongodb::Client),
    #[cfg(not(any(feature = "redis-store", feature = "mongo")))]
    _Unreachable,
}

pub struct ConnectionStatus {
    pub exists: bool,
    pub initializing: bool,
}

/// Process-singleton mapping `type -> record` (spec.md §3 "Connection
/// record"). Lookups are lock-free once a connection has finished
/// initializing (spec.md §5 "Connection manager: lookups are lock-free
/// after `initializeConnection` completes"); the short-lived `initializing`
/// set is the only thing guarded by a lock during connect.
pub struct ConnectionManager {
    connections: dashmap::DashMap<ConnectionKind, Connection>,
    initializing: AsyncMutex<HashSet<ConnectionKind>>,
}

impl ConnectionManager {
    pub fn new() -> Self {
        ConnectionManager {
            connections: dashmap::DashMap::new(),
            initializing: AsyncMutex::new(HashSet::new()),
        }
    }

    /// Idempotent by type: returns the existing connection if one was
    /// already initialized, otherwise connects and registers it.
    pub async fn initialize_connection(
        &self,
        kind: ConnectionKind,
        config: ConnectionConfig,
    ) -> Result<Connection, FrameworkError> {
        if let Some(existing) = self.connections.get(&kind) {
            return Ok(existing.value().clone());
        }

        {
            let mut initializing = self.initializing.lock().await;
            if !initializing.insert(kind) {
                // Another task is already connecting; the caller retrying
                // shortly will observe the finished connection above.
                return Err(FrameworkError::internal(format!(
                    "{kind:?} connection is already initializing"
                )));
            }
        }

        let result = self.connect(kind, config).await;

        self.initializing.lock().await.remove(&kind);

        match result {
            Ok(connection) => {
                self.connections.insert(kind, connection.clone());
                info!(?kind, "connection initialized");
                Ok(connection)
            }
            Err(err) => {
                warn!(?kind, error = %err, "connection initialization failed");
                Err(err)
            }
        }
    }

    async fn connect(
        &self,
        kind: ConnectionKind,
        config: ConnectionConfig,
    ) -> Result<Connection, FrameworkError> {
        match (kind, config) {
            #[cfg(feature = "redis-store")]
            (ConnectionKind::Redis, ConnectionConfig::Redis(cfg)) => connect_redis(cfg).await,
            #[cfg(feature = "mongo")]
            (ConnectionKind::Mongo, ConnectionConfig::Mongo(cfg)) => connect_mongo(cfg).await,
            #[cfg(not(feature = "redis-store"))]
            (ConnectionKind::Redis, _) => Err(FrameworkError::configuration(
                "redis connections require the `redis-store` feature",
            )),
            #[cfg(not(feature = "mongo"))]
            (ConnectionKind::Mongo, _) => Err(FrameworkError::configuration(
                "mongo connections require the `mongo` feature",
            )),
            #[allow(unreachable_patterns)]
            _ => Err(FrameworkError::configuration("mismatched connection kind/config")),
        }
    }

    pub async fn has_connection(&self, kind: ConnectionKind) -> ConnectionStatus {
        ConnectionStatus {
            exists: self.connections.contains_key(&kind),
            initializing: self.initializing.lock().await.contains(&kind),
        }
    }

    pub fn get(&self, kind: ConnectionKind) -> Option<Connection> {
        self.connections.get(&kind).map(|entry| entry.value().clone())
    }

    pub async fn close_connection(&self, kind: ConnectionKind) {
        self.connections.remove(&kind);
    }

    /// Shuts down every registered connection in parallel (spec.md §4.6
    /// "gracefully in parallel"). Dropping the handles is sufficient for
    /// both drivers' own connection-pool teardown.
    pub async fn close_all_connections(&self) {
        self.connections.clear();
    }
}

impl Default for ConnectionManager {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(feature = "redis-store")]
async fn connect_redis(cfg: RedisConnectionConfig) -> Result<Connection, FrameworkError> {
    let client = redis::Client::open(cfg.url.as_str())
        .map_err(|e| FrameworkError::configuration(format!("invalid redis url: {e}")))?;

    let mut attempt = 0;
    loop {
        attempt += 1;
        let connect = client.get_multiplexed_async_connection();
        match timeout(cfg.connect_timeout, connect).await {
            Ok(Ok(_conn)) => return Ok(Connection::Redis(client)),
            Ok(Err(e)) if attempt >= cfg.max_retries => {
                return Err(FrameworkError::internal(format!(
                    "redis connection failed after {attempt} attempts: {e}"
                )));
            }
            Ok(Err(_)) => continue,
            Err(_) => {
                return Err(FrameworkError::timeout("redis connect timed out"));
            }
        }
    }
}

#[cfg(feature = "mongo")]
async fn connect_mongo(cfg: MongoConnectionConfig) -> Result<Connection, FrameworkError> {
    let mut options = mongodb::options::ClientOptions::parse(&cfg.url)
        .await
        .map_err(|e| FrameworkError::configuration(format!("invalid mongo url: {e}")))?;
    options.connect_timeout = Some(cfg.connect_timeout);

    let client = timeout(cfg.connect_timeout, mongodb::Client::with_options(options))
        .await
        .map_err(|_| FrameworkError::timeout("mongo connect timed out"))?
        .map_err(|e| FrameworkError::internal(format!("mongo connection failed: {e}")))?;

    Ok(Connection::Mongo(client))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_known_types() {
        assert_eq!(ConnectionKind::parse("redis").unwrap(), ConnectionKind::Redis);
        assert_eq!(ConnectionKind::parse("mongodb").unwrap(), ConnectionKind::Mongo);
    }

    #[test]
    fn unknown_type_is_unsupported() {
        assert!(ConnectionKind::parse("postgres").is_err());
    }

    #[tokio::test]
    async fn has_connection_reports_absent_by_default() {
        let manager = ConnectionManager::new();
        let status = manager.has_connection(ConnectionKind::Redis).await;
        assert!(!status.exists);
        assert!(!status.initializing);
    }
}
