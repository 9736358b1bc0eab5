//! tejas: a general-purpose backend HTTP dispatch framework.
//!
//! Configuration loading, compiled-in handler discovery, an ordered
//! middleware chain driving request dispatch, a pluggable rate limiter, an
//! in-process namespaced LRU cache with encryption-at-rest, and optional
//! Redis/Mongo connection management.
//!
//! # Key concepts
//! - [registry::Registry] holds the compiled-in endpoints and global
//!   middleware; [dispatcher::Dispatcher] drives one request through it.
//! - [rc::RequestContext] is the enhanced per-request context handlers and
//!   middleware operate on; it is consumed and returned at every step
//!   (see [middleware::Next]).
//! - [ratelimit] implements the token-bucket, sliding-window, and
//!   fixed-window algorithms over a pluggable storage backend.
//! - [cache] is the namespaced, size-bounded LRU used for application-level
//!   caching, independent of the rate limiter's own storage.
//! - [connections] manages lazily-initialized Redis/Mongo client handles.
//!
//! # Quickstart
//!
//! ```rust,no_run
//! use tejas::registry::Registry;
//! use tejas::endpoint::Endpoint;
//! use tejas::middleware::HandlerFn;
//! use std::sync::Arc;
//!
//! # async fn example() -> anyhow::Result<()> {
//! let handler: HandlerFn = Arc::new(|rc| Box::pin(async move { Ok(rc.send("hello")) }));
//! let registry = Registry::new();
//! registry.register(Endpoint::new("/", Vec::new(), handler)?);
//! # Ok(())
//! # }
//! ```

/// Response body wrapper implementing [`hyper::body::Body`].
pub mod body;

/// The in-process, namespaced LRU cache engine with encryption-at-rest.
pub mod cache;

/// Layered configuration (file → environment → explicit options).
pub mod config;

/// `SendValue` and content-type inference for outgoing responses.
pub mod content;

/// Lazily-initialized, idempotent Redis/Mongo connection management.
pub mod connections;

/// Request dispatch: match, enhance, run the middleware chain, send.
pub mod dispatcher;

/// Registered path patterns, their middleware chain, and their handler.
pub mod endpoint;

/// The framework's tagged error sum and error-sender resolution rules.
pub mod error;

/// Middleware chain primitives: `Middleware`, `Next`, step outcomes.
pub mod middleware;

/// Request body parsing: JSON, form-urlencoded, multipart.
pub mod parser;

/// The pluggable rate limiter (token bucket, sliding window, fixed window).
pub mod ratelimit;

/// The enhanced per-request context handlers and middleware operate on.
pub mod rc;

/// The route registry: compiled-in endpoints and the path matcher.
pub mod registry;

/// HTTP server: accept loop, one task per connection, dispatch via `Dispatcher`.
mod server;

/// The framework shell: wires config, discovery, middleware, and the listener.
pub mod shell;

/// HTTP status code/reason-phrase helpers.
pub mod status;

/// Core type aliases (`Request`, `Response`, internal boxed body/error).
pub mod types;

pub use dispatcher::Dispatcher;
pub use error::FrameworkError;
pub use rc::RequestContext;
pub use registry::{Registry, Target};
pub use server::serve;
