//! The route registry: stores registered endpoints and implements the
//! exact-then-parameterized matcher. A handler is registered by path only;
//! it branches on the request context's own method flags rather than being
//! keyed by `(Method, path)`.

use std::collections::HashMap;
use std::sync::RwLock;

use tracing::warn;

use crate::endpoint::{match_segments, normalize_path, segments_of, Endpoint};
use crate::middleware::Middleware;

/// Write-rare, read-many: mutated only during startup/discovery, read on
/// every request thereafter.
pub struct Registry {
    endpoints: RwLock<Vec<Endpoint>>,
    by_path: RwLock<HashMap<String, usize>>,
    global_middlewares: RwLock<Vec<Middleware>>,
}

impl Default for Registry {
    fn default() -> Self {
        Registry {
            endpoints: RwLock::new(Vec::new()),
            by_path: RwLock::new(HashMap::new()),
            global_middlewares: RwLock::new(Vec::new()),
        }
    }
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `endpoint`, replacing any existing endpoint at the same
    /// normalized path and logging a warning when that happens.
    pub fn register(&self, endpoint: Endpoint) {
        let path = endpoint.path.clone();
        let mut endpoints = self.endpoints.write().unwrap();
        let mut by_path = self.by_path.write().unwrap();

        if let Some(&index) = by_path.get(&path) {
            warn!(path = %path, "replacing existing endpoint registration");
            endpoints[index] = endpoint;
        } else {
            by_path.insert(path, endpoints.len());
            endpoints.push(endpoint);
        }
    }

    /// Appends global middleware, run ahead of every endpoint's own chain.
    pub fn add_global_middleware(&self, middleware: Middleware) {
        self.global_middlewares.write().unwrap().push(middleware);
    }

    pub fn global_middlewares(&self) -> Vec<Middleware> {
        self.global_middlewares.read().unwrap().clone()
    }

    /// Registers every compiled-in handler target by iterating the
    /// process-wide [`Target`] inventory: each handler module submits
    /// itself at compile time via `inventory::submit!` instead of being
    /// discovered by walking a directory at startup.
    pub fn discover(&self) {
        for target in inventory::iter::<Target> {
            match (target.factory)() {
                Ok(endpoint) => self.register(endpoint),
                Err(err) => warn!(error = %err, "compiled-in target failed to build its endpoint"),
            }
        }
    }

    /// Matches a (non-normalized) request path against the registry: exact
    /// match wins unconditionally, otherwise the first parameterized
    /// endpoint (in registration order) whose segment shape matches.
    /// Returns the endpoint's index plus any extracted route parameters.
    pub fn match_path(&self, raw_path: &str) -> Option<(usize, HashMap<String, String>)> {
        let normalized = normalize_path(raw_path).ok()?;
        let endpoints = self.endpoints.read().unwrap();
        let by_path = self.by_path.read().unwrap();

        if let Some(&index) = by_path.get(&normalized) {
            return Some((index, HashMap::new()));
        }

        let request_segments = segments_of(&normalized);
        for (index, endpoint) in endpoints.iter().enumerate() {
            let pattern_segments = endpoint.segments();
            if let Some(params) = match_segments(&pattern_segments, &request_segments) {
                return Some((index, params));
            }
        }
        None
    }

    /// Runs `f` against the endpoint at `index` while holding the read lock,
    /// since [`Endpoint`] is not `Clone` (its handler/middlewares are boxed
    /// closures, cheap to share but not worth cloning per-request).
    pub fn with_endpoint<R>(&self, index: usize, f: impl FnOnce(&Endpoint) -> R) -> Option<R> {
        let endpoints = self.endpoints.read().unwrap();
        endpoints.get(index).map(f)
    }

    /// Flat or target-grouped endpoint path listing.
    pub fn list_endpoints(&self, grouped: bool) -> EndpointListing {
        let endpoints = self.endpoints.read().unwrap();
        let paths: Vec<String> = endpoints.iter().map(|e| e.path.clone()).collect();
        if !grouped {
            return EndpointListing::Flat(paths);
        }
        let mut groups: HashMap<String, Vec<String>> = HashMap::new();
        for path in paths {
            let first_segment = segments_of(&path).first().map(|s| s.to_string()).unwrap_or_default();
            groups.entry(first_segment).or_default().push(path);
        }
        EndpointListing::Grouped(groups)
    }
}

pub enum EndpointListing {
    Flat(Vec<String>),
    Grouped(HashMap<String, Vec<String>>),
}

/// A compiled-in handler module's self-registration record. A handler
/// module submits one of these per endpoint it defines:
///
/// ```ignore
/// fn build() -> Result<Endpoint, FrameworkError> {
///     Endpoint::new("/hello", Vec::new(), handler)
/// }
/// inventory::submit!(Target { factory: build });
/// ```
pub struct Target {
    pub factory: fn() -> Result<Endpoint, crate::error::FrameworkError>,
}

inventory::collect!(Target);

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn handler() -> crate::middleware::HandlerFn {
        Arc::new(|rc| Box::pin(async move { Ok::<_, crate::middleware::StepError>(rc) }) as _)
    }

    fn endpoint(path: &str) -> Endpoint {
        Endpoint::new(path, Vec::new(), handler()).unwrap()
    }

    #[test]
    fn exact_path_beats_parameterized() {
        let registry = Registry::new();
        registry.register(endpoint("/users/me"));
        registry.register(endpoint("/users/:id"));

        let (index, params) = registry.match_path("/users/me").unwrap();
        assert!(params.is_empty());
        registry.with_endpoint(index, |e| assert_eq!(e.path, "/users/me"));

        let (index, params) = registry.match_path("/users/7").unwrap();
        assert_eq!(params.get("id"), Some(&"7".to_string()));
        registry.with_endpoint(index, |e| assert_eq!(e.path, "/users/:id"));
    }

    #[test]
    fn duplicate_registration_replaces() {
        let registry = Registry::new();
        registry.register(endpoint("/a"));
        registry.register(endpoint("/a"));
        match registry.list_endpoints(false) {
            EndpointListing::Flat(paths) => assert_eq!(paths, vec!["/a".to_string()]),
            _ => unreachable!(),
        }
    }

    #[test]
    fn no_match_returns_none() {
        let registry = Registry::new();
        registry.register(endpoint("/a"));
        assert!(registry.match_path("/b").is_none());
    }
}
