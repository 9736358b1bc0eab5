//! The top-level HTTP entrypoint: match → enhance → build chain → execute
//! with error capture and a send-once guard, running the [`Registry`]/
//! [`Middleware`] chain over a [`RequestContext`].

use std::net::IpAddr;
use std::sync::Arc;
use std::time::Instant;

use hyper::body::Incoming;

use crate::body::TejasBody;
use crate::config::Config;
use crate::error::FrameworkError;
use crate::middleware::{HandlerFn, Middleware, Next, StepError};
use crate::rc::RequestContext;
use crate::registry::Registry;
use crate::types::Response;

/// Fixed, opaque default entry page served for `GET /` when no endpoint is
/// registered at the root.
const DEFAULT_ENTRY_PAGE: &str =
    "<!doctype html><html><head><title>tejas</title></head><body><h1>It works.</h1></body></html>";

pub struct Dispatcher {
    pub registry: Arc<Registry>,
    pub config: Arc<Config>,
}

impl Dispatcher {
    pub fn new(registry: Arc<Registry>, config: Arc<Config>) -> Self {
        Dispatcher { registry, config }
    }

    /// Handles one raw HTTP request end to end, never panicking: every error
    /// path is translated into an HTTP response by the error-sender.
    pub async fn dispatch(
        &self,
        req: http::Request<Incoming>,
        remote_ip: IpAddr,
        is_tls: bool,
    ) -> Response {
        let started = Instant::now();
        let raw_path = req.uri().path().to_string();
        let method = req.method().clone();

        let Some((index, params)) = self.registry.match_path(req.uri().path()) else {
            if raw_path == "/" {
                return default_entry_page();
            }
            return self.error_response(FrameworkError::not_found(
                crate::status::reason_phrase(404),
            ));
        };

        let rc = match RequestContext::build(req, remote_ip, is_tls, params, &self.config).await {
            Ok(rc) => rc,
            Err(err) => return self.error_response(err),
        };

        let Some((middlewares, handler)) = self.registry.with_endpoint(index, |endpoint| {
            let mut chain = self.registry.global_middlewares();
            chain.extend(endpoint.middlewares.iter().cloned());
            (chain, endpoint.handler.clone())
        }) else {
            return self.error_response(FrameworkError::not_found("endpoint vanished"));
        };

        let rc = self.run_chain(rc, middlewares, handler).await;

        if self.config.log_http_requests {
            tracing::info!(
                method = %method,
                path = %raw_path,
                latency_ms = started.elapsed().as_millis() as u64,
                "request handled"
            );
        }

        rc.into_response()
    }

    /// Runs the middleware chain to completion, routing any mid-chain error
    /// through the error-sender exactly once. A step that resumes without
    /// sending and without erroring is itself treated as an internal
    /// failure, and the send-once latch means a step that already sent wins
    /// over whatever its return value is.
    async fn run_chain(
        &self,
        rc: RequestContext,
        middlewares: Vec<Middleware>,
        handler: HandlerFn,
    ) -> RequestContext {
        let next = Next::new(Arc::from(middlewares), handler);
        match next.run(rc).await {
            Ok(rc) if rc.is_sent() => rc,
            Ok(rc) => rc.throw_default(),
            Err(StepError { rc, error }) => {
                self.log_exception(&error);
                if rc.is_sent() {
                    rc
                } else {
                    rc.throw(error)
                }
            }
        }
    }

    fn log_exception(&self, err: &FrameworkError) {
        if self.config.log_exceptions {
            tracing::error!(error = %err, "request failed");
        }
    }

    fn error_response(&self, err: FrameworkError) -> Response {
        self.log_exception(&err);
        let (code, message) = err.resolve();
        http::Response::builder()
            .status(code)
            .header(http::header::CONTENT_TYPE, "text/plain")
            .body(TejasBody::from(message))
            .unwrap_or_else(|_| fallback_500())
    }
}

fn default_entry_page() -> Response {
    http::Response::builder()
        .status(200)
        .header(http::header::CONTENT_TYPE, "text/html")
        .body(TejasBody::from(DEFAULT_ENTRY_PAGE))
        .unwrap_or_else(|_| fallback_500())
}

fn fallback_500() -> Response {
    http::Response::builder()
        .status(500)
        .body(TejasBody::from(crate::status::reason_phrase(500)))
        .expect("static fallback response is always well-formed")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::endpoint::Endpoint;
    use bytes::Bytes;
    use http_body_util::BodyExt;

    fn handler_sends() -> HandlerFn {
        Arc::new(|rc| Box::pin(async move { Ok(rc.send("hi")) }))
    }

    fn handler_forgets_to_send() -> HandlerFn {
        Arc::new(|rc| Box::pin(async move { Ok(rc) }))
    }

    #[test]
    fn default_entry_page_is_fixed_html() {
        assert!(DEFAULT_ENTRY_PAGE.to_ascii_lowercase().starts_with("<!doctype"));
    }

    #[tokio::test]
    async fn error_response_resolves_status_and_body() {
        let registry = Arc::new(Registry::new());
        let config = Arc::new(Config::default());
        let dispatcher = Dispatcher::new(registry, config);
        let response = dispatcher.error_response(FrameworkError::not_found(
            crate::status::reason_phrase(404),
        ));
        assert_eq!(response.status(), 404);
        let body = response.into_body().collect().await.unwrap().to_bytes();
        assert_eq!(body, Bytes::from_static(b"Not Found"));
    }

    #[tokio::test]
    async fn run_chain_sends_default_500_if_handler_forgot_to_send() {
        let registry = Registry::new();
        registry
            .register(Endpoint::new("/noop", Vec::new(), handler_forgets_to_send()).unwrap());
        let registry = Arc::new(registry);
        let config = Arc::new(Config::default());
        let dispatcher = Dispatcher::new(registry, config);
        let rc = crate::rc::tests_support::blank_rc();
        let rc = dispatcher
            .run_chain(rc, Vec::new(), handler_forgets_to_send())
            .await;
        assert!(rc.is_sent());
        let response = rc.into_response();
        assert_eq!(response.status(), 500);
    }

    #[tokio::test]
    async fn run_chain_passes_through_a_handler_that_sends() {
        let registry = Arc::new(Registry::new());
        let config = Arc::new(Config::default());
        let dispatcher = Dispatcher::new(registry, config);
        let rc = crate::rc::tests_support::blank_rc();
        let rc = dispatcher.run_chain(rc, Vec::new(), handler_sends()).await;
        let response = rc.into_response();
        assert_eq!(response.status(), 200);
    }
}
