//! The middleware chain: a cooperative `next()` continuation, generalized to
//! carry a [`RequestContext`] by value instead of a request/response pair.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use futures_util::future::BoxFuture;

use crate::error::FrameworkError;
use crate::rc::RequestContext;

/// Result of one middleware or handler step: either the RC, still owned and
/// ready for the next step, or an error bundled with the RC it occurred on
/// (so the dispatcher can still call `.throw()` on it).
pub type StepOutput = Result<RequestContext, StepError>;

/// An error raised mid-chain, carrying the RC it happened on.
pub struct StepError {
    pub rc: RequestContext,
    pub error: FrameworkError,
}

impl StepError {
    pub fn new(rc: RequestContext, error: FrameworkError) -> Self {
        StepError { rc, error }
    }
}

/// Distinguishes the source system's two middleware registration shapes.
/// Both compile down to the same [`MiddlewareFn`] signature here — Rust's
/// static typing has no runtime arity to sniff — but the tag is kept so
/// registration can still validate "a contextual middleware must call
/// `next()` exactly once" style expectations the same way the router does.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MiddlewareStyle {
    /// `(req, res, next)`-style: operates on the RC directly, then calls `next`.
    Classic,
    /// `(rc, next)`-style: same shape, kept distinct for introspection/logging.
    Contextual,
}

/// A boxed, type-erased middleware step.
pub type MiddlewareFn =
    Arc<dyn Fn(RequestContext, Next) -> BoxFuture<'static, StepOutput> + Send + Sync>;

/// A boxed, type-erased terminal handler (no `next` to call).
pub type HandlerFn =
    Arc<dyn Fn(RequestContext) -> BoxFuture<'static, StepOutput> + Send + Sync>;

#[derive(Clone)]
pub struct Middleware {
    pub style: MiddlewareStyle,
    pub run: MiddlewareFn,
}

impl Middleware {
    pub fn new<F, Fut>(style: MiddlewareStyle, f: F) -> Self
    where
        F: Fn(RequestContext, Next) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = StepOutput> + Send + 'static,
    {
        Middleware {
            style,
            run: Arc::new(move |rc, next| Box::pin(f(rc, next)) as BoxFuture<'static, StepOutput>),
        }
    }
}

/// The remaining chain: a slice of middlewares still to run, followed by the
/// terminal handler. Mirrors the teacher's `Next { middlewares, endpoint }`.
#[derive(Clone)]
pub struct Next {
    middlewares: Arc<[Middleware]>,
    position: usize,
    handler: HandlerFn,
}

impl Next {
    pub fn new(middlewares: Arc<[Middleware]>, handler: HandlerFn) -> Self {
        Next {
            middlewares,
            position: 0,
            handler,
        }
    }

    /// Runs the next step in the chain: the middleware at `position`, or the
    /// terminal handler once the slice is exhausted. Consumes `self` so each
    /// step can only call `next()` once (a second call would need a clone,
    /// which the `Next` type's ownership makes the caller do deliberately).
    pub fn run(self, rc: RequestContext) -> Pin<Box<dyn Future<Output = StepOutput> + Send>> {
        if self.position >= self.middlewares.len() {
            return (self.handler)(rc);
        }
        let middleware = self.middlewares[self.position].run.clone();
        let next = Next {
            middlewares: self.middlewares,
            position: self.position + 1,
            handler: self.handler,
        };
        (middleware)(rc, next)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ok_handler() -> HandlerFn {
        Arc::new(|rc| Box::pin(async move { Ok(rc) }))
    }

    #[tokio::test]
    async fn empty_chain_runs_the_handler() {
        let next = Next::new(Arc::from(Vec::<Middleware>::new()), ok_handler());
        let rc = crate::rc::tests_support::blank_rc();
        let result = next.run(rc).await;
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn middleware_runs_before_handler_and_can_short_circuit() {
        let mw = Middleware::new(MiddlewareStyle::Contextual, |rc, _next| async move {
            Err(StepError::new(rc, FrameworkError::forbidden("nope")))
        });
        let next = Next::new(Arc::from(vec![mw]), ok_handler());
        let rc = crate::rc::tests_support::blank_rc();
        let result = next.run(rc).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn middleware_can_delegate_to_next() {
        let mw = Middleware::new(MiddlewareStyle::Classic, |rc, next| next.run(rc));
        let next = Next::new(Arc::from(vec![mw]), ok_handler());
        let rc = crate::rc::tests_support::blank_rc();
        let result = next.run(rc).await;
        assert!(result.is_ok());
    }
}
