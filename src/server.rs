//! HTTP server implementation and lifecycle management.
//!
//! Built on top of Hyper's low-level server building blocks, the same way
//! the teacher's own `serve`/`run` pair is: accept a [`TcpListener`], spawn
//! one task per connection, and hand each request to the framework's own
//! dispatch path rather than a router type. Here that path is
//! [`Dispatcher::dispatch`], which already owns matching, middleware, and
//! error handling end to end.

use std::convert::Infallible;
use std::sync::Arc;

use hyper::server::conn::http1;
use hyper::service::service_fn;
use tokio::net::TcpListener;

use crate::dispatcher::Dispatcher;
use crate::types::BoxError;

/// Starts the HTTP server with the given listener, serving every accepted
/// connection through `dispatcher`. Runs until the process is terminated or
/// the listener errors.
pub async fn serve(listener: TcpListener, dispatcher: Dispatcher) {
    if let Err(err) = run(listener, dispatcher).await {
        tracing::error!(error = %err, "server loop exited with an error");
    }
}

/// Runs the main accept loop. Each connection is served on its own task so a
/// slow or stalled client cannot block the others.
async fn run(listener: TcpListener, dispatcher: Dispatcher) -> Result<(), BoxError> {
    let dispatcher = Arc::new(dispatcher);

    tracing::info!(addr = %listener.local_addr()?, "tejas listening");

    loop {
        let (stream, remote_addr) = listener.accept().await?;
        let io = hyper_util::rt::TokioIo::new(stream);
        let dispatcher = dispatcher.clone();

        tokio::spawn(async move {
            let svc = service_fn(move |req| {
                let dispatcher = dispatcher.clone();
                async move { Ok::<_, Infallible>(dispatcher.dispatch(req, remote_addr.ip(), false).await) }
            });

            let mut http = http1::Builder::new();
            http.keep_alive(true);
            let conn = http.serve_connection(io, svc).with_upgrades();

            if let Err(err) = conn.await {
                tracing::warn!(error = %err, "connection error");
            }
        });
    }
}
