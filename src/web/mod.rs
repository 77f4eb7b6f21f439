//! Listener plumbing shared by the HLS and proxy servers
//!
//! Both relay services of a profile bind up front, then serve until the
//! profile's cancellation token fires. Shutdown stops accepting, lets
//! in-flight requests drain for a grace window, then signals long-lived
//! bodies to end and waits a bounded time for the rest.

use std::future::IntoFuture;
use std::net::SocketAddr;

use axum::body::Body;
use axum::http::{header, Response, StatusCode};
use axum::Router;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::config::ShutdownConfig;
use crate::errors::{AppError, AppResult};

/// Bind a relay listener, reporting failures as `Bind` errors
pub async fn bind(service: &str, host: &str, port: u16) -> AppResult<TcpListener> {
    let addr = format!("{host}:{port}");
    TcpListener::bind(&addr)
        .await
        .map_err(|source| AppError::Bind {
            service: service.to_string(),
            addr,
            source,
        })
}

/// Address a bound listener actually got (resolves port 0)
pub fn local_addr(service: &str, listener: &TcpListener) -> AppResult<SocketAddr> {
    listener
        .local_addr()
        .map_err(|e| AppError::internal(format!("{service} listener has no local address: {e}")))
}

/// Serve `router` on `listener` until `scope` is cancelled, then drain.
///
/// `force_close` is cancelled once the grace window has passed; streaming
/// bodies observe it and end so their connections can close.
pub async fn serve_until_cancelled(
    service: &'static str,
    listener: TcpListener,
    router: Router,
    scope: CancellationToken,
    force_close: CancellationToken,
    timings: ShutdownConfig,
) {
    let addr = listener
        .local_addr()
        .map(|a| a.to_string())
        .unwrap_or_else(|_| "unknown".to_string());
    info!("{} listening on {}", service, addr);

    let shutdown = scope.clone().cancelled_owned();
    let serve = axum::serve(listener, router)
        .with_graceful_shutdown(shutdown)
        .into_future();
    tokio::pin!(serve);

    tokio::select! {
        result = &mut serve => {
            // only reachable if the listener itself failed
            if let Err(e) = result {
                error!("{} on {} stopped unexpectedly: {}", service, addr, e);
            }
            force_close.cancel();
            return;
        }
        _ = scope.cancelled() => {}
    }

    debug!("{} on {} draining for {:?}", service, addr, timings.grace_period);
    if tokio::time::timeout(timings.grace_period, &mut serve)
        .await
        .is_ok()
    {
        force_close.cancel();
        info!("{} on {} stopped", service, addr);
        return;
    }

    force_close.cancel();
    match tokio::time::timeout(timings.force_timeout, &mut serve).await {
        Ok(_) => info!("{} on {} stopped after forcing open streams", service, addr),
        Err(_) => warn!(
            "{} on {} did not shut down within {:?}; abandoning remaining connections",
            service, addr, timings.force_timeout
        ),
    }
}

/// Simple helper to construct a uniform error response.
pub fn error_response(status: StatusCode, msg: &str) -> Response<Body> {
    Response::builder()
        .status(status)
        .header(header::CONTENT_TYPE, "text/plain; charset=utf-8")
        .header(header::ACCESS_CONTROL_ALLOW_ORIGIN, "*")
        .body(Body::from(msg.to_string()))
        .unwrap_or_else(|_| {
            let mut response = Response::new(Body::from("internal error"));
            *response.status_mut() = StatusCode::INTERNAL_SERVER_ERROR;
            response
        })
}

/// Response for a failed upstream resolution: 404 for unknown resources,
/// 502 for everything the portal or media host got wrong.
pub fn upstream_error_response(err: &AppError) -> Response<Body> {
    match err {
        AppError::NotFound { .. } => error_response(StatusCode::NOT_FOUND, &err.to_string()),
        _ => error_response(StatusCode::BAD_GATEWAY, &err.to_string()),
    }
}
