//! HLS relay server
//!
//! Serves one profile's catalog as an M3U playlist and relays each channel's
//! upstream stream and logo on demand.
//!
//! Routes:
//! - `GET /`, `GET /iptv`: playlist
//! - `GET /iptv/{name}`, `GET /{name}`: channel stream
//! - `GET /logo/{name}`: channel logo

use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::extract::{Path, State};
use axum::http::{header, HeaderMap, Response, StatusCode};
use axum::routing::get;
use axum::Router;
use reqwest::Client;
use tokio_util::sync::CancellationToken;
use tower::ServiceBuilder;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{debug, warn};

pub mod playlist;
pub mod stream;

use crate::catalog::{CatalogHandle, ChannelResolver};
use crate::errors::AppError;
use crate::web::{error_response, upstream_error_response};

#[derive(Clone)]
pub struct HlsState {
    pub catalog: CatalogHandle,
    pub resolver: Arc<dyn ChannelResolver>,
    /// Process-wide media client
    pub stream_client: Client,
    pub link_ttl: Duration,
    /// Ends open media bodies when the listener is forced down
    pub force_close: CancellationToken,
}

pub fn router(state: HlsState) -> Router {
    Router::new()
        .route("/", get(serve_playlist))
        .route("/iptv", get(serve_playlist))
        .route("/iptv/{name}", get(serve_channel))
        .route("/logo/{name}", get(serve_logo))
        .route("/{name}", get(serve_channel))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(CorsLayer::permissive()),
        )
        .with_state(state)
}

async fn serve_playlist(State(state): State<HlsState>, headers: HeaderMap) -> Response<Body> {
    let host = headers
        .get(header::HOST)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("localhost");

    let catalog = state.catalog.current().await;
    let body = playlist::render(&catalog, host);

    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, "audio/x-mpegurl")
        .header(header::CACHE_CONTROL, "no-cache")
        .body(Body::from(body))
        .unwrap_or_else(|_| error_response(StatusCode::INTERNAL_SERVER_ERROR, "internal error"))
}

async fn serve_channel(
    State(state): State<HlsState>,
    Path(name): Path<String>,
    headers: HeaderMap,
) -> Response<Body> {
    let catalog = state.catalog.current().await;
    let Some(channel) = catalog.get(&name) else {
        return upstream_error_response(&AppError::not_found("channel", name));
    };

    let url = match channel
        .playable_url(state.resolver.as_ref(), state.link_ttl)
        .await
    {
        Ok(url) => url,
        Err(e) => {
            warn!("Failed to resolve channel '{}': {}", name, e);
            return error_response(StatusCode::BAD_GATEWAY, &e.to_string());
        }
    };

    match stream::relay(&state.stream_client, &url, &headers, &state.force_close).await {
        Ok(response) => response,
        Err(e) => {
            // a dead link should not be reused for the rest of its ttl
            channel.invalidate_link().await;
            warn!("Upstream stream for '{}' failed: {}", name, e);
            error_response(StatusCode::BAD_GATEWAY, &e.to_string())
        }
    }
}

async fn serve_logo(State(state): State<HlsState>, Path(name): Path<String>) -> Response<Body> {
    let catalog = state.catalog.current().await;
    let Some(channel) = catalog.get(&name) else {
        return upstream_error_response(&AppError::not_found("channel", name));
    };

    match channel.logo(state.resolver.as_ref()).await {
        Ok(asset) => {
            debug!("Serving logo for '{}' ({} bytes)", name, asset.bytes.len());
            Response::builder()
                .status(StatusCode::OK)
                .header(
                    header::CONTENT_TYPE,
                    asset.content_type.as_deref().unwrap_or("image/png"),
                )
                .header(header::CACHE_CONTROL, "public, max-age=3600")
                .body(Body::from(asset.bytes))
                .unwrap_or_else(|_| {
                    error_response(StatusCode::INTERNAL_SERVER_ERROR, "internal error")
                })
        }
        Err(e) => {
            debug!("Logo for '{}' unavailable: {}", name, e);
            upstream_error_response(&e)
        }
    }
}
