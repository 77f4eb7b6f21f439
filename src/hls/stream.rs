//! Relaying a resolved upstream stream to the player

use axum::body::Body;
use axum::http::{header, HeaderMap, Response, StatusCode};
use futures::StreamExt;
use reqwest::Client;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};
use url::Url;

use crate::errors::{AppError, AppResult};
use crate::utils::UrlUtils;

/// Fetch `stream_url` and relay it.
///
/// HLS playlists are buffered and returned with their relative URIs made
/// absolute against the upstream URL; anything else is streamed through
/// until the upstream ends or `force_close` fires.
pub async fn relay(
    client: &Client,
    stream_url: &str,
    request_headers: &HeaderMap,
    force_close: &CancellationToken,
) -> AppResult<Response<Body>> {
    let mut forwarded = reqwest::header::HeaderMap::new();
    if let Some(range) = request_headers.get(header::RANGE) {
        forwarded.insert(header::RANGE, range.clone());
    }

    let upstream = client
        .get(stream_url)
        .headers(forwarded)
        .send()
        .await
        .map_err(|e| AppError::from_reqwest("stream", e))?;

    let status = upstream.status();
    if !status.is_success() {
        return Err(AppError::from_status("stream", status, String::new()));
    }

    let final_url = upstream.url().clone();
    let content_type = upstream
        .headers()
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("video/mp2t")
        .to_string();

    if is_playlist(&content_type, final_url.path()) {
        let raw = upstream
            .text()
            .await
            .map_err(|e| AppError::from_reqwest("stream", e))?;
        let rewritten = rewrite_playlist(&raw, &final_url);
        debug!(
            "Serving rewritten playlist for {}",
            UrlUtils::obfuscate_credentials(final_url.as_str())
        );
        return Response::builder()
            .status(StatusCode::OK)
            .header(header::CONTENT_TYPE, "application/vnd.apple.mpegurl")
            .header(header::CACHE_CONTROL, "no-cache")
            .header(header::ACCESS_CONTROL_ALLOW_ORIGIN, "*")
            .header(header::CONTENT_LENGTH, rewritten.len().to_string())
            .body(Body::from(rewritten))
            .map_err(|e| AppError::internal(format!("failed to build response: {e}")));
    }

    let content_length = upstream
        .headers()
        .get(header::CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.parse::<u64>().ok());

    let byte_stream = upstream
        .bytes_stream()
        .take_until(force_close.clone().cancelled_owned());

    let mut builder = Response::builder()
        .status(status)
        .header(header::CONTENT_TYPE, content_type)
        .header(header::CACHE_CONTROL, "no-cache")
        .header(header::ACCESS_CONTROL_ALLOW_ORIGIN, "*");
    if let Some(len) = content_length {
        builder = builder.header(header::CONTENT_LENGTH, len);
    }

    info!(
        "Streaming {}",
        UrlUtils::obfuscate_credentials(final_url.as_str())
    );
    builder
        .body(Body::from_stream(byte_stream))
        .map_err(|e| AppError::internal(format!("failed to build response: {e}")))
}

pub fn is_playlist(content_type: &str, path: &str) -> bool {
    content_type.to_ascii_lowercase().contains("mpegurl")
        || path.to_ascii_lowercase().ends_with(".m3u8")
}

/// Make every relative URI line of an HLS playlist absolute against `base`
pub fn rewrite_playlist(raw: &str, base: &Url) -> String {
    let mut rewritten = String::with_capacity(raw.len() + 128);
    for line in raw.lines() {
        let trimmed = line.trim();
        let keep = trimmed.is_empty()
            || trimmed.starts_with('#')
            || trimmed.starts_with("http://")
            || trimmed.starts_with("https://");

        match (keep, base.join(trimmed)) {
            (false, Ok(joined)) => rewritten.push_str(joined.as_str()),
            _ => rewritten.push_str(line),
        }
        rewritten.push('\n');
    }
    rewritten
}
