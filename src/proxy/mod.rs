//! Stalker protocol proxy
//!
//! Legacy STB apps point at this service instead of the real portal. Requests
//! are forwarded with the relay's identity, session-owning actions are
//! answered locally, and in rewrite mode media commands are pointed at the
//! profile's HLS service.

use std::sync::Arc;

use axum::body::{to_bytes, Body};
use axum::extract::{Request, State};
use axum::http::{header, HeaderMap, Method, Response, StatusCode};
use axum::Router;
use reqwest::Client;
use serde_json::{json, Value};
use tower_http::trace::TraceLayer;
use tracing::{debug, warn};
use url::Url;

pub mod rewrite;

pub use rewrite::RewriteTarget;

use crate::catalog::CatalogHandle;
use crate::errors::{AppError, AppResult};
use crate::stalker::{PortalAction, PortalClient};
use crate::utils::UrlUtils;
use crate::web::error_response;

/// Largest request body forwarded upstream
const MAX_REQUEST_BODY: usize = 1024 * 1024;

#[derive(Clone)]
pub struct ProxyState {
    pub portal: Arc<PortalClient>,
    /// Process-wide portal API client
    pub http: Client,
    pub catalog: CatalogHandle,
    /// Set when rewrite mode is on
    pub rewrite: Option<RewriteTarget>,
}

pub fn router(state: ProxyState) -> Router {
    Router::new()
        .fallback(proxy_request)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn proxy_request(State(state): State<ProxyState>, request: Request) -> Response<Body> {
    let (parts, body) = request.into_parts();
    let query: Vec<(String, String)> = parts
        .uri
        .query()
        .map(|q| url::form_urlencoded::parse(q.as_bytes()).into_owned().collect())
        .unwrap_or_default();
    let action = PortalAction::from_query(param(&query, "type"), param(&query, "action"));
    let host = parts
        .headers
        .get(header::HOST)
        .and_then(|v| v.to_str().ok())
        .map(UrlUtils::host_without_port)
        .unwrap_or("localhost")
        .to_string();

    if let Some(response) = answer_locally(&state, action, &query, &host).await {
        return response;
    }

    let body = match to_bytes(body, MAX_REQUEST_BODY).await {
        Ok(body) => body,
        Err(e) => return error_response(StatusCode::BAD_REQUEST, &e.to_string()),
    };

    match forward(&state, &parts.method, parts.uri.path(), &query, &parts.headers, body).await {
        Ok((status, content_type, bytes)) => {
            let bytes = match &state.rewrite {
                Some(target) if param(&query, "type").eq_ignore_ascii_case("itv") => {
                    rewrite_body(&state, target, bytes, &host).await
                }
                _ => bytes,
            };
            Response::builder()
                .status(status)
                .header(
                    header::CONTENT_TYPE,
                    content_type.as_deref().unwrap_or("application/json"),
                )
                .body(Body::from(bytes))
                .unwrap_or_else(|_| error_response(StatusCode::INTERNAL_SERVER_ERROR, "internal error"))
        }
        Err(e) => {
            warn!("Proxying {} failed: {}", parts.uri.path(), e);
            error_response(StatusCode::BAD_GATEWAY, &e.to_string())
        }
    }
}

/// Actions the relay owns: its upstream session and, in rewrite mode, link creation
async fn answer_locally(
    state: &ProxyState,
    action: Option<PortalAction>,
    query: &[(String, String)],
    host: &str,
) -> Option<Response<Body>> {
    let payload = match action? {
        PortalAction::Handshake => json!({ "js": { "token": state.portal.token().await } }),
        PortalAction::Logout => json!({ "js": true }),
        PortalAction::CreateLink => {
            let target = state.rewrite.as_ref()?;
            let catalog = state.catalog.current().await;
            let cmd = param(query, "cmd");
            let channel = catalog
                .get_by_cmd(cmd)
                .or_else(|| target.key_from_cmd(cmd).and_then(|key| catalog.get(&key)))?;
            debug!("Answering create_link for '{}' locally", channel.key());
            json!({ "js": { "id": channel.info().id, "cmd": target.cmd_for(host, channel.key()) } })
        }
        _ => return None,
    };
    Some(json_response(&payload))
}

async fn forward(
    state: &ProxyState,
    method: &Method,
    path: &str,
    query: &[(String, String)],
    headers: &HeaderMap,
    body: bytes::Bytes,
) -> AppResult<(StatusCode, Option<String>, bytes::Bytes)> {
    let mut url = upstream_url(state.portal.identity().location.as_str(), path)?;
    let token = state.portal.token().await;
    let identity = state.portal.identity();
    {
        let mut pairs = url.query_pairs_mut();
        pairs.clear();
        for (key, value) in query {
            let replaced = match key.as_str() {
                "mac" => identity.mac.as_str(),
                "sn" => identity.serial_number.as_str(),
                "stb_type" => identity.model.as_str(),
                "device_id" => identity.device_id.as_str(),
                "device_id2" => identity.device_id2.as_str(),
                "signature" => identity.signature.as_str(),
                "token" => token.as_str(),
                _ => value.as_str(),
            };
            pairs.append_pair(key, replaced);
        }
    }
    if query.is_empty() {
        url.set_query(None);
    }

    let mut upstream_headers = state.portal.identity_headers(true).await?;
    for name in [header::ACCEPT, header::CONTENT_TYPE] {
        if let Some(value) = headers.get(&name) {
            upstream_headers.insert(name, value.clone());
        }
    }

    debug!(
        "Proxying {} {}",
        method,
        UrlUtils::obfuscate_credentials(url.as_str())
    );

    let mut request = state
        .http
        .request(method.clone(), url)
        .headers(upstream_headers);
    if !body.is_empty() {
        request = request.body(body);
    }

    let response = request
        .send()
        .await
        .map_err(|e| AppError::from_reqwest("proxy", e))?;
    let status = response.status();
    let content_type = response
        .headers()
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);
    let bytes = response
        .bytes()
        .await
        .map_err(|e| AppError::from_reqwest("proxy", e))?;

    Ok((status, content_type, bytes))
}

/// `.php` endpoints go to the configured portal location, anything else to
/// the same path on the portal's origin.
fn upstream_url(location: &str, path: &str) -> AppResult<Url> {
    let target = if path.to_ascii_lowercase().ends_with(".php") {
        location.to_string()
    } else {
        let origin = UrlUtils::origin(location)
            .ok_or_else(|| AppError::configuration("portal URL has no origin"))?;
        format!("{origin}{path}")
    };
    Url::parse(&target).map_err(|e| AppError::internal(format!("invalid upstream URL: {e}")))
}

async fn rewrite_body(
    state: &ProxyState,
    target: &RewriteTarget,
    bytes: bytes::Bytes,
    host: &str,
) -> bytes::Bytes {
    let Ok(mut value) = serde_json::from_slice::<Value>(&bytes) else {
        return bytes;
    };
    let catalog = state.catalog.current().await;
    if target.rewrite_listing(&mut value, &catalog, host) == 0 {
        return bytes;
    }
    match serde_json::to_vec(&value) {
        Ok(encoded) => bytes::Bytes::from(encoded),
        Err(_) => bytes,
    }
}

fn param<'a>(query: &'a [(String, String)], name: &str) -> &'a str {
    query
        .iter()
        .find(|(k, _)| k == name)
        .map(|(_, v)| v.as_str())
        .unwrap_or("")
}

fn json_response(payload: &Value) -> Response<Body> {
    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(payload.to_string()))
        .unwrap_or_else(|_| error_response(StatusCode::INTERNAL_SERVER_ERROR, "internal error"))
}
