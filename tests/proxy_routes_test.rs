//! Portal proxy tests: local answers, identity replacement and rewrite mode

use std::sync::Arc;

use axum::{
    body::Body,
    http::{header, Request, StatusCode},
    Router,
};
use mockito::{Matcher, Server, ServerGuard};
use serde_json::{json, Value};
use stalker_relay::catalog::{CatalogHandle, ChannelCatalog, ChannelInfo};
use stalker_relay::models::PortalSettings;
use stalker_relay::proxy::{self, ProxyState, RewriteTarget};
use stalker_relay::stalker::{PortalClient, PortalIdentity};
use tower::ServiceExt;

const RELAY_MAC: &str = "00:1A:79:AA:BB:CC";
const PORTAL_PATH: &str = "/stalker_portal/server/portal.php";

fn catalog() -> ChannelCatalog {
    ChannelCatalog::from_entries(vec![ChannelInfo {
        id: "7".into(),
        name: "BBC One".into(),
        genre: "UK".into(),
        logo: String::new(),
        cmd: "ffrt http://localhost/ch/7".into(),
    }])
    .unwrap()
}

fn app_for(portal_url: String, rewrite: bool) -> Router {
    let mut settings = PortalSettings::new(portal_url, RELAY_MAC);
    settings.token = "RELAYTOKEN".into();
    let identity = PortalIdentity::from_settings(&settings).unwrap();
    let portal = Arc::new(PortalClient::new(identity, reqwest::Client::new()));

    proxy::router(ProxyState {
        portal,
        http: reqwest::Client::new(),
        catalog: CatalogHandle::new(catalog()),
        rewrite: rewrite.then_some(RewriteTarget { hls_port: 8001 }),
    })
}

fn app(server: &ServerGuard, rewrite: bool) -> Router {
    app_for(
        format!("{}/stalker_portal/server/load.php", server.url()),
        rewrite,
    )
}

async fn get(app: &Router, uri: &str) -> (StatusCode, Value) {
    let request = Request::builder()
        .uri(uri)
        .header(header::HOST, "relay.lan:9000")
        .header(header::COOKIE, "mac=00:11:22:33:44:55")
        .body(Body::empty())
        .unwrap();
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    (status, serde_json::from_slice(&body).unwrap_or(json!({})))
}

#[tokio::test]
async fn test_handshake_answered_with_relay_token() {
    let mut server = Server::new_async().await;
    let upstream = server
        .mock("GET", Matcher::Any)
        .expect(0)
        .create_async()
        .await;
    let app = app(&server, true);

    let (status, body) = get(&app, "/c/portal.php?type=stb&action=handshake&token=").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({"js": {"token": "RELAYTOKEN"}}));

    let (status, body) = get(&app, "/c/portal.php?type=stb&action=logout").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({"js": true}));

    upstream.assert_async().await;
}

#[tokio::test]
async fn test_identity_is_replaced_on_forward() {
    let mut server = Server::new_async().await;
    let upstream = server
        .mock("GET", PORTAL_PATH)
        .match_query(Matcher::AllOf(vec![
            Matcher::UrlEncoded("type".into(), "stb".into()),
            Matcher::UrlEncoded("action".into(), "get_profile".into()),
            Matcher::UrlEncoded("mac".into(), RELAY_MAC.into()),
            Matcher::UrlEncoded("sn".into(), "0000000000000".into()),
            Matcher::UrlEncoded("stb_type".into(), "MAG254".into()),
            Matcher::UrlEncoded("token".into(), "RELAYTOKEN".into()),
            Matcher::UrlEncoded("hd".into(), "1".into()),
        ]))
        .match_header("authorization", "Bearer RELAYTOKEN")
        .match_header(
            "cookie",
            "sn=0000000000000; mac=00:1A:79:AA:BB:CC; stb_lang=en; timezone=UTC",
        )
        .with_header("content-type", "application/json")
        .with_body(r#"{"js":{"id":"1","fname":"relay"}}"#)
        .create_async()
        .await;
    let app = app(&server, false);

    let (status, body) = get(
        &app,
        "/c/portal.php?type=stb&action=get_profile&hd=1&mac=00:11:22:33:44:55&sn=XYZ&stb_type=MAG250&token=client",
    )
    .await;

    upstream.assert_async().await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["js"]["fname"], "relay");
}

#[tokio::test]
async fn test_create_link_answered_locally_in_rewrite_mode() {
    let mut server = Server::new_async().await;
    let upstream = server
        .mock("GET", Matcher::Any)
        .expect(0)
        .create_async()
        .await;
    let app = app(&server, true);

    let (status, body) = get(
        &app,
        "/c/portal.php?type=itv&action=create_link&cmd=ffrt%20http%3A%2F%2Flocalhost%2Fch%2F7&series=",
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        body["js"]["cmd"],
        "ffmpeg http://relay.lan:8001/iptv/BBC%20One"
    );
    upstream.assert_async().await;
}

#[tokio::test]
async fn test_create_link_passes_through_without_rewrite() {
    let mut server = Server::new_async().await;
    let upstream = server
        .mock("GET", PORTAL_PATH)
        .match_query(Matcher::UrlEncoded("action".into(), "create_link".into()))
        .with_body(r#"{"js":{"cmd":"ffmpeg http://cdn.example/7.ts"}}"#)
        .create_async()
        .await;
    let app = app(&server, false);

    let (status, body) = get(
        &app,
        "/c/portal.php?type=itv&action=create_link&cmd=ffrt%20http%3A%2F%2Flocalhost%2Fch%2F7",
    )
    .await;

    upstream.assert_async().await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["js"]["cmd"], "ffmpeg http://cdn.example/7.ts");
}

#[tokio::test]
async fn test_channel_listing_rewritten() {
    let mut server = Server::new_async().await;
    let _m = server
        .mock("GET", PORTAL_PATH)
        .match_query(Matcher::UrlEncoded("action".into(), "get_all_channels".into()))
        .with_header("content-type", "application/json")
        .with_body(
            r#"{"js":{"data":[
                {"id":"7","name":"BBC One","cmd":"ffrt http://localhost/ch/7","cmds":[{"url":"ffrt http://localhost/ch/7"}]},
                {"id":"9","name":"Local","cmd":"ffrt http://localhost/ch/9"}
            ]}}"#,
        )
        .create_async()
        .await;
    let app = app(&server, true);

    let (status, body) = get(&app, "/c/portal.php?type=itv&action=get_all_channels").await;
    assert_eq!(status, StatusCode::OK);
    let data = &body["js"]["data"];
    assert_eq!(data[0]["cmd"], "ffmpeg http://relay.lan:8001/iptv/BBC%20One");
    assert_eq!(data[0]["cmds"][0]["url"], "ffmpeg http://relay.lan:8001/iptv/BBC%20One");
    assert_eq!(data[1]["cmd"], "ffrt http://localhost/ch/9");
}

#[tokio::test]
async fn test_ordered_list_cmd_links_back_locally() {
    let mut server = Server::new_async().await;
    let _listing = server
        .mock("GET", PORTAL_PATH)
        .match_query(Matcher::UrlEncoded("action".into(), "get_ordered_list".into()))
        .with_header("content-type", "application/json")
        .with_body(
            r#"{"js":{"total_items":1,"max_page_items":14,"data":[
                {"id":"7","name":"BBC One","cmd":"ffrt http://localhost/ch/7"}
            ]}}"#,
        )
        .create_async()
        .await;
    let create_link = server
        .mock("GET", PORTAL_PATH)
        .match_query(Matcher::UrlEncoded("action".into(), "create_link".into()))
        .expect(0)
        .create_async()
        .await;
    let app = app(&server, true);

    let (status, body) = get(
        &app,
        "/c/portal.php?type=itv&action=get_ordered_list&genre=*&fav=0&p=1",
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let cmd = body["js"]["data"][0]["cmd"].as_str().unwrap().to_string();
    assert_eq!(cmd, "ffmpeg http://relay.lan:8001/iptv/BBC%20One");

    let (status, body) = get(
        &app,
        &format!(
            "/c/portal.php?type=itv&action=create_link&cmd={}&series=",
            urlencoding::encode(&cmd)
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["js"]["id"], "7");
    assert_eq!(body["js"]["cmd"], cmd);
    create_link.assert_async().await;
}

#[tokio::test]
async fn test_non_php_paths_go_to_origin() {
    let mut server = Server::new_async().await;
    let asset = server
        .mock("GET", "/stalker_portal/c/version.js")
        .with_header("content-type", "application/json")
        .with_body(r#"{"version":"5.6"}"#)
        .create_async()
        .await;
    let app = app(&server, true);

    let (status, body) = get(&app, "/stalker_portal/c/version.js").await;
    asset.assert_async().await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["version"], "5.6");
}

#[tokio::test]
async fn test_unreachable_portal_is_502() {
    let app = app_for("http://127.0.0.1:1/portal.php".to_string(), false);
    let (status, _) = get(&app, "/c/portal.php?type=itv&action=get_genres").await;
    assert_eq!(status, StatusCode::BAD_GATEWAY);
}
