//! Stalker portal client
//!
//! Emulates a MAG set-top box against one portal: handshake and token
//! negotiation, authentication, keepalive, channel listing and playback link
//! resolution. One [`PortalClient`] owns one upstream session.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE, COOKIE, USER_AGENT};
use reqwest::Client;
use tokio::sync::{Mutex, RwLock};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use url::Url;

pub mod envelope;
pub mod identity;
pub mod watchdog;

pub use envelope::PortalAction;
pub use identity::PortalIdentity;

use crate::catalog::{ChannelCatalog, ChannelInfo, ChannelResolver, LogoAsset};
use crate::errors::{AppError, AppResult};
use crate::utils::{RetryPolicy, UrlUtils};
use envelope::{
    decode, AuthResponse, ChannelsResponse, CreateLinkResponse, GenresResponse,
    HandshakeResponse, ProfileResponse,
};

/// User agent of a MAG200-class set-top box
pub const STB_USER_AGENT: &str = "Mozilla/5.0 (QtEmbedded; U; Linux; C) AppleWebKit/533.3 (KHTML, like Gecko) MAG200 stbapp ver: 4 rev: 2116 Mobile Safari/533.3";

/// Header carrying the device model
pub const X_USER_AGENT: &str = "x-user-agent";

/// Session against one upstream portal
pub struct PortalClient {
    identity: PortalIdentity,
    http: Client,
    token: RwLock<String>,
    // held for a whole handshake + authenticate cycle
    auth_lock: Mutex<()>,
}

impl std::fmt::Debug for PortalClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PortalClient")
            .field("identity", &self.identity)
            .finish_non_exhaustive()
    }
}

impl PortalClient {
    pub fn new(identity: PortalIdentity, http: Client) -> Self {
        let token = RwLock::new(identity.initial_token.clone());
        Self {
            identity,
            http,
            token,
            auth_lock: Mutex::new(()),
        }
    }

    pub fn identity(&self) -> &PortalIdentity {
        &self.identity
    }

    /// Session token currently held
    pub async fn token(&self) -> String {
        self.token.read().await.clone()
    }

    /// Spoofed set-top box headers. Everything but the handshake also carries
    /// the bearer token.
    pub async fn identity_headers(&self, with_authorization: bool) -> AppResult<HeaderMap> {
        let mut headers = HeaderMap::new();
        headers.insert(USER_AGENT, HeaderValue::from_static(STB_USER_AGENT));
        headers.insert(X_USER_AGENT, header_value(&self.identity.x_user_agent())?);
        headers.insert(COOKIE, header_value(&self.identity.cookie())?);
        if with_authorization {
            let bearer = format!("Bearer {}", self.token.read().await);
            headers.insert(AUTHORIZATION, header_value(&bearer)?);
        }
        Ok(headers)
    }

    /// Negotiate the session token.
    ///
    /// A token in the response replaces the held one; an absent or empty
    /// token keeps the current one.
    pub async fn handshake(&self) -> AppResult<()> {
        let token = self.token().await;
        let body = self
            .call(PortalAction::Handshake, &[("token", token.as_str())])
            .await?;
        let response: HandshakeResponse = decode(PortalAction::Handshake, &body)?;

        if response.session.token.is_empty() {
            debug!("Handshake kept the current token");
        } else {
            *self.token.write().await = response.session.token;
            debug!("Handshake issued a new token");
        }
        Ok(())
    }

    /// Login/password authentication (`do_auth`)
    pub async fn authenticate(&self) -> AppResult<()> {
        let id = &self.identity;
        let body = self
            .call(
                PortalAction::DoAuth,
                &[
                    ("login", id.username.as_str()),
                    ("password", id.password.as_str()),
                    ("device_id", id.device_id.as_str()),
                    ("device_id2", id.device_id2.as_str()),
                ],
            )
            .await?;
        let response: AuthResponse = decode(PortalAction::DoAuth, &body)?;

        if response.ok {
            info!("Portal accepted credentials");
            Ok(())
        } else {
            Err(AppError::invalid_credentials(reason(&response.text)))
        }
    }

    /// Device id authentication (`get_profile` second step)
    pub async fn authenticate_with_device_ids(&self) -> AppResult<()> {
        let id = &self.identity;
        let body = self
            .call(
                PortalAction::GetProfile,
                &[
                    ("hd", "1"),
                    ("sn", id.serial_number.as_str()),
                    ("stb_type", id.model.as_str()),
                    ("device_id", id.device_id.as_str()),
                    ("device_id2", id.device_id2.as_str()),
                    ("signature", id.signature.as_str()),
                    ("auth_second_step", "1"),
                ],
            )
            .await?;
        let response: ProfileResponse = decode(PortalAction::GetProfile, &body)?;

        if response.profile.id.is_empty() {
            return Err(AppError::invalid_credentials(reason(&response.text)));
        }
        info!("Authenticated as portal profile '{}'", response.profile.name);
        Ok(())
    }

    /// The authentication path selected by the identity's device-id-auth flag
    pub async fn authenticate_session(&self) -> AppResult<()> {
        if self.identity.device_id_auth {
            self.authenticate_with_device_ids().await
        } else {
            self.authenticate().await
        }
    }

    /// Handshake and authenticate with retries, then launch the watchdog
    /// into `tasks` under `scope`.
    pub async fn start(
        self: &Arc<Self>,
        retry: &RetryPolicy,
        tasks: &mut JoinSet<()>,
        scope: CancellationToken,
    ) -> AppResult<()> {
        self.login(retry).await?;
        tasks.spawn(watchdog::run(Arc::clone(self), scope));
        Ok(())
    }

    /// Serialized handshake + authentication cycle, used before a catalog refresh
    pub async fn reauthenticate(&self, retry: &RetryPolicy) -> AppResult<()> {
        self.login(retry).await
    }

    async fn login(&self, retry: &RetryPolicy) -> AppResult<()> {
        let _guard = self.auth_lock.lock().await;
        retry.run("handshake", || self.handshake()).await?;
        retry
            .run("authenticate", || self.authenticate_session())
            .await
    }

    /// Single watchdog handshake, serialized with authentication
    pub async fn keepalive(&self) -> AppResult<()> {
        let _guard = self.auth_lock.lock().await;
        self.handshake().await
    }

    /// Fetch genres and the full channel listing and build a catalog.
    ///
    /// Genre lookup failures degrade to raw genre ids.
    pub async fn retrieve_channels(&self) -> AppResult<ChannelCatalog> {
        let genres = match self.genres().await {
            Ok(genres) => genres,
            Err(e) => {
                warn!("Failed to load genres, using raw genre ids: {}", e);
                HashMap::new()
            }
        };

        let body = self.call(PortalAction::GetAllChannels, &[]).await?;
        let response: ChannelsResponse = decode(PortalAction::GetAllChannels, &body)?;
        let listed = response.listing.data.len();

        let entries = response.listing.data.into_iter().map(|ch| {
            let genre = genres
                .get(&ch.tv_genre_id)
                .cloned()
                .unwrap_or_else(|| ch.tv_genre_id.clone());
            ChannelInfo {
                id: ch.id,
                name: ch.name,
                genre,
                logo: ch.logo,
                cmd: ch.cmd,
            }
        });
        let catalog = ChannelCatalog::from_entries(entries)?;

        info!(
            "Retrieved {} channels ({} listed, {} genres)",
            catalog.len(),
            listed,
            genres.len()
        );
        Ok(catalog)
    }

    /// Retrieve channels with retries; an empty catalog is not retried
    pub async fn retrieve_channels_with_retry(&self, retry: &RetryPolicy) -> AppResult<ChannelCatalog> {
        retry
            .run("retrieve_channels", || self.retrieve_channels())
            .await
    }

    async fn genres(&self) -> AppResult<HashMap<String, String>> {
        let body = self.call(PortalAction::GetGenres, &[]).await?;
        let response: GenresResponse = decode(PortalAction::GetGenres, &body)?;
        Ok(response
            .genres
            .into_iter()
            .filter(|g| !g.id.is_empty())
            .map(|g| (g.id, g.title))
            .collect())
    }

    /// Exchange a channel command for a playable URL
    pub async fn create_link(&self, cmd: &str) -> AppResult<String> {
        let body = self
            .call(
                PortalAction::CreateLink,
                &[
                    ("cmd", cmd),
                    ("series", ""),
                    ("forced_storage", "undefined"),
                    ("disable_ad", "0"),
                    ("download", "0"),
                ],
            )
            .await?;
        let response: CreateLinkResponse = decode(PortalAction::CreateLink, &body)?;
        match response.playable_url() {
            Some(url) => Ok(url.to_string()),
            None => Err(AppError::protocol(
                PortalAction::CreateLink.as_str(),
                "response carried no playable URL",
                body,
            )),
        }
    }

    /// Download a channel logo with the spoofed headers
    pub async fn fetch_logo(&self, logo: &str) -> AppResult<LogoAsset> {
        let url = UrlUtils::resolve_logo_url(&self.identity.location, logo)
            .ok_or_else(|| AppError::not_found("logo", logo))?;

        let response = self
            .http
            .get(&url)
            .headers(self.identity_headers(true).await?)
            .send()
            .await
            .map_err(|e| AppError::from_reqwest("logo", e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(AppError::from_status("logo", status, String::new()));
        }

        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let bytes = response
            .bytes()
            .await
            .map_err(|e| AppError::from_reqwest("logo", e))?;

        Ok(LogoAsset {
            content_type,
            bytes,
        })
    }

    /// Issue one portal action and return the response body
    async fn call(&self, action: PortalAction, params: &[(&str, &str)]) -> AppResult<String> {
        let mut url = Url::parse(&self.identity.location)
            .map_err(|e| AppError::configuration(format!("invalid portal URL: {e}")))?;
        {
            let mut query = url.query_pairs_mut();
            query
                .append_pair("type", action.kind())
                .append_pair("action", action.as_str());
            for (key, value) in params {
                query.append_pair(key, value);
            }
            query.append_pair("JsHttpRequest", "1-xml");
        }

        debug!(
            "Portal request {}: {}",
            action,
            UrlUtils::obfuscate_credentials(url.as_str())
        );

        let headers = self
            .identity_headers(action != PortalAction::Handshake)
            .await?;
        let response = self
            .http
            .get(url)
            .headers(headers)
            .send()
            .await
            .map_err(|e| AppError::from_reqwest(action.as_str(), e))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| AppError::from_reqwest(action.as_str(), e))?;

        if !status.is_success() {
            return Err(AppError::from_status(action.as_str(), status, body));
        }
        Ok(body)
    }
}

#[async_trait]
impl ChannelResolver for PortalClient {
    async fn create_link(&self, cmd: &str) -> AppResult<String> {
        PortalClient::create_link(self, cmd).await
    }

    async fn fetch_logo(&self, logo: &str) -> AppResult<LogoAsset> {
        PortalClient::fetch_logo(self, logo).await
    }
}

fn header_value(value: &str) -> AppResult<HeaderValue> {
    HeaderValue::from_str(value)
        .map_err(|_| AppError::configuration("identity contains characters not allowed in HTTP headers"))
}

fn reason(text: &str) -> String {
    if text.trim().is_empty() {
        "portal rejected the device".to_string()
    } else {
        text.to_string()
    }
}
