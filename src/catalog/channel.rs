//! A single catalog entry and its resolution cache

use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::debug;

use crate::errors::{AppError, AppResult};

/// Turns catalog references into something a player can fetch.
///
/// Implemented by the portal client; tests substitute counting stubs.
#[async_trait]
pub trait ChannelResolver: Send + Sync {
    /// Exchange a channel command for a playable URL
    async fn create_link(&self, cmd: &str) -> AppResult<String>;

    /// Download a channel logo given the portal's logo reference
    async fn fetch_logo(&self, logo: &str) -> AppResult<LogoAsset>;
}

/// Logo image bytes as served by the portal
#[derive(Debug, Clone)]
pub struct LogoAsset {
    pub content_type: Option<String>,
    pub bytes: Bytes,
}

/// Channel metadata as listed by the portal
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChannelInfo {
    pub id: String,
    pub name: String,
    pub genre: String,
    pub logo: String,
    pub cmd: String,
}

#[derive(Debug, Default)]
struct ResolutionCache {
    link: Option<(String, Instant)>,
    logo: Option<LogoAsset>,
}

/// Catalog entry. Resolution for one channel is serialized by its own lock,
/// so concurrent requests for it share a single upstream call.
#[derive(Debug)]
pub struct Channel {
    key: String,
    info: ChannelInfo,
    cache: Mutex<ResolutionCache>,
}

impl Channel {
    pub fn new(key: impl Into<String>, info: ChannelInfo) -> Self {
        Self {
            key: key.into(),
            info,
            cache: Mutex::new(ResolutionCache::default()),
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn info(&self) -> &ChannelInfo {
        &self.info
    }

    pub fn name(&self) -> &str {
        &self.info.name
    }

    pub fn genre(&self) -> &str {
        &self.info.genre
    }

    pub fn cmd(&self) -> &str {
        &self.info.cmd
    }

    pub fn has_logo(&self) -> bool {
        !self.info.logo.is_empty()
    }

    /// Playable URL for this channel, reusing a link younger than `ttl`.
    pub async fn playable_url(
        &self,
        resolver: &dyn ChannelResolver,
        ttl: Duration,
    ) -> AppResult<String> {
        let mut cache = self.cache.lock().await;
        if let Some((url, resolved_at)) = &cache.link {
            if resolved_at.elapsed() < ttl {
                return Ok(url.clone());
            }
        }

        debug!("Resolving playback link for channel '{}'", self.key);
        let url = resolver.create_link(&self.info.cmd).await?;
        cache.link = Some((url.clone(), Instant::now()));
        Ok(url)
    }

    /// Logo image, fetched once per catalog epoch.
    pub async fn logo(&self, resolver: &dyn ChannelResolver) -> AppResult<LogoAsset> {
        if !self.has_logo() {
            return Err(AppError::not_found("logo", &self.key));
        }

        let mut cache = self.cache.lock().await;
        if let Some(asset) = &cache.logo {
            return Ok(asset.clone());
        }

        let asset = resolver.fetch_logo(&self.info.logo).await?;
        cache.logo = Some(asset.clone());
        Ok(asset)
    }

    /// Drop the cached link so the next request resolves a fresh one
    pub async fn invalidate_link(&self) {
        self.cache.lock().await.link = None;
    }
}
