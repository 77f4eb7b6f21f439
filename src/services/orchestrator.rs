//! Profile lifecycle: authenticate, retrieve the catalog, then relay
//!
//! `idle -> validating -> success | error`. A profile's relay servers only
//! start once its portal session is authenticated and a non-empty catalog is
//! in hand; any earlier failure leaves the profile in `error` with nothing
//! running. A running profile returns to `idle` when stopped.

use std::sync::Arc;

use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{info, info_span, warn, Instrument};

use crate::catalog::{CatalogHandle, ChannelCatalog, ChannelResolver};
use crate::context::AppContext;
use crate::errors::{AppError, AppResult};
use crate::hls::{self, HlsState};
use crate::models::{ProfileConfig, ProfileRuntimeState};
use crate::proxy::{self, ProxyState, RewriteTarget};
use crate::services::runner::ProfileRunner;
use crate::services::status::SuccessReport;
use crate::stalker::{PortalClient, PortalIdentity};
use crate::web;

#[derive(Clone)]
pub struct RelayOrchestrator {
    ctx: Arc<AppContext>,
}

/// A profile that passed authentication and catalog retrieval
struct Authorized {
    portal: Arc<PortalClient>,
    catalog: ChannelCatalog,
}

/// A profile whose servers have been spawned
struct Launched {
    report: SuccessReport,
    portal: Arc<PortalClient>,
    catalog: CatalogHandle,
}

impl RelayOrchestrator {
    pub fn new(ctx: Arc<AppContext>) -> Self {
        Self { ctx }
    }

    pub fn context(&self) -> &Arc<AppContext> {
        &self.ctx
    }

    /// Start a profile's relay. A profile that is already running is stopped first.
    pub async fn start_profile(&self, profile: &ProfileConfig) -> AppResult<ProfileRuntimeState> {
        let span = info_span!("profile", id = profile.id, name = %profile.display_name());
        self.start_profile_inner(profile).instrument(span).await
    }

    async fn start_profile_inner(&self, profile: &ProfileConfig) -> AppResult<ProfileRuntimeState> {
        if self.ctx.runners.stop(profile.id).await {
            info!("Restarting running profile");
        }

        self.ctx
            .status
            .validating(profile.id, &profile.display_name())
            .await;

        let scope = self.ctx.root.child_token();
        let mut tasks = JoinSet::new();

        match self.launch(profile, &scope, &mut tasks).await {
            Ok(Launched {
                report,
                portal,
                catalog,
            }) => {
                let runner = ProfileRunner::new(scope, tasks, portal, catalog);
                if let Some(previous) = self.ctx.runners.register(profile.id, runner).await {
                    // a concurrent start won the race; keep the newest
                    previous.stop().await;
                }
                info!(
                    "Profile running with {} channels (hls: {}, proxy: {})",
                    report.channels,
                    report.hls.as_deref().unwrap_or("disabled"),
                    report.proxy.as_deref().unwrap_or("disabled")
                );
                self.ctx.status.success(profile.id, report).await;
                self.snapshot(profile.id).await
            }
            Err(e) => {
                scope.cancel();
                while tasks.join_next().await.is_some() {}
                warn!("Profile failed to start: {}", e);
                self.ctx.status.error(profile.id, &e.to_string()).await;
                Err(e)
            }
        }
    }

    /// Authenticate, retrieve, bind, then spawn both servers into `tasks`
    async fn launch(
        &self,
        profile: &ProfileConfig,
        scope: &CancellationToken,
        tasks: &mut JoinSet<()>,
    ) -> AppResult<Launched> {
        let identity = validate(profile)?;
        let Authorized { portal, catalog } = self.authorize(identity, scope, tasks).await?;
        let channels = catalog.len();

        let host = self.ctx.config.web.host.as_str();
        let hls_listener = if profile.hls.enabled {
            Some(web::bind("hls", host, profile.hls.port).await?)
        } else {
            None
        };
        let proxy_listener = if profile.proxy.enabled {
            Some(web::bind("proxy", host, profile.proxy.port).await?)
        } else {
            None
        };

        let handle = CatalogHandle::new(catalog);
        let timings = self.ctx.config.shutdown;
        let mut report = SuccessReport {
            channels,
            running: true,
            ..Default::default()
        };

        let mut hls_port = None;
        if let Some(listener) = hls_listener {
            let addr = web::local_addr("hls", &listener)?;
            hls_port = Some(addr.port());
            report.hls = Some(format!("http://{addr}/iptv"));

            let force_close = CancellationToken::new();
            let state = HlsState {
                catalog: handle.clone(),
                resolver: Arc::clone(&portal) as Arc<dyn ChannelResolver>,
                stream_client: self.ctx.clients.stream().clone(),
                link_ttl: self.ctx.config.stream.link_ttl,
                force_close: force_close.clone(),
            };
            tasks.spawn(
                web::serve_until_cancelled(
                    "HLS server",
                    listener,
                    hls::router(state),
                    scope.clone(),
                    force_close,
                    timings,
                )
                .in_current_span(),
            );
        }

        if let Some(listener) = proxy_listener {
            let addr = web::local_addr("proxy", &listener)?;
            report.proxy = Some(format!("http://{addr}/"));

            let rewrite = match (profile.proxy.rewrite, hls_port) {
                (true, Some(port)) => Some(RewriteTarget { hls_port: port }),
                _ => None,
            };
            let state = ProxyState {
                portal: Arc::clone(&portal),
                http: self.ctx.clients.portal().clone(),
                catalog: handle.clone(),
                rewrite,
            };
            tasks.spawn(
                web::serve_until_cancelled(
                    "Proxy server",
                    listener,
                    proxy::router(state),
                    scope.clone(),
                    CancellationToken::new(),
                    timings,
                )
                .in_current_span(),
            );
        }

        Ok(Launched {
            report,
            portal,
            catalog: handle,
        })
    }

    async fn authorize(
        &self,
        identity: PortalIdentity,
        scope: &CancellationToken,
        tasks: &mut JoinSet<()>,
    ) -> AppResult<Authorized> {
        let retry = self.ctx.retry_policy();
        let portal = Arc::new(PortalClient::new(
            identity,
            self.ctx.clients.portal().clone(),
        ));

        portal
            .start(&retry, tasks, scope.clone())
            .await?;
        let catalog = portal.retrieve_channels_with_retry(&retry).await?;

        Ok(Authorized { portal, catalog })
    }

    /// Authenticate and retrieve the catalog without starting any server.
    /// Returns the channel count.
    pub async fn verify_profile(&self, profile: &ProfileConfig) -> AppResult<usize> {
        let span = info_span!("verify", id = profile.id, name = %profile.display_name());
        async {
            // a running profile keeps its endpoints in the status
            let live = if self.ctx.runners.is_running(profile.id).await {
                self.ctx.status.snapshot(profile.id).await
            } else {
                None
            };
            if live.is_none() {
                self.ctx
                    .status
                    .validating(profile.id, &profile.display_name())
                    .await;
            }

            let scope = self.ctx.root.child_token();
            let mut tasks = JoinSet::new();
            let result = match validate(profile) {
                Ok(identity) => self
                    .authorize(identity, &scope, &mut tasks)
                    .await
                    .map(|a| a.catalog.len()),
                Err(e) => Err(e),
            };
            // verification never keeps the watchdog
            scope.cancel();
            while tasks.join_next().await.is_some() {}

            match result {
                Ok(channels) => {
                    info!("Verified {} channels", channels);
                    let report = match live {
                        Some(state) => SuccessReport {
                            channels,
                            hls: state.hls,
                            proxy: state.proxy,
                            running: state.running,
                        },
                        None => SuccessReport {
                            channels,
                            running: false,
                            ..Default::default()
                        },
                    };
                    self.ctx.status.success(profile.id, report).await;
                    Ok(channels)
                }
                Err(e) if live.is_some() => {
                    warn!("Verification of running profile failed: {}", e);
                    Err(e)
                }
                Err(e) => {
                    warn!("Verification failed: {}", e);
                    self.ctx.status.error(profile.id, &e.to_string()).await;
                    Err(e)
                }
            }
        }
        .instrument(span)
        .await
    }

    /// Cancel a running profile and wait for its tasks
    pub async fn stop_profile(&self, id: u32) -> AppResult<()> {
        if !self.ctx.runners.stop(id).await {
            return Err(AppError::not_found("running profile", id.to_string()));
        }
        info!(profile = id, "Profile stopped");
        self.ctx.status.stopped(id).await;
        Ok(())
    }

    /// Re-authenticate a running profile and swap in a fresh catalog.
    /// The old catalog keeps serving if anything fails.
    pub async fn refresh_catalog(&self, id: u32) -> AppResult<usize> {
        let (portal, handle) = self
            .ctx
            .runners
            .session(id)
            .await
            .ok_or_else(|| AppError::not_found("running profile", id.to_string()))?;

        let retry = self.ctx.retry_policy();
        portal.reauthenticate(&retry).await?;
        let catalog = portal.retrieve_channels_with_retry(&retry).await?;
        let channels = catalog.len();
        handle.install(catalog).await;
        info!(profile = id, "Catalog refreshed with {} channels", channels);

        if let Some(state) = self.ctx.status.snapshot(id).await {
            self.ctx
                .status
                .success(
                    id,
                    SuccessReport {
                        channels,
                        hls: state.hls,
                        proxy: state.proxy,
                        running: state.running,
                    },
                )
                .await;
        }
        Ok(channels)
    }

    /// Start every profile concurrently; one profile's failure does not affect the rest
    pub async fn start_all(&self, profiles: &[ProfileConfig]) -> Vec<(u32, AppResult<ProfileRuntimeState>)> {
        let starts = profiles.iter().map(|profile| async move {
            (profile.id, self.start_profile(profile).await)
        });
        futures::future::join_all(starts).await
    }

    /// Cancel every profile and wait for all of them to stop
    pub async fn shutdown(&self) {
        self.ctx.root.cancel();
        let stopped = self.ctx.runners.stop_all().await;
        for id in &stopped {
            self.ctx.status.stopped(*id).await;
        }
        info!("Stopped {} profiles", stopped.len());
    }

    pub async fn snapshot(&self, id: u32) -> AppResult<ProfileRuntimeState> {
        self.ctx
            .status
            .snapshot(id)
            .await
            .ok_or_else(|| AppError::not_found("profile", id.to_string()))
    }
}

fn validate(profile: &ProfileConfig) -> AppResult<PortalIdentity> {
    profile.validate_services()?;
    PortalIdentity::from_settings(&profile.portal)
}
