//! Application context shared by every profile

use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::config::Config;
use crate::errors::AppResult;
use crate::services::runner::RunnerRegistry;
use crate::services::status::{ProfileStatusStore, StatusSink};
use crate::utils::{HttpClients, RetryPolicy};

/// Configuration, pooled outbound clients, status and running profiles.
///
/// Profile scopes are children of `root`, so cancelling it reaches every
/// profile.
pub struct AppContext {
    pub config: Config,
    pub clients: HttpClients,
    pub status: Arc<dyn StatusSink>,
    pub runners: RunnerRegistry,
    pub root: CancellationToken,
}

impl AppContext {
    pub fn new(config: Config) -> AppResult<Self> {
        Self::with_status_sink(config, Arc::new(ProfileStatusStore::new()))
    }

    pub fn with_status_sink(config: Config, status: Arc<dyn StatusSink>) -> AppResult<Self> {
        let clients = HttpClients::new(&config.http)?;
        Ok(Self {
            config,
            clients,
            status,
            runners: RunnerRegistry::new(),
            root: CancellationToken::new(),
        })
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::from(&self.config.retry)
    }
}
