//! Running profiles and the handles needed to stop them

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::Mutex;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::catalog::CatalogHandle;
use crate::stalker::PortalClient;

/// Everything a running profile owns
pub struct ProfileRunner {
    scope: CancellationToken,
    tasks: JoinSet<()>,
    portal: Arc<PortalClient>,
    catalog: CatalogHandle,
}

impl ProfileRunner {
    pub fn new(
        scope: CancellationToken,
        tasks: JoinSet<()>,
        portal: Arc<PortalClient>,
        catalog: CatalogHandle,
    ) -> Self {
        Self {
            scope,
            tasks,
            portal,
            catalog,
        }
    }

    /// Cancel the profile scope and wait for its watchdog and listeners
    pub async fn stop(mut self) {
        self.scope.cancel();
        while let Some(result) = self.tasks.join_next().await {
            if let Err(e) = result {
                warn!("Profile task ended abnormally: {}", e);
            }
        }
    }
}

/// Runners keyed by profile id. The map lock is never held while a runner stops.
#[derive(Default)]
pub struct RunnerRegistry {
    runners: Mutex<HashMap<u32, ProfileRunner>>,
}

impl RunnerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a runner, handing back any runner it displaced
    pub async fn register(&self, id: u32, runner: ProfileRunner) -> Option<ProfileRunner> {
        self.runners.lock().await.insert(id, runner)
    }

    pub async fn is_running(&self, id: u32) -> bool {
        self.runners.lock().await.contains_key(&id)
    }

    /// Stop and remove one runner; false if it was not running
    pub async fn stop(&self, id: u32) -> bool {
        let runner = self.runners.lock().await.remove(&id);
        match runner {
            Some(runner) => {
                debug!("Stopping runner for profile {}", id);
                runner.stop().await;
                true
            }
            None => false,
        }
    }

    /// Stop every runner concurrently, returning the stopped ids
    pub async fn stop_all(&self) -> Vec<u32> {
        let drained: Vec<(u32, ProfileRunner)> = self.runners.lock().await.drain().collect();
        let ids: Vec<u32> = drained.iter().map(|(id, _)| *id).collect();
        futures::future::join_all(drained.into_iter().map(|(_, runner)| runner.stop())).await;
        ids
    }

    /// Portal session and catalog of a running profile
    pub async fn session(&self, id: u32) -> Option<(Arc<PortalClient>, CatalogHandle)> {
        self.runners
            .lock()
            .await
            .get(&id)
            .map(|r| (Arc::clone(&r.portal), r.catalog.clone()))
    }

    pub async fn running_ids(&self) -> Vec<u32> {
        let mut ids: Vec<u32> = self.runners.lock().await.keys().copied().collect();
        ids.sort_unstable();
        ids
    }
}
