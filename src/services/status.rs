//! Per-profile lifecycle reporting

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::RwLock;

use crate::models::{ProfilePhase, ProfileRuntimeState};

/// Outcome of a successful start, verification or refresh
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SuccessReport {
    pub channels: usize,
    pub hls: Option<String>,
    pub proxy: Option<String>,
    pub running: bool,
}

/// Receives lifecycle updates from the orchestrator.
///
/// Readers only ever get snapshot copies.
#[async_trait]
pub trait StatusSink: Send + Sync {
    async fn validating(&self, id: u32, name: &str);
    async fn error(&self, id: u32, message: &str);
    async fn success(&self, id: u32, report: SuccessReport);
    async fn stopped(&self, id: u32);
    async fn snapshot(&self, id: u32) -> Option<ProfileRuntimeState>;
    async fn snapshot_all(&self) -> Vec<ProfileRuntimeState>;
}

/// In-memory status store
#[derive(Debug, Default)]
pub struct ProfileStatusStore {
    states: RwLock<HashMap<u32, ProfileRuntimeState>>,
}

impl ProfileStatusStore {
    pub fn new() -> Self {
        Self::default()
    }

    async fn update<F>(&self, id: u32, apply: F)
    where
        F: FnOnce(&mut ProfileRuntimeState),
    {
        let mut states = self.states.write().await;
        let state = states
            .entry(id)
            .or_insert_with(|| ProfileRuntimeState::idle(id, String::new()));
        apply(state);
        state.updated_at = Utc::now();
    }
}

#[async_trait]
impl StatusSink for ProfileStatusStore {
    async fn validating(&self, id: u32, name: &str) {
        self.update(id, |s| {
            s.name = name.to_string();
            s.phase = ProfilePhase::Validating;
            s.message = "Validating".to_string();
        })
        .await;
    }

    async fn error(&self, id: u32, message: &str) {
        self.update(id, |s| {
            s.phase = ProfilePhase::Error;
            s.message = message.to_string();
            s.running = false;
            s.hls = None;
            s.proxy = None;
        })
        .await;
    }

    async fn success(&self, id: u32, report: SuccessReport) {
        self.update(id, |s| {
            s.phase = ProfilePhase::Success;
            s.message = if report.running {
                format!("Running with {} channels", report.channels)
            } else {
                format!("Verified {} channels", report.channels)
            };
            s.channels = report.channels;
            s.hls = report.hls;
            s.proxy = report.proxy;
            s.running = report.running;
        })
        .await;
    }

    async fn stopped(&self, id: u32) {
        self.update(id, |s| {
            s.phase = ProfilePhase::Idle;
            s.message = "Stopped".to_string();
            s.running = false;
            s.hls = None;
            s.proxy = None;
        })
        .await;
    }

    async fn snapshot(&self, id: u32) -> Option<ProfileRuntimeState> {
        self.states.read().await.get(&id).cloned()
    }

    async fn snapshot_all(&self) -> Vec<ProfileRuntimeState> {
        let mut all: Vec<_> = self.states.read().await.values().cloned().collect();
        all.sort_by_key(|s| s.id);
        all
    }
}
