//! Runtime state reported for each profile

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProfilePhase {
    #[default]
    Idle,
    Validating,
    Success,
    Error,
}

impl std::fmt::Display for ProfilePhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ProfilePhase::Idle => "idle",
            ProfilePhase::Validating => "validating",
            ProfilePhase::Success => "success",
            ProfilePhase::Error => "error",
        };
        write!(f, "{s}")
    }
}

/// Snapshot of one profile's lifecycle
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProfileRuntimeState {
    pub id: u32,
    pub name: String,
    pub phase: ProfilePhase,
    pub message: String,
    pub channels: usize,
    /// Playlist URL of the HLS service while running
    pub hls: Option<String>,
    /// Base URL of the portal proxy while running
    pub proxy: Option<String>,
    pub running: bool,
    pub updated_at: DateTime<Utc>,
}

impl ProfileRuntimeState {
    pub fn idle(id: u32, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            phase: ProfilePhase::Idle,
            message: String::new(),
            channels: 0,
            hls: None,
            proxy: None,
            running: false,
            updated_at: Utc::now(),
        }
    }
}
