use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// How GABS spawns or attaches to the game. Empty input is treated as
/// `DirectPath` by callers that parse it from a config record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LaunchMode {
    DirectPath,
    SteamAppId,
    EpicAppId,
    CustomCommand,
}

impl Default for LaunchMode {
    fn default() -> Self {
        Self::DirectPath
    }
}

impl LaunchMode {
    /// Steam/Epic spawn a store launcher, not the game itself.
    pub fn is_launcher(self) -> bool {
        matches!(self, Self::SteamAppId | Self::EpicAppId)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::DirectPath => "direct_path",
            Self::SteamAppId => "steam_app_id",
            Self::EpicAppId => "epic_app_id",
            Self::CustomCommand => "custom_command",
        }
    }

    /// Parses the mode, treating an empty string as `DirectPath` per the
    /// data model's rule for missing/blank input.
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim() {
            "" | "direct_path" | "direct" => Some(Self::DirectPath),
            "steam_app_id" | "steam" => Some(Self::SteamAppId),
            "epic_app_id" | "epic" => Some(Self::EpicAppId),
            "custom_command" | "custom" => Some(Self::CustomCommand),
            _ => None,
        }
    }
}

/// Immutable once bound to a Controller by `Configure`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LaunchSpec {
    pub game_id: String,
    #[serde(default)]
    pub mode: LaunchMode,
    pub target: String,
    #[serde(default)]
    pub args: Vec<String>,
    #[serde(default)]
    pub working_dir: Option<PathBuf>,
    #[serde(default)]
    pub stop_process_name: Option<String>,
}

impl LaunchSpec {
    /// True when this spec's mode is a launcher with nothing to track the
    /// real game by — the conservative "we can't observe it" case.
    pub fn is_launcher_without_tracking(&self) -> bool {
        self.mode.is_launcher() && self.stop_process_name.is_none()
    }
}

/// Exactly one may be bound to a Controller before Start.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BridgeInfo {
    pub port: u16,
    pub token: String,
}

/// One per Controller. `Unknown` is reached only by launcher modes without
/// `stopProcessName`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProcessState {
    Stopped,
    Starting,
    Running,
    Stopping,
    Unknown,
}

impl Default for ProcessState {
    fn default() -> Self {
        Self::Stopped
    }
}

impl ProcessState {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Stopped => "stopped",
            Self::Starting => "starting",
            Self::Running => "running",
            Self::Stopping => "stopping",
            Self::Unknown => "unknown",
        }
    }
}

/// The execution plan the Launch Planner hands the Controller.
#[derive(Debug, Clone)]
pub struct ExecutionPlan {
    pub program: String,
    pub args: Vec<String>,
    pub env: Vec<(String, String)>,
    pub working_dir: Option<PathBuf>,
}

/// Timing bookkeeping the State Tracker records alongside state/pid.
#[derive(Debug, Clone, Default)]
pub struct TrackerTiming {
    pub start_time: Option<DateTime<Utc>>,
    pub stop_time: Option<DateTime<Utc>>,
}
