//! The JSON-shaped state read named in spec.md §6:
//! `{running, pid, gameId, launchMode, stopProcessName, state, since, error}`.

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::process::controller::Controller;
use crate::process::types::{LaunchMode, ProcessState};

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusView {
    pub running: bool,
    pub pid: u32,
    pub game_id: String,
    pub launch_mode: LaunchMode,
    pub stop_process_name: Option<String>,
    pub state: ProcessState,
    pub since: Option<DateTime<Utc>>,
    pub error: Option<String>,
}

impl StatusView {
    /// Reads a live, in-process Controller. The Tracker is authoritative
    /// here, per the design note that callers must never shell out on the
    /// `IsRunning` hot path.
    pub fn from_controller(controller: &Controller) -> Self {
        let state = controller.state();
        let since = match state {
            ProcessState::Running | ProcessState::Starting | ProcessState::Unknown => {
                controller.start_time()
            }
            ProcessState::Stopped | ProcessState::Stopping => controller.stop_time(),
        };
        Self {
            running: controller.is_running(),
            pid: controller.pid(),
            game_id: controller.game_id().unwrap_or_default(),
            launch_mode: controller.launch_mode().unwrap_or_default(),
            stop_process_name: controller.stop_process_name(),
            state,
            since,
            error: controller.last_error().map(|e| e.to_string()),
        }
    }
}
