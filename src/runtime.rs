//! Cross-invocation CLI bookkeeping.
//!
//! The process core's `Tracker` is only ever authoritative for the
//! lifetime of the process that created it — exactly as spec.md intends.
//! But the `gabs` binary is a short-lived CLI: a `start` and a later
//! `stop`/`status` are two different OS processes. This module is the
//! ambient glue that makes that usable: a small JSON marker per game,
//! written by `start` and consulted by `stop`/`kill`/`status`, reconstructing
//! the same Tracker-shaped facts straight from the Process Probe rather than
//! from an in-memory state machine that no longer exists. It is not part of
//! the core's contract.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::ProcessError;
use crate::process::probe;
use crate::process::status::StatusView;
use crate::process::types::{LaunchMode, ProcessState};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuntimeRecord {
    pub game_id: String,
    pub pid: u32,
    pub mode: LaunchMode,
    pub target: String,
    pub stop_process_name: Option<String>,
    pub started_at: DateTime<Utc>,
}

fn runtime_dir(config_dir: &Path) -> PathBuf {
    config_dir.join("run")
}

fn runtime_path(config_dir: &Path, game_id: &str) -> PathBuf {
    runtime_dir(config_dir).join(format!("{game_id}.json"))
}

pub fn write(config_dir: &Path, record: &RuntimeRecord) -> Result<()> {
    let dir = runtime_dir(config_dir);
    std::fs::create_dir_all(&dir).with_context(|| format!("creating runtime dir {}", dir.display()))?;
    let path = runtime_path(config_dir, &record.game_id);
    let contents = serde_json::to_string_pretty(record).context("serializing runtime record")?;
    std::fs::write(&path, contents).with_context(|| format!("writing runtime record {}", path.display()))
}

pub fn read(config_dir: &Path, game_id: &str) -> Option<RuntimeRecord> {
    let path = runtime_path(config_dir, game_id);
    let contents = std::fs::read_to_string(path).ok()?;
    serde_json::from_str(&contents).ok()
}

pub fn remove(config_dir: &Path, game_id: &str) {
    let _ = std::fs::remove_file(runtime_path(config_dir, game_id));
}

/// Reconstructs a `StatusView` purely from OS facts the Probe can answer,
/// mirroring the same launcher-vs-game distinction the in-process Tracker
/// would have tracked via its observers.
pub fn probe_status(record: &RuntimeRecord) -> StatusView {
    let (running, state) = if record.mode.is_launcher() {
        match &record.stop_process_name {
            Some(name) => {
                let pids = probe::find_by_name(name).unwrap_or_default();
                if !pids.is_empty() {
                    (true, ProcessState::Running)
                } else if probe::alive(record.pid) {
                    // Launcher is still alive but the tracked name hasn't
                    // appeared yet: this mirrors `Controller::is_running()`,
                    // which reports true for `Starting` on every mode
                    // except launcher-without-tracking.
                    (true, ProcessState::Starting)
                } else {
                    (false, ProcessState::Stopped)
                }
            }
            None => {
                if probe::alive(record.pid) {
                    (false, ProcessState::Starting)
                } else {
                    (true, ProcessState::Unknown)
                }
            }
        }
    } else {
        let alive = probe::alive(record.pid);
        (alive, if alive { ProcessState::Running } else { ProcessState::Stopped })
    };

    StatusView {
        running,
        pid: record.pid,
        game_id: record.game_id.clone(),
        launch_mode: record.mode,
        stop_process_name: record.stop_process_name.clone(),
        state,
        since: Some(record.started_at),
        error: None,
    }
}

/// Graceful-then-forced termination against a recorded game, the same
/// fallback order as `Controller::stop`: tracked name first, then the
/// originally-managed pid.
pub async fn terminate(record: &RuntimeRecord, grace: Duration) -> Result<(), ProcessError> {
    if let Some(stop_name) = &record.stop_process_name {
        let name = stop_name.clone();
        let pids = tokio::task::spawn_blocking(move || probe::find_by_name(&name))
            .await
            .unwrap_or(Ok(Vec::new()))
            .unwrap_or_default();

        let mut any_ok = false;
        for pid in pids {
            let game_id = record.game_id.clone();
            let target = record.target.clone();
            let mode = record.mode;
            let ok = tokio::task::spawn_blocking(move || probe::terminate(pid, grace, &game_id, mode, &target))
                .await
                .map(|r| r.is_ok())
                .unwrap_or(false);
            if ok {
                any_ok = true;
            }
        }
        if any_ok {
            return Ok(());
        }
    }

    let pid = record.pid;
    let game_id = record.game_id.clone();
    let target = record.target.clone();
    let mode = record.mode;
    tokio::task::spawn_blocking(move || probe::terminate(pid, grace, &game_id, mode, &target))
        .await
        .unwrap_or_else(|e| {
            Err(ProcessError::stop(&record.game_id, record.mode, &record.target, "termination task panicked")
                .with_cause(e))
        })
}

/// Immediate force-kill, same tracked-name-first fallback as `terminate`.
pub async fn force_kill(record: &RuntimeRecord) -> Result<(), ProcessError> {
    if let Some(stop_name) = &record.stop_process_name {
        let name = stop_name.clone();
        let pids = tokio::task::spawn_blocking(move || probe::find_by_name(&name))
            .await
            .unwrap_or(Ok(Vec::new()))
            .unwrap_or_default();

        let mut last_err = None;
        for pid in pids {
            let game_id = record.game_id.clone();
            let target = record.target.clone();
            let mode = record.mode;
            if let Err(e) = tokio::task::spawn_blocking(move || probe::kill(pid, &game_id, mode, &target))
                .await
                .unwrap_or_else(|e| {
                    Err(ProcessError::stop(&record.game_id, record.mode, &record.target, "kill task panicked")
                        .with_cause(e))
                })
            {
                last_err = Some(e);
            }
        }
        return match last_err {
            None => Ok(()),
            Some(e) => Err(e),
        };
    }

    let pid = record.pid;
    let game_id = record.game_id.clone();
    let target = record.target.clone();
    let mode = record.mode;
    tokio::task::spawn_blocking(move || probe::kill(pid, &game_id, mode, &target))
        .await
        .unwrap_or_else(|e| {
            Err(ProcessError::stop(&record.game_id, record.mode, &record.target, "kill task panicked")
                .with_cause(e))
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record() -> RuntimeRecord {
        RuntimeRecord {
            game_id: "g1".to_string(),
            pid: 0,
            mode: LaunchMode::DirectPath,
            target: "/bin/echo".to_string(),
            stop_process_name: None,
            started_at: Utc::now(),
        }
    }

    #[test]
    fn write_then_read_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), &record()).unwrap();
        let loaded = read(dir.path(), "g1").unwrap();
        assert_eq!(loaded.target, "/bin/echo");
    }

    #[test]
    fn read_missing_record_is_none() {
        let dir = tempfile::tempdir().unwrap();
        assert!(read(dir.path(), "nope").is_none());
    }

    #[test]
    fn remove_drops_the_file() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), &record()).unwrap();
        remove(dir.path(), "g1");
        assert!(read(dir.path(), "g1").is_none());
    }

    #[test]
    fn probe_status_for_a_dead_direct_pid_is_stopped() {
        let view = probe_status(&record());
        assert!(!view.running);
        assert_eq!(view.state, ProcessState::Stopped);
    }
}
