//! C4: owns one game's lifecycle from Configure through Start, background
//! observation, and Stop/Kill. The State Tracker is the single source of
//! truth; all OS polling is isolated behind the Process Probe.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::process::Command;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::ProcessError;
use crate::process::planner;
use crate::process::probe;
use crate::process::tracker::Tracker;
use crate::process::types::{BridgeInfo, LaunchMode, LaunchSpec, ProcessState};

const OBSERVER_WARMUP: Duration = Duration::from_millis(500);
const OBSERVER_PERIOD: Duration = Duration::from_secs(2);

/// One game's lifecycle controller. Not reusable across different
/// LaunchSpecs: `configure` may only bind once.
pub struct Controller {
    spec: Mutex<Option<LaunchSpec>>,
    bridge: Mutex<Option<BridgeInfo>>,
    tracker: Tracker,
    cancel: CancellationToken,
}

impl Controller {
    pub fn new() -> Self {
        Self {
            spec: Mutex::new(None),
            bridge: Mutex::new(None),
            tracker: Tracker::new(),
            cancel: CancellationToken::new(),
        }
    }

    fn spec_snapshot(&self) -> Option<LaunchSpec> {
        self.spec.lock().clone()
    }

    /// Validates and binds a LaunchSpec. Fails with a Configuration error if
    /// `gameId` or `target` is empty, if `mode` is unrecognized, or if this
    /// Controller has already been configured.
    pub fn configure(&self, spec: LaunchSpec) -> Result<(), ProcessError> {
        if self.spec.lock().is_some() {
            return Err(ProcessError::configuration(
                spec.game_id,
                spec.mode,
                spec.target,
                "Controller has already been configured; reconfigure is out of scope",
            ));
        }
        if spec.game_id.trim().is_empty() {
            return Err(ProcessError::configuration(
                spec.game_id,
                spec.mode,
                spec.target,
                "GameId must not be empty",
            ));
        }
        if spec.target.trim().is_empty() {
            return Err(ProcessError::configuration(
                spec.game_id,
                spec.mode,
                spec.target,
                "target must not be empty",
            ));
        }
        *self.spec.lock() = Some(spec);
        Ok(())
    }

    /// Idempotent; may be called after Configure and before Start. Later
    /// calls overwrite. Fails with a Configuration error if `port` is 0 —
    /// spec.md §3 defines BridgeInfo's port as `1..65535`.
    pub fn set_bridge_info(&self, port: u16, token: String) -> Result<(), ProcessError> {
        if port == 0 {
            let spec = self.spec_snapshot();
            return Err(ProcessError::configuration(
                spec.as_ref().map(|s| s.game_id.clone()).unwrap_or_default(),
                spec.as_ref().map(|s| s.mode).unwrap_or_default(),
                spec.as_ref().map(|s| s.target.clone()).unwrap_or_default(),
                "BridgeInfo port must be in 1..65535; 0 is not a valid port",
            ));
        }
        *self.bridge.lock() = Some(BridgeInfo { port, token });
        Ok(())
    }

    pub fn game_id(&self) -> Option<String> {
        self.spec_snapshot().map(|s| s.game_id)
    }

    pub fn launch_mode(&self) -> Option<LaunchMode> {
        self.spec_snapshot().map(|s| s.mode)
    }

    pub fn stop_process_name(&self) -> Option<String> {
        self.spec_snapshot().and_then(|s| s.stop_process_name)
    }

    pub fn target(&self) -> Option<String> {
        self.spec_snapshot().map(|s| s.target)
    }

    pub fn state(&self) -> ProcessState {
        self.tracker.state()
    }

    pub fn pid(&self) -> u32 {
        self.tracker.pid()
    }

    pub fn last_error(&self) -> Option<Arc<ProcessError>> {
        self.tracker.last_error()
    }

    pub fn start_time(&self) -> Option<chrono::DateTime<chrono::Utc>> {
        self.tracker.start_time()
    }

    pub fn stop_time(&self) -> Option<chrono::DateTime<chrono::Utc>> {
        self.tracker.stop_time()
    }

    /// True for `Running`/`Starting` on direct and launcher-with-tracking
    /// modes; for launcher-without-tracking, true only in `Unknown`. Never
    /// blocks, never shells out.
    pub fn is_running(&self) -> bool {
        let Some(spec) = self.spec_snapshot() else {
            return false;
        };
        if spec.is_launcher_without_tracking() {
            self.tracker.state() == ProcessState::Unknown
        } else {
            matches!(self.tracker.state(), ProcessState::Running | ProcessState::Starting)
        }
    }

    /// Independent of the Tracker: consults the managed child pid directly
    /// via the Probe.
    pub fn is_launcher_process_running(&self) -> bool {
        probe::alive(self.tracker.pid())
    }

    /// Cancels the Controller's observers; idempotent; does not terminate
    /// the child.
    pub fn cleanup(&self) {
        self.cancel.cancel();
    }

    /// Preconditions: Configure has been called and the Tracker is
    /// `Stopped`.
    pub async fn start(&self) -> Result<(), ProcessError> {
        let spec = self.spec_snapshot().ok_or_else(|| {
            ProcessError::start(
                "",
                LaunchMode::DirectPath,
                "",
                "Configure has not been called",
            )
        })?;

        if self.tracker.begin_start().is_err() {
            return Err(ProcessError::start(
                &spec.game_id,
                spec.mode,
                &spec.target,
                "already running",
            ));
        }

        let bridge = self.bridge.lock().clone();
        let plan = planner::plan(&spec, bridge.as_ref());

        info!(game_id = %spec.game_id, mode = ?spec.mode, program = %plan.program, "spawning child process");

        let mut command = Command::new(&plan.program);
        command.args(&plan.args);
        command.env_clear();
        command.envs(plan.env.iter().cloned());
        if let Some(dir) = &plan.working_dir {
            command.current_dir(dir);
        }
        command.kill_on_drop(false);

        let mut child = match command.spawn() {
            Ok(child) => child,
            Err(e) => {
                let err = ProcessError::start(
                    &spec.game_id,
                    spec.mode,
                    &spec.target,
                    format!("failed to spawn '{}'", plan.program),
                )
                .with_cause(e);
                warn!(game_id = %spec.game_id, error = %err, "start failed");
                self.tracker.reset_after_start_error(ProcessError::start(
                    &spec.game_id,
                    spec.mode,
                    &spec.target,
                    format!("failed to spawn '{}'", plan.program),
                ));
                return Err(err);
            }
        };

        let pid = child.id().unwrap_or(0);
        self.tracker.set_pid(pid);
        debug!(game_id = %spec.game_id, pid, "child spawned");

        if spec.mode.is_launcher() {
            if let Some(stop_name) = spec.stop_process_name.clone() {
                self.spawn_launcher_wait_observer(child);
                self.spawn_tracking_observer(spec.game_id.clone(), spec.mode, spec.target.clone(), stop_name);
            } else {
                self.spawn_launcher_only_observer(spec.game_id.clone(), child);
            }
        } else {
            self.tracker.transition_to_running();
            self.spawn_direct_wait_observer(spec.game_id.clone(), spec.mode, spec.target.clone(), child);
        }

        Ok(())
    }

    /// Direct modes: a single wait observer that transitions to Stopped when
    /// the child exits, recording a Status error on non-zero exit.
    fn spawn_direct_wait_observer(
        &self,
        game_id: String,
        mode: LaunchMode,
        target: String,
        mut child: tokio::process::Child,
    ) {
        let tracker = self.tracker.clone();
        tokio::spawn(async move {
            let status = child.wait().await;
            if !tracker.finish_if_running() {
                return;
            }
            match status {
                Ok(status) if !status.success() => {
                    tracker.record_error(ProcessError::status(
                        &game_id,
                        mode,
                        &target,
                        format!("child exited with {status}"),
                    ));
                }
                Err(e) => {
                    tracker.record_error(
                        ProcessError::status(&game_id, mode, &target, "failed to wait for child")
                            .with_cause(e),
                    );
                }
                _ => {}
            }
        });
    }

    /// Launcher mode with stopProcessName: a wait observer on the launcher
    /// (no state change on its own exit — the launcher naturally exits
    /// quickly).
    fn spawn_launcher_wait_observer(&self, mut child: tokio::process::Child) {
        tokio::spawn(async move {
            let _ = child.wait().await;
        });
    }

    /// Launcher mode with stopProcessName: polls the Probe every 2s (after a
    /// 500ms warmup) and drives Starting→Running on first sighting,
    /// Running→Stopped on disappearance.
    fn spawn_tracking_observer(&self, game_id: String, mode: LaunchMode, target: String, stop_name: String) {
        let tracker = self.tracker.clone();
        let cancel = self.cancel.clone();
        tokio::spawn(async move {
            tokio::select! {
                _ = tokio::time::sleep(OBSERVER_WARMUP) => {}
                _ = cancel.cancelled() => return,
            }

            let mut interval = tokio::time::interval(OBSERVER_PERIOD);
            loop {
                tokio::select! {
                    _ = interval.tick() => {}
                    _ = cancel.cancelled() => return,
                }

                if tracker.state() == ProcessState::Stopping {
                    return;
                }

                let name = stop_name.clone();
                let found = tokio::task::spawn_blocking(move || probe::find_by_name(&name)).await;

                let pids = match found {
                    Ok(Ok(pids)) => pids,
                    Ok(Err(e)) => {
                        tracker.record_error(
                            ProcessError::status(&game_id, mode, &target, "failed to list processes")
                                .with_cause(e),
                        );
                        tracker.promote_to_unknown_on_status_error();
                        continue;
                    }
                    Err(_) => continue,
                };

                match tracker.state() {
                    ProcessState::Starting => {
                        if !pids.is_empty() {
                            tracker.transition_to_running();
                        }
                    }
                    ProcessState::Running => {
                        if pids.is_empty() && tracker.finish_if_running() {
                            return;
                        }
                    }
                    ProcessState::Stopped | ProcessState::Stopping | ProcessState::Unknown => return,
                }
            }
        });
    }

    /// Launcher mode without stopProcessName: upon the launcher's exit,
    /// transitions to Unknown.
    fn spawn_launcher_only_observer(&self, _game_id: String, mut child: tokio::process::Child) {
        let tracker = self.tracker.clone();
        tokio::spawn(async move {
            let _ = child.wait().await;
            tracker.transition_to_unknown();
        });
    }

    /// Fails Stop("process not running") if the tracker is not in a
    /// running-ish state.
    pub async fn stop(&self, grace: Duration) -> Result<(), ProcessError> {
        let spec = self.spec_snapshot().ok_or_else(|| {
            ProcessError::stop("", LaunchMode::DirectPath, "", "Configure has not been called")
        })?;

        if self.tracker.begin_stop().is_err() {
            return Err(ProcessError::stop(
                &spec.game_id,
                spec.mode,
                &spec.target,
                "process not running",
            ));
        }

        if let Some(stop_name) = &spec.stop_process_name {
            let name = stop_name.clone();
            let pids = tokio::task::spawn_blocking(move || probe::find_by_name(&name))
                .await
                .unwrap_or(Ok(Vec::new()))
                .unwrap_or_default();

            let mut any_ok = false;
            for pid in pids {
                let game_id = spec.game_id.clone();
                let target = spec.target.clone();
                let mode = spec.mode;
                let result = tokio::task::spawn_blocking(move || {
                    probe::terminate(pid, grace, &game_id, mode, &target)
                })
                .await
                .unwrap_or_else(|e| {
                    Err(ProcessError::stop(
                        &spec.game_id,
                        spec.mode,
                        &spec.target,
                        "termination task panicked",
                    )
                    .with_cause(e))
                });
                if result.is_ok() {
                    any_ok = true;
                } else if let Err(e) = result {
                    warn!(game_id = %spec.game_id, pid, error = %e, "termination attempt failed");
                }
            }

            if any_ok {
                self.tracker.force_stopped();
                return Ok(());
            }
            // Fall through: no tracked pid could be terminated; fall back
            // to the managed child below.
        }

        let pid = self.tracker.pid();
        let game_id = spec.game_id.clone();
        let target = spec.target.clone();
        let mode = spec.mode;

        let graceful_result =
            tokio::task::spawn_blocking(move || probe::terminate(pid, grace, &game_id, mode, &target))
                .await
                .unwrap_or_else(|e| {
                    Err(ProcessError::stop(&spec.game_id, spec.mode, &spec.target, "termination task panicked")
                        .with_cause(e))
                });

        match graceful_result {
            Ok(()) => {
                self.tracker.force_stopped();
                Ok(())
            }
            Err(e) => {
                self.tracker.record_error(ProcessError::stop(
                    &spec.game_id,
                    spec.mode,
                    &spec.target,
                    "graceful termination failed",
                ));
                Err(e)
            }
        }
    }

    /// Moves to Stopping; force-kills tracked matches if stopProcessName is
    /// set, otherwise the managed child.
    pub async fn kill(&self) -> Result<(), ProcessError> {
        let spec = self.spec_snapshot().ok_or_else(|| {
            ProcessError::stop("", LaunchMode::DirectPath, "", "Configure has not been called")
        })?;

        if self.tracker.begin_kill().is_err() {
            return Err(ProcessError::stop(
                &spec.game_id,
                spec.mode,
                &spec.target,
                "process not running",
            ));
        }

        if let Some(stop_name) = &spec.stop_process_name {
            let name = stop_name.clone();
            let pids = tokio::task::spawn_blocking(move || probe::find_by_name(&name))
                .await
                .unwrap_or_default();

            let mut last_err = None;
            for pid in pids {
                let game_id = spec.game_id.clone();
                let target = spec.target.clone();
                let mode = spec.mode;
                if let Err(e) =
                    tokio::task::spawn_blocking(move || probe::kill(pid, &game_id, mode, &target))
                        .await
                        .unwrap_or_else(|e| {
                            Err(ProcessError::stop(
                                &spec.game_id,
                                spec.mode,
                                &spec.target,
                                "kill task panicked",
                            )
                            .with_cause(e))
                        })
                {
                    last_err = Some(e);
                }
            }

            match last_err {
                None => {
                    self.tracker.force_stopped();
                    Ok(())
                }
                Some(e) => {
                    self.tracker.record_error(ProcessError::stop(
                        &spec.game_id,
                        spec.mode,
                        &spec.target,
                        "kill failed for one or more matching processes",
                    ));
                    Err(e)
                }
            }
        } else {
            let pid = self.tracker.pid();
            let game_id = spec.game_id.clone();
            let target = spec.target.clone();
            let mode = spec.mode;
            match tokio::task::spawn_blocking(move || probe::kill(pid, &game_id, mode, &target))
                .await
                .unwrap_or_else(|e| {
                    Err(ProcessError::stop(&spec.game_id, spec.mode, &spec.target, "kill task panicked")
                        .with_cause(e))
                }) {
                Ok(()) => {
                    self.tracker.force_stopped();
                    Ok(())
                }
                Err(e) => {
                    self.tracker.record_error(ProcessError::stop(
                        &spec.game_id,
                        spec.mode,
                        &spec.target,
                        "kill failed",
                    ));
                    Err(e)
                }
            }
        }
    }
}

impl Default for Controller {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sleep_spec(game_id: &str, secs: &str) -> LaunchSpec {
        LaunchSpec {
            game_id: game_id.to_string(),
            mode: LaunchMode::DirectPath,
            target: "/bin/sleep".to_string(),
            args: vec![secs.to_string()],
            working_dir: None,
            stop_process_name: None,
        }
    }

    #[tokio::test]
    async fn configure_rejects_empty_game_id() {
        let controller = Controller::new();
        let spec = LaunchSpec {
            game_id: String::new(),
            mode: LaunchMode::DirectPath,
            target: "/bin/echo".to_string(),
            args: vec![],
            working_dir: None,
            stop_process_name: None,
        };
        let err = controller.configure(spec).unwrap_err();
        assert!(matches!(err, ProcessError::Configuration { .. }));
    }

    #[tokio::test]
    async fn configure_rejects_empty_target() {
        let controller = Controller::new();
        let spec = LaunchSpec {
            game_id: "g1".to_string(),
            mode: LaunchMode::DirectPath,
            target: String::new(),
            args: vec![],
            working_dir: None,
            stop_process_name: None,
        };
        assert!(controller.configure(spec).is_err());
    }

    #[tokio::test]
    async fn start_twice_without_stop_is_rejected() {
        let controller = Controller::new();
        controller.configure(sleep_spec("t2", "2")).unwrap();
        controller.start().await.unwrap();
        let err = controller.start().await.unwrap_err();
        assert!(matches!(err, ProcessError::Start { .. }));
        controller.kill().await.ok();
    }

    #[tokio::test]
    async fn direct_nonexistent_binary_fails_start_and_resets() {
        let controller = Controller::new();
        controller
            .configure(LaunchSpec {
                game_id: "t3".to_string(),
                mode: LaunchMode::DirectPath,
                target: "/nonexistent/x".to_string(),
                args: vec![],
                working_dir: None,
                stop_process_name: None,
            })
            .unwrap();
        let err = controller.start().await.unwrap_err();
        assert!(err.to_string().contains("/nonexistent/x"));
        assert_eq!(controller.state(), ProcessState::Stopped);
        assert_eq!(controller.pid(), 0);
    }

    #[tokio::test]
    async fn stop_on_never_started_controller_fails() {
        let controller = Controller::new();
        controller.configure(sleep_spec("t6", "5")).unwrap();
        let err = controller.stop(Duration::from_millis(50)).await.unwrap_err();
        assert!(matches!(err, ProcessError::Stop { .. }));
    }

    #[tokio::test]
    async fn stop_fails_in_unknown_state_launcher_has_no_observable_process() {
        let controller = Controller::new();
        controller
            .configure(LaunchSpec {
                game_id: "t7".to_string(),
                mode: LaunchMode::SteamAppId,
                target: "1".to_string(),
                args: vec![],
                working_dir: None,
                stop_process_name: None,
            })
            .unwrap();
        controller.tracker.begin_start().unwrap();
        controller.tracker.transition_to_unknown();
        assert_eq!(controller.state(), ProcessState::Unknown);

        let err = controller.stop(Duration::from_millis(50)).await.unwrap_err();
        assert!(matches!(err, ProcessError::Stop { .. }));
        assert_eq!(controller.state(), ProcessState::Unknown);
    }

    async fn poll_until<F: Fn() -> bool>(timeout: Duration, condition: F) -> bool {
        let deadline = tokio::time::Instant::now() + timeout;
        while tokio::time::Instant::now() < deadline {
            if condition() {
                return true;
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
        condition()
    }

    /// Property 5 (launcher-with-tracking faithfulness), exercised
    /// white-box: drives the tracker to `Starting` directly (the state
    /// `Start()` would have left it in right after spawning a launcher),
    /// spawns a real process under a name unique to this test run, and
    /// asserts the tracking observer — the same `spawn_tracking_observer`
    /// that `Start()` wires up for SteamAppId/EpicAppId with
    /// `stop_process_name` set — carries Starting -> Running on first
    /// sighting and Running -> Stopped once the process disappears.
    #[tokio::test]
    async fn tracking_observer_drives_starting_to_running_to_stopped() {
        let dir = tempfile::tempdir().unwrap();
        let tracked_name = format!("gabs-track-{}", std::process::id());
        let tracked_bin = dir.path().join(&tracked_name);
        std::fs::copy("/bin/sleep", &tracked_bin).unwrap();
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mut perms = std::fs::metadata(&tracked_bin).unwrap().permissions();
            perms.set_mode(0o755);
            std::fs::set_permissions(&tracked_bin, perms).unwrap();
        }

        let controller = Controller::new();
        controller
            .configure(LaunchSpec {
                game_id: "t8".to_string(),
                mode: LaunchMode::SteamAppId,
                target: "1".to_string(),
                args: vec![],
                working_dir: None,
                stop_process_name: Some(tracked_name.clone()),
            })
            .unwrap();
        controller.tracker.begin_start().unwrap();

        let mut child = tokio::process::Command::new(&tracked_bin)
            .arg("2")
            .spawn()
            .unwrap();

        controller.spawn_tracking_observer(
            "t8".to_string(),
            LaunchMode::SteamAppId,
            "1".to_string(),
            tracked_name,
        );

        assert!(poll_until(Duration::from_secs(3), || controller.state() == ProcessState::Running).await);

        child.wait().await.ok();

        assert!(poll_until(Duration::from_secs(3), || controller.state() == ProcessState::Stopped).await);
    }
}
