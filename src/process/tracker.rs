//! C3: a thread-safe state machine with last-error, timing and pid cell,
//! guarded by a read/write lock that never blocks readers unduly.

use std::sync::Arc;

use chrono::Utc;
use parking_lot::RwLock;

use crate::error::ProcessError;
use crate::process::types::{ProcessState, TrackerTiming};

#[derive(Debug, Default)]
struct TrackerInner {
    state: ProcessState,
    pid: u32,
    last_error: Option<Arc<ProcessError>>,
    timing: TrackerTiming,
}

/// A cheap, cloneable handle onto one Controller's state machine.
#[derive(Debug, Clone)]
pub struct Tracker {
    inner: Arc<RwLock<TrackerInner>>,
}

impl Tracker {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(RwLock::new(TrackerInner::default())),
        }
    }

    pub fn state(&self) -> ProcessState {
        self.inner.read().state
    }

    pub fn pid(&self) -> u32 {
        self.inner.read().pid
    }

    pub fn last_error(&self) -> Option<Arc<ProcessError>> {
        self.inner.read().last_error.clone()
    }

    pub fn start_time(&self) -> Option<chrono::DateTime<Utc>> {
        self.inner.read().timing.start_time
    }

    pub fn stop_time(&self) -> Option<chrono::DateTime<Utc>> {
        self.inner.read().timing.stop_time
    }

    /// Stopped → Starting, on `Start()` entry after validation. Fails if a
    /// Start is already in flight or the process is already running.
    pub fn begin_start(&self) -> Result<(), ()> {
        let mut inner = self.inner.write();
        if inner.state != ProcessState::Stopped {
            return Err(());
        }
        inner.state = ProcessState::Starting;
        inner.pid = 0;
        inner.timing = TrackerTiming::default();
        Ok(())
    }

    pub fn set_pid(&self, pid: u32) {
        self.inner.write().pid = pid;
    }

    /// Starting → Running (direct child exists, or first sighting of the
    /// tracked name). Records `startTime`.
    pub fn transition_to_running(&self) {
        let mut inner = self.inner.write();
        if inner.state == ProcessState::Starting {
            inner.state = ProcessState::Running;
            inner.timing.start_time = Some(Utc::now());
        }
    }

    /// Starting → Unknown (launcher exited, no stopProcessName).
    pub fn transition_to_unknown(&self) {
        let mut inner = self.inner.write();
        if inner.state == ProcessState::Starting {
            inner.state = ProcessState::Unknown;
        }
    }

    /// Promotes a launcher-mode Status error to Unknown, per the error
    /// propagation rules.
    pub fn promote_to_unknown_on_status_error(&self) {
        let mut inner = self.inner.write();
        if inner.state != ProcessState::Stopped {
            inner.state = ProcessState::Unknown;
        }
    }

    /// Starting/Running → Stopping, on Stop entry. Fails otherwise — per
    /// spec, "running-ish" for Stop means exactly {Starting, Running};
    /// `Unknown` is excluded, since Stop is only defined over the states a
    /// direct or launcher-with-tracking mode can observably be in.
    pub fn begin_stop(&self) -> Result<(), ()> {
        let mut inner = self.inner.write();
        if !matches!(inner.state, ProcessState::Starting | ProcessState::Running) {
            return Err(());
        }
        inner.state = ProcessState::Stopping;
        Ok(())
    }

    /// Starting/Running/Unknown → Stopping, on Kill entry. Kill has no
    /// "not running" precondition of its own: `Unknown` means "we launched
    /// something we cannot observe", and Kill must still be able to reach
    /// it via stopProcessName or the managed pid.
    pub fn begin_kill(&self) -> Result<(), ()> {
        let mut inner = self.inner.write();
        if !matches!(
            inner.state,
            ProcessState::Starting | ProcessState::Running | ProcessState::Unknown
        ) {
            return Err(());
        }
        inner.state = ProcessState::Stopping;
        Ok(())
    }

    /// Running/Unknown → Stopped only if still in that state; returns
    /// whether the transition happened. Used by observers so a concurrent
    /// Stop (which has already moved to Stopping) is not raced.
    pub fn finish_if_running(&self) -> bool {
        let mut inner = self.inner.write();
        if matches!(inner.state, ProcessState::Running | ProcessState::Unknown) {
            inner.state = ProcessState::Stopped;
            inner.pid = 0;
            inner.timing.stop_time = Some(Utc::now());
            true
        } else {
            false
        }
    }

    /// Unconditional transition to Stopped, used by the Stop/Kill operations
    /// themselves once termination has completed.
    pub fn force_stopped(&self) {
        let mut inner = self.inner.write();
        inner.state = ProcessState::Stopped;
        inner.pid = 0;
        inner.timing.stop_time = Some(Utc::now());
    }

    /// Start failed: record the error and reset to Stopped.
    pub fn reset_after_start_error(&self, err: ProcessError) {
        let mut inner = self.inner.write();
        inner.state = ProcessState::Stopped;
        inner.pid = 0;
        inner.last_error = Some(Arc::new(err));
    }

    /// Records an error without forcing a state change (Stop/Status path).
    pub fn record_error(&self, err: ProcessError) {
        self.inner.write().last_error = Some(Arc::new(err));
    }
}

impl Default for Tracker {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::process::types::LaunchMode;

    #[test]
    fn new_tracker_starts_stopped() {
        let t = Tracker::new();
        assert_eq!(t.state(), ProcessState::Stopped);
        assert_eq!(t.pid(), 0);
    }

    #[test]
    fn begin_start_twice_without_stop_fails() {
        let t = Tracker::new();
        assert!(t.begin_start().is_ok());
        assert!(t.begin_start().is_err());
    }

    #[test]
    fn running_to_stopped_records_stop_time() {
        let t = Tracker::new();
        t.begin_start().unwrap();
        t.transition_to_running();
        assert!(t.start_time().is_some());
        assert!(t.finish_if_running());
        assert_eq!(t.state(), ProcessState::Stopped);
        assert!(t.stop_time().is_some());
    }

    #[test]
    fn finish_if_running_is_noop_once_stopping() {
        let t = Tracker::new();
        t.begin_start().unwrap();
        t.transition_to_running();
        t.begin_stop().unwrap();
        assert!(!t.finish_if_running());
        assert_eq!(t.state(), ProcessState::Stopping);
    }

    #[test]
    fn begin_stop_fails_when_stopped() {
        let t = Tracker::new();
        assert!(t.begin_stop().is_err());
    }

    #[test]
    fn begin_stop_fails_from_unknown() {
        let t = Tracker::new();
        t.begin_start().unwrap();
        t.transition_to_unknown();
        assert_eq!(t.state(), ProcessState::Unknown);
        assert!(t.begin_stop().is_err());
    }

    #[test]
    fn begin_kill_succeeds_from_unknown() {
        let t = Tracker::new();
        t.begin_start().unwrap();
        t.transition_to_unknown();
        assert!(t.begin_kill().is_ok());
        assert_eq!(t.state(), ProcessState::Stopping);
    }

    #[test]
    fn reset_after_start_error_records_last_error() {
        let t = Tracker::new();
        t.begin_start().unwrap();
        t.reset_after_start_error(ProcessError::start(
            "g1",
            LaunchMode::DirectPath,
            "/bin/x",
            "boom",
        ));
        assert_eq!(t.state(), ProcessState::Stopped);
        assert!(t.last_error().is_some());
    }
}
