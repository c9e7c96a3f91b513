//! C1: OS-specific enumeration of pids by executable name, existence
//! checks, and graceful/force signalling by pid. Zero retained state —
//! every call is safe from any thread, on any pid, concurrently.

use std::time::{Duration, Instant};

use crate::error::ProcessError;
use crate::process::types::LaunchMode;

/// Is `pid` alive right now?
pub fn alive(pid: u32) -> bool {
    if pid == 0 {
        return false;
    }
    imp::alive(pid)
}

/// Pids whose command basename matches `name`, case-insensitively. A
/// failure to even run the listing tool is surfaced verbatim rather than
/// silently treated as "no matches".
pub fn find_by_name(name: &str) -> std::io::Result<Vec<u32>> {
    if name.is_empty() {
        return Ok(Vec::new());
    }
    imp::find_by_name(name)
}

/// Graceful signal, then wait up to `grace` before force-killing. A `grace`
/// of zero disables the wait entirely. If the graceful signal itself
/// errors (pid already gone, permission denied), escalates straight to a
/// force-kill rather than giving up.
pub fn terminate(
    pid: u32,
    grace: Duration,
    game_id: &str,
    mode: LaunchMode,
    target: &str,
) -> Result<(), ProcessError> {
    if imp::graceful(pid).is_err() {
        return kill(pid, game_id, mode, target);
    }

    if grace.is_zero() {
        return Ok(());
    }

    let deadline = Instant::now() + grace;
    while Instant::now() < deadline {
        if !alive(pid) {
            return Ok(());
        }
        std::thread::sleep(Duration::from_millis(50));
    }

    if alive(pid) {
        kill(pid, game_id, mode, target)?;
    }
    Ok(())
}

/// Force-kill immediately.
pub fn kill(pid: u32, game_id: &str, mode: LaunchMode, target: &str) -> Result<(), ProcessError> {
    imp::force(pid).map_err(|e| {
        ProcessError::stop(game_id, mode, target, format!("failed to force-kill pid {pid}"))
            .with_cause(e)
    })
}

#[cfg(unix)]
mod imp {
    use std::io;
    use std::process::Command;

    use nix::sys::signal::{kill as nix_kill, Signal};
    use nix::unistd::Pid;

    pub fn alive(pid: u32) -> bool {
        nix_kill(Pid::from_raw(pid as i32), None).is_ok()
    }

    pub fn find_by_name(name: &str) -> io::Result<Vec<u32>> {
        let output = Command::new("ps").args(["axo", "pid,comm"]).output()?;
        let text = String::from_utf8_lossy(&output.stdout);
        let needle = name.to_lowercase();

        Ok(text
            .lines()
            .skip(1)
            .filter_map(|line| {
                let line = line.trim();
                let (pid_str, comm) = line.split_once(char::is_whitespace)?;
                let pid: u32 = pid_str.trim().parse().ok()?;
                let comm = comm.trim().to_lowercase();
                let basename = comm.rsplit('/').next().unwrap_or(&comm);
                if basename == needle || basename.ends_with(&needle) || comm.contains(&needle) {
                    Some(pid)
                } else {
                    None
                }
            })
            .collect())
    }

    pub fn graceful(pid: u32) -> io::Result<()> {
        nix_kill(Pid::from_raw(pid as i32), Signal::SIGTERM)
            .map_err(|errno| io::Error::from_raw_os_error(errno as i32))
    }

    pub fn force(pid: u32) -> io::Result<()> {
        nix_kill(Pid::from_raw(pid as i32), Signal::SIGKILL)
            .map_err(|errno| io::Error::from_raw_os_error(errno as i32))
    }
}

#[cfg(windows)]
mod imp {
    use std::io;
    use std::process::Command;

    pub fn alive(pid: u32) -> bool {
        let output = Command::new("tasklist")
            .args(["/FI", &format!("PID eq {pid}"), "/NH", "/FO", "CSV"])
            .output();
        match output {
            Ok(o) => String::from_utf8_lossy(&o.stdout).contains(&pid.to_string()),
            Err(_) => false,
        }
    }

    pub fn find_by_name(name: &str) -> io::Result<Vec<u32>> {
        let exe = if name.to_lowercase().ends_with(".exe") {
            name.to_string()
        } else {
            format!("{name}.exe")
        };

        let output = Command::new("tasklist").args(["/NH", "/FO", "CSV"]).output()?;
        let text = String::from_utf8_lossy(&output.stdout);
        let needle = exe.to_lowercase();

        Ok(text
            .lines()
            .filter_map(|line| {
                let mut fields = line.split(',').map(|f| f.trim_matches('"'));
                let image = fields.next()?.to_lowercase();
                let pid: u32 = fields.next()?.trim().parse().ok()?;
                if image == needle {
                    Some(pid)
                } else {
                    None
                }
            })
            .collect())
    }

    pub fn graceful(pid: u32) -> io::Result<()> {
        let status = Command::new("taskkill")
            .args(["/PID", &pid.to_string()])
            .status()?;
        if status.success() {
            Ok(())
        } else {
            Err(io::Error::new(io::ErrorKind::Other, "taskkill exited non-zero"))
        }
    }

    pub fn force(pid: u32) -> io::Result<()> {
        let status = Command::new("taskkill")
            .args(["/PID", &pid.to_string(), "/F"])
            .status()?;
        if status.success() {
            Ok(())
        } else {
            Err(io::Error::new(io::ErrorKind::Other, "taskkill /F exited non-zero"))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn alive_is_false_for_pid_zero() {
        assert!(!alive(0));
    }

    #[test]
    fn find_by_name_empty_needle_returns_nothing() {
        assert!(find_by_name("").unwrap().is_empty());
    }

    #[cfg(unix)]
    #[test]
    fn find_by_name_does_not_error_for_a_plausible_name() {
        // Presence is environment-dependent; this only checks the ps
        // shell-out itself succeeds and parses.
        assert!(find_by_name("init").is_ok());
    }
}
