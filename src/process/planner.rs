//! C2: turns a (LaunchSpec, BridgeInfo) into an `ExecutionPlan`. Pure and
//! stateless besides the Steam executable discovery, which only reads the
//! filesystem and PATH.

use std::path::{Path, PathBuf};

use crate::process::types::{BridgeInfo, ExecutionPlan, LaunchMode, LaunchSpec};

/// Fixed, platform-specific candidate paths for a Steam installation,
/// checked in order; the first that exists and is executable wins.
#[cfg(target_os = "linux")]
fn steam_candidates() -> Vec<PathBuf> {
    let home = dirs::home_dir().unwrap_or_else(|| PathBuf::from("/"));
    vec![
        PathBuf::from("/usr/bin/steam"),
        PathBuf::from("/usr/games/steam"),
        PathBuf::from("/var/lib/flatpak/exports/bin/com.valvesoftware.Steam"),
        home.join(".local/share/flatpak/exports/bin/com.valvesoftware.Steam"),
        home.join(".steam/steam/steam.sh"),
    ]
}

#[cfg(target_os = "macos")]
fn steam_candidates() -> Vec<PathBuf> {
    vec![PathBuf::from("/Applications/Steam.app")]
}

#[cfg(target_os = "windows")]
fn steam_candidates() -> Vec<PathBuf> {
    vec![
        PathBuf::from("C:\\Program Files (x86)\\Steam\\steam.exe"),
        PathBuf::from("C:\\Program Files\\Steam\\steam.exe"),
    ]
}

#[cfg(not(any(target_os = "linux", target_os = "macos", target_os = "windows")))]
fn steam_candidates() -> Vec<PathBuf> {
    Vec::new()
}

fn is_executable(path: &Path) -> bool {
    if !path.exists() {
        return false;
    }
    // A macOS .app bundle qualifies without an executable bit of its own.
    if path.extension().and_then(|e| e.to_str()) == Some("app") {
        return true;
    }
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::metadata(path)
            .map(|m| m.permissions().mode() & 0o111 != 0)
            .unwrap_or(false)
    }
    #[cfg(not(unix))]
    {
        true
    }
}

/// Locates an installed Steam executable, falling back to a PATH lookup.
fn discover_steam() -> Option<PathBuf> {
    steam_candidates()
        .into_iter()
        .find(|p| is_executable(p))
        .or_else(|| which::which("steam").ok())
}

/// The system default URI opener: `cmd /c start` on Windows, `open` on
/// macOS, `xdg-open` everywhere else.
fn uri_opener_argv(uri: &str) -> (String, Vec<String>) {
    if cfg!(target_os = "windows") {
        (
            "cmd".to_string(),
            vec!["/c".to_string(), "start".to_string(), String::new(), uri.to_string()],
        )
    } else if cfg!(target_os = "macos") {
        ("open".to_string(), vec![uri.to_string()])
    } else {
        ("xdg-open".to_string(), vec![uri.to_string()])
    }
}

fn bridge_path(game_id: &str) -> PathBuf {
    match dirs::home_dir() {
        Some(home) => home.join(".gabs").join(game_id).join("bridge.json"),
        None => PathBuf::from(".gabs").join(game_id).join("bridge.json"),
    }
}

/// Builds the argv/env/cwd the Controller should spawn.
pub fn plan(spec: &LaunchSpec, bridge: Option<&BridgeInfo>) -> ExecutionPlan {
    let (program, args) = match spec.mode {
        LaunchMode::DirectPath | LaunchMode::CustomCommand => {
            (spec.target.clone(), spec.args.clone())
        }
        LaunchMode::SteamAppId => match discover_steam() {
            Some(steam) => (
                steam.to_string_lossy().into_owned(),
                vec!["-applaunch".to_string(), spec.target.clone()],
            ),
            None => {
                let uri = format!("steam://rungameid/{}", spec.target);
                uri_opener_argv(&uri)
            }
        },
        LaunchMode::EpicAppId => {
            let uri = format!(
                "com.epicgames.launcher://apps/{}?action=launch&silent=true",
                spec.target
            );
            uri_opener_argv(&uri)
        }
    };

    let mut env: Vec<(String, String)> = std::env::vars().collect();

    #[cfg(windows)]
    {
        if !env.iter().any(|(k, _)| k == "SystemRoot") {
            env.push(("SystemRoot".to_string(), "C:\\Windows".to_string()));
        }
        if !env.iter().any(|(k, _)| k == "WINDIR") {
            env.push(("WINDIR".to_string(), "C:\\Windows".to_string()));
        }
    }

    env.push(("GABS_GAME_ID".to_string(), spec.game_id.clone()));
    env.push((
        "GABS_BRIDGE_PATH".to_string(),
        bridge_path(&spec.game_id).to_string_lossy().into_owned(),
    ));

    if let Some(bridge) = bridge {
        env.push(("GABP_SERVER_PORT".to_string(), bridge.port.to_string()));
        env.push(("GABP_TOKEN".to_string(), bridge.token.clone()));
    }

    ExecutionPlan {
        program,
        args,
        env,
        working_dir: spec.working_dir.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spec(mode: LaunchMode, target: &str) -> LaunchSpec {
        LaunchSpec {
            game_id: "g1".to_string(),
            mode,
            target: target.to_string(),
            args: vec!["--flag".to_string()],
            working_dir: None,
            stop_process_name: None,
        }
    }

    #[test]
    fn direct_path_forwards_target_and_args() {
        let plan = plan(&spec(LaunchMode::DirectPath, "/bin/echo"), None);
        assert_eq!(plan.program, "/bin/echo");
        assert_eq!(plan.args, vec!["--flag".to_string()]);
    }

    #[test]
    fn custom_command_forwards_target_and_args() {
        let plan = plan(&spec(LaunchMode::CustomCommand, "my-tool"), None);
        assert_eq!(plan.program, "my-tool");
        assert_eq!(plan.args, vec!["--flag".to_string()]);
    }

    #[test]
    fn epic_always_uses_the_uri_opener() {
        let plan = plan(&spec(LaunchMode::EpicAppId, "abc123"), None);
        assert!(plan.args.iter().any(|a| a.contains("com.epicgames.launcher")));
    }

    #[test]
    fn env_carries_game_id_and_bridge_path() {
        let plan = plan(&spec(LaunchMode::DirectPath, "/bin/echo"), None);
        assert!(plan.env.iter().any(|(k, v)| k == "GABS_GAME_ID" && v == "g1"));
        assert!(plan
            .env
            .iter()
            .any(|(k, v)| k == "GABS_BRIDGE_PATH" && v.contains("g1")));
    }

    #[test]
    fn bridge_info_adds_port_and_token() {
        let bridge = BridgeInfo { port: 4000, token: "tok".to_string() };
        let plan = plan(&spec(LaunchMode::DirectPath, "/bin/echo"), Some(&bridge));
        assert!(plan.env.iter().any(|(k, v)| k == "GABP_SERVER_PORT" && v == "4000"));
        assert!(plan.env.iter().any(|(k, v)| k == "GABP_TOKEN" && v == "tok"));
    }
}
