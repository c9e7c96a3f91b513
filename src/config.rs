//! The configuration store named as an external collaborator in spec.md
//! §6: a TOML file of `GameRecord`s (a `LaunchSpec` plus human metadata)
//! keyed by game id.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};

use crate::process::types::{LaunchMode, LaunchSpec};

/// A `LaunchSpec` plus the human-facing metadata the CLI/MCP surface shows.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GameRecord {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
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

impl GameRecord {
    pub fn to_launch_spec(&self, game_id: &str) -> LaunchSpec {
        LaunchSpec {
            game_id: game_id.to_string(),
            mode: self.mode,
            target: self.target.clone(),
            args: self.args.clone(),
            working_dir: self.working_dir.clone(),
            stop_process_name: self.stop_process_name.clone(),
        }
    }

    /// Mirrors Controller::configure's own validation so a bad record is
    /// rejected when it's written, not discovered later at Start.
    fn validate(&self, game_id: &str) -> Result<()> {
        if game_id.trim().is_empty() {
            bail!("GameId must not be empty");
        }
        if self.target.trim().is_empty() {
            bail!("target must not be empty for game '{game_id}'");
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GamesConfig {
    #[serde(default)]
    games: HashMap<String, GameRecord>,
}

impl GamesConfig {
    pub fn get_game(&self, id: &str) -> Option<&GameRecord> {
        self.games.get(id)
    }

    pub fn list_games(&self) -> impl Iterator<Item = (&String, &GameRecord)> {
        self.games.iter()
    }

    pub fn add_game(&mut self, id: impl Into<String>, record: GameRecord) -> Result<()> {
        let id = id.into();
        record.validate(&id)?;
        self.games.insert(id, record);
        Ok(())
    }

    pub fn remove_game(&mut self, id: &str) -> Option<GameRecord> {
        self.games.remove(id)
    }
}

/// `<config_dir()>/gabs`; the parent of `games.toml` and the `run/` runtime
/// bookkeeping directory.
pub fn default_config_dir() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| dirs::home_dir().unwrap_or_else(|| PathBuf::from(".")).join(".config"))
        .join("gabs")
}

fn games_path(dir: &Path) -> PathBuf {
    dir.join("games.toml")
}

pub fn load_games_config(dir: &Path) -> Result<GamesConfig> {
    let path = games_path(dir);
    if !path.exists() {
        return Ok(GamesConfig::default());
    }
    let contents = std::fs::read_to_string(&path)
        .with_context(|| format!("reading games config at {}", path.display()))?;
    toml::from_str(&contents).with_context(|| format!("parsing games config at {}", path.display()))
}

pub fn save_games_config(dir: &Path, cfg: &GamesConfig) -> Result<()> {
    std::fs::create_dir_all(dir).with_context(|| format!("creating config dir {}", dir.display()))?;
    let path = games_path(dir);
    let contents = toml::to_string_pretty(cfg).context("serializing games config")?;
    std::fs::write(&path, contents).with_context(|| format!("writing games config at {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(target: &str) -> GameRecord {
        GameRecord {
            name: "Test Game".to_string(),
            description: None,
            mode: LaunchMode::DirectPath,
            target: target.to_string(),
            args: vec![],
            working_dir: None,
            stop_process_name: None,
        }
    }

    #[test]
    fn add_game_rejects_empty_target() {
        let mut cfg = GamesConfig::default();
        assert!(cfg.add_game("g1", record("")).is_err());
    }

    #[test]
    fn add_game_rejects_empty_id() {
        let mut cfg = GamesConfig::default();
        assert!(cfg.add_game("", record("/bin/echo")).is_err());
    }

    #[test]
    fn round_trips_through_toml() {
        let dir = tempfile::tempdir().unwrap();
        let mut cfg = GamesConfig::default();
        cfg.add_game("g1", record("/bin/echo")).unwrap();
        save_games_config(dir.path(), &cfg).unwrap();

        let loaded = load_games_config(dir.path()).unwrap();
        let rec = loaded.get_game("g1").unwrap();
        assert_eq!(rec.target, "/bin/echo");
    }

    #[test]
    fn missing_file_loads_as_empty() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = load_games_config(dir.path()).unwrap();
        assert!(cfg.list_games().next().is_none());
    }

    #[test]
    fn remove_game_drops_the_record() {
        let mut cfg = GamesConfig::default();
        cfg.add_game("g1", record("/bin/echo")).unwrap();
        assert!(cfg.remove_game("g1").is_some());
        assert!(cfg.get_game("g1").is_none());
    }
}
