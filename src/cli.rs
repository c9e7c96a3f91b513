use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::Utc;
use clap::{Parser, Subcommand};
use colored::Colorize;

use gabs::config::{self, GameRecord};
use gabs::error::ProcessError;
use gabs::gabp::{GabpConnector, NullGabpConnector};
use gabs::process::{Controller, LaunchMode, ProcessState, StartTimeouts, Starter, StatusView};
use gabs::runtime::{self, RuntimeRecord};

#[derive(Parser)]
#[command(
    name = "gabs",
    author,
    version,
    about = "GABS — bridges long-running game processes into an MCP tool surface",
    long_about = "Launches or attaches to a game process, tracks its lifecycle across \
                  direct, Steam, Epic, and custom-command launch modes, and exposes \
                  Start/Stop/Kill/Status over this CLI as a stand-in for the MCP tool surface."
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    #[arg(long, global = true, help = "Override the config directory (default: <config_dir>/gabs)")]
    pub config_dir: Option<PathBuf>,

    #[arg(long, global = true, help = "Use the 3s/2s testing timeout preset instead of 10s/30s")]
    pub fast_timeouts: bool,
}

#[derive(Subcommand)]
pub enum Commands {
    #[command(about = "Manage games in the config store and drive their lifecycle")]
    Game {
        #[command(subcommand)]
        action: GameCommands,
    },
}

#[derive(Subcommand)]
pub enum GameCommands {
    #[command(about = "Add or replace a game record")]
    Add {
        #[arg(help = "Unique game id")]
        id: String,
        #[arg(long, help = "Human-readable name")]
        name: String,
        #[arg(long, help = "Human-readable description")]
        description: Option<String>,
        #[arg(
            long,
            value_parser = parse_mode,
            default_value = "direct_path",
            help = "direct_path | steam_app_id | epic_app_id | custom_command"
        )]
        mode: LaunchMode,
        #[arg(long, help = "Executable path, store app id, or command, depending on mode")]
        target: String,
        #[arg(long = "arg", help = "Extra argv entry; repeatable. Forwarded only for direct_path/custom_command")]
        args: Vec<String>,
        #[arg(long, help = "Working directory for the spawned process")]
        working_dir: Option<PathBuf>,
        #[arg(long, help = "Executable basename used to find/stop the real game in launcher modes")]
        stop_process_name: Option<String>,
    },

    #[command(about = "List configured games")]
    List {
        #[arg(long, help = "Emit JSON instead of a table")]
        json: bool,
    },

    #[command(about = "Show one game's configured record")]
    Show {
        id: String,
        #[arg(long)]
        json: bool,
    },

    #[command(about = "Remove a game record")]
    Remove { id: String },

    #[command(about = "Validate a game's LaunchSpec without starting it")]
    Configure { id: String },

    #[command(about = "Start a game through the Serialized Starter")]
    Start {
        id: String,
        #[arg(long, help = "TCP port the game must bind to host GABP")]
        port: Option<u16>,
        #[arg(long, help = "GABP auth token; a random one is generated if omitted")]
        token: Option<String>,
        #[arg(long)]
        json: bool,
    },

    #[command(about = "Stop a previously started game: graceful signal, then force-kill after the grace window")]
    Stop {
        id: String,
        #[arg(long, default_value_t = 5000, help = "Grace window in milliseconds before force-kill")]
        grace_ms: u64,
    },

    #[command(about = "Force-kill a previously started game immediately")]
    Kill { id: String },

    #[command(about = "Report a game's running state")]
    Status {
        id: String,
        #[arg(long)]
        json: bool,
    },
}

fn parse_mode(s: &str) -> Result<LaunchMode, String> {
    LaunchMode::parse(s).ok_or_else(|| format!("unrecognized mode '{s}'"))
}

impl Cli {
    pub async fn execute(self) -> Result<()> {
        let config_dir = self.config_dir.unwrap_or_else(config::default_config_dir);
        let timeouts = if self.fast_timeouts {
            StartTimeouts::testing()
        } else {
            StartTimeouts::default()
        };

        let result = match self.command {
            Commands::Game { action } => run_game_command(action, &config_dir, timeouts).await,
        };

        if let Err(err) = result {
            if let Some(process_err) = err.downcast_ref::<ProcessError>() {
                eprintln!("{}", process_err.to_string().red());
                std::process::exit(process_err.exit_code());
            }
            eprintln!("{}", format!("{err:#}").red());
            std::process::exit(1);
        }
        Ok(())
    }
}

async fn run_game_command(cmd: GameCommands, config_dir: &std::path::Path, timeouts: StartTimeouts) -> Result<()> {
    match cmd {
        GameCommands::Add {
            id,
            name,
            description,
            mode,
            target,
            args,
            working_dir,
            stop_process_name,
        } => {
            let mut cfg = config::load_games_config(config_dir)?;
            cfg.add_game(
                &id,
                GameRecord {
                    name,
                    description,
                    mode,
                    target,
                    args,
                    working_dir,
                    stop_process_name,
                },
            )?;
            config::save_games_config(config_dir, &cfg)?;
            println!("{}", format!("added game '{id}'").green());
            Ok(())
        }

        GameCommands::List { json } => {
            let cfg = config::load_games_config(config_dir)?;
            if json {
                let map: std::collections::BTreeMap<_, _> = cfg.list_games().collect();
                println!("{}", serde_json::to_string_pretty(&map)?);
            } else {
                for (id, rec) in cfg.list_games() {
                    println!("{}  {}  ({} -> {})", id.bold(), rec.name, rec.mode.as_str(), rec.target);
                }
            }
            Ok(())
        }

        GameCommands::Show { id, json } => {
            let cfg = config::load_games_config(config_dir)?;
            let rec = cfg.get_game(&id).with_context(|| format!("no game '{id}' in config"))?;
            if json {
                println!("{}", serde_json::to_string_pretty(rec)?);
            } else {
                println!("{rec:#?}");
            }
            Ok(())
        }

        GameCommands::Remove { id } => {
            let mut cfg = config::load_games_config(config_dir)?;
            cfg.remove_game(&id).with_context(|| format!("no game '{id}' in config"))?;
            config::save_games_config(config_dir, &cfg)?;
            println!("{}", format!("removed game '{id}'").yellow());
            Ok(())
        }

        GameCommands::Configure { id } => {
            let spec = load_spec(config_dir, &id)?;
            let controller = Controller::new();
            controller.configure(spec)?;
            println!("{}", format!("'{id}' configured ok").green());
            Ok(())
        }

        GameCommands::Start { id, port, token, json } => start_game(config_dir, &id, port, token, timeouts, json).await,

        GameCommands::Stop { id, grace_ms } => stop_game(config_dir, &id, Duration::from_millis(grace_ms)).await,

        GameCommands::Kill { id } => kill_game(config_dir, &id).await,

        GameCommands::Status { id, json } => status_game(config_dir, &id, json),
    }
}

fn load_spec(config_dir: &std::path::Path, id: &str) -> Result<gabs::process::LaunchSpec> {
    let cfg = config::load_games_config(config_dir)?;
    let rec = cfg.get_game(id).with_context(|| format!("no game '{id}' in config"))?;
    Ok(rec.to_launch_spec(id))
}

async fn start_game(
    config_dir: &std::path::Path,
    id: &str,
    port: Option<u16>,
    token: Option<String>,
    timeouts: StartTimeouts,
    json: bool,
) -> Result<()> {
    let spec = load_spec(config_dir, id)?;
    let mode = spec.mode;
    let target = spec.target.clone();
    let stop_process_name = spec.stop_process_name.clone();

    let controller = Controller::new();
    controller.configure(spec)?;

    let token = token.unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
    if let Some(port) = port {
        controller.set_bridge_info(port, token.clone())?;
    }

    let starter = Starter::new(timeouts);
    let connector: Arc<dyn GabpConnector> = Arc::new(NullGabpConnector);
    let outcome = starter
        .start_with_verification(&controller, Some(connector), id, port.unwrap_or(0), &token)
        .await?;

    let record = RuntimeRecord {
        game_id: id.to_string(),
        pid: controller.pid(),
        mode,
        target,
        stop_process_name,
        started_at: Utc::now(),
    };
    runtime::write(config_dir, &record)?;

    if json {
        println!(
            "{}",
            serde_json::to_string_pretty(&serde_json::json!({
                "processStarted": outcome.process_started,
                "gabpConnected": outcome.gabp_connected,
                "pid": controller.pid(),
            }))?
        );
    } else {
        println!(
            "{} pid={} gabpConnected={}",
            format!("'{id}' started").green(),
            controller.pid(),
            outcome.gabp_connected
        );
    }

    // The CLI invocation ends here; the child (and, for launcher modes, the
    // game it spawned) outlives it. A later `stop`/`kill`/`status` invocation
    // picks the game back up from the runtime record, not from this
    // Controller — see runtime.rs.
    controller.cleanup();
    Ok(())
}

async fn stop_game(config_dir: &std::path::Path, id: &str, grace: Duration) -> Result<()> {
    let record = runtime::read(config_dir, id)
        .with_context(|| format!("no running record for '{id}'; was it started by this CLI?"))?;
    runtime::terminate(&record, grace).await?;
    runtime::remove(config_dir, id);
    println!("{}", format!("'{id}' stopped").green());
    Ok(())
}

async fn kill_game(config_dir: &std::path::Path, id: &str) -> Result<()> {
    let record = runtime::read(config_dir, id)
        .with_context(|| format!("no running record for '{id}'; was it started by this CLI?"))?;
    runtime::force_kill(&record).await?;
    runtime::remove(config_dir, id);
    println!("{}", format!("'{id}' killed").yellow());
    Ok(())
}

fn status_game(config_dir: &std::path::Path, id: &str, json: bool) -> Result<()> {
    let view = match runtime::read(config_dir, id) {
        Some(record) => runtime::probe_status(&record),
        None => StatusView {
            running: false,
            pid: 0,
            game_id: id.to_string(),
            launch_mode: LaunchMode::DirectPath,
            stop_process_name: None,
            state: ProcessState::Stopped,
            since: None,
            error: None,
        },
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&view)?);
    } else {
        println!(
            "{}: running={} pid={} state={}",
            id.bold(),
            view.running,
            view.pid,
            view.state.as_str()
        );
    }
    Ok(())
}
