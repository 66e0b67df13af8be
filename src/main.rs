//! Hive - CLI entry point
//!
//! Thin command-line front end over the `hive` library: run the coordination
//! core in the foreground, manage sessions, and manage the configuration file.

use clap::{Parser, Subcommand};
use hive::app::App;
use hive::config::{default, xdg, ConfigLoader};
use hive::store::{JsonFileStore, SessionStore};
use hive::{logging, SessionState};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tokio::signal;
use tokio::signal::unix::{signal as unix_signal, SignalKind};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

/// Hive session fleet
#[derive(Parser)]
#[command(name = "hive")]
#[command(version, about = "Reusable git-clone sessions for agent terminals")]
struct Cli {
    /// Configuration file (default: $XDG_CONFIG_HOME/hive/config.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Data directory (default: $XDG_DATA_HOME/hive)
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

/// Available subcommands for the hive CLI
#[derive(Subcommand)]
enum Commands {
    /// Run the event bus, notification router and periodic status refresh in the foreground
    Watch,

    /// List sessions
    Ls {
        /// Only show sessions in this state (active, recycled, corrupted)
        #[arg(long)]
        state: Option<SessionState>,
    },

    /// Create a session, reusing a recycled clone of the remote if one exists
    New {
        /// Session name
        name: String,
        /// Git remote to clone
        #[arg(long)]
        remote: String,
    },

    /// Reset a session's clone and return it to the recycle pool
    Recycle {
        /// Session ID
        id: String,
    },

    /// Delete a session and its clone
    Rm {
        /// Session ID
        id: String,
    },

    /// Delete recycled clones beyond the configured per-remote limit
    Prune,

    /// Print each plugin's status for the active sessions
    Status,

    /// Manage configuration file
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

/// Actions for the `config` subcommand.
#[derive(Subcommand)]
enum ConfigAction {
    /// Create default configuration file
    Init {
        /// Overwrite existing configuration (creates backup)
        #[arg(long)]
        force: bool,
    },
    /// Show configuration file path
    Path,
    /// Validate configuration file
    Validate,
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    let config_path = cli.config.clone().unwrap_or_else(xdg::config_path);

    if let Commands::Config { action } = &cli.command {
        return run_config_command(action, &config_path, cli.config.is_some());
    }

    let config = match ConfigLoader::load(cli.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Config error: {e}");
            return ExitCode::FAILURE;
        }
    };
    if let Err(e) = logging::init(&config.log) {
        eprintln!("Error: cannot open log file: {e}");
        return ExitCode::FAILURE;
    }
    let data_dir = cli.data_dir.clone().unwrap_or_else(xdg::data_dir);

    let rt = match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("Error: failed to start runtime: {e}");
            return ExitCode::FAILURE;
        }
    };

    if let Commands::Ls { state } = &cli.command {
        return rt.block_on(run_ls_command(&data_dir, *state));
    }

    let app = match App::new(config, &data_dir) {
        Ok(app) => app,
        Err(e) => {
            eprintln!("Error: {e}");
            return ExitCode::FAILURE;
        }
    };

    let result = rt.block_on(run_command(&app, cli.command));

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e}");
            ExitCode::FAILURE
        }
    }
}

/// Runs one session or status command against the assembled application.
///
/// One-shot commands run with the bus dispatching, so their events reach the
/// notification router and log sink before the process exits.
async fn run_command(app: &App, command: Commands) -> Result<(), Box<dyn std::error::Error>> {
    if let Commands::Watch = command {
        return Ok(run_watch(app).await?);
    }
    let dispatch = app.dispatch_events()?;
    let result = run_one_shot(app, command).await;
    dispatch.finish().await;
    result
}

async fn run_one_shot(app: &App, command: Commands) -> Result<(), Box<dyn std::error::Error>> {
    match command {
        Commands::New { name, remote } => {
            let session = app.service().create(&name, &remote).await?;
            println!("{}\t{}", session.id, session.path.display());
        }
        Commands::Recycle { id } => {
            app.service().recycle(&id).await?;
            println!("recycled {id}");
        }
        Commands::Rm { id } => {
            app.service().delete(&id).await?;
            println!("deleted {id}");
        }
        Commands::Prune => {
            for id in app.service().prune_all().await? {
                println!("pruned {id}");
            }
        }
        Commands::Status => {
            let token = CancellationToken::new();
            let mut plugins: Vec<_> = app.refresh_statuses(&token).await.into_iter().collect();
            plugins.sort_by(|a, b| a.0.cmp(&b.0));
            for (plugin, statuses) in plugins {
                let mut rows: Vec<_> = statuses.into_iter().collect();
                rows.sort_by(|a, b| a.0.cmp(&b.0));
                for (id, status) in rows {
                    println!("{id}\t{plugin}\t{} {}", status.icon, status.label);
                }
            }
        }
        Commands::Watch | Commands::Ls { .. } | Commands::Config { .. } => {}
    }
    Ok(())
}

/// Runs the application until SIGINT or SIGTERM.
async fn run_watch(app: &App) -> Result<(), hive::app::AppError> {
    let token = CancellationToken::new();
    let shutdown = {
        let token = token.clone();
        tokio::spawn(async move {
            wait_for_shutdown().await;
            token.cancel();
        })
    };
    let result = app.run(token).await;
    shutdown.abort();
    result
}

/// Waits for SIGINT (Ctrl+C) or SIGTERM.
async fn wait_for_shutdown() {
    match unix_signal(SignalKind::terminate()) {
        Ok(mut sigterm) => {
            tokio::select! {
                _ = signal::ctrl_c() => {
                    info!("received SIGINT (Ctrl+C), shutting down");
                },
                _ = sigterm.recv() => {
                    info!("received SIGTERM, shutting down");
                },
            }
        }
        Err(e) => {
            warn!(error = %e, "could not register SIGTERM handler, using SIGINT only");
            if let Err(e) = signal::ctrl_c().await {
                error!(error = %e, "failed waiting for SIGINT");
            } else {
                info!("received SIGINT (Ctrl+C), shutting down");
            }
        }
    }
}

/// Prints sessions from the data directory as a tab-separated table.
async fn run_ls_command(data_dir: &Path, state: Option<SessionState>) -> ExitCode {
    let store = JsonFileStore::in_dir(data_dir);
    let sessions = match store.list().await {
        Ok(sessions) => sessions,
        Err(e) => {
            eprintln!("Error: {e}");
            return ExitCode::FAILURE;
        }
    };
    println!("ID\tSTATE\tNAME\tREMOTE\tPATH");
    for s in sessions
        .iter()
        .filter(|s| state.map_or(true, |state| s.state == state))
    {
        println!(
            "{}\t{}\t{}\t{}\t{}",
            s.id,
            s.state,
            s.name,
            s.remote,
            s.path.display()
        );
    }
    ExitCode::SUCCESS
}

fn run_config_command(action: &ConfigAction, path: &Path, explicit: bool) -> ExitCode {
    let result = match action {
        ConfigAction::Init { force } => match default::create_default_config(path, *force) {
            Ok(path) => {
                println!("Created configuration at {}", path.display());
                Ok(())
            }
            Err(e) => Err(e),
        },
        ConfigAction::Path => {
            println!("{}", path.display());
            Ok(())
        }
        ConfigAction::Validate => {
            let loaded = if explicit {
                ConfigLoader::load_from_path(path)
            } else {
                ConfigLoader::load_default()
            };
            match loaded {
                Ok(config) => {
                    println!("Configuration is valid");
                    println!("{config:#?}");
                    Ok(())
                }
                Err(e) => Err(e),
            }
        }
    };
    if let Err(e) = result {
        eprintln!("Config error: {e}");
        return ExitCode::FAILURE;
    }
    ExitCode::SUCCESS
}
