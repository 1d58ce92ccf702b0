mod commands;

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{ArgAction, Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use tsuzuki_core::config::{AppConfig, BackendKind};
use tsuzuki_core::episodes::EpisodeRange;

/// Keep track of your anime list and the episodes you've watched.
#[derive(Debug, Parser)]
#[command(name = "tsuzuki", version, about)]
struct Cli {
    /// Config file to use instead of the platform default.
    #[arg(long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Storage backend: file, sqlite, or memory.
    #[arg(long, global = true, value_parser = parse_backend)]
    backend: Option<BackendKind>,

    /// Directory holding the persisted list.
    #[arg(long, global = true, value_name = "DIR")]
    data_dir: Option<PathBuf>,

    /// More log output (-v info, -vv debug). RUST_LOG takes precedence.
    #[arg(short, long, global = true, action = ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Add an anime to your list (or refresh its details).
    Add {
        id: String,
        title: String,
        /// Cover image URL or path.
        #[arg(long, default_value = "")]
        image: String,
        /// Total number of episodes.
        #[arg(long, default_value_t = 0)]
        episodes: u32,
    },
    /// Remove an anime from your list.
    Remove { id: String },
    /// Mark an episode as opened.
    Watch { id: String, episode: u32 },
    /// Show your list.
    List {
        /// Print the records as JSON.
        #[arg(long)]
        json: bool,
    },
    /// Show the most recently watched anime.
    Recent {
        #[arg(long, default_value_t = 5)]
        limit: usize,
    },
    /// Show the episode grid for an anime.
    Episodes {
        id: String,
        /// Page to show, e.g. `101-200`. Defaults to the first page.
        #[arg(long, value_parser = parse_range)]
        range: Option<EpisodeRange>,
    },
    /// List the episode pages for a series of `total` episodes.
    Ranges { total: u32 },
    /// Remove every anime from your list.
    Clear,
    /// Back up a saved list that can no longer be read and start a fresh one.
    Repair,
    /// Print config and storage locations.
    Config {
        /// Write the active config to the config path if no file exists there.
        #[arg(long)]
        init: bool,
    },
}

fn parse_backend(s: &str) -> Result<BackendKind, String> {
    s.parse().map_err(|e: tsuzuki_core::error::TsuzukiError| e.to_string())
}

fn parse_range(s: &str) -> Result<EpisodeRange, String> {
    s.parse().map_err(|e: tsuzuki_core::error::TsuzukiError| e.to_string())
}

fn init_tracing(verbose: u8) {
    let level = match verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("tsuzuki_core={level},tsuzuki={level}")));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let (config_path, loaded) = match cli.config {
        Some(path) => {
            let loaded = AppConfig::load_from(&path);
            (path, loaded)
        }
        None => (AppConfig::config_path(), AppConfig::load()),
    };
    let mut config = match loaded {
        Ok(config) => config,
        Err(e) => {
            eprintln!("error: {e}");
            return ExitCode::FAILURE;
        }
    };
    if let Some(backend) = cli.backend {
        config.storage.backend = backend;
    }
    if let Some(dir) = cli.data_dir {
        config.storage.data_dir = Some(dir);
    }

    match commands::run(cli.command, &config, &config_path) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::debug!(error = ?e, "Command failed");
            eprintln!("error: {e}");
            ExitCode::FAILURE
        }
    }
}
