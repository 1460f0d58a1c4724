//! RemoteWatch - terminal fleet viewer
//!
//! Polls the backend's inventory and usage endpoints, merges them per device
//! and keeps a live view on the terminal:
//! - Periodic refresh on a configurable interval
//! - Manual refresh with success/failure feedback
//! - Device selection, expandable history panels, dark theme

use anyhow::{Context, Result};
use clap::Parser;
use std::io::IsTerminal;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use remotewatch_viewer::fetcher::{HttpFetcher, TelemetrySource};
use remotewatch_viewer::merger;
use remotewatch_viewer::poller::{CycleReport, FleetSnapshot, Poller};
use remotewatch_viewer::presentation::{Notification, PresentationState};
use remotewatch_viewer::render::render;
use remotewatch_viewer::{PollerError, ViewerConfig};

/// Command line flags; they override config file and environment
#[derive(Debug, Parser)]
#[command(name = "remotewatch", version, about = "Live view of a device fleet's inventory and usage")]
struct Cli {
    /// Config file (defaults to $REMOTEWATCH_CONFIG or the user config dir)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Backend base URL, e.g. http://localhost:5000
    #[arg(long)]
    base_url: Option<String>,

    /// Poll interval in seconds
    #[arg(long)]
    interval: Option<u64>,

    /// Fetch once, print and exit
    #[arg(long)]
    once: bool,

    /// With --once, print merged devices as JSON
    #[arg(long, requires = "once")]
    json: bool,

    /// Start with the dark theme
    #[arg(long)]
    dark: bool,

    /// Write the effective configuration to the config path and exit
    #[arg(long)]
    init_config: bool,
}

/// Interactive commands read from stdin
#[derive(Debug, Clone, PartialEq, Eq)]
enum Command {
    Refresh,
    Select(String),
    ClearSelection,
    Expand(String),
    Dark,
    Help,
    Quit,
    Unknown(String),
}

impl Command {
    fn parse(line: &str) -> Option<Self> {
        let line = line.trim();
        if line.is_empty() {
            return None;
        }
        let (verb, arg) = match line.split_once(char::is_whitespace) {
            Some((verb, arg)) => (verb, arg.trim()),
            None => (line, ""),
        };

        let command = match (verb.to_lowercase().as_str(), arg) {
            ("r" | "refresh", _) => Command::Refresh,
            ("s" | "select", "") => Command::ClearSelection,
            ("s" | "select", name) => Command::Select(name.to_string()),
            ("e" | "expand", name) if !name.is_empty() => Command::Expand(name.to_string()),
            ("d" | "dark", _) => Command::Dark,
            ("h" | "help" | "?", _) => Command::Help,
            ("q" | "quit" | "exit", _) => Command::Quit,
            _ => Command::Unknown(line.to_string()),
        };
        Some(command)
    }
}

const HELP: &str =
    "commands: r(efresh) | s(elect) [name] | e(xpand) <name> | d(ark) | h(elp) | q(uit)";

fn apply_cli(config: &mut ViewerConfig, cli: &Cli) -> Result<()> {
    if let Some(url) = &cli.base_url {
        config.backend.base_url = url.clone();
    }
    if let Some(secs) = cli.interval {
        config.polling.interval_secs = secs;
    }
    if cli.dark {
        config.display.dark_mode = true;
    }
    config.validate().context("Invalid configuration")?;
    Ok(())
}

fn redraw(snapshot: &FleetSnapshot, state: &PresentationState, config: &ViewerConfig) {
    if std::io::stdout().is_terminal() {
        print!("\x1B[2J\x1B[H");
    }
    println!("{}", render(snapshot, state, &config.display));
    println!("{}", HELP);
}

async fn run_once(config: &ViewerConfig, fetcher: &HttpFetcher, json: bool) -> Result<()> {
    let (inventory, usage) = fetcher
        .fetch_all()
        .await
        .context("Failed to fetch fleet telemetry")?;
    let devices = merger::merge(&inventory, &usage, config.merge_options());

    if json {
        println!("{}", serde_json::to_string_pretty(&devices)?);
    } else {
        let snapshot = FleetSnapshot {
            devices: Arc::from(devices),
            generation: 1,
            fetched_at: Some(chrono::Utc::now()),
            ..FleetSnapshot::empty()
        };
        let state = PresentationState::new(config.display.dark_mode);
        println!("{}", render(&snapshot, &state, &config.display));
    }
    Ok(())
}

async fn run_interactive(config: ViewerConfig, fetcher: HttpFetcher) -> Result<()> {
    let poller = Poller::new(Arc::new(fetcher), config.merge_options());
    let mut updates = poller.subscribe();
    let handle = Arc::new(poller.start(config.polling.interval()));
    info!(poller = %handle.id(), "Interactive viewer ready");

    let mut state = PresentationState::new(config.display.dark_mode);
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    // At most one manual refresh in flight, awaited alongside input
    let mut refreshes: JoinSet<Result<CycleReport, PollerError>> = JoinSet::new();

    redraw(&handle.current(), &state, &config);

    loop {
        tokio::select! {
            changed = updates.changed() => {
                if changed.is_err() {
                    break;
                }
                let snapshot = updates.borrow_and_update().clone();
                redraw(&snapshot, &state, &config);
            }
            Some(joined) = refreshes.join_next(), if !refreshes.is_empty() => {
                match joined {
                    Ok(outcome) => state.notify(Notification::from_refresh(&outcome)),
                    Err(e) => warn!("Manual refresh task failed: {}", e),
                }
                redraw(&handle.current(), &state, &config);
            }
            line = lines.next_line() => {
                let line = match line {
                    Ok(Some(line)) => line,
                    Ok(None) => break,
                    Err(e) => {
                        warn!("stdin closed: {}", e);
                        break;
                    }
                };
                let Some(command) = Command::parse(&line) else { continue };
                debug!("Command: {:?}", command);

                match command {
                    Command::Refresh => {
                        if refreshes.is_empty() {
                            let handle = handle.clone();
                            refreshes.spawn(async move { handle.refresh_now().await });
                        } else {
                            println!("refresh already in progress");
                        }
                        continue;
                    }
                    Command::Select(name) => state.select(name),
                    Command::ClearSelection => state.clear_selection(),
                    Command::Expand(name) => {
                        state.toggle_expanded(&name);
                    }
                    Command::Dark => {
                        state.toggle_dark_mode();
                    }
                    Command::Help => {}
                    Command::Quit => break,
                    Command::Unknown(input) => println!("unknown command: {}", input),
                }
                redraw(&handle.current(), &state, &config);
            }
            _ = tokio::signal::ctrl_c() => {
                info!("Interrupted");
                break;
            }
        }
    }

    refreshes.abort_all();
    handle.stop().await;
    info!("Viewer stopped");
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("remotewatch_viewer=info,remotewatch=info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let mut config = ViewerConfig::load(cli.config.as_deref()).context("Failed to load configuration")?;
    apply_cli(&mut config, &cli)?;

    if cli.init_config {
        let path = match cli.config.clone().or_else(ViewerConfig::config_file_path) {
            Some(path) => path,
            None => anyhow::bail!("No config directory on this platform, pass --config"),
        };
        config.save(&path).await.context("Failed to write configuration")?;
        println!("Configuration written to {}", path.display());
        return Ok(());
    }

    info!(
        "RemoteWatch viewer starting (backend {}, every {}s)",
        config.backend.base_url, config.polling.interval_secs
    );
    let fetcher = HttpFetcher::new(&config.backend).context("Failed to build HTTP client")?;

    if cli.once {
        run_once(&config, &fetcher, cli.json).await
    } else {
        run_interactive(config, fetcher).await
    }
}
