//! quadmap - corner-mapping backend for the video geometry editor
//!
//! `serve` exposes the live transform over HTTP for the browser editor.
//! `solve` computes the transform for a settings file once and prints it.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde::Serialize;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, Level};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use quadmap::config::{Config, MediaConfig};
use quadmap::live::Snapshot;
use quadmap::server::{self, AppState};
use quadmap::transform::Mesh;
use quadmap::TransformSettings;

/// quadmap - perspective corner mapping for video feeds
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Configuration file path
    #[arg(short, long, default_value = "config.toml", global = true)]
    config: PathBuf,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the editor API server
    Serve {
        /// Web server host (overrides config)
        #[arg(long)]
        host: Option<String>,

        /// Web server port (overrides config)
        #[arg(short, long)]
        port: Option<u16>,
    },
    /// Solve a settings document once and print the result as JSON
    Solve {
        /// Settings JSON file, or "-" for stdin
        settings: PathBuf,

        /// Source media width (overrides config)
        #[arg(long)]
        width: Option<u32>,

        /// Source media height (overrides config)
        #[arg(long)]
        height: Option<u32>,

        /// Also emit a projective mesh with this many columns and rows
        #[arg(long, value_names = ["COLS", "ROWS"], num_args = 2)]
        mesh: Option<Vec<u32>>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize logging; RUST_LOG takes precedence over --verbose
    let log_level = if args.verbose { Level::DEBUG } else { Level::INFO };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(log_level.as_str().to_lowercase()));
    FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .compact()
        .init();

    info!("quadmap v{}", env!("CARGO_PKG_VERSION"));

    let config = Config::load_or_create(&args.config)?;

    match args.command {
        Command::Serve { host, port } => serve(config, host, port).await,
        Command::Solve {
            settings,
            width,
            height,
            mesh,
        } => {
            let media = MediaConfig {
                width: width.unwrap_or(config.media.width),
                height: height.unwrap_or(config.media.height),
            };
            let mesh = mesh.map(|v| (v[0], v[1]));
            solve_once(&settings, media, mesh)
        }
    }
}

async fn serve(config: Config, host: Option<String>, port: Option<u16>) -> Result<()> {
    let host = host.unwrap_or_else(|| config.server.host.clone());
    let port = port.unwrap_or(config.server.port);

    info!(
        "Media: {}x{}, default mesh {}x{}",
        config.media.width, config.media.height, config.mesh.cols, config.mesh.rows
    );

    let state = Arc::new(AppState::new(&config).context("Default settings do not solve")?);

    let addr = format!("{}:{}", host, port);
    info!("Starting web server at http://{}", addr);

    let server_handle = tokio::spawn(async move { server::run_server(&addr, state).await });

    tokio::select! {
        result = server_handle => {
            match result {
                Ok(Ok(())) => info!("Server exited normally"),
                Ok(Err(e)) => tracing::error!("Server error: {}", e),
                Err(e) => tracing::error!("Server task panicked: {}", e),
            }
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Interrupted, shutting down");
        }
    }

    Ok(())
}

#[derive(Serialize)]
struct SolveOutput {
    #[serde(flatten)]
    snapshot: Snapshot,
    #[serde(skip_serializing_if = "Option::is_none")]
    mesh: Option<Mesh>,
}

fn solve_once(path: &Path, media: MediaConfig, mesh: Option<(u32, u32)>) -> Result<()> {
    let settings = read_settings(path)?;
    let snapshot = Snapshot::compute(media, settings, 0)
        .with_context(|| format!("Cannot solve settings from {:?}", path))?;

    if !snapshot.composed.is_affine() {
        info!(
            "Affine approximation is off by up to {:.2}px at the corners",
            snapshot.affine.max_corner_error
        );
    }

    let mesh = match mesh {
        Some((cols, rows)) => Some(snapshot.mesh(cols, rows)?),
        None => None,
    };

    let output = SolveOutput { snapshot, mesh };
    println!(
        "{}",
        serde_json::to_string_pretty(&output).context("Failed to serialize result")?
    );
    Ok(())
}

fn read_settings(path: &Path) -> Result<TransformSettings> {
    let content = if path == Path::new("-") {
        let mut buf = String::new();
        std::io::stdin()
            .read_to_string(&mut buf)
            .context("Failed to read settings from stdin")?;
        buf
    } else {
        std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read settings from {:?}", path))?
    };

    serde_json::from_str(&content)
        .with_context(|| format!("Failed to parse settings from {:?}", path))
}
