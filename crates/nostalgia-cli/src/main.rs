//! Nostalgia CLI
//!
//! Runs the HTTP service, or smiles a single image from the command line.

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::Context;
use clap::{Parser, Subcommand};
use nostalgia_server::{create_router, AppState, Config, SourceImage};
use tokio::net::TcpListener;
use tracing_subscriber::EnvFilter;

/// Nostalgia - portrait smile service
///
/// Serves the smile, enhancement and video endpoints, backed by the Replicate
/// API with a local geometric fallback.
#[derive(Parser, Debug)]
#[command(name = "nostalgia")]
#[command(version, about, long_about = None)]
struct Args {
    /// Path to configuration file (default: nostalgia.json in current directory)
    #[arg(short, long, value_name = "FILE", global = true)]
    config: Option<PathBuf>,

    /// Enable verbose output (sets log level to debug)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Start the HTTP API server
    Serve {
        /// Address to bind (overrides the config file)
        #[arg(long)]
        host: Option<String>,

        /// Port to bind (overrides the config file)
        #[arg(short, long)]
        port: Option<u16>,
    },

    /// Produce a smiling version of one image
    Smile {
        /// Path to the portrait
        #[arg(value_name = "IMAGE")]
        image: PathBuf,

        /// Where to write the result (default: smile_<name>.<ext> next to the input)
        #[arg(short, long, value_name = "FILE")]
        output: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();

    // Priority: RUST_LOG env var > --verbose flag > default (info)
    let filter = if args.verbose {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("debug"))
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    match dotenvy::dotenv() {
        Ok(path) => tracing::debug!(path = %path.display(), "Loaded environment file"),
        Err(e) if e.not_found() => {}
        Err(e) => tracing::warn!(error = %e, "Could not read .env"),
    }

    let result = match load_config(args.config.as_deref()) {
        Ok(config) => match args.command {
            Command::Serve { host, port } => serve(config, host, port).await,
            Command::Smile { image, output } => smile(config, &image, output).await,
        },
        Err(e) => Err(e),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e:#}");
            ExitCode::from(1)
        }
    }
}

/// Loads configuration and the Replicate token.
fn load_config(config_path: Option<&Path>) -> anyhow::Result<Config> {
    let config = match config_path {
        Some(path) => {
            if !path.exists() {
                anyhow::bail!(
                    "Config file not found: '{}'\n\nSuggestion: Check the path or remove the --config flag to use defaults",
                    path.display()
                );
            }
            Config::load_from_file(path)?
        }
        None => Config::load()?,
    };
    Ok(config.with_api_token_from_env())
}

/// Runs the HTTP server until Ctrl+C.
async fn serve(mut config: Config, host: Option<String>, port: Option<u16>) -> anyhow::Result<()> {
    if let Some(host) = host {
        config.host = host;
    }
    if let Some(port) = port {
        config.port = port;
    }
    config.validate()?;
    print_config(&config);

    let addr: SocketAddr = format!("{}:{}", config.host, config.port)
        .parse()
        .with_context(|| {
            format!(
                "Invalid listen address '{}:{}'\n\nSuggestion: Use an IP address such as 127.0.0.1 or 0.0.0.0",
                config.host, config.port
            )
        })?;

    let router = create_router(AppState::from_config(config)?);
    let listener = TcpListener::bind(addr).await.with_context(|| {
        format!("Failed to bind {addr}\n\nSuggestion: Another process may be using the port; try --port")
    })?;

    println!();
    println!("Nostalgia API running on http://{addr}");
    println!("Press Ctrl+C to stop");
    tracing::info!(%addr, "Server listening");

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("HTTP server error")?;

    tracing::info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!(error = %e, "Could not listen for Ctrl+C");
        std::future::pending::<()>().await;
    }
    println!();
    println!("Shutting down...");
}

/// Runs the smile pipeline on one file.
async fn smile(config: Config, image: &Path, output: Option<PathBuf>) -> anyhow::Result<()> {
    let filename = image
        .file_name()
        .map(|name| name.to_string_lossy().to_string())
        .unwrap_or_default();
    nostalgia_server::upload::validate_extension(&filename)?;

    let bytes = tokio::fs::read(image)
        .await
        .with_context(|| format!("Failed to read '{}'", image.display()))?;
    let source = SourceImage::decode(filename, bytes)?;

    let state = AppState::from_config(config)?;
    println!("Generating smile for {}...", image.display());
    let result = state.orchestrator.produce_smile(&source).await;

    let output = output.unwrap_or_else(|| {
        let name = format!("smile_{}.{}", source.stem(), result.tier.extension());
        image.with_file_name(name)
    });
    tokio::fs::write(&output, &result.bytes)
        .await
        .with_context(|| format!("Failed to write '{}'", output.display()))?;

    println!();
    println!("Result:");
    println!("  Tier: {}", result.tier);
    println!("  Remote attempts: {}", result.retry.attempts);
    if let Some(last_error) = &result.retry.last_error {
        println!("  Last remote error: {}", last_error.lines().next().unwrap_or_default());
    }
    println!("  Written to: {}", output.display());
    Ok(())
}

/// Prints a summary of the loaded configuration.
fn print_config(config: &Config) {
    println!("Configuration loaded:");
    println!("  Results directory: {}", config.results_dir.display());
    println!("  Temp directory: {}", config.temp_dir.display());
    println!(
        "  Remote attempts: {} ({}s apart)",
        config.smile.max_retries, config.smile.retry_delay_secs
    );
    println!("  Landmark detector: {:?}", config.landmarks.detector);
    println!(
        "  Replicate token: {}",
        if config.has_api_token() { "set" } else { "not set" }
    );
}
