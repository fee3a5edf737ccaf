//! # Ridgeline CLI
//!
//! Operator commands against a local index directory. Results are printed
//! to stdout as JSON; logs go to stderr.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use tracing::info;

use ridgeline_api::logging::init_logging;
use ridgeline_api::server::{create_router, AppState};
use ridgeline_api::{RemoteClient, SearchEngine};
use ridgeline_core::Config;
use ridgeline_storage::npy::read_npy_file;

#[derive(Parser)]
#[command(name = "ridgeline", version)]
#[command(about = "Ridgeline - fingerprint similarity search over precomputed features")]
struct Cli {
    /// YAML configuration file; defaults plus RIDGELINE_* variables otherwise
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Send rebuild/stats/search to a running server instead of the local index
    #[arg(long, global = true)]
    server: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Rebuild the index from the configured dataset and publish it
    Rebuild,
    /// Show what the published index holds
    Stats,
    /// Rank indexed items by similarity to a feature vector
    Search {
        /// Feature vector as a JSON array, e.g. '[0.1, 2.5, ...]'
        #[arg(long, conflicts_with = "vector_file")]
        vector: Option<String>,

        /// File with the feature vector: a JSON array or a single-row .npy
        #[arg(long)]
        vector_file: Option<PathBuf>,

        /// Number of results (defaults to search.default_top_k)
        #[arg(short)]
        k: Option<usize>,
    },
    /// Check that every indexed row finds itself first with similarity 1.0
    Verify,
    /// Run the HTTP server
    Serve {
        /// Override api.http_port
        #[arg(short, long)]
        port: Option<u16>,
    },
}

fn load_config(path: Option<&Path>) -> Result<Config> {
    match path {
        Some(path) => Config::load_from_file(path)
            .with_context(|| format!("loading config {}", path.display())),
        None => Ok(Config::from_env()?),
    }
}

fn read_vector(inline: Option<String>, file: Option<PathBuf>) -> Result<Vec<f64>> {
    match (inline, file) {
        (Some(json), None) => {
            serde_json::from_str(&json).context("--vector is not a JSON array of numbers")
        }
        (None, Some(path)) => {
            if path.extension().and_then(|e| e.to_str()) == Some("npy") {
                let matrix = read_npy_file(&path)?;
                if matrix.rows() != 1 {
                    bail!("{} holds {} rows; expected exactly one", path.display(), matrix.rows());
                }
                Ok(matrix.row(0).to_vec())
            } else {
                let text = std::fs::read_to_string(&path)
                    .with_context(|| format!("reading {}", path.display()))?;
                serde_json::from_str(&text)
                    .with_context(|| format!("{} is not a JSON array of numbers", path.display()))
            }
        }
        _ => bail!("pass exactly one of --vector or --vector-file"),
    }
}

fn print_json<T: serde::Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

async fn run_remote(url: &str, command: Commands, config: &Config) -> Result<()> {
    let client = RemoteClient::connect(url).await?;
    match command {
        Commands::Rebuild => print_json(&client.rebuild().await?),
        Commands::Stats => print_json(&client.stats().await?),
        Commands::Search { vector, vector_file, k } => {
            let vector = read_vector(vector, vector_file)?;
            let k = k.unwrap_or(config.search.default_top_k);
            print_json(&client.search_vector(&vector, k).await?)
        }
        Commands::Verify | Commands::Serve { .. } => {
            bail!("this command runs against the local index only; drop --server")
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let mut config = load_config(cli.config.as_deref())?;
    init_logging(&config.logging);

    if let Some(url) = cli.server.as_deref() {
        return run_remote(url, cli.command, &config).await;
    }

    match cli.command {
        Commands::Rebuild => {
            // A corrupt published generation must not block replacing it
            let engine = SearchEngine::new(config)?;
            let stats = engine.rebuild()?;
            print_json(&stats)?;
        }
        Commands::Stats => {
            let engine = SearchEngine::open(config)?;
            print_json(&engine.stats())?;
        }
        Commands::Search { vector, vector_file, k } => {
            let vector = read_vector(vector, vector_file)?;
            let k = k.unwrap_or(config.search.default_top_k);
            let engine = SearchEngine::open(config)?;
            let results = engine.search_by_vector(&vector, k)?;
            print_json(&results)?;
        }
        Commands::Verify => {
            let engine = SearchEngine::open(config)?;
            let report = engine.verify()?;
            print_json(&report)?;
            if !report.passed() {
                bail!(
                    "{} of {} rows did not find themselves first",
                    report.failures.len(),
                    report.checked
                );
            }
        }
        Commands::Serve { port } => {
            if let Some(port) = port {
                config.api.http_port = port;
            }
            let addr = format!("{}:{}", config.api.bind_address, config.api.http_port);
            let engine = SearchEngine::open(config).context("opening search engine")?;
            let app = create_router(Arc::new(AppState::new(engine)));

            info!("Starting Ridgeline server on {}", addr);
            let listener = tokio::net::TcpListener::bind(&addr).await?;
            axum::serve(listener, app).await?;
        }
    }

    Ok(())
}
