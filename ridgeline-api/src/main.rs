//! # Ridgeline Server
//!
//! Run with: `cargo run --bin ridgeline-server -- --config ridgeline.yaml --port 5000`

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::info;

use ridgeline_api::logging::init_logging;
use ridgeline_api::server::{create_router, AppState};
use ridgeline_api::SearchEngine;
use ridgeline_core::Config;

#[derive(Parser)]
#[command(name = "ridgeline-server", version, about = "Ridgeline similarity search server")]
struct Args {
    /// YAML configuration file; defaults plus RIDGELINE_* variables otherwise
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Override api.http_port
    #[arg(short, long)]
    port: Option<u16>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => Config::load_from_file(path)
            .with_context(|| format!("loading config {}", path.display()))?,
        None => Config::from_env()?,
    };
    if let Some(port) = args.port {
        config.api.http_port = port;
    }

    init_logging(&config.logging);

    let addr = format!("{}:{}", config.api.bind_address, config.api.http_port);
    info!("Starting Ridgeline server on {}", addr);
    info!("Index directory: {:?}", config.index.dir);

    let engine = SearchEngine::open(config).context("opening search engine")?;
    let state = Arc::new(AppState::new(engine));
    let app = create_router(state);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
