use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;

use mcpctl_catalog::{CatalogWatcher, TomlFileCatalogSource};
use mcpctl_controlplane::ControlPlane;

mod api;
mod cli;

use cli::{Cli, Command};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command {
        None | Some(Command::Serve) => {
            init_tracing();
            run_server().await
        }
        Some(Command::Validate) => validate_catalog().await,
        Some(Command::Show) => show_catalog().await,
        Some(Command::Version) => {
            println!("mcpctl {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
    }
}

fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info,mcpctl_gateway=debug")))
        .json()
        .init();
}

async fn validate_catalog() -> anyhow::Result<()> {
    let path = cli::catalog_path();
    let raw = std::fs::read_to_string(&path).with_context(|| format!("reading {path}"))?;
    match toml::from_str::<mcpctl_domain::Catalog>(&raw) {
        Ok(catalog) => {
            println!("{path}: valid, {} server spec(s)", catalog.specs.len());
            Ok(())
        }
        Err(e) => {
            eprintln!("{path}: {e}");
            std::process::exit(1);
        }
    }
}

async fn show_catalog() -> anyhow::Result<()> {
    let path = cli::catalog_path();
    let raw = std::fs::read_to_string(&path).with_context(|| format!("reading {path}"))?;
    let catalog: mcpctl_domain::Catalog = toml::from_str(&raw).with_context(|| format!("parsing {path}"))?;
    println!("{}", toml::to_string_pretty(&catalog)?);
    Ok(())
}

/// Start the gateway server: assemble the control plane, watch the
/// catalog file for changes, and serve the HTTP facade.
async fn run_server() -> anyhow::Result<()> {
    tracing::info!("mcpctl starting");

    let catalog_path = std::path::PathBuf::from(cli::catalog_path());
    let source = Arc::new(TomlFileCatalogSource::new(catalog_path.clone()));
    let plane = ControlPlane::start(source).await.map_err(|e| anyhow::anyhow!("starting control plane: {e}"))?;
    tracing::info!("control plane ready");

    // The watcher's shutdown channel is never fired here; the process exits
    // on SIGINT/SIGTERM like the rest of the binary, which drops it anyway.
    let (_shutdown_tx, shutdown_rx) = tokio::sync::broadcast::channel(1);
    let _catalog_watcher = CatalogWatcher::start(catalog_path, plane.catalog_engine(), shutdown_rx)
        .map_err(|e| anyhow::anyhow!("starting catalog watcher: {e}"))?;
    tracing::info!("catalog watcher ready");

    let app = api::router(plane)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .layer(tower::limit::ConcurrencyLimitLayer::new(256));

    let addr = cli::bind_addr();
    let listener = tokio::net::TcpListener::bind(&addr).await.with_context(|| format!("binding to {addr}"))?;
    tracing::info!(addr = %addr, "mcpctl listening");

    axum::serve(listener, app).await.context("axum server error")?;
    Ok(())
}
