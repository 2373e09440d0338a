// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
use anyhow::{Context, Result};
use clap::Parser;
use kb_vector_pool::{api::start_server, AppConfig, KbService};
use std::{env, net::SocketAddr, path::PathBuf, sync::Arc};
use tokio::signal;

/// Knowledge base vector store service
#[derive(Parser, Debug)]
#[command(name = "kb-vector-pool")]
#[command(version)]
#[command(about = "Serve cached knowledge base vector stores over HTTP", long_about = None)]
struct Args {
    /// TOML config file (environment variables are used when absent)
    #[arg(long, env = "KB_CONFIG")]
    config: Option<PathBuf>,

    /// Override the HTTP bind host
    #[arg(long)]
    host: Option<String>,

    /// Override the HTTP port
    #[arg(long)]
    port: Option<u16>,

    /// Override the knowledge base root directory
    #[arg(long)]
    kb_root: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();

    // Initialize tracing subscriber for logging
    if env::var("RUST_LOG").is_err() {
        env::set_var("RUST_LOG", "info");
    }
    tracing_subscriber::fmt::init();

    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => AppConfig::from_file(path)?,
        None => AppConfig::from_env(),
    };
    if let Some(host) = args.host {
        config.api_host = host;
    }
    if let Some(port) = args.port {
        config.api_port = port;
    }
    if let Some(kb_root) = args.kb_root {
        config.kb_root_path = kb_root;
    }

    let addr: SocketAddr = config
        .bind_address()
        .parse()
        .with_context(|| format!("invalid bind address {}", config.bind_address()))?;

    // The remote embedding client is blocking, keep its construction off the runtime
    let service = tokio::task::spawn_blocking(move || KbService::new(config))
        .await
        .context("service initialisation task failed")??;
    let service = Arc::new(service);

    start_server(Arc::clone(&service), addr, async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("Failed to listen for shutdown signal: {}", e);
        }
        tracing::info!("Shutdown signal received");
    })
    .await?;

    let report = tokio::task::spawn_blocking(move || service.shutdown())
        .await
        .context("shutdown task failed")?;
    tracing::info!(
        "Saved {} knowledge bases, unloaded {} knowledge base and {} memo stores",
        report.saved,
        report.unloaded_kb,
        report.unloaded_memo
    );

    Ok(())
}
