// Copyright (c) 2026 ALAS Technology. MIT License.
// See LICENSE for details.

//! # Trove Node
//!
//! Entry point for the `trove-node` binary. Builds a ledger from a genesis
//! file and serves it.
//!
//! - `run`          : build the ledger and serve the API and metrics
//! - `check-genesis`: build a genesis file and print what it produced
//! - `status`       : query a running node's `/status`
//! - `version`      : print build version information

mod api;
mod cli;
mod genesis;
mod logging;
mod metrics;
mod rpc;
mod views;

use anyhow::{Context, Result};
use axum::http::Uri;
use clap::Parser;
use std::sync::Arc;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::signal;

use trove_protocol::config::PROTOCOL_VERSION;

use cli::{Commands, TroveNodeCli};
use genesis::Genesis;
use logging::LogFormat;
use metrics::NodeMetrics;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = TroveNodeCli::parse();

    match cli.command {
        Commands::Run(args) => run_node(args).await,
        Commands::CheckGenesis(args) => check_genesis(args),
        Commands::Status(args) => query_status(args).await,
        Commands::Version => {
            print_version();
            Ok(())
        }
    }
}

fn load_genesis(path: Option<&std::path::Path>) -> Result<Genesis> {
    match path {
        Some(path) => Genesis::load(path).with_context(|| format!("loading genesis {}", path.display())),
        None => Genesis::devnet().context("parsing built-in devnet genesis"),
    }
}

/// Builds the ledger and serves the API and metrics until a shutdown signal.
async fn run_node(args: cli::RunArgs) -> Result<()> {
    logging::init_logging(logging::DEFAULT_FILTER, LogFormat::from_str_lossy(&args.log_format))?;

    tracing::info!(
        rpc_port = args.rpc_port,
        metrics_port = args.metrics_port,
        genesis = %args.genesis.as_ref().map_or_else(|| "<devnet>".to_string(), |p| p.display().to_string()),
        "starting trove-node"
    );

    let context = load_genesis(args.genesis.as_deref())?
        .build()
        .context("applying genesis")?;

    let node_metrics = Arc::new(NodeMetrics::new().context("registering metrics")?);
    let app_state = api::AppState::new(
        format!("{} (protocol {})", env!("CARGO_PKG_VERSION"), PROTOCOL_VERSION),
        context,
        Arc::clone(&node_metrics),
    );

    let api_router = api::create_router(app_state);
    let api_addr = format!("0.0.0.0:{}", args.rpc_port);
    let api_listener = tokio::net::TcpListener::bind(&api_addr)
        .await
        .with_context(|| format!("failed to bind RPC listener on {api_addr}"))?;
    tracing::info!(addr = %api_addr, "API server listening");

    let metrics_router = axum::Router::new()
        .route("/metrics", axum::routing::get(metrics::metrics_handler))
        .with_state(node_metrics);
    let metrics_addr = format!("0.0.0.0:{}", args.metrics_port);
    let metrics_listener = tokio::net::TcpListener::bind(&metrics_addr)
        .await
        .with_context(|| format!("failed to bind metrics listener on {metrics_addr}"))?;
    tracing::info!(addr = %metrics_addr, "metrics server listening");

    tokio::select! {
        res = axum::serve(api_listener, api_router) => {
            res.context("API server failed")?;
        }
        res = axum::serve(metrics_listener, metrics_router) => {
            res.context("metrics server failed")?;
        }
        res = shutdown_signal() => {
            res?;
            tracing::info!("shutdown signal received");
        }
    }

    tracing::info!("trove-node stopped");
    Ok(())
}

/// Builds a genesis file without serving it and prints a summary.
fn check_genesis(args: cli::CheckGenesisArgs) -> Result<()> {
    logging::init_logging("warn", LogFormat::Pretty)?;

    let genesis = load_genesis(Some(&args.genesis))?;
    let context = genesis.build().context("applying genesis")?;
    let engine = &context.engine;

    println!("Genesis OK: {}", args.genesis.display());
    println!("  Admin        : {}", engine.registry().admin());
    println!("  Unit scale   : {}", engine.config().unit_scale);
    println!("  Modules      : {}", engine.registry().modules().count());
    println!("  Integrations : {}", engine.directory().len());
    println!("  Events       : {}", engine.events().next_sequence());
    for basket in engine.baskets() {
        println!(
            "  Basket {} {} ({} components, manager {})",
            basket.address(),
            basket.symbol(),
            basket.components().len(),
            basket.manager()
        );
    }
    Ok(())
}

/// Prints a running node's `/status` body.
async fn query_status(args: cli::StatusArgs) -> Result<()> {
    let url = format!("{}/status", args.rpc_url.trim_end_matches('/'));
    println!("{}", http_get(&url).await?);
    Ok(())
}

/// Plain HTTP/1.1 GET over a tokio socket, returning the body.
async fn http_get(url: &str) -> Result<String> {
    let uri: Uri = url.parse().with_context(|| format!("invalid URL {url}"))?;
    let host = uri.host().context("URL has no host")?;
    let port = uri.port_u16().unwrap_or(80);
    let path = uri.path_and_query().map_or("/", |p| p.as_str());

    let addr = format!("{host}:{port}");
    let mut stream = tokio::net::TcpStream::connect(&addr)
        .await
        .with_context(|| format!("failed to connect to {addr}"))?;
    let request = format!("GET {path} HTTP/1.1\r\nHost: {host}\r\nConnection: close\r\n\r\n");
    stream.write_all(request.as_bytes()).await?;

    let mut buf = Vec::new();
    stream.read_to_end(&mut buf).await?;
    let response = String::from_utf8_lossy(&buf);
    let (head, body) = response
        .split_once("\r\n\r\n")
        .context("malformed HTTP response")?;
    if !head.starts_with("HTTP/1.1 200") {
        anyhow::bail!("node answered {}", head.lines().next().unwrap_or(head));
    }
    Ok(body.to_string())
}

fn print_version() {
    println!("trove-node {}", env!("CARGO_PKG_VERSION"));
    println!("protocol   {PROTOCOL_VERSION}");
}

/// Resolves on Ctrl+C or SIGTERM.
async fn shutdown_signal() -> Result<()> {
    #[cfg(unix)]
    {
        let mut terminate = signal::unix::signal(signal::unix::SignalKind::terminate())
            .context("installing SIGTERM handler")?;
        tokio::select! {
            res = signal::ctrl_c() => res.context("installing Ctrl+C handler")?,
            _ = terminate.recv() => {}
        }
    }
    #[cfg(not(unix))]
    signal::ctrl_c().await.context("installing Ctrl+C handler")?;
    Ok(())
}
