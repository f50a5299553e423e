// Copyright (c) 2026 Scholar Tracker contributors. MIT License.
// See LICENSE for details.

//! # Scholar Tracker Server
//!
//! Entry point for the `tracker-server` binary. Parses CLI arguments,
//! initializes logging and metrics, and serves the roster sync API.
//!
//! The binary supports three subcommands:
//!
//! - `run`      — start the sync API and metrics servers
//! - `balances` — aggregate token balances for a batch of wallets
//! - `version`  — print build version information

mod api;
mod cli;
mod logging;
mod metrics;

use anyhow::{Context, Result};
use clap::Parser;
use std::sync::Arc;
use tokio::signal;

use scholar_tracker::auth::HttpIdentityVerifier;
use scholar_tracker::chain::{BalanceAggregator, RoninBalanceReader, TokenKind};
use scholar_tracker::roster;
use scholar_tracker::store::SledRecordStore;
use scholar_tracker::sync::SyncService;

use cli::{Commands, TrackerCli};
use logging::LogFormat;
use metrics::TrackerMetrics;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = TrackerCli::parse();

    match cli.command {
        Commands::Run(args) => run_server(args).await,
        Commands::Balances(args) => run_balances(args).await,
        Commands::Version => {
            print_version();
            Ok(())
        }
    }
}

/// Starts the sync API server and the metrics endpoint.
async fn run_server(args: cli::RunArgs) -> Result<()> {
    logging::init_logging(
        "tracker_server=info,scholar_tracker=info,tower_http=debug",
        LogFormat::from_str_lossy(&args.log_format),
    );

    tracing::info!(
        api_port = args.api_port,
        metrics_port = args.metrics_port,
        data_dir = %args.data_dir.display(),
        identity_url = %args.identity_url,
        "starting tracker-server"
    );

    // --- Persistent storage ---
    let db_path = args.data_dir.join("db");
    std::fs::create_dir_all(&db_path)
        .with_context(|| format!("failed to create database directory: {}", db_path.display()))?;

    let store = SledRecordStore::open(&db_path)
        .with_context(|| format!("failed to open roster store at {}", db_path.display()))?;
    tracing::info!(
        path = %db_path.display(),
        rosters = store.record_count(),
        "roster store opened"
    );

    // --- Identity provider ---
    let verifier = HttpIdentityVerifier::new(&args.identity_url)
        .context("failed to build identity provider client")?;

    // --- Metrics ---
    let tracker_metrics = Arc::new(TrackerMetrics::new());
    tracker_metrics.rosters_stored.set(store.record_count() as i64);

    // --- Application state ---
    let app_state = api::AppState {
        version: env!("CARGO_PKG_VERSION").to_string(),
        sync: Arc::new(SyncService::new(verifier, store.clone())),
        store,
        metrics: Arc::clone(&tracker_metrics),
    };

    // --- API server ---
    let api_router = api::create_router(app_state);
    let api_addr = format!("0.0.0.0:{}", args.api_port);
    let api_listener = tokio::net::TcpListener::bind(&api_addr)
        .await
        .with_context(|| format!("failed to bind API listener on {}", api_addr))?;
    tracing::info!("sync API listening on {}", api_addr);

    // --- Metrics server ---
    let metrics_router = axum::Router::new()
        .route("/metrics", axum::routing::get(metrics::metrics_handler))
        .with_state(Arc::clone(&tracker_metrics));
    let metrics_addr = format!("0.0.0.0:{}", args.metrics_port);
    let metrics_listener = tokio::net::TcpListener::bind(&metrics_addr)
        .await
        .with_context(|| format!("failed to bind metrics listener on {}", metrics_addr))?;
    tracing::info!("metrics server listening on {}", metrics_addr);

    // --- Serve ---
    tokio::select! {
        res = axum::serve(api_listener, api_router) => {
            if let Err(e) = res {
                tracing::error!("API server error: {}", e);
            }
        }
        res = axum::serve(metrics_listener, metrics_router) => {
            if let Err(e) = res {
                tracing::error!("metrics server error: {}", e);
            }
        }
        _ = shutdown_signal() => {
            tracing::info!("shutdown signal received, draining connections");
        }
    }

    tracing::info!("tracker-server stopped");
    Ok(())
}

/// Aggregates token balances for an ad-hoc batch of wallet addresses
/// and prints one row per address to stdout.
///
/// Addresses come from the command line, a roster JSON file, or both.
async fn run_balances(args: cli::BalancesArgs) -> Result<()> {
    logging::init_logging("tracker_server=warn,scholar_tracker=warn", LogFormat::Pretty);

    let reader = RoninBalanceReader::new(&args.rpc_url)
        .context("failed to build ledger RPC client")?;
    let aggregator = BalanceAggregator::with_limits(
        reader,
        args.fanout,
        scholar_tracker::config::BALANCE_STALENESS_WINDOW,
    );

    // Accept either address form on the command line.
    let mut addresses: Vec<String> = args.addresses.iter().map(|a| roster::as_hex(a)).collect();
    if let Some(path) = &args.roster {
        addresses.extend(load_roster_addresses(path)?);
    }
    let views = aggregator.aggregate(addresses).collect_all().await;

    println!(
        "{:<46} {:>16} {:>16} {:>16}",
        "ADDRESS", "SLP", "AXS", "ETH"
    );
    for view in &views {
        let mut cells = Vec::with_capacity(TokenKind::ALL.len());
        for token in TokenKind::ALL {
            let result = view.result_for(token);
            if result.is_ok() {
                cells.push(format!("{:.4}", result.amount));
            } else {
                cells.push("failed".to_string());
            }
        }
        println!(
            "{:<46} {:>16} {:>16} {:>16}",
            roster::as_ronin(&view.address),
            cells[0],
            cells[1],
            cells[2],
        );
    }

    let tracker_metrics = TrackerMetrics::new();
    tracker_metrics.record_aggregation(&aggregator.stats());

    println!(
        "{} addresses, {} reads, {} failed, {} cached",
        views.len(),
        tracker_metrics.balance_reads_total.get(),
        tracker_metrics.balance_read_failures_total.get(),
        tracker_metrics.balance_cache_hits_total.get(),
    );

    let failures = tracker_metrics.balance_read_failures_total.get();
    if failures > 0 {
        tracing::warn!(failures, "some balance reads did not resolve");
    }
    Ok(())
}

/// Reads a roster JSON file and projects its scholar wallet addresses.
fn load_roster_addresses(path: &std::path::Path) -> Result<Vec<String>> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read roster file {}", path.display()))?;
    let payload: serde_json::Value = serde_json::from_str(&raw)
        .with_context(|| format!("roster file {} is not valid JSON", path.display()))?;
    Ok(roster::wallet_addresses(&payload))
}

/// Prints version information to stdout.
fn print_version() {
    println!("tracker-server {}", env!("CARGO_PKG_VERSION"));
    println!("ronin chain id {}", scholar_tracker::config::RONIN_CHAIN_ID);
    println!("rustc          {}", rustc_version());
}

/// Returns the Rust compiler version used to build this binary.
fn rustc_version() -> &'static str {
    option_env!("RUSTC_VERSION").unwrap_or("unknown")
}

/// Waits for SIGINT (Ctrl+C) or SIGTERM, whichever comes first.
///
/// On non-Unix platforms, only Ctrl+C is supported.
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}
