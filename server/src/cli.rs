//! # CLI Interface
//!
//! Defines the command-line argument structure for `tracker-server`
//! using `clap` derive. Supports three subcommands: `run`, `balances`,
//! and `version`.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

use scholar_tracker::config;

/// Scholar tracker backend server.
///
/// Persists per-manager scholar rosters behind bearer-token
/// authentication and aggregates Ronin wallet balances for the tracked
/// tokens (SLP, AXS, ETH).
#[derive(Parser, Debug)]
#[command(
    name = "tracker-server",
    about = "Scholar roster sync and wallet balance tracker",
    version,
    propagate_version = true
)]
pub struct TrackerCli {
    /// Subcommand to execute.
    #[command(subcommand)]
    pub command: Commands,
}

/// Top-level subcommands for the tracker binary.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Start the sync API and metrics servers.
    Run(RunArgs),
    /// Fetch aggregate token balances for an ad-hoc batch of wallets.
    Balances(BalancesArgs),
    /// Print version information and exit.
    Version,
}

/// Arguments for the `run` subcommand.
#[derive(Parser, Debug)]
pub struct RunArgs {
    /// Path to the data directory where roster records are stored.
    ///
    /// Created on first run if it does not exist.
    #[arg(long, short = 'd', env = "TRACKER_DATA_DIR", default_value = "~/.scholar-tracker")]
    pub data_dir: PathBuf,

    /// Port for the sync REST API.
    #[arg(long, env = "TRACKER_API_PORT", default_value_t = config::DEFAULT_API_PORT)]
    pub api_port: u16,

    /// Port for the Prometheus metrics endpoint.
    #[arg(long, env = "TRACKER_METRICS_PORT", default_value_t = config::DEFAULT_METRICS_PORT)]
    pub metrics_port: u16,

    /// Base URL of the identity provider that resolves bearer tokens.
    #[arg(long, env = "TRACKER_IDENTITY_URL", default_value = "http://127.0.0.1:9600")]
    pub identity_url: String,

    /// Log output format: "pretty" or "json".
    #[arg(long, env = "TRACKER_LOG_FORMAT", default_value = "pretty")]
    pub log_format: String,
}

/// Arguments for the `balances` subcommand.
#[derive(Parser, Debug)]
pub struct BalancesArgs {
    /// Wallet addresses to aggregate, in `0x…` or `ronin:…` form.
    #[arg(required_unless_present = "roster")]
    pub addresses: Vec<String>,

    /// Path to a roster JSON file whose scholar addresses join the batch.
    #[arg(long, value_name = "FILE")]
    pub roster: Option<PathBuf>,

    /// JSON-RPC endpoint of the Ronin ledger.
    #[arg(long, env = "TRACKER_RPC_URL", default_value = config::DEFAULT_RPC_URL)]
    pub rpc_url: String,

    /// Maximum number of balance reads in flight at once.
    #[arg(long, default_value_t = config::DEFAULT_FANOUT_CAP)]
    pub fanout: usize,
}
