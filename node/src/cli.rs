//! # CLI Interface
//!
//! Command-line arguments for `trove-node`, defined with `clap` derive.
//! Every flag of `run` also reads from a `TROVE_*` environment variable.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

use trove_protocol::config::{DEFAULT_METRICS_PORT, DEFAULT_RPC_PORT};

/// Trove basket ledger node.
///
/// Hosts one in-memory ledger seeded from a genesis file, serves the
/// JSON-RPC/REST API and streams ledger events over WebSocket.
#[derive(Parser, Debug)]
#[command(
    name = "trove-node",
    about = "Trove basket ledger node",
    version,
    propagate_version = true
)]
pub struct TroveNodeCli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Start the node.
    Run(RunArgs),
    /// Load a genesis file, build the ledger from it and print a summary.
    CheckGenesis(CheckGenesisArgs),
    /// Query the status of a running node.
    Status(StatusArgs),
    /// Print version information and exit.
    Version,
}

#[derive(Parser, Debug)]
pub struct RunArgs {
    /// Genesis file (TOML). The built-in devnet genesis is used when omitted.
    #[arg(long, short = 'g', env = "TROVE_GENESIS")]
    pub genesis: Option<PathBuf>,

    /// Port for the JSON-RPC and REST API.
    #[arg(long, env = "TROVE_RPC_PORT", default_value_t = DEFAULT_RPC_PORT)]
    pub rpc_port: u16,

    /// Port for the Prometheus metrics endpoint.
    #[arg(long, env = "TROVE_METRICS_PORT", default_value_t = DEFAULT_METRICS_PORT)]
    pub metrics_port: u16,

    /// Log output format: `pretty` or `json`.
    #[arg(long, env = "TROVE_LOG_FORMAT", default_value = "pretty")]
    pub log_format: String,
}

#[derive(Parser, Debug)]
pub struct CheckGenesisArgs {
    /// Genesis file to validate.
    #[arg(env = "TROVE_GENESIS")]
    pub genesis: PathBuf,
}

#[derive(Parser, Debug)]
pub struct StatusArgs {
    /// RPC endpoint of the running node.
    #[arg(long, default_value = "http://127.0.0.1:9841")]
    pub rpc_url: String,
}
