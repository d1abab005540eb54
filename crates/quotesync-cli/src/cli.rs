//! CLI argument definitions for quotesync.
//!
//! # Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `run` | Keep every quote in a manifest reconciled until Ctrl-C |
//! | `reconcile` | Reconcile every quote in a manifest once and print the result |
//! | `validate` | Parse and validate a manifest |
//! | `fetch` | Fetch one previous-close price |
//!
//! # Global Options
//!
//! | Option | Default | Description |
//! |--------|---------|-------------|
//! | `--format` | `json` | Output format (json, table) |
//! | `--pretty` | `false` | Pretty-print JSON output |
//!
//! # Examples
//!
//! ```bash
//! quotesync validate --manifest quotes.json
//! quotesync reconcile --manifest quotes.json --format table
//! quotesync run --manifest quotes.json --workers 8
//! POLYGON_API_KEY=... quotesync fetch AAPL
//! ```

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};

/// Keeps stock-quote objects populated with the latest close price.
#[derive(Debug, Parser)]
#[command(
    name = "quotesync",
    author,
    version,
    about = "Stock quote reconciliation loop backed by Polygon.io"
)]
pub struct Cli {
    /// Output format for results.
    #[arg(long, global = true, value_enum, default_value_t = OutputFormat::Json)]
    pub format: OutputFormat,

    /// Pretty-print JSON output with indentation.
    #[arg(long, global = true, default_value_t = false)]
    pub pretty: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// ASCII table for terminal display.
    Table,
    /// Single JSON document.
    Json,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Run the controller over a manifest until interrupted.
    ///
    ///   quotesync run --manifest quotes.json
    Run(RunArgs),

    /// Reconcile each quote in a manifest once.
    ///
    ///   quotesync reconcile --manifest quotes.json --format table
    Reconcile(ReconcileArgs),

    /// Validate a manifest without contacting the provider.
    Validate(ValidateArgs),

    /// Fetch the previous close for one ticker.
    ///
    ///   quotesync fetch AAPL --api-key $POLYGON_API_KEY
    Fetch(FetchArgs),
}

/// Provider connection overrides shared by commands that hit the network.
#[derive(Debug, Clone, Args)]
pub struct ProviderArgs {
    /// Provider base URL; overrides QUOTESYNC_API_URL.
    #[arg(long)]
    pub api_url: Option<String>,

    /// Per-request timeout in milliseconds; overrides QUOTESYNC_REQUEST_TIMEOUT_MS.
    #[arg(long)]
    pub timeout_ms: Option<u64>,
}

#[derive(Debug, Clone, Args)]
pub struct RunArgs {
    /// Path to the JSON manifest of quotes and secrets.
    #[arg(long)]
    pub manifest: PathBuf,

    /// Concurrent reconciliations across objects; overrides QUOTESYNC_WORKERS.
    #[arg(long)]
    pub workers: Option<usize>,

    #[command(flatten)]
    pub provider: ProviderArgs,
}

#[derive(Debug, Clone, Args)]
pub struct ReconcileArgs {
    /// Path to the JSON manifest of quotes and secrets.
    #[arg(long)]
    pub manifest: PathBuf,

    #[command(flatten)]
    pub provider: ProviderArgs,
}

#[derive(Debug, Clone, Args)]
pub struct ValidateArgs {
    /// Path to the JSON manifest of quotes and secrets.
    #[arg(long)]
    pub manifest: PathBuf,
}

#[derive(Debug, Clone, Args)]
pub struct FetchArgs {
    /// Ticker symbol, e.g. AAPL.
    pub ticker: String,

    /// Polygon API key.
    #[arg(long, env = "POLYGON_API_KEY", hide_env_values = true)]
    pub api_key: String,

    #[command(flatten)]
    pub provider: ProviderArgs,
}
