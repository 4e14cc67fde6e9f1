use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use evl_types::NamespacedName;

#[derive(Parser)]
#[command(
    name = "evl",
    about = "Event Ledger — forward cluster events to an immutable audit ledger",
    version,
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// TOML settings file with optional [ledger] and [dispatch] tables
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[arg(long, global = true, default_value = "text")]
    pub format: OutputFormat,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

#[derive(Subcommand)]
pub enum Command {
    /// Validate ledger configuration and credentials
    Check(CheckArgs),
    /// Print the ledger documents derived from an events file
    Render(RenderArgs),
    /// Reconcile every event in a file into the ledger
    Forward(ForwardArgs),
}

#[derive(Args)]
pub struct CheckArgs {}

#[derive(Args)]
pub struct RenderArgs {
    /// JSON array, event list, or JSON lines of cluster events
    #[arg(short, long)]
    pub events: PathBuf,
    /// Only events with this `namespace/name` handle (repeatable)
    #[arg(long = "name")]
    pub names: Vec<NamespacedName>,
    #[arg(long)]
    pub pretty: bool,
}

#[derive(Args)]
pub struct ForwardArgs {
    /// JSON array, event list, or JSON lines of cluster events
    #[arg(short, long)]
    pub events: PathBuf,
    /// Publish into an in-memory ledger instead of the remote one
    #[arg(long)]
    pub dry_run: bool,
    /// Only events with this `namespace/name` handle (repeatable)
    #[arg(long = "name")]
    pub names: Vec<NamespacedName>,
    #[arg(long)]
    pub concurrency: Option<usize>,
    #[arg(long)]
    pub max_attempts: Option<u32>,
}
