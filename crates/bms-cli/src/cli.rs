use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

#[derive(Parser)]
#[command(
    name = "bms",
    about = "Block diff, patch and boot-time reconciliation for controller configuration",
    version
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Raise the log level (-v info, -vv debug, -vvv trace).
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    pub verbose: u8,

    #[arg(long, global = true, default_value = "text")]
    pub format: OutputFormat,
}

#[derive(Clone, Debug, clap::ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

#[derive(Subcommand)]
pub enum Command {
    /// Compute the patches that turn one configuration into another
    Diff(DiffArgs),
    /// Apply a patch list to a configuration
    Apply(ApplyArgs),
    /// Parse paths and print their canonical forms
    Path(PathArgs),
    /// Reconcile a freshly generated configuration into a store
    Reconcile(ReconcileArgs),
    /// Show the patch log of a store
    Log(LogArgs),
}

/// Where the store lives and which schema governs it.
#[derive(Args, Clone, Debug, Default)]
pub struct StoreArgs {
    /// TOML settings file.
    #[arg(long)]
    pub settings: Option<PathBuf>,
    /// Store directory; overrides the settings file.
    #[arg(long)]
    pub root: Option<PathBuf>,
    /// Block schema (JSON); overrides the settings file.
    #[arg(long)]
    pub schema: Option<PathBuf>,
}

#[derive(Args)]
pub struct DiffArgs {
    /// Old configuration (JSON file, `-` for stdin).
    pub from: PathBuf,
    /// New configuration (JSON file, `-` for stdin).
    pub to: PathBuf,
    /// Block schema (JSON). Without one, any change replaces the root.
    #[arg(short, long)]
    pub schema: Option<PathBuf>,
    /// Sort patches by path.
    #[arg(long)]
    pub sort: bool,
}

#[derive(Args)]
pub struct ApplyArgs {
    /// Base configuration (JSON file, `-` for stdin).
    pub base: PathBuf,
    /// Patch list as written by `bms diff --format json`.
    pub patches: PathBuf,
    /// Write the result here instead of stdout.
    #[arg(short, long)]
    pub output: Option<PathBuf>,
}

#[derive(Args)]
pub struct PathArgs {
    #[arg(required = true)]
    pub paths: Vec<String>,
}

#[derive(Args)]
pub struct ReconcileArgs {
    /// Freshly generated configuration (JSON file, `-` for stdin).
    pub generated: PathBuf,
    #[command(flatten)]
    pub store: StoreArgs,
    /// Show what would change without writing to the store.
    #[arg(long)]
    pub dry_run: bool,
}

#[derive(Args)]
pub struct LogArgs {
    #[command(flatten)]
    pub store: StoreArgs,
    /// Show only the most recent entries.
    #[arg(short = 'n', long)]
    pub limit: Option<usize>,
}
