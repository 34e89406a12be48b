use clap::{Parser, Subcommand};
use ingest_core::Status;
use std::path::PathBuf;

#[derive(Parser)]
#[command(author, version, about = "ingestd: asset package validation worker", long_about = None)]
pub struct Cli {
    /// TOML config file; defaults apply when absent
    #[arg(long, short, global = true, env = "INGESTD_CONFIG")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Poll on an interval, running one validation pass per tick
    Run {
        /// Seconds between passes (overrides worker.interval_secs)
        #[arg(long)]
        interval: Option<u64>,

        /// Run a single pass and exit
        #[arg(long)]
        once: bool,
    },

    /// Handle one trigger message, e.g. '{"trigger":"asset_validation_check"}'
    Trigger { message: String },

    /// Run one validation pass now
    Pass,

    /// Validate one package without moving files or writing status
    Validate { title: String, asset: String },

    /// Record a package in the tracking store
    Register {
        title: String,
        asset: String,

        #[arg(long, default_value = "VALID_STRUCTURE")]
        status: Status,

        /// RFC 3339 upload time (defaults to now)
        #[arg(long)]
        created: Option<String>,

        /// Staging prefix, when it differs from "<title>/<asset>/"
        #[arg(long)]
        prefix: Option<String>,
    },

    /// List tracked packages
    Status {
        #[arg(long)]
        status: Option<Status>,
    },

    /// Force a package back to a given status
    Reset {
        title: String,
        asset: String,

        #[arg(long, default_value = "PENDING")]
        to: Status,
    },

    /// Delete staging leftovers of packages that already reached a final status
    Sweep,
}
