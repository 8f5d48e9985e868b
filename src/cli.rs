use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Tax-lot matching and reconciliation.
#[derive(Parser, Debug)]
#[command(name = "taxlots")]
#[command(about = "FIFO tax-lot matching over broker executions", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Import executions from a broker CSV export.
    Import {
        #[arg(long)]
        owner: String,

        #[arg(long)]
        file: PathBuf,

        /// Portfolio for rows without a portfolio column.
        #[arg(long, default_value = "default")]
        portfolio: String,
    },
    /// Match open executions; every owner unless --owner is given.
    Match {
        #[arg(long)]
        owner: Option<String>,
    },
    /// Delete an owner's matches and restore their remaining quantities.
    Reset {
        #[arg(long)]
        owner: String,
    },
    /// Print an owner's matches and realized totals as JSON.
    Report {
        #[arg(long)]
        owner: String,

        /// Earliest disposal date to include (YYYY-MM-DD).
        #[arg(long)]
        from: Option<NaiveDate>,

        /// Latest disposal date to include (YYYY-MM-DD).
        #[arg(long)]
        to: Option<NaiveDate>,
    },
}
