//! Command-line interface definitions using clap
//!
//! This module defines the CLI structure for affilink using clap's derive macros.

use chrono::{DateTime, NaiveDate, Utc};
use clap::{Parser, Subcommand};

use crate::errors::{AffilinkError, Result};

/// Affilink - referral attribution and payout engine
#[derive(Parser)]
#[command(name = "affilink")]
#[command(version)]
#[command(about = "Referral attribution, fraud scoring and payout engine", long_about = None)]
pub struct Cli {
    /// Configuration file path
    #[arg(long, short = 'c', global = true, default_value = "config.toml")]
    pub config: String,

    #[command(subcommand)]
    pub command: Commands,
}

/// Available commands
#[derive(Subcommand)]
pub enum Commands {
    /// Print or write a sample configuration file
    ConfigGen {
        /// Output path (default: stdout)
        output_path: Option<String>,
    },

    /// Run database migrations and exit
    Migrate,

    /// Purge expired tracking cookies and old click events once
    Cleanup,

    /// Generate payouts for every referrer with eligible commissions
    ///
    /// Dates accept RFC3339 or YYYY-MM-DD (midnight UTC); the period is [start, end).
    PayoutBatch {
        #[arg(long, value_parser = parse_datetime)]
        start: DateTime<Utc>,

        #[arg(long, value_parser = parse_datetime)]
        end: DateTime<Utc>,

        /// Payout method, e.g. bank_transfer
        #[arg(long, default_value = "bank_transfer")]
        method: String,
    },

    /// Show a referrer's commission tier
    Tier {
        referrer_id: String,
    },

    /// Run retention cleanup, fraud rule reload and the period payout batch on an interval
    RunJobs {
        /// Override payout.jobs_interval_secs
        #[arg(long)]
        interval: Option<u64>,
    },
}

/// RFC3339 或 YYYY-MM-DD（按 UTC 零点）
pub fn parse_datetime(value: &str) -> Result<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
        return Ok(dt.with_timezone(&Utc));
    }
    let date = NaiveDate::parse_from_str(value, "%Y-%m-%d")?;
    date.and_hms_opt(0, 0, 0)
        .map(|dt| dt.and_utc())
        .ok_or_else(|| AffilinkError::date_parse(format!("Invalid date: {}", value)))
}
