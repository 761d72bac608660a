//! Command-line definition.

use std::path::PathBuf;

use calstore_core::alarm::AlarmAction;
use clap::{Parser, Subcommand};

#[derive(Debug, Parser)]
#[command(
    name = "calstore",
    version,
    about = "Alarm trigger claims and search-term compilation for calendar storage"
)]
pub struct Cli {
    /// Read configuration from this file instead of the global/project lookup
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Override the configured database URL
    #[arg(long, global = true, value_name = "URL")]
    pub database_url: Option<String>,

    /// Log at debug level
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Create the alarm trigger table
    Init,

    /// List due alarm triggers as JSON
    Due {
        /// Upper bound for trigger times: RFC 3339 or `now`
        #[arg(long)]
        until: String,

        /// Leases older than this are stolen (RFC 3339); defaults to now minus the overdue wait
        #[arg(long)]
        overdue: Option<String>,

        /// Actions to select; repeatable
        #[arg(long = "action", value_name = "ACTION", default_value = "DISPLAY")]
        actions: Vec<AlarmAction>,

        /// Claim the listed triggers; claims stay until released or expired
        #[arg(long)]
        lock: bool,
    },

    /// Drop the processing status of triggers
    Release {
        #[arg(long)]
        context: i32,

        #[arg(long)]
        account: i32,

        /// Alarm ids to release
        #[arg(long = "alarm", value_name = "ID", required = true, num_args = 1..)]
        alarms: Vec<i32>,
    },

    /// Compile a JSON search term and print the clause as JSON
    Compile {
        /// Context the term is compiled for
        #[arg(long, default_value_t = 0)]
        context: i32,

        /// Search term as JSON, or `-` to read it from stdin
        term: String,
    },
}
