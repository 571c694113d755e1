use std::path::PathBuf;

use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};

/// Schedule inference runs and reconcile their results.
///
/// Settings come from the environment (and `.env`); flags override them.
#[derive(Parser, Debug)]
#[command(name = "lookout", about = "Schedule inference runs and reconcile their results")]
pub struct CliArgs {
    /// Config profile; `PROD` reads `PROD_<KEY>` before `<KEY>`
    #[arg(long, env = "LOOKOUT_PROFILE", global = true)]
    pub profile: Option<String>,

    /// Schedule name override
    #[arg(long, global = true)]
    pub schedule_name: Option<String>,

    /// Model name override
    #[arg(long, global = true)]
    pub model_name: Option<String>,

    /// Upload frequency override (PT5M, PT10M, PT15M, PT30M, PT1H)
    #[arg(long, global = true)]
    pub upload_frequency: Option<String>,

    /// Read objects from this directory (one subdirectory per bucket) instead of S3
    #[arg(long, global = true)]
    pub storage_root: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Print the input object key a run will look for
    ResolveKey {
        #[arg(long)]
        component: String,
        /// Run fire time (RFC 3339); defaults to the latest run already due
        #[arg(long)]
        fire_time: Option<DateTime<Utc>>,
    },
    /// Print the next fire time and its data window
    NextFire {
        /// Reference instant (RFC 3339); defaults to now
        #[arg(long)]
        after: Option<DateTime<Utc>>,
    },
    /// Check that a run's expected input exists and has rows in its window
    CheckInput {
        #[arg(long)]
        component: String,
        #[arg(long)]
        fire_time: Option<DateTime<Utc>>,
    },
    /// Create the schedule (it starts running immediately)
    Create,
    /// Restart a stopped schedule
    Start,
    /// Stop a running schedule
    Stop,
    /// Delete a stopped schedule
    Delete {
        /// Stop the schedule first if it is running
        #[arg(long)]
        stop_first: bool,
    },
    /// Ingest historical data into a dataset and wait for the job to finish
    Ingest {
        #[arg(long)]
        dataset: String,
        #[arg(long)]
        bucket: String,
        #[arg(long, default_value = "")]
        prefix: String,
        /// Role the service assumes to read the bucket; defaults to LOOKOUT_ROLE_ARN
        #[arg(long)]
        role_arn: Option<String>,
    },
    /// Block until the schedule has produced at least one execution
    WaitFirst {
        /// Only executions whose data starts after this instant
        #[arg(long)]
        since: Option<DateTime<Utc>>,
        /// Give up after this many seconds (0 = until interrupted)
        #[arg(long)]
        max_wait_secs: Option<u64>,
    },
    /// Merge successful execution results into a timeline
    Aggregate {
        #[arg(long)]
        since: Option<DateTime<Utc>>,
        /// Write the timeline as JSON lines to this file
        #[arg(long)]
        output: Option<PathBuf>,
        /// Anomalous records closer than this are one event
        #[arg(long, default_value = "300")]
        event_gap_secs: i64,
    },
}
