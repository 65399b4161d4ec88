use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};

use crate::analysis::{DEFAULT_LOWER_QUANTILE, DEFAULT_UPPER_QUANTILE};
use crate::history::DEFAULT_WINDOW_SIZE;

#[derive(Parser, Debug)]
#[command(author, version, about = "Live gyroscope and climate sensor pipeline", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Path to configuration file
    #[arg(short, long, value_name = "FILE", env = "SENSORLINK_CONFIG")]
    pub config: Option<PathBuf>,

    /// Log filter in RUST_LOG syntax, e.g. `debug` or `sensorlink::ingest=trace`
    #[arg(long, global = true, value_name = "FILTER", env = "SENSORLINK_LOG")]
    pub log_level: Option<String>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Plot live samples from a source
    Live {
        #[arg(long, value_enum, default_value_t = SourceKind::Mqtt)]
        source: SourceKind,

        /// Store samples (and MQTT documents) in DuckDB
        #[arg(long)]
        persist: bool,

        /// Log status lines instead of opening a window
        #[arg(long)]
        headless: bool,

        /// Stop after this many seconds
        #[arg(long)]
        duration_secs: Option<u64>,

        /// Simulated source rate
        #[arg(long, default_value = "50.0")]
        rate_hz: f64,

        /// Probability that a simulated reading loses its z value
        #[arg(long, default_value = "0.0")]
        dropouts: f64,
    },

    /// Copy serial lines into a CSV file
    Record {
        /// Board prints `temperature,humidity` instead of `x,y,z`
        #[arg(long)]
        climate: bool,

        #[arg(short, long, value_name = "FILE")]
        output: Option<PathBuf>,

        #[arg(long)]
        duration_secs: Option<u64>,
    },

    /// Store MQTT documents in DuckDB, then export and clean them to CSV
    Ingest {
        #[arg(long, default_value = "60")]
        duration_secs: u64,
    },

    /// Export stored data to CSV
    Export {
        /// Export one session's motion samples instead of all documents
        #[arg(long)]
        session: Option<String>,

        /// List stored sessions and exit
        #[arg(long)]
        list: bool,
    },

    /// Delete one session's samples and documents
    Delete {
        #[arg(long)]
        session: String,
    },

    /// Browse a recorded CSV page by page with summary statistics
    View {
        #[arg(short, long, value_name = "FILE")]
        input: PathBuf,

        /// Samples per page
        #[arg(long, default_value_t = DEFAULT_WINDOW_SIZE)]
        window: usize,
    },

    /// Fit humidity against temperature for a recorded climate CSV
    Analyze {
        #[arg(short, long, value_name = "FILE")]
        input: PathBuf,

        #[arg(long, default_value_t = DEFAULT_LOWER_QUANTILE)]
        lower: f64,

        #[arg(long, default_value_t = DEFAULT_UPPER_QUANTILE)]
        upper: f64,

        /// Write predicted humidity over the observed temperature range
        #[arg(long, value_name = "FILE")]
        predictions: Option<PathBuf>,
    },
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
pub enum SourceKind {
    Mqtt,
    Serial,
    Simulated,
}
