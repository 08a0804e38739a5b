use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

use vidmp3_core::AdapterPreference;

#[derive(Parser)]
#[command(name = "vidmp3")]
#[command(author, version, about = "Convert local video files to MP3 on this machine")]
pub struct Cli {
    /// Path to config file (default: $VIDMP3_CONFIG)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Log output format
    #[arg(long, global = true, value_enum, default_value_t = LogFormat::Text)]
    pub log_format: LogFormat,

    /// Print Prometheus metrics before exiting
    #[arg(long, global = true)]
    pub metrics: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    Text,
    Json,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum AdapterArg {
    Auto,
    Direct,
    Isolated,
}

impl From<AdapterArg> for AdapterPreference {
    fn from(arg: AdapterArg) -> Self {
        match arg {
            AdapterArg::Auto => AdapterPreference::Auto,
            AdapterArg::Direct => AdapterPreference::Direct,
            AdapterArg::Isolated => AdapterPreference::Isolated,
        }
    }
}

#[derive(Subcommand)]
pub enum Commands {
    /// Convert a video to MP3
    Convert {
        /// Candidate inputs; the first acceptable one is converted
        #[arg(required = true)]
        inputs: Vec<PathBuf>,

        /// Output file or directory (default: next to the input)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Override the configured adapter
        #[arg(long, value_enum)]
        adapter: Option<AdapterArg>,

        /// Print the result as JSON
        #[arg(long)]
        json: bool,
    },

    /// Validate an input and show what would be converted
    Inspect {
        #[arg(required = true)]
        file: PathBuf,
    },

    /// Print the effective configuration
    Config,
}
