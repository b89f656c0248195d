#![doc = include_str!("../readme.md")]

mod commands;

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process::ExitCode;
use thiserror::Error;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(
    name = "sentry48",
    version,
    about = "Decode ASTERIX surveillance data and serve tracks as CoT or KLV"
)]
struct Options {
    /// Path to a TOML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Start the UDP ingest pipeline and stream CoT batches to stdout
    Ingest {
        /// Seconds between CoT batch emissions
        #[arg(long, default_value = "5")]
        cot_interval: u64,

        /// Affiliation stamped on emitted events
        #[arg(long, default_value = "unknown")]
        affiliation: String,
    },
    /// Decode a hex or binary ASTERIX capture into JSON plots
    Decode {
        /// Capture file (hex text or raw binary)
        file: PathBuf,
    },
    /// Encode JSON track summaries as a CoT XML batch
    EncodeCot {
        /// JSON file holding an array of track summaries
        file: PathBuf,

        /// Affiliation stamped on emitted events
        #[arg(long, default_value = "unknown")]
        affiliation: String,
    },
    /// Encode JSON track summaries as KLV packets, hex on stdout
    EncodeKlv {
        /// JSON file holding an array of track summaries
        file: PathBuf,

        /// KLV standard: st0601 or st0902
        #[arg(long, default_value = "st0601")]
        standard: String,
    },
}

/// Configuration problems exit with 2, runtime failures with 1.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("{0}")]
    Runtime(String),
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let options = Options::parse();
    let config = match commands::load_config(options.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("{e}");
            return ExitCode::from(2);
        }
    };

    let outcome = match options.command {
        Command::Ingest {
            cot_interval,
            affiliation,
        } => commands::ingest(config, cot_interval, &affiliation).await,
        Command::Decode { file } => commands::decode(&config, &file),
        Command::EncodeCot { file, affiliation } => commands::encode_cot(&file, &affiliation),
        Command::EncodeKlv { file, standard } => commands::encode_klv(&file, &standard),
    };

    match outcome {
        Ok(()) => ExitCode::SUCCESS,
        Err(e @ AppError::Config(_)) => {
            eprintln!("{e}");
            ExitCode::from(2)
        }
        Err(e) => {
            eprintln!("{e}");
            ExitCode::from(1)
        }
    }
}
