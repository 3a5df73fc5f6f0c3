//! Command-line argument definitions
//!
//! One command: build (or reuse) the snapshot for an export and print a
//! summary of it.

use crate::config::{CompressionAlgorithm, PipelineConfig};
use crate::constants::{DEFAULT_DATA_DIR_NAME, DEFAULT_SNAPSHOT_FILE_NAME};
use crate::error::{CongestionError, Result};
use crate::query::DayFilter;
use clap::Parser;
use std::path::PathBuf;

/// Convert a wide Seoul subway congestion export into a long Parquet snapshot
#[derive(Debug, Clone, Parser)]
#[command(
    name = "subway-congestion",
    version,
    about = "Convert a wide Seoul subway congestion CSV into a validated long-format Parquet snapshot",
    long_about = "Reads the Seoul Metro congestion export (one column per half-hour slot), \
                  reshapes it into one row per line, station, day type, direction and slot, \
                  derives congestion levels and time periods, validates the result and caches \
                  it as a Parquet snapshot with a JSON manifest. Re-running on an unchanged \
                  source reuses the snapshot."
)]
pub struct Args {
    /// Wide-format congestion CSV (UTF-8 or CP949)
    #[arg(value_name = "INPUT")]
    pub input: PathBuf,

    /// Snapshot path
    ///
    /// Defaults to <data dir>/subway-congestion/subway_congestion.parquet.
    /// The manifest is written next to it as <OUTPUT>.manifest.json.
    #[arg(short = 'o', long = "output", value_name = "PATH")]
    pub output: Option<PathBuf>,

    /// TOML configuration file; flags below override its values
    #[arg(short = 'c', long = "config", value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Legacy encoding tried when the file is not UTF-8
    #[arg(long = "encoding", value_name = "LABEL")]
    pub encoding: Option<String>,

    /// Parquet compression algorithm (snappy, zstd, lz4, none)
    #[arg(long = "compression", value_name = "ALG")]
    pub compression: Option<String>,

    /// Rebuild the snapshot even when it matches the source
    #[arg(short = 'f', long = "force")]
    pub force: bool,

    /// Exit with status 1 when the validation report holds violations
    #[arg(long = "strict")]
    pub strict: bool,

    /// Number of busiest stations to list in the summary
    #[arg(long = "top", value_name = "N", default_value_t = 10)]
    pub top: usize,

    /// Day type for the station ranking and commute peaks
    /// (all, weekday, saturday, sunday, holiday)
    #[arg(long = "day", value_name = "DAY", default_value = "all")]
    pub day: String,

    /// Logging verbosity level
    #[arg(
        short = 'v',
        long = "verbose",
        action = clap::ArgAction::Count,
        help = "Increase logging verbosity (-v: info, -vv: debug, -vvv: trace)"
    )]
    pub verbose: u8,

    /// Only show errors
    #[arg(short = 'q', long = "quiet", conflicts_with = "verbose")]
    pub quiet: bool,
}

impl Args {
    pub fn get_log_level(&self) -> &'static str {
        if self.quiet {
            "error"
        } else {
            match self.verbose {
                0 => "warn",
                1 => "info",
                2 => "debug",
                _ => "trace",
            }
        }
    }

    pub fn show_progress(&self) -> bool {
        !self.quiet
    }

    /// Explicit output path, or the default under the user data directory
    pub fn output_path(&self) -> Result<PathBuf> {
        if let Some(path) = &self.output {
            return Ok(path.clone());
        }
        let data_dir = dirs::data_dir().ok_or_else(|| {
            CongestionError::configuration(
                "could not determine the user data directory; pass --output",
            )
        })?;
        Ok(data_dir
            .join(DEFAULT_DATA_DIR_NAME)
            .join(DEFAULT_SNAPSHOT_FILE_NAME))
    }

    pub fn day_filter(&self) -> Result<DayFilter> {
        self.day.parse()
    }

    /// Load the config file, if any, and apply flag overrides
    pub fn pipeline_config(&self) -> Result<PipelineConfig> {
        let mut config = match &self.config {
            Some(path) => PipelineConfig::from_toml_file(path)?,
            None => PipelineConfig::default(),
        };
        if let Some(encoding) = &self.encoding {
            config = config.with_encoding(encoding.as_str());
        }
        if let Some(compression) = &self.compression {
            config = config.with_compression(compression.parse::<CompressionAlgorithm>()?);
        }
        config.validate()?;
        Ok(config)
    }
}
