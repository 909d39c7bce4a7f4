use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};
use trim_engine::time::parse_timestamp;
use trim_engine::{ClipId, ExtractionStrategy};

/// Trim media sources and manage the local clip cache.
#[derive(Parser, Debug)]
#[command(name = "clipnexus", author, version, about, long_about = None)]
pub struct Args {
    /// Configuration file (defaults to the platform config directory)
    #[arg(short = 'c', long = "config", value_name = "FILE", global = true)]
    pub config: Option<PathBuf>,

    /// Cache directory, overriding the configured one
    #[arg(long = "cache-dir", value_name = "DIR", global = true)]
    pub cache_dir: Option<PathBuf>,

    /// Increase logging verbosity (default: warn, -v: info, -vv: debug, -vvv+: trace)
    #[arg(short = 'v', long = "verbose", action = clap::ArgAction::Count, global = true)]
    pub verbosity: u8,

    #[command(subcommand)]
    pub command: CliCommand,
}

#[derive(Subcommand, Debug)]
pub enum CliCommand {
    /// Print duration, container, streams and seek granularity
    Probe {
        #[arg(value_name = "FILE")]
        file: PathBuf,
    },
    /// Cache `[start, end)` of a source as a standalone clip
    Trim {
        #[arg(value_name = "FILE")]
        file: PathBuf,

        /// Inclusive start, `[[hh:]mm:]ss[.fff]`
        #[arg(long, value_name = "TIME", value_parser = parse_time_arg)]
        start: i64,

        /// Exclusive end, `[[hh:]mm:]ss[.fff]`
        #[arg(long, value_name = "TIME", value_parser = parse_time_arg)]
        end: i64,

        /// Extraction strategy, overriding the configured one
        #[arg(long, value_enum)]
        strategy: Option<StrategyArg>,

        /// Replace the clip of an existing entry, keeping its id
        #[arg(long, value_name = "ID")]
        overwrite: Option<ClipId>,
    },
    /// List cached clips, most recent first
    List,
    /// Drop entries whose clip file is gone
    Prune,
    /// Delete one cached clip and its entry
    Remove {
        #[arg(value_name = "ID")]
        id: ClipId,
    },
    /// Set the display label of a cached clip; omit LABEL to clear it
    Label {
        #[arg(value_name = "ID")]
        id: ClipId,

        #[arg(value_name = "LABEL")]
        label: Option<String>,
    },
    /// Simulate looped preview playback and print cursor positions
    Preview {
        #[arg(value_name = "FILE")]
        file: PathBuf,

        #[arg(long, value_name = "TIME", value_parser = parse_time_arg)]
        start: Option<i64>,

        #[arg(long, value_name = "TIME", value_parser = parse_time_arg)]
        end: Option<i64>,

        /// Simulated wall time in seconds
        #[arg(long, value_name = "N", default_value_t = 6.0)]
        seconds: f64,

        /// Ticks per simulated second
        #[arg(long, value_name = "F", default_value_t = 4.0)]
        fps: f64,
    },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum StrategyArg {
    Reencode,
    Copy,
    Auto,
}

impl From<StrategyArg> for ExtractionStrategy {
    fn from(value: StrategyArg) -> Self {
        match value {
            StrategyArg::Reencode => Self::Reencode,
            StrategyArg::Copy => Self::StreamCopy,
            StrategyArg::Auto => Self::Auto,
        }
    }
}

fn parse_time_arg(value: &str) -> Result<i64, String> {
    parse_timestamp(value).map_err(|error| error.to_string())
}
