use clap::{Parser, ValueEnum};
use hoard_warehouse::OutputSize;
use std::path::PathBuf;
use tracing::Level;

/// Update A-stock (SSE-50) daily price data with smart caching.
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Force update all A-stocks, ignoring the local cache.
    #[arg(long)]
    pub force: bool,

    /// Run in quiet mode.
    #[arg(long)]
    pub quiet: bool,

    /// Specific A-stock symbols to update.
    #[arg(long, num_args = 1..)]
    pub symbols: Option<Vec<String>>,

    /// List all available A-stock symbols.
    #[arg(long)]
    pub list: bool,

    /// Directory of the cached `.json` files.
    #[arg(long, default_value = "./A_stock_data")]
    pub data_dir: PathBuf,

    /// Amount of history requested per symbol.
    #[arg(long, default_value = "compact")]
    pub output_size: Size,

    /// Sets the level of tracing
    #[arg(long, default_value = "warn", ignore_case = true)]
    pub trace: TraceLevel,
}

#[derive(ValueEnum, Copy, Clone, Debug, PartialEq, Eq)]
pub enum Size {
    /// Latest 100 trading days.
    Compact,

    /// Whole history, trimmed to the days after the configured cutoff.
    Full,
}

impl From<Size> for OutputSize {
    fn from(size: Size) -> Self {
        match size {
            Size::Compact => OutputSize::Compact,
            Size::Full => OutputSize::Full,
        }
    }
}

#[derive(ValueEnum, Copy, Clone, Debug, PartialEq, Eq)]
pub enum TraceLevel {
    DEBUG,
    INFO,
    WARN,
    ERROR,
}

impl From<TraceLevel> for Level {
    fn from(level: TraceLevel) -> Self {
        match level {
            TraceLevel::DEBUG => Level::DEBUG,
            TraceLevel::INFO => Level::INFO,
            TraceLevel::WARN => Level::WARN,
            TraceLevel::ERROR => Level::ERROR,
        }
    }
}
