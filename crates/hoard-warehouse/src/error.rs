use chrono::NaiveDate;
use thiserror::Error;

/// Why a single symbol could not be updated.
///
/// None of these stop a batch; they are collected per symbol and counted.
#[derive(Debug, Error)]
pub enum FetchError {
    /// The API's `Note` marker, sent when the call quota is exhausted.
    #[error("API call limit reached - {0}")]
    RateLimited(String),

    /// The API's `Information` marker (premium endpoint, quota notices, ...).
    #[error("API information - {0}")]
    Information(String),

    #[error("API error - {0}")]
    Api(String),

    #[error("Invalid data structure received")]
    InvalidStructure,

    #[error("Network error - {0}")]
    Network(#[from] reqwest::Error),

    #[error("Unexpected error - {0}")]
    Decode(#[from] serde_json::Error),

    #[error("Unexpected error - {0}")]
    Storage(#[from] anyhow::Error),
}

impl FetchError {
    /// Notices from the API rather than failures on either side.
    pub fn is_notice(&self) -> bool {
        matches!(self, Self::RateLimited(_) | Self::Information(_))
    }

    /// One-line report for `symbol`, as printed by the orchestrator.
    pub fn report(&self, symbol: &str) -> String {
        let icon = if self.is_notice() { "⚠️ " } else { "❌" };
        format!("{icon} {symbol}: {self}")
    }
}

/// Result of running one symbol through the fetch pipeline.
#[derive(Debug)]
pub enum SymbolOutcome {
    /// The cache was rewritten; `latest` is the newest date the API returned.
    Updated { latest: Option<NaiveDate> },

    /// The cache was fresh enough and no request was made.
    Skipped,

    Failed(FetchError),
}

impl SymbolOutcome {
    pub fn is_updated(&self) -> bool {
        matches!(self, Self::Updated { .. })
    }

    pub fn is_skipped(&self) -> bool {
        matches!(self, Self::Skipped)
    }
}
