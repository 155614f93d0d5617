use crate::schema::dataset::{format_date, Dataset, Envelope};
use chrono::{Datelike, Local, NaiveDate, Weekday};
use hoard_util::{read_json, write_json};
use std::path::{Path, PathBuf};
use tracing::{debug, trace};

////////////////////////////////////////////////////////////////////////////////////////////////////
//
// Clock
//
////////////////////////////////////////////////////////////////////////////////////////////////////

/// Source of "today" for freshness and trading-day checks.
pub trait Clock: Send + Sync {
    fn today(&self) -> NaiveDate;
}

/// Local calendar date of the machine.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn today(&self) -> NaiveDate {
        Local::now().date_naive()
    }
}

/// Always the same day.
#[derive(Debug, Clone, Copy)]
pub struct FixedClock(pub NaiveDate);

impl Clock for FixedClock {
    fn today(&self) -> NaiveDate {
        self.0
    }
}

////////////////////////////////////////////////////////////////////////////////////////////////////
//
// Local cache
//
////////////////////////////////////////////////////////////////////////////////////////////////////

/// Cache policy for the per-symbol JSON files: loading, freshness, merging
/// and saving.
pub struct DataManager<C = SystemClock> {
    data_dir: PathBuf,
    clock: C,
    max_days_old: i64,
}

impl DataManager<SystemClock> {
    pub async fn new(data_dir: impl Into<PathBuf>) -> anyhow::Result<Self> {
        Self::with_clock(data_dir, SystemClock).await
    }
}

impl<C: Clock> DataManager<C> {
    /// Create the manager, and `data_dir` if it does not exist yet.
    pub async fn with_clock(data_dir: impl Into<PathBuf>, clock: C) -> anyhow::Result<Self> {
        let data_dir = data_dir.into();
        tokio::fs::create_dir_all(&data_dir).await?;
        Ok(Self {
            data_dir,
            clock,
            max_days_old: 1,
        })
    }

    /// Freshness window used by [`should_update`](Self::should_update); 1 day
    /// unless set here.
    pub fn with_max_days_old(mut self, max_days_old: i64) -> Self {
        self.max_days_old = max_days_old;
        self
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    pub fn today(&self) -> NaiveDate {
        self.clock.today()
    }

    /// Cache file of `symbol`, e.g. `./A_stock_data/daily_prices_600519.SHH.json`.
    pub fn path_for(&self, symbol: &str) -> PathBuf {
        self.file_path(&format!("daily_prices_{symbol}.json"))
    }

    pub fn file_path(&self, file_name: &str) -> PathBuf {
        self.data_dir.join(file_name)
    }

    /// Load the dataset at `path`.
    ///
    /// A missing, unreadable or unparseable file, one that holds an API
    /// error/information marker, or one without a time series, is no usable
    /// cache: `None`.
    pub async fn load_existing(&self, path: &Path) -> Option<Dataset> {
        let envelope = match read_json::<Envelope>(path).await {
            Ok(envelope) => envelope,
            Err(e) => {
                trace!("no usable cache at {}: {e}", path.display());
                return None;
            }
        };

        if envelope.is_marked() {
            debug!("cache at {} holds an API marker; ignoring it", path.display());
            return None;
        }

        let time_series = envelope.time_series?;
        Some(Dataset {
            meta_data: envelope.meta_data.unwrap_or_default(),
            time_series,
        })
    }

    /// Most recent date of `dataset`, if it has any days at all.
    pub fn latest_date(&self, dataset: &Dataset) -> Option<NaiveDate> {
        dataset.latest_date()
    }

    /// Whether the cache at `path` reaches to within `max_days_old` calendar
    /// days of today.
    pub async fn is_fresh(&self, path: &Path, max_days_old: i64) -> bool {
        let Some(dataset) = self.load_existing(path).await else {
            return false;
        };
        let Some(latest) = self.latest_date(&dataset) else {
            return false;
        };

        let age = self.today().signed_duration_since(latest).num_days();
        trace!("cache at {} is {age} day(s) old", path.display());
        age <= max_days_old
    }

    /// Monday to Friday. Exchange holidays are not known.
    pub fn is_trading_day(&self, date: NaiveDate) -> bool {
        !matches!(date.weekday(), Weekday::Sat | Weekday::Sun)
    }

    pub fn is_trading_today(&self) -> bool {
        self.is_trading_day(self.today())
    }

    /// Whether `path` should be refetched.
    ///
    /// Staleness is only considered on trading days; outside of them any
    /// existing file is good enough.
    pub async fn should_update(&self, path: &Path, force_update: bool) -> bool {
        if force_update {
            return true;
        }
        if !tokio::fs::try_exists(path).await.unwrap_or(false) {
            return true;
        }
        self.is_trading_today() && !self.is_fresh(path, self.max_days_old).await
    }

    /// Merge `incoming` into `existing`.
    ///
    /// Days already cached are never overwritten; only new days are added.
    /// The existing metadata is kept, except `3. Last Refreshed`, which
    /// follows the newest day. Without an existing dataset, `incoming` is
    /// returned as is.
    pub fn merge(&self, existing: Option<Dataset>, incoming: Dataset) -> Dataset {
        let Some(mut merged) = existing else {
            return incoming;
        };

        merged.time_series.absorb(incoming.time_series);
        if let Some(latest) = merged.time_series.latest() {
            merged.meta_data.last_refreshed = Some(format_date(latest));
        }

        merged
    }

    /// Write `dataset` to `path`, replacing the whole file.
    pub async fn save(&self, dataset: &Dataset, path: &Path) -> anyhow::Result<()> {
        write_json(dataset, path).await?;
        debug!(
            "{} day(s) saved to {}",
            dataset.time_series.len(),
            path.display()
        );
        Ok(())
    }

    /// One-line status for `symbol`.
    ///
    /// When nothing was updated, the latest date is read back from the cache.
    pub async fn summary(
        &self,
        symbol: &str,
        path: &Path,
        was_updated: bool,
        latest_date: Option<NaiveDate>,
    ) -> String {
        if was_updated {
            return match latest_date {
                Some(date) => format!("✅ UPDATED {symbol}: Latest data {date}"),
                None => format!("✅ UPDATED {symbol}"),
            };
        }

        let latest = self
            .load_existing(path)
            .await
            .and_then(|dataset| self.latest_date(&dataset));
        match latest {
            Some(date) => format!("⏭️  SKIPPED {symbol}: Data already fresh until {date}"),
            None => format!("⏭️  SKIPPED {symbol}: No existing data or file not found"),
        }
    }
}
