use crate::api::PriceSource;
use crate::config::{Config, INDEX_ADAILY_FILE, INDEX_ALIAS, INDEX_DAILY_FILE, INDEX_SYMBOL};
use crate::error::{FetchError, SymbolOutcome};
use crate::schema::alpha_vantage::OutputSize;
use crate::schema::dataset::Dataset;
use crate::store::{Clock, DataManager, SystemClock};
use chrono::NaiveDate;
use std::fmt;
use std::io::Write;
use std::path::Path;
use tokio::sync::watch;
use tokio_stream::{self as stream, StreamExt};
use tracing::{debug, error, trace, warn};

////////////////////////////////////////////////////////////////////////////////////////////////////
//
// Fetch loop: one symbol at a time, with a pause between API calls
//
////////////////////////////////////////////////////////////////////////////////////////////////////

pub struct Fetcher<S, C = SystemClock> {
    source: S,
    store: DataManager<C>,
    config: Config,
}

impl<S: PriceSource, C: Clock> Fetcher<S, C> {
    pub fn new(source: S, store: DataManager<C>, config: Config) -> Self {
        Self {
            source,
            store,
            config,
        }
    }

    pub fn store(&self) -> &DataManager<C> {
        &self.store
    }

    /// Bring the cache of `symbol` up to date, unless it already is.
    ///
    /// Never fails outright: every problem ends up in the returned outcome.
    pub async fn fetch_one(
        &self,
        symbol: &str,
        force_update: bool,
        verbose: bool,
    ) -> SymbolOutcome {
        let path = self.store.path_for(symbol);

        if !self.store.should_update(&path, force_update).await {
            trace!("{symbol} is fresh; skipping");
            if verbose {
                println!("{}", self.store.summary(symbol, &path, false, None).await);
            }
            return SymbolOutcome::Skipped;
        }

        if verbose {
            println!("📡 Fetching data for {symbol}...");
        }

        match self.update(symbol, &path, verbose).await {
            Ok(latest) => SymbolOutcome::Updated { latest },
            Err(e) => {
                if e.is_notice() {
                    warn!("{symbol}: {e}");
                } else {
                    error!("{symbol}: {e}");
                }
                if verbose {
                    println!("{}", e.report(symbol));
                }
                SymbolOutcome::Failed(e)
            }
        }
    }

    async fn update(
        &self,
        symbol: &str,
        path: &Path,
        verbose: bool,
    ) -> Result<Option<NaiveDate>, FetchError> {
        let mut incoming = self.source.daily(symbol).await?.into_dataset()?;
        let latest = incoming.latest_date();

        if self.config.output_size == OutputSize::Full {
            incoming.time_series.retain_after(self.config.cutoff);
            if incoming.time_series.is_empty() {
                debug!("{symbol}: no days after {}", self.config.cutoff);
            }
        }

        let existing = self.store.load_existing(path).await;
        let is_index = symbol == INDEX_SYMBOL;
        let index_data = is_index.then(|| incoming.clone());

        let merged = self.store.merge(existing, incoming);
        self.store.save(&merged, path).await?;
        debug!("{symbol} cache written to {}", path.display());

        if verbose {
            println!("{}", self.store.summary(symbol, path, true, latest).await);
        }

        if let Some(data) = index_data {
            match self.update_index_files(data).await {
                Ok(()) => {
                    if verbose {
                        println!("📊 Updated SSE-50 index files");
                    }
                }
                Err(e) => {
                    warn!("failed to update SSE-50 index files: {e}");
                    if verbose {
                        println!("⚠️  Error handling index files: {e}");
                    }
                }
            }
        }

        Ok(latest)
    }

    /// The SSE-50 index is also kept under two legacy file names; the second
    /// one carries the index's own code as its symbol.
    async fn update_index_files(&self, data: Dataset) -> anyhow::Result<()> {
        let adaily = self.store.file_path(INDEX_ADAILY_FILE);
        let existing = self.store.load_existing(&adaily).await;
        let merged = self.store.merge(existing, data.clone());
        self.store.save(&merged, &adaily).await?;

        let index = self.store.file_path(INDEX_DAILY_FILE);
        let existing = self.store.load_existing(&index).await;
        let mut renamed = data;
        renamed.meta_data.symbol = Some(INDEX_ALIAS.to_string());
        let merged = self.store.merge(existing, renamed);
        self.store.save(&merged, &index).await?;

        Ok(())
    }

    /// Run every symbol of `symbols` (or of the configured list) in order.
    ///
    /// The configured delay is slept after each call that reached the API,
    /// except after the last symbol. When `cancel` flips to `true` the loop
    /// stops once the current symbol is done.
    pub async fn fetch_all(
        &self,
        symbols: Option<&[String]>,
        force_update: bool,
        quiet: bool,
        mut cancel: watch::Receiver<bool>,
    ) -> Tally {
        let symbols = symbols.unwrap_or(&self.config.symbols);
        let total = symbols.len();
        let mut tally = Tally {
            total,
            ..Default::default()
        };

        if !quiet {
            println!("🚀 Starting A-stock price update for {total} symbols...");
            println!("📅 Trading day: {}", yes_no(self.store.is_trading_today()));
            println!("🔄 Force update: {}", yes_no(force_update));
        }

        let mut stream = stream::iter(symbols.iter().enumerate());
        while let Some((i, symbol)) = stream.next().await {
            if *cancel.borrow() {
                interrupted(&mut tally, symbol);
                break;
            }

            if !quiet {
                print!("[{}/{}] ", i + 1, total);
                std::io::stdout().flush().ok();
            }

            let outcome = self.fetch_one(symbol, force_update, !quiet).await;
            let called_api = !outcome.is_skipped();
            tally.record(&outcome);

            if *cancel.borrow() {
                interrupted(&mut tally, symbol);
                break;
            }

            if called_api && i + 1 < total {
                trace!("sleeping {:?} before the next call", self.config.call_delay);
                tokio::select! {
                    _ = tokio::time::sleep(self.config.call_delay) => {}
                    _ = cancelled(&mut cancel) => {}
                }
            }
        }

        if !quiet {
            println!("\n{tally}");
        }

        tally
    }
}

fn yes_no(flag: bool) -> &'static str {
    if flag {
        "Yes"
    } else {
        "No"
    }
}

fn interrupted(tally: &mut Tally, symbol: &str) {
    println!("\n⏹️  Update interrupted by user at {symbol}");
    tally.interrupted = true;
}

/// Resolves once `cancel` reads `true`; never, if the sender is gone.
async fn cancelled(cancel: &mut watch::Receiver<bool>) {
    if cancel.wait_for(|flag| *flag).await.is_err() {
        std::future::pending::<()>().await;
    }
}

////////////////////////////////////////////////////////////////////////////////////////////////////

/// Counts of a batch run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Tally {
    pub updated: usize,
    pub skipped: usize,
    pub errors: usize,
    pub total: usize,
    pub interrupted: bool,
}

impl Tally {
    pub fn record(&mut self, outcome: &SymbolOutcome) {
        match outcome {
            SymbolOutcome::Updated { .. } => self.updated += 1,
            SymbolOutcome::Skipped => self.skipped += 1,
            SymbolOutcome::Failed(_) => self.errors += 1,
        }
    }
}

impl fmt::Display for Tally {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "📋 A-Stock Update Summary:")?;
        writeln!(f, "   ✅ Updated: {}", self.updated)?;
        writeln!(f, "   ⏭️  Skipped: {}", self.skipped)?;
        writeln!(f, "   ❌ Errors: {}", self.errors)?;
        write!(f, "   📊 Total: {} symbols", self.total)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::HttpClient;
    use crate::schema::alpha_vantage::AlphaVantage;
    use crate::schema::dataset::{format_date, Envelope};
    use crate::store::FixedClock;
    use async_trait::async_trait;
    use serde_json::{json, Value};
    use std::collections::HashMap;
    use std::sync::Mutex;
    use std::time::Duration;

    /// Answers from a fixed table of payloads and records every call.
    #[derive(Default)]
    struct Canned {
        responses: HashMap<String, Value>,
        calls: Mutex<Vec<String>>,
        cancel_after_first: Option<watch::Sender<bool>>,
    }

    impl Canned {
        fn with(mut self, symbol: &str, payload: Value) -> Self {
            self.responses.insert(symbol.to_string(), payload);
            self
        }

        fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl PriceSource for Canned {
        async fn daily(&self, symbol: &str) -> Result<Envelope, FetchError> {
            self.calls.lock().unwrap().push(symbol.to_string());
            if let Some(cancel) = &self.cancel_after_first {
                let _ = cancel.send(true);
            }
            let payload = self
                .responses
                .get(symbol)
                .cloned()
                .ok_or_else(|| FetchError::Api(format!("unknown symbol {symbol}")))?;
            Ok(serde_json::from_value(payload)?)
        }
    }

    fn payload(symbol: &str, days: &[(&str, Value)]) -> Value {
        let series: serde_json::Map<String, Value> = days
            .iter()
            .map(|(day, value)| (day.to_string(), value.clone()))
            .collect();
        json!({
            "Meta Data": {
                "1. Information": "Daily Prices (open, high, low, close) and Volumes",
                "2. Symbol": symbol,
                "3. Last Refreshed": days.iter().map(|(d, _)| *d).max(),
                "4. Output Size": "Compact",
                "5. Time Zone": "US/Eastern"
            },
            "Time Series (Daily)": series
        })
    }

    fn config(symbols: &[&str]) -> Config {
        Config {
            symbols: symbols.iter().map(|s| s.to_string()).collect(),
            call_delay: Duration::ZERO,
            ..Config::default()
        }
    }

    async fn fetcher(
        source: Canned,
        config: Config,
    ) -> (tempfile::TempDir, Fetcher<Canned, FixedClock>) {
        let dir = tempfile::tempdir().unwrap();
        let today = NaiveDate::from_ymd_opt(2024, 1, 4).unwrap(); // Thursday
        let store = DataManager::with_clock(dir.path(), FixedClock(today))
            .await
            .unwrap();
        (dir, Fetcher::new(source, store, config))
    }

    // the sender is dropped straight away; the flag just stays `false`
    fn never_cancelled() -> watch::Receiver<bool> {
        watch::channel(false).1
    }

    fn date(s: &str) -> NaiveDate {
        s.parse().unwrap()
    }

    #[tokio::test]
    async fn merges_response_into_existing_cache() {
        let symbol = "600519.SHH";
        let source = Canned::default().with(
            symbol,
            payload(
                symbol,
                &[("2024-01-02", json!("NEW")), ("2024-01-03", json!("C"))],
            ),
        );
        let (_dir, fetcher) = fetcher(source, config(&[symbol])).await;

        let path = fetcher.store().path_for(symbol);
        let cached: Envelope = serde_json::from_value(payload(
            symbol,
            &[("2024-01-01", json!("A")), ("2024-01-02", json!("OLD"))],
        ))
        .unwrap();
        fetcher
            .store()
            .save(&cached.into_dataset().unwrap(), &path)
            .await
            .unwrap();

        let outcome = fetcher.fetch_one(symbol, false, false).await;
        assert!(matches!(
            outcome,
            SymbolOutcome::Updated { latest: Some(d) } if d == date("2024-01-03")
        ));

        let saved = fetcher.store().load_existing(&path).await.unwrap();
        let dates: Vec<_> = saved.time_series.dates().map(format_date).collect();
        assert_eq!(dates, vec!["2024-01-03", "2024-01-02", "2024-01-01"]);
        assert_eq!(saved.time_series.get(&date("2024-01-02")), Some(&json!("OLD")));
        assert_eq!(saved.meta_data.last_refreshed.as_deref(), Some("2024-01-03"));
    }

    #[tokio::test]
    async fn fresh_cache_is_skipped_without_a_call() {
        let symbol = "600519.SHH";
        let (_dir, fetcher) = fetcher(Canned::default(), config(&[symbol])).await;
        let path = fetcher.store().path_for(symbol);
        let cached: Envelope =
            serde_json::from_value(payload(symbol, &[("2024-01-03", json!("C"))])).unwrap();
        fetcher
            .store()
            .save(&cached.into_dataset().unwrap(), &path)
            .await
            .unwrap();

        assert!(fetcher.fetch_one(symbol, false, false).await.is_skipped());
        assert!(fetcher.source.calls().is_empty());
    }

    #[tokio::test]
    async fn api_markers_fail_and_leave_cache_alone() {
        let source = Canned::default()
            .with("NOTE", json!({ "Note": "Thank you for using Alpha Vantage!" }))
            .with("INFO", json!({ "Information": "premium endpoint" }))
            .with("ERR", json!({ "Error Message": "Invalid API call." }))
            .with("BAD", json!({ "Meta Data": {} }));
        let (_dir, fetcher) = fetcher(source, config(&[])).await;

        let cases: [(&str, fn(&FetchError) -> bool); 4] = [
            ("NOTE", |e| matches!(e, FetchError::RateLimited(_))),
            ("INFO", |e| matches!(e, FetchError::Information(_))),
            ("ERR", |e| matches!(e, FetchError::Api(_))),
            ("BAD", |e| matches!(e, FetchError::InvalidStructure)),
        ];
        for (symbol, expected) in cases {
            match fetcher.fetch_one(symbol, true, false).await {
                SymbolOutcome::Failed(e) => assert!(expected(&e), "{symbol}: {e}"),
                other => panic!("{symbol}: unexpected outcome {other:?}"),
            }
            assert!(!fetcher.store().path_for(symbol).exists());
        }
    }

    #[tokio::test]
    async fn full_output_keeps_days_after_cutoff() {
        let symbol = "600519.SHH";
        let source = Canned::default().with(
            symbol,
            payload(
                symbol,
                &[
                    ("2025-09-30", json!(1)),
                    ("2025-10-01", json!(2)),
                    ("2025-10-02", json!(3)),
                ],
            ),
        );
        let config = Config {
            output_size: OutputSize::Full,
            ..config(&[symbol])
        };
        let (_dir, fetcher) = fetcher(source, config).await;

        let outcome = fetcher.fetch_one(symbol, true, false).await;
        assert!(outcome.is_updated());

        let saved = fetcher
            .store()
            .load_existing(&fetcher.store().path_for(symbol))
            .await
            .unwrap();
        assert_eq!(
            saved.time_series.dates().collect::<Vec<_>>(),
            vec![date("2025-10-02")]
        );
    }

    #[tokio::test]
    async fn index_symbol_writes_derived_files() {
        let source = Canned::default().with(
            INDEX_SYMBOL,
            payload(INDEX_SYMBOL, &[("2024-01-03", json!("C"))]),
        );
        let (_dir, fetcher) = fetcher(source, config(&[INDEX_SYMBOL])).await;

        assert!(fetcher.fetch_one(INDEX_SYMBOL, false, false).await.is_updated());

        let store = fetcher.store();
        let adaily = store
            .load_existing(&store.file_path(INDEX_ADAILY_FILE))
            .await
            .unwrap();
        assert_eq!(adaily.meta_data.symbol.as_deref(), Some(INDEX_SYMBOL));

        let index = store
            .load_existing(&store.file_path(INDEX_DAILY_FILE))
            .await
            .unwrap();
        assert_eq!(index.meta_data.symbol.as_deref(), Some(INDEX_ALIAS));
        assert_eq!(index.latest_date(), Some(date("2024-01-03")));
    }

    #[tokio::test]
    async fn batch_counts_each_outcome() {
        let source = Canned::default()
            .with("A", payload("A", &[("2024-01-03", json!(1))]))
            .with("B", json!({ "Error Message": "Invalid API call." }));
        let (_dir, fetcher) = fetcher(source, config(&["A", "B", "C"])).await;

        // C is already cached and fresh
        let cached: Envelope =
            serde_json::from_value(payload("C", &[("2024-01-04", json!(1))])).unwrap();
        fetcher
            .store()
            .save(&cached.into_dataset().unwrap(), &fetcher.store().path_for("C"))
            .await
            .unwrap();

        let tally = fetcher.fetch_all(None, false, true, never_cancelled()).await;
        assert_eq!(
            tally,
            Tally {
                updated: 1,
                skipped: 1,
                errors: 1,
                total: 3,
                interrupted: false,
            }
        );
        assert_eq!(fetcher.source.calls(), vec!["A", "B"]);
    }

    #[tokio::test]
    async fn explicit_symbols_override_configured_list() {
        let source = Canned::default().with("X", payload("X", &[("2024-01-03", json!(1))]));
        let (_dir, fetcher) = fetcher(source, config(&["A", "B"])).await;

        let symbols = vec!["X".to_string()];
        let tally = fetcher
            .fetch_all(Some(symbols.as_slice()), false, true, never_cancelled())
            .await;
        assert_eq!(tally.updated, 1);
        assert_eq!(tally.total, 1);
        assert_eq!(fetcher.source.calls(), vec!["X"]);
    }

    #[tokio::test]
    async fn cancellation_stops_after_current_symbol() {
        let (tx, rx) = watch::channel(false);
        let source = Canned {
            cancel_after_first: Some(tx),
            ..Canned::default()
        }
        .with("A", payload("A", &[("2024-01-03", json!(1))]))
        .with("B", payload("B", &[("2024-01-03", json!(1))]));
        let config = Config {
            call_delay: Duration::from_secs(3600),
            ..config(&["A", "B"])
        };
        let (_dir, fetcher) = fetcher(source, config).await;

        let tally = tokio::time::timeout(
            Duration::from_secs(10),
            fetcher.fetch_all(None, false, true, rx),
        )
        .await
        .expect("cancelled batch must not sleep");

        assert!(tally.interrupted);
        assert_eq!(tally.updated, 1);
        assert_eq!(fetcher.source.calls(), vec!["A"]);
        assert!(fetcher.store().path_for("A").exists());
    }

    #[tokio::test]
    async fn cancellation_cuts_the_pause_short() {
        let (tx, rx) = watch::channel(false);
        let source = Canned::default()
            .with("A", payload("A", &[("2024-01-03", json!(1))]))
            .with("B", payload("B", &[("2024-01-03", json!(1))]));
        let config = Config {
            call_delay: Duration::from_secs(3600),
            ..config(&["A", "B"])
        };
        let (_dir, fetcher) = fetcher(source, config).await;

        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(200)).await;
            let _ = tx.send(true);
        });

        let tally = tokio::time::timeout(
            Duration::from_secs(10),
            fetcher.fetch_all(None, false, true, rx),
        )
        .await
        .expect("pause must end on cancellation");

        assert!(tally.interrupted);
        assert_eq!(fetcher.source.calls(), vec!["A"]);
    }

    #[tokio::test]
    async fn no_pause_after_the_last_symbol() {
        let source = Canned::default().with("A", payload("A", &[("2024-01-03", json!(1))]));
        let config = Config {
            call_delay: Duration::from_secs(3600),
            ..config(&["A"])
        };
        let (_dir, fetcher) = fetcher(source, config).await;

        let tally = tokio::time::timeout(
            Duration::from_secs(10),
            fetcher.fetch_all(None, false, true, never_cancelled()),
        )
        .await
        .expect("last symbol must not be followed by a pause");

        assert_eq!(tally.updated, 1);
        assert!(!tally.interrupted);
    }

    #[tokio::test]
    async fn no_pause_after_a_skipped_symbol() {
        let source = Canned::default().with("A", payload("A", &[("2024-01-03", json!(1))]));
        let config = Config {
            call_delay: Duration::from_secs(3600),
            ..config(&["C", "A"])
        };
        let (_dir, fetcher) = fetcher(source, config).await;

        let cached: Envelope =
            serde_json::from_value(payload("C", &[("2024-01-04", json!(1))])).unwrap();
        fetcher
            .store()
            .save(&cached.into_dataset().unwrap(), &fetcher.store().path_for("C"))
            .await
            .unwrap();

        let tally = tokio::time::timeout(
            Duration::from_secs(10),
            fetcher.fetch_all(None, false, true, never_cancelled()),
        )
        .await
        .expect("a skipped symbol must not be followed by a pause");

        assert_eq!((tally.skipped, tally.updated), (1, 1));
        assert_eq!(fetcher.source.calls(), vec!["A"]);
    }

    #[tokio::test]
    async fn index_file_failure_keeps_the_symbol_updated() {
        let source = Canned::default().with(
            INDEX_SYMBOL,
            payload(INDEX_SYMBOL, &[("2024-01-03", json!("C"))]),
        );
        let (_dir, fetcher) = fetcher(source, config(&[INDEX_SYMBOL])).await;

        // a directory where the file should go makes the rename fail
        let adaily = fetcher.store().file_path(INDEX_ADAILY_FILE);
        tokio::fs::create_dir_all(&adaily).await.unwrap();

        let outcome = fetcher.fetch_one(INDEX_SYMBOL, false, false).await;
        assert!(matches!(
            outcome,
            SymbolOutcome::Updated { latest: Some(d) } if d == date("2024-01-03")
        ));
        assert!(fetcher.store().path_for(INDEX_SYMBOL).is_file());
        assert!(adaily.is_dir());
    }

    #[tokio::test]
    async fn failed_save_is_a_storage_error_and_the_batch_goes_on() {
        let source = Canned::default()
            .with("A", payload("A", &[("2024-01-03", json!(1))]))
            .with("B", payload("B", &[("2024-01-03", json!(1))]));
        let (_dir, fetcher) = fetcher(source, config(&["A", "B"])).await;

        let blocked = fetcher.store().path_for("A");
        tokio::fs::create_dir_all(&blocked).await.unwrap();

        match fetcher.fetch_one("A", false, false).await {
            SymbolOutcome::Failed(FetchError::Storage(_)) => {}
            other => panic!("unexpected outcome {other:?}"),
        }

        let tally = fetcher.fetch_all(None, false, true, never_cancelled()).await;
        assert_eq!((tally.updated, tally.errors), (1, 1));
        assert_eq!(fetcher.source.calls(), vec!["A", "A", "B"]);
        assert!(fetcher.store().path_for("B").is_file());
    }

    #[tokio::test]
    async fn network_failure_fails_the_symbol_and_the_batch_goes_on() {
        let http_client = HttpClient::builder().no_proxy().build().unwrap();
        let source = AlphaVantage::new(http_client, "KEY".to_string(), OutputSize::Compact)
            .with_base_url("http://127.0.0.1:9/query");
        let dir = tempfile::tempdir().unwrap();
        let today = NaiveDate::from_ymd_opt(2024, 1, 4).unwrap();
        let store = DataManager::with_clock(dir.path(), FixedClock(today))
            .await
            .unwrap();
        let fetcher = Fetcher::new(source, store, config(&["A", "B"]));

        match fetcher.fetch_one("A", false, false).await {
            SymbolOutcome::Failed(e) => {
                assert!(matches!(e, FetchError::Network(_)), "{e:?}");
            }
            other => panic!("unexpected outcome {other:?}"),
        }

        let tally = fetcher.fetch_all(None, false, true, never_cancelled()).await;
        assert_eq!((tally.errors, tally.total), (2, 2));
        assert!(!tally.interrupted);
    }

    #[test]
    fn tally_block() {
        let tally = Tally {
            updated: 2,
            skipped: 47,
            errors: 1,
            total: 50,
            interrupted: false,
        };
        assert_eq!(
            tally.to_string(),
            "📋 A-Stock Update Summary:\n   ✅ Updated: 2\n   ⏭️  Skipped: 47\n   ❌ Errors: 1\n   📊 Total: 50 symbols"
        );
    }
}
