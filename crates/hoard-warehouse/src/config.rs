use crate::schema::alpha_vantage::{OutputSize, BASE_URL};
use chrono::NaiveDate;
use lazy_static::lazy_static;
use std::path::PathBuf;
use std::time::Duration;

/// Environment variable holding the Alpha Vantage key.
pub static API_KEY_VAR: &str = "ALPHAADVANTAGE_API_KEY";

/// SSE-50 index; fetching it also refreshes the two index files below.
pub static INDEX_SYMBOL: &str = "000016.SHH";
pub static INDEX_ALIAS: &str = "000016.SH";
pub static INDEX_ADAILY_FILE: &str = "Adaily_prices_000016.SHH.json";
pub static INDEX_DAILY_FILE: &str = "index_daily_sse_50.json";

lazy_static! {
    /// Constituents of the SSE-50, in index-weight order.
    ///
    /// This is currently maintained manually.
    pub static ref SSE_50: Vec<&'static str> = vec![
        "600519.SHH",
        "601318.SHH",
        "600036.SHH",
        "601899.SHH",
        "600900.SHH",
        "601166.SHH",
        "600276.SHH",
        "600030.SHH",
        "603259.SHH",
        "688981.SHH",
        "688256.SHH",
        "601398.SHH",
        "688041.SHH",
        "601211.SHH",
        "601288.SHH",
        "601328.SHH",
        "688008.SHH",
        "600887.SHH",
        "600150.SHH",
        "601816.SHH",
        "601127.SHH",
        "600031.SHH",
        "688012.SHH",
        "603501.SHH",
        "601088.SHH",
        "600309.SHH",
        "601601.SHH",
        "601668.SHH",
        "603993.SHH",
        "601012.SHH",
        "601728.SHH",
        "600690.SHH",
        "600809.SHH",
        "600941.SHH",
        "600406.SHH",
        "601857.SHH",
        "601766.SHH",
        "601919.SHH",
        "600050.SHH",
        "600760.SHH",
        "601225.SHH",
        "600028.SHH",
        "601988.SHH",
        "688111.SHH",
        "601985.SHH",
        "601888.SHH",
        "601628.SHH",
        "601600.SHH",
        "601658.SHH",
        "600048.SHH",
    ];
}

/// Everything the fetch loop needs to know, fixed for the length of a run.
#[derive(Debug, Clone)]
pub struct Config {
    /// Directory holding one cache file per symbol.
    pub data_dir: PathBuf,

    /// Symbols fetched when no explicit list is given.
    pub symbols: Vec<String>,

    pub output_size: OutputSize,

    /// With [`OutputSize::Full`], only days strictly after this date are kept.
    pub cutoff: NaiveDate,

    /// Pause between two API calls; the free tier allows 5 calls a minute.
    pub call_delay: Duration,

    pub timeout: Duration,
    pub base_url: String,

    /// A cache whose latest day is at most this many days old is fresh.
    pub max_days_old: i64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./A_stock_data"),
            symbols: SSE_50.iter().map(|s| s.to_string()).collect(),
            output_size: OutputSize::Compact,
            cutoff: NaiveDate::from_ymd_opt(2025, 10, 1).expect("valid cutoff date"),
            call_delay: Duration::from_secs(12),
            timeout: Duration::from_secs(30),
            base_url: BASE_URL.to_string(),
            max_days_old: 1,
        }
    }
}

/// The Alpha Vantage key from the environment (or `.env`), if set and non-empty.
pub fn api_key() -> Option<String> {
    dotenv::var(API_KEY_VAR)
        .ok()
        .filter(|key| !key.trim().is_empty())
}

/// Numbered listing of `symbols`, as printed by `--list`.
pub fn listing(symbols: &[String]) -> String {
    let mut out = String::from("Available SSE-50 A-stock symbols:\n");
    for (i, symbol) in symbols.iter().enumerate() {
        out.push_str(&format!("{:3}. {symbol}\n", i + 1));
    }
    out.push_str(&format!("\nTotal: {} symbols", symbols.len()));
    out
}
