use crate::api::*;
use crate::error::FetchError;
use crate::schema::dataset::Envelope;
use async_trait::async_trait;
use std::fmt;
use tracing::{error, trace};

////////////////////////////////////////////////////////////////////////////////////////////////////
//
// API Documentation: https://www.alphavantage.co/documentation/#daily
//
////////////////////////////////////////////////////////////////////////////////////////////////////

pub static BASE_URL: &str = "https://www.alphavantage.co/query";

static FUNCTION: &str = "TIME_SERIES_DAILY";
static ENTITLEMENT: &str = "delayed";

/// `compact` returns the latest 100 days; `full` returns the whole history.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum OutputSize {
    #[default]
    Compact,
    Full,
}

impl OutputSize {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Compact => "compact",
            Self::Full => "full",
        }
    }
}

impl fmt::Display for OutputSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

////////////////////////////////////////////////////////////////////////////////////////////////////
//
// Alpha Vantage API
//
////////////////////////////////////////////////////////////////////////////////////////////////////

pub struct AlphaVantage {
    http_client: HttpClient,
    base_url: String,
    api_key: String,
    output_size: OutputSize,
}

impl AlphaVantage {
    pub fn new(http_client: HttpClient, api_key: String, output_size: OutputSize) -> Self {
        Self {
            http_client,
            base_url: BASE_URL.to_string(),
            api_key,
            output_size,
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    fn query<'a>(&'a self, symbol: &'a str) -> [(&'static str, &'a str); 5] {
        [
            ("function", FUNCTION),
            ("symbol", symbol),
            ("entitlement", ENTITLEMENT),
            ("outputsize", self.output_size.as_str()),
            ("apikey", &self.api_key),
        ]
    }
}

// -------------------------------------------------------------------------------------------------

#[async_trait]
impl PriceSource for AlphaVantage {
    async fn daily(&self, symbol: &str) -> Result<Envelope, FetchError> {
        trace!("Fetching daily prices for {symbol} from Alpha Vantage");

        // reqwest errors carry the URL, which carries the API key
        let response = self
            .http_client
            .get(&self.base_url)
            .query(&self.query(symbol))
            .send()
            .await
            .and_then(|response| response.error_for_status())
            .map_err(|e| {
                let e = e.without_url();
                error!("{symbol} price fetching error: {e}");
                e
            })?
            .bytes()
            .await
            .map_err(|e| {
                let e = e.without_url();
                error!("{symbol} byte transformation error: {e}");
                e
            })?;

        trace!("Deserializing daily prices for {symbol}");
        let envelope = serde_json::from_slice::<Envelope>(&response).map_err(|e| {
            error!("{symbol} deserialization error: {e}");
            e
        })?;

        Ok(envelope)
    }
}
