use crate::error::FetchError;
use crate::schema::dataset::Envelope;
use async_trait::async_trait;

pub type HttpClient = reqwest::Client;

/// Anything that can hand back a daily price payload for a symbol.
///
/// The payload is returned unclassified; rate-limit notices and API errors
/// are still inside the [`Envelope`] at this point.
#[async_trait]
pub trait PriceSource: Send + Sync {
    async fn daily(&self, symbol: &str) -> Result<Envelope, FetchError>;
}
