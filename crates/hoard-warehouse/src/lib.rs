pub mod api;
pub mod config;
pub mod error;
pub mod fetch;
pub mod schema;
pub mod store;

pub use crate::config::Config;
pub use crate::error::{FetchError, SymbolOutcome};
pub use crate::fetch::{Fetcher, Tally};
pub use crate::schema::alpha_vantage::{AlphaVantage, OutputSize};
pub use crate::schema::dataset::{Dataset, Envelope, MetaData, TimeSeries};
pub use crate::store::{Clock, DataManager, FixedClock, SystemClock};
