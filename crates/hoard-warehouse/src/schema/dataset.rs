use crate::error::FetchError;
use chrono::NaiveDate;
use serde::de::{self, MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;
use std::collections::BTreeMap as Map;
use std::fmt;

/// Date layout of every time series key, e.g. `2024-01-03`.
pub static DATE_FORMAT: &str = "%Y-%m-%d";

pub fn format_date(date: NaiveDate) -> String {
    date.format(DATE_FORMAT).to_string()
}

////////////////////////////////////////////////////////////////////////////////////////////////////
//
// Time series
//
////////////////////////////////////////////////////////////////////////////////////////////////////

/// Daily records keyed by trading date.
///
/// The per-day value is kept as opaque JSON; only the keys are interpreted.
/// Keys are parsed into dates on the way in, so ordering is by calendar value,
/// and the series is always written newest first:
///
/// ```json
/// "Time Series (Daily)": {
///     "2024-01-03": { "1. open": "1688.0000", ... },
///     "2024-01-02": { "1. open": "1715.0000", ... },
///     ...
/// }
/// ```
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TimeSeries(Map<NaiveDate, Value>);

impl TimeSeries {
    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn get(&self, date: &NaiveDate) -> Option<&Value> {
        self.0.get(date)
    }

    /// Most recent date in the series.
    pub fn latest(&self) -> Option<NaiveDate> {
        self.0.keys().next_back().copied()
    }

    /// Dates, newest first.
    pub fn dates(&self) -> impl Iterator<Item = NaiveDate> + '_ {
        self.0.keys().rev().copied()
    }

    /// Add the days of `other` that are not already present.
    ///
    /// Days already in `self` keep their value.
    pub fn absorb(&mut self, other: TimeSeries) {
        for (date, value) in other.0 {
            self.0.entry(date).or_insert(value);
        }
    }

    /// Drop every day on or before `cutoff`.
    pub fn retain_after(&mut self, cutoff: NaiveDate) {
        self.0.retain(|date, _| *date > cutoff);
    }
}

impl FromIterator<(NaiveDate, Value)> for TimeSeries {
    fn from_iter<I: IntoIterator<Item = (NaiveDate, Value)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl Serialize for TimeSeries {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for (date, value) in self.0.iter().rev() {
            map.serialize_entry(&format_date(*date), value)?;
        }
        map.end()
    }
}

struct TimeSeriesVisitor;

impl<'de> Visitor<'de> for TimeSeriesVisitor {
    type Value = TimeSeries;

    fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
        formatter.write_str("a map of YYYY-MM-DD dates to daily records")
    }

    fn visit_map<A>(self, mut access: A) -> Result<Self::Value, A::Error>
    where
        A: MapAccess<'de>,
    {
        let mut series = Map::new();
        while let Some((key, value)) = access.next_entry::<String, Value>()? {
            let date = NaiveDate::parse_from_str(&key, DATE_FORMAT)
                .map_err(|e| de::Error::custom(format!("invalid date key {key:?}: {e}")))?;
            // `2024-1-9` and `2024-01-09` are the same day; the first one wins
            series.entry(date).or_insert(value);
        }
        Ok(TimeSeries(series))
    }
}

impl<'de> Deserialize<'de> for TimeSeries {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_map(TimeSeriesVisitor)
    }
}

////////////////////////////////////////////////////////////////////////////////////////////////////
//
// Dataset
//
////////////////////////////////////////////////////////////////////////////////////////////////////

/// `Meta Data` block of a daily price payload.
///
/// Keys the API may add later are carried through untouched in `extra`.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
pub struct MetaData {
    #[serde(rename = "1. Information", skip_serializing_if = "Option::is_none")]
    pub information: Option<String>,

    #[serde(rename = "2. Symbol", skip_serializing_if = "Option::is_none")]
    pub symbol: Option<String>,

    #[serde(rename = "3. Last Refreshed", skip_serializing_if = "Option::is_none")]
    pub last_refreshed: Option<String>,

    #[serde(rename = "4. Output Size", skip_serializing_if = "Option::is_none")]
    pub output_size: Option<String>,

    #[serde(rename = "5. Time Zone", skip_serializing_if = "Option::is_none")]
    pub time_zone: Option<String>,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// One symbol's daily prices, as cached on disk.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Dataset {
    #[serde(rename = "Meta Data", default)]
    pub meta_data: MetaData,

    #[serde(rename = "Time Series (Daily)")]
    pub time_series: TimeSeries,
}

impl Dataset {
    pub fn latest_date(&self) -> Option<NaiveDate> {
        self.time_series.latest()
    }
}

////////////////////////////////////////////////////////////////////////////////////////////////////
//
// Deserialization
//
////////////////////////////////////////////////////////////////////////////////////////////////////

/// A payload as it arrives, before anything is trusted.
///
/// Alpha Vantage answers `200 OK` for rate limits and bad symbols alike, with
/// a marker key in place of the data:
///
/// ```json
/// { "Note": "Thank you for using Alpha Vantage! Our standard API call frequency is ..." }
/// { "Information": "..." }
/// { "Error Message": "Invalid API call. ..." }
/// ```
#[derive(Deserialize, Debug, Default)]
pub struct Envelope {
    #[serde(rename = "Meta Data")]
    pub meta_data: Option<MetaData>,

    #[serde(rename = "Time Series (Daily)")]
    pub time_series: Option<TimeSeries>,

    #[serde(rename = "Note")]
    pub note: Option<String>,

    #[serde(rename = "Information")]
    pub information: Option<String>,

    #[serde(rename = "Error Message")]
    pub error_message: Option<String>,
}

impl Envelope {
    /// Carries an `Error Message` or `Information` marker; such a file is no
    /// usable cache.
    pub fn is_marked(&self) -> bool {
        self.error_message.is_some() || self.information.is_some()
    }

    /// Classify an API response into a [`Dataset`] or the reason it is not one.
    pub fn into_dataset(self) -> Result<Dataset, FetchError> {
        if let Some(note) = self.note {
            return Err(FetchError::RateLimited(note));
        }
        if let Some(information) = self.information {
            return Err(FetchError::Information(information));
        }
        if let Some(message) = self.error_message {
            return Err(FetchError::Api(message));
        }
        match (self.meta_data, self.time_series) {
            (Some(meta_data), Some(time_series)) => Ok(Dataset {
                meta_data,
                time_series,
            }),
            _ => Err(FetchError::InvalidStructure),
        }
    }
}
