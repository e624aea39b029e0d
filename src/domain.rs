use std::fmt;
use std::str::FromStr;

use chrono::{Local, NaiveDateTime};
use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

use crate::error::WranglerError;
use crate::format::LogicalFormat;

pub type Record = Map<String, Value>;

pub const DATA_SOURCES: &str = "data_sources";
pub const COUNTRY_CODES: &str = "country_codes";
pub const SOURCE_KEY: &str = "import_name";

const STAMP_FORMAT: &str = "%Y%m%d%H%M%S";

/// Wall-clock instant encoded as the integer `YYYYMMDDHHMMSS`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FetchStamp(u64);

impl FetchStamp {
    pub fn new(value: u64) -> Self {
        Self(value)
    }

    pub fn now() -> Self {
        Self::from_datetime(Local::now().naive_local())
    }

    pub fn from_datetime(datetime: NaiveDateTime) -> Self {
        let text = datetime.format(STAMP_FORMAT).to_string();
        Self(text.parse().unwrap_or(0))
    }

    pub fn as_u64(self) -> u64 {
        self.0
    }

    /// Calendar reading of the stamp, `None` when the digits are not a real date.
    pub fn to_datetime(self) -> Option<NaiveDateTime> {
        NaiveDateTime::parse_from_str(&format!("{:014}", self.0), STAMP_FORMAT).ok()
    }
}

impl fmt::Display for FetchStamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceDescriptor {
    pub import_name: String,
    #[serde(default, deserialize_with = "lenient_string")]
    pub data_url: Option<String>,
    #[serde(default)]
    pub data_format: String,
    #[serde(default, deserialize_with = "lenient_number")]
    pub header: Option<usize>,
    #[serde(default, deserialize_with = "lenient_number")]
    pub refresh_rate: Option<u32>,
    #[serde(default, deserialize_with = "lenient_stamp")]
    pub data_date: Option<FetchStamp>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub data_key: Option<String>,
    #[serde(default, deserialize_with = "lenient_paths")]
    pub local_file_paths: Vec<String>,
    #[serde(default, deserialize_with = "lenient_paths")]
    pub normalized_file_paths: Vec<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl SourceDescriptor {
    pub fn new(import_name: &str, data_url: &str, data_format: LogicalFormat) -> Self {
        Self {
            import_name: import_name.to_string(),
            data_url: Some(data_url.to_string()),
            data_format: data_format.to_string(),
            header: None,
            refresh_rate: None,
            data_date: None,
            data_key: None,
            local_file_paths: Vec::new(),
            normalized_file_paths: Vec::new(),
            extra: Map::new(),
        }
    }

    pub fn format(&self) -> Result<LogicalFormat, WranglerError> {
        self.data_format.parse()
    }

    pub fn download_name(&self, format: LogicalFormat) -> String {
        format!("{}.{}", self.import_name, format.download_ext())
    }

    pub fn from_record(record: Record) -> Result<Self, WranglerError> {
        let descriptor: Self = serde_json::from_value(Value::Object(record))
            .map_err(|err| WranglerError::InvalidSource(err.to_string()))?;
        if descriptor.import_name.trim().is_empty() {
            return Err(WranglerError::InvalidSource(
                "import_name must not be empty".to_string(),
            ));
        }
        Ok(descriptor)
    }

    pub fn to_record(&self) -> Result<Record, WranglerError> {
        match serde_json::to_value(self) {
            Ok(Value::Object(map)) => Ok(map),
            Ok(_) => Err(WranglerError::InvalidSource(
                "descriptor did not serialize to an object".to_string(),
            )),
            Err(err) => Err(WranglerError::InvalidSource(err.to_string())),
        }
    }

    /// Carries bookkeeping over from a stored copy unless this descriptor has
    /// a newer fetch date of its own.
    pub fn keep_bookkeeping_from(&mut self, stored: &SourceDescriptor) {
        if self.data_date >= stored.data_date {
            return;
        }
        self.data_date = stored.data_date;
        self.local_file_paths = stored.local_file_paths.clone();
        self.normalized_file_paths = stored.normalized_file_paths.clone();
    }
}

fn lenient_string<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(Value::String(text)) if !text.trim().is_empty() => Some(text.trim().to_string()),
        Some(Value::Number(number)) => Some(number.to_string()),
        _ => None,
    })
}

fn lenient_number<'de, D, T>(deserializer: D) -> Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: TryFrom<u64> + FromStr,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    match value {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Number(number)) => {
            let raw = number
                .as_u64()
                .or_else(|| number.as_f64().filter(|f| *f >= 0.0).map(|f| f as u64))
                .ok_or_else(|| D::Error::custom(format!("expected a non-negative number, got {number}")))?;
            T::try_from(raw)
                .map(Some)
                .map_err(|_| D::Error::custom(format!("number out of range: {raw}")))
        }
        Some(Value::String(text)) => {
            let trimmed = text.trim();
            if trimmed.is_empty() {
                return Ok(None);
            }
            // spreadsheets tend to hand integers back as "7.0"
            let integral = trimmed.strip_suffix(".0").unwrap_or(trimmed);
            integral
                .parse::<T>()
                .map(Some)
                .map_err(|_| D::Error::custom(format!("expected a number, got {text:?}")))
        }
        Some(other) => Err(D::Error::custom(format!("expected a number, got {other}"))),
    }
}

fn lenient_stamp<'de, D>(deserializer: D) -> Result<Option<FetchStamp>, D::Error>
where
    D: Deserializer<'de>,
{
    lenient_number::<D, u64>(deserializer).map(|value| value.map(FetchStamp::new))
}

fn lenient_paths<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(Value::String(path)) if !path.trim().is_empty() => vec![path],
        Some(Value::Array(items)) => items
            .into_iter()
            .filter_map(|item| match item {
                Value::String(path) => Some(path),
                _ => None,
            })
            .collect(),
        _ => Vec::new(),
    })
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;
    use serde_json::json;

    use super::*;

    #[test]
    fn stamp_round_trips_through_calendar() {
        let datetime = NaiveDate::from_ymd_opt(2016, 3, 9)
            .unwrap()
            .and_hms_opt(14, 5, 7)
            .unwrap();
        let stamp = FetchStamp::from_datetime(datetime);
        assert_eq!(stamp.as_u64(), 20160309140507);
        assert_eq!(stamp.to_datetime(), Some(datetime));
        assert_eq!(FetchStamp::new(20161399000000).to_datetime(), None);
    }

    #[test]
    fn descriptor_accepts_spreadsheet_strings() {
        let record = json!({
            "import_name": "rivers",
            "data_url": "http://example.com/rivers.zip",
            "data_format": "ESRI Shapefile",
            "header": "",
            "refresh_rate": "3.0",
            "data_date": "20160101000000",
            "owner": "hydro"
        });
        let Value::Object(record) = record else { unreachable!() };
        let descriptor = SourceDescriptor::from_record(record).unwrap();
        assert_eq!(descriptor.header, None);
        assert_eq!(descriptor.refresh_rate, Some(3));
        assert_eq!(descriptor.data_date, Some(FetchStamp::new(20160101000000)));
        assert_eq!(descriptor.format().unwrap(), LogicalFormat::EsriShapefile);
        assert_eq!(descriptor.extra.get("owner"), Some(&json!("hydro")));
    }

    #[test]
    fn descriptor_round_trips_as_record() {
        let mut descriptor =
            SourceDescriptor::new("roads", "http://example.com/roads.csv", LogicalFormat::Csv);
        descriptor.data_date = Some(FetchStamp::new(20200101120000));
        descriptor.local_file_paths = vec!["/tmp/roads.csv".to_string()];
        let record = descriptor.to_record().unwrap();
        assert_eq!(record.get("data_date"), Some(&json!(20200101120000u64)));
        assert_eq!(SourceDescriptor::from_record(record).unwrap(), descriptor);
    }

    #[test]
    fn bookkeeping_survives_reload_without_date() {
        let mut stored = SourceDescriptor::new("a", "http://x", LogicalFormat::Json);
        stored.data_date = Some(FetchStamp::new(20200101000000));
        stored.local_file_paths = vec!["a.json".to_string()];
        let mut reloaded = SourceDescriptor::new("a", "http://y", LogicalFormat::Json);
        reloaded.keep_bookkeeping_from(&stored);
        assert_eq!(reloaded.data_date, stored.data_date);
        assert_eq!(reloaded.local_file_paths, stored.local_file_paths);
        assert_eq!(reloaded.data_url.as_deref(), Some("http://y"));
    }
}
