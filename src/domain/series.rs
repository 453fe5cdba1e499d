// Series domain models
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

pub type Dimensions = BTreeMap<String, String>;

/// Alias the metrics API uses for the main result series of a query.
pub const RESULT_ALIAS: &str = "_result_";
pub const EXTRA_INFO_ALIAS: &str = "extra_info";
pub const LOWER_BOUND_ALIAS: &str = "lower_bound";
pub const UPPER_BOUND_ALIAS: &str = "upper_bound";
pub const IS_ANOMALY_ALIAS: &str = "is_anomaly";

/// One named series as returned by the metrics API.
///
/// Datapoints are kept as loose JSON so that a malformed point degrades to a
/// gap during ingestion instead of failing the whole response.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct RawSeries {
    #[serde(default, alias = "name")]
    pub target: String,
    #[serde(default)]
    pub alias: Option<String>,
    #[serde(default)]
    pub metric_field: Option<String>,
    #[serde(default)]
    pub unit: Option<String>,
    #[serde(default)]
    pub dimensions: Dimensions,
    #[serde(default)]
    pub time_offset: Option<String>,
    #[serde(default)]
    pub color: Option<String>,
    #[serde(default)]
    pub datapoints: Vec<serde_json::Value>,
    /// Alert time ranges, either `[{from, to}]` or a flat boundary list.
    #[serde(default)]
    pub mark_time_range: Option<serde_json::Value>,
    /// Highlighted points as `[value, timestamp]` pairs.
    #[serde(default)]
    pub mark_points: Option<serde_json::Value>,
}

impl RawSeries {
    pub fn role(&self) -> SeriesRole {
        SeriesRole::from_alias(self.alias.as_deref())
    }
}

#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq)]
pub struct MetricDimension {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub is_dimension: Option<bool>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq)]
pub struct MetricMetadata {
    #[serde(default)]
    pub metric_field: String,
    #[serde(default)]
    pub unit: Option<String>,
    #[serde(default)]
    pub dimensions: Vec<MetricDimension>,
}

/// Settled payload of one query target.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct QueryResult {
    #[serde(default)]
    pub series: Vec<RawSeries>,
    #[serde(default)]
    pub metrics: Vec<MetricMetadata>,
}

/// What a series is used for once it reaches the chart.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SeriesRole {
    Primary,
    LowerBound,
    UpperBound,
    IsAnomaly,
    Auxiliary,
}

impl SeriesRole {
    pub fn from_alias(alias: Option<&str>) -> Self {
        match alias {
            None | Some("") | Some(RESULT_ALIAS) | Some(EXTRA_INFO_ALIAS) => SeriesRole::Primary,
            Some(LOWER_BOUND_ALIAS) => SeriesRole::LowerBound,
            Some(UPPER_BOUND_ALIAS) => SeriesRole::UpperBound,
            Some(IS_ANOMALY_ALIAS) => SeriesRole::IsAnomaly,
            Some(_) => SeriesRole::Auxiliary,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct NormalizedPoint {
    pub timestamp: i64,
    pub value: Option<f64>,
    /// Both neighbours are gaps, or the series has a single point.
    pub is_isolated: bool,
}

impl NormalizedPoint {
    pub fn new(timestamp: i64, value: Option<f64>) -> Self {
        Self {
            timestamp,
            value,
            is_isolated: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TimeRangeBand {
    pub from: i64,
    /// `None` extends the band to the right edge of the chart.
    pub to: Option<i64>,
}

#[derive(Debug, Clone)]
pub struct NormalizedSeries {
    pub name: String,
    pub alias: Option<String>,
    pub role: SeriesRole,
    pub unit: Option<String>,
    pub metric_field: Option<String>,
    pub dimensions: Dimensions,
    pub color: Option<String>,
    pub points: Vec<NormalizedPoint>,
    pub alert_bands: Vec<TimeRangeBand>,
    /// Highlighted `(timestamp, value)` pairs supplied by the API.
    pub highlighted: Vec<(i64, f64)>,
}

impl NormalizedSeries {
    pub fn numeric_values(&self) -> impl Iterator<Item = f64> + '_ {
        self.points.iter().filter_map(|p| p.value)
    }

    pub fn has_isolated_point(&self) -> bool {
        self.points.iter().any(|p| p.is_isolated)
    }
}
