// Threshold and anomaly markup
use super::boundary::DimensionSignature;
use super::error::MarkupError;
use super::series::{NormalizedSeries, SeriesRole, TimeRangeBand};
use serde::{Deserialize, Serialize, Serializer};
use serde_json::Value;
use std::collections::HashMap;

pub const ANOMALY_COLOR: &str = "#EA3636";
pub const ALERT_BAND_COLOR: &str = "#FFF5EC";
pub const ALERT_BAND_BORDER: &str = "#FFE9D5";
pub const THRESHOLD_LINE_COLOR: &str = "#FD9C9C";

/// Headroom above the largest threshold so its label is not clipped.
const THRESHOLD_HEADROOM: f64 = 1.1;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ThresholdMethod {
    Gt,
    Gte,
    Lt,
    Lte,
    Eq,
    Neq,
}

impl ThresholdMethod {
    fn is_lower_limit(self) -> bool {
        matches!(self, ThresholdMethod::Gt | ThresholdMethod::Gte)
    }

    fn is_upper_limit(self) -> bool {
        matches!(self, ThresholdMethod::Lt | ThresholdMethod::Lte)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Condition {
    And,
    Or,
}

/// A static threshold configured on a panel.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct Threshold {
    #[serde(default)]
    pub name: Option<String>,
    pub y_axis: f64,
    #[serde(default)]
    pub method: Option<ThresholdMethod>,
    #[serde(default)]
    pub condition: Option<Condition>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum AreaEdge {
    Value(f64),
    /// Top of the plot area.
    Max,
}

impl Serialize for AreaEdge {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            AreaEdge::Value(v) => serializer.serialize_f64(*v),
            AreaEdge::Max => serializer.serialize_str("max"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MarkLine {
    pub color: &'static str,
    pub data: Vec<MarkLineItem>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MarkLineItem {
    pub name: Option<String>,
    pub y_axis: f64,
}

/// Horizontal region between two y values.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ThresholdArea {
    pub from: f64,
    pub to: AreaEdge,
}

/// Vertical region between two timestamps.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AlertArea {
    pub from: i64,
    pub to: Option<i64>,
    pub color: &'static str,
    pub border_color: &'static str,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MarkPoint {
    pub x: i64,
    pub y: f64,
    pub color: Option<&'static str>,
    pub symbol_size: u8,
}

/// Y-axis extent contributed by thresholds.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct ThresholdExtent {
    pub can_scale: bool,
    pub min: Option<f64>,
    pub max: Option<f64>,
}

pub fn threshold_line(thresholds: &[Threshold], base: f64) -> Option<MarkLine> {
    if thresholds.is_empty() {
        return None;
    }
    Some(MarkLine {
        color: THRESHOLD_LINE_COLOR,
        data: thresholds
            .iter()
            .map(|t| MarkLineItem {
                name: t.name.clone(),
                y_axis: t.y_axis + base,
            })
            .collect(),
    })
}

/// Shaded ranges implied by comparison thresholds.
///
/// A lower limit followed by an `and` upper limit (or the reverse) closes a
/// range; a lone lower limit extends to the top, a lone upper limit down to zero.
pub fn threshold_areas(thresholds: &[Threshold], base: f64) -> Vec<ThresholdArea> {
    let ranged: Vec<(&Threshold, ThresholdMethod)> = thresholds
        .iter()
        .filter_map(|t| match t.method {
            Some(ThresholdMethod::Eq) | Some(ThresholdMethod::Neq) | None => None,
            Some(method) => Some((t, method)),
        })
        .collect();

    let mut areas = Vec::new();
    let mut index = 0;
    while index < ranged.len() {
        let (current, method) = ranged[index];
        let paired = ranged.get(index + 1).filter(|(next, next_method)| {
            next.condition == Some(Condition::And)
                && ((method.is_lower_limit()
                    && next_method.is_upper_limit()
                    && next.y_axis >= current.y_axis)
                    || (method.is_upper_limit()
                        && next_method.is_lower_limit()
                        && next.y_axis <= current.y_axis))
        });

        let to = match paired {
            Some((next, _)) => {
                index += 1;
                AreaEdge::Value(next.y_axis + base)
            }
            None if method.is_lower_limit() => AreaEdge::Max,
            None => AreaEdge::Value(current.y_axis.min(0.0) + base),
        };
        areas.push(ThresholdArea {
            from: current.y_axis + base,
            to,
        });
        index += 1;
    }
    areas
}

pub fn threshold_extent(thresholds: &[Threshold]) -> ThresholdExtent {
    if thresholds.is_empty() {
        return ThresholdExtent::default();
    }
    let min = thresholds.iter().map(|t| t.y_axis).fold(f64::INFINITY, f64::min);
    let max = thresholds.iter().map(|t| t.y_axis).fold(f64::NEG_INFINITY, f64::max);
    ThresholdExtent {
        can_scale: thresholds.iter().all(|t| t.y_axis > 0.0),
        min: Some(min),
        max: Some(max * THRESHOLD_HEADROOM),
    }
}

pub fn alert_areas(bands: &[TimeRangeBand]) -> Vec<AlertArea> {
    bands
        .iter()
        .map(|band| AlertArea {
            from: band.from,
            to: band.to,
            color: ALERT_BAND_COLOR,
            border_color: ALERT_BAND_BORDER,
        })
        .collect()
}

/// Red marks on `primary` wherever the matching `is_anomaly` series is truthy,
/// plus any highlighted points the API attached to the series.
pub fn anomaly_points(primary: &NormalizedSeries, all: &[NormalizedSeries], base: f64) -> Vec<MarkPoint> {
    let signature = DimensionSignature::of(&primary.dimensions);
    let mut marks = Vec::new();

    if let Some(flags) = all
        .iter()
        .find(|s| s.role == SeriesRole::IsAnomaly && DimensionSignature::of(&s.dimensions) == signature)
    {
        let values: HashMap<i64, Option<f64>> =
            primary.points.iter().map(|p| (p.timestamp, p.value)).collect();
        for flag in flags.points.iter().filter(|p| p.value.is_some_and(|v| v != 0.0)) {
            if let Some(Some(value)) = values.get(&flag.timestamp) {
                marks.push(MarkPoint {
                    x: flag.timestamp,
                    y: value + base,
                    color: Some(ANOMALY_COLOR),
                    symbol_size: 6,
                });
            }
        }
    }

    marks.extend(primary.highlighted.iter().map(|&(x, y)| MarkPoint {
        x,
        y: y + base,
        color: None,
        symbol_size: 12,
    }));
    marks
}

/// Parses alert time ranges.
///
/// Accepts `[{"from": t, "to": t}]`, `[[from, to]]`, or a flat list of
/// boundaries where consecutive timestamps delimit one region.
pub fn parse_time_ranges(payload: &Value) -> Result<Vec<TimeRangeBand>, MarkupError> {
    let entries = payload
        .as_array()
        .ok_or_else(|| MarkupError::Shape(payload.to_string()))?;

    if entries.iter().all(Value::is_number) {
        return Ok(entries
            .chunks(2)
            .filter_map(|pair| {
                Some(TimeRangeBand {
                    from: as_timestamp(&pair[0])?,
                    to: pair.get(1).and_then(as_timestamp),
                })
            })
            .collect());
    }

    entries
        .iter()
        .map(|entry| match entry {
            Value::Object(map) => Ok(TimeRangeBand {
                from: map
                    .get("from")
                    .and_then(as_timestamp)
                    .ok_or(MarkupError::MissingField("from"))?,
                to: map.get("to").and_then(as_timestamp),
            }),
            Value::Array(pair) => Ok(TimeRangeBand {
                from: pair
                    .first()
                    .and_then(as_timestamp)
                    .ok_or(MarkupError::MissingField("from"))?,
                to: pair.get(1).and_then(as_timestamp),
            }),
            other => Err(MarkupError::Shape(other.to_string())),
        })
        .collect()
}

/// Parses `[[value, timestamp]]` highlight pairs.
pub fn parse_highlighted_points(payload: &Value) -> Result<Vec<(i64, f64)>, MarkupError> {
    payload
        .as_array()
        .ok_or_else(|| MarkupError::Shape(payload.to_string()))?
        .iter()
        .map(|entry| {
            let pair = entry
                .as_array()
                .filter(|p| p.len() >= 2)
                .ok_or_else(|| MarkupError::Shape(entry.to_string()))?;
            let value = pair[0].as_f64().ok_or(MarkupError::MissingField("value"))?;
            let timestamp = as_timestamp(&pair[1]).ok_or(MarkupError::MissingField("timestamp"))?;
            Ok((timestamp, value))
        })
        .collect()
}

fn as_timestamp(value: &Value) -> Option<i64> {
    value.as_i64().or_else(|| value.as_f64().map(|f| f as i64))
}
