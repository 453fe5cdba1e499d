// Series ingestion - normalizes settled API results into named point lists
use super::error::{FetchError, PointError};
use super::markup::{parse_highlighted_points, parse_time_ranges};
use super::series::{
    MetricMetadata, NormalizedPoint, NormalizedSeries, QueryResult, RawSeries, SeriesRole,
    RESULT_ALIAS,
};
use chrono::DateTime;
use serde_json::Value;
use std::collections::BTreeSet;

/// Settled result of one (target, time shift) query.
#[derive(Debug, Clone)]
pub struct TargetOutcome {
    pub target_id: String,
    pub target_alias: Option<String>,
    pub time_shift: String,
    pub result: Result<QueryResult, FetchError>,
}

#[derive(Debug, Clone, Default)]
pub struct IngestOptions {
    /// Comparison offsets besides the current window. Names get a shift prefix when set.
    pub time_shifts: Vec<String>,
    /// Keep only the first `_result_` series.
    pub only_one_result: bool,
    /// Keep at most this many series.
    pub near_series_num: Option<usize>,
}

#[derive(Debug, Clone, Default)]
pub struct Ingested {
    pub series: Vec<NormalizedSeries>,
    pub metrics: Vec<MetricMetadata>,
    pub dimension_keys: BTreeSet<String>,
    pub errors: Vec<String>,
    pub succeeded_targets: usize,
}

impl Ingested {
    /// No series carries a single datapoint. Distinct from "still loading".
    pub fn is_empty(&self) -> bool {
        self.series.iter().all(|s| s.points.is_empty())
    }

    pub fn primaries(&self) -> impl Iterator<Item = &NormalizedSeries> {
        self.series.iter().filter(|s| s.role == SeriesRole::Primary)
    }
}

pub fn ingest(outcomes: Vec<TargetOutcome>, options: &IngestOptions) -> Ingested {
    let mut ingested = Ingested::default();
    let mut named: Vec<(String, RawSeries)> = Vec::new();

    for outcome in outcomes {
        match outcome.result {
            Ok(result) => {
                ingested.succeeded_targets += 1;
                ingested.metrics.extend(result.metrics);
                for raw in result.series {
                    let name = series_name(outcome.target_alias.as_deref(), &raw);
                    let name = if options.time_shifts.is_empty() {
                        name
                    } else {
                        format!("{}-{}", time_shift_label(&outcome.time_shift), name)
                    };
                    named.push((name, raw));
                }
            }
            Err(e) => {
                tracing::error!("Fetch failed for target {}: {}", outcome.target_id, e);
                ingested.errors.push(e.message().to_string());
            }
        }
    }

    for (_, raw) in &named {
        ingested.dimension_keys.extend(raw.dimensions.keys().cloned());
    }

    if options.only_one_result {
        let mut seen_result = false;
        named.retain(|(_, raw)| {
            if raw.alias.as_deref() != Some(RESULT_ALIAS) {
                return true;
            }
            let keep = !seen_result;
            seen_result = true;
            keep
        });
    }

    if let Some(limit) = options.near_series_num {
        named.truncate(limit);
    }

    ingested.series = named
        .into_iter()
        .map(|(name, raw)| normalize_series(name, raw))
        .collect();

    tracing::debug!(
        "Ingested {} series from {} targets ({} failed)",
        ingested.series.len(),
        ingested.succeeded_targets,
        ingested.errors.len()
    );

    ingested
}

pub fn normalize_series(name: String, raw: RawSeries) -> NormalizedSeries {
    let mut points = Vec::with_capacity(raw.datapoints.len());
    for datapoint in &raw.datapoints {
        match parse_datapoint(datapoint) {
            Ok(point) => points.push(point),
            Err(e) => tracing::warn!("Dropping datapoint of series {}: {}", name, e),
        }
    }
    points.sort_by_key(|p| p.timestamp);
    mark_isolated(&mut points);

    let alert_bands = match raw.mark_time_range.as_ref().map(parse_time_ranges) {
        Some(Ok(bands)) => bands,
        Some(Err(e)) => {
            tracing::warn!("Ignoring alert time ranges of series {}: {}", name, e);
            Vec::new()
        }
        None => Vec::new(),
    };
    let highlighted = match raw.mark_points.as_ref().map(parse_highlighted_points) {
        Some(Ok(marks)) => marks,
        Some(Err(e)) => {
            tracing::warn!("Ignoring mark points of series {}: {}", name, e);
            Vec::new()
        }
        None => Vec::new(),
    };

    NormalizedSeries {
        name,
        role: raw.role(),
        alias: raw.alias,
        unit: raw.unit,
        metric_field: raw.metric_field,
        dimensions: raw.dimensions,
        color: raw.color,
        points,
        alert_bands,
        highlighted,
    }
}

/// Transposes an API `[value, timestamp]` pair into a chart point.
///
/// A bad value becomes a gap; only a missing timestamp drops the point,
/// since a gap needs a position on the axis.
pub fn parse_datapoint(datapoint: &Value) -> Result<NormalizedPoint, PointError> {
    let pair = datapoint
        .as_array()
        .filter(|pair| pair.len() >= 2)
        .ok_or_else(|| PointError::Shape(datapoint.to_string()))?;

    let timestamp = parse_timestamp(&pair[1])?;
    let value = match decode_value(&pair[0]) {
        Ok(value) => value,
        Err(e) => {
            tracing::warn!("Treating point at {} as a gap: {}", timestamp, e);
            None
        }
    };

    Ok(NormalizedPoint::new(timestamp, value))
}

fn parse_timestamp(value: &Value) -> Result<i64, PointError> {
    let timestamp = match value {
        Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f as i64)),
        Value::String(s) => s.trim().parse::<i64>().ok(),
        _ => None,
    };
    timestamp
        .filter(|ts| DateTime::from_timestamp_millis(*ts).is_some())
        .ok_or_else(|| PointError::Timestamp(value.to_string()))
}

/// Decodes a datapoint value, unwrapping JSON-encoded `{"anomaly_score": ..}` payloads.
pub fn decode_value(value: &Value) -> Result<Option<f64>, PointError> {
    match value {
        Value::Null => Ok(None),
        Value::Number(n) => n
            .as_f64()
            .map(Some)
            .ok_or_else(|| PointError::Value(value.to_string())),
        Value::String(s) => decode_encoded(s),
        Value::Object(map) => match map.get("anomaly_score") {
            Some(score) => decode_value(score),
            None => Err(PointError::Value(value.to_string())),
        },
        _ => Err(PointError::Value(value.to_string())),
    }
}

fn decode_encoded(encoded: &str) -> Result<Option<f64>, PointError> {
    let decoded = match serde_json::from_str::<Value>(encoded) {
        Ok(Value::Null) => return Ok(None),
        Ok(Value::Number(n)) => n.as_f64(),
        Ok(Value::Object(map)) => map.get("anomaly_score").and_then(Value::as_f64),
        _ => None,
    };
    // Fall back to the raw text when the payload carries no usable scalar.
    decoded
        .or_else(|| encoded.trim().parse::<f64>().ok())
        .filter(|v| v.is_finite())
        .map(Some)
        .ok_or_else(|| PointError::Value(encoded.to_string()))
}

pub fn mark_isolated(points: &mut [NormalizedPoint]) {
    for i in 0..points.len() {
        if points[i].value.is_none() {
            continue;
        }
        let prev = i.checked_sub(1).map(|j| points[j].value);
        let next = points.get(i + 1).map(|p| p.value);
        points[i].is_isolated = matches!((prev, next), (None, None) | (Some(None), Some(None)));
    }
}

/// Legend name of a series: target alias, dimension values or time offset label.
pub fn series_name(target_alias: Option<&str>, raw: &RawSeries) -> String {
    let joined = raw
        .dimensions
        .values()
        .map(String::as_str)
        .collect::<Vec<_>>()
        .join("|");

    let name = match target_alias.filter(|a| !a.is_empty()) {
        None => match raw.time_offset.as_deref() {
            Some(offset) if !offset.is_empty() => time_offset_label(offset),
            _ => joined,
        },
        Some(alias) if joined.is_empty() => alias.to_string(),
        Some(alias) => format!("{}-{}", alias, joined),
    };

    if name.is_empty() {
        raw.target.clone()
    } else {
        name
    }
}

/// Converts "current", "1d", "2w", "3M" style offsets to a readable label.
pub fn time_offset_label(offset: &str) -> String {
    let offset = offset.trim();
    if offset.is_empty() || offset == "current" {
        return "current".to_string();
    }
    let digits_end = offset
        .find(|c: char| !c.is_ascii_digit() && c != '-')
        .unwrap_or(offset.len());
    let (amount, unit) = offset.split_at(digits_end);
    let amount = amount.trim_start_matches('-');
    let unit = match unit {
        "h" => "h",
        "d" => "d",
        "w" => "w",
        "M" => "M",
        _ => return offset.to_string(),
    };
    if amount.is_empty() {
        return offset.to_string();
    }
    format!("{}{} ago", amount, unit)
}

fn time_shift_label(time_shift: &str) -> String {
    time_offset_label(time_shift)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::series::Dimensions;
    use serde_json::json;

    fn raw(alias: Option<&str>, dims: &[(&str, &str)], datapoints: Value) -> RawSeries {
        RawSeries {
            target: "target".to_string(),
            alias: alias.map(str::to_string),
            dimensions: dims
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect::<Dimensions>(),
            datapoints: serde_json::from_value(datapoints).unwrap(),
            ..Default::default()
        }
    }

    fn outcome(series: Vec<RawSeries>) -> TargetOutcome {
        TargetOutcome {
            target_id: "t1".to_string(),
            target_alias: None,
            time_shift: String::new(),
            result: Ok(QueryResult {
                series,
                metrics: Vec::new(),
            }),
        }
    }

    #[test]
    fn test_transposes_and_keeps_gaps() {
        let series = raw(None, &[("host", "a")], json!([[1.5, 1000], [null, 2000], [3, 3000]]));
        let ingested = ingest(vec![outcome(vec![series])], &IngestOptions::default());

        let points = &ingested.series[0].points;
        assert_eq!(points.len(), 3);
        assert_eq!(points[0].timestamp, 1000);
        assert_eq!(points[0].value, Some(1.5));
        assert_eq!(points[1].timestamp, 2000);
        assert_eq!(points[1].value, None);
        assert_eq!(points[2].value, Some(3.0));
    }

    #[test]
    fn test_decodes_anomaly_score_payloads() {
        let series = raw(
            Some("_result_"),
            &[],
            json!([["{\"anomaly_score\": 0.75}", 1000], ["not json", 2000], ["42", 3000]]),
        );
        let ingested = ingest(vec![outcome(vec![series])], &IngestOptions::default());

        let values: Vec<_> = ingested.series[0].points.iter().map(|p| p.value).collect();
        assert_eq!(values, vec![Some(0.75), None, Some(42.0)]);
    }

    #[test]
    fn test_malformed_points() {
        assert!(parse_datapoint(&json!([1.0])).is_err());
        assert!(parse_datapoint(&json!([1.0, "soon"])).is_err());
        assert!(parse_datapoint(&json!([1.0, 9.0e18])).is_err());
        assert!(parse_datapoint(&json!([1.0, i64::MIN])).is_err());
        let point = parse_datapoint(&json!([true, 5000])).unwrap();
        assert_eq!(point.value, None);
        assert_eq!(decode_value(&json!({"other": 1})), Err(PointError::Value("{\"other\":1}".to_string())));
    }

    #[test]
    fn test_isolated_points() {
        let series = raw(
            None,
            &[],
            json!([[1, 1000], [null, 2000], [2, 3000], [null, 4000], [3, 5000], [4, 6000]]),
        );
        let normalized = normalize_series("s".to_string(), series);
        let isolated: Vec<_> = normalized.points.iter().map(|p| p.is_isolated).collect();
        assert_eq!(isolated, vec![false, false, true, false, false, false]);

        let single = normalize_series("s".to_string(), raw(None, &[], json!([[7, 1000]])));
        assert!(single.points[0].is_isolated);
    }

    #[test]
    fn test_series_name() {
        let series = raw(None, &[("ip", "10.0.0.1"), ("zone", "a")], json!([]));
        assert_eq!(series_name(None, &series), "10.0.0.1|a");
        assert_eq!(series_name(Some("cpu"), &series), "cpu-10.0.0.1|a");

        let bare = raw(None, &[], json!([]));
        assert_eq!(series_name(Some("cpu"), &bare), "cpu");
        assert_eq!(series_name(None, &bare), "target");

        let mut shifted = raw(None, &[], json!([]));
        shifted.time_offset = Some("1w".to_string());
        assert_eq!(series_name(None, &shifted), "1w ago");
    }

    #[test]
    fn test_time_shift_prefix_and_errors() {
        let current = outcome(vec![raw(None, &[("host", "a")], json!([[1, 1000]]))]);
        let mut day_ago = outcome(vec![raw(None, &[("host", "a")], json!([[2, 1000]]))]);
        day_ago.time_shift = "1d".to_string();
        let failed = TargetOutcome {
            target_id: "t2".to_string(),
            target_alias: None,
            time_shift: String::new(),
            result: Err(FetchError::Upstream {
                target: "t2".to_string(),
                message: "timeout".to_string(),
            }),
        };

        let options = IngestOptions {
            time_shifts: vec!["1d".to_string()],
            ..Default::default()
        };
        let ingested = ingest(vec![current, day_ago, failed], &options);

        let names: Vec<_> = ingested.series.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, vec!["current-a", "1d ago-a"]);
        assert_eq!(ingested.errors, vec!["timeout".to_string()]);
        assert_eq!(ingested.succeeded_targets, 2);
        assert!(ingested.dimension_keys.contains("host"));
    }

    #[test]
    fn test_only_one_result_and_limit() {
        let series = vec![
            raw(Some("_result_"), &[("h", "a")], json!([[1, 1]])),
            raw(Some("lower_bound"), &[("h", "a")], json!([[0, 1]])),
            raw(Some("_result_"), &[("h", "b")], json!([[1, 1]])),
        ];
        let options = IngestOptions {
            only_one_result: true,
            ..Default::default()
        };
        let ingested = ingest(vec![outcome(series.clone())], &options);
        assert_eq!(ingested.series.len(), 2);
        assert_eq!(ingested.primaries().count(), 1);

        let options = IngestOptions {
            near_series_num: Some(1),
            ..Default::default()
        };
        assert_eq!(ingest(vec![outcome(series)], &options).series.len(), 1);
    }

    #[test]
    fn test_empty_state() {
        let ingested = ingest(
            vec![outcome(vec![raw(None, &[], json!([]))])],
            &IngestOptions::default(),
        );
        assert!(ingested.is_empty());
        assert!(ingest(Vec::new(), &IngestOptions::default()).is_empty());
    }
}
