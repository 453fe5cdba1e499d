// Legend aggregates and legend interaction
use super::series::{Dimensions, NormalizedSeries};
use super::unit::ValueFormat;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AggregateValue {
    pub raw: f64,
    pub text: String,
}

impl AggregateValue {
    fn empty() -> Self {
        Self {
            raw: 0.0,
            text: String::new(),
        }
    }

    fn formatted(raw: f64, format: &ValueFormat, precision: usize) -> Self {
        Self {
            raw,
            text: format.format(raw, precision).to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LegendEntry {
    pub name: String,
    pub color: String,
    pub min: AggregateValue,
    pub max: AggregateValue,
    pub avg: AggregateValue,
    pub total: AggregateValue,
    pub show: bool,
    pub metric_field: Option<String>,
    pub dimensions: Dimensions,
}

/// Legend interactions, handled exhaustively instead of by string id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum LegendAction {
    /// Show only this series, or everything again if it already is the only one.
    Click,
    /// Toggle this series alone.
    ShiftClick,
}

/// Digits used for legend aggregates: unit-formatted values never drop below two.
pub fn legend_precision(format: &ValueFormat, precision: usize) -> usize {
    if !format.is_none() && precision < 1 {
        2
    } else {
        precision
    }
}

pub fn aggregate(
    series: &NormalizedSeries,
    color: &str,
    format: &ValueFormat,
    precision: usize,
) -> LegendEntry {
    let mut entry = LegendEntry {
        name: series.name.clone(),
        color: color.to_string(),
        min: AggregateValue::empty(),
        max: AggregateValue::empty(),
        avg: AggregateValue::empty(),
        total: AggregateValue::empty(),
        show: true,
        metric_field: series.metric_field.clone(),
        dimensions: series.dimensions.clone(),
    };

    let mut count = 0usize;
    let mut min = f64::INFINITY;
    let mut max = f64::NEG_INFINITY;
    let mut total = 0.0;
    for value in series.numeric_values() {
        count += 1;
        min = min.min(value);
        max = max.max(value);
        total += value;
    }
    if count == 0 {
        return entry;
    }

    // Rounding must not push the mean outside [min, max].
    let avg = round2(total / count as f64).clamp(min, max);
    let total = round2(total);
    let digits = legend_precision(format, precision);
    entry.min = AggregateValue::formatted(min, format, digits);
    entry.max = AggregateValue::formatted(max, format, digits);
    entry.avg = AggregateValue::formatted(avg, format, digits);
    entry.total = AggregateValue::formatted(total, format, digits);
    entry
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Applies a legend action. Returns whether visibility changed.
pub fn apply_action(entries: &mut [LegendEntry], action: LegendAction, name: &str) -> bool {
    if entries.len() < 2 || !entries.iter().any(|e| e.name == name) {
        return false;
    }
    let before: Vec<bool> = entries.iter().map(|e| e.show).collect();

    match action {
        LegendAction::ShiftClick => {
            for entry in entries.iter_mut().filter(|e| e.name == name) {
                entry.show = !entry.show;
            }
        }
        LegendAction::Click => {
            let other_shown = entries.iter().any(|e| e.name != name && e.show);
            for entry in entries.iter_mut() {
                entry.show = entry.name == name || !other_shown;
            }
        }
    }

    entries.iter().map(|e| e.show).ne(before)
}

pub fn hide(entries: &mut [LegendEntry], hidden: &[String]) {
    for entry in entries.iter_mut() {
        if hidden.iter().any(|name| name == &entry.name) {
            entry.show = false;
        }
    }
}
