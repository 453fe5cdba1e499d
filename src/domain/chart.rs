// Chart model - the declarative options handed to the renderer
use super::axis::TimeAxisFormatter;
use super::legend::{self, LegendAction, LegendEntry};
use super::markup::{AlertArea, MarkLine, MarkPoint, ThresholdArea};
use super::unit::{abbreviate, to_fixed, trim_trailing_zeros, ValueFormat};
use chrono::{DateTime, FixedOffset, Offset, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ChartType {
    #[default]
    Line,
    Bar,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SeriesKind {
    Primary,
    /// Invisible base of a boundary band.
    LowerShadow,
    /// Visible band area stacked on the shadow.
    UpperDelta,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct RenderPoint {
    pub x: i64,
    pub y: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub symbol_size: Option<u8>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RenderSeries {
    pub name: String,
    pub kind: SeriesKind,
    #[serde(rename = "type")]
    pub chart_type: ChartType,
    pub color: Option<String>,
    pub unit: Option<String>,
    #[serde(skip)]
    pub format: ValueFormat,
    pub precision: usize,
    pub data: Vec<RenderPoint>,
    pub show_symbol: bool,
    pub z: u8,
    pub stack: Option<String>,
    pub line_opacity: f64,
    pub area_color: Option<String>,
    /// Whether hover tooltips list this series.
    pub tooltip: bool,
    pub mark_point: Vec<MarkPoint>,
    pub mark_line: Option<MarkLine>,
    pub threshold_areas: Vec<ThresholdArea>,
    pub alert_areas: Vec<AlertArea>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum YAxisLabel {
    /// Every series shares `unit`.
    Unit {
        unit: Option<String>,
        #[serde(skip)]
        format: ValueFormat,
        precision: usize,
        with_suffix: bool,
    },
    /// Mixed units: compact K/M/G numbers.
    Abbreviated,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct YAxis {
    pub label: YAxisLabel,
    pub min: Option<f64>,
    pub max: Option<f64>,
    pub scale: bool,
    pub split_number: u8,
    pub min_interval: u8,
    /// Offset added to every plotted value; labels subtract it again.
    pub base_shift: f64,
}

impl Default for YAxis {
    fn default() -> Self {
        Self {
            label: YAxisLabel::Abbreviated,
            min: None,
            max: None,
            scale: false,
            split_number: 4,
            min_interval: 1,
            base_shift: 0.0,
        }
    }
}

/// Decimals kept on unit-less axis labels before trailing zeros are trimmed.
const UNITLESS_LABEL_DIGITS: usize = 6;

impl YAxis {
    pub fn format_label(&self, value: f64) -> String {
        let value = value - self.base_shift;
        match &self.label {
            YAxisLabel::Unit {
                format, precision, ..
            } if format.is_none() => {
                trim_trailing_zeros(&to_fixed(value, (*precision).max(UNITLESS_LABEL_DIGITS)))
            }
            YAxisLabel::Unit {
                format,
                precision,
                with_suffix,
                ..
            } => {
                let formatted = format.format(value, *precision);
                if *with_suffix {
                    formatted.to_string()
                } else {
                    formatted.text
                }
            }
            YAxisLabel::Abbreviated => abbreviate(value),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TooltipSort {
    #[default]
    None,
    Asc,
    Desc,
}

/// A point under the cursor as reported by the renderer.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct HoverPoint {
    pub series_name: String,
    pub timestamp: i64,
    pub value: Option<f64>,
    #[serde(default)]
    pub color: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
struct TooltipSeries {
    name: String,
    format: ValueFormat,
    precision: usize,
    visible: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TooltipFormatter {
    pub sort: TooltipSort,
    pub base_shift: f64,
    /// Series never listed in tooltips.
    pub excluded: Vec<String>,
    #[serde(skip)]
    series: Vec<TooltipSeries>,
    #[serde(skip)]
    offset: FixedOffset,
}

impl TooltipFormatter {
    pub fn new(series: &[RenderSeries], sort: TooltipSort, base_shift: f64, offset: FixedOffset) -> Self {
        Self {
            sort,
            base_shift,
            excluded: series
                .iter()
                .filter(|s| !s.tooltip)
                .map(|s| s.name.clone())
                .collect(),
            series: series
                .iter()
                .map(|s| TooltipSeries {
                    name: s.name.clone(),
                    format: s.format.clone(),
                    precision: s.precision,
                    visible: s.tooltip,
                })
                .collect(),
            offset,
        }
    }

    /// Renders the hover list as HTML, skipping boundary plumbing and gaps.
    pub fn format(&self, points: &[HoverPoint]) -> String {
        let mut rows: Vec<(f64, String)> = points
            .iter()
            .filter_map(|point| {
                let series = self.series.iter().find(|s| s.name == point.series_name)?;
                if !series.visible {
                    return None;
                }
                let value = point.value? - self.base_shift;
                let text = series.format.format(value, series.precision).to_string();
                let color = point.color.as_deref().unwrap_or("#000");
                Some((
                    value,
                    format!(
                        "<li class=\"tooltip-item\"><span class=\"item-marker\" style=\"background-color:{}\"></span><span class=\"item-name\">{}</span><span class=\"item-value\">{}</span></li>",
                        escape_html(color),
                        escape_html(&point.series_name),
                        escape_html(&text)
                    ),
                ))
            })
            .collect();
        if rows.is_empty() {
            return String::new();
        }

        match self.sort {
            TooltipSort::None => {}
            TooltipSort::Asc => rows.sort_by(|a, b| a.0.total_cmp(&b.0)),
            TooltipSort::Desc => rows.sort_by(|a, b| b.0.total_cmp(&a.0)),
        }

        let time = points
            .first()
            .and_then(|p| DateTime::from_timestamp_millis(p.timestamp))
            .map(|t| t.with_timezone(&self.offset).format("%Y-%m-%d %H:%M:%S").to_string())
            .unwrap_or_default();
        let items: String = rows.into_iter().map(|(_, row)| row).collect();
        format!(
            "<div class=\"chart-tooltip\"><p class=\"tooltip-time\">{}</p><ul>{}</ul></div>",
            time, items
        )
    }
}

impl Default for TooltipFormatter {
    fn default() -> Self {
        Self::new(&[], TooltipSort::None, 0.0, utc())
    }
}

fn escape_html(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#39;"),
            _ => escaped.push(c),
        }
    }
    escaped
}

pub fn utc() -> FixedOffset {
    Utc.fix()
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DrillDownOption {
    pub id: String,
    pub name: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ChartState {
    Ready,
    /// Every target answered but no series has data.
    Empty,
}

/// Markup that only one visible series may carry, to avoid doubled shading.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SharedMarkup {
    pub mark_line: Option<MarkLine>,
    pub threshold_areas: Vec<ThresholdArea>,
    pub alert_areas: Vec<AlertArea>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ChartModel {
    pub state: ChartState,
    /// Series sent to the renderer: hidden legend entries are left out.
    pub series: Vec<RenderSeries>,
    #[serde(skip)]
    pub all_series: Vec<RenderSeries>,
    #[serde(skip)]
    pub shared_markup: SharedMarkup,
    pub x_axis: Option<TimeAxisFormatter>,
    pub y_axis: YAxis,
    pub legend: Vec<LegendEntry>,
    pub tooltip: TooltipFormatter,
    pub base_shift: f64,
    pub animation: bool,
    pub dimension_keys: Vec<String>,
    pub drill_down: Vec<DrillDownOption>,
    pub errors: Vec<String>,
    /// Served from the last good refresh because the latest one failed.
    pub stale: bool,
}

impl ChartModel {
    pub fn empty(errors: Vec<String>, dimension_keys: Vec<String>, drill_down: Vec<DrillDownOption>) -> Self {
        Self {
            state: ChartState::Empty,
            series: Vec::new(),
            all_series: Vec::new(),
            shared_markup: SharedMarkup::default(),
            x_axis: None,
            y_axis: YAxis::default(),
            legend: Vec::new(),
            tooltip: TooltipFormatter::default(),
            base_shift: 0.0,
            animation: false,
            dimension_keys,
            drill_down,
            errors,
            stale: false,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.state == ChartState::Empty
    }

    pub fn apply_legend_action(&mut self, action: LegendAction, name: &str) -> bool {
        let changed = legend::apply_action(&mut self.legend, action, name);
        if changed {
            self.refresh_visible();
        }
        changed
    }

    /// Rebuilds the visible series list from the full set and the legend flags.
    pub fn refresh_visible(&mut self) {
        let hidden: Vec<&str> = self
            .legend
            .iter()
            .filter(|entry| !entry.show)
            .map(|entry| entry.name.as_str())
            .collect();

        let mut visible: Vec<RenderSeries> = self
            .all_series
            .iter()
            .filter(|s| s.kind != SeriesKind::Primary || !hidden.contains(&s.name.as_str()))
            .cloned()
            .collect();
        distribute_markup(&mut visible, &self.shared_markup);
        self.series = visible;
    }
}

/// Moves the shared markup onto the first primary series and clears it elsewhere.
pub fn distribute_markup(series: &mut [RenderSeries], markup: &SharedMarkup) {
    let mut carrier_found = false;
    for s in series.iter_mut().filter(|s| s.kind == SeriesKind::Primary) {
        if carrier_found {
            s.mark_line = None;
            s.threshold_areas.clear();
            s.alert_areas.clear();
        } else {
            s.mark_line = markup.mark_line.clone();
            s.threshold_areas = markup.threshold_areas.clone();
            s.alert_areas = markup.alert_areas.clone();
            carrier_found = true;
        }
    }
}
