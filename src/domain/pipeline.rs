// Chart model assembly - runs every stage over an ingested result
use super::axis::TimeAxisFormatter;
use super::boundary::{self, BoundaryBand};
use super::chart::{
    utc, ChartModel, ChartState, ChartType, DrillDownOption, RenderPoint, RenderSeries,
    SeriesKind, SharedMarkup, TooltipFormatter, TooltipSort, YAxis, YAxisLabel,
};
use super::ingest::Ingested;
use super::legend;
use super::markup::{self, Threshold};
use super::precision::min_precision;
use super::series::{NormalizedPoint, NormalizedSeries};
use super::unit::ValueFormat;
use chrono::FixedOffset;

pub const PALETTE: [&str; 10] = [
    "#7EB26D", "#EAB839", "#6ED0E0", "#EF843C", "#E24D42", "#1F78C1", "#BA43A9", "#705DA0",
    "#508642", "#CCA300",
];

/// Charts shorter than this are sparklines: fewer ticks, no scaling.
const SPARKLINE_HEIGHT: u32 = 120;

const ISOLATED_SYMBOL_SIZE: u8 = 6;
const DEFAULT_SYMBOL_SIZE: u8 = 1;

/// Display preferences for one panel.
#[derive(Debug, Clone)]
pub struct PipelineOptions {
    pub chart_type: ChartType,
    /// Overrides the unit reported by the API.
    pub unit: Option<String>,
    /// Overrides the resolved precision.
    pub precision: Option<usize>,
    pub thresholds: Vec<Threshold>,
    pub height: u32,
    pub only_begin_end: bool,
    pub y_axis_need_unit: bool,
    pub colors: Vec<String>,
    /// Series names hidden from the start.
    pub hidden: Vec<String>,
    pub tooltip_sort: TooltipSort,
    pub offset: FixedOffset,
}

impl Default for PipelineOptions {
    fn default() -> Self {
        Self {
            chart_type: ChartType::Line,
            unit: None,
            precision: None,
            thresholds: Vec::new(),
            height: 300,
            only_begin_end: false,
            y_axis_need_unit: true,
            colors: Vec::new(),
            hidden: Vec::new(),
            tooltip_sort: TooltipSort::None,
            offset: utc(),
        }
    }
}

impl PipelineOptions {
    fn color(&self, index: usize) -> String {
        if self.colors.is_empty() {
            PALETTE[index % PALETTE.len()].to_string()
        } else {
            self.colors[index % self.colors.len()].clone()
        }
    }

    fn is_sparkline(&self) -> bool {
        self.height < SPARKLINE_HEIGHT
    }
}

pub fn assemble(ingested: &Ingested, options: &PipelineOptions) -> ChartModel {
    let dimension_keys: Vec<String> = ingested.dimension_keys.iter().cloned().collect();
    let drill_down = drill_down_options(ingested);
    if ingested.is_empty() {
        tracing::debug!("No datapoints in {} series", ingested.series.len());
        return ChartModel::empty(ingested.errors.clone(), dimension_keys, drill_down);
    }

    let pairs = boundary::collect_pairs(&ingested.series);
    let base = boundary::base_shift(&pairs);
    let bands: Vec<BoundaryBand> = pairs
        .iter()
        .enumerate()
        .map(|(index, pair)| boundary::synthesize(pair, index, base))
        .collect();

    let primaries: Vec<&NormalizedSeries> = ingested.primaries().collect();
    let animation = primaries.iter().any(|s| s.has_isolated_point());

    let mut all_series = Vec::with_capacity(primaries.len() + bands.len() * 2);
    let mut legend_entries = Vec::with_capacity(primaries.len());
    for (index, series) in primaries.iter().enumerate() {
        let color = series.color.clone().unwrap_or_else(|| options.color(index));
        let unit = options.unit.clone().or_else(|| series.unit.clone());
        let format = ValueFormat::from_unit(unit.as_deref());
        let values: Vec<f64> = series.numeric_values().collect();
        let resolved = min_precision(&values, &format);
        let precision = options.precision.unwrap_or(resolved);

        legend_entries.push(legend::aggregate(series, &color, &format, precision));
        all_series.push(RenderSeries {
            name: series.name.clone(),
            kind: SeriesKind::Primary,
            chart_type: options.chart_type,
            color: Some(color),
            unit,
            format,
            precision,
            data: render_points(&series.points, base, animation),
            show_symbol: animation,
            z: if bands.is_empty() { 4 } else { 6 },
            stack: None,
            line_opacity: 1.0,
            area_color: None,
            tooltip: true,
            mark_point: markup::anomaly_points(series, &ingested.series, base),
            mark_line: None,
            threshold_areas: Vec::new(),
            alert_areas: Vec::new(),
        });
    }

    for band in &bands {
        all_series.push(band_series(
            format!("lower-{}", band.stack),
            SeriesKind::LowerShadow,
            band,
            &band.lower_shadow,
            None,
        ));
        all_series.push(band_series(
            format!("upper-{}", band.stack),
            SeriesKind::UpperDelta,
            band,
            &band.upper_delta,
            Some(band.color.clone()),
        ));
    }

    legend::hide(&mut legend_entries, &options.hidden);

    let shared_markup = SharedMarkup {
        mark_line: markup::threshold_line(&options.thresholds, base),
        threshold_areas: markup::threshold_areas(&options.thresholds, base),
        alert_areas: primaries
            .iter()
            .find(|s| !s.alert_bands.is_empty())
            .map(|s| markup::alert_areas(&s.alert_bands))
            .unwrap_or_default(),
    };

    let x_axis = TimeAxisFormatter::select(
        primaries.iter().flat_map(|s| s.points.iter().map(|p| p.timestamp)),
        options.only_begin_end,
        options.offset,
    );
    let y_axis = y_axis(&primaries, &all_series, options, base);
    let tooltip = TooltipFormatter::new(&all_series, options.tooltip_sort, base, options.offset);

    let mut model = ChartModel {
        state: ChartState::Ready,
        series: Vec::new(),
        all_series,
        shared_markup,
        x_axis,
        y_axis,
        legend: legend_entries,
        tooltip,
        base_shift: base,
        animation,
        dimension_keys,
        drill_down,
        errors: ingested.errors.clone(),
        stale: false,
    };
    model.refresh_visible();
    model
}

fn render_points(points: &[NormalizedPoint], base: f64, animation: bool) -> Vec<RenderPoint> {
    points
        .iter()
        .map(|p| RenderPoint {
            x: p.timestamp,
            y: p.value.map(|v| v + base),
            symbol_size: animation.then_some(if p.is_isolated {
                ISOLATED_SYMBOL_SIZE
            } else {
                DEFAULT_SYMBOL_SIZE
            }),
        })
        .collect()
}

fn band_series(
    name: String,
    kind: SeriesKind,
    band: &BoundaryBand,
    points: &[NormalizedPoint],
    area_color: Option<String>,
) -> RenderSeries {
    RenderSeries {
        name,
        kind,
        chart_type: ChartType::Line,
        color: Some(band.color.clone()),
        unit: None,
        format: ValueFormat::None,
        precision: 0,
        data: points
            .iter()
            .map(|p| RenderPoint {
                x: p.timestamp,
                y: p.value,
                symbol_size: None,
            })
            .collect(),
        show_symbol: false,
        z: 4,
        stack: Some(band.stack.clone()),
        line_opacity: 0.0,
        area_color,
        tooltip: false,
        mark_point: Vec::new(),
        mark_line: None,
        threshold_areas: Vec::new(),
        alert_areas: Vec::new(),
    }
}

fn y_axis(
    primaries: &[&NormalizedSeries],
    rendered: &[RenderSeries],
    options: &PipelineOptions,
    base: f64,
) -> YAxis {
    let mut units = rendered
        .iter()
        .filter(|s| s.kind == SeriesKind::Primary)
        .map(|s| (&s.unit, &s.format, s.precision));
    let label = match units.next() {
        Some((unit, format, precision)) if units.all(|(other, _, _)| other == unit) => {
            YAxisLabel::Unit {
                unit: unit.clone(),
                format: format.clone(),
                precision,
                with_suffix: options.y_axis_need_unit,
            }
        }
        _ => YAxisLabel::Abbreviated,
    };

    let data_min = primaries
        .iter()
        .flat_map(|s| s.numeric_values())
        .fold(f64::INFINITY, f64::min);
    let data_max = primaries
        .iter()
        .flat_map(|s| s.numeric_values())
        .fold(f64::NEG_INFINITY, f64::max);

    let extent = markup::threshold_extent(&options.thresholds);
    let max = extent
        .max
        .map(|threshold| threshold.max(data_max) + base);
    let mut min = extent
        .min
        .map(|threshold| threshold.min(data_min) + base);

    if options.chart_type == ChartType::Bar && data_min.is_finite() {
        let lowest = min.unwrap_or(data_min + base);
        min = Some(if lowest <= 10.0 { 0.0 } else { lowest - 10.0 });
    }

    YAxis {
        label,
        min,
        max,
        scale: !options.is_sparkline() && extent.can_scale,
        split_number: if options.is_sparkline() { 2 } else { 4 },
        min_interval: 1,
        base_shift: base,
    }
}

/// Dimensions of the first metric that can be drilled into.
fn drill_down_options(ingested: &Ingested) -> Vec<DrillDownOption> {
    ingested
        .metrics
        .first()
        .map(|metric| {
            metric
                .dimensions
                .iter()
                .filter(|d| d.is_dimension.unwrap_or(true))
                .map(|d| DrillDownOption {
                    id: d.id.clone(),
                    name: d.name.clone(),
                })
                .collect()
        })
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ingest::{ingest, IngestOptions, TargetOutcome};
    use crate::domain::legend::LegendAction;
    use crate::domain::markup::ThresholdMethod;
    use crate::domain::series::QueryResult;
    use serde_json::json;

    fn outcome(payload: serde_json::Value) -> TargetOutcome {
        TargetOutcome {
            target_id: "t1".to_string(),
            target_alias: None,
            time_shift: String::new(),
            result: Ok(serde_json::from_value::<QueryResult>(payload).unwrap()),
        }
    }

    fn boundary_result() -> Ingested {
        let dims = json!({"bk_target_ip": "10.0.0.1", "bk_target_cloud_id": "0"});
        ingest(
            vec![outcome(json!({
                "series": [
                    {"target": "cpu", "alias": "_result_", "unit": "percent", "dimensions": dims,
                     "datapoints": [[0, 0], [1, 60000], [2, 120000]]},
                    {"target": "lower", "alias": "lower_bound", "dimensions": dims,
                     "datapoints": [[-5, 0], [-3, 60000], [-2, 120000]]},
                    {"target": "upper", "alias": "upper_bound", "dimensions": dims,
                     "datapoints": [[1, 0], [2, 60000], [3, 120000]]},
                    {"target": "flags", "alias": "is_anomaly", "dimensions": dims,
                     "datapoints": [[0, 0], [1, 60000], [0, 120000]]}
                ],
                "metrics": [{"metric_field": "usage", "dimensions": [
                    {"id": "bk_target_ip", "name": "IP"},
                    {"id": "bk_biz_id", "name": "Business", "is_dimension": false}
                ]}]
            }))],
            &IngestOptions::default(),
        )
    }

    fn ys(series: &RenderSeries) -> Vec<Option<f64>> {
        series.data.iter().map(|p| p.y).collect()
    }

    #[test]
    fn test_boundary_chart() {
        let model = assemble(&boundary_result(), &PipelineOptions::default());
        assert_eq!(model.state, ChartState::Ready);
        assert_eq!(model.base_shift, 5.0);
        assert_eq!(model.series.len(), 3);

        let primary = &model.series[0];
        assert_eq!(primary.kind, SeriesKind::Primary);
        assert_eq!(primary.z, 6);
        assert_eq!(ys(primary), vec![Some(5.0), Some(6.0), Some(7.0)]);
        assert_eq!(primary.mark_point.len(), 1);
        assert_eq!(primary.mark_point[0].y, 6.0);

        let lower = &model.series[1];
        assert_eq!(lower.kind, SeriesKind::LowerShadow);
        assert!(!lower.tooltip);
        assert_eq!(lower.line_opacity, 0.0);
        assert_eq!(ys(lower), vec![Some(0.0), Some(2.0), Some(3.0)]);

        let upper = &model.series[2];
        assert_eq!(upper.stack.as_deref(), Some("boundary-1"));
        assert_eq!(ys(upper), vec![Some(6.0), Some(5.0), Some(5.0)]);

        assert_eq!(model.tooltip.excluded.len(), 2);
        assert_eq!(model.y_axis.format_label(6.0), "1%");
        assert_eq!(model.legend.len(), 1);
        assert_eq!(model.legend[0].max.raw, 2.0);
    }

    #[test]
    fn test_drill_down_skips_non_dimensions() {
        let model = assemble(&boundary_result(), &PipelineOptions::default());
        assert_eq!(
            model.drill_down,
            vec![DrillDownOption {
                id: "bk_target_ip".to_string(),
                name: "IP".to_string()
            }]
        );
        assert_eq!(model.dimension_keys, vec!["bk_target_cloud_id", "bk_target_ip"]);
    }

    #[test]
    fn test_empty_result() {
        let ingested = ingest(
            vec![outcome(json!({"series": [{"target": "cpu", "datapoints": []}]}))],
            &IngestOptions::default(),
        );
        let model = assemble(&ingested, &PipelineOptions::default());
        assert!(model.is_empty());
        assert!(model.series.is_empty());
        assert!(model.x_axis.is_none());
    }

    #[test]
    fn test_out_of_range_timestamps_are_dropped() {
        let ingested = ingest(
            vec![outcome(json!({
                "series": [{"target": "a",
                    "datapoints": [[1, -9.0e18], [2, 0], [3, 9.0e18], [4, 60000]]}]
            }))],
            &IngestOptions::default(),
        );
        let model = assemble(&ingested, &PipelineOptions::default());
        assert_eq!(model.state, ChartState::Ready);
        assert_eq!(ys(&model.series[0]), vec![Some(2.0), Some(4.0)]);
        assert!(model.x_axis.is_some());
    }

    fn two_series() -> Ingested {
        ingest(
            vec![outcome(json!({
                "series": [
                    {"target": "a", "dimensions": {"host": "a"}, "unit": "bytes",
                     "datapoints": [[1, 0], [null, 60000], [3, 120000]]},
                    {"target": "b", "dimensions": {"host": "b"}, "unit": "ms",
                     "datapoints": [[1500, 0], [2500, 60000], [3500, 120000]]}
                ],
                "metrics": []
            }))],
            &IngestOptions::default(),
        )
    }

    #[test]
    fn test_mixed_units_use_abbreviated_labels() {
        let model = assemble(&two_series(), &PipelineOptions::default());
        assert_eq!(model.y_axis.label, YAxisLabel::Abbreviated);
        assert_eq!(model.y_axis.format_label(2500.0), "2.5K");
        assert_eq!(model.series[0].z, 4);
        assert_eq!(model.series[0].color.as_deref(), Some(PALETTE[0]));
        assert_eq!(model.series[1].color.as_deref(), Some(PALETTE[1]));
        assert_eq!(ys(&model.series[0])[1], None);
    }

    #[test]
    fn test_hidden_series_and_legend_toggle() {
        let options = PipelineOptions {
            hidden: vec!["b".to_string()],
            ..PipelineOptions::default()
        };
        let mut model = assemble(&two_series(), &options);
        assert_eq!(model.series.len(), 1);
        assert_eq!(model.all_series.len(), 2);
        assert!(!model.legend[1].show);

        assert!(model.apply_legend_action(LegendAction::ShiftClick, "b"));
        assert_eq!(model.series.len(), 2);
    }

    #[test]
    fn test_thresholds_ride_on_first_series() {
        let options = PipelineOptions {
            thresholds: vec![Threshold {
                name: Some("critical".to_string()),
                y_axis: 10.0,
                method: Some(ThresholdMethod::Gte),
                condition: None,
            }],
            ..PipelineOptions::default()
        };
        let model = assemble(&two_series(), &options);
        assert!(model.series[0].mark_line.is_some());
        assert_eq!(model.series[0].threshold_areas.len(), 1);
        assert!(model.series[1].mark_line.is_none());
        assert!(model.y_axis.scale);
        assert_eq!(model.y_axis.max, Some(3500.0));
        assert_eq!(model.y_axis.min, Some(1.0));
    }

    #[test]
    fn test_threshold_headroom_and_sparkline() {
        let options = PipelineOptions {
            thresholds: vec![Threshold {
                name: None,
                y_axis: 4000.0,
                method: None,
                condition: None,
            }],
            height: 80,
            ..PipelineOptions::default()
        };
        let model = assemble(&two_series(), &options);
        assert_eq!(model.y_axis.max, Some(4400.0));
        assert!(!model.y_axis.scale);
        assert_eq!(model.y_axis.split_number, 2);
    }

    #[test]
    fn test_bar_chart_starts_from_zero() {
        let options = PipelineOptions {
            chart_type: ChartType::Bar,
            ..PipelineOptions::default()
        };
        let model = assemble(&two_series(), &options);
        assert_eq!(model.y_axis.min, Some(0.0));
        assert_eq!(model.series[0].chart_type, ChartType::Bar);
    }

    #[test]
    fn test_isolated_points_enable_symbols() {
        let ingested = ingest(
            vec![outcome(json!({
                "series": [{"target": "a",
                    "datapoints": [[1, 0], [null, 60000], [3, 120000], [null, 180000], [4, 240000]]}]
            }))],
            &IngestOptions::default(),
        );
        let model = assemble(&ingested, &PipelineOptions::default());
        assert!(model.animation);
        let sizes: Vec<Option<u8>> = model.series[0].data.iter().map(|p| p.symbol_size).collect();
        assert_eq!(sizes[2], Some(ISOLATED_SYMBOL_SIZE));
        assert_eq!(sizes[1], Some(DEFAULT_SYMBOL_SIZE));
    }

    #[test]
    fn test_precision_override() {
        let options = PipelineOptions {
            precision: Some(3),
            unit: Some("percent".to_string()),
            ..PipelineOptions::default()
        };
        let model = assemble(&two_series(), &options);
        assert_eq!(model.series[0].precision, 3);
        assert_eq!(model.legend[0].min.text, "1.000%");
        assert!(matches!(model.y_axis.label, YAxisLabel::Unit { .. }));
    }
}
