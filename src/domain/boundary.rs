// Boundary bands - confidence intervals rendered as stacked series
use super::series::{Dimensions, NormalizedPoint, NormalizedSeries, SeriesRole};

pub const BAND_COLOR: &str = "#e6e6e6";

/// Identity of the monitored target a series belongs to.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DimensionSignature {
    pub target_ip: Option<String>,
    pub cloud_id: Option<String>,
}

impl DimensionSignature {
    pub fn of(dimensions: &Dimensions) -> Self {
        Self {
            target_ip: dimensions.get("bk_target_ip").cloned(),
            cloud_id: dimensions.get("bk_target_cloud_id").cloned(),
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct BoundaryPair<'a> {
    pub lower: &'a NormalizedSeries,
    pub upper: &'a NormalizedSeries,
}

/// A synthesized band: an invisible lower shadow with the visible delta stacked on top.
#[derive(Debug, Clone, PartialEq)]
pub struct BoundaryBand {
    pub stack: String,
    pub color: String,
    pub lower_shadow: Vec<NormalizedPoint>,
    pub upper_delta: Vec<NormalizedPoint>,
}

/// Finds the lower/upper bound series sharing the signature of `primary`.
pub fn find_pair<'a>(
    primary: &NormalizedSeries,
    all: &'a [NormalizedSeries],
) -> Option<BoundaryPair<'a>> {
    let signature = DimensionSignature::of(&primary.dimensions);
    let matching = |role: SeriesRole| {
        all.iter()
            .find(|s| s.role == role && DimensionSignature::of(&s.dimensions) == signature)
    };
    Some(BoundaryPair {
        lower: matching(SeriesRole::LowerBound)?,
        upper: matching(SeriesRole::UpperBound)?,
    })
}

/// One pair per distinct signature among the primary series.
pub fn collect_pairs(all: &[NormalizedSeries]) -> Vec<BoundaryPair<'_>> {
    let mut seen: Vec<DimensionSignature> = Vec::new();
    let mut pairs = Vec::new();
    for primary in all.iter().filter(|s| s.role == SeriesRole::Primary) {
        let signature = DimensionSignature::of(&primary.dimensions);
        if seen.contains(&signature) {
            continue;
        }
        seen.push(signature);
        match find_pair(primary, all) {
            Some(pair) => pairs.push(pair),
            None => tracing::debug!("No boundary pair for series {}", primary.name),
        }
    }
    pairs
}

/// Offset that lifts the lowest lower-bound value of the chart to zero or above.
///
/// `max(0, -floor(min lower))` across every pair; shared by all series of the chart.
pub fn base_shift(pairs: &[BoundaryPair<'_>]) -> f64 {
    let lowest = pairs
        .iter()
        .flat_map(|pair| pair.lower.numeric_values())
        .fold(f64::INFINITY, f64::min);
    if lowest.is_finite() {
        (-lowest.floor()).max(0.0)
    } else {
        0.0
    }
}

pub fn synthesize(pair: &BoundaryPair<'_>, index: usize, base: f64) -> BoundaryBand {
    let lower_shadow = pair
        .lower
        .points
        .iter()
        .map(|p| NormalizedPoint::new(p.timestamp, p.value.map(|v| v + base)))
        .collect();

    // Points are aligned by position, the way the API returns both bounds.
    let upper_delta = pair
        .upper
        .points
        .iter()
        .enumerate()
        .map(|(i, p)| {
            let lower = pair.lower.points.get(i).and_then(|l| l.value);
            let delta = match (p.value, lower) {
                (Some(upper), Some(lower)) => Some((upper - lower).max(0.0)),
                _ => None,
            };
            NormalizedPoint::new(p.timestamp, delta)
        })
        .collect();

    BoundaryBand {
        stack: format!("boundary-{}", index + 1),
        color: BAND_COLOR.to_string(),
        lower_shadow,
        upper_delta,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn series(role: SeriesRole, ip: &str, values: &[Option<f64>]) -> NormalizedSeries {
        let mut dimensions = Dimensions::new();
        dimensions.insert("bk_target_ip".to_string(), ip.to_string());
        dimensions.insert("bk_target_cloud_id".to_string(), "0".to_string());
        NormalizedSeries {
            name: format!("{:?}-{}", role, ip),
            alias: None,
            role,
            unit: None,
            metric_field: None,
            dimensions,
            color: None,
            points: values
                .iter()
                .enumerate()
                .map(|(i, v)| NormalizedPoint::new(i as i64 * 60_000, *v))
                .collect(),
            alert_bands: Vec::new(),
            highlighted: Vec::new(),
        }
    }

    fn values(points: &[NormalizedPoint]) -> Vec<Option<f64>> {
        points.iter().map(|p| p.value).collect()
    }

    #[test]
    fn test_band_from_negative_lower_bound() {
        let all = vec![
            series(SeriesRole::Primary, "10.0.0.1", &[Some(0.0), Some(1.0), Some(2.0)]),
            series(SeriesRole::LowerBound, "10.0.0.1", &[Some(-5.0), Some(-3.0), Some(-2.0)]),
            series(SeriesRole::UpperBound, "10.0.0.1", &[Some(1.0), Some(2.0), Some(3.0)]),
        ];
        let pairs = collect_pairs(&all);
        assert_eq!(pairs.len(), 1);

        let base = base_shift(&pairs);
        assert_eq!(base, 5.0);

        let band = synthesize(&pairs[0], 0, base);
        assert_eq!(values(&band.lower_shadow), vec![Some(0.0), Some(2.0), Some(3.0)]);
        assert_eq!(values(&band.upper_delta), vec![Some(6.0), Some(5.0), Some(5.0)]);
        assert_eq!(band.stack, "boundary-1");
    }

    #[test]
    fn test_positive_bounds_need_no_shift() {
        let all = vec![
            series(SeriesRole::Primary, "a", &[Some(3.0)]),
            series(SeriesRole::LowerBound, "a", &[Some(2.5)]),
            series(SeriesRole::UpperBound, "a", &[Some(4.0)]),
        ];
        assert_eq!(base_shift(&collect_pairs(&all)), 0.0);
    }

    #[test]
    fn test_fractional_lower_bound_floors() {
        let all = vec![
            series(SeriesRole::Primary, "a", &[Some(3.0)]),
            series(SeriesRole::LowerBound, "a", &[Some(-0.5)]),
            series(SeriesRole::UpperBound, "a", &[Some(4.0)]),
        ];
        assert_eq!(base_shift(&collect_pairs(&all)), 1.0);
    }

    #[test]
    fn test_missing_pair_is_skipped() {
        let all = vec![
            series(SeriesRole::Primary, "a", &[Some(1.0)]),
            series(SeriesRole::LowerBound, "a", &[Some(0.0)]),
            series(SeriesRole::UpperBound, "b", &[Some(2.0)]),
        ];
        assert!(collect_pairs(&all).is_empty());
        assert_eq!(base_shift(&[]), 0.0);
    }

    #[test]
    fn test_gaps_propagate() {
        let all = vec![
            series(SeriesRole::Primary, "a", &[Some(1.0), Some(1.0)]),
            series(SeriesRole::LowerBound, "a", &[None, Some(0.0)]),
            series(SeriesRole::UpperBound, "a", &[Some(2.0), None]),
        ];
        let pairs = collect_pairs(&all);
        let band = synthesize(&pairs[0], 0, base_shift(&pairs));
        assert_eq!(values(&band.lower_shadow), vec![None, Some(0.0)]);
        assert_eq!(values(&band.upper_delta), vec![None, None]);
    }

    #[test]
    fn test_duplicate_signatures_share_one_band() {
        let all = vec![
            series(SeriesRole::Primary, "a", &[Some(1.0)]),
            series(SeriesRole::Primary, "a", &[Some(2.0)]),
            series(SeriesRole::LowerBound, "a", &[Some(0.0)]),
            series(SeriesRole::UpperBound, "a", &[Some(3.0)]),
        ];
        assert_eq!(collect_pairs(&all).len(), 1);
    }

    proptest! {
        #[test]
        fn prop_band_is_non_negative(
            bounds in prop::collection::vec((-1.0e4f64..1.0e4, 0.0f64..1.0e4), 1..64)
        ) {
            let lower: Vec<Option<f64>> = bounds.iter().map(|(l, _)| Some(*l)).collect();
            let upper: Vec<Option<f64>> = bounds.iter().map(|(l, w)| Some(l + w)).collect();
            let all = vec![
                series(SeriesRole::Primary, "a", &lower),
                series(SeriesRole::LowerBound, "a", &lower),
                series(SeriesRole::UpperBound, "a", &upper),
            ];
            let pairs = collect_pairs(&all);
            let base = base_shift(&pairs);
            let band = synthesize(&pairs[0], 0, base);
            prop_assert!(base >= 0.0);
            for point in band.lower_shadow.iter().chain(band.upper_delta.iter()) {
                prop_assert!(point.value.unwrap_or(0.0) >= 0.0);
            }
        }
    }
}
