// Precision resolution - fewest digits that keep sampled values distinct
use super::unit::ValueFormat;
use std::collections::HashSet;

pub const MAX_PRECISION: usize = 5;

/// Smallest precision in `0..=MAX_PRECISION` at which five sampled values
/// (min, ~p25, median, ~p75, max) format to distinct numbers.
///
/// The sample positions are a heuristic, kept as-is because chart labels
/// downstream depend on the exact choice.
pub fn min_precision(values: &[f64], format: &ValueFormat) -> usize {
    if values.is_empty() {
        return 0;
    }

    let mut sorted: Vec<f64> = values.iter().copied().filter(|v| v.is_finite()).collect();
    if sorted.is_empty() {
        return 0;
    }
    sorted.sort_by(f64::total_cmp);

    let len = sorted.len();
    if sorted[0] == sorted[len - 1] {
        return fraction_digits(sorted[0]).min(MAX_PRECISION);
    }

    let samples = sample(&sorted);
    let mut precision = 0;
    while precision < MAX_PRECISION {
        if distinct_formatted(&samples, format, precision) >= samples.len() {
            return precision;
        }
        precision += 1;
    }
    precision
}

fn sample(sorted: &[f64]) -> Vec<f64> {
    let len = sorted.len();
    let middle = len.div_ceil(2);
    let positions = [
        0,
        middle.div_ceil(2),
        middle,
        middle + (len - middle) / 2,
        len - 1,
    ];

    let mut samples: Vec<f64> = Vec::with_capacity(positions.len());
    for value in positions.iter().filter_map(|&i| sorted.get(i)) {
        if !samples.contains(value) {
            samples.push(*value);
        }
    }
    samples
}

/// Number of distinct numeric values among the formatted texts.
fn distinct_formatted(samples: &[f64], format: &ValueFormat, precision: usize) -> usize {
    samples
        .iter()
        .filter_map(|&v| format.format(v, precision).text.parse::<f64>().ok())
        .map(|v| if v == 0.0 { 0.0f64.to_bits() } else { v.to_bits() })
        .collect::<HashSet<u64>>()
        .len()
}

fn fraction_digits(value: f64) -> usize {
    let text = value.to_string();
    match text.split_once('.') {
        Some((_, fraction)) => fraction.len(),
        None => 0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_distinct_thousandths() {
        assert_eq!(min_precision(&[1.001, 1.002, 1.003], &ValueFormat::None), 3);
    }

    #[test]
    fn test_identical_values() {
        assert_eq!(min_precision(&[5.0, 5.0, 5.0], &ValueFormat::None), 0);
        assert_eq!(min_precision(&[5.0, 5.0], &ValueFormat::Percent), 0);
        assert_eq!(min_precision(&[2.25, 2.25], &ValueFormat::None), 2);
        assert_eq!(min_precision(&[0.1234567, 0.1234567], &ValueFormat::None), MAX_PRECISION);
    }

    #[test]
    fn test_integers_need_no_digits() {
        assert_eq!(min_precision(&[10.0, 20.0, 30.0, 40.0], &ValueFormat::None), 0);
        assert_eq!(min_precision(&[], &ValueFormat::None), 0);
    }

    #[test]
    fn test_unsorted_input() {
        assert_eq!(min_precision(&[0.3, 0.1, 0.2], &ValueFormat::None), 1);
    }

    #[test]
    fn test_capped_at_max_precision() {
        assert_eq!(
            min_precision(&[1.0, 1.0000001, 1.0000002], &ValueFormat::None),
            MAX_PRECISION
        );
    }

    #[test]
    fn test_sample_positions() {
        let sorted: Vec<f64> = (0..10).map(f64::from).collect();
        assert_eq!(sample(&sorted), vec![0.0, 3.0, 5.0, 7.0, 9.0]);
        assert_eq!(sample(&[1.0, 2.0]), vec![1.0, 2.0]);
    }

    proptest! {
        #[test]
        fn prop_precision_is_minimal(
            values in prop::collection::vec(-1.0e6f64..1.0e6, 1..64)
        ) {
            let format = ValueFormat::None;
            let precision = min_precision(&values, &format);
            prop_assert!(precision <= MAX_PRECISION);

            let mut sorted = values.clone();
            sorted.sort_by(f64::total_cmp);
            if sorted[0] != sorted[sorted.len() - 1] {
                let samples = sample(&sorted);
                if precision < MAX_PRECISION {
                    prop_assert_eq!(distinct_formatted(&samples, &format, precision), samples.len());
                }
                if precision > 0 {
                    prop_assert!(distinct_formatted(&samples, &format, precision - 1) < samples.len());
                }
            }
        }

        #[test]
        fn prop_integer_samples_stay_distinct(
            values in prop::collection::btree_set(-10_000i32..10_000, 2..32)
        ) {
            let values: Vec<f64> = values.into_iter().map(f64::from).collect();
            let format = ValueFormat::None;
            prop_assert_eq!(min_precision(&values, &format), 0);

            let mut sorted = values.clone();
            sorted.sort_by(f64::total_cmp);
            let samples = sample(&sorted);
            for higher in 0..=MAX_PRECISION {
                prop_assert_eq!(distinct_formatted(&samples, &format, higher), samples.len());
            }
        }
    }
}
