// Query interval resolution
use serde::{Serialize, Serializer};

const MIN_TEXT_INTERVAL: u64 = 10;
const DEFAULT_INTERVAL: u64 = 60;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Interval {
    /// The backend picks the aggregation window.
    Auto,
    Seconds(u64),
}

impl Serialize for Interval {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Interval::Auto => serializer.serialize_str("auto"),
            Interval::Seconds(seconds) => serializer.serialize_u64(*seconds),
        }
    }
}

/// Resolves a panel interval such as `auto`, `5m` or `1d` against the collection step.
///
/// Textual durations never go below the step (10s without one); anything
/// unrecognized falls back to the step (60s without one).
pub fn resolve(interval: &str, step: Option<u64>) -> Interval {
    let interval = interval.trim();
    if interval == "auto" {
        return Interval::Auto;
    }
    match parse_duration(interval) {
        Some(seconds) => Interval::Seconds(seconds.max(step.unwrap_or(MIN_TEXT_INTERVAL))),
        None => Interval::Seconds(step.filter(|s| *s > 0).unwrap_or(DEFAULT_INTERVAL)),
    }
}

fn parse_duration(text: &str) -> Option<u64> {
    let unit = text.chars().last()?;
    let amount: u64 = text[..text.len() - unit.len_utf8()].parse().ok()?;
    let seconds = match unit {
        's' => 1,
        'm' => 60,
        'h' => 3_600,
        'd' => 86_400,
        'w' => 7 * 86_400,
        'M' => 30 * 86_400,
        'y' => 365 * 86_400,
        _ => return None,
    };
    amount.checked_mul(seconds)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_auto_is_kept() {
        assert_eq!(resolve("auto", Some(60)), Interval::Auto);
        assert_eq!(serde_json::to_string(&Interval::Auto).unwrap(), "\"auto\"");
    }

    #[test]
    fn test_textual_durations() {
        assert_eq!(resolve("5m", Some(60)), Interval::Seconds(300));
        assert_eq!(resolve("1h", None), Interval::Seconds(3_600));
        assert_eq!(resolve("1M", None), Interval::Seconds(30 * 86_400));
        assert_eq!(resolve("2s", None), Interval::Seconds(10));
        assert_eq!(resolve("30s", Some(60)), Interval::Seconds(60));
    }

    #[test]
    fn test_fallback_to_step() {
        assert_eq!(resolve("", None), Interval::Seconds(60));
        assert_eq!(resolve("120", Some(30)), Interval::Seconds(30));
        assert_eq!(resolve("5x", Some(0)), Interval::Seconds(60));
        assert_eq!(serde_json::to_string(&Interval::Seconds(30)).unwrap(), "30");
    }
}
