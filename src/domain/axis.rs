// Time axis label selection
use chrono::{DateTime, FixedOffset};
use serde::Serialize;

const MINUTE: i64 = 60;
const DAY: i64 = 24 * 60 * MINUTE;

/// Label resolution chosen from the visible time span.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum TimeLabelFormat {
    #[serde(rename = "mm:ss")]
    MinuteSecond,
    #[serde(rename = "HH:mm")]
    HourMinute,
    #[serde(rename = "MM-DD HH:mm")]
    MonthDayHourMinute,
    #[serde(rename = "MM-DD")]
    MonthDay,
    #[serde(rename = "YYYY-MM-DD")]
    YearMonthDay,
}

impl TimeLabelFormat {
    /// Coarsest format that still tells ticks apart over `span_seconds`.
    pub fn for_span(span_seconds: i64) -> Self {
        let span = span_seconds.abs();
        if span < MINUTE {
            TimeLabelFormat::MinuteSecond
        } else if span < DAY {
            TimeLabelFormat::HourMinute
        } else if span < 6 * DAY {
            TimeLabelFormat::MonthDayHourMinute
        } else if span <= 360 * DAY {
            TimeLabelFormat::MonthDay
        } else {
            TimeLabelFormat::YearMonthDay
        }
    }

    fn strftime(self) -> &'static str {
        match self {
            TimeLabelFormat::MinuteSecond => "%M:%S",
            TimeLabelFormat::HourMinute => "%H:%M",
            TimeLabelFormat::MonthDayHourMinute => "%m-%d %H:%M",
            TimeLabelFormat::MonthDay => "%m-%d",
            TimeLabelFormat::YearMonthDay => "%Y-%m-%d",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct TimeAxisFormatter {
    pub format: TimeLabelFormat,
    pub min_x: i64,
    pub max_x: i64,
    /// Blank every label strictly between the first and last tick.
    pub only_begin_end: bool,
    #[serde(skip)]
    pub offset: FixedOffset,
}

impl TimeAxisFormatter {
    /// Picks the label format for timestamps in milliseconds.
    ///
    /// Returns `None` with fewer than two points; the renderer's own numeric
    /// labels are left in place then.
    pub fn select(
        timestamps: impl IntoIterator<Item = i64>,
        only_begin_end: bool,
        offset: FixedOffset,
    ) -> Option<Self> {
        let mut count = 0usize;
        let mut min_x = i64::MAX;
        let mut max_x = i64::MIN;
        for ts in timestamps {
            count += 1;
            min_x = min_x.min(ts);
            max_x = max_x.max(ts);
        }
        if count < 2 {
            return None;
        }
        Some(Self {
            format: TimeLabelFormat::for_span(max_x.saturating_sub(min_x) / 1000),
            min_x,
            max_x,
            only_begin_end,
            offset,
        })
    }

    pub fn format(&self, timestamp_ms: i64) -> String {
        if self.only_begin_end && timestamp_ms > self.min_x && timestamp_ms < self.max_x {
            return String::new();
        }
        match DateTime::from_timestamp_millis(timestamp_ms) {
            Some(utc) => utc
                .with_timezone(&self.offset)
                .format(self.format.strftime())
                .to_string(),
            None => timestamp_ms.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn utc() -> FixedOffset {
        FixedOffset::east_opt(0).unwrap()
    }

    #[test]
    fn test_span_ladder() {
        assert_eq!(TimeLabelFormat::for_span(30), TimeLabelFormat::MinuteSecond);
        assert_eq!(TimeLabelFormat::for_span(59), TimeLabelFormat::MinuteSecond);
        assert_eq!(TimeLabelFormat::for_span(60), TimeLabelFormat::HourMinute);
        assert_eq!(TimeLabelFormat::for_span(DAY - 1), TimeLabelFormat::HourMinute);
        assert_eq!(TimeLabelFormat::for_span(DAY), TimeLabelFormat::MonthDayHourMinute);
        assert_eq!(TimeLabelFormat::for_span(6 * DAY), TimeLabelFormat::MonthDay);
        assert_eq!(TimeLabelFormat::for_span(360 * DAY), TimeLabelFormat::MonthDay);
        assert_eq!(TimeLabelFormat::for_span(361 * DAY), TimeLabelFormat::YearMonthDay);
    }

    #[test]
    fn test_dense_thirty_seconds() {
        let start = 1_700_000_000_000i64;
        let timestamps = (0..3600).map(|i| start + i * 30_000 / 3600);
        let formatter = TimeAxisFormatter::select(timestamps, false, utc()).unwrap();
        assert_eq!(formatter.format, TimeLabelFormat::MinuteSecond);
    }

    #[test]
    fn test_selection_is_pure() {
        let timestamps = [0i64, 3_600_000];
        let first = TimeAxisFormatter::select(timestamps, false, utc());
        let second = TimeAxisFormatter::select(timestamps, false, utc());
        assert_eq!(first, second);
    }

    #[test]
    fn test_too_few_points() {
        assert!(TimeAxisFormatter::select([1000i64], false, utc()).is_none());
        assert!(TimeAxisFormatter::select(Vec::<i64>::new(), false, utc()).is_none());
    }

    #[test]
    fn test_extreme_span_saturates() {
        let formatter = TimeAxisFormatter::select([i64::MIN, i64::MAX], false, utc()).unwrap();
        assert_eq!(formatter.format, TimeLabelFormat::YearMonthDay);
        assert_eq!(formatter.format(i64::MAX), i64::MAX.to_string());
    }

    #[test]
    fn test_format_labels() {
        // 2023-11-14 22:13:20 UTC
        let ts = 1_700_000_000_000i64;
        let formatter = TimeAxisFormatter::select([ts, ts + 3_600_000], false, utc()).unwrap();
        assert_eq!(formatter.format(ts), "22:13");

        let shanghai = FixedOffset::east_opt(8 * 3600).unwrap();
        let formatter = TimeAxisFormatter::select([ts, ts + 400 * DAY * 1000], false, shanghai).unwrap();
        assert_eq!(formatter.format(ts), "2023-11-15");
    }

    #[test]
    fn test_only_begin_end() {
        let formatter = TimeAxisFormatter::select([0i64, 60_000, 120_000], true, utc()).unwrap();
        assert_eq!(formatter.format(0), "00:00");
        assert_eq!(formatter.format(60_000), "");
        assert_eq!(formatter.format(120_000), "00:02");
    }
}
