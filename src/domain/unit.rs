// Value formatting per declared unit
use std::fmt;

/// Formatting ladder chosen from a series' declared unit.
#[derive(Debug, Clone, PartialEq)]
pub enum ValueFormat {
    /// `none` or no unit: fixed-point number without suffix.
    None,
    /// Base-1000 abbreviation (K, M, G, ...).
    Short,
    Percent,
    /// Ratio in `[0, 1]` rendered as a percentage.
    PercentUnit,
    Bytes,
    Kilobytes,
    Megabytes,
    BitsPerSecond,
    BytesPerSecond,
    Milliseconds,
    Seconds,
    /// Unknown unit: the number with the unit appended verbatim.
    Custom(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FormattedValue {
    pub text: String,
    pub suffix: String,
}

impl fmt::Display for FormattedValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.text, self.suffix)
    }
}

const SHORT_SUFFIXES: [&str; 7] = ["", "K", "M", "G", "T", "P", "E"];
const BYTE_SUFFIXES: [&str; 7] = ["B", "KiB", "MiB", "GiB", "TiB", "PiB", "EiB"];
const BIT_RATE_SUFFIXES: [&str; 6] = ["b/s", "Kb/s", "Mb/s", "Gb/s", "Tb/s", "Pb/s"];
const BYTE_RATE_SUFFIXES: [&str; 6] = ["B/s", "KB/s", "MB/s", "GB/s", "TB/s", "PB/s"];

impl ValueFormat {
    pub fn from_unit(unit: Option<&str>) -> Self {
        match unit.map(str::trim) {
            None | Some("") | Some("none") => ValueFormat::None,
            Some("short") => ValueFormat::Short,
            Some("percent") | Some("%") => ValueFormat::Percent,
            Some("percentunit") => ValueFormat::PercentUnit,
            Some("bytes") => ValueFormat::Bytes,
            Some("kbytes") => ValueFormat::Kilobytes,
            Some("mbytes") => ValueFormat::Megabytes,
            Some("bps") => ValueFormat::BitsPerSecond,
            Some("Bps") => ValueFormat::BytesPerSecond,
            Some("ms") => ValueFormat::Milliseconds,
            Some("s") => ValueFormat::Seconds,
            Some(other) => ValueFormat::Custom(other.to_string()),
        }
    }

    pub fn is_none(&self) -> bool {
        matches!(self, ValueFormat::None)
    }

    pub fn format(&self, value: f64, precision: usize) -> FormattedValue {
        match self {
            ValueFormat::None => plain(value, precision, ""),
            ValueFormat::Short => scaled(value, precision, 1000.0, &SHORT_SUFFIXES),
            ValueFormat::Percent => plain(value, precision, "%"),
            ValueFormat::PercentUnit => plain(value * 100.0, precision, "%"),
            ValueFormat::Bytes => scaled(value, precision, 1024.0, &BYTE_SUFFIXES),
            ValueFormat::Kilobytes => scaled(value, precision, 1024.0, &BYTE_SUFFIXES[1..]),
            ValueFormat::Megabytes => scaled(value, precision, 1024.0, &BYTE_SUFFIXES[2..]),
            ValueFormat::BitsPerSecond => scaled(value, precision, 1000.0, &BIT_RATE_SUFFIXES),
            ValueFormat::BytesPerSecond => scaled(value, precision, 1000.0, &BYTE_RATE_SUFFIXES),
            ValueFormat::Milliseconds => duration(value / 1000.0, precision, true),
            ValueFormat::Seconds => duration(value, precision, false),
            ValueFormat::Custom(unit) => plain(value, precision, unit),
        }
    }
}

pub fn to_fixed(value: f64, precision: usize) -> String {
    let text = format!("{:.*}", precision, value);
    // "-0.00" reads as a different value than "0.00".
    if text.starts_with('-') && text[1..].chars().all(|c| c == '0' || c == '.') {
        text[1..].to_string()
    } else {
        text
    }
}

fn plain(value: f64, precision: usize, suffix: &str) -> FormattedValue {
    FormattedValue {
        text: to_fixed(value, precision),
        suffix: suffix.to_string(),
    }
}

fn scaled(value: f64, precision: usize, base: f64, suffixes: &[&str]) -> FormattedValue {
    let mut scaled = value;
    let mut step = 0;
    while scaled.abs() >= base && step < suffixes.len() - 1 {
        scaled /= base;
        step += 1;
    }
    plain(scaled, precision, suffixes[step])
}

fn duration(seconds: f64, precision: usize, sub_second: bool) -> FormattedValue {
    let abs = seconds.abs();
    if sub_second && abs < 1.0 {
        return plain(seconds * 1000.0, precision, "ms");
    }
    if abs < 60.0 {
        plain(seconds, precision, "s")
    } else if abs < 3600.0 {
        plain(seconds / 60.0, precision, "min")
    } else if abs < 86400.0 {
        plain(seconds / 3600.0, precision, "h")
    } else {
        plain(seconds / 86400.0, precision, "d")
    }
}

/// Compact y-axis label for series without a shared unit: base-1000
/// ladder, three decimals, trailing zeros trimmed.
pub fn abbreviate(num: f64) -> String {
    const LADDER: [(f64, &str); 7] = [
        (1.0, ""),
        (1e3, "K"),
        (1e6, "M"),
        (1e9, "G"),
        (1e12, "T"),
        (1e15, "P"),
        (1e18, "E"),
    ];
    let mut i = LADDER.len() - 1;
    while i > 0 && num < LADDER[i].0 {
        i -= 1;
    }
    let (scale, symbol) = LADDER[i];
    format!("{}{}", trim_trailing_zeros(&to_fixed(num / scale, 3)), symbol)
}

pub fn trim_trailing_zeros(text: &str) -> String {
    if !text.contains('.') {
        return text.to_string();
    }
    text.trim_end_matches('0').trim_end_matches('.').to_string()
}
