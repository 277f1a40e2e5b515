//! Resource quantity normalization
//!
//! Converts Kubernetes quantity strings (`"500m"`, `"8Gi"`, `"2048Ki"`) into
//! the canonical units used by the reservation views: CPU in cores and
//! memory in whole binary megabytes. Every parser fails closed: input that
//! cannot be read yields `0.0`.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::LazyLock;

/// Bytes in one binary megabyte (MiB)
pub const BYTES_PER_MB: f64 = 1024.0 * 1024.0;

/// Number and optional suffix, e.g. "1.5", "500m", "8Gi", "1e3"
static QUANTITY_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^([0-9]+(?:\.[0-9]*)?|\.[0-9]+)(?:[eE]([+-]?[0-9]+))?([A-Za-z]{0,2})$").unwrap()
});

/// A value reported either as a plain number or as a quantity string
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum NumberOrString {
    Number(f64),
    Text(String),
}

impl Default for NumberOrString {
    fn default() -> Self {
        NumberOrString::Number(0.0)
    }
}

impl From<f64> for NumberOrString {
    fn from(value: f64) -> Self {
        NumberOrString::Number(value)
    }
}

impl From<&str> for NumberOrString {
    fn from(value: &str) -> Self {
        NumberOrString::Text(value.to_string())
    }
}

/// Split a quantity into its numeric value and suffix.
fn split_quantity(raw: &str) -> Option<(f64, &str)> {
    let caps = QUANTITY_REGEX.captures(raw.trim())?;
    let mantissa: f64 = caps.get(1)?.as_str().parse().ok()?;
    let exponent: i32 = match caps.get(2) {
        Some(e) => e.as_str().parse().ok()?,
        None => 0,
    };
    let suffix = caps.get(3).map(|m| m.as_str()).unwrap_or("");
    let value = mantissa * 10f64.powi(exponent);
    if value.is_finite() {
        Some((value, suffix))
    } else {
        None
    }
}

/// Parse a CPU quantity into cores.
///
/// - "4" -> 4.0
/// - "500m" -> 0.5
/// - "250000000n" -> 0.25
pub fn parse_cpu_cores(raw: &str) -> f64 {
    let Some((value, suffix)) = split_quantity(raw) else {
        return 0.0;
    };

    let divisor = match suffix {
        "" => 1.0,
        "m" => 1_000.0,
        "u" => 1_000_000.0,
        "n" => 1_000_000_000.0,
        _ => return 0.0,
    };

    value / divisor
}

/// Parse a memory quantity into bytes.
///
/// Binary (`Ki`..`Ei`) and decimal (`k`/`K`..`E`) suffixes are accepted.
pub fn parse_memory_bytes(raw: &str) -> f64 {
    let Some((value, suffix)) = split_quantity(raw) else {
        return 0.0;
    };

    let multiplier: f64 = match suffix {
        "" => 1.0,
        "Ki" => 1024.0,
        "Mi" => 1024f64.powi(2),
        "Gi" => 1024f64.powi(3),
        "Ti" => 1024f64.powi(4),
        "Pi" => 1024f64.powi(5),
        "Ei" => 1024f64.powi(6),
        "k" | "K" => 1e3,
        "M" => 1e6,
        "G" => 1e9,
        "T" => 1e12,
        "P" => 1e15,
        "E" => 1e18,
        _ => return 0.0,
    };

    value * multiplier
}

/// Convert a byte count into whole binary megabytes (truncated).
pub fn bytes_to_mb(bytes: f64) -> f64 {
    if !bytes.is_finite() || bytes <= 0.0 {
        return 0.0;
    }
    (bytes / BYTES_PER_MB).floor()
}

/// Parse a memory quantity into whole binary megabytes.
pub fn parse_memory_mb(raw: &str) -> f64 {
    bytes_to_mb(parse_memory_bytes(raw))
}

/// Memory in megabytes from a value that is either a byte count or a quantity string.
pub fn memory_mb(value: &NumberOrString) -> f64 {
    match value {
        NumberOrString::Number(bytes) => bytes_to_mb(*bytes),
        NumberOrString::Text(text) => parse_memory_mb(text),
    }
}

/// Numeric value of a number-or-string, 0 when it is not a finite non-negative number.
pub fn safe_value(value: &NumberOrString) -> f64 {
    let number = match value {
        NumberOrString::Number(n) => *n,
        NumberOrString::Text(text) => {
            let text = text.trim();
            if text.is_empty() {
                0.0
            } else {
                text.parse().unwrap_or(0.0)
            }
        }
    };
    non_negative(number)
}

/// Clamp NaN, infinities and negatives to zero.
pub fn non_negative(value: f64) -> f64 {
    if value.is_finite() && value > 0.0 {
        value
    } else {
        0.0
    }
}

/// Round to `places` decimals, halves away from zero.
pub fn round_to(value: f64, places: u32) -> f64 {
    let factor = 10f64.powi(places as i32);
    (value * factor).round() / factor
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_cpu_cores() {
        assert_eq!(parse_cpu_cores("4"), 4.0);
        assert_eq!(parse_cpu_cores("500m"), 0.5);
        assert_eq!(parse_cpu_cores("1.5"), 1.5);
        assert_eq!(parse_cpu_cores("250000000n"), 0.25);
        assert_eq!(parse_cpu_cores("0"), 0.0);
    }

    #[test]
    fn test_parse_cpu_millicore_relation() {
        for raw in ["1", "250", "3999", "12"] {
            let with_suffix = parse_cpu_cores(&format!("{}m", raw));
            assert!((with_suffix - parse_cpu_cores(raw) / 1000.0).abs() < 1e-12);
        }
    }

    #[test]
    fn test_parse_cpu_fails_closed() {
        assert_eq!(parse_cpu_cores(""), 0.0);
        assert_eq!(parse_cpu_cores("abc"), 0.0);
        assert_eq!(parse_cpu_cores("-2"), 0.0);
        assert_eq!(parse_cpu_cores("5Gi"), 0.0);
    }

    #[test]
    fn test_parse_memory_mb() {
        assert_eq!(parse_memory_mb("1Gi"), 1024.0);
        assert_eq!(parse_memory_mb("8Gi"), 8192.0);
        assert_eq!(parse_memory_mb("512Mi"), 512.0);
        assert_eq!(parse_memory_mb("2097152Ki"), 2048.0);
        assert_eq!(parse_memory_mb("1048576"), 1.0);
        assert_eq!(parse_memory_mb("1G"), 953.0);
        assert_eq!(parse_memory_mb("0"), 0.0);
    }

    #[test]
    fn test_parse_memory_fails_closed() {
        assert_eq!(parse_memory_mb(""), 0.0);
        assert_eq!(parse_memory_mb("lots"), 0.0);
        assert_eq!(parse_memory_mb("12Qi"), 0.0);
    }

    #[test]
    fn test_memory_mb_number_or_string() {
        assert_eq!(memory_mb(&NumberOrString::Text("2Gi".into())), 2048.0);
        assert_eq!(memory_mb(&NumberOrString::Number(2147483648.0)), 2048.0);
    }

    #[test]
    fn test_safe_value() {
        assert_eq!(safe_value(&NumberOrString::Number(3.5)), 3.5);
        assert_eq!(safe_value(&NumberOrString::Text("42".into())), 42.0);
        assert_eq!(safe_value(&NumberOrString::Text("n/a".into())), 0.0);
        assert_eq!(safe_value(&NumberOrString::Number(f64::NAN)), 0.0);
    }

    #[test]
    fn test_round_to() {
        assert_eq!(round_to(1.23456, 3), 1.235);
        assert_eq!(round_to(2.0, 2), 2.0);
        assert_eq!(round_to(0.125, 2), 0.13);
    }
}
