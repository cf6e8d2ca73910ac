//! Tracker Configuration
//!
//! Values consumed by the trackers, plus the duration parsing and formatting
//! shared by the CLI and the `window` label of the active-series gauge.

use std::time::Duration;

use crate::error::{Error, Result};
use crate::tracker::METRIC_NAME_LABEL;

// =============================================================================
// Defaults
// =============================================================================

/// Default windows for the active-window tracker.
pub const DEFAULT_WINDOWS: [Duration; 4] = [
    Duration::from_secs(5 * 60),
    Duration::from_secs(15 * 60),
    Duration::from_secs(20 * 60),
    Duration::from_secs(30 * 60),
];

/// Default labels retained by the reduced-label tracker.
pub const DEFAULT_LABELS: [&str; 2] = [METRIC_NAME_LABEL, "job"];

/// Default time-to-live for the reduced-label tracker.
pub const DEFAULT_TTL: Duration = Duration::from_secs(60);

/// Configuration for both trackers
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackerConfig {
    /// Trailing windows for the active-window tracker
    pub windows: Vec<Duration>,

    /// Time-to-live for full identities in the reduced-label tracker
    pub ttl: Duration,

    /// Input label names kept by the reduced-label tracker
    pub labels: Vec<String>,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            windows: DEFAULT_WINDOWS.to_vec(),
            ttl: DEFAULT_TTL,
            labels: DEFAULT_LABELS.iter().map(|l| l.to_string()).collect(),
        }
    }
}

impl TrackerConfig {
    /// Reject values the trackers cannot work with.
    pub fn validate(&self) -> Result<()> {
        if let Some(w) = self.windows.iter().find(|w| w.is_zero()) {
            return Err(Error::Config(format!(
                "window must be positive, got {}",
                format_duration(*w)
            )));
        }

        if self.ttl.is_zero() {
            return Err(Error::Config("ttl must be positive".to_string()));
        }

        if self.labels.iter().any(|l| l.trim().is_empty()) {
            return Err(Error::Config("label names must not be empty".to_string()));
        }

        Ok(())
    }
}

// =============================================================================
// Duration Parsing
// =============================================================================

/// Parse a duration such as "5m", "1h30m", "5m0s", "500ms" or "90".
///
/// A trailing bare number is taken as seconds.
pub fn parse_duration(s: &str) -> Result<Duration> {
    let s = s.trim();
    if s.is_empty() {
        return Err(Error::DurationParse("empty duration string".to_string()));
    }

    let mut total = Duration::ZERO;
    let mut num_buf = String::new();
    let mut chars = s.chars().peekable();

    while let Some(c) = chars.next() {
        if c.is_ascii_digit() {
            num_buf.push(c);
            continue;
        }

        let num: u64 = num_buf
            .parse()
            .map_err(|_| Error::DurationParse(format!("invalid number in duration: {}", s)))?;
        num_buf.clear();

        let mut unit = String::from(c);
        while let Some(&next) = chars.peek() {
            if next.is_ascii_digit() {
                break;
            }
            unit.push(next);
            chars.next();
        }

        let overflow = || Error::DurationParse(format!("duration out of range: {}", s));
        let secs = |scale: u64| num.checked_mul(scale).map(Duration::from_secs).ok_or_else(overflow);

        let part = match unit.as_str() {
            "d" | "D" => secs(86400)?,
            "h" | "H" => secs(3600)?,
            "m" | "M" => secs(60)?,
            "s" | "S" => Duration::from_secs(num),
            "ms" => Duration::from_millis(num),
            "us" | "µs" => Duration::from_micros(num),
            "ns" => Duration::from_nanos(num),
            _ => {
                return Err(Error::DurationParse(format!(
                    "unknown duration unit: {}",
                    unit
                )))
            }
        };

        total = total.checked_add(part).ok_or_else(overflow)?;
    }

    if !num_buf.is_empty() {
        let num: u64 = num_buf
            .parse()
            .map_err(|_| Error::DurationParse(format!("invalid number in duration: {}", s)))?;
        total = total
            .checked_add(Duration::from_secs(num))
            .ok_or_else(|| Error::DurationParse(format!("duration out of range: {}", s)))?;
    }

    Ok(total)
}

/// Parse a comma-separated list of durations.
pub fn parse_duration_list(s: &str) -> Result<Vec<Duration>> {
    s.split(',')
        .map(str::trim)
        .filter(|part| !part.is_empty())
        .map(parse_duration)
        .collect()
}

// =============================================================================
// Duration Formatting
// =============================================================================

/// Render a duration the way Prometheus tooling prints it: "5m0s", "1h0m0s",
/// "1.5s", "250ms".
pub fn format_duration(d: Duration) -> String {
    let nanos = d.as_nanos();
    if nanos == 0 {
        return "0s".to_string();
    }

    if nanos < 1_000_000_000 {
        let (unit, scale) = if nanos < 1_000 {
            ("ns", 1)
        } else if nanos < 1_000_000 {
            ("µs", 1_000)
        } else {
            ("ms", 1_000_000)
        };
        return format!("{}{}", format_scaled(nanos, scale), unit);
    }

    let total_secs = d.as_secs();
    let hours = total_secs / 3600;
    let minutes = (total_secs % 3600) / 60;
    let secs = format_scaled(
        u128::from(total_secs % 60) * 1_000_000_000 + u128::from(d.subsec_nanos()),
        1_000_000_000,
    );

    if hours > 0 {
        format!("{}h{}m{}s", hours, minutes, secs)
    } else if minutes > 0 {
        format!("{}m{}s", minutes, secs)
    } else {
        format!("{}s", secs)
    }
}

fn format_scaled(value: u128, scale: u128) -> String {
    let whole = value / scale;
    let frac = value % scale;
    if frac == 0 {
        return whole.to_string();
    }

    let width = scale.to_string().len() - 1;
    let digits = format!("{:0width$}", frac, width = width);
    format!("{}.{}", whole, digits.trim_end_matches('0'))
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    #[test]
    fn test_parse_duration() {
        assert_eq!(parse_duration("5m").unwrap(), Duration::from_secs(300));
        assert_eq!(parse_duration("1h30m").unwrap(), Duration::from_secs(5400));
        assert_eq!(parse_duration("5m0s").unwrap(), Duration::from_secs(300));
        assert_eq!(parse_duration("90").unwrap(), Duration::from_secs(90));
        assert_eq!(parse_duration("500ms").unwrap(), Duration::from_millis(500));
        assert_eq!(parse_duration("1d").unwrap(), Duration::from_secs(86400));
    }

    #[test]
    fn test_parse_duration_errors() {
        assert_matches!(parse_duration(""), Err(Error::DurationParse(_)));
        assert_matches!(parse_duration("5x"), Err(Error::DurationParse(_)));
        assert_matches!(parse_duration("m"), Err(Error::DurationParse(_)));
    }

    #[test]
    fn test_parse_duration_overflow() {
        assert_matches!(
            parse_duration("18446744073709551615s18446744073709551615s"),
            Err(Error::DurationParse(_))
        );
        assert_matches!(
            parse_duration("18446744073709551615d"),
            Err(Error::DurationParse(_))
        );
        assert_matches!(
            parse_duration("18446744073709551615s1"),
            Err(Error::DurationParse(_))
        );
    }

    #[test]
    fn test_parse_duration_list() {
        let windows = parse_duration_list("5m, 15m,20m,30m").unwrap();
        assert_eq!(windows, DEFAULT_WINDOWS.to_vec());

        assert!(parse_duration_list("").unwrap().is_empty());
        assert!(parse_duration_list("5m,bogus").is_err());
    }

    #[test]
    fn test_format_duration() {
        assert_eq!(format_duration(Duration::ZERO), "0s");
        assert_eq!(format_duration(Duration::from_secs(300)), "5m0s");
        assert_eq!(format_duration(Duration::from_secs(3600)), "1h0m0s");
        assert_eq!(format_duration(Duration::from_secs(90)), "1m30s");
        assert_eq!(format_duration(Duration::from_secs(45)), "45s");
        assert_eq!(format_duration(Duration::from_millis(1500)), "1.5s");
        assert_eq!(format_duration(Duration::from_millis(250)), "250ms");
        assert_eq!(format_duration(Duration::from_micros(1500)), "1.5ms");
        assert_eq!(format_duration(Duration::from_nanos(42)), "42ns");
    }

    #[test]
    fn test_format_parse_agree() {
        for d in DEFAULT_WINDOWS {
            assert_eq!(parse_duration(&format_duration(d)).unwrap(), d);
        }
    }

    #[test]
    fn test_validate() {
        assert!(TrackerConfig::default().validate().is_ok());

        let config = TrackerConfig {
            windows: vec![Duration::ZERO],
            ..Default::default()
        };
        assert_matches!(config.validate(), Err(Error::Config(_)));

        let config = TrackerConfig {
            ttl: Duration::ZERO,
            ..Default::default()
        };
        assert_matches!(config.validate(), Err(Error::Config(_)));

        let config = TrackerConfig {
            labels: vec!["job".to_string(), " ".to_string()],
            ..Default::default()
        };
        assert_matches!(config.validate(), Err(Error::Config(_)));

        let config = TrackerConfig {
            windows: vec![],
            ..Default::default()
        };
        assert!(config.validate().is_ok());
    }
}
