use std::path::Path;

use super::error::CaptureError;
use super::layout;
use crate::source::Level;

/// Lowercased file extension, empty when absent.
///
/// # Examples
/// This helper is part of an internal module, so the example is marked as
/// text example.
/// ```text
/// use std::path::Path;
///
/// assert_eq!(extension_of(Path::new("bus.JSON")), "json");
/// assert_eq!(extension_of(Path::new("capture")), "");
/// ```
pub fn extension_of(path: &Path) -> String {
    path.extension()
        .and_then(|ext| ext.to_str())
        .unwrap_or("")
        .to_ascii_lowercase()
}

/// Split one CSV line into trimmed fields.
pub fn split_fields(line: &str) -> Vec<&str> {
    line.split(layout::CSV_DELIMITER).map(str::trim).collect()
}

/// Parse a `0`/`1` level field.
///
/// # Errors
/// Returns `CaptureError::Parse` for anything other than `0` or `1`.
pub fn parse_level(field: &str) -> Result<Level, CaptureError> {
    match field {
        "0" => Ok(Level::Low),
        "1" => Ok(Level::High),
        other => Err(CaptureError::parse(
            "csv level",
            format!("expected 0 or 1, got '{other}'"),
        )),
    }
}

/// Extract the sample rate from a `# sample_rate_hz=<n>` comment line.
///
/// Returns `Ok(None)` for comments that do not carry the key.
pub fn parse_sample_rate_comment(line: &str) -> Result<Option<u32>, CaptureError> {
    let body = line.trim_start_matches(layout::CSV_COMMENT).trim();
    let Some((key, value)) = body.split_once('=') else {
        return Ok(None);
    };
    if key.trim() != layout::CSV_SAMPLE_RATE_KEY {
        return Ok(None);
    }
    value
        .trim()
        .parse::<u32>()
        .map(Some)
        .map_err(|e| CaptureError::parse("csv sample rate", e.to_string()))
}

/// Convert a timestamp in seconds to the nearest sample index.
///
/// # Examples
/// This helper is part of an internal module, so the example is marked as
/// text example.
/// ```text
/// assert_eq!(seconds_to_sample(0.000_010, 4_000_000).unwrap(), 40);
/// ```
///
/// # Errors
/// Returns `CaptureError::Parse` when the time is not finite, negative, or
/// lands past the last representable sample.
pub fn seconds_to_sample(seconds: f64, sample_rate_hz: u32) -> Result<u64, CaptureError> {
    let scaled = (seconds * f64::from(sample_rate_hz)).round();
    // u64::MAX rounds up to 2^64 as f64, so `>=` excludes everything unrepresentable.
    if !scaled.is_finite() || scaled < 0.0 || scaled >= u64::MAX as f64 {
        return Err(CaptureError::parse(
            "csv rows",
            format!("time {seconds} s is outside the sample range"),
        ));
    }
    Ok(scaled as u64)
}

#[cfg(test)]
mod tests {
    use super::{
        extension_of, parse_level, parse_sample_rate_comment, seconds_to_sample, split_fields,
    };
    use crate::source::Level;
    use crate::source::capture::error::CaptureError;
    use std::path::Path;

    #[test]
    fn extension_is_lowercased() {
        assert_eq!(extension_of(Path::new("bus.CSV")), "csv");
        assert_eq!(extension_of(Path::new("bus")), "");
    }

    #[test]
    fn fields_are_trimmed() {
        assert_eq!(split_fields(" 0.5, 1 ,0"), vec!["0.5", "1", "0"]);
    }

    #[test]
    fn level_fields() {
        assert_eq!(parse_level("0").unwrap(), Level::Low);
        assert_eq!(parse_level("1").unwrap(), Level::High);
        assert!(matches!(parse_level("2"), Err(CaptureError::Parse { .. })));
    }

    #[test]
    fn sample_rate_comment() {
        assert_eq!(
            parse_sample_rate_comment("# sample_rate_hz=1000000").unwrap(),
            Some(1_000_000)
        );
        assert_eq!(parse_sample_rate_comment("# exported by tool").unwrap(), None);
        assert!(parse_sample_rate_comment("# sample_rate_hz=fast").is_err());
    }

    #[test]
    fn seconds_round_to_nearest_sample() {
        assert_eq!(seconds_to_sample(0.000_010, 4_000_000).unwrap(), 40);
        assert_eq!(seconds_to_sample(0.000_000_124_9, 4_000_000).unwrap(), 0);
        assert_eq!(seconds_to_sample(1.0, 1_000_000).unwrap(), 1_000_000);
    }

    #[test]
    fn unrepresentable_times_are_rejected() {
        for seconds in [f64::INFINITY, f64::NAN, -1.0, 1e300] {
            assert!(
                matches!(
                    seconds_to_sample(seconds, 1_000_000),
                    Err(CaptureError::Parse { .. })
                ),
                "{seconds}"
            );
        }
    }
}
