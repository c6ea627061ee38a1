// Human time strings (M:SS or H:MM:SS) <-> seconds

use thiserror::Error;

/// Why a time string was rejected by [`parse_time_strict`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TimeParseError {
    #[error("Invalid time format: '{0}'. Please use MM:SS or HH:MM:SS")]
    Format(String),

    #[error("Seconds must be 0-59, got {0}")]
    SecondsOutOfRange(i64),

    #[error("Minutes must be 0-59, got {0}")]
    MinutesOutOfRange(i64),

    #[error("Hours cannot be negative: {0}")]
    NegativeHours(i64),

    #[error("Minutes cannot be negative: {0}")]
    NegativeMinutes(i64),

    #[error("Seconds cannot be negative: {0}")]
    NegativeSeconds(i64),
}

fn parse_segment(segment: &str, original: &str) -> Result<i64, TimeParseError> {
    let segment = segment.trim();
    let digits = segment.strip_prefix('-').unwrap_or(segment);
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return Err(TimeParseError::Format(original.to_string()));
    }
    segment
        .parse::<i64>()
        .map_err(|_| TimeParseError::Format(original.to_string()))
}

// Minutes after an hour segment and seconds are at most two digits
fn parse_sub_segment(segment: &str, original: &str) -> Result<i64, TimeParseError> {
    let trimmed = segment.trim();
    if trimmed.strip_prefix('-').unwrap_or(trimmed).len() > 2 {
        return Err(TimeParseError::Format(original.to_string()));
    }
    parse_segment(trimmed, original)
}

fn total_seconds(parts: &[(i64, i64)], original: &str) -> Result<f64, TimeParseError> {
    parts
        .iter()
        .try_fold(0i64, |acc, &(value, scale)| {
            value.checked_mul(scale).and_then(|v| acc.checked_add(v))
        })
        .map(|total| total as f64)
        .ok_or_else(|| TimeParseError::Format(original.to_string()))
}

/// Parse `M:SS` or `H:MM:SS` into seconds, reporting why the text is invalid.
///
/// Used before submitting a job, where the user should see what is wrong.
/// The leading segment may have any number of digits (`90:00` is ninety
/// minutes); the trailing segments are one or two digits below 60. A leading
/// segment too large to represent is a format fault.
pub fn parse_time_strict(text: &str) -> Result<f64, TimeParseError> {
    let text = text.trim();
    let parts: Vec<&str> = text.split(':').collect();

    match parts.as_slice() {
        [minutes, seconds] => {
            let minutes = parse_segment(minutes, text)?;
            let seconds = parse_sub_segment(seconds, text)?;
            if minutes < 0 {
                return Err(TimeParseError::NegativeMinutes(minutes));
            }
            if seconds < 0 {
                return Err(TimeParseError::NegativeSeconds(seconds));
            }
            if seconds >= 60 {
                return Err(TimeParseError::SecondsOutOfRange(seconds));
            }
            total_seconds(&[(minutes, 60), (seconds, 1)], text)
        }
        [hours, minutes, seconds] => {
            let hours = parse_segment(hours, text)?;
            let minutes = parse_sub_segment(minutes, text)?;
            let seconds = parse_sub_segment(seconds, text)?;
            if hours < 0 {
                return Err(TimeParseError::NegativeHours(hours));
            }
            if minutes < 0 {
                return Err(TimeParseError::NegativeMinutes(minutes));
            }
            if seconds < 0 {
                return Err(TimeParseError::NegativeSeconds(seconds));
            }
            if minutes >= 60 {
                return Err(TimeParseError::MinutesOutOfRange(minutes));
            }
            if seconds >= 60 {
                return Err(TimeParseError::SecondsOutOfRange(seconds));
            }
            total_seconds(&[(hours, 3600), (minutes, 60), (seconds, 1)], text)
        }
        _ => Err(TimeParseError::Format(text.to_string())),
    }
}

/// Parse a time string while the user is still typing it.
///
/// Any fault yields `0.0` instead of an error so half-typed input never
/// interrupts the user.
pub fn parse_time_lenient(text: &str) -> f64 {
    parse_time_strict(text).unwrap_or(0.0)
}

/// Format seconds as `M:SS` (floored, never negative, no hour segment).
pub fn format_time(seconds: f64) -> String {
    let total = if seconds.is_finite() && seconds > 0.0 {
        seconds.floor() as u64
    } else {
        0
    };
    format!("{}:{:02}", total / 60, total % 60)
}
