/// Extract the elapsed output time from an ffmpeg stats line.
///
/// Looks for the `time=HH:MM:SS.ff` token that ffmpeg prints on its
/// `\r`-terminated progress lines. `time=N/A` and lines without the token
/// yield `None`.
pub fn parse_elapsed(line: &str) -> Option<f64> {
    let start = line.find("time=")? + "time=".len();
    let token = line[start..].split_whitespace().next()?;

    let mut parts = token.splitn(3, ':');
    let hours: u64 = parse_digits(parts.next()?)?;
    let minutes: u64 = parse_digits(parts.next()?)?;
    let seconds_str = parts.next()?;

    let (whole, frac) = seconds_str.split_once('.').unwrap_or((seconds_str, "0"));
    parse_digits(whole)?;
    parse_digits(frac)?;
    let seconds: f64 = seconds_str.parse().ok()?;

    Some(hours as f64 * 3600.0 + minutes as f64 * 60.0 + seconds)
}

fn parse_digits(s: &str) -> Option<u64> {
    if s.is_empty() || !s.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    s.parse().ok()
}

/// Percent-complete tracking for one running encode.
///
/// Only changes are reported, so the consumer is not flooded with one
/// update per stats line.
#[derive(Debug, Clone, PartialEq)]
pub struct ProgressState {
    pub last_percent: u8,
    pub total_duration_s: f64,
}

impl ProgressState {
    /// Unknown or non-positive totals fall back to one second.
    pub fn new(total_duration_s: f64) -> Self {
        let total_duration_s = if total_duration_s.is_finite() && total_duration_s > 0.0 {
            total_duration_s
        } else {
            1.0
        };
        Self {
            last_percent: 0,
            total_duration_s,
        }
    }

    /// `floor(elapsed / total * 100)` clamped to 0..=100
    pub fn percent_for(&self, elapsed_s: f64) -> u8 {
        let pct = (elapsed_s / self.total_duration_s * 100.0).floor();
        if pct.is_nan() || pct <= 0.0 {
            0
        } else {
            pct.min(100.0) as u8
        }
    }

    /// Feed one stats line; returns the new percent if it changed.
    pub fn observe_line(&mut self, line: &str) -> Option<u8> {
        let elapsed = parse_elapsed(line)?;
        let pct = self.percent_for(elapsed);
        if pct == self.last_percent {
            return None;
        }
        self.last_percent = pct;
        Some(pct)
    }

    /// Mark the encode finished; returns `Some(100)` unless already reported.
    pub fn complete(&mut self) -> Option<u8> {
        if self.last_percent == 100 {
            return None;
        }
        self.last_percent = 100;
        Some(100)
    }
}
