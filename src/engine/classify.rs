//! Turns a failed ffmpeg run's stderr into an actionable error.
//!
//! Rules are tried in order; the first whose pattern matches the diagnostic
//! text decides the error. Unmatched failures get a keyword summary of the
//! stderr tail.

use regex::Regex;
use tracing::debug;

use super::error::EncodeError;

/// Signature printed when burn-in needs a libass feature the build lacks
pub const LIBASS_WRAP_SIGNATURE: &str =
    "libass wasn't built with ASS_FEATURE_WRAP_UNICODE support";

const ERROR_KEYWORDS: &[&str] = &["error", "failed", "invalid", "not found"];
const SCAN_LINES: usize = 10;
const MAX_MATCHES: usize = 3;
const FALLBACK_LINES: usize = 20;

/// What a matched rule reports.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FailureKind {
    SubtitleLibraryIncompatible,
    Permission,
    /// Generic failure with an extra hint placed above the stderr summary
    Hint(String),
}

#[derive(Debug, Clone)]
pub struct FailureRule {
    pub pattern: Regex,
    pub kind: FailureKind,
}

impl FailureRule {
    pub fn new(pattern: &str, kind: FailureKind) -> Result<Self, regex::Error> {
        Ok(Self {
            pattern: Regex::new(pattern)?,
            kind,
        })
    }
}

#[derive(Debug, Clone)]
pub struct FailureClassifier {
    rules: Vec<FailureRule>,
}

impl Default for FailureClassifier {
    fn default() -> Self {
        let rules = vec![
            FailureRule {
                pattern: Regex::new(&regex::escape(LIBASS_WRAP_SIGNATURE))
                    .expect("escaped literal is a valid pattern"),
                kind: FailureKind::SubtitleLibraryIncompatible,
            },
            FailureRule {
                pattern: Regex::new(r"(?i)permission denied").expect("static pattern"),
                kind: FailureKind::Permission,
            },
        ];
        Self { rules }
    }
}

impl FailureClassifier {
    /// A classifier with no rules; every failure gets the keyword summary
    pub fn empty() -> Self {
        Self { rules: Vec::new() }
    }

    pub fn push_rule(&mut self, rule: FailureRule) {
        self.rules.push(rule);
    }

    pub fn rules(&self) -> &[FailureRule] {
        &self.rules
    }

    pub fn classify(&self, exit_code: Option<i32>, stderr: &str) -> EncodeError {
        for rule in &self.rules {
            if rule.pattern.is_match(stderr) {
                debug!("Failure matched rule /{}/", rule.pattern.as_str());
                return match &rule.kind {
                    FailureKind::SubtitleLibraryIncompatible => {
                        EncodeError::SubtitleLibraryIncompatible
                    }
                    FailureKind::Permission => EncodeError::Permission,
                    FailureKind::Hint(hint) => EncodeError::ToolFailure {
                        exit_code,
                        details: format!("{}\n\n{}", hint, error_summary(stderr)),
                    },
                };
            }
        }

        EncodeError::ToolFailure {
            exit_code,
            details: error_summary(stderr),
        }
    }
}

/// Up to three of the most recent error-looking lines among the last ten
/// non-empty ones, oldest first; otherwise the last twenty lines verbatim.
pub fn error_summary(stderr: &str) -> String {
    let lines: Vec<&str> = stderr
        .lines()
        .flat_map(|l| l.split('\r'))
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .collect();

    let mut matches: Vec<&str> = lines
        .iter()
        .rev()
        .take(SCAN_LINES)
        .filter(|line| {
            let lower = line.to_lowercase();
            ERROR_KEYWORDS.iter().any(|k| lower.contains(k))
        })
        .take(MAX_MATCHES)
        .copied()
        .collect();

    if !matches.is_empty() {
        matches.reverse();
        return matches.join("\n");
    }

    let start = lines.len().saturating_sub(FALLBACK_LINES);
    lines[start..].join("\n")
}
