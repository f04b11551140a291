//! Error taxonomy for the partcheck oracles.
//!
//! A round of an oracle ends in one of four ways: it passes, it is skipped
//! (an inconclusive round, retried with a different shape), it finds a logic
//! bug, or it hits an engine error nobody expected. The last three are carried
//! by [`OracleError`] so they can travel through `?` from deep inside query
//! collection up to the round boundary, where the session runner sorts them
//! back out.

use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;

/// Why a round was abandoned without a verdict.
///
/// These are control tags, not diagnostics: nothing here is meant for an
/// operator to read.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    /// The statement produced no result set.
    NoResultSet,
    /// The engine failed with a message listed in the expected-error set.
    ExpectedError,
    /// The driver could not convert a returned value.
    ValueConversion,
    /// There is no table to build a query over.
    EmptySchema,
    /// The generated shape cannot be partitioned this round.
    InapplicableShape,
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::NoResultSet => "no_result_set",
            Self::ExpectedError => "expected_error",
            Self::ValueConversion => "value_conversion",
            Self::EmptySchema => "empty_schema",
            Self::InapplicableShape => "inapplicable_shape",
        })
    }
}

/// Which stage of the equivalence check found the divergence.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum MismatchKind {
    /// The two sides returned a different number of rows.
    Cardinality { original: usize, combined: usize },
    /// Same number of rows, different distinct values.
    ///
    /// `original_misses` holds values present in the original result but
    /// absent from the combined one, `combined_misses` the reverse.
    Content {
        original_misses: BTreeSet<Option<String>>,
        combined_misses: BTreeSet<Option<String>>,
    },
}

/// A confirmed divergence between two logically equivalent executions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogicBugReport {
    /// The unpartitioned query.
    pub original_query: String,
    /// Every statement executed to reconstruct the original result.
    pub reconstructed_queries: Vec<String>,
    pub mismatch: MismatchKind,
}

impl LogicBugReport {
    /// The reconstructed statements joined the way they are written to the log.
    #[must_use]
    pub fn combined_text(&self) -> String {
        self.reconstructed_queries.join(";")
    }

    /// Stable identifier for deduplicating reports across sessions.
    ///
    /// SHA-256 over the original query and the reconstructed statements.
    #[must_use]
    pub fn fingerprint(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.original_query.as_bytes());
        for query in &self.reconstructed_queries {
            hasher.update([0_u8]);
            hasher.update(query.as_bytes());
        }
        let digest = hasher.finalize();
        let mut hex = String::with_capacity(digest.len() * 2);
        for byte in digest {
            use std::fmt::Write as _;
            let _ = write!(hex, "{byte:02x}");
        }
        hex
    }
}

impl fmt::Display for LogicBugReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.mismatch {
            MismatchKind::Cardinality { original, combined } => write!(
                f,
                "the size of the result sets mismatch ({original} and {combined})!\n{}; -- cardinality: {original}\n{}; -- cardinality: {combined}",
                self.original_query,
                self.combined_text()
            ),
            MismatchKind::Content {
                original_misses,
                combined_misses,
            } => write!(
                f,
                "the content of the result sets mismatch!\n{}; -- misses: {}\n{}; -- misses: {}",
                self.original_query,
                format_value_set(original_misses),
                self.combined_text(),
                format_value_set(combined_misses)
            ),
        }
    }
}

/// Render a value set as `[a, b, NULL]`.
#[must_use]
pub fn format_value_set(values: &BTreeSet<Option<String>>) -> String {
    let rendered: Vec<&str> = values
        .iter()
        .map(|v| v.as_deref().unwrap_or("NULL"))
        .collect();
    format!("[{}]", rendered.join(", "))
}

/// Primary error type for oracle rounds and their setup.
#[derive(Error, Debug)]
pub enum OracleError {
    /// The round is inconclusive and should be retried.
    #[error("round skipped: {0}")]
    Skip(SkipReason),

    /// Two logically equivalent executions disagreed.
    #[error("logic bug: {0}")]
    LogicBug(Box<LogicBugReport>),

    /// The engine failed in a way the expected-error set does not cover.
    #[error("unexpected engine error for `{query}`: {}", .message.as_deref().unwrap_or("<no message>"))]
    UnexpectedEngineError {
        query: String,
        message: Option<String>,
    },

    /// The API was called with an absent or malformed argument.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// Configuration could not be loaded or failed validation.
    #[error("configuration error: {0}")]
    Config(String),

    /// Connection setup or another non-round engine failure.
    #[error("engine error: {0}")]
    Engine(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Internal contract violation (should never happen).
    #[error("internal error: {0}")]
    Internal(String),
}

impl OracleError {
    /// Create a skip signal.
    pub const fn skip(reason: SkipReason) -> Self {
        Self::Skip(reason)
    }

    /// Create an unexpected-engine-error failure.
    pub fn unexpected(query: impl Into<String>, message: Option<String>) -> Self {
        Self::UnexpectedEngineError {
            query: query.into(),
            message,
        }
    }

    /// Create an invalid-argument error.
    pub fn invalid_argument(detail: impl Into<String>) -> Self {
        Self::InvalidArgument(detail.into())
    }

    /// Create a configuration error.
    pub fn config(detail: impl Into<String>) -> Self {
        Self::Config(detail.into())
    }

    /// Create an internal error.
    pub fn internal(detail: impl Into<String>) -> Self {
        Self::Internal(detail.into())
    }

    /// Wrap a report as a logic-bug failure.
    pub fn logic_bug(report: LogicBugReport) -> Self {
        Self::LogicBug(Box::new(report))
    }

    /// Whether this is a skip signal.
    pub const fn is_skip(&self) -> bool {
        matches!(self, Self::Skip(_))
    }

    /// Whether this is a logic bug.
    pub const fn is_logic_bug(&self) -> bool {
        matches!(self, Self::LogicBug(_))
    }

    /// Whether this must terminate the enclosing session.
    ///
    /// Everything except a skip signal is fatal.
    pub const fn is_fatal(&self) -> bool {
        !self.is_skip()
    }

    /// The skip reason, if this is a skip signal.
    pub const fn skip_reason(&self) -> Option<SkipReason> {
        match self {
            Self::Skip(reason) => Some(*reason),
            _ => None,
        }
    }
}

/// Result type alias using `OracleError`.
pub type Result<T> = std::result::Result<T, OracleError>;

#[cfg(test)]
mod tests {
    use super::*;

    fn cardinality_report() -> LogicBugReport {
        LogicBugReport {
            original_query: "SELECT c0 FROM t0".to_owned(),
            reconstructed_queries: vec![
                "SELECT c0 FROM t0 WHERE c0 > 1 UNION ALL SELECT c0 FROM t0 WHERE NOT (c0 > 1) UNION ALL SELECT c0 FROM t0 WHERE (c0 > 1) IS NULL".to_owned(),
            ],
            mismatch: MismatchKind::Cardinality {
                original: 3,
                combined: 2,
            },
        }
    }

    #[test]
    fn skip_is_not_fatal() {
        let err = OracleError::skip(SkipReason::ExpectedError);
        assert!(err.is_skip());
        assert!(!err.is_fatal());
        assert_eq!(err.skip_reason(), Some(SkipReason::ExpectedError));
    }

    #[test]
    fn bug_and_unexpected_are_fatal() {
        assert!(OracleError::logic_bug(cardinality_report()).is_fatal());
        assert!(OracleError::unexpected("SELECT 1", None).is_fatal());
        assert!(OracleError::invalid_argument("message").is_fatal());
    }

    #[test]
    fn unexpected_error_display_without_message() {
        let err = OracleError::unexpected("SELECT 1", None);
        assert_eq!(
            err.to_string(),
            "unexpected engine error for `SELECT 1`: <no message>"
        );
    }

    #[test]
    fn cardinality_display_names_both_sizes() {
        let text = cardinality_report().to_string();
        assert!(text.contains("(3 and 2)"));
        assert!(text.contains("SELECT c0 FROM t0; -- cardinality: 3"));
        assert!(text.contains("-- cardinality: 2"));
    }

    #[test]
    fn content_display_lists_misses() {
        let report = LogicBugReport {
            original_query: "SELECT c0 FROM t0".to_owned(),
            reconstructed_queries: vec!["q1".to_owned(), "q2".to_owned(), "q3".to_owned()],
            mismatch: MismatchKind::Content {
                original_misses: BTreeSet::from([Some("2".to_owned())]),
                combined_misses: BTreeSet::from([None, Some("5".to_owned())]),
            },
        };
        let text = report.to_string();
        assert!(text.contains("SELECT c0 FROM t0; -- misses: [2]"));
        assert!(text.contains("q1;q2;q3; -- misses: [NULL, 5]"));
    }

    #[test]
    fn fingerprint_is_stable_and_input_sensitive() {
        let report = cardinality_report();
        assert_eq!(report.fingerprint(), cardinality_report().fingerprint());
        assert_eq!(report.fingerprint().len(), 64);

        let other = LogicBugReport {
            original_query: "SELECT c1 FROM t0".to_owned(),
            ..cardinality_report()
        };
        assert_ne!(report.fingerprint(), other.fingerprint());
    }

    #[test]
    fn report_json_roundtrip() {
        let report = cardinality_report();
        let json = serde_json::to_string(&report).expect("serialize");
        assert!(json.contains("\"kind\":\"cardinality\""));
        let back: LogicBugReport = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(back, report);
    }
}
