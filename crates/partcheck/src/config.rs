//! Harness configuration: session options and dialect profile.
//!
//! Loaded from TOML:
//!
//! ```toml
//! [session]
//! database_name = "db0"
//! seed = 42
//! rounds = 1000
//! oracles = ["where", "having"]
//!
//! [dialect]
//! name = "sqlite"
//! bare_union = true
//! expected_errors = ["misuse of aggregate"]
//! expected_error_patterns = ["no such (table|column)"]
//! ```
//!
//! Every field has a default, so an empty document yields
//! [`HarnessConfig::default`].

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use partcheck_error::{OracleError, Result};

use crate::expected_errors::ExpectedErrors;
use crate::oracle::OracleKind;

/// Errors every SQLite round may raise without indicating a bug.
const SQLITE_EXPECTED_ERRORS: &[&str] = &[
    "misuse of aggregate",
    "misuse of window function",
    "integer overflow",
    "ambiguous column name",
    "GROUP BY term out of range",
    "ORDER BY term out of range",
    "a GROUP BY clause is required before HAVING",
    "HAVING clause on a non-aggregate query",
    "aggregate functions are not allowed in the GROUP BY clause",
    "Expression tree is too large",
    "parser stack overflow",
    "string or blob too big",
    "too many terms in compound SELECT",
    "wrong number of arguments to function",
];

const SQLITE_EXPECTED_PATTERNS: &[&str] = &["no such (table|column|function)"];

/// Per-session options.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionOptions {
    pub database_name: String,
    pub seed: u64,
    /// Oracle rounds to run; skipped rounds count.
    pub rounds: u64,
    /// Number of sessions run side by side, each on its own connection.
    pub sessions: usize,
    /// Tables created by a generated database.
    pub tables: usize,
    /// Record every query to the session's current log before execution.
    pub log_each_select: bool,
    /// Oracles cycled through round-robin.
    pub oracles: Vec<OracleKind>,
    pub max_expression_depth: usize,
    /// Where session logs and bug reports go; `None` discards them.
    pub log_dir: Option<PathBuf>,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            database_name: "db0".to_owned(),
            seed: 0,
            rounds: 100,
            sessions: 1,
            tables: 2,
            log_each_select: false,
            oracles: OracleKind::ALL.to_vec(),
            max_expression_depth: 2,
            log_dir: None,
        }
    }
}

impl SessionOptions {
    /// Options for the `index`-th of several parallel sessions.
    ///
    /// Each worker gets its own database name and seed so logs and replays
    /// never collide. A single session keeps the configured values.
    #[must_use]
    pub fn for_worker(&self, index: usize) -> Self {
        if self.sessions <= 1 {
            return Self {
                sessions: 1,
                ..self.clone()
            };
        }
        Self {
            database_name: format!("{}-{index}", self.database_name),
            seed: derive_worker_seed(self.seed, index as u64),
            sessions: 1,
            ..self.clone()
        }
    }
}

fn derive_worker_seed(seed: u64, worker: u64) -> u64 {
    // SplitMix64 finalizer.
    let mut x = seed ^ (worker << 1);
    x = x.wrapping_add(0x9E37_79B9_7F4A_7C15);
    x = (x ^ (x >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
    x = (x ^ (x >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
    x ^ (x >> 31)
}

/// Dialect-specific knobs shared by every oracle of a session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DialectProfile {
    pub name: String,
    /// The engine accepts `q1 UNION q2 UNION q3` for duplicate elimination.
    pub bare_union: bool,
    /// The engine accepts `UNION ALL` between components carrying ORDER BY.
    pub union_all_in_order_by_context: bool,
    /// Fold `-0`/`-0.0` into their positive forms before comparing.
    pub canonicalize_negative_zero: bool,
    /// Substrings of benign engine error messages.
    pub expected_errors: Vec<String>,
    /// Regular expressions over benign engine error messages.
    pub expected_error_patterns: Vec<String>,
}

impl Default for DialectProfile {
    fn default() -> Self {
        Self::sqlite()
    }
}

impl DialectProfile {
    /// Built-in SQLite profile.
    #[must_use]
    pub fn sqlite() -> Self {
        Self {
            name: "sqlite".to_owned(),
            bare_union: true,
            union_all_in_order_by_context: false,
            canonicalize_negative_zero: true,
            expected_errors: SQLITE_EXPECTED_ERRORS
                .iter()
                .map(|s| (*s).to_owned())
                .collect(),
            expected_error_patterns: SQLITE_EXPECTED_PATTERNS
                .iter()
                .map(|s| (*s).to_owned())
                .collect(),
        }
    }

    /// Compile the profile's matchers into an expected-error set.
    ///
    /// # Errors
    ///
    /// `InvalidArgument` for an empty literal or a pattern that does not compile.
    pub fn expected_errors(&self) -> Result<ExpectedErrors> {
        let mut errors = ExpectedErrors::new();
        errors.extend(self.expected_errors.iter().cloned())?;
        errors.extend_regex(self.expected_error_patterns.iter().map(String::as_str))?;
        Ok(errors)
    }
}

/// Root of the configuration document.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HarnessConfig {
    pub session: SessionOptions,
    pub dialect: DialectProfile,
}

impl HarnessConfig {
    /// Parse and validate a TOML document.
    ///
    /// # Errors
    ///
    /// `Config` on parse or validation failure.
    pub fn from_toml_str(raw: &str) -> Result<Self> {
        let config: Self = toml::from_str(raw)
            .map_err(|err| OracleError::config(format!("config_parse_failed error={err}")))?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse and validate a TOML file.
    ///
    /// # Errors
    ///
    /// `Config` if the file cannot be read, parsed or validated.
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path).map_err(|err| {
            OracleError::config(format!(
                "config_read_failed path={} error={err}",
                path.display()
            ))
        })?;
        Self::from_toml_str(&raw)
    }

    /// Check cross-field constraints.
    ///
    /// # Errors
    ///
    /// `Config` naming the first offending field.
    pub fn validate(&self) -> Result<()> {
        let session = &self.session;
        if session.database_name.trim().is_empty() {
            return Err(OracleError::config("session.database_name must be non-empty"));
        }
        if session.oracles.is_empty() {
            return Err(OracleError::config("session.oracles must name at least one oracle"));
        }
        if session.sessions == 0 {
            return Err(OracleError::config("session.sessions must be at least 1"));
        }
        if session.tables == 0 {
            return Err(OracleError::config("session.tables must be at least 1"));
        }
        if session.max_expression_depth == 0 {
            return Err(OracleError::config(
                "session.max_expression_depth must be at least 1",
            ));
        }
        if self.dialect.name.trim().is_empty() {
            return Err(OracleError::config("dialect.name must be non-empty"));
        }
        self.dialect
            .expected_errors()
            .map_err(|err| OracleError::config(format!("dialect expected errors: {err}")))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_document_is_default() {
        let config = HarnessConfig::from_toml_str("").expect("parse");
        assert_eq!(config, HarnessConfig::default());
        assert_eq!(config.dialect.name, "sqlite");
        assert_eq!(config.session.oracles, OracleKind::ALL);
    }

    #[test]
    fn full_document_parses() {
        let raw = r#"
            [session]
            database_name = "fuzz"
            seed = 42
            rounds = 1000
            sessions = 4
            tables = 3
            log_each_select = true
            oracles = ["where", "group_by", "aggregate"]
            max_expression_depth = 3

            [dialect]
            name = "duck"
            bare_union = false
            union_all_in_order_by_context = true
            canonicalize_negative_zero = false
            expected_errors = ["Conversion Error"]
            expected_error_patterns = ["Binder Error: .*"]
        "#;
        let config = HarnessConfig::from_toml_str(raw).expect("parse");
        assert_eq!(config.session.seed, 42);
        assert_eq!(
            config.session.oracles,
            [OracleKind::Where, OracleKind::GroupBy, OracleKind::Aggregate]
        );
        assert!(!config.dialect.bare_union);
        let errors = config.dialect.expected_errors().expect("compile");
        assert!(errors.matches("Binder Error: column c9 not found"));
        assert!(errors.matches("Conversion Error: bad"));
        assert!(!errors.matches("Catalog Error"));
    }

    #[test]
    fn bad_pattern_is_a_config_error() {
        let raw = r#"
            [dialect]
            expected_error_patterns = ["(unclosed"]
        "#;
        assert!(matches!(
            HarnessConfig::from_toml_str(raw),
            Err(OracleError::Config(_))
        ));
    }

    #[test]
    fn blank_expected_error_fails_loading() {
        let raw = r#"
            [dialect]
            expected_errors = ["misuse of aggregate", ""]
        "#;
        let err = HarnessConfig::from_toml_str(raw).unwrap_err();
        assert!(matches!(err, OracleError::Config(_)), "{err:?}");
        assert!(err.to_string().contains("literal must be non-empty"));
    }

    #[test]
    fn empty_oracle_list_is_rejected() {
        let raw = "[session]\noracles = []\n";
        let err = HarnessConfig::from_toml_str(raw).unwrap_err();
        assert!(err.to_string().contains("session.oracles"));
    }

    #[test]
    fn unknown_oracle_fails_to_parse() {
        let raw = "[session]\noracles = [\"norec\"]\n";
        assert!(matches!(
            HarnessConfig::from_toml_str(raw),
            Err(OracleError::Config(_))
        ));
    }

    #[test]
    fn workers_get_distinct_names_and_seeds() {
        let options = SessionOptions {
            sessions: 3,
            seed: 10,
            ..SessionOptions::default()
        };
        let first = options.for_worker(0);
        let second = options.for_worker(1);
        assert_eq!(second.database_name, "db0-1");
        assert_ne!(first.seed, second.seed);
        assert_eq!(second.seed, options.for_worker(1).seed);
        assert_eq!(second.sessions, 1);

        let single = SessionOptions::default().for_worker(0);
        assert_eq!(single.database_name, "db0");
    }

    #[test]
    fn load_reads_file() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("partcheck.toml");
        std::fs::write(&path, "[session]\nrounds = 7\n").expect("write");
        assert_eq!(HarnessConfig::load(&path).expect("load").session.rounds, 7);
        assert!(HarnessConfig::load(&dir.path().join("missing.toml")).is_err());
    }

    #[test]
    fn sqlite_profile_recognizes_benign_errors() {
        let errors = DialectProfile::sqlite().expected_errors().expect("compile");
        assert!(errors.matches("misuse of aggregate: MAX()"));
        assert!(errors.matches("no such column: c9"));
        assert!(!errors.matches("database disk image is malformed"));
    }
}
