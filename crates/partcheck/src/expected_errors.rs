//! Expected-error classifier.
//!
//! Engines under test reject plenty of randomly generated SQL for reasons
//! that have nothing to do with logic bugs (type errors, overflow, misuse of
//! aggregates, known crashes). Each oracle carries a whitelist of those
//! messages; a runtime error is benign iff its text contains one of the
//! literals or one of the patterns finds a match in it.

use std::collections::BTreeSet;

use partcheck_error::{OracleError, Result};
use regex::Regex;

/// Append-only set of benign error literals and patterns.
///
/// Membership is order independent: the first matcher to hit is irrelevant,
/// only whether any does.
#[derive(Debug, Clone, Default)]
pub struct ExpectedErrors {
    literals: BTreeSet<String>,
    patterns: Vec<Regex>,
}

impl ExpectedErrors {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Start a builder.
    #[must_use]
    pub fn builder() -> ExpectedErrorsBuilder {
        ExpectedErrorsBuilder::default()
    }

    /// Build a set from literals only.
    ///
    /// # Errors
    ///
    /// Returns `InvalidArgument` if any literal is empty.
    pub fn from_literals<I, S>(literals: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::builder().with(literals).build()
    }

    /// Add a substring matcher.
    ///
    /// An empty literal is rejected rather than stored. As a substring it
    /// would match every message, so a blank entry in a configured dialect
    /// list fails loading instead of turning every engine error into a skip.
    /// Use [`add_regex`](Self::add_regex) with `.` to accept all messages on
    /// purpose.
    ///
    /// # Errors
    ///
    /// Returns `InvalidArgument` for an empty literal.
    pub fn add(&mut self, literal: impl Into<String>) -> Result<&mut Self> {
        let literal = literal.into();
        if literal.is_empty() {
            return Err(OracleError::invalid_argument(
                "expected-error literal must be non-empty",
            ));
        }
        self.literals.insert(literal);
        Ok(self)
    }

    /// Add a pattern matcher; the pattern may match anywhere in the message.
    ///
    /// # Errors
    ///
    /// Returns `InvalidArgument` if the pattern is empty or does not compile.
    pub fn add_regex(&mut self, pattern: &str) -> Result<&mut Self> {
        if pattern.is_empty() {
            return Err(OracleError::invalid_argument(
                "expected-error pattern must be non-empty",
            ));
        }
        let compiled = Regex::new(pattern).map_err(|err| {
            OracleError::invalid_argument(format!("bad expected-error pattern {pattern:?}: {err}"))
        })?;
        self.patterns.push(compiled);
        Ok(self)
    }

    /// Add an already compiled pattern.
    pub fn add_compiled(&mut self, pattern: Regex) -> &mut Self {
        self.patterns.push(pattern);
        self
    }

    /// Add every literal in `literals`.
    ///
    /// # Errors
    ///
    /// Stops at the first empty literal with `InvalidArgument`.
    pub fn extend<I, S>(&mut self, literals: I) -> Result<&mut Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        for literal in literals {
            self.add(literal)?;
        }
        Ok(self)
    }

    /// Add every pattern in `patterns`.
    ///
    /// # Errors
    ///
    /// Stops at the first pattern that fails to compile.
    pub fn extend_regex<I, S>(&mut self, patterns: I) -> Result<&mut Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        for pattern in patterns {
            self.add_regex(pattern.as_ref())?;
        }
        Ok(self)
    }

    /// Merge another set into this one.
    pub fn merge(&mut self, other: &Self) -> &mut Self {
        self.literals.extend(other.literals.iter().cloned());
        self.patterns.extend(other.patterns.iter().cloned());
        self
    }

    /// Checked classifier entry point.
    ///
    /// # Errors
    ///
    /// Returns `InvalidArgument` when `message` is absent.
    pub fn error_is_expected(&self, message: Option<&str>) -> Result<bool> {
        let message = message.ok_or_else(|| {
            OracleError::invalid_argument("error message to classify must be present")
        })?;
        Ok(self.matches(message))
    }

    /// Whether `message` contains any literal or matches any pattern.
    #[must_use]
    pub fn matches(&self, message: &str) -> bool {
        self.literals.iter().any(|lit| message.contains(lit.as_str()))
            || self.patterns.iter().any(|re| re.is_match(message))
    }

    /// Total number of matchers.
    #[must_use]
    pub fn len(&self) -> usize {
        self.literals.len() + self.patterns.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.literals.is_empty() && self.patterns.is_empty()
    }
}

/// Collects literals and patterns, validating them all in [`Self::build`].
#[derive(Debug, Clone, Default)]
pub struct ExpectedErrorsBuilder {
    literals: Vec<String>,
    patterns: Vec<String>,
}

impl ExpectedErrorsBuilder {
    #[must_use]
    pub fn with<I, S>(mut self, literals: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.literals.extend(literals.into_iter().map(Into::into));
        self
    }

    #[must_use]
    pub fn with_regex<I, S>(mut self, patterns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.patterns.extend(patterns.into_iter().map(Into::into));
        self
    }

    /// Validate and compile.
    ///
    /// # Errors
    ///
    /// Returns `InvalidArgument` for an empty literal or a bad pattern.
    pub fn build(self) -> Result<ExpectedErrors> {
        let mut errors = ExpectedErrors::new();
        errors.extend(self.literals)?;
        errors.extend_regex(self.patterns)?;
        Ok(errors)
    }
}
