//! Equivalence check between an original result and its reconstruction.
//!
//! Cardinality is compared first and short-circuits. Only when both sides
//! have the same number of rows are the distinct-value sets compared.
//! Duplicate distributions are not compared once cardinalities agree.

use std::collections::BTreeSet;

use tracing::{error, warn};

use partcheck_error::{LogicBugReport, MismatchKind, OracleError, Result, format_value_set};

use crate::query::ResultProjection;
use crate::session::SessionContext;

/// Assert that `first` (from `original_query`) and `second` (from the
/// `reconstructed` statements) agree.
///
/// # Errors
///
/// `LogicBug` if the cardinalities differ or, with equal cardinalities, the
/// distinct-value sets differ.
pub fn assume_result_sets_are_equal(
    first: &ResultProjection,
    second: &ResultProjection,
    original_query: &str,
    reconstructed: &[String],
    session: &mut SessionContext,
) -> Result<()> {
    compare(first, second, original_query, reconstructed, session)
}

/// Like [`assume_result_sets_are_equal`], mapping every value through
/// `canonicalize` on both sides first.
///
/// # Errors
///
/// See [`assume_result_sets_are_equal`].
pub fn assume_result_sets_are_equal_with<F>(
    first: &ResultProjection,
    second: &ResultProjection,
    original_query: &str,
    reconstructed: &[String],
    session: &mut SessionContext,
    canonicalize: F,
) -> Result<()>
where
    F: Fn(Option<&str>) -> Option<String>,
{
    let first = first.canonicalized(&canonicalize);
    let second = second.canonicalized(&canonicalize);
    compare(&first, &second, original_query, reconstructed, session)
}

fn compare(
    first: &ResultProjection,
    second: &ResultProjection,
    original_query: &str,
    reconstructed: &[String],
    session: &mut SessionContext,
) -> Result<()> {
    let combined_text = reconstructed.join(";");

    if first.len() != second.len() {
        let original_stmt = format!("{original_query}; -- cardinality: {}", first.len());
        let combined_stmt = format!("{combined_text}; -- cardinality: {}", second.len());
        write_diagnostic(
            session,
            &format!(
                "-- {original_query};\n-- cardinality: {}\n\n\n-- {combined_text};\n-- cardinality: {}\n\n\n",
                first.len(),
                second.len()
            ),
        );
        session.record_statement(original_stmt);
        session.record_statement(combined_stmt);
        return Err(raise(LogicBugReport {
            original_query: original_query.to_owned(),
            reconstructed_queries: reconstructed.to_vec(),
            mismatch: MismatchKind::Cardinality {
                original: first.len(),
                combined: second.len(),
            },
        }));
    }

    let first_set: BTreeSet<&Option<String>> = first.iter().collect();
    let second_set: BTreeSet<&Option<String>> = second.iter().collect();
    if first_set == second_set {
        return Ok(());
    }

    let original_misses: BTreeSet<Option<String>> = first_set
        .difference(&second_set)
        .map(|v| (*v).clone())
        .collect();
    let combined_misses: BTreeSet<Option<String>> = second_set
        .difference(&first_set)
        .map(|v| (*v).clone())
        .collect();
    let original_rendered = format_value_set(&original_misses);
    let combined_rendered = format_value_set(&combined_misses);

    write_diagnostic(
        session,
        &format!(
            "-- {original_query};\n-- misses: {original_rendered}\n\n\n-- {combined_text};\n-- misses: {combined_rendered}\n\n\n"
        ),
    );
    session.record_statement(format!("{original_query}; -- misses: {original_rendered}"));
    session.record_statement(format!("{combined_text}; -- misses: {combined_rendered}"));

    Err(raise(LogicBugReport {
        original_query: original_query.to_owned(),
        reconstructed_queries: reconstructed.to_vec(),
        mismatch: MismatchKind::Content {
            original_misses,
            combined_misses,
        },
    }))
}

// The bug outranks a broken log: report the write failure and keep going.
fn write_diagnostic(session: &mut SessionContext, text: &str) {
    if let Err(err) = session.append_diagnostic(text) {
        warn!(error = %err, "failed to append mismatch diagnostic");
    }
}

fn raise(report: LogicBugReport) -> OracleError {
    error!(
        original = %report.original_query,
        fingerprint = %report.fingerprint(),
        "result sets mismatch"
    );
    OracleError::logic_bug(report)
}
