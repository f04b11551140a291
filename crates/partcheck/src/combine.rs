//! Combination strategies: turn the three partition queries into one result.

use tracing::debug;

use partcheck_error::{OracleError, Result};

use crate::collector::collect_first_column;
use crate::config::DialectProfile;
use crate::engine::SqlConnection;
use crate::expected_errors::ExpectedErrors;
use crate::query::ResultProjection;
use crate::session::SessionContext;

/// How duplicates across the three components are treated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CombinationMode {
    /// Multiset union (`UNION ALL` or concatenation).
    PreserveDuplicates,
    /// Set union.
    EliminateDuplicates,
}

/// The three partition queries and how to merge them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CombinedQuerySpec {
    pub components: [String; 3],
    pub mode: CombinationMode,
    /// Whether the components may be joined into one statement. Components
    /// carrying ORDER BY usually may not.
    pub single_statement: bool,
}

impl CombinedQuerySpec {
    #[must_use]
    pub fn new(components: [String; 3], mode: CombinationMode, single_statement: bool) -> Self {
        Self {
            components,
            mode,
            single_statement,
        }
    }

    /// `q1 UNION ALL q2 UNION ALL q3`
    #[must_use]
    pub fn union_all_text(&self) -> String {
        self.components.join(" UNION ALL ")
    }

    /// The duplicate-eliminating statement for a dialect.
    #[must_use]
    pub fn distinct_text(&self, bare_union: bool) -> String {
        if bare_union {
            self.components.join(" UNION ")
        } else {
            format!("SELECT DISTINCT * FROM ({})", self.union_all_text())
        }
    }
}

/// Execute `spec` and return the merged first column.
///
/// Every statement text executed is pushed onto `reconstructed`, in order.
///
/// # Errors
///
/// Whatever the collector raises for a component, and `Internal` when
/// duplicate elimination is requested without a single statement.
pub fn combine<C>(
    spec: &CombinedQuerySpec,
    dialect: &DialectProfile,
    errors: &ExpectedErrors,
    conn: &mut C,
    session: &mut SessionContext,
    reconstructed: &mut Vec<String>,
) -> Result<ResultProjection>
where
    C: SqlConnection + ?Sized,
{
    match (spec.mode, spec.single_statement) {
        (CombinationMode::PreserveDuplicates, true) => {
            let text = spec.union_all_text();
            reconstructed.push(text.clone());
            collect_first_column(&text, errors, conn, session)
        }
        (CombinationMode::PreserveDuplicates, false) => {
            debug!("combining partitions by concatenation");
            let mut combined = ResultProjection::default();
            for component in &spec.components {
                reconstructed.push(component.clone());
                combined.append(collect_first_column(component, errors, conn, session)?);
            }
            Ok(combined)
        }
        (CombinationMode::EliminateDuplicates, true) => {
            let text = spec.distinct_text(dialect.bare_union);
            reconstructed.push(text.clone());
            collect_first_column(&text, errors, conn, session)
        }
        (CombinationMode::EliminateDuplicates, false) => Err(OracleError::internal(
            "duplicate elimination requires a single combined statement",
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::SqliteConnection;

    fn seeded() -> SqliteConnection {
        let mut conn = SqliteConnection::open_in_memory().expect("open");
        conn.execute(
            "CREATE TABLE t0(c0 INTEGER);
             INSERT INTO t0 VALUES (1), (1), (2), (NULL);",
        )
        .expect("seed");
        conn
    }

    fn spec(mode: CombinationMode, single_statement: bool) -> CombinedQuerySpec {
        CombinedQuerySpec::new(
            [
                "SELECT c0 FROM t0 WHERE c0 = 1".to_owned(),
                "SELECT c0 FROM t0 WHERE NOT (c0 = 1)".to_owned(),
                "SELECT c0 FROM t0 WHERE (c0 = 1) IS NULL".to_owned(),
            ],
            mode,
            single_statement,
        )
    }

    fn sorted(projection: ResultProjection) -> Vec<Option<String>> {
        let mut values = projection.into_values();
        values.sort();
        values
    }

    #[test]
    fn union_all_keeps_duplicates_in_one_round_trip() {
        let mut conn = seeded();
        let mut session = SessionContext::detached();
        let mut reconstructed = Vec::new();
        let rows = combine(
            &spec(CombinationMode::PreserveDuplicates, true),
            &DialectProfile::sqlite(),
            &ExpectedErrors::new(),
            &mut conn,
            &mut session,
            &mut reconstructed,
        )
        .expect("combine");
        assert_eq!(rows.len(), 4);
        assert_eq!(reconstructed.len(), 1);
        assert!(reconstructed[0].contains(" UNION ALL "));
    }

    #[test]
    fn concatenation_matches_union_all() {
        let mut conn = seeded();
        let mut session = SessionContext::detached();
        let mut single = Vec::new();
        let mut split = Vec::new();
        let dialect = DialectProfile::sqlite();
        let errors = ExpectedErrors::new();
        let a = combine(
            &spec(CombinationMode::PreserveDuplicates, true),
            &dialect,
            &errors,
            &mut conn,
            &mut session,
            &mut single,
        )
        .expect("union all");
        let b = combine(
            &spec(CombinationMode::PreserveDuplicates, false),
            &dialect,
            &errors,
            &mut conn,
            &mut session,
            &mut split,
        )
        .expect("concat");
        assert_eq!(sorted(a), sorted(b));
        assert_eq!(split.len(), 3);
        assert_eq!(split[1], "SELECT c0 FROM t0 WHERE NOT (c0 = 1)");
    }

    #[test]
    fn elimination_uses_bare_union_or_distinct_wrapper() {
        let s = spec(CombinationMode::EliminateDuplicates, true);
        assert_eq!(
            s.distinct_text(true),
            "SELECT c0 FROM t0 WHERE c0 = 1 UNION SELECT c0 FROM t0 WHERE NOT (c0 = 1) UNION SELECT c0 FROM t0 WHERE (c0 = 1) IS NULL"
        );
        assert!(s.distinct_text(false).starts_with("SELECT DISTINCT * FROM (SELECT c0"));

        for bare_union in [true, false] {
            let mut conn = seeded();
            let dialect = DialectProfile {
                bare_union,
                ..DialectProfile::sqlite()
            };
            let rows = combine(
                &s,
                &dialect,
                &ExpectedErrors::new(),
                &mut conn,
                &mut SessionContext::detached(),
                &mut Vec::new(),
            )
            .expect("combine");
            assert_eq!(
                sorted(rows),
                [None, Some("1".to_owned()), Some("2".to_owned())]
            );
        }
    }

    #[test]
    fn elimination_without_single_statement_is_internal_error() {
        let mut conn = seeded();
        let err = combine(
            &spec(CombinationMode::EliminateDuplicates, false),
            &DialectProfile::sqlite(),
            &ExpectedErrors::new(),
            &mut conn,
            &mut SessionContext::detached(),
            &mut Vec::new(),
        )
        .unwrap_err();
        assert!(matches!(err, OracleError::Internal(_)));
    }
}
