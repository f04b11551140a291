//! Result collector: execute a query and project its first column.

use tracing::debug;

use partcheck_error::{OracleError, Result, SkipReason};

use crate::canonical::strip_trailing_fraction_zeros;
use crate::engine::{EngineError, QueryOutput, SqlConnection};
use crate::expected_errors::ExpectedErrors;
use crate::query::{Query, ResultProjection};
use crate::session::SessionContext;

/// Execute `sql` and return the first column of every row.
///
/// Trailing fractional zeros are stripped from each value so `"2.00"` and
/// `"2"` compare equal; NULL stays `None`.
///
/// # Errors
///
/// * `Skip(NoResultSet)` if the statement returns no result set.
/// * `Skip(ExpectedError)` if the engine fails with an expected message.
/// * `Skip(ValueConversion)` if the driver cannot convert a value.
/// * `UnexpectedEngineError` if the engine fails with no message or an
///   unlisted one.
/// * `Io` if the session log cannot be written.
pub fn collect_first_column<C>(
    sql: &str,
    errors: &ExpectedErrors,
    conn: &mut C,
    session: &mut SessionContext,
) -> Result<ResultProjection>
where
    C: SqlConnection + ?Sized,
{
    session.record_query(sql)?;
    debug!(sql = %sql, "collecting first column");

    match conn.query_first_column(sql) {
        Ok(QueryOutput::Rows(values)) => Ok(values
            .into_iter()
            .map(|v| v.map(|s| strip_trailing_fraction_zeros(&s)))
            .collect::<Vec<_>>()
            .into()),
        Ok(QueryOutput::NoResultSet) => Err(OracleError::skip(SkipReason::NoResultSet)),
        Err(err) => Err(classify_failure(sql, errors, err)),
    }
}

/// [`collect_first_column`] for a [`Query`] unit.
///
/// # Errors
///
/// See [`collect_first_column`].
pub fn collect_query<C>(
    query: &Query<'_>,
    conn: &mut C,
    session: &mut SessionContext,
) -> Result<ResultProjection>
where
    C: SqlConnection + ?Sized,
{
    collect_first_column(&query.text, query.expected_errors, conn, session)
}

/// Execute a statement whose output is not inspected (DDL, DML).
///
/// Returns `Ok(true)` when it ran, `Ok(false)` when it failed with an
/// expected error. Successful statements are recorded for replay.
///
/// # Errors
///
/// `UnexpectedEngineError` for any other failure, `Io` for log failures.
pub fn execute_statement<C>(
    query: &Query<'_>,
    conn: &mut C,
    session: &mut SessionContext,
) -> Result<bool>
where
    C: SqlConnection + ?Sized,
{
    session.record_query(&query.text)?;
    match conn.execute(&query.text) {
        Ok(()) => {
            session.record_statement(query.text.clone());
            Ok(true)
        }
        Err(err) => match classify_failure(&query.text, query.expected_errors, err) {
            OracleError::Skip(_) => {
                debug!(sql = %query.text, "statement failed with an expected error");
                Ok(false)
            }
            other => Err(other),
        },
    }
}

fn classify_failure(sql: &str, errors: &ExpectedErrors, err: EngineError) -> OracleError {
    match err {
        EngineError::Conversion(_) => OracleError::skip(SkipReason::ValueConversion),
        EngineError::NoMessage => OracleError::unexpected(sql, None),
        EngineError::Message(message) => {
            if errors.matches(&message) {
                debug!(sql = %sql, error = %message, "engine error is expected");
                OracleError::skip(SkipReason::ExpectedError)
            } else {
                OracleError::unexpected(sql, Some(message))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::TableSchema;
    use crate::session::LogSink;
    use std::io;
    use std::sync::{Arc, Mutex};

    /// Replays canned outputs in order.
    struct Scripted(Vec<std::result::Result<QueryOutput, EngineError>>);

    impl SqlConnection for Scripted {
        fn query_first_column(
            &mut self,
            _sql: &str,
        ) -> std::result::Result<QueryOutput, EngineError> {
            self.0.remove(0)
        }

        fn execute(&mut self, _sql: &str) -> std::result::Result<(), EngineError> {
            self.0.remove(0).map(|_| ())
        }

        fn introspect_tables(&mut self) -> std::result::Result<Vec<TableSchema>, EngineError> {
            Ok(Vec::new())
        }
    }

    fn errors() -> ExpectedErrors {
        ExpectedErrors::from_literals(["integer overflow"]).unwrap()
    }

    #[test]
    fn rows_are_normalized_and_nulls_kept() {
        let mut conn = Scripted(vec![Ok(QueryOutput::Rows(vec![
            Some("2.00".to_owned()),
            None,
            Some("abc".to_owned()),
        ]))]);
        let mut session = SessionContext::detached();
        let rows = collect_first_column("SELECT c0 FROM t0", &errors(), &mut conn, &mut session)
            .expect("rows");
        assert_eq!(
            rows.values(),
            [Some("2".to_owned()), None, Some("abc".to_owned())]
        );
    }

    #[test]
    fn no_result_set_skips() {
        let mut conn = Scripted(vec![Ok(QueryOutput::NoResultSet)]);
        let err = collect_first_column(
            "DELETE FROM t0",
            &errors(),
            &mut conn,
            &mut SessionContext::detached(),
        )
        .unwrap_err();
        assert_eq!(err.skip_reason(), Some(SkipReason::NoResultSet));
    }

    #[test]
    fn expected_message_skips() {
        let mut conn = Scripted(vec![Err(EngineError::Message(
            "runtime error: integer overflow".to_owned(),
        ))]);
        let err = collect_first_column(
            "SELECT 1",
            &errors(),
            &mut conn,
            &mut SessionContext::detached(),
        )
        .unwrap_err();
        assert_eq!(err.skip_reason(), Some(SkipReason::ExpectedError));
    }

    #[test]
    fn unlisted_message_fails_with_query_text() {
        let mut conn = Scripted(vec![Err(EngineError::Message("disk exploded".to_owned()))]);
        let err = collect_first_column(
            "SELECT c0 FROM t0",
            &errors(),
            &mut conn,
            &mut SessionContext::detached(),
        )
        .unwrap_err();
        match err {
            OracleError::UnexpectedEngineError { query, message } => {
                assert_eq!(query, "SELECT c0 FROM t0");
                assert_eq!(message.as_deref(), Some("disk exploded"));
            }
            other => panic!("expected unexpected-engine error, got {other:?}"),
        }
    }

    #[test]
    fn missing_message_fails() {
        let mut conn = Scripted(vec![Err(EngineError::NoMessage)]);
        let err = collect_first_column(
            "SELECT 1",
            &errors(),
            &mut conn,
            &mut SessionContext::detached(),
        )
        .unwrap_err();
        assert!(matches!(
            err,
            OracleError::UnexpectedEngineError { message: None, .. }
        ));
    }

    #[test]
    fn conversion_failure_skips() {
        let mut conn = Scripted(vec![Err(EngineError::Conversion("bad int".to_owned()))]);
        let err = collect_first_column(
            "SELECT 1",
            &errors(),
            &mut conn,
            &mut SessionContext::detached(),
        )
        .unwrap_err();
        assert_eq!(err.skip_reason(), Some(SkipReason::ValueConversion));
    }

    /// Query sink that stays readable after the session owns it.
    #[derive(Clone, Default)]
    struct SharedLog(Arc<Mutex<Vec<String>>>);

    impl LogSink for SharedLog {
        fn write_query(&mut self, sql: &str) -> io::Result<()> {
            self.0.lock().unwrap().push(sql.to_owned());
            Ok(())
        }

        fn write_diagnostic(&mut self, _text: &str) -> io::Result<()> {
            Ok(())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    /// Fails every query, remembering what the log held at that moment.
    struct LogWatcher {
        log: SharedLog,
        logged_at_execution: Vec<String>,
    }

    impl SqlConnection for LogWatcher {
        fn query_first_column(
            &mut self,
            _sql: &str,
        ) -> std::result::Result<QueryOutput, EngineError> {
            self.logged_at_execution = self.log.0.lock().unwrap().clone();
            Err(EngineError::NoMessage)
        }

        fn execute(&mut self, _sql: &str) -> std::result::Result<(), EngineError> {
            Err(EngineError::NoMessage)
        }

        fn introspect_tables(&mut self) -> std::result::Result<Vec<TableSchema>, EngineError> {
            Ok(Vec::new())
        }
    }

    #[test]
    fn logged_before_execution_when_enabled() {
        let log = SharedLog::default();
        let mut conn = LogWatcher {
            log: log.clone(),
            logged_at_execution: Vec::new(),
        };
        let mut session = SessionContext::new(Box::new(log.clone()), true, "db0", 0);
        let err = collect_first_column("SELECT 42", &errors(), &mut conn, &mut session)
            .unwrap_err();

        assert!(matches!(err, OracleError::UnexpectedEngineError { .. }));
        assert_eq!(conn.logged_at_execution, ["SELECT 42"]);
        assert_eq!(*log.0.lock().unwrap(), ["SELECT 42"]);
        assert!(session.repro().statements.is_empty());
    }

    #[test]
    fn nothing_logged_when_disabled() {
        let log = SharedLog::default();
        let mut conn = Scripted(vec![Ok(QueryOutput::Rows(Vec::new()))]);
        let mut session = SessionContext::new(Box::new(log.clone()), false, "db0", 0);
        collect_first_column("SELECT 42", &errors(), &mut conn, &mut session).expect("rows");
        assert!(log.0.lock().unwrap().is_empty());
    }

    #[test]
    fn statements_report_expected_failures_as_false() {
        let errs = errors();
        let mut conn = Scripted(vec![
            Ok(QueryOutput::NoResultSet),
            Err(EngineError::Message("integer overflow".to_owned())),
            Err(EngineError::Message("segfault".to_owned())),
        ]);
        let mut session = SessionContext::detached();
        let ok = Query::new("INSERT INTO t0 VALUES (1)", &errs);
        let overflow = Query::new("INSERT INTO t0 VALUES (9e999)", &errs);
        let crash = Query::new("INSERT INTO t0 VALUES (0)", &errs);

        assert!(execute_statement(&ok, &mut conn, &mut session).unwrap());
        assert!(!execute_statement(&overflow, &mut conn, &mut session).unwrap());
        assert!(execute_statement(&crash, &mut conn, &mut session).is_err());
        assert_eq!(session.repro().statements, ["INSERT INTO t0 VALUES (1)"]);
    }
}
