//! Session runner: setup, rounds, and parallel sessions.
//!
//! A session owns one connection, one shape source and one
//! [`SessionContext`]. It runs the configured oracles round-robin until the
//! round budget is spent or a round ends in a bug or an unexpected failure.
//! Parallel sessions share nothing; each runs on its own scoped thread.

use std::collections::BTreeMap;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};

use partcheck_error::{LogicBugReport, OracleError, Result};

use crate::collector::execute_statement;
use crate::config::{DialectProfile, HarnessConfig, SessionOptions};
use crate::engine::SqlConnection;
use crate::oracle::{CompositeOracle, RoundOutcome, run_round};
use crate::query::Query;
use crate::session::{FileLog, LogSink, NullLog, ReproState, SessionContext, write_report_json};
use crate::shape::{RandomShapeSource, SetupStatement, ShapeSource};

/// How a session ended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum SessionOutcome {
    /// Every round ran without a bug or failure.
    Completed,
    LogicBug {
        report: LogicBugReport,
        /// JSON copy of the report, when a log directory is configured.
        report_path: Option<PathBuf>,
    },
    Failed { message: String },
}

/// Per-session counters and the final verdict.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionSummary {
    pub database_name: String,
    pub seed: u64,
    pub rounds_run: u64,
    pub passed: u64,
    pub skipped: u64,
    /// Skip counts keyed by reason tag.
    pub skip_reasons: BTreeMap<String, u64>,
    pub outcome: SessionOutcome,
    pub repro: ReproState,
}

impl SessionSummary {
    #[must_use]
    pub fn found_bug(&self) -> bool {
        matches!(self.outcome, SessionOutcome::LogicBug { .. })
    }

    #[must_use]
    pub fn completed(&self) -> bool {
        matches!(self.outcome, SessionOutcome::Completed)
    }
}

/// Run a session over an already populated database plus `setup`.
///
/// # Errors
///
/// Setup failures: uncompilable expected errors, log files that cannot be
/// created, a setup statement failing unexpectedly, or schema introspection
/// failing. Round failures are reported in the summary instead.
pub fn run_session(
    options: &SessionOptions,
    dialect: &DialectProfile,
    conn: &mut dyn SqlConnection,
    setup: &[SetupStatement],
) -> Result<SessionSummary> {
    let mut source = RandomShapeSource::new(options.seed, options.max_expression_depth);
    run_with_source(options, dialect, conn, &mut source, setup)
}

/// Generate a random database from the session seed, then run the session.
///
/// # Errors
///
/// See [`run_session`].
pub fn run_generated_session(
    options: &SessionOptions,
    dialect: &DialectProfile,
    conn: &mut dyn SqlConnection,
) -> Result<SessionSummary> {
    let mut source = RandomShapeSource::new(options.seed, options.max_expression_depth);
    let setup = source.database_statements(options.tables);
    run_with_source(options, dialect, conn, &mut source, &setup)
}

/// Run a session with a caller-provided shape source.
///
/// # Errors
///
/// See [`run_session`].
pub fn run_with_source(
    options: &SessionOptions,
    dialect: &DialectProfile,
    conn: &mut dyn SqlConnection,
    source: &mut dyn ShapeSource,
    setup: &[SetupStatement],
) -> Result<SessionSummary> {
    let errors = dialect.expected_errors()?;
    let sink: Box<dyn LogSink> = match &options.log_dir {
        Some(dir) => Box::new(FileLog::create(dir, &options.database_name)?),
        None => Box::new(NullLog),
    };
    let mut session = SessionContext::new(
        sink,
        options.log_each_select,
        &options.database_name,
        options.seed,
    );
    session.set_database_version(conn.engine_version());

    source.refresh_schema(conn)?;
    let mut schema_changed = false;
    for statement in setup {
        let query = Query {
            text: statement.text.clone(),
            expected_errors: &errors,
            affects_schema: statement.affects_schema,
        };
        if execute_statement(&query, conn, &mut session)? && query.affects_schema {
            schema_changed = true;
        }
    }
    if schema_changed {
        source.refresh_schema(conn)?;
    }

    let mut oracle = CompositeOracle::from_kinds(&options.oracles, &errors, dialect)?;
    let mut summary = SessionSummary {
        database_name: options.database_name.clone(),
        seed: options.seed,
        rounds_run: 0,
        passed: 0,
        skipped: 0,
        skip_reasons: BTreeMap::new(),
        outcome: SessionOutcome::Completed,
        repro: ReproState::default(),
    };

    info!(
        database = %options.database_name,
        seed = options.seed,
        rounds = options.rounds,
        "session started"
    );
    for _ in 0..options.rounds {
        summary.rounds_run += 1;
        match run_round(&mut oracle, conn, source, &mut session) {
            RoundOutcome::Passed => summary.passed += 1,
            RoundOutcome::Skipped(reason) => {
                summary.skipped += 1;
                *summary.skip_reasons.entry(reason.to_string()).or_default() += 1;
            }
            RoundOutcome::Bug(report) => {
                let report_path = match &options.log_dir {
                    Some(dir) => match write_report_json(dir, &options.database_name, &report) {
                        Ok(path) => Some(path),
                        Err(err) => {
                            warn!(error = %err, "failed to write bug report");
                            None
                        }
                    },
                    None => None,
                };
                error!(
                    database = %options.database_name,
                    fingerprint = %report.fingerprint(),
                    "session stopped on logic bug"
                );
                summary.outcome = SessionOutcome::LogicBug {
                    report: *report,
                    report_path,
                };
                break;
            }
            RoundOutcome::Failed(err) => {
                error!(database = %options.database_name, error = %err, "session failed");
                summary.outcome = SessionOutcome::Failed {
                    message: err.to_string(),
                };
                break;
            }
        }
    }

    info!(
        database = %options.database_name,
        rounds = summary.rounds_run,
        passed = summary.passed,
        skipped = summary.skipped,
        "session finished"
    );
    summary.repro = session.into_repro();
    Ok(summary)
}

/// Run `config.session.sessions` generated sessions, one scoped thread and
/// one connection each. Summaries come back in worker order.
pub fn run_sessions_in_parallel<C, F>(
    config: &HarnessConfig,
    open_connection: F,
) -> Vec<Result<SessionSummary>>
where
    C: SqlConnection,
    F: Fn(&SessionOptions) -> Result<C> + Sync,
{
    let workers = config.session.sessions.max(1);
    let open_ref = &open_connection;
    std::thread::scope(|s| {
        let mut joins = Vec::with_capacity(workers);
        for w in 0..workers {
            let options = config.session.for_worker(w);
            let dialect = &config.dialect;
            joins.push(s.spawn(move || {
                let mut conn = open_ref(&options)?;
                run_generated_session(&options, dialect, &mut conn)
            }));
        }

        joins
            .into_iter()
            .map(|j| {
                j.join()
                    .unwrap_or_else(|_| Err(OracleError::internal("session thread panicked")))
            })
            .collect()
    })
}
