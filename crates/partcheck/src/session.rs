//! Session-scoped logging and replay state.
//!
//! Everything a session mutates across rounds lives in [`SessionContext`],
//! which is passed explicitly into every call that logs or records a
//! statement. A context belongs to exactly one session and is dropped with it.

use std::fs::{self, File, OpenOptions};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::info;

use partcheck_error::{LogicBugReport, OracleError, Result};

/// Destination for pre-formatted session text.
pub trait LogSink: Send {
    /// Record a query about to be executed (the "current" log).
    ///
    /// # Errors
    ///
    /// Returns the underlying I/O failure.
    fn write_query(&mut self, sql: &str) -> io::Result<()>;

    /// Append a diagnostic block (mismatch reports).
    ///
    /// # Errors
    ///
    /// Returns the underlying I/O failure.
    fn write_diagnostic(&mut self, text: &str) -> io::Result<()>;

    /// Flush buffered output.
    ///
    /// # Errors
    ///
    /// Returns the underlying I/O failure.
    fn flush(&mut self) -> io::Result<()>;
}

/// In-memory sink, used by tests and embedders that surface logs themselves.
#[derive(Debug, Default, Clone)]
pub struct MemoryLog {
    pub queries: Vec<String>,
    pub diagnostics: String,
}

impl LogSink for MemoryLog {
    fn write_query(&mut self, sql: &str) -> io::Result<()> {
        self.queries.push(sql.to_owned());
        Ok(())
    }

    fn write_diagnostic(&mut self, text: &str) -> io::Result<()> {
        self.diagnostics.push_str(text);
        Ok(())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Discards everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullLog;

impl LogSink for NullLog {
    fn write_query(&mut self, _sql: &str) -> io::Result<()> {
        Ok(())
    }

    fn write_diagnostic(&mut self, _text: &str) -> io::Result<()> {
        Ok(())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// File-backed sink: `<db>-cur.log` for executed queries, `<db>.log` for
/// mismatch diagnostics.
#[derive(Debug)]
pub struct FileLog {
    dir: PathBuf,
    database_name: String,
    current: BufWriter<File>,
    diagnostics: File,
}

impl FileLog {
    /// Create both log files under `dir`, truncating earlier runs.
    ///
    /// # Errors
    ///
    /// Returns `InvalidArgument` for an empty database name and `Io` if the
    /// files cannot be created.
    pub fn create(dir: &Path, database_name: &str) -> Result<Self> {
        if database_name.is_empty() {
            return Err(OracleError::invalid_argument(
                "database name must be non-empty",
            ));
        }
        fs::create_dir_all(dir)?;
        let current = BufWriter::new(File::create(dir.join(format!("{database_name}-cur.log")))?);
        let diagnostics = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(dir.join(format!("{database_name}.log")))?;
        Ok(Self {
            dir: dir.to_path_buf(),
            database_name: database_name.to_owned(),
            current,
            diagnostics,
        })
    }

    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Write a bug report next to the logs. See [`write_report_json`].
    ///
    /// # Errors
    ///
    /// Returns `Io` on write failure and `Internal` if serialization fails.
    pub fn write_report_json(&self, report: &LogicBugReport) -> Result<PathBuf> {
        write_report_json(&self.dir, &self.database_name, report)
    }
}

/// Write `report` under `dir` as pretty JSON.
///
/// The file is named after the report fingerprint so repeated hits of the
/// same bug overwrite instead of piling up.
///
/// # Errors
///
/// Returns `Io` on write failure and `Internal` if serialization fails.
pub fn write_report_json(
    dir: &Path,
    database_name: &str,
    report: &LogicBugReport,
) -> Result<PathBuf> {
    let path = dir.join(format!(
        "{database_name}-bug-{}.json",
        &report.fingerprint()[..16]
    ));
    let bytes = serde_json::to_vec_pretty(report)
        .map_err(|err| OracleError::internal(format!("failed to serialize report: {err}")))?;
    fs::write(&path, bytes)?;
    info!(path = %path.display(), "logic bug report written");
    Ok(path)
}

impl LogSink for FileLog {
    fn write_query(&mut self, sql: &str) -> io::Result<()> {
        writeln!(self.current, "{sql};")
    }

    fn write_diagnostic(&mut self, text: &str) -> io::Result<()> {
        self.diagnostics.write_all(text.as_bytes())?;
        self.diagnostics.flush()
    }

    fn flush(&mut self) -> io::Result<()> {
        self.current.flush()
    }
}

/// What is needed to replay a session up to its failure.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReproState {
    pub database_name: String,
    pub seed: u64,
    /// Engine build the session ran against, when the connection reports it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub database_version: Option<String>,
    /// Setup statements plus the annotated mismatch queries, in order.
    pub statements: Vec<String>,
}

/// Mutable per-session state handed to every logging call.
pub struct SessionContext {
    log_each_select: bool,
    log: Box<dyn LogSink>,
    repro: ReproState,
}

impl SessionContext {
    pub fn new(
        log: Box<dyn LogSink>,
        log_each_select: bool,
        database_name: &str,
        seed: u64,
    ) -> Self {
        Self {
            log_each_select,
            log,
            repro: ReproState {
                database_name: database_name.to_owned(),
                seed,
                database_version: None,
                statements: Vec::new(),
            },
        }
    }

    /// A context that logs nothing; handy for one-off checks.
    #[must_use]
    pub fn detached() -> Self {
        Self::new(Box::new(NullLog), false, "detached", 0)
    }

    #[must_use]
    pub fn log_each_select(&self) -> bool {
        self.log_each_select
    }

    /// Record `sql` in the current log if every select is being logged.
    ///
    /// # Errors
    ///
    /// Returns `Io` if the sink fails.
    pub fn record_query(&mut self, sql: &str) -> Result<()> {
        if self.log_each_select {
            self.log.write_query(sql)?;
            self.log.flush()?;
        }
        Ok(())
    }

    /// Append a diagnostic block to the session log.
    ///
    /// # Errors
    ///
    /// Returns `Io` if the sink fails.
    pub fn append_diagnostic(&mut self, text: &str) -> Result<()> {
        self.log.write_diagnostic(text)?;
        Ok(())
    }

    pub fn set_database_version(&mut self, version: Option<String>) {
        self.repro.database_version = version;
    }

    /// Push a statement onto the replay list.
    pub fn record_statement(&mut self, statement: impl Into<String>) {
        self.repro.statements.push(statement.into());
    }

    #[must_use]
    pub fn repro(&self) -> &ReproState {
        &self.repro
    }

    /// Consume the context, keeping only the replay state.
    #[must_use]
    pub fn into_repro(self) -> ReproState {
        self.repro
    }
}

impl std::fmt::Debug for SessionContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionContext")
            .field("log_each_select", &self.log_each_select)
            .field("repro", &self.repro)
            .finish_non_exhaustive()
    }
}
