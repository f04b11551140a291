//! The "execute query, return rows" capability the oracles run against.
//!
//! The core never talks to a driver directly: it sees an engine through
//! [`SqlConnection`], a blocking request/response interface bound to one
//! session. [`SqliteConnection`] implements it over `rusqlite` (bundled
//! libsqlite3); other dialects plug in their own implementation.

use std::fmt::{self, Write as _};

use rusqlite::Connection;
use rusqlite::types::Value;
use tracing::debug;

use partcheck_error::{OracleError, Result};

/// Engine failure as seen by the oracles.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineError {
    /// The engine rejected the statement with a message.
    Message(String),
    /// The engine failed without any message text.
    NoMessage,
    /// A returned value could not be converted by the driver.
    Conversion(String),
}

impl EngineError {
    /// The message text, if the engine supplied one.
    #[must_use]
    pub fn message(&self) -> Option<&str> {
        match self {
            Self::Message(msg) | Self::Conversion(msg) => Some(msg),
            Self::NoMessage => None,
        }
    }
}

impl fmt::Display for EngineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Message(msg) => f.write_str(msg),
            Self::NoMessage => f.write_str("<no message>"),
            Self::Conversion(msg) => write!(f, "value conversion failed: {msg}"),
        }
    }
}

/// What executing a query text produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QueryOutput {
    /// The statement has no result columns (e.g. a write statement).
    NoResultSet,
    /// First-column values in delivery order, `None` for SQL NULL.
    Rows(Vec<Option<String>>),
}

/// A column as reported by schema introspection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnSchema {
    pub name: String,
    /// Declared type, possibly empty (SQLite allows untyped columns).
    pub type_name: String,
}

impl ColumnSchema {
    /// Whether the declared type suggests numeric values.
    #[must_use]
    pub fn is_numeric(&self) -> bool {
        let upper = self.type_name.to_ascii_uppercase();
        ["INT", "REAL", "FLOA", "DOUB", "NUM", "DEC"]
            .iter()
            .any(|needle| upper.contains(needle))
    }
}

/// A table as reported by schema introspection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableSchema {
    pub name: String,
    pub columns: Vec<ColumnSchema>,
}

/// Blocking connection to the engine under test.
///
/// One implementation instance belongs to exactly one session.
pub trait SqlConnection {
    /// Execute `sql` and return the first column of every row.
    ///
    /// # Errors
    ///
    /// Returns the engine's failure for the statement.
    fn query_first_column(&mut self, sql: &str) -> std::result::Result<QueryOutput, EngineError>;

    /// Execute a statement whose rows, if any, are not needed.
    ///
    /// # Errors
    ///
    /// Returns the engine's failure for the statement.
    fn execute(&mut self, sql: &str) -> std::result::Result<(), EngineError>;

    /// Read the current user tables and their columns.
    ///
    /// # Errors
    ///
    /// Returns the engine's failure for the introspection queries.
    fn introspect_tables(&mut self) -> std::result::Result<Vec<TableSchema>, EngineError>;

    /// Version of the engine build, recorded so replays can be pinned to it.
    fn engine_version(&self) -> Option<String> {
        None
    }
}

/// SQLite engine under test, via `rusqlite`.
pub struct SqliteConnection {
    conn: Connection,
}

impl SqliteConnection {
    /// Open an in-memory database.
    ///
    /// # Errors
    ///
    /// Returns `OracleError::Engine` if the connection fails.
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()
            .map_err(|err| OracleError::Engine(format!("failed to open :memory: {err}")))?;
        Ok(Self { conn })
    }

    /// Open (or create) a file-backed database.
    ///
    /// # Errors
    ///
    /// Returns `OracleError::Engine` if the connection fails.
    pub fn open(path: &std::path::Path) -> Result<Self> {
        let conn = Connection::open(path).map_err(|err| {
            OracleError::Engine(format!("failed to open {}: {err}", path.display()))
        })?;
        Ok(Self { conn })
    }

    /// Wrap an existing connection.
    #[must_use]
    pub fn from_connection(conn: Connection) -> Self {
        Self { conn }
    }

    fn read_first_column(&self, sql: &str) -> rusqlite::Result<QueryOutput> {
        let mut stmt = self.conn.prepare(sql)?;
        if stmt.column_count() == 0 {
            return Ok(QueryOutput::NoResultSet);
        }
        let mut rows = stmt.query([])?;
        let mut values = Vec::new();
        while let Some(row) = rows.next()? {
            let value: Value = row.get(0)?;
            values.push(value_to_text(value));
        }
        Ok(QueryOutput::Rows(values))
    }

    fn read_tables(&self) -> rusqlite::Result<Vec<TableSchema>> {
        let mut names_stmt = self.conn.prepare(
            "SELECT name FROM sqlite_master WHERE type='table' AND name NOT LIKE 'sqlite_%' ORDER BY name",
        )?;
        let names = names_stmt
            .query_map([], |row| row.get::<_, String>(0))?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        let mut columns_stmt = self
            .conn
            .prepare("SELECT name, type FROM pragma_table_info(?1) ORDER BY cid")?;
        let mut tables = Vec::with_capacity(names.len());
        for name in names {
            let columns = columns_stmt
                .query_map([name.as_str()], |row| {
                    Ok(ColumnSchema {
                        name: row.get(0)?,
                        type_name: row.get(1)?,
                    })
                })?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            tables.push(TableSchema { name, columns });
        }
        Ok(tables)
    }
}

impl SqlConnection for SqliteConnection {
    fn query_first_column(&mut self, sql: &str) -> std::result::Result<QueryOutput, EngineError> {
        self.read_first_column(sql).map_err(engine_error)
    }

    fn execute(&mut self, sql: &str) -> std::result::Result<(), EngineError> {
        self.conn.execute_batch(sql).map_err(engine_error)
    }

    fn introspect_tables(&mut self) -> std::result::Result<Vec<TableSchema>, EngineError> {
        let tables = self.read_tables().map_err(engine_error)?;
        debug!(table_count = tables.len(), "sqlite schema introspected");
        Ok(tables)
    }

    fn engine_version(&self) -> Option<String> {
        Some(rusqlite::version().to_owned())
    }
}

fn value_to_text(value: Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::Integer(i) => Some(i.to_string()),
        Value::Real(r) => Some(r.to_string()),
        Value::Text(s) => Some(s),
        Value::Blob(b) => Some(blob_literal(&b)),
    }
}

// Hex keeps distinct blobs distinct even when they are not valid UTF-8.
fn blob_literal(bytes: &[u8]) -> String {
    let mut hex = String::with_capacity(3 + bytes.len() * 2);
    hex.push_str("X'");
    for byte in bytes {
        let _ = write!(hex, "{byte:02X}");
    }
    hex.push('\'');
    hex
}

fn engine_error(err: rusqlite::Error) -> EngineError {
    match err {
        rusqlite::Error::FromSqlConversionFailure(..)
        | rusqlite::Error::IntegralValueOutOfRange(..)
        | rusqlite::Error::InvalidColumnType(..) => EngineError::Conversion(err.to_string()),
        other => {
            let message = other.to_string();
            if message.is_empty() {
                EngineError::NoMessage
            } else {
                EngineError::Message(message)
            }
        }
    }
}
