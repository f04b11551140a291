//! Ternary-logic partitioning (TLP) oracles for finding logic bugs in SQL
//! engines.
//!
//! For any predicate `p`, every row satisfies exactly one of `p`, `NOT (p)`
//! and `(p) IS NULL`. A query and the combination of its three partitioned
//! variants must therefore return the same rows. A round generates a query,
//! runs both forms against a live engine, and compares; a divergence not
//! explained by a benign engine error is a logic bug.
//!
//! The pieces, bottom up:
//!
//! - [`expected_errors`]: which engine error messages are benign.
//! - [`collector`]: run a query, project its first column, classify failures.
//! - [`comparator`]: cardinality-then-set equivalence with diagnostics.
//! - [`combine`]: `UNION ALL`, concatenation, or duplicate-eliminating union.
//! - [`canonical`]: negative-zero folding and numeric tolerance.
//! - [`oracle`]: the TLP variants and the round boundary.
//! - [`runner`]: sessions, alone or in parallel.

pub mod canonical;
pub mod collector;
pub mod combine;
pub mod comparator;
pub mod config;
pub mod engine;
pub mod expected_errors;
pub mod oracle;
pub mod partition;
pub mod query;
pub mod runner;
pub mod session;
pub mod shape;

pub use partcheck_error::{
    LogicBugReport, MismatchKind, OracleError, Result, SkipReason, format_value_set,
};

pub use canonical::{canonicalize_value, double_equals, strip_trailing_fraction_zeros};
pub use collector::{collect_first_column, collect_query, execute_statement};
pub use combine::{CombinationMode, CombinedQuerySpec, combine};
pub use comparator::{assume_result_sets_are_equal, assume_result_sets_are_equal_with};
pub use config::{DialectProfile, HarnessConfig, SessionOptions};
pub use engine::{
    ColumnSchema, EngineError, QueryOutput, SqlConnection, SqliteConnection, TableSchema,
};
pub use expected_errors::{ExpectedErrors, ExpectedErrorsBuilder};
pub use oracle::{
    AggregateFn, CompositeOracle, Oracle, OracleKind, RoundOutcome, TlpOracle, run_round,
};
pub use partition::{Partition, SelectShape};
pub use query::{Query, ResultProjection};
pub use runner::{
    SessionOutcome, SessionSummary, run_generated_session, run_session, run_sessions_in_parallel,
    run_with_source,
};
pub use session::{
    FileLog, LogSink, MemoryLog, NullLog, ReproState, SessionContext, write_report_json,
};
pub use shape::{RandomShapeSource, SetupStatement, ShapeSource};
