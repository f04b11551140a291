//! Ternary-logic partitioning oracles.
//!
//! Every variant follows the same round: build a base query, collect its
//! first column, split it into three partition queries, combine those, and
//! compare. Variants differ only in where the partition predicate goes and
//! whether duplicates survive the combination.

use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use partcheck_error::{LogicBugReport, OracleError, Result, SkipReason};

use crate::canonical::{canonicalize_value, double_equals};
use crate::collector::collect_first_column;
use crate::combine::{CombinationMode, CombinedQuerySpec, combine};
use crate::comparator::{assume_result_sets_are_equal, assume_result_sets_are_equal_with};
use crate::config::DialectProfile;
use crate::engine::SqlConnection;
use crate::expected_errors::ExpectedErrors;
use crate::partition::{Partition, SelectShape};
use crate::query::ResultProjection;
use crate::session::SessionContext;
use crate::shape::ShapeSource;

/// The oracle variants a session can be configured with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OracleKind {
    /// Partition the WHERE clause.
    Where,
    /// Partition the HAVING clause of a grouped query.
    Having,
    /// Partition the WHERE clause of a grouped query.
    GroupBy,
    /// Partition the WHERE clause of a `SELECT DISTINCT`.
    Distinct,
    /// Partition the input of an aggregate and re-aggregate the parts.
    Aggregate,
}

impl OracleKind {
    pub const ALL: [Self; 5] = [
        Self::Where,
        Self::Having,
        Self::GroupBy,
        Self::Distinct,
        Self::Aggregate,
    ];

    /// Combination mode of the partition queries.
    #[must_use]
    pub const fn mode(self) -> CombinationMode {
        match self {
            Self::Where | Self::Having | Self::Aggregate => CombinationMode::PreserveDuplicates,
            Self::GroupBy | Self::Distinct => CombinationMode::EliminateDuplicates,
        }
    }
}

impl fmt::Display for OracleKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Where => "where",
            Self::Having => "having",
            Self::GroupBy => "group_by",
            Self::Distinct => "distinct",
            Self::Aggregate => "aggregate",
        })
    }
}

/// Aggregates whose value over a table can be rebuilt from its partitions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AggregateFn {
    Min,
    Max,
    Sum,
    Count,
}

impl AggregateFn {
    pub const ALL: [Self; 4] = [Self::Min, Self::Max, Self::Sum, Self::Count];

    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Min => "MIN",
            Self::Max => "MAX",
            Self::Sum => "SUM",
            Self::Count => "COUNT",
        }
    }

    /// The function that folds per-partition values into the whole.
    #[must_use]
    pub const fn outer(self) -> Self {
        match self {
            Self::Min => Self::Min,
            Self::Max => Self::Max,
            Self::Sum | Self::Count => Self::Sum,
        }
    }
}

impl fmt::Display for AggregateFn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Anything that can run one oracle round.
pub trait Oracle {
    /// Run one round.
    ///
    /// # Errors
    ///
    /// `Skip` for an inconclusive round, `LogicBug` on divergence, anything
    /// else for an unexpected failure.
    fn check(
        &mut self,
        conn: &mut dyn SqlConnection,
        source: &mut dyn ShapeSource,
        session: &mut SessionContext,
    ) -> Result<()>;
}

/// One TLP oracle variant with its expected errors and dialect.
#[derive(Debug, Clone)]
pub struct TlpOracle {
    kind: OracleKind,
    errors: ExpectedErrors,
    dialect: DialectProfile,
}

impl TlpOracle {
    #[must_use]
    pub fn new(kind: OracleKind, errors: ExpectedErrors, dialect: DialectProfile) -> Self {
        Self {
            kind,
            errors,
            dialect,
        }
    }

    #[must_use]
    pub fn kind(&self) -> OracleKind {
        self.kind
    }

    #[must_use]
    pub fn expected_errors(&self) -> &ExpectedErrors {
        &self.errors
    }

    /// Mutable access for oracles that widen their set after construction.
    pub fn expected_errors_mut(&mut self) -> &mut ExpectedErrors {
        &mut self.errors
    }

    fn check_where(
        &self,
        conn: &mut dyn SqlConnection,
        source: &mut dyn ShapeSource,
        session: &mut SessionContext,
    ) -> Result<()> {
        let base = source.base_select()?;
        let partition = Partition::from_predicate(&source.predicate()?);
        let components = partition.parts().map(|p| base.with_where(p).to_sql());
        self.partition_round(&base, components, conn, session)
    }

    fn check_having(
        &self,
        conn: &mut dyn SqlConnection,
        source: &mut dyn ShapeSource,
        session: &mut SessionContext,
    ) -> Result<()> {
        let mut base = source.base_select()?;
        base.distinct = false;
        base.group_by = base.fetch.clone();
        base.having = None;
        let partition = Partition::from_predicate(&source.having_predicate(&base.group_by)?);
        let components = partition.parts().map(|p| base.with_having(p).to_sql());
        self.partition_round(&base, components, conn, session)
    }

    fn check_group_by(
        &self,
        conn: &mut dyn SqlConnection,
        source: &mut dyn ShapeSource,
        session: &mut SessionContext,
    ) -> Result<()> {
        let mut base = source.base_select()?;
        base.distinct = false;
        base.group_by = base.fetch.clone();
        base.order_by.clear();
        let partition = Partition::from_predicate(&source.predicate()?);
        let components = partition.parts().map(|p| base.with_where(p).to_sql());
        self.partition_round(&base, components, conn, session)
    }

    fn check_distinct(
        &self,
        conn: &mut dyn SqlConnection,
        source: &mut dyn ShapeSource,
        session: &mut SessionContext,
    ) -> Result<()> {
        let mut base = source.base_select()?;
        base.distinct = true;
        base.order_by.clear();
        let partition = Partition::from_predicate(&source.predicate()?);
        let components = partition.parts().map(|p| base.with_where(p).to_sql());
        self.partition_round(&base, components, conn, session)
    }

    fn check_aggregate(
        &self,
        conn: &mut dyn SqlConnection,
        source: &mut dyn ShapeSource,
        session: &mut SessionContext,
    ) -> Result<()> {
        let mut base = source.base_select()?;
        let (func, argument) = source.aggregate()?;
        base.distinct = false;
        base.order_by.clear();
        base.group_by.clear();
        base.having = None;
        base.fetch = vec![format!("{func}({argument})")];
        let original = base.to_sql();

        let partition = Partition::from_predicate(&source.predicate()?);
        let mut inner = base.clone();
        inner.fetch = vec![format!("{func}({argument}) AS agg")];
        let parts = partition.parts().map(|p| inner.with_where(p).to_sql());
        let combined = format!(
            "SELECT {}(agg) FROM ({}) AS partitions",
            func.outer(),
            parts.join(" UNION ALL ")
        );

        let first = collect_first_column(&original, &self.errors, conn, session)?;
        let second = collect_first_column(&combined, &self.errors, conn, session)?;
        if single_values_agree(&first, &second) {
            return Ok(());
        }
        self.compare(&first, &second, &original, &[combined], session)
    }

    /// Shared template: collect the base, combine the partitions, compare.
    fn partition_round(
        &self,
        base: &SelectShape,
        components: [String; 3],
        conn: &mut dyn SqlConnection,
        session: &mut SessionContext,
    ) -> Result<()> {
        let original = base.to_sql();
        let first = collect_first_column(&original, &self.errors, conn, session)?;

        let single_statement =
            !base.has_order_by() || self.dialect.union_all_in_order_by_context;
        let spec = CombinedQuerySpec::new(components, self.kind.mode(), single_statement);
        let mut reconstructed = Vec::with_capacity(3);
        let second = combine(
            &spec,
            &self.dialect,
            &self.errors,
            conn,
            session,
            &mut reconstructed,
        )?;
        self.compare(&first, &second, &original, &reconstructed, session)
    }

    fn compare(
        &self,
        first: &ResultProjection,
        second: &ResultProjection,
        original: &str,
        reconstructed: &[String],
        session: &mut SessionContext,
    ) -> Result<()> {
        if self.dialect.canonicalize_negative_zero {
            assume_result_sets_are_equal_with(
                first,
                second,
                original,
                reconstructed,
                session,
                canonicalize_value,
            )
        } else {
            assume_result_sets_are_equal(first, second, original, reconstructed, session)
        }
    }
}

impl Oracle for TlpOracle {
    fn check(
        &mut self,
        conn: &mut dyn SqlConnection,
        source: &mut dyn ShapeSource,
        session: &mut SessionContext,
    ) -> Result<()> {
        debug!(oracle = %self.kind, "oracle round");
        match self.kind {
            OracleKind::Where => self.check_where(conn, source, session),
            OracleKind::Having => self.check_having(conn, source, session),
            OracleKind::GroupBy => self.check_group_by(conn, source, session),
            OracleKind::Distinct => self.check_distinct(conn, source, session),
            OracleKind::Aggregate => self.check_aggregate(conn, source, session),
        }
    }
}

// One value per side that is textually equal or numerically close.
fn single_values_agree(first: &ResultProjection, second: &ResultProjection) -> bool {
    match (first.values(), second.values()) {
        ([a], [b]) => match (a, b) {
            (Some(a), Some(b)) => a == b || double_equals(a, b),
            (None, None) => true,
            _ => false,
        },
        _ => false,
    }
}

/// Cycles through several oracles, one per round.
#[derive(Debug, Clone)]
pub struct CompositeOracle {
    oracles: Vec<TlpOracle>,
    next: usize,
}

impl CompositeOracle {
    /// # Errors
    ///
    /// `InvalidArgument` if `oracles` is empty.
    pub fn new(oracles: Vec<TlpOracle>) -> Result<Self> {
        if oracles.is_empty() {
            return Err(OracleError::invalid_argument(
                "composite oracle needs at least one oracle",
            ));
        }
        Ok(Self { oracles, next: 0 })
    }

    /// One oracle per kind, all sharing `errors` and `dialect`.
    ///
    /// # Errors
    ///
    /// `InvalidArgument` if `kinds` is empty.
    pub fn from_kinds(
        kinds: &[OracleKind],
        errors: &ExpectedErrors,
        dialect: &DialectProfile,
    ) -> Result<Self> {
        Self::new(
            kinds
                .iter()
                .map(|kind| TlpOracle::new(*kind, errors.clone(), dialect.clone()))
                .collect(),
        )
    }

    /// The kind the next round will use.
    #[must_use]
    pub fn next_kind(&self) -> OracleKind {
        self.oracles[self.next].kind()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.oracles.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.oracles.is_empty()
    }
}

impl Oracle for CompositeOracle {
    fn check(
        &mut self,
        conn: &mut dyn SqlConnection,
        source: &mut dyn ShapeSource,
        session: &mut SessionContext,
    ) -> Result<()> {
        let index = self.next;
        self.next = (self.next + 1) % self.oracles.len();
        self.oracles[index].check(conn, source, session)
    }
}

/// How a round ended, as seen at the round boundary.
#[derive(Debug)]
pub enum RoundOutcome {
    Passed,
    /// Inconclusive; the session moves on to the next round.
    Skipped(SkipReason),
    /// Two equivalent executions disagreed. Ends the session.
    Bug(Box<LogicBugReport>),
    /// Unexpected failure. Ends the session.
    Failed(OracleError),
}

impl RoundOutcome {
    /// Whether the session must stop after this round.
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        matches!(self, Self::Bug(_) | Self::Failed(_))
    }
}

/// Run one round of `oracle` and sort its result.
pub fn run_round<O>(
    oracle: &mut O,
    conn: &mut dyn SqlConnection,
    source: &mut dyn ShapeSource,
    session: &mut SessionContext,
) -> RoundOutcome
where
    O: Oracle + ?Sized,
{
    match oracle.check(conn, source, session) {
        Ok(()) => RoundOutcome::Passed,
        Err(OracleError::Skip(reason)) => {
            debug!(reason = %reason, "round skipped");
            RoundOutcome::Skipped(reason)
        }
        Err(OracleError::LogicBug(report)) => {
            info!(fingerprint = %report.fingerprint(), "round found a logic bug");
            RoundOutcome::Bug(report)
        }
        Err(err) => {
            warn!(error = %err, "round failed");
            RoundOutcome::Failed(err)
        }
    }
}
