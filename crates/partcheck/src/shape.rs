//! Query-shape generation.
//!
//! Oracles never build SQL from scratch: they ask a [`ShapeSource`] for a
//! base SELECT and a predicate and do the partitioning themselves.
//! [`RandomShapeSource`] is the built-in source, deterministic for a seed,
//! drawing table and column names from the introspected schema.

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use tracing::debug;

use partcheck_error::{OracleError, Result, SkipReason};

use crate::engine::{SqlConnection, TableSchema};
use crate::oracle::AggregateFn;
use crate::partition::SelectShape;

/// Generator collaborator consulted by the oracles once per round.
pub trait ShapeSource {
    /// Re-read the schema after statements that may have changed it.
    ///
    /// # Errors
    ///
    /// `Engine` if introspection fails.
    fn refresh_schema(&mut self, conn: &mut dyn SqlConnection) -> Result<()>;

    /// A fresh base query. Later predicates refer to its tables.
    ///
    /// # Errors
    ///
    /// `Skip(EmptySchema)` if there is nothing to select from.
    fn base_select(&mut self) -> Result<SelectShape>;

    /// A row-level predicate over the last base query's tables.
    ///
    /// # Errors
    ///
    /// `Skip(InapplicableShape)` if no base query was generated yet.
    fn predicate(&mut self) -> Result<String>;

    /// A predicate valid in a HAVING clause of a query grouped by `group_by`.
    ///
    /// # Errors
    ///
    /// `Skip(InapplicableShape)` if no base query was generated yet.
    fn having_predicate(&mut self, group_by: &[String]) -> Result<String>;

    /// An aggregate function and its argument over the last base query's tables.
    ///
    /// # Errors
    ///
    /// `Skip(InapplicableShape)` if no base query was generated yet.
    fn aggregate(&mut self) -> Result<(AggregateFn, String)>;
}

/// A statement run before the first round, typically DDL or DML.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SetupStatement {
    pub text: String,
    pub affects_schema: bool,
}

const COMPARISONS: &[&str] = &["=", "<>", "<", "<=", ">", ">="];
const COLUMN_TYPES: &[&str] = &["INTEGER", "REAL", "TEXT", ""];

/// Seeded random shapes over the introspected schema.
#[derive(Debug)]
pub struct RandomShapeSource {
    rng: StdRng,
    max_depth: usize,
    tables: Vec<TableSchema>,
    /// Qualified columns of the current base query.
    columns: Vec<String>,
}

impl RandomShapeSource {
    #[must_use]
    pub fn new(seed: u64, max_depth: usize) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
            max_depth: max_depth.max(1),
            tables: Vec::new(),
            columns: Vec::new(),
        }
    }

    /// Use `tables` instead of introspecting a connection.
    #[must_use]
    pub fn with_tables(mut self, tables: Vec<TableSchema>) -> Self {
        self.tables = tables;
        self
    }

    #[must_use]
    pub fn tables(&self) -> &[TableSchema] {
        &self.tables
    }

    /// Statements creating and filling `table_count` random tables.
    pub fn database_statements(&mut self, table_count: usize) -> Vec<SetupStatement> {
        let mut statements = Vec::new();
        for t in 0..table_count {
            let column_count = self.rng.gen_range(1..=3);
            let columns: Vec<String> = (0..column_count)
                .map(|c| {
                    let ty = COLUMN_TYPES.choose(&mut self.rng).copied().unwrap_or("");
                    if ty.is_empty() {
                        format!("c{c}")
                    } else {
                        format!("c{c} {ty}")
                    }
                })
                .collect();
            statements.push(SetupStatement {
                text: format!("CREATE TABLE t{t}({})", columns.join(", ")),
                affects_schema: true,
            });

            let row_count = self.rng.gen_range(0..=6);
            for _ in 0..row_count {
                let values: Vec<String> = (0..column_count).map(|_| self.literal()).collect();
                statements.push(SetupStatement {
                    text: format!("INSERT INTO t{t} VALUES ({})", values.join(", ")),
                    affects_schema: false,
                });
            }
        }
        statements
    }

    fn literal(&mut self) -> String {
        match self.rng.gen_range(0..6) {
            0 => "NULL".to_owned(),
            1 | 2 => self.rng.gen_range(-5_i64..=5).to_string(),
            3 => format!("{:.2}", self.rng.gen_range(-10.0_f64..=10.0)),
            4 => {
                let len = self.rng.gen_range(0..=3);
                let text: String = (0..len)
                    .map(|_| char::from(b'a' + self.rng.gen_range(0..3_u8)))
                    .collect();
                format!("'{text}'")
            }
            _ => ["0", "1", "-0.0", "''"]
                .choose(&mut self.rng)
                .copied()
                .unwrap_or("0")
                .to_owned(),
        }
    }

    fn column(&mut self) -> Result<String> {
        self.columns
            .choose(&mut self.rng)
            .cloned()
            .ok_or(OracleError::skip(SkipReason::InapplicableShape))
    }

    fn operand(&mut self) -> Result<String> {
        if self.rng.gen_bool(0.7) {
            self.column()
        } else {
            Ok(self.literal())
        }
    }

    fn leaf(&mut self) -> Result<String> {
        let left = self.column()?;
        Ok(match self.rng.gen_range(0..6) {
            0 => format!("{left} IS NULL"),
            1 => format!("{left} IS NOT NULL"),
            2 => {
                let low = self.literal();
                let high = self.literal();
                format!("{left} BETWEEN {low} AND {high}")
            }
            3 => {
                let items: Vec<String> = (0..self.rng.gen_range(1..=3))
                    .map(|_| self.literal())
                    .collect();
                format!("{left} IN ({})", items.join(", "))
            }
            _ => {
                let op = COMPARISONS.choose(&mut self.rng).copied().unwrap_or("=");
                let right = self.operand()?;
                format!("{left} {op} {right}")
            }
        })
    }

    fn expression(&mut self, depth: usize) -> Result<String> {
        if depth >= self.max_depth || self.rng.gen_bool(0.4) {
            return self.leaf();
        }
        Ok(match self.rng.gen_range(0..3) {
            0 => format!("NOT ({})", self.expression(depth + 1)?),
            1 => format!(
                "({}) AND ({})",
                self.expression(depth + 1)?,
                self.expression(depth + 1)?
            ),
            _ => format!(
                "({}) OR ({})",
                self.expression(depth + 1)?,
                self.expression(depth + 1)?
            ),
        })
    }

    fn aggregate_fn(&mut self) -> AggregateFn {
        AggregateFn::ALL
            .choose(&mut self.rng)
            .copied()
            .unwrap_or(AggregateFn::Count)
    }

    fn aggregate_term(&mut self) -> Result<String> {
        let column = self.column()?;
        Ok(format!("{}({column})", self.aggregate_fn().name()))
    }
}

impl ShapeSource for RandomShapeSource {
    fn refresh_schema(&mut self, conn: &mut dyn SqlConnection) -> Result<()> {
        self.tables = conn
            .introspect_tables()
            .map_err(|err| OracleError::Engine(format!("schema introspection failed: {err}")))?;
        debug!(tables = self.tables.len(), "schema refreshed");
        Ok(())
    }

    fn base_select(&mut self) -> Result<SelectShape> {
        let candidates: Vec<&TableSchema> =
            self.tables.iter().filter(|t| !t.columns.is_empty()).collect();
        if candidates.is_empty() {
            return Err(OracleError::skip(SkipReason::EmptySchema));
        }
        let table_count = self.rng.gen_range(1..=candidates.len().min(2));
        let chosen: Vec<&TableSchema> = candidates
            .choose_multiple(&mut self.rng, table_count)
            .copied()
            .collect();

        let from: Vec<String> = chosen.iter().map(|t| t.name.clone()).collect();
        let columns: Vec<String> = chosen
            .iter()
            .flat_map(|t| t.columns.iter().map(move |c| format!("{}.{}", t.name, c.name)))
            .collect();

        let fetch_count = self.rng.gen_range(1..=columns.len().min(3));
        let fetch: Vec<String> = columns
            .choose_multiple(&mut self.rng, fetch_count)
            .cloned()
            .collect();
        self.columns = columns;

        let mut shape = SelectShape::new(fetch, from);
        if self.rng.gen_bool(0.2) {
            shape.where_clause = Some(self.expression(0)?);
        }
        if self.rng.gen_bool(0.15) {
            shape.order_by = vec![self.column()?];
        }
        Ok(shape)
    }

    fn predicate(&mut self) -> Result<String> {
        self.expression(0)
    }

    fn having_predicate(&mut self, group_by: &[String]) -> Result<String> {
        let aggregate = self.aggregate_term()?;
        let op = COMPARISONS.choose(&mut self.rng).copied().unwrap_or("=");
        let literal = self.literal();
        let term = format!("{aggregate} {op} {literal}");
        match group_by.choose(&mut self.rng) {
            Some(group) if self.rng.gen_bool(0.4) => Ok(format!("({term}) OR ({group} IS NULL)")),
            _ => Ok(term),
        }
    }

    fn aggregate(&mut self) -> Result<(AggregateFn, String)> {
        let column = self.column()?;
        Ok((self.aggregate_fn(), column))
    }
}
