//! Ternary-logic partitions and the query shapes they are applied to.
//!
//! Under three-valued logic every row satisfies exactly one of `p`,
//! `NOT (p)` and `(p) IS NULL`, so the three filtered queries together
//! return exactly the rows of the unfiltered one.

use std::fmt;

/// The three renderings of one predicate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Partition {
    pub predicate: String,
    pub negated: String,
    pub is_null: String,
}

impl Partition {
    #[must_use]
    pub fn from_predicate(predicate: &str) -> Self {
        Self {
            predicate: predicate.to_owned(),
            negated: format!("NOT ({predicate})"),
            is_null: format!("({predicate}) IS NULL"),
        }
    }

    /// `[p, NOT (p), (p) IS NULL]`, in the order the components run.
    #[must_use]
    pub fn parts(&self) -> [&str; 3] {
        [&self.predicate, &self.negated, &self.is_null]
    }
}

/// A single-table-expression SELECT, kept structured so partitions can be
/// spliced into its WHERE or HAVING clause.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SelectShape {
    pub distinct: bool,
    pub fetch: Vec<String>,
    pub from: Vec<String>,
    pub where_clause: Option<String>,
    pub group_by: Vec<String>,
    pub having: Option<String>,
    pub order_by: Vec<String>,
}

impl SelectShape {
    #[must_use]
    pub fn new(fetch: Vec<String>, from: Vec<String>) -> Self {
        Self {
            fetch,
            from,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn has_order_by(&self) -> bool {
        !self.order_by.is_empty()
    }

    /// Copy with `condition` AND-ed onto the WHERE clause.
    #[must_use]
    pub fn with_where(&self, condition: &str) -> Self {
        let where_clause = match &self.where_clause {
            Some(existing) => format!("({existing}) AND ({condition})"),
            None => condition.to_owned(),
        };
        Self {
            where_clause: Some(where_clause),
            ..self.clone()
        }
    }

    /// Copy with `condition` as the HAVING clause, replacing any existing one.
    #[must_use]
    pub fn with_having(&self, condition: &str) -> Self {
        Self {
            having: Some(condition.to_owned()),
            ..self.clone()
        }
    }

    #[must_use]
    pub fn to_sql(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for SelectShape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SELECT ")?;
        if self.distinct {
            f.write_str("DISTINCT ")?;
        }
        write!(f, "{} FROM {}", self.fetch.join(", "), self.from.join(", "))?;
        if let Some(condition) = &self.where_clause {
            write!(f, " WHERE {condition}")?;
        }
        if !self.group_by.is_empty() {
            write!(f, " GROUP BY {}", self.group_by.join(", "))?;
        }
        if let Some(condition) = &self.having {
            write!(f, " HAVING {condition}")?;
        }
        if !self.order_by.is_empty() {
            write!(f, " ORDER BY {}", self.order_by.join(", "))?;
        }
        Ok(())
    }
}
