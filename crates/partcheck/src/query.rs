//! Query units and result projections.

use crate::expected_errors::ExpectedErrors;

/// A SQL text together with the errors it may benignly raise.
#[derive(Debug, Clone)]
pub struct Query<'e> {
    pub text: String,
    pub expected_errors: &'e ExpectedErrors,
    /// Executing this may change the schema; read by the schema refresh.
    pub affects_schema: bool,
}

impl<'e> Query<'e> {
    pub fn new(text: impl Into<String>, expected_errors: &'e ExpectedErrors) -> Self {
        Self {
            text: text.into(),
            expected_errors,
            affects_schema: false,
        }
    }

    /// A statement that may alter the schema (DDL).
    pub fn schema_changing(text: impl Into<String>, expected_errors: &'e ExpectedErrors) -> Self {
        Self {
            affects_schema: true,
            ..Self::new(text, expected_errors)
        }
    }
}

/// First-column values of a result, one per row.
///
/// Delivery order is kept, but comparisons ignore it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResultProjection(Vec<Option<String>>);

impl ResultProjection {
    #[must_use]
    pub fn new(values: Vec<Option<String>>) -> Self {
        Self(values)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    #[must_use]
    pub fn values(&self) -> &[Option<String>] {
        &self.0
    }

    #[must_use]
    pub fn into_values(self) -> Vec<Option<String>> {
        self.0
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Option<String>> {
        self.0.iter()
    }

    /// Append another projection's rows after this one's.
    pub fn append(&mut self, other: Self) {
        self.0.extend(other.0);
    }

    /// Apply `f` to every value, nulls included.
    #[must_use]
    pub fn canonicalized<F>(&self, f: F) -> Self
    where
        F: Fn(Option<&str>) -> Option<String>,
    {
        Self(self.0.iter().map(|v| f(v.as_deref())).collect())
    }
}

impl From<Vec<Option<String>>> for ResultProjection {
    fn from(values: Vec<Option<String>>) -> Self {
        Self(values)
    }
}

impl<'a> FromIterator<Option<&'a str>> for ResultProjection {
    fn from_iter<I: IntoIterator<Item = Option<&'a str>>>(iter: I) -> Self {
        Self(iter.into_iter().map(|v| v.map(str::to_owned)).collect())
    }
}

impl<'a> IntoIterator for &'a ResultProjection {
    type Item = &'a Option<String>;
    type IntoIter = std::slice::Iter<'a, Option<String>>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn append_keeps_component_order() {
        let mut first: ResultProjection = [Some("1"), None].into_iter().collect();
        let second: ResultProjection = [Some("2")].into_iter().collect();
        first.append(second);
        assert_eq!(
            first.values(),
            [Some("1".to_owned()), None, Some("2".to_owned())]
        );
    }

    #[test]
    fn schema_changing_sets_flag() {
        let errors = ExpectedErrors::new();
        assert!(Query::schema_changing("CREATE TABLE t0(c0)", &errors).affects_schema);
        assert!(!Query::new("SELECT 1", &errors).affects_schema);
    }
}
