//! Algebraic properties of the combination strategies on real SQLite.

use partcheck::{
    CombinationMode, CombinedQuerySpec, DialectProfile, ExpectedErrors, Partition,
    ResultProjection, SessionContext, SqlConnection, SqliteConnection, combine,
};
use proptest::prelude::*;

fn populated(values: &[Option<i64>]) -> SqliteConnection {
    let mut conn = SqliteConnection::open_in_memory().expect("open");
    conn.execute("CREATE TABLE t0(c0 INTEGER)").expect("create");
    for value in values {
        let literal = value.map_or_else(|| "NULL".to_owned(), |v| v.to_string());
        conn.execute(&format!("INSERT INTO t0 VALUES ({literal})"))
            .expect("insert");
    }
    conn
}

fn components(threshold: i64) -> [String; 3] {
    Partition::from_predicate(&format!("c0 > {threshold}"))
        .parts()
        .map(|p| format!("SELECT c0 FROM t0 WHERE {p}"))
}

fn run(
    conn: &mut SqliteConnection,
    spec: &CombinedQuerySpec,
    dialect: &DialectProfile,
) -> Vec<Option<String>> {
    let mut values = combine(
        spec,
        dialect,
        &ExpectedErrors::new(),
        conn,
        &mut SessionContext::detached(),
        &mut Vec::new(),
    )
    .expect("combine")
    .into_values();
    values.sort();
    values
}

proptest! {
    #[test]
    fn union_all_equals_concatenation(
        values in proptest::collection::vec(proptest::option::of(-5_i64..5), 0..20),
        threshold in -5_i64..5,
    ) {
        let mut conn = populated(&values);
        let dialect = DialectProfile::sqlite();
        let single = CombinedQuerySpec::new(components(threshold), CombinationMode::PreserveDuplicates, true);
        let split = CombinedQuerySpec::new(components(threshold), CombinationMode::PreserveDuplicates, false);

        let a = run(&mut conn, &single, &dialect);
        let b = run(&mut conn, &split, &dialect);
        prop_assert_eq!(a.len(), values.len());
        prop_assert_eq!(a, b);
    }

    #[test]
    fn both_elimination_forms_agree(
        values in proptest::collection::vec(proptest::option::of(-5_i64..5), 0..20),
        threshold in -5_i64..5,
    ) {
        let mut conn = populated(&values);
        let spec = CombinedQuerySpec::new(components(threshold), CombinationMode::EliminateDuplicates, true);
        let bare = DialectProfile { bare_union: true, ..DialectProfile::sqlite() };
        let wrapped = DialectProfile { bare_union: false, ..DialectProfile::sqlite() };

        let a = run(&mut conn, &spec, &bare);
        let b = run(&mut conn, &spec, &wrapped);

        let mut distinct = values.iter().map(|v| v.map(|n| n.to_string())).collect::<Vec<_>>();
        distinct.sort();
        distinct.dedup();
        prop_assert_eq!(&a, &distinct);
        prop_assert_eq!(a, b);
    }

    #[test]
    fn projection_append_preserves_every_row(
        left in proptest::collection::vec(proptest::option::of("[0-9]{1,2}"), 0..8),
        right in proptest::collection::vec(proptest::option::of("[0-9]{1,2}"), 0..8),
    ) {
        let mut joined = ResultProjection::new(left.clone());
        joined.append(ResultProjection::new(right.clone()));
        let mut expected = left;
        expected.extend(right);
        prop_assert_eq!(joined.into_values(), expected);
    }
}
