use sqlmodel_core::{Error, FlushErrorKind};
use sqlmodel_session::{FlushConfig, InsertOrderer, ObjectKey, PendingInsert};
use std::collections::HashSet;

struct User;
struct Post;
struct Comment;
struct Tag;
struct PostTag;

#[derive(Debug, Clone, PartialEq)]
struct Row {
    columns: Vec<&'static str>,
    values: Vec<String>,
}

fn row(pairs: &[(&'static str, &str)]) -> Row {
    Row {
        columns: pairs.iter().map(|(column, _)| *column).collect(),
        values: pairs.iter().map(|(_, value)| (*value).to_string()).collect(),
    }
}

fn user(id: u64) -> ObjectKey {
    ObjectKey::new::<User>(id)
}

fn post(id: u64) -> ObjectKey {
    ObjectKey::new::<Post>(id)
}

fn tag(id: u64) -> ObjectKey {
    ObjectKey::new::<Tag>(id)
}

/// Rows in the order a session would queue them while building a blog.
fn blog_flush() -> Vec<PendingInsert<Row>> {
    vec![
        PendingInsert::new(user(1), "users", row(&[("name", "ada")])),
        PendingInsert::new(post(1), "posts", row(&[("title", "Engines")])).depends_on(user(1)),
        PendingInsert::new(
            ObjectKey::new::<Comment>(1),
            "comments",
            row(&[("body", "first")]),
        )
        .with_references([post(1), user(1)]),
        PendingInsert::new(user(2), "users", row(&[("name", "grace")])),
        PendingInsert::new(post(2), "posts", row(&[("title", "Compilers")])).depends_on(user(2)),
        PendingInsert::new(tag(1), "tags", row(&[("name", "history")])),
        PendingInsert::new(ObjectKey::new::<PostTag>(1), "post_tags", row(&[]))
            .with_references([post(1), tag(1)]),
        PendingInsert::new(
            ObjectKey::new::<Comment>(2),
            "comments",
            row(&[("body", "second")]),
        )
        .with_references([post(2), user(1)]),
        PendingInsert::new(tag(2), "tags", row(&[("name", "languages")])),
        PendingInsert::new(ObjectKey::new::<PostTag>(2), "post_tags", row(&[]))
            .with_references([post(2), tag(2)]),
        PendingInsert::new(user(3), "users", row(&[("name", "edsger")])),
    ]
}

fn tables_of(ordered: &[PendingInsert<Row>]) -> Vec<&'static str> {
    ordered.iter().map(|insert| insert.table).collect()
}

#[test]
fn blog_flush_groups_each_table_into_one_batch() {
    let ordered = InsertOrderer::default().order(blog_flush()).unwrap();

    let batches: Vec<(&str, usize)> = ordered
        .batches()
        .iter()
        .map(|batch| (batch.table, batch.len()))
        .collect();
    assert_eq!(
        batches,
        vec![
            ("users", 3),
            ("posts", 2),
            ("comments", 2),
            ("tags", 2),
            ("post_tags", 2),
        ]
    );

    let stats = ordered.stats();
    assert_eq!(stats.rows, 11);
    assert_eq!(stats.runs, 5);
    assert_eq!(stats.longest_run, 3);
    assert_eq!(stats.edges, 10);
}

#[test]
fn rows_within_a_table_keep_flush_order() {
    let ordered = InsertOrderer::default()
        .order(blog_flush())
        .unwrap()
        .into_inner();

    let users: Vec<&str> = ordered
        .iter()
        .filter(|insert| insert.table == "users")
        .map(|insert| insert.row.values[0].as_str())
        .collect();
    assert_eq!(users, vec!["ada", "grace", "edsger"]);
    assert_eq!(ordered[0].row.columns, vec!["name"]);
}

#[test]
fn small_batch_size_splits_runs() {
    let ordered = InsertOrderer::new(FlushConfig::new(2))
        .order(blog_flush())
        .unwrap();

    let sizes: Vec<usize> = ordered.batches().iter().map(|batch| batch.len()).collect();
    assert_eq!(sizes.iter().sum::<usize>(), 11);
    assert!(sizes.iter().all(|&size| size <= 2));
    assert_eq!(ordered.stats().runs, 5);
    assert_eq!(ordered.stats().batches, sizes.len());
}

#[test]
fn previously_flushed_parents_are_not_reordered() {
    // Users were written by an earlier flush; only posts are pending.
    let persisted: HashSet<ObjectKey> = [user(1), user(2)].into_iter().collect();
    let inserts = vec![
        PendingInsert::new(post(1), "posts", row(&[("title", "a")])).depends_on(user(1)),
        PendingInsert::new(tag(1), "tags", row(&[("name", "t")])),
        PendingInsert::new(post(2), "posts", row(&[("title", "b")])).depends_on(user(2)),
    ];

    let ordered = InsertOrderer::default()
        .order_with_persisted(inserts, &persisted)
        .unwrap();

    assert_eq!(tables_of(ordered.as_slice()), vec!["posts", "posts", "tags"]);
    assert_eq!(ordered.report().external, 2);
    assert_eq!(ordered.report().edges, 0);
}

fn plan_flush(inserts: Vec<PendingInsert<Row>>) -> sqlmodel_core::Result<usize> {
    let ordered = InsertOrderer::default().order(inserts)?;
    Ok(ordered.batches().len())
}

#[test]
fn cycle_surfaces_as_flush_error() {
    let mut inserts = blog_flush();
    // users(1) now also points at posts(1), which points back at users(1).
    inserts[0].references.push(post(1));

    let err = plan_flush(inserts).unwrap_err();

    assert!(err.is_flush_ordering_error());
    match &err {
        Error::Flush(flush) => {
            assert_eq!(flush.kind, FlushErrorKind::DependencyCycle);
            assert!(flush.tables.contains(&"users"));
            assert!(flush.tables.contains(&"posts"));
        }
        other => std::panic::panic_any(format!("expected flush error, got {other}")),
    }
    assert!(err.to_string().contains("insert order could not be computed"));
}

#[test]
fn duplicate_insert_surfaces_as_flush_error() {
    let mut inserts = blog_flush();
    inserts.push(PendingInsert::new(
        user(2),
        "users",
        row(&[("name", "grace again")]),
    ));

    let err = plan_flush(inserts).unwrap_err();

    match err {
        Error::Flush(flush) => assert_eq!(flush.kind, FlushErrorKind::DuplicateKey),
        other => std::panic::panic_any(format!("expected flush error, got {other}")),
    }
}

#[test]
fn valid_flush_plans_batches() {
    assert_eq!(plan_flush(blog_flush()).unwrap(), 5);
}
