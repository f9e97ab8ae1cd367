use quizstore_core::db::open_db_in_memory;
use quizstore_core::model::record::{integer, record, text, text_of};
use quizstore_core::query::{Direction, Operator, QueryBuilder, QueryError};
use rusqlite::types::Value;
use rusqlite::Connection;

fn seeded() -> Connection {
    let conn = open_db_in_memory().unwrap();
    conn.execute_batch(
        "CREATE TABLE email_log (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            result_id INTEGER,
            recipient_email TEXT NOT NULL,
            status TEXT NOT NULL,
            attempts INTEGER NOT NULL DEFAULT 0,
            sent_at TEXT
        );
        CREATE TABLE results (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            archetype_id INTEGER NOT NULL,
            score REAL NOT NULL
        );
        INSERT INTO results (id, archetype_id, score) VALUES (1, 3, 72.5), (2, 5, 40.0);
        INSERT INTO email_log (result_id, recipient_email, status, attempts, sent_at) VALUES
            (1, 'a@example.com', 'sent', 1, '2024-01-01 10:00:00'),
            (2, 'b@example.com', 'failed', 4, NULL),
            (1, 'c@example.com', 'pending', 0, NULL),
            (NULL, 'd@example.com', 'failed', 2, NULL);",
    )
    .unwrap();
    conn
}

fn row_count(conn: &Connection) -> i64 {
    conn.query_row("SELECT COUNT(*) FROM email_log", [], |row| row.get(0))
        .unwrap()
}

#[test]
fn update_and_delete_without_where_are_refused() {
    let conn = seeded();
    let query = QueryBuilder::new(&conn, "email_log");

    let update = query.update(&record([("status", text("sent"))]));
    assert!(matches!(update, Err(QueryError::MissingWhereClause)));
    let delete = query.delete();
    assert!(matches!(delete, Err(QueryError::MissingWhereClause)));

    assert_eq!(row_count(&conn), 4);
    let failed = QueryBuilder::new(&conn, "email_log")
        .where_eq("status", text("failed"))
        .count()
        .unwrap();
    assert_eq!(failed, 2);
}

#[test]
fn get_returns_empty_sequence_and_first_returns_none_on_no_match() {
    let conn = seeded();
    let query = QueryBuilder::new(&conn, "email_log").where_eq("status", text("bounced"));

    assert!(query.get().unwrap().is_empty());
    assert!(query.first().unwrap().is_none());
}

#[test]
fn count_does_not_change_the_projection() {
    let conn = seeded();
    let query = QueryBuilder::new(&conn, "email_log")
        .select(["recipient_email"])
        .where_eq("status", text("failed"))
        .order_by("recipient_email", Direction::Asc)
        .limit(1);

    assert_eq!(query.count().unwrap(), 2);

    let rows = query.get().unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].len(), 1);
    assert_eq!(text_of(&rows[0], "recipient_email"), Some("b@example.com"));
}

#[test]
fn connectives_apply_left_to_right() {
    let conn = seeded();
    let rows = QueryBuilder::new(&conn, "email_log")
        .where_eq("status", text("sent"))
        .or_where("attempts", Operator::Gt, 3)
        .order_by("id", Direction::Asc)
        .get()
        .unwrap();

    let emails = rows
        .iter()
        .filter_map(|row| text_of(row, "recipient_email"))
        .collect::<Vec<_>>();
    assert_eq!(emails, vec!["a@example.com", "b@example.com"]);
}

#[test]
fn in_lists_bind_every_value_and_empty_lists_are_constant() {
    let conn = seeded();
    let some = QueryBuilder::new(&conn, "email_log")
        .where_in("status", [text("sent"), text("pending")])
        .count()
        .unwrap();
    assert_eq!(some, 2);

    let none = QueryBuilder::new(&conn, "email_log")
        .where_in("status", Vec::<String>::new())
        .count()
        .unwrap();
    assert_eq!(none, 0);

    let all = QueryBuilder::new(&conn, "email_log")
        .where_not_in("status", Vec::<String>::new())
        .count()
        .unwrap();
    assert_eq!(all, 4);

    let excluded = QueryBuilder::new(&conn, "email_log")
        .where_not_in("status", [text("failed")])
        .count()
        .unwrap();
    assert_eq!(excluded, 2);
}

#[test]
fn null_checks_render_without_binds() {
    let conn = seeded();
    let query = QueryBuilder::new(&conn, "email_log")
        .where_null("sent_at")
        .where_not_null("result_id");

    let (sql, binds) = query.to_sql().unwrap();
    assert_eq!(
        sql,
        "SELECT * FROM email_log WHERE sent_at IS NULL AND result_id IS NOT NULL"
    );
    assert!(binds.is_empty());
    assert_eq!(query.count().unwrap(), 2);
}

#[test]
fn to_sql_binds_paging_after_filters() {
    let conn = seeded();
    let (sql, binds) = QueryBuilder::new(&conn, "email_log")
        .where_op("attempts", Operator::Gte, 1)
        .order_by("attempts", Direction::Desc)
        .limit(10)
        .offset(20)
        .to_sql()
        .unwrap();

    assert_eq!(
        sql,
        "SELECT * FROM email_log WHERE attempts >= ? ORDER BY attempts DESC LIMIT ? OFFSET ?"
    );
    assert_eq!(
        binds,
        vec![Value::Integer(1), Value::Integer(10), Value::Integer(20)]
    );

    let (offset_only, _) = QueryBuilder::new(&conn, "email_log")
        .offset(2)
        .to_sql()
        .unwrap();
    assert_eq!(offset_only, "SELECT * FROM email_log LIMIT -1 OFFSET ?");
}

#[test]
fn joins_group_and_having_compose() {
    let conn = seeded();
    let rows = QueryBuilder::new(&conn, "email_log")
        .select(["results.archetype_id", "COUNT(*) AS sends"])
        .join("results", "email_log.result_id", Operator::Eq, "results.id")
        .group_by(["results.archetype_id"])
        .having("COUNT(*)", Operator::Gte, 2, Default::default())
        .get()
        .unwrap();

    assert_eq!(rows.len(), 1);
    assert_eq!(integer(&rows[0], "archetype_id"), Some(3));
    assert_eq!(integer(&rows[0], "sends"), Some(2));

    let left = QueryBuilder::new(&conn, "email_log")
        .left_join("results", "email_log.result_id", Operator::Eq, "results.id")
        .where_null("results.id")
        .count()
        .unwrap();
    assert_eq!(left, 1);
}

#[test]
fn insert_returns_new_id_and_update_uses_full_where() {
    let conn = seeded();
    let id = QueryBuilder::new(&conn, "email_log")
        .insert(&record([
            ("recipient_email", text("e@example.com")),
            ("status", text("pending")),
        ]))
        .unwrap();
    assert_eq!(id, 5);

    let changed = QueryBuilder::new(&conn, "email_log")
        .where_eq("status", text("failed"))
        .where_op("attempts", Operator::Gt, 3)
        .update(&record([("status", text("abandoned"))]))
        .unwrap();
    assert_eq!(changed, 1);

    let deleted = QueryBuilder::new(&conn, "email_log")
        .where_in("id", [id])
        .delete()
        .unwrap();
    assert_eq!(deleted, 1);
    assert_eq!(row_count(&conn), 4);
}

#[test]
fn identifiers_are_validated_before_execution() {
    let conn = seeded();
    let err = QueryBuilder::new(&conn, "email_log")
        .where_eq("status; DROP TABLE email_log", text("x"))
        .get()
        .unwrap_err();
    assert!(matches!(err, QueryError::InvalidIdentifier(_)));

    let err = QueryBuilder::new(&conn, "email_log")
        .join("results", "email_log.result_id", Operator::In, "results.id")
        .get()
        .unwrap_err();
    assert!(matches!(err, QueryError::InvalidOperator(_)));
    assert_eq!(row_count(&conn), 4);
}

#[test]
fn projections_cannot_smuggle_extra_clauses() {
    let conn = seeded();
    let err = QueryBuilder::new(&conn, "email_log")
        .select(["id FROM results UNION SELECT recipient_email FROM email_log"])
        .get()
        .unwrap_err();
    assert!(matches!(err, QueryError::InvalidIdentifier(_)));

    let rows = QueryBuilder::new(&conn, "email_log")
        .select(["status", "MAX(attempts) AS peak"])
        .group_by(["status"])
        .order_by("status", Direction::Asc)
        .get()
        .unwrap();
    assert_eq!(rows.len(), 3);
    assert_eq!(integer(&rows[0], "peak"), Some(4));
}

#[test]
fn insert_many_writes_every_row_in_one_statement() {
    let conn = seeded();
    let inserted = QueryBuilder::new(&conn, "email_log")
        .insert_many(&[
            record([
                ("recipient_email", text("e@example.com")),
                ("status", text("sent")),
                ("sent_at", text("2024-02-01 09:00:00")),
            ]),
            record([
                ("recipient_email", text("f@example.com")),
                ("status", text("pending")),
            ]),
        ])
        .unwrap();
    assert_eq!(inserted, 2);
    assert_eq!(row_count(&conn), 6);

    let late = QueryBuilder::new(&conn, "email_log")
        .where_eq("recipient_email", text("f@example.com"))
        .first()
        .unwrap()
        .unwrap();
    assert_eq!(late.get("sent_at"), Some(&Value::Null));
    assert_eq!(integer(&late, "attempts"), Some(0));

    let err = QueryBuilder::new(&conn, "email_log")
        .insert_many(&[
            record([("recipient_email", text("g@example.com")), ("status", text("sent"))]),
            record([("recipient_email", text("h@example.com")), ("sent_at", text("now"))]),
        ])
        .unwrap_err();
    assert!(matches!(err, QueryError::UnexpectedColumn(column) if column == "sent_at"));

    let err = QueryBuilder::new(&conn, "email_log").insert_many(&[]).unwrap_err();
    assert!(matches!(err, QueryError::EmptyData));
    assert_eq!(row_count(&conn), 6);
}

#[test]
fn raw_statements_bind_parameters() {
    let conn = seeded();
    let query = QueryBuilder::new(&conn, "email_log");
    let changed = query
        .raw(
            "UPDATE email_log SET attempts = attempts + ? WHERE status = ?",
            &[Value::Integer(1), text("pending")],
        )
        .unwrap();
    assert_eq!(changed, 1);

    let rows = query
        .raw_select(
            "SELECT attempts FROM email_log WHERE status = ?",
            &[text("pending")],
        )
        .unwrap();
    assert_eq!(integer(&rows[0], "attempts"), Some(1));
}
