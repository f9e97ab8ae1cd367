use quizstore_core::db::{open_db_in_memory, table_exists, DbError};
use quizstore_core::logging::{LogLevel, MemoryLogger};
use quizstore_core::migrate::{FnMigration, MigrationError, MigrationRegistry, Migrator, SqlMigration};
use rusqlite::Connection;
use std::sync::{Arc, Mutex};

const LEDGER: &str = "wp_money_quiz_migrations";
const CREATE_QUIZZES: &str = "2024_01_01_000000_create_quizzes";
const CREATE_RESULTS: &str = "2024_01_02_000000_create_results";

type Journal = Arc<Mutex<Vec<String>>>;

fn journaled(name: &'static str, table: &'static str, journal: &Journal) -> FnMigration {
    let (up_journal, down_journal) = (Arc::clone(journal), Arc::clone(journal));
    FnMigration::new(
        name,
        move |conn| {
            conn.execute_batch(&format!(
                "CREATE TABLE {table} (id INTEGER PRIMARY KEY AUTOINCREMENT);"
            ))?;
            up_journal.lock().unwrap().push(format!("up:{name}"));
            Ok(())
        },
        move |conn| {
            conn.execute_batch(&format!("DROP TABLE {table};"))?;
            down_journal.lock().unwrap().push(format!("down:{name}"));
            Ok(())
        },
    )
}

fn two_table_registry(journal: &Journal) -> MigrationRegistry {
    // Registered out of order on purpose; application follows name order.
    MigrationRegistry::new()
        .with(journaled(CREATE_RESULTS, "results", journal))
        .unwrap()
        .with(journaled(CREATE_QUIZZES, "quizzes", journal))
        .unwrap()
}

fn migrator<'c>(conn: &'c Connection, registry: MigrationRegistry, logger: &Arc<MemoryLogger>) -> Migrator<'c> {
    Migrator::new(conn, LEDGER, registry, logger.clone())
}

#[test]
fn run_applies_pending_in_name_order_under_one_batch() {
    let conn = open_db_in_memory().unwrap();
    let journal = Journal::default();
    let logger = Arc::new(MemoryLogger::new());
    let migrator = migrator(&conn, two_table_registry(&journal), &logger);

    let report = migrator.run().unwrap();
    assert_eq!(report.batch, Some(1));
    assert_eq!(report.applied, vec![CREATE_QUIZZES, CREATE_RESULTS]);

    let entries = migrator.entries().unwrap();
    assert_eq!(entries.len(), 2);
    assert!(entries.iter().all(|entry| entry.batch == 1));
    assert_eq!(
        journal.lock().unwrap().as_slice(),
        [format!("up:{CREATE_QUIZZES}"), format!("up:{CREATE_RESULTS}")]
    );
    assert!(table_exists(&conn, "quizzes").unwrap());
    assert!(table_exists(&conn, "results").unwrap());

    let status = migrator.status().unwrap();
    assert_eq!(status.total, 2);
    assert_eq!(status.completed, 2);
    assert_eq!(status.pending, 0);

    let started = logger
        .entries()
        .into_iter()
        .filter(|entry| entry.message == "migration_started")
        .collect::<Vec<_>>();
    assert_eq!(started.len(), 2);
    assert_eq!(started[0].context_value("class"), Some("CreateQuizzes"));
}

#[test]
fn second_run_is_a_no_op() {
    let conn = open_db_in_memory().unwrap();
    let journal = Journal::default();
    let logger = Arc::new(MemoryLogger::new());
    let migrator = migrator(&conn, two_table_registry(&journal), &logger);

    migrator.run().unwrap();
    let before = migrator.status().unwrap();
    let again = migrator.run().unwrap();

    assert_eq!(again.batch, None);
    assert!(again.applied.is_empty());
    assert_eq!(migrator.status().unwrap(), before);
    assert_eq!(journal.lock().unwrap().len(), 2);
}

#[test]
fn later_migrations_land_in_a_new_batch_and_rollback_is_per_batch() {
    let conn = open_db_in_memory().unwrap();
    let journal = Journal::default();
    let logger = Arc::new(MemoryLogger::new());

    migrator(&conn, two_table_registry(&journal), &logger)
        .run()
        .unwrap();

    let extended = two_table_registry(&journal)
        .with(SqlMigration::new(
            "2024_02_01_000000_add_quiz_settings",
            "ALTER TABLE quizzes ADD COLUMN settings TEXT;",
            "ALTER TABLE quizzes DROP COLUMN settings;",
        ))
        .unwrap();
    let migrator = migrator(&conn, extended, &logger);
    let report = migrator.run().unwrap();
    assert_eq!(report.batch, Some(2));
    assert_eq!(report.applied, vec!["2024_02_01_000000_add_quiz_settings"]);

    let rolled_back = migrator.rollback(1).unwrap();
    assert_eq!(rolled_back, vec!["2024_02_01_000000_add_quiz_settings"]);
    let status = migrator.status().unwrap();
    assert_eq!(status.completed, 2);
    assert_eq!(status.migrations.pending, vec!["2024_02_01_000000_add_quiz_settings"]);

    let reapplied = migrator.run().unwrap();
    assert_eq!(reapplied.batch, Some(2));
}

#[test]
fn rollback_runs_down_in_reverse_application_order() {
    let conn = open_db_in_memory().unwrap();
    let journal = Journal::default();
    let logger = Arc::new(MemoryLogger::new());
    let migrator = migrator(&conn, two_table_registry(&journal), &logger);

    migrator.run().unwrap();
    let rolled_back = migrator.rollback(1).unwrap();

    assert_eq!(rolled_back, vec![CREATE_RESULTS, CREATE_QUIZZES]);
    assert_eq!(
        journal.lock().unwrap()[2..],
        [format!("down:{CREATE_RESULTS}"), format!("down:{CREATE_QUIZZES}")]
    );
    assert!(!table_exists(&conn, "quizzes").unwrap());
    assert!(migrator.entries().unwrap().is_empty());
    assert_eq!(migrator.status().unwrap().pending, 2);

    assert!(migrator.rollback(1).unwrap().is_empty());
}

#[test]
fn failing_migration_aborts_the_run_and_keeps_earlier_work() {
    let conn = open_db_in_memory().unwrap();
    let journal = Journal::default();
    let logger = Arc::new(MemoryLogger::new());
    let registry = two_table_registry(&journal)
        .with(SqlMigration::new(
            "2024_01_03_000000_broken",
            "CREATE TABLE broken (id INTEGER PRIMARY KEY); ALTER TABLE missing ADD COLUMN x TEXT;",
            "DROP TABLE broken;",
        ))
        .unwrap()
        .with(SqlMigration::new(
            "2024_01_04_000000_after_broken",
            "CREATE TABLE after_broken (id INTEGER PRIMARY KEY);",
            "DROP TABLE after_broken;",
        ))
        .unwrap();
    let migrator = migrator(&conn, registry, &logger);

    let err = migrator.run().unwrap_err();
    match err {
        MigrationError::Failed { migration, source } => {
            assert_eq!(migration, "2024_01_03_000000_broken");
            assert!(matches!(source, DbError::Sqlite(_)));
        }
        other => panic!("unexpected error: {other}"),
    }

    let status = migrator.status().unwrap();
    assert_eq!(status.migrations.completed, vec![CREATE_QUIZZES, CREATE_RESULTS]);
    assert_eq!(
        status.migrations.pending,
        vec!["2024_01_03_000000_broken", "2024_01_04_000000_after_broken"]
    );
    assert!(!table_exists(&conn, "broken").unwrap());
    assert!(!table_exists(&conn, "after_broken").unwrap());

    let errors = logger.at_level(LogLevel::Error);
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0].message, "migration_failed");
    assert_eq!(errors[0].context_value("direction"), Some("up"));
}

#[test]
fn reset_requires_confirmation() {
    let conn = open_db_in_memory().unwrap();
    let journal = Journal::default();
    let logger = Arc::new(MemoryLogger::new());
    let migrator = migrator(&conn, two_table_registry(&journal), &logger);
    migrator.run().unwrap();

    assert_eq!(migrator.reset(false).unwrap(), None);
    assert_eq!(migrator.status().unwrap().completed, 2);
    assert_eq!(logger.at_level(LogLevel::Warning).len(), 1);

    let rolled_back = migrator.reset(true).unwrap().unwrap();
    assert_eq!(rolled_back, vec![CREATE_RESULTS, CREATE_QUIZZES]);
    assert_eq!(migrator.status().unwrap().completed, 0);
}

#[test]
fn rollback_of_unregistered_ledger_row_is_an_error() {
    let conn = open_db_in_memory().unwrap();
    let journal = Journal::default();
    let logger = Arc::new(MemoryLogger::new());
    migrator(&conn, two_table_registry(&journal), &logger)
        .run()
        .unwrap();

    let only_quizzes = MigrationRegistry::new()
        .with(journaled(CREATE_QUIZZES, "quizzes", &journal))
        .unwrap();
    let migrator = migrator(&conn, only_quizzes, &logger);

    let err = migrator.rollback(1).unwrap_err();
    assert!(matches!(err, MigrationError::UnknownMigration(name) if name == CREATE_RESULTS));
    assert_eq!(migrator.entries().unwrap().len(), 2);
}

#[test]
fn status_on_fresh_database_does_not_create_the_ledger() {
    let conn = open_db_in_memory().unwrap();
    let journal = Journal::default();
    let logger = Arc::new(MemoryLogger::new());
    let migrator = migrator(&conn, two_table_registry(&journal), &logger);

    let status = migrator.status().unwrap();
    assert_eq!(status.completed, 0);
    assert_eq!(status.pending, 2);
    assert!(!table_exists(&conn, LEDGER).unwrap());
}

#[test]
fn baseline_records_without_running() {
    let conn = open_db_in_memory().unwrap();
    let journal = Journal::default();
    let logger = Arc::new(MemoryLogger::new());
    let migrator = migrator(&conn, two_table_registry(&journal), &logger);

    let batch = migrator.baseline(&[CREATE_QUIZZES.to_string()]).unwrap();
    assert_eq!(batch, Some(1));
    assert!(journal.lock().unwrap().is_empty());
    assert_eq!(migrator.baseline(&[CREATE_QUIZZES.to_string()]).unwrap(), None);

    let err = migrator
        .baseline(&["2030_01_01_000000_unknown".to_string()])
        .unwrap_err();
    assert!(matches!(err, MigrationError::UnknownMigration(_)));

    let report = migrator.run().unwrap();
    assert_eq!(report.batch, Some(2));
    assert_eq!(report.applied, vec![CREATE_RESULTS]);
}
