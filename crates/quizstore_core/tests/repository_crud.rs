use quizstore_core::logging::{LogLevel, MemoryLogger};
use quizstore_core::model::record::{integer, record, text, text_of};
use quizstore_core::query::Direction;
use quizstore_core::{
    open_db_in_memory, ArchetypeRepository, EventBus, MemoryCache, ProspectRepository, Record,
    RepoError, Repository, RepositoryContext, SqliteRepository, StoreConfig, VersionedUpgrader,
};
use rusqlite::types::Value;
use rusqlite::Connection;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

fn migrated() -> Connection {
    let conn = open_db_in_memory().unwrap();
    VersionedUpgrader::new(&conn, StoreConfig::default(), Arc::new(MemoryLogger::new()))
        .upgrade()
        .unwrap();
    conn
}

fn context(logger: &Arc<MemoryLogger>) -> RepositoryContext {
    RepositoryContext::new(StoreConfig::default()).with_logger(logger.clone())
}

fn result_row(repo: &SqliteRepository<'_>, archetype_id: i64) -> i64 {
    repo.create(record([
        ("quiz_id", Value::Integer(1)),
        ("archetype_id", Value::Integer(archetype_id)),
        ("answers", text("{}")),
        ("score", Value::Real(55.0)),
        ("completed_at", text("2024-06-01 12:00:00")),
    ]))
    .unwrap()
}

#[test]
fn create_stamps_timestamps_and_find_returns_the_row() {
    let conn = migrated();
    let logger = Arc::new(MemoryLogger::new());
    let quizzes = SqliteRepository::for_table(&conn, "quizzes", &context(&logger)).unwrap();

    let id = quizzes
        .create(record([
            ("title", text("Spending Habits")),
            ("slug", text("spending-habits")),
        ]))
        .unwrap();

    let row = quizzes.find(id).unwrap();
    assert_eq!(text_of(&row, "title"), Some("Spending Habits"));
    assert!(text_of(&row, "created_at").is_some());
    assert_eq!(text_of(&row, "created_at"), text_of(&row, "updated_at"));
    assert!(quizzes.exists(id));
    assert!(quizzes.find(id + 100).is_none());
    assert_eq!(quizzes.entity(), "quizze");
}

#[test]
fn update_is_visible_through_the_cache() {
    let conn = migrated();
    let logger = Arc::new(MemoryLogger::new());
    let cache = Arc::new(MemoryCache::new());
    let ctx = context(&logger).with_cache(cache.clone());
    let archetypes = ArchetypeRepository::try_new(&conn, &ctx).unwrap();

    let ruler = archetypes.find_by_slug("ruler").unwrap();
    let id = integer(&ruler, "id").unwrap();
    assert_eq!(archetypes.find(id), Some(ruler.clone()));
    assert_eq!(archetypes.find(id), Some(ruler));
    assert!(cache.stats().hits >= 1);

    assert!(archetypes.update(id, record([("color", text("#000000"))])));
    let fresh = archetypes.find(id).unwrap();
    assert_eq!(text_of(&fresh, "color"), Some("#000000"));
    let by_slug = archetypes.find_by_slug("ruler").unwrap();
    assert_eq!(text_of(&by_slug, "color"), Some("#000000"));
}

#[test]
fn cached_reads_are_served_until_a_write_goes_through_the_repository() {
    let conn = migrated();
    let logger = Arc::new(MemoryLogger::new());
    let archetypes = ArchetypeRepository::try_new(&conn, &context(&logger)).unwrap();
    let id = integer(&archetypes.find_by_slug("fool").unwrap(), "id").unwrap();
    archetypes.find(id).unwrap();

    conn.execute(
        "UPDATE wp_money_quiz_archetypes SET name = 'Changed Elsewhere' WHERE id = ?1",
        [id],
    )
    .unwrap();
    assert_eq!(
        text_of(&archetypes.find(id).unwrap(), "name"),
        Some("The Fool")
    );

    assert!(archetypes.update(id, record([("sort_order", 40)])));
    assert_eq!(
        text_of(&archetypes.find(id).unwrap(), "name"),
        Some("Changed Elsewhere")
    );
}

#[test]
fn paginate_reports_totals_and_clamps_inputs() {
    let conn = migrated();
    let logger = Arc::new(MemoryLogger::new());
    let emails = SqliteRepository::for_table(&conn, "email_log", &context(&logger)).unwrap();
    for n in 0..25 {
        emails
            .create(record([
                ("recipient_email", text(&format!("lead{n}@example.com"))),
                ("email_type", text("result")),
                ("subject", text("Your money archetype")),
            ]))
            .unwrap();
    }

    let page = emails.paginate(2, 10, &[("id", Direction::Asc)]);
    assert_eq!(page.items.len(), 10);
    assert_eq!(page.total, 25);
    assert_eq!(page.total_pages, 3);
    assert_eq!(integer(&page.items[0], "id"), Some(11));

    let last = emails.paginate(3, 10, &[("id", Direction::Asc)]);
    assert_eq!(last.items.len(), 5);

    let clamped = emails.paginate(0, 0, &[("id", Direction::Desc)]);
    assert_eq!(clamped.page, 1);
    assert_eq!(clamped.per_page, 1);
    assert_eq!(clamped.total_pages, 25);
    assert_eq!(integer(&clamped.items[0], "id"), Some(25));

    assert_eq!(emails.all(&[]).len(), 25);
    assert_eq!(emails.count(&record([("email_type", text("result"))])), 25);
    assert_eq!(emails.count(&record([("email_type", text("reminder"))])), 0);
}

#[test]
fn lifecycle_events_reach_listeners() {
    let conn = migrated();
    let logger = Arc::new(MemoryLogger::new());
    let bus = Arc::new(EventBus::new());
    let seen = Arc::new(Mutex::new(Vec::new()));
    let created = Arc::new(AtomicUsize::new(0));

    let counter = Arc::clone(&created);
    bus.listen("money_quiz_prospect_created", move |event| {
        assert_eq!(event.entity, "prospect");
        counter.fetch_add(1, Ordering::SeqCst);
    });
    for name in ["money_quiz_prospect_updated", "money_quiz_prospect_deleted"] {
        let seen = Arc::clone(&seen);
        bus.listen(name, move |event| {
            seen.lock().unwrap().push((event.name.clone(), event.previous.is_some()));
        });
    }

    let ctx = context(&logger).with_events(bus.clone());
    let prospects = ProspectRepository::try_new(&conn, &ctx).unwrap();
    let id = prospects
        .create(record([
            ("email", text("ada@example.com")),
            ("first_name", text("Ada")),
            ("result_id", Value::Integer(1)),
        ]))
        .unwrap();
    assert_eq!(created.load(Ordering::SeqCst), 1);

    assert!(prospects.update(id, record([("phone", text("555-0100"))])));
    assert!(prospects.delete(id));
    assert!(!prospects.delete(id));

    assert_eq!(
        seen.lock().unwrap().as_slice(),
        [
            ("money_quiz_prospect_updated".to_string(), true),
            ("money_quiz_prospect_deleted".to_string(), true),
        ]
    );
}

#[test]
fn failures_are_logged_and_degrade() {
    let conn = migrated();
    let logger = Arc::new(MemoryLogger::new());
    let quizzes = SqliteRepository::for_table(&conn, "quizzes", &context(&logger)).unwrap();

    assert_eq!(quizzes.create(record([("no_such_column", text("x"))])), None);
    assert!(!quizzes.update(1, record([("no_such_column", text("x"))])));
    assert!(!quizzes.update(9_999, record([("title", text("ghost"))])));
    assert!(quizzes.find_by("bad column", &text("x")).is_none());

    let errors = logger.at_level(LogLevel::Error);
    assert_eq!(errors.len(), 3);
    assert!(errors
        .iter()
        .all(|entry| entry.message == "repository_operation_failed"));
    assert_eq!(errors[0].context_value("operation"), Some("create"));
    assert_eq!(errors[1].context_value("key"), Some("1"));
    assert_eq!(errors[2].context_value("table"), Some("wp_money_quiz_quizzes"));
}

#[test]
fn construction_validates_the_table() {
    let conn = migrated();
    let logger = Arc::new(MemoryLogger::new());
    let missing = SqliteRepository::for_table(&conn, "no_such_table", &context(&logger));
    assert!(matches!(missing, Err(RepoError::MissingRequiredTable(_))));

    conn.execute_batch("CREATE TABLE wp_money_quiz_keyless (name TEXT);")
        .unwrap();
    let keyless = SqliteRepository::for_table(&conn, "keyless", &context(&logger));
    assert!(matches!(
        keyless,
        Err(RepoError::MissingRequiredColumn { column, .. }) if column == "id"
    ));
}

#[test]
fn prospect_create_upserts_by_email() {
    let conn = migrated();
    let logger = Arc::new(MemoryLogger::new());
    let prospects = ProspectRepository::try_new(&conn, &context(&logger)).unwrap();

    let first = prospects
        .create(record([
            ("email", text("lead@example.com")),
            ("first_name", text("Sam")),
            ("result_id", Value::Integer(1)),
        ]))
        .unwrap();
    let second = prospects
        .create(record([
            ("email", text("lead@example.com")),
            ("first_name", text("Samira")),
            ("result_id", Value::Integer(2)),
        ]))
        .unwrap();

    assert_eq!(first, second);
    assert_eq!(prospects.count(&Record::new()), 1);
    let row = prospects.find_by_email("lead@example.com").unwrap();
    assert_eq!(text_of(&row, "first_name"), Some("Samira"));
    assert_eq!(integer(&row, "result_id"), Some(2));

    assert!(prospects.update(first, record([("email", text("other@example.com"))])));
    assert!(prospects.find_by_email("other@example.com").is_none());
}

#[test]
fn prospects_are_listed_by_result_archetype_newest_first() {
    let conn = migrated();
    let logger = Arc::new(MemoryLogger::new());
    let ctx = context(&logger);
    let results = SqliteRepository::for_table(&conn, "results", &ctx).unwrap();
    let prospects = ProspectRepository::try_new(&conn, &ctx).unwrap();

    let warrior = result_row(&results, 3);
    let victim = result_row(&results, 5);
    let mut warrior_leads = Vec::new();
    for (email, result_id) in [
        ("one@example.com", warrior),
        ("two@example.com", victim),
        ("three@example.com", warrior),
    ] {
        let id = prospects
            .create(record([
                ("email", text(email)),
                ("result_id", Value::Integer(result_id)),
            ]))
            .unwrap();
        if result_id == warrior {
            warrior_leads.push(id);
        }
    }

    let listed = prospects
        .get_by_archetype(3)
        .iter()
        .filter_map(|row| integer(row, "id"))
        .collect::<Vec<_>>();
    warrior_leads.reverse();
    assert_eq!(listed, warrior_leads);
    assert!(prospects.get_by_archetype(8).is_empty());
}

#[test]
fn active_archetypes_follow_sort_order() {
    let conn = migrated();
    let logger = Arc::new(MemoryLogger::new());
    let archetypes = ArchetypeRepository::try_new(&conn, &context(&logger)).unwrap();

    let active = archetypes.find_active();
    assert_eq!(active.len(), 8);
    assert_eq!(text_of(&active[0], "slug"), Some("ruler"));
    assert_eq!(text_of(&active[7], "slug"), Some("martyr"));

    let tyrant = integer(&archetypes.find_by_slug("tyrant").unwrap(), "id").unwrap();
    assert!(archetypes.update(tyrant, record([("is_active", 0)])));
    let active = archetypes.find_active();
    assert_eq!(active.len(), 7);
    assert!(active
        .iter()
        .all(|row| text_of(row, "slug") != Some("tyrant")));
}

#[test]
fn rolled_back_transaction_discards_writes() {
    let conn = migrated();
    let logger = Arc::new(MemoryLogger::new());
    let quizzes = SqliteRepository::for_table(&conn, "quizzes", &context(&logger)).unwrap();
    let before = quizzes.count(&Record::new());

    quizzes.begin_transaction().unwrap();
    assert!(quizzes.in_transaction());
    quizzes
        .create(record([("title", text("Draft")), ("slug", text("draft"))]))
        .unwrap();
    quizzes.rollback().unwrap();

    assert!(!quizzes.in_transaction());
    assert_eq!(quizzes.count(&Record::new()), before);
}

#[test]
fn stores_with_different_prefixes_can_share_one_cache() {
    let conn = open_db_in_memory().unwrap();
    let logger = Arc::new(MemoryLogger::new());
    let cache = Arc::new(MemoryCache::new());
    let site_two = StoreConfig {
        table_prefix: "wp_2_".to_string(),
        ..StoreConfig::default()
    };
    for config in [StoreConfig::default(), site_two.clone()] {
        VersionedUpgrader::new(&conn, config, logger.clone())
            .upgrade()
            .unwrap();
    }

    let one_ctx = context(&logger).with_cache(cache.clone());
    let two_ctx = RepositoryContext::new(site_two)
        .with_logger(logger.clone())
        .with_cache(cache.clone());
    let one = SqliteRepository::for_table(&conn, "quizzes", &one_ctx).unwrap();
    let two = SqliteRepository::for_table(&conn, "quizzes", &two_ctx).unwrap();
    assert_eq!(one.entity(), two.entity());

    let one_id = one
        .create(record([("title", text("site one")), ("slug", text("shared"))]))
        .unwrap();
    let two_id = two
        .create(record([("title", text("site two")), ("slug", text("shared"))]))
        .unwrap();
    assert_eq!(one_id, two_id);

    assert_eq!(text_of(&one.find(one_id).unwrap(), "title"), Some("site one"));
    assert_eq!(text_of(&two.find(two_id).unwrap(), "title"), Some("site two"));
    assert_eq!(cache.stats().entries, 2);

    assert!(one.update(one_id, record([("title", text("site one v2"))])));
    assert_eq!(text_of(&two.find(two_id).unwrap(), "title"), Some("site two"));
    // The update's prior-row read and the last read both hit; site two's
    // entry survived site one's flush.
    assert_eq!(cache.stats().hits, 2);
    assert_eq!(cache.stats().entries, 1);
}
