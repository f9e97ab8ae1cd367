//! Quiz domain DDL for both schema profiles.
//!
//! # Invariants
//! - Both profiles create the same columns; the optimized profile only adds
//!   composite indexes and the query-performance table, so later version
//!   steps apply unchanged on either.
//! - Index names are prefixed with their table name (SQLite index names are
//!   database-global).

use super::maintenance::COMPOSITE_INDEXES;
use crate::config::StoreConfig;

/// Fully prefixed names of every table the schema owns.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchemaTables {
    pub results: String,
    pub archetypes: String,
    pub questions: String,
    pub quizzes: String,
    pub prospects: String,
    pub email_log: String,
    pub templates: String,
    pub performance: String,
}

impl SchemaTables {
    pub fn new(config: &StoreConfig) -> Self {
        Self {
            results: config.table("results"),
            archetypes: config.table("archetypes"),
            questions: config.table("questions"),
            quizzes: config.table("quizzes"),
            prospects: config.table("prospects"),
            email_log: config.table("email_log"),
            templates: config.table("templates"),
            performance: config.performance_table_name(),
        }
    }

    /// Domain tables in drop order.
    pub fn domain(&self) -> [&str; 7] {
        [
            self.email_log.as_str(),
            self.prospects.as_str(),
            self.results.as_str(),
            self.questions.as_str(),
            self.archetypes.as_str(),
            self.quizzes.as_str(),
            self.templates.as_str(),
        ]
    }

    /// Tables that receive `ANALYZE` during maintenance.
    pub fn hot(&self) -> [&str; 5] {
        [
            self.quizzes.as_str(),
            self.questions.as_str(),
            self.archetypes.as_str(),
            self.results.as_str(),
            self.prospects.as_str(),
        ]
    }

    /// Resolves a short table name (`"results"`) to its prefixed form.
    pub fn resolve(&self, short: &str) -> Option<&str> {
        let table = match short {
            "results" => &self.results,
            "archetypes" => &self.archetypes,
            "questions" => &self.questions,
            "quizzes" => &self.quizzes,
            "prospects" => &self.prospects,
            "email_log" => &self.email_log,
            "templates" => &self.templates,
            "query_performance" => &self.performance,
            _ => return None,
        };
        Some(table.as_str())
    }
}

pub(super) fn create_standard_sql(t: &SchemaTables) -> String {
    format!(
        "CREATE TABLE IF NOT EXISTS {results} (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            user_id INTEGER,
            quiz_id INTEGER NOT NULL,
            archetype_id INTEGER NOT NULL,
            answers TEXT NOT NULL,
            score REAL NOT NULL DEFAULT 0,
            ip_address TEXT,
            user_agent TEXT,
            completed_at TEXT NOT NULL,
            created_at TEXT NOT NULL DEFAULT (datetime('now'))
        );
        CREATE INDEX IF NOT EXISTS {results}_user_id ON {results} (user_id);
        CREATE INDEX IF NOT EXISTS {results}_quiz_id ON {results} (quiz_id);
        CREATE INDEX IF NOT EXISTS {results}_archetype_id ON {results} (archetype_id);
        CREATE INDEX IF NOT EXISTS {results}_completed_at ON {results} (completed_at);

        CREATE TABLE IF NOT EXISTS {archetypes} (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            name TEXT NOT NULL,
            slug TEXT NOT NULL UNIQUE,
            description TEXT,
            characteristics TEXT,
            recommendations TEXT,
            image_url TEXT,
            color TEXT,
            sort_order INTEGER NOT NULL DEFAULT 0,
            is_active INTEGER NOT NULL DEFAULT 1,
            created_at TEXT NOT NULL DEFAULT (datetime('now')),
            updated_at TEXT NOT NULL DEFAULT (datetime('now'))
        );
        CREATE INDEX IF NOT EXISTS {archetypes}_is_active ON {archetypes} (is_active);
        CREATE INDEX IF NOT EXISTS {archetypes}_sort_order ON {archetypes} (sort_order);

        CREATE TABLE IF NOT EXISTS {questions} (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            quiz_id INTEGER NOT NULL,
            question TEXT NOT NULL,
            question_type TEXT NOT NULL DEFAULT 'single_choice',
            options TEXT,
            archetype_weights TEXT,
            sort_order INTEGER NOT NULL DEFAULT 0,
            is_required INTEGER NOT NULL DEFAULT 1,
            is_active INTEGER NOT NULL DEFAULT 1,
            created_at TEXT NOT NULL DEFAULT (datetime('now')),
            updated_at TEXT NOT NULL DEFAULT (datetime('now'))
        );
        CREATE INDEX IF NOT EXISTS {questions}_quiz_id ON {questions} (quiz_id);
        CREATE INDEX IF NOT EXISTS {questions}_is_active ON {questions} (is_active);
        CREATE INDEX IF NOT EXISTS {questions}_sort_order ON {questions} (sort_order);

        CREATE TABLE IF NOT EXISTS {quizzes} (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            title TEXT NOT NULL,
            slug TEXT NOT NULL UNIQUE,
            description TEXT,
            settings TEXT,
            is_active INTEGER NOT NULL DEFAULT 1,
            created_at TEXT NOT NULL DEFAULT (datetime('now')),
            updated_at TEXT NOT NULL DEFAULT (datetime('now'))
        );
        CREATE INDEX IF NOT EXISTS {quizzes}_is_active ON {quizzes} (is_active);

        CREATE TABLE IF NOT EXISTS {prospects} (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            result_id INTEGER NOT NULL,
            first_name TEXT,
            last_name TEXT,
            email TEXT NOT NULL UNIQUE,
            phone TEXT,
            company TEXT,
            consent_marketing INTEGER NOT NULL DEFAULT 0,
            consent_terms INTEGER NOT NULL DEFAULT 1,
            metadata TEXT,
            created_at TEXT NOT NULL DEFAULT (datetime('now')),
            updated_at TEXT NOT NULL DEFAULT (datetime('now'))
        );
        CREATE INDEX IF NOT EXISTS {prospects}_result_id ON {prospects} (result_id);
        CREATE INDEX IF NOT EXISTS {prospects}_created_at ON {prospects} (created_at);

        CREATE TABLE IF NOT EXISTS {email_log} (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            result_id INTEGER,
            recipient_email TEXT NOT NULL,
            email_type TEXT NOT NULL,
            subject TEXT NOT NULL,
            status TEXT NOT NULL DEFAULT 'pending',
            attempts INTEGER NOT NULL DEFAULT 0,
            sent_at TEXT,
            error_message TEXT,
            created_at TEXT NOT NULL DEFAULT (datetime('now'))
        );
        CREATE INDEX IF NOT EXISTS {email_log}_result_id ON {email_log} (result_id);
        CREATE INDEX IF NOT EXISTS {email_log}_recipient_email ON {email_log} (recipient_email);
        CREATE INDEX IF NOT EXISTS {email_log}_status ON {email_log} (status);
        CREATE INDEX IF NOT EXISTS {email_log}_created_at ON {email_log} (created_at);

        CREATE TABLE IF NOT EXISTS {templates} (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            template_key TEXT NOT NULL,
            field TEXT NOT NULL,
            value TEXT,
            created_at TEXT NOT NULL DEFAULT (datetime('now')),
            updated_at TEXT NOT NULL DEFAULT (datetime('now')),
            UNIQUE (template_key, field)
        );
        CREATE INDEX IF NOT EXISTS {templates}_template_key ON {templates} (template_key);",
        results = t.results,
        archetypes = t.archetypes,
        questions = t.questions,
        quizzes = t.quizzes,
        prospects = t.prospects,
        email_log = t.email_log,
        templates = t.templates,
    )
}

/// Standard tables plus every composite index and the performance table.
pub(super) fn create_optimized_sql(t: &SchemaTables) -> String {
    let mut sql = create_standard_sql(t);
    sql.push('\n');
    sql.push_str(&format!(
        "CREATE INDEX IF NOT EXISTS {quizzes}_created_at ON {quizzes} (created_at);",
        quizzes = t.quizzes
    ));
    for index in COMPOSITE_INDEXES {
        if let Some(table) = t.resolve(index.table) {
            sql.push('\n');
            sql.push_str(&index.create_sql(table));
        }
    }
    sql.push('\n');
    sql.push_str(&create_performance_sql(&t.performance));
    sql
}

pub(super) fn create_performance_sql(table: &str) -> String {
    format!(
        "CREATE TABLE IF NOT EXISTS {table} (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            query_type TEXT NOT NULL,
            query_hash TEXT NOT NULL,
            execution_time REAL NOT NULL,
            memory_usage INTEGER NOT NULL,
            timestamp TEXT NOT NULL DEFAULT (datetime('now'))
        );
        CREATE INDEX IF NOT EXISTS {table}_query_type ON {table} (query_type);
        CREATE INDEX IF NOT EXISTS {table}_timestamp ON {table} (timestamp);
        CREATE INDEX IF NOT EXISTS {table}_type_time ON {table} (query_type, execution_time);"
    )
}

/// Drops every domain table plus the performance table when present.
pub(super) fn drop_all_sql(t: &SchemaTables) -> String {
    t.domain()
        .into_iter()
        .chain([t.performance.as_str()])
        .map(|table| format!("DROP TABLE IF EXISTS {table};"))
        .collect::<Vec<_>>()
        .join("\n")
}
