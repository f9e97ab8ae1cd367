//! Prospect (lead) repository.
//!
//! # Responsibility
//! - Look up leads by email or by the archetype of their quiz result.
//! - Keep one row per email: `create` for a known email updates that row.
//!
//! # Invariants
//! - `email` never changes after insert; updates drop it silently.

use super::base::SqliteRepository;
use super::{Page, RepoResult, Repository, RepositoryContext};
use crate::model::record::{integer, text, Record};
use crate::query::{Direction, Operator};
use rusqlite::types::Value;
use rusqlite::Connection;

pub const PROSPECTS: &str = "prospects";
const RESULTS: &str = "results";
const EMAIL: &str = "email";

pub struct ProspectRepository<'conn> {
    base: SqliteRepository<'conn>,
    results_table: String,
}

impl<'conn> ProspectRepository<'conn> {
    pub fn try_new(conn: &'conn Connection, context: &RepositoryContext) -> RepoResult<Self> {
        Ok(Self {
            base: SqliteRepository::for_table(conn, PROSPECTS, context)?,
            results_table: context.config.table(RESULTS),
        })
    }

    pub fn base(&self) -> &SqliteRepository<'conn> {
        &self.base
    }

    pub fn find_by_email(&self, email: &str) -> Option<Record> {
        self.base.find_by(EMAIL, &text(email))
    }

    /// Leads whose quiz result landed on `archetype_id`, newest first.
    pub fn get_by_archetype(&self, archetype_id: i64) -> Vec<Record> {
        let prospects = self.base.table();
        let results = &self.results_table;
        let query = self
            .base
            .query()
            .select([format!("{prospects}.*")])
            .join(
                results.as_str(),
                format!("{prospects}.result_id"),
                Operator::Eq,
                format!("{results}.id"),
            )
            .where_eq(format!("{results}.archetype_id"), archetype_id)
            .order_by(format!("{prospects}.created_at"), Direction::Desc)
            .order_by(format!("{prospects}.id"), Direction::Desc);

        query.get().unwrap_or_else(|err| {
            self.base
                .log_failure("get_by_archetype", &archetype_id.to_string(), &err);
            Vec::new()
        })
    }
}

impl Repository for ProspectRepository<'_> {
    fn find(&self, id: i64) -> Option<Record> {
        self.base.find(id)
    }

    fn find_by(&self, column: &str, value: &Value) -> Option<Record> {
        self.base.find_by(column, value)
    }

    fn all(&self, order: &[(&str, Direction)]) -> Vec<Record> {
        self.base.all(order)
    }

    fn paginate(&self, page: u64, per_page: u64, order: &[(&str, Direction)]) -> Page {
        self.base.paginate(page, per_page, order)
    }

    /// Inserts a new lead, or updates the existing lead with the same email
    /// and returns its id.
    fn create(&self, data: Record) -> Option<i64> {
        let existing = match data.get(EMAIL) {
            Some(Value::Text(email)) => self.find_by_email(email),
            _ => None,
        };

        match existing.as_ref().and_then(|row| integer(row, "id")) {
            Some(id) => self.update(id, data).then_some(id),
            None => self.base.create(data),
        }
    }

    fn update(&self, id: i64, mut data: Record) -> bool {
        data.remove(EMAIL);
        if data.is_empty() {
            // Only the email was supplied; the row already holds it.
            return self.base.exists(id);
        }
        self.base.update(id, data)
    }

    fn delete(&self, id: i64) -> bool {
        self.base.delete(id)
    }

    fn exists(&self, id: i64) -> bool {
        self.base.exists(id)
    }

    fn count(&self, conditions: &Record) -> u64 {
        self.base.count(conditions)
    }
}
