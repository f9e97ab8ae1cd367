//! Archetype repository.

use super::base::SqliteRepository;
use super::{Page, RepoResult, Repository, RepositoryContext};
use crate::model::record::{text, Record};
use crate::query::Direction;
use rusqlite::types::Value;
use rusqlite::Connection;

pub const ARCHETYPES: &str = "archetypes";

pub struct ArchetypeRepository<'conn> {
    base: SqliteRepository<'conn>,
}

impl<'conn> ArchetypeRepository<'conn> {
    pub fn try_new(conn: &'conn Connection, context: &RepositoryContext) -> RepoResult<Self> {
        Ok(Self {
            base: SqliteRepository::for_table(conn, ARCHETYPES, context)?,
        })
    }

    pub fn base(&self) -> &SqliteRepository<'conn> {
        &self.base
    }

    pub fn find_by_slug(&self, slug: &str) -> Option<Record> {
        self.base.find_by("slug", &text(slug))
    }

    /// Active archetypes in display order (`sort_order`, then `name`).
    pub fn find_active(&self) -> Vec<Record> {
        let query = self
            .base
            .query()
            .where_eq("is_active", 1)
            .order_by("sort_order", Direction::Asc)
            .order_by("name", Direction::Asc);

        query.get().unwrap_or_else(|err| {
            self.base.log_failure("find_active", "is_active", &err);
            Vec::new()
        })
    }
}

impl Repository for ArchetypeRepository<'_> {
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

    fn create(&self, data: Record) -> Option<i64> {
        self.base.create(data)
    }

    fn update(&self, id: i64, data: Record) -> bool {
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
