//! Ledger-driven migration executor.

use super::ledger::{self, LedgerEntry};
use super::registry::{class_name, MigrationRegistry};
use super::{MigrationError, MigrationResult};
use crate::db::DbResult;
use crate::logging::StoreLogger;
use rusqlite::{Connection, Transaction, TransactionBehavior};
use serde::Serialize;
use std::collections::BTreeSet;
use std::sync::Arc;

/// Outcome of one `run()`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RunReport {
    /// Batch shared by every applied migration; `None` when nothing ran.
    pub batch: Option<i64>,
    pub applied: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MigrationLists {
    pub completed: Vec<String>,
    pub pending: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MigrationStatus {
    pub total: usize,
    pub completed: usize,
    pub pending: usize,
    pub migrations: MigrationLists,
}

/// Applies and rolls back registered migrations against one ledger table.
///
/// Each migration runs inside its own `BEGIN IMMEDIATE` transaction, so the
/// connection must not be inside a caller transaction.
pub struct Migrator<'conn> {
    conn: &'conn Connection,
    ledger_table: String,
    registry: MigrationRegistry,
    logger: Arc<dyn StoreLogger>,
}

impl<'conn> Migrator<'conn> {
    pub fn new(
        conn: &'conn Connection,
        ledger_table: impl Into<String>,
        registry: MigrationRegistry,
        logger: Arc<dyn StoreLogger>,
    ) -> Self {
        Self {
            conn,
            ledger_table: ledger_table.into(),
            registry,
            logger,
        }
    }

    pub fn ledger_table(&self) -> &str {
        &self.ledger_table
    }

    pub fn registry(&self) -> &MigrationRegistry {
        &self.registry
    }

    /// Applies every pending migration in name order under one new batch.
    ///
    /// Stops at the first failure; migrations applied before it stay
    /// recorded, later ones stay pending.
    pub fn run(&self) -> MigrationResult<RunReport> {
        ledger::ensure(self.conn, &self.ledger_table)?;
        let applied = self.applied_names()?;
        let pending = self
            .registry
            .iter()
            .filter(|(name, _)| !applied.contains(*name))
            .collect::<Vec<_>>();

        if pending.is_empty() {
            self.logger.info(
                "migrations_up_to_date",
                &[("ledger", self.ledger_table.clone())],
            );
            return Ok(RunReport {
                batch: None,
                applied: Vec::new(),
            });
        }

        let batch = ledger::max_batch(self.conn, &self.ledger_table)? + 1;
        let mut report = RunReport {
            batch: Some(batch),
            applied: Vec::with_capacity(pending.len()),
        };

        for (name, migration) in pending {
            self.logger.info(
                "migration_started",
                &[
                    ("migration", name.to_string()),
                    ("class", class_name(name)),
                    ("batch", batch.to_string()),
                ],
            );
            self.in_transaction(name, "up", |conn| {
                migration.up(conn)?;
                ledger::record(conn, &self.ledger_table, name, batch)
            })?;
            self.logger.info(
                "migration_applied",
                &[("migration", name.to_string()), ("batch", batch.to_string())],
            );
            report.applied.push(name.to_string());
        }

        Ok(report)
    }

    /// Rolls back the newest `steps` batches, newest first. Returns the
    /// rolled-back names in the order their `down` ran.
    pub fn rollback(&self, steps: u32) -> MigrationResult<Vec<String>> {
        if !ledger::exists(self.conn, &self.ledger_table)? {
            self.logger.info(
                "migrations_nothing_to_rollback",
                &[("ledger", self.ledger_table.clone())],
            );
            return Ok(Vec::new());
        }

        let batches = ledger::batches_desc(self.conn, &self.ledger_table)?;
        let take = usize::try_from(steps).unwrap_or(usize::MAX);
        if batches.is_empty() || take == 0 {
            self.logger.info(
                "migrations_nothing_to_rollback",
                &[("ledger", self.ledger_table.clone())],
            );
            return Ok(Vec::new());
        }

        let mut rolled_back = Vec::new();
        for batch in batches.into_iter().take(take) {
            rolled_back.extend(self.rollback_batch(batch)?);
        }
        Ok(rolled_back)
    }

    /// Rolls back every batch, newest first.
    ///
    /// Fails closed: without `confirm` nothing happens and `None` is returned.
    pub fn reset(&self, confirm: bool) -> MigrationResult<Option<Vec<String>>> {
        if !confirm {
            self.logger.warning(
                "migrations_reset_unconfirmed",
                &[("ledger", self.ledger_table.clone())],
            );
            return Ok(None);
        }
        if !ledger::exists(self.conn, &self.ledger_table)? {
            return Ok(Some(Vec::new()));
        }

        let mut rolled_back = Vec::new();
        for batch in ledger::batches_desc(self.conn, &self.ledger_table)? {
            rolled_back.extend(self.rollback_batch(batch)?);
        }
        self.logger.info(
            "migrations_reset",
            &[
                ("ledger", self.ledger_table.clone()),
                ("count", rolled_back.len().to_string()),
            ],
        );
        Ok(Some(rolled_back))
    }

    /// Completed and pending names. Never creates or changes the ledger.
    pub fn status(&self) -> MigrationResult<MigrationStatus> {
        let completed = self
            .entries()?
            .into_iter()
            .map(|entry| entry.migration)
            .collect::<Vec<_>>();
        let done = completed.iter().map(String::as_str).collect::<BTreeSet<_>>();
        let pending = self
            .registry
            .iter()
            .map(|(name, _)| name)
            .filter(|name| !done.contains(name))
            .map(str::to_string)
            .collect::<Vec<_>>();

        Ok(MigrationStatus {
            total: self.registry.len(),
            completed: completed.len(),
            pending: pending.len(),
            migrations: MigrationLists { completed, pending },
        })
    }

    /// Ledger rows in application order; empty when the ledger is missing.
    pub fn entries(&self) -> MigrationResult<Vec<LedgerEntry>> {
        if !ledger::exists(self.conn, &self.ledger_table)? {
            return Ok(Vec::new());
        }
        Ok(ledger::entries(self.conn, &self.ledger_table)?)
    }

    /// Records `names` as applied under one new batch without running them.
    ///
    /// Names already in the ledger are skipped. Returns the batch used, or
    /// `None` when every name was already recorded.
    pub fn baseline(&self, names: &[String]) -> MigrationResult<Option<i64>> {
        for name in names {
            if !self.registry.contains(name) {
                return Err(MigrationError::UnknownMigration(name.clone()));
            }
        }
        ledger::ensure(self.conn, &self.ledger_table)?;

        let mut missing = Vec::new();
        for name in names {
            if !ledger::is_recorded(self.conn, &self.ledger_table, name)? {
                missing.push(name.as_str());
            }
        }
        let Some(first) = missing.first().copied() else {
            return Ok(None);
        };

        let batch = ledger::max_batch(self.conn, &self.ledger_table)? + 1;
        self.in_transaction(first, "baseline", |conn| {
            for name in &missing {
                ledger::record(conn, &self.ledger_table, name, batch)?;
            }
            Ok(())
        })?;
        self.logger.info(
            "migrations_baselined",
            &[
                ("ledger", self.ledger_table.clone()),
                ("batch", batch.to_string()),
                ("count", missing.len().to_string()),
            ],
        );
        Ok(Some(batch))
    }

    fn applied_names(&self) -> MigrationResult<BTreeSet<String>> {
        Ok(ledger::entries(self.conn, &self.ledger_table)?
            .into_iter()
            .map(|entry| entry.migration)
            .collect())
    }

    fn rollback_batch(&self, batch: i64) -> MigrationResult<Vec<String>> {
        let names = ledger::batch_members_desc(self.conn, &self.ledger_table, batch)?;
        let mut rolled_back = Vec::with_capacity(names.len());

        for name in names {
            let Some(migration) = self.registry.get(&name) else {
                self.logger.error(
                    "migration_rollback_failed",
                    &[
                        ("migration", name.clone()),
                        ("batch", batch.to_string()),
                        ("error", "not registered".to_string()),
                    ],
                );
                return Err(MigrationError::UnknownMigration(name));
            };

            self.logger.info(
                "migration_rollback_started",
                &[
                    ("migration", name.clone()),
                    ("class", class_name(&name)),
                    ("batch", batch.to_string()),
                ],
            );
            self.in_transaction(&name, "down", |conn| {
                migration.down(conn)?;
                ledger::remove(conn, &self.ledger_table, &name)
            })?;
            self.logger.info(
                "migration_rolled_back",
                &[("migration", name.clone()), ("batch", batch.to_string())],
            );
            rolled_back.push(name);
        }

        Ok(rolled_back)
    }

    fn in_transaction<T>(
        &self,
        migration: &str,
        direction: &str,
        work: impl FnOnce(&Connection) -> DbResult<T>,
    ) -> MigrationResult<T> {
        let outcome: DbResult<T> = Transaction::new_unchecked(self.conn, TransactionBehavior::Immediate)
            .map_err(Into::into)
            .and_then(|tx| {
                let value = work(self.conn)?;
                tx.commit()?;
                Ok(value)
            });

        outcome.map_err(|source| {
            self.logger.error(
                "migration_failed",
                &[
                    ("migration", migration.to_string()),
                    ("direction", direction.to_string()),
                    ("error", source.to_string()),
                ],
            );
            MigrationError::Failed {
                migration: migration.to_string(),
                source,
            }
        })
    }
}
