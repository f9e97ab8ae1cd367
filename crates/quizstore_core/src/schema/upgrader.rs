//! Version-scalar upgrade gate on top of the migration ledger.
//!
//! # Responsibility
//! - Read and write the `money_quiz_db_version` option.
//! - Translate an installed legacy version into ledger baseline rows, then
//!   let the ledger migrator apply what is missing.
//!
//! # Invariants
//! - The scalar is written only after the migrator finished without error.
//!   After a failed upgrade the ledger names exactly the steps that applied,
//!   and the scalar still holds the previous version.
//! - A scalar newer than `CURRENT_VERSION` is refused, never downgraded.

use super::{
    registry, steps, SchemaProfile, SchemaResult, SchemaTables, SchemaVersion, CURRENT_VERSION,
};
use crate::config::StoreConfig;
use crate::db::{table_exists, DbError};
use crate::logging::StoreLogger;
use crate::migrate::{Migrator, RunReport};
use rusqlite::{Connection, OptionalExtension};
use serde::Serialize;
use std::sync::Arc;

/// Option row holding the installed schema version.
pub const VERSION_OPTION: &str = "money_quiz_db_version";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UpgradeReport {
    pub from: String,
    pub to: String,
    /// Batch recording steps the legacy version already implied.
    pub baselined_batch: Option<i64>,
    pub run: RunReport,
}

pub struct VersionedUpgrader<'conn> {
    conn: &'conn Connection,
    config: StoreConfig,
    profile: SchemaProfile,
    logger: Arc<dyn StoreLogger>,
}

impl<'conn> VersionedUpgrader<'conn> {
    pub fn new(conn: &'conn Connection, config: StoreConfig, logger: Arc<dyn StoreLogger>) -> Self {
        Self {
            conn,
            config,
            profile: SchemaProfile::Standard,
            logger,
        }
    }

    pub fn with_profile(mut self, profile: SchemaProfile) -> Self {
        self.profile = profile;
        self
    }

    pub fn current_version(&self) -> SchemaVersion {
        CURRENT_VERSION
    }

    /// Installed version, or `0.0.0` when the option (or its table) is absent.
    pub fn installed_version(&self) -> SchemaResult<SchemaVersion> {
        let options = self.config.options_table_name();
        if !table_exists(self.conn, &options)? {
            return Ok(SchemaVersion::NONE);
        }
        let stored: Option<String> = self
            .conn
            .query_row(
                &format!("SELECT option_value FROM {options} WHERE option_name = ?1;"),
                [VERSION_OPTION],
                |row| row.get(0),
            )
            .optional()?;

        match stored {
            Some(value) => Ok(value.parse()?),
            None => Ok(SchemaVersion::NONE),
        }
    }

    /// Ledger migrator over the schema steps of this upgrader's profile.
    pub fn migrator(&self) -> SchemaResult<Migrator<'conn>> {
        Ok(Migrator::new(
            self.conn,
            self.config.ledger_table_name(),
            registry(&self.config, self.profile)?,
            Arc::clone(&self.logger),
        ))
    }

    /// Brings the schema to `CURRENT_VERSION`.
    ///
    /// Steps implied by the installed version are baselined, every other
    /// pending step runs through the ledger migrator, and the scalar is
    /// raised last.
    pub fn upgrade(&self) -> SchemaResult<UpgradeReport> {
        let installed = self.installed_version()?;
        if installed > CURRENT_VERSION {
            return Err(DbError::UnsupportedSchemaVersion {
                db_version: installed.to_string(),
                latest_supported: CURRENT_VERSION.to_string(),
            }
            .into());
        }

        let migrator = self.migrator()?;
        let implied = if installed > SchemaVersion::NONE {
            steps(&self.config, self.profile)
                .into_iter()
                .filter(|step| step.introduced_in.is_some_and(|since| since <= installed))
                .map(|step| step.name().to_string())
                .collect::<Vec<_>>()
        } else {
            Vec::new()
        };
        let baselined_batch = if implied.is_empty() {
            None
        } else {
            migrator.baseline(&implied)?
        };

        let run = match migrator.run() {
            Ok(run) => run,
            Err(err) => {
                self.logger.error(
                    "schema_upgrade_failed",
                    &[
                        ("from", installed.to_string()),
                        ("to", CURRENT_VERSION.to_string()),
                        ("error", err.to_string()),
                    ],
                );
                return Err(err.into());
            }
        };

        if installed < CURRENT_VERSION {
            self.write_version(CURRENT_VERSION)?;
        }
        self.logger.info(
            "schema_upgraded",
            &[
                ("from", installed.to_string()),
                ("to", CURRENT_VERSION.to_string()),
                ("applied", run.applied.len().to_string()),
            ],
        );

        Ok(UpgradeReport {
            from: installed.to_string(),
            to: CURRENT_VERSION.to_string(),
            baselined_batch,
            run,
        })
    }

    /// Drops every schema table, the outbox, the ledger and the version
    /// option. Irreversible.
    pub fn drop_tables(&self) -> SchemaResult<()> {
        let tables = SchemaTables::new(&self.config);
        let mut sql = tables
            .domain()
            .into_iter()
            .chain([tables.performance.as_str()])
            .map(|table| format!("DROP TABLE IF EXISTS {table};"))
            .collect::<Vec<_>>();
        sql.push(format!(
            "DROP TABLE IF EXISTS {};",
            self.config.outbox_table_name()
        ));
        sql.push(format!(
            "DROP TABLE IF EXISTS {};",
            self.config.ledger_table_name()
        ));
        self.conn.execute_batch(&sql.join("\n"))?;

        let options = self.config.options_table_name();
        if table_exists(self.conn, &options)? {
            self.conn.execute(
                &format!("DELETE FROM {options} WHERE option_name = ?1;"),
                [VERSION_OPTION],
            )?;
        }
        self.logger.warning(
            "schema_tables_dropped",
            &[("prefix", self.config.table(""))],
        );
        Ok(())
    }

    fn write_version(&self, version: SchemaVersion) -> SchemaResult<()> {
        let options = self.config.options_table_name();
        self.conn.execute_batch(&format!(
            "CREATE TABLE IF NOT EXISTS {options} (
                option_id INTEGER PRIMARY KEY AUTOINCREMENT,
                option_name TEXT NOT NULL UNIQUE,
                option_value TEXT NOT NULL,
                autoload TEXT NOT NULL DEFAULT 'yes'
            );"
        ))?;
        self.conn.execute(
            &format!(
                "INSERT INTO {options} (option_name, option_value) VALUES (?1, ?2)
                 ON CONFLICT(option_name) DO UPDATE SET option_value = excluded.option_value;"
            ),
            [VERSION_OPTION, version.to_string().as_str()],
        )?;
        Ok(())
    }
}
