//! Opt-in timing of repository calls.
//!
//! Calls at or above the slow threshold are logged as warnings. When the
//! performance table exists, every timed call also leaves one row there.

use super::naming::fnv1a_hex;
use super::RepoResult;
use crate::config::StoreConfig;
use crate::db::table_exists;
use crate::logging::StoreLogger;
use rusqlite::{params, Connection};
use std::sync::Arc;
use std::time::Duration;

pub struct QueryMonitor<'conn> {
    conn: &'conn Connection,
    label: String,
    performance_table: Option<String>,
    slow_threshold: Duration,
    logger: Arc<dyn StoreLogger>,
}

impl<'conn> QueryMonitor<'conn> {
    /// `None` unless `config.monitor_queries` is set.
    pub fn try_new(
        conn: &'conn Connection,
        table: &str,
        config: &StoreConfig,
        logger: Arc<dyn StoreLogger>,
    ) -> RepoResult<Option<Self>> {
        if !config.monitor_queries {
            return Ok(None);
        }
        let performance = config.performance_table_name();
        let performance_table = if table_exists(conn, &performance)? {
            Some(performance)
        } else {
            None
        };
        Ok(Some(Self {
            conn,
            label: table.to_string(),
            performance_table,
            slow_threshold: Duration::from_millis(config.slow_query_ms),
            logger,
        }))
    }

    pub fn record(&self, query_type: &str, elapsed: Duration, payload_bytes: usize) {
        let label = format!("{}::{query_type}", self.label);
        if elapsed >= self.slow_threshold {
            self.logger.warning(
                "slow_query_detected",
                &[
                    ("query", label.clone()),
                    ("elapsed_ms", format!("{:.3}", elapsed.as_secs_f64() * 1000.0)),
                ],
            );
        }

        let Some(table) = &self.performance_table else {
            return;
        };
        let written = self.conn.execute(
            &format!(
                "INSERT INTO {table} (query_type, query_hash, execution_time, memory_usage)
                 VALUES (?1, ?2, ?3, ?4);"
            ),
            params![
                label,
                fnv1a_hex(query_type),
                elapsed.as_secs_f64(),
                i64::try_from(payload_bytes).unwrap_or(i64::MAX),
            ],
        );
        if let Err(err) = written {
            self.logger.warning(
                "query_performance_write_failed",
                &[("table", table.clone()), ("error", err.to_string())],
            );
        }
    }
}
