//! Structured leveled logging sink injected into persistence components.

use super::sanitize_message;
use std::sync::Mutex;

const MAX_CONTEXT_VALUE_CHARS: usize = 200;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    Info,
    Warning,
    Error,
}

/// One captured log call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogEntry {
    pub level: LogLevel,
    pub message: String,
    pub context: Vec<(String, String)>,
}

impl LogEntry {
    /// Returns the context value recorded under `key`.
    pub fn context_value(&self, key: &str) -> Option<&str> {
        self.context
            .iter()
            .find(|(name, _)| name == key)
            .map(|(_, value)| value.as_str())
    }
}

/// Logger contract: `message` is a stable event label, `context` carries
/// metadata such as table, key and error text.
pub trait StoreLogger: Send + Sync {
    fn log(&self, level: LogLevel, message: &str, context: &[(&str, String)]);

    fn info(&self, message: &str, context: &[(&str, String)]) {
        self.log(LogLevel::Info, message, context);
    }

    fn warning(&self, message: &str, context: &[(&str, String)]) {
        self.log(LogLevel::Warning, message, context);
    }

    fn error(&self, message: &str, context: &[(&str, String)]) {
        self.log(LogLevel::Error, message, context);
    }
}

/// Forwards to the `log` facade as `event=<message> key=value ...` lines.
#[derive(Debug, Clone, Copy, Default)]
pub struct FacadeLogger;

impl StoreLogger for FacadeLogger {
    fn log(&self, level: LogLevel, message: &str, context: &[(&str, String)]) {
        let mut line = format!("event={message}");
        for (key, value) in context {
            line.push(' ');
            line.push_str(key);
            line.push('=');
            line.push_str(&sanitize_message(value, MAX_CONTEXT_VALUE_CHARS));
        }

        match level {
            LogLevel::Info => log::info!("{line}"),
            LogLevel::Warning => log::warn!("{line}"),
            LogLevel::Error => log::error!("{line}"),
        }
    }
}

/// Keeps every entry in memory. Used by tests and diagnostics tooling.
#[derive(Debug, Default)]
pub struct MemoryLogger {
    entries: Mutex<Vec<LogEntry>>,
}

impl MemoryLogger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn entries(&self) -> Vec<LogEntry> {
        match self.entries.lock() {
            Ok(entries) => entries.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    /// Entries logged at `level`, in call order.
    pub fn at_level(&self, level: LogLevel) -> Vec<LogEntry> {
        self.entries()
            .into_iter()
            .filter(|entry| entry.level == level)
            .collect()
    }
}

impl StoreLogger for MemoryLogger {
    fn log(&self, level: LogLevel, message: &str, context: &[(&str, String)]) {
        let entry = LogEntry {
            level,
            message: message.to_string(),
            context: context
                .iter()
                .map(|(key, value)| ((*key).to_string(), value.clone()))
                .collect(),
        };
        match self.entries.lock() {
            Ok(mut entries) => entries.push(entry),
            Err(poisoned) => poisoned.into_inner().push(entry),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{LogLevel, MemoryLogger, StoreLogger};

    #[test]
    fn memory_logger_records_level_and_context() {
        let logger = MemoryLogger::new();
        logger.error(
            "repository_find_failed",
            &[("table", "wp_money_quiz_quizzes".to_string()), ("key", "7".to_string())],
        );
        logger.info("repository_record_created", &[]);

        let errors = logger.at_level(LogLevel::Error);
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].message, "repository_find_failed");
        assert_eq!(errors[0].context_value("key"), Some("7"));
        assert_eq!(logger.entries().len(), 2);
    }
}
