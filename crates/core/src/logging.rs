use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::{Arc, Mutex};

#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Debug,
    Info,
    Warn,
    Error,
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            LogLevel::Debug => "DEBUG",
            LogLevel::Info => "INFO",
            LogLevel::Warn => "WARN",
            LogLevel::Error => "ERROR",
        };
        f.write_str(label)
    }
}

impl From<LogLevel> for log::Level {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Debug => log::Level::Debug,
            LogLevel::Info => log::Level::Info,
            LogLevel::Warn => log::Level::Warn,
            LogLevel::Error => log::Level::Error,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct LogRecord {
    pub level: LogLevel,
    pub target: String,
    pub message: String,
}

impl LogRecord {
    pub fn new(level: LogLevel, target: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            level,
            target: target.into(),
            message: message.into(),
        }
    }

    pub fn warn(target: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(LogLevel::Warn, target, message)
    }

    pub fn info(target: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(LogLevel::Info, target, message)
    }
}

pub trait LogSink: Send + Sync {
    fn log(&self, record: LogRecord);
}

pub type SharedLogSink = Arc<dyn LogSink>;

#[derive(Default)]
pub struct NullLogSink;

impl LogSink for NullLogSink {
    fn log(&self, _record: LogRecord) {}
}

/// Keeps every record in memory; used by tests to assert on warnings.
#[derive(Default)]
pub struct VecLogSink {
    records: Mutex<Vec<LogRecord>>,
}

impl VecLogSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn records(&self) -> Vec<LogRecord> {
        self.records
            .lock()
            .map(|guard| guard.clone())
            .unwrap_or_default()
    }

    pub fn count_at(&self, level: LogLevel) -> usize {
        self.records
            .lock()
            .map(|guard| guard.iter().filter(|r| r.level == level).count())
            .unwrap_or_default()
    }
}

impl LogSink for VecLogSink {
    fn log(&self, record: LogRecord) {
        if let Ok(mut guard) = self.records.lock() {
            guard.push(record);
        }
    }
}

/// Forwards records to the `log` facade so they reach whatever logger the binary installed.
#[derive(Default, Clone)]
pub struct LogCrateSink;

impl LogCrateSink {
    pub fn shared() -> SharedLogSink {
        Arc::new(Self)
    }
}

impl LogSink for LogCrateSink {
    fn log(&self, record: LogRecord) {
        let level: log::Level = record.level.into();
        log::log!(target: record.target.as_str(), level, "{}", record.message);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn vec_sink_counts_by_level() {
        let sink = VecLogSink::new();
        sink.log(LogRecord::warn("guardrails", "config missing"));
        sink.log(LogRecord::info("guardrails", "config loaded"));
        sink.log(LogRecord::warn("guardrails", "config unparsable"));

        assert_eq!(sink.count_at(LogLevel::Warn), 2);
        assert_eq!(sink.records()[1].message, "config loaded");
    }
}
