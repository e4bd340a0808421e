//! Step-by-step log for acceptance tests.
//!
//! Each entry records elapsed time, level, category and optional key-value
//! context. The harness prints the log when a test panics so a failing step can
//! be read in order with the configuration that was applied.
//!
//! ```ignore
//! let logger = TestLogger::new();
//! logger.info_ctx("apply", "Applying step config", |ctx| {
//!     ctx.push(("step".into(), "2".into()));
//!     ctx.push(("private_key".into(), key));   // shown as [REDACTED]
//! });
//! ```

#![allow(dead_code)]

use serde::Serialize;
use std::fmt::Write as _;
use std::sync::Mutex;
use std::time::{Duration, Instant};

const REDACTED_VALUE: &str = "[REDACTED]";
const REDACTION_KEYS: [&str; 7] = [
    "authorization",
    "fingerprint",
    "pass_phrase",
    "password",
    "private_key",
    "secret",
    "token",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Debug,
    Info,
    Warn,
    Error,
}

impl LogLevel {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Debug => "DEBUG",
            Self::Info => "INFO ",
            Self::Warn => "WARN ",
            Self::Error => "ERROR",
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct LogEntry {
    pub elapsed_ms: u64,
    pub level: LogLevel,
    pub category: String,
    pub message: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub context: Vec<(String, String)>,
}

impl LogEntry {
    pub fn format(&self) -> String {
        #[allow(clippy::cast_precision_loss)]
        let secs = self.elapsed_ms as f64 / 1000.0;
        let mut output = format!(
            "[{secs:8.3}s] {} [{}] {}\n",
            self.level.as_str(),
            self.category,
            self.message
        );
        for (key, value) in &self.context {
            let _ = writeln!(output, "             {key} = {value}");
        }
        output
    }
}

fn is_sensitive(key: &str) -> bool {
    let key = key.to_ascii_lowercase();
    REDACTION_KEYS.iter().any(|needle| key.contains(needle))
}

fn redact_context(context: &mut [(String, String)]) {
    for (key, value) in context.iter_mut() {
        if is_sensitive(key) {
            *value = REDACTED_VALUE.to_string();
        }
    }
}

pub struct TestLogger {
    entries: Mutex<Vec<LogEntry>>,
    start: Instant,
    min_level: LogLevel,
}

impl Default for TestLogger {
    fn default() -> Self {
        Self::new()
    }
}

impl TestLogger {
    #[must_use]
    pub fn new() -> Self {
        Self::with_min_level(LogLevel::Debug)
    }

    #[must_use]
    pub fn with_min_level(min_level: LogLevel) -> Self {
        Self {
            entries: Mutex::new(Vec::with_capacity(64)),
            start: Instant::now(),
            min_level,
        }
    }

    fn elapsed_ms(&self) -> u64 {
        u64::try_from(self.start.elapsed().as_millis()).unwrap_or(u64::MAX)
    }

    pub fn with_context<F>(&self, level: LogLevel, category: &str, message: impl Into<String>, f: F)
    where
        F: FnOnce(&mut Vec<(String, String)>),
    {
        if level < self.min_level {
            return;
        }
        let mut context = Vec::new();
        f(&mut context);
        redact_context(&mut context);
        let entry = LogEntry {
            elapsed_ms: self.elapsed_ms(),
            level,
            category: category.to_string(),
            message: message.into(),
            context,
        };
        self.entries.lock().unwrap().push(entry);
    }

    pub fn log(&self, level: LogLevel, category: &str, message: impl Into<String>) {
        self.with_context(level, category, message, |_| {});
    }

    pub fn debug(&self, category: &str, message: impl Into<String>) {
        self.log(LogLevel::Debug, category, message);
    }

    pub fn info(&self, category: &str, message: impl Into<String>) {
        self.log(LogLevel::Info, category, message);
    }

    pub fn warn(&self, category: &str, message: impl Into<String>) {
        self.log(LogLevel::Warn, category, message);
    }

    pub fn info_ctx<F>(&self, category: &str, message: impl Into<String>, f: F)
    where
        F: FnOnce(&mut Vec<(String, String)>),
    {
        self.with_context(LogLevel::Info, category, message, f);
    }

    pub fn entry_count(&self) -> usize {
        self.entries.lock().unwrap().len()
    }

    pub fn entries(&self) -> Vec<LogEntry> {
        self.entries.lock().unwrap().clone()
    }

    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }

    /// Plain-text dump of every entry.
    pub fn dump(&self) -> String {
        self.entries
            .lock()
            .unwrap()
            .iter()
            .map(LogEntry::format)
            .collect()
    }

    /// One JSON object per line.
    pub fn dump_jsonl(&self) -> String {
        let entries = self.entries.lock().unwrap();
        let mut output = String::new();
        for entry in entries.iter() {
            if let Ok(line) = serde_json::to_string(entry) {
                output.push_str(&line);
                output.push('\n');
            }
        }
        output
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sensitive_context_is_redacted() {
        let logger = TestLogger::new();
        logger.info_ctx("auth", "signing request", |ctx| {
            ctx.push(("tenancy_ocid".into(), "ocid1.tenancy.oc1..x".into()));
            ctx.push(("Private_Key_Path".into(), "/home/me/.oci/key.pem".into()));
        });
        let dump = logger.dump();
        assert!(dump.contains("ocid1.tenancy.oc1..x"));
        assert!(dump.contains(REDACTED_VALUE));
        assert!(!dump.contains("key.pem"));
    }

    #[test]
    fn min_level_filters() {
        let logger = TestLogger::with_min_level(LogLevel::Warn);
        logger.info("setup", "ignored");
        logger.warn("sweep", "kept");
        assert_eq!(logger.entry_count(), 1);
        assert!(logger.dump_jsonl().contains("\"level\":\"warn\""));
    }
}
