//! Debug event log and pipeline stage tracking
//!
//! The debug log is an opt-in JSONL stream, one object per line:
//! `{"ts": ..., "event": ..., "cid": ..., ...fields}`. It never writes to
//! stdout and never fails the caller: write errors are dropped and a log file
//! that cannot be opened disables the log.
//!
//! Query text is never recorded; use [`query_fingerprint`] instead.

use chrono::{SecondsFormat, Utc};
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};
use std::env;
use std::fmt;
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tracing::{debug, warn};
use uuid::Uuid;

pub const DEBUG_VAR: &str = "QUANTCLI_DEBUG";
pub const DEBUG_PATH_VAR: &str = "QUANTCLI_DEBUG_PATH";

//
// ================= Configuration =================
//

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DebugConfig {
    pub enabled: bool,
    pub path: Option<PathBuf>,
}

impl DebugConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|var| env::var(var).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let enabled = lookup(DEBUG_VAR).map(|v| v.trim() == "1").unwrap_or(false);
        let path = lookup(DEBUG_PATH_VAR)
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
            .map(PathBuf::from);
        Self { enabled, path }
    }
}

//
// ================= Sinks =================
//

/// Destination for serialized debug lines (newline not included).
pub trait DebugSink: Send + Sync {
    fn write_line(&self, line: &str) -> std::io::Result<()>;
}

pub struct StderrSink;

impl DebugSink for StderrSink {
    fn write_line(&self, line: &str) -> std::io::Result<()> {
        let mut stderr = std::io::stderr().lock();
        writeln!(stderr, "{}", line)
    }
}

/// Append-only file sink.
pub struct FileSink {
    file: Mutex<File>,
}

impl FileSink {
    pub fn open(path: &Path) -> std::io::Result<Self> {
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(Self {
            file: Mutex::new(file),
        })
    }
}

impl DebugSink for FileSink {
    fn write_line(&self, line: &str) -> std::io::Result<()> {
        let mut file = self
            .file
            .lock()
            .map_err(|_| std::io::Error::new(std::io::ErrorKind::Other, "debug log lock poisoned"))?;
        writeln!(file, "{}", line)?;
        file.flush()
    }
}

/// In-memory sink for inspecting emitted events.
#[derive(Default)]
pub struct MemorySink {
    lines: Mutex<Vec<String>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn lines(&self) -> Vec<String> {
        self.lines.lock().map(|l| l.clone()).unwrap_or_default()
    }

    /// Parsed records, oldest first.
    pub fn records(&self) -> Vec<Value> {
        self.lines()
            .iter()
            .filter_map(|line| serde_json::from_str(line).ok())
            .collect()
    }
}

impl DebugSink for MemorySink {
    fn write_line(&self, line: &str) -> std::io::Result<()> {
        if let Ok(mut lines) = self.lines.lock() {
            lines.push(line.to_string());
        }
        Ok(())
    }
}

//
// ================= Debug log handle =================
//

/// Cheap-to-clone handle passed to every pipeline component.
#[derive(Clone, Default)]
pub struct DebugLog {
    sink: Option<Arc<dyn DebugSink>>,
}

impl DebugLog {
    pub fn disabled() -> Self {
        Self { sink: None }
    }

    pub fn with_sink(sink: Arc<dyn DebugSink>) -> Self {
        Self { sink: Some(sink) }
    }

    pub fn from_config(config: &DebugConfig) -> Self {
        if !config.enabled {
            return Self::disabled();
        }

        match &config.path {
            None => Self::with_sink(Arc::new(StderrSink)),
            Some(path) => match FileSink::open(path) {
                Ok(sink) => Self::with_sink(Arc::new(sink)),
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "Debug log file unavailable; debug log disabled");
                    Self::disabled()
                }
            },
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.sink.is_some()
    }

    /// Emit one record. `fields` should be a JSON object; other values are
    /// stored under a `data` key.
    pub fn event(&self, event: &str, cid: &CorrelationId, fields: Value) {
        let Some(sink) = &self.sink else {
            return;
        };

        let mut record = Map::new();
        record.insert(
            "ts".to_string(),
            Value::String(Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)),
        );
        record.insert("event".to_string(), Value::String(event.to_string()));
        record.insert("cid".to_string(), Value::String(cid.to_string()));

        match fields {
            Value::Object(extra) => {
                for (key, value) in extra {
                    record.entry(key).or_insert(value);
                }
            }
            Value::Null => {}
            other => {
                record.insert("data".to_string(), other);
            }
        }

        if let Ok(line) = serde_json::to_string(&Value::Object(record)) {
            if let Err(e) = sink.write_line(&line) {
                debug!(error = %e, "Dropped debug log record");
            }
        }
    }
}

impl fmt::Debug for DebugLog {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DebugLog")
            .field("enabled", &self.is_enabled())
            .finish()
    }
}

//
// ================= Correlation ids =================
//

/// Per-invocation id: the first 12 hex chars of a v4 UUID.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CorrelationId(String);

impl CorrelationId {
    pub fn new() -> Self {
        let mut id = Uuid::new_v4().simple().to_string();
        id.truncate(12);
        Self(id)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for CorrelationId {
    fn default() -> Self {
        Self::new()
    }
}

impl From<&str> for CorrelationId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl fmt::Display for CorrelationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// SHA-256 of the query, first 16 hex chars.
pub fn query_fingerprint(text: &str) -> String {
    let digest = Sha256::digest(text.as_bytes());
    let mut hex = hex::encode(digest);
    hex.truncate(16);
    hex
}

//
// ================= Pipeline stages =================
//

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Received,
    Routed,
    Validated,
    Priced,
    Computed,
    Succeeded,
    Refused,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Received => "received",
            Stage::Routed => "routed",
            Stage::Validated => "validated",
            Stage::Priced => "priced",
            Stage::Computed => "computed",
            Stage::Succeeded => "succeeded",
            Stage::Refused => "refused",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Stage::Succeeded | Stage::Refused)
    }

    fn rank(&self) -> u8 {
        match self {
            Stage::Received => 0,
            Stage::Routed => 1,
            Stage::Validated => 2,
            Stage::Priced => 3,
            Stage::Computed => 4,
            Stage::Succeeded => 5,
            Stage::Refused => 6,
        }
    }

    /// Stages only move forward; any non-terminal stage may jump to `Refused`.
    pub fn can_advance_to(&self, next: Stage) -> bool {
        if self.is_terminal() {
            return false;
        }
        match next {
            Stage::Refused => true,
            Stage::Succeeded => *self == Stage::Computed,
            _ => next.rank() > self.rank(),
        }
    }
}

/// Tracks the current stage of one query and logs every transition.
pub struct StageTracker<'a> {
    log: &'a DebugLog,
    cid: &'a CorrelationId,
    current: Stage,
}

impl<'a> StageTracker<'a> {
    pub fn new(log: &'a DebugLog, cid: &'a CorrelationId, start: Stage) -> Self {
        Self {
            log,
            cid,
            current: start,
        }
    }

    pub fn current(&self) -> Stage {
        self.current
    }

    /// Returns false (and leaves the stage unchanged) for a backward move.
    pub fn advance(&mut self, next: Stage) -> bool {
        if !self.current.can_advance_to(next) {
            warn!(from = self.current.as_str(), to = next.as_str(), "Rejected stage transition");
            return false;
        }

        debug!(cid = %self.cid, from = self.current.as_str(), to = next.as_str(), "Stage transition");
        self.log.event(
            "stage",
            self.cid,
            serde_json::json!({ "from": self.current.as_str(), "to": next.as_str() }),
        );
        self.current = next;
        true
    }
}
