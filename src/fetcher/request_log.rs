//! Append-only NDJSON log with one record per HTTP attempt

use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::PathBuf;
use std::sync::Mutex;
use tracing::warn;

/// One logged attempt
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RequestRecord {
    /// When the attempt finished
    pub timestamp_utc: String,
    /// HTTP method
    pub method: String,
    /// Request URL without query string
    pub url: String,
    /// Query parameters
    pub params: BTreeMap<String, String>,
    /// 1-based attempt number
    pub attempt: u32,
    /// HTTP status, absent on transport failure
    pub status: Option<u16>,
    /// Body size in bytes
    pub bytes: Option<usize>,
    /// Attempt duration in milliseconds
    pub duration_ms: f64,
    /// Error text, absent on success
    pub error: Option<String>,
}

impl RequestRecord {
    /// Start a record for `method url` stamped with the current time
    pub fn new(method: &str, url: &str, params: &[(&str, String)], attempt: u32) -> Self {
        Self {
            timestamp_utc: crate::isoformat_utc(Utc::now()),
            method: method.to_uppercase(),
            url: url.to_string(),
            params: params
                .iter()
                .map(|(k, v)| (k.to_string(), v.clone()))
                .collect(),
            attempt,
            status: None,
            bytes: None,
            duration_ms: 0.0,
            error: None,
        }
    }
}

/// NDJSON request log
#[derive(Debug)]
pub struct RequestLog {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl RequestLog {
    /// Log to `path`, creating parent directories on first write
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    /// Append one record.
    ///
    /// Logging failures are reported through tracing and never fail the request.
    pub fn append(&self, record: &RequestRecord) {
        if let Err(e) = self.try_append(record) {
            warn!(path = %self.path.display(), error = %e, "Failed to append request log record");
        }
    }

    fn try_append(&self, record: &RequestRecord) -> std::io::Result<()> {
        let _guard = self
            .write_lock
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let mut line = serde_json::to_string(record)?;
        line.push('\n');
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        file.write_all(line.as_bytes())
    }
}
