//! Append-only JSON Lines audit log for encoding normalization.
//!
//! Each record is serialised into a single buffer (newline included) and
//! written with one `write_all` on an `O_APPEND` handle, so concurrent
//! writers never interleave within a line. The log is never rewritten or
//! truncated.

use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use std::fs::{self, OpenOptions};
use std::io::{self, BufRead, BufReader, Write};
use std::path::{Path, PathBuf};

/// One audit line.
///
/// Normalization lines carry `from`/`to`; undo lines carry `action: "undo"`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditRecord {
    pub path: String,
    pub backup: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub to: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action: Option<String>,
    /// RFC 3339 UTC with a trailing `Z`.
    pub timestamp: String,
}

impl AuditRecord {
    pub fn normalized(path: &Path, backup: &Path, from: &str, to: &str) -> Self {
        Self {
            path: path.display().to_string(),
            backup: backup.display().to_string(),
            from: Some(from.to_string()),
            to: Some(to.to_string()),
            action: None,
            timestamp: utc_timestamp(),
        }
    }

    pub fn undo(path: &Path, backup: &Path) -> Self {
        Self {
            path: path.display().to_string(),
            backup: backup.display().to_string(),
            from: None,
            to: None,
            action: Some("undo".to_string()),
            timestamp: utc_timestamp(),
        }
    }
}

/// Current UTC time, e.g. `2026-10-19T08:15:02.123Z`.
pub fn utc_timestamp() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}

#[derive(Debug, Clone)]
pub struct AuditLog {
    path: PathBuf,
}

impl AuditLog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append one record as a self-contained line.
    pub fn append(&self, record: &AuditRecord) -> io::Result<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        let mut line = serde_json::to_vec(record).map_err(io::Error::other)?;
        line.push(b'\n');

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        file.write_all(&line)?;
        file.flush()
    }

    /// Read every record. A missing log reads as empty; malformed lines are
    /// skipped.
    pub fn records(&self) -> io::Result<Vec<AuditRecord>> {
        let file = match fs::File::open(&self.path) {
            Ok(f) => f,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e),
        };
        let mut out = Vec::new();
        for line in BufReader::new(file).lines() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            if let Ok(record) = serde_json::from_str(&line) {
                out.push(record);
            }
        }
        Ok(out)
    }
}
