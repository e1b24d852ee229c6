//! Durable record of successful conversions.
//!
//! One pretty-printed JSON file per conversion, named `<conversion_id>.json`,
//! written via a sibling `.json.tmp` file so readers never see a partial
//! entry. Entries are created once by the engine after a successful
//! conversion (a reused id is refused) and updated once, by the undo
//! manager, to set `undone_at`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::io;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversionLogEntry {
    pub conversion_id: String,
    pub user: String,
    pub source_path: PathBuf,
    pub output_path: PathBuf,
    /// Pre-normalization bytes, if the source was re-encoded.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub backup_path: Option<PathBuf>,
    pub source_format: String,
    pub target_format: String,
    pub credits: u64,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub undone_at: Option<DateTime<Utc>>,
}

impl ConversionLogEntry {
    pub fn is_undone(&self) -> bool {
        self.undone_at.is_some()
    }
}

#[derive(Debug, Clone)]
pub struct ConversionJournal {
    dir: PathBuf,
}

impl ConversionJournal {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Persist a new entry. Fails with `AlreadyExists` if the id was
    /// recorded before; existing entries change only through [`Self::save`].
    pub async fn record(&self, entry: &ConversionLogEntry) -> io::Result<()> {
        let (path, tmp_path) = self.write_tmp(entry).await?;
        // hard_link refuses to replace an existing file, unlike rename.
        let linked = tokio::fs::hard_link(&tmp_path, &path).await;
        let _ = tokio::fs::remove_file(&tmp_path).await;
        linked?;
        debug!("Journal entry recorded: {}", path.display());
        Ok(())
    }

    /// Rewrite an existing entry in place.
    pub async fn save(&self, entry: &ConversionLogEntry) -> io::Result<()> {
        let (path, tmp_path) = self.write_tmp(entry).await?;
        tokio::fs::rename(&tmp_path, &path).await?;
        debug!("Journal entry written: {}", path.display());
        Ok(())
    }

    async fn write_tmp(&self, entry: &ConversionLogEntry) -> io::Result<(PathBuf, PathBuf)> {
        let path = self.entry_path(&entry.conversion_id)?;
        tokio::fs::create_dir_all(&self.dir).await?;
        let json = serde_json::to_vec_pretty(entry)?;

        let tmp_path = path.with_extension("json.tmp");
        tokio::fs::write(&tmp_path, &json).await?;
        Ok((path, tmp_path))
    }

    /// Load one entry; `Ok(None)` when no such conversion was recorded.
    pub async fn load(&self, conversion_id: &str) -> io::Result<Option<ConversionLogEntry>> {
        let path = match self.entry_path(conversion_id) {
            Ok(p) => p,
            Err(_) => return Ok(None),
        };
        match tokio::fs::read(&path).await {
            Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// All entries, oldest first. Unreadable files are skipped with a warning.
    pub async fn list(&self) -> io::Result<Vec<ConversionLogEntry>> {
        let mut entries = Vec::new();
        let mut dir = match tokio::fs::read_dir(&self.dir).await {
            Ok(d) => d,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(entries),
            Err(e) => return Err(e),
        };
        while let Some(item) = dir.next_entry().await? {
            let path = item.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            match tokio::fs::read(&path).await {
                Ok(bytes) => match serde_json::from_slice::<ConversionLogEntry>(&bytes) {
                    Ok(entry) => entries.push(entry),
                    Err(e) => warn!("Skipping malformed journal entry {}: {}", path.display(), e),
                },
                Err(e) => warn!("Skipping unreadable journal entry {}: {}", path.display(), e),
            }
        }
        entries.sort_by_key(|e| e.created_at);
        Ok(entries)
    }

    fn entry_path(&self, conversion_id: &str) -> io::Result<PathBuf> {
        let valid = !conversion_id.is_empty()
            && conversion_id
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
        if !valid {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("invalid conversion id '{conversion_id}'"),
            ));
        }
        Ok(self.dir.join(format!("{conversion_id}.json")))
    }
}
