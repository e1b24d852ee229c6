//! Encoding normalization: rewrite text files as UTF-8, with undo.
//!
//! ```text
//! read ──▶ detect ──▶ decode ──▶ repair mojibake ──▶ backup ──▶ rewrite ──▶ audit
//!          (BOM /      (strict,    (Latin-1 round     (<path>   (temp file  (JSONL)
//!           UTF-8 /     lossy on    trip, kept only    .bak)     + rename)
//!           chardetng)  failure)    if lossless)
//! ```
//!
//! The normalizer is synchronous; the engine runs it on tokio's blocking
//! pool. Two normalizations of the same path must not run concurrently: the
//! `.bak` sibling name is deterministic.

pub mod audit;
pub mod detect;

pub use audit::{AuditLog, AuditRecord};
pub use detect::{classify_bytes, detect_encoding, repair_mojibake, TextClass};

use crate::error::NormalizeError;
use crate::output::EncodingTransform;
use detect::{decode_lossy, decode_strict, encoding_label};
use serde::Serialize;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

const TARGET_ENCODING: &str = "utf-8";
const UTF8_BOM: &[u8] = b"\xEF\xBB\xBF";

/// `<path>.bak`, in the same directory as `path`.
pub fn backup_path(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_os_string();
    name.push(".bak");
    PathBuf::from(name)
}

/// What [`EncodingNormalizer::normalize_to_utf8`] did.
#[derive(Debug, Clone, Serialize)]
pub struct NormalizationReport {
    pub path: PathBuf,
    pub backup_path: PathBuf,
    /// Detected source encoding label.
    pub from: String,
    pub to: String,
    pub bom: bool,
    pub mojibake_repaired: bool,
    /// Some bytes were malformed and replaced with U+FFFD.
    pub lossy: bool,
}

impl NormalizationReport {
    pub fn transform(&self) -> EncodingTransform {
        EncodingTransform {
            from: self.from.clone(),
            to: self.to.clone(),
            backup_path: self.backup_path.clone(),
            mojibake_repaired: self.mojibake_repaired,
        }
    }
}

/// Dry-run view of a file: what normalization would do.
#[derive(Debug, Clone, Serialize)]
pub struct EncodingPreview {
    pub path: PathBuf,
    pub from: String,
    pub to: String,
    pub class: TextClass,
    pub mojibake: bool,
}

/// Result of [`EncodingNormalizer::undo_normalization`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RestoreOutcome {
    /// The backup was copied back and removed.
    Restored,
    /// No `.bak` sibling exists; nothing changed.
    NoBackup,
    /// The backup exists but could not be restored.
    Failed { reason: String },
}

impl RestoreOutcome {
    pub fn is_restored(&self) -> bool {
        matches!(self, RestoreOutcome::Restored)
    }
}

#[derive(Debug, Clone)]
pub struct EncodingNormalizer {
    audit: AuditLog,
    write_bom: bool,
}

impl EncodingNormalizer {
    pub fn new(audit_log: impl Into<PathBuf>) -> Self {
        Self {
            audit: AuditLog::new(audit_log),
            write_bom: false,
        }
    }

    /// Default BOM policy when callers pass `None`.
    pub fn with_bom(mut self, bom: bool) -> Self {
        self.write_bom = bom;
        self
    }

    pub fn audit_log(&self) -> &AuditLog {
        &self.audit
    }

    /// Classify a file's bytes. See [`classify_bytes`].
    pub fn classify_file(&self, path: &Path) -> Result<TextClass, NormalizeError> {
        let bytes = fs::read(path).map_err(|e| NormalizeError::io(path, e))?;
        Ok(classify_bytes(&bytes))
    }

    /// Detect without mutating anything.
    pub fn preview(&self, path: &Path) -> Result<EncodingPreview, NormalizeError> {
        let bytes = fs::read(path).map_err(|e| NormalizeError::io(path, e))?;
        let encoding = detect_encoding(&bytes);
        let (text, _) = decode_lossy(&bytes, encoding);
        Ok(EncodingPreview {
            path: path.to_path_buf(),
            from: encoding_label(encoding),
            to: TARGET_ENCODING.to_string(),
            class: classify_bytes(&bytes),
            mojibake: detect::looks_like_mojibake(&text),
        })
    }

    /// Rewrite `path` as UTF-8, keeping the original bytes in `<path>.bak`.
    ///
    /// `bom` overrides the normalizer's default BOM policy.
    pub fn normalize_to_utf8(
        &self,
        path: &Path,
        bom: Option<bool>,
    ) -> Result<NormalizationReport, NormalizeError> {
        if !path.exists() {
            return Err(NormalizeError::NotFound {
                path: path.to_path_buf(),
            });
        }
        let bom = bom.unwrap_or(self.write_bom);
        let bytes = fs::read(path).map_err(|e| NormalizeError::io(path, e))?;

        let encoding = detect_encoding(&bytes);
        let from = encoding_label(encoding);
        let (decoded, lossy) = match decode_strict(&bytes, encoding) {
            Some(text) => (text, false),
            None => {
                warn!(
                    "{}: malformed {} bytes replaced with U+FFFD",
                    path.display(),
                    from
                );
                decode_lossy(&bytes, encoding)
            }
        };

        let (text, mojibake_repaired) = match repair_mojibake(&decoded) {
            Some(repaired) => {
                debug!("{}: repaired double-encoded UTF-8", path.display());
                (repaired, true)
            }
            None => (decoded, false),
        };

        let backup = backup_path(path);
        fs::write(&backup, &bytes).map_err(|e| NormalizeError::io(&backup, e))?;

        let mut encoded = Vec::with_capacity(text.len() + UTF8_BOM.len());
        if bom {
            encoded.extend_from_slice(UTF8_BOM);
        }
        encoded.extend_from_slice(text.as_bytes());
        write_replacing(path, &encoded).map_err(|e| NormalizeError::io(path, e))?;

        if let Err(e) = self
            .audit
            .append(&AuditRecord::normalized(path, &backup, &from, TARGET_ENCODING))
        {
            warn!(
                "Could not append to audit log {}: {}",
                self.audit.path().display(),
                e
            );
        }

        info!("Normalized {}: {} -> {}", path.display(), from, TARGET_ENCODING);

        Ok(NormalizationReport {
            path: path.to_path_buf(),
            backup_path: backup,
            from,
            to: TARGET_ENCODING.to_string(),
            bom,
            mojibake_repaired,
            lossy,
        })
    }

    /// Put the `.bak` bytes back over `path` and delete the backup.
    ///
    /// Never returns an error: a missing backup is [`RestoreOutcome::NoBackup`].
    pub fn undo_normalization(&self, path: &Path) -> RestoreOutcome {
        let backup = backup_path(path);
        if !backup.is_file() {
            debug!("No backup for {}", path.display());
            return RestoreOutcome::NoBackup;
        }

        if let Err(e) = fs::copy(&backup, path) {
            warn!("Failed to restore {} from {}: {}", path.display(), backup.display(), e);
            return RestoreOutcome::Failed {
                reason: e.to_string(),
            };
        }
        if let Err(e) = fs::remove_file(&backup) {
            warn!("Restored {} but could not remove {}: {}", path.display(), backup.display(), e);
        }

        if let Err(e) = self.audit.append(&AuditRecord::undo(path, &backup)) {
            warn!(
                "Could not append to audit log {}: {}",
                self.audit.path().display(),
                e
            );
        }

        info!("Restored {}", path.display());
        RestoreOutcome::Restored
    }
}

/// Replace `path` via a sibling temp file + rename, keeping its permissions.
fn write_replacing(path: &Path, data: &[u8]) -> std::io::Result<()> {
    let dir = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    let permissions = fs::metadata(path)?.permissions();

    let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
    tmp.write_all(data)?;
    tmp.as_file().sync_all()?;
    fs::set_permissions(tmp.path(), permissions)?;
    tmp.persist(path).map_err(|e| e.error)?;
    Ok(())
}
