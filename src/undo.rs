//! Reverting a recorded conversion.
//!
//! Undo restores the pre-normalization bytes of the source (when the
//! conversion had to re-encode it), refunds the credits it cost, and marks the
//! journal entry as undone. The backup file is left where it is; only
//! [`crate::normalize::EncodingNormalizer::undo_normalization`] deletes
//! backups. An entry can be undone once; later attempts are rejected with
//! [`UndoError::AlreadyUndone`].

use crate::error::UndoError;
use crate::journal::ConversionJournal;
use crate::ledger::CreditLedger;
use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{error, info, warn};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UndoReport {
    pub conversion_id: String,
    /// Source file that was restored from its backup, if there was one.
    pub restored_path: Option<PathBuf>,
    pub refunded: u64,
    /// Balance after the refund.
    pub new_balance: u64,
}

pub struct UndoManager {
    journal: ConversionJournal,
    ledger: Arc<dyn CreditLedger>,
    // Serializes undo calls so a concurrent pair cannot both refund.
    lock: Mutex<()>,
}

impl fmt::Debug for UndoManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UndoManager")
            .field("journal", &self.journal)
            .field("ledger", &"<dyn CreditLedger>")
            .finish()
    }
}

impl UndoManager {
    pub fn new(journal: ConversionJournal, ledger: Arc<dyn CreditLedger>) -> Self {
        Self {
            journal,
            ledger,
            lock: Mutex::new(()),
        }
    }

    pub async fn undo(&self, conversion_id: &str) -> Result<UndoReport, UndoError> {
        let _guard = self.lock.lock().await;

        let mut entry = self
            .journal
            .load(conversion_id)
            .await
            .map_err(UndoError::Journal)?
            .ok_or_else(|| UndoError::NotFound {
                conversion_id: conversion_id.to_string(),
            })?;

        if let Some(at) = entry.undone_at {
            return Err(UndoError::AlreadyUndone {
                conversion_id: conversion_id.to_string(),
                undone_at: at.to_rfc3339_opts(SecondsFormat::Secs, true),
            });
        }

        let restored_path = match entry.backup_path.as_ref() {
            Some(backup) if tokio::fs::metadata(backup).await.is_ok() => {
                tokio::fs::copy(backup, &entry.source_path)
                    .await
                    .map_err(|e| UndoError::Restore {
                        path: entry.source_path.clone(),
                        source: e,
                    })?;
                info!(
                    "Restored {} from {}",
                    entry.source_path.display(),
                    backup.display()
                );
                Some(entry.source_path.clone())
            }
            Some(backup) => {
                warn!(
                    "Backup {} for conversion {} is gone; skipping restore",
                    backup.display(),
                    conversion_id
                );
                None
            }
            None => None,
        };

        let new_balance = self.ledger.refund(&entry.user, entry.credits)?;

        entry.undone_at = Some(Utc::now());
        if let Err(e) = self.journal.save(&entry).await {
            // Take the refund back so a retry cannot pay out twice.
            if let Err(reverse) = self.ledger.debit(&entry.user, entry.credits) {
                error!(
                    "Could not reverse refund of {} credits to '{}': {}",
                    entry.credits, entry.user, reverse
                );
            }
            return Err(UndoError::Journal(e));
        }

        info!(
            "Undid conversion {}: refunded {} credits to '{}'",
            conversion_id, entry.credits, entry.user
        );

        Ok(UndoReport {
            conversion_id: conversion_id.to_string(),
            restored_path,
            refunded: entry.credits,
            new_balance,
        })
    }
}
