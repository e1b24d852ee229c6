//! Credit ledger: the debit/refund contract the engine and undo manager use.
//!
//! The engine debits only after a conversion has produced output, and the
//! undo manager refunds exactly what was debited. Balances never go
//! negative: [`CreditLedger::debit`] fails with
//! [`LedgerError::InsufficientCredits`] instead.

use crate::error::LedgerError;
use std::collections::HashMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::debug;

pub trait CreditLedger: Send + Sync {
    fn balance(&self, user: &str) -> Result<u64, LedgerError>;

    /// Remove `amount` credits. Returns the new balance.
    fn debit(&self, user: &str, amount: u64) -> Result<u64, LedgerError>;

    /// Add `amount` credits back. Returns the new balance.
    fn refund(&self, user: &str, amount: u64) -> Result<u64, LedgerError>;
}

fn apply_debit(balances: &mut HashMap<String, u64>, user: &str, amount: u64) -> Result<u64, LedgerError> {
    let available = balances.get(user).copied().unwrap_or(0);
    if available < amount {
        return Err(LedgerError::InsufficientCredits {
            user: user.to_string(),
            required: amount,
            available,
        });
    }
    let remaining = available - amount;
    balances.insert(user.to_string(), remaining);
    Ok(remaining)
}

fn apply_refund(balances: &mut HashMap<String, u64>, user: &str, amount: u64) -> u64 {
    let entry = balances.entry(user.to_string()).or_insert(0);
    *entry = entry.saturating_add(amount);
    *entry
}

// ── In-memory ────────────────────────────────────────────────────────────────

/// Mutex-guarded balances, lost on drop. Unknown users have zero credits.
#[derive(Debug, Default)]
pub struct InMemoryLedger {
    balances: Mutex<HashMap<String, u64>>,
}

impl InMemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed one user's balance.
    pub fn with_balance(self, user: impl Into<String>, credits: u64) -> Self {
        self.lock().insert(user.into(), credits);
        self
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, u64>> {
        // Updates are single inserts; a poisoned map is still consistent.
        self.balances.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl CreditLedger for InMemoryLedger {
    fn balance(&self, user: &str) -> Result<u64, LedgerError> {
        Ok(self.lock().get(user).copied().unwrap_or(0))
    }

    fn debit(&self, user: &str, amount: u64) -> Result<u64, LedgerError> {
        apply_debit(&mut self.lock(), user, amount)
    }

    fn refund(&self, user: &str, amount: u64) -> Result<u64, LedgerError> {
        Ok(apply_refund(&mut self.lock(), user, amount))
    }
}

// ── JSON file ────────────────────────────────────────────────────────────────

/// Balances persisted to a single JSON object (`{"user": credits, …}`).
///
/// Every mutation re-reads the file, applies the change, and rewrites it via
/// temp file + rename, so a separate process (e.g. a later `docshift undo`)
/// sees the result.
#[derive(Debug)]
pub struct JsonFileLedger {
    path: PathBuf,
    lock: Mutex<()>,
}

impl JsonFileLedger {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Set a user's balance outright (used to seed accounts).
    pub fn set_balance(&self, user: &str, credits: u64) -> Result<(), LedgerError> {
        self.update(|balances| {
            balances.insert(user.to_string(), credits);
            Ok(())
        })
    }

    fn read(&self) -> Result<HashMap<String, u64>, LedgerError> {
        match fs::read(&self.path) {
            Ok(bytes) if bytes.is_empty() => Ok(HashMap::new()),
            Ok(bytes) => serde_json::from_slice(&bytes)
                .map_err(|e| LedgerError::Storage(format!("{}: {e}", self.path.display()))),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(HashMap::new()),
            Err(e) => Err(LedgerError::Storage(format!("{}: {e}", self.path.display()))),
        }
    }

    fn write(&self, balances: &HashMap<String, u64>) -> Result<(), LedgerError> {
        let storage = |e: std::io::Error| LedgerError::Storage(format!("{}: {e}", self.path.display()));
        let dir = match self.path.parent() {
            Some(p) if !p.as_os_str().is_empty() => p,
            _ => Path::new("."),
        };
        fs::create_dir_all(dir).map_err(storage)?;
        let json = serde_json::to_vec_pretty(balances)
            .map_err(|e| LedgerError::Storage(e.to_string()))?;
        let mut tmp = tempfile::NamedTempFile::new_in(dir).map_err(storage)?;
        tmp.write_all(&json).map_err(storage)?;
        tmp.as_file().sync_all().map_err(storage)?;
        tmp.persist(&self.path).map_err(|e| storage(e.error))?;
        Ok(())
    }

    fn update<T>(
        &self,
        f: impl FnOnce(&mut HashMap<String, u64>) -> Result<T, LedgerError>,
    ) -> Result<T, LedgerError> {
        let _guard = self.lock.lock().unwrap_or_else(|e| e.into_inner());
        let mut balances = self.read()?;
        let out = f(&mut balances)?;
        self.write(&balances)?;
        Ok(out)
    }
}

impl CreditLedger for JsonFileLedger {
    fn balance(&self, user: &str) -> Result<u64, LedgerError> {
        let _guard = self.lock.lock().unwrap_or_else(|e| e.into_inner());
        Ok(self.read()?.get(user).copied().unwrap_or(0))
    }

    fn debit(&self, user: &str, amount: u64) -> Result<u64, LedgerError> {
        let remaining = self.update(|b| apply_debit(b, user, amount))?;
        debug!("Debited {} credits from '{}', {} left", amount, user, remaining);
        Ok(remaining)
    }

    fn refund(&self, user: &str, amount: u64) -> Result<u64, LedgerError> {
        let balance = self.update(|b| Ok(apply_refund(b, user, amount)))?;
        debug!("Refunded {} credits to '{}', balance {}", amount, user, balance);
        Ok(balance)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn debit_and_refund() {
        let ledger = InMemoryLedger::new().with_balance("ana", 3);
        assert_eq!(ledger.debit("ana", 2).unwrap(), 1);
        assert_eq!(ledger.refund("ana", 2).unwrap(), 3);
        assert_eq!(ledger.balance("ana").unwrap(), 3);
    }

    #[test]
    fn debit_never_goes_negative() {
        let ledger = InMemoryLedger::new().with_balance("ana", 1);
        let err = ledger.debit("ana", 2).unwrap_err();
        assert_eq!(
            err,
            LedgerError::InsufficientCredits {
                user: "ana".into(),
                required: 2,
                available: 1
            }
        );
        assert_eq!(ledger.balance("ana").unwrap(), 1);
    }

    #[test]
    fn unknown_user_has_zero() {
        let ledger = InMemoryLedger::new();
        assert_eq!(ledger.balance("ghost").unwrap(), 0);
        assert!(ledger.debit("ghost", 1).is_err());
    }

    #[test]
    fn json_ledger_persists_across_instances() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state/credits.json");

        let first = JsonFileLedger::new(&path);
        first.set_balance("bo", 5).unwrap();
        first.debit("bo", 2).unwrap();

        let second = JsonFileLedger::new(&path);
        assert_eq!(second.balance("bo").unwrap(), 3);
        assert_eq!(second.refund("bo", 2).unwrap(), 5);
    }

    #[test]
    fn json_ledger_reports_corrupt_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("credits.json");
        fs::write(&path, b"not json").unwrap();
        let ledger = JsonFileLedger::new(&path);
        assert!(matches!(ledger.balance("x"), Err(LedgerError::Storage(_))));
    }
}
