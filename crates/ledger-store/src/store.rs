//! File-backed account table.

use crate::account::Account;
use crate::{AccountNumber, GateGuard, LedgerError, LedgerResult};
use rust_decimal::Decimal;
use std::collections::HashSet;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::time::UNIX_EPOCH;
use tracing::{debug, warn};

/// Result of a guarded read-modify-write on one account.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplyOutcome {
    /// Predicate held; the delta was applied. Carries the new balance.
    Applied { balance: Decimal },
    /// Predicate rejected the change. Carries the untouched balance.
    PredicateFailed { balance: Decimal },
    /// The new balance is not representable. Carries the untouched balance.
    Overflow { balance: Decimal },
    /// No record with that account number.
    NotFound,
}

/// Predicate that accepts every balance.
pub fn always(_balance: Decimal) -> bool {
    true
}

/// The persisted account table.
///
/// Nothing is cached: every call reloads the file so concurrent writers in
/// other processes are always observed.
#[derive(Debug, Clone)]
pub struct LedgerStore {
    path: PathBuf,
}

impl LedgerStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Verify the ledger exists and parses. Used once at startup.
    pub fn check_accessible(&self) -> LedgerResult<usize> {
        self.load().map(|accounts| accounts.len())
    }

    /// Current balance of `account`.
    pub fn read_balance(&self, account: AccountNumber) -> LedgerResult<Decimal> {
        self.read_account(account).map(|a| a.balance)
    }

    /// Full record of `account`, found by sequential scan.
    pub fn read_account(&self, account: AccountNumber) -> LedgerResult<Account> {
        self.load()?
            .into_iter()
            .find(|a| a.account_number == account)
            .ok_or(LedgerError::NotFound(account))
    }

    /// Every record in file order.
    pub fn list_accounts(&self) -> LedgerResult<Vec<Account>> {
        self.load()
    }

    /// Apply `delta` to `account` if `predicate(current_balance)` holds.
    ///
    /// A successful change also bumps the transaction count. The table is
    /// rewritten and renamed into place on every call, even when nothing
    /// changed. The guard ties the call to a held [`crate::Gate`].
    pub fn apply<P>(
        &self,
        _guard: &GateGuard,
        account: AccountNumber,
        delta: Decimal,
        predicate: P,
    ) -> LedgerResult<ApplyOutcome>
    where
        P: FnOnce(Decimal) -> bool,
    {
        let mut accounts = self.load()?;
        let mut predicate = Some(predicate);
        let mut outcome = ApplyOutcome::NotFound;

        for record in accounts.iter_mut() {
            if record.account_number != account {
                continue;
            }
            let Some(check) = predicate.take() else {
                break;
            };
            if !check(record.balance) {
                outcome = ApplyOutcome::PredicateFailed {
                    balance: record.balance,
                };
                continue;
            }
            outcome = match record.balance.checked_add(delta) {
                Some(balance) => {
                    record.balance = balance;
                    record.transaction_count += 1;
                    ApplyOutcome::Applied { balance }
                }
                None => {
                    warn!(account = %account, %delta, "balance overflow, change refused");
                    ApplyOutcome::Overflow {
                        balance: record.balance,
                    }
                }
            };
        }

        self.commit(&accounts)?;
        debug!(account = %account, %delta, ?outcome, "ledger apply");
        Ok(outcome)
    }

    /// Write an initial table.
    ///
    /// Refuses to replace an existing ledger unless `overwrite` is set.
    pub fn seed(&self, _guard: &GateGuard, accounts: &[Account], overwrite: bool) -> LedgerResult<()> {
        if !overwrite && self.path.exists() {
            return Err(LedgerError::AlreadyExists(self.path.clone()));
        }

        let mut seen = HashSet::new();
        for account in accounts {
            Account::validate_holder_name(&account.holder_name)?;
            if !seen.insert(account.account_number) {
                return Err(LedgerError::DuplicateAccount(account.account_number));
            }
        }

        if let Some(parent) = self.parent_dir().filter(|p| !p.exists()) {
            fs::create_dir_all(parent).map_err(|source| self.unavailable(source))?;
        }
        self.commit(accounts)
    }

    fn load(&self) -> LedgerResult<Vec<Account>> {
        let content = fs::read_to_string(&self.path).map_err(|source| self.unavailable(source))?;

        let mut seen = HashSet::new();
        let mut accounts = Vec::new();
        for (idx, line) in content.lines().enumerate() {
            if line.trim().is_empty() {
                continue;
            }
            let account = Account::parse_record(line, idx + 1)?;
            if !seen.insert(account.account_number) {
                return Err(LedgerError::DuplicateAccount(account.account_number));
            }
            accounts.push(account);
        }
        Ok(accounts)
    }

    /// Replace the ledger with `accounts` via temp file and rename.
    fn commit(&self, accounts: &[Account]) -> LedgerResult<()> {
        let mut content = String::new();
        for account in accounts {
            content.push_str(&account.format_record());
            content.push('\n');
        }

        let dir = self.parent_dir().unwrap_or_else(|| Path::new("."));
        let file_name = self
            .path
            .file_name()
            .and_then(|name| name.to_str())
            .unwrap_or("ledger");
        let tmp_path = dir.join(format!(
            ".{}.tmp.{}.{}",
            file_name,
            std::process::id(),
            std::time::SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .unwrap_or_default()
                .as_nanos()
        ));

        let write_result = (|| -> io::Result<()> {
            let mut file = fs::OpenOptions::new()
                .write(true)
                .create_new(true)
                .open(&tmp_path)?;
            file.write_all(content.as_bytes())?;
            file.sync_all()?;

            fs::rename(&tmp_path, &self.path)?;

            if let Ok(parent_dir) = fs::File::open(dir) {
                let _ = parent_dir.sync_all();
            }
            Ok(())
        })();

        if let Err(source) = write_result {
            if let Err(e) = fs::remove_file(&tmp_path) {
                if e.kind() != io::ErrorKind::NotFound {
                    warn!(path = %tmp_path.display(), error = %e, "failed to remove ledger temp file");
                }
            }
            return Err(self.unavailable(source));
        }
        Ok(())
    }

    fn parent_dir(&self) -> Option<&Path> {
        self.path.parent().filter(|p| !p.as_os_str().is_empty())
    }

    fn unavailable(&self, source: io::Error) -> LedgerError {
        LedgerError::Unavailable {
            path: self.path.clone(),
            source,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Gate;
    use rust_decimal_macros::dec;
    use tempfile::{tempdir, TempDir};

    fn fixture() -> (TempDir, LedgerStore, Gate) {
        let dir = tempdir().unwrap();
        let store = LedgerStore::new(dir.path().join("cuentas.txt"));
        let gate = Gate::open(dir.path().join("cuentas.lock")).unwrap();
        let guard = gate.acquire().unwrap();
        store
            .seed(
                &guard,
                &[
                    Account::new(1001u32, "Juan Vázquez", dec!(1000.00)),
                    Account::new(1002u32, "Pedro Federico", dec!(2000.67)),
                ],
                false,
            )
            .unwrap();
        (dir, store, gate)
    }

    #[test]
    fn test_read_balance() {
        let (_dir, store, _gate) = fixture();
        assert_eq!(store.read_balance(AccountNumber(1002)).unwrap(), dec!(2000.67));
    }

    #[test]
    fn test_read_balance_not_found() {
        let (_dir, store, _gate) = fixture();
        let err = store.read_balance(AccountNumber(4242)).unwrap_err();
        assert!(matches!(err, LedgerError::NotFound(AccountNumber(4242))));
    }

    #[test]
    fn test_apply_refuses_overflowing_balance() {
        let dir = tempdir().unwrap();
        let store = LedgerStore::new(dir.path().join("cuentas.txt"));
        let gate = Gate::open(dir.path().join("cuentas.lock")).unwrap();
        let guard = gate.acquire().unwrap();
        let near_max = Decimal::MAX - dec!(100);
        store
            .seed(&guard, &[Account::new(1002u32, "Pedro Federico", near_max)], false)
            .unwrap();

        let outcome = store
            .apply(&guard, AccountNumber(1002), dec!(500.00), always)
            .unwrap();
        assert_eq!(outcome, ApplyOutcome::Overflow { balance: near_max });

        let record = store.read_account(AccountNumber(1002)).unwrap();
        assert_eq!(record.balance, near_max);
        assert_eq!(record.transaction_count, 0);
    }

    #[test]
    fn test_missing_file_is_unavailable() {
        let dir = tempdir().unwrap();
        let store = LedgerStore::new(dir.path().join("absent.txt"));
        let err = store.read_balance(AccountNumber(1001)).unwrap_err();
        assert!(err.is_unavailable());
    }

    #[test]
    fn test_apply_updates_balance_and_count() {
        let (_dir, store, gate) = fixture();
        let guard = gate.acquire().unwrap();

        let outcome = store.apply(&guard, AccountNumber(1001), dec!(250.00), always).unwrap();
        assert_eq!(outcome, ApplyOutcome::Applied { balance: dec!(1250.00) });

        let account = store.read_account(AccountNumber(1001)).unwrap();
        assert_eq!(account.balance, dec!(1250.00));
        assert_eq!(account.transaction_count, 1);
    }

    #[test]
    fn test_apply_predicate_failure_leaves_record() {
        let (_dir, store, gate) = fixture();
        let guard = gate.acquire().unwrap();

        let outcome = store
            .apply(&guard, AccountNumber(1001), dec!(-2000.00), |b| b >= dec!(2000.00))
            .unwrap();
        assert_eq!(outcome, ApplyOutcome::PredicateFailed { balance: dec!(1000.00) });

        let account = store.read_account(AccountNumber(1001)).unwrap();
        assert_eq!(account.balance, dec!(1000.00));
        assert_eq!(account.transaction_count, 0);
    }

    #[test]
    fn test_apply_not_found_keeps_other_records() {
        let (_dir, store, gate) = fixture();
        let before = fs::read_to_string(store.path()).unwrap();
        let guard = gate.acquire().unwrap();

        let outcome = store.apply(&guard, AccountNumber(9999), dec!(1), always).unwrap();
        assert_eq!(outcome, ApplyOutcome::NotFound);
        assert_eq!(fs::read_to_string(store.path()).unwrap(), before);
    }

    #[test]
    fn test_commit_leaves_no_temp_files() {
        let (dir, store, gate) = fixture();
        let guard = gate.acquire().unwrap();
        store.apply(&guard, AccountNumber(1002), dec!(1), always).unwrap();

        let leftovers: Vec<_> = fs::read_dir(dir.path())
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_name().to_string_lossy().contains(".tmp."))
            .collect();
        assert!(leftovers.is_empty());
    }

    #[test]
    fn test_seed_refuses_existing_without_overwrite() {
        let (_dir, store, gate) = fixture();
        let guard = gate.acquire().unwrap();

        let err = store.seed(&guard, &[], false).unwrap_err();
        assert!(matches!(err, LedgerError::AlreadyExists(_)));

        store
            .seed(&guard, &[Account::new(7u32, "Solo", dec!(1))], true)
            .unwrap();
        assert_eq!(store.list_accounts().unwrap().len(), 1);
    }

    #[test]
    fn test_seed_rejects_duplicates_and_bad_names() {
        let dir = tempdir().unwrap();
        let store = LedgerStore::new(dir.path().join("cuentas.txt"));
        let gate = Gate::open(dir.path().join("cuentas.lock")).unwrap();
        let guard = gate.acquire().unwrap();

        let dup = [
            Account::new(1u32, "A", dec!(1)),
            Account::new(1u32, "B", dec!(2)),
        ];
        assert!(matches!(
            store.seed(&guard, &dup, false),
            Err(LedgerError::DuplicateAccount(AccountNumber(1)))
        ));

        let bad = [Account::new(2u32, "A|B", dec!(1))];
        assert!(matches!(
            store.seed(&guard, &bad, false),
            Err(LedgerError::InvalidHolderName(_))
        ));
        assert!(!store.path().exists());
    }

    #[test]
    fn test_load_rejects_duplicate_records() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("cuentas.txt");
        fs::write(&path, "1|A|1.00|0\n1|B|2.00|0\n").unwrap();

        let err = LedgerStore::new(path).list_accounts().unwrap_err();
        assert!(matches!(err, LedgerError::DuplicateAccount(AccountNumber(1))));
    }

    #[test]
    fn test_load_skips_blank_lines() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("cuentas.txt");
        fs::write(&path, "1|A|1.00|0\n\n2|B|2.00|4\n").unwrap();

        let store = LedgerStore::new(path);
        assert_eq!(store.check_accessible().unwrap(), 2);
    }
}
