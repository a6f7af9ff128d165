//! Ledger maintenance subcommands.

use bank_config_and_utils::{Config, Paths};
use ledger_store::{default_accounts, format_amount, Account, Gate, LedgerError, LedgerStore};

/// Write the demo accounts to the configured ledger.
pub fn seed_ledger(config: &Config, paths: &Paths, force: bool) -> anyhow::Result<()> {
    let gate = Gate::open(config.gate_file(paths))?;
    let store = LedgerStore::new(config.ledger_file(paths));
    let accounts = default_accounts();

    let guard = gate.acquire()?;
    match store.seed(&guard, &accounts, force) {
        Ok(()) => {
            println!("Seeded {} accounts into {}", accounts.len(), store.path().display());
            Ok(())
        }
        Err(LedgerError::AlreadyExists(path)) => {
            anyhow::bail!("ledger already exists at {} (use --force to replace it)", path.display())
        }
        Err(e) => Err(e.into()),
    }
}

/// Print every account in the configured ledger.
pub fn print_accounts(config: &Config, paths: &Paths) -> anyhow::Result<()> {
    let gate = Gate::open(config.gate_file(paths))?;
    let store = LedgerStore::new(config.ledger_file(paths));

    let accounts = {
        let _guard = gate.acquire()?;
        store.list_accounts()?
    };
    print!("{}", render_table(&accounts));
    Ok(())
}

fn render_table(accounts: &[Account]) -> String {
    let mut out = format!("{:<8} {:<24} {:>14} {:>6}\n", "ACCOUNT", "HOLDER", "BALANCE", "TXNS");
    for account in accounts {
        out.push_str(&format!(
            "{:<8} {:<24} {:>14} {:>6}\n",
            account.account_number,
            account.holder_name,
            format_amount(account.balance),
            account.transaction_count
        ));
    }
    out
}
