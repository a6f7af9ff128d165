//! Ledger Store: the persisted account table.
//!
//! The ledger is a text file with one `account|holder|balance|count` record
//! per line. Readers scan it sequentially; writers rewrite the whole table to
//! a temporary file and rename it over the canonical path, so a reader never
//! observes a half-written ledger.
//!
//! Every mutation goes through [`LedgerStore::apply`], which demands a
//! [`GateGuard`]: the guard is proof that the caller holds the cross-process
//! [`Gate`] for the whole read-modify-write sequence.
//!
//! ```ignore
//! let store = LedgerStore::new("data/cuentas.txt");
//! let gate = Gate::open("data/cuentas.lock")?;
//!
//! let guard = gate.acquire()?;
//! let outcome = store.apply(&guard, account, -amount, |balance| balance >= amount)?;
//! guard.release();
//! ```

mod account;
mod error;
mod gate;
mod store;

pub use account::{default_accounts, format_amount, Account, AccountNumber};
pub use error::{LedgerError, LedgerResult};
pub use gate::{Gate, GateGuard};
pub use store::{always, ApplyOutcome, LedgerStore};
