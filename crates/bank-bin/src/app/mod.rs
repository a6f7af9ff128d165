//! Application wiring and lifecycle management.

mod console;
mod init;
mod ledger;
mod lifecycle;

pub use init::run_server;
pub use ledger::{print_accounts, seed_ledger};
pub use lifecycle::{check_status, stop_running};
