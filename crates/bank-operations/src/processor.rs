//! Request dispatch against the ledger.

use bank_config_and_utils::LimitsConfig;
use ledger_store::{always, AccountNumber, ApplyOutcome, Gate, GateGuard, LedgerError, LedgerStore};
use rust_decimal::Decimal;
use teller_protocol::{Request, RequestKind, Response};
use tracing::{debug, error, info, warn};

/// Messages sent to tellers.
pub mod messages {
    pub const DEPOSIT_OK: &str = "deposit accepted";
    pub const WITHDRAW_OK: &str = "withdrawal accepted";
    pub const TRANSFER_OK: &str = "transfer accepted";
    pub const SESSION_CLOSED: &str = "session closed";

    pub const ACCOUNT_NOT_FOUND: &str = "account not found";
    pub const DESTINATION_NOT_FOUND: &str = "destination account not found";
    pub const INVALID_AMOUNT: &str = "invalid amount";
    pub const INSUFFICIENT_FUNDS: &str = "insufficient funds";
    pub const SAME_ACCOUNT: &str = "cannot transfer to the same account";
    pub const LEDGER_UNAVAILABLE: &str = "ledger unavailable";
    pub const WITHDRAW_LIMIT: &str = "amount exceeds withdrawal limit";
    pub const TRANSFER_LIMIT: &str = "amount exceeds transfer limit";
    pub const BALANCE_LIMIT: &str = "balance limit exceeded";
}

use messages::*;

/// Stateless dispatcher from [`Request`] to [`Response`].
///
/// Holds no account data between calls. Every mutation runs under the gate,
/// and a transfer holds it across both halves.
#[derive(Debug, Clone)]
pub struct OperationProcessor {
    store: LedgerStore,
    gate: Gate,
    limits: LimitsConfig,
}

impl OperationProcessor {
    pub fn new(store: LedgerStore, gate: Gate, limits: LimitsConfig) -> Self {
        Self { store, gate, limits }
    }

    pub fn store(&self) -> &LedgerStore {
        &self.store
    }

    pub fn gate(&self) -> &Gate {
        &self.gate
    }

    /// Apply `request` to the ledger. Never fails: errors become
    /// `ERROR` responses.
    pub fn process(&self, request: &Request) -> Response {
        debug!(kind = %request.kind, account = %request.account, "processing request");
        match request.kind {
            RequestKind::Query => self.query(request.account),
            RequestKind::Deposit => self.deposit(request.account, request.amount),
            RequestKind::Withdraw => self.withdraw(request.account, request.amount),
            RequestKind::Transfer => {
                self.transfer(request.account, request.amount, request.destination)
            }
            RequestKind::Exit => Response::ok_message(SESSION_CLOSED),
        }
    }

    fn query(&self, account: AccountNumber) -> Response {
        match self.store.read_balance(account) {
            Ok(balance) => Response::balance(balance),
            Err(e) => self.ledger_failure(account, e),
        }
    }

    fn deposit(&self, account: AccountNumber, amount: Option<Decimal>) -> Response {
        let Some(amount) = positive(amount) else {
            return Response::error(INVALID_AMOUNT);
        };
        let guard = match self.acquire() {
            Ok(guard) => guard,
            Err(response) => return response,
        };

        match self.store.apply(&guard, account, amount, always) {
            Ok(ApplyOutcome::Applied { balance }) => Response::ok(DEPOSIT_OK, balance),
            Ok(ApplyOutcome::NotFound) => Response::error(ACCOUNT_NOT_FOUND),
            Ok(ApplyOutcome::Overflow { .. }) => Response::error(BALANCE_LIMIT),
            // `always` cannot fail, but keep the mapping total.
            Ok(ApplyOutcome::PredicateFailed { .. }) => Response::error(INVALID_AMOUNT),
            Err(e) => self.ledger_failure(account, e),
        }
    }

    fn withdraw(&self, account: AccountNumber, amount: Option<Decimal>) -> Response {
        let Some(amount) = positive(amount) else {
            return Response::error(INVALID_AMOUNT);
        };
        if self.limits.withdraw_limit.is_some_and(|limit| amount > limit) {
            return Response::error(WITHDRAW_LIMIT);
        }
        let guard = match self.acquire() {
            Ok(guard) => guard,
            Err(response) => return response,
        };

        match self.store.apply(&guard, account, -amount, |b| b >= amount) {
            Ok(ApplyOutcome::Applied { balance }) => Response::ok(WITHDRAW_OK, balance),
            Ok(ApplyOutcome::PredicateFailed { .. }) => Response::error(INSUFFICIENT_FUNDS),
            Ok(ApplyOutcome::NotFound) => Response::error(ACCOUNT_NOT_FOUND),
            Ok(ApplyOutcome::Overflow { .. }) => Response::error(BALANCE_LIMIT),
            Err(e) => self.ledger_failure(account, e),
        }
    }

    fn transfer(
        &self,
        source: AccountNumber,
        amount: Option<Decimal>,
        destination: Option<AccountNumber>,
    ) -> Response {
        let Some(amount) = positive(amount) else {
            return Response::error(INVALID_AMOUNT);
        };
        let Some(destination) = destination else {
            return Response::error(DESTINATION_NOT_FOUND);
        };
        if source == destination {
            return Response::error(SAME_ACCOUNT);
        }
        if self.limits.transfer_limit.is_some_and(|limit| amount > limit) {
            return Response::error(TRANSFER_LIMIT);
        }

        // One gate hold for debit, credit and any compensation.
        let guard = match self.acquire() {
            Ok(guard) => guard,
            Err(response) => return response,
        };

        let source_balance = match self.store.apply(&guard, source, -amount, |b| b >= amount) {
            Ok(ApplyOutcome::Applied { balance }) => balance,
            Ok(ApplyOutcome::PredicateFailed { .. }) => return Response::error(INSUFFICIENT_FUNDS),
            Ok(ApplyOutcome::NotFound) => return Response::error(ACCOUNT_NOT_FOUND),
            Ok(ApplyOutcome::Overflow { .. }) => return Response::error(BALANCE_LIMIT),
            Err(e) => return self.ledger_failure(source, e),
        };

        let failure = match self.store.apply(&guard, destination, amount, always) {
            Ok(ApplyOutcome::Applied { .. }) => {
                info!(%source, %destination, %amount, "transfer committed");
                return Response::ok(TRANSFER_OK, source_balance);
            }
            Ok(ApplyOutcome::Overflow { .. }) => Response::error(BALANCE_LIMIT),
            Ok(_) => Response::error(DESTINATION_NOT_FOUND),
            Err(e) => self.ledger_failure(destination, e),
        };

        self.compensate(&guard, source, amount);
        failure
    }

    /// Credit `amount` back to `source` after a failed transfer credit.
    fn compensate(&self, guard: &GateGuard, source: AccountNumber, amount: Decimal) {
        match self.store.apply(guard, source, amount, always) {
            Ok(ApplyOutcome::Applied { balance }) => {
                warn!(%source, %amount, %balance, "transfer rolled back");
            }
            Ok(outcome) => {
                error!(%source, %amount, ?outcome, "transfer rollback not applied, ledger needs repair");
            }
            Err(e) => {
                error!(%source, %amount, error = %e, "transfer rollback failed, ledger needs repair");
            }
        }
    }

    fn acquire(&self) -> Result<GateGuard, Response> {
        self.gate.acquire().map_err(|e| {
            error!(path = %self.gate.path().display(), error = %e, "gate acquisition failed");
            Response::error(LEDGER_UNAVAILABLE)
        })
    }

    fn ledger_failure(&self, account: AccountNumber, err: LedgerError) -> Response {
        match err {
            LedgerError::NotFound(_) => Response::error(ACCOUNT_NOT_FOUND),
            other => {
                error!(
                    %account,
                    path = %self.store.path().display(),
                    error = %other,
                    "ledger unavailable"
                );
                Response::error(LEDGER_UNAVAILABLE)
            }
        }
    }
}

fn positive(amount: Option<Decimal>) -> Option<Decimal> {
    amount.filter(|a| *a > Decimal::ZERO)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ledger_store::Account;
    use rust_decimal_macros::dec;
    use tempfile::{tempdir, TempDir};

    const JUAN: AccountNumber = AccountNumber(1001);
    const PEDRO: AccountNumber = AccountNumber(1002);

    fn processor_with(limits: LimitsConfig) -> (TempDir, OperationProcessor) {
        let dir = tempdir().unwrap();
        let store = LedgerStore::new(dir.path().join("cuentas.txt"));
        let gate = Gate::open(dir.path().join("cuentas.lock")).unwrap();
        {
            let guard = gate.acquire().unwrap();
            store
                .seed(
                    &guard,
                    &[
                        Account::new(JUAN, "Juan Vázquez", dec!(1000.00)),
                        Account::new(PEDRO, "Pedro Federico", dec!(2000.67)),
                    ],
                    false,
                )
                .unwrap();
        }
        (dir, OperationProcessor::new(store, gate, limits))
    }

    fn processor() -> (TempDir, OperationProcessor) {
        processor_with(LimitsConfig::default())
    }

    #[test]
    fn test_query() {
        let (_dir, p) = processor();
        assert_eq!(p.process(&Request::query(PEDRO)), Response::balance(dec!(2000.67)));
        assert_eq!(
            p.process(&Request::query(AccountNumber(5))),
            Response::error(ACCOUNT_NOT_FOUND)
        );
    }

    #[test]
    fn test_deposit_and_withdraw() {
        let (_dir, p) = processor();
        assert_eq!(
            p.process(&Request::deposit(JUAN, dec!(250.00))),
            Response::ok(DEPOSIT_OK, dec!(1250.00))
        );
        assert_eq!(
            p.process(&Request::withdraw(JUAN, dec!(2000.00))),
            Response::error(INSUFFICIENT_FUNDS)
        );
        assert_eq!(
            p.process(&Request::withdraw(JUAN, dec!(1250.00))),
            Response::ok(WITHDRAW_OK, dec!(0))
        );
    }

    #[test]
    fn test_non_positive_amounts_rejected() {
        let (_dir, p) = processor();
        for amount in [dec!(0), dec!(-1.00)] {
            assert_eq!(
                p.process(&Request::deposit(JUAN, amount)),
                Response::error(INVALID_AMOUNT)
            );
            assert_eq!(
                p.process(&Request::withdraw(JUAN, amount)),
                Response::error(INVALID_AMOUNT)
            );
            assert_eq!(
                p.process(&Request::transfer(JUAN, amount, PEDRO)),
                Response::error(INVALID_AMOUNT)
            );
        }
        assert_eq!(p.store().read_account(JUAN).unwrap().transaction_count, 0);
    }

    #[test]
    fn test_transfer_same_account() {
        let (_dir, p) = processor();
        assert_eq!(
            p.process(&Request::transfer(JUAN, dec!(1), JUAN)),
            Response::error(SAME_ACCOUNT)
        );
    }

    #[test]
    fn test_transfer_moves_funds() {
        let (_dir, p) = processor();
        assert_eq!(
            p.process(&Request::transfer(JUAN, dec!(500.00), PEDRO)),
            Response::ok(TRANSFER_OK, dec!(500.00))
        );
        assert_eq!(p.store().read_balance(PEDRO).unwrap(), dec!(2500.67));
    }

    #[test]
    fn test_transfer_insufficient_funds_skips_destination() {
        let (_dir, p) = processor();
        assert_eq!(
            p.process(&Request::transfer(JUAN, dec!(5000.00), PEDRO)),
            Response::error(INSUFFICIENT_FUNDS)
        );
        let pedro = p.store().read_account(PEDRO).unwrap();
        assert_eq!(pedro.balance, dec!(2000.67));
        assert_eq!(pedro.transaction_count, 0);
    }

    #[test]
    fn test_transfer_to_missing_destination_is_compensated() {
        let (_dir, p) = processor();
        assert_eq!(
            p.process(&Request::transfer(JUAN, dec!(100.00), AccountNumber(4242))),
            Response::error(DESTINATION_NOT_FOUND)
        );
        let juan = p.store().read_account(JUAN).unwrap();
        assert_eq!(juan.balance, dec!(1000.00));
        assert_eq!(juan.transaction_count, 2);
    }

    #[test]
    fn test_transfer_into_full_account_is_compensated() {
        let dir = tempdir().unwrap();
        let store = LedgerStore::new(dir.path().join("cuentas.txt"));
        let gate = Gate::open(dir.path().join("cuentas.lock")).unwrap();
        let near_max = Decimal::MAX - dec!(100);
        {
            let guard = gate.acquire().unwrap();
            store
                .seed(
                    &guard,
                    &[
                        Account::new(JUAN, "Juan Vázquez", dec!(1000.00)),
                        Account::new(PEDRO, "Pedro Federico", near_max),
                    ],
                    false,
                )
                .unwrap();
        }
        let p = OperationProcessor::new(store, gate, LimitsConfig::default());

        assert_eq!(
            p.process(&Request::transfer(JUAN, dec!(500.00), PEDRO)),
            Response::error(BALANCE_LIMIT)
        );
        assert_eq!(p.store().read_balance(JUAN).unwrap(), dec!(1000.00));
        assert_eq!(p.store().read_balance(PEDRO).unwrap(), near_max);

        assert_eq!(
            p.process(&Request::deposit(PEDRO, dec!(500.00))),
            Response::error(BALANCE_LIMIT)
        );
        assert_eq!(p.store().read_account(PEDRO).unwrap().transaction_count, 0);
    }

    #[test]
    fn test_limits() {
        let (_dir, p) = processor_with(LimitsConfig {
            withdraw_limit: Some(dec!(100)),
            transfer_limit: Some(dec!(50)),
        });
        assert_eq!(
            p.process(&Request::withdraw(JUAN, dec!(100.01))),
            Response::error(WITHDRAW_LIMIT)
        );
        assert_eq!(
            p.process(&Request::transfer(JUAN, dec!(50.01), PEDRO)),
            Response::error(TRANSFER_LIMIT)
        );
        assert!(p.process(&Request::withdraw(JUAN, dec!(100))).is_ok());
        assert!(p.process(&Request::transfer(JUAN, dec!(50), PEDRO)).is_ok());
    }

    #[test]
    fn test_missing_ledger_reports_unavailable() {
        let (dir, p) = processor();
        std::fs::remove_file(dir.path().join("cuentas.txt")).unwrap();

        assert_eq!(p.process(&Request::query(JUAN)), Response::error(LEDGER_UNAVAILABLE));
        assert_eq!(
            p.process(&Request::deposit(JUAN, dec!(1))),
            Response::error(LEDGER_UNAVAILABLE)
        );
    }

    #[test]
    fn test_exit_touches_nothing() {
        let (_dir, p) = processor();
        assert_eq!(p.process(&Request::exit(JUAN)), Response::ok_message(SESSION_CLOSED));
    }
}
