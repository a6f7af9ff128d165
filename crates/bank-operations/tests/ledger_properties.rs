//! End-to-end request processing against a real ledger file.

use bank_config_and_utils::LimitsConfig;
use bank_operations::{messages, OperationProcessor};
use ledger_store::{default_accounts, AccountNumber, Gate, LedgerStore};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::sync::Arc;
use std::thread;
use teller_protocol::{decode, encode, Request, Response};
use tempfile::{tempdir, TempDir};

// =============================================================================
// Helpers
// =============================================================================

const JUAN: AccountNumber = AccountNumber(1001);
const PEDRO: AccountNumber = AccountNumber(1002);

fn seeded_processor() -> (TempDir, OperationProcessor) {
    let dir = tempdir().unwrap();
    let store = LedgerStore::new(dir.path().join("cuentas.txt"));
    let gate = Gate::open(dir.path().join("cuentas.lock")).unwrap();
    {
        let guard = gate.acquire().unwrap();
        store.seed(&guard, &default_accounts(), false).unwrap();
    }
    (dir, OperationProcessor::new(store, gate, LimitsConfig::default()))
}

/// Decode a frame for `account`, process it, and encode the reply.
fn roundtrip(processor: &OperationProcessor, account: AccountNumber, frame: &str) -> String {
    let request = decode(frame, account).unwrap();
    encode(&processor.process(&request))
}

// =============================================================================
// Scenario
// =============================================================================

#[test]
fn teller_session_scenario() {
    let (_dir, p) = seeded_processor();

    assert_eq!(
        roundtrip(&p, JUAN, "DEPOSITO|1001|250.00"),
        "OK|deposit accepted|1250.00"
    );
    assert_eq!(roundtrip(&p, JUAN, "RETIRO|1001|2000.00"), "ERROR|insufficient funds");
    assert_eq!(p.store().read_balance(JUAN).unwrap(), dec!(1250.00));
    assert_eq!(
        roundtrip(&p, JUAN, "TRANSFER|1001|500.00|1002"),
        "OK|transfer accepted|750.00"
    );
    assert_eq!(roundtrip(&p, PEDRO, "CONSULTA|1002"), "SALDO|2500.67");
}

// =============================================================================
// Properties
// =============================================================================

#[test]
fn deposits_and_withdrawals_sum_exactly() {
    let (_dir, p) = seeded_processor();
    let start = p.store().read_account(JUAN).unwrap();

    let ops: [(bool, Decimal); 8] = [
        (true, dec!(10.10)),
        (false, dec!(5.05)),
        (false, dec!(99999.00)),
        (true, dec!(0.01)),
        (false, dec!(1005.06)),
        (true, dec!(300.00)),
        (false, dec!(0.99)),
        (false, dec!(5000.00)),
    ];

    let mut expected = start.balance;
    let mut applied = 0u64;
    for (is_deposit, amount) in ops {
        let response = if is_deposit {
            p.process(&Request::deposit(JUAN, amount))
        } else {
            p.process(&Request::withdraw(JUAN, amount))
        };
        if response.is_ok() {
            expected += if is_deposit { amount } else { -amount };
            applied += 1;
        } else {
            assert_eq!(response, Response::error(messages::INSUFFICIENT_FUNDS));
        }
    }

    let end = p.store().read_account(JUAN).unwrap();
    assert_eq!(end.balance, expected);
    assert_eq!(end.transaction_count, start.transaction_count + applied);
    assert_eq!(applied, 6);
}

#[test]
fn repeated_queries_are_identical() {
    let (_dir, p) = seeded_processor();
    let first = p.process(&Request::query(PEDRO));
    for _ in 0..5 {
        assert_eq!(p.process(&Request::query(PEDRO)), first);
    }
}

#[test]
fn failed_transfer_restores_source_balance() {
    let (_dir, p) = seeded_processor();
    let before = p.store().read_balance(JUAN).unwrap();

    let response = p.process(&Request::transfer(JUAN, dec!(400.00), AccountNumber(9999)));

    assert_eq!(response, Response::error(messages::DESTINATION_NOT_FOUND));
    assert_eq!(p.store().read_balance(JUAN).unwrap(), before);
}

#[test]
fn concurrent_deposits_lose_no_updates() {
    let (_dir, p) = seeded_processor();
    let p = Arc::new(p);
    let before = p.store().read_balance(PEDRO).unwrap();

    let sessions: Vec<_> = (0..6)
        .map(|_| {
            let p = Arc::clone(&p);
            thread::spawn(move || {
                for _ in 0..15 {
                    assert!(p.process(&Request::deposit(PEDRO, dec!(2.50))).is_ok());
                }
            })
        })
        .collect();
    for session in sessions {
        session.join().unwrap();
    }

    assert_eq!(
        p.store().read_balance(PEDRO).unwrap(),
        before + dec!(2.50) * Decimal::from(90)
    );
}

#[test]
fn concurrent_transfers_conserve_total() {
    let (_dir, p) = seeded_processor();
    let p = Arc::new(p);
    let total = |p: &OperationProcessor| -> Decimal {
        p.store()
            .list_accounts()
            .unwrap()
            .iter()
            .map(|a| a.balance)
            .sum()
    };
    let before = total(&p);

    let a = {
        let p = Arc::clone(&p);
        thread::spawn(move || {
            for _ in 0..20 {
                p.process(&Request::transfer(JUAN, dec!(75.25), PEDRO));
            }
        })
    };
    let b = {
        let p = Arc::clone(&p);
        thread::spawn(move || {
            for _ in 0..20 {
                p.process(&Request::transfer(PEDRO, dec!(30.00), JUAN));
            }
        })
    };
    a.join().unwrap();
    b.join().unwrap();

    assert_eq!(total(&p), before);
    assert!(p.store().read_balance(JUAN).unwrap() >= Decimal::ZERO);
}
