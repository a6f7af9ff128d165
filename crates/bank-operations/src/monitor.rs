//! Suspicious-activity detection over applied operations.

use bank_config_and_utils::AlertConfig;
use ledger_store::{format_amount, AccountNumber};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use teller_protocol::RequestKind;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "alert", rename_all = "snake_case")]
pub enum AlertKind {
    LargeAmount { kind: RequestKind, amount: Decimal },
    ConsecutiveWithdrawals { count: u32 },
    ConsecutiveTransfers { count: u32 },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Alert {
    pub account: AccountNumber,
    #[serde(flatten)]
    pub kind: AlertKind,
}

impl fmt::Display for Alert {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            AlertKind::LargeAmount { kind, amount } => write!(
                f,
                "account {}: large {} of {}",
                self.account,
                kind,
                format_amount(*amount)
            ),
            AlertKind::ConsecutiveWithdrawals { count } => {
                write!(f, "account {}: {} consecutive withdrawals", self.account, count)
            }
            AlertKind::ConsecutiveTransfers { count } => {
                write!(f, "account {}: {} consecutive transfers", self.account, count)
            }
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct Streak {
    kind: RequestKind,
    count: u32,
}

/// Tracks per-account operation streaks.
///
/// Only successfully applied mutations should be fed in. A streak counts
/// consecutive operations of one kind on one account; any other kind on
/// that account starts a new streak.
#[derive(Debug)]
pub struct AlertMonitor {
    config: AlertConfig,
    streaks: HashMap<AccountNumber, Streak>,
}

impl AlertMonitor {
    pub fn new(config: AlertConfig) -> Self {
        Self {
            config,
            streaks: HashMap::new(),
        }
    }

    /// Record one applied operation and return any alerts it raises.
    pub fn observe(&mut self, account: AccountNumber, kind: RequestKind, amount: Decimal) -> Vec<Alert> {
        let mut alerts = Vec::new();

        let watched = matches!(kind, RequestKind::Withdraw | RequestKind::Transfer);
        if watched && amount > self.config.large_amount {
            alerts.push(Alert {
                account,
                kind: AlertKind::LargeAmount { kind, amount },
            });
        }

        let streak = self
            .streaks
            .entry(account)
            .and_modify(|s| {
                if s.kind == kind {
                    s.count += 1;
                } else {
                    *s = Streak { kind, count: 1 };
                }
            })
            .or_insert(Streak { kind, count: 1 });

        match kind {
            RequestKind::Withdraw if streak.count > self.config.consecutive_withdrawals => {
                alerts.push(Alert {
                    account,
                    kind: AlertKind::ConsecutiveWithdrawals {
                        count: streak.count,
                    },
                });
            }
            RequestKind::Transfer if streak.count > self.config.consecutive_transfers => {
                alerts.push(Alert {
                    account,
                    kind: AlertKind::ConsecutiveTransfers {
                        count: streak.count,
                    },
                });
            }
            _ => {}
        }

        alerts
    }

    /// Forget the streak of `account`, e.g. when its session closes.
    pub fn reset(&mut self, account: AccountNumber) {
        self.streaks.remove(&account);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    const ACC: AccountNumber = AccountNumber(1001);

    fn monitor() -> AlertMonitor {
        AlertMonitor::new(AlertConfig::default())
    }

    #[test]
    fn test_large_withdrawal_alerts() {
        let mut m = monitor();
        let alerts = m.observe(ACC, RequestKind::Withdraw, dec!(10000.01));
        assert_eq!(
            alerts,
            vec![Alert {
                account: ACC,
                kind: AlertKind::LargeAmount {
                    kind: RequestKind::Withdraw,
                    amount: dec!(10000.01)
                }
            }]
        );
        assert!(m.observe(ACC, RequestKind::Deposit, dec!(50000)).is_empty());
        assert!(m.observe(ACC, RequestKind::Transfer, dec!(10000.00)).is_empty());
    }

    #[test]
    fn test_fourth_consecutive_withdrawal_alerts() {
        let mut m = monitor();
        for _ in 0..3 {
            assert!(m.observe(ACC, RequestKind::Withdraw, dec!(1)).is_empty());
        }
        let alerts = m.observe(ACC, RequestKind::Withdraw, dec!(1));
        assert_eq!(alerts.len(), 1);
        assert_eq!(alerts[0].kind, AlertKind::ConsecutiveWithdrawals { count: 4 });
        assert_eq!(alerts[0].to_string(), "account 1001: 4 consecutive withdrawals");
    }

    #[test]
    fn test_other_kind_resets_streak() {
        let mut m = monitor();
        for _ in 0..3 {
            m.observe(ACC, RequestKind::Transfer, dec!(1));
        }
        m.observe(ACC, RequestKind::Deposit, dec!(1));
        assert!(m.observe(ACC, RequestKind::Transfer, dec!(1)).is_empty());
    }

    #[test]
    fn test_streaks_are_per_account() {
        let mut m = monitor();
        for _ in 0..3 {
            m.observe(ACC, RequestKind::Withdraw, dec!(1));
            m.observe(AccountNumber(1002), RequestKind::Withdraw, dec!(1));
        }
        assert_eq!(m.observe(ACC, RequestKind::Withdraw, dec!(1)).len(), 1);

        m.reset(ACC);
        assert!(m.observe(ACC, RequestKind::Withdraw, dec!(1)).is_empty());
    }
}
