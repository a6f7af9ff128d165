//! Account records and the text record format.

use crate::{LedgerError, LedgerResult};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Field delimiter for ledger records and wire frames.
pub(crate) const FIELD_DELIMITER: char = '|';

/// Account identity, the unique key of the ledger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AccountNumber(pub u32);

impl AccountNumber {
    pub fn get(self) -> u32 {
        self.0
    }
}

impl fmt::Display for AccountNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

impl FromStr for AccountNumber {
    type Err = std::num::ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.trim().parse::<u32>().map(AccountNumber)
    }
}

impl From<u32> for AccountNumber {
    fn from(value: u32) -> Self {
        AccountNumber(value)
    }
}

/// One row of the ledger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    pub account_number: AccountNumber,
    pub holder_name: String,
    pub balance: Decimal,
    pub transaction_count: u64,
}

impl Account {
    pub fn new(account_number: impl Into<AccountNumber>, holder_name: impl Into<String>, balance: Decimal) -> Self {
        Self {
            account_number: account_number.into(),
            holder_name: holder_name.into(),
            balance,
            transaction_count: 0,
        }
    }

    /// Parse one `account|holder|balance|count` line.
    ///
    /// `line_no` is 1-based and only used for error reporting.
    pub(crate) fn parse_record(line: &str, line_no: usize) -> LedgerResult<Self> {
        let corrupt = |reason: String| LedgerError::Corrupt {
            line: line_no,
            reason,
        };

        let fields: Vec<&str> = line.split(FIELD_DELIMITER).collect();
        if fields.len() != 4 {
            return Err(corrupt(format!("expected 4 fields, found {}", fields.len())));
        }

        let account_number = fields[0]
            .parse::<AccountNumber>()
            .map_err(|e| corrupt(format!("account number {:?}: {}", fields[0], e)))?;
        let balance = Decimal::from_str(fields[2].trim())
            .map_err(|e| corrupt(format!("balance {:?}: {}", fields[2], e)))?;
        let transaction_count = fields[3]
            .trim()
            .parse::<u64>()
            .map_err(|e| corrupt(format!("transaction count {:?}: {}", fields[3], e)))?;

        Ok(Self {
            account_number,
            holder_name: fields[1].to_string(),
            balance,
            transaction_count,
        })
    }

    /// Render the record line, without the trailing newline.
    pub(crate) fn format_record(&self) -> String {
        format!(
            "{}{d}{}{d}{}{d}{}",
            self.account_number,
            self.holder_name,
            format_amount(self.balance),
            self.transaction_count,
            d = FIELD_DELIMITER
        )
    }

    pub(crate) fn validate_holder_name(name: &str) -> LedgerResult<()> {
        if name.contains(FIELD_DELIMITER) || name.contains('\n') || name.contains('\r') {
            return Err(LedgerError::InvalidHolderName(name.to_string()));
        }
        Ok(())
    }
}

/// Format a monetary amount with exactly two fractional digits.
pub fn format_amount(amount: Decimal) -> String {
    format!("{:.2}", amount.round_dp(2))
}

/// The demo accounts written by `seed` when no ledger exists yet.
pub fn default_accounts() -> Vec<Account> {
    [
        (1001, "Juan Vázquez", Decimal::new(100_000, 2)),
        (1002, "Pedro Federico", Decimal::new(200_067, 2)),
        (1003, "Maria Fernández", Decimal::new(300_043, 2)),
        (1004, "Ana Ramírez", Decimal::new(400_023, 2)),
        (1005, "Carmen Denia", Decimal::new(500_098, 2)),
        (1006, "José Luis Dominguez", Decimal::new(500_098, 2)),
        (1007, "Gonzalo D'Lorenzo", Decimal::new(500_098, 2)),
        (1008, "Fran García", Decimal::new(500_098, 2)),
        (1009, "Carlos Sévez", Decimal::new(500_098, 2)),
    ]
    .into_iter()
    .map(|(number, name, balance)| Account::new(number, name, balance))
    .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_parse_record() {
        let account = Account::parse_record("1001|Juan Vázquez|1000.00|3", 1).unwrap();
        assert_eq!(account.account_number, AccountNumber(1001));
        assert_eq!(account.holder_name, "Juan Vázquez");
        assert_eq!(account.balance, dec!(1000.00));
        assert_eq!(account.transaction_count, 3);
    }

    #[test]
    fn test_format_record_pads_cents() {
        let account = Account::new(1002u32, "Pedro Federico", dec!(2000.5));
        assert_eq!(account.format_record(), "1002|Pedro Federico|2000.50|0");
    }

    #[test]
    fn test_parse_rejects_wrong_field_count() {
        let err = Account::parse_record("1001|Juan|1000.00", 7).unwrap_err();
        match err {
            LedgerError::Corrupt { line, .. } => assert_eq!(line, 7),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_parse_rejects_bad_numbers() {
        assert!(Account::parse_record("abc|Juan|1000.00|0", 1).is_err());
        assert!(Account::parse_record("1001|Juan|lots|0", 1).is_err());
        assert!(Account::parse_record("1001|Juan|1000.00|-1", 1).is_err());
    }

    #[test]
    fn test_holder_name_validation() {
        assert!(Account::validate_holder_name("Ana Ramírez").is_ok());
        assert!(Account::validate_holder_name("Ana|Ramírez").is_err());
        assert!(Account::validate_holder_name("Ana\nRamírez").is_err());
    }

    #[test]
    fn test_format_amount() {
        assert_eq!(format_amount(dec!(1250)), "1250.00");
        assert_eq!(format_amount(dec!(2500.67)), "2500.67");
        assert_eq!(format_amount(dec!(-3.1)), "-3.10");
    }

    #[test]
    fn test_default_accounts_are_unique() {
        let accounts = default_accounts();
        assert_eq!(accounts.len(), 9);
        let mut numbers: Vec<_> = accounts.iter().map(|a| a.account_number).collect();
        numbers.dedup();
        assert_eq!(numbers.len(), 9);
        assert_eq!(accounts[1].balance, dec!(2000.67));
    }
}
