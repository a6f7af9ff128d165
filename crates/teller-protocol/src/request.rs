//! Inbound requests.

use crate::{ProtocolError, DELIMITER};
use ledger_store::{format_amount, AccountNumber};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Operation named by a request keyword.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestKind {
    Query,
    Deposit,
    Withdraw,
    Transfer,
    Exit,
}

impl RequestKind {
    /// Canonical keyword written by [`encode_request`].
    pub fn keyword(self) -> &'static str {
        match self {
            Self::Query => "CONSULTA",
            Self::Deposit => "DEPOSITO",
            Self::Withdraw => "RETIRO",
            Self::Transfer => "TRANSFER",
            Self::Exit => "SALIR",
        }
    }

    fn from_keyword(keyword: &str) -> Option<Self> {
        match keyword {
            "CONSULTA" => Some(Self::Query),
            "DEPOSIT" | "DEPOSITO" => Some(Self::Deposit),
            "RETIRO" => Some(Self::Withdraw),
            "TRANSFER" | "TRANSFERENCIA" => Some(Self::Transfer),
            "SALIR" | "EXIT" => Some(Self::Exit),
            _ => None,
        }
    }

    /// Number of fields including the keyword.
    fn arity(self) -> usize {
        match self {
            Self::Query | Self::Exit => 2,
            Self::Deposit | Self::Withdraw => 3,
            Self::Transfer => 4,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Query => "query",
            Self::Deposit => "deposit",
            Self::Withdraw => "withdraw",
            Self::Transfer => "transfer",
            Self::Exit => "exit",
        }
    }
}

impl fmt::Display for RequestKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A decoded teller request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Request {
    pub kind: RequestKind,
    pub account: AccountNumber,
    /// Present for deposit, withdraw and transfer.
    pub amount: Option<Decimal>,
    /// Present only for transfer.
    pub destination: Option<AccountNumber>,
}

impl Request {
    pub fn query(account: AccountNumber) -> Self {
        Self::simple(RequestKind::Query, account)
    }

    pub fn exit(account: AccountNumber) -> Self {
        Self::simple(RequestKind::Exit, account)
    }

    pub fn deposit(account: AccountNumber, amount: Decimal) -> Self {
        Self::with_amount(RequestKind::Deposit, account, amount)
    }

    pub fn withdraw(account: AccountNumber, amount: Decimal) -> Self {
        Self::with_amount(RequestKind::Withdraw, account, amount)
    }

    pub fn transfer(account: AccountNumber, amount: Decimal, destination: AccountNumber) -> Self {
        Self {
            destination: Some(destination),
            ..Self::with_amount(RequestKind::Transfer, account, amount)
        }
    }

    fn simple(kind: RequestKind, account: AccountNumber) -> Self {
        Self {
            kind,
            account,
            amount: None,
            destination: None,
        }
    }

    fn with_amount(kind: RequestKind, account: AccountNumber, amount: Decimal) -> Self {
        Self {
            amount: Some(amount),
            ..Self::simple(kind, account)
        }
    }
}

/// Decode one inbound frame for a session bound to `bound_account`.
///
/// Trailing line terminators are ignored. The account field must equal the
/// session's account.
pub fn decode(line: &str, bound_account: AccountNumber) -> Result<Request, ProtocolError> {
    let line = line.trim_end_matches(['\n', '\r']);
    if line.is_empty() {
        return Err(ProtocolError::request("empty frame"));
    }

    let fields: Vec<&str> = line.split(DELIMITER).collect();
    let kind = RequestKind::from_keyword(fields[0])
        .ok_or_else(|| ProtocolError::request(format!("unknown operation {:?}", fields[0])))?;

    if fields.len() != kind.arity() {
        return Err(ProtocolError::request(format!(
            "{} expects {} fields, got {}",
            kind.keyword(),
            kind.arity(),
            fields.len()
        )));
    }

    let account = parse_account(fields[1], "account")?;
    if account != bound_account {
        return Err(ProtocolError::request(format!(
            "account {} does not belong to this session",
            account
        )));
    }

    let mut request = Request::simple(kind, account);
    if fields.len() >= 3 {
        request.amount = Some(parse_amount(fields[2])?);
    }
    if kind == RequestKind::Transfer {
        request.destination = Some(parse_account(fields[3], "destination account")?);
    }
    Ok(request)
}

/// Render a request as a frame, without the trailing newline.
pub fn encode_request(request: &Request) -> String {
    let mut frame = format!("{}{}{}", request.kind.keyword(), DELIMITER, request.account);
    if let Some(amount) = request.amount {
        frame.push(DELIMITER);
        frame.push_str(&format_amount(amount));
    }
    if let Some(destination) = request.destination {
        frame.push(DELIMITER);
        frame.push_str(&destination.to_string());
    }
    frame
}

fn parse_account(field: &str, what: &str) -> Result<AccountNumber, ProtocolError> {
    field
        .parse::<AccountNumber>()
        .map_err(|_| ProtocolError::request(format!("invalid {} {:?}", what, field)))
}

fn parse_amount(field: &str) -> Result<Decimal, ProtocolError> {
    let trimmed = field.trim();
    let amount = Decimal::from_str(trimmed)
        .map_err(|_| ProtocolError::request(format!("invalid amount {:?}", field)))?;
    if amount.scale() > 2 {
        return Err(ProtocolError::request(format!(
            "amount {:?} has more than two decimal places",
            field
        )));
    }
    Ok(amount)
}
