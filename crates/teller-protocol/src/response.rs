//! Outbound responses.

use crate::{ProtocolError, DELIMITER};
use ledger_store::format_amount;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Status {
    Ok,
    Error,
}

/// Reply to one request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Response {
    /// `OK|<message>|<balance>`, or `OK|<message>` without a balance.
    Ok {
        message: String,
        balance: Option<Decimal>,
    },
    /// `SALDO|<balance>`, the query reply.
    Balance { balance: Decimal },
    /// `ERROR|<message>`.
    Error { message: String },
}

impl Response {
    pub fn ok(message: impl Into<String>, balance: Decimal) -> Self {
        Self::Ok {
            message: message.into(),
            balance: Some(balance),
        }
    }

    pub fn ok_message(message: impl Into<String>) -> Self {
        Self::Ok {
            message: message.into(),
            balance: None,
        }
    }

    pub fn balance(balance: Decimal) -> Self {
        Self::Balance { balance }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self::Error {
            message: message.into(),
        }
    }

    pub fn status(&self) -> Status {
        match self {
            Self::Ok { .. } | Self::Balance { .. } => Status::Ok,
            Self::Error { .. } => Status::Error,
        }
    }

    pub fn is_ok(&self) -> bool {
        self.status() == Status::Ok
    }

    pub fn message(&self) -> &str {
        match self {
            Self::Ok { message, .. } | Self::Error { message } => message,
            Self::Balance { .. } => "balance",
        }
    }

    pub fn balance_value(&self) -> Option<Decimal> {
        match self {
            Self::Ok { balance, .. } => *balance,
            Self::Balance { balance } => Some(*balance),
            Self::Error { .. } => None,
        }
    }
}

/// Render a response as a frame, without the trailing newline.
///
/// Delimiters or line breaks inside messages are replaced so the frame stays
/// one line with a fixed field count.
pub fn encode(response: &Response) -> String {
    match response {
        Response::Ok {
            message,
            balance: Some(balance),
        } => format!(
            "OK{d}{}{d}{}",
            sanitize(message),
            format_amount(*balance),
            d = DELIMITER
        ),
        Response::Ok {
            message,
            balance: None,
        } => format!("OK{}{}", DELIMITER, sanitize(message)),
        Response::Balance { balance } => format!("SALDO{}{}", DELIMITER, format_amount(*balance)),
        Response::Error { message } => format!("ERROR{}{}", DELIMITER, sanitize(message)),
    }
}

/// Parse a reply frame on the client side.
pub fn decode_response(line: &str) -> Result<Response, ProtocolError> {
    let line = line.trim_end_matches(['\n', '\r']);
    let fields: Vec<&str> = line.split(DELIMITER).collect();

    match fields.as_slice() {
        ["OK", message] => Ok(Response::ok_message(*message)),
        ["OK", message, balance] => Ok(Response::ok(*message, parse_balance(balance)?)),
        ["SALDO", balance] => Ok(Response::balance(parse_balance(balance)?)),
        ["ERROR", message] => Ok(Response::error(*message)),
        _ => Err(ProtocolError::response(format!("unrecognized frame {:?}", line))),
    }
}

fn parse_balance(field: &str) -> Result<Decimal, ProtocolError> {
    Decimal::from_str(field.trim())
        .map_err(|_| ProtocolError::response(format!("invalid balance {:?}", field)))
}

fn sanitize(message: &str) -> String {
    message
        .chars()
        .map(|c| match c {
            DELIMITER => '/',
            '\n' | '\r' => ' ',
            other => other,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_encode_forms() {
        assert_eq!(
            encode(&Response::ok("deposit accepted", dec!(1250))),
            "OK|deposit accepted|1250.00"
        );
        assert_eq!(encode(&Response::ok_message("session closed")), "OK|session closed");
        assert_eq!(encode(&Response::balance(dec!(2500.67))), "SALDO|2500.67");
        assert_eq!(
            encode(&Response::error("insufficient funds")),
            "ERROR|insufficient funds"
        );
    }

    #[test]
    fn test_encode_sanitizes_message() {
        let frame = encode(&Response::error("bad|thing\nhere"));
        assert_eq!(frame, "ERROR|bad/thing here");
    }

    #[test]
    fn test_decode_response() {
        let ok = decode_response("OK|transfer accepted|750.00\n").unwrap();
        assert!(ok.is_ok());
        assert_eq!(ok.balance_value(), Some(dec!(750.00)));

        let saldo = decode_response("SALDO|2500.67").unwrap();
        assert_eq!(saldo, Response::balance(dec!(2500.67)));

        let err = decode_response("ERROR|insufficient funds").unwrap();
        assert_eq!(err.status(), Status::Error);
        assert_eq!(err.message(), "insufficient funds");
    }

    #[test]
    fn test_decode_response_rejects_garbage() {
        assert!(decode_response("HELLO").is_err());
        assert!(decode_response("SALDO|lots").is_err());
        assert!(decode_response("OK|a|b|c").is_err());
    }

    #[test]
    fn test_response_serializes_with_type_tag() {
        let json = serde_json::to_value(Response::error("account not found")).unwrap();
        assert_eq!(json["type"], "error");
        assert_eq!(json["message"], "account not found");
    }
}
