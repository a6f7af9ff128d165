//! Teller input parsing and reply rendering.

use ledger_store::{format_amount, AccountNumber};
use rust_decimal::Decimal;
use teller_protocol::{Request, Response};

pub(crate) const HELP: &str = "Commands: consulta | deposito <amount> | retiro <amount> | \
transferencia <amount> <account> | salir";

/// What one input line asks for.
#[derive(Debug, PartialEq, Eq)]
pub(crate) enum Command {
    Send(Request),
    Help,
    Empty,
}

/// Parse a line typed at the teller prompt into a request for `account`.
pub(crate) fn parse_command(line: &str, account: AccountNumber) -> Result<Command, String> {
    let mut words = line.split_whitespace();
    let Some(verb) = words.next() else {
        return Ok(Command::Empty);
    };
    let args: Vec<&str> = words.collect();

    let request = match (verb.to_lowercase().as_str(), args.as_slice()) {
        ("consulta" | "saldo" | "query" | "balance", []) => Request::query(account),
        ("deposito" | "deposit", [amount]) => Request::deposit(account, parse_amount(amount)?),
        ("retiro" | "withdraw", [amount]) => Request::withdraw(account, parse_amount(amount)?),
        ("transferencia" | "transfer", [amount, destination]) => Request::transfer(
            account,
            parse_amount(amount)?,
            destination
                .parse::<AccountNumber>()
                .map_err(|_| format!("Not an account number: {destination}"))?,
        ),
        ("salir" | "exit" | "quit", []) => Request::exit(account),
        ("ayuda" | "help" | "?", _) => return Ok(Command::Help),
        (
            "consulta" | "saldo" | "query" | "balance" | "deposito" | "deposit" | "retiro"
            | "withdraw" | "transferencia" | "transfer" | "salir" | "exit" | "quit",
            _,
        ) => return Err(format!("Wrong arguments for {verb}. {HELP}")),
        _ => return Err(format!("Unknown command: {verb}. {HELP}")),
    };
    Ok(Command::Send(request))
}

fn parse_amount(raw: &str) -> Result<Decimal, String> {
    let amount: Decimal = raw.parse().map_err(|_| format!("Not an amount: {raw}"))?;
    if amount.scale() > 2 {
        return Err(format!("At most two decimal places: {raw}"));
    }
    Ok(amount)
}

/// Human-readable form of a server reply.
pub(crate) fn render_response(response: &Response) -> String {
    match response {
        Response::Balance { balance } => format!("Balance: {}", format_amount(*balance)),
        Response::Ok {
            message,
            balance: Some(balance),
        } => format!("OK: {message}. New balance: {}", format_amount(*balance)),
        Response::Ok { message, balance: None } => format!("OK: {message}"),
        Response::Error { message } => format!("Error: {message}"),
    }
}
