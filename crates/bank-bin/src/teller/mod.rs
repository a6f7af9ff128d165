//! Teller client: the process on the other end of one session.
//!
//! Opens the session channels in the order the server expects (the
//! request channel for writing, then the response channel for reading),
//! then runs a prompt loop with one request in flight at a time.

mod command;

use anyhow::Context;
use command::{parse_command, render_response, Command, HELP};
use ledger_store::AccountNumber;
use std::fs::{File, OpenOptions};
use std::io::Write as _;
use std::path::{Path, PathBuf};
use std::time::Duration;
use teller_protocol::{decode_response, encode_request, Request, RequestKind};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::unix::pipe;
use tracing::{debug, info, warn};

/// Run one teller session until the user exits or the server closes it.
pub async fn run_teller(
    to_client: &Path,
    from_client: &Path,
    account: AccountNumber,
    open_timeout: Duration,
) -> anyhow::Result<()> {
    let (outbound, inbound) = open_channels(to_client, from_client, open_timeout).await?;
    let mut outbound = pipe::Sender::from_file(outbound)?;
    let mut replies = BufReader::new(pipe::Receiver::from_file(inbound)?).lines();
    let mut input = BufReader::new(tokio::io::stdin()).lines();

    info!(%account, "teller connected");
    println!("Teller session for account {account}.");
    println!("{HELP}");

    loop {
        prompt(account);
        let request = match input.next_line().await? {
            None => Request::exit(account),
            Some(line) => match parse_command(&line, account) {
                Ok(Command::Send(request)) => request,
                Ok(Command::Help) => {
                    println!("{HELP}");
                    continue;
                }
                Ok(Command::Empty) => continue,
                Err(message) => {
                    println!("{message}");
                    continue;
                }
            },
        };

        let frame = encode_request(&request);
        debug!(%frame, "sending request");
        outbound.write_all(format!("{frame}\n").as_bytes()).await?;

        match replies.next_line().await? {
            Some(line) => match decode_response(&line) {
                Ok(response) => println!("{}", render_response(&response)),
                Err(e) => {
                    warn!(error = %e, %line, "unreadable reply");
                    println!("Unreadable reply from server: {line}");
                }
            },
            None => {
                println!("The server closed this session.");
                return Ok(());
            }
        }

        if request.kind == RequestKind::Exit {
            info!(%account, "teller exiting");
            return Ok(());
        }
    }
}

fn prompt(account: AccountNumber) {
    print!("[{account}]> ");
    let _ = std::io::stdout().flush();
}

/// Blocking opens: writing blocks until the server reads, reading blocks
/// until the server writes. Runs off the runtime with a deadline.
async fn open_channels(
    to_client: &Path,
    from_client: &Path,
    timeout: Duration,
) -> anyhow::Result<(File, File)> {
    let to_client: PathBuf = to_client.to_path_buf();
    let from_client: PathBuf = from_client.to_path_buf();

    let task = tokio::task::spawn_blocking(move || -> anyhow::Result<(File, File)> {
        let outbound = OpenOptions::new()
            .write(true)
            .open(&from_client)
            .with_context(|| format!("cannot open {}", from_client.display()))?;
        let inbound = File::open(&to_client)
            .with_context(|| format!("cannot open {}", to_client.display()))?;
        Ok((outbound, inbound))
    });

    tokio::time::timeout(timeout, task)
        .await
        .with_context(|| format!("server did not connect within {timeout:?}"))??
}
