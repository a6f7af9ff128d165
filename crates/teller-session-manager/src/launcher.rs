//! Client process launching.

use ledger_store::AccountNumber;
use std::io;
use std::path::PathBuf;
use std::process::Stdio;
use tokio::process::{Child, Command};

/// Everything a launched client needs to find its session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchSpec {
    pub slot: usize,
    pub account: AccountNumber,
    pub to_client: PathBuf,
    pub from_client: PathBuf,
}

/// Starts the process that hosts a teller client.
///
/// Called after both channels exist and the inbound end is open, so the
/// client may open its ends immediately.
pub trait ClientLauncher: Send + Sync {
    fn launch(&self, spec: &LaunchSpec) -> io::Result<Child>;
}

/// Launches an argv template with `{to_client}`, `{from_client}`,
/// `{account}` and `{slot}` substituted.
#[derive(Debug, Clone)]
pub struct CommandLauncher {
    template: Vec<String>,
}

impl CommandLauncher {
    pub fn new(template: Vec<String>) -> Self {
        Self { template }
    }

    pub fn render(&self, spec: &LaunchSpec) -> Vec<String> {
        let to_client = spec.to_client.display().to_string();
        let from_client = spec.from_client.display().to_string();
        let account = spec.account.to_string();
        let slot = spec.slot.to_string();

        self.template
            .iter()
            .map(|arg| {
                arg.replace("{to_client}", &to_client)
                    .replace("{from_client}", &from_client)
                    .replace("{account}", &account)
                    .replace("{slot}", &slot)
            })
            .collect()
    }
}

impl ClientLauncher for CommandLauncher {
    fn launch(&self, spec: &LaunchSpec) -> io::Result<Child> {
        let argv = self.render(spec);
        let (program, args) = argv
            .split_first()
            .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "empty client command"))?;

        Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .spawn()
    }
}
