//! Teller bank server: teller sessions over named pipes against a flat-file ledger.

mod app;
mod teller;

use std::path::PathBuf;

use bank_config_and_utils::{init_logging, Config, Paths};
use clap::{Parser, Subcommand};

/// Teller bank command-line interface.
#[derive(Parser)]
#[command(name = "teller-bank")]
#[command(about = "Multi-session bank server and teller client")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Log level (trace, debug, info, warn, error). Overrides the config file.
    #[arg(short, long, global = true)]
    log_level: Option<String>,

    /// Base directory for runtime files (ledger, channels, logs, config). Defaults to ~/.teller-bank
    #[arg(long, global = true, env = "TELLER_BANK_HOME")]
    base_dir: Option<PathBuf>,

    /// Mirror log lines to stderr
    #[arg(long, global = true)]
    log_stderr: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the server, reading account numbers from stdin (0 shuts down)
    Serve,
    /// Write the demo accounts to the ledger
    Seed {
        /// Replace an existing ledger
        #[arg(long)]
        force: bool,
    },
    /// Print every account in the ledger
    Accounts,
    /// Check whether a server is running
    Status,
    /// Stop a running server
    Stop,
    /// Run the teller client for one session
    Teller {
        /// Channel the server writes responses to
        #[arg(long)]
        to_client: PathBuf,
        /// Channel the server reads requests from
        #[arg(long)]
        from_client: PathBuf,
        /// Account bound to the session
        #[arg(long)]
        account: u32,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let paths = match cli.base_dir {
        Some(base) => Paths::with_base_dir(base),
        None => Paths::new()?,
    };
    let mut config = Config::load(&paths)?;
    if let Some(level) = cli.log_level {
        config.log_level = level;
    }
    config.validate()?;

    let service_name = match cli.command {
        Some(Commands::Teller { .. }) => "teller",
        _ => "bank",
    };
    init_logging(service_name, &config.log_level, &paths.log_file(), cli.log_stderr);

    match cli.command {
        Some(Commands::Serve) | None => app::run_server(config, paths).await?,
        Some(Commands::Seed { force }) => app::seed_ledger(&config, &paths, force)?,
        Some(Commands::Accounts) => app::print_accounts(&config, &paths)?,
        Some(Commands::Status) => app::check_status(&config, &paths)?,
        Some(Commands::Stop) => app::stop_running(&config, &paths).await?,
        Some(Commands::Teller {
            to_client,
            from_client,
            account,
        }) => {
            teller::run_teller(&to_client, &from_client, account.into(), config.open_timeout()).await?
        }
    }

    Ok(())
}
