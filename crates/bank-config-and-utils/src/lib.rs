//! Core configuration, paths, and utilities for the teller-bank server.

mod config;
mod error;
mod logging;
mod paths;

pub use config::{AlertConfig, Config, LimitsConfig, DEFAULT_CLIENT_COMMAND, DEFAULT_LOG_LEVEL};
pub use error::{CoreError, CoreResult};
pub use logging::init_logging;
pub use paths::Paths;
