//! Errors from loading settings and laying out the runtime directory.

use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CoreError {
    /// A setting the server cannot run with.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("cannot read config file {}: {source}", path.display())]
    ConfigRead {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("config file {} is not valid JSON: {source}", path.display())]
    ConfigParse {
        path: PathBuf,
        source: serde_json::Error,
    },

    #[error("cannot write {}: {source}", path.display())]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("cannot create directory {}: {source}", path.display())]
    CreateDir {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("cannot determine the home directory")]
    NoHomeDir,

    #[error("cannot encode configuration: {0}")]
    Encode(#[from] serde_json::Error),
}

pub type CoreResult<T> = Result<T, CoreError>;
