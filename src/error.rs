// ABOUTME: Error taxonomy for config loading, authentication and session lifecycle
// ABOUTME: Every variant except per-candidate auth failures is fatal to the invocation

use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("cannot find home directory")]
    HomeDir,

    #[error("failed to read SSH config {}", path.display())]
    ConfigIo {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("no SSH hosts found in {}", path.display())]
    ConfigEmpty { path: PathBuf },

    #[error("invalid settings: {0}")]
    Settings(String),

    #[error("all authentication methods were rejected for {user}@{address}")]
    AuthExhausted { user: String, address: String },

    #[error("failed to connect: {0}")]
    Dial(String),

    #[error("failed to set up terminal: {0}")]
    Pty(String),

    #[error("session failed: {0}")]
    SessionRuntime(String),

    #[error("remote shell exited with status {0}")]
    RemoteExit(u32),

    #[error("host selection failed: {0}")]
    Selector(String),
}

impl From<russh::Error> for Error {
    fn from(err: russh::Error) -> Self {
        Error::SessionRuntime(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, Error>;
