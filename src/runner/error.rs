use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Failure of a single command. Always recovered by the interpreter.
#[derive(Debug, Error)]
pub enum CommandError {
    #[error("unknown block '{0}'")]
    UnknownBlock(String),

    #[error("recursive block reference: {}", .0.join(" -> "))]
    RecursiveBlock(Vec<String>),

    #[error("invalid operand for '{prefix}': {reason}")]
    InvalidOperand {
        prefix: &'static str,
        reason: String,
    },

    #[error("invalid sleep duration '{0}'")]
    InvalidSleep(String),

    #[error("'{0}' is reserved by the engine and cannot be assigned")]
    ReservedToken(String),

    #[error("{action} '{}' failed: {source}", .path.display())]
    Io {
        action: &'static str,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("shell command failed: {0}")]
    Shell(String),

    #[error("{backend} error: {message}")]
    Backend {
        backend: &'static str,
        message: String,
    },

    #[error("command timed out after {}s", .0.as_secs())]
    Timeout(Duration),

    #[error("no install path for '{app}' on '{device}'")]
    NoInstallPath { device: String, app: String },

    #[error("cancelled")]
    Cancelled,
}

/// Coarse category of a [`CommandError`], recorded in the run report
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum ErrorKind {
    UnknownBlock,
    RecursiveBlock,
    InvalidOperand,
    ReservedToken,
    Io,
    Shell,
    Backend,
    Timeout,
    TargetResolution,
    Cancelled,
}

impl CommandError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            CommandError::UnknownBlock(_) => ErrorKind::UnknownBlock,
            CommandError::RecursiveBlock(_) => ErrorKind::RecursiveBlock,
            CommandError::InvalidOperand { .. } | CommandError::InvalidSleep(_) => {
                ErrorKind::InvalidOperand
            }
            CommandError::ReservedToken(_) => ErrorKind::ReservedToken,
            CommandError::Io { .. } => ErrorKind::Io,
            CommandError::Shell(_) => ErrorKind::Shell,
            CommandError::Backend { .. } => ErrorKind::Backend,
            CommandError::Timeout(_) => ErrorKind::Timeout,
            CommandError::NoInstallPath { .. } => ErrorKind::TargetResolution,
            CommandError::Cancelled => ErrorKind::Cancelled,
        }
    }

    pub fn backend(backend: &'static str, err: anyhow::Error) -> Self {
        CommandError::Backend {
            backend,
            message: format!("{:#}", err),
        }
    }

    pub fn invalid(prefix: &'static str, reason: impl Into<String>) -> Self {
        CommandError::InvalidOperand {
            prefix,
            reason: reason.into(),
        }
    }
}
