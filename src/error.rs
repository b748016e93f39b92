//! Control-plane error taxonomy.
//!
//! Every variant's `Display` text is exactly what a client sees on the wire:
//! the protocol has no status field, so the message is the error channel.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum SupervisorError {
    /// The program's executable token does not resolve on the search path.
    #[error("Error: program '{0}' not found or not executable.")]
    UnsafeProgram(String),

    #[error("Program '{0}' already exists.")]
    AlreadyExists(String),

    #[error("Program '{0}' not found.")]
    NotFound(String),

    #[error("Program '{0}' is not running.")]
    NotRunning(String),

    #[error("Program '{0}' is already running.")]
    AlreadyActive(String),

    #[error("Error: invalid interval '{0}'.")]
    InvalidInterval(String),

    #[error("Output for '{0}' not found.")]
    OutputNotFound(String),

    #[error("Server error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Server error: {0}")]
    Json(#[from] serde_json::Error),
}

impl SupervisorError {
    /// Refusals are expected outcomes of a control request; anything else
    /// is a server-side fault.
    pub fn is_refusal(&self) -> bool {
        !matches!(self, Self::Io(_) | Self::Json(_))
    }
}

pub type Result<T> = std::result::Result<T, SupervisorError>;
