//! Common error types for MusicLib

use std::path::PathBuf;
use thiserror::Error;

/// Common result type for MusicLib operations
pub type Result<T> = std::result::Result<T, Error>;

/// Common error types across the MusicLib front-ends
///
/// Nothing here is fatal to the process: every variant is recovered
/// locally and surfaced as a user-visible status or log message.
#[derive(Error, Debug)]
pub enum Error {
    /// I/O operation error (wraps std::io::Error)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Database file could not be opened or read; the previously loaded
    /// record set is left in place
    #[error("Cannot open database file: {}", path.display())]
    DatabaseOpen {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Configuration loading or validation error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Maintenance script not found on any search path
    #[error("Could not find script: {0}")]
    ScriptNotFound(String),

    /// A maintenance operation is already running; concurrent launches
    /// are rejected, never queued
    #[error("Operation '{0}' is still running")]
    ScriptBusy(String),

    /// Invalid user input or request parameter
    #[error("Invalid input: {0}")]
    InvalidInput(String),
}
