//! Error types for the download job core.

use std::path::PathBuf;
use thiserror::Error;

/// Main error type for job execution.
#[derive(Debug, Error)]
pub enum JobError {
    /// `start` was rejected because a job is already active.
    #[error("a download job is already running")]
    AlreadyRunning,

    /// The job was cancelled by the user.
    #[error("Download cancelled")]
    Cancelled,

    /// The content engine reported a failure (network, decrypt, extract).
    /// Surfaced verbatim; not retried by this core.
    #[error("{0}")]
    Engine(String),

    /// The destination store rejected an operation during finalize.
    #[error(transparent)]
    Materialize(#[from] MaterializeError),

    /// The engine reported success but no output folder exists.
    #[error("Output folder not found. Expected {0}")]
    OutputMissing(PathBuf),

    /// Usage error, e.g. resetting the cancel token while a job is active.
    #[error("invalid state: {0}")]
    InvalidState(&'static str),

    /// An I/O error outside the destination store.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors from the destination materializer.
#[derive(Debug, Error)]
pub enum MaterializeError {
    /// The copy source is missing or not a directory.
    #[error("source is not a directory: {0}")]
    NotADirectory(PathBuf),

    /// The destination store refused to create a directory entry.
    #[error("failed to create destination directory {name:?}: {reason}")]
    CreateDir { name: String, reason: String },

    /// The destination store refused to create or open a file entry.
    #[error("failed to create destination file {name:?}: {reason}")]
    CreateFile { name: String, reason: String },

    /// The copy was cancelled between files.
    #[error("copy cancelled by user")]
    Cancelled,

    /// An I/O error while reading the source or streaming bytes.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors returned by a content engine implementation.
#[derive(Debug, Error)]
pub enum EngineError {
    /// The engine observed the cancel token and stopped.
    #[error("cancelled by user")]
    Cancelled,

    /// Any other engine failure; the message is shown to the user as-is.
    #[error("{0}")]
    Failed(String),
}
