//! Error types for the ingest pipeline

use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Cycle-level and startup errors.
///
/// Per-file problems are not errors of the cycle: they are collected as
/// [`ParseFailure`] and [`RetireFailure`] values and the cycle carries on.
#[derive(Error, Debug)]
pub enum IngestError {
    #[error("Failed to list watch directory {}: {source}", path.display())]
    List {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Failed to write batch artifact {artifact}: {source}")]
    Write {
        artifact: String,
        #[source]
        source: io::Error,
    },

    #[error("Failed to prepare directory {}: {source}", path.display())]
    Prepare {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Config error: {0}")]
    Config(String),

    #[error("Poll scheduler thread panicked")]
    SchedulerPanicked,

    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

/// Result type alias
pub type Result<T> = std::result::Result<T, IngestError>;

/// Why a single claim file was kept out of the batch.
#[derive(Error, Debug)]
pub enum ParseFailureKind {
    #[error("unreadable: {0}")]
    Unreadable(#[source] io::Error),

    #[error("file is empty")]
    Empty,

    #[error("malformed CSV: {0}")]
    Malformed(#[from] csv::Error),

    #[error("duplicate column '{0}'")]
    DuplicateColumn(String),

    #[error("missing required columns: {}", .0.join(", "))]
    MissingColumns(Vec<String>),

    #[error("header {found:?} does not match batch header {expected:?}")]
    HeaderMismatch {
        expected: Vec<String>,
        found: Vec<String>,
    },
}

/// A claim file excluded from the batch.
#[derive(Error, Debug)]
#[error("{file_name}: {kind}")]
pub struct ParseFailure {
    pub file_name: String,
    #[source]
    pub kind: ParseFailureKind,
}

/// A source file that could not be moved out of the watch directory.
#[derive(Error, Debug)]
#[error("Failed to move {file_name} to {}: {source}", destination.display())]
pub struct RetireFailure {
    pub file_name: String,
    pub destination: PathBuf,
    #[source]
    pub source: io::Error,
}

pub(crate) fn is_not_found(err: &io::Error) -> bool {
    err.kind() == io::ErrorKind::NotFound
}
