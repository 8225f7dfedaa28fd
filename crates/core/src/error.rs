//! Error types for the dbacl model engine.

use std::path::PathBuf;
use thiserror::Error;

/// Main error type shared by every dbacl crate.
///
/// Every variant is fatal for the operation that produced it: a category that
/// fails to load is never partially usable. Recoverable conditions (full
/// tables, refused growth, divergence mismatches) are logged instead.
#[derive(Error, Debug)]
pub enum DbaclError {
    /// I/O error with file context
    #[error("I/O error for {path}: {err}")]
    Io {
        path: PathBuf,
        #[source]
        err: std::io::Error,
    },

    /// Malformed category header or dump line
    #[error("Bad category file: {0}")]
    Format(String),

    /// Binary section shorter than the header announced
    #[error("Corrupt category {path}: expected {expected} bytes, got {got}")]
    Truncated {
        path: PathBuf,
        expected: usize,
        got: usize,
    },

    /// Category dump could not be merged
    #[error("Dump error: {0}")]
    Dump(String),

    /// Risk specification or score line error
    #[error("Risk specification error: {0}")]
    RiskSpec(String),

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Hash table cannot take another record
    #[error("Hash table full ({capacity} slots)")]
    TableFull { capacity: usize },

    /// Regular expression failed to compile
    #[error("Regex error: {0}")]
    Regex(#[from] regex::Error),
}

impl DbaclError {
    /// Wrap an I/O error with the path it concerns.
    pub fn io(path: impl Into<PathBuf>, err: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            err,
        }
    }
}

/// Result type alias for dbacl operations.
pub type Result<T> = std::result::Result<T, DbaclError>;
