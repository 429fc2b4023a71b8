//! Errors of loading and persisting results.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Errors that can occur while loading or persisting benchmark results.
#[derive(Debug, Error)]
pub enum Error {
    /// A result or summary file could not be read or written.
    #[error("failed to access `{path}`: {source}")]
    Io {
        /// The file that was accessed.
        path: PathBuf,
        /// The underlying I/O error.
        #[source]
        source: io::Error,
    },

    /// A result file did not contain a valid list of records.
    #[error("failed to decode `{path}`: {source}")]
    Decode {
        /// The file that was decoded.
        path: PathBuf,
        /// The underlying JSON error.
        #[source]
        source: serde_json::Error,
    },

    /// Results could not be serialized.
    #[error("failed to encode results: {0}")]
    Encode(#[source] serde_json::Error),
}

impl Error {
    pub(crate) fn io(path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

/// Result type for fallible loading and persisting of benchmark results.
pub type Result<T, E = Error> = std::result::Result<T, E>;
