use crate::store::format::FormatError;
use std::io;
use std::path::PathBuf;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

/// Errors surfaced by the stores.
///
/// A missing key is never an error: lookups return `Ok(None)`.
#[derive(Debug, Error)]
pub enum Error {
    /// A filesystem call failed outright (disk full, permission denied, ...).
    #[error("failed to {operation} {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        operation: &'static str,
        #[source]
        source: io::Error,
    },

    /// A writer file, or an entry read back from one, could not be decoded.
    #[error("failed to decode {}: {source}", .path.display())]
    Format {
        path: PathBuf,
        #[source]
        source: FormatError,
    },

    /// The consolidated snapshot could not be decoded. Merging refuses to
    /// continue so that previously durable entries are never dropped.
    #[error("merged file {} is corrupt: {source}", .path.display())]
    CorruptMergedFile {
        path: PathBuf,
        #[source]
        source: FormatError,
    },

    /// Encoding a key, a value or a whole file failed.
    #[error("failed to encode {what}: {source}")]
    Encode {
        what: &'static str,
        #[source]
        source: FormatError,
    },

    /// The staged temporary file could not be moved into place.
    #[error("failed to move staged file into {}: {source}", .path.display())]
    Persist {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

impl Error {
    pub(crate) fn io(path: impl Into<PathBuf>, operation: &'static str, source: io::Error) -> Self {
        Error::Io {
            path: path.into(),
            operation,
            source,
        }
    }
}
