//! Errors which can happen in various parts of the library.

use thiserror::Error;

/// Crate-wide result alias.
pub type Result<T> = std::result::Result<T, Error>;

/// Enumeration of errors which can happen during the operation of the library.
#[derive(Error, Debug)]
pub enum Error {
    /// A range, type, or enum violation at the API boundary.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// Malformed protocol-buffer data or compression framing.
    #[error("corrupt input: {0}")]
    CorruptInput(String),

    /// A layer version outside {1, 2}, or v1 content rejected without upgrade.
    #[error("unsupported layer version {0}")]
    UnsupportedVersion(u32),

    /// Reserved for defensive checks; unreachable for in-range coordinates.
    #[error("projection failed: {0}")]
    Projection(String),

    /// A clipping, simplification, or validity failure the caller asked to be
    /// fatal.
    #[error("geometry error: {0}")]
    Geometry(String),

    /// A composite failure, wrapping the inner error together with the index
    /// of the failing source tile.
    #[error("composite failed for source tile {index}: {source}")]
    Composite {
        index: usize,
        #[source]
        source: Box<Error>,
    },

    /// Raster payload or byte-level IO failures.
    #[error("io error: {0}")]
    Io(String),
}

impl Error {
    /// Wraps an error as a composite failure for source tile `index`.
    pub(crate) fn into_composite(self, index: usize) -> Error {
        Error::Composite {
            index,
            source: Box::new(self),
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Error::Io(e.to_string())
    }
}
