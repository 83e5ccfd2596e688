use std::io;

use thiserror::Error;

pub type Result<T, E = Error> = core::result::Result<T, E>;

/// Everything that can go wrong while reading an ext2 image.
///
/// `NotFound`, `InvalidOperation`, `InvalidArgument` and `OutOfBounds` are
/// caused by the caller's input. `CorruptImage` and `Io` mean the image or the
/// storage underneath it cannot be trusted for the call that failed.
#[derive(Debug, Error)]
pub enum Error {
    #[error("no such file or directory: {path}")]
    NotFound { path: String },

    #[error("invalid operation: {0}")]
    InvalidOperation(&'static str),

    #[error("invalid argument: {0}")]
    InvalidArgument(&'static str),

    #[error("read of {length} bytes at offset {offset} is beyond file size {size}")]
    OutOfBounds { offset: u64, length: u64, size: u64 },

    #[error("corrupt image: {0}")]
    CorruptImage(String),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

impl Error {
    pub(crate) fn not_found(path: &str) -> Self {
        Self::NotFound {
            path: path.to_string(),
        }
    }

    /// Builds a `CorruptImage` error, logging it on the way out.
    pub(crate) fn corrupt(detail: impl Into<String>) -> Self {
        let detail = detail.into();
        log::warn!("corrupt ext2 image: {detail}");
        Self::CorruptImage(detail)
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    pub fn is_corrupt(&self) -> bool {
        matches!(self, Self::CorruptImage(_))
    }
}

impl From<Error> for io::Error {
    fn from(err: Error) -> Self {
        let kind = match &err {
            Error::Io(inner) => inner.kind(),
            Error::NotFound { .. } => io::ErrorKind::NotFound,
            Error::InvalidArgument(_) | Error::OutOfBounds { .. } => io::ErrorKind::InvalidInput,
            Error::CorruptImage(_) => io::ErrorKind::InvalidData,
            Error::InvalidOperation(_) => io::ErrorKind::Other,
        };
        Self::new(kind, err)
    }
}
