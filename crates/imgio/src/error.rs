//! Error types for stream, adapter and loader operations.
//!
//! Every failure surfaces as an [`IoError`]. [`IoError::class`] folds the
//! variants into the coarse [`ErrorClass`] taxonomy callers usually branch on.

use std::io;
use thiserror::Error;

/// I/O operation error.
#[derive(Debug, Error)]
pub enum IoError {
    /// Invalid loader or saver configuration. Raised before any I/O.
    #[error("invalid configuration: {0}")]
    Config(String),

    /// The origin could not produce a stream.
    #[error("cannot open {origin}: {reason}")]
    Origin {
        /// Human-readable origin (path, "memory", stream nickname).
        origin: String,
        /// Why acquisition failed.
        reason: String,
    },

    /// Read, seek or write failure, including truncated input.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// No registered codec claims the input.
    #[error("unsupported format: {0}")]
    UnsupportedFormat(String),

    /// Bitstream rejected as invalid for its format.
    #[error("format error: {0}")]
    Format(String),

    /// Decoder failure that is not a bitstream violation.
    #[error("decode error: {0}")]
    DecodeError(String),

    /// Decoder warning escalated because fail-fast is enabled.
    #[error("warning treated as error: {0}")]
    Warning(String),

    /// Encoding error.
    #[error("encode error: {0}")]
    EncodeError(String),

    /// Operation the handle or codec does not provide.
    #[error("unsupported operation: {0}")]
    UnsupportedOperation(String),

    /// Use of an adapter after it was closed.
    #[error("handle is closed")]
    Closed,

    /// Loader driven out of order or after failure.
    #[error("invalid loader state: {0}")]
    InvalidState(String),
}

/// Coarse error taxonomy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// Bad options; nothing was opened.
    Config,
    /// Stream acquisition failed.
    Origin,
    /// Read/seek/write failure.
    Io,
    /// Bitstream rejected or not recognised.
    Format,
    /// Warning escalated by fail-fast.
    Warning,
    /// Encoder failure.
    Encode,
    /// API misuse: unsupported callback, closed handle, wrong state.
    Usage,
}

impl IoError {
    /// Returns the taxonomy class of this error.
    pub fn class(&self) -> ErrorClass {
        match self {
            IoError::Config(_) => ErrorClass::Config,
            IoError::Origin { .. } => ErrorClass::Origin,
            IoError::Io(_) => ErrorClass::Io,
            IoError::UnsupportedFormat(_) | IoError::Format(_) | IoError::DecodeError(_) => {
                ErrorClass::Format
            }
            IoError::Warning(_) => ErrorClass::Warning,
            IoError::EncodeError(_) => ErrorClass::Encode,
            IoError::UnsupportedOperation(_) | IoError::Closed | IoError::InvalidState(_) => {
                ErrorClass::Usage
            }
        }
    }

    pub(crate) fn origin(origin: impl Into<String>, reason: impl ToString) -> Self {
        IoError::Origin {
            origin: origin.into(),
            reason: reason.to_string(),
        }
    }

    /// Wraps this error for transport through `std::io` traits.
    pub(crate) fn into_io(self) -> io::Error {
        match self {
            IoError::Io(err) => err,
            other => io::Error::other(other),
        }
    }

    /// Recovers an error that travelled through `std::io`, unwrapping
    /// anything produced by [`IoError::into_io`].
    pub(crate) fn from_io(err: io::Error) -> Self {
        let ours = err.get_ref().is_some_and(|inner| inner.is::<IoError>());
        if !ours {
            return IoError::Io(err);
        }
        let kind = err.kind();
        match err.into_inner().map(|inner| inner.downcast::<IoError>()) {
            Some(Ok(inner)) => *inner,
            Some(Err(inner)) => IoError::Io(io::Error::new(kind, inner)),
            None => IoError::Io(io::Error::from(kind)),
        }
    }
}

/// Result type for I/O operations.
pub type IoResult<T> = Result<T, IoError>;
