//! Error types for ptyexpect.

use std::io;
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;

/// Main error type for ptyexpect operations.
///
/// Every variant is cheap to clone so that a latched stream condition can be
/// handed back verbatim on every later wait and carried inside observations.
#[derive(Error, Debug, Clone)]
pub enum Error {
    /// Transport-level conditions (end of stream, I/O failures)
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    /// Pattern wait errors
    #[error("Expect error: {0}")]
    Expect(#[from] ExpectError),
}

impl Error {
    /// True if a wait gave up because its deadline passed.
    pub fn is_timeout(&self) -> bool {
        matches!(self, Error::Expect(ExpectError::Timeout(_)))
    }

    /// True if the stream reached its canonical end.
    pub fn is_eof(&self) -> bool {
        matches!(self, Error::Transport(TransportError::Eof))
    }

    /// The mock replay error wrapped in a write failure, if any.
    pub fn as_mock_error(&self) -> Option<&MockError> {
        match self {
            Error::Transport(TransportError::Write(err)) | Error::Transport(TransportError::Read(err)) => {
                err.get_ref().and_then(|inner| inner.downcast_ref::<MockError>())
            }
            _ => None,
        }
    }
}

/// Transport layer errors.
#[derive(Error, Debug, Clone)]
pub enum TransportError {
    /// The stream reached end-of-file
    #[error("End of stream")]
    Eof,

    /// Reading from the transport failed
    #[error("Read failed: {0}")]
    Read(Arc<io::Error>),

    /// Writing to the transport failed
    #[error("Write failed: {0}")]
    Write(Arc<io::Error>),

    /// The session was already closed
    #[error("Session closed")]
    Closed,
}

impl TransportError {
    pub(crate) fn read(err: io::Error) -> Self {
        TransportError::Read(Arc::new(err))
    }

    pub(crate) fn write(err: io::Error) -> Self {
        TransportError::Write(Arc::new(err))
    }
}

/// Errors from waiting on a pattern.
#[derive(Error, Debug, Clone)]
pub enum ExpectError {
    /// Pattern matching timed out
    #[error("Pattern not found within {0:?}")]
    Timeout(Duration),

    /// Invalid regex pattern
    #[error("Invalid regex pattern: {0}")]
    InvalidPattern(#[from] regex::Error),
}

/// Errors raised by the replay transport.
///
/// These travel through the transport's `io::Error` and surface as
/// [`TransportError::Write`]; use [`Error::as_mock_error`] to recover them.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MockError {
    /// Written bytes differ from the recorded send
    #[error("Write mismatch: expected {expected:?}, got {actual:?}")]
    WriteMismatch { expected: String, actual: String },

    /// A write arrived after the recording ran out of sends
    #[error("Unexpected write: {actual:?}")]
    UnexpectedWrite { actual: String },
}

impl From<MockError> for io::Error {
    fn from(err: MockError) -> Self {
        io::Error::other(err)
    }
}

/// Result type alias using ptyexpect's Error.
pub type Result<T> = std::result::Result<T, Error>;
