//! Transport plumbing between the session and the program it drives.
//!
//! A transport is any bidirectional async byte stream: a PTY master, a
//! socket, an in-memory duplex pipe, or the [`MockPlayer`](crate::mock::MockPlayer).
//! The read side is owned by a background reader task that feeds an
//! unbounded delivery queue; the session drains that queue on its own
//! schedule.

mod queue;
mod reader;

pub use queue::{Pop, QueueReceiver, QueueSender, delivery_queue};
pub use reader::{DEFAULT_READ_SIZE, spawn_reader};

use bytes::Bytes;
use tokio::io::{AsyncRead, AsyncWrite};

use crate::error::TransportError;

/// A bidirectional byte channel a session can drive.
///
/// Closing the write side and dropping the value must eventually make
/// reads return end-of-file.
pub trait Transport: AsyncRead + AsyncWrite + Send + Unpin + 'static {}

impl<T> Transport for T where T: AsyncRead + AsyncWrite + Send + Unpin + 'static {}

/// One read attempt's outcome, as produced by the reader task.
#[derive(Debug, Clone)]
pub struct ReadEvent {
    /// Bytes returned by the read (may be empty).
    pub chunk: Bytes,

    /// Terminal condition reported by the read, if any.
    pub status: Option<TransportError>,
}

impl ReadEvent {
    /// A successful read carrying data.
    pub fn data(chunk: impl Into<Bytes>) -> Self {
        Self {
            chunk: chunk.into(),
            status: None,
        }
    }

    /// The canonical end-of-stream event.
    pub fn eof() -> Self {
        Self {
            chunk: Bytes::new(),
            status: Some(TransportError::Eof),
        }
    }

    /// A failed read.
    pub fn failed(status: TransportError) -> Self {
        Self {
            chunk: Bytes::new(),
            status: Some(status),
        }
    }

    /// Whether this is the last event the reader will produce.
    pub fn is_terminal(&self) -> bool {
        self.status.is_some()
    }
}
