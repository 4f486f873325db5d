//! Background reader task.

use std::io;

use bytes::Bytes;
use log::{debug, trace};
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::task::JoinHandle;

use super::ReadEvent;
use super::queue::QueueSender;
use crate::error::TransportError;

/// Default maximum bytes per read.
pub const DEFAULT_READ_SIZE: usize = 4094;

/// Linux reports `EIO` on a PTY master once the slave side is closed.
const EIO: i32 = 5;

/// Spawn the reader task for `reader`.
///
/// Each read produces exactly one [`ReadEvent`]. The first terminal
/// condition (end-of-file or error) is pushed and then the task exits
/// without reading again.
///
/// # Panics
///
/// Panics if called outside a tokio runtime.
pub fn spawn_reader<R>(mut reader: R, queue: QueueSender, read_size: usize) -> JoinHandle<()>
where
    R: AsyncRead + Send + Unpin + 'static,
{
    let read_size = read_size.max(1);
    tokio::spawn(async move {
        debug!("reader: started (read size {})", read_size);
        let mut buf = vec![0u8; read_size];
        loop {
            let event = match reader.read(&mut buf).await {
                Ok(0) => ReadEvent::eof(),
                Ok(n) => {
                    trace!("reader: {} bytes", n);
                    ReadEvent::data(Bytes::copy_from_slice(&buf[..n]))
                }
                Err(err) => ReadEvent::failed(classify_error(err)),
            };

            let terminal = event.is_terminal();
            if !queue.push(event) {
                debug!("reader: session gone, stopping");
                return;
            }
            if terminal {
                debug!("reader: terminal condition reached, stopping");
                return;
            }
        }
    })
}

/// Fold platform-specific "descriptor closed" errors into end-of-stream.
fn classify_error(err: io::Error) -> TransportError {
    if err.raw_os_error() == Some(EIO) || err.kind() == io::ErrorKind::UnexpectedEof {
        TransportError::Eof
    } else {
        TransportError::read(err)
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use tokio::io::AsyncWriteExt;
    use tokio::time::Instant;

    use super::*;
    use crate::transport::{Pop, delivery_queue};

    #[tokio::test]
    async fn test_reader_stops_after_eof() {
        let (mut peer, ours) = tokio::io::duplex(64);
        let (tx, mut rx) = delivery_queue();
        let handle = spawn_reader(ours, tx, DEFAULT_READ_SIZE);

        peer.write_all(b"hello").await.unwrap();
        drop(peer);

        let deadline = Instant::now() + Duration::from_secs(1);
        let mut data = Vec::new();
        loop {
            match rx.pop_until(deadline).await {
                Pop::Event(event) => {
                    data.extend_from_slice(&event.chunk);
                    if event.is_terminal() {
                        assert!(matches!(event.status, Some(TransportError::Eof)));
                        break;
                    }
                }
                other => panic!("unexpected {:?}", other),
            }
        }
        assert_eq!(data, b"hello");

        handle.await.unwrap();
        assert!(matches!(rx.pop_until(deadline).await, Pop::Closed));
    }

    #[tokio::test]
    async fn test_read_size_bounds_chunks() {
        let (mut peer, ours) = tokio::io::duplex(64);
        let (tx, mut rx) = delivery_queue();
        spawn_reader(ours, tx, 4);

        peer.write_all(b"0123456789").await.unwrap();
        drop(peer);

        let deadline = Instant::now() + Duration::from_secs(1);
        while let Pop::Event(event) = rx.pop_until(deadline).await {
            assert!(event.chunk.len() <= 4);
            if event.is_terminal() {
                break;
            }
        }
    }

    #[test]
    fn test_eio_is_eof() {
        let err = io::Error::from_raw_os_error(EIO);
        assert!(matches!(classify_error(err), TransportError::Eof));

        let err = io::Error::new(io::ErrorKind::BrokenPipe, "pipe");
        assert!(matches!(classify_error(err), TransportError::Read(_)));
    }
}
