//! Unbounded FIFO between the reader task and the session.
//!
//! The producer never waits: pattern matching may be slower than the
//! program's output, and stalling the reader on a full buffer could
//! deadlock a program that is itself blocked writing to us. Memory grows
//! instead. Events queued before the producer finishes are all delivered
//! before the consumer sees [`Pop::Closed`].

use log::trace;
use tokio::sync::mpsc;
use tokio::time::Instant;

use super::ReadEvent;

/// Create a connected producer/consumer pair.
pub fn delivery_queue() -> (QueueSender, QueueReceiver) {
    let (tx, rx) = mpsc::unbounded_channel();
    (QueueSender { tx }, QueueReceiver { rx })
}

/// Producer side, owned by the reader task.
#[derive(Debug, Clone)]
pub struct QueueSender {
    tx: mpsc::UnboundedSender<ReadEvent>,
}

impl QueueSender {
    /// Enqueue an event without waiting.
    ///
    /// Returns `false` once the consumer is gone.
    pub fn push(&self, event: ReadEvent) -> bool {
        self.tx.send(event).is_ok()
    }
}

/// Outcome of a deadline-bound pop.
#[derive(Debug)]
pub enum Pop {
    /// The oldest queued event.
    Event(ReadEvent),

    /// The producer finished and every event has been delivered.
    Closed,

    /// The deadline passed first.
    Deadline,
}

/// Consumer side, owned by the session.
#[derive(Debug)]
pub struct QueueReceiver {
    rx: mpsc::UnboundedReceiver<ReadEvent>,
}

impl QueueReceiver {
    /// Take the oldest event if one has already arrived.
    pub fn try_pop(&mut self) -> Option<ReadEvent> {
        self.rx.try_recv().ok()
    }

    /// Wait for the next event or the deadline, whichever comes first.
    pub async fn pop_until(&mut self, deadline: Instant) -> Pop {
        match tokio::time::timeout_at(deadline, self.rx.recv()).await {
            Ok(Some(event)) => {
                trace!("queue: popped {} bytes", event.chunk.len());
                Pop::Event(event)
            }
            Ok(None) => Pop::Closed,
            Err(_) => Pop::Deadline,
        }
    }
}
