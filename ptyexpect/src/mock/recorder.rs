//! Recording observations into a replayable op list.

use log::debug;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::Instant;

use super::MockOp;
use crate::Session;
use crate::observe::{Observation, ObserverId, Stamped};

/// Builds a [`MockOp`] list from a session's observations.
///
/// The op list is owned by a background task; observations and snapshot
/// requests both reach it as messages. Observations that were already
/// emitted when a snapshot is requested are always included in it.
///
/// Waits are measured between emission instants, so a recorder task that
/// falls behind still records the session's real pacing.
#[derive(Debug)]
pub struct Recorder {
    observations: mpsc::UnboundedSender<Stamped>,
    requests: mpsc::Sender<oneshot::Sender<Vec<MockOp>>>,
    handle: JoinHandle<()>,
}

impl Recorder {
    /// Start a recorder.
    ///
    /// # Panics
    ///
    /// Panics if called outside a tokio runtime.
    pub fn spawn() -> Self {
        let (observations, mut incoming) = mpsc::unbounded_channel::<Stamped>();
        let (requests, mut pending) = mpsc::channel::<oneshot::Sender<Vec<MockOp>>>(8);

        let handle = tokio::spawn(async move {
            let mut ops = Vec::new();
            let mut last_op = None;
            loop {
                tokio::select! {
                    biased;
                    Some(stamped) = incoming.recv() => {
                        record(&mut ops, &mut last_op, &stamped.observation, stamped.at);
                    }
                    request = pending.recv() => match request {
                        Some(reply) => {
                            let _ = reply.send(ops.clone());
                        }
                        None => break,
                    },
                }
            }
            debug!("recorder: stopped with {} ops", ops.len());
        });

        Self {
            observations,
            requests,
            handle,
        }
    }

    /// Start recording `session`.
    pub fn attach(&self, session: &mut Session) -> ObserverId {
        session.add_stamped_observer(self.observer())
    }

    /// A sender to register with
    /// [`Session::add_stamped_observer`](crate::Session::add_stamped_observer).
    pub fn observer(&self) -> mpsc::UnboundedSender<Stamped> {
        self.observations.clone()
    }

    /// The ops recorded so far.
    pub async fn snapshot(&self) -> Vec<MockOp> {
        let (reply, response) = oneshot::channel();
        if self.requests.send(reply).await.is_err() {
            return Vec::new();
        }
        response.await.unwrap_or_default()
    }
}

impl Drop for Recorder {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

/// Append the op for `observation`, preceded by the time since the last op.
pub(crate) fn record(
    ops: &mut Vec<MockOp>,
    last_op: &mut Option<Instant>,
    observation: &Observation,
    now: Instant,
) {
    let Some(op) = MockOp::from_observation(observation) else {
        return;
    };

    if let Some(previous) = last_op.replace(now) {
        ops.push(MockOp::Wait(now.saturating_duration_since(previous)));
    }
    ops.push(op);
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use bytes::Bytes;

    use super::*;
    use crate::observe::ExpectTarget;

    #[test]
    fn test_waits_between_ops() {
        let start = Instant::now();
        let mut ops = Vec::new();
        let mut last = None;

        let send = Observation::Send {
            data: Bytes::from_static(b"Hello\n"),
            masked: false,
        };
        let call = Observation::ExpectCall {
            target: ExpectTarget::EndOfStream,
            timeout: Duration::from_secs(1),
        };
        let recv = Observation::Receive {
            data: Bytes::from_static(b"Hello\n"),
        };

        record(&mut ops, &mut last, &send, start);
        record(&mut ops, &mut last, &call, start + Duration::from_millis(10));
        record(&mut ops, &mut last, &recv, start + Duration::from_millis(250));
        record(
            &mut ops,
            &mut last,
            &Observation::EndOfStream,
            start + Duration::from_millis(300),
        );

        assert_eq!(
            ops,
            vec![
                MockOp::Send(Bytes::from_static(b"Hello\n")),
                MockOp::Wait(Duration::from_millis(250)),
                MockOp::Receive(Bytes::from_static(b"Hello\n")),
                MockOp::Wait(Duration::from_millis(50)),
                MockOp::EndOfStream,
            ]
        );
    }

    fn stamped(at: Instant, observation: Observation) -> Stamped {
        Stamped { at, observation }
    }

    #[tokio::test]
    async fn test_snapshot_includes_emitted_observations() {
        let recorder = Recorder::spawn();
        let tx = recorder.observer();
        assert!(recorder.snapshot().await.is_empty());

        let now = Instant::now();
        let login = Observation::Receive {
            data: Bytes::from_static(b"login: "),
        };
        tx.send(stamped(now, login)).unwrap();
        tx.send(stamped(now, Observation::EndOfStream)).unwrap();

        let ops = recorder.snapshot().await;
        assert_eq!(ops.len(), 3);
        assert_eq!(ops[0], MockOp::Receive(Bytes::from_static(b"login: ")));
        assert!(ops[1].is_wait());
        assert_eq!(ops[2], MockOp::EndOfStream);
    }

    #[tokio::test]
    async fn test_snapshot_after_observers_dropped() {
        let recorder = Recorder::spawn();
        let tx = recorder.observer();
        tx.send(stamped(Instant::now(), Observation::EndOfStream)).unwrap();
        drop(tx);

        assert_eq!(recorder.snapshot().await, vec![MockOp::EndOfStream]);
        assert_eq!(recorder.snapshot().await, vec![MockOp::EndOfStream]);
    }

    #[tokio::test]
    async fn test_waits_follow_emission_not_processing() {
        let recorder = Recorder::spawn();
        let tx = recorder.observer();

        // Both arrive at once, but were emitted 250ms apart.
        let start = Instant::now();
        let send = Observation::Send {
            data: Bytes::from_static(b"ls\n"),
            masked: false,
        };
        tx.send(stamped(start, send)).unwrap();
        tx.send(stamped(
            start + Duration::from_millis(250),
            Observation::EndOfStream,
        ))
        .unwrap();

        assert_eq!(
            recorder.snapshot().await,
            vec![
                MockOp::Send(Bytes::from_static(b"ls\n")),
                MockOp::Wait(Duration::from_millis(250)),
                MockOp::EndOfStream,
            ]
        );
    }

    #[tokio::test]
    async fn test_attach_records_session_pacing() {
        let (ours, _theirs) = tokio::io::duplex(64);
        let mut session = Session::new(ours);
        let recorder = Recorder::spawn();
        recorder.attach(&mut session);

        session.send("a").await.unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;
        session.send("b").await.unwrap();
        session.close().await.unwrap();

        let ops = recorder.snapshot().await;
        assert_eq!(ops.len(), 3);
        assert!(matches!(ops[1], MockOp::Wait(d) if d >= Duration::from_millis(50)));
    }
}
