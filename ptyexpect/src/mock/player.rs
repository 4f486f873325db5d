//! Replaying a recorded op list as a transport.

use std::collections::VecDeque;
use std::future::Future;
use std::io;
use std::pin::Pin;
use std::task::{Context, Poll, Waker};
use std::time::Duration;

use log::{debug, trace};
use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};
use tokio::time::Sleep;

use super::MockOp;
use crate::error::MockError;

/// A transport that plays back a recorded session.
///
/// The script is consumed front to back by both sides:
///
/// - Reads honour each [`MockOp::Wait`] (scaled by the timing multiplier)
///   and then return the next [`MockOp::Receive`]. A read that reaches
///   [`MockOp::EndOfStream`] or the end of the script returns end-of-file.
///   While the next op is a send, reads wait for the write that consumes it.
/// - Writes consume the next [`MockOp::Send`], skipping the pauses in front
///   of it since the caller paces its own input. While the next op is
///   output the program has yet to produce, writes wait for it to be read.
///
/// With write checking on, written bytes must equal the recording and a
/// recorded send may be matched by several smaller writes. With it off,
/// each write consumes one whole recorded send.
#[derive(Debug)]
pub struct MockPlayer {
    ops: VecDeque<MockOp>,
    check_writes: bool,
    timing_multiplier: f64,
    sleep: Option<Pin<Box<Sleep>>>,
    read_waker: Option<Waker>,
    write_waker: Option<Waker>,
}

/// The first op that is not a pause.
enum Next {
    Send,
    Receive,
    End,
}

impl MockPlayer {
    /// Create a player for `ops` with write checking on and real-time pacing.
    pub fn new(ops: impl IntoIterator<Item = MockOp>) -> Self {
        Self {
            ops: ops.into_iter().collect(),
            check_writes: true,
            timing_multiplier: 1.0,
            sleep: None,
            read_waker: None,
            write_waker: None,
        }
    }

    /// Require written bytes to match the recording (default: on).
    pub fn check_writes(mut self, check: bool) -> Self {
        self.check_writes = check;
        self
    }

    /// Scale every recorded pause; `0.0` replays as fast as possible.
    pub fn timing_multiplier(mut self, multiplier: f64) -> Self {
        self.timing_multiplier = if multiplier.is_finite() && multiplier > 0.0 {
            multiplier
        } else {
            0.0
        };
        self
    }

    /// Ops not yet replayed.
    pub fn remaining(&self) -> usize {
        self.ops.len()
    }

    fn next_action(&self) -> Next {
        match self.ops.iter().find(|op| !op.is_wait()) {
            Some(MockOp::Send(_)) => Next::Send,
            Some(MockOp::Receive(_)) => Next::Receive,
            Some(MockOp::EndOfStream) | Some(MockOp::Wait(_)) | None => Next::End,
        }
    }

    fn wake_reader(&mut self) {
        if let Some(waker) = self.read_waker.take() {
            waker.wake();
        }
    }

    fn wake_writer(&mut self) {
        if let Some(waker) = self.write_waker.take() {
            waker.wake();
        }
    }

    fn scaled(&self, wait: Duration) -> Duration {
        wait.mul_f64(self.timing_multiplier)
    }
}

impl AsyncRead for MockPlayer {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        let this = self.get_mut();
        loop {
            if let Some(sleep) = this.sleep.as_mut() {
                if sleep.as_mut().poll(cx).is_pending() {
                    return Poll::Pending;
                }
                this.sleep = None;
            }

            match this.ops.front() {
                None | Some(MockOp::EndOfStream) => {
                    trace!("player: end of stream");
                    this.wake_writer();
                    return Poll::Ready(Ok(()));
                }
                Some(MockOp::Wait(wait)) => {
                    if matches!(this.next_action(), Next::Send) {
                        this.read_waker = Some(cx.waker().clone());
                        return Poll::Pending;
                    }
                    let pause = this.scaled(*wait);
                    this.ops.pop_front();
                    if !pause.is_zero() {
                        this.sleep = Some(Box::pin(tokio::time::sleep(pause)));
                    }
                }
                Some(MockOp::Receive(data)) => {
                    let n = data.len().min(buf.remaining());
                    if n == 0 && !data.is_empty() {
                        return Poll::Ready(Ok(()));
                    }
                    buf.put_slice(&data[..n]);
                    let rest = data.slice(n..);
                    if rest.is_empty() {
                        this.ops.pop_front();
                    } else if let Some(front) = this.ops.front_mut() {
                        *front = MockOp::Receive(rest);
                    }
                    this.wake_writer();
                    if n > 0 {
                        trace!("player: replayed {} bytes", n);
                        return Poll::Ready(Ok(()));
                    }
                }
                Some(MockOp::Send(_)) => {
                    this.read_waker = Some(cx.waker().clone());
                    return Poll::Pending;
                }
            }
        }
    }
}

impl AsyncWrite for MockPlayer {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        let this = self.get_mut();
        if buf.is_empty() {
            return Poll::Ready(Ok(0));
        }

        match this.next_action() {
            Next::Receive => {
                this.write_waker = Some(cx.waker().clone());
                return Poll::Pending;
            }
            Next::End => {
                if this.check_writes {
                    debug!("player: write after the recording ended");
                    return Poll::Ready(Err(MockError::UnexpectedWrite {
                        actual: String::from_utf8_lossy(buf).into_owned(),
                    }
                    .into()));
                }
                return Poll::Ready(Ok(buf.len()));
            }
            Next::Send => {
                while this.ops.front().is_some_and(MockOp::is_wait) {
                    this.ops.pop_front();
                }
            }
        }

        if !this.check_writes {
            this.ops.pop_front();
            this.wake_reader();
            return Poll::Ready(Ok(buf.len()));
        }

        let Some(MockOp::Send(expected)) = this.ops.front() else {
            return Poll::Ready(Ok(buf.len()));
        };

        let n = expected.len().min(buf.len());
        if buf[..n] != expected[..n] {
            debug!("player: write mismatch");
            return Poll::Ready(Err(MockError::WriteMismatch {
                expected: String::from_utf8_lossy(expected).into_owned(),
                actual: String::from_utf8_lossy(buf).into_owned(),
            }
            .into()));
        }

        let rest = expected.slice(n..);
        if rest.is_empty() {
            this.ops.pop_front();
        } else if let Some(front) = this.ops.front_mut() {
            *front = MockOp::Send(rest);
        }
        trace!("player: accepted {} bytes", n);
        this.wake_reader();
        Poll::Ready(Ok(n))
    }

    fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(Ok(()))
    }

    fn poll_shutdown(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(Ok(()))
    }
}
