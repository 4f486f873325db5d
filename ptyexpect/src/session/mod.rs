//! The expect session: send input, wait for patterns in the output.
//!
//! A [`Session`] owns one transport. A background task reads from it into
//! an unbounded queue; the session merges queued reads into its buffer only
//! while the caller is inside [`Session::expect`], [`Session::expect_eof`]
//! or [`Session::buffer`], so the buffer has exactly one writer.

mod builder;
mod interactive;

pub use builder::{SessionBuilder, SessionConfig};
pub use interactive::{InteractiveBuilder, InteractiveStep};

use std::io;
use std::time::Duration;

use bytes::Bytes;
use log::{debug, trace, warn};
use regex::bytes::Regex;
use secrecy::{ExposeSecret, SecretString};
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::Instant;

use crate::channel::{Match, SessionBuffer, compile_pattern};
use crate::error::{Error, ExpectError, Result, TransportError};
use crate::observe::{EventBus, ExpectTarget, Observation, Observer, ObserverId, Stamped};
use crate::transport::{Pop, QueueReceiver, ReadEvent, Transport, delivery_queue, spawn_reader};

/// Deadline used when `now + timeout` does not fit in an `Instant`.
const FAR_FUTURE: Duration = Duration::from_secs(60 * 60 * 24 * 365 * 30);

/// An interactive session over a single transport.
///
/// # Example
///
/// ```rust,no_run
/// use std::time::Duration;
///
/// use ptyexpect::Session;
///
/// # async fn example(transport: tokio::io::DuplexStream) -> Result<(), ptyexpect::Error> {
/// let mut session = Session::new(transport);
/// session.set_timeout(Duration::from_secs(10));
///
/// session.expect(r"[Ll]ogin: ").await?;
/// session.send_line("admin").await?;
/// let m = session.expect(r"(\S+)\$ $").await?;
/// println!("prompt: {}", m.group_str(1).unwrap_or_default());
///
/// session.send_line("exit").await?;
/// let status = session.expect_eof().await;
/// assert!(status.is_eof());
/// session.close().await?;
/// # Ok(())
/// # }
/// ```
pub struct Session {
    /// Timeout and read settings.
    config: SessionConfig,

    /// Write side of the transport (None once closed).
    writer: Option<Box<dyn AsyncWrite + Send + Unpin>>,

    /// Reads delivered by the reader task.
    queue: QueueReceiver,

    /// The reader task.
    reader: JoinHandle<()>,

    /// Unconsumed output.
    buffer: SessionBuffer,

    /// Terminal condition reported by the reader; never cleared.
    status: Option<TransportError>,

    /// Observation fan-out.
    bus: EventBus,

    /// Whether close() has run.
    closed: bool,
}

impl Session {
    /// Take ownership of `transport` with default settings.
    ///
    /// # Panics
    ///
    /// Panics if called outside a tokio runtime.
    pub fn new<T: Transport>(transport: T) -> Self {
        Self::with_config(transport, SessionConfig::default())
    }

    /// Create a [`SessionBuilder`].
    pub fn builder() -> SessionBuilder {
        SessionBuilder::new()
    }

    /// Take ownership of `transport` and start its reader task.
    ///
    /// # Panics
    ///
    /// Panics if called outside a tokio runtime.
    pub fn with_config<T: Transport>(transport: T, config: SessionConfig) -> Self {
        let (read_half, write_half) = tokio::io::split(transport);
        let (sender, queue) = delivery_queue();
        let reader = spawn_reader(read_half, sender, config.read_size);
        debug!("session: started (timeout {:?})", config.timeout);

        Self {
            config,
            writer: Some(Box::new(write_half)),
            queue,
            reader,
            buffer: SessionBuffer::new(),
            status: None,
            bus: EventBus::new(),
            closed: false,
        }
    }

    /// Get the default expect timeout.
    pub fn timeout(&self) -> Duration {
        self.config.timeout
    }

    /// Set the default expect timeout.
    pub fn set_timeout(&mut self, timeout: Duration) {
        self.config.timeout = timeout;
    }

    /// Get the configuration.
    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// The terminal condition reported by the transport, if any.
    pub fn status(&self) -> Option<&TransportError> {
        self.status.as_ref()
    }

    /// Check if the session was closed.
    pub fn is_closed(&self) -> bool {
        self.closed
    }

    // --- Sending ---

    /// Write `data` to the program.
    pub async fn send(&mut self, data: impl AsRef<[u8]>) -> Result<()> {
        self.send_bytes(data.as_ref(), false).await
    }

    /// Write a secret; observers are told the send was masked.
    pub async fn send_masked(&mut self, secret: &SecretString) -> Result<()> {
        self.send_bytes(secret.expose_secret().as_bytes(), true).await
    }

    /// Write `line` followed by a line-feed.
    pub async fn send_line(&mut self, line: &str) -> Result<()> {
        self.send_line_bytes(line, false).await
    }

    /// Write each line followed by a line-feed, stopping at the first failure.
    pub async fn send_lines<I, S>(&mut self, lines: I) -> Result<()>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        for line in lines {
            self.send_line(line.as_ref()).await?;
        }
        Ok(())
    }

    async fn send_line_bytes(&mut self, line: &str, masked: bool) -> Result<()> {
        let mut data = Vec::with_capacity(line.len() + 1);
        data.extend_from_slice(line.as_bytes());
        data.push(b'\n');
        self.send_bytes(&data, masked).await
    }

    async fn send_bytes(&mut self, data: &[u8], masked: bool) -> Result<()> {
        if self.closed {
            return Err(TransportError::Closed.into());
        }
        let writer = self.writer.as_mut().ok_or(TransportError::Closed)?;

        if masked {
            debug!("session: sending {} masked bytes", data.len());
        } else {
            debug!("session: sending {:?}", String::from_utf8_lossy(data));
        }

        // Each accepted chunk is reported once, as soon as it is written.
        let mut rest = data;
        while !rest.is_empty() {
            let n = writer.write(rest).await.map_err(TransportError::write)?;
            if n == 0 {
                return Err(TransportError::write(io::ErrorKind::WriteZero.into()).into());
            }
            self.bus.emit(Observation::Send {
                data: Bytes::copy_from_slice(&rest[..n]),
                masked,
            });
            rest = &rest[n..];
        }
        writer.flush().await.map_err(TransportError::write)?;
        Ok(())
    }

    // --- Waiting ---

    /// Wait for `pattern` using the default timeout.
    ///
    /// # Panics
    ///
    /// Panics if `pattern` is not a valid regex; use [`compile_pattern`]
    /// and [`Session::expect_regex`] to handle that as an error.
    pub async fn expect(&mut self, pattern: &str) -> Result<Match> {
        let regex = compile_pattern(pattern)
            .unwrap_or_else(|err| panic!("invalid expect pattern {:?}: {}", pattern, err));
        self.expect_regex(&regex).await
    }

    /// Wait for a compiled pattern using the default timeout.
    pub async fn expect_regex(&mut self, pattern: &Regex) -> Result<Match> {
        let timeout = self.config.timeout;
        self.expect_regex_within(pattern, timeout).await
    }

    /// Wait for a compiled pattern for at most `timeout`.
    ///
    /// On success everything up to the end of the match is consumed from
    /// the buffer. At least one match attempt is made, even with a zero
    /// timeout. Once the transport reported end-of-stream or an error, that
    /// condition is returned immediately on every call.
    pub async fn expect_regex_within(&mut self, pattern: &Regex, timeout: Duration) -> Result<Match> {
        if self.closed {
            return Err(TransportError::Closed.into());
        }
        self.bus.emit(Observation::ExpectCall {
            target: ExpectTarget::Pattern(pattern.clone()),
            timeout,
        });

        let result = self.wait_for_match(pattern, timeout).await;

        self.bus.emit(Observation::ExpectReturn {
            result: result.clone(),
        });
        result
    }

    /// Wait for the program to close its output.
    ///
    /// The wait always ends with a condition: [`TransportError::Eof`] once
    /// the stream ended (check with [`Error::is_eof`]), otherwise the
    /// transport error or the timeout. Like every other wait, it returns
    /// the sticky status immediately once one is set. Any unmatched output
    /// is left in the buffer.
    pub async fn expect_eof(&mut self) -> Error {
        if self.closed {
            return TransportError::Closed.into();
        }
        let timeout = self.config.timeout;
        self.bus.emit(Observation::ExpectCall {
            target: ExpectTarget::EndOfStream,
            timeout,
        });

        let status = self.wait_for_eof(timeout).await;

        self.bus.emit(Observation::ExpectReturn {
            result: Err(status.clone()),
        });
        status
    }

    async fn wait_for_match(&mut self, pattern: &Regex, timeout: Duration) -> Result<Match> {
        if let Some(status) = &self.status {
            return Err(status.clone().into());
        }

        let deadline = deadline_after(timeout);
        loop {
            if let Some(found) = self.buffer.consume_match(pattern) {
                trace!("session: matched {:?}", String::from_utf8_lossy(found.matched()));
                return Ok(found);
            }
            if let Some(status) = &self.status {
                return Err(status.clone().into());
            }
            if Instant::now() >= deadline {
                return Err(ExpectError::Timeout(timeout).into());
            }
            if !self.wait_for_read(deadline).await {
                return Err(ExpectError::Timeout(timeout).into());
            }
        }
    }

    async fn wait_for_eof(&mut self, timeout: Duration) -> Error {
        let deadline = deadline_after(timeout);
        loop {
            if let Some(status) = &self.status {
                return status.clone().into();
            }
            if Instant::now() >= deadline || !self.wait_for_read(deadline).await {
                return ExpectError::Timeout(timeout).into();
            }
        }
    }

    /// Merge the next read, waiting until `deadline`. False on deadline.
    async fn wait_for_read(&mut self, deadline: Instant) -> bool {
        match self.queue.pop_until(deadline).await {
            Pop::Event(event) => self.merge(event),
            Pop::Closed => {
                // The reader went away without reporting; treat it as EOF.
                self.merge(ReadEvent::eof());
            }
            Pop::Deadline => return false,
        }
        true
    }

    /// Merge every read that has already arrived.
    fn drain(&mut self) {
        if self.status.is_some() {
            return;
        }
        while let Some(event) = self.queue.try_pop() {
            self.merge(event);
        }
    }

    fn merge(&mut self, event: ReadEvent) {
        let ReadEvent { chunk, status } = event;
        if !chunk.is_empty() {
            self.buffer.extend(&chunk);
            self.bus.emit(Observation::Receive { data: chunk });
        }

        if let Some(status) = status {
            match &status {
                TransportError::Eof => {
                    debug!("session: end of stream");
                    self.bus.emit(Observation::EndOfStream);
                }
                other => debug!("session: transport failed: {}", other),
            }
            self.status = Some(status);
        }
    }

    // --- Inspection ---

    /// The unconsumed output, after merging any reads that already arrived.
    pub fn buffer(&mut self) -> String {
        self.drain();
        self.buffer.as_str_lossy().into_owned()
    }

    /// Byte view of the unconsumed output, after the same drain as [`Session::buffer`].
    pub fn buffer_bytes(&mut self) -> &[u8] {
        self.drain();
        self.buffer.as_slice()
    }

    // --- Observers ---

    /// Register an observer sender.
    pub fn add_observer(&mut self, sender: mpsc::UnboundedSender<Observation>) -> ObserverId {
        self.bus.add_observer(sender)
    }

    /// Register an observer sender that also gets each emission instant.
    pub fn add_stamped_observer(&mut self, sender: mpsc::UnboundedSender<Stamped>) -> ObserverId {
        self.bus.add_stamped_observer(sender)
    }

    /// Register a new observer and return its receiving end.
    pub fn subscribe(&mut self) -> Observer {
        self.bus.subscribe()
    }

    /// Unregister an observer; its stream ends after the events already sent.
    pub fn remove_observer(&mut self, id: ObserverId) -> bool {
        self.bus.remove_observer(id)
    }

    // --- Lifecycle ---

    /// Close the transport, end all observer streams and stop reading.
    ///
    /// Calling close more than once is a no-op.
    pub async fn close(&mut self) -> Result<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        self.bus.close();
        self.reader.abort();
        debug!("session: closed");

        match self.writer.take() {
            Some(mut writer) => writer
                .shutdown()
                .await
                .map_err(|err| Error::from(TransportError::write(err))),
            None => Ok(()),
        }
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        if !self.closed {
            warn!("session dropped without close()");
            self.bus.close();
            self.reader.abort();
        }
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("config", &self.config)
            .field("buffered", &self.buffer.len())
            .field("status", &self.status)
            .field("observers", &self.bus.len())
            .field("closed", &self.closed)
            .finish()
    }
}

fn deadline_after(timeout: Duration) -> Instant {
    let now = Instant::now();
    now.checked_add(timeout).unwrap_or(now + FAR_FUTURE)
}

#[cfg(test)]
mod tests {
    use std::io;

    use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, DuplexStream};

    use super::*;

    fn session_pair(timeout: Duration) -> (Session, DuplexStream) {
        let (ours, theirs) = tokio::io::duplex(4096);
        let session = Session::builder().timeout(timeout).build(ours);
        (session, theirs)
    }

    /// A counterpart that echoes one line back and exits.
    fn spawn_echo_once(peer: DuplexStream) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut peer = BufReader::new(peer);
            let mut line = String::new();
            peer.read_line(&mut line).await.unwrap();
            peer.get_mut().write_all(line.as_bytes()).await.unwrap();
        })
    }

    #[tokio::test]
    async fn test_crlf_normalized_before_matching() {
        let transport = tokio_test::io::Builder::new()
            .read(b"hello\r\nworld\n")
            .build();
        let mut session = Session::new(transport);
        session.set_timeout(Duration::from_secs(1));

        let m = session.expect("world").await.unwrap();
        assert_eq!(m.before, "hello\n");
        assert_eq!(m.groups, vec!["world"]);
        session.close().await.unwrap();
    }

    #[tokio::test]
    async fn test_non_utf8_output_is_kept() {
        let transport = tokio_test::io::Builder::new().read(b"caf\xe9> ").build();
        let mut session = Session::new(transport);
        session.set_timeout(Duration::from_secs(1));

        let m = session.expect(">").await.unwrap();
        assert_eq!(m.before, &b"caf\xe9"[..]);
        assert_eq!(session.buffer_bytes(), b" ");
        session.close().await.unwrap();
    }

    #[tokio::test]
    async fn test_reader_never_waits_on_expect() {
        let (mut session, mut peer) = session_pair(Duration::from_secs(5));

        let line = [b'x'; 126];
        let mut expected = Vec::new();
        let program = tokio::spawn(async move {
            for _ in 0..1024 {
                peer.write_all(&line).await.unwrap();
                peer.write_all(b"\r\n").await.unwrap();
            }
            peer.write_all(b"DONE").await.unwrap();
            peer
        });
        for _ in 0..1024 {
            expected.extend_from_slice(&line);
            expected.push(b'\n');
        }

        // 128 KiB goes through a 4 KiB pipe before anyone calls expect.
        let _peer = tokio::time::timeout(Duration::from_secs(5), program)
            .await
            .expect("program blocked on the session")
            .unwrap();

        let m = session.expect("DONE").await.unwrap();
        assert_eq!(m.before.len(), 1024 * 127);
        assert_eq!(m.before, expected);
        assert!(session.buffer().is_empty());
    }

    #[tokio::test]
    async fn test_timeout_without_data() {
        let (mut session, _peer) = session_pair(Duration::from_millis(1));
        let mut observer = session.subscribe();

        let err = session.expect("x").await.unwrap_err();
        assert!(err.is_timeout());

        let seen = observer.drain();
        assert!(matches!(seen[0], Observation::ExpectCall { .. }));
        assert!(matches!(
            seen.last(),
            Some(Observation::ExpectReturn { result: Err(e) }) if e.is_timeout()
        ));
    }

    #[tokio::test]
    async fn test_echo_then_eof() {
        let (mut session, peer) = session_pair(Duration::from_secs(1));
        let echo = spawn_echo_once(peer);

        session.send("Hello\n").await.unwrap();
        let m = session.expect("[Hh]ello").await.unwrap();
        assert_eq!(m.before, "");
        assert_eq!(m.groups, vec!["Hello"]);

        echo.await.unwrap();
        assert!(session.expect_eof().await.is_eof());
        assert!(matches!(session.status(), Some(TransportError::Eof)));
        assert_eq!(session.buffer(), "\n");
    }

    #[tokio::test]
    async fn test_zero_timeout_still_attempts_match() {
        let (mut session, mut peer) = session_pair(Duration::ZERO);
        peer.write_all(b"ready> ").await.unwrap();

        // Wait until the reader delivered the prompt.
        let waited = tokio::time::timeout(Duration::from_secs(1), async {
            while session.buffer().is_empty() {
                tokio::task::yield_now().await;
            }
        })
        .await;
        assert!(waited.is_ok());

        let m = session.expect("ready> ").await.unwrap();
        assert_eq!(m.matched(), b"ready> ");
        assert!(session.expect("ready> ").await.unwrap_err().is_timeout());
    }

    #[tokio::test]
    async fn test_match_consumes_output() {
        let (mut session, mut peer) = session_pair(Duration::from_millis(200));
        peer.write_all(b"ab ab").await.unwrap();

        let first = session.expect("ab").await.unwrap();
        assert_eq!(first.before, "");
        let second = session.expect("ab").await.unwrap();
        assert_eq!(second.before, " ");
        assert!(session.expect("ab").await.unwrap_err().is_timeout());
    }

    #[tokio::test]
    async fn test_eof_is_sticky() {
        let (mut session, mut peer) = session_pair(Duration::from_secs(30));
        peer.write_all(b"bye\n").await.unwrap();
        drop(peer);

        let mut observer = session.subscribe();
        let status = session.expect_eof().await;
        assert!(status.is_eof());

        // Later waits return immediately instead of waiting out the timeout.
        for _ in 0..2 {
            let err = tokio::time::timeout(Duration::from_secs(1), session.expect("bye"))
                .await
                .expect("sticky status should not wait")
                .unwrap_err();
            assert!(err.is_eof());
        }
        assert!(session.expect_eof().await.is_eof());

        // The caller and the observers see the same outcome.
        let returns: Vec<bool> = observer
            .drain()
            .into_iter()
            .filter_map(|o| match o {
                Observation::ExpectReturn { result: Err(e) } => Some(e.is_eof()),
                Observation::ExpectReturn { result: Ok(_) } => Some(false),
                _ => None,
            })
            .collect();
        assert_eq!(returns, vec![true; 4]);
    }

    #[tokio::test]
    async fn test_expect_eof_times_out_while_open() {
        let (mut session, _peer) = session_pair(Duration::from_millis(5));
        assert!(session.expect_eof().await.is_timeout());
        assert!(session.status().is_none());
    }

    #[tokio::test]
    async fn test_read_error_is_sticky() {
        let transport = tokio_test::io::Builder::new()
            .read(b"partial")
            .read_error(io::Error::new(io::ErrorKind::ConnectionReset, "reset"))
            .build();
        let mut session = Session::builder()
            .timeout(Duration::from_secs(1))
            .build(transport);

        let err = session.expect("never").await.unwrap_err();
        assert!(matches!(err, Error::Transport(TransportError::Read(_))));

        let again = session.expect("partial").await.unwrap_err();
        assert_eq!(again.to_string(), err.to_string());
        let status = session.expect_eof().await;
        assert!(matches!(status, Error::Transport(TransportError::Read(_))));
        assert_eq!(session.buffer(), "partial");
    }

    #[tokio::test]
    async fn test_buffer_is_idempotent() {
        let (mut session, mut peer) = session_pair(Duration::from_secs(1));
        peer.write_all(b"line one\r\n").await.unwrap();
        session.expect("one").await.unwrap();

        let first = session.buffer();
        let second = session.buffer();
        assert_eq!(first, second);
        assert_eq!(session.buffer_bytes(), first.as_bytes());
    }

    #[tokio::test]
    async fn test_observations_in_order() {
        let (mut session, peer) = session_pair(Duration::from_secs(1));
        let mut observer = session.subscribe();
        let echo = spawn_echo_once(peer);

        session.send_line("ping").await.unwrap();
        session.expect("ping\n").await.unwrap();
        echo.await.unwrap();
        assert!(session.expect_eof().await.is_eof());
        session.close().await.unwrap();

        let mut kinds = Vec::new();
        let mut received = Vec::new();
        while let Some(observation) = observer.recv().await {
            match &observation {
                Observation::Send { .. } => kinds.push("send"),
                Observation::Receive { data } => {
                    received.extend_from_slice(data);
                    if kinds.last() != Some(&"recv") {
                        kinds.push("recv");
                    }
                }
                Observation::EndOfStream => kinds.push("eof"),
                Observation::ExpectCall { .. } => kinds.push("call"),
                Observation::ExpectReturn { .. } => kinds.push("return"),
            }
        }
        assert_eq!(
            kinds,
            vec!["send", "call", "recv", "return", "call", "eof", "return"]
        );
        assert_eq!(received, b"ping\n");
    }

    #[tokio::test]
    async fn test_masked_send_observation() {
        let (mut session, mut peer) = session_pair(Duration::from_secs(1));
        let mut observer = session.subscribe();

        session
            .send_masked(&SecretString::from("hunter2\n".to_owned()))
            .await
            .unwrap();

        let mut buf = [0u8; 16];
        let n = tokio::io::AsyncReadExt::read(&mut peer, &mut buf).await.unwrap();
        assert_eq!(&buf[..n], b"hunter2\n");

        match observer.try_recv() {
            Some(Observation::Send { masked, .. }) => assert!(masked),
            other => panic!("expected masked send, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_send_lines() {
        let (mut session, peer) = session_pair(Duration::from_secs(1));
        session.send_lines(["one", "two"]).await.unwrap();
        drop(session);

        let mut lines = BufReader::new(peer).lines();
        assert_eq!(lines.next_line().await.unwrap().as_deref(), Some("one"));
        assert_eq!(lines.next_line().await.unwrap().as_deref(), Some("two"));
    }

    #[tokio::test]
    async fn test_send_to_closed_program_fails() {
        let (mut session, peer) = session_pair(Duration::from_secs(1));
        drop(peer);
        let err = session.send("anyone there?\n").await.unwrap_err();
        assert!(matches!(err, Error::Transport(TransportError::Write(_))));
    }

    #[tokio::test]
    async fn test_close_is_idempotent() {
        let (mut session, _peer) = session_pair(Duration::from_secs(1));
        let mut observer = session.subscribe();

        session.close().await.unwrap();
        session.close().await.unwrap();
        assert!(session.is_closed());

        assert!(observer.recv().await.is_none());
        assert!(matches!(
            session.send("x").await,
            Err(Error::Transport(TransportError::Closed))
        ));
        assert!(matches!(
            session.expect("x").await,
            Err(Error::Transport(TransportError::Closed))
        ));
    }

    #[tokio::test]
    #[should_panic(expected = "invalid expect pattern")]
    async fn test_malformed_pattern_panics() {
        let (mut session, _peer) = session_pair(Duration::from_millis(1));
        let _ = session.expect("(unclosed").await;
    }
}
