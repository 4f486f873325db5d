//! # ptyexpect
//!
//! Async expect-style automation for interactive programs.
//!
//! ptyexpect drives a program over any bidirectional byte stream (usually a
//! pseudo-terminal): it sends input, collects output in the background and
//! lets the caller wait, with a deadline, for a regular expression to show
//! up in that output.
//!
//! ## Features
//!
//! - Background reader that never blocks on the caller
//! - Newline canonicalization (`\r\n` becomes `\n`) before matching
//! - Match-and-consume semantics with capture groups
//! - Sticky end-of-stream and transport errors
//! - Observation bus for logging and tooling
//! - Record a live session and replay it as a mock transport
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::time::Duration;
//!
//! use ptyexpect::Session;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), ptyexpect::Error> {
//!     // Any AsyncRead + AsyncWrite works; a PTY master in real use.
//!     let (transport, _program) = tokio::io::duplex(4096);
//!
//!     let mut session = Session::builder()
//!         .timeout(Duration::from_secs(5))
//!         .build(transport);
//!
//!     session.expect(r"login: ").await?;
//!     session.send_line("admin").await?;
//!     let m = session.expect(r"Last login: (.*)\n").await?;
//!     println!("{}", m.group_str(1).unwrap_or_default());
//!
//!     session.close().await?;
//!     Ok(())
//! }
//! ```

pub mod channel;
pub mod error;
pub mod mock;
pub mod observe;
pub mod session;
pub mod transport;

// Re-export main types for convenience
pub use channel::{Match, compile_pattern};
pub use error::{Error, ExpectError, MockError, Result, TransportError};
pub use mock::{MockOp, MockPlayer, Recorder};
pub use observe::{Observation, Observer, ObserverId, Stamped};
pub use session::{InteractiveBuilder, InteractiveStep, Session, SessionBuilder, SessionConfig};
pub use transport::Transport;
