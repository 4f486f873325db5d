//! Session observations and the bus that fans them out.
//!
//! Every send, receive, end-of-stream and expect call/return on a
//! [`Session`](crate::Session) is published as an [`Observation`], in the
//! order the operations happen. Observers are independent unbounded queues:
//! a slow observer only grows its own backlog and never delays the session.

mod bus;
mod logger;

pub use bus::{EventBus, Observer, ObserverId, Stamped};
pub use logger::LogObserver;

use std::fmt;
use std::time::Duration;

use bytes::Bytes;
use regex::bytes::Regex;

use crate::channel::Match;
use crate::error::Error;

/// What an expect call is waiting for.
#[derive(Debug, Clone)]
pub enum ExpectTarget {
    /// A regular expression in the output.
    Pattern(Regex),

    /// The end of the stream itself.
    EndOfStream,
}

impl fmt::Display for ExpectTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExpectTarget::Pattern(re) => write!(f, "{:?}", re.as_str()),
            ExpectTarget::EndOfStream => write!(f, "<EOF>"),
        }
    }
}

/// A single session event.
#[derive(Clone)]
pub enum Observation {
    /// Bytes written to the transport.
    ///
    /// Masked payloads are still delivered so recordings stay replayable,
    /// but every rendering of them is elided.
    Send { data: Bytes, masked: bool },

    /// Bytes pulled from the transport into the session buffer.
    Receive { data: Bytes },

    /// The transport reached end-of-stream.
    EndOfStream,

    /// An expect call started.
    ExpectCall {
        target: ExpectTarget,
        timeout: Duration,
    },

    /// An expect call finished.
    ExpectReturn { result: Result<Match, Error> },
}

const MASKED: &str = "***MASKED***";

impl fmt::Display for Observation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Observation::Send { masked: true, .. } => write!(f, "Send{{{}}}", MASKED),
            Observation::Send { data, .. } => {
                write!(f, "Send{{{:?}}}", String::from_utf8_lossy(data))
            }
            Observation::Receive { data } => {
                write!(f, "Receive{{{:?}}}", String::from_utf8_lossy(data))
            }
            Observation::EndOfStream => write!(f, "EndOfStream{{}}"),
            Observation::ExpectCall { target, timeout } => {
                write!(f, "ExpectCall{{{}, {:?}}}", target, timeout)
            }
            Observation::ExpectReturn { result: Ok(m) } => {
                let groups: Vec<_> = m.groups.iter().map(|g| String::from_utf8_lossy(g)).collect();
                write!(f, "ExpectReturn{{{:?}, {:?}}}", m.before_str(), groups)
            }
            Observation::ExpectReturn { result: Err(err) } => {
                write!(f, "ExpectReturn{{error: {}}}", err)
            }
        }
    }
}

impl fmt::Debug for Observation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Observation::Send { masked: true, .. } => f
                .debug_struct("Send")
                .field("data", &MASKED)
                .field("masked", &true)
                .finish(),
            Observation::Send { data, masked } => f
                .debug_struct("Send")
                .field("data", data)
                .field("masked", masked)
                .finish(),
            Observation::Receive { data } => f.debug_struct("Receive").field("data", data).finish(),
            Observation::EndOfStream => f.write_str("EndOfStream"),
            Observation::ExpectCall { target, timeout } => f
                .debug_struct("ExpectCall")
                .field("target", target)
                .field("timeout", timeout)
                .finish(),
            Observation::ExpectReturn { result } => f
                .debug_struct("ExpectReturn")
                .field("result", result)
                .finish(),
        }
    }
}
