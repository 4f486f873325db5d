//! Record a live session and replay it as a transport.
//!
//! A [`Recorder`] listens on a session's observations and turns them into
//! an ordered list of [`MockOp`]s, inserting [`MockOp::Wait`] entries for
//! the real time that passed between events. A [`MockPlayer`] replays that
//! list as a [`Transport`](crate::transport::Transport), so the same
//! send/expect code can be run again without the original program.
//!
//! ```rust,no_run
//! use std::time::Duration;
//!
//! use ptyexpect::Session;
//! use ptyexpect::mock::{MockPlayer, Recorder};
//!
//! # async fn example(mut live: Session) -> Result<(), ptyexpect::Error> {
//! let recorder = Recorder::spawn();
//! recorder.attach(&mut live);
//! live.send_line("hello").await?;
//! live.expect("hello").await?;
//! live.close().await?;
//!
//! let player = MockPlayer::new(recorder.snapshot().await).timing_multiplier(0.1);
//! let mut replay = Session::new(player);
//! replay.set_timeout(Duration::from_secs(1));
//! replay.send_line("hello").await?;
//! replay.expect("hello").await?;
//! # Ok(())
//! # }
//! ```

mod player;
mod recorder;
pub mod script;

pub use player::MockPlayer;
pub use recorder::Recorder;

use std::time::Duration;

use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::observe::Observation;

/// One step of a recorded session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum MockOp {
    /// The session wrote these bytes.
    Send(Bytes),

    /// The program produced these bytes.
    Receive(Bytes),

    /// The program closed its output.
    EndOfStream,

    /// Time that passed before the next op.
    Wait(Duration),
}

impl MockOp {
    /// The op an observation is recorded as, if it is recorded at all.
    pub fn from_observation(observation: &Observation) -> Option<Self> {
        match observation {
            Observation::Send { data, .. } => Some(MockOp::Send(data.clone())),
            Observation::Receive { data } => Some(MockOp::Receive(data.clone())),
            Observation::EndOfStream => Some(MockOp::EndOfStream),
            Observation::ExpectCall { .. } | Observation::ExpectReturn { .. } => None,
        }
    }

    /// Whether this op is a pause.
    pub fn is_wait(&self) -> bool {
        matches!(self, MockOp::Wait(_))
    }
}
