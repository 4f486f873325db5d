//! Observer that writes session events through the `log` facade.

use log::{Level, log};
use tokio::task::JoinHandle;

use super::{Observation, Observer};

const TARGET: &str = "ptyexpect::observe";

/// Logs every observation of a session.
///
/// Sends and expect calls are logged at `debug`, received data at `trace`,
/// failed expects at `info`. Masked sends never show their content.
///
/// ```rust,no_run
/// use ptyexpect::{Session, observe::LogObserver};
///
/// # async fn example(mut session: Session) {
/// let logger = LogObserver::spawn(session.subscribe());
/// // ... drive the session ...
/// session.close().await.ok();
/// logger.finished().await;
/// # }
/// ```
#[derive(Debug)]
pub struct LogObserver {
    handle: JoinHandle<usize>,
}

impl LogObserver {
    /// Start logging observations from `observer`.
    ///
    /// # Panics
    ///
    /// Panics if called outside a tokio runtime.
    pub fn spawn(mut observer: Observer) -> Self {
        let handle = tokio::spawn(async move {
            let mut count = 0;
            while let Some(observation) = observer.recv().await {
                log!(target: TARGET, level_for(&observation), "{}", observation);
                count += 1;
            }
            log!(target: TARGET, Level::Debug, "observation stream closed after {} events", count);
            count
        });
        Self { handle }
    }

    /// Wait for the stream to end; returns how many observations were logged.
    pub async fn finished(self) -> usize {
        self.handle.await.unwrap_or_default()
    }
}

fn level_for(observation: &Observation) -> Level {
    match observation {
        Observation::Receive { .. } => Level::Trace,
        Observation::ExpectReturn { result: Err(_) } => Level::Info,
        _ => Level::Debug,
    }
}
