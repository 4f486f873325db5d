//! Builder pattern for session construction.

use std::time::Duration;

use super::Session;
use crate::transport::{DEFAULT_READ_SIZE, Transport};

/// Configuration for session behavior.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Default timeout for expect calls.
    pub timeout: Duration,

    /// Maximum bytes per transport read.
    pub read_size: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
            read_size: DEFAULT_READ_SIZE,
        }
    }
}

/// Builder for creating sessions.
///
/// # Example
///
/// ```rust,no_run
/// use std::time::Duration;
///
/// use ptyexpect::SessionBuilder;
///
/// # async fn example() -> Result<(), ptyexpect::Error> {
/// let (transport, _program) = tokio::io::duplex(4096);
/// let mut session = SessionBuilder::new()
///     .timeout(Duration::from_secs(5))
///     .build(transport);
///
/// session.expect(r"login: ").await?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Default)]
pub struct SessionBuilder {
    config: SessionConfig,
}

impl SessionBuilder {
    /// Create a builder with default settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the default expect timeout (default: 30 seconds).
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.config.timeout = timeout;
        self
    }

    /// Set the maximum bytes per read (default: 4094).
    pub fn read_size(mut self, read_size: usize) -> Self {
        self.config.read_size = read_size;
        self
    }

    /// Get the configuration built so far.
    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Take ownership of `transport` and start the session.
    ///
    /// # Panics
    ///
    /// Panics if called outside a tokio runtime.
    pub fn build<T: Transport>(self, transport: T) -> Session {
        Session::with_config(transport, self.config)
    }
}
