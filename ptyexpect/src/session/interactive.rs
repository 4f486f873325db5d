//! Scripted dialogues: send a line, wait for a reply, repeat.
//!
//! Login prompts and installers ask a fixed series of questions:
//! - `login:` wants a user name
//! - `Password:` wants a secret that must not show up in logs
//! - `Continue? [y/N]` wants a confirmation
//!
//! [`Session::run_interactive`] handles these by sending each step's input
//! as a line and waiting for its pattern before moving on.

use std::time::Duration;

use regex::bytes::Regex;

use super::Session;
use crate::channel::{Match, compile_pattern};
use crate::error::Result;

/// One exchange in a dialogue.
///
/// - `input`: the line to send (a trailing line-feed is added)
/// - `pattern`: what to wait for after sending
/// - `hidden`: whether the input is masked for observers (passwords)
///
/// # Example
///
/// ```rust
/// use ptyexpect::InteractiveStep;
///
/// let steps = vec![
///     InteractiveStep::new("admin", r"[Pp]assword: "),
///     InteractiveStep::hidden("secret", r"\$ $"),
/// ];
/// ```
#[derive(Debug, Clone)]
pub struct InteractiveStep {
    /// The line to send.
    pub input: String,

    /// Pattern to wait for after sending input.
    pub pattern: Regex,

    /// Whether this input is masked for observers.
    pub hidden: bool,

    /// Optional timeout override for this step.
    pub timeout: Option<Duration>,
}

impl InteractiveStep {
    /// Create a new step.
    ///
    /// # Panics
    ///
    /// Panics if the pattern is not a valid regex. Use `try_new` for fallible creation.
    pub fn new(input: impl Into<String>, pattern: &str) -> Self {
        Self::try_new(input, pattern).expect("Invalid regex pattern")
    }

    /// Create a new step, returning an error if the pattern is invalid.
    pub fn try_new(input: impl Into<String>, pattern: &str) -> Result<Self> {
        Ok(Self {
            input: input.into(),
            pattern: compile_pattern(pattern)?,
            hidden: false,
            timeout: None,
        })
    }

    /// Create a step whose input is masked (like a password).
    ///
    /// # Panics
    ///
    /// Panics if the pattern is not a valid regex.
    pub fn hidden(input: impl Into<String>, pattern: &str) -> Self {
        Self::new(input, pattern).with_hidden(true)
    }

    /// Set a custom timeout for this step.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Mark this step's input as masked.
    pub fn with_hidden(mut self, hidden: bool) -> Self {
        self.hidden = hidden;
        self
    }
}

impl Session {
    /// Run a dialogue, returning one match per step.
    ///
    /// Stops at the first step whose send or wait fails.
    pub async fn run_interactive(&mut self, steps: &[InteractiveStep]) -> Result<Vec<Match>> {
        let mut matches = Vec::with_capacity(steps.len());
        for step in steps {
            self.send_line_bytes(&step.input, step.hidden).await?;
            let timeout = step.timeout.unwrap_or(self.config.timeout);
            matches.push(self.expect_regex_within(&step.pattern, timeout).await?);
        }
        Ok(matches)
    }
}

/// Builder for dialogues.
///
/// # Example
///
/// ```rust
/// use ptyexpect::InteractiveBuilder;
/// use std::time::Duration;
///
/// let steps = InteractiveBuilder::new()
///     .send("admin")
///     .expect(r"[Pp]assword: ")
///     .send_hidden("secret")
///     .expect(r"\$ $")
///     .with_timeout(Duration::from_secs(60))
///     .build();
/// ```
#[derive(Debug, Default)]
pub struct InteractiveBuilder {
    steps: Vec<InteractiveStep>,
    default_timeout: Option<Duration>,
}

impl InteractiveBuilder {
    /// Create a new builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a line to send.
    ///
    /// Must be followed by `expect()` to specify what to wait for.
    pub fn send(self, input: impl Into<String>) -> InteractiveBuilderWithInput {
        InteractiveBuilderWithInput {
            builder: self,
            input: input.into(),
            hidden: false,
            timeout: None,
        }
    }

    /// Add a masked line (like a password).
    pub fn send_hidden(self, input: impl Into<String>) -> InteractiveBuilderWithInput {
        InteractiveBuilderWithInput {
            builder: self,
            input: input.into(),
            hidden: true,
            timeout: None,
        }
    }

    /// Set the timeout for steps that do not set their own.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.default_timeout = Some(timeout);
        for step in self.steps.iter_mut().filter(|s| s.timeout.is_none()) {
            step.timeout = Some(timeout);
        }
        self
    }

    /// Build the list of steps.
    pub fn build(self) -> Vec<InteractiveStep> {
        self.steps
    }
}

/// Intermediate state for the builder after `send()` is called.
#[derive(Debug)]
pub struct InteractiveBuilderWithInput {
    builder: InteractiveBuilder,
    input: String,
    hidden: bool,
    timeout: Option<Duration>,
}

impl InteractiveBuilderWithInput {
    /// Specify the pattern to wait for after sending the input.
    ///
    /// # Panics
    ///
    /// Panics if the pattern is not a valid regex.
    pub fn expect(mut self, pattern: &str) -> InteractiveBuilder {
        let mut step = InteractiveStep::new(self.input, pattern).with_hidden(self.hidden);

        if let Some(timeout) = self.timeout.or(self.builder.default_timeout) {
            step = step.with_timeout(timeout);
        }

        self.builder.steps.push(step);
        self.builder
    }

    /// Set a custom timeout for this specific step.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}
