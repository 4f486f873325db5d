//! Pattern matching over accumulated output.

use std::borrow::Cow;

use bytes::Bytes;
use regex::bytes::Regex;

use crate::error::{ExpectError, Result};

/// Result of a successful pattern wait.
///
/// Output is kept byte for byte; the `*_str` accessors decode it lossily.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Match {
    /// Output that preceded the match (newline-normalized).
    pub before: Bytes,

    /// Captured groups; index 0 is the whole match.
    ///
    /// A group that did not participate in the match is empty.
    pub groups: Vec<Bytes>,
}

impl Match {
    /// The whole matched output.
    pub fn matched(&self) -> &[u8] {
        self.group(0).unwrap_or_default()
    }

    /// A capture group by index, if the pattern has that many groups.
    pub fn group(&self, index: usize) -> Option<&[u8]> {
        self.groups.get(index).map(|g| &g[..])
    }

    /// `before` as text, with invalid UTF-8 replaced.
    pub fn before_str(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.before)
    }

    /// A capture group as text, with invalid UTF-8 replaced.
    pub fn group_str(&self, index: usize) -> Option<Cow<'_, str>> {
        self.group(index).map(String::from_utf8_lossy)
    }
}

/// Search `data` for the left-most match of `pattern`.
///
/// Returns the match along with the byte offset where it ends, which is
/// how much of `data` the caller should consume.
pub fn find_match(pattern: &Regex, data: &[u8]) -> Option<(Match, usize)> {
    let captures = pattern.captures(data)?;
    let whole = captures.get(0)?;

    let groups = captures
        .iter()
        .map(|group| {
            group
                .map(|g| Bytes::copy_from_slice(g.as_bytes()))
                .unwrap_or_default()
        })
        .collect();

    let found = Match {
        before: Bytes::copy_from_slice(&data[..whole.start()]),
        groups,
    };
    Some((found, whole.end()))
}

/// Compile a pattern string into a byte regex.
pub fn compile_pattern(pattern: &str) -> Result<Regex> {
    Ok(Regex::new(pattern).map_err(ExpectError::from)?)
}
