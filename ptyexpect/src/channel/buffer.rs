//! Accumulated session output with newline canonicalization.
//!
//! Bytes only enter the buffer through [`SessionBuffer::extend`] and only
//! leave it through [`SessionBuffer::consume_match`]. Every extend collapses
//! `\r\n` to `\n`, so patterns always see one newline convention no matter
//! what the program on the other end writes.

use std::borrow::Cow;

use regex::bytes::Regex;

use super::patterns::{self, Match};

/// Buffer for accumulating output and consuming pattern matches.
#[derive(Debug, Default)]
pub struct SessionBuffer {
    /// Unconsumed output, newline-normalized.
    buffer: Vec<u8>,
}

impl SessionBuffer {
    /// Create an empty buffer.
    pub fn new() -> Self {
        Self {
            buffer: Vec::with_capacity(4096),
        }
    }

    /// Append a chunk and canonicalize newlines.
    pub fn extend(&mut self, data: &[u8]) {
        let start = self.buffer.len();
        self.buffer.extend_from_slice(data);
        normalize_newlines(&mut self.buffer, start);
    }

    /// Find the left-most match and consume everything up to its end.
    ///
    /// On no match the buffer is left untouched.
    pub fn consume_match(&mut self, pattern: &Regex) -> Option<Match> {
        let (found, end) = patterns::find_match(pattern, &self.buffer)?;
        self.buffer.drain(..end);
        Some(found)
    }

    /// Get a reference to the buffer contents.
    pub fn as_slice(&self) -> &[u8] {
        &self.buffer
    }

    /// Get the buffer contents as a string (lossy UTF-8 conversion).
    pub fn as_str_lossy(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.buffer)
    }

    /// Get the current buffer length.
    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    /// Check if the buffer is empty.
    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }
}

/// Collapse every `\r`-run followed by `\n` into a single `\n`.
///
/// Only bytes from `start` onwards are new; carriage returns left dangling
/// at the end of the previous contents are folded in when the line-feed
/// that completes them arrives.
pub(crate) fn normalize_newlines(buf: &mut Vec<u8>, start: usize) {
    if memchr::memchr(b'\n', &buf[start..]).is_none() {
        return;
    }

    let mut write = start;
    for read in start..buf.len() {
        let byte = buf[read];
        if byte == b'\n' {
            while write > 0 && buf[write - 1] == b'\r' {
                write -= 1;
            }
        }
        buf[write] = byte;
        write += 1;
    }
    buf.truncate(write);
}
