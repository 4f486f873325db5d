//! Channel layer for output buffering and pattern matching.
//!
//! This module holds the session's accumulated output and the
//! search-and-consume step used by every expect call.

mod buffer;
mod patterns;

pub use buffer::SessionBuffer;
pub use patterns::{Match, compile_pattern, find_match};
