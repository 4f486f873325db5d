//! Text renderings of a recorded op list.
//!
//! [`dump`] is a compact human-readable listing. [`tcl_expect_script`]
//! renders the recording as a classic Tcl `expect` script that plays the
//! program's side of the conversation: it waits for what the session sent
//! and prints what the program printed, so any expect-compatible tool can
//! stand in for the original program.

use std::fmt::Write;

use super::MockOp;

/// Render one line per op: `SEND "…"`, `RECV "…"`, `EOF`, `WAIT 0.123`.
pub fn dump(ops: &[MockOp]) -> String {
    let mut out = String::new();
    for op in ops {
        let _ = match op {
            MockOp::Send(data) => writeln!(out, "SEND {:?}", String::from_utf8_lossy(data)),
            MockOp::Receive(data) => writeln!(out, "RECV {:?}", String::from_utf8_lossy(data)),
            MockOp::EndOfStream => writeln!(out, "EOF"),
            MockOp::Wait(wait) => writeln!(out, "WAIT {:.3}", wait.as_secs_f64()),
        };
    }
    out
}

/// Render the recording as a `#!/usr/bin/expect -f` script.
pub fn tcl_expect_script(ops: &[MockOp]) -> String {
    let mut out = String::from("#!/usr/bin/expect -f\n");
    for op in ops {
        let _ = match op {
            MockOp::Send(data) => writeln!(out, "expect_user -- {}", tcl_quote(data)),
            MockOp::Receive(data) => writeln!(out, "send_user -- {}", tcl_quote(data)),
            MockOp::EndOfStream => writeln!(out, "# EOF"),
            MockOp::Wait(wait) => writeln!(out, "sleep {:.3}", wait.as_secs_f64()),
        };
    }
    out
}

/// Quote bytes as a Tcl double-quoted word with no substitutions left.
fn tcl_quote(data: &[u8]) -> String {
    let mut out = String::with_capacity(data.len() + 2);
    out.push('"');
    for chunk in data.utf8_chunks() {
        for ch in chunk.valid().chars() {
            match ch {
                '\\' => out.push_str("\\\\"),
                '"' => out.push_str("\\\""),
                '$' => out.push_str("\\$"),
                '[' => out.push_str("\\["),
                ']' => out.push_str("\\]"),
                '\n' => out.push_str("\\n"),
                '\r' => out.push_str("\\r"),
                '\t' => out.push_str("\\t"),
                c if c.is_control() => {
                    let _ = write!(out, "\\x{:02x}", c as u32);
                }
                c => out.push(c),
            }
        }
        for byte in chunk.invalid() {
            let _ = write!(out, "\\x{:02x}", byte);
        }
    }
    out.push('"');
    out
}
