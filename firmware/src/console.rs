//! Line-oriented attribute console carried over the debug UART.
//!
//! Bytes are assembled into lines by [`LineBuffer`]; each line is either the
//! `status` keyword or an attribute request handled by
//! [`dht22_core::attributes::execute`]. Requests run under the sensor lock;
//! replies are rendered afterwards into a fixed buffer so the UART task can
//! write them without allocating.

#![cfg_attr(not(target_os = "none"), allow(dead_code))]

use core::fmt::Write as _;
use core::str;

use dht22_core::attributes::{ATTRIBUTES, AttributeError, Response};
use heapless::{String, Vec};

use crate::status::StatusSnapshot;

/// Maximum number of bytes accepted on a single line (excluding terminator).
pub const MAX_LINE_LEN: usize = 96;

/// Capacity of a rendered reply.
pub const REPLY_LEN: usize = 512;

pub type Reply = String<REPLY_LEN>;

/// Problems with an assembled line.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum LineError {
    /// Input exceeded [`MAX_LINE_LEN`]; the rest of the line was discarded.
    Overflow,
    /// The line was not valid UTF-8.
    InvalidUtf8,
}

/// Assembles console bytes into lines.
pub struct LineBuffer {
    buffer: Vec<u8, MAX_LINE_LEN>,
    overflowed: bool,
    complete: bool,
}

impl LineBuffer {
    pub const fn new() -> Self {
        Self {
            buffer: Vec::new(),
            overflowed: false,
            complete: false,
        }
    }

    /// Feeds one byte. Returns the finished line when `byte` terminates it.
    pub fn ingest(&mut self, byte: u8) -> Option<Result<&str, LineError>> {
        if self.complete {
            self.buffer.clear();
            self.overflowed = false;
            self.complete = false;
        }

        match byte {
            b'\r' | b'\n' => {
                if self.overflowed {
                    self.complete = true;
                    return Some(Err(LineError::Overflow));
                }
                if self.buffer.is_empty() {
                    return None;
                }
                self.complete = true;
                Some(str::from_utf8(&self.buffer).map_err(|_| LineError::InvalidUtf8))
            }
            0x08 | 0x7f => {
                self.buffer.pop();
                None
            }
            value => {
                if self.buffer.push(value).is_err() {
                    self.overflowed = true;
                }
                None
            }
        }
    }
}

impl Default for LineBuffer {
    fn default() -> Self {
        Self::new()
    }
}

/// What a console line asked for.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum ConsoleOutcome {
    /// The line only read state.
    Query,
    /// The line changed configuration or requested a reading, so timers and
    /// pending work may have moved.
    Changed,
}

/// Classifies an attribute result so the caller knows whether to wake the
/// worker and timer tasks.
pub fn outcome(result: &Result<Response, AttributeError>) -> ConsoleOutcome {
    match result {
        Ok(Response::Stored(..)) => ConsoleOutcome::Changed,
        _ => ConsoleOutcome::Query,
    }
}

/// Returns `true` for the console-only `status` keyword.
pub fn is_status_request(line: &str) -> bool {
    line.trim().eq_ignore_ascii_case("status")
}

/// Renders the status snapshot as a reply.
pub fn render_status(reply: &mut Reply, status: &StatusSnapshot) {
    reply.clear();
    // Overflow truncates the reply.
    let _ = writeln!(reply, "{status}");
}

/// Renders an attribute result as a reply.
pub fn render(reply: &mut Reply, result: &Result<Response, AttributeError>) {
    reply.clear();
    let _ = match result {
        Ok(Response::Value(_, value)) => writeln!(reply, "{value}"),
        Ok(Response::Stored(attribute, value)) => writeln!(reply, "{attribute} = {value}"),
        Ok(Response::Listing) => render_listing(reply),
        Err(err) => writeln!(reply, "error: {err}"),
    };
}

fn render_listing(reply: &mut Reply) -> core::fmt::Result {
    for spec in &ATTRIBUTES {
        writeln!(
            reply,
            "{:<22} {} {}",
            spec.name,
            spec.access.mode(),
            spec.summary
        )?;
    }
    Ok(())
}

/// Renders a line assembly failure as a reply.
pub fn render_line_error(reply: &mut Reply, error: LineError) {
    reply.clear();
    let _ = match error {
        LineError::Overflow => writeln!(reply, "error: line longer than {MAX_LINE_LEN} bytes"),
        LineError::InvalidUtf8 => writeln!(reply, "error: line is not valid UTF-8"),
    };
}

#[cfg(test)]
mod tests {
    use super::*;
    use dht22_core::attributes;
    use dht22_core::config::SensorConfig;
    use dht22_core::orchestrator::TriggerOrchestrator;

    fn feed(buffer: &mut LineBuffer, bytes: &[u8]) -> Vec<Result<std::string::String, LineError>, 4> {
        let mut lines = Vec::new();
        for byte in bytes {
            if let Some(line) = buffer.ingest(*byte) {
                let _ = lines.push(line.map(std::string::String::from));
            }
        }
        lines
    }

    #[test]
    fn assembles_lines_and_handles_backspace() {
        let mut buffer = LineBuffer::new();
        let lines = feed(&mut buffer, b"get temq\x7fperature\r\n\nlist\n");
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0].as_deref(), Ok("get temperature"));
        assert_eq!(lines[1].as_deref(), Ok("list"));
    }

    #[test]
    fn overlong_lines_are_reported_once() {
        let mut buffer = LineBuffer::new();
        let mut input = [b'x'; MAX_LINE_LEN + 10].to_vec();
        input.extend_from_slice(b"\nlist\n");
        let lines = feed(&mut buffer, &input);
        assert_eq!(lines[0], Err(LineError::Overflow));
        assert_eq!(lines[1].as_deref(), Ok("list"));
    }

    #[test]
    fn renders_attribute_replies() {
        let mut orchestrator = TriggerOrchestrator::new(SensorConfig::default(), 0);
        let mut reply = Reply::new();
        let mut run = |line: &str, reply: &mut Reply| {
            let result = attributes::execute(&mut orchestrator, line, 0);
            render(reply, &result);
            outcome(&result)
        };

        assert_eq!(run("get temperature", &mut reply), ConsoleOutcome::Query);
        assert_eq!(reply.as_str(), "0.0\n");

        assert_eq!(
            run("set autoupdate_timeout_ms 99", &mut reply),
            ConsoleOutcome::Changed
        );
        assert_eq!(reply.as_str(), "autoupdate_timeout_ms = 2000\n");

        assert_eq!(run("set humidity 1", &mut reply), ConsoleOutcome::Query);
        assert_eq!(reply.as_str(), "error: humidity is read-only\n");

        run("list", &mut reply);
        assert_eq!(reply.lines().count(), ATTRIBUTES.len());
        assert!(reply.starts_with("gpio_number"));
    }

    #[test]
    fn status_keyword_is_case_insensitive() {
        assert!(is_status_request(" STATUS "));
        assert!(!is_status_request("get status"));
    }
}
