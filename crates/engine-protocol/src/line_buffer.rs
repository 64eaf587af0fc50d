// crates/engine-protocol/src/line_buffer.rs

//! Incremental byte → line framing for raw socket transports.
//!
//! Bytes arrive in arbitrary chunks; complete `\n`-terminated lines are
//! handed out in order and the partial tail stays buffered until the
//! rest of it shows up.

use std::fmt;

use crate::line_codec::normalize_output_line;

/// Default upper bound for a single buffered line (64 KiB).
pub const DEFAULT_MAX_LINE_LEN: usize = 64 * 1024;

/// Errors that can occur while framing lines.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LineError {
    /// A line grew past the configured maximum without a terminator.
    LineTooLong { len: usize, max: usize },
}

impl fmt::Display for LineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LineError::LineTooLong { len, max } => {
                write!(f, "line of {len} bytes exceeds maximum of {max}")
            }
        }
    }
}

impl std::error::Error for LineError {}

/// Accumulates bytes and yields complete lines.
#[derive(Debug)]
pub struct LineBuffer {
    buffer: Vec<u8>,
    max_line_len: usize,
}

impl Default for LineBuffer {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_LINE_LEN)
    }
}

impl LineBuffer {
    pub fn new(max_line_len: usize) -> Self {
        Self {
            buffer: Vec::new(),
            max_line_len,
        }
    }

    /// Append freshly read bytes.
    pub fn push(&mut self, bytes: &[u8]) {
        self.buffer.extend_from_slice(bytes);
    }

    /// Take the next complete line, if any.
    ///
    /// Returns `Ok(None)` when only a partial line is buffered, and
    /// `Err(LineTooLong)` once that partial line is over the limit.
    pub fn next_line(&mut self) -> Result<Option<String>, LineError> {
        match self.buffer.iter().position(|&b| b == b'\n') {
            Some(newline_pos) => {
                let line: Vec<u8> = self.buffer.drain(..=newline_pos).collect();
                Ok(Some(normalize_output_line(&line)))
            }
            None if self.buffer.len() > self.max_line_len => Err(LineError::LineTooLong {
                len: self.buffer.len(),
                max: self.max_line_len,
            }),
            None => Ok(None),
        }
    }

    /// Bytes of the current partial line.
    pub fn pending(&self) -> usize {
        self.buffer.len()
    }
}
