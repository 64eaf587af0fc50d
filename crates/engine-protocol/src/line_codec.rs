// crates/engine-protocol/src/line_codec.rs

//! Line codec for the engine text protocol.
//!
//! The bridge never interprets what a line means. The only things it
//! cares about are:
//!
//! - where a line ends (a single `\n`, optionally preceded by `\r`),
//! - how an engine output line is cleaned up before broadcast,
//! - which command is the terminal one (`quit`).
//!
//! Input format (client message → commands):
//!
//! - one command per line, blank lines skipped:
//!   `position startpos moves e2e4\ngo depth 10`
//!
//! Output format (command → engine stdin):
//!
//! - `<command>\n`

/// The command after which nothing more is written to an engine.
pub const TERMINAL_COMMAND: &str = "quit";

/// True when `cmd` is the terminal command.
///
/// Surrounding whitespace is ignored; the comparison is case sensitive,
/// matching what engines themselves accept.
pub fn is_terminal_command(cmd: &str) -> bool {
    cmd.trim() == TERMINAL_COMMAND
}

/// Turn one raw engine output line into the text that gets broadcast.
///
/// Bytes are decoded lossily so a stray non-UTF-8 byte never kills the
/// drainer. Trailing whitespace (including `\r\n`) is removed, leading
/// whitespace is kept.
pub fn normalize_output_line(raw: &[u8]) -> String {
    let text = String::from_utf8_lossy(raw);
    text.trim_end().to_string()
}

/// Split a client message into individual commands.
///
/// Each non-blank line is one command, trimmed of surrounding whitespace.
pub fn split_commands(text: &str) -> impl Iterator<Item = &str> {
    text.split('\n')
        .map(str::trim)
        .filter(|line| !line.is_empty())
}

/// Encode a command for an engine's stdin.
pub fn encode_command(cmd: &str) -> String {
    let mut line = String::with_capacity(cmd.len() + 1);
    line.push_str(cmd.trim_end_matches(['\r', '\n']));
    line.push('\n');
    line
}
