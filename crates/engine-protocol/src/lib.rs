//! engine-protocol
//!
//! Line-level handling for the engine text protocol.
//!
//! The bridge treats every line as opaque text; this crate only knows
//! where lines start and end and which command is terminal.
//!
//! - [`line_codec`]  : command splitting/encoding, output normalization
//! - [`line_buffer`] : byte → line framing for raw socket transports

pub mod line_codec;
pub mod line_buffer;

pub use line_codec::{
    TERMINAL_COMMAND,
    encode_command,
    is_terminal_command,
    normalize_output_line,
    split_commands,
};

pub use line_buffer::{LineBuffer, LineError, DEFAULT_MAX_LINE_LEN};
