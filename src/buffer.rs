//! The line buffer and its byte-at-a-time assembler.
//!
//! A [`GCodeBuffer`] accumulates one logical line from an interrupt-driven
//! producer, verifies its framing (line number and `*` checksum), lets the
//! conditional control layer consume it when executing from a file, and
//! otherwise decodes the command letter, number and parameter region so the
//! typed `get_*` queries can run against it.

mod conditional;
mod expression;
mod strings;
mod values;


use core::fmt;
use core::fmt::Write as _;

use crate::machine::{FileInput, MachineState, NoFile};
use crate::types::{FilePosition, MachineType};
use crate::utils::Ascii;
use crate::{ParseError, ParseErrorKind};

pub use expression::{NullObjectModel, ObjectModel};

/// Phase of the line assembler.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BufferState {
    NotStarted,
    LineNumber,
    Whitespace,
    GCode,
    BracketedComment,
    QuotedString,
    Checksum,
    Discarding,
    /// A completed command is sitting in the buffer.
    Ready,
}

/// One G-code input channel: a fixed-capacity line buffer plus the parser
/// state that goes with it.
///
/// `OM` resolves `{...}` expressions and block conditions, `F` is the file
/// handle type for channels that execute from a file ([`NoFile`] otherwise),
/// and `N` is the line capacity in bytes.
pub struct GCodeBuffer<OM, F = NoFile, const N: usize = 256> {
    identity: &'static str,
    object_model: OM,
    machine: MachineState<F>,
    checksum_required: bool,

    buffer: [u8; N],
    line_end: usize,
    state: BufferState,
    command_indent: usize,

    command_start: usize,
    parameter_start: usize,
    command_end: usize,
    command_letter: u8,
    has_command_number: bool,
    command_number: i32,
    command_fraction: i8,

    read_pointer: Option<usize>,
    received_line_number: u32,
    had_line_number: bool,
    had_checksum: bool,
    declared_checksum: u8,
    computed_checksum: u8,
    command_length: u32,
    indent_to_skip_to: Option<usize>,
}

impl<OM, F, const N: usize> GCodeBuffer<OM, F, N>
where
    OM: ObjectModel,
    F: FileInput,
{
    /// `identity` names the channel in log output (e.g. `"serial"`, `"file"`).
    pub fn new(identity: &'static str, object_model: OM) -> Self {
        let mut gb = Self {
            identity,
            object_model,
            machine: MachineState::new(),
            checksum_required: false,
            buffer: [0; N],
            line_end: 0,
            state: BufferState::NotStarted,
            command_indent: 0,
            command_start: 0,
            parameter_start: 0,
            command_end: 0,
            command_letter: b'Q',
            has_command_number: false,
            command_number: -1,
            command_fraction: -1,
            read_pointer: None,
            received_line_number: 0,
            had_line_number: false,
            had_checksum: false,
            declared_checksum: 0,
            computed_checksum: 0,
            command_length: 0,
            indent_to_skip_to: None,
        };
        gb.init();
        gb
    }

    /// Set up to assemble the next line. The previous decode results stay in
    /// place so a following bare-axis-word line can reuse them.
    fn init(&mut self) {
        self.line_end = 0;
        self.command_length = 0;
        self.read_pointer = None;
        self.had_line_number = false;
        self.had_checksum = false;
        self.computed_checksum = 0;
        self.state = BufferState::NotStarted;
        self.command_indent = 0;
    }

    pub fn identity(&self) -> &'static str {
        self.identity
    }

    pub fn machine(&self) -> &MachineState<F> {
        &self.machine
    }

    pub fn machine_mut(&mut self) -> &mut MachineState<F> {
        &mut self.machine
    }

    /// Require every non-macro line on this channel to carry a checksum.
    pub fn set_checksum_required(&mut self, required: bool) {
        self.checksum_required = required;
    }

    pub fn is_ready(&self) -> bool {
        self.state == BufferState::Ready
    }

    pub fn command_letter(&self) -> char {
        self.command_letter as char
    }

    pub fn has_command_number(&self) -> bool {
        self.has_command_number
    }

    pub fn command_number(&self) -> i32 {
        self.command_number
    }

    /// Single digit after the decimal point of the command number, or `-1`.
    pub fn command_fraction(&self) -> i8 {
        self.command_fraction
    }

    pub fn line_number(&self) -> u32 {
        self.machine.line_number
    }

    /// Leading whitespace columns of the current line.
    pub fn command_indent(&self) -> usize {
        self.command_indent
    }

    /// The stored line, without its line number and checksum.
    pub fn line(&self) -> &[u8] {
        &self.buffer[..self.line_end]
    }

    /// The current command and its parameters.
    pub fn data(&self) -> &[u8] {
        &self.buffer[self.command_start..self.command_end]
    }

    fn byte(&self, index: usize) -> u8 {
        self.buffer.get(index).copied().unwrap_or(0)
    }

    fn add_to_checksum(&mut self, c: u8) {
        self.computed_checksum ^= c;
    }

    fn store_and_add_to_checksum(&mut self, c: u8) {
        self.computed_checksum ^= c;
        if self.line_end < N {
            self.buffer[self.line_end] = c;
            self.line_end += 1;
        }
    }

    /// Add one byte to the command being assembled. Returns `true` exactly
    /// when a complete line has passed the integrity checks and is ready to
    /// be acted upon.
    pub fn put_byte(&mut self, c: u8) -> bool {
        if c != 0 {
            self.command_length = self.command_length.wrapping_add(1);
        }

        if c == 0 || c == b'\n' || c == b'\r' {
            return self.line_finished();
        }

        if c == 0x7F && self.state != BufferState::Discarding {
            // The UART receiver stores 0x7F on an overrun or framing error.
            // Drop the command and resync on the next line terminator.
            self.line_end = 0;
            self.state = BufferState::Discarding;
        }

        loop {
            match self.state {
                BufferState::NotStarted => match c {
                    b'N' | b'n' => {
                        self.had_line_number = true;
                        self.add_to_checksum(c);
                        self.state = BufferState::LineNumber;
                        self.received_line_number = 0;
                    }
                    b' ' | b'\t' => {
                        self.add_to_checksum(c);
                        self.command_indent += 1;
                    }
                    _ => {
                        self.state = BufferState::GCode;
                        self.command_start = 0;
                        continue; // re-dispatch this byte
                    }
                },
                BufferState::LineNumber => {
                    if c.is_ascii_digit() {
                        self.add_to_checksum(c);
                        self.received_line_number = self
                            .received_line_number
                            .wrapping_mul(10)
                            .wrapping_add(u32::from(c - b'0'));
                    } else {
                        self.state = BufferState::Whitespace;
                        continue;
                    }
                }
                BufferState::Whitespace => match c {
                    b' ' | b'\t' => self.add_to_checksum(c),
                    _ => {
                        self.state = BufferState::GCode;
                        self.command_start = 0;
                        continue;
                    }
                },
                BufferState::GCode => match c {
                    b'*' => {
                        self.declared_checksum = 0;
                        self.had_checksum = true;
                        self.state = BufferState::Checksum;
                    }
                    b';' => self.state = BufferState::Discarding,
                    b'(' => {
                        self.add_to_checksum(c);
                        self.state = BufferState::BracketedComment;
                    }
                    b'"' => {
                        self.store_and_add_to_checksum(c);
                        self.state = BufferState::QuotedString;
                    }
                    _ => self.store_and_add_to_checksum(c),
                },
                BufferState::BracketedComment => {
                    self.add_to_checksum(c);
                    if c == b')' {
                        self.state = BufferState::GCode;
                    }
                }
                BufferState::QuotedString => {
                    self.store_and_add_to_checksum(c);
                    if c == b'"' {
                        self.state = BufferState::GCode;
                    }
                }
                BufferState::Checksum => {
                    if c.is_ascii_digit() {
                        self.declared_checksum = self
                            .declared_checksum
                            .wrapping_mul(10)
                            .wrapping_add(c - b'0');
                    } else {
                        self.state = BufferState::Discarding;
                        continue;
                    }
                }
                BufferState::Discarding | BufferState::Ready => {}
            }
            break;
        }

        false
    }

    /// Add an entire slice, overwriting any existing content and supplying
    /// the final `'\n'` if the slice lacks one. Stops at the first completed
    /// command.
    pub fn put_slice(&mut self, data: &[u8]) -> bool {
        self.init();
        for &c in data {
            if self.put_byte(c) {
                return true;
            }
        }
        self.put_byte(b'\n')
    }

    pub fn put_str(&mut self, data: &str) -> bool {
        self.put_slice(data.as_bytes())
    }

    /// Called when the file being executed ran out of bytes. Terminates a
    /// pending unterminated last line so it still gets executed.
    pub fn file_ended(&mut self) -> bool {
        if self.line_end != 0 {
            self.put_byte(b'\n')
        } else {
            false
        }
    }

    /// Called on a null, CR or LF. Returns `true` if a completed command is
    /// ready to be executed.
    fn line_finished(&mut self) -> bool {
        if self.line_end == 0 {
            // empty line
            self.init();
            return false;
        }

        if self.line_end == N {
            log::error!("G-code buffer '{}' length overflow", self.identity);
            self.init();
            return false;
        }

        self.buffer[self.line_end] = 0;
        let bad_checksum = self.had_checksum && self.computed_checksum != self.declared_checksum;
        let missing_checksum =
            self.checksum_required && !self.had_checksum && !self.machine.in_nested_macro;
        log::debug!(
            "{}{}: {}",
            self.identity,
            if bad_checksum {
                "(bad-csum)"
            } else if missing_checksum {
                "(no-csum)"
            } else {
                ""
            },
            Ascii(&self.buffer[..self.line_end])
        );

        if bad_checksum {
            if self.had_line_number {
                self.request_resend();
            } else {
                self.init();
                return false;
            }
        } else if missing_checksum {
            self.init();
            return false;
        }

        if self.had_line_number {
            self.machine.line_number = self.received_line_number;
        } else {
            self.machine.line_number = self.machine.line_number.wrapping_add(1);
        }

        if self.machine.doing_file() {
            let mut skipped_if_false = false;
            if let Some(skip) = self.indent_to_skip_to {
                if skip < self.command_indent {
                    // still inside the block being skipped
                    self.init();
                    return false;
                }
                if skip == self.command_indent {
                    skipped_if_false = self.machine.current_block().is_if_false();
                    self.machine.set_current_block(crate::machine::BlockState::Plain);
                }
                self.indent_to_skip_to = None;
            }
            if self.process_conditional(skipped_if_false) {
                self.init();
                return false;
            }
        }

        self.command_start = 0;
        self.decode_command();
        true
    }

    /// Replace the buffer content with a resend request for the line whose
    /// checksum did not match.
    fn request_resend(&mut self) {
        let mut request: heapless::String<24> = heapless::String::new();
        let _ = write!(request, "M998 P{}", self.received_line_number);
        let len = request.len().min(N - 1);
        self.buffer[..len].copy_from_slice(&request.as_bytes()[..len]);
        self.line_end = len;
        self.buffer[len] = 0;
    }

    /// Decode the command at `command_start` and find where it ends. A `G` or
    /// `M` preceded by whitespace and outside double quotes starts the next
    /// command on the same line.
    fn decode_command(&mut self) {
        let cl = self.byte(self.command_start).to_ascii_uppercase();
        self.command_fraction = -1;
        if cl == b'G' || cl == b'M' || cl == b'T' {
            self.command_letter = cl;
            self.has_command_number = false;
            self.command_number = -1;
            self.parameter_start = self.command_start + 1;
            let negative = self.byte(self.parameter_start) == b'-';
            if negative {
                self.parameter_start += 1;
            }
            if self.byte(self.parameter_start).is_ascii_digit() {
                self.has_command_number = true;
                self.command_number = 0;
                while self.byte(self.parameter_start).is_ascii_digit() {
                    self.command_number = self
                        .command_number
                        .wrapping_mul(10)
                        .wrapping_add(i32::from(self.byte(self.parameter_start) - b'0'));
                    self.parameter_start += 1;
                }
                if negative {
                    self.command_number = -self.command_number;
                }

                if self.byte(self.parameter_start) == b'.' {
                    self.parameter_start += 1;
                    let d = self.byte(self.parameter_start);
                    if d.is_ascii_digit() {
                        self.command_fraction = (d - b'0') as i8;
                        self.parameter_start += 1;
                    }
                }
            }

            let mut in_quotes = false;
            let mut primed = false;
            self.command_end = self.parameter_start;
            while self.command_end < self.line_end {
                let c = self.buffer[self.command_end];
                if c == b'"' {
                    in_quotes = !in_quotes;
                    primed = false;
                } else if !in_quotes {
                    let c2 = c.to_ascii_uppercase();
                    if primed && (c2 == b'G' || c2 == b'M') {
                        break;
                    }
                    primed = c == b' ' || c == b'\t';
                }
                self.command_end += 1;
            }
        } else if self.has_command_number
            && self.command_letter == b'G'
            && (0..=3).contains(&self.command_number)
            && (self.machine.axis_letters().contains(&cl)
                || ((cl == b'I' || cl == b'J') && self.command_number >= 2))
            && self.machine.machine_type == MachineType::Cnc
        {
            // Fanuc-style continuation: repeat the previous G0..G3 with the
            // new axis words.
            self.parameter_start = self.command_start;
            self.command_end = self.line_end;
        } else {
            // not a command we recognize
            self.command_letter = cl;
            self.has_command_number = false;
            self.command_number = -1;
            self.command_fraction = -1;
            self.parameter_start = self.command_start;
            self.command_end = self.line_end;
        }

        self.state = BufferState::Ready;
    }

    /// The executor is done with the current command. Moves on to the next
    /// command on the same line, or resets for the next line.
    pub fn set_finished(&mut self) {
        if self.command_end < self.line_end {
            self.command_start = self.command_end;
            self.decode_command();
        } else {
            self.machine.g53_active = false; // G53 only lasts one line
            self.init();
        }
    }

    /// File offset of the start of the current command, when executing from
    /// a file.
    pub fn file_position(&self) -> Option<FilePosition> {
        self.machine.file().map(|f| {
            f.position()
                .wrapping_sub(f.bytes_cached())
                .wrapping_sub(self.command_length)
                .wrapping_add(self.command_start as FilePosition)
        })
    }

    /// Rewind the attached file. The next bytes fed in must come from the new
    /// position.
    pub fn restart_from(&mut self, position: FilePosition) {
        if let Some(file) = self.machine.file_mut() {
            file.seek(position);
        }
    }

    /// Short form of the current command, e.g. `G1` or `G92.1`.
    pub fn print_command<W: fmt::Write>(&self, out: &mut W) -> fmt::Result {
        write!(out, "{}{}", self.command_letter as char, self.command_number)?;
        if self.command_fraction >= 0 {
            write!(out, ".{}", self.command_fraction)?;
        }
        Ok(())
    }

    /// Appends the whole stored line.
    pub fn append_full_command<W: fmt::Write>(&self, out: &mut W) -> fmt::Result {
        for &b in self.line() {
            out.write_char(b as char)?;
        }
        Ok(())
    }

    fn begin_read(&self) -> Result<usize, ParseError> {
        self.read_pointer
            .ok_or(ParseError::new(None, ParseErrorKind::Internal))
    }

    fn err_at(&self, position: usize, kind: ParseErrorKind) -> ParseError {
        ParseError::new(Some(position), kind)
    }
}
