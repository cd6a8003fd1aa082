//! The conditional control layer: indentation-scoped blocks and the reserved
//! words `if`, `else`, `while`, `break` and `var`, recognized only while
//! executing from a file.

use crate::machine::{BlockState, FileInput};
use crate::{ParseError, ParseErrorKind};

use super::{GCodeBuffer, ObjectModel};

impl<OM, F, const N: usize> GCodeBuffer<OM, F, N>
where
    OM: ObjectModel,
    F: FileInput,
{
    /// Reconcile the line's indentation against the open blocks, then check
    /// for a reserved word. Returns `true` if the line was consumed by the
    /// control layer. Failures are reported and the line is dropped; they
    /// never reach the caller of `put_byte`.
    pub(super) fn process_conditional(&mut self, skipped_if_false: bool) -> bool {
        match self.try_process_conditional(skipped_if_false) {
            Ok(consumed) => consumed,
            Err(e) => {
                log::error!(
                    "{}: {} (line {})",
                    self.identity,
                    e,
                    self.machine.line_number
                );
                true
            }
        }
    }

    fn try_process_conditional(&mut self, skipped_if_false: bool) -> Result<bool, ParseError> {
        if self.command_indent > self.machine.indent_level() {
            self.create_blocks();
        } else if self.command_indent < self.machine.indent_level() && self.end_blocks() {
            return Ok(true);
        }

        // All reserved words are 2 to 5 lowercase letters followed by
        // end-of-line or whitespace.
        let mut i = 0;
        while i < 6 && self.byte(i).is_ascii_lowercase() {
            i += 1;
        }
        let terminator = self.byte(i);
        if !(terminator == 0 || terminator == b' ' || terminator == b'\t') {
            return Ok(false);
        }

        match i {
            2 if self.word_is(b"if") => {
                self.process_if()?;
                Ok(true)
            }
            3 if self.word_is(b"var") => {
                Err(ParseError::new(None, ParseErrorKind::VarNotImplemented))
            }
            4 if self.word_is(b"else") => {
                self.process_else(skipped_if_false)?;
                Ok(true)
            }
            5 if self.word_is(b"while") => {
                self.process_while()?;
                Ok(true)
            }
            5 if self.word_is(b"break") => {
                self.process_break()?;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    fn word_is(&self, word: &[u8]) -> bool {
        &self.buffer[..word.len()] == word
    }

    /// Indentation increased, so open new block(s).
    fn create_blocks(&mut self) {
        while self.machine.indent_level() < self.command_indent {
            if !self.machine.create_block() {
                log::warn!("{}: block nesting too deep", self.identity);
                break;
            }
        }
    }

    /// Indentation decreased. Returns `true` when a loop end consumed the
    /// line by rewinding the source to re-evaluate its `while`.
    fn end_blocks(&mut self) -> bool {
        while self.machine.indent_level() > self.command_indent {
            self.machine.end_block();
            if let BlockState::Loop {
                file_position,
                line_number,
            } = self.machine.current_block()
            {
                self.machine.line_number = line_number;
                self.restart_from(file_position);
                return true;
            }
        }
        false
    }

    fn process_if(&mut self) -> Result<(), ParseError> {
        if self.evaluate_condition("if")? {
            self.machine.set_current_block(BlockState::IfTrue);
        } else {
            self.machine.set_current_block(BlockState::IfFalse);
            // skip forwards to the end of the block
            self.indent_to_skip_to = Some(self.machine.indent_level());
        }
        Ok(())
    }

    fn process_else(&mut self, skipped_if_false: bool) -> Result<(), ParseError> {
        if skipped_if_false {
            // the if-part was skipped, so execute the else-part
            self.machine.set_current_block(BlockState::Plain);
        } else if self.machine.current_block().is_if_true() {
            self.indent_to_skip_to = Some(self.machine.indent_level());
        } else {
            return Err(ParseError::new(None, ParseErrorKind::ElseWithoutIf));
        }
        Ok(())
    }

    fn process_while(&mut self) -> Result<(), ParseError> {
        if self.evaluate_condition("while")? {
            let file_position = self.file_position().unwrap_or(0);
            self.machine.set_current_block(BlockState::Loop {
                file_position,
                line_number: self.machine.line_number,
            });
        } else {
            self.indent_to_skip_to = Some(self.machine.indent_level());
        }
        Ok(())
    }

    /// Unwind to the innermost loop, neutralize it, and skip the rest of its
    /// body.
    fn process_break(&mut self) -> Result<(), ParseError> {
        loop {
            if self.machine.indent_level() == 0 && !self.machine.current_block().is_loop() {
                return Err(ParseError::new(None, ParseErrorKind::BreakOutsideLoop));
            }
            if self.machine.current_block().is_loop() {
                break;
            }
            self.machine.end_block();
        }
        self.machine.set_current_block(BlockState::Plain);
        self.indent_to_skip_to = Some(self.machine.indent_level());
        Ok(())
    }

    /// The condition is the rest of the line after the keyword; resolving it
    /// is the object model's job.
    fn evaluate_condition(&self, keyword: &'static str) -> Result<bool, ParseError> {
        let mut start = keyword.len();
        while start < self.line_end && matches!(self.buffer[start], b' ' | b'\t') {
            start += 1;
        }
        let text = core::str::from_utf8(&self.buffer[start..self.line_end]).unwrap_or("");
        self.object_model
            .evaluate_condition(text.trim_end())
            .ok_or(ParseError::new(
                None,
                ParseErrorKind::BadCondition(keyword),
            ))
    }
}
