//! String-valued parameter reads.
//!
//! Quoted strings double `"` to escape it, and use `'` to lowercase the next
//! alphabetic character (`''` is a literal `'`). Control characters are never
//! valid inside a string.

use heapless::String;

use crate::machine::FileInput;
use crate::{ParseError, ParseErrorKind};

use super::{GCodeBuffer, ObjectModel};

impl<OM, F, const N: usize> GCodeBuffer<OM, F, N>
where
    OM: ObjectModel,
    F: FileInput,
{
    /// Get a quoted string, or a `{...}` expression rendered as a string.
    pub fn get_quoted_string<const M: usize>(
        &mut self,
        dst: &mut String<M>,
    ) -> Result<(), ParseError> {
        let p = self.begin_read()?;
        let result = match self.byte(p) {
            b'"' => self.read_quoted_string(p, dst).map(|_| ()),
            b'{' => self.read_string_expression(p, dst).map(|_| ()),
            _ => Err(self.err_at(p, ParseErrorKind::ExpectedStringExpression)),
        };
        self.read_pointer = None;
        result
    }

    /// Get a string which may or may not be quoted. An unquoted string runs
    /// to the end of the line and claims it, with trailing spaces stripped.
    pub fn get_possibly_quoted_string<const M: usize>(
        &mut self,
        dst: &mut String<M>,
    ) -> Result<(), ParseError> {
        let p = self.begin_read()?;
        let result = self.read_possibly_quoted_string(p, dst, false);
        self.read_pointer = None;
        result
    }

    /// Legacy form for commands like `M23` whose one string argument has no
    /// preceding parameter letter: starts at the beginning of the parameter
    /// region, skipping leading whitespace.
    pub fn get_unprecedented_string<const M: usize>(
        &mut self,
        dst: &mut String<M>,
        allow_empty: bool,
    ) -> Result<(), ParseError> {
        let mut p = self.parameter_start;
        while p < self.command_end && matches!(self.buffer[p], b' ' | b'\t') {
            p += 1;
        }
        let result = self.read_possibly_quoted_string(p, dst, allow_empty);
        self.read_pointer = None;
        result
    }

    /// Get a quoted string reduced for lookup purposes: lowercased, with
    /// `_`, `-` and spaces dropped.
    pub fn get_reduced_string<const M: usize>(
        &mut self,
        dst: &mut String<M>,
    ) -> Result<(), ParseError> {
        let p = self.begin_read()?;
        let result = self.read_reduced_string(p, dst);
        self.read_pointer = None;
        result
    }

    /// `p` holds the opening `"`. Returns the offset just past the closing
    /// quote.
    fn read_quoted_string<const M: usize>(
        &mut self,
        p: usize,
        dst: &mut String<M>,
    ) -> Result<usize, ParseError> {
        dst.clear();
        let mut p = p + 1;
        loop {
            let mut c = self.byte(p);
            p += 1;
            if c < 0x20 {
                return Err(self.err_at(p - 1, ParseErrorKind::ControlCharacter));
            }
            if c == b'"' {
                if self.byte(p) == b'"' {
                    p += 1; // "" stands for one double-quote
                } else {
                    return Ok(p);
                }
            } else if c == b'\'' {
                let next = self.byte(p);
                if next.is_ascii_alphabetic() {
                    c = next.to_ascii_lowercase();
                    p += 1;
                } else if next == b'\'' {
                    p += 1; // '' stands for one single-quote
                }
            }
            let _ = dst.push(c as char);
        }
    }

    fn read_possibly_quoted_string<const M: usize>(
        &mut self,
        p: usize,
        dst: &mut String<M>,
        allow_empty: bool,
    ) -> Result<(), ParseError> {
        dst.clear();
        match self.byte(p) {
            b'"' => {
                self.read_quoted_string(p, dst)?;
            }
            b'{' => {
                self.read_string_expression(p, dst)?;
            }
            _ => {
                // the bare string is the remainder of the line of gcode
                self.command_end = self.line_end;
                let mut p = p;
                loop {
                    let c = self.byte(p);
                    if c < 0x20 {
                        break;
                    }
                    p += 1;
                    let _ = dst.push(c as char);
                }
                while dst.ends_with(' ') {
                    dst.pop();
                }
            }
        }
        if !allow_empty && dst.is_empty() {
            return Err(self.err_at(p, ParseErrorKind::EmptyString));
        }
        Ok(())
    }

    fn read_reduced_string<const M: usize>(
        &mut self,
        p: usize,
        dst: &mut String<M>,
    ) -> Result<(), ParseError> {
        dst.clear();
        if self.byte(p) != b'"' {
            return Err(self.err_at(p, ParseErrorKind::ExpectedString));
        }
        let mut p = p + 1;
        loop {
            let c = self.byte(p);
            p += 1;
            match c {
                b'"' => {
                    if self.byte(p) == b'"' {
                        p += 1;
                        let _ = dst.push('"');
                    } else {
                        return Ok(());
                    }
                }
                b'_' | b'-' | b' ' => {}
                c if c < 0x20 => {
                    return Err(self.err_at(p - 1, ParseErrorKind::ControlCharacter));
                }
                c => {
                    let _ = dst.push(c.to_ascii_lowercase() as char);
                }
            }
        }
    }
}
