//! `{...}` expression handling. The only accepted form is a single variable
//! name, resolved by the host's object model.

use core::fmt::Write as _;

use heapless::String;

use crate::machine::FileInput;
use crate::types::ExpressionValue;
use crate::{ParseError, ParseErrorKind, MAX_VARIABLE_NAME_LENGTH};

use super::GCodeBuffer;

/// Host-side resolver for variables and block conditions.
///
/// The parser is handed one of these at construction so the core stays
/// testable; any global state behind it is the host's concern.
pub trait ObjectModel {
    /// Resolve a `{name}` expression to a typed value. `None` means the name
    /// is not known.
    fn lookup(&self, name: &str) -> Option<ExpressionValue>;

    /// Evaluate the condition text that follows `if` or `while`. `None` means
    /// the text could not be evaluated.
    fn evaluate_condition(&self, condition: &str) -> Option<bool>;
}

/// Object model that knows nothing; every expression and condition fails.
pub struct NullObjectModel;

impl ObjectModel for NullObjectModel {
    fn lookup(&self, _name: &str) -> Option<ExpressionValue> {
        None
    }

    fn evaluate_condition(&self, _condition: &str) -> Option<bool> {
        None
    }
}

impl<OM, F, const N: usize> GCodeBuffer<OM, F, N>
where
    OM: ObjectModel,
    F: FileInput,
{
    /// Evaluate the expression starting at `p`, which must hold the `{`.
    /// Returns the value and the offset just past the closing `}`.
    pub(super) fn evaluate_expression(
        &mut self,
        p: usize,
    ) -> Result<(ExpressionValue, usize), ParseError> {
        let mut p = p + 1; // step over the '{'
        if !self.byte(p).is_ascii_alphabetic() {
            return Err(self.err_at(p, ParseErrorKind::ExpectedVariableName));
        }

        let start = p;
        let mut bracket_depth = 0u32;
        loop {
            let c = self.byte(p);
            let accepted = c.is_ascii_alphanumeric()
                || c == b'_'
                || c == b'.'
                || c == b'('
                || (c == b')' && bracket_depth != 0);
            if !accepted {
                break;
            }
            if c == b'(' {
                bracket_depth += 1;
            } else if c == b')' {
                bracket_depth -= 1;
            }
            p += 1;
        }

        if p - start > MAX_VARIABLE_NAME_LENGTH {
            return Err(self.err_at(p, ParseErrorKind::VariableNameTooLong));
        }
        let name = core::str::from_utf8(&self.buffer[start..p])
            .map_err(|_| self.err_at(start, ParseErrorKind::ExpectedVariableName))?;

        let value = self
            .object_model
            .lookup(name)
            .ok_or(self.err_at(start, ParseErrorKind::UnknownVariable))?;

        if self.byte(p) != b'}' {
            return Err(self.err_at(p, ParseErrorKind::MissingClosingBrace));
        }
        Ok((value, p + 1))
    }

    /// Evaluate the expression at `p` and render the value into `dst`.
    pub(super) fn read_string_expression<const M: usize>(
        &mut self,
        p: usize,
        dst: &mut String<M>,
    ) -> Result<usize, ParseError> {
        let (value, next) = self.evaluate_expression(p)?;
        dst.clear();
        match value {
            ExpressionValue::Str(s) => {
                let _ = dst.push_str(s);
            }
            ExpressionValue::Float(v) => {
                let _ = write!(dst, "{v:.1}");
            }
            ExpressionValue::Float2(v) => {
                let _ = write!(dst, "{v:.2}");
            }
            ExpressionValue::Float3(v) => {
                let _ = write!(dst, "{v:.3}");
            }
            ExpressionValue::Int(v) => {
                let _ = write!(dst, "{v}");
            }
            ExpressionValue::Uint(v) => {
                let _ = write!(dst, "{v}");
            }
            ExpressionValue::Bool(v) => {
                let _ = dst.push_str(if v { "true" } else { "false" });
            }
            ExpressionValue::Ip(ip) => {
                let _ = write!(dst, "{ip}");
            }
        }
        Ok(next)
    }
}
