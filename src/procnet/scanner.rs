//! Cursor-based lexical scanning of one table line
//!
//! Every /proc/net socket table row is plain ASCII made of a handful of
//! token shapes: runs of spaces, single `:` delimiters, decimal digit runs
//! and hexadecimal digit runs. This module scans exactly those shapes.
//!
//! # Educational Notes
//!
//! ## Cursor Instead of Pointer Pairs
//!
//! A C parser for this format walks a `const char *cp` towards an end
//! pointer. Here the same idea is an explicit `(position, end)` pair over an
//! immutable byte slice:
//!
//! ```text
//!  line:  "  0: 0100007F:0050 00000000:0000 0A ..."
//!          ^pos                                  ^end (line.len())
//! ```
//!
//! The slice is borrowed (`&'a [u8]`), so every token we hand out is also a
//! borrowed sub-slice of the same line. Nothing is copied and nothing is
//! allocated.
//!
//! ## Error Positions
//!
//! Every `SyntaxError` carries `at`, the byte column where scanning failed.
//! Combined with the file path and line number added by the reader, this
//! gives a precise diagnostic for a malformed row.

/// Malformed field inside one table line
///
/// `at` is the byte column (0-based) within the line where the problem was
/// detected.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SyntaxError {
    /// A required delimiter byte was missing
    #[error("column {at}: expected {expected:?}, found {}", describe(*found))]
    ExpectedDelimiter {
        expected: char,
        found: Option<char>,
        at: usize,
    },

    /// A decimal digit run was required but none was present
    #[error("column {at}: no digits found")]
    NoDigits { at: usize },

    /// A hexadecimal digit run was required but none was present
    #[error("column {at}: no hex digits found")]
    NoHexDigits { at: usize },

    /// An address encoding was neither 8 (IPv4) nor 32 (IPv6) hex digits
    #[error("column {at}: unknown address length {len}")]
    UnknownAddressLength { len: usize, at: usize },

    /// A numeric field does not fit its target width
    #[error("column {at}: numeric field overflows")]
    Overflow { at: usize },
}

fn describe(found: Option<char>) -> String {
    found.map_or_else(|| "end of line".to_owned(), |c| format!("{c:?}"))
}

/// Read position within one line
///
/// `Copy` on purpose: taking a snapshot of the cursor (to look ahead and
/// then decide) is just an assignment.
#[derive(Debug, Clone, Copy)]
pub struct Cursor<'a> {
    line: &'a [u8],
    pos: usize,
}

impl<'a> Cursor<'a> {
    /// Start scanning at the first byte of `line`
    #[must_use]
    pub const fn new(line: &'a [u8]) -> Self {
        Self { line, pos: 0 }
    }

    /// Current byte column
    #[must_use]
    pub const fn position(&self) -> usize {
        self.pos
    }

    #[must_use]
    pub const fn is_at_end(&self) -> bool {
        self.pos >= self.line.len()
    }

    /// Byte under the cursor, `None` at the end bound
    #[inline]
    #[must_use]
    pub fn peek(&self) -> Option<u8> {
        self.line.get(self.pos).copied()
    }

    /// Unscanned tail of the line
    #[must_use]
    pub fn remaining(&self) -> &'a [u8] {
        &self.line[self.pos.min(self.line.len())..]
    }

    /// Advance past consecutive ASCII spaces and return them
    ///
    /// Only `' '` counts. Tabs and other whitespace never appear in the
    /// kernel's tables and are left for the next scanner to reject. A
    /// zero-length skip is not an error.
    #[inline]
    pub fn skip_spaces(&mut self) -> &'a [u8] {
        self.take_while(|b| b == b' ')
    }

    /// Check that the byte under the cursor is `delimiter`, without moving
    ///
    /// # Errors
    ///
    /// `SyntaxError::ExpectedDelimiter` if the byte differs or the line ended.
    pub fn peek_delimiter(&self, delimiter: u8) -> Result<(), SyntaxError> {
        match self.peek() {
            Some(b) if b == delimiter => Ok(()),
            found => Err(SyntaxError::ExpectedDelimiter {
                expected: char::from(delimiter),
                found: found.map(char::from),
                at: self.pos,
            }),
        }
    }

    /// Require `delimiter` under the cursor and step past it
    ///
    /// # Errors
    ///
    /// `SyntaxError::ExpectedDelimiter` if the byte differs or the line ended.
    #[inline]
    pub fn skip_delimiter(&mut self, delimiter: u8) -> Result<(), SyntaxError> {
        self.peek_delimiter(delimiter)?;
        self.pos += 1;
        Ok(())
    }

    /// Consume a maximal run of ASCII decimal digits
    ///
    /// # Errors
    ///
    /// `SyntaxError::NoDigits` if the cursor is not on a digit.
    pub fn scan_decimal_run(&mut self) -> Result<&'a [u8], SyntaxError> {
        let at = self.pos;
        let run = self.take_while(|b| b.is_ascii_digit());
        if run.is_empty() {
            return Err(SyntaxError::NoDigits { at });
        }
        Ok(run)
    }

    /// Consume a maximal run of ASCII hex digits (either case)
    ///
    /// # Errors
    ///
    /// `SyntaxError::NoHexDigits` if the cursor is not on a hex digit.
    #[inline]
    pub fn scan_hex_run(&mut self) -> Result<&'a [u8], SyntaxError> {
        let at = self.pos;
        let run = self.take_while(|b| b.is_ascii_hexdigit());
        if run.is_empty() {
            return Err(SyntaxError::NoHexDigits { at });
        }
        Ok(run)
    }

    /// Consume one space-delimited token, `None` at end of line
    ///
    /// Used for the header line, whose column names are only logged.
    pub fn scan_token(&mut self) -> Option<&'a [u8]> {
        self.skip_spaces();
        let token = self.take_while(|b| b != b' ');
        (!token.is_empty()).then_some(token)
    }

    fn take_while(&mut self, mut accept: impl FnMut(u8) -> bool) -> &'a [u8] {
        let start = self.pos.min(self.line.len());
        let len = self.line[start..]
            .iter()
            .take_while(|&&b| accept(b))
            .count();
        self.pos = start + len;
        &self.line[start..self.pos]
    }
}
