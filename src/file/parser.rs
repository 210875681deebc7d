//! Cursor-based reader for PE structures and stub bytes.
//!
//! [`crate::file::parser::Parser`] wraps a byte slice and a position. Header records are
//! read field by field in declaration order, so a parse routine reads like the layout it
//! decodes. Every read is bounds-checked and fails with [`crate::Error::TruncatedImage`]
//! carrying the absolute position of the failed access.
//!
//! # Key Components
//!
//! ## Navigation
//! - [`crate::file::parser::Parser::seek`] - Move to a specific position
//! - [`crate::file::parser::Parser::advance_by`] - Skip reserved or ignored fields
//! - [`crate::file::parser::Parser::pos`] - Current position
//!
//! ## Data Access
//! - [`crate::file::parser::Parser::read_le`] - Read primitive types (little-endian)
//! - [`crate::file::parser::Parser::peek_byte`] - Inspect the next byte without consuming it
//! - [`crate::file::parser::Parser::read_bytes`] - Borrow a raw chunk
//! - [`crate::file::parser::Parser::read_cstr`] - Borrow a NUL-terminated ASCII name
//!
//! # Examples
//!
//! ```rust
//! use ntsyscall::Parser;
//!
//! let data = [0x4D, 0x5A, 0x90, 0x00, b'N', b't', 0x00];
//! let mut parser = Parser::new(&data);
//!
//! assert_eq!(parser.read_le::<u16>()?, 0x5A4D);
//! parser.advance_by(2)?;
//! assert_eq!(parser.read_cstr()?, b"Nt");
//! assert_eq!(parser.pos(), data.len());
//! # Ok::<(), ntsyscall::Error>(())
//! ```

use crate::{
    file::io::{read_le_at, ByteIO},
    Result,
};

/// A bounds-checked cursor over a borrowed byte slice.
///
/// Slices returned by [`Parser::read_bytes`] and [`Parser::read_cstr`] borrow from the
/// underlying data, not from the parser, so they outlive the cursor.
pub struct Parser<'a> {
    data: &'a [u8],
    position: usize,
}

impl<'a> Parser<'a> {
    /// Create a new `Parser` positioned at the start of `data`.
    #[must_use]
    pub fn new(data: &'a [u8]) -> Self {
        Parser { data, position: 0 }
    }

    /// Move the cursor to `pos`.
    ///
    /// Seeking to exactly `len()` is allowed; any further read then fails.
    ///
    /// # Errors
    /// Returns [`crate::Error::TruncatedImage`] if `pos` lies past the end of the data.
    pub fn seek(&mut self, pos: usize) -> Result<()> {
        if pos > self.data.len() {
            return Err(truncated_error!(pos, 0));
        }

        self.position = pos;
        Ok(())
    }

    /// Move the cursor forward by `step` bytes.
    ///
    /// # Errors
    /// Returns [`crate::Error::TruncatedImage`] if fewer than `step` bytes remain.
    pub fn advance_by(&mut self, step: usize) -> Result<()> {
        self.position = self.calc_end_position(step)?;
        Ok(())
    }

    /// Current position of the cursor.
    #[must_use]
    pub fn pos(&self) -> usize {
        self.position
    }

    /// Return the next byte without advancing.
    ///
    /// # Errors
    /// Returns [`crate::Error::TruncatedImage`] at the end of the data.
    pub fn peek_byte(&self) -> Result<u8> {
        match self.data.get(self.position) {
            Some(byte) => Ok(*byte),
            None => Err(truncated_error!(self.position, 1)),
        }
    }

    /// Read a `T` in little-endian format and advance past it.
    ///
    /// # Errors
    /// Returns [`crate::Error::TruncatedImage`] if the value does not fit.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use ntsyscall::Parser;
    /// let data = [0x50, 0x45, 0x00, 0x00];
    /// let mut parser = Parser::new(&data);
    ///
    /// assert_eq!(parser.read_le::<u32>()?, 0x0000_4550);
    /// assert_eq!(parser.pos(), 4);
    /// # Ok::<(), ntsyscall::Error>(())
    /// ```
    pub fn read_le<T: ByteIO>(&mut self) -> Result<T> {
        read_le_at::<T>(self.data, &mut self.position)
    }

    /// Position after `length` more bytes, checked for overflow and bounds.
    ///
    /// # Errors
    /// Returns [`crate::Error::TruncatedImage`] if the range leaves the data.
    pub fn calc_end_position(&self, length: usize) -> Result<usize> {
        let Some(end) = self.position.checked_add(length) else {
            return Err(truncated_error!(self.position, length));
        };

        if end > self.data.len() {
            return Err(truncated_error!(self.position, length));
        }

        Ok(end)
    }

    /// Borrow `length` bytes and advance past them.
    ///
    /// # Errors
    /// Returns [`crate::Error::TruncatedImage`] if fewer than `length` bytes remain.
    pub fn read_bytes(&mut self, length: usize) -> Result<&'a [u8]> {
        let end = self.calc_end_position(length)?;
        let bytes = &self.data[self.position..end];
        self.position = end;
        Ok(bytes)
    }

    /// Borrow a NUL-terminated byte string (without the terminator) and advance past the
    /// terminator.
    ///
    /// Unlike a file-format string table, an unterminated name running into the end of the
    /// image is an error here: export names are always terminated.
    ///
    /// # Errors
    /// Returns [`crate::Error::TruncatedImage`] if no terminator is found.
    pub fn read_cstr(&mut self) -> Result<&'a [u8]> {
        let start = self.position;
        let tail = self.data.get(start..).unwrap_or_default();

        let Some(len) = tail.iter().position(|byte| *byte == 0) else {
            return Err(truncated_error!(start, tail.len() + 1));
        };

        self.position = start + len + 1;
        Ok(&tail[..len])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Error;

    #[test]
    fn sequential_reads() {
        let data = [0x0B, 0x02, 0x0E, 0x22, 0x00, 0x10, 0x00, 0x00];
        let mut parser = Parser::new(&data);

        assert_eq!(parser.read_le::<u16>().unwrap(), 0x020B);
        assert_eq!(parser.read_le::<u8>().unwrap(), 0x0E);
        assert_eq!(parser.read_le::<u8>().unwrap(), 0x22);
        assert_eq!(parser.read_le::<u32>().unwrap(), 0x1000);
        assert_eq!(parser.pos(), data.len());
        assert!(parser.read_le::<u8>().is_err());
    }

    #[test]
    fn truncated_read_reports_position() {
        let data = [0x01, 0x02, 0x03];
        let mut parser = Parser::new(&data);
        parser.advance_by(2).unwrap();

        assert!(matches!(
            parser.read_le::<u16>(),
            Err(Error::TruncatedImage { offset: 2, len: 2 })
        ));
        assert_eq!(parser.pos(), 2);
    }

    #[test]
    fn advance_by_bounds() {
        let data = [0u8; 4];
        let mut parser = Parser::new(&data);

        parser.advance_by(3).unwrap();
        assert_eq!(parser.pos(), 3);
        assert!(matches!(
            parser.advance_by(2),
            Err(Error::TruncatedImage { offset: 3, len: 2 })
        ));
        assert_eq!(parser.pos(), 3);
        assert!(parser.advance_by(usize::MAX).is_err());
        parser.advance_by(1).unwrap();
        assert_eq!(parser.pos(), 4);
    }

    #[test]
    fn seek_bounds() {
        let data = [0u8; 4];
        let mut parser = Parser::new(&data);

        assert!(parser.seek(4).is_ok());
        assert!(parser.peek_byte().is_err());
        assert!(parser.seek(5).is_err());
        assert_eq!(parser.pos(), 4);
    }

    #[test]
    fn peek_does_not_advance() {
        let data = [0xB8, 0x0F, 0x00, 0x00, 0x00];
        let parser = Parser::new(&data);

        assert_eq!(parser.peek_byte().unwrap(), 0xB8);
        assert_eq!(parser.peek_byte().unwrap(), 0xB8);
        assert_eq!(parser.pos(), 0);
    }

    #[test]
    fn read_bytes_borrows_underlying_data() {
        let data = [0x0F, 0x05, 0xC3];
        let chunk = {
            let mut parser = Parser::new(&data);
            parser.read_bytes(2).unwrap()
        };
        assert_eq!(chunk, &[0x0F, 0x05]);

        let mut parser = Parser::new(&data);
        assert!(parser.read_bytes(4).is_err());
    }

    #[test]
    fn read_cstr_names() {
        let data = b"NtClose\0NtReadFile\0";
        let mut parser = Parser::new(data);

        assert_eq!(parser.read_cstr().unwrap(), b"NtClose");
        assert_eq!(parser.read_cstr().unwrap(), b"NtReadFile");
        assert_eq!(parser.pos(), data.len());
    }

    #[test]
    fn read_cstr_unterminated() {
        let data = b"NtClo";
        let mut parser = Parser::new(data);

        assert!(matches!(
            parser.read_cstr(),
            Err(Error::TruncatedImage { offset: 0, .. })
        ));
        assert_eq!(parser.pos(), 0);
    }

    #[test]
    fn read_cstr_empty_name() {
        let data = [0u8, b'A', 0];
        let mut parser = Parser::new(&data);

        assert_eq!(parser.read_cstr().unwrap(), b"");
        assert_eq!(parser.pos(), 1);
    }
}
