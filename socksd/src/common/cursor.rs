use bytes::{Buf, Bytes};
use thiserror::Error;

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Endian {
    Big,
    Little,
}

#[derive(Debug, Error, PartialEq)]
#[error("Needed {needed} more byte(s) at offset {offset}, but only {remaining} remain.")]
pub struct CursorError {
    pub offset: usize,
    pub needed: usize,
    pub remaining: usize,
}

/// Sequential reader over a fixed frame.
///
/// Every read advances the cursor. A read that would run past the end of the
/// frame fails without consuming anything.
#[derive(Clone, Debug)]
pub struct ByteCursor {
    buffer: Bytes,
    offset: usize,
    last_u8: Option<u8>,
}

impl ByteCursor {
    pub fn new<B: Into<Bytes>>(buffer: B) -> Self {
        ByteCursor {
            buffer: buffer.into(),
            offset: 0,
            last_u8: None,
        }
    }

    pub fn offset(&self) -> usize {
        self.offset
    }

    pub fn remaining(&self) -> usize {
        self.buffer.remaining()
    }

    pub fn read_u8(&mut self) -> Result<u8, CursorError> {
        self.ensure(1)?;
        self.offset += 1;

        let value = self.buffer.get_u8();
        self.last_u8 = Some(value);

        Ok(value)
    }

    pub fn read_u16(
        &mut self,
        endian: Endian,
    ) -> Result<u16, CursorError> {
        self.ensure(2)?;
        self.offset += 2;

        Ok(match endian {
            Endian::Big => self.buffer.get_u16(),
            Endian::Little => self.buffer.get_u16_le(),
        })
    }

    pub fn read_u32(
        &mut self,
        endian: Endian,
    ) -> Result<u32, CursorError> {
        self.ensure(4)?;
        self.offset += 4;

        Ok(match endian {
            Endian::Big => self.buffer.get_u32(),
            Endian::Little => self.buffer.get_u32_le(),
        })
    }

    /// Extracts `length` raw bytes as a sub-buffer, without copying.
    pub fn read_bytes(
        &mut self,
        length: usize,
    ) -> Result<Bytes, CursorError> {
        self.ensure(length)?;
        self.offset += length;

        Ok(self.buffer.split_to(length))
    }

    /// Extracts as many raw bytes as the preceding `read_u8` announced,
    /// the way ULEN/PLEN and the domain length prefix work.
    pub fn read_prefixed(&mut self) -> Result<Bytes, CursorError> {
        let length = self.last_u8.take().unwrap_or(0) as usize;
        self.read_bytes(length)
    }

    fn ensure(
        &self,
        needed: usize,
    ) -> Result<(), CursorError> {
        if self.buffer.remaining() < needed {
            return Err(CursorError {
                offset: self.offset,
                needed,
                remaining: self.buffer.remaining(),
            });
        }

        Ok(())
    }
}
