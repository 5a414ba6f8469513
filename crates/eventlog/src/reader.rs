//! Bounded little-endian cursor over a byte slice.
//!
//! Every read checks the remaining length first, so a malformed size field
//! surfaces as [`Truncated`] instead of an out-of-bounds access.

use byteorder::{LittleEndian, ReadBytesExt};

use crate::error::Truncated;

#[derive(Debug, Clone)]
pub struct ByteReader<'a> {
    buf: &'a [u8],
    offset: usize,
}

impl<'a> ByteReader<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        Self { buf, offset: 0 }
    }

    /// Bytes consumed so far.
    pub fn offset(&self) -> usize {
        self.offset
    }

    pub fn remaining(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    fn ensure(&self, needed: usize) -> Result<(), Truncated> {
        if self.buf.len() < needed {
            return Err(Truncated {
                offset: self.offset,
                needed,
                remaining: self.buf.len(),
            });
        }
        Ok(())
    }

    pub fn read_u8(&mut self) -> Result<u8, Truncated> {
        self.ensure(1)?;
        self.offset += 1;
        self.buf.read_u8().map_err(|_| self.truncated(1))
    }

    pub fn read_u16(&mut self) -> Result<u16, Truncated> {
        self.ensure(2)?;
        self.offset += 2;
        self.buf.read_u16::<LittleEndian>().map_err(|_| self.truncated(2))
    }

    pub fn read_u32(&mut self) -> Result<u32, Truncated> {
        self.ensure(4)?;
        self.offset += 4;
        self.buf.read_u32::<LittleEndian>().map_err(|_| self.truncated(4))
    }

    pub fn read_u64(&mut self) -> Result<u64, Truncated> {
        self.ensure(8)?;
        self.offset += 8;
        self.buf.read_u64::<LittleEndian>().map_err(|_| self.truncated(8))
    }

    /// Borrow the next `len` bytes without copying.
    pub fn read_bytes(&mut self, len: usize) -> Result<&'a [u8], Truncated> {
        self.ensure(len)?;
        let (head, tail) = self.buf.split_at(len);
        self.buf = tail;
        self.offset += len;
        Ok(head)
    }

    pub fn read_array<const N: usize>(&mut self) -> Result<[u8; N], Truncated> {
        let bytes = self.read_bytes(N)?;
        let mut out = [0u8; N];
        out.copy_from_slice(bytes);
        Ok(out)
    }

    pub fn skip(&mut self, len: usize) -> Result<(), Truncated> {
        self.read_bytes(len).map(|_| ())
    }

    /// Everything not yet consumed.
    pub fn rest(&mut self) -> &'a [u8] {
        let rest = self.buf;
        self.offset += rest.len();
        self.buf = &[];
        rest
    }

    fn truncated(&self, needed: usize) -> Truncated {
        Truncated {
            offset: self.offset,
            needed,
            remaining: self.buf.len(),
        }
    }
}
