use crate::boxes::FourCC;
use crate::error::{ParseError, Result};
use byteorder::{BigEndian, ReadBytesExt};
use std::io::{Cursor, ErrorKind, Read, Seek, SeekFrom};

/// Sequential big-endian reader over a seekable byte source.
///
/// The cursor learns the source length once at construction and tracks its own
/// position, so every read or skip can be checked against the bytes actually
/// available before touching the source. A request that cannot be satisfied
/// fails with [`ParseError::ShortRead`] and leaves the position unchanged.
pub struct ByteCursor<R> {
    inner: R,
    pos: u64,
    len: u64,
}

/// Cursor over a payload that has already been pulled into memory.
pub type PayloadCursor<'a> = ByteCursor<Cursor<&'a [u8]>>;

impl<R: Read + Seek> ByteCursor<R> {
    pub fn new(mut inner: R) -> Result<Self> {
        let pos = inner.stream_position()?;
        let len = inner.seek(SeekFrom::End(0))?;
        inner.seek(SeekFrom::Start(pos))?;
        Ok(ByteCursor { inner, pos, len })
    }

    pub fn position(&self) -> u64 {
        self.pos
    }

    pub fn remaining(&self) -> u64 {
        self.len.saturating_sub(self.pos)
    }

    pub fn is_at_end(&self) -> bool {
        self.remaining() == 0
    }

    fn ensure(&self, wanted: u64) -> Result<()> {
        let available = self.remaining();
        if wanted > available {
            return Err(ParseError::ShortRead {
                offset: self.pos,
                wanted,
                available,
            });
        }
        Ok(())
    }

    fn short_read(&self, wanted: u64, e: std::io::Error) -> ParseError {
        if e.kind() == ErrorKind::UnexpectedEof {
            ParseError::ShortRead {
                offset: self.pos,
                wanted,
                available: 0,
            }
        } else {
            ParseError::Io(e)
        }
    }

    pub fn read_u16(&mut self) -> Result<u16> {
        self.ensure(2)?;
        let v = self
            .inner
            .read_u16::<BigEndian>()
            .map_err(|e| self.short_read(2, e))?;
        self.pos += 2;
        Ok(v)
    }

    pub fn read_u32(&mut self) -> Result<u32> {
        self.ensure(4)?;
        let v = self
            .inner
            .read_u32::<BigEndian>()
            .map_err(|e| self.short_read(4, e))?;
        self.pos += 4;
        Ok(v)
    }

    pub fn read_u64(&mut self) -> Result<u64> {
        self.ensure(8)?;
        let v = self
            .inner
            .read_u64::<BigEndian>()
            .map_err(|e| self.short_read(8, e))?;
        self.pos += 8;
        Ok(v)
    }

    pub fn read_i16(&mut self) -> Result<i16> {
        Ok(self.read_u16()? as i16)
    }

    pub fn read_i32(&mut self) -> Result<i32> {
        Ok(self.read_u32()? as i32)
    }

    pub fn read_fourcc(&mut self) -> Result<FourCC> {
        let mut b = [0u8; 4];
        self.read_exact(&mut b)?;
        Ok(FourCC(b))
    }

    pub fn read_bytes(&mut self, n: usize) -> Result<Vec<u8>> {
        self.ensure(n as u64)?;
        let mut v = vec![0u8; n];
        self.read_exact(&mut v)?;
        Ok(v)
    }

    fn read_exact(&mut self, buf: &mut [u8]) -> Result<()> {
        let wanted = buf.len() as u64;
        self.ensure(wanted)?;
        self.inner
            .read_exact(buf)
            .map_err(|e| self.short_read(wanted, e))?;
        self.pos += wanted;
        Ok(())
    }

    /// Advance by `n` bytes with a seek, never materializing them.
    ///
    /// Uses a relative seek so a `BufReader` can keep its buffer when the
    /// target is already buffered.
    pub fn skip(&mut self, n: u64) -> Result<()> {
        self.ensure(n)?;
        let target = self.pos + n;
        match i64::try_from(n) {
            Ok(delta) => self.inner.seek_relative(delta)?,
            Err(_) => {
                self.inner.seek(SeekFrom::Start(target))?;
            }
        }
        self.pos = target;
        Ok(())
    }
}

impl<'a> PayloadCursor<'a> {
    pub fn from_slice(buf: &'a [u8]) -> Self {
        ByteCursor {
            inner: Cursor::new(buf),
            pos: 0,
            len: buf.len() as u64,
        }
    }
}
