//! Random-access byte sources and the bounded views the decoders read through.
//!
//! A [`ByteView`] is a `(base, len)` window onto a shared [`ByteSource`]. Every read
//! is validated against the window before the source is touched, so a decoder handed
//! a view can never observe bytes outside of it, whatever the source holds beyond.

use std::cell::RefCell;
use std::fmt;
use std::io::{self, Read, Seek, SeekFrom};

use crate::error::{ChunkError, ChunkResult};

/// Anything that supports reading at arbitrary absolute offsets.
pub trait ByteSource {
    /// Total number of bytes available.
    fn byte_len(&self) -> u64;

    /// Fill `buf` with the bytes starting at `offset`.
    fn read_at(&self, offset: u64, buf: &mut [u8]) -> ChunkResult<()>;
}

impl ByteSource for [u8] {
    fn byte_len(&self) -> u64 {
        self.len() as u64
    }

    fn read_at(&self, offset: u64, buf: &mut [u8]) -> ChunkResult<()> {
        let available = (self.len() as u64).saturating_sub(offset);
        if offset > self.len() as u64 || (buf.len() as u64) > available {
            fail!(TruncatedRead {
                offset,
                needed: buf.len() as u64,
                available,
            });
        }
        let start = offset as usize;
        buf.copy_from_slice(&self[start..start + buf.len()]);
        Ok(())
    }
}

impl ByteSource for Vec<u8> {
    fn byte_len(&self) -> u64 {
        self.as_slice().byte_len()
    }

    fn read_at(&self, offset: u64, buf: &mut [u8]) -> ChunkResult<()> {
        self.as_slice().read_at(offset, buf)
    }
}

impl<S: ByteSource + ?Sized> ByteSource for &S {
    fn byte_len(&self) -> u64 {
        (**self).byte_len()
    }

    fn read_at(&self, offset: u64, buf: &mut [u8]) -> ChunkResult<()> {
        (**self).read_at(offset, buf)
    }
}

/// Adapts a seekable reader (typically a file) into a [`ByteSource`].
///
/// Reads seek to the requested offset first, so the reader's own position carries
/// no meaning between calls.
pub struct SeekSource<R> {
    inner: RefCell<R>,
    len: u64,
}

impl<R: Read + Seek> SeekSource<R> {
    pub fn new(mut inner: R) -> ChunkResult<Self> {
        let len = inner.seek(SeekFrom::End(0))?;
        Ok(SeekSource {
            inner: RefCell::new(inner),
            len,
        })
    }

    pub fn into_inner(self) -> R {
        self.inner.into_inner()
    }
}

impl<R: Read + Seek> ByteSource for SeekSource<R> {
    fn byte_len(&self) -> u64 {
        self.len
    }

    fn read_at(&self, offset: u64, buf: &mut [u8]) -> ChunkResult<()> {
        let available = self.len.saturating_sub(offset);
        if offset > self.len || (buf.len() as u64) > available {
            fail!(TruncatedRead {
                offset,
                needed: buf.len() as u64,
                available,
            });
        }
        let mut inner = self.inner.borrow_mut();
        inner.seek(SeekFrom::Start(offset))?;
        inner.read_exact(buf).map_err(|err| match err.kind() {
            io::ErrorKind::UnexpectedEof => ChunkError::TruncatedRead {
                offset,
                needed: buf.len() as u64,
                available,
            },
            _ => ChunkError::Io(err),
        })
    }
}

/// A bounded window `[base, base + len)` onto a byte source.
pub struct ByteView<'a, S: ?Sized> {
    source: &'a S,
    base: u64,
    len: u64,
}

impl<S: ?Sized> Clone for ByteView<'_, S> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<S: ?Sized> Copy for ByteView<'_, S> {}

impl<S: ?Sized> fmt::Debug for ByteView<'_, S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ByteView")
            .field("base", &self.base)
            .field("len", &self.len)
            .finish()
    }
}

impl<'a, S: ByteSource + ?Sized> ByteView<'a, S> {
    /// A view spanning the whole source.
    pub fn whole(source: &'a S) -> Self {
        ByteView {
            source,
            base: 0,
            len: source.byte_len(),
        }
    }

    /// Absolute offset of the first byte of the view.
    pub fn base(&self) -> u64 {
        self.base
    }

    pub fn len(&self) -> u64 {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Absolute offset one past the last byte of the view.
    pub fn end(&self) -> u64 {
        self.base + self.len
    }

    /// A narrower view at `offset` (relative to this view) spanning `len` bytes.
    pub fn sub_view(&self, offset: u64, len: u64) -> ChunkResult<ByteView<'a, S>> {
        match offset.checked_add(len) {
            Some(end) if end <= self.len => Ok(ByteView {
                source: self.source,
                base: self.base + offset,
                len,
            }),
            _ => Err(ChunkError::BoundsViolation {
                what: "sub-view",
                offset: self.base.saturating_add(offset).saturating_add(len),
                limit: self.end(),
            }),
        }
    }

    /// Fill `buf` from `offset` (relative to this view).
    pub fn read_exact_at(&self, offset: u64, buf: &mut [u8]) -> ChunkResult<()> {
        let available = self.len.saturating_sub(offset);
        if offset > self.len || (buf.len() as u64) > available {
            fail!(TruncatedRead {
                offset: self.base.saturating_add(offset),
                needed: buf.len() as u64,
                available,
            });
        }
        self.source.read_at(self.base + offset, buf)
    }

    /// Read `count` bytes at `offset`; the length is validated before allocating.
    pub fn read_bytes(&self, offset: u64, count: u64) -> ChunkResult<Vec<u8>> {
        let available = self.len.saturating_sub(offset);
        if offset > self.len || count > available {
            fail!(TruncatedRead {
                offset: self.base.saturating_add(offset),
                needed: count,
                available,
            });
        }
        let mut buf = vec![0u8; count as usize];
        self.source.read_at(self.base + offset, &mut buf)?;
        Ok(buf)
    }

    pub fn read_u16_at(&self, offset: u64) -> ChunkResult<u16> {
        let mut raw = [0u8; 2];
        self.read_exact_at(offset, &mut raw)?;
        Ok(u16::from_le_bytes(raw))
    }

    pub fn read_u32_at(&self, offset: u64) -> ChunkResult<u32> {
        let mut raw = [0u8; 4];
        self.read_exact_at(offset, &mut raw)?;
        Ok(u32::from_le_bytes(raw))
    }

    /// A sequential reader positioned at `pos` within this view.
    pub fn reader_at(&self, pos: u64) -> ChunkResult<ViewReader<'a, S>> {
        let mut reader = ViewReader { view: *self, pos: 0 };
        reader.seek(pos)?;
        Ok(reader)
    }
}

/// Sequential little-endian reads over a [`ByteView`].
pub struct ViewReader<'a, S: ?Sized> {
    view: ByteView<'a, S>,
    pos: u64,
}

impl<'a, S: ByteSource + ?Sized> ViewReader<'a, S> {
    pub fn position(&self) -> u64 {
        self.pos
    }

    pub fn remaining(&self) -> u64 {
        self.view.len().saturating_sub(self.pos)
    }

    pub fn seek(&mut self, pos: u64) -> ChunkResult<()> {
        if pos > self.view.len() {
            fail!(BoundsViolation {
                what: "seek",
                offset: self.view.base().saturating_add(pos),
                limit: self.view.end(),
            });
        }
        self.pos = pos;
        Ok(())
    }

    pub fn read_u16(&mut self) -> ChunkResult<u16> {
        let value = self.view.read_u16_at(self.pos)?;
        self.pos += 2;
        Ok(value)
    }

    pub fn read_u32(&mut self) -> ChunkResult<u32> {
        let value = self.view.read_u32_at(self.pos)?;
        self.pos += 4;
        Ok(value)
    }

    pub fn read_bytes(&mut self, count: u64) -> ChunkResult<Vec<u8>> {
        let bytes = self.view.read_bytes(self.pos, count)?;
        self.pos += count;
        Ok(bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn view_reads_are_bounded() {
        let data: Vec<u8> = (0u8..16).collect();
        let whole = ByteView::whole(data.as_slice());
        let view = whole.sub_view(4, 4).unwrap();
        assert_eq!(view.base(), 4);
        assert_eq!(view.read_u16_at(0).unwrap(), 0x0504);
        assert_eq!(view.read_u32_at(0).unwrap(), 0x0706_0504);

        // The source has more bytes, but the view must not hand them out.
        let err = view.read_u32_at(2).unwrap_err();
        match err {
            ChunkError::TruncatedRead {
                offset,
                needed,
                available,
            } => {
                assert_eq!(offset, 6);
                assert_eq!(needed, 4);
                assert_eq!(available, 2);
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn sub_view_past_end_is_rejected() {
        let data = [0u8; 8];
        let whole = ByteView::whole(&data[..]);
        assert!(whole.sub_view(4, 4).is_ok());
        assert!(whole.sub_view(4, 5).unwrap_err().is_bounds_violation());
        assert!(whole.sub_view(u64::MAX, 2).unwrap_err().is_bounds_violation());
    }

    #[test]
    fn oversized_read_does_not_allocate() {
        let data = [0u8; 8];
        let view = ByteView::whole(&data[..]);
        assert!(view.read_bytes(0, u64::MAX).unwrap_err().is_truncated());
    }

    #[test]
    fn reader_tracks_position() {
        let data = [0x01, 0x00, 0x1c, 0x00, 0x2c, 0x00, 0x00, 0x00];
        let view = ByteView::whole(&data[..]);
        let mut reader = view.reader_at(0).unwrap();
        assert_eq!(reader.read_u16().unwrap(), 0x0001);
        assert_eq!(reader.read_u16().unwrap(), 0x001c);
        assert_eq!(reader.read_u32().unwrap(), 0x2c);
        assert_eq!(reader.remaining(), 0);
        assert!(reader.read_u16().is_err());
        assert!(reader.seek(9).is_err());
    }

    #[test]
    fn seek_source_matches_slice() {
        let data: Vec<u8> = (0u8..32).collect();
        let source = SeekSource::new(Cursor::new(data.clone())).unwrap();
        assert_eq!(source.byte_len(), 32);

        let mut from_file = [0u8; 6];
        let mut from_slice = [0u8; 6];
        source.read_at(10, &mut from_file).unwrap();
        data.read_at(10, &mut from_slice).unwrap();
        assert_eq!(from_file, from_slice);

        let mut past_end = [0u8; 4];
        assert!(source.read_at(30, &mut past_end).unwrap_err().is_truncated());
    }
}
