//! Sequential byte source with bounded seeks and fixed-size reads.

use std::fs::File;
use std::io::{BufReader, Read, Seek, SeekFrom};
use std::path::Path;

use byteorder::{LittleEndian, ReadBytesExt};

use crate::error::{Error, Result};
use crate::util::NAME_LEN;

/// A read-only cursor over a Mach-O file.
///
/// All multi-byte integers are decoded as little-endian, one field at a time.
/// The source length is captured up front so that seeks and variable-length
/// reads can be checked against the end of the file before they happen.
#[derive(Debug)]
pub struct ByteReader<R> {
    inner: R,
    len: u64,
}

impl ByteReader<BufReader<File>> {
    /// Opens a file for reading.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let file = File::open(path).map_err(|e| Error::FileOpen {
            path: path.to_path_buf(),
            source: e,
        })?;
        Self::new(BufReader::new(file))
    }
}

impl<R: Read + Seek> ByteReader<R> {
    /// Wraps a seekable source. The cursor is left at offset 0.
    pub fn new(mut inner: R) -> Result<Self> {
        let len = inner.seek(SeekFrom::End(0))?;
        inner.seek(SeekFrom::Start(0))?;
        Ok(Self { inner, len })
    }

    /// Total length of the source in bytes.
    #[inline]
    pub fn len(&self) -> u64 {
        self.len
    }

    /// Returns true if the source is empty.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Returns the current absolute offset.
    pub fn tell(&mut self) -> Result<u64> {
        Ok(self.inner.stream_position()?)
    }

    /// Moves the cursor to an absolute offset.
    ///
    /// Seeking exactly to the end is allowed; anything past it is an error.
    pub fn seek_to(&mut self, offset: u64) -> Result<()> {
        if offset > self.len {
            return Err(Error::out_of_bounds(offset, self.len));
        }
        self.inner.seek(SeekFrom::Start(offset))?;
        Ok(())
    }

    /// Returns the number of bytes between the cursor and the end.
    pub fn remaining(&mut self) -> Result<u64> {
        let pos = self.tell()?;
        Ok(self.len.saturating_sub(pos))
    }

    /// Reads a little-endian u32.
    #[inline]
    pub fn read_u32(&mut self) -> Result<u32> {
        Ok(self.inner.read_u32::<LittleEndian>()?)
    }

    /// Reads a little-endian u64.
    #[inline]
    pub fn read_u64(&mut self) -> Result<u64> {
        Ok(self.inner.read_u64::<LittleEndian>()?)
    }

    /// Reads exactly `N` bytes.
    pub fn read_array<const N: usize>(&mut self) -> Result<[u8; N]> {
        let mut buf = [0u8; N];
        self.inner.read_exact(&mut buf)?;
        Ok(buf)
    }

    /// Reads a fixed-width, NUL-padded name field.
    #[inline]
    pub fn read_name(&mut self) -> Result<[u8; NAME_LEN]> {
        self.read_array::<NAME_LEN>()
    }

    /// Reads exactly `len` bytes into a new buffer.
    ///
    /// The range is checked against the source length before anything is
    /// allocated, so an absurd declared size fails fast.
    pub fn read_bytes(&mut self, len: u64) -> Result<Vec<u8>> {
        let pos = self.tell()?;
        let end = pos
            .checked_add(len)
            .ok_or_else(|| Error::out_of_bounds(u64::MAX, self.len))?;
        if end > self.len {
            return Err(Error::out_of_bounds(end, self.len));
        }
        let mut buf = vec![0u8; len as usize];
        self.inner.read_exact(&mut buf)?;
        Ok(buf)
    }
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use super::*;

    fn reader(bytes: &[u8]) -> ByteReader<Cursor<Vec<u8>>> {
        ByteReader::new(Cursor::new(bytes.to_vec())).unwrap()
    }

    #[test]
    fn test_little_endian_fields() {
        let mut r = reader(&[0xCF, 0xFA, 0xED, 0xFE, 1, 2, 3, 4, 5, 6, 7, 8]);
        assert_eq!(r.read_u32().unwrap(), 0xFEEDFACF);
        assert_eq!(r.read_u64().unwrap(), 0x0807060504030201);
        assert_eq!(r.tell().unwrap(), 12);
        assert_eq!(r.remaining().unwrap(), 0);
    }

    #[test]
    fn test_seek_bounds() {
        let mut r = reader(&[0u8; 16]);
        assert_eq!(r.len(), 16);
        r.seek_to(16).unwrap();
        assert!(matches!(
            r.seek_to(17),
            Err(Error::OutOfBounds { offset: 17, len: 16 })
        ));
        r.seek_to(4).unwrap();
        assert_eq!(r.tell().unwrap(), 4);
    }

    #[test]
    fn test_short_read_is_error() {
        let mut r = reader(&[1, 2]);
        assert!(matches!(r.read_u32(), Err(Error::Io(_))));
    }

    #[test]
    fn test_read_bytes_checks_length_first() {
        let mut r = reader(b"abcdef");
        r.seek_to(2).unwrap();
        assert_eq!(r.read_bytes(3).unwrap(), b"cde");
        assert!(matches!(r.read_bytes(u64::MAX), Err(Error::OutOfBounds { .. })));
        assert!(matches!(r.read_bytes(2), Err(Error::OutOfBounds { .. })));
        assert_eq!(r.read_bytes(0).unwrap(), Vec::<u8>::new());
    }
}
