//! `Read + Seek` adapter over a byte source.

use std::io::{self, Read, Seek, SeekFrom};

use super::ByteSource;

/// Adapts a [`ByteSource`] to [`Read`] and [`Seek`].
///
/// Archive readers that expect a seekable stream, such as the ZIP reader,
/// consume a resource through this adapter.
#[derive(Debug)]
pub struct SourceReader<S> {
    source: S,
    position: u64,
}

impl<S: ByteSource> SourceReader<S> {
    /// Creates a reader positioned at the start of `source`.
    pub fn new(source: S) -> Self {
        Self {
            source,
            position: 0,
        }
    }

    /// Returns the current position.
    pub fn position(&self) -> u64 {
        self.position
    }

    /// Consumes the reader, returning the source.
    pub fn into_inner(self) -> S {
        self.source
    }
}

impl<S: ByteSource> Read for SourceReader<S> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let chunk = self.source.read(self.position, buf.len())?;
        let n = chunk.len();
        buf[..n].copy_from_slice(&chunk);
        self.position += n as u64;
        Ok(n)
    }
}

impl<S: ByteSource> Seek for SourceReader<S> {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        let target = match pos {
            SeekFrom::Start(offset) => Some(offset),
            SeekFrom::End(delta) => self.source.len().checked_add_signed(delta),
            SeekFrom::Current(delta) => self.position.checked_add_signed(delta),
        };
        match target {
            Some(position) => {
                self.position = position;
                Ok(position)
            }
            None => Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "seek to a negative or overflowing position",
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::MemorySource;

    #[test]
    fn test_read_and_seek() {
        let source = MemorySource::new(&b"0123456789"[..]);
        let mut reader = SourceReader::new(&source);

        let mut buf = [0u8; 4];
        assert_eq!(reader.read(&mut buf).unwrap(), 4);
        assert_eq!(&buf, b"0123");

        reader.seek(SeekFrom::End(-2)).unwrap();
        let mut rest = Vec::new();
        reader.read_to_end(&mut rest).unwrap();
        assert_eq!(rest, b"89");

        reader.seek(SeekFrom::Current(-5)).unwrap();
        assert_eq!(reader.position(), 5);
    }

    #[test]
    fn test_seek_before_start_fails() {
        let source = MemorySource::new(&b"abc"[..]);
        let mut reader = SourceReader::new(&source);
        assert!(reader.seek(SeekFrom::Current(-1)).is_err());
    }

    #[test]
    fn test_read_at_end_returns_zero() {
        let source = MemorySource::new(&b"abc"[..]);
        let mut reader = SourceReader::new(&source);
        reader.seek(SeekFrom::Start(10)).unwrap();
        let mut buf = [0u8; 2];
        assert_eq!(reader.read(&mut buf).unwrap(), 0);
    }
}
