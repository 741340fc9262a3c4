//! Random-access byte sources.
//!
//! A [`ByteSource`] is a read-only view over the bytes of one resource. It
//! has no cursor: every read names its own offset, measured from the start
//! or from the end of the resource. Sources are owned by a single
//! identification request and are not shared between threads.
//!
//! Implementations:
//!
//! - [`MemorySource`]: bytes already in memory, such as loaded container entries
//! - [`FileSource`]: a file on disk, read in cached windows
//! - [`SourceReader`]: adapts any source to [`std::io::Read`] + [`std::io::Seek`]

mod file;
mod memory;
mod reader;

pub use file::FileSource;
pub use memory::MemorySource;
pub use reader::SourceReader;

use std::borrow::Cow;
use std::io;

/// Reference point for an offset.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadOrigin {
    /// Offset counts forward from the first byte.
    Start,
    /// Offset counts backward from one past the last byte.
    End,
}

/// Read-only random access over the bytes of one resource.
pub trait ByteSource {
    /// Total length in bytes.
    fn len(&self) -> u64;

    /// Reads up to `length` bytes starting at `offset`.
    ///
    /// Returns fewer bytes when the range runs past the end, and an empty
    /// slice when `offset` is at or beyond the end.
    fn read(&self, offset: u64, length: usize) -> io::Result<Cow<'_, [u8]>>;

    /// Name identifying the resource, usually its file name.
    fn name(&self) -> Option<&str> {
        None
    }

    /// Returns true if the source has no bytes.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Reads up to `length` bytes at an offset relative to `origin`.
    ///
    /// With [`ReadOrigin::End`], `offset` is the distance from the end of
    /// the resource to the start of the range. Offsets reaching before the
    /// first byte are clamped to it.
    fn read_from(&self, origin: ReadOrigin, offset: u64, length: usize) -> io::Result<Cow<'_, [u8]>> {
        match origin {
            ReadOrigin::Start => self.read(offset, length),
            ReadOrigin::End => {
                let len = self.len();
                let start = len.saturating_sub(offset);
                let available = usize::try_from(len - start).unwrap_or(usize::MAX);
                self.read(start, length.min(available))
            }
        }
    }
}

impl<S: ByteSource + ?Sized> ByteSource for &S {
    fn len(&self) -> u64 {
        (**self).len()
    }

    fn read(&self, offset: u64, length: usize) -> io::Result<Cow<'_, [u8]>> {
        (**self).read(offset, length)
    }

    fn name(&self) -> Option<&str> {
        (**self).name()
    }
}

impl<S: ByteSource + ?Sized> ByteSource for Box<S> {
    fn len(&self) -> u64 {
        (**self).len()
    }

    fn read(&self, offset: u64, length: usize) -> io::Result<Cow<'_, [u8]>> {
        (**self).read(offset, length)
    }

    fn name(&self) -> Option<&str> {
        (**self).name()
    }
}

/// Returns the final path component of a resource name.
pub(crate) fn file_name_of(name: &str) -> &str {
    name.rsplit(['/', '\\']).next().unwrap_or(name)
}
