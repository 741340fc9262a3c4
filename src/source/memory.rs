//! In-memory byte source.

use std::borrow::Cow;
use std::io;

use super::ByteSource;

/// A [`ByteSource`] over bytes held in memory.
///
/// Borrows or owns its data. Container entry content is loaded into owned
/// memory sources before nested signatures are evaluated.
#[derive(Debug, Clone)]
pub struct MemorySource<'a> {
    data: Cow<'a, [u8]>,
    name: Option<String>,
}

impl<'a> MemorySource<'a> {
    /// Creates a source over `data`.
    pub fn new(data: impl Into<Cow<'a, [u8]>>) -> Self {
        Self {
            data: data.into(),
            name: None,
        }
    }

    /// Attaches a resource name.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Returns the underlying bytes.
    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }
}

impl ByteSource for MemorySource<'_> {
    fn len(&self) -> u64 {
        self.data.len() as u64
    }

    fn read(&self, offset: u64, length: usize) -> io::Result<Cow<'_, [u8]>> {
        let len = self.data.len();
        let start = usize::try_from(offset).unwrap_or(usize::MAX).min(len);
        let end = start.saturating_add(length).min(len);
        Ok(Cow::Borrowed(&self.data[start..end]))
    }

    fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_read_within_bounds() {
        let source = MemorySource::new(&b"hello world"[..]);
        assert_eq!(&*source.read(6, 5).unwrap(), b"world");
        assert!(matches!(source.read(0, 1).unwrap(), Cow::Borrowed(_)));
    }

    #[test]
    fn test_read_past_end_is_short() {
        let source = MemorySource::new(vec![0xAAu8; 4]);
        assert_eq!(source.read(2, 10).unwrap().len(), 2);
        assert!(source.read(4, 1).unwrap().is_empty());
        assert!(source.read(u64::MAX, 1).unwrap().is_empty());
    }

    #[test]
    fn test_empty_source() {
        let source = MemorySource::new(Vec::new());
        assert!(source.is_empty());
        assert!(source.read(0, 8).unwrap().is_empty());
        assert_eq!(source.name(), None);
    }
}
