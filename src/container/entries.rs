//! Container entry streams.
//!
//! Container technologies plug into identification through
//! [`ContainerEntryIterator`]: it walks the entries of one container once,
//! handing each to a visitor together with lazily loadable content. The
//! visitor loads content only for entries that need a binary match and can
//! stop the walk early.

use std::io::Read;
use std::ops::ControlFlow;

use super::model::ContainerType;
use crate::Result;
use crate::source::ByteSource;

/// One entry of a container.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerEntry {
    /// Entry path inside the container, `/`-separated.
    pub path: String,
    /// True for directory entries.
    pub is_directory: bool,
    /// Uncompressed size, when the container records it.
    pub size: Option<u64>,
}

impl ContainerEntry {
    /// Creates a file entry.
    pub fn file(path: impl Into<String>, size: Option<u64>) -> Self {
        Self {
            path: path.into(),
            is_directory: false,
            size,
        }
    }

    /// Creates a directory entry.
    pub fn directory(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            is_directory: true,
            size: None,
        }
    }
}

/// Leading bytes of an entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadedContent {
    /// The bytes read.
    pub bytes: Vec<u8>,
    /// True if `bytes` is the whole entry.
    pub complete: bool,
}

/// Lazily loaded entry content.
pub trait EntryContent {
    /// Reads the whole entry.
    fn load(&mut self) -> Result<Vec<u8>>;

    /// Reads at most `max` bytes from the start of the entry.
    fn load_at_most(&mut self, max: u64) -> Result<LoadedContent>;
}

impl<R: Read> EntryContent for R {
    fn load(&mut self) -> Result<Vec<u8>> {
        let mut buf = Vec::new();
        self.read_to_end(&mut buf)?;
        Ok(buf)
    }

    fn load_at_most(&mut self, max: u64) -> Result<LoadedContent> {
        let mut bytes = Vec::new();
        self.by_ref().take(max).read_to_end(&mut bytes)?;
        // One byte past the limit tells a short entry from a cut one.
        let complete = (bytes.len() as u64) < max || self.read(&mut [0u8; 1])? == 0;
        Ok(LoadedContent { bytes, complete })
    }
}

/// Callback receiving each entry and its content accessor.
pub type EntryVisitor<'v> =
    dyn FnMut(&ContainerEntry, &mut dyn EntryContent) -> Result<ControlFlow<()>> + 'v;

/// Walks the entries of one container.
pub trait ContainerEntryIterator {
    /// Container technology of this iterator.
    fn container_type(&self) -> ContainerType;

    /// Calls `visitor` for each entry in container order until it returns
    /// [`ControlFlow::Break`] or the entries run out.
    fn for_each_entry(&mut self, visitor: &mut EntryVisitor<'_>) -> Result<()>;
}

/// Opens entry iterators over container resources of one type.
pub trait ContainerOpener: Send + Sync {
    /// Container technology handled.
    fn container_type(&self) -> ContainerType;

    /// Opens `source` as a container.
    fn open<'s>(&self, source: &'s dyn ByteSource) -> Result<Box<dyn ContainerEntryIterator + 's>>;
}

/// A container held entirely in memory.
///
/// Useful for feeding entries produced by an external archive reader, and
/// in tests.
#[derive(Debug, Clone)]
pub struct MemoryContainer {
    container_type: ContainerType,
    entries: Vec<(ContainerEntry, Vec<u8>)>,
}

impl MemoryContainer {
    /// Creates an empty container.
    pub fn new(container_type: ContainerType) -> Self {
        Self {
            container_type,
            entries: Vec::new(),
        }
    }

    /// Appends a file entry.
    pub fn with_file(mut self, path: impl Into<String>, content: impl Into<Vec<u8>>) -> Self {
        self.push_file(path, content);
        self
    }

    /// Appends a directory entry.
    pub fn with_directory(mut self, path: impl Into<String>) -> Self {
        self.entries.push((ContainerEntry::directory(path), Vec::new()));
        self
    }

    /// Appends a file entry.
    pub fn push_file(&mut self, path: impl Into<String>, content: impl Into<Vec<u8>>) {
        let content = content.into();
        let entry = ContainerEntry::file(path, Some(content.len() as u64));
        self.entries.push((entry, content));
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if there are no entries.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl ContainerEntryIterator for MemoryContainer {
    fn container_type(&self) -> ContainerType {
        self.container_type.clone()
    }

    fn for_each_entry(&mut self, visitor: &mut EntryVisitor<'_>) -> Result<()> {
        for (entry, content) in &self.entries {
            let mut reader: &[u8] = content;
            if visitor(entry, &mut reader)?.is_break() {
                break;
            }
        }
        Ok(())
    }
}
