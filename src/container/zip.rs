//! ZIP container entries.

use std::io::{Read, Seek};
use std::ops::ControlFlow;

use zip::ZipArchive;
use zip::result::ZipError;

use super::entries::{ContainerEntry, ContainerEntryIterator, ContainerOpener, EntryVisitor};
use super::model::ContainerType;
use crate::source::{ByteSource, SourceReader};
use crate::{Error, Result};

fn zip_error(err: ZipError) -> Error {
    match err {
        ZipError::Io(e) => Error::Io(e),
        other => Error::container(ContainerType::Zip, other.to_string()),
    }
}

/// Walks the entries of a ZIP archive in central directory order.
pub struct ZipEntryIterator<R: Read + Seek> {
    archive: ZipArchive<R>,
}

impl<R: Read + Seek> std::fmt::Debug for ZipEntryIterator<R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ZipEntryIterator")
            .field("entries", &self.archive.len())
            .finish()
    }
}

impl<R: Read + Seek> ZipEntryIterator<R> {
    /// Opens an archive, reading its central directory.
    pub fn new(reader: R) -> Result<Self> {
        Ok(Self {
            archive: ZipArchive::new(reader).map_err(zip_error)?,
        })
    }

    /// Number of entries in the central directory.
    pub fn len(&self) -> usize {
        self.archive.len()
    }

    /// Returns true if the archive has no entries.
    pub fn is_empty(&self) -> bool {
        self.archive.len() == 0
    }
}

impl<R: Read + Seek> ContainerEntryIterator for ZipEntryIterator<R> {
    fn container_type(&self) -> ContainerType {
        ContainerType::Zip
    }

    fn for_each_entry(&mut self, visitor: &mut EntryVisitor<'_>) -> Result<()> {
        for index in 0..self.archive.len() {
            let mut file = self.archive.by_index(index).map_err(zip_error)?;
            let entry = ContainerEntry {
                path: file.name().to_string(),
                is_directory: file.is_dir(),
                size: Some(file.size()),
            };
            if let ControlFlow::Break(()) = visitor(&entry, &mut file)? {
                break;
            }
        }
        Ok(())
    }
}

/// Opens ZIP containers.
#[derive(Debug, Clone, Copy, Default)]
pub struct ZipOpener;

impl ContainerOpener for ZipOpener {
    fn container_type(&self) -> ContainerType {
        ContainerType::Zip
    }

    fn open<'s>(&self, source: &'s dyn ByteSource) -> Result<Box<dyn ContainerEntryIterator + 's>> {
        Ok(Box::new(ZipEntryIterator::new(SourceReader::new(source))?))
    }
}
