//! File-backed byte source with a window cache.

use std::borrow::Cow;
use std::cell::RefCell;
use std::fs::File;
use std::io::{self, Read, Seek, SeekFrom};
use std::num::NonZeroUsize;
use std::path::Path;
use std::sync::Arc;

use lru::LruCache;

use super::ByteSource;

/// Default window size (64 KiB).
const DEFAULT_WINDOW_SIZE: usize = 64 * 1024;

/// Default number of cached windows.
const DEFAULT_CACHED_WINDOWS: usize = 8;

/// A [`ByteSource`] over a file on disk.
///
/// Reads are served from fixed-size windows kept in a small LRU cache, so
/// the backward scans of end-anchored signatures and the forward scans of
/// start-anchored ones do not hit the file repeatedly for the same region.
///
/// The source uses interior mutability and is therefore not `Sync`; each
/// identification request opens its own.
///
/// # Example
///
/// ```rust,no_run
/// use formatsig::source::{ByteSource, FileSource};
///
/// let source = FileSource::open("document.pdf")?;
/// let header = source.read(0, 5)?;
/// println!("{} starts with {:?}", source.name().unwrap_or("?"), &*header);
/// # Ok::<(), formatsig::Error>(())
/// ```
pub struct FileSource {
    file: RefCell<File>,
    len: u64,
    name: Option<String>,
    window_size: usize,
    windows: RefCell<LruCache<u64, Arc<[u8]>>>,
}

impl std::fmt::Debug for FileSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FileSource")
            .field("len", &self.len)
            .field("name", &self.name)
            .field("window_size", &self.window_size)
            .finish_non_exhaustive()
    }
}

impl FileSource {
    /// Opens the file at `path`. The source is named after the file name.
    pub fn open(path: impl AsRef<Path>) -> crate::Result<Self> {
        let path = path.as_ref();
        let file = File::open(path)?;
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned());
        let mut source = Self::from_file(file)?;
        source.name = name;
        Ok(source)
    }

    /// Wraps an already open file.
    pub fn from_file(file: File) -> crate::Result<Self> {
        let len = file.metadata()?.len();
        Ok(Self {
            file: RefCell::new(file),
            len,
            name: None,
            window_size: DEFAULT_WINDOW_SIZE,
            windows: RefCell::new(LruCache::new(
                NonZeroUsize::new(DEFAULT_CACHED_WINDOWS).unwrap_or(NonZeroUsize::MIN),
            )),
        })
    }

    /// Sets the cache window size. Zero is raised to one byte.
    pub fn with_window_size(mut self, window_size: usize) -> Self {
        self.window_size = window_size.max(1);
        self.windows.get_mut().clear();
        self
    }

    /// Attaches a resource name.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    fn window(&self, index: u64) -> io::Result<Arc<[u8]>> {
        if let Some(window) = self.windows.borrow_mut().get(&index) {
            return Ok(Arc::clone(window));
        }

        let start = index * self.window_size as u64;
        let size = (self.len - start).min(self.window_size as u64) as usize;
        let mut buf = vec![0u8; size];
        {
            let mut file = self.file.borrow_mut();
            file.seek(SeekFrom::Start(start))?;
            file.read_exact(&mut buf)?;
        }
        let window: Arc<[u8]> = buf.into();
        self.windows.borrow_mut().put(index, Arc::clone(&window));
        Ok(window)
    }
}

impl ByteSource for FileSource {
    fn len(&self) -> u64 {
        self.len
    }

    fn read(&self, offset: u64, length: usize) -> io::Result<Cow<'_, [u8]>> {
        if offset >= self.len || length == 0 {
            return Ok(Cow::Owned(Vec::new()));
        }
        let end = offset.saturating_add(length as u64).min(self.len);
        let mut out = Vec::with_capacity((end - offset) as usize);
        let window_size = self.window_size as u64;

        let mut pos = offset;
        while pos < end {
            let index = pos / window_size;
            let window = self.window(index)?;
            let window_start = index * window_size;
            let from = (pos - window_start) as usize;
            let to = ((end - window_start) as usize).min(window.len());
            out.extend_from_slice(&window[from..to]);
            pos = window_start + to as u64;
        }
        Ok(Cow::Owned(out))
    }

    fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }
}
