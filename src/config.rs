//! Identification options.
//!
//! This module provides [`ScanLimit`], the per-resource scan budget, and
//! [`IdentifierConfig`], the option set shared by the binary and container
//! identifiers.

use std::fmt;

/// Maximum number of bytes a matching operation may read.
///
/// A bounded budget limits how far signatures may reach into a resource:
/// start-anchored and variable matches must lie within the first `n` bytes,
/// end-anchored matches within the last `n` bytes. For container scans the
/// budget also caps the total entry content loaded.
///
/// # Example
///
/// ```rust
/// use formatsig::ScanLimit;
///
/// assert_eq!(ScanLimit::from_max_bytes(-1), ScanLimit::Unlimited);
/// assert_eq!(ScanLimit::from_max_bytes(0), ScanLimit::Bytes(0));
/// assert_eq!(ScanLimit::Bytes(4096).readable(100), 100);
/// assert_eq!(ScanLimit::Bytes(16).readable(100), 16);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ScanLimit {
    /// No limit; the whole resource may be read.
    #[default]
    Unlimited,
    /// At most this many bytes from either end. Zero means nothing is readable.
    Bytes(u64),
}

impl ScanLimit {
    /// Converts the conventional signed setting, where any negative value
    /// means unlimited.
    pub fn from_max_bytes(max_bytes: i64) -> Self {
        if max_bytes < 0 {
            ScanLimit::Unlimited
        } else {
            ScanLimit::Bytes(max_bytes as u64)
        }
    }

    /// Returns true if no limit applies.
    pub fn is_unlimited(&self) -> bool {
        matches!(self, ScanLimit::Unlimited)
    }

    /// Returns the byte limit, or `None` when unlimited.
    pub fn bytes(&self) -> Option<u64> {
        match self {
            ScanLimit::Unlimited => None,
            ScanLimit::Bytes(n) => Some(*n),
        }
    }

    /// Number of bytes readable from one end of a resource of `len` bytes.
    pub fn readable(&self, len: u64) -> u64 {
        match self {
            ScanLimit::Unlimited => len,
            ScanLimit::Bytes(n) => len.min(*n),
        }
    }

    /// Returns true once `consumed` bytes have used up the budget.
    pub fn is_exhausted_by(&self, consumed: u64) -> bool {
        match self {
            ScanLimit::Unlimited => false,
            ScanLimit::Bytes(n) => consumed >= *n,
        }
    }
}

impl fmt::Display for ScanLimit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScanLimit::Unlimited => write!(f, "unlimited"),
            ScanLimit::Bytes(n) => write!(f, "{} bytes", n),
        }
    }
}

/// Case handling for container entry path matching.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PathCase {
    /// Paths must match case exactly.
    #[default]
    Sensitive,
    /// Paths match regardless of case.
    Insensitive,
}

impl PathCase {
    /// Returns true for [`PathCase::Sensitive`].
    pub fn is_sensitive(&self) -> bool {
        matches!(self, PathCase::Sensitive)
    }
}

/// Configuration for binary and container identification.
///
/// # Example
///
/// ```rust
/// use formatsig::{IdentifierConfig, PathCase, ScanLimit};
///
/// // Default configuration: unlimited scanning, case-sensitive paths
/// let config = IdentifierConfig::default();
/// assert!(config.max_bytes_to_scan.is_unlimited());
///
/// // Bounded scanning for large collections
/// let config = IdentifierConfig::new()
///     .max_bytes_to_scan(ScanLimit::Bytes(64 * 1024))
///     .path_case(PathCase::Insensitive)
///     .match_all_extensions(true);
/// assert_eq!(config.max_bytes_to_scan.bytes(), Some(65536));
/// ```
#[derive(Debug, Clone)]
pub struct IdentifierConfig {
    /// Scan budget per resource, and per container across all loaded entries.
    ///
    /// Default: unlimited.
    pub max_bytes_to_scan: ScanLimit,

    /// Case handling for container path patterns.
    ///
    /// Applied identically when collecting required paths and when matching
    /// streamed entries. Default: case-sensitive.
    pub path_case: PathCase,

    /// Stop streaming container entries once every signature has matched.
    ///
    /// Default: true.
    pub stop_when_all_matched: bool,

    /// Report every format declaring the extension, not only formats
    /// without a binary signature, when falling back to extension matching.
    ///
    /// Default: false.
    pub match_all_extensions: bool,

    /// Number of compiled path patterns each container identifier caches.
    ///
    /// Default: 256.
    pub pattern_cache_capacity: usize,
}

impl Default for IdentifierConfig {
    fn default() -> Self {
        Self {
            max_bytes_to_scan: ScanLimit::Unlimited,
            path_case: PathCase::Sensitive,
            stop_when_all_matched: true,
            match_all_extensions: false,
            pattern_cache_capacity: 256,
        }
    }
}

impl IdentifierConfig {
    /// Creates a new configuration with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a configuration that scans at most `max_bytes` bytes.
    pub fn bounded(max_bytes: u64) -> Self {
        Self::default().max_bytes_to_scan(ScanLimit::Bytes(max_bytes))
    }

    /// Sets the scan budget.
    pub fn max_bytes_to_scan(mut self, limit: ScanLimit) -> Self {
        self.max_bytes_to_scan = limit;
        self
    }

    /// Sets path case handling.
    pub fn path_case(mut self, case: PathCase) -> Self {
        self.path_case = case;
        self
    }

    /// Sets whether container scans stop once everything has matched.
    pub fn stop_when_all_matched(mut self, stop: bool) -> Self {
        self.stop_when_all_matched = stop;
        self
    }

    /// Sets whether extension fallback reports all formats for an extension.
    pub fn match_all_extensions(mut self, all: bool) -> Self {
        self.match_all_extensions = all;
        self
    }

    /// Sets the compiled path pattern cache capacity. Zero is raised to one.
    pub fn pattern_cache_capacity(mut self, capacity: usize) -> Self {
        self.pattern_cache_capacity = capacity.max(1);
        self
    }
}
