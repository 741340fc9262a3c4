//! Error types for signature loading and format identification.
//!
//! This module provides the [`Error`] enum which represents every failure
//! mode of the crate, along with a convenient [`Result<T>`] type alias.
//!
//! "Does not match" is never an error: matchers return `Ok(false)` or an
//! empty result set. Errors are reserved for unreadable resources, broken
//! signature definitions and archive failures.
//!
//! # Distinguishing signature file failures
//!
//! A definition file that cannot be read at all and a file that parses but
//! violates the signature schema call for different guidance, so they are
//! reported as different variants:
//!
//! ```rust
//! use formatsig::{ContainerSignatureDefinitions, Error};
//! use formatsig::error::SignatureFileErrorKind;
//!
//! fn describe(error: &Error) -> &'static str {
//!     match error.signature_file_error_kind() {
//!         Some(SignatureFileErrorKind::Unreadable) => "check that the signature file exists",
//!         Some(SignatureFileErrorKind::Invalid) => "the signature file is not a valid definition",
//!         None => "identification failed",
//!     }
//! }
//!
//! let err = ContainerSignatureDefinitions::from_path("/does/not/exist.xml").unwrap_err();
//! assert_eq!(describe(&err), "check that the signature file exists");
//! ```

use std::io;
use std::path::PathBuf;

/// Which of the two signature file failure kinds an error belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignatureFileErrorKind {
    /// The file is missing, unreadable or not text.
    Unreadable,
    /// The file was read but its content is not a valid definition.
    Invalid,
}

impl std::fmt::Display for SignatureFileErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Unreadable => write!(f, "signature file unreadable"),
            Self::Invalid => write!(f, "signature file invalid"),
        }
    }
}

/// The main error type for signature loading and identification.
///
/// # Error Categories
///
/// | Category | Variants | Typical Cause |
/// |----------|----------|---------------|
/// | I/O | [`Io`][Self::Io] | Reading the resource or an entry failed |
/// | Definitions | [`SignatureFileUnreadable`][Self::SignatureFileUnreadable], [`SignatureFileInvalid`][Self::SignatureFileInvalid] | Startup loading |
/// | Signatures | [`InvalidSequence`][Self::InvalidSequence], [`InvalidSignature`][Self::InvalidSignature], [`InvalidPathPattern`][Self::InvalidPathPattern] | Malformed signature content |
/// | Containers | [`Container`][Self::Container], [`UnsupportedContainer`][Self::UnsupportedContainer] | Archive traversal |
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
    /// An I/O error occurred while reading a resource or container entry.
    ///
    /// This is distinct from a failed match, which is never an error.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// A signature definition file could not be read.
    ///
    /// Usually the file is missing, unreadable, or not valid UTF-8 text.
    #[error("Signature file unreadable: {}", path.display())]
    SignatureFileUnreadable {
        /// Path of the definition file.
        path: PathBuf,
        /// The underlying I/O error.
        #[source]
        source: io::Error,
    },

    /// A signature definition file was read but is not a valid definition.
    #[error("Signature file invalid: {reason}")]
    SignatureFileInvalid {
        /// Description of the schema or content violation.
        reason: String,
    },

    /// A byte sequence expression could not be parsed.
    #[error("Invalid byte sequence {expression:?} at position {position}: {reason}")]
    InvalidSequence {
        /// The expression being parsed.
        expression: String,
        /// Character offset of the failure within the expression.
        position: usize,
        /// What was wrong.
        reason: String,
    },

    /// A signature element is structurally invalid.
    ///
    /// Raised for constructs the matcher cannot evaluate, such as indirect
    /// offsets, fragments, or unknown anchor references.
    #[error("Invalid signature: {0}")]
    InvalidSignature(String),

    /// A declared container path pattern cannot be compiled.
    #[error("Invalid path pattern {pattern:?}: {reason}")]
    InvalidPathPattern {
        /// The declared pattern.
        pattern: String,
        /// Why compilation failed.
        reason: String,
    },

    /// Traversing a container failed.
    #[error("{container_type} container error: {reason}")]
    Container {
        /// Container type tag, such as `ZIP`.
        container_type: String,
        /// Description of the failure.
        reason: String,
    },

    /// No entry reader is registered for the container type.
    #[error("No entry reader available for {0} containers")]
    UnsupportedContainer(String),
}

/// A specialized Result type for this crate.
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Creates a [`SignatureFileInvalid`][Self::SignatureFileInvalid] error.
    pub fn invalid_file(reason: impl Into<String>) -> Self {
        Error::SignatureFileInvalid {
            reason: reason.into(),
        }
    }

    /// Creates a [`Container`][Self::Container] error.
    pub fn container(container_type: impl std::fmt::Display, reason: impl Into<String>) -> Self {
        Error::Container {
            container_type: container_type.to_string(),
            reason: reason.into(),
        }
    }

    /// Returns true if this error came from loading a signature definition file.
    pub fn is_signature_file_error(&self) -> bool {
        self.signature_file_error_kind().is_some()
    }

    /// Classifies signature file failures as unreadable or invalid.
    ///
    /// Returns `None` for every other error.
    pub fn signature_file_error_kind(&self) -> Option<SignatureFileErrorKind> {
        match self {
            Error::SignatureFileUnreadable { .. } => Some(SignatureFileErrorKind::Unreadable),
            Error::SignatureFileInvalid { .. } => Some(SignatureFileErrorKind::Invalid),
            _ => None,
        }
    }

    /// Returns true if this error is an I/O failure on the resource.
    pub fn is_io(&self) -> bool {
        matches!(self, Error::Io(_))
    }

    /// Returns true if this error describes a malformed signature element.
    ///
    /// Such errors are local to one signature and never abort loading of
    /// the rest of a signature set.
    pub fn is_signature_error(&self) -> bool {
        matches!(
            self,
            Error::InvalidSequence { .. }
                | Error::InvalidSignature(_)
                | Error::InvalidPathPattern { .. }
        )
    }
}
