//! # formatsig
//!
//! File format identification from PRONOM-style signatures.
//!
//! This crate identifies the format of arbitrary binary resources by
//! matching them against declarative byte-pattern signatures, the same
//! signature files DROID uses. Two engines cooperate:
//!
//! - **binary signatures** scan the raw bytes of a resource for ordered
//!   byte patterns with wildcards, gaps and BOF/EOF/variable anchoring
//! - **container signatures** look inside ZIP or OLE2 based formats for
//!   required entries, optionally matching entry content against nested
//!   binary signatures
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use formatsig::{
//!     BinarySignatureFile, ContainerSignatureDefinitions, FileSource, FormatIdentifier,
//!     IdentificationRequest, IdentifierConfig, Result,
//! };
//!
//! fn main() -> Result<()> {
//!     // Load both signature files once at startup
//!     let signatures = BinarySignatureFile::from_path("DROID_SignatureFile_V120.xml")?;
//!     let containers = ContainerSignatureDefinitions::from_path("container-signature.xml")?;
//!     let identifier = FormatIdentifier::new(signatures, containers, IdentifierConfig::bounded(64 * 1024));
//!
//!     // Identify a file
//!     let request = IdentificationRequest::new(FileSource::open("report.docx")?);
//!     for result in &identifier.identify(&request)? {
//!         println!("{} ({}) via {}", result.puid, result.name.as_deref().unwrap_or("?"), result.method);
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ### Matching a Single Signature
//!
//! ```rust
//! use formatsig::signature::{Anchor, ByteSequence, InternalSignature};
//! use formatsig::{MemorySource, ScanLimit};
//!
//! let png = InternalSignature::new(
//!     11,
//!     vec![ByteSequence::parse(Anchor::StartOfFile, "89 'PNG' 0D 0A 1A 0A")?],
//! );
//! let source = MemorySource::new(&b"\x89PNG\r\n\x1a\n...."[..]);
//! assert!(formatsig::matcher::matches(&source, &png, ScanLimit::Unlimited)?);
//! # Ok::<(), formatsig::Error>(())
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `zip` | Yes | ZIP container entry iteration |
//! | `parallel` | Yes | Batch identification with Rayon |
//!
//! ### Disabling Default Features
//!
//! Without `zip`, container identification still works on entries supplied
//! through [`container::MemoryContainer`] or a custom
//! [`container::ContainerOpener`]:
//!
//! ```toml
//! [dependencies]
//! formatsig = { version = "0.1", default-features = false }
//! ```
//!
//! ## Error Handling
//!
//! All fallible operations return [`Result<T>`]. A resource that matches
//! nothing is not an error; errors mean the resource, a container entry or
//! a signature file could not be read:
//!
//! ```rust,no_run
//! use formatsig::{BinarySignatureFile, Error};
//!
//! match BinarySignatureFile::from_path("signatures.xml") {
//!     Ok(file) => println!("{} formats", file.formats().len()),
//!     Err(e @ Error::SignatureFileUnreadable { .. }) => eprintln!("cannot read: {}", e),
//!     Err(e @ Error::SignatureFileInvalid { .. }) => eprintln!("not a signature file: {}", e),
//!     Err(e) => eprintln!("{}", e),
//! }
//! ```
//!
//! ## Logging
//!
//! The crate logs through the [`log`] facade and installs no logger.
//! Skipped malformed definitions and unusable nested signatures are
//! reported at `warn`, identification progress at `debug` and per-entry
//! decisions at `trace`.

#![cfg_attr(docsrs, feature(doc_cfg))]
#![warn(missing_docs)]
#![warn(rust_2018_idioms)]

pub mod config;
pub mod container;
pub mod error;
pub mod gate;
pub mod identify;
pub mod matcher;
pub mod signature;
pub mod source;

mod sync;

pub use config::{IdentifierConfig, PathCase, ScanLimit};
pub use container::{
    ContainerIdentifier, ContainerSignature, ContainerSignatureDefinitions, ContainerType, FileFormatMapping,
    TriggerPuid,
};
pub use error::{Error, Result};
pub use gate::{PauseGate, identify_batch};
pub use identify::{
    BinarySignatureIdentifier, FormatIdentifier, IdentificationMethod, IdentificationRequest, IdentificationResult,
    IdentificationResultCollection,
};
pub use signature::{BinarySignatureFile, FileFormat, InternalSignature, InternalSignatureCollection};
pub use source::{ByteSource, FileSource, MemorySource};
