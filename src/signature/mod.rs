//! Binary signature model.
//!
//! An [`InternalSignature`] is one or more [`ByteSequence`]s, each an
//! [`Anchor`] plus ordered [`SubSequence`]s of [`BytePattern`]s separated by
//! [`Gap`]s. Sequences are usually written in the compact expression
//! language accepted by [`parse_sequence`]:
//!
//! ```rust
//! use formatsig::signature::{Anchor, ByteSequence, InternalSignature};
//! use formatsig::{MemorySource, ScanLimit};
//!
//! let pdf = InternalSignature::new(
//!     14,
//!     vec![
//!         ByteSequence::parse(Anchor::StartOfFile, "'%PDF-1.' [30:37]")?,
//!         ByteSequence::parse(Anchor::EndOfFile, "'%%EOF' {0-2}")?,
//!     ],
//! );
//! let source = MemorySource::new(&b"%PDF-1.4 ... %%EOF\n"[..]);
//! assert!(pdf.matches(&source, ScanLimit::Unlimited)?);
//! # Ok::<(), formatsig::Error>(())
//! ```

mod file;
mod internal;
mod parser;
mod pattern;
mod sequence;
pub(crate) mod xml;

pub use file::{BinarySignatureFile, FileFormat};
pub use internal::{InternalSignature, InternalSignatureCollection};
pub use parser::{Fragment, ParsedSequence, parse_sequence};
pub use pattern::{ByteClass, BytePattern, PatternByte};
pub use sequence::{Anchor, ByteSequence, Gap, SubSequence};
