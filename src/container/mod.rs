//! Container signature matching.
//!
//! Formats such as OOXML, ODF or OLE2 documents cannot be told apart by
//! their first bytes: they are all ZIP or OLE2 containers. A
//! [`ContainerSignature`] instead lists entries the container must hold,
//! optionally with binary signatures their content must match.
//!
//! The pieces fit together as follows:
//!
//! - [`ContainerSignatureDefinitions`] is loaded once and shared
//! - one [`ContainerIdentifier`] per container type is built from it and
//!   registered through [`ContainerIdentifier::register`]
//! - each request walks a [`ContainerEntryIterator`] once, tracking
//!   progress in a fresh [`ContainerSignatureMatchCollection`]
//!
//! Entry iteration is pluggable. A [`ZipOpener`] is provided when the `zip`
//! feature is enabled; other technologies implement [`ContainerOpener`] or
//! feed entries through a [`MemoryContainer`].

mod definitions;
mod entries;
mod identifier;
mod model;
mod path;
mod registry;
mod tracker;
#[cfg(feature = "zip")]
mod zip;

pub use entries::{
    ContainerEntry, ContainerEntryIterator, ContainerOpener, EntryContent, EntryVisitor, LoadedContent, MemoryContainer,
};
pub use identifier::{
    ContainerIdentification, ContainerIdentifier, ContainerScanStats, IdentificationState, StopReason,
};
pub use model::{
    ContainerFile, ContainerSignature, ContainerSignatureDefinitions, ContainerType, FileFormatMapping,
    TriggerPuid,
};
pub use path::{CONTAINER_NAME_PLACEHOLDER, PathMatcher, container_stem};
pub use registry::{
    ArchiveFormatResolver, ContainerIdentifierFactory, ContainerIdentifierRegistry, FormatResolver,
    SignatureRemover,
};
pub use tracker::{ContainerSignatureMatch, ContainerSignatureMatchCollection, unique_required_paths};
#[cfg(feature = "zip")]
pub use self::zip::{ZipEntryIterator, ZipOpener};
