//! Format identification of whole resources.
//!
//! [`FormatIdentifier`] combines the two engines: binary signatures run
//! first, and when a hit names a trigger format the resource is opened as a
//! container and container signatures take over. Resources nothing matches
//! fall back to their file extension.
//!
//! # Example
//!
//! ```rust
//! use formatsig::{
//!     BinarySignatureFile, ContainerSignatureDefinitions, FormatIdentifier, IdentificationMethod,
//!     IdentificationRequest, IdentifierConfig, MemorySource,
//! };
//!
//! let signatures: BinarySignatureFile = r#"
//!   <FFSignatureFile Version="1">
//!     <InternalSignatureCollection>
//!       <InternalSignature ID="1" Specificity="Specific">
//!         <ByteSequence Reference="BOFoffset">
//!           <SubSequence Position="1" SubSeqMinOffset="0"><Sequence>'GIF89a'</Sequence></SubSequence>
//!         </ByteSequence>
//!       </InternalSignature>
//!     </InternalSignatureCollection>
//!     <FileFormatCollection>
//!       <FileFormat ID="1" Name="GIF" PUID="fmt/4" Version="89a">
//!         <InternalSignatureID>1</InternalSignatureID>
//!         <Extension>gif</Extension>
//!       </FileFormat>
//!     </FileFormatCollection>
//!   </FFSignatureFile>"#
//!     .parse()?;
//! let identifier = FormatIdentifier::new(
//!     signatures,
//!     ContainerSignatureDefinitions::default(),
//!     IdentifierConfig::default(),
//! );
//!
//! let request = IdentificationRequest::new(MemorySource::new(&b"GIF89a\x01\x00"[..])).with_file_name("logo.png");
//! let results = identifier.identify(&request)?;
//! assert_eq!(results.results()[0].puid, "fmt/4");
//! assert_eq!(results.results()[0].method, IdentificationMethod::Binary);
//! assert!(results.extension_mismatch());
//! # Ok::<(), formatsig::Error>(())
//! ```

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::Arc;

use log::{debug, warn};

use crate::config::IdentifierConfig;
use crate::container::{
    ArchiveFormatResolver, ContainerIdentification, ContainerIdentifier, ContainerIdentifierFactory,
    ContainerIdentifierRegistry, ContainerOpener, ContainerSignatureDefinitions, ContainerType, FormatResolver,
    SignatureRemover,
};
use crate::signature::{BinarySignatureFile, FileFormat};
use crate::source::{ByteSource, file_name_of};
use crate::{Error, Result};

/// How a result was obtained.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IdentificationMethod {
    /// An internal signature matched the resource bytes.
    Binary,
    /// A container signature matched the resource's entries.
    Container,
    /// Only the file extension agreed.
    Extension,
}

impl fmt::Display for IdentificationMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Binary => "Binary",
            Self::Container => "Container",
            Self::Extension => "Extension",
        };
        f.write_str(name)
    }
}

/// One identified format.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdentificationResult {
    /// Format identifier.
    pub puid: String,
    /// Format name, when the signature file knows the format.
    pub name: Option<String>,
    /// Format version.
    pub version: Option<String>,
    /// MIME type.
    pub mime_type: Option<String>,
    /// How the format was found.
    pub method: IdentificationMethod,
}

impl IdentificationResult {
    /// Creates a result carrying only a format identifier.
    pub fn new(puid: impl Into<String>, method: IdentificationMethod) -> Self {
        Self {
            puid: puid.into(),
            name: None,
            version: None,
            mime_type: None,
            method,
        }
    }

    /// Creates a result describing `format`.
    pub fn from_format(format: &FileFormat, method: IdentificationMethod) -> Self {
        let mut result = Self::new(format.puid(), method);
        result.describe(format);
        result
    }

    fn describe(&mut self, format: &FileFormat) {
        let non_empty = |s: &str| (!s.is_empty()).then(|| s.to_string());
        self.name = non_empty(format.name());
        self.version = non_empty(format.version());
        self.mime_type = non_empty(format.mime_type());
    }
}

/// Results for one resource.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IdentificationResultCollection {
    results: Vec<IdentificationResult>,
    extension_mismatch: bool,
    file_length: Option<u64>,
}

impl IdentificationResultCollection {
    /// Creates an empty collection.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a result unless one with the same PUID is already present.
    pub fn push(&mut self, result: IdentificationResult) {
        if !self.contains_puid(&result.puid) {
            self.results.push(result);
        }
    }

    /// Results in the order found.
    pub fn results(&self) -> &[IdentificationResult] {
        &self.results
    }

    /// Number of results.
    pub fn len(&self) -> usize {
        self.results.len()
    }

    /// Returns true if nothing was identified.
    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }

    /// Returns true if a result has `puid`.
    pub fn contains_puid(&self, puid: &str) -> bool {
        self.results.iter().any(|r| r.puid == puid)
    }

    /// PUIDs in result order.
    pub fn puids(&self) -> impl Iterator<Item = &str> + '_ {
        self.results.iter().map(|r| r.puid.as_str())
    }

    /// Replaces every result.
    pub fn replace(&mut self, results: impl IntoIterator<Item = IdentificationResult>) {
        self.results.clear();
        for result in results {
            self.push(result);
        }
    }

    /// Keeps only results for which `keep` returns true.
    pub fn retain(&mut self, keep: impl FnMut(&IdentificationResult) -> bool) {
        self.results.retain(keep);
    }

    /// True when a result's format disagrees with the file extension.
    pub fn extension_mismatch(&self) -> bool {
        self.extension_mismatch
    }

    /// Sets the extension mismatch flag.
    pub fn set_extension_mismatch(&mut self, mismatch: bool) {
        self.extension_mismatch = mismatch;
    }

    /// Length of the identified resource.
    pub fn file_length(&self) -> Option<u64> {
        self.file_length
    }

    /// Records the length of the identified resource.
    pub fn set_file_length(&mut self, length: u64) {
        self.file_length = Some(length);
    }
}

impl IntoIterator for IdentificationResultCollection {
    type Item = IdentificationResult;
    type IntoIter = std::vec::IntoIter<IdentificationResult>;

    fn into_iter(self) -> Self::IntoIter {
        self.results.into_iter()
    }
}

impl<'a> IntoIterator for &'a IdentificationResultCollection {
    type Item = &'a IdentificationResult;
    type IntoIter = std::slice::Iter<'a, IdentificationResult>;

    fn into_iter(self) -> Self::IntoIter {
        self.results.iter()
    }
}

/// A resource to identify.
#[derive(Debug)]
pub struct IdentificationRequest<S> {
    source: S,
    file_name: Option<String>,
}

impl<S: ByteSource> IdentificationRequest<S> {
    /// Creates a request named after the source.
    pub fn new(source: S) -> Self {
        let file_name = source.name().map(str::to_string);
        Self { source, file_name }
    }

    /// Overrides the file name used for extension and container name checks.
    pub fn with_file_name(mut self, name: impl Into<String>) -> Self {
        self.file_name = Some(name.into());
        self
    }

    /// The resource bytes.
    pub fn source(&self) -> &S {
        &self.source
    }

    /// File name of the resource.
    pub fn file_name(&self) -> Option<&str> {
        self.file_name.as_deref()
    }

    /// Text after the last dot of the file name. A leading dot does not
    /// start an extension.
    pub fn extension(&self) -> Option<&str> {
        let name = file_name_of(self.file_name.as_deref()?);
        match name.rfind('.') {
            Some(dot) if dot > 0 && dot + 1 < name.len() => Some(&name[dot + 1..]),
            _ => None,
        }
    }
}

/// Binary signature and extension identification.
#[derive(Debug, Clone)]
pub struct BinarySignatureIdentifier {
    file: BinarySignatureFile,
    config: IdentifierConfig,
}

impl BinarySignatureIdentifier {
    /// Creates an identifier over a loaded signature file.
    pub fn new(file: BinarySignatureFile, config: IdentifierConfig) -> Self {
        Self { file, config }
    }

    /// The signature file in use.
    pub fn signature_file(&self) -> &BinarySignatureFile {
        &self.file
    }

    /// Runs every internal signature against the request.
    ///
    /// Each matching signature contributes one result per format it
    /// identifies. Signatures run in evaluation order.
    pub fn match_binary_signatures<S: ByteSource>(
        &self,
        request: &IdentificationRequest<S>,
    ) -> Result<IdentificationResultCollection> {
        let mut results = IdentificationResultCollection::new();
        results.set_file_length(request.source.len());
        let hits = self
            .file
            .signatures()
            .matching_signatures(&request.source, self.config.max_bytes_to_scan)?;
        for signature in hits {
            for format in self.file.formats_for_signature(signature) {
                results.push(IdentificationResult::from_format(format, IdentificationMethod::Binary));
            }
        }
        debug!(
            "Binary identification of {}: {} results",
            request.file_name().unwrap_or("<unnamed>"),
            results.len()
        );
        Ok(results)
    }

    /// Identifies the request by extension alone.
    ///
    /// With `all_extensions` every format declaring the extension is
    /// reported, otherwise only formats without an internal signature.
    pub fn match_extensions<S: ByteSource>(
        &self,
        request: &IdentificationRequest<S>,
        all_extensions: bool,
    ) -> IdentificationResultCollection {
        let mut results = IdentificationResultCollection::new();
        results.set_file_length(request.source.len());
        let Some(extension) = request.extension() else {
            return results;
        };
        let formats = if all_extensions {
            self.file.formats_for_extension(extension)
        } else {
            self.file.tentative_formats_for_extension(extension)
        };
        for format in formats {
            results.push(IdentificationResult::from_format(format, IdentificationMethod::Extension));
        }
        results
    }

    /// Drops results whose format another result's format has priority over.
    pub fn remove_lower_priority_hits(&self, results: &mut IdentificationResultCollection) {
        if results.len() < 2 {
            return;
        }
        let outranked: HashSet<u32> = results
            .puids()
            .filter_map(|puid| self.file.format_for_puid(puid))
            .flat_map(|format| format.priority_over().iter().copied())
            .collect();
        if outranked.is_empty() {
            return;
        }
        results.retain(|result| {
            let keep = self
                .file
                .format_for_puid(&result.puid)
                .is_none_or(|format| !outranked.contains(&format.id()));
            if !keep {
                debug!("Dropping {}: a higher priority format matched", result.puid);
            }
            keep
        });
    }

    /// Flags results that disagree with `extension`.
    ///
    /// Without an extension, any result whose format declares extensions is
    /// a mismatch. Otherwise a result mismatches when its format declares
    /// extensions and none equals `extension`, ignoring case.
    pub fn check_for_extension_mismatch(&self, results: &mut IdentificationResultCollection, extension: Option<&str>) {
        let formats = results
            .results()
            .iter()
            .filter_map(|r| self.file.format_for_puid(&r.puid));
        let mismatch = match extension {
            None => formats.into_iter().any(|f| !f.extensions().is_empty()),
            Some(ext) => formats.into_iter().any(|f| f.has_extension_mismatch(ext)),
        };
        results.set_extension_mismatch(mismatch);
    }

    /// Container type to open for these results, from the first result
    /// whose PUID is a registered trigger.
    pub fn container_format(
        &self,
        results: &IdentificationResultCollection,
        resolver: &dyn FormatResolver,
    ) -> Option<ContainerType> {
        results.puids().find_map(|puid| resolver.for_puid(puid))
    }

    fn enrich(&self, result: &mut IdentificationResult) {
        if let Some(format) = self.file.format_for_puid(&result.puid) {
            result.describe(format);
        }
    }
}

impl SignatureRemover for BinarySignatureIdentifier {
    fn remove_signature_for_puid(&mut self, puid: &str) {
        SignatureRemover::remove_signature_for_puid(&mut self.file, puid);
    }
}

/// Binary, container and extension identification behind one call.
///
/// Built once from the loaded definitions and shared by every worker: all
/// per-request state lives on the stack of [`identify`](Self::identify).
pub struct FormatIdentifier {
    binary: BinarySignatureIdentifier,
    resolver: ArchiveFormatResolver,
    registry: ContainerIdentifierFactory,
    openers: HashMap<ContainerType, Box<dyn ContainerOpener>>,
    config: IdentifierConfig,
}

impl fmt::Debug for FormatIdentifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FormatIdentifier")
            .field("binary", &self.binary)
            .field("resolver", &self.resolver)
            .field("registry", &self.registry)
            .field("openers", &self.openers.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl FormatIdentifier {
    /// Builds the identification pipeline.
    ///
    /// A container identifier is created for every container type in
    /// `definitions`. Binary signatures of formats that container
    /// signatures identify are withdrawn from `signatures`.
    pub fn new(
        signatures: BinarySignatureFile,
        definitions: ContainerSignatureDefinitions,
        config: IdentifierConfig,
    ) -> Self {
        let definitions = Arc::new(definitions);
        let mut binary = BinarySignatureIdentifier::new(signatures, config.clone());
        let resolver = ArchiveFormatResolver::new();
        let registry = ContainerIdentifierFactory::new();
        for container_type in definitions.container_types() {
            let identifier = Arc::new(ContainerIdentifier::new(
                Arc::clone(&definitions),
                container_type,
                config.clone(),
            ));
            ContainerIdentifier::register(&identifier, &registry, &resolver, &mut binary);
        }

        #[allow(unused_mut)]
        let mut identifier = Self {
            binary,
            resolver,
            registry,
            openers: HashMap::new(),
            config,
        };
        #[cfg(feature = "zip")]
        {
            identifier = identifier.with_opener(crate::container::ZipOpener);
        }
        identifier
    }

    /// Registers an entry reader for its container type, replacing any
    /// previous one.
    pub fn with_opener(mut self, opener: impl ContainerOpener + 'static) -> Self {
        self.openers.insert(opener.container_type(), Box::new(opener));
        self
    }

    /// Binary identification half of the pipeline.
    pub fn binary(&self) -> &BinarySignatureIdentifier {
        &self.binary
    }

    /// Trigger PUID table.
    pub fn resolver(&self) -> &ArchiveFormatResolver {
        &self.resolver
    }

    /// Container identifier registry.
    pub fn registry(&self) -> &ContainerIdentifierFactory {
        &self.registry
    }

    /// Configuration in use.
    pub fn config(&self) -> &IdentifierConfig {
        &self.config
    }

    /// Identifies one resource.
    ///
    /// Errors reading the resource during binary matching are returned.
    /// Container identification failures are logged and the binary
    /// results kept.
    pub fn identify<S: ByteSource>(&self, request: &IdentificationRequest<S>) -> Result<IdentificationResultCollection> {
        let name = request.file_name().unwrap_or("<unnamed>");
        let mut results = self.binary.match_binary_signatures(request)?;

        if let Some(container_type) = self.binary.container_format(&results, &self.resolver) {
            match self.identify_container(&container_type, request) {
                Ok(found) if !found.results.is_empty() => {
                    results.replace(found.results.into_iter().map(|mut result| {
                        self.binary.enrich(&mut result);
                        result
                    }));
                }
                Ok(_) => debug!("No {} signature matched {}", container_type, name),
                Err(err @ Error::UnsupportedContainer(_)) => debug!("{}: {}", name, err),
                Err(err) => warn!("Container identification of {} failed: {}", name, err),
            }
        }

        self.binary.remove_lower_priority_hits(&mut results);

        if results.is_empty() {
            let by_extension = self.binary.match_extensions(request, self.config.match_all_extensions);
            results.replace(by_extension);
        } else {
            self.binary.check_for_extension_mismatch(&mut results, request.extension());
        }
        Ok(results)
    }

    /// Runs container identification of `container_type` on the request.
    pub fn identify_container<S: ByteSource>(
        &self,
        container_type: &ContainerType,
        request: &IdentificationRequest<S>,
    ) -> Result<ContainerIdentification> {
        let identifier = self
            .registry
            .container_identifier(container_type)
            .ok_or_else(|| Error::UnsupportedContainer(container_type.to_string()))?;
        let opener = self
            .openers
            .get(container_type)
            .ok_or_else(|| Error::UnsupportedContainer(container_type.to_string()))?;
        let mut entries = opener.open(&request.source)?;
        identifier.identify(request.file_name(), &mut *entries)
    }
}
