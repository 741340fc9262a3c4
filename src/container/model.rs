//! Container signature model.

use std::fmt;
use std::str::FromStr;
use std::sync::OnceLock;

use log::warn;

use crate::signature::InternalSignatureCollection;

/// Container technology a signature applies to.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ContainerType {
    /// ZIP archives, including OOXML and ODF documents.
    Zip,
    /// OLE2 compound documents.
    Ole2,
    /// Any other container tag, stored upper-cased.
    Other(String),
}

impl ContainerType {
    /// Parses a container type tag, ignoring case.
    pub fn parse(tag: &str) -> Self {
        let tag = tag.trim().to_ascii_uppercase();
        match tag.as_str() {
            "ZIP" => ContainerType::Zip,
            "OLE2" => ContainerType::Ole2,
            _ => ContainerType::Other(tag),
        }
    }

    /// Returns the canonical tag.
    pub fn as_str(&self) -> &str {
        match self {
            ContainerType::Zip => "ZIP",
            ContainerType::Ole2 => "OLE2",
            ContainerType::Other(tag) => tag,
        }
    }
}

impl FromStr for ContainerType {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self::parse(s))
    }
}

impl fmt::Display for ContainerType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone)]
enum Compiled {
    Ready(InternalSignatureCollection),
    Unusable(String),
}

/// A required entry of a container signature.
///
/// The optional nested binary signatures are kept as XML and compiled on
/// first use. Compilation happens at most once even when several threads
/// ask concurrently. A fragment that fails to compile, or compiles to no
/// signature, leaves the file with no usable binary signature: presence of
/// the entry alone then satisfies it.
#[derive(Debug, Clone)]
pub struct ContainerFile {
    path: String,
    binary_signatures: Option<String>,
    compiled: OnceLock<Compiled>,
}

impl ContainerFile {
    /// Creates a file requirement satisfied by presence of `path`.
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            binary_signatures: None,
            compiled: OnceLock::new(),
        }
    }

    /// Attaches nested binary signatures as XML, compiled lazily.
    pub fn with_binary_signatures(mut self, xml: impl Into<String>) -> Self {
        self.binary_signatures = Some(xml.into());
        self.compiled = OnceLock::new();
        self
    }

    /// Attaches an already compiled signature collection.
    pub fn with_compiled_signatures(mut self, mut signatures: InternalSignatureCollection) -> Self {
        signatures.sort_signatures();
        self.binary_signatures = None;
        self.compiled = OnceLock::from(Compiled::Ready(signatures));
        self
    }

    /// Declared path pattern.
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Raw nested signature XML, if declared as XML.
    pub fn binary_signatures_xml(&self) -> Option<&str> {
        self.binary_signatures.as_deref()
    }

    /// Returns true if the file declares nested binary signatures, usable or not.
    pub fn has_binary_signatures(&self) -> bool {
        self.binary_signatures.is_some() || self.compiled.get().is_some()
    }

    /// Compiled nested signatures, or `None` when there are none usable.
    pub fn compiled_signatures(&self) -> Option<&InternalSignatureCollection> {
        match self.compile()? {
            Compiled::Ready(signatures) => Some(signatures),
            Compiled::Unusable(_) => None,
        }
    }

    /// Why the nested signatures are unusable, if they are.
    pub fn compile_error(&self) -> Option<&str> {
        match self.compile()? {
            Compiled::Unusable(reason) => Some(reason),
            Compiled::Ready(_) => None,
        }
    }

    fn compile(&self) -> Option<&Compiled> {
        if let Some(compiled) = self.compiled.get() {
            return Some(compiled);
        }
        let xml = self.binary_signatures.as_deref()?;
        Some(self.compiled.get_or_init(|| {
            match InternalSignatureCollection::from_xml(xml) {
                Ok(signatures) if signatures.is_empty() => {
                    warn!(
                        "Binary signatures for container path {:?} contain no usable signature; matching on presence",
                        self.path
                    );
                    Compiled::Unusable("no usable signature".into())
                }
                Ok(mut signatures) => {
                    signatures.sort_signatures();
                    Compiled::Ready(signatures)
                }
                Err(err) => {
                    warn!(
                        "Could not compile binary signatures for container path {:?}: {}; matching on presence",
                        self.path, err
                    );
                    Compiled::Unusable(err.to_string())
                }
            }
        }))
    }
}

/// A signature over the entries of a container.
#[derive(Debug, Clone)]
pub struct ContainerSignature {
    id: u32,
    container_type: ContainerType,
    description: String,
    files: Vec<ContainerFile>,
}

impl ContainerSignature {
    /// Creates a signature with no files.
    pub fn new(id: u32, container_type: ContainerType, description: impl Into<String>) -> Self {
        Self {
            id,
            container_type,
            description: description.into(),
            files: Vec::new(),
        }
    }

    /// Adds a required file.
    pub fn with_file(mut self, file: ContainerFile) -> Self {
        self.files.push(file);
        self
    }

    /// Signature id.
    pub fn id(&self) -> u32 {
        self.id
    }

    /// Container type.
    pub fn container_type(&self) -> &ContainerType {
        &self.container_type
    }

    /// Human-readable description.
    pub fn description(&self) -> &str {
        &self.description
    }

    /// Required files in declaration order.
    pub fn files(&self) -> &[ContainerFile] {
        &self.files
    }

    /// Looks a required file up by its declared path.
    pub fn file(&self, path: &str) -> Option<&ContainerFile> {
        self.files.iter().find(|f| f.path == path)
    }
}

/// Maps a container signature to a format identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FileFormatMapping {
    /// Container signature id.
    pub signature_id: u32,
    /// Format identifier.
    pub puid: String,
}

impl FileFormatMapping {
    /// Creates a mapping.
    pub fn new(signature_id: u32, puid: impl Into<String>) -> Self {
        Self {
            signature_id,
            puid: puid.into(),
        }
    }
}

/// A format whose identification triggers container identification.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TriggerPuid {
    /// Container type to run.
    pub container_type: ContainerType,
    /// Triggering format identifier.
    pub puid: String,
}

impl TriggerPuid {
    /// Creates a trigger.
    pub fn new(container_type: ContainerType, puid: impl Into<String>) -> Self {
        Self {
            container_type,
            puid: puid.into(),
        }
    }
}

/// The three container definition tables.
///
/// Loaded once at startup and read concurrently afterwards.
#[derive(Debug, Clone, Default)]
pub struct ContainerSignatureDefinitions {
    signatures: Vec<ContainerSignature>,
    mappings: Vec<FileFormatMapping>,
    triggers: Vec<TriggerPuid>,
}

impl ContainerSignatureDefinitions {
    /// Creates definitions from already-built tables.
    pub fn new(
        signatures: Vec<ContainerSignature>,
        mappings: Vec<FileFormatMapping>,
        triggers: Vec<TriggerPuid>,
    ) -> Self {
        Self {
            signatures,
            mappings,
            triggers,
        }
    }

    /// Every container signature.
    pub fn signatures(&self) -> &[ContainerSignature] {
        &self.signatures
    }

    /// Signatures for one container type.
    pub fn signatures_for<'a>(
        &'a self,
        container_type: &'a ContainerType,
    ) -> impl Iterator<Item = &'a ContainerSignature> + 'a {
        self.signatures
            .iter()
            .filter(move |s| &s.container_type == container_type)
    }

    /// Looks a signature up by id.
    pub fn signature(&self, id: u32) -> Option<&ContainerSignature> {
        self.signatures.iter().find(|s| s.id == id)
    }

    /// The signature-to-format table.
    pub fn format_mappings(&self) -> &[FileFormatMapping] {
        &self.mappings
    }

    /// Format identifiers mapped to signature `id`.
    pub fn puids_for_signature(&self, id: u32) -> impl Iterator<Item = &str> + '_ {
        self.mappings
            .iter()
            .filter(move |m| m.signature_id == id)
            .map(|m| m.puid.as_str())
    }

    /// The trigger table.
    pub fn trigger_puids(&self) -> &[TriggerPuid] {
        &self.triggers
    }

    /// Distinct container types named by signatures or triggers, in first-seen order.
    pub fn container_types(&self) -> Vec<ContainerType> {
        let mut types: Vec<ContainerType> = Vec::new();
        let named = self
            .signatures
            .iter()
            .map(|s| &s.container_type)
            .chain(self.triggers.iter().map(|t| &t.container_type));
        for container_type in named {
            if !types.contains(container_type) {
                types.push(container_type.clone());
            }
        }
        types
    }
}
