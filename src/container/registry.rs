//! Registration seams between container and binary identification.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use log::debug;

use super::identifier::ContainerIdentifier;
use super::model::ContainerType;
use crate::signature::BinarySignatureFile;
use crate::sync::lock_or_recover;

/// Maps trigger format identifiers to the container type that should be
/// opened when binary identification reports them.
pub trait FormatResolver: Send + Sync {
    /// Records that `puid` indicates a container of `container_type`.
    fn register_puid(&self, puid: &str, container_type: ContainerType);

    /// Container type indicated by `puid`, if any.
    fn for_puid(&self, puid: &str) -> Option<ContainerType>;
}

/// Holds one container identifier per container type.
pub trait ContainerIdentifierRegistry: Send + Sync {
    /// Registers `identifier` for `container_type`, replacing any previous one.
    fn add_container_identifier(&self, container_type: ContainerType, identifier: Arc<ContainerIdentifier>);

    /// Identifier registered for `container_type`.
    fn container_identifier(&self, container_type: &ContainerType) -> Option<Arc<ContainerIdentifier>>;
}

/// Withdraws binary signatures for formats identified another way.
pub trait SignatureRemover {
    /// Removes binary signatures of `puid`.
    fn remove_signature_for_puid(&mut self, puid: &str);
}

impl SignatureRemover for BinarySignatureFile {
    fn remove_signature_for_puid(&mut self, puid: &str) {
        if !BinarySignatureFile::remove_signature_for_puid(self, puid) {
            debug!("No binary format {} to withdraw", puid);
        }
    }
}

/// Default [`FormatResolver`].
#[derive(Debug, Default)]
pub struct ArchiveFormatResolver {
    puids: Mutex<HashMap<String, ContainerType>>,
}

impl ArchiveFormatResolver {
    /// Creates an empty resolver.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of registered trigger PUIDs.
    pub fn len(&self) -> usize {
        lock_or_recover(&self.puids, "ArchiveFormatResolver").len()
    }

    /// Returns true if no trigger PUID is registered.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl FormatResolver for ArchiveFormatResolver {
    fn register_puid(&self, puid: &str, container_type: ContainerType) {
        lock_or_recover(&self.puids, "ArchiveFormatResolver").insert(puid.to_string(), container_type);
    }

    fn for_puid(&self, puid: &str) -> Option<ContainerType> {
        lock_or_recover(&self.puids, "ArchiveFormatResolver")
            .get(puid)
            .cloned()
    }
}

/// Default [`ContainerIdentifierRegistry`].
#[derive(Debug, Default)]
pub struct ContainerIdentifierFactory {
    identifiers: Mutex<HashMap<ContainerType, Arc<ContainerIdentifier>>>,
}

impl ContainerIdentifierFactory {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registered container types, in no particular order.
    pub fn container_types(&self) -> Vec<ContainerType> {
        lock_or_recover(&self.identifiers, "ContainerIdentifierFactory")
            .keys()
            .cloned()
            .collect()
    }
}

impl ContainerIdentifierRegistry for ContainerIdentifierFactory {
    fn add_container_identifier(&self, container_type: ContainerType, identifier: Arc<ContainerIdentifier>) {
        lock_or_recover(&self.identifiers, "ContainerIdentifierFactory").insert(container_type, identifier);
    }

    fn container_identifier(&self, container_type: &ContainerType) -> Option<Arc<ContainerIdentifier>> {
        lock_or_recover(&self.identifiers, "ContainerIdentifierFactory")
            .get(container_type)
            .cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::IdentifierConfig;
    use crate::container::model::ContainerSignatureDefinitions;

    #[test]
    fn test_resolver() {
        let resolver = ArchiveFormatResolver::new();
        assert!(resolver.is_empty());
        resolver.register_puid("x-fmt/263", ContainerType::Zip);
        resolver.register_puid("fmt/111", ContainerType::Ole2);
        assert_eq!(resolver.len(), 2);
        assert_eq!(resolver.for_puid("fmt/111"), Some(ContainerType::Ole2));
        assert_eq!(resolver.for_puid("fmt/1"), None);
    }

    #[test]
    fn test_factory_replaces() {
        let factory = ContainerIdentifierFactory::new();
        let defs = Arc::new(ContainerSignatureDefinitions::default());
        let first = Arc::new(ContainerIdentifier::new(
            Arc::clone(&defs),
            ContainerType::Zip,
            IdentifierConfig::default(),
        ));
        let second = Arc::new(ContainerIdentifier::new(defs, ContainerType::Zip, IdentifierConfig::default()));
        factory.add_container_identifier(ContainerType::Zip, Arc::clone(&first));
        factory.add_container_identifier(ContainerType::Zip, Arc::clone(&second));
        let found = factory.container_identifier(&ContainerType::Zip).unwrap();
        assert!(Arc::ptr_eq(&found, &second));
        assert_eq!(factory.container_types(), vec![ContainerType::Zip]);
    }

    #[test]
    fn test_binary_file_remover() {
        let mut file = BinarySignatureFile::new(Default::default(), Vec::new());
        SignatureRemover::remove_signature_for_puid(&mut file, "fmt/1");
        assert!(file.formats().is_empty());
    }
}
