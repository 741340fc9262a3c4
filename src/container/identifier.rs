//! Container identification.
//!
//! A [`ContainerIdentifier`] handles one container type. It is built once
//! at startup from the shared definitions and then serves any number of
//! concurrent requests, each with its own match state:
//!
//! ```text
//! Start -> StreamingEntries -> { EntryNeedsNoContent | EntryNeedsContent } -> ...
//!       -> StreamExhaustedOrBudgetReached -> Resolved
//! ```
//!
//! # Example
//!
//! ```rust
//! use std::sync::Arc;
//! use formatsig::container::{
//!     ContainerFile, ContainerIdentifier, ContainerSignature, ContainerType, MemoryContainer,
//! };
//! use formatsig::{ContainerSignatureDefinitions, FileFormatMapping, IdentifierConfig};
//!
//! let defs = Arc::new(ContainerSignatureDefinitions::new(
//!     vec![ContainerSignature::new(1, ContainerType::Zip, "ODF text")
//!         .with_file(ContainerFile::new("mimetype"))
//!         .with_file(ContainerFile::new("content.xml"))],
//!     vec![FileFormatMapping::new(1, "fmt/291")],
//!     Vec::new(),
//! ));
//! let identifier = ContainerIdentifier::new(defs, ContainerType::Zip, IdentifierConfig::default());
//!
//! let mut entries = MemoryContainer::new(ContainerType::Zip)
//!     .with_file("mimetype", "application/vnd.oasis.opendocument.text")
//!     .with_file("content.xml", "<office:document-content/>");
//! let found = identifier.identify(Some("letter.odt"), &mut entries)?;
//! assert_eq!(found.results[0].puid, "fmt/291");
//! # Ok::<(), formatsig::Error>(())
//! ```

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::ops::ControlFlow;
use std::sync::Arc;

use log::{debug, trace};

use super::entries::{ContainerEntryIterator, LoadedContent};
use super::model::{ContainerSignature, ContainerSignatureDefinitions, ContainerType};
use super::path::PathMatcher;
use super::registry::{ContainerIdentifierRegistry, FormatResolver, SignatureRemover};
use super::tracker::{ContainerSignatureMatchCollection, unique_required_paths};
use crate::Result;
use crate::config::IdentifierConfig;
use crate::identify::{IdentificationMethod, IdentificationResult};
use crate::source::{ByteSource, MemorySource};

/// Phase of one container identification request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdentificationState {
    /// Match state created, nothing read yet.
    Start,
    /// Walking container entries.
    StreamingEntries,
    /// Current entry is satisfied by presence.
    EntryNeedsNoContent,
    /// Current entry's content is being matched.
    EntryNeedsContent,
    /// The walk ended.
    StreamExhaustedOrBudgetReached,
    /// Matched signatures have been turned into results.
    Resolved,
}

impl fmt::Display for IdentificationState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Start => "Start",
            Self::StreamingEntries => "StreamingEntries",
            Self::EntryNeedsNoContent => "EntryNeedsNoContent",
            Self::EntryNeedsContent => "EntryNeedsContent",
            Self::StreamExhaustedOrBudgetReached => "StreamExhaustedOrBudgetReached",
            Self::Resolved => "Resolved",
        };
        f.write_str(name)
    }
}

/// Why a container walk ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StopReason {
    /// Every entry was visited.
    #[default]
    Exhausted,
    /// Every signature had matched.
    AllMatched,
    /// Loaded entry content used up the scan budget.
    BudgetReached,
}

/// Counters from one container walk.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ContainerScanStats {
    /// Entries handed over by the iterator.
    pub entries_seen: usize,
    /// Entries matching a declared path.
    pub entries_inspected: usize,
    /// Entry content bytes loaded for binary matching.
    pub bytes_loaded: u64,
    /// Why the walk ended.
    pub stop: StopReason,
}

/// Outcome of one container identification request.
#[derive(Debug, Clone, Default)]
pub struct ContainerIdentification {
    /// One result per distinct format identifier, in signature order.
    pub results: Vec<IdentificationResult>,
    /// Walk counters.
    pub stats: ContainerScanStats,
}

/// Identifies formats inside containers of one type.
pub struct ContainerIdentifier {
    container_type: ContainerType,
    definitions: Arc<ContainerSignatureDefinitions>,
    signatures: Vec<usize>,
    required_paths: Vec<String>,
    formats: HashMap<u32, Vec<String>>,
    matcher: PathMatcher,
    config: IdentifierConfig,
}

impl fmt::Debug for ContainerIdentifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ContainerIdentifier")
            .field("container_type", &self.container_type)
            .field("signatures", &self.signatures.len())
            .field("required_paths", &self.required_paths.len())
            .finish_non_exhaustive()
    }
}

impl ContainerIdentifier {
    /// Prepares identification for `container_type`.
    ///
    /// Selects the signatures of that type, de-duplicates their declared
    /// paths and indexes the format mappings.
    pub fn new(
        definitions: Arc<ContainerSignatureDefinitions>,
        container_type: ContainerType,
        config: IdentifierConfig,
    ) -> Self {
        let matcher = PathMatcher::with_capacity(config.path_case, config.pattern_cache_capacity);
        let signatures: Vec<usize> = definitions
            .signatures()
            .iter()
            .enumerate()
            .filter(|(_, s)| s.container_type() == &container_type)
            .map(|(i, _)| i)
            .collect();
        let required_paths = unique_required_paths(
            signatures.iter().map(|&i| &definitions.signatures()[i]),
            &matcher,
        );
        let ids: HashSet<u32> = signatures
            .iter()
            .map(|&i| definitions.signatures()[i].id())
            .collect();
        let mut formats: HashMap<u32, Vec<String>> = HashMap::new();
        for mapping in definitions.format_mappings() {
            if ids.contains(&mapping.signature_id) {
                formats
                    .entry(mapping.signature_id)
                    .or_default()
                    .push(mapping.puid.clone());
            }
        }
        debug!(
            "{} identifier: {} signatures, {} distinct paths, {} mapped signatures",
            container_type,
            signatures.len(),
            required_paths.len(),
            formats.len()
        );
        Self {
            container_type,
            definitions,
            signatures,
            required_paths,
            formats,
            matcher,
            config,
        }
    }

    /// Container type handled.
    pub fn container_type(&self) -> &ContainerType {
        &self.container_type
    }

    /// Signatures of this container type.
    pub fn signatures(&self) -> impl Iterator<Item = &ContainerSignature> + '_ {
        self.signatures
            .iter()
            .map(|&i| &self.definitions.signatures()[i])
    }

    /// De-duplicated declared paths.
    pub fn required_paths(&self) -> &[String] {
        &self.required_paths
    }

    /// Format identifiers mapped to any signature of this type.
    pub fn mapped_puids(&self) -> impl Iterator<Item = &str> + '_ {
        self.formats.values().flatten().map(String::as_str)
    }

    /// Wires this identifier into the identification pipeline.
    ///
    /// Registers the identifier for its container type when some trigger
    /// names it, registers each trigger PUID with `resolver`, and withdraws
    /// binary signatures of every PUID this identifier can report so the
    /// same format is not found twice.
    pub fn register(
        this: &Arc<Self>,
        registry: &dyn ContainerIdentifierRegistry,
        resolver: &dyn FormatResolver,
        remover: &mut dyn SignatureRemover,
    ) {
        let triggers = this
            .definitions
            .trigger_puids()
            .iter()
            .filter(|t| t.container_type == this.container_type);
        let mut registered = false;
        for trigger in triggers {
            if !registered {
                registry.add_container_identifier(this.container_type.clone(), Arc::clone(this));
                registered = true;
            }
            resolver.register_puid(&trigger.puid, this.container_type.clone());
            debug!("Registered trigger {} for {} containers", trigger.puid, this.container_type);
        }
        for puid in this.mapped_puids() {
            remover.remove_signature_for_puid(puid);
        }
    }

    /// Identifies the container whose entries `entries` walks.
    ///
    /// `container_name` is the container's own file name, used by path
    /// patterns with the container name placeholder. I/O and archive
    /// failures are errors; running out of budget is not.
    pub fn identify<I>(&self, container_name: Option<&str>, entries: &mut I) -> Result<ContainerIdentification>
    where
        I: ContainerEntryIterator + ?Sized,
    {
        let limit = self.config.max_bytes_to_scan;
        let stop_when_all_matched = self.config.stop_when_all_matched;
        let kind = &self.container_type;
        let mut state = IdentificationState::Start;
        let mut stats = ContainerScanStats::default();
        let mut tracker = ContainerSignatureMatchCollection::new(
            self.signatures(),
            &self.required_paths,
            limit,
            &self.matcher,
            container_name,
        );

        if !self.signatures.is_empty() {
            debug!("{} identification: {} -> {}", kind, state, IdentificationState::StreamingEntries);
            state = IdentificationState::StreamingEntries;

            entries.for_each_entry(&mut |entry, content| {
                stats.entries_seen += 1;
                if !tracker.is_required(&entry.path) {
                    trace!("{}: skipping {:?}", kind, entry.path);
                    return Ok(ControlFlow::Continue(()));
                }
                stats.entries_inspected += 1;

                if !entry.is_directory && tracker.needs_binary_match(&entry.path) {
                    trace!("{}: {:?} -> {}", kind, entry.path, IdentificationState::EntryNeedsContent);
                    if limit.is_exhausted_by(stats.bytes_loaded) {
                        stats.stop = StopReason::BudgetReached;
                        return Ok(ControlFlow::Break(()));
                    }
                    let remaining = limit.bytes().map(|n| n.saturating_sub(stats.bytes_loaded));
                    let cap = match (tracker.content_reach(&entry.path), remaining) {
                        (Some(reach), Some(remaining)) => Some(reach.min(remaining)),
                        (reach, remaining) => reach.or(remaining),
                    };
                    let loaded = match cap {
                        Some(cap) => content.load_at_most(cap)?,
                        None => LoadedContent {
                            bytes: content.load()?,
                            complete: true,
                        },
                    };
                    stats.bytes_loaded += loaded.bytes.len() as u64;
                    let complete = loaded.complete;
                    let source = MemorySource::new(loaded.bytes).with_name(entry.path.clone());
                    if complete {
                        tracker.match_binary_content(&entry.path, &source)?;
                    } else {
                        trace!("{}: matching the first {} bytes of {:?}", kind, source.len(), entry.path);
                        tracker.match_content_prefix(&entry.path, &source)?;
                    }
                } else {
                    trace!("{}: {:?} -> {}", kind, entry.path, IdentificationState::EntryNeedsNoContent);
                }
                tracker.match_file_entry(&entry.path);

                if stop_when_all_matched && tracker.all_matched() {
                    stats.stop = StopReason::AllMatched;
                    Ok(ControlFlow::Break(()))
                } else if limit.is_exhausted_by(stats.bytes_loaded) && stats.bytes_loaded > 0 {
                    stats.stop = StopReason::BudgetReached;
                    Ok(ControlFlow::Break(()))
                } else {
                    Ok(ControlFlow::Continue(()))
                }
            })?;
        }

        debug!(
            "{} identification: {} -> {} ({:?} after {} entries, {} bytes loaded)",
            kind,
            state,
            IdentificationState::StreamExhaustedOrBudgetReached,
            stats.stop,
            stats.entries_seen,
            stats.bytes_loaded
        );
        state = IdentificationState::StreamExhaustedOrBudgetReached;

        let mut seen = HashSet::new();
        let mut results = Vec::new();
        for signature in tracker.matched_signatures() {
            let puids = self.formats.get(&signature.id()).into_iter().flatten();
            for puid in puids {
                if seen.insert(puid.as_str()) {
                    results.push(IdentificationResult::new(puid.clone(), IdentificationMethod::Container));
                }
            }
        }
        debug!(
            "{} identification: {} -> {} with {} results",
            kind,
            state,
            IdentificationState::Resolved,
            results.len()
        );
        Ok(ContainerIdentification { results, stats })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ScanLimit;
    use crate::container::entries::MemoryContainer;
    use crate::container::model::{ContainerFile, FileFormatMapping, TriggerPuid};
    use crate::container::registry::{ArchiveFormatResolver, ContainerIdentifierFactory};

    impl SignatureRemover for Vec<String> {
        fn remove_signature_for_puid(&mut self, puid: &str) {
            self.push(puid.to_string());
        }
    }

    const MZ: &str = r#"<InternalSignatureCollection>
        <InternalSignature ID="1"><ByteSequence Reference="BOFoffset">
          <SubSequence Position="1"><Sequence>4D 5A</Sequence></SubSequence>
        </ByteSequence></InternalSignature>
      </InternalSignatureCollection>"#;

    fn definitions() -> Arc<ContainerSignatureDefinitions> {
        Arc::new(ContainerSignatureDefinitions::new(
            vec![
                ContainerSignature::new(1, ContainerType::Zip, "docx")
                    .with_file(ContainerFile::new("word/document.xml"))
                    .with_file(ContainerFile::new("[Content_Types].xml").with_binary_signatures(MZ)),
                ContainerSignature::new(2, ContainerType::Zip, "empty"),
                ContainerSignature::new(3, ContainerType::Ole2, "doc")
                    .with_file(ContainerFile::new("WordDocument")),
            ],
            vec![
                FileFormatMapping::new(1, "fmt/412"),
                FileFormatMapping::new(1, "fmt/412"),
                FileFormatMapping::new(2, "fmt/0"),
                FileFormatMapping::new(3, "fmt/40"),
            ],
            vec![
                TriggerPuid::new(ContainerType::Zip, "x-fmt/263"),
                TriggerPuid::new(ContainerType::Zip, "x-fmt/412"),
            ],
        ))
    }

    fn docx_entries(content_types: &[u8]) -> MemoryContainer {
        MemoryContainer::new(ContainerType::Zip)
            .with_file("docProps/app.xml", b"<x/>".to_vec())
            .with_file("word/document.xml", b"<w/>".to_vec())
            .with_file("[Content_Types].xml", content_types.to_vec())
    }

    #[test]
    fn test_identifies_once_per_puid() {
        let identifier = ContainerIdentifier::new(definitions(), ContainerType::Zip, IdentifierConfig::default());
        assert_eq!(identifier.signatures().count(), 2);
        let found = identifier
            .identify(Some("a.docx"), &mut docx_entries(b"MZ\x00"))
            .unwrap();
        assert_eq!(found.results.len(), 1);
        assert_eq!(found.results[0].puid, "fmt/412");
        assert_eq!(found.results[0].method, IdentificationMethod::Container);
        assert_eq!(found.stats.entries_seen, 3);
        assert_eq!(found.stats.entries_inspected, 2);
        assert_eq!(found.stats.bytes_loaded, 2);
        assert_eq!(found.stats.stop, StopReason::AllMatched);
    }

    #[test]
    fn test_wrong_content_yields_nothing() {
        let identifier = ContainerIdentifier::new(definitions(), ContainerType::Zip, IdentifierConfig::default());
        let found = identifier
            .identify(Some("a.docx"), &mut docx_entries(b"PK\x03\x04"))
            .unwrap();
        assert!(found.results.is_empty());
        assert_eq!(found.stats.stop, StopReason::Exhausted);
    }

    #[test]
    fn test_budget_stops_content_loading() {
        let config = IdentifierConfig::default().max_bytes_to_scan(ScanLimit::Bytes(0));
        let identifier = ContainerIdentifier::new(definitions(), ContainerType::Zip, config);
        let found = identifier
            .identify(None, &mut docx_entries(b"MZ"))
            .unwrap();
        assert!(found.results.is_empty());
        assert_eq!(found.stats.bytes_loaded, 0);
        assert_eq!(found.stats.stop, StopReason::BudgetReached);
    }

    #[test]
    fn test_content_load_is_bounded() {
        let mut huge = vec![0u8; 8 << 20];
        huge[..2].copy_from_slice(b"MZ");
        let identifier = ContainerIdentifier::new(definitions(), ContainerType::Zip, IdentifierConfig::default());
        let found = identifier.identify(None, &mut docx_entries(&huge)).unwrap();
        assert_eq!(found.results.len(), 1);
        assert_eq!(found.stats.bytes_loaded, 2);

        let variable = r#"<InternalSignatureCollection>
            <InternalSignature ID="1"><ByteSequence Reference="Variable">
              <SubSequence Position="1"><Sequence>'PE'</Sequence></SubSequence>
            </ByteSequence></InternalSignature>
          </InternalSignatureCollection>"#;
        let defs = Arc::new(ContainerSignatureDefinitions::new(
            vec![ContainerSignature::new(7, ContainerType::Zip, "pe")
                .with_file(ContainerFile::new("[Content_Types].xml").with_binary_signatures(variable))],
            vec![FileFormatMapping::new(7, "fmt/899")],
            Vec::new(),
        ));
        let config = IdentifierConfig::default().max_bytes_to_scan(ScanLimit::Bytes(4));
        let identifier = ContainerIdentifier::new(defs, ContainerType::Zip, config);
        let mut tail = huge.clone();
        tail[(8 << 20) - 2..].copy_from_slice(b"PE");
        let found = identifier.identify(None, &mut docx_entries(&tail)).unwrap();
        assert!(found.results.is_empty());
        assert!(found.stats.bytes_loaded <= 4);
        assert_eq!(found.stats.stop, StopReason::BudgetReached);
    }

    #[test]
    fn test_no_early_stop_when_disabled() {
        let config = IdentifierConfig::default().stop_when_all_matched(false);
        let identifier = ContainerIdentifier::new(definitions(), ContainerType::Zip, config);
        let mut entries = MemoryContainer::new(ContainerType::Zip)
            .with_file("[Content_Types].xml", b"MZ".to_vec())
            .with_file("word/document.xml", b"<w/>".to_vec())
            .with_file("word/styles.xml", b"<s/>".to_vec());
        let found = identifier.identify(None, &mut entries).unwrap();
        assert_eq!(found.results.len(), 1);
        assert_eq!(found.stats.stop, StopReason::Exhausted);
        assert_eq!(found.stats.entries_seen, 3);
    }

    #[test]
    fn test_register() {
        let identifier = Arc::new(ContainerIdentifier::new(
            definitions(),
            ContainerType::Zip,
            IdentifierConfig::default(),
        ));
        let registry = ContainerIdentifierFactory::new();
        let resolver = ArchiveFormatResolver::new();
        let mut removed = Vec::<String>::new();
        ContainerIdentifier::register(&identifier, &registry, &resolver, &mut removed);

        assert!(registry.container_identifier(&ContainerType::Zip).is_some());
        assert!(registry.container_identifier(&ContainerType::Ole2).is_none());
        assert_eq!(resolver.for_puid("x-fmt/263"), Some(ContainerType::Zip));
        assert_eq!(resolver.for_puid("x-fmt/412"), Some(ContainerType::Zip));
        removed.sort();
        removed.dedup();
        assert_eq!(removed, vec!["fmt/0", "fmt/412"]);
    }
}
