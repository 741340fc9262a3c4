//! Container identification over in-memory entry streams.

mod common;

use std::sync::Arc;

use common::{FileSpec, bof_collection, container_definitions, container_signature};
use formatsig::container::{
    ArchiveFormatResolver, ContainerIdentifierFactory, ContainerIdentifierRegistry, FormatResolver,
    MemoryContainer, StopReason,
};
use formatsig::{
    BinarySignatureFile, ContainerIdentifier, ContainerSignatureDefinitions, ContainerType, IdentificationMethod,
    IdentifierConfig, PathCase, ScanLimit,
};

fn word_definitions(nested: String) -> ContainerSignatureDefinitions {
    let xml = container_definitions(
        &[container_signature(
            1000,
            "ZIP",
            "Word OOXML",
            &[
                FileSpec::presence("word/document.xml"),
                FileSpec::with_signature("[Content_Types].xml", nested),
            ],
        )],
        &[(1000, "fmt/412")],
        &[("ZIP", "x-fmt/263")],
    );
    xml.parse().unwrap()
}

fn identifier(definitions: ContainerSignatureDefinitions, config: IdentifierConfig) -> ContainerIdentifier {
    ContainerIdentifier::new(Arc::new(definitions), ContainerType::Zip, config)
}

fn word_entries(content_types: &[u8]) -> MemoryContainer {
    MemoryContainer::new(ContainerType::Zip)
        .with_file("_rels/.rels", b"<Relationships/>".to_vec())
        .with_file("word/document.xml", b"<w:document/>".to_vec())
        .with_file("[Content_Types].xml", content_types.to_vec())
}

#[test]
fn test_nested_signature_match_emits_one_result() {
    let id = identifier(word_definitions(bof_collection(1, "4D 5A")), IdentifierConfig::default());
    let found = id
        .identify(Some("report.docx"), &mut word_entries(b"MZ\x90\x00"))
        .unwrap();
    assert_eq!(found.results.len(), 1);
    assert_eq!(found.results[0].puid, "fmt/412");
    assert_eq!(found.results[0].method, IdentificationMethod::Container);
}

#[test]
fn test_nested_signature_mismatch_emits_nothing() {
    let id = identifier(word_definitions(bof_collection(1, "4D 5A")), IdentifierConfig::default());
    let found = id
        .identify(Some("report.docx"), &mut word_entries(b"PK\x03\x04"))
        .unwrap();
    assert!(found.results.is_empty());
}

#[test]
fn test_malformed_nested_signature_matches_by_presence() {
    let definitions = word_definitions(bof_collection(1, "4D 5G"));
    assert!(definitions.signatures()[0].files()[1].has_binary_signatures());

    let id = identifier(definitions, IdentifierConfig::default());
    let found = id
        .identify(Some("report.docx"), &mut word_entries(b"anything"))
        .unwrap();
    assert_eq!(found.results.len(), 1);
    assert_eq!(found.stats.bytes_loaded, 0);
    let file = &id.signatures().next().unwrap().files()[1];
    assert!(file.compile_error().is_some());
    assert!(file.compiled_signatures().is_none());
}

#[test]
fn test_missing_required_entry() {
    let id = identifier(word_definitions(bof_collection(1, "4D 5A")), IdentifierConfig::default());
    let mut entries = MemoryContainer::new(ContainerType::Zip).with_file("[Content_Types].xml", b"MZ".to_vec());
    let found = id.identify(None, &mut entries).unwrap();
    assert!(found.results.is_empty());
    assert_eq!(found.stats.stop, StopReason::Exhausted);
}

#[test]
fn test_empty_container_matches_nothing() {
    let id = identifier(word_definitions(bof_collection(1, "4D 5A")), IdentifierConfig::default());
    let found = id
        .identify(Some("empty.zip"), &mut MemoryContainer::new(ContainerType::Zip))
        .unwrap();
    assert!(found.results.is_empty());
    assert_eq!(found.stats.entries_seen, 0);
}

#[test]
fn test_signature_without_files_never_matches() {
    let xml = container_definitions(
        &[container_signature(7, "ZIP", "nothing required", &[])],
        &[(7, "fmt/7")],
        &[],
    );
    let id = identifier(xml.parse().unwrap(), IdentifierConfig::default());
    let found = id
        .identify(Some("a.zip"), &mut word_entries(b"MZ"))
        .unwrap();
    assert!(found.results.is_empty());
}

#[test]
fn test_container_name_placeholder() {
    let xml = container_definitions(
        &[container_signature(
            5,
            "OLE2",
            "named stream",
            &[FileSpec::presence("{containerFileName}.xml")],
        )],
        &[(5, "fmt/5")],
        &[("OLE2", "fmt/111")],
    );
    let definitions: ContainerSignatureDefinitions = xml.parse().unwrap();
    let id = ContainerIdentifier::new(Arc::new(definitions), ContainerType::Ole2, IdentifierConfig::default());

    let mut matching = MemoryContainer::new(ContainerType::Ole2).with_file("report.xml", Vec::new());
    let found = id.identify(Some("report.docx"), &mut matching).unwrap();
    assert_eq!(found.results.len(), 1);

    let mut other = MemoryContainer::new(ContainerType::Ole2).with_file("other.xml", Vec::new());
    assert!(id.identify(Some("report.docx"), &mut other).unwrap().results.is_empty());
}

#[test]
fn test_budget_exhaustion_is_not_an_error() {
    let xml = container_definitions(
        &[container_signature(
            9,
            "ZIP",
            "two nested",
            &[
                FileSpec::with_signature("a.bin", bof_collection(1, "'AAAA'")),
                FileSpec::with_signature("b.bin", bof_collection(2, "'BBBB'")),
            ],
        )],
        &[(9, "fmt/9")],
        &[],
    );
    let config = IdentifierConfig::default().max_bytes_to_scan(ScanLimit::Bytes(6));
    let id = identifier(xml.parse().unwrap(), config);
    let mut entries = MemoryContainer::new(ContainerType::Zip)
        .with_file("a.bin", b"AAAAAAAAAAAA".to_vec())
        .with_file("b.bin", b"BBBB".to_vec());
    let found = id.identify(None, &mut entries).unwrap();
    assert!(found.results.is_empty());
    assert_eq!(found.stats.stop, StopReason::BudgetReached);
    assert_eq!(found.stats.bytes_loaded, 6);
    assert_eq!(found.stats.entries_inspected, 2);
}

#[test]
fn test_large_entry_loads_only_what_signatures_reach() {
    let id = identifier(word_definitions(bof_collection(1, "4D 5A")), IdentifierConfig::default());
    let mut content_types = vec![b'x'; 4 << 20];
    content_types[..2].copy_from_slice(b"MZ");
    let found = id
        .identify(Some("report.docx"), &mut word_entries(&content_types))
        .unwrap();
    assert_eq!(found.results.len(), 1);
    assert_eq!(found.stats.bytes_loaded, 2);
}

#[test]
fn test_single_letter_entry_does_not_satisfy_bracketed_path() {
    let xml = container_definitions(
        &[container_signature(
            3,
            "ZIP",
            "OOXML",
            &[FileSpec::presence("[Content_Types].xml"), FileSpec::presence("_rels/.rels")],
        )],
        &[(3, "fmt/189")],
        &[],
    );
    let id = identifier(xml.parse().unwrap(), IdentifierConfig::default());
    let mut lookalike = MemoryContainer::new(ContainerType::Zip)
        .with_file("_rels/.rels", Vec::new())
        .with_file("t.xml", Vec::new());
    let found = id.identify(None, &mut lookalike).unwrap();
    assert!(found.results.is_empty());
    assert_eq!(found.stats.entries_inspected, 1);

    let mut real = MemoryContainer::new(ContainerType::Zip)
        .with_file("_rels/.rels", Vec::new())
        .with_file("[Content_Types].xml", Vec::new());
    assert_eq!(id.identify(None, &mut real).unwrap().results.len(), 1);
}

#[test]
fn test_case_insensitive_paths() {
    let config = IdentifierConfig::default().path_case(PathCase::Insensitive);
    let id = identifier(word_definitions(bof_collection(1, "4D 5A")), config);
    let mut entries = MemoryContainer::new(ContainerType::Zip)
        .with_file("WORD/Document.XML", Vec::new())
        .with_file("[content_types].XML", b"MZ".to_vec());
    assert_eq!(id.identify(None, &mut entries).unwrap().results.len(), 1);

    let sensitive = identifier(word_definitions(bof_collection(1, "4D 5A")), IdentifierConfig::default());
    let mut entries = MemoryContainer::new(ContainerType::Zip)
        .with_file("WORD/Document.XML", Vec::new())
        .with_file("[content_types].XML", b"MZ".to_vec());
    assert!(sensitive.identify(None, &mut entries).unwrap().results.is_empty());
}

#[test]
fn test_registration_withdraws_binary_signatures() {
    let mut binary: BinarySignatureFile = common::signature_file(
        &[
            common::SignatureSpec {
                id: 1,
                reference: "BOFoffset",
                sequence: "'PK' 03 04",
            },
            common::SignatureSpec {
                id: 2,
                reference: "BOFoffset",
                sequence: "'PK' 03 04 14 00 06 00",
            },
        ],
        &[
            common::FormatSpec {
                id: 10,
                puid: "x-fmt/263",
                name: "ZIP Format",
                signatures: &[1],
                extensions: &["zip"],
                priority_over: &[],
            },
            common::FormatSpec {
                id: 11,
                puid: "fmt/412",
                name: "Microsoft Word for Windows",
                signatures: &[2],
                extensions: &["docx"],
                priority_over: &[10],
            },
        ],
    )
    .parse()
    .unwrap();
    assert_eq!(binary.signatures().len(), 2);

    let id = Arc::new(identifier(word_definitions(bof_collection(1, "4D 5A")), IdentifierConfig::default()));
    let registry = ContainerIdentifierFactory::new();
    let resolver = ArchiveFormatResolver::new();
    ContainerIdentifier::register(&id, &registry, &resolver, &mut binary);

    assert_eq!(resolver.for_puid("x-fmt/263"), Some(ContainerType::Zip));
    assert!(registry.container_identifier(&ContainerType::Zip).is_some());
    assert_eq!(binary.signatures().len(), 1);
    assert!(binary.format_for_puid("fmt/412").unwrap().signature_ids().is_empty());
    assert_eq!(binary.format_for_puid("x-fmt/263").unwrap().signature_ids(), &[1]);
}

#[test]
fn test_shared_identifier_across_threads() {
    let id = Arc::new(identifier(
        word_definitions(bof_collection(1, "4D 5A")),
        IdentifierConfig::default(),
    ));
    let handles: Vec<_> = (0..8)
        .map(|i| {
            let id = Arc::clone(&id);
            std::thread::spawn(move || {
                let content: &[u8] = if i % 2 == 0 { b"MZ" } else { b"PK" };
                id.identify(Some("x.docx"), &mut word_entries(content))
                    .unwrap()
                    .results
                    .len()
            })
        })
        .collect();
    let counts: Vec<usize> = handles.into_iter().map(|h| h.join().unwrap()).collect();
    assert_eq!(counts, vec![1, 0, 1, 0, 1, 0, 1, 0]);
}
