//! End-to-end identification of ZIP based formats.

#![cfg(feature = "zip")]

mod common;

use common::{FileSpec, FormatSpec, SignatureSpec, bof_collection, container_definitions, container_signature};
use formatsig::container::{ContainerType, FormatResolver, StopReason};
use formatsig::{
    BinarySignatureFile, ContainerSignatureDefinitions, FormatIdentifier, IdentificationMethod, IdentificationRequest,
    IdentifierConfig, MemorySource,
};

fn binary_signatures() -> BinarySignatureFile {
    common::signature_file(
        &[SignatureSpec {
            id: 1,
            reference: "BOFoffset",
            sequence: "'PK' 03 04",
        }],
        &[
            FormatSpec {
                id: 10,
                puid: "x-fmt/263",
                name: "ZIP Format",
                signatures: &[1],
                extensions: &["zip"],
                priority_over: &[],
            },
            FormatSpec {
                id: 11,
                puid: "fmt/412",
                name: "Microsoft Word for Windows",
                signatures: &[],
                extensions: &["docx"],
                priority_over: &[],
            },
        ],
    )
    .parse()
    .unwrap()
}

fn container_signatures() -> ContainerSignatureDefinitions {
    container_definitions(
        &[container_signature(
            1000,
            "ZIP",
            "Word OOXML",
            &[
                FileSpec::presence("word/document.xml"),
                FileSpec::with_signature("[Content_Types].xml", bof_collection(1, "4D 5A")),
            ],
        )],
        &[(1000, "fmt/412")],
        &[("ZIP", "x-fmt/263")],
    )
    .parse()
    .unwrap()
}

fn pipeline() -> FormatIdentifier {
    FormatIdentifier::new(binary_signatures(), container_signatures(), IdentifierConfig::default())
}

fn identify(identifier: &FormatIdentifier, bytes: Vec<u8>, name: &str) -> formatsig::IdentificationResultCollection {
    let request = IdentificationRequest::new(MemorySource::new(bytes)).with_file_name(name);
    identifier.identify(&request).unwrap()
}

#[test]
fn test_docx_identified_by_container() {
    let zip = common::create_zip(&[
        ("word/", ""),
        ("word/document.xml", "<w:document/>"),
        ("[Content_Types].xml", "MZ not really xml"),
    ]);
    let results = identify(&pipeline(), zip, "report.docx");
    assert_eq!(results.puids().collect::<Vec<_>>(), vec!["fmt/412"]);
    let result = &results.results()[0];
    assert_eq!(result.method, IdentificationMethod::Container);
    assert_eq!(result.name.as_deref(), Some("Microsoft Word for Windows"));
    assert!(!results.extension_mismatch());
}

#[test]
fn test_plain_zip_keeps_binary_result() {
    let zip = common::create_zip(&[
        ("word/document.xml", "<w:document/>"),
        ("[Content_Types].xml", "PK"),
    ]);
    let results = identify(&pipeline(), zip, "archive.docx");
    assert_eq!(results.puids().collect::<Vec<_>>(), vec!["x-fmt/263"]);
    assert_eq!(results.results()[0].method, IdentificationMethod::Binary);
    assert!(results.extension_mismatch());
}

#[test]
fn test_corrupt_zip_falls_back_to_binary_result() {
    let mut bytes = b"PK\x03\x04".to_vec();
    bytes.extend_from_slice(&[0u8; 64]);
    let results = identify(&pipeline(), bytes, "broken.zip");
    assert_eq!(results.puids().collect::<Vec<_>>(), vec!["x-fmt/263"]);
    assert!(!results.extension_mismatch());
}

#[test]
fn test_identify_container_directly() {
    let identifier = pipeline();
    let zip = common::create_zip(&[
        ("[Content_Types].xml", "MZ"),
        ("word/document.xml", "<w:document/>"),
        ("word/styles.xml", "<w:styles/>"),
    ]);
    let request = IdentificationRequest::new(MemorySource::new(zip)).with_file_name("a.docx");
    let found = identifier.identify_container(&ContainerType::Zip, &request).unwrap();
    assert_eq!(found.results.len(), 1);
    assert_eq!(found.stats.stop, StopReason::AllMatched);
    assert_eq!(found.stats.entries_seen, 2);
    assert_eq!(found.stats.bytes_loaded, 2);
}

#[test]
fn test_unregistered_container_type() {
    let identifier = pipeline();
    let request = IdentificationRequest::new(MemorySource::new(Vec::new()));
    let err = identifier
        .identify_container(&ContainerType::Ole2, &request)
        .unwrap_err();
    assert!(matches!(err, formatsig::Error::UnsupportedContainer(_)));
}

#[test]
fn test_trigger_registered() {
    let identifier = pipeline();
    assert_eq!(identifier.resolver().for_puid("x-fmt/263"), Some(ContainerType::Zip));
    assert_eq!(identifier.resolver().for_puid("fmt/412"), None);
}
