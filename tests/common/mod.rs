//! Shared test utilities for integration tests.
//!
//! Signature file and container builders used across several test files.
//!
//! Note: `#![allow(dead_code)]` is required because each integration test file
//! compiles as a separate crate and may only use a subset of these helpers.

#![allow(dead_code)]

/// One declared container entry: path and optional nested signature XML.
pub struct FileSpec<'a> {
    pub path: &'a str,
    pub binary_signatures: Option<String>,
}

impl<'a> FileSpec<'a> {
    pub fn presence(path: &'a str) -> Self {
        Self {
            path,
            binary_signatures: None,
        }
    }

    pub fn with_signature(path: &'a str, xml: String) -> Self {
        Self {
            path,
            binary_signatures: Some(xml),
        }
    }
}

/// A nested `InternalSignatureCollection` with one BOF-anchored sequence.
pub fn bof_collection(id: u32, sequence: &str) -> String {
    format!(
        r#"<InternalSignatureCollection>
  <InternalSignature ID="{id}" Specificity="Specific">
    <ByteSequence Reference="BOFoffset">
      <SubSequence Position="1" SubSeqMinOffset="0" SubSeqMaxOffset="0">
        <Sequence>{sequence}</Sequence>
      </SubSequence>
    </ByteSequence>
  </InternalSignature>
</InternalSignatureCollection>"#
    )
}

/// XML for one `ContainerSignature` element.
pub fn container_signature(id: u32, container_type: &str, description: &str, files: &[FileSpec<'_>]) -> String {
    let mut xml = format!(
        r#"<ContainerSignature Id="{id}" ContainerType="{container_type}"><Description>{description}</Description><Files>"#
    );
    for file in files {
        xml.push_str("<File><Path>");
        xml.push_str(&escape(file.path));
        xml.push_str("</Path>");
        if let Some(signatures) = &file.binary_signatures {
            xml.push_str("<BinarySignatures>");
            xml.push_str(signatures);
            xml.push_str("</BinarySignatures>");
        }
        xml.push_str("</File>");
    }
    xml.push_str("</Files></ContainerSignature>");
    xml
}

/// A complete container signature file.
pub fn container_definitions(signatures: &[String], mappings: &[(u32, &str)], triggers: &[(&str, &str)]) -> String {
    let mut xml = String::from(
        r#"<?xml version="1.0" encoding="UTF-8"?><ContainerSignatureMapping schemaVersion="1.0" signatureVersion="1"><ContainerSignatures>"#,
    );
    for signature in signatures {
        xml.push_str(signature);
    }
    xml.push_str("</ContainerSignatures><FileFormatMappings>");
    for (id, puid) in mappings {
        xml.push_str(&format!(r#"<FileFormatMapping signatureId="{id}" Puid="{puid}"/>"#));
    }
    xml.push_str("</FileFormatMappings><TriggerPuids>");
    for (container_type, puid) in triggers {
        xml.push_str(&format!(r#"<TriggerPuid ContainerType="{container_type}" Puid="{puid}"/>"#));
    }
    xml.push_str("</TriggerPuids></ContainerSignatureMapping>");
    xml
}

/// One binary signature: id, anchor reference and sequence expression.
pub struct SignatureSpec<'a> {
    pub id: u32,
    pub reference: &'a str,
    pub sequence: &'a str,
}

/// One format: id, PUID, name, signature ids, extensions, priority-over ids.
pub struct FormatSpec<'a> {
    pub id: u32,
    pub puid: &'a str,
    pub name: &'a str,
    pub signatures: &'a [u32],
    pub extensions: &'a [&'a str],
    pub priority_over: &'a [u32],
}

/// A complete binary signature file.
pub fn signature_file(signatures: &[SignatureSpec<'_>], formats: &[FormatSpec<'_>]) -> String {
    let mut xml = String::from(
        r#"<?xml version="1.0" encoding="UTF-8"?><FFSignatureFile DateCreated="2024-01-01T00:00:00" Version="120"><InternalSignatureCollection>"#,
    );
    for s in signatures {
        xml.push_str(&format!(
            r#"<InternalSignature ID="{}" Specificity="Specific"><ByteSequence Reference="{}"><SubSequence Position="1" SubSeqMinOffset="0"><Sequence>{}</Sequence></SubSequence></ByteSequence></InternalSignature>"#,
            s.id,
            s.reference,
            escape(s.sequence)
        ));
    }
    xml.push_str("</InternalSignatureCollection><FileFormatCollection>");
    for f in formats {
        xml.push_str(&format!(
            r#"<FileFormat ID="{}" Name="{}" PUID="{}">"#,
            f.id,
            escape(f.name),
            f.puid
        ));
        for id in f.signatures {
            xml.push_str(&format!("<InternalSignatureID>{id}</InternalSignatureID>"));
        }
        for ext in f.extensions {
            xml.push_str(&format!("<Extension>{ext}</Extension>"));
        }
        for id in f.priority_over {
            xml.push_str(&format!("<HasPriorityOverFileFormatID>{id}</HasPriorityOverFileFormatID>"));
        }
        xml.push_str("</FileFormat>");
    }
    xml.push_str("</FileFormatCollection></FFSignatureFile>");
    xml
}

fn escape(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('\'', "&apos;")
}

/// Builds an in-memory ZIP archive from `(path, data)` pairs. Paths ending
/// in `/` become directory entries.
#[cfg(feature = "zip")]
pub fn create_zip(entries: &[(&str, &str)]) -> Vec<u8> {
    use std::io::{Cursor, Write};

    let mut writer = zip::ZipWriter::new(Cursor::new(Vec::new()));
    let options = zip::write::SimpleFileOptions::default();
    for (path, data) in entries {
        if path.ends_with('/') {
            writer.add_directory(*path, options).unwrap();
        } else {
            writer.start_file(*path, options).unwrap();
            writer.write_all(data.as_bytes()).unwrap();
        }
    }
    writer.finish().unwrap().into_inner()
}
