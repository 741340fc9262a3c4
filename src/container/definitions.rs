//! Container signature definition loading.
//!
//! Reads the container signature XML document:
//!
//! ```xml
//! <ContainerSignatureMapping schemaVersion="1.0" signatureVersion="1">
//!   <ContainerSignatures>
//!     <ContainerSignature Id="1000" ContainerType="ZIP">
//!       <Description>Microsoft Word OOXML</Description>
//!       <Files>
//!         <File><Path>word/document.xml</Path></File>
//!         <File>
//!           <Path>[Content_Types].xml</Path>
//!           <BinarySignatures>
//!             <InternalSignatureCollection>...</InternalSignatureCollection>
//!           </BinarySignatures>
//!         </File>
//!       </Files>
//!     </ContainerSignature>
//!   </ContainerSignatures>
//!   <FileFormatMappings>
//!     <FileFormatMapping signatureId="1000" Puid="fmt/412"/>
//!   </FileFormatMappings>
//!   <TriggerPuids>
//!     <TriggerPuid ContainerType="ZIP" Puid="x-fmt/263"/>
//!   </TriggerPuids>
//! </ContainerSignatureMapping>
//! ```
//!
//! Nested binary signatures are kept as raw XML and compiled on first use.
//! Malformed individual rows are skipped with a warning; malformed XML
//! fails the whole load.

use std::io::Read;
use std::path::Path;
use std::str::FromStr;

use log::{debug, warn};
use quick_xml::events::{BytesStart, Event};

use super::model::{
    ContainerFile, ContainerSignature, ContainerSignatureDefinitions, ContainerType,
    FileFormatMapping, TriggerPuid,
};
use crate::signature::xml::{attributes, local_name, read_definition_file, xml_error, xml_reader};
use crate::{Error, Result};

const ROOT_ELEMENT: &str = "ContainerSignatureMapping";

impl ContainerSignatureDefinitions {
    /// Loads definitions from a file.
    ///
    /// A missing or unreadable file yields
    /// [`Error::SignatureFileUnreadable`]; content that is not a valid
    /// definition yields [`Error::SignatureFileInvalid`].
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = read_definition_file(path)?;
        let defs: Self = text.parse()?;
        debug!(
            "Loaded {} container signatures, {} mappings and {} triggers from {}",
            defs.signatures().len(),
            defs.format_mappings().len(),
            defs.trigger_puids().len(),
            path.display()
        );
        Ok(defs)
    }

    /// Loads definitions from a reader.
    pub fn from_reader<R: Read>(mut reader: R) -> Result<Self> {
        let mut text = String::new();
        reader.read_to_string(&mut text)?;
        text.parse()
    }
}

impl FromStr for ContainerSignatureDefinitions {
    type Err = Error;

    fn from_str(xml: &str) -> Result<Self> {
        let mut reader = xml_reader(xml);
        let mut seen_root = false;
        let mut root_open = false;
        let mut signatures = Vec::new();
        let mut mappings = Vec::new();
        let mut triggers = Vec::new();
        let mut signature: Option<SignatureDraft> = None;
        let mut file: Option<FileDraft> = None;
        let mut field: Option<Field> = None;

        loop {
            let event = reader.read_event().map_err(xml_error)?;
            let is_start = matches!(event, Event::Start(_));
            match event {
                Event::Start(e) | Event::Empty(e) if !seen_root => {
                    let name = local_name(&e);
                    if name != ROOT_ELEMENT {
                        return Err(Error::invalid_file(format!(
                            "expected <{}> root element, found <{}>",
                            ROOT_ELEMENT, name
                        )));
                    }
                    seen_root = true;
                    root_open = is_start;
                }
                Event::Start(e) => match local_name(&e).as_str() {
                    "ContainerSignature" => signature = Some(SignatureDraft::open(&e)?),
                    "Description" => field = Some(Field::Description),
                    "File" => file = Some(FileDraft::default()),
                    "Path" => field = Some(Field::Path),
                    "BinarySignatures" => {
                        let end = e.to_end().into_owned();
                        let raw = reader.read_text(end.name()).map_err(xml_error)?;
                        if let Some(file) = file.as_mut() {
                            file.binary_signatures = Some(raw.into_owned());
                        }
                    }
                    "FileFormatMapping" => push_mapping(&e, &mut mappings)?,
                    "TriggerPuid" => push_trigger(&e, &mut triggers)?,
                    _ => {}
                },
                Event::Empty(e) => match local_name(&e).as_str() {
                    "FileFormatMapping" => push_mapping(&e, &mut mappings)?,
                    "TriggerPuid" => push_trigger(&e, &mut triggers)?,
                    _ => {}
                },
                Event::Text(e) => {
                    if let Some(target) = field {
                        let text = e.unescape().map_err(xml_error)?;
                        match target {
                            Field::Description => {
                                if let Some(draft) = signature.as_mut() {
                                    draft.description.push_str(&text);
                                }
                            }
                            Field::Path => {
                                if let Some(draft) = file.as_mut() {
                                    draft.path.push_str(&text);
                                }
                            }
                        }
                    }
                }
                Event::End(e) => {
                    field = None;
                    match e.local_name().as_ref() {
                        b"File" => {
                            if let (Some(done), Some(draft)) = (file.take(), signature.as_mut()) {
                                draft.add_file(done);
                            }
                        }
                        name if name == ROOT_ELEMENT.as_bytes() => root_open = false,
                        b"ContainerSignature" => {
                            if let Some(draft) = signature.take() {
                                if let Some(done) = draft.finish() {
                                    signatures.push(done);
                                }
                            }
                        }
                        _ => {}
                    }
                }
                Event::Eof => break,
                _ => {}
            }
        }

        if !seen_root {
            return Err(Error::invalid_file(format!("no <{}> element found", ROOT_ELEMENT)));
        }
        if root_open {
            return Err(Error::invalid_file(format!("document ended inside <{}>", ROOT_ELEMENT)));
        }
        Ok(ContainerSignatureDefinitions::new(signatures, mappings, triggers))
    }
}

#[derive(Debug, Clone, Copy)]
enum Field {
    Description,
    Path,
}

#[derive(Debug)]
struct SignatureDraft {
    id: Option<u32>,
    container_type: Option<ContainerType>,
    description: String,
    files: Vec<ContainerFile>,
    valid: bool,
}

impl SignatureDraft {
    fn open(e: &BytesStart<'_>) -> Result<Self> {
        let mut draft = SignatureDraft {
            id: None,
            container_type: None,
            description: String::new(),
            files: Vec::new(),
            valid: true,
        };
        for (key, value) in attributes(e)? {
            match key.as_str() {
                "Id" => draft.id = value.trim().parse().ok(),
                "ContainerType" => draft.container_type = Some(ContainerType::parse(&value)),
                _ => {}
            }
        }
        Ok(draft)
    }

    fn add_file(&mut self, file: FileDraft) {
        let path = file.path.trim();
        if path.is_empty() {
            self.valid = false;
            return;
        }
        let mut done = ContainerFile::new(path);
        if let Some(xml) = file.binary_signatures {
            done = done.with_binary_signatures(xml);
        }
        self.files.push(done);
    }

    fn finish(self) -> Option<ContainerSignature> {
        let (Some(id), Some(container_type)) = (self.id, self.container_type) else {
            warn!("Ignoring container signature without a valid Id and ContainerType");
            return None;
        };
        if !self.valid {
            warn!("Ignoring container signature {}: a file has no path", id);
            return None;
        }
        let mut signature = ContainerSignature::new(id, container_type, self.description.trim());
        for file in self.files {
            signature = signature.with_file(file);
        }
        Some(signature)
    }
}

#[derive(Debug, Default)]
struct FileDraft {
    path: String,
    binary_signatures: Option<String>,
}

fn attribute<'a>(attrs: &'a [(String, String)], key: &str) -> Option<&'a str> {
    attrs
        .iter()
        .find(|(k, _)| k.eq_ignore_ascii_case(key))
        .map(|(_, v)| v.trim())
        .filter(|v| !v.is_empty())
}

fn push_mapping(e: &BytesStart<'_>, mappings: &mut Vec<FileFormatMapping>) -> Result<()> {
    let attrs = attributes(e)?;
    let id = attribute(&attrs, "signatureId").and_then(|v| v.parse::<u32>().ok());
    match (id, attribute(&attrs, "Puid")) {
        (Some(id), Some(puid)) => mappings.push(FileFormatMapping::new(id, puid)),
        _ => warn!("Ignoring malformed FileFormatMapping {:?}", attrs),
    }
    Ok(())
}

fn push_trigger(e: &BytesStart<'_>, triggers: &mut Vec<TriggerPuid>) -> Result<()> {
    let attrs = attributes(e)?;
    match (attribute(&attrs, "ContainerType"), attribute(&attrs, "Puid")) {
        (Some(container_type), Some(puid)) => {
            triggers.push(TriggerPuid::new(ContainerType::parse(container_type), puid))
        }
        _ => warn!("Ignoring malformed TriggerPuid {:?}", attrs),
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SignatureFileErrorKind;
    use std::io::Write;

    const DEFINITIONS: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<ContainerSignatureMapping schemaVersion="1.0" signatureVersion="42">
  <ContainerSignatures>
    <ContainerSignature Id="1000" ContainerType="ZIP">
      <Description>Microsoft Word &amp; OOXML</Description>
      <Files>
        <File><Path>word/document.xml</Path></File>
        <File>
          <Path>[Content_Types].xml</Path>
          <BinarySignatures>
            <InternalSignatureCollection>
              <InternalSignature ID="1000">
                <ByteSequence Reference="BOFoffset">
                  <SubSequence Position="1" SubSeqMinOffset="0" SubSeqMaxOffset="0">
                    <Sequence>4D 5A</Sequence>
                  </SubSequence>
                </ByteSequence>
              </InternalSignature>
            </InternalSignatureCollection>
          </BinarySignatures>
        </File>
      </Files>
    </ContainerSignature>
    <ContainerSignature Id="2000" ContainerType="OLE2">
      <Description>Word 97</Description>
      <Files><File><Path>WordDocument</Path></File></Files>
    </ContainerSignature>
    <ContainerSignature Id="bogus" ContainerType="ZIP">
      <Files><File><Path>x</Path></File></Files>
    </ContainerSignature>
  </ContainerSignatures>
  <FileFormatMappings>
    <FileFormatMapping signatureId="1000" Puid="fmt/412"/>
    <FileFormatMapping signatureId="2000" Puid="fmt/40"/>
    <FileFormatMapping signatureId="" Puid="fmt/0"/>
  </FileFormatMappings>
  <TriggerPuids>
    <TriggerPuid ContainerType="ZIP" Puid="x-fmt/263"/>
    <TriggerPuid ContainerType="OLE2" Puid="fmt/111"/>
  </TriggerPuids>
</ContainerSignatureMapping>"#;

    #[test]
    fn test_parse_definitions() {
        let defs: ContainerSignatureDefinitions = DEFINITIONS.parse().unwrap();
        assert_eq!(defs.signatures().len(), 2);

        let docx = defs.signature(1000).unwrap();
        assert_eq!(docx.container_type(), &ContainerType::Zip);
        assert_eq!(docx.description(), "Microsoft Word & OOXML");
        assert_eq!(docx.files().len(), 2);
        assert!(!docx.files()[0].has_binary_signatures());
        let nested = docx.file("[Content_Types].xml").unwrap();
        assert!(nested.binary_signatures_xml().unwrap().contains("InternalSignatureCollection"));
        assert_eq!(nested.compiled_signatures().unwrap().len(), 1);

        assert_eq!(defs.format_mappings().len(), 2);
        assert_eq!(defs.trigger_puids()[1], TriggerPuid::new(ContainerType::Ole2, "fmt/111"));
    }

    #[test]
    fn test_wrong_root_is_invalid() {
        let err = "<FFSignatureFile/>".parse::<ContainerSignatureDefinitions>().unwrap_err();
        assert_eq!(err.signature_file_error_kind(), Some(SignatureFileErrorKind::Invalid));
        let err = "<ContainerSignatureMapping><Files></Oops>"
            .parse::<ContainerSignatureDefinitions>()
            .unwrap_err();
        assert_eq!(err.signature_file_error_kind(), Some(SignatureFileErrorKind::Invalid));
    }

    #[test]
    fn test_from_path_distinguishes_failures() {
        let missing = ContainerSignatureDefinitions::from_path("/no/such/container-signature.xml")
            .unwrap_err();
        assert_eq!(missing.signature_file_error_kind(), Some(SignatureFileErrorKind::Unreadable));

        let mut binary = tempfile::NamedTempFile::new().unwrap();
        binary.write_all(&[0xFF, 0xFE, 0x00, 0x80]).unwrap();
        let err = ContainerSignatureDefinitions::from_path(binary.path()).unwrap_err();
        assert_eq!(err.signature_file_error_kind(), Some(SignatureFileErrorKind::Unreadable));

        let mut valid = tempfile::NamedTempFile::new().unwrap();
        valid.write_all(DEFINITIONS.as_bytes()).unwrap();
        let defs = ContainerSignatureDefinitions::from_path(valid.path()).unwrap();
        assert_eq!(defs.trigger_puids().len(), 2);
    }
}
