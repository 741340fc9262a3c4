//! Binary signature files.
//!
//! A binary signature file pairs an [`InternalSignatureCollection`] with the
//! table of file formats those signatures identify:
//!
//! ```xml
//! <FFSignatureFile Version="1" DateCreated="2024-01-01T00:00:00">
//!   <InternalSignatureCollection>...</InternalSignatureCollection>
//!   <FileFormatCollection>
//!     <FileFormat ID="1" Name="Portable Document Format" PUID="fmt/14" Version="1.0" MIMEType="application/pdf">
//!       <InternalSignatureID>7</InternalSignatureID>
//!       <Extension>pdf</Extension>
//!       <HasPriorityOverFileFormatID>2</HasPriorityOverFileFormatID>
//!     </FileFormat>
//!   </FileFormatCollection>
//! </FFSignatureFile>
//! ```
//!
//! Formats that declare no internal signature are *tentative*: they can only
//! be identified by extension.

use std::collections::HashMap;
use std::io::Read;
use std::path::Path;
use std::str::FromStr;

use log::{debug, warn};
use quick_xml::events::{BytesStart, Event};

use super::internal::{InternalSignature, InternalSignatureCollection};
use super::xml::{
    COLLECTION_ELEMENT, attributes, local_name, parse_number, read_definition_file,
    read_signature_collection, xml_error, xml_reader,
};
use crate::{Error, Result};

const ROOT_ELEMENT: &str = "FFSignatureFile";

/// One entry of the file format table.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct FileFormat {
    id: u32,
    name: String,
    puid: String,
    version: String,
    mime_type: String,
    signature_ids: Vec<u32>,
    extensions: Vec<String>,
    priority_over: Vec<u32>,
}

impl FileFormat {
    /// Creates a format with no signatures or extensions.
    pub fn new(id: u32, puid: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id,
            puid: puid.into(),
            name: name.into(),
            ..Self::default()
        }
    }

    /// Sets the format version.
    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.version = version.into();
        self
    }

    /// Sets the MIME type.
    pub fn with_mime_type(mut self, mime_type: impl Into<String>) -> Self {
        self.mime_type = mime_type.into();
        self
    }

    /// Adds an internal signature id.
    pub fn with_signature(mut self, id: u32) -> Self {
        self.signature_ids.push(id);
        self
    }

    /// Adds an extension.
    pub fn with_extension(mut self, extension: impl Into<String>) -> Self {
        self.extensions.push(extension.into());
        self
    }

    /// Declares that this format takes priority over format `id`.
    pub fn with_priority_over(mut self, id: u32) -> Self {
        self.priority_over.push(id);
        self
    }

    /// Numeric format id.
    pub fn id(&self) -> u32 {
        self.id
    }

    /// Human-readable name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Format identifier (PUID).
    pub fn puid(&self) -> &str {
        &self.puid
    }

    /// Format version, empty if none.
    pub fn version(&self) -> &str {
        &self.version
    }

    /// MIME type, empty if none.
    pub fn mime_type(&self) -> &str {
        &self.mime_type
    }

    /// Ids of the internal signatures identifying this format.
    pub fn signature_ids(&self) -> &[u32] {
        &self.signature_ids
    }

    /// Declared extensions, as written in the file.
    pub fn extensions(&self) -> &[String] {
        &self.extensions
    }

    /// Ids of the formats this one takes priority over.
    pub fn priority_over(&self) -> &[u32] {
        &self.priority_over
    }

    /// Returns true if the format declares `extension`, ignoring case.
    pub fn has_extension(&self, extension: &str) -> bool {
        self.extensions.iter().any(|e| e.eq_ignore_ascii_case(extension))
    }

    /// Returns true if the format declares extensions and `extension` is
    /// not one of them.
    pub fn has_extension_mismatch(&self, extension: &str) -> bool {
        !self.extensions.is_empty() && !self.has_extension(extension)
    }

    /// Returns true if the format has no internal signature.
    pub fn is_tentative(&self) -> bool {
        self.signature_ids.is_empty()
    }
}

/// A loaded binary signature file with its lookup tables.
#[derive(Debug, Clone, Default)]
pub struct BinarySignatureFile {
    version: Option<String>,
    date_created: Option<String>,
    signatures: InternalSignatureCollection,
    formats: Vec<FileFormat>,
    by_puid: HashMap<String, usize>,
    by_id: HashMap<u32, usize>,
    signature_formats: HashMap<u32, Vec<usize>>,
    extension_formats: HashMap<String, Vec<usize>>,
    tentative_formats: HashMap<String, Vec<usize>>,
}

impl BinarySignatureFile {
    /// Builds a signature file from already-parsed parts.
    ///
    /// Signatures are put into evaluation order and linked to the formats
    /// that reference them.
    pub fn new(mut signatures: InternalSignatureCollection, formats: Vec<FileFormat>) -> Self {
        signatures.sort_signatures();
        let mut file = Self {
            signatures,
            formats,
            ..Self::default()
        };
        file.build_indexes();
        file
    }

    /// Loads a signature file from disk.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = read_definition_file(path)?;
        let file: Self = text.parse()?;
        debug!(
            "Loaded {} internal signatures and {} formats from {}",
            file.signatures.len(),
            file.formats.len(),
            path.display()
        );
        Ok(file)
    }

    /// Loads a signature file from a reader.
    pub fn from_reader<R: Read>(mut reader: R) -> Result<Self> {
        let mut text = String::new();
        reader.read_to_string(&mut text)?;
        text.parse()
    }

    fn build_indexes(&mut self) {
        for (index, format) in self.formats.iter().enumerate() {
            if self.by_puid.insert(format.puid.clone(), index).is_some() {
                warn!("Duplicate format PUID {}; the later entry wins", format.puid);
            }
            self.by_id.insert(format.id, index);
            for &id in &format.signature_ids {
                if self.signatures.get(id).is_some() {
                    self.signature_formats.entry(id).or_default().push(index);
                }
            }
            for extension in &format.extensions {
                let key = extension.to_uppercase();
                if format.is_tentative() {
                    self.tentative_formats.entry(key.clone()).or_default().push(index);
                }
                self.extension_formats.entry(key).or_default().push(index);
            }
        }
    }

    /// Version attribute of the file.
    pub fn version(&self) -> Option<&str> {
        self.version.as_deref()
    }

    /// Creation date attribute of the file.
    pub fn date_created(&self) -> Option<&str> {
        self.date_created.as_deref()
    }

    /// Internal signatures in evaluation order.
    pub fn signatures(&self) -> &InternalSignatureCollection {
        &self.signatures
    }

    /// Every format, in file order.
    pub fn formats(&self) -> &[FileFormat] {
        &self.formats
    }

    /// Looks a format up by PUID.
    pub fn format_for_puid(&self, puid: &str) -> Option<&FileFormat> {
        self.by_puid.get(puid).map(|&i| &self.formats[i])
    }

    /// Looks a format up by numeric id.
    pub fn format_for_id(&self, id: u32) -> Option<&FileFormat> {
        self.by_id.get(&id).map(|&i| &self.formats[i])
    }

    /// Formats identified by `signature`.
    pub fn formats_for_signature<'a>(
        &'a self,
        signature: &InternalSignature,
    ) -> impl Iterator<Item = &'a FileFormat> + 'a {
        self.signature_formats
            .get(&signature.id())
            .into_iter()
            .flatten()
            .map(|&i| &self.formats[i])
    }

    /// Every format declaring `extension`, ignoring case.
    pub fn formats_for_extension(&self, extension: &str) -> Vec<&FileFormat> {
        self.lookup(&self.extension_formats, extension)
    }

    /// Tentative formats declaring `extension`, ignoring case.
    pub fn tentative_formats_for_extension(&self, extension: &str) -> Vec<&FileFormat> {
        self.lookup(&self.tentative_formats, extension)
    }

    fn lookup(&self, table: &HashMap<String, Vec<usize>>, extension: &str) -> Vec<&FileFormat> {
        table
            .get(&extension.to_uppercase())
            .map(|indexes| indexes.iter().map(|&i| &self.formats[i]).collect())
            .unwrap_or_default()
    }

    /// Withdraws binary identification for `puid` because another method
    /// (typically a container signature) identifies it.
    ///
    /// The format loses its internal signatures, signatures left without
    /// any format are dropped, and the format stops being offered as a
    /// tentative extension match. Returns false if the PUID is unknown.
    pub fn remove_signature_for_puid(&mut self, puid: &str) -> bool {
        let Some(&index) = self.by_puid.get(puid) else {
            return false;
        };
        let removed = std::mem::take(&mut self.formats[index].signature_ids);
        for id in removed {
            let Some(owners) = self.signature_formats.get_mut(&id) else {
                continue;
            };
            owners.retain(|&i| i != index);
            if owners.is_empty() {
                self.signature_formats.remove(&id);
                self.signatures.remove(id);
                debug!("Removed internal signature {} superseded for {}", id, puid);
            }
        }
        for extension in &self.formats[index].extensions {
            let key = extension.to_uppercase();
            if let Some(list) = self.tentative_formats.get_mut(&key) {
                list.retain(|&i| i != index);
                if list.is_empty() {
                    self.tentative_formats.remove(&key);
                }
            }
        }
        true
    }
}

impl FromStr for BinarySignatureFile {
    type Err = Error;

    fn from_str(xml: &str) -> Result<Self> {
        let mut reader = xml_reader(xml);
        let mut seen_root = false;
        let mut root_open = false;
        let mut version = None;
        let mut date_created = None;
        let mut signatures = InternalSignatureCollection::new();
        let mut formats = Vec::new();
        let mut current: Option<FormatDraft> = None;
        let mut field: Option<String> = None;

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
                    for (key, value) in attributes(&e)? {
                        match key.as_str() {
                            "Version" => version = Some(value),
                            "DateCreated" => date_created = Some(value),
                            _ => {}
                        }
                    }
                }
                Event::Start(e) => match local_name(&e).as_str() {
                    COLLECTION_ELEMENT => signatures = read_signature_collection(&mut reader)?,
                    "FileFormat" => current = Some(FormatDraft::open(&e)?),
                    name if current.is_some() => field = Some(name.to_string()),
                    _ => {}
                },
                Event::Empty(e) => {
                    if local_name(&e) == "FileFormat" {
                        FormatDraft::open(&e)?.finish(&mut formats);
                    }
                }
                Event::Text(e) => {
                    if let (Some(draft), Some(name)) = (current.as_mut(), field.as_deref()) {
                        let text = e.unescape().map_err(xml_error)?;
                        draft.set_field(name, text.trim());
                    }
                }
                Event::End(e) => {
                    if e.local_name().as_ref() == ROOT_ELEMENT.as_bytes() {
                        root_open = false;
                    }
                    if e.local_name().as_ref() == b"FileFormat" {
                        if let Some(draft) = current.take() {
                            draft.finish(&mut formats);
                        }
                    }
                    field = None;
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
        let mut file = Self::new(signatures, formats);
        file.version = version;
        file.date_created = date_created;
        Ok(file)
    }
}

struct FormatDraft {
    format: FileFormat,
    valid: bool,
}

impl FormatDraft {
    fn open(e: &BytesStart<'_>) -> Result<Self> {
        let mut format = FileFormat::default();
        let mut valid = false;
        for (key, value) in attributes(e)? {
            match key.as_str() {
                "ID" => match parse_number::<u32>("FileFormat", &key, &value) {
                    Ok(id) => {
                        format.id = id;
                        valid = true;
                    }
                    Err(err) => warn!("Ignoring file format: {}", err),
                },
                "Name" => format.name = value,
                "PUID" => format.puid = value,
                "Version" => format.version = value,
                "MIMEType" => format.mime_type = value,
                _ => {}
            }
        }
        Ok(Self { format, valid })
    }

    fn set_field(&mut self, name: &str, text: &str) {
        let id = || match text.parse::<u32>() {
            Ok(id) => Some(id),
            Err(_) => {
                warn!("Format {}: ignoring non-numeric {} {:?}", self.format.puid, name, text);
                None
            }
        };
        match name {
            "InternalSignatureID" => {
                if let Some(id) = id() {
                    self.format.signature_ids.push(id);
                }
            }
            "HasPriorityOverFileFormatID" => {
                if let Some(id) = id() {
                    self.format.priority_over.push(id);
                }
            }
            "Extension" if !text.is_empty() => self.format.extensions.push(text.to_string()),
            _ => {}
        }
    }

    fn finish(self, formats: &mut Vec<FileFormat>) {
        if self.valid {
            formats.push(self.format);
        } else {
            warn!("Ignoring file format {:?} without a valid ID", self.format.puid);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ScanLimit;
    use crate::source::MemorySource;

    const SAMPLE: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<FFSignatureFile xmlns="http://www.nationalarchives.gov.uk/pronom/SignatureFile" Version="118" DateCreated="2024-09-01T00:00:00">
  <InternalSignatureCollection>
    <InternalSignature ID="10" Specificity="Generic">
      <ByteSequence Reference="BOFoffset">
        <SubSequence Position="1" SubSeqMinOffset="0" SubSeqMaxOffset="0">
          <Sequence>504B0304</Sequence>
        </SubSequence>
      </ByteSequence>
    </InternalSignature>
    <InternalSignature ID="20" Specificity="Specific">
      <ByteSequence Reference="EOFoffset">
        <SubSequence Position="1" SubSeqMinOffset="0">
          <Sequence>'%%EOF'</Sequence>
        </SubSequence>
      </ByteSequence>
    </InternalSignature>
  </InternalSignatureCollection>
  <FileFormatCollection>
    <FileFormat ID="1" Name="ZIP Format" PUID="x-fmt/263" Version="2.0" MIMEType="application/zip">
      <InternalSignatureID>10</InternalSignatureID>
      <Extension>zip</Extension>
    </FileFormat>
    <FileFormat ID="2" Name="Office Open XML Document" PUID="fmt/412">
      <InternalSignatureID>10</InternalSignatureID>
      <Extension>docx</Extension>
      <HasPriorityOverFileFormatID>1</HasPriorityOverFileFormatID>
    </FileFormat>
    <FileFormat ID="3" Name="PDF" PUID="fmt/14">
      <InternalSignatureID>20</InternalSignatureID>
      <Extension>pdf</Extension>
    </FileFormat>
    <FileFormat ID="4" Name="Plain Text" PUID="x-fmt/111">
      <Extension>TXT</Extension>
      <Extension>docx</Extension>
    </FileFormat>
  </FileFormatCollection>
</FFSignatureFile>"#;

    fn sample() -> BinarySignatureFile {
        SAMPLE.parse().unwrap()
    }

    #[test]
    fn test_loads_header_and_tables() {
        let file = sample();
        assert_eq!(file.version(), Some("118"));
        assert_eq!(file.date_created(), Some("2024-09-01T00:00:00"));
        assert_eq!(file.signatures().len(), 2);
        assert_eq!(file.formats().len(), 4);

        let docx = file.format_for_puid("fmt/412").unwrap();
        assert_eq!(docx.id(), 2);
        assert_eq!(docx.priority_over(), &[1]);
        assert_eq!(file.format_for_id(1).unwrap().mime_type(), "application/zip");
    }

    #[test]
    fn test_signature_links() {
        let file = sample();
        let zip = file.signatures().get(10).unwrap();
        let puids: Vec<&str> = file.formats_for_signature(zip).map(|f| f.puid()).collect();
        assert_eq!(puids, vec!["x-fmt/263", "fmt/412"]);

        let source = MemorySource::new(&b"PK\x03\x04rest"[..]);
        let hits = file
            .signatures()
            .matching_signatures(&source, ScanLimit::Unlimited)
            .unwrap();
        assert_eq!(hits.len(), 1);
    }

    #[test]
    fn test_extension_tables_ignore_case() {
        let file = sample();
        let all: Vec<&str> = file
            .formats_for_extension("DocX")
            .iter()
            .map(|f| f.puid())
            .collect();
        assert_eq!(all, vec!["fmt/412", "x-fmt/111"]);
        let tentative: Vec<&str> = file
            .tentative_formats_for_extension("txt")
            .iter()
            .map(|f| f.puid())
            .collect();
        assert_eq!(tentative, vec!["x-fmt/111"]);
        assert!(file.formats_for_extension("none").is_empty());
    }

    #[test]
    fn test_remove_signature_for_puid() {
        let mut file = sample();
        assert!(file.remove_signature_for_puid("fmt/412"));
        assert!(file.format_for_puid("fmt/412").unwrap().signature_ids().is_empty());
        // Still referenced by x-fmt/263.
        let zip = file.signatures().get(10).unwrap().clone();
        let puids: Vec<&str> = file.formats_for_signature(&zip).map(|f| f.puid()).collect();
        assert_eq!(puids, vec!["x-fmt/263"]);

        assert!(file.remove_signature_for_puid("x-fmt/263"));
        assert!(file.signatures().get(10).is_none());

        assert!(file.remove_signature_for_puid("x-fmt/111"));
        assert!(file.tentative_formats_for_extension("txt").is_empty());
        assert!(!file.remove_signature_for_puid("fmt/unknown"));
    }

    #[test]
    fn test_extension_mismatch() {
        let file = sample();
        let pdf = file.format_for_puid("fmt/14").unwrap();
        assert!(!pdf.has_extension_mismatch("PDF"));
        assert!(pdf.has_extension_mismatch("doc"));
        assert!(!FileFormat::new(9, "x", "none").has_extension_mismatch("doc"));
    }

    #[test]
    fn test_wrong_root_is_invalid() {
        let err = "<Other/>".parse::<BinarySignatureFile>().unwrap_err();
        assert!(err.is_signature_file_error());
        let err = "".parse::<BinarySignatureFile>().unwrap_err();
        assert!(err.is_signature_file_error());
    }

    #[test]
    fn test_missing_file_is_unreadable() {
        let err = BinarySignatureFile::from_path("/nonexistent/signatures.xml").unwrap_err();
        assert!(matches!(err, Error::SignatureFileUnreadable { .. }));
    }
}
