//! XML loading of internal signature collections.
//!
//! Reads the `InternalSignatureCollection` element shared by binary
//! signature files and the nested signatures of container definitions:
//!
//! ```xml
//! <InternalSignatureCollection>
//!   <InternalSignature ID="1" Specificity="Specific">
//!     <ByteSequence Reference="BOFoffset">
//!       <SubSequence Position="1" SubSeqMinOffset="0" SubSeqMaxOffset="0">
//!         <Sequence>4D 5A</Sequence>
//!       </SubSequence>
//!     </ByteSequence>
//!   </InternalSignature>
//! </InternalSignatureCollection>
//! ```
//!
//! A signature the matcher cannot evaluate (bad sequence expression,
//! indirect offsets, fragments) is dropped with a warning and the rest of
//! the collection still loads. Malformed XML fails the whole collection.

use std::fmt;
use std::path::Path;

use log::warn;
use quick_xml::events::{BytesStart, Event};
use quick_xml::reader::Reader;

use super::internal::{InternalSignature, InternalSignatureCollection};
use super::parser::{SequenceAssembler, parse_sequence};
use super::sequence::{Anchor, ByteSequence, Gap};
use crate::{Error, Result};

pub(crate) const COLLECTION_ELEMENT: &str = "InternalSignatureCollection";

/// Reads a definition file as text.
///
/// Missing files and non-UTF-8 content are both unreadable.
pub(crate) fn read_definition_file(path: &Path) -> Result<String> {
    std::fs::read_to_string(path).map_err(|source| Error::SignatureFileUnreadable {
        path: path.to_path_buf(),
        source,
    })
}

/// Creates a reader over in-memory XML text.
pub(crate) fn xml_reader(text: &str) -> Reader<&[u8]> {
    let mut reader = Reader::from_str(text);
    reader.config_mut().trim_text(true);
    reader
}

/// Wraps a low-level XML failure as an invalid signature file.
pub(crate) fn xml_error(err: impl fmt::Display) -> Error {
    Error::invalid_file(format!("malformed XML: {}", err))
}

/// Local (prefix-free) element name.
pub(crate) fn local_name(e: &BytesStart<'_>) -> String {
    String::from_utf8_lossy(e.local_name().as_ref()).into_owned()
}

/// Decoded attributes of an element, in document order.
pub(crate) fn attributes(e: &BytesStart<'_>) -> Result<Vec<(String, String)>> {
    let mut out = Vec::new();
    for attr in e.attributes() {
        let attr = attr.map_err(xml_error)?;
        let key = String::from_utf8_lossy(attr.key.local_name().as_ref()).into_owned();
        let value = attr.unescape_value().map_err(xml_error)?.into_owned();
        out.push((key, value));
    }
    Ok(out)
}

/// Parses a numeric attribute value.
pub(crate) fn parse_number<T: std::str::FromStr>(element: &str, key: &str, value: &str) -> Result<T> {
    value.trim().parse().map_err(|_| {
        Error::InvalidSignature(format!(
            "{} attribute {} has non-numeric value {:?}",
            element, key, value
        ))
    })
}

impl InternalSignatureCollection {
    /// Parses a collection from XML text containing an
    /// `InternalSignatureCollection` element.
    ///
    /// Signatures that cannot be evaluated are skipped with a warning.
    ///
    /// # Example
    ///
    /// ```rust
    /// use formatsig::signature::InternalSignatureCollection;
    ///
    /// let xml = r#"<InternalSignatureCollection>
    ///   <InternalSignature ID="7">
    ///     <ByteSequence Reference="BOFoffset">
    ///       <SubSequence Position="1" SubSeqMinOffset="0">
    ///         <Sequence>'%PDF'</Sequence>
    ///       </SubSequence>
    ///     </ByteSequence>
    ///   </InternalSignature>
    /// </InternalSignatureCollection>"#;
    /// let collection = InternalSignatureCollection::from_xml(xml)?;
    /// assert_eq!(collection.len(), 1);
    /// # Ok::<(), formatsig::Error>(())
    /// ```
    pub fn from_xml(xml: &str) -> Result<Self> {
        let mut reader = xml_reader(xml);
        loop {
            match reader.read_event().map_err(xml_error)? {
                Event::Start(e) if local_name(&e) == COLLECTION_ELEMENT => {
                    return read_signature_collection(&mut reader);
                }
                Event::Empty(e) if local_name(&e) == COLLECTION_ELEMENT => {
                    return Ok(InternalSignatureCollection::new());
                }
                Event::Eof => {
                    return Err(Error::invalid_file(format!(
                        "no {} element found",
                        COLLECTION_ELEMENT
                    )));
                }
                _ => {}
            }
        }
    }
}

/// Reads signatures up to the end tag of an `InternalSignatureCollection`
/// whose start tag has already been consumed.
pub(crate) fn read_signature_collection(
    reader: &mut Reader<&[u8]>,
) -> Result<InternalSignatureCollection> {
    let mut state = CollectionReader::default();
    loop {
        match reader.read_event().map_err(xml_error)? {
            Event::Start(e) => state.open(&local_name(&e), &e)?,
            Event::Empty(e) => {
                let name = local_name(&e);
                state.open(&name, &e)?;
                state.close(&name)?;
            }
            Event::Text(e) if state.in_sequence_text => {
                let text = e.unescape().map_err(xml_error)?;
                state.push_text(&text);
            }
            Event::CData(e) if state.in_sequence_text => {
                state.push_text(&String::from_utf8_lossy(&e));
            }
            Event::End(e) => {
                let name = String::from_utf8_lossy(e.local_name().as_ref()).into_owned();
                if name == COLLECTION_ELEMENT {
                    return Ok(state.collection);
                }
                state.close(&name)?;
            }
            Event::Eof => {
                return Err(Error::invalid_file(format!(
                    "document ended inside {}",
                    COLLECTION_ELEMENT
                )));
            }
            _ => {}
        }
    }
}

#[derive(Debug)]
struct SignatureDraft {
    id: Option<u32>,
    specific: bool,
    sequences: Vec<ByteSequence>,
    error: Option<Error>,
}

impl SignatureDraft {
    fn fail(&mut self, error: Error) {
        if self.error.is_none() {
            self.error = Some(error);
        }
    }
}

#[derive(Debug)]
struct SequenceDraft {
    anchor: Option<Anchor>,
    subsequences: Vec<SubSequenceDraft>,
}

#[derive(Debug, Default)]
struct SubSequenceDraft {
    position: u32,
    min_offset: Option<u64>,
    max_offset: Option<u64>,
    text: Option<String>,
}

#[derive(Default)]
struct CollectionReader {
    collection: InternalSignatureCollection,
    signature: Option<SignatureDraft>,
    sequence: Option<SequenceDraft>,
    subsequence: Option<SubSequenceDraft>,
    in_sequence_text: bool,
}

impl CollectionReader {
    fn signature_mut(&mut self, element: &str) -> Result<&mut SignatureDraft> {
        self.signature.as_mut().ok_or_else(|| {
            Error::invalid_file(format!("<{}> outside <InternalSignature>", element))
        })
    }

    fn open(&mut self, name: &str, e: &BytesStart<'_>) -> Result<()> {
        match name {
            "InternalSignature" => {
                let mut draft = SignatureDraft {
                    id: None,
                    specific: false,
                    sequences: Vec::new(),
                    error: None,
                };
                for (key, value) in attributes(e)? {
                    match key.as_str() {
                        "ID" => match parse_number(name, &key, &value) {
                            Ok(id) => draft.id = Some(id),
                            Err(err) => draft.fail(err),
                        },
                        "Specificity" => draft.specific = value.eq_ignore_ascii_case("Specific"),
                        _ => {}
                    }
                }
                self.signature = Some(draft);
            }
            "ByteSequence" => {
                let attrs = attributes(e)?;
                let reference = attrs
                    .iter()
                    .find(|(k, _)| k == "Reference")
                    .map_or("", |(_, v)| v.as_str());
                let anchor = Anchor::from_reference(reference);
                let signature = self.signature_mut(name)?;
                let anchor = match anchor {
                    Ok(anchor) => Some(anchor),
                    Err(err) => {
                        signature.fail(err);
                        None
                    }
                };
                self.sequence = Some(SequenceDraft {
                    anchor,
                    subsequences: Vec::new(),
                });
            }
            "SubSequence" => {
                let mut draft = SubSequenceDraft::default();
                let mut failure = None;
                for (key, value) in attributes(e)? {
                    let parsed = match key.as_str() {
                        "Position" => parse_number(name, &key, &value).map(|v| draft.position = v),
                        "SubSeqMinOffset" => {
                            parse_number(name, &key, &value).map(|v| draft.min_offset = Some(v))
                        }
                        "SubSeqMaxOffset" => {
                            parse_number(name, &key, &value).map(|v| draft.max_offset = Some(v))
                        }
                        _ => Ok(()),
                    };
                    if let Err(err) = parsed {
                        failure.get_or_insert(err);
                    }
                }
                let signature = self.signature_mut(name)?;
                if let Some(err) = failure {
                    signature.fail(err);
                }
                self.subsequence = Some(draft);
            }
            "Sequence" => {
                if let Some(sub) = self.subsequence.as_mut() {
                    sub.text.get_or_insert_with(String::new);
                    self.in_sequence_text = true;
                }
            }
            "LeftFragment" | "RightFragment" => {
                self.signature_mut(name)?.fail(Error::InvalidSignature(
                    "left and right fragments are not supported".into(),
                ));
            }
            _ => {}
        }
        Ok(())
    }

    fn push_text(&mut self, text: &str) {
        if let Some(buffer) = self.subsequence.as_mut().and_then(|s| s.text.as_mut()) {
            buffer.push_str(text);
        }
    }

    fn close(&mut self, name: &str) -> Result<()> {
        match name {
            "Sequence" => self.in_sequence_text = false,
            "SubSequence" => {
                if let (Some(sub), Some(sequence)) = (self.subsequence.take(), self.sequence.as_mut()) {
                    sequence.subsequences.push(sub);
                }
            }
            "ByteSequence" => {
                let Some(draft) = self.sequence.take() else {
                    return Ok(());
                };
                let signature = self.signature_mut(name)?;
                if let Some(anchor) = draft.anchor {
                    match assemble(anchor, draft.subsequences) {
                        Ok(sequence) => signature.sequences.push(sequence),
                        Err(err) => signature.fail(err),
                    }
                }
            }
            "InternalSignature" => {
                if let Some(draft) = self.signature.take() {
                    self.finish_signature(draft);
                }
            }
            _ => {}
        }
        Ok(())
    }

    fn finish_signature(&mut self, draft: SignatureDraft) {
        let Some(id) = draft.id else {
            warn!("Ignoring internal signature without a valid ID");
            return;
        };
        if let Some(err) = draft.error {
            warn!("Ignoring internal signature {}: {}", id, err);
            return;
        }
        if draft.sequences.is_empty() {
            warn!("Ignoring internal signature {}: no byte sequences", id);
            return;
        }
        self.collection
            .add(InternalSignature::new(id, draft.sequences).with_specific(draft.specific));
    }
}

/// Builds a sequence from its sub-sequence elements, ordered by `Position`.
///
/// Only the sub-sequence searched first from the anchor (the first for
/// `BOFoffset`, the last for `EOFoffset`) is bounded by its maximum offset,
/// which defaults to the minimum. Every other sub-sequence, and every
/// sub-sequence of a variable sequence, may sit any distance past its
/// minimum offset.
fn assemble(anchor: Anchor, mut subsequences: Vec<SubSequenceDraft>) -> Result<ByteSequence> {
    if subsequences.is_empty() {
        return Err(Error::InvalidSignature("byte sequence has no sub-sequences".into()));
    }
    subsequences.sort_by_key(|s| s.position);

    let anchored = match anchor {
        Anchor::StartOfFile => Some(0),
        Anchor::EndOfFile => Some(subsequences.len() - 1),
        Anchor::Variable => None,
    };
    let mut assembler = SequenceAssembler::new(anchor);
    for (i, sub) in subsequences.into_iter().enumerate() {
        let text = sub.text.ok_or_else(|| {
            Error::InvalidSignature(format!("sub-sequence {} has no Sequence", sub.position))
        })?;
        let min = sub.min_offset.unwrap_or(0);
        let offset = if anchored == Some(i) {
            Gap::between(min, sub.max_offset.unwrap_or(min))
        } else {
            Gap::at_least(min)
        };
        assembler.push(parse_sequence(&text)?, offset);
    }
    Ok(assembler.finish())
}
