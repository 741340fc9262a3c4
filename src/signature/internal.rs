//! Internal signatures and signature collections.

use super::sequence::{Anchor, ByteSequence};
use crate::config::ScanLimit;
use crate::matcher;
use crate::source::ByteSource;
use crate::Result;

/// A binary signature: one or more byte sequences that must all match.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InternalSignature {
    id: u32,
    specific: bool,
    sequences: Vec<ByteSequence>,
}

impl InternalSignature {
    /// Creates a signature.
    pub fn new(id: u32, sequences: Vec<ByteSequence>) -> Self {
        Self {
            id,
            specific: false,
            sequences,
        }
    }

    /// Marks the signature as specific rather than generic.
    pub fn with_specific(mut self, specific: bool) -> Self {
        self.specific = specific;
        self
    }

    /// Signature identifier.
    pub fn id(&self) -> u32 {
        self.id
    }

    /// Returns true for a specific signature.
    pub fn is_specific(&self) -> bool {
        self.specific
    }

    /// The byte sequences.
    pub fn sequences(&self) -> &[ByteSequence] {
        &self.sequences
    }

    /// Tests the signature against `source`.
    pub fn matches<S: ByteSource + ?Sized>(&self, source: &S, limit: ScanLimit) -> Result<bool> {
        matcher::matches(source, self, limit)
    }

    /// Furthest offset from the start of a resource any sequence can touch,
    /// or `None` when the signature may need the whole resource.
    pub fn max_reach(&self) -> Option<u64> {
        self.sequences
            .iter()
            .try_fold(0u64, |acc, seq| Some(acc.max(seq.max_reach()?)))
    }

    /// Returns true if some sequence is anchored at the end of the resource.
    pub fn reads_from_end(&self) -> bool {
        self.sequences.iter().any(|seq| seq.anchor() == Anchor::EndOfFile)
    }

    /// Evaluation rank: cheap, anchored signatures first.
    ///
    /// | Rank | Kind |
    /// |------|------|
    /// | 1 | start-anchored, one sub-sequence |
    /// | 2 | start-anchored, several sub-sequences |
    /// | 3 | end-anchored, one sub-sequence |
    /// | 4 | end-anchored, several sub-sequences |
    /// | 5 | variable only |
    pub fn sort_order(&self) -> u8 {
        self.sequences
            .iter()
            .map(|seq| match (seq.anchor(), seq.subsequences().len() <= 1) {
                (Anchor::StartOfFile, true) => 1,
                (Anchor::StartOfFile, false) => 2,
                (Anchor::EndOfFile, true) => 3,
                (Anchor::EndOfFile, false) => 4,
                (Anchor::Variable, _) => 5,
            })
            .min()
            .unwrap_or(5)
    }
}

/// An ordered set of internal signatures.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InternalSignatureCollection {
    signatures: Vec<InternalSignature>,
}

impl InternalSignatureCollection {
    /// Creates an empty collection.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a signature.
    pub fn add(&mut self, signature: InternalSignature) {
        self.signatures.push(signature);
    }

    /// Number of signatures.
    pub fn len(&self) -> usize {
        self.signatures.len()
    }

    /// Returns true if the collection is empty.
    pub fn is_empty(&self) -> bool {
        self.signatures.is_empty()
    }

    /// Iterates signatures in evaluation order.
    pub fn iter(&self) -> std::slice::Iter<'_, InternalSignature> {
        self.signatures.iter()
    }

    /// Looks a signature up by id.
    pub fn get(&self, id: u32) -> Option<&InternalSignature> {
        self.signatures.iter().find(|s| s.id == id)
    }

    /// Removes the signature with `id`, returning it.
    pub fn remove(&mut self, id: u32) -> Option<InternalSignature> {
        let index = self.signatures.iter().position(|s| s.id == id)?;
        Some(self.signatures.remove(index))
    }

    /// Stable-sorts signatures by [`InternalSignature::sort_order`].
    pub fn sort_signatures(&mut self) {
        self.signatures.sort_by_key(InternalSignature::sort_order);
    }

    /// Largest [`InternalSignature::max_reach`] of the collection, or `None`
    /// when some signature may need the whole resource.
    pub fn max_reach(&self) -> Option<u64> {
        self.signatures
            .iter()
            .try_fold(0u64, |acc, signature| Some(acc.max(signature.max_reach()?)))
    }

    /// Returns every signature that matches `source`, in evaluation order.
    ///
    /// An empty resource matches nothing.
    pub fn matching_signatures<S: ByteSource + ?Sized>(
        &self,
        source: &S,
        limit: ScanLimit,
    ) -> Result<Vec<&InternalSignature>> {
        if source.is_empty() {
            return Ok(Vec::new());
        }
        let mut hits = Vec::new();
        for signature in &self.signatures {
            if matcher::matches(source, signature, limit)? {
                hits.push(signature);
            }
        }
        Ok(hits)
    }

    /// Returns true if at least one signature matches `source`.
    pub fn any_matches<S: ByteSource + ?Sized>(&self, source: &S, limit: ScanLimit) -> Result<bool> {
        if source.is_empty() {
            return Ok(false);
        }
        for signature in &self.signatures {
            if matcher::matches(source, signature, limit)? {
                return Ok(true);
            }
        }
        Ok(false)
    }

    /// Like [`any_matches`](Self::any_matches) for a source holding only the
    /// leading bytes of a longer resource.
    ///
    /// Signatures anchored at the end of the resource cannot be evaluated
    /// on a prefix and never match.
    pub fn any_matches_prefix<S: ByteSource + ?Sized>(&self, prefix: &S, limit: ScanLimit) -> Result<bool> {
        if prefix.is_empty() {
            return Ok(false);
        }
        for signature in self.signatures.iter().filter(|s| !s.reads_from_end()) {
            if matcher::matches(prefix, signature, limit)? {
                return Ok(true);
            }
        }
        Ok(false)
    }
}

impl FromIterator<InternalSignature> for InternalSignatureCollection {
    fn from_iter<I: IntoIterator<Item = InternalSignature>>(iter: I) -> Self {
        Self {
            signatures: iter.into_iter().collect(),
        }
    }
}

impl<'a> IntoIterator for &'a InternalSignatureCollection {
    type Item = &'a InternalSignature;
    type IntoIter = std::slice::Iter<'a, InternalSignature>;

    fn into_iter(self) -> Self::IntoIter {
        self.signatures.iter()
    }
}
