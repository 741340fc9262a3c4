//! Byte sequences: anchored, ordered runs of sub-sequences.

use std::fmt;
use std::ops::Add;

use super::pattern::BytePattern;
use crate::{Error, Result};

/// Reference point of a byte sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Anchor {
    /// Measured forward from the first byte.
    StartOfFile,
    /// Measured backward from the last byte.
    EndOfFile,
    /// Found anywhere within the scan budget.
    Variable,
}

impl Anchor {
    /// Parses a `Reference` attribute value.
    ///
    /// A missing or empty reference is [`Anchor::Variable`]. Indirect
    /// offsets are rejected.
    pub fn from_reference(reference: &str) -> Result<Self> {
        match reference.trim() {
            "BOFoffset" => Ok(Anchor::StartOfFile),
            "EOFoffset" => Ok(Anchor::EndOfFile),
            "" | "Variable" => Ok(Anchor::Variable),
            other if other.starts_with("Indirect") => Err(Error::InvalidSignature(format!(
                "indirect offset reference {:?} is not supported",
                other
            ))),
            other => Err(Error::InvalidSignature(format!(
                "unknown byte sequence reference {:?}",
                other
            ))),
        }
    }

    /// Returns the `Reference` attribute value for this anchor.
    pub fn as_reference(&self) -> &'static str {
        match self {
            Anchor::StartOfFile => "BOFoffset",
            Anchor::EndOfFile => "EOFoffset",
            Anchor::Variable => "Variable",
        }
    }
}

impl fmt::Display for Anchor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_reference())
    }
}

/// Allowed distance between two matches, in bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Gap {
    /// Minimum distance.
    pub min: u64,
    /// Maximum distance, `None` for unbounded.
    pub max: Option<u64>,
}

impl Gap {
    /// A gap of exactly zero bytes.
    pub const NONE: Gap = Gap {
        min: 0,
        max: Some(0),
    };

    /// A gap of exactly `n` bytes.
    pub fn exact(n: u64) -> Self {
        Gap { min: n, max: Some(n) }
    }

    /// A gap of `min..=max` bytes. A maximum below the minimum is raised to it.
    pub fn between(min: u64, max: u64) -> Self {
        Gap {
            min,
            max: Some(max.max(min)),
        }
    }

    /// A gap of at least `min` bytes.
    pub fn at_least(min: u64) -> Self {
        Gap { min, max: None }
    }

    /// Returns true for a gap of fixed width.
    pub fn is_fixed(&self) -> bool {
        self.max == Some(self.min)
    }
}

impl Add for Gap {
    type Output = Gap;

    fn add(self, other: Gap) -> Gap {
        Gap {
            min: self.min.saturating_add(other.min),
            max: match (self.max, other.max) {
                (Some(a), Some(b)) => Some(a.saturating_add(b)),
                _ => None,
            },
        }
    }
}

impl fmt::Display for Gap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.max {
            Some(max) if max == self.min => write!(f, "{{{}}}", self.min),
            Some(max) => write!(f, "{{{}-{}}}", self.min, max),
            None => write!(f, "{{{}-*}}", self.min),
        }
    }
}

/// A byte pattern plus its distance bound.
///
/// In a forward sequence ([`Anchor::StartOfFile`] or [`Anchor::Variable`])
/// the gap runs from the end of the previous sub-sequence, or from byte 0
/// for the first, to the start of this one. In an [`Anchor::EndOfFile`]
/// sequence it runs from the end of this sub-sequence to the start of the
/// next one, or to the end of the resource for the last.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubSequence {
    pattern: BytePattern,
    gap: Gap,
}

impl SubSequence {
    /// Creates a sub-sequence with the given distance bound.
    pub fn new(pattern: BytePattern, gap: Gap) -> Self {
        Self { pattern, gap }
    }

    /// Creates a sub-sequence that sits directly against its reference point.
    pub fn adjacent(pattern: BytePattern) -> Self {
        Self::new(pattern, Gap::NONE)
    }

    /// Returns the pattern.
    pub fn pattern(&self) -> &BytePattern {
        &self.pattern
    }

    /// Returns the distance bound.
    pub fn gap(&self) -> Gap {
        self.gap
    }

    pub(crate) fn gap_mut(&mut self) -> &mut Gap {
        &mut self.gap
    }

    /// Pattern length in bytes.
    pub fn len(&self) -> usize {
        self.pattern.len()
    }

    /// Returns true if the pattern is empty.
    pub fn is_empty(&self) -> bool {
        self.pattern.is_empty()
    }
}

/// An anchored, ordered list of sub-sequences.
///
/// Sub-sequences are stored in file order regardless of anchor. The
/// sequence matches when every sub-sequence is found in order within its
/// gap bound and within the scan budget.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ByteSequence {
    anchor: Anchor,
    subsequences: Vec<SubSequence>,
}

impl ByteSequence {
    /// Creates a sequence.
    pub fn new(anchor: Anchor, subsequences: Vec<SubSequence>) -> Self {
        Self {
            anchor,
            subsequences,
        }
    }

    /// Creates a sequence holding one literal run at a fixed offset from its anchor.
    pub fn literal(anchor: Anchor, offset: u64, bytes: &[u8]) -> Self {
        let gap = match anchor {
            Anchor::Variable => Gap::at_least(offset),
            _ => Gap::exact(offset),
        };
        Self::new(
            anchor,
            vec![SubSequence::new(BytePattern::from_bytes(bytes), gap)],
        )
    }

    /// Returns the anchor.
    pub fn anchor(&self) -> Anchor {
        self.anchor
    }

    /// Returns the sub-sequences in file order.
    pub fn subsequences(&self) -> &[SubSequence] {
        &self.subsequences
    }

    /// Returns true if there are no sub-sequences.
    pub fn is_empty(&self) -> bool {
        self.subsequences.is_empty()
    }

    /// Furthest offset from the start of a resource that a match can
    /// touch, or `None` when the sequence may read anywhere.
    ///
    /// Only start-anchored sequences with bounded gaps have a reach.
    pub fn max_reach(&self) -> Option<u64> {
        if self.anchor != Anchor::StartOfFile {
            return None;
        }
        self.subsequences.iter().try_fold(0u64, |acc, s| {
            Some(acc.saturating_add(s.gap.max?).saturating_add(s.len() as u64))
        })
    }

    /// Smallest number of bytes a match can span.
    pub fn min_span(&self) -> u64 {
        self.subsequences
            .iter()
            .fold(0u64, |acc, s| {
                acc.saturating_add(s.len() as u64)
                    .saturating_add(s.gap.min)
            })
    }
}
