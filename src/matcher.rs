//! Binary signature matching.
//!
//! [`matches`] decides whether an [`InternalSignature`] matches a
//! [`ByteSource`]. The search is a pure function of its inputs: no state
//! survives between calls and distinct sources can be matched concurrently.
//!
//! # Search strategy
//!
//! Start-anchored and variable sequences are searched forward from byte 0,
//! end-anchored sequences backward from the last byte, visiting
//! sub-sequences last to first. For each sub-sequence every position
//! allowed by its gap bound is tried nearest-first. A failed continuation
//! backtracks to the next candidate, and failed `(sub-sequence, position)`
//! states are remembered so each is explored at most once.
//!
//! # Scan budget
//!
//! With [`ScanLimit::Bytes(n)`](ScanLimit::Bytes), forward matches lie
//! wholly within the first `n` bytes and backward matches within the last
//! `n` bytes. Bytes outside that region are never read.

use std::borrow::Cow;
use std::collections::HashSet;
use std::io;

use crate::config::ScanLimit;
use crate::signature::{Anchor, BytePattern, ByteSequence, InternalSignature, SubSequence};
use crate::source::ByteSource;
use crate::Result;

/// Bytes fetched from the source per read while scanning (64 KiB).
const SCAN_CHUNK_SIZE: usize = 64 * 1024;

/// Tests `signature` against `source`. Every byte sequence must match.
///
/// A failed match is `Ok(false)`; only I/O failures are errors.
///
/// # Example
///
/// ```rust
/// use formatsig::signature::{Anchor, ByteSequence, InternalSignature};
/// use formatsig::source::MemorySource;
/// use formatsig::{matcher, ScanLimit};
///
/// let signature = InternalSignature::new(
///     1,
///     vec![ByteSequence::parse(Anchor::StartOfFile, "'%PDF-1.' [30:37]")?],
/// );
/// let source = MemorySource::new(&b"%PDF-1.4\n..."[..]);
/// assert!(matcher::matches(&source, &signature, ScanLimit::Unlimited)?);
/// assert!(!matcher::matches(&source, &signature, ScanLimit::Bytes(4))?);
/// # Ok::<(), formatsig::Error>(())
/// ```
pub fn matches<S: ByteSource + ?Sized>(
    source: &S,
    signature: &InternalSignature,
    limit: ScanLimit,
) -> Result<bool> {
    for sequence in signature.sequences() {
        if !sequence_matches(source, sequence, limit)? {
            return Ok(false);
        }
    }
    Ok(true)
}

/// Tests one byte sequence against `source`.
///
/// A sequence with no sub-sequences always matches.
pub fn sequence_matches<S: ByteSource + ?Sized>(
    source: &S,
    sequence: &ByteSequence,
    limit: ScanLimit,
) -> Result<bool> {
    let subsequences = sequence.subsequences();
    if subsequences.is_empty() {
        return Ok(true);
    }

    let len = source.len();
    let readable = limit.readable(len);
    if sequence.min_span() > readable {
        return Ok(false);
    }

    match sequence.anchor() {
        Anchor::StartOfFile | Anchor::Variable => {
            let mut search = Search::new(source, 0, readable, subsequences);
            search.forward(0, 0)
        }
        Anchor::EndOfFile => {
            let mut search = Search::new(source, len - readable, len, subsequences);
            search.backward(subsequences.len() - 1, len)
        }
    }
}

/// Backtracking state for one sequence.
struct Search<'s, S: ?Sized> {
    window: Window<'s, S>,
    subsequences: &'s [SubSequence],
    failed: HashSet<(usize, u64)>,
}

impl<'s, S: ByteSource + ?Sized> Search<'s, S> {
    fn new(source: &'s S, start: u64, end: u64, subsequences: &'s [SubSequence]) -> Self {
        Self {
            window: Window::new(source, start, end),
            subsequences,
            failed: HashSet::new(),
        }
    }

    /// Finds sub-sequence `index` at or after `from`, then the rest after it.
    ///
    /// When the next sub-sequence may sit any distance away, the earliest
    /// match here leaves it the widest range, so no later one is tried.
    fn forward(&mut self, index: usize, from: u64) -> Result<bool> {
        let subsequences = self.subsequences;
        let sub = &subsequences[index];
        let len = sub.len() as u64;
        let gap = sub.gap();

        let Some(last_start) = self.window.end.checked_sub(len) else {
            return Ok(false);
        };
        let lo = from.saturating_add(gap.min);
        let hi = gap
            .max
            .map_or(last_start, |max| from.saturating_add(max).min(last_start));
        if lo > hi {
            return Ok(false);
        }

        let mut pos = lo;
        while pos <= hi {
            if self.window.pattern_matches(sub.pattern(), pos, Direction::Forward)? {
                let next = pos + len;
                if index + 1 == subsequences.len() {
                    return Ok(true);
                }
                let found = self.failed.insert((index + 1, next)) && self.forward(index + 1, next)?;
                if found || subsequences[index + 1].gap().max.is_none() {
                    return Ok(found);
                }
            }
            pos += 1;
        }
        Ok(false)
    }

    /// Finds sub-sequence `index` ending at or before `to`, then the rest before it.
    ///
    /// Mirrors [`Search::forward`]: with an unbounded gap before the previous
    /// sub-sequence only the latest match here is continued.
    fn backward(&mut self, index: usize, to: u64) -> Result<bool> {
        let subsequences = self.subsequences;
        let sub = &subsequences[index];
        let len = sub.len() as u64;
        let gap = sub.gap();

        let Some(end_hi) = to.checked_sub(gap.min) else {
            return Ok(false);
        };
        let end_lo = gap
            .max
            .map_or(0, |max| to.saturating_sub(max))
            .max(self.window.start.saturating_add(len));
        if end_lo > end_hi {
            return Ok(false);
        }

        let mut end = end_hi;
        loop {
            let pos = end - len;
            if self.window.pattern_matches(sub.pattern(), pos, Direction::Backward)? {
                if index == 0 {
                    return Ok(true);
                }
                let found = self.failed.insert((index - 1, pos)) && self.backward(index - 1, pos)?;
                if found || subsequences[index - 1].gap().max.is_none() {
                    return Ok(found);
                }
            }
            if end == end_lo {
                return Ok(false);
            }
            end -= 1;
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Direction {
    Forward,
    Backward,
}

/// Chunked view over the readable region `[start, end)` of a source.
struct Window<'s, S: ?Sized> {
    source: &'s S,
    start: u64,
    end: u64,
    chunk_start: u64,
    chunk: Cow<'s, [u8]>,
}

impl<'s, S: ByteSource + ?Sized> Window<'s, S> {
    fn new(source: &'s S, start: u64, end: u64) -> Self {
        Self {
            source,
            start,
            end,
            chunk_start: start,
            chunk: Cow::Borrowed(&[]),
        }
    }

    fn pattern_matches(
        &mut self,
        pattern: &BytePattern,
        pos: u64,
        direction: Direction,
    ) -> Result<bool> {
        let bytes = self.slice(pos, pattern.len(), direction)?;
        Ok(pattern.matches(bytes))
    }

    /// Returns `len` bytes at `pos`, refilling the chunk in the scan direction.
    fn slice(&mut self, pos: u64, len: usize, direction: Direction) -> io::Result<&[u8]> {
        let need_end = pos + len as u64;
        debug_assert!(pos >= self.start && need_end <= self.end);

        let chunk_end = self.chunk_start + self.chunk.len() as u64;
        if pos < self.chunk_start || need_end > chunk_end {
            let size = SCAN_CHUNK_SIZE.max(len.saturating_mul(2)) as u64;
            let (from, to) = match direction {
                Direction::Forward => (pos, pos.saturating_add(size).min(self.end)),
                Direction::Backward => (need_end.saturating_sub(size).max(self.start), need_end),
            };
            let chunk = self.source.read(from, (to - from) as usize)?;
            if (chunk.len() as u64) < need_end - from {
                return Err(io::Error::new(
                    io::ErrorKind::UnexpectedEof,
                    format!(
                        "source returned {} bytes at offset {}, expected {}",
                        chunk.len(),
                        from,
                        to - from
                    ),
                ));
            }
            self.chunk_start = from;
            self.chunk = chunk;
        }

        let offset = (pos - self.chunk_start) as usize;
        Ok(&self.chunk[offset..offset + len])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::signature::Gap;
    use crate::source::MemorySource;

    fn signature(anchor: Anchor, expression: &str) -> InternalSignature {
        InternalSignature::new(1, vec![ByteSequence::parse(anchor, expression).unwrap()])
    }

    fn check(anchor: Anchor, expression: &str, data: &[u8], limit: ScanLimit) -> bool {
        let source = MemorySource::new(data);
        matches(&source, &signature(anchor, expression), limit).unwrap()
    }

    #[test]
    fn test_start_anchor_is_fixed() {
        assert!(check(Anchor::StartOfFile, "4D 5A", b"MZ\x90\x00", ScanLimit::Unlimited));
        assert!(!check(Anchor::StartOfFile, "4D 5A", b"xMZ", ScanLimit::Unlimited));
        assert!(!check(Anchor::StartOfFile, "50 4B", b"MZ", ScanLimit::Unlimited));
    }

    #[test]
    fn test_start_anchor_offset_window() {
        let seq = ByteSequence::new(
            Anchor::StartOfFile,
            vec![SubSequence::new(BytePattern::from_bytes(b"xmlns"), Gap::between(2, 6))],
        );
        let sig = InternalSignature::new(1, vec![seq]);
        let hit = MemorySource::new(&b"<a xmlns='x'/>"[..]);
        let too_far = MemorySource::new(&b"<abcdefgh xmlns='x'/>"[..]);
        assert!(matches(&hit, &sig, ScanLimit::Unlimited).unwrap());
        assert!(!matches(&too_far, &sig, ScanLimit::Unlimited).unwrap());
    }

    #[test]
    fn test_end_anchor() {
        assert!(check(Anchor::EndOfFile, "'%%EOF'", b"%PDF ... %%EOF", ScanLimit::Unlimited));
        assert!(!check(Anchor::EndOfFile, "'%%EOF'", b"%PDF ... %%EOF\n", ScanLimit::Unlimited));
        assert!(check(Anchor::EndOfFile, "'%%EOF' {0-2}", b"%PDF ... %%EOF\r\n", ScanLimit::Unlimited));
    }

    #[test]
    fn test_variable_anywhere() {
        assert!(check(Anchor::Variable, "'needle'", b"hay hay needle hay", ScanLimit::Unlimited));
        assert!(!check(Anchor::Variable, "'needle'", b"hay hay hay", ScanLimit::Unlimited));
    }

    #[test]
    fn test_gaps_between_subsequences() {
        let data = b"AB..CD....EF";
        assert!(check(Anchor::StartOfFile, "'AB' {2} 'CD' {2-6} 'EF'", data, ScanLimit::Unlimited));
        assert!(!check(Anchor::StartOfFile, "'AB' {2} 'CD' {0-3} 'EF'", data, ScanLimit::Unlimited));
        assert!(check(Anchor::StartOfFile, "'AB' * 'EF'", data, ScanLimit::Unlimited));
    }

    #[test]
    fn test_backtracking_finds_later_candidate() {
        // The first 'A' candidate fails on the bounded gap; the second succeeds.
        let data = b"A......xA.B";
        assert!(check(Anchor::Variable, "'A' {1-2} 'B'", data, ScanLimit::Unlimited));
    }

    #[test]
    fn test_end_anchor_multiple_subsequences() {
        let data = b"header ... 'trailer' 12 END";
        assert!(check(Anchor::EndOfFile, "'trailer' {1-10} 'END'", data, ScanLimit::Unlimited));
        assert!(!check(Anchor::EndOfFile, "'trailer' {1-3} 'END'", data, ScanLimit::Unlimited));
    }

    #[test]
    fn test_wildcards_and_classes() {
        assert!(check(Anchor::StartOfFile, "'GIF8' (37|39) 'a'", b"GIF89a", ScanLimit::Unlimited));
        assert!(!check(Anchor::StartOfFile, "'GIF8' (37|39) 'a'", b"GIF88a", ScanLimit::Unlimited));
        assert!(check(Anchor::StartOfFile, "FF D8 FF [E0:EF]", b"\xFF\xD8\xFF\xE1", ScanLimit::Unlimited));
    }

    #[test]
    fn test_budget_limits_forward_search() {
        let data = b"0123456789needle";
        assert!(check(Anchor::Variable, "'needle'", data, ScanLimit::Bytes(16)));
        assert!(!check(Anchor::Variable, "'needle'", data, ScanLimit::Bytes(15)));
    }

    #[test]
    fn test_budget_limits_backward_search() {
        let data = b"needle0123456789";
        let sig = InternalSignature::new(
            1,
            vec![ByteSequence::new(
                Anchor::EndOfFile,
                vec![SubSequence::new(BytePattern::from_bytes(b"needle"), Gap::at_least(0))],
            )],
        );
        let source = MemorySource::new(&data[..]);
        assert!(matches(&source, &sig, ScanLimit::Bytes(16)).unwrap());
        assert!(!matches(&source, &sig, ScanLimit::Bytes(15)).unwrap());
    }

    #[test]
    fn test_zero_budget() {
        assert!(!check(Anchor::StartOfFile, "00", b"\x00", ScanLimit::Bytes(0)));
        assert!(!check(Anchor::EndOfFile, "00", b"\x00", ScanLimit::Bytes(0)));
        let empty = InternalSignature::new(1, vec![ByteSequence::new(Anchor::StartOfFile, Vec::new())]);
        let source = MemorySource::new(&b"\x00"[..]);
        assert!(matches(&source, &empty, ScanLimit::Bytes(0)).unwrap());
    }

    #[test]
    fn test_all_sequences_must_match() {
        let sig = InternalSignature::new(
            9,
            vec![
                ByteSequence::parse(Anchor::StartOfFile, "'PK'").unwrap(),
                ByteSequence::parse(Anchor::EndOfFile, "'END'").unwrap(),
            ],
        );
        let both = MemorySource::new(&b"PK....END"[..]);
        let head_only = MemorySource::new(&b"PK....EN"[..]);
        assert!(matches(&both, &sig, ScanLimit::Unlimited).unwrap());
        assert!(!matches(&head_only, &sig, ScanLimit::Unlimited).unwrap());
    }

    #[test]
    fn test_scan_spans_chunks() {
        let mut data = vec![0u8; SCAN_CHUNK_SIZE * 3];
        let at = SCAN_CHUNK_SIZE * 2 - 2;
        data[at..at + 4].copy_from_slice(b"WAVE");
        assert!(check(Anchor::Variable, "'WAVE'", &data, ScanLimit::Unlimited));
        assert!(check(Anchor::EndOfFile, "'WAVE' *", &data, ScanLimit::Unlimited));
    }

    #[test]
    fn test_unbounded_gaps_scan_linearly() {
        let mut data = vec![b'A'; 1 << 20];
        assert!(!check(Anchor::Variable, "'A' * 'B'", &data, ScanLimit::Unlimited));
        assert!(!check(Anchor::StartOfFile, "'A' * 'A' * 'B'", &data, ScanLimit::Unlimited));
        assert!(!check(Anchor::EndOfFile, "'B' * 'A' *", &data, ScanLimit::Unlimited));

        data[700_000] = b'B';
        assert!(check(Anchor::Variable, "'A' * 'B'", &data, ScanLimit::Unlimited));
        assert!(check(Anchor::StartOfFile, "'A' * 'A' * 'B'", &data, ScanLimit::Unlimited));
        assert!(check(Anchor::EndOfFile, "'B' * 'A' *", &data, ScanLimit::Unlimited));
        assert!(!check(Anchor::Variable, "'B' * 'B'", &data, ScanLimit::Unlimited));
    }

    struct FailingSource;

    impl ByteSource for FailingSource {
        fn len(&self) -> u64 {
            16
        }

        fn read(&self, _offset: u64, _length: usize) -> io::Result<Cow<'_, [u8]>> {
            Err(io::Error::new(io::ErrorKind::Other, "device gone"))
        }
    }

    #[test]
    fn test_io_failure_is_an_error() {
        let err = matches(&FailingSource, &signature(Anchor::StartOfFile, "00"), ScanLimit::Unlimited)
            .unwrap_err();
        assert!(err.is_io());
    }
}
