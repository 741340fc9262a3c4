//! Parser for the byte sequence expression language.
//!
//! Expressions are written in the notation used by PRONOM-style signature
//! files:
//!
//! | Syntax | Meaning |
//! |--------|---------|
//! | `4D 5A` | literal bytes in hex, whitespace ignored |
//! | `'PK'` | literal Latin-1 text |
//! | `??` | any byte |
//! | `4?` `?D` | nibble wildcards |
//! | `[00:1F]` `[!00:1F]` | byte range, negated range |
//! | `[&0F]` `[~0F]` | all mask bits set, any mask bit set |
//! | `(0D\|0A\|'x')` | single-byte alternatives |
//! | `{4}` | exactly four bytes of anything |
//! | `{2-8}` `{2-*}` `*` | variable gaps |
//!
//! A variable gap splits the expression into fragments that become separate
//! sub-sequences. Fixed gaps between bytes are folded into the surrounding
//! pattern as wildcard positions.

use super::pattern::{ByteClass, BytePattern, PatternByte};
use super::sequence::{Anchor, ByteSequence, Gap, SubSequence};
use crate::{Error, Result};

/// Fixed gaps wider than this become sub-sequence gaps instead of wildcards.
const MAX_INLINE_GAP: u64 = 1024;

/// One contiguous pattern of a parsed expression.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fragment {
    /// Gap from the previous fragment. [`Gap::NONE`] for the first.
    pub gap_before: Gap,
    /// The fragment's bytes.
    pub pattern: BytePattern,
}

/// A parsed expression.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedSequence {
    /// Gap written before the first byte.
    pub leading: Gap,
    /// Fragments in expression order. Never empty.
    pub fragments: Vec<Fragment>,
    /// Gap written after the last byte.
    pub trailing: Gap,
}

/// Parses a byte sequence expression.
///
/// # Example
///
/// ```rust
/// use formatsig::signature::parse_sequence;
///
/// let parsed = parse_sequence("'PK' 03 04 {26-30} 'mimetype'")?;
/// assert_eq!(parsed.fragments.len(), 2);
/// assert_eq!(parsed.fragments[0].pattern.to_hex_string(), "50 4B 03 04");
/// # Ok::<(), formatsig::Error>(())
/// ```
pub fn parse_sequence(expression: &str) -> Result<ParsedSequence> {
    Parser::new(expression).parse()
}

impl ByteSequence {
    /// Parses a single expression into a sequence anchored at `anchor`.
    ///
    /// The first fragment sits directly against a start or end anchor, and
    /// anywhere for a variable one.
    pub fn parse(anchor: Anchor, expression: &str) -> Result<Self> {
        let offset = match anchor {
            Anchor::Variable => Gap::at_least(0),
            _ => Gap::NONE,
        };
        let mut assembler = SequenceAssembler::new(anchor);
        assembler.push(parse_sequence(expression)?, offset);
        Ok(assembler.finish())
    }
}

/// Builds a [`ByteSequence`] from consecutive parsed expressions.
///
/// Each pushed expression comes with the offset declared for it, measured
/// in the direction the anchor searches.
#[derive(Debug)]
pub(crate) struct SequenceAssembler {
    anchor: Anchor,
    subsequences: Vec<SubSequence>,
    carry: Gap,
}

impl SequenceAssembler {
    pub(crate) fn new(anchor: Anchor) -> Self {
        Self {
            anchor,
            subsequences: Vec::new(),
            carry: Gap::NONE,
        }
    }

    pub(crate) fn push(&mut self, parsed: ParsedSequence, offset: Gap) {
        let ParsedSequence {
            leading,
            fragments,
            trailing,
        } = parsed;

        match self.anchor {
            Anchor::StartOfFile | Anchor::Variable => {
                let first = std::mem::replace(&mut self.carry, trailing) + offset + leading;
                for (i, fragment) in fragments.into_iter().enumerate() {
                    let gap = if i == 0 { first } else { fragment.gap_before };
                    self.subsequences
                        .push(SubSequence::new(fragment.pattern, gap));
                }
            }
            Anchor::EndOfFile => {
                if let Some(previous) = self.subsequences.last_mut() {
                    let widened = previous.gap() + leading;
                    *previous.gap_mut() = widened;
                }
                let gaps_after: Vec<Gap> = fragments
                    .iter()
                    .skip(1)
                    .map(|f| f.gap_before)
                    .chain(std::iter::once(trailing + offset))
                    .collect();
                for (fragment, gap) in fragments.into_iter().zip(gaps_after) {
                    self.subsequences
                        .push(SubSequence::new(fragment.pattern, gap));
                }
            }
        }
    }

    pub(crate) fn finish(self) -> ByteSequence {
        ByteSequence::new(self.anchor, self.subsequences)
    }
}

struct Parser<'a> {
    expression: &'a str,
    chars: Vec<(usize, char)>,
    pos: usize,
}

impl<'a> Parser<'a> {
    fn new(expression: &'a str) -> Self {
        Self {
            expression,
            chars: expression.char_indices().collect(),
            pos: 0,
        }
    }

    fn error(&self, reason: impl Into<String>) -> Error {
        let position = self
            .chars
            .get(self.pos)
            .map_or(self.expression.len(), |(offset, _)| *offset);
        Error::InvalidSequence {
            expression: self.expression.to_string(),
            position,
            reason: reason.into(),
        }
    }

    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).map(|(_, c)| *c)
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.peek();
        if c.is_some() {
            self.pos += 1;
        }
        c
    }

    fn skip_whitespace(&mut self) {
        while self.peek().is_some_and(char::is_whitespace) {
            self.pos += 1;
        }
    }

    fn expect(&mut self, expected: char) -> Result<()> {
        self.skip_whitespace();
        match self.peek() {
            Some(c) if c == expected => {
                self.pos += 1;
                Ok(())
            }
            Some(c) => Err(self.error(format!("expected '{}', found '{}'", expected, c))),
            None => Err(self.error(format!("expected '{}', found end of expression", expected))),
        }
    }

    fn parse(mut self) -> Result<ParsedSequence> {
        let mut leading = Gap::NONE;
        let mut fragments: Vec<Fragment> = Vec::new();
        let mut pending: Option<Gap> = None;

        loop {
            self.skip_whitespace();
            let Some(c) = self.peek() else { break };

            if c == '{' || c == '*' {
                let gap = self.parse_gap()?;
                pending = Some(pending.map_or(gap, |p| p + gap));
                continue;
            }

            let bytes = self.parse_element()?;
            for byte in bytes {
                match (pending.take(), fragments.last_mut()) {
                    (None, Some(fragment)) => fragment.pattern.push(byte),
                    (Some(gap), Some(fragment))
                        if gap.is_fixed() && gap.min <= MAX_INLINE_GAP =>
                    {
                        for _ in 0..gap.min {
                            fragment.pattern.push(PatternByte::Any);
                        }
                        fragment.pattern.push(byte);
                    }
                    (Some(gap), Some(_)) => fragments.push(Fragment {
                        gap_before: gap,
                        pattern: BytePattern::from_pattern_bytes(vec![byte]),
                    }),
                    (gap, None) => {
                        leading = gap.unwrap_or(Gap::NONE);
                        fragments.push(Fragment {
                            gap_before: Gap::NONE,
                            pattern: BytePattern::from_pattern_bytes(vec![byte]),
                        });
                    }
                }
            }
        }

        if fragments.is_empty() {
            return Err(self.error("expression contains no bytes"));
        }

        Ok(ParsedSequence {
            leading,
            fragments,
            trailing: pending.unwrap_or(Gap::NONE),
        })
    }

    /// Parses one element, which may expand to several bytes (quoted text).
    fn parse_element(&mut self) -> Result<Vec<PatternByte>> {
        match self.peek() {
            Some('\'') => Ok(self
                .parse_text()?
                .into_iter()
                .map(PatternByte::Literal)
                .collect()),
            Some('[') => Ok(vec![self.parse_bracket()?]),
            Some('(') => Ok(vec![self.parse_alternatives()?]),
            Some(_) => Ok(vec![self.parse_hex_position()?]),
            None => Err(self.error("unexpected end of expression")),
        }
    }

    fn parse_text(&mut self) -> Result<Vec<u8>> {
        self.expect('\'')?;
        let mut bytes = Vec::new();
        loop {
            match self.bump() {
                Some('\'') => break,
                Some(c) => match u8::try_from(u32::from(c)) {
                    Ok(b) => bytes.push(b),
                    Err(_) => {
                        self.pos -= 1;
                        return Err(self.error(format!("character '{}' is outside Latin-1", c)));
                    }
                },
                None => return Err(self.error("unterminated quoted string")),
            }
        }
        if bytes.is_empty() {
            return Err(self.error("empty quoted string"));
        }
        Ok(bytes)
    }

    fn hex_digit(&mut self) -> Result<Option<u8>> {
        match self.peek() {
            Some('?') => {
                self.pos += 1;
                Ok(None)
            }
            Some(c) => match c.to_digit(16) {
                Some(d) => {
                    self.pos += 1;
                    Ok(Some(d as u8))
                }
                None => Err(self.error(format!("invalid hex digit '{}'", c))),
            },
            None => Err(self.error("incomplete hex byte")),
        }
    }

    /// `4D`, `??`, `4?` or `?D`.
    fn parse_hex_position(&mut self) -> Result<PatternByte> {
        let high = self.hex_digit()?;
        let low = self.hex_digit()?;
        Ok(match (high, low) {
            (Some(h), Some(l)) => PatternByte::Literal(h << 4 | l),
            (Some(h), None) => PatternByte::masked(h << 4, 0xF0),
            (None, Some(l)) => PatternByte::masked(l, 0x0F),
            (None, None) => PatternByte::Any,
        })
    }

    /// A single concrete byte: two hex digits or one quoted character.
    fn parse_byte_value(&mut self) -> Result<u8> {
        self.skip_whitespace();
        if self.peek() == Some('\'') {
            let text = self.parse_text()?;
            return match text.as_slice() {
                [b] => Ok(*b),
                _ => Err(self.error("expected a single quoted character")),
            };
        }
        match self.parse_hex_position()? {
            PatternByte::Literal(b) => Ok(b),
            _ => Err(self.error("wildcards are not allowed here")),
        }
    }

    fn parse_bracket(&mut self) -> Result<PatternByte> {
        self.expect('[')?;
        self.skip_whitespace();
        let negate = if self.peek() == Some('!') {
            self.pos += 1;
            self.skip_whitespace();
            true
        } else {
            false
        };

        let inner = match self.peek() {
            Some('&') => {
                self.pos += 1;
                PatternByte::AllBits(self.parse_byte_value()?)
            }
            Some('~') => {
                self.pos += 1;
                PatternByte::AnyBits(self.parse_byte_value()?)
            }
            _ => {
                let lo = self.parse_byte_value()?;
                self.skip_whitespace();
                if self.peek() == Some(':') {
                    self.pos += 1;
                    let hi = self.parse_byte_value()?;
                    PatternByte::Class(ByteClass::range(lo, hi))
                } else {
                    PatternByte::Literal(lo)
                }
            }
        };
        self.expect(']')?;

        Ok(if negate {
            PatternByte::Class(inner.to_class().negated())
        } else {
            inner
        })
    }

    fn parse_alternatives(&mut self) -> Result<PatternByte> {
        self.expect('(')?;
        let mut class = ByteClass::new();
        loop {
            self.skip_whitespace();
            let alternative = match self.peek() {
                Some('[') => self.parse_bracket()?,
                Some('\'') => {
                    let text = self.parse_text()?;
                    match text.as_slice() {
                        [b] => PatternByte::Literal(*b),
                        _ => return Err(self.error("alternatives must be single bytes")),
                    }
                }
                Some(_) => self.parse_hex_position()?,
                None => return Err(self.error("unterminated alternatives")),
            };
            class = union(class, alternative.to_class());

            self.skip_whitespace();
            match self.bump() {
                Some('|') => continue,
                Some(')') => break,
                Some(c) if c.is_ascii_hexdigit() || c == '?' => {
                    self.pos -= 1;
                    return Err(self.error("alternatives must be single bytes"));
                }
                Some(c) => {
                    self.pos -= 1;
                    return Err(self.error(format!("expected '|' or ')', found '{}'", c)));
                }
                None => return Err(self.error("unterminated alternatives")),
            }
        }
        Ok(PatternByte::Class(class))
    }

    fn parse_number(&mut self) -> Result<u64> {
        self.skip_whitespace();
        let start = self.pos;
        let mut value: u64 = 0;
        while let Some(d) = self.peek().and_then(|c| c.to_digit(10)) {
            value = value
                .checked_mul(10)
                .and_then(|v| v.checked_add(u64::from(d)))
                .ok_or_else(|| self.error("gap bound too large"))?;
            self.pos += 1;
        }
        if self.pos == start {
            return Err(self.error("expected a number"));
        }
        Ok(value)
    }

    fn parse_gap(&mut self) -> Result<Gap> {
        if self.peek() == Some('*') {
            self.pos += 1;
            return Ok(Gap::at_least(0));
        }
        self.expect('{')?;
        let min = self.parse_number()?;
        self.skip_whitespace();
        let gap = if self.peek() == Some('-') {
            self.pos += 1;
            self.skip_whitespace();
            if self.peek() == Some('*') {
                self.pos += 1;
                Gap::at_least(min)
            } else {
                let max = self.parse_number()?;
                if max < min {
                    return Err(self.error(format!("gap maximum {} is below minimum {}", max, min)));
                }
                Gap::between(min, max)
            }
        } else {
            Gap::exact(min)
        };
        self.expect('}')?;
        Ok(gap)
    }
}

fn union(a: ByteClass, b: ByteClass) -> ByteClass {
    let mut out = a;
    for value in 0..=255u8 {
        if b.contains(value) {
            out.insert(value);
        }
    }
    out
}
