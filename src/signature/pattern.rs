//! Byte patterns with wildcards.
//!
//! A pattern position can be:
//! - a literal byte
//! - any byte
//! - a nibble or bit mask (`4?`, `?D`)
//! - a bitmask test (`[&0F]` all bits set, `[~0F]` any bit set)
//! - a byte class built from ranges, alternatives and negation

use std::fmt;

/// A set of byte values.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct ByteClass {
    bits: [u64; 4],
}

impl ByteClass {
    /// Creates an empty class.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a class from the values in `lo..=hi` (order of bounds does not matter).
    pub fn range(lo: u8, hi: u8) -> Self {
        let mut class = Self::new();
        class.insert_range(lo, hi);
        class
    }

    /// Creates a class of every value accepted by `predicate`.
    pub fn from_fn(predicate: impl Fn(u8) -> bool) -> Self {
        let mut class = Self::new();
        for value in 0..=255u8 {
            if predicate(value) {
                class.insert(value);
            }
        }
        class
    }

    /// Adds one value.
    pub fn insert(&mut self, value: u8) {
        self.bits[(value >> 6) as usize] |= 1u64 << (value & 63);
    }

    /// Adds every value in `lo..=hi`.
    pub fn insert_range(&mut self, lo: u8, hi: u8) {
        let (lo, hi) = if lo <= hi { (lo, hi) } else { (hi, lo) };
        for value in lo..=hi {
            self.insert(value);
        }
    }

    /// Returns the complement.
    pub fn negated(self) -> Self {
        Self {
            bits: self.bits.map(|word| !word),
        }
    }

    /// Returns true if `value` is in the class.
    pub fn contains(&self, value: u8) -> bool {
        self.bits[(value >> 6) as usize] & (1u64 << (value & 63)) != 0
    }

    /// Number of values in the class.
    pub fn len(&self) -> usize {
        self.bits.iter().map(|w| w.count_ones() as usize).sum()
    }

    /// Returns true if the class has no values.
    pub fn is_empty(&self) -> bool {
        self.bits.iter().all(|w| *w == 0)
    }

    fn values(&self) -> impl Iterator<Item = u8> + '_ {
        (0..=255u8).filter(|v| self.contains(*v))
    }
}

impl fmt::Debug for ByteClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ByteClass(")?;
        for (i, value) in self.values().enumerate() {
            if i > 0 {
                write!(f, " ")?;
            }
            write!(f, "{:02X}", value)?;
        }
        write!(f, ")")
    }
}

/// A single position in a byte pattern.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PatternByte {
    /// Exact byte match.
    Literal(u8),
    /// Matches any byte.
    Any,
    /// Matches when `byte & mask == value`.
    Masked {
        /// Expected value of the masked bits.
        value: u8,
        /// Bits that take part in the comparison.
        mask: u8,
    },
    /// Matches when every bit of the mask is set.
    AllBits(u8),
    /// Matches when at least one bit of the mask is set.
    AnyBits(u8),
    /// Matches any value of the class.
    Class(ByteClass),
}

impl PatternByte {
    /// Creates a nibble or bit mask position. `value` bits outside `mask` are ignored.
    pub fn masked(value: u8, mask: u8) -> Self {
        match mask {
            0x00 => PatternByte::Any,
            0xFF => PatternByte::Literal(value),
            _ => PatternByte::Masked {
                value: value & mask,
                mask,
            },
        }
    }

    /// Check if this position matches a concrete byte.
    #[inline]
    pub fn matches(&self, byte: u8) -> bool {
        match self {
            PatternByte::Literal(b) => *b == byte,
            PatternByte::Any => true,
            PatternByte::Masked { value, mask } => byte & mask == *value,
            PatternByte::AllBits(mask) => byte & mask == *mask,
            PatternByte::AnyBits(mask) => byte & mask != 0,
            PatternByte::Class(class) => class.contains(byte),
        }
    }

    /// Returns true if this position accepts every byte.
    pub fn is_any(&self) -> bool {
        match self {
            PatternByte::Any => true,
            PatternByte::AllBits(0) => true,
            PatternByte::Class(class) => class.len() == 256,
            _ => false,
        }
    }

    /// Returns true if this is a literal byte.
    pub fn is_literal(&self) -> bool {
        matches!(self, PatternByte::Literal(_))
    }

    /// Converts any position to an equivalent class.
    pub fn to_class(&self) -> ByteClass {
        match self {
            PatternByte::Class(class) => *class,
            other => ByteClass::from_fn(|b| other.matches(b)),
        }
    }
}

/// A fixed-length sequence of pattern positions.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct BytePattern {
    bytes: Vec<PatternByte>,
}

impl BytePattern {
    /// Creates an empty pattern.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a pattern of literal bytes.
    pub fn from_bytes(bytes: &[u8]) -> Self {
        Self {
            bytes: bytes.iter().map(|&b| PatternByte::Literal(b)).collect(),
        }
    }

    /// Creates a pattern from positions.
    pub fn from_pattern_bytes(bytes: Vec<PatternByte>) -> Self {
        Self { bytes }
    }

    /// Creates a pattern of `len` wildcard positions.
    pub fn any(len: usize) -> Self {
        Self {
            bytes: vec![PatternByte::Any; len],
        }
    }

    /// Appends one position.
    pub fn push(&mut self, byte: PatternByte) {
        self.bytes.push(byte);
    }

    /// Pattern length in bytes.
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    /// Returns true if the pattern has no positions.
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Returns the positions.
    pub fn bytes(&self) -> &[PatternByte] {
        &self.bytes
    }

    /// Returns true if every position accepts any byte.
    pub fn is_all_wildcard(&self) -> bool {
        self.bytes.iter().all(PatternByte::is_any)
    }

    /// Checks the pattern against `data`, which must be at least as long.
    #[inline]
    pub fn matches(&self, data: &[u8]) -> bool {
        data.len() >= self.bytes.len()
            && self
                .bytes
                .iter()
                .zip(data)
                .all(|(pattern, byte)| pattern.matches(*byte))
    }

    /// Checks the pattern at `offset` within `data`.
    pub fn matches_at(&self, data: &[u8], offset: usize) -> bool {
        data.get(offset..).is_some_and(|rest| self.matches(rest))
    }

    /// Renders the pattern in the hex notation accepted by the sequence parser.
    pub fn to_hex_string(&self) -> String {
        let mut out = String::new();
        for byte in &self.bytes {
            if !out.is_empty() {
                out.push(' ');
            }
            match byte {
                PatternByte::Literal(b) => out.push_str(&format!("{:02X}", b)),
                PatternByte::Any => out.push_str("??"),
                PatternByte::Masked { value, mask: 0xF0 } => {
                    out.push_str(&format!("{:X}?", value >> 4))
                }
                PatternByte::Masked { value, mask: 0x0F } => {
                    out.push_str(&format!("?{:X}", value))
                }
                PatternByte::Masked { value, mask } => {
                    out.push_str(&format!("[{:02X}&{:02X}]", value, mask))
                }
                PatternByte::AllBits(mask) => out.push_str(&format!("[&{:02X}]", mask)),
                PatternByte::AnyBits(mask) => out.push_str(&format!("[~{:02X}]", mask)),
                PatternByte::Class(class) => {
                    out.push('(');
                    for (i, value) in class.values().enumerate() {
                        if i > 0 {
                            out.push('|');
                        }
                        out.push_str(&format!("{:02X}", value));
                    }
                    out.push(')');
                }
            }
        }
        out
    }
}

impl fmt::Display for BytePattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex_string())
    }
}
