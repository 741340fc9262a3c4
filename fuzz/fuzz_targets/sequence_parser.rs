//! Fuzz target for byte sequence expressions.
//!
//! Parses arbitrary text as a sequence under each anchor and, when the
//! expression is accepted, runs the result against a short buffer. Parsing
//! and matching must never panic.
//!
//! Run with: cargo +nightly fuzz run sequence_parser

#![no_main]

use formatsig::signature::{Anchor, ByteSequence, InternalSignature};
use formatsig::{MemorySource, ScanLimit, matcher};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let Ok(expression) = std::str::from_utf8(data) else {
        return;
    };
    for anchor in [Anchor::StartOfFile, Anchor::EndOfFile, Anchor::Variable] {
        let Ok(sequence) = ByteSequence::parse(anchor, expression) else {
            continue;
        };
        let signature = InternalSignature::new(1, vec![sequence]);
        let source = MemorySource::new(data);
        let _ = matcher::matches(&source, &signature, ScanLimit::Bytes(64));
        let _ = matcher::matches(&source, &signature, ScanLimit::Unlimited);
    }
});
