//! Fuzz target for container signature definition documents.
//!
//! Loads arbitrary text as a definitions file. Accepted documents must
//! keep their lookup tables consistent: every signature listed for a
//! container type is reachable by id.
//!
//! Run with: cargo +nightly fuzz run container_definitions

#![no_main]

use formatsig::ContainerSignatureDefinitions;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let Ok(text) = std::str::from_utf8(data) else {
        return;
    };
    let Ok(definitions) = text.parse::<ContainerSignatureDefinitions>() else {
        return;
    };
    for signature in definitions.signatures() {
        assert!(
            definitions.signature(signature.id()).is_some(),
            "signature {} not indexed",
            signature.id()
        );
        for file in signature.files() {
            let _ = file.compiled_signatures();
        }
    }
});
