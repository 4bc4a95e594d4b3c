//! Fuzz test for cached document decoding
//!
//! Feeds arbitrary bytes to `Document::decode`, the path every cache read
//! takes. Decoding must never panic, and anything it accepts must encode and
//! decode again with the same set of fields.
//!
//! Run with: cargo +nightly fuzz run document_decode_fuzz -- -max_total_time=60

#![no_main]

use libfuzzer_sys::fuzz_target;
use vercache_core::Document;

fuzz_target!(|data: &[u8]| {
    let Ok(doc) = Document::decode(data) else {
        return;
    };

    let encoded = doc.encode().expect("decoded document must re-encode");
    let again = Document::decode(&encoded).expect("re-encoded document must decode");
    assert_eq!(doc.len(), again.len(), "field count must survive re-encoding");
    assert!(doc.iter().all(|(field, _)| again.contains_key(field)));

    // Field flattening for hash storage covers every field.
    assert_eq!(doc.to_field_strings().len(), doc.len());
});
