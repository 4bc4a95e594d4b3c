//! Fuzz test for update-request validation
//!
//! Any decodable document either yields an integer expected version or a
//! validation error; it never panics, and stripping the version always
//! removes the reserved field.
//!
//! Run with: cargo +nightly fuzz run expected_version_fuzz -- -max_total_time=60

#![no_main]

use libfuzzer_sys::fuzz_target;
use vercache_core::{Document, VercacheError, VERSION_FIELD};

fuzz_target!(|data: &[u8]| {
    let Ok(doc) = Document::decode(data) else {
        return;
    };

    match doc.expected_version() {
        Ok(version) => assert_eq!(doc.version(), Some(version)),
        Err(e) => assert!(matches!(e, VercacheError::Validation(_))),
    }

    let stripped = doc.without_version();
    assert!(!stripped.contains_key(VERSION_FIELD));
    assert!(stripped.len() <= doc.len());
});
