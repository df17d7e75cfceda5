#![no_main]

use gridwire::core::zerocode::{compress, expand};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    // Round trip: expanding a compressed stream reproduces the input exactly
    let compressed = compress(data);
    let expanded = expand(&compressed, data.len()).expect("own output must expand");
    assert_eq!(expanded, data);

    // Raw expansion of arbitrary bytes must respect the bound and never panic
    if let Ok(out) = expand(data, 8192) {
        assert!(out.len() <= 8192);
    }
});
