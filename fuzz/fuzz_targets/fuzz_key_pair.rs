//! Fuzz target for key-pair matching
//!
//! The input is split in two at the first NUL byte: certificate text and
//! key text. Malformed keys of any encoding must be rejected, not panic.

#![no_main]

use certprov::certificate;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let split = data.iter().position(|&b| b == 0).unwrap_or(data.len());
    let (cert, key) = data.split_at(split);
    let key = key.get(1..).unwrap_or_default();

    let (Ok(cert), Ok(key)) = (std::str::from_utf8(cert), std::str::from_utf8(key)) else {
        return;
    };

    let matched = certificate::validate_key_pair(cert, key);
    assert_eq!(matched, certificate::check_key_pair(cert, key).is_ok());
});
