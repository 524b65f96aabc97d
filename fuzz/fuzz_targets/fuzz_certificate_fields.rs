//! Fuzz target for certificate field extraction
//!
//! Arbitrary text goes through the marker checks and every extractor.
//! None of them may panic, and a Common Name must respect the requested
//! capacity.

#![no_main]

use certprov::certificate;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let Ok(pem) = std::str::from_utf8(data) else {
        return;
    };

    let _ = certificate::has_certificate_markers(pem);
    let _ = certificate::has_private_key_markers(pem);

    if let Ok(cn) = certificate::extract_common_name(pem) {
        assert!(!cn.is_empty());
    }
    for capacity in [1, 8, certificate::MAX_CN_LENGTH] {
        if let Ok(cn) = certificate::extract_common_name_bounded(pem, capacity) {
            assert!(cn.len() <= capacity);
        }
    }

    let _ = certificate::extract_expiration(pem);
    if let Ok(serial) = certificate::extract_serial(pem, certificate::SERIAL_BUFFER_CAPACITY) {
        assert!(serial.len() < certificate::SERIAL_BUFFER_CAPACITY);
    }
    let _ = certificate::describe(pem);
});
