//! Fuzz target for the provisioning form decoder
//!
//! Feeds raw request bodies to the urlencoded form parser the HTTP surface
//! uses for `/provision`.

#![no_main]

use certprov::provisioning::ProvisionForm;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    if let Ok(form) = ProvisionForm::parse(data) {
        let _ = form.has_wifi_credentials();
        if let Some(ca) = form.ca_cert() {
            assert!(!ca.trim().is_empty());
        }
    }
});
