//! Build script for the certprov library
//!
//! Sets CERTPROV_BUILD_TIMESTAMP for use in time.rs. A device clock that
//! reports a time before this value has not been synchronised yet.

use std::time::{SystemTime, UNIX_EPOCH};

fn main() {
    let timestamp = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("System time before Unix epoch")
        .as_secs();

    println!("cargo::rerun-if-changed=build.rs");
    println!("cargo::rustc-env=CERTPROV_BUILD_TIMESTAMP={}", timestamp);
}
