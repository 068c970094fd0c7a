//! Fuzz target for host URI parsing.
//!
//! Run with: cargo +nightly fuzz run host_uri_fuzz -- -max_total_time=60

#![no_main]

use libfuzzer_sys::fuzz_target;
use roster_core::HostUri;

fuzz_target!(|data: &[u8]| {
    if let Ok(input) = std::str::from_utf8(data) {
        if let Ok(uri) = input.parse::<HostUri>() {
            // Accepted URIs print back to a form that parses to the same host.
            let again: HostUri = uri
                .to_string()
                .parse()
                .expect("displayed URI should parse");
            assert_eq!(again, uri);
        }
    }
});
