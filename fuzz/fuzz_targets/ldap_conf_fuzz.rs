//! Fuzz target for `ldap.conf` reading and repair.
//!
//! Arbitrary file content must never panic the URI scan or the rewrite, and
//! a rewrite always leaves exactly one line per managed keyword.
//!
//! Run with: cargo +nightly fuzz run ldap_conf_fuzz -- -max_total_time=60

#![no_main]

use libfuzzer_sys::fuzz_target;
use roster_directory::hosts::parse_ldap_conf_uris;
use roster_directory::ldap_conf::{render, RepairPlan};

fuzz_target!(|data: &[u8]| {
    if let Ok(input) = std::str::from_utf8(data) {
        let _ = parse_ldap_conf_uris(input);

        let plan = RepairPlan {
            uris: vec!["ldaps://ldap-us.apache.org:636".into()],
            base: "dc=apache,dc=org".into(),
            tls_cacert: None,
            tls_reqcert: "hard".into(),
        };
        let rendered = render(input, &plan);
        assert!(rendered.ends_with('\n'));

        for keyword in ["URI", "BASE", "TLS_REQCERT"] {
            let count = rendered
                .lines()
                .filter(|line| {
                    line.split_whitespace()
                        .next()
                        .is_some_and(|k| k.eq_ignore_ascii_case(keyword))
                })
                .count();
            assert_eq!(count, 1, "{keyword} should appear once");
        }
    }
});
