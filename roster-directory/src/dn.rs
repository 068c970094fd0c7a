//! Distinguished names of entity entries.
//!
//! Keys are escaped with `ldap3::dn_escape` before they become an RDN, so a
//! key holding `,`, `+` or `=` still names exactly one entry. Parsing reads
//! both the `\2c` hex form `ldap3` writes and the `\,` form servers return.

use ldap3::dn_escape;
use roster_core::EntityKind;

/// DN of the `kind` entry keyed `key` under `suffix`.
pub fn entity_dn(kind: EntityKind, key: &str, suffix: &str) -> String {
    format!(
        "{}={},{}",
        kind.key_attribute(),
        dn_escape(key),
        kind.base_dn(suffix)
    )
}

/// Unescaped value of `attribute` in the leading RDN of `dn`.
///
/// `rdn_value("uid=alice,ou=people,dc=apache,dc=org", "uid") == Some("alice")`.
pub fn rdn_value(dn: &str, attribute: &str) -> Option<String> {
    let rdn = split_unescaped(dn, b',').into_iter().next()?;
    split_unescaped(rdn, b'+').into_iter().find_map(|ava| {
        let (name, value) = ava.split_once('=')?;
        if name.trim().eq_ignore_ascii_case(attribute) {
            unescape(value.trim_start())
        } else {
            None
        }
    })
}

/// Split on `separator` where it is not preceded by a backslash.
fn split_unescaped(s: &str, separator: u8) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut start = 0;
    let mut escaped = false;
    for (i, &b) in s.as_bytes().iter().enumerate() {
        if escaped {
            escaped = false;
        } else if b == b'\\' {
            escaped = true;
        } else if b == separator {
            parts.push(&s[start..i]);
            start = i + 1;
        }
    }
    parts.push(&s[start..]);
    parts
}

fn unescape(value: &str) -> Option<String> {
    let bytes = value.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] != b'\\' {
            out.push(bytes[i]);
            i += 1;
            continue;
        }
        match bytes.get(i + 1..i + 3) {
            Some(pair) if pair.iter().all(u8::is_ascii_hexdigit) => {
                let hex = std::str::from_utf8(pair).ok()?;
                out.push(u8::from_str_radix(hex, 16).ok()?);
                i += 3;
            }
            _ => {
                out.push(*bytes.get(i + 1)?);
                i += 2;
            }
        }
    }
    String::from_utf8(out).ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    const SUFFIX: &str = "dc=apache,dc=org";

    #[test]
    fn test_plain_keys_are_unchanged() {
        assert_eq!(
            entity_dn(EntityKind::Person, "alice", SUFFIX),
            "uid=alice,ou=people,dc=apache,dc=org"
        );
        assert_eq!(
            entity_dn(EntityKind::Service, "infra", SUFFIX),
            "cn=infra,ou=apps,ou=groups,dc=apache,dc=org"
        );
    }

    #[test]
    fn test_special_characters_stay_in_one_rdn() {
        let dn = entity_dn(EntityKind::Group, "R&D, Europe", SUFFIX);
        assert_eq!(dn, "cn=R&D\\2c Europe,ou=groups,dc=apache,dc=org");
        assert_eq!(split_unescaped(&dn, b',').len(), 4);

        let dn = entity_dn(EntityKind::Person, "x+cn=y", SUFFIX);
        assert_eq!(dn, "uid=x\\2bcn\\3dy,ou=people,dc=apache,dc=org");
        assert_eq!(rdn_value(&dn, "uid").as_deref(), Some("x+cn=y"));
        assert_eq!(rdn_value(&dn, "cn"), None);
    }

    #[test]
    fn test_rdn_value() {
        let dn = "uid=alice,ou=people,dc=apache,dc=org";
        assert_eq!(rdn_value(dn, "uid").as_deref(), Some("alice"));
        assert_eq!(rdn_value(dn, "UID").as_deref(), Some("alice"));
        assert_eq!(rdn_value(dn, "cn"), None);
        assert_eq!(rdn_value("garbage", "uid"), None);
        assert_eq!(
            rdn_value("cn=R&D\\, Europe,ou=groups,dc=apache,dc=org", "cn").as_deref(),
            Some("R&D, Europe")
        );
        assert_eq!(rdn_value("cn=a+uid=b,ou=x", "uid").as_deref(), Some("b"));
    }

    proptest! {
        #[test]
        fn prop_entity_dn_carries_key(key in "[ -~]{1,24}") {
            for kind in [EntityKind::Person, EntityKind::Group, EntityKind::Committee, EntityKind::Service] {
                let dn = entity_dn(kind, &key, SUFFIX);
                prop_assert_eq!(rdn_value(&dn, kind.key_attribute()), Some(key.clone()));
                prop_assert!(dn.ends_with(&kind.base_dn(SUFFIX)));
            }
        }
    }
}
