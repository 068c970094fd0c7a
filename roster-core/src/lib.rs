//! Roster Core - Directory Types
//!
//! Plain data structures shared by every roster crate: endpoint URIs, search
//! rows, modifications and the entity kinds the directory stores. Nothing in
//! here performs network I/O.

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

pub mod config;
pub mod error;

pub use config::{DirectoryConfig, DEFAULT_BASE, DEFAULT_HOSTS, DEFAULT_LDAP_CONF};
pub use error::{AuthError, ConfigError, RosterError, RosterResult, TransportError};

// ============================================================================
// ATTRIBUTES
// ============================================================================

/// Attribute name to value list, as returned by a directory search.
pub type AttributeMap = HashMap<String, Vec<String>>;

/// Key under which `attrs` holds `name`. Attribute names compare
/// case-insensitively.
pub fn attribute_key<'a>(attrs: &'a AttributeMap, name: &str) -> Option<&'a str> {
    if let Some((key, _)) = attrs.get_key_value(name) {
        return Some(key.as_str());
    }
    attrs
        .keys()
        .find(|key| key.eq_ignore_ascii_case(name))
        .map(String::as_str)
}

/// Insert `values` under `name`, replacing any entry whose name differs
/// only in case.
pub fn insert_attribute(attrs: &mut AttributeMap, name: impl Into<String>, values: Vec<String>) {
    let name = name.into();
    if let Some(existing) = attribute_key(attrs, &name).map(str::to_string) {
        attrs.remove(&existing);
    }
    attrs.insert(name, values);
}

/// One row of a search response.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SearchEntry {
    /// Distinguished name of the entry.
    pub dn: String,
    /// Returned attributes. Attributes the entry lacks are absent.
    pub attrs: AttributeMap,
}

impl SearchEntry {
    pub fn new(dn: impl Into<String>, attrs: AttributeMap) -> Self {
        Self {
            dn: dn.into(),
            attrs,
        }
    }

    /// All values of an attribute, or an empty slice.
    pub fn values(&self, attribute: &str) -> &[String] {
        attribute_key(&self.attrs, attribute)
            .and_then(|key| self.attrs.get(key))
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    /// First value of an attribute.
    pub fn first(&self, attribute: &str) -> Option<&str> {
        self.values(attribute).first().map(String::as_str)
    }
}

/// Search scope relative to the base DN.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Scope {
    /// Only the base entry itself.
    Base,
    /// Immediate children of the base.
    #[default]
    OneLevel,
    /// The base and everything below it.
    Subtree,
}

// ============================================================================
// MODIFICATIONS
// ============================================================================

/// A single-attribute modification addressed to one entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Modification {
    /// Replace every value of the attribute.
    Replace { attribute: String, values: Vec<String> },
    /// Add values to the attribute.
    Add { attribute: String, values: Vec<String> },
    /// Delete the given values, or the whole attribute when `values` is empty.
    Delete { attribute: String, values: Vec<String> },
}

impl Modification {
    pub fn replace(attribute: impl Into<String>, values: Vec<String>) -> Self {
        Self::Replace {
            attribute: attribute.into(),
            values,
        }
    }

    pub fn add(attribute: impl Into<String>, values: Vec<String>) -> Self {
        Self::Add {
            attribute: attribute.into(),
            values,
        }
    }

    pub fn delete(attribute: impl Into<String>, values: Vec<String>) -> Self {
        Self::Delete {
            attribute: attribute.into(),
            values,
        }
    }

    /// Name of the modified attribute.
    pub fn attribute(&self) -> &str {
        match self {
            Self::Replace { attribute, .. }
            | Self::Add { attribute, .. }
            | Self::Delete { attribute, .. } => attribute,
        }
    }

    /// Values carried by the modification.
    pub fn values(&self) -> &[String] {
        match self {
            Self::Replace { values, .. } | Self::Add { values, .. } | Self::Delete { values, .. } => {
                values
            }
        }
    }

    /// The attribute's values after this modification is applied to `current`.
    ///
    /// An attribute with no remaining values yields an empty list, which the
    /// attribute store keeps as "present but empty".
    pub fn apply(&self, current: &[String]) -> Vec<String> {
        match self {
            Self::Replace { values, .. } => values.clone(),
            Self::Add { values, .. } => {
                let mut next = current.to_vec();
                for value in values {
                    if !next.contains(value) {
                        next.push(value.clone());
                    }
                }
                next
            }
            Self::Delete { values, .. } if values.is_empty() => Vec::new(),
            Self::Delete { values, .. } => current
                .iter()
                .filter(|value| !values.contains(value))
                .cloned()
                .collect(),
        }
    }
}

// ============================================================================
// ENDPOINTS
// ============================================================================

/// Transport scheme of a directory endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UriScheme {
    /// Plain `ldap://`, default port 389.
    Ldap,
    /// `ldaps://`, TLS from the first byte, default port 636.
    Ldaps,
}

impl UriScheme {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Ldap => "ldap",
            Self::Ldaps => "ldaps",
        }
    }

    pub fn default_port(&self) -> u16 {
        match self {
            Self::Ldap => 389,
            Self::Ldaps => 636,
        }
    }
}

/// One directory endpoint, `scheme://host:port`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct HostUri {
    scheme: UriScheme,
    host: String,
    port: u16,
}

impl HostUri {
    pub fn new(scheme: UriScheme, host: impl Into<String>, port: u16) -> Self {
        Self {
            scheme,
            host: host.into(),
            port,
        }
    }

    pub fn scheme(&self) -> UriScheme {
        self.scheme
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    /// True when the connection must be wrapped in TLS.
    pub fn requires_tls(&self) -> bool {
        self.scheme == UriScheme::Ldaps
    }
}

impl fmt::Display for HostUri {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}://{}:{}", self.scheme.as_str(), self.host, self.port)
    }
}

impl FromStr for HostUri {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = |reason: &str| ConfigError::InvalidUri {
            uri: s.to_string(),
            reason: reason.to_string(),
        };

        let parsed = url::Url::parse(s.trim()).map_err(|e| invalid(&e.to_string()))?;
        let scheme = match parsed.scheme() {
            "ldap" => UriScheme::Ldap,
            "ldaps" => UriScheme::Ldaps,
            other => return Err(invalid(&format!("unsupported scheme '{}'", other))),
        };
        let host = parsed
            .host_str()
            .filter(|h| !h.is_empty())
            .ok_or_else(|| invalid("missing host"))?;
        let port = parsed.port().unwrap_or_else(|| scheme.default_port());

        Ok(Self::new(scheme, host, port))
    }
}

// ============================================================================
// ENTITY KINDS
// ============================================================================

/// The record types this layer exposes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntityKind {
    Person,
    Group,
    Committee,
    Service,
}

impl EntityKind {
    /// Relative container of this kind below the directory suffix.
    pub fn base_rdn(&self) -> &'static str {
        match self {
            Self::Person => "ou=people",
            Self::Group => "ou=groups",
            Self::Committee => "ou=pmc,ou=committees,ou=groups",
            Self::Service => "ou=apps,ou=groups",
        }
    }

    /// Attribute whose value is the cache key.
    pub fn key_attribute(&self) -> &'static str {
        match self {
            Self::Person => "uid",
            Self::Group | Self::Committee | Self::Service => "cn",
        }
    }

    /// Attribute listing members, if the kind has members.
    ///
    /// Groups list member uids; committees and services list member DNs.
    pub fn member_attribute(&self) -> Option<&'static str> {
        match self {
            Self::Person => None,
            Self::Group => Some("memberUid"),
            Self::Committee | Self::Service => Some("member"),
        }
    }

    /// Full search base for this kind under `suffix`.
    pub fn base_dn(&self, suffix: &str) -> String {
        format!("{},{}", self.base_rdn(), suffix)
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Person => "person",
            Self::Group => "group",
            Self::Committee => "committee",
            Self::Service => "service",
        };
        f.write_str(name)
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_host_uri_parse_with_port() {
        let uri: HostUri = "ldaps://ldap-us.apache.org:636".parse().unwrap();
        assert_eq!(uri.scheme(), UriScheme::Ldaps);
        assert_eq!(uri.host(), "ldap-us.apache.org");
        assert_eq!(uri.port(), 636);
        assert!(uri.requires_tls());
        assert_eq!(uri.to_string(), "ldaps://ldap-us.apache.org:636");
    }

    #[test]
    fn test_host_uri_default_ports() {
        let plain: HostUri = "ldap://localhost".parse().unwrap();
        assert_eq!(plain.port(), 389);
        assert!(!plain.requires_tls());

        let tls: HostUri = "ldaps://localhost".parse().unwrap();
        assert_eq!(tls.port(), 636);
    }

    #[test]
    fn test_host_uri_rejects_other_schemes() {
        let err = "https://example.org".parse::<HostUri>().unwrap_err();
        assert!(matches!(err, ConfigError::InvalidUri { .. }));
        assert!("not a uri".parse::<HostUri>().is_err());
    }

    #[test]
    fn test_entity_kind_bases() {
        assert_eq!(
            EntityKind::Person.base_dn("dc=apache,dc=org"),
            "ou=people,dc=apache,dc=org"
        );
        assert_eq!(
            EntityKind::Committee.base_dn("dc=apache,dc=org"),
            "ou=pmc,ou=committees,ou=groups,dc=apache,dc=org"
        );
        assert_eq!(EntityKind::Group.member_attribute(), Some("memberUid"));
        assert_eq!(EntityKind::Person.member_attribute(), None);
    }

    #[test]
    fn test_attribute_names_ignore_case() {
        let mut attrs = AttributeMap::new();
        attrs.insert("memberUid".into(), vec!["a".into()]);
        assert_eq!(attribute_key(&attrs, "memberUid"), Some("memberUid"));
        assert_eq!(attribute_key(&attrs, "MEMBERUID"), Some("memberUid"));
        assert_eq!(attribute_key(&attrs, "cn"), None);

        insert_attribute(&mut attrs, "memberuid", vec!["b".into()]);
        assert_eq!(attrs.len(), 1);
        assert_eq!(attrs.get("memberuid"), Some(&vec!["b".to_string()]));
    }

    #[test]
    fn test_modification_apply() {
        let current = vec!["a".to_string(), "b".to_string()];

        let add = Modification::add("x", vec!["b".into(), "c".into()]);
        assert_eq!(add.apply(&current), vec!["a", "b", "c"]);

        let delete = Modification::delete("x", vec!["a".into()]);
        assert_eq!(delete.apply(&current), vec!["b"]);

        let delete_all = Modification::delete("x", vec![]);
        assert!(delete_all.apply(&current).is_empty());

        let replace = Modification::replace("x", vec!["z".into()]);
        assert_eq!(replace.apply(&current), vec!["z"]);
        assert_eq!(replace.apply(&replace.apply(&current)), vec!["z"]);
    }

    #[test]
    fn test_search_entry_accessors() {
        let mut attrs = AttributeMap::new();
        attrs.insert("mail".into(), vec!["a@example.org".into()]);
        let entry = SearchEntry::new("uid=a,ou=people,dc=example", attrs);

        assert_eq!(entry.first("mail"), Some("a@example.org"));
        assert_eq!(entry.first("Mail"), Some("a@example.org"));
        assert!(entry.values("cn").is_empty());
        assert_eq!(entry.first("cn"), None);
    }

    mod prop {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn prop_add_and_replace_are_idempotent(
                current in proptest::collection::vec("[a-z]{1,4}", 0..6),
                values in proptest::collection::vec("[a-z]{1,4}", 0..6),
            ) {
                for modification in [Modification::add("x", values.clone()), Modification::replace("x", values.clone())] {
                    let once = modification.apply(&current);
                    prop_assert_eq!(modification.apply(&once), once);
                }
            }
        }
    }
}
