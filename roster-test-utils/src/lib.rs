//! Roster Test Utilities
//!
//! Shared test infrastructure for the roster workspace:
//! - [`MockDirectory`], an in-memory directory implementing the transport
//!   traits, with per-host fault injection and call counters
//! - Proptest generators for keys and attribute values
//! - Fixtures describing a small directory tree
//! - Assertions for the roster error taxonomy

pub mod eval;

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use roster_core::{attribute_key, AttributeMap, HostUri, Modification, Scope, SearchEntry, TransportError};
use roster_directory::{DirectoryConnector, DirectorySession};

pub use eval::Filter;
pub use roster_core::{DirectoryConfig, RosterError, RosterResult};

// ============================================================================
// MOCK DIRECTORY
// ============================================================================

/// Fault injection and counters for one host, keyed by host name.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HostState {
    pub fail_connect: bool,
    /// Refuse every bind as bad credentials.
    pub fail_bind: bool,
    /// Answer binds as busy or unavailable rather than refusing them.
    pub bind_unavailable: bool,
    /// Searches still to fail on this host.
    pub failing_searches: u32,
    pub connects: u32,
    pub binds: u32,
    pub searches: u32,
}

#[derive(Debug, Default)]
struct MockState {
    entries: BTreeMap<String, AttributeMap>,
    hosts: HashMap<String, HostState>,
    passwords: HashMap<String, String>,
    rejected_modifies: Vec<String>,
    /// Searches still to fail on any host.
    failing_searches: u32,
    modify_log: Vec<(String, Vec<Modification>)>,
}

/// In-memory directory shared by every session it opens.
///
/// Entries are keyed by DN; clones share state, so a test can keep one
/// handle for inspection while the directory under test owns another.
#[derive(Debug, Clone, Default)]
pub struct MockDirectory {
    state: Arc<Mutex<MockState>>,
}

impl MockDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Add or replace an entry.
    pub fn insert(&self, dn: &str, attrs: &[(&str, &[&str])]) {
        let attrs = attrs
            .iter()
            .map(|(k, v)| (k.to_string(), v.iter().map(|s| s.to_string()).collect()))
            .collect();
        self.lock().entries.insert(dn.to_ascii_lowercase(), attrs);
    }

    pub fn remove(&self, dn: &str) -> Option<AttributeMap> {
        self.lock().entries.remove(&dn.to_ascii_lowercase())
    }

    pub fn entry(&self, dn: &str) -> Option<AttributeMap> {
        self.lock().entries.get(&dn.to_ascii_lowercase()).cloned()
    }

    /// Stored values of one attribute, if the entry has it.
    pub fn values(&self, dn: &str, attribute: &str) -> Option<Vec<String>> {
        let state = self.lock();
        let attrs = state.entries.get(&dn.to_ascii_lowercase())?;
        find_key(attrs, attribute).and_then(|key| attrs.get(&key).cloned())
    }

    /// Accept simple binds as `dn` with `password`.
    pub fn set_password(&self, dn: &str, password: &str) {
        self.lock()
            .passwords
            .insert(dn.to_ascii_lowercase(), password.to_string());
    }

    pub fn fail_connect(&self, host: &str) {
        self.lock().hosts.entry(host.to_string()).or_default().fail_connect = true;
    }

    pub fn fail_bind(&self, host: &str) {
        self.lock().hosts.entry(host.to_string()).or_default().fail_bind = true;
    }

    pub fn bind_unavailable(&self, host: &str) {
        self.lock().hosts.entry(host.to_string()).or_default().bind_unavailable = true;
    }

    /// Undo connect and bind faults for `host`.
    pub fn heal(&self, host: &str) {
        let mut state = self.lock();
        let entry = state.hosts.entry(host.to_string()).or_default();
        entry.fail_connect = false;
        entry.fail_bind = false;
        entry.bind_unavailable = false;
        entry.failing_searches = 0;
    }

    /// Fail the next `count` searches sent to `host`.
    pub fn fail_searches_on(&self, host: &str, count: u32) {
        self.lock().hosts.entry(host.to_string()).or_default().failing_searches = count;
    }

    /// Fail the next `count` searches, whichever host receives them.
    pub fn fail_next_searches(&self, count: u32) {
        self.lock().failing_searches = count;
    }

    /// Reject modifications of `dn` as a directory-side constraint violation.
    pub fn reject_modify(&self, dn: &str) {
        self.lock().rejected_modifies.push(dn.to_ascii_lowercase());
    }

    pub fn host_state(&self, host: &str) -> HostState {
        self.lock().hosts.get(host).cloned().unwrap_or_default()
    }

    pub fn connect_attempts(&self, host: &str) -> u32 {
        self.host_state(host).connects
    }

    pub fn total_connects(&self) -> u32 {
        self.lock().hosts.values().map(|h| h.connects).sum()
    }

    pub fn total_searches(&self) -> u32 {
        self.lock().hosts.values().map(|h| h.searches).sum()
    }

    /// Every successful modify, in order.
    pub fn modify_log(&self) -> Vec<(String, Vec<Modification>)> {
        self.lock().modify_log.clone()
    }

    /// Reset counters and the modify log, keeping entries and faults.
    pub fn reset_counters(&self) {
        let mut state = self.lock();
        state.modify_log.clear();
        for host in state.hosts.values_mut() {
            host.connects = 0;
            host.binds = 0;
            host.searches = 0;
        }
    }

    /// The directory as a shareable connector.
    pub fn connector(&self) -> Arc<dyn DirectoryConnector> {
        Arc::new(self.clone())
    }
}

#[async_trait]
impl DirectoryConnector for MockDirectory {
    async fn connect(&self, host: &HostUri) -> Result<Box<dyn DirectorySession>, TransportError> {
        let name = host.host().to_string();
        {
            let mut state = self.lock();
            let entry = state.hosts.entry(name.clone()).or_default();
            entry.connects += 1;
            if entry.fail_connect {
                return Err(TransportError::Connect {
                    host: host.to_string(),
                    reason: "connection refused".to_string(),
                });
            }
        }
        Ok(Box::new(MockSession {
            directory: self.clone(),
            host: name,
        }))
    }
}

/// One open session against a [`MockDirectory`].
#[derive(Debug)]
pub struct MockSession {
    directory: MockDirectory,
    host: String,
}

#[async_trait]
impl DirectorySession for MockSession {
    async fn bind(&mut self, dn: &str, password: &str) -> Result<(), TransportError> {
        let mut state = self.directory.lock();
        let host = state.hosts.entry(self.host.clone()).or_default();
        host.binds += 1;
        if host.bind_unavailable {
            return Err(TransportError::Connect {
                host: self.host.clone(),
                reason: "server unavailable".to_string(),
            });
        }
        if host.fail_bind {
            return Err(TransportError::Bind {
                dn: dn.to_string(),
                reason: "unwilling to perform".to_string(),
            });
        }
        if dn.is_empty() && password.is_empty() {
            return Ok(());
        }
        match state.passwords.get(&dn.to_ascii_lowercase()) {
            Some(expected) if !password.is_empty() && expected == password => Ok(()),
            _ => Err(TransportError::Bind {
                dn: dn.to_string(),
                reason: "invalid credentials".to_string(),
            }),
        }
    }

    async fn search(
        &mut self,
        base: &str,
        scope: Scope,
        filter: &str,
        attributes: &[String],
    ) -> Result<Vec<SearchEntry>, TransportError> {
        let search_error = |reason: &str| TransportError::Search {
            base: base.to_string(),
            reason: reason.to_string(),
        };

        let mut state = self.directory.lock();
        let host = state.hosts.entry(self.host.clone()).or_default();
        host.searches += 1;
        if host.failing_searches > 0 {
            host.failing_searches -= 1;
            return Err(search_error("server busy"));
        }
        if state.failing_searches > 0 {
            state.failing_searches -= 1;
            return Err(search_error("server busy"));
        }

        let filter = Filter::parse(filter).map_err(|e| search_error(&e))?;
        let base = base.to_ascii_lowercase();
        let rows = state
            .entries
            .iter()
            .filter(|(dn, _)| in_scope(dn, &base, scope))
            .filter(|(_, attrs)| filter.matches(attrs))
            .map(|(dn, attrs)| SearchEntry::new(dn.clone(), project(attrs, attributes)))
            .collect();
        Ok(rows)
    }

    async fn modify(&mut self, dn: &str, modifications: &[Modification]) -> Result<(), TransportError> {
        let key = dn.to_ascii_lowercase();
        let mut state = self.directory.lock();
        if state.rejected_modifies.contains(&key) {
            return Err(TransportError::Modify {
                dn: dn.to_string(),
                reason: "constraint violation".to_string(),
            });
        }
        let attrs = state.entries.get_mut(&key).ok_or_else(|| TransportError::Modify {
            dn: dn.to_string(),
            reason: "no such object".to_string(),
        })?;

        for modification in modifications {
            let name = find_key(attrs, modification.attribute())
                .unwrap_or_else(|| modification.attribute().to_string());
            let current = attrs.get(&name).cloned().unwrap_or_default();
            let updated = modification.apply(&current);
            if updated.is_empty() {
                attrs.remove(&name);
            } else {
                attrs.insert(name, updated);
            }
        }
        state.modify_log.push((dn.to_string(), modifications.to_vec()));
        Ok(())
    }

    async fn unbind(&mut self) -> Result<(), TransportError> {
        Ok(())
    }
}

fn find_key(attrs: &AttributeMap, name: &str) -> Option<String> {
    attribute_key(attrs, name).map(str::to_string)
}

fn in_scope(dn: &str, base: &str, scope: Scope) -> bool {
    match scope {
        Scope::Base => dn == base,
        Scope::OneLevel => dn.split_once(',').is_some_and(|(_, parent)| parent == base),
        Scope::Subtree => dn == base || dn.ends_with(&format!(",{}", base)),
    }
}

/// Keep only the requested attributes. Absent attributes are omitted, as a
/// directory server would.
fn project(attrs: &AttributeMap, requested: &[String]) -> AttributeMap {
    if requested.is_empty() {
        return attrs.clone();
    }
    attrs
        .iter()
        .filter(|(k, _)| requested.iter().any(|r| r.eq_ignore_ascii_case(k)))
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect()
}

// ============================================================================
// PROPTEST GENERATORS
// ============================================================================

pub mod generators {
    //! Proptest strategies for directory data.

    use proptest::prelude::*;

    /// Account ids as the directory allows them.
    pub fn arb_uid() -> impl Strategy<Value = String> {
        "[a-z][a-z0-9]{1,11}"
    }

    /// Printable attribute values, including filter metacharacters.
    pub fn arb_attribute_value() -> impl Strategy<Value = String> {
        "[ -~]{0,32}"
    }

    /// Distinct account ids.
    pub fn arb_uid_set(max: usize) -> impl Strategy<Value = Vec<String>> {
        proptest::collection::btree_set(arb_uid(), 1..max).prop_map(|s| s.into_iter().collect())
    }

    /// Number of configured hosts.
    pub fn arb_host_count() -> impl Strategy<Value = usize> {
        1usize..6
    }
}

// ============================================================================
// FIXTURES
// ============================================================================

pub mod fixtures {
    //! A small directory tree and matching configuration.

    use super::*;

    pub const SUFFIX: &str = "dc=apache,dc=org";
    pub const ALICE_PASSWORD: &str = "wonderland";

    pub fn person_dn(uid: &str) -> String {
        format!("uid={},ou=people,{}", uid, SUFFIX)
    }

    pub fn group_dn(cn: &str) -> String {
        format!("cn={},ou=groups,{}", cn, SUFFIX)
    }

    pub fn committee_dn(cn: &str) -> String {
        format!("cn={},ou=pmc,ou=committees,ou=groups,{}", cn, SUFFIX)
    }

    pub fn service_dn(cn: &str) -> String {
        format!("cn={},ou=apps,ou=groups,{}", cn, SUFFIX)
    }

    /// Mock directory populated with people, a group, a committee and a
    /// service.
    ///
    /// - `alice`: full record, password [`ALICE_PASSWORD`]
    /// - `bob`: no `mail`, nologin shell
    /// - `carol`: banned
    /// - group `committers` (alice, bob, carol), group `empty`
    /// - committee `tac` (members alice and bob, owner alice)
    /// - service `infra` (member bob)
    pub fn apache_directory() -> MockDirectory {
        let directory = MockDirectory::new();
        directory.insert(
            &person_dn("alice"),
            &[
                ("uid", &["alice"]),
                ("cn", &["Alice Liddell"]),
                ("givenName", &["Alice"]),
                ("sn", &["Liddell"]),
                ("mail", &["alice@example.org"]),
                ("asf-altEmail", &["alice@wonderland.example"]),
                ("loginShell", &["/bin/bash"]),
            ],
        );
        directory.insert(
            &person_dn("bob"),
            &[
                ("uid", &["bob"]),
                ("cn", &["Bob Builder"]),
                ("loginShell", &["/usr/bin/false"]),
            ],
        );
        directory.insert(
            &person_dn("carol"),
            &[
                ("uid", &["carol"]),
                ("cn", &["Carol Danvers"]),
                ("mail", &["carol@example.org"]),
                ("loginShell", &["/bin/bash"]),
                ("asf-banned", &["yes"]),
            ],
        );
        directory.insert(
            &group_dn("committers"),
            &[
                ("cn", &["committers"]),
                ("memberUid", &["alice", "bob", "carol"]),
                ("modifyTimestamp", &["20240102030405Z"]),
            ],
        );
        directory.insert(&group_dn("empty"), &[("cn", &["empty"])]);
        let alice = person_dn("alice");
        let bob = person_dn("bob");
        directory.insert(
            &committee_dn("tac"),
            &[
                ("cn", &["tac"]),
                ("member", &[alice.as_str(), bob.as_str()]),
                ("owner", &[alice.as_str()]),
                ("modifyTimestamp", &["20230615120000Z"]),
            ],
        );
        directory.insert(
            &service_dn("infra"),
            &[("cn", &["infra"]), ("member", &[bob.as_str()])],
        );
        directory.set_password(&alice, ALICE_PASSWORD);
        directory
    }

    /// Configuration pinned to `hosts` in order, with no backoff.
    pub fn config_for(hosts: &[&str]) -> DirectoryConfig {
        DirectoryConfig {
            hosts: hosts.iter().map(|h| h.to_string()).collect(),
            ldap_conf: "/nonexistent/ldap.conf".into(),
            shuffle_hosts: false,
            retry_backoff_ms: 0,
            ..DirectoryConfig::default()
        }
    }
}

// ============================================================================
// CUSTOM ASSERTIONS
// ============================================================================

pub mod assertions {
    //! Assertions for roster error variants.

    use super::*;
    use roster_core::{AuthError, ConfigError};

    #[track_caller]
    pub fn assert_search_failed<T: std::fmt::Debug>(result: &RosterResult<T>, attempts: u32) {
        match result {
            Err(RosterError::SearchFailed { attempts: got, .. }) => {
                assert_eq!(*got, attempts, "Wrong attempt count in SearchFailed");
            }
            other => panic!("Expected SearchFailed, got: {:?}", other),
        }
    }

    #[track_caller]
    pub fn assert_modify_failed<T: std::fmt::Debug>(result: &RosterResult<T>) {
        match result {
            Err(RosterError::ModifyFailed { .. }) => {}
            other => panic!("Expected ModifyFailed, got: {:?}", other),
        }
    }

    #[track_caller]
    pub fn assert_no_hosts<T: std::fmt::Debug>(result: &RosterResult<T>) {
        match result {
            Err(RosterError::Config(ConfigError::NoHosts { .. })) => {}
            other => panic!("Expected NoHosts config error, got: {:?}", other),
        }
    }

    #[track_caller]
    pub fn assert_auth_rejected<T: std::fmt::Debug>(result: &RosterResult<T>) {
        match result {
            Err(RosterError::Auth(AuthError::Rejected { .. })) => {}
            other => panic!("Expected rejected credentials, got: {:?}", other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::fixtures::*;
    use super::*;

    #[tokio::test]
    async fn test_one_level_search_and_projection() {
        let directory = apache_directory();
        let mut session = directory
            .connect(&"ldap://h1".parse().unwrap())
            .await
            .unwrap();
        let rows = session
            .search(
                &format!("ou=people,{}", SUFFIX),
                Scope::OneLevel,
                "(mail=*)",
                &["mail".to_string()],
            )
            .await
            .unwrap();
        assert_eq!(rows.len(), 2);
        assert!(rows.iter().all(|r| r.attrs.len() == 1));
        assert_eq!(directory.host_state("h1").searches, 1);
    }

    #[tokio::test]
    async fn test_bind_checks_password() {
        let directory = apache_directory();
        let mut session = directory
            .connect(&"ldap://h1".parse().unwrap())
            .await
            .unwrap();
        assert!(session.bind("", "").await.is_ok());
        assert!(session.bind(&person_dn("alice"), ALICE_PASSWORD).await.is_ok());
        assert!(matches!(
            session.bind(&person_dn("alice"), "nope").await,
            Err(TransportError::Bind { .. })
        ));
    }

    #[tokio::test]
    async fn test_modify_applies_and_logs() {
        let directory = apache_directory();
        let mut session = directory
            .connect(&"ldap://h1".parse().unwrap())
            .await
            .unwrap();
        let dn = person_dn("bob");
        session
            .modify(&dn, &[Modification::replace("mail", vec!["bob@example.org".into()])])
            .await
            .unwrap();
        assert_eq!(directory.values(&dn, "mail"), Some(vec!["bob@example.org".to_string()]));
        assert_eq!(directory.modify_log().len(), 1);

        directory.reject_modify(&dn);
        assert!(session
            .modify(&dn, &[Modification::delete("mail", vec![])])
            .await
            .is_err());
    }
}
