//! `ldap3` transport.

use std::collections::HashSet;
use std::time::Duration;

use async_trait::async_trait;
use ldap3::{LdapConnAsync, LdapConnSettings, LdapError, Mod};
use roster_core::{HostUri, Modification, Scope, SearchEntry, TransportError};
use tracing::warn;

use crate::transport::{DirectoryConnector, DirectorySession};

/// Opens `ldap3` sessions. `ldaps://` URIs negotiate TLS on connect.
#[derive(Debug, Clone)]
pub struct Ldap3Connector {
    timeout: Duration,
}

impl Ldap3Connector {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }
}

#[async_trait]
impl DirectoryConnector for Ldap3Connector {
    async fn connect(&self, host: &HostUri) -> Result<Box<dyn DirectorySession>, TransportError> {
        let url = host.to_string();
        let settings = LdapConnSettings::new().set_conn_timeout(self.timeout);
        let (conn, ldap) = LdapConnAsync::with_settings(settings, &url)
            .await
            .map_err(|e| TransportError::Connect {
                host: url.clone(),
                reason: e.to_string(),
            })?;

        let driver_host = url.clone();
        tokio::spawn(async move {
            if let Err(e) = conn.drive().await {
                warn!(host = %driver_host, error = %e, "LDAP connection driver stopped");
            }
        });

        Ok(Box::new(Ldap3Session { host: url, ldap }))
    }
}

/// One `ldap3` connection.
pub struct Ldap3Session {
    host: String,
    ldap: ldap3::Ldap,
}

#[async_trait]
impl DirectorySession for Ldap3Session {
    async fn bind(&mut self, dn: &str, password: &str) -> Result<(), TransportError> {
        self.ldap
            .simple_bind(dn, password)
            .await
            .and_then(|result| result.success())
            .map(|_| ())
            .map_err(|e| bind_error(&self.host, dn, e))
    }

    async fn search(
        &mut self,
        base: &str,
        scope: Scope,
        filter: &str,
        attributes: &[String],
    ) -> Result<Vec<SearchEntry>, TransportError> {
        let (rows, _result) = self
            .ldap
            .search(base, ldap_scope(scope), filter, attributes.to_vec())
            .await
            .and_then(|result| result.success())
            .map_err(|e| TransportError::Search {
                base: base.to_string(),
                reason: e.to_string(),
            })?;

        Ok(rows
            .into_iter()
            .map(|row| {
                let entry = ldap3::SearchEntry::construct(row);
                SearchEntry::new(entry.dn, entry.attrs)
            })
            .collect())
    }

    async fn modify(&mut self, dn: &str, modifications: &[Modification]) -> Result<(), TransportError> {
        let mods: Vec<Mod<String>> = modifications.iter().map(ldap_mod).collect();
        match self
            .ldap
            .modify(dn, mods)
            .await
            .and_then(|result| result.success())
        {
            Ok(_) => Ok(()),
            Err(e @ LdapError::LdapResult { .. }) => Err(TransportError::Modify {
                dn: dn.to_string(),
                reason: e.to_string(),
            }),
            Err(e) => Err(TransportError::Connect {
                host: self.host.clone(),
                reason: e.to_string(),
            }),
        }
    }

    async fn unbind(&mut self) -> Result<(), TransportError> {
        self.ldap.unbind().await.map_err(|e| TransportError::Connect {
            host: self.host.clone(),
            reason: e.to_string(),
        })
    }
}

/// Result codes that mean the credentials were refused: 48
/// inappropriateAuthentication, 49 invalidCredentials.
const CREDENTIAL_CODES: &[u32] = &[48, 49];

/// Only a refusal of the credentials is a bind failure. Anything else,
/// such as busy (51) or unavailable (52), is the host failing.
fn bind_error(host: &str, dn: &str, e: LdapError) -> TransportError {
    match e {
        LdapError::LdapResult { result } if CREDENTIAL_CODES.contains(&result.rc) => {
            TransportError::Bind {
                dn: dn.to_string(),
                reason: LdapError::LdapResult { result }.to_string(),
            }
        }
        other => TransportError::Connect {
            host: host.to_string(),
            reason: other.to_string(),
        },
    }
}

fn ldap_scope(scope: Scope) -> ldap3::Scope {
    match scope {
        Scope::Base => ldap3::Scope::Base,
        Scope::OneLevel => ldap3::Scope::OneLevel,
        Scope::Subtree => ldap3::Scope::Subtree,
    }
}

fn ldap_mod(modification: &Modification) -> Mod<String> {
    let values: HashSet<String> = modification.values().iter().cloned().collect();
    let attribute = modification.attribute().to_string();
    match modification {
        Modification::Replace { .. } => Mod::Replace(attribute, values),
        Modification::Add { .. } => Mod::Add(attribute, values),
        Modification::Delete { .. } => Mod::Delete(attribute, values),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ldap_mod_mapping() {
        let m = ldap_mod(&Modification::add("memberUid", vec!["a".into(), "a".into()]));
        match m {
            Mod::Add(attr, values) => {
                assert_eq!(attr, "memberUid");
                assert_eq!(values.len(), 1);
            }
            _ => panic!("expected Mod::Add"),
        }
        assert!(matches!(
            ldap_mod(&Modification::delete("mail", vec![])),
            Mod::Delete(_, values) if values.is_empty()
        ));
    }

    fn ldap_result(rc: u32, text: &str) -> LdapError {
        LdapError::LdapResult {
            result: ldap3::LdapResult {
                rc,
                matched: String::new(),
                text: text.to_string(),
                refs: Vec::new(),
                ctrls: Vec::new(),
            },
        }
    }

    #[test]
    fn test_bind_error_separates_credentials_from_host_trouble() {
        let dn = "uid=alice,ou=people,dc=apache,dc=org";
        assert!(matches!(
            bind_error("ldap://h1:389", dn, ldap_result(49, "invalid credentials")),
            TransportError::Bind { .. }
        ));
        assert!(matches!(
            bind_error("ldap://h1:389", dn, ldap_result(48, "")),
            TransportError::Bind { .. }
        ));
        for rc in [51, 52, 53, 80] {
            match bind_error("ldap://h1:389", dn, ldap_result(rc, "busy")) {
                TransportError::Connect { host, .. } => assert_eq!(host, "ldap://h1:389"),
                other => panic!("rc {rc} should be a host failure, got {other:?}"),
            }
        }
    }

    #[test]
    fn test_scope_mapping() {
        assert!(matches!(ldap_scope(Scope::OneLevel), ldap3::Scope::OneLevel));
        assert!(matches!(ldap_scope(Scope::Subtree), ldap3::Scope::Subtree));
    }
}
