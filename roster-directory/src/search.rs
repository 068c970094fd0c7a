//! Resilient search.
//!
//! [`Directory`] is the entry point the entity layer talks to. A search is
//! tried up to `max(host count, 2)` times; every failure discards the shared
//! session (so the next attempt reconnects, advancing through the host
//! list), sleeps a fixed backoff and tries again. Running out of attempts
//! surfaces one [`RosterError::SearchFailed`] naming the last host and the
//! last cause.

use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::{Duration, Instant};

use roster_core::{
    attribute_key, AttributeMap, DirectoryConfig, HostUri, Modification, RosterError, RosterResult, Scope,
    SearchEntry, TransportError,
};
use secrecy::{ExposeSecret, SecretString};
use tokio::time::sleep;
use tracing::{debug, warn};

use crate::connection::{BoundSession, ConnectionManager, ConnectionStats, Credentials};
use crate::hosts::{HostRegistry, HostSources};
use crate::ldap::Ldap3Connector;
use crate::transport::DirectoryConnector;

/// Failover-aware handle to the directory.
#[derive(Debug)]
pub struct Directory {
    connections: ConnectionManager,
    base: String,
    backoff: Duration,
    deadline: Option<Duration>,
}

impl Directory {
    /// Build a directory over `connector`, resolving hosts from `config`.
    pub fn new(config: &DirectoryConfig, connector: Arc<dyn DirectoryConnector>) -> RosterResult<Self> {
        config.validate()?;
        let registry = Arc::new(HostRegistry::new(HostSources::from_config(config)));
        Ok(Self::with_registry(config, registry, connector))
    }

    /// Build a directory over an existing host registry.
    pub fn with_registry(
        config: &DirectoryConfig,
        registry: Arc<HostRegistry>,
        connector: Arc<dyn DirectoryConnector>,
    ) -> Self {
        let credentials = match (&config.bind_dn, &config.bind_password) {
            (Some(dn), Some(password)) => Some(Credentials {
                dn: dn.clone(),
                password: SecretString::from(password.expose_secret().to_owned()),
            }),
            _ => None,
        };

        Self {
            connections: ConnectionManager::new(registry, connector, credentials),
            base: config.base.clone(),
            backoff: config.retry_backoff(),
            deadline: config.search_deadline(),
        }
    }

    /// A directory speaking LDAP through `ldap3`.
    pub fn connect_ldap(config: &DirectoryConfig) -> RosterResult<Self> {
        Self::new(config, Arc::new(Ldap3Connector::new(config.connect_timeout())))
    }

    /// Directory suffix, e.g. `dc=apache,dc=org`.
    pub fn base(&self) -> &str {
        &self.base
    }

    pub fn hosts(&self) -> &HostRegistry {
        self.connections.registry()
    }

    pub fn connections(&self) -> &ConnectionManager {
        &self.connections
    }

    pub fn stats(&self) -> ConnectionStats {
        self.connections.stats()
    }

    /// Host of the shared session, if connected.
    pub async fn current_host(&self) -> Option<HostUri> {
        self.connections.current_host().await
    }

    /// Search with retry and failover.
    ///
    /// An empty `attributes` slice asks for every attribute. Zero matching
    /// rows is an empty vector, not an error.
    pub async fn search(
        &self,
        base: &str,
        scope: Scope,
        filter: &str,
        attributes: &[&str],
    ) -> RosterResult<Vec<SearchEntry>> {
        let attributes: Vec<String> = attributes.iter().map(|a| a.to_string()).collect();
        let budget = self.connections.registry().host_count()?.max(2) as u32;
        let started = Instant::now();
        let mut attempts_left = budget;

        loop {
            self.connections.counters.searches.fetch_add(1, Ordering::Relaxed);

            let (host, error) = match self.connections.acquire().await {
                Ok(mut lease) => {
                    let host = lease.host().map(ToString::to_string).unwrap_or_default();
                    match lease.search(base, scope, filter, &attributes).await {
                        Ok(rows) => {
                            debug!(base, filter, rows = rows.len(), "directory search");
                            return Ok(rows);
                        }
                        Err(e) => {
                            lease.invalidate().await;
                            (host, e)
                        }
                    }
                }
                Err(RosterError::NoHostsAvailable { attempted, last }) => {
                    (attempted.last().cloned().unwrap_or_default(), last)
                }
                Err(fatal) => return Err(fatal),
            };

            self.connections
                .counters
                .failed_searches
                .fetch_add(1, Ordering::Relaxed);
            attempts_left -= 1;
            let used = budget - attempts_left;
            warn!(host = %host, attempt = used, error = %error, "directory search failed");

            if attempts_left == 0 {
                return Err(RosterError::SearchFailed {
                    host,
                    attempts: used,
                    last: error,
                });
            }

            if let Some(deadline) = self.deadline {
                if started.elapsed() + self.backoff >= deadline {
                    warn!(host = %host, deadline_ms = deadline.as_millis() as u64, "search deadline reached");
                    return Err(RosterError::SearchFailed {
                        host,
                        attempts: used,
                        last: error,
                    });
                }
            }

            sleep(self.backoff).await;
        }
    }

    /// One-level search, the common case for entity lookups.
    pub async fn search_one_level(
        &self,
        base: &str,
        filter: &str,
        attributes: &[&str],
    ) -> RosterResult<Vec<SearchEntry>> {
        self.search(base, Scope::OneLevel, filter, attributes).await
    }

    /// One-level search for a single attribute.
    ///
    /// Each matching row is reduced to that attribute's values; rows without
    /// the attribute are dropped.
    pub async fn search_attribute(
        &self,
        base: &str,
        filter: &str,
        attribute: &str,
    ) -> RosterResult<Vec<Vec<String>>> {
        let rows = self.search_one_level(base, filter, &[attribute]).await?;
        Ok(rows
            .into_iter()
            .filter_map(|mut row| take_attribute(&mut row.attrs, attribute))
            .filter(|values| !values.is_empty())
            .collect())
    }

    /// Apply modifications to `dn`. Never retried.
    pub async fn modify(&self, dn: &str, modifications: &[Modification]) -> RosterResult<()> {
        let mut lease = self.connections.acquire().await?;
        match lease.modify(dn, modifications).await {
            Ok(()) => {
                debug!(dn, count = modifications.len(), "directory modify");
                Ok(())
            }
            Err(source) => {
                warn!(dn, error = %source, "directory modify failed");
                if !matches!(source, TransportError::Modify { .. }) {
                    lease.invalidate().await;
                }
                Err(RosterError::ModifyFailed {
                    dn: dn.to_string(),
                    source,
                })
            }
        }
    }

    /// Open a dedicated session bound as `dn`.
    pub async fn bind_as(&self, dn: &str, password: &str) -> RosterResult<BoundSession> {
        self.connections.open_bound(dn, password).await
    }

    /// Close the shared session.
    pub async fn disconnect(&self) {
        self.connections.disconnect().await;
    }
}

/// Remove `name` from `attrs`, matching attribute names case-insensitively.
pub fn take_attribute(attrs: &mut AttributeMap, name: &str) -> Option<Vec<String>> {
    let key = attribute_key(attrs, name)?.to_string();
    attrs.remove(&key)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_take_attribute_case_insensitive() {
        let mut attrs = AttributeMap::new();
        attrs.insert("memberUid".into(), vec!["a".into()]);
        assert_eq!(take_attribute(&mut attrs, "memberuid"), Some(vec!["a".into()]));
        assert!(attrs.is_empty());
        assert_eq!(take_attribute(&mut attrs, "cn"), None);
    }
}
