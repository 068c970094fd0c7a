//! Connection manager.
//!
//! Holds the single shared directory session. Opening a session walks the
//! host registry at most once per known host: connect, bind, and on any
//! failure log and move to the next host. Reading or replacing the session
//! happens under one async mutex, so two callers never open duplicate
//! sessions and nobody keeps using a session another caller has discarded.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use roster_core::{
    AuthError, HostUri, Modification, RosterError, RosterResult, Scope, SearchEntry,
    TransportError,
};
use secrecy::{ExposeSecret, SecretString};
use tokio::sync::{Mutex, MutexGuard};
use tracing::{debug, info, warn};

use crate::hosts::HostRegistry;
use crate::transport::{DirectoryConnector, DirectorySession};

/// Service account used to bind the shared session.
#[derive(Debug)]
pub struct Credentials {
    pub dn: String,
    pub password: SecretString,
}

/// Counters describing connection and search activity.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConnectionStats {
    /// Hosts tried while opening sessions.
    pub connect_attempts: u64,
    /// Hosts that failed to connect or bind.
    pub failed_connects: u64,
    /// Search attempts, including retries.
    pub searches: u64,
    /// Search attempts that failed.
    pub failed_searches: u64,
}

#[derive(Debug, Default)]
pub(crate) struct Counters {
    pub(crate) connect_attempts: AtomicU64,
    pub(crate) failed_connects: AtomicU64,
    pub(crate) searches: AtomicU64,
    pub(crate) failed_searches: AtomicU64,
}

impl Counters {
    pub(crate) fn snapshot(&self) -> ConnectionStats {
        ConnectionStats {
            connect_attempts: self.connect_attempts.load(Ordering::Relaxed),
            failed_connects: self.failed_connects.load(Ordering::Relaxed),
            searches: self.searches.load(Ordering::Relaxed),
            failed_searches: self.failed_searches.load(Ordering::Relaxed),
        }
    }
}

struct ActiveSession {
    host: HostUri,
    session: Box<dyn DirectorySession>,
}

/// Owner of the shared directory session.
pub struct ConnectionManager {
    registry: Arc<HostRegistry>,
    connector: Arc<dyn DirectoryConnector>,
    credentials: Option<Credentials>,
    active: Mutex<Option<ActiveSession>>,
    pub(crate) counters: Counters,
}

impl ConnectionManager {
    pub fn new(
        registry: Arc<HostRegistry>,
        connector: Arc<dyn DirectoryConnector>,
        credentials: Option<Credentials>,
    ) -> Self {
        Self {
            registry,
            connector,
            credentials,
            active: Mutex::new(None),
            counters: Counters::default(),
        }
    }

    pub fn registry(&self) -> &HostRegistry {
        &self.registry
    }

    /// Lock the shared session, connecting first if there is none.
    pub async fn acquire(&self) -> RosterResult<SessionLease<'_>> {
        let mut guard = self.active.lock().await;
        if guard.is_none() {
            *guard = Some(self.open().await?);
        }
        Ok(SessionLease { guard })
    }

    /// Open a new shared session, replacing (and closing) any current one.
    pub async fn connect(&self) -> RosterResult<HostUri> {
        let mut guard = self.active.lock().await;
        let fresh = self.open().await?;
        let host = fresh.host.clone();
        if let Some(old) = guard.replace(fresh) {
            close(old).await;
        }
        Ok(host)
    }

    /// Close the shared session, if any.
    pub async fn disconnect(&self) {
        if let Some(old) = self.active.lock().await.take() {
            close(old).await;
        }
    }

    /// Host of the shared session, if one is open.
    pub async fn current_host(&self) -> Option<HostUri> {
        self.active.lock().await.as_ref().map(|a| a.host.clone())
    }

    /// Open a dedicated session bound as `dn`, outside the shared slot.
    ///
    /// Hosts that cannot be reached are skipped; a host that rejects the
    /// bind ends the attempt with [`AuthError::Rejected`].
    pub async fn open_bound(&self, dn: &str, password: &str) -> RosterResult<BoundSession> {
        let count = self.registry.host_count()?;
        let mut attempted = Vec::with_capacity(count);
        let mut last = TransportError::Closed;

        for _ in 0..count {
            let host = self.registry.next_host()?;
            attempted.push(host.to_string());
            self.counters.connect_attempts.fetch_add(1, Ordering::Relaxed);

            let mut session = match self.connector.connect(&host).await {
                Ok(session) => session,
                Err(e) => {
                    self.counters.failed_connects.fetch_add(1, Ordering::Relaxed);
                    warn!(host = %host, error = %e, "directory host unavailable for bind");
                    last = e;
                    continue;
                }
            };

            match session.bind(dn, password).await {
                Ok(()) => {
                    debug!(host = %host, dn, "bound dedicated session");
                    return Ok(BoundSession {
                        host,
                        dn: dn.to_string(),
                        session,
                    });
                }
                Err(TransportError::Bind { .. }) => {
                    if let Err(e) = session.unbind().await {
                        debug!(host = %host, error = %e, "ignoring close error");
                    }
                    return Err(AuthError::Rejected {
                        identifier: dn.to_string(),
                    }
                    .into());
                }
                Err(e) => {
                    self.counters.failed_connects.fetch_add(1, Ordering::Relaxed);
                    warn!(host = %host, error = %e, "directory host failed during bind");
                    last = e;
                }
            }
        }

        Err(RosterError::NoHostsAvailable { attempted, last })
    }

    pub fn stats(&self) -> ConnectionStats {
        self.counters.snapshot()
    }

    async fn open(&self) -> RosterResult<ActiveSession> {
        let count = self.registry.host_count()?;
        let mut attempted = Vec::with_capacity(count);
        let mut last = TransportError::Closed;

        for _ in 0..count {
            let host = self.registry.next_host()?;
            attempted.push(host.to_string());
            self.counters.connect_attempts.fetch_add(1, Ordering::Relaxed);

            match self.open_host(&host).await {
                Ok(session) => {
                    info!(host = %host, "connected to directory");
                    return Ok(ActiveSession { host, session });
                }
                Err(e) => {
                    self.counters.failed_connects.fetch_add(1, Ordering::Relaxed);
                    warn!(host = %host, error = %e, "directory host unavailable");
                    last = e;
                }
            }
        }

        Err(RosterError::NoHostsAvailable { attempted, last })
    }

    async fn open_host(&self, host: &HostUri) -> Result<Box<dyn DirectorySession>, TransportError> {
        let mut session = self.connector.connect(host).await?;
        let (dn, password) = match &self.credentials {
            Some(creds) => (creds.dn.as_str(), creds.password.expose_secret()),
            None => ("", ""),
        };
        if let Err(e) = session.bind(dn, password).await {
            if let Err(close_err) = session.unbind().await {
                debug!(host = %host, error = %close_err, "ignoring close error");
            }
            return Err(e);
        }
        Ok(session)
    }
}

impl std::fmt::Debug for ConnectionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionManager")
            .field("registry", &self.registry)
            .field("stats", &self.stats())
            .finish_non_exhaustive()
    }
}

async fn close(mut old: ActiveSession) {
    if let Err(e) = old.session.unbind().await {
        debug!(host = %old.host, error = %e, "ignoring close error");
    }
}

/// Exclusive use of the shared session until dropped.
pub struct SessionLease<'a> {
    guard: MutexGuard<'a, Option<ActiveSession>>,
}

impl SessionLease<'_> {
    /// Host the session is connected to.
    pub fn host(&self) -> Option<&HostUri> {
        self.guard.as_ref().map(|a| &a.host)
    }

    pub async fn search(
        &mut self,
        base: &str,
        scope: Scope,
        filter: &str,
        attributes: &[String],
    ) -> Result<Vec<SearchEntry>, TransportError> {
        let active = self.guard.as_mut().ok_or(TransportError::Closed)?;
        active.session.search(base, scope, filter, attributes).await
    }

    pub async fn modify(
        &mut self,
        dn: &str,
        modifications: &[Modification],
    ) -> Result<(), TransportError> {
        let active = self.guard.as_mut().ok_or(TransportError::Closed)?;
        active.session.modify(dn, modifications).await
    }

    /// Discard the session so the next acquire reconnects.
    pub async fn invalidate(mut self) {
        if let Some(old) = self.guard.take() {
            debug!(host = %old.host, "discarding directory session");
            close(old).await;
        }
    }
}

/// A session bound as a specific user, held by one caller.
pub struct BoundSession {
    host: HostUri,
    dn: String,
    session: Box<dyn DirectorySession>,
}

impl BoundSession {
    pub fn host(&self) -> &HostUri {
        &self.host
    }

    /// DN the session is bound as.
    pub fn dn(&self) -> &str {
        &self.dn
    }

    /// Search under the bound identity. Not retried.
    pub async fn search(
        &mut self,
        base: &str,
        scope: Scope,
        filter: &str,
        attributes: &[&str],
    ) -> RosterResult<Vec<SearchEntry>> {
        let attributes: Vec<String> = attributes.iter().map(|a| a.to_string()).collect();
        self.session
            .search(base, scope, filter, &attributes)
            .await
            .map_err(|last| RosterError::SearchFailed {
                host: self.host.to_string(),
                attempts: 1,
                last,
            })
    }

    /// Modify under the bound identity. Not retried.
    pub async fn modify(&mut self, dn: &str, modifications: &[Modification]) -> RosterResult<()> {
        self.session
            .modify(dn, modifications)
            .await
            .map_err(|source| RosterError::ModifyFailed {
                dn: dn.to_string(),
                source,
            })
    }

    /// Unbind and drop the session.
    pub async fn release(mut self) {
        if let Err(e) = self.session.unbind().await {
            debug!(host = %self.host, error = %e, "ignoring close error");
        }
    }
}

impl std::fmt::Debug for BoundSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BoundSession")
            .field("host", &self.host)
            .field("dn", &self.dn)
            .finish_non_exhaustive()
    }
}
