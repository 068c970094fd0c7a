//! Transport seam between the failover logic and a concrete protocol client.
//!
//! [`DirectoryConnector`] opens sessions; [`DirectorySession`] is one open
//! connection. The production implementation lives in [`crate::ldap`]; the
//! test suite swaps in an in-memory directory.

use async_trait::async_trait;
use roster_core::{HostUri, Modification, Scope, SearchEntry, TransportError};

/// Opens transport-level sessions to directory hosts.
#[async_trait]
pub trait DirectoryConnector: Send + Sync {
    /// Open an unauthenticated session to `host`, with TLS when the URI
    /// scheme requires it.
    async fn connect(&self, host: &HostUri) -> Result<Box<dyn DirectorySession>, TransportError>;
}

/// One open connection to one directory host.
///
/// Sessions are used by a single caller at a time; the connection manager
/// serializes access to the shared session.
#[async_trait]
pub trait DirectorySession: Send {
    /// Simple bind. An empty DN and password is an anonymous bind.
    async fn bind(&mut self, dn: &str, password: &str) -> Result<(), TransportError>;

    /// Search `base` with `filter`, returning only `attributes` (all
    /// attributes when empty). Rows are returned in server order.
    async fn search(
        &mut self,
        base: &str,
        scope: Scope,
        filter: &str,
        attributes: &[String],
    ) -> Result<Vec<SearchEntry>, TransportError>;

    /// Apply modifications to the entry at `dn`.
    async fn modify(&mut self, dn: &str, modifications: &[Modification]) -> Result<(), TransportError>;

    /// Close the session.
    async fn unbind(&mut self) -> Result<(), TransportError>;
}
