//! Roster Directory - Failover and Resilient Search
//!
//! Everything between the entity layer and the wire:
//!
//! - [`HostRegistry`] resolves the endpoint list once (override, then the
//!   system `ldap.conf`, then built-in defaults) and cycles through it.
//! - [`ConnectionManager`] owns the single shared session and opens a new
//!   one host by host when it is missing.
//! - [`Directory`] runs searches with a bounded retry budget of
//!   `max(host count, 2)` attempts, discarding the session between attempts.
//!
//! The protocol client sits behind [`DirectoryConnector`] and
//! [`DirectorySession`]; [`Ldap3Connector`] is the production
//! implementation.

pub mod connection;
pub mod dn;
pub mod filter;
pub mod hosts;
pub mod ldap;
pub mod ldap_conf;
pub mod search;
pub mod telemetry;
pub mod transport;

pub use connection::{BoundSession, ConnectionManager, ConnectionStats, Credentials, SessionLease};
pub use dn::{entity_dn, rdn_value};
pub use hosts::{HostCycle, HostRegistry, HostSources};
pub use ldap::Ldap3Connector;
pub use ldap_conf::RepairPlan;
pub use search::{take_attribute, Directory};
pub use telemetry::{init_tracing, TelemetryConfig};
pub use transport::{DirectoryConnector, DirectorySession};
