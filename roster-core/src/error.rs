//! Error types for roster operations

use thiserror::Error;

/// Configuration errors. Fatal, never retried.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("No directory hosts resolvable from override, {ldap_conf} or defaults")]
    NoHosts { ldap_conf: String },

    #[error("Invalid directory URI '{uri}': {reason}")]
    InvalidUri { uri: String, reason: String },

    #[error("Invalid value for {field}: {reason}")]
    InvalidValue { field: String, reason: String },

    #[error("Missing configuration file path (use --config or ROSTER_CONFIG)")]
    MissingConfigPath,

    #[error("Failed to read {path}: {reason}")]
    Io { path: String, reason: String },

    #[error("Failed to parse config TOML: {reason}")]
    Parse { reason: String },
}

/// A single failed exchange with one directory host.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TransportError {
    #[error("Connection to {host} failed: {reason}")]
    Connect { host: String, reason: String },

    #[error("Bind as '{dn}' failed: {reason}")]
    Bind { dn: String, reason: String },

    #[error("Search under {base} failed: {reason}")]
    Search { base: String, reason: String },

    #[error("Modify of {dn} failed: {reason}")]
    Modify { dn: String, reason: String },

    #[error("Session closed")]
    Closed,
}

/// Authentication errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum AuthError {
    #[error("Invalid identifier '{identifier}'")]
    InvalidIdentifier { identifier: String },

    #[error("Empty secret for '{identifier}'")]
    EmptySecret { identifier: String },

    #[error("Credentials rejected for '{identifier}'")]
    Rejected { identifier: String },
}

/// Master error type for all roster errors.
#[derive(Debug, Clone, Error)]
pub enum RosterError {
    #[error("Config error: {0}")]
    Config(#[from] ConfigError),

    #[error("No directory host available (tried {}): {last}", attempted.join(", "))]
    NoHostsAvailable {
        attempted: Vec<String>,
        #[source]
        last: TransportError,
    },

    #[error("Search failed after {attempts} attempts, last host {host}: {last}")]
    SearchFailed {
        host: String,
        attempts: u32,
        #[source]
        last: TransportError,
    },

    #[error("Modify of {dn} rejected: {source}")]
    ModifyFailed {
        dn: String,
        #[source]
        source: TransportError,
    },

    #[error("Auth error: {0}")]
    Auth(#[from] AuthError),
}

impl RosterError {
    /// The host-level failure underneath this error, if any.
    pub fn transport(&self) -> Option<&TransportError> {
        match self {
            Self::NoHostsAvailable { last, .. } | Self::SearchFailed { last, .. } => Some(last),
            Self::ModifyFailed { source, .. } => Some(source),
            Self::Config(_) | Self::Auth(_) => None,
        }
    }
}

/// Result type alias for roster operations.
pub type RosterResult<T> = Result<T, RosterError>;

// =============================================================================
// TESTS
// =============================================================================
