//! Directory configuration.
//!
//! Loaded from a TOML file and overlaid with environment variables. Every
//! field has a default so an empty file (or no file at all via
//! [`DirectoryConfig::from_env`]) yields a usable configuration that falls
//! back to the system `ldap.conf` and then the built-in host list.

use secrecy::SecretString;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::{ConfigError, HostUri};

/// Directory suffix used when none is configured.
pub const DEFAULT_BASE: &str = "dc=apache,dc=org";

/// System directory-client configuration consulted when no override is set.
pub const DEFAULT_LDAP_CONF: &str = "/etc/ldap/ldap.conf";

/// Hosts used when neither the override nor `ldap.conf` yields any.
pub const DEFAULT_HOSTS: &[&str] = &[
    "ldaps://ldap-us.apache.org:636",
    "ldaps://ldap-eu.apache.org:636",
];

/// Configuration for the directory layer.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct DirectoryConfig {
    /// Explicit host override. Highest priority when non-empty.
    pub hosts: Vec<String>,
    /// System client config whose `URI` line is the second host source.
    pub ldap_conf: PathBuf,
    /// Last-resort host list.
    pub default_hosts: Vec<String>,
    /// Directory suffix, e.g. `dc=apache,dc=org`.
    pub base: String,
    /// Service account DN. `None` binds anonymously.
    pub bind_dn: Option<String>,
    /// Service account password.
    pub bind_password: Option<SecretString>,
    /// Shuffle the resolved hosts once to spread load across processes.
    pub shuffle_hosts: bool,
    /// Pause between failed search attempts.
    pub retry_backoff_ms: u64,
    /// Transport connect timeout per host.
    pub connect_timeout_ms: u64,
    /// Optional wall-clock bound on a single search including retries.
    pub search_deadline_ms: Option<u64>,
    /// CA certificate written into `ldap.conf` by the repair operation.
    pub tls_cacert: Option<PathBuf>,
    /// `TLS_REQCERT` policy written by the repair operation.
    pub tls_reqcert: String,
}

impl Default for DirectoryConfig {
    fn default() -> Self {
        Self {
            hosts: Vec::new(),
            ldap_conf: PathBuf::from(DEFAULT_LDAP_CONF),
            default_hosts: DEFAULT_HOSTS.iter().map(|h| h.to_string()).collect(),
            base: DEFAULT_BASE.to_string(),
            bind_dn: None,
            bind_password: None,
            shuffle_hosts: true,
            retry_backoff_ms: 100,
            connect_timeout_ms: 5_000,
            search_deadline_ms: None,
            tls_cacert: None,
            tls_reqcert: "hard".to_string(),
        }
    }
}

impl DirectoryConfig {
    /// Load from the path given by `--config` or `ROSTER_CONFIG`, then apply
    /// environment overrides and validate.
    pub fn load() -> Result<Self, ConfigError> {
        let path = config_path_from_args().or_else(config_path_from_env);
        let path = path.ok_or(ConfigError::MissingConfigPath)?;
        let mut config = Self::from_path(&path)?;
        config.apply_env();
        config.validate()?;
        Ok(config)
    }

    /// Parse a TOML file. Environment overrides are not applied.
    pub fn from_path(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path).map_err(|e| ConfigError::Io {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;
        Self::from_toml(&contents)
    }

    /// Parse TOML text.
    pub fn from_toml(contents: &str) -> Result<Self, ConfigError> {
        toml::from_str(contents).map_err(|e| ConfigError::Parse {
            reason: e.to_string(),
        })
    }

    /// Defaults overlaid with environment variables.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        config.apply_env();
        config
    }

    /// Overlay environment variables.
    ///
    /// Environment variables:
    /// - `ROSTER_LDAP_HOSTS`: comma or space separated host override
    /// - `ROSTER_LDAP_CONF`: path of the system `ldap.conf`
    /// - `ROSTER_LDAP_BASE`: directory suffix
    /// - `ROSTER_BIND_DN` / `ROSTER_BIND_PASSWORD`: service credentials
    /// - `ROSTER_RETRY_BACKOFF_MS`: pause between failed search attempts
    pub fn apply_env(&mut self) {
        if let Ok(hosts) = std::env::var("ROSTER_LDAP_HOSTS") {
            let hosts = split_host_list(&hosts);
            if !hosts.is_empty() {
                self.hosts = hosts;
            }
        }

        if let Ok(path) = std::env::var("ROSTER_LDAP_CONF") {
            self.ldap_conf = PathBuf::from(path);
        }

        if let Ok(base) = std::env::var("ROSTER_LDAP_BASE") {
            self.base = base;
        }

        if let Ok(dn) = std::env::var("ROSTER_BIND_DN") {
            self.bind_dn = Some(dn);
        }

        if let Ok(password) = std::env::var("ROSTER_BIND_PASSWORD") {
            self.bind_password = Some(SecretString::from(password));
        }

        if let Some(backoff) = std::env::var("ROSTER_RETRY_BACKOFF_MS")
            .ok()
            .and_then(|s| s.parse().ok())
        {
            self.retry_backoff_ms = backoff;
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.base.trim().is_empty() {
            return Err(ConfigError::InvalidValue {
                field: "base".to_string(),
                reason: "must not be empty".to_string(),
            });
        }
        if self.bind_dn.is_some() && self.bind_password.is_none() {
            return Err(ConfigError::InvalidValue {
                field: "bind_password".to_string(),
                reason: "required when bind_dn is set".to_string(),
            });
        }
        if self.connect_timeout_ms == 0 {
            return Err(ConfigError::InvalidValue {
                field: "connect_timeout_ms".to_string(),
                reason: "must be > 0".to_string(),
            });
        }
        if self.search_deadline_ms == Some(0) {
            return Err(ConfigError::InvalidValue {
                field: "search_deadline_ms".to_string(),
                reason: "must be > 0 when set".to_string(),
            });
        }
        parse_uris(&self.hosts)?;
        parse_uris(&self.default_hosts)?;
        Ok(())
    }

    pub fn retry_backoff(&self) -> Duration {
        Duration::from_millis(self.retry_backoff_ms)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn search_deadline(&self) -> Option<Duration> {
        self.search_deadline_ms.map(Duration::from_millis)
    }
}

/// Parse every URI in `uris`, failing on the first invalid one.
pub fn parse_uris<S: AsRef<str>>(uris: &[S]) -> Result<Vec<HostUri>, ConfigError> {
    uris.iter().map(|uri| uri.as_ref().parse()).collect()
}

/// Split a comma and/or whitespace separated host list.
pub fn split_host_list(raw: &str) -> Vec<String> {
    raw.split(|c: char| c == ',' || c.is_whitespace())
        .map(str::trim)
        .filter(|h| !h.is_empty())
        .map(str::to_string)
        .collect()
}

fn config_path_from_args() -> Option<PathBuf> {
    let mut args = std::env::args().skip(1);
    while let Some(arg) = args.next() {
        if arg == "--config" {
            return args.next().map(PathBuf::from);
        }
        if let Some(path) = arg.strip_prefix("--config=") {
            return Some(PathBuf::from(path));
        }
    }
    None
}

fn config_path_from_env() -> Option<PathBuf> {
    std::env::var("ROSTER_CONFIG").ok().map(PathBuf::from)
}
