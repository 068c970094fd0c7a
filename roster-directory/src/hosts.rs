//! Host registry.
//!
//! Resolves the directory endpoints once per process, in priority order:
//! explicit override, the `URI` line of the system `ldap.conf`, then the
//! built-in defaults. The resolved list is shuffled once so separate
//! processes spread over the hosts, then handed out round-robin.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use once_cell::sync::{Lazy, OnceCell};
use rand::seq::SliceRandom;
use regex::Regex;
use roster_core::config::parse_uris;
use roster_core::{ConfigError, DirectoryConfig, HostUri, RosterResult};
use tracing::{debug, info, warn};

static URI_LINE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?im)^[ \t]*uri[ \t]+([^\r\n#]+)").expect("Invalid URI line regex"));

/// Where hosts come from, highest priority first.
#[derive(Debug, Clone)]
pub struct HostSources {
    pub overrides: Vec<String>,
    pub ldap_conf: PathBuf,
    pub defaults: Vec<String>,
    pub shuffle: bool,
}

impl HostSources {
    pub fn from_config(config: &DirectoryConfig) -> Self {
        Self {
            overrides: config.hosts.clone(),
            ldap_conf: config.ldap_conf.clone(),
            defaults: config.default_hosts.clone(),
            shuffle: config.shuffle_hosts,
        }
    }
}

/// Process-lifetime list of directory endpoints with a round-robin cursor.
#[derive(Debug)]
pub struct HostRegistry {
    sources: HostSources,
    resolved: OnceCell<Arc<[HostUri]>>,
    cursor: AtomicUsize,
}

impl HostRegistry {
    pub fn new(sources: HostSources) -> Self {
        Self {
            sources,
            resolved: OnceCell::new(),
            cursor: AtomicUsize::new(0),
        }
    }

    /// A registry with an already resolved, unshuffled list.
    pub fn with_hosts(hosts: Vec<HostUri>) -> Self {
        let registry = Self::new(HostSources {
            overrides: Vec::new(),
            ldap_conf: PathBuf::new(),
            defaults: Vec::new(),
            shuffle: false,
        });
        if !hosts.is_empty() {
            let _ = registry.resolved.set(hosts.into());
        }
        registry
    }

    /// The resolved host list. Resolution happens on the first call only.
    pub fn resolve_hosts(&self) -> RosterResult<Arc<[HostUri]>> {
        let hosts = self
            .resolved
            .get_or_try_init(|| resolve(&self.sources).map(Arc::from))?;
        Ok(Arc::clone(hosts))
    }

    pub fn host_count(&self) -> RosterResult<usize> {
        Ok(self.resolve_hosts()?.len())
    }

    /// The next host in round-robin order. Never runs dry.
    pub fn next_host(&self) -> RosterResult<HostUri> {
        let hosts = self.resolve_hosts()?;
        let index = self.cursor.fetch_add(1, Ordering::Relaxed) % hosts.len();
        Ok(hosts[index].clone())
    }

    /// An endless iterator over the hosts, starting at the current cursor.
    pub fn cycle(&self) -> RosterResult<HostCycle> {
        let hosts = self.resolve_hosts()?;
        let start = self.cursor.load(Ordering::Relaxed) % hosts.len();
        Ok(HostCycle { hosts, next: start })
    }
}

/// Infinite round-robin iterator over a resolved host list.
#[derive(Debug, Clone)]
pub struct HostCycle {
    hosts: Arc<[HostUri]>,
    next: usize,
}

impl Iterator for HostCycle {
    type Item = HostUri;

    fn next(&mut self) -> Option<HostUri> {
        let host = self.hosts[self.next].clone();
        self.next = (self.next + 1) % self.hosts.len();
        Some(host)
    }
}

fn resolve(sources: &HostSources) -> Result<Vec<HostUri>, ConfigError> {
    let mut hosts = if !sources.overrides.is_empty() {
        debug!(count = sources.overrides.len(), "using host override");
        parse_uris(&sources.overrides)?
    } else {
        let from_conf = hosts_from_ldap_conf(&sources.ldap_conf);
        if !from_conf.is_empty() {
            debug!(path = %sources.ldap_conf.display(), "using hosts from ldap.conf");
            from_conf
        } else {
            parse_uris(&sources.defaults)?
        }
    };

    if hosts.is_empty() {
        return Err(ConfigError::NoHosts {
            ldap_conf: sources.ldap_conf.display().to_string(),
        });
    }

    if sources.shuffle {
        hosts.shuffle(&mut rand::rng());
    }

    info!(
        hosts = %hosts.iter().map(ToString::to_string).collect::<Vec<_>>().join(" "),
        "directory hosts resolved"
    );
    Ok(hosts)
}

/// URIs listed on the `URI` line of an `ldap.conf`.
///
/// Unreadable files and unparseable URIs are logged and skipped.
pub fn hosts_from_ldap_conf(path: &Path) -> Vec<HostUri> {
    let contents = match std::fs::read_to_string(path) {
        Ok(contents) => contents,
        Err(e) => {
            debug!(path = %path.display(), error = %e, "ldap.conf not readable");
            return Vec::new();
        }
    };

    parse_ldap_conf_uris(&contents)
        .into_iter()
        .filter_map(|raw| match raw.parse::<HostUri>() {
            Ok(uri) => Some(uri),
            Err(e) => {
                warn!(path = %path.display(), uri = %raw, error = %e, "skipping ldap.conf URI");
                None
            }
        })
        .collect()
}

/// Raw URI strings from the first `URI` line of `ldap.conf` text.
pub fn parse_ldap_conf_uris(contents: &str) -> Vec<String> {
    URI_LINE
        .captures(contents)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().split_whitespace().map(str::to_string).collect())
        .unwrap_or_default()
}
