//! `ldap.conf` repair.
//!
//! Rewrites the directory-client lines this layer depends on and leaves
//! everything else in the file alone. The file is only written when its
//! content would change.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use roster_core::{ConfigError, DirectoryConfig, RosterResult};
use tracing::{debug, info, warn};

/// Desired values for the managed `ldap.conf` lines.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepairPlan {
    pub uris: Vec<String>,
    pub base: String,
    pub tls_cacert: Option<PathBuf>,
    pub tls_reqcert: String,
}

impl RepairPlan {
    /// Plan from configuration: the override hosts if set, else the defaults.
    pub fn from_config(config: &DirectoryConfig) -> Self {
        let uris = if config.hosts.is_empty() {
            config.default_hosts.clone()
        } else {
            config.hosts.clone()
        };
        Self {
            uris,
            base: config.base.clone(),
            tls_cacert: config.tls_cacert.clone(),
            tls_reqcert: config.tls_reqcert.clone(),
        }
    }

    fn managed_lines(&self) -> Vec<(&'static str, String)> {
        let mut lines = vec![
            ("URI", self.uris.join(" ")),
            ("BASE", self.base.clone()),
        ];
        if let Some(cacert) = &self.tls_cacert {
            lines.push(("TLS_CACERT", cacert.display().to_string()));
        }
        lines.push(("TLS_REQCERT", self.tls_reqcert.clone()));
        lines
    }
}

/// Apply `plan` to `existing` file content.
///
/// The first occurrence of each managed keyword is replaced in place, later
/// occurrences are dropped, and missing keywords are appended.
pub fn render(existing: &str, plan: &RepairPlan) -> String {
    let managed = plan.managed_lines();
    let mut written = vec![false; managed.len()];
    let mut out: Vec<String> = Vec::new();

    for line in existing.lines() {
        let keyword = line.split_whitespace().next().unwrap_or("");
        match managed
            .iter()
            .position(|(name, _)| name.eq_ignore_ascii_case(keyword))
        {
            Some(index) if !written[index] => {
                let (name, value) = &managed[index];
                out.push(format!("{} {}", name, value));
                written[index] = true;
            }
            Some(_) => {}
            None => out.push(line.to_string()),
        }
    }

    for (index, (name, value)) in managed.iter().enumerate() {
        if !written[index] {
            out.push(format!("{} {}", name, value));
        }
    }

    let mut rendered = out.join("\n");
    rendered.push('\n');
    rendered
}

/// Bring the file at `path` in line with `plan`. Returns whether it was
/// rewritten. A missing file is created.
pub fn repair(path: &Path, plan: &RepairPlan) -> RosterResult<bool> {
    if let Some(cacert) = &plan.tls_cacert {
        if !cacert.exists() {
            warn!(path = %cacert.display(), "TLS CA certificate missing");
        }
    }

    let existing = match std::fs::read_to_string(path) {
        Ok(contents) => contents,
        Err(e) if e.kind() == ErrorKind::NotFound => String::new(),
        Err(e) => return Err(io_error(path, e).into()),
    };

    let rendered = render(&existing, plan);
    if rendered == existing {
        debug!(path = %path.display(), "ldap.conf already up to date");
        return Ok(false);
    }

    std::fs::write(path, rendered).map_err(|e| io_error(path, e))?;
    info!(path = %path.display(), uris = %plan.uris.join(" "), "ldap.conf rewritten");
    Ok(true)
}

fn io_error(path: &Path, e: std::io::Error) -> ConfigError {
    ConfigError::Io {
        path: path.display().to_string(),
        reason: e.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hosts::parse_ldap_conf_uris;

    fn plan() -> RepairPlan {
        RepairPlan {
            uris: vec!["ldaps://h1:636".into(), "ldaps://h2:636".into()],
            base: "dc=apache,dc=org".into(),
            tls_cacert: Some(PathBuf::from("/etc/ldap/cacerts/ldap-client.pem")),
            tls_reqcert: "hard".into(),
        }
    }

    #[test]
    fn test_render_replaces_in_place_and_keeps_other_lines() {
        let existing = "# site config\nuri ldap://old\nSIZELIMIT 12\nURI ldap://dup\nbase dc=old\n";
        let rendered = render(existing, &plan());
        assert_eq!(
            rendered,
            "# site config\nURI ldaps://h1:636 ldaps://h2:636\nSIZELIMIT 12\nBASE dc=apache,dc=org\n\
             TLS_CACERT /etc/ldap/cacerts/ldap-client.pem\nTLS_REQCERT hard\n"
        );
        assert_eq!(
            parse_ldap_conf_uris(&rendered),
            vec!["ldaps://h1:636", "ldaps://h2:636"]
        );
    }

    #[test]
    fn test_render_without_cacert() {
        let mut p = plan();
        p.tls_cacert = None;
        let rendered = render("", &p);
        assert!(!rendered.contains("TLS_CACERT"));
        assert!(rendered.ends_with("TLS_REQCERT hard\n"));
    }

    #[test]
    fn test_repair_writes_once() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ldap.conf");
        std::fs::write(&path, "# keep me\nURI ldap://stale\n").unwrap();

        assert!(repair(&path, &plan()).unwrap());
        let contents = std::fs::read_to_string(&path).unwrap();
        assert!(contents.starts_with("# keep me\nURI ldaps://h1:636"));

        assert!(!repair(&path, &plan()).unwrap());
        assert_eq!(std::fs::read_to_string(&path).unwrap(), contents);
    }

    #[test]
    fn test_repair_creates_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ldap.conf");
        assert!(repair(&path, &plan()).unwrap());
        assert!(path.exists());
    }

    #[test]
    fn test_plan_prefers_override_hosts() {
        let mut config = DirectoryConfig::default();
        assert_eq!(RepairPlan::from_config(&config).uris, config.default_hosts);
        config.hosts = vec!["ldap://o1".into()];
        assert_eq!(RepairPlan::from_config(&config).uris, vec!["ldap://o1"]);
    }
}
