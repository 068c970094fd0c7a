//! Rewrites the system `ldap.conf` so it points at the configured directory
//! hosts and TLS policy.
//!
//! Usage: `roster-ldap-conf [--config <path>]`

use roster_core::{DirectoryConfig, RosterResult};
use roster_directory::ldap_conf::{repair, RepairPlan};
use roster_directory::telemetry::{init_tracing, TelemetryConfig};

fn main() -> RosterResult<()> {
    init_tracing(&TelemetryConfig::from_env())?;

    let config = DirectoryConfig::load()?;
    let plan = RepairPlan::from_config(&config);
    let changed = repair(&config.ldap_conf, &plan)?;

    tracing::info!(
        path = %config.ldap_conf.display(),
        changed,
        "ldap.conf check complete"
    );
    Ok(())
}
