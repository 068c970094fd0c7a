//! Shared entity plumbing: the per-instance [`Record`] and the
//! [`DirectoryEntity`] trait every entity type implements.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::{DateTime, NaiveDateTime, Utc};
use roster_cache::{IdentityMap, LazyAttributes};
use roster_core::{EntityKind, Modification, RosterResult};
use roster_directory::{entity_dn, filter};
use tracing::debug;

use crate::roster::{EntityCaches, Roster};

/// Operational attribute carrying the last change time.
pub const MODIFY_TIMESTAMP: &str = "modifyTimestamp";

/// Identity, distinguished name and attribute store of one entity.
pub struct Record {
    kind: EntityKind,
    key: String,
    dn: String,
    attributes: LazyAttributes,
    revision: AtomicU64,
    roster: Roster,
}

impl Record {
    pub(crate) fn new(kind: EntityKind, key: &str, roster: &Roster) -> Self {
        let directory = roster.directory_handle();
        let base = kind.base_dn(roster.suffix());
        let search = filter::eq(kind.key_attribute(), key);
        let owned_key = key.to_string();

        let attributes = LazyAttributes::from_fn(move || {
            let directory = Arc::clone(&directory);
            let base = base.clone();
            let search = search.clone();
            let key = owned_key.clone();
            async move {
                debug!(%kind, key = %key, "fetching attributes");
                let rows = directory.search_one_level(&base, &search, &[]).await?;
                Ok(rows.into_iter().next().map(|row| row.attrs).unwrap_or_default())
            }
        });

        Self {
            kind,
            key: key.to_string(),
            dn: entity_dn(kind, key, roster.suffix()),
            attributes,
            revision: AtomicU64::new(0),
            roster: roster.clone(),
        }
    }

    pub fn kind(&self) -> EntityKind {
        self.kind
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn dn(&self) -> &str {
        &self.dn
    }

    pub fn attributes(&self) -> &LazyAttributes {
        &self.attributes
    }

    pub fn roster(&self) -> &Roster {
        &self.roster
    }

    /// Count of modifications applied through this record.
    pub fn revision(&self) -> u64 {
        self.revision.load(Ordering::Acquire)
    }

    /// Values of `name`; `None` when the entry lacks it.
    pub async fn attribute(&self, name: &str) -> RosterResult<Option<Vec<String>>> {
        self.attributes.get(name).await
    }

    /// Values of `name`, empty when absent.
    pub async fn values(&self, name: &str) -> RosterResult<Vec<String>> {
        Ok(self.attribute(name).await?.unwrap_or_default())
    }

    pub async fn first(&self, name: &str) -> RosterResult<Option<String>> {
        self.attributes.first(name).await
    }

    /// True when the directory holds an entry for this key.
    pub async fn exists(&self) -> RosterResult<bool> {
        Ok(!self.attributes.snapshot().await?.is_empty())
    }

    /// Replace every value of `name`.
    pub async fn modify(&self, name: &str, values: Vec<String>) -> RosterResult<Vec<String>> {
        self.apply(Modification::replace(name, values)).await
    }

    /// Add values to `name`.
    pub async fn add(&self, name: &str, values: Vec<String>) -> RosterResult<Vec<String>> {
        self.apply(Modification::add(name, values)).await
    }

    /// Remove values from `name`; an empty list removes the attribute.
    pub async fn remove(&self, name: &str, values: Vec<String>) -> RosterResult<Vec<String>> {
        self.apply(Modification::delete(name, values)).await
    }

    /// Send `modification` to the directory, then mirror it locally.
    /// Returns the attribute's new local value list.
    pub async fn apply(&self, modification: Modification) -> RosterResult<Vec<String>> {
        self.roster
            .directory()
            .modify(&self.dn, std::slice::from_ref(&modification))
            .await?;
        let values = self.attributes.apply(&modification).await;
        self.revision.fetch_add(1, Ordering::AcqRel);
        values
    }

    /// Last change time. Only known after a bulk preload.
    pub async fn modify_timestamp(&self) -> Option<DateTime<Utc>> {
        let values = self.attributes.peek(MODIFY_TIMESTAMP).await?;
        parse_generalized_time(values.first()?)
    }
}

impl std::fmt::Debug for Record {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Record")
            .field("kind", &self.kind)
            .field("key", &self.key)
            .field("phase", &self.attributes.phase())
            .finish_non_exhaustive()
    }
}

/// A typed directory entity held in the identity cache.
pub trait DirectoryEntity: Sized + Send + Sync + 'static {
    const KIND: EntityKind;

    fn from_record(record: Record) -> Self;

    fn record(&self) -> &Record;

    fn identity_map(caches: &EntityCaches) -> &IdentityMap<Self>;

    /// The cached instance for `key`, created on a miss.
    fn find(roster: &Roster, key: &str) -> Arc<Self> {
        roster.find::<Self>(key)
    }

    fn key(&self) -> &str {
        self.record().key()
    }

    fn dn(&self) -> &str {
        self.record().dn()
    }
}

/// Parse LDAP generalized time such as `20240102030405Z`.
pub fn parse_generalized_time(raw: &str) -> Option<DateTime<Utc>> {
    let digits = raw.get(..14)?;
    NaiveDateTime::parse_from_str(digits, "%Y%m%d%H%M%S")
        .ok()
        .map(|naive| naive.and_utc())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Datelike, Timelike};

    #[test]
    fn test_parse_generalized_time() {
        let ts = parse_generalized_time("20240102030405Z").unwrap();
        assert_eq!((ts.year(), ts.month(), ts.day()), (2024, 1, 2));
        assert_eq!((ts.hour(), ts.minute(), ts.second()), (3, 4, 5));
        assert!(parse_generalized_time("20240102030405.5Z").is_some());
        assert!(parse_generalized_time("2024").is_none());
        assert!(parse_generalized_time("notatimestampatall").is_none());
    }
}
