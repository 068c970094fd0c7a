//! Member lists of groups, committees and services.
//!
//! A member list is cached apart from the attribute store, weakly, so it
//! lives exactly as long as some caller holds the resolved list. Any change
//! applied through the owning record makes the next resolve refetch.

use std::sync::Arc;

use roster_cache::WeakSlot;
use roster_core::{EntityKind, RosterError, RosterResult};
use roster_directory::{entity_dn, filter, rdn_value};
use tracing::debug;

use crate::entity::Record;
use crate::Person;

/// Resolved members, shared while any caller holds them.
pub type Members = Arc<Vec<Arc<Person>>>;

/// How an attribute names people.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum MemberFormat {
    /// Bare uids (`memberUid`).
    Uid,
    /// Person DNs (`member`, `owner`).
    Dn,
}

pub(crate) struct MemberList {
    attribute: &'static str,
    format: MemberFormat,
    slot: WeakSlot<Vec<Arc<Person>>>,
}

impl MemberList {
    pub(crate) fn new(attribute: &'static str, format: MemberFormat) -> Self {
        Self {
            attribute,
            format,
            slot: WeakSlot::new(),
        }
    }

    /// Members as cached people, fetched on first use.
    pub(crate) async fn resolve(&self, record: &Record) -> RosterResult<Members> {
        self.slot
            .get_or_try_load(record.revision(), || async {
                let raw = self.fetch(record).await?;
                let roster = record.roster();
                let people: Vec<Arc<Person>> = raw
                    .iter()
                    .filter_map(|value| self.member_uid(value))
                    .map(|uid| roster.person(&uid))
                    .collect();
                debug!(
                    kind = %record.kind(),
                    key = record.key(),
                    attribute = self.attribute,
                    count = people.len(),
                    "member list resolved"
                );
                Ok::<_, RosterError>(people)
            })
            .await
    }

    /// Raw attribute values naming the members.
    pub(crate) async fn ids(&self, record: &Record) -> RosterResult<Vec<String>> {
        Ok(self
            .fetch(record)
            .await?
            .iter()
            .filter_map(|value| self.member_uid(value))
            .collect())
    }

    pub(crate) async fn add(&self, record: &Record, uids: &[&str]) -> RosterResult<()> {
        if uids.is_empty() {
            return Ok(());
        }
        let values = self.values_for(record, uids);
        record.add(self.attribute, values).await?;
        Ok(())
    }

    pub(crate) async fn remove(&self, record: &Record, uids: &[&str]) -> RosterResult<()> {
        if uids.is_empty() {
            return Ok(());
        }
        let values = self.values_for(record, uids);
        record.remove(self.attribute, values).await?;
        Ok(())
    }

    /// Values from the attribute store when it already holds them,
    /// otherwise from a dedicated single-attribute search.
    async fn fetch(&self, record: &Record) -> RosterResult<Vec<String>> {
        if let Some(values) = record.attributes().peek(self.attribute).await {
            return Ok(values);
        }
        let kind = record.kind();
        let rows = record
            .roster()
            .directory()
            .search_attribute(
                &kind.base_dn(record.roster().suffix()),
                &filter::eq(kind.key_attribute(), record.key()),
                self.attribute,
            )
            .await?;
        Ok(rows.into_iter().next().unwrap_or_default())
    }

    fn member_uid(&self, value: &str) -> Option<String> {
        match self.format {
            MemberFormat::Uid => Some(value.to_string()),
            MemberFormat::Dn => {
                let uid = rdn_value(value, EntityKind::Person.key_attribute());
                if uid.is_none() {
                    debug!(value, "member value is not a person DN");
                }
                uid
            }
        }
    }

    fn values_for(&self, record: &Record, uids: &[&str]) -> Vec<String> {
        uids.iter()
            .map(|uid| match self.format {
                MemberFormat::Uid => uid.to_string(),
                MemberFormat::Dn => entity_dn(EntityKind::Person, uid, record.roster().suffix()),
            })
            .collect()
    }
}
