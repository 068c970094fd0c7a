//! Project management committees under `ou=pmc,ou=committees,ou=groups`.
//!
//! Committees list both members and owners (the committee roster and its
//! chairs) as person DNs. Each list is cached on its own.

use chrono::{DateTime, Utc};
use roster_cache::IdentityMap;
use roster_core::{EntityKind, RosterResult};

use crate::entity::{DirectoryEntity, Record};
use crate::membership::{MemberFormat, MemberList, Members};
use crate::roster::EntityCaches;

pub const MEMBER: &str = "member";
pub const OWNER: &str = "owner";

pub struct Committee {
    record: Record,
    members: MemberList,
    owners: MemberList,
}

impl DirectoryEntity for Committee {
    const KIND: EntityKind = EntityKind::Committee;

    fn from_record(record: Record) -> Self {
        Self {
            record,
            members: MemberList::new(MEMBER, MemberFormat::Dn),
            owners: MemberList::new(OWNER, MemberFormat::Dn),
        }
    }

    fn record(&self) -> &Record {
        &self.record
    }

    fn identity_map(caches: &EntityCaches) -> &IdentityMap<Self> {
        &caches.committees
    }
}

impl Committee {
    pub fn name(&self) -> &str {
        self.record.key()
    }

    pub async fn attribute(&self, name: &str) -> RosterResult<Option<Vec<String>>> {
        self.record.attribute(name).await
    }

    pub async fn members(&self) -> RosterResult<Members> {
        self.members.resolve(&self.record).await
    }

    pub async fn member_ids(&self) -> RosterResult<Vec<String>> {
        self.members.ids(&self.record).await
    }

    pub async fn add_members(&self, uids: &[&str]) -> RosterResult<()> {
        self.members.add(&self.record, uids).await
    }

    pub async fn remove_members(&self, uids: &[&str]) -> RosterResult<()> {
        self.members.remove(&self.record, uids).await
    }

    pub async fn owners(&self) -> RosterResult<Members> {
        self.owners.resolve(&self.record).await
    }

    pub async fn owner_ids(&self) -> RosterResult<Vec<String>> {
        self.owners.ids(&self.record).await
    }

    pub async fn add_owners(&self, uids: &[&str]) -> RosterResult<()> {
        self.owners.add(&self.record, uids).await
    }

    pub async fn remove_owners(&self, uids: &[&str]) -> RosterResult<()> {
        self.owners.remove(&self.record, uids).await
    }

    pub async fn modify_timestamp(&self) -> Option<DateTime<Utc>> {
        self.record.modify_timestamp().await
    }
}

impl std::fmt::Debug for Committee {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("Committee").field(&self.record.key()).finish()
    }
}
