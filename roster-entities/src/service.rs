//! Application service groups under `ou=apps,ou=groups`. Members are
//! person DNs.

use chrono::{DateTime, Utc};
use roster_cache::IdentityMap;
use roster_core::{EntityKind, RosterResult};

use crate::entity::{DirectoryEntity, Record};
use crate::membership::{MemberFormat, MemberList, Members};
use crate::roster::EntityCaches;

pub const MEMBER: &str = "member";

pub struct Service {
    record: Record,
    members: MemberList,
}

impl DirectoryEntity for Service {
    const KIND: EntityKind = EntityKind::Service;

    fn from_record(record: Record) -> Self {
        Self {
            record,
            members: MemberList::new(MEMBER, MemberFormat::Dn),
        }
    }

    fn record(&self) -> &Record {
        &self.record
    }

    fn identity_map(caches: &EntityCaches) -> &IdentityMap<Self> {
        &caches.services
    }
}

impl Service {
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

    pub async fn modify_timestamp(&self) -> Option<DateTime<Utc>> {
        self.record.modify_timestamp().await
    }
}

impl std::fmt::Debug for Service {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("Service").field(&self.record.key()).finish()
    }
}
