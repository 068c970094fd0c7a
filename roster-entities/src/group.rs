//! Unix groups, keyed by `cn` under `ou=groups`. Members are listed by uid.

use chrono::{DateTime, Utc};
use roster_cache::IdentityMap;
use roster_core::{EntityKind, RosterResult};

use crate::entity::{DirectoryEntity, Record};
use crate::membership::{MemberFormat, MemberList, Members};
use crate::roster::EntityCaches;

pub const MEMBER_UID: &str = "memberUid";

pub struct Group {
    record: Record,
    members: MemberList,
}

impl DirectoryEntity for Group {
    const KIND: EntityKind = EntityKind::Group;

    fn from_record(record: Record) -> Self {
        Self {
            record,
            members: MemberList::new(MEMBER_UID, MemberFormat::Uid),
        }
    }

    fn record(&self) -> &Record {
        &self.record
    }

    fn identity_map(caches: &EntityCaches) -> &IdentityMap<Self> {
        &caches.groups
    }
}

impl Group {
    pub fn name(&self) -> &str {
        self.record.key()
    }

    pub async fn attribute(&self, name: &str) -> RosterResult<Option<Vec<String>>> {
        self.record.attribute(name).await
    }

    /// Members as cached people. The list is refetched once no caller
    /// holds it any more.
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

impl std::fmt::Debug for Group {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("Group").field(&self.record.key()).finish()
    }
}
