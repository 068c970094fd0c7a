//! People, keyed by `uid` under `ou=people`.

use std::sync::Arc;

use roster_cache::IdentityMap;
use roster_core::{EntityKind, RosterResult};
use roster_directory::filter;

use crate::entity::{DirectoryEntity, Record};
use crate::roster::EntityCaches;
use crate::{Committee, Group, Service};

pub const PUBLIC_NAME: &str = "cn";
pub const MAIL: &str = "mail";
pub const ALT_EMAIL: &str = "asf-altEmail";
pub const GIVEN_NAME: &str = "givenName";
pub const SURNAME: &str = "sn";
pub const LOGIN_SHELL: &str = "loginShell";
pub const BANNED: &str = "asf-banned";

const NOLOGIN_SHELL: &str = "/usr/bin/false";

/// A directory account.
pub struct Person {
    record: Record,
}

impl DirectoryEntity for Person {
    const KIND: EntityKind = EntityKind::Person;

    fn from_record(record: Record) -> Self {
        Self { record }
    }

    fn record(&self) -> &Record {
        &self.record
    }

    fn identity_map(caches: &EntityCaches) -> &IdentityMap<Self> {
        &caches.people
    }
}

impl Person {
    pub fn uid(&self) -> &str {
        self.record.key()
    }

    pub fn dn(&self) -> &str {
        self.record.dn()
    }

    /// Values of any attribute.
    pub async fn attribute(&self, name: &str) -> RosterResult<Option<Vec<String>>> {
        self.record.attribute(name).await
    }

    /// Display name (`cn`).
    pub async fn public_name(&self) -> RosterResult<Option<String>> {
        self.record.first(PUBLIC_NAME).await
    }

    pub async fn mail(&self) -> RosterResult<Vec<String>> {
        self.record.values(MAIL).await
    }

    pub async fn alt_email(&self) -> RosterResult<Vec<String>> {
        self.record.values(ALT_EMAIL).await
    }

    /// Primary then alternate addresses, without duplicates.
    pub async fn all_mail(&self) -> RosterResult<Vec<String>> {
        let mut all = self.mail().await?;
        for address in self.alt_email().await? {
            if !all.iter().any(|a| a.eq_ignore_ascii_case(&address)) {
                all.push(address);
            }
        }
        Ok(all)
    }

    pub async fn given_name(&self) -> RosterResult<Option<String>> {
        self.record.first(GIVEN_NAME).await
    }

    pub async fn surname(&self) -> RosterResult<Option<String>> {
        self.record.first(SURNAME).await
    }

    pub async fn login_shell(&self) -> RosterResult<Option<String>> {
        self.record.first(LOGIN_SHELL).await
    }

    /// True when the account cannot log in: a nologin shell or a ban.
    pub async fn is_nologin(&self) -> RosterResult<bool> {
        if self.login_shell().await?.as_deref() == Some(NOLOGIN_SHELL) {
            return Ok(true);
        }
        Ok(self
            .record
            .values(BANNED)
            .await?
            .iter()
            .any(|v| v.eq_ignore_ascii_case("yes")))
    }

    /// Replace an attribute's values in the directory and locally.
    pub async fn modify(&self, name: &str, values: Vec<String>) -> RosterResult<Vec<String>> {
        self.record.modify(name, values).await
    }

    /// Groups listing this person in `memberUid`.
    pub async fn groups(&self) -> RosterResult<Vec<Arc<Group>>> {
        self.record
            .roster()
            .find_all::<Group>(Some(&filter::eq(crate::group::MEMBER_UID, self.uid())))
            .await
    }

    /// Committees listing this person's DN in `member`.
    pub async fn committees(&self) -> RosterResult<Vec<Arc<Committee>>> {
        self.record
            .roster()
            .find_all::<Committee>(Some(&filter::eq(crate::committee::MEMBER, self.dn())))
            .await
    }

    /// Services listing this person's DN in `member`.
    pub async fn services(&self) -> RosterResult<Vec<Arc<Service>>> {
        self.record
            .roster()
            .find_all::<Service>(Some(&filter::eq(crate::service::MEMBER, self.dn())))
            .await
    }
}

impl std::fmt::Debug for Person {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("Person").field(&self.record.key()).finish()
    }
}
