//! The [`Roster`] context: directory handle plus one identity cache per
//! entity kind.

use std::collections::HashSet;
use std::sync::Arc;

use roster_cache::{CacheStats, IdentityMap};
use roster_core::{attribute_key, insert_attribute, AttributeMap, DirectoryConfig, EntityKind, RosterResult};
use roster_directory::{filter, rdn_value, take_attribute, Directory};
use tracing::{debug, warn};

use crate::entity::{DirectoryEntity, Record, MODIFY_TIMESTAMP};
use crate::{Committee, Group, Person, Service};

/// Identity caches, one per entity kind.
pub struct EntityCaches {
    pub(crate) people: IdentityMap<Person>,
    pub(crate) groups: IdentityMap<Group>,
    pub(crate) committees: IdentityMap<Committee>,
    pub(crate) services: IdentityMap<Service>,
}

struct RosterInner {
    directory: Arc<Directory>,
    suffix: String,
    caches: EntityCaches,
}

/// Entry point for entity lookups. Cheap to clone; clones share caches.
#[derive(Clone)]
pub struct Roster {
    inner: Arc<RosterInner>,
}

impl Roster {
    pub fn new(directory: Directory) -> Self {
        let suffix = directory.base().to_string();
        Self {
            inner: Arc::new(RosterInner {
                directory: Arc::new(directory),
                suffix,
                caches: EntityCaches {
                    people: IdentityMap::new(EntityKind::Person),
                    groups: IdentityMap::new(EntityKind::Group),
                    committees: IdentityMap::new(EntityKind::Committee),
                    services: IdentityMap::new(EntityKind::Service),
                },
            }),
        }
    }

    /// A roster over the `ldap3` transport.
    pub fn connect(config: &DirectoryConfig) -> RosterResult<Self> {
        Ok(Self::new(Directory::connect_ldap(config)?))
    }

    pub fn directory(&self) -> &Directory {
        &self.inner.directory
    }

    pub(crate) fn directory_handle(&self) -> Arc<Directory> {
        Arc::clone(&self.inner.directory)
    }

    /// Directory suffix every entity DN ends in.
    pub fn suffix(&self) -> &str {
        &self.inner.suffix
    }

    /// The cached instance of `E` for `key`, created on a miss.
    pub fn find<E: DirectoryEntity>(&self, key: &str) -> Arc<E> {
        E::identity_map(&self.inner.caches)
            .find_or_create(key, || E::from_record(Record::new(E::KIND, key, self)))
    }

    /// The cached instance for `key`, if one is alive.
    pub fn cached<E: DirectoryEntity>(&self, key: &str) -> Option<Arc<E>> {
        E::identity_map(&self.inner.caches).get(key)
    }

    pub fn cache_stats<E: DirectoryEntity>(&self) -> CacheStats {
        E::identity_map(&self.inner.caches).stats()
    }

    pub fn person(&self, uid: &str) -> Arc<Person> {
        self.find(uid)
    }

    pub fn group(&self, cn: &str) -> Arc<Group> {
        self.find(cn)
    }

    pub fn committee(&self, cn: &str) -> Arc<Committee> {
        self.find(cn)
    }

    pub fn service(&self, cn: &str) -> Arc<Service> {
        self.find(cn)
    }

    /// Keys of every `E` matching `search` (all entries when `None`).
    pub async fn list<E: DirectoryEntity>(&self, search: Option<&str>) -> RosterResult<Vec<String>> {
        let key_attr = E::KIND.key_attribute();
        let search = search
            .map(str::to_string)
            .unwrap_or_else(|| filter::present(key_attr));
        let rows = self
            .directory()
            .search_attribute(&E::KIND.base_dn(self.suffix()), &search, key_attr)
            .await?;
        Ok(rows
            .into_iter()
            .filter_map(|values| values.into_iter().next())
            .collect())
    }

    /// Entities for every key [`Roster::list`] returns.
    pub async fn find_all<E: DirectoryEntity>(&self, search: Option<&str>) -> RosterResult<Vec<Arc<E>>> {
        let keys = self.list::<E>(search).await?;
        Ok(keys.iter().map(|key| self.find::<E>(key)).collect())
    }

    /// Fetch `attributes` for many entities in one search.
    ///
    /// With `keys` the search covers exactly those keys; without, it covers
    /// every entry holding at least one requested attribute. Requested
    /// attributes missing from a row are stored as empty lists. When no keys
    /// are given, cached entities the search did not return are also filled
    /// with empty lists and included in the result; a keyed preload leaves
    /// other cached entities alone.
    pub async fn preload<E: DirectoryEntity>(
        &self,
        attributes: &[&str],
        keys: &[&str],
    ) -> RosterResult<Vec<Arc<E>>> {
        let kind = E::KIND;
        let key_attr = kind.key_attribute();

        let search = if !keys.is_empty() {
            filter::any_of(key_attr, keys)
        } else if attributes.is_empty() {
            filter::present(key_attr)
        } else {
            filter::or(attributes.iter().map(|a| filter::present(a)))
        };

        let mut requested: Vec<&str> = vec![key_attr];
        if kind.member_attribute().is_some() {
            requested.push(MODIFY_TIMESTAMP);
        }
        for attribute in attributes {
            if !requested.iter().any(|r| r.eq_ignore_ascii_case(attribute)) {
                requested.push(*attribute);
            }
        }

        let rows = self
            .directory()
            .search_one_level(&kind.base_dn(self.suffix()), &search, &requested)
            .await?;

        let mut markers = AttributeMap::new();
        for attribute in attributes {
            if attribute_key(&markers, attribute).is_none() {
                markers.insert(attribute.to_string(), Vec::new());
            }
        }
        let mut found = Vec::with_capacity(rows.len());
        let mut returned = HashSet::new();

        for mut row in rows {
            let key = take_attribute(&mut row.attrs, key_attr)
                .and_then(|values| values.into_iter().next())
                .or_else(|| rdn_value(&row.dn, key_attr));
            let Some(key) = key else {
                warn!(%kind, dn = %row.dn, "preload row without key, skipping");
                continue;
            };

            // Values land under the requested spelling of each name.
            let mut values = markers.clone();
            for name in &requested[1..] {
                if let Some(v) = take_attribute(&mut row.attrs, name) {
                    insert_attribute(&mut values, *name, v);
                }
            }
            for (name, v) in row.attrs {
                insert_attribute(&mut values, name, v);
            }
            insert_attribute(&mut values, key_attr, vec![key.clone()]);

            let entity = self.find::<E>(&key);
            entity.record().attributes().merge_preloaded(values).await;
            returned.insert(key);
            found.push(entity);
        }

        let fetched = found.len();
        if keys.is_empty() {
            for (key, entity) in E::identity_map(&self.inner.caches).live() {
                if returned.contains(&key) {
                    continue;
                }
                entity.record().attributes().merge_preloaded(markers.clone()).await;
                found.push(entity);
            }
        }

        debug!(%kind, fetched, zero_filled = found.len() - fetched, "bulk preload");
        Ok(found)
    }

    /// The person whose `mail` or `asf-altEmail` is `address`.
    pub async fn person_by_email(&self, address: &str) -> RosterResult<Option<Arc<Person>>> {
        let search = filter::or([
            filter::eq(crate::person::MAIL, address),
            filter::eq(crate::person::ALT_EMAIL, address),
        ]);
        let uids = self.list::<Person>(Some(&search)).await?;
        if uids.len() > 1 {
            warn!(address, matches = uids.len(), "address matches several people");
        }
        Ok(uids.first().map(|uid| self.person(uid)))
    }
}

impl std::fmt::Debug for Roster {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Roster")
            .field("suffix", &self.inner.suffix)
            .field("people", &self.inner.caches.people)
            .field("groups", &self.inner.caches.groups)
            .field("committees", &self.inner.caches.committees)
            .field("services", &self.inner.caches.services)
            .finish_non_exhaustive()
    }
}
