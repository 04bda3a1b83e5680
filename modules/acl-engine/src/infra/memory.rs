//! In-memory adapters for every port.
//!
//! Used by embedders that keep security state in process and by tests.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::sync::atomic::{AtomicI64, Ordering};

use acl_security::constants::{ROOT_USER_ID, SYSTEM_GROUP_ID, USER_GROUP_ID};
use acl_security::{
    Details, EventId, GroupId, ObjectId, Permissions, PrivilegeSetting, ShareData, ShareId,
    UserId,
};
use anyhow::{Context as _, bail};
use parking_lot::RwLock;
use uuid::Uuid;

use crate::domain::model::{EntityType, RowWrite, StoredRow};
use crate::domain::ports::{
    EntityStore, EventLog, GroupRecord, IdentityStore, ShareStore, UserRecord,
};

#[derive(Default)]
struct Identities {
    users: BTreeMap<UserId, UserRecord>,
    groups: BTreeMap<GroupId, GroupRecord>,
    settings: HashMap<UserId, Vec<PrivilegeSetting>>,
}

/// Users, groups and privilege settings.
///
/// Starts with the `system` and `user` groups and the `root` user.
pub struct InMemoryIdentityStore {
    inner: RwLock<Identities>,
}

impl Default for InMemoryIdentityStore {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryIdentityStore {
    #[must_use]
    pub fn new() -> Self {
        let mut inner = Identities::default();
        for (id, name) in [(SYSTEM_GROUP_ID, "system"), (USER_GROUP_ID, "user")] {
            inner.groups.insert(
                id,
                GroupRecord {
                    id,
                    name: name.to_owned(),
                    permissions: Permissions::PRIVATE,
                },
            );
        }
        inner.users.insert(
            ROOT_USER_ID,
            UserRecord {
                id: ROOT_USER_ID,
                name: "root".to_owned(),
                default_group: SYSTEM_GROUP_ID,
                member_of: vec![SYSTEM_GROUP_ID, USER_GROUP_ID],
                leader_of: Vec::new(),
            },
        );
        Self {
            inner: RwLock::new(inner),
        }
    }

    #[must_use]
    pub fn add_group(&self, name: &str, permissions: Permissions) -> GroupId {
        let mut inner = self.inner.write();
        let id = inner.groups.keys().next_back().map_or(0, |last| last + 1);
        inner.groups.insert(
            id,
            GroupRecord {
                id,
                name: name.to_owned(),
                permissions,
            },
        );
        id
    }

    /// Register a user. Every user also belongs to the `user` group.
    #[must_use]
    pub fn add_user(
        &self,
        name: &str,
        default_group: GroupId,
        member_of: impl IntoIterator<Item = GroupId>,
        leader_of: impl IntoIterator<Item = GroupId>,
    ) -> UserId {
        let mut member_of: Vec<GroupId> = member_of.into_iter().collect();
        if !member_of.contains(&USER_GROUP_ID) {
            member_of.push(USER_GROUP_ID);
        }
        let mut inner = self.inner.write();
        let id = inner.users.keys().next_back().map_or(0, |last| last + 1);
        inner.users.insert(
            id,
            UserRecord {
                id,
                name: name.to_owned(),
                default_group,
                member_of,
                leader_of: leader_of.into_iter().collect(),
            },
        );
        id
    }

    pub fn set_group_permissions(&self, group: GroupId, permissions: Permissions) {
        if let Some(record) = self.inner.write().groups.get_mut(&group) {
            record.permissions = permissions;
        }
    }

    pub fn set_privilege_settings(&self, user: UserId, settings: Vec<PrivilegeSetting>) {
        self.inner.write().settings.insert(user, settings);
    }
}

impl IdentityStore for InMemoryIdentityStore {
    fn find_user(&self, name: &str) -> anyhow::Result<Option<UserRecord>> {
        Ok(self
            .inner
            .read()
            .users
            .values()
            .find(|u| u.name == name)
            .cloned())
    }

    fn find_group(&self, name: &str) -> anyhow::Result<Option<GroupRecord>> {
        Ok(self
            .inner
            .read()
            .groups
            .values()
            .find(|g| g.name == name)
            .cloned())
    }

    fn group(&self, id: GroupId) -> anyhow::Result<Option<GroupRecord>> {
        Ok(self.inner.read().groups.get(&id).cloned())
    }

    fn privilege_settings(&self, user: UserId) -> anyhow::Result<Vec<PrivilegeSetting>> {
        Ok(self
            .inner
            .read()
            .settings
            .get(&user)
            .cloned()
            .unwrap_or_default())
    }
}

#[derive(Default)]
pub struct InMemoryShareStore {
    shares: RwLock<HashMap<ShareId, ShareData>>,
}

impl InMemoryShareStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn put(&self, share: ShareData) {
        self.shares.write().insert(share.id, share);
    }
}

impl ShareStore for InMemoryShareStore {
    fn share(&self, id: ShareId) -> anyhow::Result<Option<ShareData>> {
        Ok(self.shares.read().get(&id).cloned())
    }
}

/// Row storage keyed by type name and id. Ids are unique across types.
pub struct InMemoryEntityStore {
    rows: RwLock<BTreeMap<(&'static str, ObjectId), StoredRow>>,
    next_id: AtomicI64,
}

impl Default for InMemoryEntityStore {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryEntityStore {
    #[must_use]
    pub fn new() -> Self {
        Self {
            rows: RwLock::new(BTreeMap::new()),
            next_id: AtomicI64::new(1),
        }
    }

    /// Store a row directly, bypassing the engine.
    #[must_use]
    pub fn seed(
        &self,
        entity_type: EntityType,
        details: Details,
        value: Option<&str>,
    ) -> ObjectId {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.rows.write().insert(
            (entity_type.name, id),
            StoredRow {
                id,
                entity_type,
                details: Arc::new(details),
                value: value.map(str::to_owned),
                references: Vec::new(),
            },
        );
        id
    }

    #[must_use]
    pub fn get(&self, entity_type: &EntityType, id: ObjectId) -> Option<StoredRow> {
        self.rows.read().get(&(entity_type.name, id)).cloned()
    }

    /// Every stored row of a type, in id order.
    #[must_use]
    pub fn rows_of(&self, entity_type: &EntityType) -> Vec<StoredRow> {
        self.rows
            .read()
            .values()
            .filter(|r| r.entity_type == *entity_type)
            .cloned()
            .collect()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.rows.read().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rows.read().is_empty()
    }
}

impl EntityStore for InMemoryEntityStore {
    fn load(&self, entity_type: &EntityType, id: ObjectId) -> anyhow::Result<Option<StoredRow>> {
        Ok(self.get(entity_type, id))
    }

    fn find_enumeration(
        &self,
        entity_type: &EntityType,
        value: &str,
    ) -> anyhow::Result<Option<StoredRow>> {
        Ok(self
            .rows
            .read()
            .values()
            .find(|r| r.entity_type == *entity_type && r.value.as_deref() == Some(value))
            .cloned())
    }

    fn insert(&self, row: RowWrite) -> anyhow::Result<ObjectId> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.rows.write().insert(
            (row.entity_type.name, id),
            StoredRow {
                id,
                entity_type: row.entity_type,
                details: row.details,
                value: row.value,
                references: row.references,
            },
        );
        Ok(id)
    }

    fn update(&self, id: ObjectId, row: RowWrite) -> anyhow::Result<()> {
        let mut rows = self.rows.write();
        let stored = rows
            .get_mut(&(row.entity_type.name, id))
            .with_context(|| format!("{}:{id} is not stored", row.entity_type))?;
        stored.details = row.details;
        stored.value = row.value;
        stored.references = row.references;
        Ok(())
    }

    fn delete(&self, entity_type: &EntityType, id: ObjectId) -> anyhow::Result<()> {
        let mut rows = self.rows.write();
        if rows
            .values()
            .any(|r| r.references.iter().any(|t| t.entity_type == *entity_type && t.id == id))
        {
            bail!("{entity_type}:{id} is still referenced");
        }
        if rows.remove(&(entity_type.name, id)).is_none() {
            bail!("{entity_type}:{id} is not stored");
        }
        Ok(())
    }
}

/// Allocates increasing event ids and remembers who asked.
#[derive(Default)]
pub struct CountingEventLog {
    events: RwLock<Vec<(UserId, Uuid, String)>>,
}

impl CountingEventLog {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn count(&self) -> usize {
        self.events.read().len()
    }

    /// Event type recorded for `event`.
    #[must_use]
    pub fn event_type(&self, event: EventId) -> Option<String> {
        let index = usize::try_from(event).ok()?.checked_sub(1)?;
        self.events.read().get(index).map(|(_, _, t)| t.clone())
    }
}

impl EventLog for CountingEventLog {
    fn next_event(
        &self,
        user: UserId,
        session: Uuid,
        event_type: &str,
    ) -> anyhow::Result<EventId> {
        let mut events = self.events.write();
        events.push((user, session, event_type.to_owned()));
        Ok(EventId::try_from(events.len())?)
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;
    use acl_security::EventRef;

    const IMAGE: EntityType = EntityType::owned("Image");

    fn details() -> Details {
        Details::new(1, 2, Some(Permissions::PRIVATE), EventRef::new(1, "User"))
    }

    #[test]
    fn identity_ids_are_allocated_after_reserved_rows() {
        let identity = InMemoryIdentityStore::new();
        let lab = identity.add_group("lab", Permissions::READ_ONLY);
        let alice = identity.add_user("alice", lab, [lab], []);
        assert_eq!(lab, 2);
        assert_eq!(alice, 1);

        let user = identity.find_user("alice").unwrap().unwrap();
        assert_eq!(user.member_of, vec![lab, USER_GROUP_ID]);
        assert_eq!(identity.group(lab).unwrap().unwrap().name, "lab");
        assert!(identity.find_group("missing").unwrap().is_none());
    }

    #[test]
    fn referenced_rows_cannot_be_deleted() {
        let store = InMemoryEntityStore::new();
        let target = store.seed(IMAGE, details(), None);
        let source = store
            .insert(RowWrite {
                entity_type: IMAGE,
                details: Arc::new(details()),
                value: None,
                references: vec![crate::domain::model::RowRef {
                    entity_type: IMAGE,
                    id: target,
                }],
            })
            .unwrap();

        assert!(store.delete(&IMAGE, target).is_err());
        store.delete(&IMAGE, source).unwrap();
        store.delete(&IMAGE, target).unwrap();
        assert!(store.is_empty());
    }

    #[test]
    fn event_ids_increase() {
        let log = CountingEventLog::new();
        let a = log.next_event(1, Uuid::nil(), "User").unwrap();
        let b = log.next_event(1, Uuid::nil(), "Internal").unwrap();
        assert!(b > a);
        assert_eq!(log.event_type(b).as_deref(), Some("Internal"));
        assert_eq!(log.count(), 2);
    }
}
