//! Collaborators the engine consumes. Implementations live in `infra`.
//!
//! Every method is synchronous: the engine runs inside one unit of work on
//! one thread. Failures are reported with `anyhow` and surface to callers
//! as [`SecurityError::Internal`](crate::domain::error::SecurityError::Internal).

use acl_security::{
    EventId, GroupId, ObjectId, Permissions, PrivilegeSetting, ShareData, ShareId, UserId,
};
use uuid::Uuid;

use crate::domain::model::{EntityType, RowWrite, StoredRow};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserRecord {
    pub id: UserId,
    pub name: String,
    pub default_group: GroupId,
    pub member_of: Vec<GroupId>,
    pub leader_of: Vec<GroupId>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GroupRecord {
    pub id: GroupId,
    pub name: String,
    pub permissions: Permissions,
}

/// Identity storage: principals, groups and light-admin configuration.
pub trait IdentityStore: Send + Sync {
    fn find_user(&self, name: &str) -> anyhow::Result<Option<UserRecord>>;

    fn find_group(&self, name: &str) -> anyhow::Result<Option<GroupRecord>>;

    fn group(&self, id: GroupId) -> anyhow::Result<Option<GroupRecord>>;

    /// Configuration entries of one identity. Absence means granted.
    fn privilege_settings(&self, user: UserId) -> anyhow::Result<Vec<PrivilegeSetting>>;
}

/// Sharing storage.
pub trait ShareStore: Send + Sync {
    fn share(&self, id: ShareId) -> anyhow::Result<Option<ShareData>>;
}

/// Row storage used by reattachment and commit.
pub trait EntityStore: Send + Sync {
    fn load(&self, entity_type: &EntityType, id: ObjectId) -> anyhow::Result<Option<StoredRow>>;

    /// Enumeration row carrying `value`, if one exists.
    fn find_enumeration(
        &self,
        entity_type: &EntityType,
        value: &str,
    ) -> anyhow::Result<Option<StoredRow>>;

    fn insert(&self, row: RowWrite) -> anyhow::Result<ObjectId>;

    fn update(&self, id: ObjectId, row: RowWrite) -> anyhow::Result<()>;

    fn delete(&self, entity_type: &EntityType, id: ObjectId) -> anyhow::Result<()>;
}

/// Audit event allocation.
pub trait EventLog: Send + Sync {
    fn next_event(&self, user: UserId, session: Uuid, event_type: &str)
    -> anyhow::Result<EventId>;
}
