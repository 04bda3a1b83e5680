#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::sync::Arc;

use acl_security::constants::SYSTEM_GROUP_ID;
use acl_security::{Details, EventContext, EventRef, GroupId, Permissions, UserId};

use crate::config::SecurityConfig;
use crate::domain::context::SecurityContextManager;
use crate::domain::model::EntityType;
use crate::domain::service::{Ports, SecuritySystem};
use crate::infra::memory::{
    CountingEventLog, InMemoryEntityStore, InMemoryIdentityStore, InMemoryShareStore,
};

pub const IMAGE: EntityType = EntityType::owned("Image");
pub const DATASET: EntityType = EntityType::owned("Dataset");
pub const FORMAT: EntityType = EntityType::enumeration("Format");

pub const ALICE: &str = "alice";
pub const BOB: &str = "bob";
pub const ADMIN: &str = "admin";
pub const LAB: &str = "lab";
pub const PRIVATE_LAB: &str = "private-lab";

/// Plain member of `group` with the given group permissions.
pub fn member_ctx(user: UserId, group: GroupId, perms: Permissions) -> EventContext {
    EventContext::builder()
        .user_id(user)
        .group(group, perms)
        .member_of([group])
        .event(EventRef::new(7, "User"))
        .build()
}

pub fn stored_details(owner: UserId, group: GroupId, perms: Option<Permissions>) -> Details {
    Details::new(owner, group, perms, EventRef::new(1, "User"))
}

/// An engine wired to in-memory ports.
///
/// - `lab` is read-only; alice, bob and admin are members
/// - `private-lab` is private; only alice is a member
/// - admin belongs to the system group
pub struct Fixture {
    pub identity: Arc<InMemoryIdentityStore>,
    pub shares: Arc<InMemoryShareStore>,
    pub store: Arc<InMemoryEntityStore>,
    pub events: Arc<CountingEventLog>,
    pub system: SecuritySystem,
    pub alice: UserId,
    pub bob: UserId,
    pub admin: UserId,
    pub lab: GroupId,
    pub private_lab: GroupId,
}

impl Fixture {
    pub fn new() -> Self {
        Self::with_umask(None)
    }

    pub fn with_umask(umask: Option<Permissions>) -> Self {
        let identity = Arc::new(InMemoryIdentityStore::new());
        let lab = identity.add_group(LAB, Permissions::READ_ONLY);
        let private_lab = identity.add_group(PRIVATE_LAB, Permissions::PRIVATE);
        let alice = identity.add_user(ALICE, lab, [lab, private_lab], []);
        let bob = identity.add_user(BOB, lab, [lab], []);
        let admin = identity.add_user(ADMIN, lab, [SYSTEM_GROUP_ID, lab], []);

        let shares = Arc::new(InMemoryShareStore::new());
        let store = Arc::new(InMemoryEntityStore::new());
        let events = Arc::new(CountingEventLog::new());
        let config = SecurityConfig {
            default_umask: umask.map(|u| u.to_string()),
            ..SecurityConfig::default()
        };
        let system = SecuritySystem::new(
            config,
            Ports {
                identity: identity.clone(),
                shares: shares.clone(),
                store: store.clone(),
                events: events.clone(),
            },
        )
        .expect("fixture config is valid");

        Self {
            identity,
            shares,
            store,
            events,
            system,
            alice,
            bob,
            admin,
            lab,
            private_lab,
        }
    }

    pub fn contexts(&self) -> &SecurityContextManager {
        self.system.contexts()
    }

    pub fn details(&self, owner: UserId, group: GroupId, perms: Permissions) -> Details {
        stored_details(owner, group, Some(perms))
    }
}
