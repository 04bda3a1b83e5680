//! Security context lifecycle for one unit of work.
//!
//! `login` resolves a [`Principal`] into an immutable [`EventContext`] and
//! stores it in the caller's [`UnitOfWork`]. The returned [`ContextGuard`]
//! logs out on drop, so a failing operation never leaves a stale context
//! behind for a reused worker.

use std::sync::Arc;

use acl_security::constants::SYSTEM_GROUP_ID;
use acl_security::{
    AdminPrivileges, EventContext, EventRef, GroupId, Permissions, ShareId, UserId,
};
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use crate::domain::error::SecurityError;
use crate::domain::ports::{EventLog, GroupRecord, IdentityStore, ShareStore, UserRecord};
use crate::domain::privileges::{Freshness, LightAdminPrivileges, SessionIdentity};

/// Which group a session pins.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum GroupSelection {
    /// The user's default group.
    #[default]
    Default,
    Named(String),
    /// No group pinned.
    AllGroups,
}

/// Who is logging in, and how.
#[derive(Debug, Clone)]
pub struct Principal {
    pub user_name: String,
    pub group: GroupSelection,
    pub session_id: Uuid,
    pub event_type: String,
    pub share_id: Option<ShareId>,
    /// Name of the real identity when acting on someone's behalf.
    pub sudoer_name: Option<String>,
    pub umask: Option<Permissions>,
    pub read_only: bool,
    pub graph_critical: bool,
}

impl Principal {
    #[must_use]
    pub fn new(user_name: impl Into<String>, session_id: Uuid) -> Self {
        Self {
            user_name: user_name.into(),
            group: GroupSelection::Default,
            session_id,
            event_type: "User".to_owned(),
            share_id: None,
            sudoer_name: None,
            umask: None,
            read_only: false,
            graph_critical: false,
        }
    }

    #[must_use]
    pub fn group(mut self, name: impl Into<String>) -> Self {
        self.group = GroupSelection::Named(name.into());
        self
    }

    #[must_use]
    pub fn all_groups(mut self) -> Self {
        self.group = GroupSelection::AllGroups;
        self
    }

    #[must_use]
    pub fn event_type(mut self, event_type: impl Into<String>) -> Self {
        self.event_type = event_type.into();
        self
    }

    #[must_use]
    pub fn share(mut self, share_id: ShareId) -> Self {
        self.share_id = Some(share_id);
        self
    }

    #[must_use]
    pub fn sudo_by(mut self, real_user: impl Into<String>) -> Self {
        self.sudoer_name = Some(real_user.into());
        self
    }

    #[must_use]
    pub fn umask(mut self, umask: Permissions) -> Self {
        self.umask = Some(umask);
        self
    }

    #[must_use]
    pub fn read_only(mut self) -> Self {
        self.read_only = true;
        self
    }

    #[must_use]
    pub fn graph_critical(mut self) -> Self {
        self.graph_critical = true;
        self
    }
}

/// Per-unit-of-work slot holding the active context.
#[derive(Debug, Default)]
pub struct UnitOfWork {
    context: Option<EventContext>,
}

impl UnitOfWork {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn is_ready(&self) -> bool {
        self.context.is_some()
    }

    /// The active context, or an API-usage error outside login/logout.
    ///
    /// # Errors
    /// `ApiUsage` when no context is active.
    pub fn current(&self) -> Result<&EventContext, SecurityError> {
        self.context
            .as_ref()
            .ok_or_else(|| SecurityError::api_usage("no security context is active"))
    }
}

/// Active login. Dropping it logs out.
pub struct ContextGuard<'u> {
    uow: &'u mut UnitOfWork,
    privileges: Arc<LightAdminPrivileges>,
}

impl std::fmt::Debug for ContextGuard<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ContextGuard")
            .field("uow", &self.uow)
            .finish_non_exhaustive()
    }
}

impl ContextGuard<'_> {
    #[must_use]
    pub fn context(&self) -> Option<&EventContext> {
        self.uow.context.as_ref()
    }

    /// # Errors
    /// `ApiUsage` when no context is active.
    pub fn current(&self) -> Result<&EventContext, SecurityError> {
        self.uow.current()
    }

    /// The logged-in unit of work, for protected operations.
    #[must_use]
    pub fn unit_of_work(&self) -> &UnitOfWork {
        self.uow
    }
}

impl Drop for ContextGuard<'_> {
    fn drop(&mut self) {
        clear(self.uow, &self.privileges);
    }
}

fn clear(uow: &mut UnitOfWork, privileges: &LightAdminPrivileges) {
    if let Some(ctx) = uow.context.take() {
        privileges.invalidate(ctx.session_id());
        debug!(session = %ctx.session_id(), "security context cleared");
    }
}

pub struct SecurityContextManager {
    identity: Arc<dyn IdentityStore>,
    shares: Arc<dyn ShareStore>,
    events: Arc<dyn EventLog>,
    privileges: Arc<LightAdminPrivileges>,
    default_umask: Option<Permissions>,
}

impl SecurityContextManager {
    #[must_use]
    pub fn new(
        identity: Arc<dyn IdentityStore>,
        shares: Arc<dyn ShareStore>,
        events: Arc<dyn EventLog>,
        privileges: Arc<LightAdminPrivileges>,
        default_umask: Option<Permissions>,
    ) -> Self {
        Self {
            identity,
            shares,
            events,
            privileges,
            default_umask,
        }
    }

    /// Populate `uow` with the context for `principal`.
    ///
    /// # Errors
    /// - `Internal` when a context is already active (leak)
    /// - `Violation` for unknown users, groups or shares, non-member groups
    ///   and sudo without the privilege to do so
    #[instrument(
        skip(self, uow, principal),
        fields(user = %principal.user_name, session = %principal.session_id)
    )]
    pub fn login<'u>(
        &self,
        uow: &'u mut UnitOfWork,
        principal: &Principal,
    ) -> Result<ContextGuard<'u>, SecurityError> {
        if let Some(leaked) = &uow.context {
            warn!(leaked_session = %leaked.session_id(), "security context leak detected");
            return Err(SecurityError::internal(
                "a security context is already active for this unit of work",
            ));
        }

        let user = self.resolve_user(&principal.user_name)?;
        let admin = user.member_of.contains(&SYSTEM_GROUP_ID);
        let group = self.resolve_group(&user, &principal.group, admin)?;
        let sudoer = match &principal.sudoer_name {
            Some(real) => Some(self.resolve_sudoer(real, &user)?),
            None => None,
        };
        let share = match principal.share_id {
            Some(id) => Some(Arc::new(self.shares.share(id)?.ok_or_else(|| {
                SecurityError::violation(format!("share {id} does not exist"))
            })?)),
            None => None,
        };

        let event_id =
            self.events
                .next_event(user.id, principal.session_id, &principal.event_type)?;
        let privileges = if admin {
            self.privileges.get_session_privileges(
                &SessionIdentity {
                    session_id: principal.session_id,
                    user_id: user.id,
                    sudoer,
                },
                Freshness::Cached,
            )?
        } else {
            AdminPrivileges::empty()
        };

        let mut builder = EventContext::builder()
            .session_id(principal.session_id)
            .user_id(user.id)
            .admin(admin)
            .member_of(user.member_of.iter().copied())
            .leader_of(user.leader_of.iter().copied())
            .share(share)
            .privileges(privileges)
            .sudoer(sudoer)
            .event(EventRef::new(event_id, principal.event_type.clone()))
            .umask(principal.umask.or(self.default_umask))
            .read_only(principal.read_only)
            .graph_critical(principal.graph_critical);
        builder = match group {
            Some(g) => builder.group(g.id, g.permissions),
            None => builder.all_groups(),
        };

        let ctx = builder.build();
        info!(
            user_id = ctx.user_id(),
            group = ?ctx.active_group(),
            admin,
            event = event_id,
            "security context established"
        );
        uow.context = Some(ctx);
        Ok(ContextGuard {
            uow,
            privileges: Arc::clone(&self.privileges),
        })
    }

    /// Clear the context and its cached privileges. Safe to call when none
    /// is active.
    pub fn logout(&self, uow: &mut UnitOfWork) {
        clear(uow, &self.privileges);
    }

    fn resolve_user(&self, name: &str) -> Result<UserRecord, SecurityError> {
        self.identity
            .find_user(name)?
            .ok_or_else(|| SecurityError::violation(format!("unknown user '{name}'")))
    }

    fn resolve_group(
        &self,
        user: &UserRecord,
        selection: &GroupSelection,
        admin: bool,
    ) -> Result<Option<GroupRecord>, SecurityError> {
        let group = match selection {
            GroupSelection::AllGroups => return Ok(None),
            GroupSelection::Default => self.identity.group(user.default_group)?.ok_or_else(|| {
                SecurityError::internal(format!(
                    "default group {} of user {} does not exist",
                    user.default_group, user.id
                ))
            })?,
            GroupSelection::Named(name) => self
                .identity
                .find_group(name)?
                .ok_or_else(|| SecurityError::violation(format!("unknown group '{name}'")))?,
        };
        if !admin && !is_member(user, group.id) {
            return Err(SecurityError::violation(format!(
                "user {} is not a member of group {}",
                user.id, group.id
            )));
        }
        Ok(Some(group))
    }

    fn resolve_sudoer(
        &self,
        real_name: &str,
        acting: &UserRecord,
    ) -> Result<UserId, SecurityError> {
        let real = self.resolve_user(real_name)?;
        let may_sudo = real.member_of.contains(&SYSTEM_GROUP_ID)
            && self
                .privileges
                .privileges_of(real.id)?
                .contains(AdminPrivileges::SUDO);
        if !may_sudo {
            return Err(SecurityError::violation(format!(
                "user {} may not act as user {}",
                real.id, acting.id
            )));
        }
        Ok(real.id)
    }
}

fn is_member(user: &UserRecord, group: GroupId) -> bool {
    user.member_of.contains(&group) || user.leader_of.contains(&group)
}
