//! The acting principal of a unit of work.
//!
//! [`EventContext`] is resolved once at login and never mutated afterwards.
//! Tests and adapters assemble one with [`EventContextBuilder`].

use std::collections::BTreeSet;
use std::sync::Arc;

use uuid::Uuid;

use crate::details::{EventRef, GroupId, UserId};
use crate::permissions::Permissions;
use crate::privileges::AdminPrivileges;
use crate::share::{ShareData, ShareId};

/// The group a session reads and writes in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ActiveGroup {
    /// Single-group isolation: only this group's rows are visible.
    Pinned(GroupId),
    /// No group pinned: rows from every group the principal can see.
    AllGroups,
}

/// `EventContext` is the snapshot of the acting principal for one unit of work.
///
/// Built by the context manager at login and passed by reference into every
/// filter, voter and lifecycle call. It is never mutated after construction.
#[derive(Debug, Clone)]
pub struct EventContext {
    session_id: Uuid,
    user_id: UserId,
    active_group: ActiveGroup,
    admin: bool,
    member_of: BTreeSet<GroupId>,
    leader_of: BTreeSet<GroupId>,
    share: Option<Arc<ShareData>>,
    /// Permissions of the pinned group. `None` in all-groups mode.
    group_permissions: Option<Permissions>,
    privileges: AdminPrivileges,
    /// Real identity behind a delegated session.
    sudoer: Option<UserId>,
    event: EventRef,
    umask: Option<Permissions>,
    read_only: bool,
    graph_critical: bool,
}

impl EventContext {
    #[must_use]
    pub fn builder() -> EventContextBuilder {
        EventContextBuilder::default()
    }

    #[must_use]
    pub fn session_id(&self) -> Uuid {
        self.session_id
    }

    #[must_use]
    pub fn user_id(&self) -> UserId {
        self.user_id
    }

    #[must_use]
    pub fn active_group(&self) -> ActiveGroup {
        self.active_group
    }

    /// The pinned group, if any.
    #[must_use]
    pub fn group_id(&self) -> Option<GroupId> {
        match self.active_group {
            ActiveGroup::Pinned(g) => Some(g),
            ActiveGroup::AllGroups => None,
        }
    }

    #[must_use]
    pub fn is_admin(&self) -> bool {
        self.admin
    }

    /// An administrator holding every privilege.
    #[must_use]
    pub fn is_full_admin(&self) -> bool {
        self.admin && self.privileges.is_all()
    }

    /// An administrator whose privileges were trimmed.
    #[must_use]
    pub fn is_light_admin(&self) -> bool {
        self.admin && !self.privileges.is_all()
    }

    #[must_use]
    pub fn member_of(&self) -> &BTreeSet<GroupId> {
        &self.member_of
    }

    #[must_use]
    pub fn leader_of(&self) -> &BTreeSet<GroupId> {
        &self.leader_of
    }

    #[must_use]
    pub fn is_member_of(&self, group: GroupId) -> bool {
        self.member_of.contains(&group)
    }

    #[must_use]
    pub fn is_leader_of(&self, group: GroupId) -> bool {
        self.leader_of.contains(&group)
    }

    #[must_use]
    pub fn share(&self) -> Option<&ShareData> {
        self.share.as_deref()
    }

    #[must_use]
    pub fn share_id(&self) -> Option<ShareId> {
        self.share.as_ref().map(|s| s.id)
    }

    #[must_use]
    pub fn is_sharing(&self) -> bool {
        self.share.is_some()
    }

    #[must_use]
    pub fn group_permissions(&self) -> Option<&Permissions> {
        self.group_permissions.as_ref()
    }

    #[must_use]
    pub fn privileges(&self) -> AdminPrivileges {
        self.privileges
    }

    /// True when the session is administrative and holds every privilege in `needed`.
    #[must_use]
    pub fn has_privilege(&self, needed: AdminPrivileges) -> bool {
        self.admin && self.privileges.contains(needed)
    }

    #[must_use]
    pub fn sudoer(&self) -> Option<UserId> {
        self.sudoer
    }

    #[must_use]
    pub fn is_sudo(&self) -> bool {
        self.sudoer.is_some()
    }

    /// The event of this unit of work, stamped on every row it writes.
    #[must_use]
    pub fn event(&self) -> &EventRef {
        &self.event
    }

    #[must_use]
    pub fn umask(&self) -> Option<&Permissions> {
        self.umask.as_ref()
    }

    #[must_use]
    pub fn is_read_only(&self) -> bool {
        self.read_only
    }

    /// Elevated sessions flagged graph-critical may not link other users' data.
    #[must_use]
    pub fn is_graph_critical(&self) -> bool {
        self.graph_critical
    }
}

/// Assembles an [`EventContext`].
///
/// Every field is optional. An unset user is the root user, an unset event is
/// internal event 0, no group selection means all groups, and unset
/// privileges mean the full [`AdminPrivileges`] set. Privileges only take effect with
/// [`admin`](Self::admin), so a non-admin context keeps none of them.
#[derive(Default)]
pub struct EventContextBuilder {
    session_id: Option<Uuid>,
    user_id: Option<UserId>,
    active_group: Option<ActiveGroup>,
    admin: bool,
    member_of: BTreeSet<GroupId>,
    leader_of: BTreeSet<GroupId>,
    share: Option<Arc<ShareData>>,
    group_permissions: Option<Permissions>,
    privileges: Option<AdminPrivileges>,
    sudoer: Option<UserId>,
    event: Option<EventRef>,
    umask: Option<Permissions>,
    read_only: bool,
    graph_critical: bool,
}

impl EventContextBuilder {
    #[must_use]
    pub fn session_id(mut self, session_id: Uuid) -> Self {
        self.session_id = Some(session_id);
        self
    }

    #[must_use]
    pub fn user_id(mut self, user_id: UserId) -> Self {
        self.user_id = Some(user_id);
        self
    }

    #[must_use]
    pub fn group(mut self, group: GroupId, permissions: Permissions) -> Self {
        self.active_group = Some(ActiveGroup::Pinned(group));
        self.group_permissions = Some(permissions);
        self
    }

    #[must_use]
    pub fn all_groups(mut self) -> Self {
        self.active_group = Some(ActiveGroup::AllGroups);
        self.group_permissions = None;
        self
    }

    #[must_use]
    pub fn admin(mut self, admin: bool) -> Self {
        self.admin = admin;
        self
    }

    #[must_use]
    pub fn member_of(mut self, groups: impl IntoIterator<Item = GroupId>) -> Self {
        self.member_of.extend(groups);
        self
    }

    #[must_use]
    pub fn leader_of(mut self, groups: impl IntoIterator<Item = GroupId>) -> Self {
        self.leader_of.extend(groups);
        self
    }

    #[must_use]
    pub fn share(mut self, share: Option<Arc<ShareData>>) -> Self {
        self.share = share;
        self
    }

    /// Trims an administrator to `privileges`. Defaults to all of them.
    #[must_use]
    pub fn privileges(mut self, privileges: AdminPrivileges) -> Self {
        self.privileges = Some(privileges);
        self
    }

    #[must_use]
    pub fn sudoer(mut self, sudoer: Option<UserId>) -> Self {
        self.sudoer = sudoer;
        self
    }

    #[must_use]
    pub fn event(mut self, event: EventRef) -> Self {
        self.event = Some(event);
        self
    }

    #[must_use]
    pub fn umask(mut self, umask: Option<Permissions>) -> Self {
        self.umask = umask;
        self
    }

    #[must_use]
    pub fn read_only(mut self, read_only: bool) -> Self {
        self.read_only = read_only;
        self
    }

    #[must_use]
    pub fn graph_critical(mut self, graph_critical: bool) -> Self {
        self.graph_critical = graph_critical;
        self
    }

    /// Build the context.
    ///
    /// Leaders are always members, so `leader_of` is folded into `member_of`.
    /// Unset privileges default to the full set.
    #[must_use]
    pub fn build(self) -> EventContext {
        let mut member_of = self.member_of;
        member_of.extend(self.leader_of.iter().copied());
        EventContext {
            session_id: self.session_id.unwrap_or_default(),
            user_id: self.user_id.unwrap_or_default(),
            active_group: self.active_group.unwrap_or(ActiveGroup::AllGroups),
            admin: self.admin,
            member_of,
            leader_of: self.leader_of,
            share: self.share,
            group_permissions: self.group_permissions,
            privileges: self.privileges.unwrap_or(AdminPrivileges::all()),
            sudoer: self.sudoer,
            event: self
                .event
                .unwrap_or_else(|| EventRef::new(0, "Internal")),
            umask: self.umask,
            read_only: self.read_only,
            graph_critical: self.graph_critical,
        }
    }
}
