use acl_security::{
    AccessScope, AdminPrivileges, EventContext, ScopeConstraint, ScopeFilter, SecuredRow,
    row_properties,
};

use super::SecurityFilter;
use crate::domain::model::EntityType;

/// Elevated write capability a light administrator may exercise.
///
/// Owner and group reassignment are not row filters; they require the
/// `CHOWN` and `CHGRP` privileges outright.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AdminAction {
    Write,
    Delete,
}

impl AdminAction {
    #[must_use]
    pub fn required_privilege(self) -> AdminPrivileges {
        match self {
            Self::Write => AdminPrivileges::WRITE_OWNED,
            Self::Delete => AdminPrivileges::DELETE_OWNED,
        }
    }
}

/// Trims an administrator's write bypass to what its privileges allow.
///
/// Without the privilege for `action`, the administrator keeps the bypass
/// only for rows owned by itself or by the real identity behind its sudo
/// session. Never grants read access; non-admin sessions are unaffected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LightAdminFilter {
    action: AdminAction,
}

impl LightAdminFilter {
    #[must_use]
    pub fn new(action: AdminAction) -> Self {
        Self { action }
    }

    fn unrestricted(&self, ctx: &EventContext) -> bool {
        !ctx.is_admin() || ctx.has_privilege(self.action.required_privilege())
    }

    fn owners(ctx: &EventContext) -> impl Iterator<Item = i64> {
        std::iter::once(ctx.user_id()).chain(ctx.sudoer())
    }
}

impl SecurityFilter for LightAdminFilter {
    fn name(&self) -> &'static str {
        "light_admin"
    }

    fn predicate(&self, ctx: &EventContext, _entity_type: &EntityType) -> AccessScope {
        if self.unrestricted(ctx) {
            return AccessScope::allow_all();
        }
        AccessScope::single(ScopeConstraint::new(vec![ScopeFilter::in_ids(
            row_properties::OWNER_ID,
            Self::owners(ctx),
        )]))
    }

    fn passes_filter(
        &self,
        _entity_type: &EntityType,
        row: &SecuredRow<'_>,
        ctx: &EventContext,
    ) -> bool {
        self.unrestricted(ctx) || Self::owners(ctx).any(|o| o == row.details.owner())
    }
}
