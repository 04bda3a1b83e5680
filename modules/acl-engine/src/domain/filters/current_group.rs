use acl_security::constants::{SYSTEM_GROUP_ID, USER_GROUP_ID, is_pseudo_group};
use acl_security::{
    AccessScope, EventContext, PermissionBits, ScopeConstraint, ScopeFilter, SecuredRow,
    row_properties,
};

use super::SecurityFilter;
use crate::domain::model::EntityType;

/// Single-group isolation: only rows of the pinned group are visible.
///
/// Within the group, everyone sees everything when the group's own
/// permissions grant group or world read, and admins and leaders always do.
/// Otherwise members see only their own rows. Rows in the system and user
/// pseudo-groups are visible unless a share is active. Nothing is visible
/// without a pinned group.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CurrentGroupFilter;

fn sees_whole_group(ctx: &EventContext, group: i64) -> bool {
    let readable = ctx.group_permissions().is_some_and(|p| {
        p.grants()
            .intersects(PermissionBits::GROUP_READ | PermissionBits::WORLD_READ)
    });
    readable || ctx.is_admin() || ctx.is_leader_of(group)
}

impl SecurityFilter for CurrentGroupFilter {
    fn name(&self) -> &'static str {
        "current_group"
    }

    fn predicate(&self, ctx: &EventContext, _entity_type: &EntityType) -> AccessScope {
        let Some(group) = ctx.group_id() else {
            return AccessScope::deny_all();
        };

        let mut in_group = vec![ScopeFilter::eq(row_properties::GROUP_ID, group)];
        if !sees_whole_group(ctx, group) {
            in_group.push(ScopeFilter::eq(row_properties::OWNER_ID, ctx.user_id()));
        }
        let scope = AccessScope::single(ScopeConstraint::new(in_group));

        if ctx.is_sharing() {
            scope
        } else {
            scope.union(AccessScope::single(ScopeConstraint::new(vec![
                ScopeFilter::in_ids(row_properties::GROUP_ID, [SYSTEM_GROUP_ID, USER_GROUP_ID]),
            ])))
        }
    }

    fn passes_filter(
        &self,
        _entity_type: &EntityType,
        row: &SecuredRow<'_>,
        ctx: &EventContext,
    ) -> bool {
        let Some(group) = ctx.group_id() else {
            return false;
        };
        let details = row.details;
        if !ctx.is_sharing() && is_pseudo_group(details.group()) {
            return true;
        }
        details.group() == group
            && (sees_whole_group(ctx, group) || details.owner() == ctx.user_id())
    }
}
