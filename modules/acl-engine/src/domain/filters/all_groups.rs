use acl_security::{
    AccessScope, EventContext, PermissionBits, ScopeConstraint, ScopeFilter, SecuredRow,
    row_properties,
};

use super::SecurityFilter;
use crate::domain::model::EntityType;

/// Visibility across every group the principal can see, for sessions
/// without a pinned group. Unlike the current-group filter this one reads
/// the row's own permission bits.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AllGroupsFilter;

fn bits(flag: PermissionBits) -> i64 {
    i64::from(flag.bits())
}

fn has_bit(row: &SecuredRow<'_>, flag: PermissionBits) -> bool {
    row.details
        .permissions()
        .is_some_and(|p| p.bits().contains(flag))
}

impl SecurityFilter for AllGroupsFilter {
    fn name(&self) -> &'static str {
        "all_groups"
    }

    fn predicate(&self, ctx: &EventContext, _entity_type: &EntityType) -> AccessScope {
        if ctx.is_sharing() || ctx.is_admin() {
            return AccessScope::allow_all();
        }

        let mut paths = vec![
            ScopeConstraint::new(vec![ScopeFilter::has_bits(
                row_properties::PERMISSIONS,
                bits(PermissionBits::WORLD_READ),
            )]),
            ScopeConstraint::new(vec![
                ScopeFilter::eq(row_properties::OWNER_ID, ctx.user_id()),
                ScopeFilter::has_bits(row_properties::PERMISSIONS, bits(PermissionBits::USER_READ)),
            ]),
        ];
        if !ctx.member_of().is_empty() {
            paths.push(ScopeConstraint::new(vec![
                ScopeFilter::in_ids(row_properties::GROUP_ID, ctx.member_of().iter().copied()),
                ScopeFilter::has_bits(
                    row_properties::PERMISSIONS,
                    bits(PermissionBits::GROUP_READ),
                ),
            ]));
        }
        if !ctx.leader_of().is_empty() {
            paths.push(ScopeConstraint::new(vec![ScopeFilter::in_ids(
                row_properties::GROUP_ID,
                ctx.leader_of().iter().copied(),
            )]));
        }
        AccessScope::from_constraints(paths)
    }

    fn passes_filter(
        &self,
        _entity_type: &EntityType,
        row: &SecuredRow<'_>,
        ctx: &EventContext,
    ) -> bool {
        let details = row.details;
        ctx.is_sharing()
            || ctx.is_admin()
            || has_bit(row, PermissionBits::WORLD_READ)
            || (details.owner() == ctx.user_id() && has_bit(row, PermissionBits::USER_READ))
            || (ctx.is_member_of(details.group()) && has_bit(row, PermissionBits::GROUP_READ))
            || ctx.is_leader_of(details.group())
    }
}
