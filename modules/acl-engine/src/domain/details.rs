//! Lifecycle of the security metadata attached to every governed row.
//!
//! Two entry points: [`DetailsLifecycle::new_transient_details`] for rows
//! being created and [`DetailsLifecycle::check_managed_details`] for rows
//! being re-stored. Stored [`Details`] are never modified; a change always
//! yields a fresh value.

use std::sync::Arc;

use acl_security::constants::USER_GROUP_ID;
use acl_security::{
    AdminPrivileges, Details, DetailsDraft, EventContext, ExternalInfo, GroupId, Permissions,
    UserId,
};
use tracing::{debug, instrument};

use crate::domain::error::SecurityError;
use crate::domain::model::{Entity, TypeClass};
use crate::domain::token::TokenHolder;

/// Outcome of reconciling submitted metadata against stored metadata.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ManagedDetails {
    /// Nothing changed: the stored instance itself, no write needed.
    Unchanged(Arc<Details>),
    /// A new instance replacing the stored one.
    Replaced(Arc<Details>),
}

impl ManagedDetails {
    #[must_use]
    pub fn details(&self) -> &Arc<Details> {
        match self {
            Self::Unchanged(d) | Self::Replaced(d) => d,
        }
    }

    #[must_use]
    pub fn is_changed(&self) -> bool {
        matches!(self, Self::Replaced(_))
    }

    #[must_use]
    pub fn into_details(self) -> Arc<Details> {
        match self {
            Self::Unchanged(d) | Self::Replaced(d) => d,
        }
    }
}

#[derive(Clone, Copy)]
pub struct DetailsLifecycle<'t> {
    tokens: &'t TokenHolder,
}

impl<'t> DetailsLifecycle<'t> {
    #[must_use]
    pub fn new(tokens: &'t TokenHolder) -> Self {
        Self { tokens }
    }

    /// Fresh metadata for a row that has never been stored.
    ///
    /// # Errors
    /// - `ApiUsage` without a pinned group
    /// - `ReadOnlyGroup` in a read-only session
    /// - `Violation` / `GroupViolation` for a foreign owner or group
    /// - `PermissionMismatch` for hard permissions that differ from the group's
    #[instrument(skip_all, fields(entity = %entity.label()))]
    pub fn new_transient_details(
        &self,
        ctx: &EventContext,
        entity: &Entity,
    ) -> Result<Details, SecurityError> {
        let privileged = self.tokens.has_privileged_token(entity);
        let Some(active_group) = ctx.group_id() else {
            return Err(SecurityError::api_usage(
                "rows cannot be created without an active group",
            ));
        };
        if ctx.is_read_only() && !privileged {
            return Err(SecurityError::read_only_group(format!(
                "cannot create {} in a read-only session",
                entity.entity_type
            )));
        }
        let submitted = &entity.details;

        let owner = match submitted.owner {
            Some(owner) if owner != ctx.user_id() => {
                if !(privileged || ctx.has_privilege(AdminPrivileges::CHOWN)) {
                    return Err(SecurityError::violation(format!(
                        "user {} cannot create rows owned by user {owner}",
                        ctx.user_id()
                    )));
                }
                owner
            }
            _ => ctx.user_id(),
        };

        let group = match submitted.group {
            Some(group) if group != active_group => {
                if !(privileged
                    || ctx.is_member_of(group)
                    || ctx.has_privilege(AdminPrivileges::CHGRP))
                {
                    return Err(SecurityError::group_violation(format!(
                        "user {} cannot create rows in group {group}",
                        ctx.user_id()
                    )));
                }
                group
            }
            _ => active_group,
        };

        let group_permissions = ctx.group_permissions().copied().ok_or_else(|| {
            SecurityError::internal(format!("active group {active_group} has no permissions"))
        })?;
        let permissions = match submitted.permissions {
            None => group_permissions,
            Some(requested) if requested.is_soft() => {
                let mut p = requested.without_soft();
                if let Some(umask) = ctx.umask() {
                    p = p.masked_by(*umask);
                }
                p.bounded_by(group_permissions)
            }
            Some(requested) => {
                if !(requested.same_rights(&group_permissions) || privileged || ctx.is_admin()) {
                    return Err(SecurityError::permission_mismatch(format!(
                        "requested permissions {requested} differ from group permissions {group_permissions}"
                    )));
                }
                requested
            }
        };

        debug!(owner, group, %permissions, "new details");
        Ok(
            Details::new(owner, group, Some(permissions), ctx.event().clone())
                .with_external_info(submitted.external_info.clone()),
        )
    }

    /// Reconcile submitted metadata against what is stored for the row.
    ///
    /// Returns the stored instance itself when nothing changed. Stale event
    /// ids are reported only after every policy check has passed.
    ///
    /// # Errors
    /// The first failing field rule; `OptimisticLock` only when every policy check passed.
    #[instrument(skip_all, fields(entity = %entity.label()))]
    pub fn check_managed_details(
        &self,
        ctx: &EventContext,
        entity: &Entity,
        previous: &Arc<Details>,
    ) -> Result<ManagedDetails, SecurityError> {
        if entity.entity_type.class == TypeClass::Owned && previous.permissions().is_none() {
            return Err(SecurityError::internal(format!(
                "governed row {} has no permissions",
                entity.label()
            )));
        }
        let privileged = self.tokens.has_privileged_token(entity);
        let submitted = &entity.details;

        let external = reconcile_external_info(entity, previous, submitted)?;
        let permissions = reconcile_permissions(ctx, entity, previous, submitted, privileged)?;
        let owner = reconcile_owner(ctx, entity, previous, submitted.owner, privileged)?;
        let group = reconcile_group(ctx, entity, previous, submitted.group, privileged)?;
        check_events(entity, previous, submitted)?;

        let changed = external.is_some()
            || permissions.is_some()
            || owner != previous.owner()
            || group != previous.group();
        if !changed {
            return Ok(ManagedDetails::Unchanged(Arc::clone(previous)));
        }

        let details = Details::new(
            owner,
            group,
            permissions.or(previous.permissions().copied()),
            previous.creation_event().clone(),
        )
        .with_external_info(external.or_else(|| previous.external_info().cloned()))
        .with_update_event(ctx.event().id);
        debug!(owner, group, "details replaced");
        Ok(ManagedDetails::Replaced(Arc::new(details)))
    }
}

/// `Some` when the permissions change.
fn reconcile_permissions(
    ctx: &EventContext,
    entity: &Entity,
    previous: &Details,
    submitted: &DetailsDraft,
    privileged: bool,
) -> Result<Option<Permissions>, SecurityError> {
    let Some(requested) = submitted.permissions else {
        return Ok(None);
    };
    let mut requested = requested.without_soft();

    let Some(prior) = previous.permissions().copied() else {
        // Unmanaged system row: only trusted callers attach a policy.
        if privileged || ctx.is_admin() {
            return Ok(Some(requested));
        }
        return Err(SecurityError::permission_mismatch(format!(
            "cannot attach permissions to {}",
            entity.label()
        )));
    };

    if prior.is_locked() {
        if !requested.read_grants().contains(prior.read_grants()) {
            return Err(SecurityError::violation(format!(
                "{} is locked: read grants of {prior} cannot be removed",
                entity.label()
            )));
        }
        requested = requested.locked();
    }
    if requested.identical(&prior) {
        return Ok(None);
    }

    let matches_group = ctx.group_id() == Some(previous.group())
        && ctx
            .group_permissions()
            .is_some_and(|g| g.same_rights(&requested));
    let supervisor = privileged
        || ctx.is_admin()
        || previous.owner() == ctx.user_id()
        || ctx.is_leader_of(previous.group());
    if !(matches_group || supervisor) {
        return Err(SecurityError::permission_mismatch(format!(
            "user {} cannot change permissions of {} from {prior} to {requested}",
            ctx.user_id(),
            entity.label()
        )));
    }
    Ok(Some(requested))
}

/// `Some` when external info is set for the first time.
fn reconcile_external_info(
    entity: &Entity,
    previous: &Details,
    submitted: &DetailsDraft,
) -> Result<Option<ExternalInfo>, SecurityError> {
    match (previous.external_info(), &submitted.external_info) {
        (Some(prior), Some(requested)) if prior != requested => Err(SecurityError::violation(
            format!("external info of {} cannot be changed", entity.label()),
        )),
        (None, Some(requested)) => Ok(Some(requested.clone())),
        _ => Ok(None),
    }
}

fn reconcile_owner(
    ctx: &EventContext,
    entity: &Entity,
    previous: &Details,
    submitted: Option<UserId>,
    privileged: bool,
) -> Result<UserId, SecurityError> {
    match submitted {
        Some(owner) if owner != previous.owner() => {
            if privileged || ctx.has_privilege(AdminPrivileges::CHOWN) {
                Ok(owner)
            } else {
                Err(SecurityError::violation(format!(
                    "user {} cannot change the owner of {}",
                    ctx.user_id(),
                    entity.label()
                )))
            }
        }
        _ => Ok(previous.owner()),
    }
}

fn reconcile_group(
    ctx: &EventContext,
    entity: &Entity,
    previous: &Details,
    submitted: Option<GroupId>,
    privileged: bool,
) -> Result<GroupId, SecurityError> {
    let group = match submitted {
        Some(group) if group != previous.group() => group,
        _ => return Ok(previous.group()),
    };
    let admin = ctx.has_privilege(AdminPrivileges::CHGRP);
    if !(privileged || admin || ctx.is_member_of(group)) {
        return Err(SecurityError::group_violation(format!(
            "user {} cannot move {} to group {group}",
            ctx.user_id(),
            entity.label()
        )));
    }
    if !(privileged || admin || previous.group() == USER_GROUP_ID || ctx.group_id() == Some(group))
    {
        return Err(SecurityError::group_violation(format!(
            "{} must stay in the active group",
            entity.label()
        )));
    }
    Ok(group)
}

fn check_events(
    entity: &Entity,
    previous: &Details,
    submitted: &DetailsDraft,
) -> Result<(), SecurityError> {
    if let Some(creation) = submitted.creation_event
        && creation != previous.creation_event().id
    {
        return Err(SecurityError::optimistic_lock(format!(
            "creation event of {} is {}, not {creation}",
            entity.label(),
            previous.creation_event().id
        )));
    }
    if let Some(update) = submitted.update_event
        && update != previous.update_event()
    {
        return Err(SecurityError::optimistic_lock(format!(
            "{} was updated by event {} since event {update}",
            entity.label(),
            previous.update_event()
        )));
    }
    Ok(())
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;
    use crate::domain::model::EntityType;
    use acl_security::{EventRef, PermissionBits, Right, Role};

    const IMAGE: EntityType = EntityType::owned("Image");

    fn member_ctx(group_perms: Permissions) -> EventContext {
        EventContext::builder()
            .user_id(5)
            .group(10, group_perms)
            .member_of([10, 11])
            .event(EventRef::new(50, "User"))
            .build()
    }

    fn stored(owner: UserId, perms: Permissions) -> Arc<Details> {
        Arc::new(
            Details::new(owner, 10, Some(perms), EventRef::new(20, "User")).with_update_event(30),
        )
    }

    fn submit(draft: DetailsDraft) -> Entity {
        Entity::persisted(IMAGE, 1).with_details(draft)
    }

    mod new_entity {
        use super::*;

        #[test]
        fn defaults_come_from_context() {
            let tokens = TokenHolder::new();
            let d = DetailsLifecycle::new(&tokens)
                .new_transient_details(&member_ctx(Permissions::READ_ONLY), &Entity::new(IMAGE))
                .unwrap();
            assert_eq!(d.owner(), 5);
            assert_eq!(d.group(), 10);
            assert_eq!(d.permissions(), Some(&Permissions::READ_ONLY));
            assert_eq!(d.creation_event().id, 50);
            assert_eq!(d.update_event(), 50);
        }

        #[test]
        fn foreign_owner_needs_chown() {
            let tokens = TokenHolder::new();
            let lifecycle = DetailsLifecycle::new(&tokens);
            let e = Entity::new(IMAGE).with_details(DetailsDraft::new().owner(6));

            let err = lifecycle
                .new_transient_details(&member_ctx(Permissions::PRIVATE), &e)
                .unwrap_err();
            assert!(matches!(err, SecurityError::Violation(_)));

            let admin = EventContext::builder()
                .user_id(5)
                .admin(true)
                .group(10, Permissions::PRIVATE)
                .build();
            assert_eq!(lifecycle.new_transient_details(&admin, &e).unwrap().owner(), 6);
        }

        #[test]
        fn other_group_needs_membership() {
            let tokens = TokenHolder::new();
            let lifecycle = DetailsLifecycle::new(&tokens);
            let ctx = member_ctx(Permissions::PRIVATE);

            let ok = Entity::new(IMAGE).with_details(DetailsDraft::new().group(11));
            assert_eq!(lifecycle.new_transient_details(&ctx, &ok).unwrap().group(), 11);

            let bad = Entity::new(IMAGE).with_details(DetailsDraft::new().group(12));
            let err = lifecycle.new_transient_details(&ctx, &bad).unwrap_err();
            assert!(err.is_security_violation());
        }

        #[test]
        fn soft_request_is_umasked_and_bounded() {
            let tokens = TokenHolder::new();
            let ctx = EventContext::builder()
                .user_id(5)
                .group(10, Permissions::READ_WRITE)
                .umask(Some("---w--".parse().unwrap()))
                .build();
            let e = Entity::new(IMAGE)
                .with_details(DetailsDraft::new().permissions(Permissions::PUBLIC_READ.soft()));
            let p = *DetailsLifecycle::new(&tokens)
                .new_transient_details(&ctx, &e)
                .unwrap()
                .permissions()
                .unwrap();
            assert!(!p.is_soft());
            assert_eq!(p.to_string(), "rwr---");
        }

        #[test]
        fn hard_request_must_match_group() {
            let tokens = TokenHolder::new();
            let lifecycle = DetailsLifecycle::new(&tokens);
            let ctx = member_ctx(Permissions::READ_ONLY);

            let e = Entity::new(IMAGE)
                .with_details(DetailsDraft::new().permissions(Permissions::PUBLIC_READ));
            let err = lifecycle.new_transient_details(&ctx, &e).unwrap_err();
            assert!(matches!(err, SecurityError::PermissionMismatch(_)));

            let locked = Entity::new(IMAGE)
                .with_details(DetailsDraft::new().permissions(Permissions::READ_ONLY.locked()));
            let p = *lifecycle
                .new_transient_details(&ctx, &locked)
                .unwrap()
                .permissions()
                .unwrap();
            assert!(p.is_locked());
        }

        #[test]
        fn all_groups_and_read_only_sessions_cannot_create() {
            let tokens = TokenHolder::new();
            let lifecycle = DetailsLifecycle::new(&tokens);
            let all = EventContext::builder().user_id(5).build();
            assert!(matches!(
                lifecycle.new_transient_details(&all, &Entity::new(IMAGE)),
                Err(SecurityError::ApiUsage(_))
            ));

            let ro = EventContext::builder()
                .user_id(5)
                .group(10, Permissions::READ_WRITE)
                .read_only(true)
                .build();
            assert!(matches!(
                lifecycle.new_transient_details(&ro, &Entity::new(IMAGE)),
                Err(SecurityError::ReadOnlyGroup(_))
            ));
        }

        #[test]
        fn token_allows_foreign_owner() {
            let tokens = TokenHolder::new();
            let mut e = Entity::new(IMAGE).with_details(DetailsDraft::new().owner(6).group(99));
            let guard = tokens.privileged(&mut e);
            let d = DetailsLifecycle::new(&tokens)
                .new_transient_details(&member_ctx(Permissions::PRIVATE), &guard)
                .unwrap();
            assert_eq!((d.owner(), d.group()), (6, 99));
        }
    }

    mod existing_entity {
        use super::*;

        #[test]
        fn unchanged_submission_returns_stored_instance() {
            let tokens = TokenHolder::new();
            let lifecycle = DetailsLifecycle::new(&tokens);
            let ctx = member_ctx(Permissions::READ_ONLY);
            let prev = stored(6, Permissions::READ_ONLY);

            for draft in [DetailsDraft::new(), prev.to_draft()] {
                let e = submit(draft);
                for _ in 0..2 {
                    let out = lifecycle.check_managed_details(&ctx, &e, &prev).unwrap();
                    assert!(!out.is_changed());
                    assert!(Arc::ptr_eq(out.details(), &prev));
                }
            }
        }

        #[test]
        fn owner_can_change_permissions_and_update_event_moves() {
            let tokens = TokenHolder::new();
            let prev = stored(5, Permissions::PRIVATE);
            let e = submit(prev.to_draft().permissions(Permissions::READ_ONLY));
            let out = DetailsLifecycle::new(&tokens)
                .check_managed_details(&member_ctx(Permissions::PRIVATE), &e, &prev)
                .unwrap();
            assert!(out.is_changed());
            assert_eq!(out.details().permissions(), Some(&Permissions::READ_ONLY));
            assert_eq!(out.details().update_event(), 50);
            assert_eq!(out.details().creation_event().id, 20);
        }

        #[test]
        fn non_owner_permission_change_must_match_group() {
            let tokens = TokenHolder::new();
            let lifecycle = DetailsLifecycle::new(&tokens);
            let prev = stored(6, Permissions::PRIVATE);

            let e = submit(DetailsDraft::new().permissions(Permissions::PUBLIC_READ));
            let err = lifecycle
                .check_managed_details(&member_ctx(Permissions::READ_ONLY), &e, &prev)
                .unwrap_err();
            assert!(matches!(err, SecurityError::PermissionMismatch(_)));

            let e = submit(DetailsDraft::new().permissions(Permissions::READ_ONLY));
            let out = lifecycle
                .check_managed_details(&member_ctx(Permissions::READ_ONLY), &e, &prev)
                .unwrap();
            assert!(out.is_changed());
        }

        #[test]
        fn locked_read_grants_cannot_be_removed() {
            let tokens = TokenHolder::new();
            let lifecycle = DetailsLifecycle::new(&tokens);
            let prev = stored(5, Permissions::READ_ONLY.locked());

            let e = submit(DetailsDraft::new().permissions(Permissions::PRIVATE.locked()));
            let err = lifecycle
                .check_managed_details(&member_ctx(Permissions::READ_ONLY), &e, &prev)
                .unwrap_err();
            assert!(matches!(err, SecurityError::Violation(_)));
        }

        #[test]
        fn lock_survives_an_unlocking_request() {
            let tokens = TokenHolder::new();
            let prev = stored(5, Permissions::READ_ONLY.locked());
            let wider = Permissions::READ_ONLY.grant(Role::World, Right::Read);
            let e = submit(DetailsDraft::new().permissions(wider));
            let out = DetailsLifecycle::new(&tokens)
                .check_managed_details(&member_ctx(Permissions::READ_ONLY), &e, &prev)
                .unwrap();
            let p = out.details().permissions().unwrap();
            assert!(p.is_locked());
            assert!(p.bits().contains(PermissionBits::WORLD_READ));

            let same = submit(DetailsDraft::new().permissions(Permissions::READ_ONLY));
            let out = DetailsLifecycle::new(&tokens)
                .check_managed_details(&member_ctx(Permissions::READ_ONLY), &same, &prev)
                .unwrap();
            assert!(!out.is_changed(), "dropping only the lock flag is a no-op");
        }

        #[test]
        fn ownership_is_immutable_for_plain_members() {
            let tokens = TokenHolder::new();
            let lifecycle = DetailsLifecycle::new(&tokens);
            let ctx = member_ctx(Permissions::READ_WRITE);
            let prev = stored(5, Permissions::READ_WRITE);

            let err = lifecycle
                .check_managed_details(&ctx, &submit(DetailsDraft::new().owner(6)), &prev)
                .unwrap_err();
            assert!(err.is_security_violation());

            let err = lifecycle
                .check_managed_details(&ctx, &submit(DetailsDraft::new().group(12)), &prev)
                .unwrap_err();
            assert!(err.is_security_violation());

            let err = lifecycle
                .check_managed_details(&ctx, &submit(DetailsDraft::new().group(11)), &prev)
                .unwrap_err();
            assert!(
                matches!(err, SecurityError::GroupViolation(_)),
                "member destination outside the active group: {err}"
            );
        }

        #[test]
        fn admin_with_chown_and_chgrp_may_reassign() {
            let tokens = TokenHolder::new();
            let admin = EventContext::builder()
                .user_id(1)
                .admin(true)
                .group(10, Permissions::READ_ONLY)
                .event(EventRef::new(60, "User"))
                .build();
            let prev = stored(5, Permissions::READ_ONLY);
            let e = submit(DetailsDraft::new().owner(6).group(12));
            let out = DetailsLifecycle::new(&tokens)
                .check_managed_details(&admin, &e, &prev)
                .unwrap();
            assert_eq!((out.details().owner(), out.details().group()), (6, 12));
        }

        #[test]
        fn reassignment_privileges_do_not_fall_back_to_own_rows() {
            let tokens = TokenHolder::new();
            let light = EventContext::builder()
                .user_id(5)
                .admin(true)
                .privileges(AdminPrivileges::all() - AdminPrivileges::CHOWN - AdminPrivileges::CHGRP)
                .group(10, Permissions::READ_ONLY)
                .event(EventRef::new(60, "User"))
                .build();
            let lifecycle = DetailsLifecycle::new(&tokens);
            let own = stored(5, Permissions::READ_ONLY);

            let err = lifecycle
                .check_managed_details(&light, &submit(DetailsDraft::new().owner(6)), &own)
                .unwrap_err();
            assert!(err.is_security_violation(), "{err}");
            let err = lifecycle
                .check_managed_details(&light, &submit(DetailsDraft::new().group(12)), &own)
                .unwrap_err();
            assert!(err.is_security_violation(), "{err}");
        }

        #[test]
        fn external_info_is_set_once() {
            let tokens = TokenHolder::new();
            let lifecycle = DetailsLifecycle::new(&tokens);
            let ctx = member_ctx(Permissions::READ_ONLY);
            let info = ExternalInfo {
                entity_type: "Import".to_owned(),
                entity_id: 3,
                lsid: None,
            };
            let prev = stored(5, Permissions::READ_ONLY);
            let out = lifecycle
                .check_managed_details(
                    &ctx,
                    &submit(DetailsDraft::new().external_info(info.clone())),
                    &prev,
                )
                .unwrap();
            let with_info = out.into_details();
            assert_eq!(with_info.external_info(), Some(&info));

            let other = ExternalInfo {
                entity_id: 4,
                ..info
            };
            let err = lifecycle
                .check_managed_details(
                    &ctx,
                    &submit(DetailsDraft::new().external_info(other)),
                    &with_info,
                )
                .unwrap_err();
            assert!(matches!(err, SecurityError::Violation(_)));
        }

        #[test]
        fn stale_event_is_optimistic_lock_after_policy_checks() {
            let tokens = TokenHolder::new();
            let lifecycle = DetailsLifecycle::new(&tokens);
            let ctx = member_ctx(Permissions::READ_ONLY);
            let prev = stored(5, Permissions::READ_ONLY);

            let mut stale = prev.to_draft();
            stale.update_event = Some(29);
            let err = lifecycle
                .check_managed_details(&ctx, &submit(stale.clone()), &prev)
                .unwrap_err();
            assert!(matches!(err, SecurityError::OptimisticLock(_)));

            stale.owner = Some(6);
            let err = lifecycle
                .check_managed_details(&ctx, &submit(stale), &prev)
                .unwrap_err();
            assert!(matches!(err, SecurityError::Violation(_)), "policy first: {err}");
        }

        #[test]
        fn governed_row_without_permissions_is_internal() {
            let tokens = TokenHolder::new();
            let prev = Arc::new(Details::new(5, 10, None, EventRef::new(1, "User")));
            let err = DetailsLifecycle::new(&tokens)
                .check_managed_details(
                    &member_ctx(Permissions::READ_ONLY),
                    &submit(DetailsDraft::new()),
                    &prev,
                )
                .unwrap_err();
            assert!(matches!(err, SecurityError::Internal(_)));
        }

        #[test]
        fn user_group_rows_may_leave_for_a_member_group() {
            let tokens = TokenHolder::new();
            let prev = Arc::new(Details::new(
                5,
                USER_GROUP_ID,
                Some(Permissions::READ_ONLY),
                EventRef::new(1, "User"),
            ));
            let out = DetailsLifecycle::new(&tokens)
                .check_managed_details(
                    &member_ctx(Permissions::READ_ONLY),
                    &submit(DetailsDraft::new().group(11)),
                    &prev,
                )
                .unwrap();
            assert_eq!(out.details().group(), 11);
        }
    }

    mod properties {
        use super::*;
        use proptest::prelude::*;

        fn arb_permissions() -> impl Strategy<Value = Permissions> {
            any::<u32>()
                .prop_map(|raw| Permissions::from_bits(PermissionBits::from_bits_truncate(raw)))
        }

        fn arb_ctx() -> impl Strategy<Value = EventContext> {
            (
                0i64..6,
                0i64..6,
                arb_permissions(),
                any::<bool>(),
                prop::collection::btree_set(0i64..6, 0..4),
                prop::collection::btree_set(0i64..6, 0..2),
                any::<u32>(),
                any::<bool>(),
            )
                .prop_map(
                    |(user, group, perms, admin, member_of, leader_of, privileges, read_only)| {
                        EventContext::builder()
                            .user_id(user)
                            .group(group, perms)
                            .admin(admin)
                            .member_of(member_of)
                            .leader_of(leader_of)
                            .privileges(AdminPrivileges::from_bits_truncate(privileges))
                            .read_only(read_only)
                            .event(EventRef::new(50, "User"))
                            .build()
                    },
                )
        }

        fn plain_ctx() -> impl Strategy<Value = EventContext> {
            arb_ctx().prop_filter("non-admin", |ctx| !ctx.is_admin())
        }

        fn stored_in(owner: UserId, group: GroupId, perms: Permissions) -> Arc<Details> {
            Arc::new(Details::new(owner, group, Some(perms), EventRef::new(20, "User")))
        }

        proptest! {
            #![proptest_config(ProptestConfig::with_cases(256))]

            #[test]
            fn locked_read_grants_survive_every_reconciliation(
                ctx in arb_ctx(),
                prior in arb_permissions(),
                requested in arb_permissions(),
                owner in 0i64..6,
                group in 0i64..6,
            ) {
                let tokens = TokenHolder::new();
                let prior = prior.without_soft().locked();
                let prev = stored_in(owner, group, prior);
                let e = submit(DetailsDraft::new().permissions(requested));

                let out = DetailsLifecycle::new(&tokens).check_managed_details(&ctx, &e, &prev);
                if requested.read_grants().contains(prior.read_grants()) {
                    if let Ok(out) = out {
                        let p = out.details().permissions().copied().unwrap();
                        prop_assert!(p.is_locked());
                        prop_assert!(p.read_grants().contains(prior.read_grants()));
                    }
                } else {
                    prop_assert!(matches!(out, Err(SecurityError::Violation(_))));
                }
            }

            #[test]
            fn plain_members_never_change_the_owner(
                ctx in plain_ctx(),
                owner in 0i64..6,
                requested in 0i64..6,
                perms in arb_permissions(),
            ) {
                let tokens = TokenHolder::new();
                let lifecycle = DetailsLifecycle::new(&tokens);
                let draft = DetailsDraft::new().owner(requested);

                if requested != owner {
                    let prev = stored_in(owner, 10, perms.without_soft());
                    let err = lifecycle
                        .check_managed_details(&ctx, &submit(draft.clone()), &prev)
                        .unwrap_err();
                    prop_assert!(err.is_security_violation(), "{err:?}");
                }
                if requested != ctx.user_id() {
                    let err = lifecycle
                        .new_transient_details(&ctx, &Entity::new(IMAGE).with_details(draft))
                        .unwrap_err();
                    prop_assert!(err.is_security_violation(), "{err:?}");
                }
            }

            #[test]
            fn plain_members_never_move_rows_to_foreign_groups(
                ctx in plain_ctx(),
                owner in 0i64..6,
                stored_group in 0i64..6,
                requested in 0i64..8,
            ) {
                prop_assume!(!ctx.is_member_of(requested));
                let tokens = TokenHolder::new();
                let lifecycle = DetailsLifecycle::new(&tokens);
                let draft = DetailsDraft::new().group(requested);

                if requested != stored_group {
                    let prev = stored_in(owner, stored_group, Permissions::READ_WRITE);
                    let err = lifecycle
                        .check_managed_details(&ctx, &submit(draft.clone()), &prev)
                        .unwrap_err();
                    prop_assert!(err.is_security_violation(), "{err:?}");
                }
                if Some(requested) != ctx.group_id() {
                    let err = lifecycle
                        .new_transient_details(&ctx, &Entity::new(IMAGE).with_details(draft))
                        .unwrap_err();
                    prop_assert!(err.is_security_violation(), "{err:?}");
                }
            }
        }
    }
}
