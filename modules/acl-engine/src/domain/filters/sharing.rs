use acl_security::{AccessScope, EventContext, SecuredRow};

use super::SecurityFilter;
use crate::domain::model::EntityType;

/// Restricts a sharing session to the share's allow-list.
///
/// Inactive without a share; admins bypass it; a disabled share hides
/// everything.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SharingFilter;

impl SecurityFilter for SharingFilter {
    fn name(&self) -> &'static str {
        "sharing"
    }

    fn predicate(&self, ctx: &EventContext, entity_type: &EntityType) -> AccessScope {
        let Some(share) = ctx.share() else {
            return AccessScope::allow_all();
        };
        if ctx.is_admin() {
            return AccessScope::allow_all();
        }
        if !share.enabled {
            return AccessScope::deny_all();
        }
        let ids: Vec<_> = share.allowed_ids(entity_type.name).collect();
        if ids.is_empty() {
            AccessScope::deny_all()
        } else {
            AccessScope::for_ids(ids)
        }
    }

    fn passes_filter(
        &self,
        entity_type: &EntityType,
        row: &SecuredRow<'_>,
        ctx: &EventContext,
    ) -> bool {
        let Some(share) = ctx.share() else {
            return true;
        };
        ctx.is_admin() || (share.enabled && share.allows(entity_type.name, row.id))
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;
    use acl_security::{Details, EventRef, Permissions, ShareData};
    use std::sync::Arc;

    const IMAGE: EntityType = EntityType::owned("Image");
    const DATASET: EntityType = EntityType::owned("Dataset");

    fn sharing_ctx(enabled: bool, admin: bool) -> EventContext {
        EventContext::builder()
            .user_id(5)
            .admin(admin)
            .share(Some(Arc::new(
                ShareData::new(3, enabled).allow(IMAGE.name, [7, 9]),
            )))
            .build()
    }

    #[test]
    fn only_allow_listed_ids_pass_regardless_of_permissions() {
        let ctx = sharing_ctx(true, false);
        for perms in [Permissions::PRIVATE, Permissions::PUBLIC_READ] {
            let d = Details::new(6, 10, Some(perms), EventRef::new(1, "User"));
            for id in 1..=10 {
                let row = SecuredRow::new(id, &d);
                let expected = id == 7 || id == 9;
                assert_eq!(SharingFilter.passes_filter(&IMAGE, &row, &ctx), expected, "id {id}");
                assert_eq!(SharingFilter.predicate(&ctx, &IMAGE).matches(&row), expected);
            }
        }
    }

    #[test]
    fn allow_list_is_per_type() {
        let ctx = sharing_ctx(true, false);
        let d = Details::new(6, 10, Some(Permissions::PUBLIC_READ), EventRef::new(1, "User"));
        let row = SecuredRow::new(7, &d);
        assert!(!SharingFilter.passes_filter(&DATASET, &row, &ctx));
        assert!(SharingFilter.predicate(&ctx, &DATASET).is_deny_all());
    }

    #[test]
    fn disabled_share_hides_everything_but_admin_bypasses() {
        let d = Details::new(6, 10, Some(Permissions::PUBLIC_READ), EventRef::new(1, "User"));
        let row = SecuredRow::new(7, &d);
        assert!(!SharingFilter.passes_filter(&IMAGE, &row, &sharing_ctx(false, false)));
        assert!(SharingFilter.passes_filter(&IMAGE, &row, &sharing_ctx(false, true)));
        assert!(SharingFilter.predicate(&sharing_ctx(true, true), &IMAGE).is_unconstrained());
    }
}
