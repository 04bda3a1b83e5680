//! Read-time security filters.
//!
//! Every filter states its rule twice: as an [`AccessScope`] predicate that
//! storage pushes into bulk queries, and as a procedural check for single
//! rows. The two must agree on every row; `agreement_tests` checks that
//! with generated inputs.
//!
//! Filters never fail. A row that does not pass is simply not returned.

mod all_groups;
mod current_group;
mod light_admin;
mod sharing;


use acl_security::{AccessScope, EventContext, SecuredRow};

use crate::domain::model::EntityType;

pub use all_groups::AllGroupsFilter;
pub use current_group::CurrentGroupFilter;
pub use light_admin::{AdminAction, LightAdminFilter};
pub use sharing::SharingFilter;

/// Contract shared by every filter variant.
pub trait SecurityFilter {
    fn name(&self) -> &'static str;

    /// Declarative form, for bulk reads.
    fn predicate(&self, ctx: &EventContext, entity_type: &EntityType) -> AccessScope;

    /// Procedural form, for single rows.
    fn passes_filter(
        &self,
        entity_type: &EntityType,
        row: &SecuredRow<'_>,
        ctx: &EventContext,
    ) -> bool;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SessionFilter {
    CurrentGroup(CurrentGroupFilter),
    AllGroups(AllGroupsFilter),
    Sharing(SharingFilter),
}

/// The read filter of a session, selected by its mode.
///
/// An active share decides visibility on its own, whether or not a group
/// is pinned. Otherwise a pinned group selects the current-group filter and
/// an all-groups session the all-groups filter. Engine-reserved types are
/// always visible.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReadFilter {
    selected: SessionFilter,
}

impl ReadFilter {
    #[must_use]
    pub fn for_context(ctx: &EventContext) -> Self {
        let selected = if ctx.is_sharing() {
            SessionFilter::Sharing(SharingFilter)
        } else if ctx.group_id().is_some() {
            SessionFilter::CurrentGroup(CurrentGroupFilter)
        } else {
            SessionFilter::AllGroups(AllGroupsFilter)
        };
        Self { selected }
    }

    fn selected(&self) -> &dyn SecurityFilter {
        match &self.selected {
            SessionFilter::CurrentGroup(f) => f,
            SessionFilter::AllGroups(f) => f,
            SessionFilter::Sharing(f) => f,
        }
    }
}

impl SecurityFilter for ReadFilter {
    fn name(&self) -> &'static str {
        self.selected().name()
    }

    fn predicate(&self, ctx: &EventContext, entity_type: &EntityType) -> AccessScope {
        if entity_type.is_system() {
            return AccessScope::allow_all();
        }
        self.selected().predicate(ctx, entity_type)
    }

    fn passes_filter(
        &self,
        entity_type: &EntityType,
        row: &SecuredRow<'_>,
        ctx: &EventContext,
    ) -> bool {
        if entity_type.is_system() {
            return true;
        }
        self.selected().passes_filter(entity_type, row, ctx)
    }
}
