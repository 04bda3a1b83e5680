//! Cross-entity consistency at save time.
//!
//! A written row may only reference rows of the active group. Referencing
//! another user's row additionally needs write access to the group, and is
//! never allowed for graph-critical sessions.

use acl_security::constants::is_pseudo_group;
use acl_security::{Details, EventContext, Right, Role};

use crate::domain::error::SecurityError;
use crate::domain::model::{Entity, NodeId};
use crate::domain::reattach::AttachedGraph;
use crate::domain::token::TokenHolder;

#[derive(Clone, Copy)]
pub struct LinkageValidator<'t> {
    tokens: &'t TokenHolder,
}

impl<'t> LinkageValidator<'t> {
    #[must_use]
    pub fn new(tokens: &'t TokenHolder) -> Self {
        Self { tokens }
    }

    /// Check every direct reference of `node`.
    ///
    /// # Errors
    /// `GroupViolation`, `ReadOnlyGroup` or `Violation` for the first forbidden link.
    pub fn validate(
        &self,
        ctx: &EventContext,
        graph: &AttachedGraph,
        node: NodeId,
    ) -> Result<(), SecurityError> {
        let Some(source) = graph.entity(node) else {
            return Err(SecurityError::internal(format!("node {} is not in the graph", node.0)));
        };
        if self.tokens.has_privileged_token(source) {
            return Ok(());
        }
        for &target_id in &source.references {
            let (Some(target), Some(attachment)) =
                (graph.entity(target_id), graph.attachment(target_id))
            else {
                return Err(SecurityError::api_usage(format!(
                    "{} references node {} outside the graph",
                    source.label(),
                    target_id.0
                )));
            };
            check_link(ctx, source, target, attachment.trusted_details())?;
        }
        Ok(())
    }
}

fn check_link(
    ctx: &EventContext,
    source: &Entity,
    target: &Entity,
    details: &Details,
) -> Result<(), SecurityError> {
    if target.entity_type.is_system() || is_pseudo_group(details.group()) {
        return Ok(());
    }
    if ctx.group_id() != Some(details.group()) {
        return Err(SecurityError::group_violation(format!(
            "{} cannot reference {} of group {}",
            source.label(),
            target.label(),
            details.group()
        )));
    }
    if details.owner() == ctx.user_id() {
        return Ok(());
    }
    if ctx.is_graph_critical() {
        return Err(SecurityError::violation(format!(
            "graph-critical session cannot link {} owned by user {}",
            target.label(),
            details.owner()
        )));
    }
    let role = if ctx.is_member_of(details.group()) {
        Role::Group
    } else {
        Role::World
    };
    let writable = ctx
        .group_permissions()
        .is_some_and(|p| p.is_granted(role, Right::Write));
    if writable || ctx.is_admin() || ctx.is_leader_of(details.group()) {
        Ok(())
    } else {
        Err(SecurityError::read_only_group(format!(
            "group {} does not allow linking to {} owned by user {}",
            details.group(),
            target.label(),
            details.owner()
        )))
    }
}
