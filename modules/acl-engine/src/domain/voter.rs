//! Write-time authorization.
//!
//! Each `allow_*` answers yes/no; the matching `*_violation` builds the typed
//! error for a caller that proceeds after a "no", and `check_*` combines both.

use acl_security::{Details, EventContext, PermissionBits, SecuredRow};
use tracing::debug;

use crate::domain::error::SecurityError;
use crate::domain::filters::{AdminAction, LightAdminFilter, ReadFilter, SecurityFilter};
use crate::domain::model::{Entity, EntityType};
use crate::domain::token::TokenHolder;

#[derive(Clone, Copy)]
pub struct AclVoter<'t> {
    tokens: &'t TokenHolder,
}

impl<'t> AclVoter<'t> {
    #[must_use]
    pub fn new(tokens: &'t TokenHolder) -> Self {
        Self { tokens }
    }

    /// Same decision the session's read filter makes for this row.
    #[must_use]
    pub fn allow_load(
        &self,
        ctx: &EventContext,
        entity_type: &EntityType,
        row: &SecuredRow<'_>,
    ) -> bool {
        ReadFilter::for_context(ctx).passes_filter(entity_type, row, ctx)
    }

    #[must_use]
    pub fn allow_creation(&self, ctx: &EventContext, entity: &Entity) -> bool {
        if self.tokens.has_privileged_token(entity) || ctx.is_admin() {
            return true;
        }
        !entity.entity_type.is_system() && !ctx.is_read_only()
    }

    #[must_use]
    pub fn allow_update(&self, ctx: &EventContext, entity: &Entity, trusted: &Details) -> bool {
        self.allow_write(ctx, entity, trusted, AdminAction::Write)
    }

    #[must_use]
    pub fn allow_delete(&self, ctx: &EventContext, entity: &Entity, trusted: &Details) -> bool {
        self.allow_write(ctx, entity, trusted, AdminAction::Delete)
    }

    fn allow_write(
        &self,
        ctx: &EventContext,
        entity: &Entity,
        trusted: &Details,
        action: AdminAction,
    ) -> bool {
        if self.tokens.has_privileged_token(entity) {
            return true;
        }
        let row = SecuredRow::new(entity.id.unwrap_or_default(), trusted);
        if ctx.is_admin()
            && LightAdminFilter::new(action).passes_filter(&entity.entity_type, &row, ctx)
        {
            return true;
        }
        if entity.entity_type.is_system() || ctx.is_read_only() {
            return false;
        }
        if ctx.is_leader_of(trusted.group()) {
            return true;
        }
        // Rows without any policy are always writable.
        let Some(permissions) = trusted.permissions() else {
            return true;
        };
        let bits = permissions.bits();
        bits.contains(PermissionBits::WORLD_WRITE)
            || (bits.contains(PermissionBits::USER_WRITE) && trusted.owner() == ctx.user_id())
            || (bits.contains(PermissionBits::GROUP_WRITE) && ctx.is_member_of(trusted.group()))
    }

    #[allow(clippy::unused_self)] // paired with allow_load for callers holding a voter
    #[must_use]
    pub fn load_violation(
        &self,
        ctx: &EventContext,
        entity_type: &EntityType,
        row: &SecuredRow<'_>,
    ) -> SecurityError {
        SecurityError::violation(format!(
            "{entity_type}:{} is not readable by user {}",
            row.id,
            ctx.user_id()
        ))
    }

    #[allow(clippy::unused_self)] // paired with allow_creation for callers holding a voter
    #[must_use]
    pub fn creation_violation(&self, ctx: &EventContext, entity: &Entity) -> SecurityError {
        if ctx.is_read_only() {
            return SecurityError::read_only_group(format!(
                "cannot create {} in a read-only session",
                entity.entity_type
            ));
        }
        SecurityError::violation(format!(
            "creation of {} is not permitted for user {}",
            entity.entity_type,
            ctx.user_id()
        ))
    }

    #[must_use]
    pub fn update_violation(
        &self,
        ctx: &EventContext,
        entity: &Entity,
        _trusted: &Details,
    ) -> SecurityError {
        self.write_violation(ctx, entity, "update")
    }

    #[must_use]
    pub fn delete_violation(
        &self,
        ctx: &EventContext,
        entity: &Entity,
        _trusted: &Details,
    ) -> SecurityError {
        self.write_violation(ctx, entity, "deletion")
    }

    #[allow(clippy::unused_self)]
    fn write_violation(&self, ctx: &EventContext, entity: &Entity, what: &str) -> SecurityError {
        if ctx.is_read_only() && !entity.entity_type.is_system() {
            return SecurityError::read_only_group(format!(
                "{what} of {} is not possible in a read-only session",
                entity.label()
            ));
        }
        SecurityError::violation(format!(
            "{what} of {} is not permitted for user {}",
            entity.label(),
            ctx.user_id()
        ))
    }

    /// # Errors
    /// The load violation when the row is not visible.
    pub fn check_load(
        &self,
        ctx: &EventContext,
        entity_type: &EntityType,
        row: &SecuredRow<'_>,
    ) -> Result<(), SecurityError> {
        if self.allow_load(ctx, entity_type, row) {
            Ok(())
        } else {
            Err(self.load_violation(ctx, entity_type, row))
        }
    }

    /// # Errors
    /// The creation violation when creation is denied.
    pub fn check_creation(&self, ctx: &EventContext, entity: &Entity) -> Result<(), SecurityError> {
        if self.allow_creation(ctx, entity) {
            return Ok(());
        }
        debug!(entity = %entity.label(), "creation denied");
        Err(self.creation_violation(ctx, entity))
    }

    /// # Errors
    /// The update violation when the update is denied.
    pub fn check_update(
        &self,
        ctx: &EventContext,
        entity: &Entity,
        trusted: &Details,
    ) -> Result<(), SecurityError> {
        if self.allow_update(ctx, entity, trusted) {
            return Ok(());
        }
        debug!(entity = %entity.label(), "update denied");
        Err(self.update_violation(ctx, entity, trusted))
    }

    /// # Errors
    /// The deletion violation when deletion is denied.
    pub fn check_delete(
        &self,
        ctx: &EventContext,
        entity: &Entity,
        trusted: &Details,
    ) -> Result<(), SecurityError> {
        if self.allow_delete(ctx, entity, trusted) {
            return Ok(());
        }
        debug!(entity = %entity.label(), "delete denied");
        Err(self.delete_violation(ctx, entity, trusted))
    }
}
