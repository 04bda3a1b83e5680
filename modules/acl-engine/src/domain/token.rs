//! Privileged token: an identity-compared marker for system-authored writes.
//!
//! The token cannot be constructed, cloned or serialized outside this
//! module. An entity carries a [`PrivilegeMark`] pointing at one engine's
//! token; a mark only counts when it points at *this* holder's token.

use std::ops::{Deref, DerefMut};
use std::sync::Arc;

use crate::domain::model::Entity;

#[derive(Debug)]
struct Token {
    _sealed: (),
}

/// Handle to a token, stored on an entity. Not `Clone`.
#[derive(Debug)]
pub struct PrivilegeMark(Arc<Token>);

/// Owner of one engine's token.
#[derive(Debug)]
pub struct TokenHolder {
    token: Arc<Token>,
}

impl TokenHolder {
    pub(crate) fn new() -> Self {
        Self {
            token: Arc::new(Token { _sealed: () }),
        }
    }

    fn mark(&self) -> PrivilegeMark {
        PrivilegeMark(Arc::clone(&self.token))
    }

    pub fn set_token(&self, entity: &mut Entity) {
        entity.privilege = Some(self.mark());
    }

    pub fn clear_token(&self, entity: &mut Entity) {
        entity.privilege = None;
    }

    /// Whether `entity` carries this holder's token.
    #[must_use]
    pub fn has_privileged_token(&self, entity: &Entity) -> bool {
        entity
            .privilege
            .as_ref()
            .is_some_and(|m| Arc::ptr_eq(&m.0, &self.token))
    }

    /// Put this holder's token on `target` if `source` carries it.
    pub fn copy_token(&self, source: &Entity, target: &mut Entity) {
        if self.has_privileged_token(source) {
            self.set_token(target);
        }
    }

    /// Mark `entity` until the returned guard is dropped.
    pub fn privileged<'a>(&'a self, entity: &'a mut Entity) -> TokenGuard<'a> {
        self.set_token(entity);
        TokenGuard {
            holder: self,
            entity,
        }
    }
}

/// Clears the token on drop.
pub struct TokenGuard<'a> {
    holder: &'a TokenHolder,
    entity: &'a mut Entity,
}

impl Deref for TokenGuard<'_> {
    type Target = Entity;

    fn deref(&self) -> &Entity {
        self.entity
    }
}

impl DerefMut for TokenGuard<'_> {
    fn deref_mut(&mut self) -> &mut Entity {
        self.entity
    }
}

impl Drop for TokenGuard<'_> {
    fn drop(&mut self) {
        self.holder.clear_token(self.entity);
    }
}
