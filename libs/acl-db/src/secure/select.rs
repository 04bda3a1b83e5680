use sea_orm::{EntityTrait, QueryFilter, Select};

use crate::secure::{AccessScope, SecuredEntity, build_scope_condition};

/// Attach a visibility scope to a bulk read.
pub trait SecureSelectExt<E: SecuredEntity> {
    /// Restrict the select to rows the scope makes visible.
    #[must_use]
    fn scoped(self, scope: &AccessScope) -> Select<E>;
}

impl<E> SecureSelectExt<E> for Select<E>
where
    E: SecuredEntity + EntityTrait,
{
    fn scoped(self, scope: &AccessScope) -> Select<E> {
        self.filter(build_scope_condition::<E>(scope))
    }
}
