//! Scoped `SeaORM` reads.
//!
//! ```rust,ignore
//! use acl_db::secure::{SecureSelectExt, SecuredEntity};
//!
//! let scope = read_filter.predicate(&ctx, &IMAGE);
//! let images = image::Entity::find()
//!     .scoped(&scope)
//!     .all(conn)
//!     .await?;
//! ```
//!
//! # Policy
//!
//! | Scope | Behavior |
//! |-------|----------|
//! | deny-all | `WHERE FALSE` |
//! | unconstrained | no filtering |
//! | constraints | OR of AND-ed column predicates |

mod cond;
mod entity_traits;
mod select;

pub use cond::build_scope_condition;
pub use entity_traits::SecuredEntity;
pub use select::SecureSelectExt;

pub use acl_security::{AccessScope, ScopeConstraint, ScopeFilter, ScopeValue, row_properties};
