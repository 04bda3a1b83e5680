#![cfg_attr(coverage_nightly, feature(coverage_attribute))]
//! Database side of row visibility.
//!
//! Filters in the engine describe visibility as an
//! [`AccessScope`](acl_security::AccessScope). This crate maps the scope's
//! row properties onto entity columns and attaches the resulting condition
//! to bulk `SeaORM` reads.

pub mod secure;

pub use secure::{SecureSelectExt, SecuredEntity, build_scope_condition};
