//! Group-based access-control engine
//!
//! Decides, for every read and write a session performs, whether it is
//! permitted, and maintains the owner/group/permissions metadata attached to
//! every governed row.
//!
//! ## Flow
//!
//! 1. [`SecuritySystem::login`] resolves a [`Principal`] into an immutable
//!    `EventContext` held by the caller's [`UnitOfWork`]
//! 2. bulk reads are restricted with [`SecuritySystem::read_scope`], which
//!    `acl-db` renders into SQL
//! 3. [`SecuritySystem::save_graph`] reattaches a caller-supplied graph, checks
//!    links, reconciles metadata and votes before committing anything
//!
//! ## Configuration
//!
//! ```yaml
//! privilege_cache_ttl_ms: 10000
//! default_umask: "----rw"
//! ```
#![cfg_attr(coverage_nightly, feature(coverage_attribute))]

pub mod config;
#[doc(hidden)]
pub mod domain;
pub mod infra;

#[cfg(test)]
mod test_support;

pub use config::{ConfigError, SecurityConfig};
pub use domain::context::{
    ContextGuard, GroupSelection, Principal, SecurityContextManager, UnitOfWork,
};
pub use domain::error::SecurityError;
pub use domain::filters::{
    AdminAction, AllGroupsFilter, CurrentGroupFilter, LightAdminFilter, ReadFilter,
    SecurityFilter, SharingFilter,
};
pub use domain::model::{
    Entity, EntityGraph, EntityType, NodeId, RowRef, RowWrite, StoredRow, TypeClass,
};
pub use domain::ports::{
    EntityStore, EventLog, GroupRecord, IdentityStore, ShareStore, UserRecord,
};
pub use domain::privileges::{Freshness, LightAdminPrivileges, SessionIdentity};
pub use domain::service::{Ports, SavedGraph, SecuritySystem};
pub use domain::token::{TokenGuard, TokenHolder};
pub use domain::voter::AclVoter;
