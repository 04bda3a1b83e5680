#![cfg_attr(coverage_nightly, feature(coverage_attribute))]
pub mod access_scope;
pub mod constants;
pub mod context;
pub mod details;
pub mod permissions;
pub mod privileges;
pub mod share;

pub use access_scope::{
    AccessScope, BitsScopeFilter, EqScopeFilter, InScopeFilter, ScopeConstraint, ScopeFilter,
    ScopeRow, ScopeValue, row_properties,
};
pub use context::{ActiveGroup, EventContext};
pub use details::{
    Details, DetailsDraft, EventId, EventRef, ExternalInfo, GroupId, ObjectId, SecuredRow, UserId,
};
pub use permissions::{PermissionBits, Permissions, PermissionsParseError, Right, Role};
pub use privileges::{AdminPrivilege, AdminPrivileges, PrivilegeSetting};
pub use share::{ShareData, ShareId};
