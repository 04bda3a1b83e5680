//! Well-known identities.

use crate::details::{GroupId, UserId};

/// The reserved root identity. Its light-admin privileges are never trimmed.
pub const ROOT_USER_ID: UserId = 0;

/// Membership in the system group makes a user an administrator.
/// Rows in this group are visible to everyone.
pub const SYSTEM_GROUP_ID: GroupId = 0;

/// The "user" pseudo-group every account belongs to. Rows in this group are
/// visible to everyone and exempt from active-group checks.
pub const USER_GROUP_ID: GroupId = 1;

/// Groups whose rows are always visible and never subject to linkage checks.
#[must_use]
pub fn is_pseudo_group(group: GroupId) -> bool {
    group == SYSTEM_GROUP_ID || group == USER_GROUP_ID
}
