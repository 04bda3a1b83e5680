//! Light-administrator privileges.
//!
//! Full administrators hold every privilege. A light administrator is an
//! administrator whose privilege set has been trimmed by configuration.

use bitflags::bitflags;
use serde::{Deserialize, Serialize};

bitflags! {
    /// A set of administrative privileges.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct AdminPrivileges: u32 {
        const CHGRP                   = 1 << 0;
        const CHOWN                   = 1 << 1;
        const DELETE_FILE             = 1 << 2;
        const DELETE_MANAGED_REPO     = 1 << 3;
        const DELETE_OWNED            = 1 << 4;
        const DELETE_SCRIPT_REPO      = 1 << 5;
        const MODIFY_GROUP            = 1 << 6;
        const MODIFY_GROUP_MEMBERSHIP = 1 << 7;
        const MODIFY_USER             = 1 << 8;
        const READ_SESSION            = 1 << 9;
        const SUDO                    = 1 << 10;
        const WRITE_FILE              = 1 << 11;
        const WRITE_MANAGED_REPO      = 1 << 12;
        const WRITE_OWNED             = 1 << 13;
        const WRITE_SCRIPT_REPO       = 1 << 14;
    }
}

/// One named privilege, as it appears in per-identity configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AdminPrivilege {
    Chgrp,
    Chown,
    DeleteFile,
    DeleteManagedRepo,
    DeleteOwned,
    DeleteScriptRepo,
    ModifyGroup,
    ModifyGroupMembership,
    ModifyUser,
    ReadSession,
    Sudo,
    WriteFile,
    WriteManagedRepo,
    WriteOwned,
    WriteScriptRepo,
}

impl AdminPrivilege {
    pub const ALL: [AdminPrivilege; 15] = [
        Self::Chgrp,
        Self::Chown,
        Self::DeleteFile,
        Self::DeleteManagedRepo,
        Self::DeleteOwned,
        Self::DeleteScriptRepo,
        Self::ModifyGroup,
        Self::ModifyGroupMembership,
        Self::ModifyUser,
        Self::ReadSession,
        Self::Sudo,
        Self::WriteFile,
        Self::WriteManagedRepo,
        Self::WriteOwned,
        Self::WriteScriptRepo,
    ];

    #[must_use]
    pub const fn flag(self) -> AdminPrivileges {
        match self {
            Self::Chgrp => AdminPrivileges::CHGRP,
            Self::Chown => AdminPrivileges::CHOWN,
            Self::DeleteFile => AdminPrivileges::DELETE_FILE,
            Self::DeleteManagedRepo => AdminPrivileges::DELETE_MANAGED_REPO,
            Self::DeleteOwned => AdminPrivileges::DELETE_OWNED,
            Self::DeleteScriptRepo => AdminPrivileges::DELETE_SCRIPT_REPO,
            Self::ModifyGroup => AdminPrivileges::MODIFY_GROUP,
            Self::ModifyGroupMembership => AdminPrivileges::MODIFY_GROUP_MEMBERSHIP,
            Self::ModifyUser => AdminPrivileges::MODIFY_USER,
            Self::ReadSession => AdminPrivileges::READ_SESSION,
            Self::Sudo => AdminPrivileges::SUDO,
            Self::WriteFile => AdminPrivileges::WRITE_FILE,
            Self::WriteManagedRepo => AdminPrivileges::WRITE_MANAGED_REPO,
            Self::WriteOwned => AdminPrivileges::WRITE_OWNED,
            Self::WriteScriptRepo => AdminPrivileges::WRITE_SCRIPT_REPO,
        }
    }
}

/// A per-identity configuration entry enabling or disabling one privilege.
///
/// Identities without an entry for a privilege hold it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrivilegeSetting {
    pub privilege: AdminPrivilege,
    pub enabled: bool,
}

impl PrivilegeSetting {
    #[must_use]
    pub fn disabled(privilege: AdminPrivilege) -> Self {
        Self {
            privilege,
            enabled: false,
        }
    }

    #[must_use]
    pub fn enabled(privilege: AdminPrivilege) -> Self {
        Self {
            privilege,
            enabled: true,
        }
    }
}

impl AdminPrivileges {
    /// Remove every privilege a setting list disables.
    #[must_use]
    pub fn trimmed_by(self, settings: &[PrivilegeSetting]) -> Self {
        settings
            .iter()
            .filter(|s| !s.enabled)
            .fold(self, |acc, s| acc.difference(s.privilege.flag()))
    }

    /// Named privileges contained in this set.
    pub fn iter_named(self) -> impl Iterator<Item = AdminPrivilege> {
        AdminPrivilege::ALL
            .into_iter()
            .filter(move |p| self.contains(p.flag()))
    }
}
