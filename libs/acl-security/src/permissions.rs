//! Permission bits attached to every governed row.
//!
//! A [`Permissions`] value is a grant matrix `{USER, GROUP, WORLD} x {READ, WRITE}`
//! plus two flags that are orthogonal to the grants:
//!
//! - `LOCKED`: read grants present on the row may never be withdrawn.
//! - `SOFT`: the value is a request to be combined with the session umask
//!   rather than an exact setting.
//!
//! Values are immutable; every "change" builds a new value.
//!
//! ```
//! use acl_security::permissions::{Permissions, Right, Role};
//!
//! let p: Permissions = "rwr---".parse().unwrap();
//! assert!(p.is_granted(Role::Group, Right::Read));
//! assert!(!p.is_granted(Role::Group, Right::Write));
//! assert_eq!(p.to_string(), "rwr---");
//!
//! let locked = p.locked();
//! assert!(locked.same_rights(&p));
//! assert!(!locked.identical(&p));
//! ```

use std::fmt;
use std::str::FromStr;

use bitflags::bitflags;
use serde::{Deserialize, Serialize};

bitflags! {
    /// Raw permission bits. Grants and flags share one integer so the
    /// value can be stored in a single column and tested in SQL.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct PermissionBits: u32 {
        const USER_READ   = 0b0000_0100_0000_0000;
        const USER_WRITE  = 0b0000_0010_0000_0000;
        const GROUP_READ  = 0b0000_0000_0100_0000;
        const GROUP_WRITE = 0b0000_0000_0010_0000;
        const WORLD_READ  = 0b0000_0000_0000_0100;
        const WORLD_WRITE = 0b0000_0000_0000_0010;

        const LOCKED = 0b0001_0000_0000_0000_0000;
        const SOFT   = 0b0010_0000_0000_0000_0000;

        const GRANTS = Self::USER_READ.bits()
            | Self::USER_WRITE.bits()
            | Self::GROUP_READ.bits()
            | Self::GROUP_WRITE.bits()
            | Self::WORLD_READ.bits()
            | Self::WORLD_WRITE.bits();
        const READS = Self::USER_READ.bits() | Self::GROUP_READ.bits() | Self::WORLD_READ.bits();
        const FLAGS = Self::LOCKED.bits() | Self::SOFT.bits();
    }
}

/// Who a grant applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    /// The row's owner.
    User,
    /// Members of the row's group.
    Group,
    /// Everyone.
    World,
}

/// What a grant allows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Right {
    Read,
    Write,
}

impl Role {
    pub const ALL: [Role; 3] = [Role::User, Role::Group, Role::World];
}

/// The single bit for `(role, right)`.
#[must_use]
pub const fn grant_bit(role: Role, right: Right) -> PermissionBits {
    match (role, right) {
        (Role::User, Right::Read) => PermissionBits::USER_READ,
        (Role::User, Right::Write) => PermissionBits::USER_WRITE,
        (Role::Group, Right::Read) => PermissionBits::GROUP_READ,
        (Role::Group, Right::Write) => PermissionBits::GROUP_WRITE,
        (Role::World, Right::Read) => PermissionBits::WORLD_READ,
        (Role::World, Right::Write) => PermissionBits::WORLD_WRITE,
    }
}

/// Immutable grant matrix plus `LOCKED`/`SOFT` flags.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Permissions {
    bits: PermissionBits,
}

impl Permissions {
    /// No grants, no flags.
    pub const EMPTY: Self = Self::from_bits(PermissionBits::empty());
    /// `rw----`: only the owner sees the row.
    pub const PRIVATE: Self =
        Self::from_bits(PermissionBits::USER_READ.union(PermissionBits::USER_WRITE));
    /// `rwr---`: group members can read, only the owner writes.
    pub const READ_ONLY: Self = Self::PRIVATE.with_bits(PermissionBits::GROUP_READ);
    /// `rwrw--`: group members read and write.
    pub const READ_WRITE: Self = Self::READ_ONLY.with_bits(PermissionBits::GROUP_WRITE);
    /// `rwrwr-`: group read-write, world readable.
    pub const PUBLIC_READ: Self = Self::READ_WRITE.with_bits(PermissionBits::WORLD_READ);

    #[must_use]
    pub const fn from_bits(bits: PermissionBits) -> Self {
        Self { bits }
    }

    const fn with_bits(self, extra: PermissionBits) -> Self {
        Self {
            bits: self.bits.union(extra),
        }
    }

    #[must_use]
    pub const fn bits(&self) -> PermissionBits {
        self.bits
    }

    /// Grant bits only (flags stripped).
    #[must_use]
    pub const fn grants(&self) -> PermissionBits {
        self.bits.intersection(PermissionBits::GRANTS)
    }

    /// Read grant bits only.
    #[must_use]
    pub const fn read_grants(&self) -> PermissionBits {
        self.bits.intersection(PermissionBits::READS)
    }

    #[must_use]
    pub const fn is_granted(&self, role: Role, right: Right) -> bool {
        self.bits.contains(grant_bit(role, right))
    }

    #[must_use]
    pub const fn grant(self, role: Role, right: Right) -> Self {
        self.with_bits(grant_bit(role, right))
    }

    #[must_use]
    pub const fn revoke(self, role: Role, right: Right) -> Self {
        Self {
            bits: self.bits.difference(grant_bit(role, right)),
        }
    }

    #[must_use]
    pub const fn is_locked(&self) -> bool {
        self.bits.contains(PermissionBits::LOCKED)
    }

    #[must_use]
    pub const fn is_soft(&self) -> bool {
        self.bits.contains(PermissionBits::SOFT)
    }

    #[must_use]
    pub const fn locked(self) -> Self {
        self.with_bits(PermissionBits::LOCKED)
    }

    #[must_use]
    pub const fn soft(self) -> Self {
        self.with_bits(PermissionBits::SOFT)
    }

    #[must_use]
    pub const fn without_soft(self) -> Self {
        Self {
            bits: self.bits.difference(PermissionBits::SOFT),
        }
    }

    /// Same grants, flags ignored.
    #[must_use]
    pub fn same_rights(&self, other: &Self) -> bool {
        self.grants() == other.grants()
    }

    /// Same grants and same flags.
    #[must_use]
    pub fn identical(&self, other: &Self) -> bool {
        self.bits == other.bits
    }

    /// Remove every grant present in `umask`; flags of `self` are kept.
    #[must_use]
    pub fn masked_by(self, umask: Self) -> Self {
        Self {
            bits: self.bits.difference(umask.grants()),
        }
    }

    /// Keep only the grants also present in `bound`; flags of `self` are kept.
    #[must_use]
    pub fn bounded_by(self, bound: Self) -> Self {
        Self {
            bits: self.bits.intersection(bound.grants() | PermissionBits::FLAGS),
        }
    }

    /// Integer column representation.
    #[must_use]
    pub fn to_column(&self) -> i64 {
        i64::from(self.bits.bits())
    }

    /// Rebuild from the integer column; unknown bits are dropped.
    #[must_use]
    pub fn from_column(value: i64) -> Self {
        let raw = u32::try_from(value & i64::from(PermissionBits::all().bits())).unwrap_or(0);
        Self::from_bits(PermissionBits::from_bits_truncate(raw))
    }
}

impl Default for Permissions {
    fn default() -> Self {
        Self::PRIVATE
    }
}

impl fmt::Display for Permissions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for role in Role::ALL {
            let r = if self.is_granted(role, Right::Read) { 'r' } else { '-' };
            let w = if self.is_granted(role, Right::Write) { 'w' } else { '-' };
            write!(f, "{r}{w}")?;
        }
        Ok(())
    }
}

impl fmt::Debug for Permissions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Permissions({self}")?;
        if self.is_locked() {
            f.write_str(" locked")?;
        }
        if self.is_soft() {
            f.write_str(" soft")?;
        }
        f.write_str(")")
    }
}

/// Error parsing the `rwrw--` notation.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PermissionsParseError {
    #[error("permission string must be 6 characters, got {0}")]
    Length(usize),
    #[error("unexpected character '{found}' at position {position}")]
    Character { position: usize, found: char },
}

impl FromStr for Permissions {
    type Err = PermissionsParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let chars: Vec<char> = s.chars().collect();
        if chars.len() != 6 {
            return Err(PermissionsParseError::Length(chars.len()));
        }
        let mut perms = Self::EMPTY;
        for (position, found) in chars.iter().copied().enumerate() {
            let role = Role::ALL[position / 2];
            let (right, letter) = if position % 2 == 0 {
                (Right::Read, 'r')
            } else {
                (Right::Write, 'w')
            };
            match found {
                c if c == letter => perms = perms.grant(role, right),
                '-' => {}
                _ => return Err(PermissionsParseError::Character { position, found }),
            }
        }
        Ok(perms)
    }
}

#[derive(Serialize, Deserialize)]
struct PermissionsRepr {
    perms: String,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    locked: bool,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    soft: bool,
}

impl Serialize for Permissions {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        PermissionsRepr {
            perms: self.to_string(),
            locked: self.is_locked(),
            soft: self.is_soft(),
        }
        .serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Permissions {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let repr = PermissionsRepr::deserialize(deserializer)?;
        let mut perms: Self = repr.perms.parse().map_err(serde::de::Error::custom)?;
        if repr.locked {
            perms = perms.locked();
        }
        if repr.soft {
            perms = perms.soft();
        }
        Ok(perms)
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;

    #[test]
    fn presets_render_in_rw_notation() {
        assert_eq!(Permissions::PRIVATE.to_string(), "rw----");
        assert_eq!(Permissions::READ_ONLY.to_string(), "rwr---");
        assert_eq!(Permissions::READ_WRITE.to_string(), "rwrw--");
        assert_eq!(Permissions::PUBLIC_READ.to_string(), "rwrwr-");
    }

    #[test]
    fn parse_rejects_bad_input() {
        assert_eq!(
            "rwr--".parse::<Permissions>(),
            Err(PermissionsParseError::Length(5))
        );
        assert_eq!(
            "rxr---".parse::<Permissions>(),
            Err(PermissionsParseError::Character {
                position: 1,
                found: 'x'
            })
        );
        assert!("wr----".parse::<Permissions>().is_err());
    }

    #[test]
    fn flags_are_orthogonal_to_grants() {
        let p = Permissions::READ_ONLY.locked().soft();
        assert!(p.is_locked());
        assert!(p.is_soft());
        assert_eq!(p.grants(), Permissions::READ_ONLY.grants());
        assert!(p.same_rights(&Permissions::READ_ONLY));
        assert!(!p.identical(&Permissions::READ_ONLY));
        assert!(p.without_soft().identical(&Permissions::READ_ONLY.locked()));
    }

    #[test]
    fn grant_and_revoke_produce_new_values() {
        let base = Permissions::PRIVATE;
        let granted = base.grant(Role::World, Right::Read);
        assert_eq!(base.to_string(), "rw----");
        assert_eq!(granted.to_string(), "rw--r-");
        assert_eq!(granted.revoke(Role::World, Right::Read), base);
    }

    #[test]
    fn umask_and_bound_keep_flags() {
        let requested = Permissions::PUBLIC_READ.soft();
        let masked = requested.masked_by("----rw".parse().unwrap());
        assert_eq!(masked.to_string(), "rwrw--");
        assert!(masked.is_soft());

        let bounded = Permissions::READ_WRITE.locked().bounded_by(Permissions::READ_ONLY);
        assert_eq!(bounded.to_string(), "rwr---");
        assert!(bounded.is_locked());
    }

    #[test]
    fn column_form_round_trips_flags() {
        let p = Permissions::READ_ONLY.locked();
        assert_eq!(Permissions::from_column(p.to_column()), p);
        assert_eq!(Permissions::from_column(-1).bits(), PermissionBits::all());
    }

    #[test]
    fn serde_uses_rw_notation() {
        let json = serde_json::to_string(&Permissions::READ_ONLY.locked()).unwrap();
        assert_eq!(json, r#"{"perms":"rwr---","locked":true}"#);
        let back: Permissions = serde_json::from_str(&json).unwrap();
        assert!(back.identical(&Permissions::READ_ONLY.locked()));
    }
}
