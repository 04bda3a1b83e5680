//! Error taxonomy of the engine.
//!
//! Reads never produce these for a denial: invisible rows are filtered out.
//! Writes always fail with a specific variant so callers can tell "you may
//! not do this" from "your copy is stale" from "the engine is broken".

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SecurityError {
    /// Authorization denial. Nothing was committed.
    #[error("security violation: {0}")]
    Violation(String),

    /// Cross-group linkage or group reassignment.
    #[error("group security violation: {0}")]
    GroupViolation(String),

    /// Write attempt in a group that is read-only for this session.
    #[error("read-only group security violation: {0}")]
    ReadOnlyGroup(String),

    /// Disallowed permission change.
    #[error("permission mismatch group security violation: {0}")]
    PermissionMismatch(String),

    /// Submitted creation/update event differs from the stored one. The
    /// caller should reload and retry.
    #[error("optimistic lock failure: {0}")]
    OptimisticLock(String),

    /// Engine invariant broken. Never user-correctable.
    #[error("internal error: {0}")]
    Internal(String),

    /// Operation invoked out of protocol (no active context, missing row, ...).
    #[error("api usage error: {0}")]
    ApiUsage(String),
}

impl SecurityError {
    #[must_use]
    pub fn violation(message: impl Into<String>) -> Self {
        Self::Violation(message.into())
    }

    #[must_use]
    pub fn group_violation(message: impl Into<String>) -> Self {
        Self::GroupViolation(message.into())
    }

    #[must_use]
    pub fn read_only_group(message: impl Into<String>) -> Self {
        Self::ReadOnlyGroup(message.into())
    }

    #[must_use]
    pub fn permission_mismatch(message: impl Into<String>) -> Self {
        Self::PermissionMismatch(message.into())
    }

    #[must_use]
    pub fn optimistic_lock(message: impl Into<String>) -> Self {
        Self::OptimisticLock(message.into())
    }

    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }

    #[must_use]
    pub fn api_usage(message: impl Into<String>) -> Self {
        Self::ApiUsage(message.into())
    }

    /// `SecurityViolation` or any of its refinements.
    #[must_use]
    pub fn is_security_violation(&self) -> bool {
        matches!(
            self,
            Self::Violation(_)
                | Self::GroupViolation(_)
                | Self::ReadOnlyGroup(_)
                | Self::PermissionMismatch(_)
        )
    }

    /// `GroupSecurityViolation` or one of its refinements.
    #[must_use]
    pub fn is_group_violation(&self) -> bool {
        matches!(
            self,
            Self::GroupViolation(_) | Self::ReadOnlyGroup(_) | Self::PermissionMismatch(_)
        )
    }
}

impl From<anyhow::Error> for SecurityError {
    fn from(e: anyhow::Error) -> Self {
        Self::Internal(format!("{e:#}"))
    }
}
