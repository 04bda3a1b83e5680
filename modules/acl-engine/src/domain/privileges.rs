//! Light-admin privilege computation and the per-session cache.

use std::sync::Arc;
use std::time::{Duration, Instant};

use acl_security::constants::ROOT_USER_ID;
use acl_security::{AdminPrivileges, UserId};
use dashmap::DashMap;
use tracing::{debug, instrument};
use uuid::Uuid;

use crate::domain::error::SecurityError;
use crate::domain::ports::IdentityStore;

/// Who a session acts as, and who is really behind it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionIdentity {
    pub session_id: Uuid,
    pub user_id: UserId,
    pub sudoer: Option<UserId>,
}

/// Whether a cached value is acceptable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Freshness {
    /// Cached values younger than the TTL are returned as-is.
    Cached,
    /// Always recompute and refresh the cache.
    Fresh,
}

#[derive(Debug, Clone, Copy)]
struct CachedPrivileges {
    privileges: AdminPrivileges,
    computed_at: Instant,
}

/// Computes light-admin privileges and caches them per session id.
///
/// A revoked privilege may stay effective until its entry expires.
/// Callers that cannot tolerate that ask for [`Freshness::Fresh`].
/// Entries are dropped on logout, and expired entries are swept whenever
/// a new one is stored.
pub struct LightAdminPrivileges {
    identity: Arc<dyn IdentityStore>,
    cache: DashMap<Uuid, CachedPrivileges>,
    ttl: Duration,
}

impl LightAdminPrivileges {
    #[must_use]
    pub fn new(identity: Arc<dyn IdentityStore>, ttl: Duration) -> Self {
        Self {
            identity,
            cache: DashMap::new(),
            ttl,
        }
    }

    /// # Errors
    /// `Internal` when identity storage fails.
    #[instrument(skip(self), fields(session = %session.session_id))]
    pub fn get_session_privileges(
        &self,
        session: &SessionIdentity,
        freshness: Freshness,
    ) -> Result<AdminPrivileges, SecurityError> {
        if freshness == Freshness::Cached
            && let Some(hit) = self.cache.get(&session.session_id)
            && hit.computed_at.elapsed() < self.ttl
        {
            return Ok(hit.privileges);
        }

        let privileges = self.compute(session)?;
        self.evict_expired();
        self.cache.insert(
            session.session_id,
            CachedPrivileges {
                privileges,
                computed_at: Instant::now(),
            },
        );
        debug!(?privileges, "computed session privileges");
        Ok(privileges)
    }

    /// Uncached privileges of one identity acting as itself.
    ///
    /// # Errors
    /// `Internal` when identity storage fails.
    pub fn privileges_of(&self, user: UserId) -> Result<AdminPrivileges, SecurityError> {
        self.trim(AdminPrivileges::all(), user)
    }

    fn compute(&self, session: &SessionIdentity) -> Result<AdminPrivileges, SecurityError> {
        let mut privileges = AdminPrivileges::all();
        if let Some(real) = session.sudoer {
            privileges = self.trim(privileges, real)?;
        }
        self.trim(privileges, session.user_id)
    }

    fn trim(
        &self,
        privileges: AdminPrivileges,
        user: UserId,
    ) -> Result<AdminPrivileges, SecurityError> {
        if user == ROOT_USER_ID {
            return Ok(privileges);
        }
        let settings = self.identity.privilege_settings(user)?;
        Ok(privileges.trimmed_by(&settings))
    }

    pub fn invalidate(&self, session_id: Uuid) {
        self.cache.remove(&session_id);
    }

    fn evict_expired(&self) {
        let before = self.cache.len();
        self.cache
            .retain(|_, entry| entry.computed_at.elapsed() < self.ttl);
        let evicted = before.saturating_sub(self.cache.len());
        if evicted > 0 {
            debug!(evicted, "evicted expired session privileges");
        }
    }

    #[must_use]
    pub fn cached_sessions(&self) -> usize {
        self.cache.len()
    }
}
