//! Share snapshots supplied by the sharing storage.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::details::ObjectId;

pub type ShareId = i64;

/// A temporary, id-scoped read grant. Read-only to the engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShareData {
    pub id: ShareId,
    pub enabled: bool,
    /// Allowed object ids keyed by entity type name.
    #[serde(default)]
    pub allowed: BTreeMap<String, BTreeSet<ObjectId>>,
}

impl ShareData {
    #[must_use]
    pub fn new(id: ShareId, enabled: bool) -> Self {
        Self {
            id,
            enabled,
            allowed: BTreeMap::new(),
        }
    }

    /// Add object ids of one type to the allow-list.
    #[must_use]
    pub fn allow(mut self, type_name: &str, ids: impl IntoIterator<Item = ObjectId>) -> Self {
        self.allowed
            .entry(type_name.to_owned())
            .or_default()
            .extend(ids);
        self
    }

    #[must_use]
    pub fn allows(&self, type_name: &str, id: ObjectId) -> bool {
        self.allowed
            .get(type_name)
            .is_some_and(|ids| ids.contains(&id))
    }

    /// Allowed ids for one type, in ascending order.
    pub fn allowed_ids(&self, type_name: &str) -> impl Iterator<Item = ObjectId> + '_ {
        self.allowed
            .get(type_name)
            .into_iter()
            .flat_map(|ids| ids.iter().copied())
    }
}
