//! Security metadata attached to every governed row.

use serde::{Deserialize, Serialize};

use crate::access_scope::{ScopeRow, ScopeValue, row_properties};
use crate::permissions::Permissions;

pub type ObjectId = i64;
pub type UserId = i64;
pub type GroupId = i64;
pub type EventId = i64;

/// An audit event: the unit of work that created or last changed a row.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EventRef {
    pub id: EventId,
    pub event_type: String,
}

impl EventRef {
    #[must_use]
    pub fn new(id: EventId, event_type: impl Into<String>) -> Self {
        Self {
            id,
            event_type: event_type.into(),
        }
    }
}

/// Opaque tag set by external importers. Settable only while absent.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ExternalInfo {
    pub entity_type: String,
    pub entity_id: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lsid: Option<String>,
}

/// Persisted security metadata.
///
/// Never mutated in place: the lifecycle manager replaces the whole value
/// whenever anything changes, so readers holding an older `Arc<Details>`
/// are never affected.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Details {
    owner: UserId,
    group: GroupId,
    permissions: Option<Permissions>,
    creation_event: EventRef,
    update_event: EventId,
    external_info: Option<ExternalInfo>,
}

impl Details {
    #[must_use]
    pub fn new(
        owner: UserId,
        group: GroupId,
        permissions: Option<Permissions>,
        creation_event: EventRef,
    ) -> Self {
        let update_event = creation_event.id;
        Self {
            owner,
            group,
            permissions,
            creation_event,
            update_event,
            external_info: None,
        }
    }

    #[must_use]
    pub fn with_external_info(mut self, info: Option<ExternalInfo>) -> Self {
        self.external_info = info;
        self
    }

    #[must_use]
    pub fn with_update_event(mut self, event: EventId) -> Self {
        self.update_event = event;
        self
    }

    #[must_use]
    pub fn owner(&self) -> UserId {
        self.owner
    }

    #[must_use]
    pub fn group(&self) -> GroupId {
        self.group
    }

    #[must_use]
    pub fn permissions(&self) -> Option<&Permissions> {
        self.permissions.as_ref()
    }

    #[must_use]
    pub fn creation_event(&self) -> &EventRef {
        &self.creation_event
    }

    #[must_use]
    pub fn update_event(&self) -> EventId {
        self.update_event
    }

    #[must_use]
    pub fn external_info(&self) -> Option<&ExternalInfo> {
        self.external_info.as_ref()
    }

    /// Start a draft carrying every field of this value.
    #[must_use]
    pub fn to_draft(&self) -> DetailsDraft {
        DetailsDraft {
            owner: Some(self.owner),
            group: Some(self.group),
            permissions: self.permissions,
            creation_event: Some(self.creation_event.id),
            update_event: Some(self.update_event),
            external_info: self.external_info.clone(),
        }
    }
}

/// Caller-submitted security metadata.
///
/// Every field is optional: `None` means "not submitted" (keep what is
/// stored), never "remove".
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DetailsDraft {
    pub owner: Option<UserId>,
    pub group: Option<GroupId>,
    pub permissions: Option<Permissions>,
    pub creation_event: Option<EventId>,
    pub update_event: Option<EventId>,
    pub external_info: Option<ExternalInfo>,
}

impl DetailsDraft {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn owner(mut self, owner: UserId) -> Self {
        self.owner = Some(owner);
        self
    }

    #[must_use]
    pub fn group(mut self, group: GroupId) -> Self {
        self.group = Some(group);
        self
    }

    #[must_use]
    pub fn permissions(mut self, permissions: Permissions) -> Self {
        self.permissions = Some(permissions);
        self
    }

    #[must_use]
    pub fn external_info(mut self, info: ExternalInfo) -> Self {
        self.external_info = Some(info);
        self
    }
}

/// A stored row as seen by filters: its id plus its Details.
#[derive(Debug, Clone, Copy)]
pub struct SecuredRow<'a> {
    pub id: ObjectId,
    pub details: &'a Details,
}

impl<'a> SecuredRow<'a> {
    #[must_use]
    pub fn new(id: ObjectId, details: &'a Details) -> Self {
        Self { id, details }
    }
}

impl ScopeRow for SecuredRow<'_> {
    fn property(&self, name: &str) -> Option<ScopeValue> {
        match name {
            row_properties::ID => Some(ScopeValue::Int(self.id)),
            row_properties::OWNER_ID => Some(ScopeValue::Int(self.details.owner)),
            row_properties::GROUP_ID => Some(ScopeValue::Int(self.details.group)),
            row_properties::PERMISSIONS => self
                .details
                .permissions
                .map(|p| ScopeValue::Int(p.to_column())),
            _ => None,
        }
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;

    #[test]
    fn new_details_start_with_creation_as_update_event() {
        let d = Details::new(5, 10, Some(Permissions::PRIVATE), EventRef::new(42, "Internal"));
        assert_eq!(d.update_event(), 42);
        assert_eq!(d.creation_event().event_type, "Internal");
        assert!(d.external_info().is_none());
    }

    #[test]
    fn draft_from_details_submits_everything() {
        let d = Details::new(5, 10, Some(Permissions::READ_ONLY), EventRef::new(1, "User"))
            .with_update_event(3);
        let draft = d.to_draft();
        assert_eq!(draft.owner, Some(5));
        assert_eq!(draft.group, Some(10));
        assert_eq!(draft.creation_event, Some(1));
        assert_eq!(draft.update_event, Some(3));
    }

    #[test]
    fn row_without_permissions_has_null_column() {
        let d = Details::new(5, 10, None, EventRef::new(1, "User"));
        let row = SecuredRow::new(7, &d);
        assert_eq!(row.property(row_properties::ID), Some(ScopeValue::Int(7)));
        assert_eq!(row.property(row_properties::PERMISSIONS), None);
        assert_eq!(row.property("unknown"), None);
    }
}
