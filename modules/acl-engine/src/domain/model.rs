//! Caller-facing entity graph and the stored-row view the engine reconciles against.
//!
//! Graphs are arenas: entities reference each other by [`NodeId`], never by
//! embedded substructure, so the engine can replace any node with a trusted
//! copy loaded from storage.

use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;

use acl_security::{Details, DetailsDraft, ObjectId};

use crate::domain::token::PrivilegeMark;

/// How the engine governs rows of a type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TypeClass {
    /// Ordinary governed data: owner, group and permissions apply.
    Owned,
    /// Engine-reserved rows (users, groups, events, sessions...).
    Global,
    /// Shared value rows, matched by value instead of inserted twice.
    Enumeration,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EntityType {
    pub name: &'static str,
    pub class: TypeClass,
}

impl EntityType {
    #[must_use]
    pub const fn owned(name: &'static str) -> Self {
        Self {
            name,
            class: TypeClass::Owned,
        }
    }

    #[must_use]
    pub const fn global(name: &'static str) -> Self {
        Self {
            name,
            class: TypeClass::Global,
        }
    }

    #[must_use]
    pub const fn enumeration(name: &'static str) -> Self {
        Self {
            name,
            class: TypeClass::Enumeration,
        }
    }

    /// Engine-reserved types: always readable, never writable by callers.
    #[must_use]
    pub fn is_system(&self) -> bool {
        !matches!(self.class, TypeClass::Owned)
    }
}

impl fmt::Display for EntityType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name)
    }
}

/// Index of an entity within an [`EntityGraph`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub usize);

/// A caller-supplied entity.
///
/// `details` holds whatever the caller submitted and is never trusted as-is.
/// `loaded == false` marks an identity-only proxy whose content the caller
/// never received.
#[derive(Debug)]
pub struct Entity {
    pub id: Option<ObjectId>,
    pub entity_type: EntityType,
    pub details: DetailsDraft,
    pub value: Option<String>,
    pub references: Vec<NodeId>,
    pub loaded: bool,
    filtered_fields: BTreeSet<String>,
    pub(crate) privilege: Option<PrivilegeMark>,
}

impl Entity {
    /// A new, not yet persisted entity.
    #[must_use]
    pub fn new(entity_type: EntityType) -> Self {
        Self {
            id: None,
            entity_type,
            details: DetailsDraft::default(),
            value: None,
            references: Vec::new(),
            loaded: true,
            filtered_fields: BTreeSet::new(),
            privilege: None,
        }
    }

    /// A persisted entity the caller holds a full copy of.
    #[must_use]
    pub fn persisted(entity_type: EntityType, id: ObjectId) -> Self {
        Self {
            id: Some(id),
            ..Self::new(entity_type)
        }
    }

    /// An identity-only proxy.
    #[must_use]
    pub fn unloaded(entity_type: EntityType, id: ObjectId) -> Self {
        Self {
            loaded: false,
            ..Self::persisted(entity_type, id)
        }
    }

    /// Trusted copy of a stored row.
    #[must_use]
    pub fn from_stored(row: &StoredRow) -> Self {
        Self {
            details: row.details.to_draft(),
            value: row.value.clone(),
            ..Self::persisted(row.entity_type, row.id)
        }
    }

    #[must_use]
    pub fn with_details(mut self, details: DetailsDraft) -> Self {
        self.details = details;
        self
    }

    #[must_use]
    pub fn with_value(mut self, value: impl Into<String>) -> Self {
        self.value = Some(value.into());
        self
    }

    /// Record that a field was withheld from the caller by a read filter.
    pub fn mark_filtered(&mut self, field: impl Into<String>) {
        self.filtered_fields.insert(field.into());
    }

    #[must_use]
    pub fn filtered_fields(&self) -> &BTreeSet<String> {
        &self.filtered_fields
    }

    pub(crate) fn copy_filtered_fields(&mut self, from: &Entity) {
        self.filtered_fields
            .extend(from.filtered_fields.iter().cloned());
    }

    /// `Type:id` or `Type:new`, for messages.
    #[must_use]
    pub fn label(&self) -> String {
        match self.id {
            Some(id) => format!("{}:{id}", self.entity_type),
            None => format!("{}:new", self.entity_type),
        }
    }
}

/// Arena of caller-supplied entities.
#[derive(Debug, Default)]
pub struct EntityGraph {
    nodes: Vec<Entity>,
}

impl EntityGraph {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, entity: Entity) -> NodeId {
        self.nodes.push(entity);
        NodeId(self.nodes.len() - 1)
    }

    /// Record that `from` references `to`.
    pub fn link(&mut self, from: NodeId, to: NodeId) {
        if let Some(node) = self.nodes.get_mut(from.0) {
            node.references.push(to);
        }
    }

    #[must_use]
    pub fn get(&self, id: NodeId) -> Option<&Entity> {
        self.nodes.get(id.0)
    }

    pub fn get_mut(&mut self, id: NodeId) -> Option<&mut Entity> {
        self.nodes.get_mut(id.0)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (NodeId, &Entity)> {
        self.nodes.iter().enumerate().map(|(i, e)| (NodeId(i), e))
    }

    pub(crate) fn into_nodes(self) -> Vec<Entity> {
        self.nodes
    }
}

/// Reference from a stored row to another stored row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RowRef {
    pub entity_type: EntityType,
    pub id: ObjectId,
}

/// A row as held by storage. The engine's source of truth.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredRow {
    pub id: ObjectId,
    pub entity_type: EntityType,
    pub details: Arc<Details>,
    pub value: Option<String>,
    pub references: Vec<RowRef>,
}

/// Content handed to storage on insert or update.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RowWrite {
    pub entity_type: EntityType,
    pub details: Arc<Details>,
    pub value: Option<String>,
    pub references: Vec<RowRef>,
}
