//! Turns a caller-supplied graph into one the engine can trust.
//!
//! - rows without identity get fresh metadata, except enumerations whose
//!   value already exists in storage, which resolve to the stored row
//! - proxies (`loaded == false`) are replaced by the stored row
//! - fully submitted persisted rows are paired with their stored copy
//!
//! Stored rows pass through the session's read filter. A row the session
//! cannot see is reported exactly like a missing one.
//!
//! Replacements inherit the original's privileged token and filtered-field
//! markers.

use std::sync::Arc;

use acl_security::{Details, EventContext, ObjectId, SecuredRow};
use tracing::{debug, instrument};

use crate::domain::details::DetailsLifecycle;
use crate::domain::error::SecurityError;
use crate::domain::model::{Entity, EntityGraph, NodeId, StoredRow, TypeClass};
use crate::domain::ports::EntityStore;
use crate::domain::token::TokenHolder;
use crate::domain::voter::AclVoter;

/// What the engine knows about one node after reattachment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Attachment {
    /// To be inserted with these metadata.
    New(Arc<Details>),
    /// Persisted row the caller submitted in full; may be updated.
    Managed(StoredRow),
    /// Persisted row used only as a link target; never written.
    Reference(StoredRow),
}

impl Attachment {
    /// Metadata the engine trusts for this node.
    #[must_use]
    pub fn trusted_details(&self) -> &Arc<Details> {
        match self {
            Self::New(details) => details,
            Self::Managed(row) | Self::Reference(row) => &row.details,
        }
    }

    #[must_use]
    pub fn is_written(&self) -> bool {
        !matches!(self, Self::Reference(_))
    }
}

/// A reattached graph: every node paired with its [`Attachment`].
#[derive(Debug)]
pub struct AttachedGraph {
    nodes: Vec<Entity>,
    attachments: Vec<Attachment>,
}

impl AttachedGraph {
    #[must_use]
    pub fn entity(&self, id: NodeId) -> Option<&Entity> {
        self.nodes.get(id.0)
    }

    #[must_use]
    pub fn attachment(&self, id: NodeId) -> Option<&Attachment> {
        self.attachments.get(id.0)
    }

    pub fn iter(&self) -> impl Iterator<Item = (NodeId, &Entity, &Attachment)> {
        self.nodes
            .iter()
            .zip(&self.attachments)
            .enumerate()
            .map(|(i, (e, a))| (NodeId(i), e, a))
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}

pub struct ReattachmentHandler<'a> {
    store: &'a dyn EntityStore,
    tokens: &'a TokenHolder,
}

impl<'a> ReattachmentHandler<'a> {
    #[must_use]
    pub fn new(store: &'a dyn EntityStore, tokens: &'a TokenHolder) -> Self {
        Self { store, tokens }
    }

    /// # Errors
    /// - `ApiUsage` when a node names a row that does not exist or that the
    ///   session cannot see
    /// - any error of the new-entity metadata path
    #[instrument(skip_all, fields(nodes = graph.len()))]
    pub fn reattach(
        &self,
        ctx: &EventContext,
        graph: EntityGraph,
    ) -> Result<AttachedGraph, SecurityError> {
        let lifecycle = DetailsLifecycle::new(self.tokens);
        let mut nodes = Vec::with_capacity(graph.len());
        let mut attachments = Vec::with_capacity(graph.len());

        for entity in graph.into_nodes() {
            let (entity, attachment) = match entity.id {
                None => {
                    if let Some(row) = self.existing_enumeration(&entity)? {
                        debug!(
                            entity = %entity.label(),
                            id = row.id,
                            "enumeration resolved by value"
                        );
                        (self.replacement(&entity, &row), Attachment::Reference(row))
                    } else {
                        let details = lifecycle.new_transient_details(ctx, &entity)?;
                        (entity, Attachment::New(Arc::new(details)))
                    }
                }
                Some(id) => {
                    let row = self.visible_row(ctx, &entity, id)?;
                    if entity.loaded {
                        (entity, Attachment::Managed(row))
                    } else {
                        debug!(entity = %entity.label(), "proxy reloaded from storage");
                        (self.replacement(&entity, &row), Attachment::Reference(row))
                    }
                }
            };
            nodes.push(entity);
            attachments.push(attachment);
        }

        Ok(AttachedGraph { nodes, attachments })
    }

    fn visible_row(
        &self,
        ctx: &EventContext,
        entity: &Entity,
        id: ObjectId,
    ) -> Result<StoredRow, SecurityError> {
        let missing = || SecurityError::api_usage(format!("{} does not exist", entity.label()));
        let row = self.store.load(&entity.entity_type, id)?.ok_or_else(missing)?;
        let visible = self.tokens.has_privileged_token(entity)
            || AclVoter::new(self.tokens).allow_load(
                ctx,
                &entity.entity_type,
                &SecuredRow::new(row.id, &row.details),
            );
        if visible {
            Ok(row)
        } else {
            debug!(entity = %entity.label(), "stored row filtered during reattachment");
            Err(missing())
        }
    }

    fn existing_enumeration(&self, entity: &Entity) -> Result<Option<StoredRow>, SecurityError> {
        if entity.entity_type.class != TypeClass::Enumeration {
            return Ok(None);
        }
        let Some(value) = entity.value.as_deref() else {
            return Ok(None);
        };
        Ok(self.store.find_enumeration(&entity.entity_type, value)?)
    }

    fn replacement(&self, original: &Entity, row: &StoredRow) -> Entity {
        let mut replacement = Entity::from_stored(row);
        self.tokens.copy_token(original, &mut replacement);
        replacement.copy_filtered_fields(original);
        replacement
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;
    use crate::infra::memory::InMemoryEntityStore;
    use crate::test_support::{FORMAT, IMAGE, member_ctx, stored_details};
    use acl_security::{DetailsDraft, Permissions};

    #[test]
    fn new_nodes_get_fresh_details() {
        let store = InMemoryEntityStore::new();
        let tokens = TokenHolder::new();
        let mut graph = EntityGraph::new();
        let n = graph.add(Entity::new(IMAGE));

        let attached = ReattachmentHandler::new(&store, &tokens)
            .reattach(&member_ctx(5, 10, Permissions::READ_ONLY), graph)
            .unwrap();
        let Some(Attachment::New(d)) = attached.attachment(n) else {
            panic!("expected new attachment");
        };
        assert_eq!((d.owner(), d.group()), (5, 10));
    }

    #[test]
    fn enumerations_resolve_by_value() {
        let store = InMemoryEntityStore::new();
        let tiff = store.seed(FORMAT, stored_details(0, 0, None), Some("tiff"));
        let tokens = TokenHolder::new();
        let mut graph = EntityGraph::new();
        let n = graph.add(Entity::new(FORMAT).with_value("tiff"));

        let attached = ReattachmentHandler::new(&store, &tokens)
            .reattach(&member_ctx(5, 10, Permissions::READ_ONLY), graph)
            .unwrap();
        assert!(matches!(attached.attachment(n), Some(Attachment::Reference(r)) if r.id == tiff));
        assert_eq!(attached.entity(n).unwrap().id, Some(tiff));
    }

    #[test]
    fn proxies_are_reloaded_and_keep_markers() {
        let store = InMemoryEntityStore::new();
        let id = store.seed(IMAGE, stored_details(6, 10, Some(Permissions::READ_ONLY)), None);
        let tokens = TokenHolder::new();

        let mut proxy = Entity::unloaded(IMAGE, id)
            .with_details(DetailsDraft::new().owner(5).permissions(Permissions::PUBLIC_READ));
        proxy.mark_filtered("name");
        tokens.set_token(&mut proxy);
        let mut graph = EntityGraph::new();
        let n = graph.add(proxy);

        let attached = ReattachmentHandler::new(&store, &tokens)
            .reattach(&member_ctx(5, 10, Permissions::READ_ONLY), graph)
            .unwrap();
        let e = attached.entity(n).unwrap();
        assert_eq!(e.details.owner, Some(6), "caller substructure discarded");
        assert!(e.loaded);
        assert!(e.filtered_fields().contains("name"));
        assert!(tokens.has_privileged_token(e));
        assert!(!attached.attachment(n).unwrap().is_written());
    }

    #[test]
    fn invisible_rows_read_as_missing() {
        let store = InMemoryEntityStore::new();
        let foreign = store.seed(IMAGE, stored_details(6, 11, Some(Permissions::PUBLIC_READ)), None);
        let colleague = store.seed(IMAGE, stored_details(6, 10, Some(Permissions::PRIVATE)), None);
        let tokens = TokenHolder::new();
        let ctx = member_ctx(5, 10, Permissions::PRIVATE);

        for (id, loaded) in [(foreign, true), (foreign, false), (colleague, true)] {
            let mut graph = EntityGraph::new();
            graph.add(if loaded {
                Entity::persisted(IMAGE, id)
            } else {
                Entity::unloaded(IMAGE, id)
            });
            let err = ReattachmentHandler::new(&store, &tokens)
                .reattach(&ctx, graph)
                .unwrap_err();
            assert!(
                matches!(&err, SecurityError::ApiUsage(m) if m.contains("does not exist")),
                "{err:?}"
            );
        }

        let mut system_authored = Entity::unloaded(IMAGE, foreign);
        tokens.set_token(&mut system_authored);
        let mut graph = EntityGraph::new();
        graph.add(system_authored);
        ReattachmentHandler::new(&store, &tokens)
            .reattach(&ctx, graph)
            .unwrap();
    }

    #[test]
    fn missing_rows_are_api_usage_errors() {
        let store = InMemoryEntityStore::new();
        let tokens = TokenHolder::new();
        let mut graph = EntityGraph::new();
        graph.add(Entity::persisted(IMAGE, 404));
        let err = ReattachmentHandler::new(&store, &tokens)
            .reattach(&member_ctx(5, 10, Permissions::READ_ONLY), graph)
            .unwrap_err();
        assert!(matches!(err, SecurityError::ApiUsage(_)));
    }
}
