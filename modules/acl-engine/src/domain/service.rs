//! Engine facade: what the persistence layer and callers talk to.
//!
//! Write path per saved graph: reattach, then validate links, reconcile metadata
//! and vote for every written node, then commit. Nothing is committed
//! unless every node passes. Reads consult the session's read filter only.

use std::sync::Arc;

use acl_security::{AccessScope, AdminPrivileges, Details, EventContext, ObjectId, SecuredRow};
use tracing::{debug, error, info, instrument, warn};

use crate::config::{ConfigError, SecurityConfig};
use crate::domain::context::{ContextGuard, Principal, SecurityContextManager, UnitOfWork};
use crate::domain::details::{DetailsLifecycle, ManagedDetails};
use crate::domain::error::SecurityError;
use crate::domain::filters::{ReadFilter, SecurityFilter};
use crate::domain::linkage::LinkageValidator;
use crate::domain::model::{Entity, EntityGraph, EntityType, NodeId, RowRef, RowWrite, StoredRow};
use crate::domain::ports::{EntityStore, EventLog, IdentityStore, ShareStore};
use crate::domain::privileges::{Freshness, LightAdminPrivileges, SessionIdentity};
use crate::domain::reattach::{AttachedGraph, Attachment, ReattachmentHandler};
use crate::domain::token::TokenHolder;
use crate::domain::voter::AclVoter;

/// Collaborators the engine is wired with.
#[derive(Clone)]
pub struct Ports {
    pub identity: Arc<dyn IdentityStore>,
    pub shares: Arc<dyn ShareStore>,
    pub store: Arc<dyn EntityStore>,
    pub events: Arc<dyn EventLog>,
}

/// Result of a successful save.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SavedGraph {
    ids: Vec<ObjectId>,
    details: Vec<Arc<Details>>,
    pub inserted: usize,
    pub updated: usize,
}

impl SavedGraph {
    /// Id of a node of the submitted graph.
    #[must_use]
    pub fn id(&self, node: NodeId) -> Option<ObjectId> {
        self.ids.get(node.0).copied()
    }

    /// Metadata stored for a node of the submitted graph.
    #[must_use]
    pub fn details(&self, node: NodeId) -> Option<&Arc<Details>> {
        self.details.get(node.0)
    }
}

enum Planned {
    Insert,
    Update(ManagedDetails),
    Keep,
}

/// A write already applied to storage, and how to take it back.
enum Undo {
    Insert(EntityType, ObjectId),
    Update(ObjectId, RowWrite),
}

pub struct SecuritySystem {
    config: SecurityConfig,
    store: Arc<dyn EntityStore>,
    tokens: TokenHolder,
    privileges: Arc<LightAdminPrivileges>,
    contexts: SecurityContextManager,
}

impl SecuritySystem {
    /// # Errors
    /// `ConfigError::InvalidUmask` when the configured default umask does not parse.
    pub fn new(config: SecurityConfig, ports: Ports) -> Result<Self, ConfigError> {
        let default_umask = config.default_umask()?;
        let privileges = Arc::new(LightAdminPrivileges::new(
            Arc::clone(&ports.identity),
            config.privilege_cache_ttl(),
        ));
        let contexts = SecurityContextManager::new(
            ports.identity,
            ports.shares,
            ports.events,
            Arc::clone(&privileges),
            default_umask,
        );
        info!(
            privilege_cache_ttl_ms = config.privilege_cache_ttl_ms,
            "security system initialized"
        );
        Ok(Self {
            config,
            store: ports.store,
            tokens: TokenHolder::new(),
            privileges,
            contexts,
        })
    }

    #[must_use]
    pub fn config(&self) -> &SecurityConfig {
        &self.config
    }

    #[must_use]
    pub fn contexts(&self) -> &SecurityContextManager {
        &self.contexts
    }

    /// # Errors
    /// See [`SecurityContextManager::login`].
    pub fn login<'u>(
        &self,
        uow: &'u mut UnitOfWork,
        principal: &Principal,
    ) -> Result<ContextGuard<'u>, SecurityError> {
        self.contexts.login(uow, principal)
    }

    pub fn logout(&self, uow: &mut UnitOfWork) {
        self.contexts.logout(uow);
    }

    /// This engine's token holder. For engine-internal, system-authored writes.
    #[must_use]
    pub fn tokens(&self) -> &TokenHolder {
        &self.tokens
    }

    #[must_use]
    pub fn voter(&self) -> AclVoter<'_> {
        AclVoter::new(&self.tokens)
    }

    #[must_use]
    pub fn lifecycle(&self) -> DetailsLifecycle<'_> {
        DetailsLifecycle::new(&self.tokens)
    }

    /// # Errors
    /// `Internal` when identity storage fails.
    pub fn get_session_privileges(
        &self,
        session: &SessionIdentity,
        freshness: Freshness,
    ) -> Result<AdminPrivileges, SecurityError> {
        self.privileges.get_session_privileges(session, freshness)
    }

    /// Forget cached privileges of a session, e.g. after its configuration changed.
    pub fn invalidate_session(&self, session: &SessionIdentity) {
        self.privileges.invalidate(session.session_id);
    }

    /// Predicate restricting bulk reads of `entity_type` for the active session.
    ///
    /// # Errors
    /// `ApiUsage` outside a login.
    pub fn read_scope(
        &self,
        uow: &UnitOfWork,
        entity_type: &EntityType,
    ) -> Result<AccessScope, SecurityError> {
        let ctx = uow.current()?;
        Ok(ReadFilter::for_context(ctx).predicate(ctx, entity_type))
    }

    /// Load one row. Rows the session may not see are reported as absent.
    ///
    /// # Errors
    /// `ApiUsage` outside a login, `Internal` when storage fails.
    #[instrument(skip(self, uow), fields(entity_type = %entity_type))]
    pub fn load(
        &self,
        uow: &UnitOfWork,
        entity_type: &EntityType,
        id: ObjectId,
    ) -> Result<Option<StoredRow>, SecurityError> {
        let ctx = uow.current()?;
        self.visible_row(ctx, entity_type, id)
    }

    /// Bulk read: every candidate row the session may see.
    ///
    /// # Errors
    /// `ApiUsage` outside a login.
    pub fn filter_visible(
        &self,
        uow: &UnitOfWork,
        rows: impl IntoIterator<Item = StoredRow>,
    ) -> Result<Vec<StoredRow>, SecurityError> {
        let ctx = uow.current()?;
        let voter = self.voter();
        Ok(rows
            .into_iter()
            .filter(|row| {
                voter.allow_load(ctx, &row.entity_type, &SecuredRow::new(row.id, &row.details))
            })
            .collect())
    }

    /// Hook run before a row is first stored: fresh metadata plus the creation vote.
    ///
    /// # Errors
    /// Any error of the new-entity metadata path or the creation vote.
    pub fn on_create(&self, uow: &UnitOfWork, entity: &Entity) -> Result<Details, SecurityError> {
        let ctx = uow.current()?;
        let details = self.lifecycle().new_transient_details(ctx, entity)?;
        self.voter().check_creation(ctx, entity)?;
        Ok(details)
    }

    /// Hook run before a stored row is stored again.
    ///
    /// Linkage is validated first, then the metadata are reconciled, then the
    /// update is voted on against the stored metadata.
    ///
    /// # Errors
    /// `ApiUsage` when `node` is not a submitted stored row, or the first failing check.
    pub fn on_update(
        &self,
        uow: &UnitOfWork,
        graph: &AttachedGraph,
        node: NodeId,
    ) -> Result<ManagedDetails, SecurityError> {
        let ctx = uow.current()?;
        self.check_managed_node(ctx, graph, node)
    }

    /// Hook run before a stored row is removed.
    ///
    /// # Errors
    /// `ApiUsage` outside a login, or the deletion violation.
    pub fn on_delete(
        &self,
        uow: &UnitOfWork,
        entity: &Entity,
        trusted: &Details,
    ) -> Result<(), SecurityError> {
        let ctx = uow.current()?;
        self.voter().check_delete(ctx, entity, trusted)
    }

    /// Reattach, validate and commit a caller-supplied graph.
    ///
    /// Every written node is checked before the first row is stored.
    ///
    /// # Errors
    /// The first failing check of any node; nothing is stored in that case.
    #[instrument(skip_all, fields(nodes = graph.len()))]
    pub fn save_graph(
        &self,
        uow: &UnitOfWork,
        graph: EntityGraph,
    ) -> Result<SavedGraph, SecurityError> {
        let ctx = uow.current()?;
        let attached =
            ReattachmentHandler::new(self.store.as_ref(), &self.tokens).reattach(ctx, graph)?;
        let plan = self.plan(ctx, &attached)?;
        let order = insert_order(&attached)?;
        self.commit(&attached, plan, &order)
    }

    /// Delete one row the session may see and write.
    ///
    /// # Errors
    /// `ApiUsage` for rows the session cannot see, or the deletion violation.
    #[instrument(skip(self, uow), fields(entity_type = %entity_type))]
    pub fn delete(
        &self,
        uow: &UnitOfWork,
        entity_type: &EntityType,
        id: ObjectId,
    ) -> Result<(), SecurityError> {
        let ctx = uow.current()?;
        let row = self
            .visible_row(ctx, entity_type, id)?
            .ok_or_else(|| {
                SecurityError::api_usage(format!("{entity_type}:{id} does not exist"))
            })?;
        let entity = Entity::from_stored(&row);
        self.voter().check_delete(ctx, &entity, &row.details)?;
        self.store.delete(entity_type, id)?;
        info!(id, "row deleted");
        Ok(())
    }

    fn visible_row(
        &self,
        ctx: &EventContext,
        entity_type: &EntityType,
        id: ObjectId,
    ) -> Result<Option<StoredRow>, SecurityError> {
        let Some(row) = self.store.load(entity_type, id)? else {
            return Ok(None);
        };
        if self
            .voter()
            .allow_load(ctx, entity_type, &SecuredRow::new(row.id, &row.details))
        {
            Ok(Some(row))
        } else {
            debug!(id, "row filtered");
            Ok(None)
        }
    }

    fn check_managed_node(
        &self,
        ctx: &EventContext,
        graph: &AttachedGraph,
        node: NodeId,
    ) -> Result<ManagedDetails, SecurityError> {
        let (Some(entity), Some(Attachment::Managed(row))) =
            (graph.entity(node), graph.attachment(node))
        else {
            return Err(SecurityError::api_usage(format!(
                "node {} is not a stored row submitted for update",
                node.0
            )));
        };
        LinkageValidator::new(&self.tokens).validate(ctx, graph, node)?;
        let outcome = self.lifecycle().check_managed_details(ctx, entity, &row.details)?;
        self.voter().check_update(ctx, entity, &row.details)?;
        Ok(outcome)
    }

    fn plan(
        &self,
        ctx: &EventContext,
        graph: &AttachedGraph,
    ) -> Result<Vec<Planned>, SecurityError> {
        let linkage = LinkageValidator::new(&self.tokens);
        let voter = self.voter();

        graph
            .iter()
            .map(|(node, entity, attachment)| match attachment {
                Attachment::New(_) => {
                    linkage.validate(ctx, graph, node)?;
                    voter.check_creation(ctx, entity)?;
                    Ok(Planned::Insert)
                }
                Attachment::Managed(_) => {
                    Ok(Planned::Update(self.check_managed_node(ctx, graph, node)?))
                }
                Attachment::Reference(_) => Ok(Planned::Keep),
            })
            .collect()
    }

    /// Store every planned write. A failing write undoes the ones before it.
    fn commit(
        &self,
        graph: &AttachedGraph,
        plan: Vec<Planned>,
        order: &[NodeId],
    ) -> Result<SavedGraph, SecurityError> {
        let mut journal = Vec::new();
        match self.write_all(graph, plan, order, &mut journal) {
            Ok(saved) => {
                info!(inserted = saved.inserted, updated = saved.updated, "graph saved");
                Ok(saved)
            }
            Err(err) => {
                self.roll_back(journal);
                Err(err)
            }
        }
    }

    fn write_all(
        &self,
        graph: &AttachedGraph,
        plan: Vec<Planned>,
        order: &[NodeId],
        journal: &mut Vec<Undo>,
    ) -> Result<SavedGraph, SecurityError> {
        let mut ids: Vec<Option<ObjectId>> = graph.iter().map(|(_, e, _)| e.id).collect();
        let mut details: Vec<Arc<Details>> = graph
            .iter()
            .map(|(_, _, a)| Arc::clone(a.trusted_details()))
            .collect();
        let mut inserted = 0;
        let mut updated = 0;

        for &node in order {
            let Some(entity) = graph.entity(node) else {
                continue;
            };
            let write = RowWrite {
                entity_type: entity.entity_type,
                details: Arc::clone(&details[node.0]),
                value: entity.value.clone(),
                references: row_refs(graph, entity, &ids)?,
            };
            let id = self.store.insert(write)?;
            journal.push(Undo::Insert(entity.entity_type, id));
            ids[node.0] = Some(id);
            inserted += 1;
        }

        for ((node, entity, attachment), planned) in graph.iter().zip(plan) {
            let (Planned::Update(outcome), Attachment::Managed(row)) = (planned, attachment)
            else {
                continue;
            };
            let changed = outcome.is_changed();
            let stored = outcome.into_details();
            details[node.0] = Arc::clone(&stored);
            let references = row_refs(graph, entity, &ids)?;
            if !changed && entity.value == row.value && references == row.references {
                continue;
            }
            let write = RowWrite {
                entity_type: entity.entity_type,
                details: stored,
                value: entity.value.clone(),
                references,
            };
            self.store.update(row.id, write)?;
            journal.push(Undo::Update(
                row.id,
                RowWrite {
                    entity_type: row.entity_type,
                    details: Arc::clone(&row.details),
                    value: row.value.clone(),
                    references: row.references.clone(),
                },
            ));
            updated += 1;
        }

        let ids = ids
            .into_iter()
            .enumerate()
            .map(|(i, id)| {
                id.ok_or_else(|| SecurityError::internal(format!("node {i} was not stored")))
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(SavedGraph {
            ids,
            details,
            inserted,
            updated,
        })
    }

    fn roll_back(&self, journal: Vec<Undo>) {
        if journal.is_empty() {
            return;
        }
        warn!(writes = journal.len(), "rolling back a partially stored graph");
        for undo in journal.into_iter().rev() {
            let undone = match undo {
                Undo::Insert(entity_type, id) => self.store.delete(&entity_type, id),
                Undo::Update(id, previous) => self.store.update(id, previous),
            };
            if let Err(err) = undone {
                error!(error = %err, "rollback write failed");
            }
        }
    }
}

fn row_refs(
    graph: &AttachedGraph,
    entity: &Entity,
    ids: &[Option<ObjectId>],
) -> Result<Vec<RowRef>, SecurityError> {
    entity
        .references
        .iter()
        .map(|target| {
            let (Some(t), Some(Some(id))) = (graph.entity(*target), ids.get(target.0)) else {
                return Err(SecurityError::internal(format!(
                    "{} references unsaved node {}",
                    entity.label(),
                    target.0
                )));
            };
            Ok(RowRef {
                entity_type: t.entity_type,
                id: *id,
            })
        })
        .collect()
}

/// New nodes ordered so that every referenced new node is inserted first.
fn insert_order(graph: &AttachedGraph) -> Result<Vec<NodeId>, SecurityError> {
    let is_new = |n: NodeId| matches!(graph.attachment(n), Some(Attachment::New(_)));
    let mut pending: Vec<NodeId> = graph
        .iter()
        .filter(|(_, _, a)| matches!(a, Attachment::New(_)))
        .map(|(n, _, _)| n)
        .collect();
    let mut order = Vec::with_capacity(pending.len());

    while !pending.is_empty() {
        let (ready, blocked): (Vec<_>, Vec<_>) = pending.into_iter().partition(|&n| {
            graph.entity(n).is_none_or(|e| {
                e.references
                    .iter()
                    .all(|&r| !is_new(r) || order.contains(&r))
            })
        });
        if ready.is_empty() {
            return Err(SecurityError::api_usage(
                "new rows reference each other in a cycle",
            ));
        }
        order.extend(ready);
        pending = blocked;
    }
    Ok(order)
}
