//! Immutable graph snapshot for traversal.
//!
//! The snapshot is built from one read of the store and evaluated against a
//! single reference day. Relationships that start after that day are left
//! out; the rest carry their current/former status so traversal never has
//! to touch the store or its locks.

use std::collections::HashMap;

use chrono::NaiveDate;

use crate::entity::{Entity, EntityId, EntityType};
use crate::error::WarmpathResult;
use crate::relationship::Relationship;
use crate::temporal::TemporalStore;
use crate::time::IntervalStatus;

/// A relationship as seen from the snapshot's reference day.
#[derive(Debug, Clone)]
pub struct SnapshotEdge {
    pub relationship: Relationship,
    pub status: IntervalStatus,
}

/// Entities and relationships frozen at a reference day.
#[derive(Debug, Clone)]
pub struct GraphSnapshot {
    as_of: NaiveDate,
    entities: HashMap<EntityId, Entity>,
    edges: Vec<SnapshotEdge>,
    adjacency: HashMap<EntityId, Vec<usize>>,
}

impl GraphSnapshot {
    /// Reads the whole store once.
    ///
    /// # Errors
    ///
    /// Propagates backend failures.
    pub fn capture(store: &TemporalStore, as_of: NaiveDate) -> WarmpathResult<Self> {
        let entities = store.all_entities()?;
        let relationships = store.all_relationships()?;
        Ok(Self::from_parts(entities, relationships, as_of))
    }

    /// Builds a snapshot from already-loaded rows.
    #[must_use]
    pub fn from_parts(entities: Vec<Entity>, relationships: Vec<Relationship>, as_of: NaiveDate) -> Self {
        let entities: HashMap<EntityId, Entity> = entities.into_iter().map(|e| (e.id, e)).collect();

        let mut relationships = relationships;
        relationships.sort_by_key(|r| r.id);

        let mut edges = Vec::new();
        let mut adjacency: HashMap<EntityId, Vec<usize>> = HashMap::new();
        for relationship in relationships {
            let status = relationship.status_on(as_of);
            if status == IntervalStatus::Future {
                continue;
            }
            if !entities.contains_key(&relationship.party_a) || !entities.contains_key(&relationship.party_b) {
                continue;
            }
            let idx = edges.len();
            adjacency.entry(relationship.party_a).or_default().push(idx);
            adjacency.entry(relationship.party_b).or_default().push(idx);
            edges.push(SnapshotEdge {
                relationship,
                status,
            });
        }

        Self {
            as_of,
            entities,
            edges,
            adjacency,
        }
    }

    #[must_use]
    pub const fn as_of(&self) -> NaiveDate {
        self.as_of
    }

    #[must_use]
    pub fn entity(&self, id: EntityId) -> Option<&Entity> {
        self.entities.get(&id)
    }

    #[must_use]
    pub fn entity_type(&self, id: EntityId) -> Option<EntityType> {
        self.entities.get(&id).map(Entity::entity_type)
    }

    /// Display name, falling back to the id.
    #[must_use]
    pub fn name_of(&self, id: EntityId) -> String {
        self.entities
            .get(&id)
            .map_or_else(|| id.to_string(), |e| e.name.clone())
    }

    /// Traversable edges touching `id`, in relationship id order.
    pub fn edges_of(&self, id: EntityId) -> impl Iterator<Item = &SnapshotEdge> + '_ {
        self.adjacency
            .get(&id)
            .into_iter()
            .flatten()
            .map(|idx| &self.edges[*idx])
    }

    #[must_use]
    pub fn entity_count(&self) -> usize {
        self.entities.len()
    }

    #[must_use]
    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }
}
