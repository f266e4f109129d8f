//! In-memory storage backend.
//!
//! This module provides thread-safe in-memory implementations of the storage traits.
//! It is intended for embedded usage, tests, and as a reference implementation.

use std::collections::{HashMap, HashSet};
use std::sync::RwLock;

use crate::entity::{Entity, EntityId, EntityType};
use crate::normalize::{name_key, normalize_identifier};
use crate::relationship::{Relationship, RelationshipId, RelationshipKind};
use crate::review::{ReviewItem, ReviewItemId, ReviewPriority, ReviewStatus};
use crate::storage::traits::{EntityStore, RelationshipStore, ReviewStore, StorageError};
use crate::time::DateRange;

fn lock_err(context: &'static str) -> StorageError {
    StorageError::BackendError(format!("poisoned lock: {context}"))
}

type IdentifierKey = (EntityType, String, String);
type NameKey = (EntityType, String);

fn identifier_keys(entity: &Entity) -> Vec<IdentifierKey> {
    let entity_type = entity.entity_type();
    entity
        .identifiers
        .iter()
        .map(|(key, value)| (entity_type, key.clone(), normalize_identifier(key, value)))
        .filter(|(_, _, value)| !value.is_empty())
        .collect()
}

fn entity_name_key(entity: &Entity) -> NameKey {
    (entity.entity_type(), name_key(&entity.name))
}

#[derive(Debug, Default)]
struct EntityState {
    by_id: HashMap<EntityId, Entity>,
    by_identifier: HashMap<IdentifierKey, EntityId>,
    by_name: HashMap<NameKey, HashSet<EntityId>>,
}

impl EntityState {
    fn check_identifiers_free(&self, entity: &Entity, keys: &[IdentifierKey]) -> Result<(), StorageError> {
        for key in keys {
            if let Some(owner) = self.by_identifier.get(key) {
                if *owner != entity.id {
                    return Err(StorageError::DuplicateKey(format!(
                        "{} {}={} already belongs to {owner}",
                        key.0, key.1, key.2
                    )));
                }
            }
        }
        Ok(())
    }

    fn remove_name(&mut self, key: &NameKey, id: EntityId) {
        if let Some(set) = self.by_name.get_mut(key) {
            set.remove(&id);
            if set.is_empty() {
                self.by_name.remove(key);
            }
        }
    }
}

/// Thread-safe in-memory entity store.
#[derive(Debug, Default)]
pub struct InMemoryEntityStore {
    state: RwLock<EntityState>,
}

impl InMemoryEntityStore {
    /// Create a new empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl EntityStore for InMemoryEntityStore {
    fn insert(&self, entity: Entity) -> Result<(), StorageError> {
        let mut state = self.state.write().map_err(|_| lock_err("entity.insert"))?;
        if state.by_id.contains_key(&entity.id) {
            return Err(StorageError::DuplicateKey(entity.id.to_string()));
        }

        let keys = identifier_keys(&entity);
        state.check_identifiers_free(&entity, &keys)?;

        for key in keys {
            state.by_identifier.insert(key, entity.id);
        }
        state
            .by_name
            .entry(entity_name_key(&entity))
            .or_default()
            .insert(entity.id);
        state.by_id.insert(entity.id, entity);
        Ok(())
    }

    fn get(&self, id: EntityId) -> Result<Option<Entity>, StorageError> {
        let state = self.state.read().map_err(|_| lock_err("entity.get"))?;
        Ok(state.by_id.get(&id).cloned())
    }

    fn update(&self, entity: Entity) -> Result<(), StorageError> {
        let mut state = self.state.write().map_err(|_| lock_err("entity.update"))?;
        let prev = state
            .by_id
            .get(&entity.id)
            .cloned()
            .ok_or(StorageError::EntityNotFound(entity.id))?;

        if entity.version <= prev.version {
            return Err(StorageError::VersionConflict(format!(
                "entity version must increase on update: id={} prev={} new={}",
                entity.id, prev.version, entity.version
            )));
        }
        if entity.entity_type() != prev.entity_type() {
            return Err(StorageError::BackendError(format!(
                "entity type cannot change: id={} {} -> {}",
                entity.id,
                prev.entity_type(),
                entity.entity_type()
            )));
        }

        let new_keys = identifier_keys(&entity);
        state.check_identifiers_free(&entity, &new_keys)?;

        for key in identifier_keys(&prev) {
            if !new_keys.contains(&key) {
                state.by_identifier.remove(&key);
            }
        }
        for key in new_keys {
            state.by_identifier.insert(key, entity.id);
        }

        let prev_name = entity_name_key(&prev);
        let new_name = entity_name_key(&entity);
        if prev_name != new_name {
            state.remove_name(&prev_name, entity.id);
            state.by_name.entry(new_name).or_default().insert(entity.id);
        }

        state.by_id.insert(entity.id, entity);
        Ok(())
    }

    fn find_by_identifier(
        &self,
        entity_type: EntityType,
        key: &str,
        value: &str,
    ) -> Result<Option<Entity>, StorageError> {
        let key = key.trim().to_lowercase();
        let value = normalize_identifier(&key, value);
        let state = self
            .state
            .read()
            .map_err(|_| lock_err("entity.find_by_identifier"))?;
        Ok(state
            .by_identifier
            .get(&(entity_type, key, value))
            .and_then(|id| state.by_id.get(id))
            .cloned())
    }

    fn find_by_name(&self, entity_type: EntityType, name: &str) -> Result<Vec<Entity>, StorageError> {
        let key = (entity_type, name_key(name));
        let state = self.state.read().map_err(|_| lock_err("entity.find_by_name"))?;
        let Some(ids) = state.by_name.get(&key) else {
            return Ok(Vec::new());
        };
        let mut out: Vec<Entity> = ids.iter().filter_map(|id| state.by_id.get(id).cloned()).collect();
        out.sort_by_key(|e| e.id);
        Ok(out)
    }

    fn list_by_type(&self, entity_type: EntityType) -> Result<Vec<Entity>, StorageError> {
        let state = self.state.read().map_err(|_| lock_err("entity.list_by_type"))?;
        Ok(state
            .by_id
            .values()
            .filter(|e| e.entity_type() == entity_type)
            .cloned()
            .collect())
    }

    fn all(&self) -> Result<Vec<Entity>, StorageError> {
        let state = self.state.read().map_err(|_| lock_err("entity.all"))?;
        Ok(state.by_id.values().cloned().collect())
    }
}

type CurrentKey = (RelationshipKind, EntityId, EntityId);

fn current_key(rel: &Relationship) -> CurrentKey {
    (rel.kind, rel.party_a, rel.party_b)
}

#[derive(Debug, Default)]
struct RelationshipState {
    by_id: HashMap<RelationshipId, Relationship>,
    by_entity: HashMap<EntityId, Vec<RelationshipId>>,
    current: HashMap<CurrentKey, RelationshipId>,
}

impl RelationshipState {
    fn check_current_free(&self, rel: &Relationship) -> Result<(), StorageError> {
        if !rel.is_current() {
            return Ok(());
        }
        match self.current.get(&current_key(rel)) {
            Some(existing) if *existing != rel.id => Err(StorageError::DuplicateKey(format!(
                "current {} {} -> {} already recorded as {existing}",
                rel.kind, rel.party_a, rel.party_b
            ))),
            _ => Ok(()),
        }
    }

    fn collect(&self, ids: &[RelationshipId]) -> Vec<Relationship> {
        let mut out: Vec<Relationship> = ids.iter().filter_map(|id| self.by_id.get(id).cloned()).collect();
        out.sort_by(|a, b| a.start_date().cmp(&b.start_date()).then_with(|| a.id.cmp(&b.id)));
        out
    }
}

/// Thread-safe in-memory relationship store.
#[derive(Debug, Default)]
pub struct InMemoryRelationshipStore {
    state: RwLock<RelationshipState>,
}

impl InMemoryRelationshipStore {
    /// Create a new empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl RelationshipStore for InMemoryRelationshipStore {
    fn insert(&self, relationship: Relationship) -> Result<(), StorageError> {
        let mut state = self
            .state
            .write()
            .map_err(|_| lock_err("relationship.insert"))?;

        if state.by_id.contains_key(&relationship.id) {
            return Err(StorageError::DuplicateKey(relationship.id.to_string()));
        }
        state.check_current_free(&relationship)?;

        if relationship.is_current() {
            state.current.insert(current_key(&relationship), relationship.id);
        }
        for party in [relationship.party_a, relationship.party_b] {
            state.by_entity.entry(party).or_default().push(relationship.id);
        }
        state.by_id.insert(relationship.id, relationship);
        Ok(())
    }

    fn get(&self, id: RelationshipId) -> Result<Option<Relationship>, StorageError> {
        let state = self
            .state
            .read()
            .map_err(|_| lock_err("relationship.get"))?;
        Ok(state.by_id.get(&id).cloned())
    }

    fn update(&self, relationship: Relationship, expected: &DateRange) -> Result<(), StorageError> {
        let mut state = self
            .state
            .write()
            .map_err(|_| lock_err("relationship.update"))?;

        let prev = state
            .by_id
            .get(&relationship.id)
            .cloned()
            .ok_or(StorageError::RelationshipNotFound(relationship.id))?;

        if prev.range() != expected {
            return Err(StorageError::VersionConflict(format!(
                "relationship changed since read: id={} expected={} stored={}",
                relationship.id,
                expected,
                prev.range()
            )));
        }

        if current_key(&prev) != current_key(&relationship) {
            return Err(StorageError::BackendError(format!(
                "relationship kind and parties cannot change: id={}",
                relationship.id
            )));
        }
        state.check_current_free(&relationship)?;

        let key = current_key(&relationship);
        if relationship.is_current() {
            state.current.insert(key, relationship.id);
        } else if state.current.get(&key) == Some(&relationship.id) {
            state.current.remove(&key);
        }

        state.by_id.insert(relationship.id, relationship);
        Ok(())
    }

    fn find_by_entity(&self, entity_id: EntityId) -> Result<Vec<Relationship>, StorageError> {
        let state = self
            .state
            .read()
            .map_err(|_| lock_err("relationship.find_by_entity"))?;
        Ok(state
            .by_entity
            .get(&entity_id)
            .map(|ids| state.collect(ids))
            .unwrap_or_default())
    }

    fn find_between(
        &self,
        kind: RelationshipKind,
        party_a: EntityId,
        party_b: EntityId,
    ) -> Result<Vec<Relationship>, StorageError> {
        let state = self
            .state
            .read()
            .map_err(|_| lock_err("relationship.find_between"))?;
        let Some(ids) = state.by_entity.get(&party_a) else {
            return Ok(Vec::new());
        };
        let mut out = state.collect(ids);
        out.retain(|r| r.kind == kind && r.party_a == party_a && r.party_b == party_b);
        Ok(out)
    }

    fn all(&self) -> Result<Vec<Relationship>, StorageError> {
        let state = self
            .state
            .read()
            .map_err(|_| lock_err("relationship.all"))?;
        Ok(state.by_id.values().cloned().collect())
    }
}

#[derive(Debug, Default)]
struct ReviewState {
    by_id: HashMap<ReviewItemId, ReviewItem>,
    seq: HashMap<ReviewItemId, u64>,
    next_seq: u64,
}

/// Thread-safe in-memory review item store.
#[derive(Debug, Default)]
pub struct InMemoryReviewStore {
    state: RwLock<ReviewState>,
}

impl InMemoryReviewStore {
    /// Create a new empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl ReviewStore for InMemoryReviewStore {
    fn insert(&self, item: ReviewItem) -> Result<(), StorageError> {
        let mut state = self.state.write().map_err(|_| lock_err("review.insert"))?;
        if state.by_id.contains_key(&item.id) {
            return Err(StorageError::DuplicateKey(item.id.to_string()));
        }
        let seq = state.next_seq;
        state.next_seq += 1;
        state.seq.insert(item.id, seq);
        state.by_id.insert(item.id, item);
        Ok(())
    }

    fn get(&self, id: ReviewItemId) -> Result<Option<ReviewItem>, StorageError> {
        let state = self.state.read().map_err(|_| lock_err("review.get"))?;
        Ok(state.by_id.get(&id).cloned())
    }

    fn compare_and_set(&self, item: ReviewItem, expected: &ReviewItem) -> Result<(), StorageError> {
        let mut state = self
            .state
            .write()
            .map_err(|_| lock_err("review.compare_and_set"))?;
        let stored = state
            .by_id
            .get_mut(&item.id)
            .ok_or(StorageError::ReviewItemNotFound(item.id))?;
        let unchanged = stored.status == expected.status
            && stored.reviewer == expected.reviewer
            && stored.updated_at == expected.updated_at;
        if !unchanged {
            return Err(StorageError::VersionConflict(format!(
                "review item {} is {} (reviewer {:?}), expected {} (reviewer {:?})",
                item.id, stored.status, stored.reviewer, expected.status, expected.reviewer
            )));
        }
        *stored = item;
        Ok(())
    }

    fn list_by_status(
        &self,
        status: ReviewStatus,
        priority: Option<ReviewPriority>,
    ) -> Result<Vec<ReviewItem>, StorageError> {
        let state = self
            .state
            .read()
            .map_err(|_| lock_err("review.list_by_status"))?;
        let mut items: Vec<(u64, &ReviewItem)> = state
            .by_id
            .values()
            .filter(|i| i.status == status && priority.map_or(true, |p| i.priority == p))
            .map(|i| (state.seq.get(&i.id).copied().unwrap_or(u64::MAX), i))
            .collect();
        items.sort_by(|(sa, a), (sb, b)| b.priority.cmp(&a.priority).then(sa.cmp(sb)));
        Ok(items.into_iter().map(|(_, i)| i.clone()).collect())
    }
}
