//! Abstract storage traits for warmpath.
//!
//! These traits define the contract that storage backends must implement.
//! The in-memory backend in `memory.rs` is the reference implementation;
//! a relational backend only needs to honor the same uniqueness rules.

use thiserror::Error;

use crate::entity::{Entity, EntityId, EntityType};
use crate::relationship::{Relationship, RelationshipId, RelationshipKind};
use crate::review::{ReviewItem, ReviewItemId, ReviewPriority, ReviewStatus};
use crate::time::DateRange;

/// Errors that can occur during storage operations.
#[derive(Debug, Error)]
pub enum StorageError {
    /// Entity not found.
    #[error("Entity not found: {0}")]
    EntityNotFound(EntityId),

    /// Relationship not found.
    #[error("Relationship not found: {0}")]
    RelationshipNotFound(RelationshipId),

    /// Review item not found.
    #[error("Review item not found: {0}")]
    ReviewItemNotFound(ReviewItemId),

    /// Key already exists.
    #[error("Duplicate key: {0}")]
    DuplicateKey(String),

    /// A concurrent writer got there first.
    #[error("Version conflict: {0}")]
    VersionConflict(String),

    /// Backend error.
    #[error("Storage backend error: {0}")]
    BackendError(String),

    /// Serialization failed.
    #[error("Serialization error: {0}")]
    SerializationError(String),
}

/// Storage trait for entities.
///
/// # Uniqueness
/// - Entity ids are unique.
/// - An identifier `(type, key, normalized value)` belongs to at most one
///   entity; `insert` and `update` reject a write that would share one with
///   `DuplicateKey`.
pub trait EntityStore: Send + Sync {
    /// Insert a new entity.
    fn insert(&self, entity: Entity) -> Result<(), StorageError>;

    /// Get an entity by ID.
    fn get(&self, id: EntityId) -> Result<Option<Entity>, StorageError>;

    /// Replace an existing entity. The version must be greater than the
    /// stored one, otherwise `VersionConflict`.
    fn update(&self, entity: Entity) -> Result<(), StorageError>;

    /// Find the entity owning an identifier.
    fn find_by_identifier(
        &self,
        entity_type: EntityType,
        key: &str,
        value: &str,
    ) -> Result<Option<Entity>, StorageError>;

    /// Find entities of a type by case-insensitive exact name.
    fn find_by_name(&self, entity_type: EntityType, name: &str) -> Result<Vec<Entity>, StorageError>;

    /// All entities of a type.
    fn list_by_type(&self, entity_type: EntityType) -> Result<Vec<Entity>, StorageError>;

    /// Every stored entity.
    fn all(&self) -> Result<Vec<Entity>, StorageError>;
}

/// Storage trait for relationships.
///
/// At most one *current* relationship may exist per `(kind, party_a,
/// party_b)`; `insert` and `update` reject a second with `DuplicateKey`.
pub trait RelationshipStore: Send + Sync {
    /// Insert a new relationship.
    fn insert(&self, relationship: Relationship) -> Result<(), StorageError>;

    /// Get a relationship by ID.
    fn get(&self, id: RelationshipId) -> Result<Option<Relationship>, StorageError>;

    /// Replace an existing relationship if its stored range is still
    /// `expected`. Kind and parties cannot change.
    ///
    /// # Errors
    /// - `RelationshipNotFound` if the relationship does not exist
    /// - `VersionConflict` if another writer changed the range first
    fn update(&self, relationship: Relationship, expected: &DateRange) -> Result<(), StorageError>;

    /// Relationships in which the entity is either party, oldest first.
    fn find_by_entity(&self, entity_id: EntityId) -> Result<Vec<Relationship>, StorageError>;

    /// Relationships of one kind between two parties, in role order.
    fn find_between(
        &self,
        kind: RelationshipKind,
        party_a: EntityId,
        party_b: EntityId,
    ) -> Result<Vec<Relationship>, StorageError>;

    /// Every stored relationship.
    fn all(&self) -> Result<Vec<Relationship>, StorageError>;
}

/// Storage trait for review items.
pub trait ReviewStore: Send + Sync {
    /// Insert a new item, recording its enqueue order.
    fn insert(&self, item: ReviewItem) -> Result<(), StorageError>;

    /// Get an item by ID.
    fn get(&self, id: ReviewItemId) -> Result<Option<ReviewItem>, StorageError>;

    /// Replace an item if the stored copy is unchanged since `expected`
    /// was read: same status, reviewer and `updated_at`.
    ///
    /// # Errors
    /// - `ReviewItemNotFound` if the item does not exist
    /// - `VersionConflict` if another writer moved it first
    fn compare_and_set(&self, item: ReviewItem, expected: &ReviewItem) -> Result<(), StorageError>;

    /// Items in a status, optionally filtered by priority. Ordered by
    /// priority descending, then enqueue order.
    fn list_by_status(
        &self,
        status: ReviewStatus,
        priority: Option<ReviewPriority>,
    ) -> Result<Vec<ReviewItem>, StorageError>;
}
