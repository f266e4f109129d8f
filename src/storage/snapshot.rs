//! JSON snapshots of the entity and relationship stores.
//!
//! A snapshot is the persisted layout of the graph: one row per entity with
//! its identifiers and flags, one row per relationship with its interval.
//! Derived fields are recomputed on restore instead of trusted from disk.

use std::fs;
use std::path::Path;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::entity::Entity;
use crate::relationship::Relationship;
use crate::storage::traits::{EntityStore, RelationshipStore, StorageError};

/// Current snapshot layout version.
pub const SNAPSHOT_FORMAT_VERSION: u32 = 1;

/// Point-in-time export of every entity and relationship.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreSnapshot {
    pub format_version: u32,
    pub exported_at: DateTime<Utc>,
    pub entities: Vec<Entity>,
    pub relationships: Vec<Relationship>,
}

impl StoreSnapshot {
    /// Reads every row from the stores, ordered by id.
    ///
    /// # Errors
    ///
    /// Propagates backend failures.
    pub fn capture(
        entities: &dyn EntityStore,
        relationships: &dyn RelationshipStore,
    ) -> Result<Self, StorageError> {
        let mut entities = entities.all()?;
        entities.sort_by_key(|e| e.id);
        let mut relationships = relationships.all()?;
        relationships.sort_by_key(|r| r.id);
        Ok(Self {
            format_version: SNAPSHOT_FORMAT_VERSION,
            exported_at: Utc::now(),
            entities,
            relationships,
        })
    }

    /// Inserts every row into (normally empty) stores, recomputing derived
    /// flags against `today`.
    ///
    /// # Errors
    ///
    /// - `SerializationError` for an unknown format version
    /// - `DuplicateKey` if a row collides with existing data
    pub fn restore_into(
        self,
        entities: &dyn EntityStore,
        relationships: &dyn RelationshipStore,
        today: NaiveDate,
    ) -> Result<(), StorageError> {
        if self.format_version != SNAPSHOT_FORMAT_VERSION {
            return Err(StorageError::SerializationError(format!(
                "unsupported snapshot format version {}",
                self.format_version
            )));
        }

        for mut entity in self.entities {
            if let Some(profile) = entity.company_mut() {
                profile.refresh(today);
            }
            entities.insert(entity)?;
        }
        for mut relationship in self.relationships {
            relationship.recompute_derived();
            relationships.insert(relationship)?;
        }
        Ok(())
    }

    /// # Errors
    ///
    /// Returns `SerializationError` if encoding fails.
    pub fn to_json_string(&self) -> Result<String, StorageError> {
        serde_json::to_string_pretty(self).map_err(|e| StorageError::SerializationError(e.to_string()))
    }

    /// # Errors
    ///
    /// Returns `SerializationError` on malformed input.
    pub fn from_json_str(json: &str) -> Result<Self, StorageError> {
        serde_json::from_str(json).map_err(|e| StorageError::SerializationError(e.to_string()))
    }

    /// Writes the snapshot as pretty JSON.
    ///
    /// # Errors
    ///
    /// Returns `BackendError` on I/O failure.
    pub fn write_to_file(&self, path: impl AsRef<Path>) -> Result<(), StorageError> {
        let path = path.as_ref();
        let json = self.to_json_string()?;
        fs::write(path, json)
            .map_err(|e| StorageError::BackendError(format!("write {}: {e}", path.display())))
    }

    /// # Errors
    ///
    /// Returns `BackendError` on I/O failure, `SerializationError` on
    /// malformed content.
    pub fn read_from_file(path: impl AsRef<Path>) -> Result<Self, StorageError> {
        let path = path.as_ref();
        let json = fs::read_to_string(path)
            .map_err(|e| StorageError::BackendError(format!("read {}: {e}", path.display())))?;
        Self::from_json_str(&json)
    }
}
