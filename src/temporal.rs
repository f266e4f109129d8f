//! Temporal store: entities plus interval-scoped relationships.
//!
//! `TemporalStore` is the only write path for classification fields and
//! relationship intervals. Derived booleans (`is_active_client`,
//! `is_current`) are recomputed inside the same write that changes their
//! inputs, so no reader ever sees a stale derived value for a fresh write.

use std::fmt;
use std::sync::Arc;

use chrono::NaiveDate;
use tracing::{debug, info, warn};

use crate::entity::{flags, Entity, EntityId, EntityProfile, EntityType, ProspectStatus};
use crate::error::{ExecutionError, ValidationError, WarmpathResult};
use crate::import::ImportEvent;
use crate::relationship::{Relationship, RelationshipId, RelationshipKind};
use crate::storage::{
    EntityStore, InMemoryEntityStore, InMemoryRelationshipStore, RelationshipStore, StorageError,
    StoreSnapshot,
};
use crate::time::{today, DateRange, IntervalStatus};

/// Attempts for a read-modify-write that loses to a concurrent writer.
const MAX_WRITE_ATTEMPTS: usize = 8;

/// Applies the identifiers, flags and attributes carried by `record`.
///
/// Identifiers the entity lacks are added; stored identifier values are
/// never overwritten. Only flags present in the record are applied; absent
/// flags leave stored values unchanged.
pub(crate) fn apply_record(
    entity: &mut Entity,
    record: &ImportEvent,
    today: NaiveDate,
) -> Result<(), ValidationError> {
    for (key, value) in record.normalized_identifiers() {
        entity.identifiers.entry(key).or_insert(value);
    }

    let attrs = &record.attributes;
    match &mut entity.profile {
        EntityProfile::Company(profile) => {
            let client_flag = record.flag_value(flags::IS_CLIENT);
            if client_flag.is_some() || attrs.client_start_date.is_some() || attrs.client_end_date.is_some() {
                let is_client = client_flag.unwrap_or(profile.is_client());
                let start = attrs.client_start_date.or(profile.client_start_date());
                let end = attrs.client_end_date.or(profile.client_end_date());
                profile.set_client_window(is_client, start, end, today)?;
            }

            let prospect_flag = record.flag_value(flags::IS_PROSPECT);
            if prospect_flag.is_some() || attrs.prospect_status.is_some() || attrs.prospect_added_date.is_some() {
                let is_prospect = prospect_flag.unwrap_or(profile.is_prospect());
                profile.set_prospect(is_prospect, attrs.prospect_status, attrs.prospect_added_date, today);
            }
        }
        EntityProfile::Person(profile) => {
            let known = record.flag_value(flags::IS_KNOWN_CONTACT);
            if known.is_some() || attrs.contact_source.is_some() {
                let known = known.unwrap_or(profile.is_known_contact());
                profile.set_known_contact(known, attrs.contact_source.clone());
            }
        }
        EntityProfile::PeFirm(profile) => {
            if let Some(is_client) = record.flag_value(flags::IS_CLIENT) {
                profile.is_client = is_client;
            }
        }
    }
    Ok(())
}

/// Entities and relationships with temporal queries.
///
/// # Examples
///
/// ```
/// use chrono::NaiveDate;
/// use warmpath::{EntityType, ImportEvent, RelationshipKind, TemporalStore};
///
/// let store = TemporalStore::in_memory();
/// let acme = store
///     .upsert_entity(&ImportEvent::new(EntityType::Company, "Acme").identifier("domain", "acme.com"))
///     .unwrap();
/// let jane = store
///     .upsert_entity(&ImportEvent::new(EntityType::Person, "Jane Doe"))
///     .unwrap();
///
/// let start = NaiveDate::from_ymd_opt(2020, 1, 1).unwrap();
/// store
///     .record_relationship(RelationshipKind::Employment, jane, acme, start, None)
///     .unwrap();
/// assert_eq!(store.current_relationships(acme, RelationshipKind::Employment).unwrap().len(), 1);
/// ```
#[derive(Clone)]
pub struct TemporalStore {
    entities: Arc<dyn EntityStore>,
    relationships: Arc<dyn RelationshipStore>,
}

impl fmt::Debug for TemporalStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TemporalStore").finish_non_exhaustive()
    }
}

impl TemporalStore {
    /// Creates a store over the given backends.
    #[must_use]
    pub fn new(entities: Arc<dyn EntityStore>, relationships: Arc<dyn RelationshipStore>) -> Self {
        Self {
            entities,
            relationships,
        }
    }

    /// Creates an empty store over the in-memory backends.
    #[must_use]
    pub fn in_memory() -> Self {
        Self::new(
            Arc::new(InMemoryEntityStore::new()),
            Arc::new(InMemoryRelationshipStore::new()),
        )
    }

    /// Restores a snapshot into fresh in-memory backends.
    ///
    /// # Errors
    ///
    /// Returns a storage error for an unreadable or colliding snapshot.
    pub fn from_snapshot(snapshot: StoreSnapshot, today: NaiveDate) -> WarmpathResult<Self> {
        let store = Self::in_memory();
        snapshot.restore_into(store.entities.as_ref(), store.relationships.as_ref(), today)?;
        Ok(store)
    }

    /// Exports every entity and relationship.
    ///
    /// # Errors
    ///
    /// Propagates backend failures.
    pub fn snapshot(&self) -> WarmpathResult<StoreSnapshot> {
        Ok(StoreSnapshot::capture(
            self.entities.as_ref(),
            self.relationships.as_ref(),
        )?)
    }

    // ---------------------------------------------------------------------
    // Entities
    // ---------------------------------------------------------------------

    /// Creates or updates the entity described by `record`.
    ///
    /// An entity owning one of the record's identifiers is updated in place;
    /// otherwise a new entity is created. This does no name matching; use
    /// the resolver for that.
    ///
    /// # Errors
    ///
    /// - `ValidationError` for a malformed record
    /// - `StorageError::DuplicateKey` if a concurrent writer claimed one of
    ///   the identifiers first
    pub fn upsert_entity(&self, record: &ImportEvent) -> WarmpathResult<EntityId> {
        record.validate()?;
        for (key, value) in record.normalized_identifiers() {
            if let Some(existing) = self.entities.find_by_identifier(record.entity_type, &key, &value)? {
                return Ok(self.merge_record(existing.id, record)?.id);
            }
        }
        Ok(self.create_entity(record)?.id)
    }

    /// Inserts a new entity built from `record`. Flags absent from the
    /// record are false.
    ///
    /// # Errors
    ///
    /// - `ValidationError` for a malformed record
    /// - `StorageError::DuplicateKey` if an identifier is already taken
    pub fn create_entity(&self, record: &ImportEvent) -> WarmpathResult<Entity> {
        record.validate()?;
        let mut entity = Entity::new(record.entity_type, record.name.trim())
            .with_source_tag(record.source_tag.clone());
        apply_record(&mut entity, record, today())?;
        self.entities.insert(entity.clone())?;
        info!(
            entity_id = %entity.id,
            entity_type = %entity.entity_type(),
            name = %entity.name,
            source = %entity.source_tag,
            "entity created"
        );
        Ok(entity)
    }

    /// Folds `record` into an existing entity: missing identifiers are added
    /// and only the flags present in the record are applied.
    ///
    /// # Errors
    ///
    /// - `EntityNotFound` for an unknown id
    /// - `ValidationError` for a malformed record or a type mismatch
    /// - `StorageError::DuplicateKey` if an added identifier is taken
    pub fn merge_record(&self, id: EntityId, record: &ImportEvent) -> WarmpathResult<Entity> {
        record.validate()?;
        let today = today();
        self.modify_entity(id, |entity| {
            if entity.entity_type() != record.entity_type {
                return Err(ValidationError::InvalidField {
                    field: "entity_type".to_string(),
                    reason: format!(
                        "cannot merge a {} record into {} {}",
                        record.entity_type,
                        entity.entity_type(),
                        entity.id
                    ),
                }
                .into());
            }
            apply_record(entity, record, today)?;
            Ok(())
        })
    }

    /// Sets the client window of a company, or the client flag of a PE firm.
    ///
    /// PE firms carry no client dates; `start` and `end` are ignored for them.
    ///
    /// # Errors
    ///
    /// - `EntityNotFound` for an unknown id
    /// - `UnsupportedFlag` for a person
    /// - `InvalidInterval` if `end < start`
    pub fn set_client_window(
        &self,
        id: EntityId,
        is_client: bool,
        start: Option<NaiveDate>,
        end: Option<NaiveDate>,
    ) -> WarmpathResult<Entity> {
        let today = today();
        self.modify_entity(id, |entity| {
            let entity_type = entity.entity_type();
            match &mut entity.profile {
                EntityProfile::Company(profile) => profile.set_client_window(is_client, start, end, today)?,
                EntityProfile::PeFirm(profile) => profile.is_client = is_client,
                EntityProfile::Person(_) => {
                    return Err(ValidationError::UnsupportedFlag {
                        flag: flags::IS_CLIENT.to_string(),
                        entity_type,
                    }
                    .into())
                }
            }
            Ok(())
        })
    }

    /// Sets prospect status of a company.
    ///
    /// # Errors
    ///
    /// - `EntityNotFound` for an unknown id
    /// - `UnsupportedFlag` for anything but a company
    pub fn set_prospect(
        &self,
        id: EntityId,
        is_prospect: bool,
        status: Option<ProspectStatus>,
    ) -> WarmpathResult<Entity> {
        let today = today();
        self.modify_entity(id, |entity| {
            let entity_type = entity.entity_type();
            let Some(profile) = entity.company_mut() else {
                return Err(ValidationError::UnsupportedFlag {
                    flag: flags::IS_PROSPECT.to_string(),
                    entity_type,
                }
                .into());
            };
            profile.set_prospect(is_prospect, status, None, today);
            Ok(())
        })
    }

    /// Recomputes `is_active_client` for every company against `today`.
    /// Returns how many companies changed.
    ///
    /// # Errors
    ///
    /// Propagates backend failures.
    pub fn refresh_derived_flags(&self, today: NaiveDate) -> WarmpathResult<usize> {
        let mut changed = 0;
        for company in self.entities.list_by_type(EntityType::Company)? {
            let stale = company
                .company()
                .is_some_and(|p| p.is_active_client() != p.is_active_client_on(today));
            if !stale {
                continue;
            }
            self.modify_entity(company.id, |entity| {
                if let Some(profile) = entity.company_mut() {
                    profile.refresh(today);
                }
                Ok(())
            })?;
            changed += 1;
        }
        if changed > 0 {
            info!(changed, %today, "refreshed derived client flags");
        }
        Ok(changed)
    }

    /// # Errors
    ///
    /// Returns `EntityNotFound` for an unknown id.
    pub fn get_entity(&self, id: EntityId) -> WarmpathResult<Entity> {
        self.entities
            .get(id)?
            .ok_or_else(|| ExecutionError::EntityNotFound { id }.into())
    }

    /// Entity owning an identifier; the value is normalized before lookup.
    ///
    /// # Errors
    ///
    /// Propagates backend failures.
    pub fn find_by_identifier(
        &self,
        entity_type: EntityType,
        key: &str,
        value: &str,
    ) -> WarmpathResult<Option<Entity>> {
        Ok(self.entities.find_by_identifier(entity_type, key, value)?)
    }

    /// Entities of a type with the given name, case-insensitively.
    ///
    /// # Errors
    ///
    /// Propagates backend failures.
    pub fn find_by_name(&self, entity_type: EntityType, name: &str) -> WarmpathResult<Vec<Entity>> {
        Ok(self.entities.find_by_name(entity_type, name)?)
    }

    /// # Errors
    ///
    /// Propagates backend failures.
    pub fn list_by_type(&self, entity_type: EntityType) -> WarmpathResult<Vec<Entity>> {
        Ok(self.entities.list_by_type(entity_type)?)
    }

    /// # Errors
    ///
    /// Propagates backend failures.
    pub fn all_entities(&self) -> WarmpathResult<Vec<Entity>> {
        Ok(self.entities.all()?)
    }

    /// Active client companies plus client PE firms on `as_of`, ordered by id.
    ///
    /// # Errors
    ///
    /// Propagates backend failures.
    pub fn home_network(&self, as_of: NaiveDate) -> WarmpathResult<Vec<EntityId>> {
        let mut ids: Vec<EntityId> = [EntityType::Company, EntityType::PeFirm]
            .into_iter()
            .map(|t| self.entities.list_by_type(t))
            .collect::<Result<Vec<_>, _>>()?
            .into_iter()
            .flatten()
            .filter(|e| e.is_home_network_member(as_of))
            .map(|e| e.id)
            .collect();
        ids.sort();
        Ok(ids)
    }

    fn modify_entity<F>(&self, id: EntityId, mut apply: F) -> WarmpathResult<Entity>
    where
        F: FnMut(&mut Entity) -> WarmpathResult<()>,
    {
        for attempt in 1..=MAX_WRITE_ATTEMPTS {
            let before = self.get_entity(id)?;
            let mut entity = before.clone();
            apply(&mut entity)?;
            if entity.identifiers == before.identifiers
                && entity.profile == before.profile
                && entity.name == before.name
            {
                return Ok(entity);
            }

            entity.touch();
            match self.entities.update(entity.clone()) {
                Ok(()) => {
                    debug!(entity_id = %id, version = entity.version, "entity updated");
                    return Ok(entity);
                }
                Err(StorageError::VersionConflict(reason)) => {
                    warn!(entity_id = %id, attempt, %reason, "entity update lost a race; retrying");
                }
                Err(err) => return Err(err.into()),
            }
        }
        Err(StorageError::VersionConflict(format!(
            "entity {id} changed {MAX_WRITE_ATTEMPTS} times during update"
        ))
        .into())
    }

    // ---------------------------------------------------------------------
    // Relationships
    // ---------------------------------------------------------------------

    /// Records a relationship over `[start, end]`, or an open one if `end`
    /// is `None`.
    ///
    /// Re-recording an identical relationship returns the existing id.
    ///
    /// # Errors
    ///
    /// - `InvalidInterval` if `end < start`
    /// - `EntityNotFound` if either party is unknown
    /// - `PartyMismatch` / `SelfRelationship` for ill-typed parties
    /// - `OverlappingCurrentRelationship` if another relationship of the same
    ///   kind between the same parties is already current
    pub fn record_relationship(
        &self,
        kind: RelationshipKind,
        party_a: EntityId,
        party_b: EntityId,
        start: NaiveDate,
        end: Option<NaiveDate>,
    ) -> WarmpathResult<RelationshipId> {
        let range = DateRange::new(start, end)?;
        self.insert_relationship(Relationship::new(kind, party_a, party_b, range))
    }

    /// Records a fully built relationship (title, source tag, ...).
    ///
    /// # Errors
    ///
    /// Same as [`TemporalStore::record_relationship`].
    pub fn insert_relationship(&self, relationship: Relationship) -> WarmpathResult<RelationshipId> {
        if relationship.party_a == relationship.party_b {
            return Err(ValidationError::SelfRelationship {
                id: relationship.party_a,
            }
            .into());
        }
        let a = self.get_entity(relationship.party_a)?;
        let b = self.get_entity(relationship.party_b)?;
        relationship
            .kind
            .validate_parties(a.entity_type(), b.entity_type())?;

        if let Some(existing) = self.find_duplicate(&relationship)? {
            debug!(relationship_id = %existing, kind = %relationship.kind, "relationship already recorded");
            return Ok(existing);
        }

        let id = relationship.id;
        let kind = relationship.kind;
        let range = *relationship.range();
        match self.relationships.insert(relationship.clone()) {
            Ok(()) => {}
            // A concurrent writer recorded the same current relationship.
            Err(StorageError::DuplicateKey(_)) => {
                if let Some(existing) = self.find_duplicate(&relationship)? {
                    return Ok(existing);
                }
                return Err(StorageError::DuplicateKey(id.to_string()).into());
            }
            Err(err) => return Err(err.into()),
        }

        info!(
            relationship_id = %id,
            %kind,
            party_a = %a.id,
            party_b = %b.id,
            range = %range,
            "relationship recorded"
        );
        Ok(id)
    }

    /// Returns the id of an identical stored relationship, or fails if a
    /// different one of the same kind is already current.
    fn find_duplicate(&self, candidate: &Relationship) -> WarmpathResult<Option<RelationshipId>> {
        let existing = self
            .relationships
            .find_between(candidate.kind, candidate.party_a, candidate.party_b)?;

        if let Some(same) = existing.iter().find(|r| r.range() == candidate.range()) {
            return Ok(Some(same.id));
        }
        if candidate.is_current() {
            if let Some(open) = existing.iter().find(|r| r.is_current()) {
                return Err(ExecutionError::OverlappingCurrentRelationship {
                    kind: candidate.kind,
                    party_a: candidate.party_a,
                    party_b: candidate.party_b,
                    existing: open.id,
                }
                .into());
            }
        }
        Ok(None)
    }

    /// Sets the end day of a relationship.
    ///
    /// Closing an already-closed relationship with the same day is a no-op.
    ///
    /// # Errors
    ///
    /// - `RelationshipNotFound` for an unknown id
    /// - `InvalidInterval` if `end` precedes the start
    /// - `RelationshipAlreadyClosed` if it was closed on a different day
    pub fn close_relationship(&self, id: RelationshipId, end: NaiveDate) -> WarmpathResult<Relationship> {
        for attempt in 1..=MAX_WRITE_ATTEMPTS {
            let mut relationship = self.get_relationship(id)?;
            if let Some(closed_on) = relationship.end_date() {
                if closed_on == end {
                    return Ok(relationship);
                }
                return Err(ExecutionError::RelationshipAlreadyClosed { id, end: closed_on }.into());
            }

            let open = *relationship.range();
            relationship.close(end)?;
            match self.relationships.update(relationship.clone(), &open) {
                Ok(()) => {
                    info!(relationship_id = %id, kind = %relationship.kind, %end, "relationship closed");
                    return Ok(relationship);
                }
                // Re-read: the winner's end day decides the outcome.
                Err(StorageError::VersionConflict(reason)) => {
                    warn!(relationship_id = %id, attempt, %reason, "relationship close lost a race");
                }
                Err(err) => return Err(err.into()),
            }
        }
        Err(StorageError::VersionConflict(format!(
            "relationship {id} changed {MAX_WRITE_ATTEMPTS} times during close"
        ))
        .into())
    }

    /// # Errors
    ///
    /// Returns `RelationshipNotFound` for an unknown id.
    pub fn get_relationship(&self, id: RelationshipId) -> WarmpathResult<Relationship> {
        self.relationships
            .get(id)?
            .ok_or_else(|| ExecutionError::RelationshipNotFound { id }.into())
    }

    /// Every relationship involving the entity, oldest first.
    ///
    /// # Errors
    ///
    /// Returns `EntityNotFound` for an unknown id.
    pub fn relationships_of(&self, entity: EntityId) -> WarmpathResult<Vec<Relationship>> {
        self.get_entity(entity)?;
        Ok(self.relationships.find_by_entity(entity)?)
    }

    /// Relationships of `kind` involving the entity that have no end date.
    ///
    /// # Errors
    ///
    /// Returns `EntityNotFound` for an unknown id.
    pub fn current_relationships(
        &self,
        entity: EntityId,
        kind: RelationshipKind,
    ) -> WarmpathResult<Vec<Relationship>> {
        let mut rels = self.relationships_of(entity)?;
        rels.retain(|r| r.kind == kind && r.is_current());
        Ok(rels)
    }

    /// Relationships of `kind` involving the entity whose interval contains
    /// `date`.
    ///
    /// # Errors
    ///
    /// Returns `EntityNotFound` for an unknown id.
    pub fn as_of(
        &self,
        entity: EntityId,
        kind: RelationshipKind,
        date: NaiveDate,
    ) -> WarmpathResult<Vec<Relationship>> {
        let mut rels = self.relationships_of(entity)?;
        rels.retain(|r| r.kind == kind && r.status_on(date) == IntervalStatus::Current);
        Ok(rels)
    }

    /// # Errors
    ///
    /// Propagates backend failures.
    pub fn all_relationships(&self) -> WarmpathResult<Vec<Relationship>> {
        Ok(self.relationships.all()?)
    }
}
