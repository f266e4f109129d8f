//! Entity resolution.
//!
//! Maps an incoming import record onto a stored entity with a three-step
//! cascade, first hit wins:
//!
//! 1. exact normalized identifier
//! 2. case-insensitive exact name
//! 3. Jaro-Winkler similarity at or above the configured threshold
//!
//! Steps 1 and 2 may match automatically. Step 3 never does; its candidates
//! go to review. When nothing matches, the entity is created under the sharded
//! locks for all of its identity keys so concurrent imports of the same
//! entity converge on one id.

mod locks;

pub use locks::{identity_key, identity_keys, IdentityLocks};

use std::cmp::Ordering;
use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::config::ResolverConfig;
use crate::entity::{Entity, EntityId};
use crate::error::{ExecutionError, WarmpathError, WarmpathResult};
use crate::import::ImportEvent;
use crate::normalize::name_similarity;
use crate::review::{MatchCandidate, ReviewReason};
use crate::storage::StorageError;
use crate::temporal::TemporalStore;

/// Outcome of resolving one import record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum Resolution {
    /// The record is an existing entity; its data was merged in.
    Matched { entity_id: EntityId },
    /// The resolver could not decide; route to review.
    Ambiguous {
        reason: ReviewReason,
        candidates: Vec<MatchCandidate>,
    },
    /// No existing entity matched; a new one was created.
    Created { entity_id: EntityId },
}

impl Resolution {
    /// The resolved entity, unless ambiguous.
    #[must_use]
    pub const fn entity_id(&self) -> Option<EntityId> {
        match self {
            Self::Matched { entity_id } | Self::Created { entity_id } => Some(*entity_id),
            Self::Ambiguous { .. } => None,
        }
    }

    #[must_use]
    pub const fn is_ambiguous(&self) -> bool {
        matches!(self, Self::Ambiguous { .. })
    }
}

/// What the matching cascade found, before anything is written.
enum MatchStep {
    Single(Entity),
    Ambiguous(ReviewReason, Vec<MatchCandidate>),
}

fn exact_candidate(entity: &Entity) -> MatchCandidate {
    MatchCandidate {
        entity_id: entity.id,
        name: entity.name.clone(),
        score: 1.0,
        updated_at: entity.updated_at,
    }
}

/// Score descending, then most recently updated, then id for determinism.
fn rank_candidates(candidates: &mut Vec<MatchCandidate>, limit: usize) {
    candidates.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(Ordering::Equal)
            .then_with(|| b.updated_at.cmp(&a.updated_at))
            .then_with(|| a.entity_id.cmp(&b.entity_id))
    });
    candidates.truncate(limit);
}

/// Resolves import records against a [`TemporalStore`].
#[derive(Debug)]
pub struct Resolver {
    store: TemporalStore,
    config: ResolverConfig,
    locks: IdentityLocks,
}

impl Resolver {
    /// Creates a resolver. The config is assumed validated.
    #[must_use]
    pub fn new(store: TemporalStore, config: ResolverConfig) -> Self {
        let locks = IdentityLocks::new(config.identity_lock_shards);
        Self {
            store,
            config,
            locks,
        }
    }

    #[must_use]
    pub const fn store(&self) -> &TemporalStore {
        &self.store
    }

    #[must_use]
    pub const fn config(&self) -> &ResolverConfig {
        &self.config
    }

    /// Resolves `event` to an entity, creating one if nothing matches.
    ///
    /// # Errors
    ///
    /// - `ValidationError` for a malformed record
    /// - `CreateContention` if creation kept losing races
    /// - `StorageError` on backend failure
    pub fn resolve(&self, event: &ImportEvent) -> WarmpathResult<Resolution> {
        event.validate()?;

        if let Some(step) = self.find_match(event)? {
            return self.settle(event, step);
        }

        let key = identity_key(event);
        let keys = identity_keys(event);
        for attempt in 1..=self.config.max_create_attempts {
            let guards = self.locks.lock_all(&keys)?;

            // Another pipeline may have created it while we waited.
            if let Some(step) = self.find_match(event)? {
                drop(guards);
                return self.settle(event, step);
            }

            match self.store.create_entity(event) {
                Ok(entity) => {
                    drop(guards);
                    return Ok(Resolution::Created {
                        entity_id: entity.id,
                    });
                }
                Err(WarmpathError::Storage(StorageError::DuplicateKey(reason))) => {
                    drop(guards);
                    warn!(%key, attempt, %reason, "entity create lost a race; re-resolving");
                }
                Err(err) => return Err(err),
            }
        }

        Err(ExecutionError::CreateContention {
            key,
            attempts: self.config.max_create_attempts,
        }
        .into())
    }

    /// Creates a new entity from `event` without matching, under the same
    /// identity locks as [`Resolver::resolve`].
    ///
    /// Used when a reviewer has already ruled out the existing candidates.
    ///
    /// # Errors
    ///
    /// - `ValidationError` for a malformed record
    /// - `DuplicateKey` if one of its identifiers already belongs to another
    ///   entity
    pub fn create_new(&self, event: &ImportEvent) -> WarmpathResult<Entity> {
        event.validate()?;
        let _guards = self.locks.lock_all(&identity_keys(event))?;
        self.store.create_entity(event)
    }

    fn settle(&self, event: &ImportEvent, step: MatchStep) -> WarmpathResult<Resolution> {
        match step {
            MatchStep::Single(entity) => {
                let merged = self.store.merge_record(entity.id, event)?;
                info!(
                    entity_id = %merged.id,
                    entity_type = %merged.entity_type(),
                    name = %event.name,
                    "import matched existing entity"
                );
                Ok(Resolution::Matched {
                    entity_id: merged.id,
                })
            }
            MatchStep::Ambiguous(reason, candidates) => {
                info!(
                    entity_type = %event.entity_type,
                    name = %event.name,
                    %reason,
                    candidates = candidates.len(),
                    "import is ambiguous"
                );
                Ok(Resolution::Ambiguous { reason, candidates })
            }
        }
    }

    fn find_match(&self, event: &ImportEvent) -> WarmpathResult<Option<MatchStep>> {
        let identifiers = event.normalized_identifiers();

        // Step 1: exact identifier.
        let mut by_identifier: BTreeMap<EntityId, Entity> = BTreeMap::new();
        for (key, value) in &identifiers {
            if let Some(entity) = self.store.find_by_identifier(event.entity_type, key, value)? {
                by_identifier.insert(entity.id, entity);
            }
        }
        debug!(
            entity_type = %event.entity_type,
            identifiers = identifiers.len(),
            hits = by_identifier.len(),
            "identifier match step"
        );
        match by_identifier.len() {
            0 => {}
            1 => return Ok(by_identifier.into_values().next().map(MatchStep::Single)),
            _ => {
                let mut candidates: Vec<MatchCandidate> = by_identifier.values().map(exact_candidate).collect();
                rank_candidates(&mut candidates, self.config.max_candidates);
                return Ok(Some(MatchStep::Ambiguous(ReviewReason::IdentifierConflict, candidates)));
            }
        }

        // Step 2: exact name.
        let by_name = self.store.find_by_name(event.entity_type, &event.name)?;
        debug!(entity_type = %event.entity_type, name = %event.name, hits = by_name.len(), "name match step");
        match by_name.len() {
            0 => {}
            1 => {
                let entity = by_name.into_iter().next();
                return Ok(entity.map(|entity| {
                    let conflicting = identifiers
                        .iter()
                        .any(|(key, value)| entity.identifier(key).is_some_and(|stored| stored != value.as_str()));
                    if conflicting {
                        MatchStep::Ambiguous(ReviewReason::IdentifierConflict, vec![exact_candidate(&entity)])
                    } else {
                        MatchStep::Single(entity)
                    }
                }));
            }
            _ => {
                let mut candidates: Vec<MatchCandidate> = by_name.iter().map(exact_candidate).collect();
                rank_candidates(&mut candidates, self.config.max_candidates);
                return Ok(Some(MatchStep::Ambiguous(ReviewReason::MultipleNameMatches, candidates)));
            }
        }

        // Step 3: fuzzy name.
        let mut candidates: Vec<MatchCandidate> = self
            .store
            .list_by_type(event.entity_type)?
            .into_iter()
            .filter_map(|entity| {
                let score = name_similarity(&event.name, &entity.name);
                (score >= self.config.fuzzy_threshold).then(|| MatchCandidate {
                    entity_id: entity.id,
                    name: entity.name,
                    score,
                    updated_at: entity.updated_at,
                })
            })
            .collect();
        debug!(
            entity_type = %event.entity_type,
            name = %event.name,
            threshold = self.config.fuzzy_threshold,
            hits = candidates.len(),
            "fuzzy match step"
        );
        if candidates.is_empty() {
            return Ok(None);
        }
        rank_candidates(&mut candidates, self.config.max_candidates);
        Ok(Some(MatchStep::Ambiguous(ReviewReason::FuzzyNameMatch, candidates)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::entity::{flags, EntityType};

    fn resolver() -> Resolver {
        Resolver::new(TemporalStore::in_memory(), ResolverConfig::default())
    }

    #[test]
    fn creates_then_matches_by_identifier() {
        let resolver = resolver();
        let event = ImportEvent::new(EntityType::Company, "Acme").identifier("domain", "acme.com");

        let first = resolver.resolve(&event).unwrap();
        assert!(matches!(first, Resolution::Created { .. }));
        let second = resolver.resolve(&event).unwrap();
        assert_eq!(second, Resolution::Matched { entity_id: first.entity_id().unwrap() });

        // A renamed record with the same identifier still matches.
        let renamed = ImportEvent::new(EntityType::Company, "Acme Holdings").identifier("domain", "https://acme.com/");
        assert_eq!(resolver.resolve(&renamed).unwrap().entity_id(), first.entity_id());
        assert_eq!(resolver.store().list_by_type(EntityType::Company).unwrap().len(), 1);
    }

    #[test]
    #[tracing_test::traced_test]
    fn resolution_steps_are_logged() {
        let resolver = resolver();
        let event = ImportEvent::new(EntityType::Company, "Acme").identifier("domain", "acme.com");
        resolver.resolve(&event).unwrap();
        assert!(logs_contain("identifier match step"));
        assert!(logs_contain("entity created"));

        resolver.resolve(&event).unwrap();
        assert!(logs_contain("import matched existing entity"));
    }

    #[test]
    fn matches_name_case_insensitively() {
        let resolver = resolver();
        let created = resolver
            .resolve(&ImportEvent::new(EntityType::Company, "Acme Corp"))
            .unwrap();
        let matched = resolver
            .resolve(&ImportEvent::new(EntityType::Company, "  ACME   corp"))
            .unwrap();
        assert_eq!(matched, Resolution::Matched { entity_id: created.entity_id().unwrap() });
    }

    #[test]
    fn name_match_with_conflicting_identifier_is_ambiguous() {
        let resolver = resolver();
        resolver
            .resolve(&ImportEvent::new(EntityType::Company, "Acme").identifier("domain", "acme.com"))
            .unwrap();

        let outcome = resolver
            .resolve(&ImportEvent::new(EntityType::Company, "Acme").identifier("domain", "acme.io"))
            .unwrap();
        assert!(matches!(
            outcome,
            Resolution::Ambiguous {
                reason: ReviewReason::IdentifierConflict,
                ..
            }
        ));
    }

    #[test]
    fn identifiers_pointing_at_two_entities_are_ambiguous() {
        let resolver = resolver();
        let a = resolver
            .resolve(&ImportEvent::new(EntityType::Person, "Jane Doe").identifier("email", "jane@acme.com"))
            .unwrap();
        let b = resolver
            .resolve(&ImportEvent::new(EntityType::Person, "J. Smith").identifier("network_id", "linkedin.com/in/js"))
            .unwrap();
        let outcome = resolver
            .resolve(
                &ImportEvent::new(EntityType::Person, "Jane Smith")
                    .identifier("email", "jane@acme.com")
                    .identifier("network_id", "linkedin.com/in/js"),
            )
            .unwrap();
        let Resolution::Ambiguous { reason, candidates } = outcome else {
            panic!("expected ambiguity");
        };
        assert_eq!(reason, ReviewReason::IdentifierConflict);
        let ids: Vec<_> = candidates.iter().map(|c| c.entity_id).collect();
        assert!(ids.contains(&a.entity_id().unwrap()));
        assert!(ids.contains(&b.entity_id().unwrap()));
    }

    #[test]
    fn multiple_exact_names_are_ambiguous() {
        let resolver = resolver();
        let store = resolver.store();
        store
            .create_entity(&ImportEvent::new(EntityType::Person, "John Smith").identifier("email", "a@x.com"))
            .unwrap();
        store
            .create_entity(&ImportEvent::new(EntityType::Person, "John Smith").identifier("email", "b@y.com"))
            .unwrap();
        let outcome = resolver
            .resolve(&ImportEvent::new(EntityType::Person, "john smith"))
            .unwrap();
        let Resolution::Ambiguous { reason, candidates } = outcome else {
            panic!("expected ambiguity");
        };
        assert_eq!(reason, ReviewReason::MultipleNameMatches);
        assert_eq!(candidates.len(), 2);
    }

    #[test]
    fn fuzzy_match_never_auto_matches() {
        let resolver = resolver();
        resolver
            .resolve(&ImportEvent::new(EntityType::Company, "Salesforce, Inc."))
            .unwrap();
        let outcome = resolver
            .resolve(&ImportEvent::new(EntityType::Company, "Salesforce LLC"))
            .unwrap();
        let Resolution::Ambiguous { reason, candidates } = outcome else {
            panic!("expected ambiguity");
        };
        assert_eq!(reason, ReviewReason::FuzzyNameMatch);
        assert_eq!(candidates[0].name, "Salesforce, Inc.");
        assert!(candidates[0].score >= 0.88);

        // Nothing was written for the ambiguous record.
        assert_eq!(resolver.store().list_by_type(EntityType::Company).unwrap().len(), 1);
    }

    #[test]
    fn fuzzy_candidates_are_ranked_and_truncated() {
        let config = ResolverConfig {
            max_candidates: 2,
            ..ResolverConfig::default()
        };
        let resolver = Resolver::new(TemporalStore::in_memory(), config);
        for name in ["Acme Labs", "Acme Lab", "Acme Labz", "Zenith"] {
            resolver.store().create_entity(&ImportEvent::new(EntityType::Company, name)).unwrap();
        }
        let outcome = resolver
            .resolve(&ImportEvent::new(EntityType::Company, "Acme Labs Inc"))
            .unwrap();
        // "Acme Labs Inc" has the same fuzzy key as "Acme Labs" but not the same name.
        let Resolution::Ambiguous { candidates, .. } = outcome else {
            panic!("expected ambiguity");
        };
        assert_eq!(candidates.len(), 2);
        assert_eq!(candidates[0].name, "Acme Labs");
        assert!(candidates[0].score >= candidates[1].score);
    }

    #[test]
    fn below_threshold_creates() {
        let resolver = resolver();
        resolver.resolve(&ImportEvent::new(EntityType::Company, "Salesforce")).unwrap();
        let outcome = resolver
            .resolve(&ImportEvent::new(EntityType::Company, "Microsoft"))
            .unwrap();
        assert!(matches!(outcome, Resolution::Created { .. }));
    }

    #[test]
    fn match_applies_only_present_flags() {
        let resolver = resolver();
        let id = resolver
            .resolve(
                &ImportEvent::new(EntityType::Company, "Acme")
                    .identifier("domain", "acme.com")
                    .flag(flags::IS_CLIENT, true),
            )
            .unwrap()
            .entity_id()
            .unwrap();
        resolver
            .resolve(
                &ImportEvent::new(EntityType::Company, "Acme")
                    .identifier("domain", "acme.com")
                    .flag(flags::IS_PROSPECT, true),
            )
            .unwrap();

        let entity = resolver.store().get_entity(id).unwrap();
        let profile = entity.company().unwrap();
        assert!(profile.is_client());
        assert!(profile.is_prospect());
    }

    #[test]
    fn resolution_serializes_as_tagged_union() {
        let json = serde_json::to_value(Resolution::Created { entity_id: EntityId::new() }).unwrap();
        assert_eq!(json["outcome"], "created");
        assert!(json["entity_id"].is_string());
    }
}
