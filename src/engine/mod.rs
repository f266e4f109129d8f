//! Import engine.
//!
//! Ties the components together for one caller: an import event is
//! validated, resolved against the [`TemporalStore`], parked in the
//! [`ReviewQueue`] when ambiguous, and handed to the cascade controller for
//! an enrichment plan. Adjudication applies a reviewer's decision back to
//! the store and closes the review item.

/// Worker pools separating imports from path queries.
pub mod runtime;

use std::fmt;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::cascade::{EnrichmentBatch, EnrichmentPlan};
use crate::config::WarmpathConfig;
use crate::entity::EntityId;
use crate::error::WarmpathResult;
use crate::import::ImportEvent;
use crate::paths::{ConnectionPath, PathFinder, PathQuery};
use crate::resolver::{Resolution, Resolver};
use crate::review::{ReviewItem, ReviewItemId, ReviewQueue, ReviewResolution, TransitionDetails};
use crate::temporal::TemporalStore;

/// Result of importing one event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImportOutcome {
    pub resolution: Resolution,

    /// Set when the resolution was ambiguous.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub review_item: Option<ReviewItemId>,

    /// `None` when ambiguous or when the batch already planned this entity.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub plan: Option<EnrichmentPlan>,
}

/// A reviewer's decision on a parked import.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "decision", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReviewDecision {
    /// Fold the payload into `target`.
    Merged { target: EntityId },
    /// The payload refers to `target`; record the link without merging.
    LinkedToExisting { target: EntityId },
    /// Create a new entity from the payload.
    CreatedNew,
    /// Drop the payload.
    Rejected,
}

impl ReviewDecision {
    #[must_use]
    pub const fn resolution(self) -> ReviewResolution {
        match self {
            Self::Merged { .. } => ReviewResolution::Merged,
            Self::LinkedToExisting { .. } => ReviewResolution::LinkedToExisting,
            Self::CreatedNew => ReviewResolution::CreatedNew,
            Self::Rejected => ReviewResolution::Rejected,
        }
    }
}

/// Synchronous front door for imports, adjudication and path queries.
pub struct ImportEngine {
    store: TemporalStore,
    resolver: Resolver,
    queue: ReviewQueue,
    paths: PathFinder,
}

impl fmt::Debug for ImportEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ImportEngine")
            .field("store", &self.store)
            .field("queue", &self.queue)
            .field("paths", &self.paths)
            .finish_non_exhaustive()
    }
}

impl ImportEngine {
    /// Builds an engine over existing stores.
    ///
    /// # Errors
    ///
    /// Returns `InvalidConfig` if `config` fails validation.
    pub fn new(store: TemporalStore, queue: ReviewQueue, config: WarmpathConfig) -> WarmpathResult<Self> {
        let config = config.validate()?;
        Ok(Self {
            resolver: Resolver::new(store.clone(), config.resolver),
            paths: PathFinder::new(config.paths),
            store,
            queue,
        })
    }

    /// Engine over fresh in-memory stores.
    ///
    /// # Errors
    ///
    /// Returns `InvalidConfig` if `config` fails validation.
    pub fn in_memory(config: WarmpathConfig) -> WarmpathResult<Self> {
        Self::new(TemporalStore::in_memory(), ReviewQueue::in_memory(), config)
    }

    #[must_use]
    pub const fn store(&self) -> &TemporalStore {
        &self.store
    }

    #[must_use]
    pub const fn resolver(&self) -> &Resolver {
        &self.resolver
    }

    #[must_use]
    pub const fn queue(&self) -> &ReviewQueue {
        &self.queue
    }

    #[must_use]
    pub const fn path_finder(&self) -> &PathFinder {
        &self.paths
    }

    /// Resolves `event`, parks ambiguity for review and plans enrichment.
    ///
    /// # Errors
    ///
    /// - `ValidationError` for a malformed event
    /// - storage errors, or `CreateContention` if the create path kept losing
    pub fn import(&self, event: &ImportEvent, batch: &EnrichmentBatch) -> WarmpathResult<ImportOutcome> {
        let resolution = self.resolver.resolve(event)?;

        match &resolution {
            Resolution::Ambiguous { reason, candidates } => {
                let item = ReviewItem::new(event.clone(), *reason, candidates.clone());
                let review_item = self.queue.enqueue(item)?;
                Ok(ImportOutcome {
                    resolution,
                    review_item: Some(review_item),
                    plan: None,
                })
            }
            Resolution::Matched { entity_id } | Resolution::Created { entity_id } => {
                let plan = batch.plan(*entity_id, event.entity_type, event.depth)?;
                Ok(ImportOutcome {
                    resolution,
                    review_item: None,
                    plan,
                })
            }
        }
    }

    /// Applies `decision` to the store and resolves the review item.
    ///
    /// The item is claimed for `reviewer` before anything is written, so a
    /// second adjudicator is turned away without touching the store. A failed
    /// write leaves the item IN_REVIEW with `reviewer`.
    ///
    /// # Errors
    ///
    /// - `ReviewItemNotFound` for an unknown item
    /// - `ReviewItemClaimed` if another reviewer holds the item
    /// - `InvalidTransition` if the item is already RESOLVED or SKIPPED
    /// - `EntityNotFound` if the decision names an unknown target
    pub fn adjudicate(
        &self,
        item_id: ReviewItemId,
        decision: ReviewDecision,
        reviewer: &str,
    ) -> WarmpathResult<ReviewItem> {
        let claimed = self.queue.claim(item_id, reviewer)?;

        let resolved_entity = match decision {
            ReviewDecision::Merged { target } => Some(self.store.merge_record(target, &claimed.payload)?.id),
            ReviewDecision::LinkedToExisting { target } => Some(self.store.get_entity(target)?.id),
            ReviewDecision::CreatedNew => Some(self.resolver.create_new(&claimed.payload)?.id),
            ReviewDecision::Rejected => None,
        };

        let resolved = self.queue.resolve_claimed(
            &claimed,
            TransitionDetails::resolved(decision.resolution(), resolved_entity).reviewer(reviewer),
        )?;
        info!(
            review_item = %item_id,
            resolution = ?decision.resolution(),
            entity = ?resolved_entity,
            reviewer,
            "review item adjudicated"
        );
        Ok(resolved)
    }

    /// Paths from the current home network to `target`.
    ///
    /// # Errors
    ///
    /// Same as [`PathFinder::find_paths`].
    pub fn find_paths(
        &self,
        target: EntityId,
        max_path_length: usize,
        as_of: Option<NaiveDate>,
    ) -> WarmpathResult<Vec<ConnectionPath>> {
        let day = as_of.unwrap_or_else(crate::time::today);
        let home = self.store.home_network(day)?;
        self.paths
            .find_paths(&self.store, &home, target, max_path_length, Some(day))
    }

    /// Runs a [`PathQuery`] against the current home network.
    ///
    /// # Errors
    ///
    /// Same as [`PathFinder::find_paths`].
    pub fn query(&self, query: &PathQuery) -> WarmpathResult<Vec<ConnectionPath>> {
        self.find_paths(query.target, query.max_path_length, query.as_of)
    }
}
