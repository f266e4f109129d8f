//! Review items for ambiguous resolutions.
//!
//! Ambiguity is not an error. When the resolver cannot decide, the import
//! payload and its candidates are parked as a `ReviewItem` for a human or
//! automated adjudicator. Items move through a small state machine:
//!
//! ```text
//! PENDING ──► IN_REVIEW ──► RESOLVED
//!    ▲            │    └──► SKIPPED
//!    └────────────┘
//! ```
//!
//! RESOLVED and SKIPPED are terminal. A later correction is a new linkage
//! action against the store, never a reopened item.

use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use uuid::Uuid;

use crate::entity::{EntityId, EntityType};
use crate::error::{ExecutionError, WarmpathResult};
use crate::import::ImportEvent;
use crate::storage::{InMemoryReviewStore, ReviewStore, StorageError};

/// Unique identifier for a review item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ReviewItemId(Uuid);

impl ReviewItemId {
    /// Creates a new random review item ID.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ReviewItemId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ReviewItemId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Review lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReviewStatus {
    /// Waiting for an adjudicator.
    Pending,
    /// Claimed by an adjudicator.
    InReview,
    /// Adjudicated (terminal).
    Resolved,
    /// Deliberately left undecided (terminal).
    Skipped,
}

impl ReviewStatus {
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Resolved | Self::Skipped)
    }

    /// Returns true if the state machine permits `self -> to`.
    #[must_use]
    pub const fn can_transition_to(self, to: Self) -> bool {
        matches!(
            (self, to),
            (Self::Pending, Self::InReview)
                | (Self::InReview, Self::Pending | Self::Resolved | Self::Skipped)
        )
    }
}

impl fmt::Display for ReviewStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::InReview => write!(f, "in_review"),
            Self::Resolved => write!(f, "resolved"),
            Self::Skipped => write!(f, "skipped"),
        }
    }
}

/// Why an import was parked for review.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReviewReason {
    /// One or more names were similar but not equal.
    FuzzyNameMatch,
    /// Several existing entities share the exact name.
    MultipleNameMatches,
    /// Identifiers point at different entities, or disagree with a name match.
    IdentifierConflict,
}

impl fmt::Display for ReviewReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::FuzzyNameMatch => write!(f, "fuzzy_name_match"),
            Self::MultipleNameMatches => write!(f, "multiple_name_matches"),
            Self::IdentifierConflict => write!(f, "identifier_conflict"),
        }
    }
}

/// Adjudication urgency; higher sorts first.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReviewPriority {
    Low,
    #[default]
    Normal,
    High,
}

impl ReviewPriority {
    /// Priority for a freshly parked import.
    ///
    /// Identifier conflicts signal data corruption and jump the queue;
    /// stub-depth imports matter least.
    #[must_use]
    pub const fn for_import(reason: ReviewReason, depth: u32) -> Self {
        if depth >= 2 {
            return Self::Low;
        }
        match reason {
            ReviewReason::IdentifierConflict => Self::High,
            ReviewReason::MultipleNameMatches | ReviewReason::FuzzyNameMatch => Self::Normal,
        }
    }
}

/// Final decision recorded on a RESOLVED item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReviewResolution {
    /// Payload folded into the target entity.
    Merged,
    /// A new entity was created from the payload.
    CreatedNew,
    /// Payload associated with the target, which is left unchanged.
    LinkedToExisting,
    /// Payload discarded.
    Rejected,
}

impl ReviewResolution {
    #[must_use]
    pub const fn requires_target(self) -> bool {
        matches!(self, Self::Merged | Self::LinkedToExisting)
    }
}

impl fmt::Display for ReviewResolution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Merged => write!(f, "merged"),
            Self::CreatedNew => write!(f, "created_new"),
            Self::LinkedToExisting => write!(f, "linked_to_existing"),
            Self::Rejected => write!(f, "rejected"),
        }
    }
}

/// A candidate existing entity with its similarity to the incoming record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchCandidate {
    pub entity_id: EntityId,
    pub name: String,
    /// Similarity in `[0, 1]`; exact identifier/name hits score 1.0.
    pub score: f64,
    pub updated_at: DateTime<Utc>,
}

/// Extra fields carried by a transition.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransitionDetails {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resolution: Option<ReviewResolution>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub target: Option<EntityId>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub reviewer: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

impl TransitionDetails {
    /// Details for a RESOLVED transition.
    #[must_use]
    pub const fn resolved(resolution: ReviewResolution, target: Option<EntityId>) -> Self {
        Self {
            resolution: Some(resolution),
            target,
            reviewer: None,
            notes: None,
        }
    }

    #[must_use]
    pub fn reviewer(mut self, reviewer: impl Into<String>) -> Self {
        self.reviewer = Some(reviewer.into());
        self
    }

    #[must_use]
    pub fn notes(mut self, notes: impl Into<String>) -> Self {
        self.notes = Some(notes.into());
        self
    }
}

/// An ambiguous resolution awaiting adjudication.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReviewItem {
    pub id: ReviewItemId,

    pub entity_type: EntityType,

    pub reason: ReviewReason,

    /// The import that triggered the review.
    pub payload: ImportEvent,

    /// Ordered best-first.
    pub candidates: Vec<MatchCandidate>,

    pub priority: ReviewPriority,

    pub status: ReviewStatus,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub resolution: Option<ReviewResolution>,

    /// Entity the item resolved to, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resolved_entity: Option<EntityId>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub reviewer: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,

    pub created_at: DateTime<Utc>,

    pub updated_at: DateTime<Utc>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub resolved_at: Option<DateTime<Utc>>,
}

impl ReviewItem {
    /// Creates a PENDING item for `payload`.
    #[must_use]
    pub fn new(payload: ImportEvent, reason: ReviewReason, candidates: Vec<MatchCandidate>) -> Self {
        let now = Utc::now();
        Self {
            id: ReviewItemId::new(),
            entity_type: payload.entity_type,
            priority: ReviewPriority::for_import(reason, payload.depth),
            reason,
            payload,
            candidates,
            status: ReviewStatus::Pending,
            resolution: None,
            resolved_entity: None,
            reviewer: None,
            notes: None,
            created_at: now,
            updated_at: now,
            resolved_at: None,
        }
    }

    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Best candidate, if any.
    #[must_use]
    pub fn top_candidate(&self) -> Option<&MatchCandidate> {
        self.candidates.first()
    }

    /// Applies a state transition. On error the item is left untouched.
    ///
    /// # Errors
    ///
    /// - `InvalidTransition` if the state machine forbids `status -> to`
    /// - `IncompleteTransition` if RESOLVED lacks a resolution, or lacks a
    ///   target for MERGED / LINKED_TO_EXISTING
    pub fn apply_transition(
        &mut self,
        to: ReviewStatus,
        details: TransitionDetails,
    ) -> Result<(), ExecutionError> {
        if !self.status.can_transition_to(to) {
            return Err(ExecutionError::InvalidTransition {
                id: self.id,
                from: self.status,
                to,
            });
        }

        if to == ReviewStatus::Resolved {
            let Some(resolution) = details.resolution else {
                return Err(ExecutionError::IncompleteTransition {
                    id: self.id,
                    to,
                    field: "resolution".to_string(),
                });
            };
            if resolution.requires_target() && details.target.is_none() {
                return Err(ExecutionError::IncompleteTransition {
                    id: self.id,
                    to,
                    field: "target".to_string(),
                });
            }
        }

        let now = Utc::now();
        self.status = to;
        self.updated_at = now;
        if details.reviewer.is_some() {
            self.reviewer = details.reviewer;
        }
        if details.notes.is_some() {
            self.notes = details.notes;
        }
        if to == ReviewStatus::Resolved {
            self.resolution = details.resolution;
            self.resolved_entity = match details.resolution {
                Some(ReviewResolution::Rejected) => None,
                _ => details.target,
            };
        }
        if to.is_terminal() {
            self.resolved_at = Some(now);
        }
        Ok(())
    }
}

impl PartialEq for ReviewItem {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for ReviewItem {}

/// Attempts before a contended transition gives up.
const MAX_TRANSITION_ATTEMPTS: usize = 8;

/// Queue of ambiguous resolutions awaiting adjudication.
///
/// Transitions are validated against the state machine and written with a
/// compare-and-set on the prior status, so two adjudicators racing on the
/// same item cannot both win.
#[derive(Clone)]
pub struct ReviewQueue {
    store: Arc<dyn ReviewStore>,
}

impl fmt::Debug for ReviewQueue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReviewQueue").finish_non_exhaustive()
    }
}

impl ReviewQueue {
    #[must_use]
    pub fn new(store: Arc<dyn ReviewStore>) -> Self {
        Self { store }
    }

    /// Queue backed by an in-memory store.
    #[must_use]
    pub fn in_memory() -> Self {
        Self::new(Arc::new(InMemoryReviewStore::new()))
    }

    /// Adds a PENDING item.
    ///
    /// # Errors
    ///
    /// - `InvalidTransition` if the item is not PENDING
    /// - a storage error if the item cannot be written
    pub fn enqueue(&self, item: ReviewItem) -> WarmpathResult<ReviewItemId> {
        let id = item.id;
        if item.status != ReviewStatus::Pending {
            warn!(review_item = %id, status = %item.status, "review item must be enqueued pending");
            return Err(ExecutionError::InvalidTransition {
                id,
                from: item.status,
                to: ReviewStatus::Pending,
            }
            .into());
        }

        let (entity_type, reason, candidates) = (item.entity_type, item.reason, item.candidates.len());
        self.store.insert(item)?;
        info!(
            review_item = %id,
            %entity_type,
            %reason,
            candidates,
            "review item enqueued"
        );
        Ok(id)
    }

    /// # Errors
    ///
    /// Returns `ReviewItemNotFound` for an unknown id.
    pub fn get(&self, id: ReviewItemId) -> WarmpathResult<ReviewItem> {
        self.store
            .get(id)?
            .ok_or_else(|| ExecutionError::ReviewItemNotFound { id }.into())
    }

    /// Items in `status`, highest priority first, then oldest first.
    ///
    /// # Errors
    ///
    /// Propagates storage failures.
    pub fn list_by_status(
        &self,
        status: ReviewStatus,
        priority: Option<ReviewPriority>,
    ) -> WarmpathResult<Vec<ReviewItem>> {
        Ok(self.store.list_by_status(status, priority)?)
    }

    /// Moves an item to `to` and returns the updated item.
    ///
    /// # Errors
    ///
    /// - `ReviewItemNotFound` for an unknown id
    /// - `InvalidTransition` / `IncompleteTransition` when the state machine
    ///   rejects the move; the stored item is unchanged
    /// - `VersionConflict` if the item kept changing underneath
    pub fn transition(
        &self,
        id: ReviewItemId,
        to: ReviewStatus,
        details: TransitionDetails,
    ) -> WarmpathResult<ReviewItem> {
        for _ in 0..MAX_TRANSITION_ATTEMPTS {
            let current = self.get(id)?;
            let from = current.status;
            let mut next = current.clone();
            if let Err(err) = next.apply_transition(to, details.clone()) {
                warn!(review_item = %id, %from, %to, error = %err, "review transition rejected");
                return Err(err.into());
            }

            match self.store.compare_and_set(next.clone(), &current) {
                Ok(()) => {
                    info!(
                        review_item = %id,
                        %from,
                        %to,
                        resolution = ?next.resolution,
                        "review item transitioned"
                    );
                    return Ok(next);
                }
                Err(StorageError::VersionConflict(_)) => {}
                Err(err) => return Err(err.into()),
            }
        }

        Err(StorageError::VersionConflict(format!(
            "review item {id} changed {MAX_TRANSITION_ATTEMPTS} times during transition"
        ))
        .into())
    }

    /// Takes ownership of an item for `reviewer`.
    ///
    /// A PENDING item moves to IN_REVIEW stamped with `reviewer`. An item
    /// already IN_REVIEW is returned as is when `reviewer` holds it.
    ///
    /// # Errors
    ///
    /// - `ReviewItemClaimed` if another reviewer holds it
    /// - `InvalidTransition` if it is already RESOLVED or SKIPPED
    pub fn claim(&self, id: ReviewItemId, reviewer: &str) -> WarmpathResult<ReviewItem> {
        for _ in 0..MAX_TRANSITION_ATTEMPTS {
            let current = self.get(id)?;
            match current.status {
                ReviewStatus::InReview => {
                    return match current.reviewer.as_deref() {
                        Some(holder) if holder == reviewer => Ok(current),
                        holder => Err(ExecutionError::ReviewItemClaimed {
                            id,
                            reviewer: holder.unwrap_or_default().to_string(),
                        }
                        .into()),
                    };
                }
                ReviewStatus::Pending => {
                    let mut next = current.clone();
                    next.apply_transition(
                        ReviewStatus::InReview,
                        TransitionDetails::default().reviewer(reviewer),
                    )?;
                    match self.store.compare_and_set(next.clone(), &current) {
                        Ok(()) => {
                            info!(review_item = %id, reviewer, "review item claimed");
                            return Ok(next);
                        }
                        Err(StorageError::VersionConflict(_)) => {}
                        Err(err) => return Err(err.into()),
                    }
                }
                from => {
                    return Err(ExecutionError::InvalidTransition {
                        id,
                        from,
                        to: ReviewStatus::InReview,
                    }
                    .into())
                }
            }
        }

        Err(StorageError::VersionConflict(format!(
            "review item {id} changed {MAX_TRANSITION_ATTEMPTS} times during claim"
        ))
        .into())
    }

    /// Moves a claimed item to RESOLVED, provided it is still exactly as
    /// `claimed` left it.
    ///
    /// # Errors
    ///
    /// - `IncompleteTransition` if `details` lack a resolution or target
    /// - `VersionConflict` if the item changed since it was claimed
    pub fn resolve_claimed(
        &self,
        claimed: &ReviewItem,
        details: TransitionDetails,
    ) -> WarmpathResult<ReviewItem> {
        let mut next = claimed.clone();
        next.apply_transition(ReviewStatus::Resolved, details)?;
        self.store.compare_and_set(next.clone(), claimed)?;
        info!(
            review_item = %next.id,
            from = %claimed.status,
            to = %next.status,
            resolution = ?next.resolution,
            "review item transitioned"
        );
        Ok(next)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item() -> ReviewItem {
        let payload = ImportEvent::new(EntityType::Company, "Acme Inc");
        let candidate = MatchCandidate {
            entity_id: EntityId::new(),
            name: "ACME".to_string(),
            score: 0.93,
            updated_at: Utc::now(),
        };
        ReviewItem::new(payload, ReviewReason::FuzzyNameMatch, vec![candidate])
    }

    #[test]
    fn test_new_item_is_pending() {
        let item = item();
        assert_eq!(item.status, ReviewStatus::Pending);
        assert_eq!(item.priority, ReviewPriority::Normal);
        assert!(item.resolution.is_none());
        assert_eq!(item.top_candidate().unwrap().name, "ACME");
    }

    #[test]
    fn test_state_machine_table() {
        use ReviewStatus::{InReview, Pending, Resolved, Skipped};

        assert!(Pending.can_transition_to(InReview));
        assert!(InReview.can_transition_to(Pending));
        assert!(InReview.can_transition_to(Resolved));
        assert!(InReview.can_transition_to(Skipped));

        assert!(!Pending.can_transition_to(Pending));
        assert!(!Pending.can_transition_to(Resolved));
        for to in [Pending, InReview, Resolved, Skipped] {
            assert!(!Resolved.can_transition_to(to));
            assert!(!Skipped.can_transition_to(to));
        }
    }

    #[test]
    fn test_resolve_merged_requires_target() {
        let mut item = item();
        item.apply_transition(ReviewStatus::InReview, TransitionDetails::default())
            .unwrap();

        let err = item
            .apply_transition(
                ReviewStatus::Resolved,
                TransitionDetails::resolved(ReviewResolution::Merged, None),
            )
            .unwrap_err();
        assert!(matches!(err, ExecutionError::IncompleteTransition { .. }));
        assert_eq!(item.status, ReviewStatus::InReview);
    }

    #[test]
    fn test_resolve_requires_resolution() {
        let mut item = item();
        item.apply_transition(ReviewStatus::InReview, TransitionDetails::default())
            .unwrap();
        let err = item
            .apply_transition(ReviewStatus::Resolved, TransitionDetails::default())
            .unwrap_err();
        assert!(matches!(err, ExecutionError::IncompleteTransition { .. }));
    }

    #[test]
    fn test_resolved_is_immutable() {
        let mut item = item();
        let target = EntityId::new();
        item.apply_transition(ReviewStatus::InReview, TransitionDetails::default())
            .unwrap();
        item.apply_transition(
            ReviewStatus::Resolved,
            TransitionDetails::resolved(ReviewResolution::LinkedToExisting, Some(target))
                .reviewer("analyst-1"),
        )
        .unwrap();
        assert_eq!(item.resolved_entity, Some(target));
        assert!(item.resolved_at.is_some());

        let before = item.clone();
        let err = item
            .apply_transition(ReviewStatus::Pending, TransitionDetails::default())
            .unwrap_err();
        assert!(matches!(err, ExecutionError::InvalidTransition { .. }));
        assert_eq!(item.status, before.status);
        assert_eq!(item.resolution, before.resolution);
        assert_eq!(item.resolved_entity, before.resolved_entity);
        assert_eq!(item.updated_at, before.updated_at);
    }

    #[test]
    fn test_rejected_has_no_entity() {
        let mut item = item();
        item.apply_transition(ReviewStatus::InReview, TransitionDetails::default())
            .unwrap();
        item.apply_transition(
            ReviewStatus::Resolved,
            TransitionDetails::resolved(ReviewResolution::Rejected, Some(EntityId::new())),
        )
        .unwrap();
        assert_eq!(item.resolution, Some(ReviewResolution::Rejected));
        assert!(item.resolved_entity.is_none());
    }

    #[test]
    fn test_skip_needs_no_details() {
        let mut item = item();
        item.apply_transition(ReviewStatus::InReview, TransitionDetails::default())
            .unwrap();
        item.apply_transition(ReviewStatus::Skipped, TransitionDetails::default())
            .unwrap();
        assert!(item.is_terminal());
        assert!(item.resolution.is_none());
    }

    #[test]
    fn test_priority_for_import() {
        assert_eq!(
            ReviewPriority::for_import(ReviewReason::IdentifierConflict, 0),
            ReviewPriority::High
        );
        assert_eq!(
            ReviewPriority::for_import(ReviewReason::FuzzyNameMatch, 1),
            ReviewPriority::Normal
        );
        assert_eq!(
            ReviewPriority::for_import(ReviewReason::IdentifierConflict, 2),
            ReviewPriority::Low
        );
        assert!(ReviewPriority::High > ReviewPriority::Low);
    }

    #[test]
    fn test_status_serialization() {
        assert_eq!(
            serde_json::to_string(&ReviewStatus::InReview).unwrap(),
            "\"IN_REVIEW\""
        );
    }

    #[test]
    fn test_queue_transition_out_of_resolved_leaves_item_unchanged() {
        let queue = ReviewQueue::in_memory();
        let id = queue.enqueue(item()).unwrap();
        let target = EntityId::new();

        queue
            .transition(id, ReviewStatus::InReview, TransitionDetails::default())
            .unwrap();
        queue
            .transition(
                id,
                ReviewStatus::Resolved,
                TransitionDetails::resolved(ReviewResolution::Merged, Some(target)),
            )
            .unwrap();
        let resolved = queue.get(id).unwrap();

        let err = queue
            .transition(id, ReviewStatus::InReview, TransitionDetails::default())
            .unwrap_err();
        assert!(matches!(
            err,
            crate::error::WarmpathError::Execution(ExecutionError::InvalidTransition { .. })
        ));

        let after = queue.get(id).unwrap();
        assert_eq!(after.status, ReviewStatus::Resolved);
        assert_eq!(after.resolution, resolved.resolution);
        assert_eq!(after.resolved_entity, Some(target));
        assert_eq!(after.updated_at, resolved.updated_at);
    }

    #[test]
    fn test_queue_get_unknown_is_not_found() {
        let queue = ReviewQueue::in_memory();
        assert!(queue.get(ReviewItemId::new()).unwrap_err().is_not_found());
    }

    #[test]
    fn test_queue_lists_by_status() {
        let queue = ReviewQueue::in_memory();
        let a = queue.enqueue(item()).unwrap();
        let b = queue.enqueue(item()).unwrap();
        queue
            .transition(b, ReviewStatus::InReview, TransitionDetails::default())
            .unwrap();

        let pending = queue.list_by_status(ReviewStatus::Pending, None).unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].id, a);
        let claimed = queue.list_by_status(ReviewStatus::InReview, None).unwrap();
        assert_eq!(claimed[0].id, b);
    }

    #[test]
    #[tracing_test::traced_test]
    fn test_enqueue_rejects_non_pending_items() {
        let queue = ReviewQueue::in_memory();
        let mut claimed = item();
        claimed
            .apply_transition(ReviewStatus::InReview, TransitionDetails::default())
            .unwrap();
        let id = claimed.id;

        let err = queue.enqueue(claimed).unwrap_err();
        assert!(matches!(
            err,
            crate::error::WarmpathError::Execution(ExecutionError::InvalidTransition { .. })
        ));
        assert!(queue.get(id).unwrap_err().is_not_found());
        assert!(!logs_contain("review item enqueued"));
    }

    #[test]
    fn test_claim_is_owned_by_one_reviewer() {
        let queue = ReviewQueue::in_memory();
        let id = queue.enqueue(item()).unwrap();

        let claimed = queue.claim(id, "ana").unwrap();
        assert_eq!(claimed.status, ReviewStatus::InReview);
        assert_eq!(claimed.reviewer.as_deref(), Some("ana"));
        assert_eq!(queue.claim(id, "ana").unwrap().updated_at, claimed.updated_at);

        let err = queue.claim(id, "ben").unwrap_err();
        assert!(matches!(
            err,
            crate::error::WarmpathError::Execution(ExecutionError::ReviewItemClaimed { .. })
        ));
    }

    #[test]
    fn test_resolve_claimed_fails_after_release_and_reclaim() {
        let queue = ReviewQueue::in_memory();
        let id = queue.enqueue(item()).unwrap();
        let stale = queue.claim(id, "ana").unwrap();

        queue
            .transition(id, ReviewStatus::Pending, TransitionDetails::default())
            .unwrap();
        queue.claim(id, "ben").unwrap();

        let err = queue
            .resolve_claimed(&stale, TransitionDetails::resolved(ReviewResolution::Rejected, None))
            .unwrap_err();
        assert!(matches!(
            err,
            crate::error::WarmpathError::Storage(StorageError::VersionConflict(_))
        ));
        let stored = queue.get(id).unwrap();
        assert_eq!(stored.status, ReviewStatus::InReview);
        assert_eq!(stored.reviewer.as_deref(), Some("ben"));
    }

    #[test]
    #[tracing_test::traced_test]
    fn test_rejected_transition_is_logged() {
        let queue = ReviewQueue::in_memory();
        let id = queue.enqueue(item()).unwrap();
        assert!(logs_contain("review item enqueued"));

        queue
            .transition(id, ReviewStatus::Resolved, TransitionDetails::default())
            .unwrap_err();
        assert!(logs_contain("review transition rejected"));
        assert!(!logs_contain("review item transitioned"));
    }
}
