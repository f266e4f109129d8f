//! Enrichment cascade control.
//!
//! Enriching one entity discovers others (a company's employees, a firm's
//! portfolio), and enriching those discovers more. The controller bounds
//! that fan-out by depth:
//!
//! | depth | level         | network discovery |
//! |-------|---------------|-------------------|
//! | 0     | `Full`        | yes               |
//! | 1     | `Lightweight` | no                |
//! | 2+    | `StubOnly`    | no                |
//!
//! It only advises; the orchestration layer performs the enrichment. An
//! [`EnrichmentBatch`] additionally remembers the shallowest depth each
//! entity was planned at in one batch, so cycles (A owns B owns A) never
//! re-emit work while a later, shallower visit still gets its upgrade.

use std::collections::HashMap;
use std::fmt;
use std::sync::Mutex;

use serde::{Deserialize, Serialize};
use tracing::debug;
use uuid::Uuid;

use crate::entity::{EntityId, EntityType};
use crate::error::{WarmpathError, WarmpathResult};

/// How much enrichment an entity gets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EnrichmentLevel {
    /// Full profile plus network discovery.
    Full,
    /// Profile only; record the entity, discover nothing.
    Lightweight,
    /// Keep the stub the parent produced; no enrichment call.
    StubOnly,
}

impl fmt::Display for EnrichmentLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Full => write!(f, "full"),
            Self::Lightweight => write!(f, "lightweight"),
            Self::StubOnly => write!(f, "stub_only"),
        }
    }
}

/// A kind of related entity that network discovery should fetch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NetworkScope {
    /// People employed by a company.
    Employees,
    /// Firms or companies owning a company.
    Owners,
    /// Companies a PE firm owns.
    PortfolioCompanies,
    /// People working at a PE firm.
    Team,
    /// Past and present employers of a person.
    EmploymentHistory,
    /// Board seats a person holds or held.
    BoardSeats,
}

impl NetworkScope {
    /// Discovery scopes for a fully enriched entity of `entity_type`.
    #[must_use]
    pub const fn for_type(entity_type: EntityType) -> &'static [Self] {
        match entity_type {
            EntityType::Company => &[Self::Employees, Self::Owners],
            EntityType::PeFirm => &[Self::PortfolioCompanies, Self::Team],
            EntityType::Person => &[Self::EmploymentHistory, Self::BoardSeats],
        }
    }
}

/// Advice for one entity at one depth.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnrichmentPlan {
    pub entity_type: EntityType,
    pub depth: u32,
    pub level: EnrichmentLevel,
    /// Empty unless `level` is `Full`.
    pub discovery: Vec<NetworkScope>,
}

impl EnrichmentPlan {
    /// True if an enrichment call should be made at all.
    #[must_use]
    pub const fn enriches(&self) -> bool {
        !matches!(self.level, EnrichmentLevel::StubOnly)
    }

    /// True if related entities should be discovered.
    #[must_use]
    pub fn discovers(&self) -> bool {
        !self.discovery.is_empty()
    }

    /// Depth that events derived from this entity must carry.
    #[must_use]
    pub const fn child_depth(&self) -> u32 {
        self.depth.saturating_add(1)
    }
}

/// Stateless depth policy.
#[derive(Debug, Default, Clone, Copy)]
pub struct CascadeController;

impl CascadeController {
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    /// Level for an entity reached at `depth`.
    #[must_use]
    pub const fn level_for(&self, depth: u32) -> EnrichmentLevel {
        match depth {
            0 => EnrichmentLevel::Full,
            1 => EnrichmentLevel::Lightweight,
            _ => EnrichmentLevel::StubOnly,
        }
    }

    /// Plan for an entity of `entity_type` reached at `depth`.
    #[must_use]
    pub fn should_enrich(&self, entity_type: EntityType, depth: u32) -> EnrichmentPlan {
        let level = self.level_for(depth);
        let discovery = if level == EnrichmentLevel::Full {
            NetworkScope::for_type(entity_type).to_vec()
        } else {
            Vec::new()
        };
        EnrichmentPlan {
            entity_type,
            depth,
            level,
            discovery,
        }
    }
}

/// Per-batch visited map: entity to the shallowest depth planned.
///
/// Shared by every pipeline working on one batch; discarded when the batch
/// finishes or is abandoned.
#[derive(Debug)]
pub struct EnrichmentBatch {
    id: Uuid,
    controller: CascadeController,
    visited: Mutex<HashMap<EntityId, u32>>,
}

impl Default for EnrichmentBatch {
    fn default() -> Self {
        Self::new()
    }
}

impl EnrichmentBatch {
    #[must_use]
    pub fn new() -> Self {
        Self {
            id: Uuid::new_v4(),
            controller: CascadeController::new(),
            visited: Mutex::new(HashMap::new()),
        }
    }

    #[must_use]
    pub const fn id(&self) -> Uuid {
        self.id
    }

    /// Plans enrichment for `entity_id` unless this batch already did.
    ///
    /// Returns `None` for an entity already planned at the same or a
    /// shallower depth. A shallower visit whose level is better than the one
    /// planned before is planned again.
    ///
    /// # Errors
    ///
    /// Returns an internal error if the visited set's lock is poisoned.
    pub fn plan(
        &self,
        entity_id: EntityId,
        entity_type: EntityType,
        depth: u32,
    ) -> WarmpathResult<Option<EnrichmentPlan>> {
        {
            let mut visited = self
                .visited
                .lock()
                .map_err(|_| WarmpathError::internal("poisoned lock: enrichment batch"))?;
            match visited.get(&entity_id).copied() {
                Some(seen) if seen <= depth => {
                    debug!(batch = %self.id, %entity_id, depth, seen, "entity already planned in batch");
                    return Ok(None);
                }
                Some(seen) => {
                    visited.insert(entity_id, depth);
                    if self.controller.level_for(seen) == self.controller.level_for(depth) {
                        debug!(batch = %self.id, %entity_id, depth, seen, "shallower visit keeps level");
                        return Ok(None);
                    }
                }
                None => {
                    visited.insert(entity_id, depth);
                }
            }
        }

        let plan = self.controller.should_enrich(entity_type, depth);
        debug!(
            batch = %self.id,
            %entity_id,
            %entity_type,
            depth,
            level = %plan.level,
            "enrichment planned"
        );
        Ok(Some(plan))
    }

    /// # Errors
    ///
    /// Returns an internal error if the visited set's lock is poisoned.
    pub fn contains(&self, entity_id: EntityId) -> WarmpathResult<bool> {
        Ok(self
            .visited
            .lock()
            .map_err(|_| WarmpathError::internal("poisoned lock: enrichment batch"))?
            .contains_key(&entity_id))
    }

    /// # Errors
    ///
    /// Returns an internal error if the visited set's lock is poisoned.
    pub fn visited_count(&self) -> WarmpathResult<usize> {
        Ok(self
            .visited
            .lock()
            .map_err(|_| WarmpathError::internal("poisoned lock: enrichment batch"))?
            .len())
    }
}
