//! Connection strength tiers and path classification.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::entity::{EntityId, EntityType};
use crate::relationship::{RelationshipId, RelationshipKind};
use crate::time::{DateRange, IntervalStatus};

use super::graph::{GraphSnapshot, SnapshotEdge};
use super::PathEdge;

/// Strength of a warm path, strongest first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum Tier {
    /// Former employee of a home entity now at the target.
    FormerEmployeeAtTarget,
    /// A home entity currently owns the target through an ownership chain.
    HomeOwnsTarget,
    /// Current employee of a home entity formerly at the target.
    CurrentEmployeeFormerlyAtTarget,
    /// A home entity owned the target through a chain that no longer holds.
    HomeFormerlyOwnedTarget,
    /// A PE firm owns or owned both a home entity and the target.
    CommonPeOwner,
    /// Someone formerly at both a home entity and the target.
    MutualFormerEmployee,
}

impl Tier {
    pub const ALL: [Self; 6] = [
        Self::FormerEmployeeAtTarget,
        Self::HomeOwnsTarget,
        Self::CurrentEmployeeFormerlyAtTarget,
        Self::HomeFormerlyOwnedTarget,
        Self::CommonPeOwner,
        Self::MutualFormerEmployee,
    ];

    /// 1 (strongest) to 6 (weakest).
    #[must_use]
    pub const fn number(self) -> u8 {
        match self {
            Self::FormerEmployeeAtTarget => 1,
            Self::HomeOwnsTarget => 2,
            Self::CurrentEmployeeFormerlyAtTarget => 3,
            Self::HomeFormerlyOwnedTarget => 4,
            Self::CommonPeOwner => 5,
            Self::MutualFormerEmployee => 6,
        }
    }

    #[must_use]
    pub const fn description(self) -> &'static str {
        match self {
            Self::FormerEmployeeAtTarget => "former employee of a home entity now at the target",
            Self::HomeOwnsTarget => "home entity currently owns the target",
            Self::CurrentEmployeeFormerlyAtTarget => "current employee of a home entity formerly at the target",
            Self::HomeFormerlyOwnedTarget => "home entity formerly owned the target",
            Self::CommonPeOwner => "common PE ownership",
            Self::MutualFormerEmployee => "mutual former employee",
        }
    }
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "tier {} ({})", self.number(), self.description())
    }
}

impl From<Tier> for u8 {
    fn from(tier: Tier) -> Self {
        tier.number()
    }
}

impl TryFrom<u8> for Tier {
    type Error = String;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        Self::ALL
            .into_iter()
            .find(|t| t.number() == value)
            .ok_or_else(|| format!("tier must be between 1 and 6 (got {value})"))
    }
}

/// True if `edge` is an ownership edge whose owner is `owner`.
pub(super) fn owned_by(edge: &PathEdge, owner: EntityId) -> bool {
    edge.kind == RelationshipKind::Ownership && edge.party_a == owner
}

/// Classifies a simple path `entities[0] (home) .. entities[n] (target)`.
///
/// Returns `None` for shapes that match no tier, including a person who is
/// currently at both ends and an ownership chain whose links never held at
/// the same time.
pub(crate) fn classify(graph: &GraphSnapshot, entities: &[EntityId], edges: &[PathEdge]) -> Option<Tier> {
    if edges.is_empty() || entities.len() != edges.len() + 1 {
        return None;
    }

    if edges.iter().all(|e| e.kind.is_employment_like()) {
        return classify_person_pivot(graph, entities, edges);
    }
    if edges.iter().all(|e| e.kind == RelationshipKind::Ownership) {
        return classify_ownership(graph, entities, edges);
    }
    None
}

/// Employment-like ties between `person` and `org`.
fn ties<'g>(
    graph: &'g GraphSnapshot,
    person: EntityId,
    org: EntityId,
) -> impl Iterator<Item = &'g SnapshotEdge> + 'g {
    graph.edges_of(person).filter(move |e| {
        e.relationship.kind.is_employment_like() && e.relationship.other_party(person) == Some(org)
    })
}

/// The tie that stands for `person` at `org`: the latest-starting one with
/// the wanted status.
fn representative(graph: &GraphSnapshot, person: EntityId, org: EntityId, current: bool) -> Option<RelationshipId> {
    ties(graph, person, org)
        .filter(|e| (e.status == IntervalStatus::Current) == current)
        .max_by_key(|e| (e.relationship.start_date(), e.relationship.id))
        .map(|e| e.relationship.id)
}

/// The tier depends on every tie the person has at each end, not just the
/// two on the path; any current tie makes that side current. Only the
/// representative pair of edges yields a path, so each person appears once.
fn classify_person_pivot(graph: &GraphSnapshot, entities: &[EntityId], edges: &[PathEdge]) -> Option<Tier> {
    let (&[home, person, target], [home_edge, target_edge]) = (entities, edges) else {
        return None;
    };
    if graph.entity_type(person) != Some(EntityType::Person) {
        return None;
    }

    let home_current = ties(graph, person, home).any(|e| e.status == IntervalStatus::Current);
    let target_current = ties(graph, person, target).any(|e| e.status == IntervalStatus::Current);
    let tier = match (home_current, target_current) {
        (false, true) => Tier::FormerEmployeeAtTarget,
        (true, false) => Tier::CurrentEmployeeFormerlyAtTarget,
        (false, false) => Tier::MutualFormerEmployee,
        (true, true) => return None,
    };

    let on_path = representative(graph, person, home, home_current) == Some(home_edge.relationship_id)
        && representative(graph, person, target, target_current) == Some(target_edge.relationship_id);
    on_path.then_some(tier)
}

/// Days on which every link of a chain held at once.
fn chain_window(edges: &[PathEdge]) -> Option<DateRange> {
    let (first, rest) = edges.split_first()?;
    rest.iter()
        .try_fold(first.range(), |window, edge| window.intersection(&edge.range()))
}

fn classify_ownership(graph: &GraphSnapshot, entities: &[EntityId], edges: &[PathEdge]) -> Option<Tier> {
    // Downward chain: every node owns the next one.
    let downward = edges
        .iter()
        .zip(entities)
        .all(|(edge, node)| owned_by(edge, *node));
    if downward {
        let window = chain_window(edges)?;
        return Some(if window.contains(graph.as_of()) {
            Tier::HomeOwnsTarget
        } else {
            Tier::HomeFormerlyOwnedTarget
        });
    }

    // Up from home to a PE firm apex, then down to the target.
    let up = edges
        .iter()
        .zip(&entities[1..])
        .take_while(|(edge, next)| owned_by(edge, **next))
        .count();
    if up == 0 || up == edges.len() {
        return None;
    }
    if graph.entity_type(entities[up]) != Some(EntityType::PeFirm) {
        return None;
    }
    let down = edges[up..]
        .iter()
        .zip(&entities[up..])
        .all(|(edge, node)| owned_by(edge, *node));
    if !down {
        return None;
    }
    chain_window(&edges[..up])?;
    chain_window(&edges[up..])?;
    Some(Tier::CommonPeOwner)
}
