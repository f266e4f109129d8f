//! Connection path finder.
//!
//! Enumerates simple paths from home-network entities to a target over a
//! [`GraphSnapshot`], classifies each into a [`Tier`], and ranks them:
//! tier ascending, then length ascending, then most recent edge start
//! descending. Paths that match no tier are dropped.
//!
//! Traversal only extends prefixes that can still match a tier: a person
//! pivot is exactly two employment-like edges, and ownership chains go up
//! zero or more hops and then down. Intermediate nodes never revisit an
//! entity or pass through another home entity, so cyclic ownership
//! terminates.
//!
//! A person pivot is classified from all of the person's ties at both
//! ends and yields one path per person. An ownership chain only counts if
//! its links held on at least one common day.

mod graph;
mod tier;

use std::collections::HashSet;
use std::fmt::Write as _;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::PathFinderConfig;
use crate::entity::EntityId;
use crate::error::{ExecutionError, WarmpathResult};
use crate::relationship::{RelationshipId, RelationshipKind};
use crate::temporal::TemporalStore;
use crate::time::{today, DateRange, IntervalStatus};

pub use graph::{GraphSnapshot, SnapshotEdge};
pub use tier::Tier;

/// One traversed relationship, with its status on the query day.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PathEdge {
    pub relationship_id: RelationshipId,
    pub kind: RelationshipKind,
    /// Employee, owner or board member side.
    pub party_a: EntityId,
    /// Employer or owned side.
    pub party_b: EntityId,
    /// Current or former on the query day.
    pub status: IntervalStatus,
    pub start_date: NaiveDate,
    pub end_date: Option<NaiveDate>,
}

impl PathEdge {
    fn from_snapshot(edge: &SnapshotEdge) -> Self {
        let r = &edge.relationship;
        Self {
            relationship_id: r.id,
            kind: r.kind,
            party_a: r.party_a,
            party_b: r.party_b,
            status: edge.status,
            start_date: r.start_date(),
            end_date: r.end_date(),
        }
    }

    /// Days the relationship held.
    #[must_use]
    pub const fn range(&self) -> DateRange {
        DateRange {
            start: self.start_date,
            end: self.end_date,
        }
    }
}

/// A classified path from a home entity to the target.
///
/// `entities` has one more element than `edges`; `edges[i]` joins
/// `entities[i]` and `entities[i + 1]`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionPath {
    pub tier: Tier,
    /// The home-network entity the path starts from.
    pub home: EntityId,
    pub target: EntityId,
    pub entities: Vec<EntityId>,
    pub edges: Vec<PathEdge>,
}

impl ConnectionPath {
    /// Number of edges.
    #[must_use]
    pub fn len(&self) -> usize {
        self.edges.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.edges.is_empty()
    }

    /// Latest start date among the path's edges.
    #[must_use]
    pub fn most_recent_start(&self) -> Option<NaiveDate> {
        self.edges.iter().map(|e| e.start_date).max()
    }

    /// Human-readable rendering using entity names from `graph`.
    ///
    /// ```text
    /// tier 1 (former employee of a home entity now at the target): Acme --employment, former since 2015-01-01-- Jane --employment, current since 2021-06-01-- Target
    /// ```
    #[must_use]
    pub fn explain(&self, graph: &GraphSnapshot) -> String {
        let mut out = format!("{}: {}", self.tier, graph.name_of(self.home));
        for (edge, next) in self.edges.iter().zip(self.entities.iter().skip(1)) {
            let _ = write!(
                out,
                " --{}, {} since {}",
                edge.kind, edge.status, edge.start_date
            );
            if let Some(end) = edge.end_date {
                let _ = write!(out, " until {end}");
            }
            let _ = write!(out, "-- {}", graph.name_of(*next));
        }
        out
    }
}

/// A connection query as it arrives on the wire.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PathQuery {
    pub target: EntityId,
    pub max_path_length: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub as_of: Option<NaiveDate>,
}

/// Read-only path search over snapshots of a [`TemporalStore`].
#[derive(Debug, Clone, Default)]
pub struct PathFinder {
    config: PathFinderConfig,
}

impl PathFinder {
    #[must_use]
    pub const fn new(config: PathFinderConfig) -> Self {
        Self { config }
    }

    #[must_use]
    pub const fn config(&self) -> &PathFinderConfig {
        &self.config
    }

    /// Snapshots `store` as of `as_of` (default today) and searches it.
    ///
    /// # Errors
    ///
    /// - `EntityNotFound` if `target` is unknown
    /// - storage errors while taking the snapshot
    #[tracing::instrument(skip(self, store, home_set), fields(home = home_set.len()))]
    pub fn find_paths(
        &self,
        store: &TemporalStore,
        home_set: &[EntityId],
        target: EntityId,
        max_path_length: usize,
        as_of: Option<NaiveDate>,
    ) -> WarmpathResult<Vec<ConnectionPath>> {
        let graph = GraphSnapshot::capture(store, as_of.unwrap_or_else(today))?;
        self.find_paths_in(&graph, home_set, target, max_path_length)
    }

    /// Runs a [`PathQuery`].
    ///
    /// # Errors
    ///
    /// Same as [`PathFinder::find_paths`].
    pub fn query(
        &self,
        store: &TemporalStore,
        home_set: &[EntityId],
        query: &PathQuery,
    ) -> WarmpathResult<Vec<ConnectionPath>> {
        self.find_paths(store, home_set, query.target, query.max_path_length, query.as_of)
    }

    /// Searches an existing snapshot.
    ///
    /// # Errors
    ///
    /// Returns `EntityNotFound` if `target` is not in the snapshot.
    pub fn find_paths_in(
        &self,
        graph: &GraphSnapshot,
        home_set: &[EntityId],
        target: EntityId,
        max_path_length: usize,
    ) -> WarmpathResult<Vec<ConnectionPath>> {
        if graph.entity(target).is_none() {
            return Err(ExecutionError::EntityNotFound { id: target }.into());
        }

        let max_len = max_path_length.min(self.config.max_path_length_cap);
        let homes: HashSet<EntityId> = home_set.iter().copied().collect();
        let mut origins: Vec<EntityId> = homes
            .iter()
            .copied()
            .filter(|h| *h != target && graph.entity(*h).is_some())
            .collect();
        origins.sort();

        let mut paths = Vec::new();
        if max_len > 0 {
            for home in origins {
                let mut search = Search {
                    graph,
                    homes: &homes,
                    target,
                    max_len,
                    entities: vec![home],
                    edges: Vec::new(),
                    found: &mut paths,
                };
                search.walk(home);
            }
        }

        rank(&mut paths);
        let total = paths.len();
        paths.truncate(self.config.max_results);
        debug!(%target, found = total, returned = paths.len(), "path search finished");
        Ok(paths)
    }
}

struct Search<'a> {
    graph: &'a GraphSnapshot,
    homes: &'a HashSet<EntityId>,
    target: EntityId,
    max_len: usize,
    entities: Vec<EntityId>,
    edges: Vec<PathEdge>,
    found: &'a mut Vec<ConnectionPath>,
}

impl Search<'_> {
    fn walk(&mut self, node: EntityId) {
        let graph = self.graph;
        for snapshot_edge in graph.edges_of(node) {
            let Some(next) = snapshot_edge.relationship.other_party(node) else {
                continue;
            };
            if self.entities.contains(&next) {
                continue;
            }
            if next != self.target && self.homes.contains(&next) {
                continue;
            }

            self.entities.push(next);
            self.edges.push(PathEdge::from_snapshot(snapshot_edge));

            if next == self.target {
                if let Some(tier) = tier::classify(graph, &self.entities, &self.edges) {
                    self.found.push(ConnectionPath {
                        tier,
                        home: self.entities[0],
                        target: self.target,
                        entities: self.entities.clone(),
                        edges: self.edges.clone(),
                    });
                }
            } else if self.edges.len() < self.max_len && can_extend(&self.entities, &self.edges) {
                self.walk(next);
            }

            self.entities.pop();
            self.edges.pop();
        }
    }
}

/// True if a prefix that has not reached the target can still match a tier.
fn can_extend(entities: &[EntityId], edges: &[PathEdge]) -> bool {
    if edges.iter().all(|e| e.kind.is_employment_like()) {
        return edges.len() == 1;
    }
    if !edges.iter().all(|e| e.kind == RelationshipKind::Ownership) {
        return false;
    }
    // Ownership: any number of upward hops, then only downward ones.
    let mut descending = false;
    for (edge, node) in edges.iter().zip(entities) {
        let down = tier::owned_by(edge, *node);
        if descending && !down {
            return false;
        }
        descending |= down;
    }
    true
}

fn rank(paths: &mut [ConnectionPath]) {
    paths.sort_by(|a, b| {
        a.tier
            .cmp(&b.tier)
            .then_with(|| a.len().cmp(&b.len()))
            .then_with(|| b.most_recent_start().cmp(&a.most_recent_start()))
            .then_with(|| a.entities.cmp(&b.entities))
    });
}
