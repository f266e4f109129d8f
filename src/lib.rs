//! # warmpath - temporal relationship graph for warm introductions
//!
//! warmpath keeps a graph of companies, people and PE firms whose
//! relationships (employment, ownership, board seats) carry date intervals,
//! and answers one question: how is the firm's existing network connected
//! to a target company, and how strong is each connection?
//!
//! ## Components
//!
//! - **Temporal Store** ([`TemporalStore`]): entities, interval-bounded
//!   relationships and the single setter that keeps derived client flags
//!   consistent.
//! - **Entity Resolver** ([`Resolver`]): maps import records to existing
//!   entities by identifier, exact name, then fuzzy name, without creating
//!   duplicates under concurrency.
//! - **Review Queue** ([`ReviewQueue`]): ambiguous resolutions awaiting
//!   adjudication, with a guarded state machine.
//! - **Cascade Controller** ([`CascadeController`]): bounds enrichment
//!   fan-out by depth.
//! - **Connection Path Finder** ([`PathFinder`]): ranked, explainable paths
//!   from the home network to a target.
//!
//! [`ImportEngine`] wires them together and [`WarmpathRuntime`] runs it on
//! isolated worker pools.
//!
//! ## Usage
//!
//! ```
//! use chrono::NaiveDate;
//! use warmpath::{EntityType, ImportEvent, ImportEngine, RelationshipKind, WarmpathConfig};
//!
//! let engine = ImportEngine::in_memory(WarmpathConfig::default()).unwrap();
//! let store = engine.store();
//!
//! let home = store
//!     .upsert_entity(&ImportEvent::new(EntityType::Company, "Holdco").identifier("domain", "holdco.com"))
//!     .unwrap();
//! let target = store
//!     .upsert_entity(&ImportEvent::new(EntityType::Company, "Opco").identifier("domain", "opco.com"))
//!     .unwrap();
//! let start = NaiveDate::from_ymd_opt(2020, 1, 1).unwrap();
//! store
//!     .record_relationship(RelationshipKind::Ownership, home, target, start, None)
//!     .unwrap();
//!
//! let paths = engine
//!     .path_finder()
//!     .find_paths(store, &[home], target, 3, None)
//!     .unwrap();
//! assert_eq!(paths[0].tier.number(), 2);
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

// Core types
pub mod entity;
pub mod error;
pub mod import;
pub mod normalize;
pub mod relationship;
pub mod time;

// Storage and the temporal graph
pub mod storage;
pub mod temporal;

// Components
pub mod cascade;
pub mod config;
pub mod paths;
pub mod resolver;
pub mod review;

// Orchestration
pub mod engine;

pub use cascade::{CascadeController, EnrichmentBatch, EnrichmentLevel, EnrichmentPlan, NetworkScope};
pub use config::{PathFinderConfig, ResolverConfig, RuntimeConfig, WarmpathConfig};
pub use engine::runtime::{ExecutionHandle, ExecutionPath, WarmpathRuntime};
pub use engine::{ImportEngine, ImportOutcome, ReviewDecision};
pub use entity::{Entity, EntityId, EntityProfile, EntityType, ProspectStatus};
pub use error::{ExecutionError, ValidationError, WarmpathError, WarmpathResult};
pub use import::{ImportAttributes, ImportEvent};
pub use paths::{ConnectionPath, GraphSnapshot, PathEdge, PathFinder, PathQuery, Tier};
pub use relationship::{Relationship, RelationshipId, RelationshipKind};
pub use resolver::{Resolution, Resolver};
pub use review::{
    MatchCandidate, ReviewItem, ReviewItemId, ReviewPriority, ReviewQueue, ReviewReason,
    ReviewResolution, ReviewStatus, TransitionDetails,
};
pub use storage::{
    EntityStore, InMemoryEntityStore, InMemoryRelationshipStore, InMemoryReviewStore, RelationshipStore,
    ReviewStore, StorageError, StoreSnapshot,
};
pub use temporal::TemporalStore;
pub use time::{DateRange, IntervalStatus};
