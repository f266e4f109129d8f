//! Storage traits and backends for warmpath.
//!
//! The traits define the abstract interface; `memory` is the thread-safe
//! in-memory backend and `snapshot` moves its contents to and from JSON.

pub mod memory;
pub mod snapshot;
mod traits;

pub use memory::{InMemoryEntityStore, InMemoryRelationshipStore, InMemoryReviewStore};
pub use snapshot::StoreSnapshot;
pub use traits::{EntityStore, RelationshipStore, ReviewStore, StorageError};
