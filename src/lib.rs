//! graph-cache - normalized graph cache for tree-shaped query results
//!
//! # Architecture
//!
//! - **Normalized nodes**: entities keyed by id, parameterized fields in their own nodes
//! - **Immutable snapshots**: every write produces a new [`GraphSnapshot`]
//! - **Structural sharing**: unchanged nodes and subtrees keep their identity
//! - **Orphan collection**: nodes no longer reachable from a root are removed on commit
//! - **Optimistic layers**: queued updates replayed over each new baseline
//!
//! # Usage example
//!
//! ```
//! use graph_cache::{Cache, JsonValue, RawOperation};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let mut cache = Cache::default();
//! let query = RawOperation::query("{ viewer { id name } }");
//!
//! cache.write(&query, &JsonValue::from(serde_json::json!({
//!     "viewer": {"id": 1, "name": "Ada"}
//! })))?;
//!
//! let result = cache.read(&query, true)?;
//! assert!(result.complete);
//! # Ok(())
//! # }
//! ```

pub mod cache;
pub mod context;
pub mod editor;
pub mod error;
pub mod graph;
pub mod migrate;
pub mod observer;
pub mod query;
pub mod read;
pub mod serialization;
pub mod value;

pub use cache::{Cache, CacheSnapshot, CacheTransaction, WatchId};
pub use context::{CacheContext, Configuration, RawOperation};
pub use editor::{merge, EditedSnapshot, SnapshotEditor};
pub use error::{GraphError, Result};
pub use graph::{GraphSnapshot, GraphStore, NodeId, NodeReference, NodeSnapshot, QUERY_ROOT_ID};
pub use migrate::{migrate, MigrationMap, ParameterizedMigration};
pub use observer::QueryObserver;
pub use query::ParsedQuery;
pub use read::{read, QueryResult};
pub use serialization::{extract, restore};
pub use value::{JsonObject, JsonValue, PathPart};
