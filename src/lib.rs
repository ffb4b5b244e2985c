//! # Leapjoin
//!
//! An in-memory **incremental relational query engine**. Callers register
//! base relations and dataflow graphs of relational operators, then push
//! bounded add/remove deltas at relations; the engine propagates minimal,
//! set-semantic deltas to every graph output. Joins run delta-on-one-input
//! **Leapfrog Triejoin** over leveled tuple tries.
//!
//! ## Pipeline Architecture
//!
//! ```text
//! insert/delete (rows)
//!     |
//! [Schema coercion]        -> tuples (Atom vectors)
//!     |
//! [BatchManager]           -> per-(graph, relation) coalesced deltas
//!     |  flush
//! [GraphEngine]            -> routes each delta to the owning Scan
//!     |
//! [Operator nodes]         -> Scan/Project/Join/Union/Diff/Rename/Compute
//!     |  topological order,  counted 0<->1 transitions only
//! [Output states]          -> materialized sets + subscriber callbacks
//! ```
//!
//! ## Module Organization
//!
//! | Module | Purpose |
//! |--------|---------|
//! | `value` | Atoms, tuples, canonical order-preserving encoding |
//! | `schema` / `catalog` | Typed relation schemas and their registry |
//! | `delta` | Normalized `(adds, removes)` pairs |
//! | `trie` / `iter` | Leveled tuple tries and leapfrog level cursors |
//! | `graph` | Logical query graphs, validation, planning, builder |
//! | `provider` | External compute predicates (enumerable / pointwise) |
//! | `engine` | Façade: registration, ingress, transactions, handles |
//! | `config` | Layered configuration (file + environment) |
//! | `stats` | Per-graph counters |
//!
//! ## Usage
//!
//! ```rust
//! use leapjoin::{ColumnType, Engine, RelationSchema};
//!
//! let engine = Engine::new();
//! engine.define_relation(
//!     "users",
//!     RelationSchema::new(vec![
//!         ("uid", ColumnType::Integer),
//!         ("name", ColumnType::String),
//!     ])?,
//! )?;
//! engine.define_relation(
//!     "orders",
//!     RelationSchema::new(vec![
//!         ("oid", ColumnType::Id),
//!         ("uid", ColumnType::Integer),
//!         ("amount", ColumnType::Integer),
//!     ])?,
//! )?;
//!
//! let mut query = engine.build_query("orders_with_names");
//! let users = query.scan("users")?;
//! let orders = query.scan("orders")?;
//! let joined = query.join(users, orders, &[(0, 1)])?;
//! query.output(joined);
//! let handle = engine.register(query.build())?;
//!
//! engine.insert("users", vec![(1, "ada"), (2, "grace")])?;
//! engine.insert("orders", vec![("o1", 1, 100), ("o2", 2, 250)])?;
//!
//! assert_eq!(handle.output()?.len(), 2);
//! # Ok::<(), anyhow::Error>(())
//! ```

pub mod catalog;
pub mod config;
pub mod delta;
pub mod engine;
pub mod error;
pub mod graph;
pub mod iter;
pub mod provider;
pub mod schema;
pub mod stats;
pub mod trie;
pub mod value;

// Internal machinery: operators, runtimes, batching.
mod batch;
mod node;
mod runtime;

// Re-export the primary surface.
pub use catalog::Catalog;
pub use config::{BatchConfig, EngineConfig, ValidationConfig};
pub use delta::Delta;
pub use engine::{
    Engine, QueryHandle, QueryNotification, RegisterOptions, SubscribeOptions, Subscription,
};
pub use error::{EngineError, EngineResult};
pub use graph::{
    ComputeKind, GraphNode, JoinSpec, JoinVariable, NodeRef, NodeSpec, QueryBuilder, QueryGraph,
    VarOccurrence,
};
pub use iter::{LevelIterator, TrieFactory};
pub use provider::{ComputeProvider, ProviderHandle, ProviderMode, SharedProvider};
pub use schema::{Column, ColumnType, RelationSchema};
pub use stats::GraphStatistics;
pub use trie::TupleTrie;
pub use value::{Atom, AtomType, Row, Rows, Scalar, Tuple};
