//! # Engine Façade
//!
//! [`Engine`] ties the pieces together: the relation catalog, the provider
//! registry, the batch manager, and the graph runtimes, all behind a single
//! lock so every graph mutation is serialized through one logical executor.
//! Handles and subscriptions are thin views onto the same shared core.
//!
//! ## Usage
//!
//! ```rust
//! use leapjoin::{ColumnType, Engine, RelationSchema};
//!
//! let engine = Engine::new();
//! engine
//!     .define_relation(
//!         "edge",
//!         RelationSchema::new(vec![("src", ColumnType::Integer), ("dst", ColumnType::Integer)])
//!             .unwrap(),
//!     )
//!     .unwrap();
//!
//! let mut query = engine.build_query("reachable_from_edges");
//! let scan = query.scan("edge").unwrap();
//! let heads = query.project(scan, &[0]).unwrap();
//! query.output(heads);
//! let handle = engine.register(query.build()).unwrap();
//!
//! engine.insert("edge", vec![(1, 2), (2, 3)]).unwrap();
//! let results = handle.results().unwrap();
//! assert_eq!(results.values().next().unwrap().len(), 2);
//! ```

mod handle;

pub use handle::{QueryHandle, QueryNotification, SubscribeOptions, Subscription};

use crate::batch::BatchManager;
use crate::catalog::Catalog;
use crate::config::EngineConfig;
use crate::delta::Delta;
use crate::error::{EngineError, EngineResult};
use crate::graph::{QueryBuilder, QueryGraph};
use crate::provider::{ComputeProvider, SharedProvider};
use crate::runtime::GraphEngine;
use crate::schema::RelationSchema;
use crate::value::{Row, Rows, Tuple};
use handle::Subscriber;
use indexmap::IndexMap;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;

/// Options for [`Engine::register_with`].
#[derive(Debug, Clone, Copy, Default)]
pub struct RegisterOptions {
    /// Run cold start right after registration; defaults to the engine
    /// configuration when `None`.
    pub cold_start: Option<bool>,
}

pub(crate) struct EngineCore {
    pub(crate) config: EngineConfig,
    pub(crate) catalog: Catalog,
    pub(crate) providers: IndexMap<String, SharedProvider>,
    pub(crate) graphs: GraphEngine,
    pub(crate) batch: BatchManager,
    /// Ids of graphs that were deactivated; handle operations on them fail
    /// with `InactiveQuery` rather than `UnknownQuery`.
    pub(crate) retired: Vec<String>,
    pub(crate) subscribers: HashMap<String, Vec<Subscriber>>,
    pub(crate) next_subscriber_id: u64,
}

impl EngineCore {
    /// Fail with `InactiveQuery` for retired graphs, `UnknownQuery` for
    /// never-registered ones.
    pub(crate) fn check_active(&self, graph_id: &str) -> EngineResult<()> {
        if self.graphs.contains(graph_id) {
            Ok(())
        } else if self.retired.iter().any(|id| id == graph_id) {
            Err(EngineError::InactiveQuery(graph_id.to_string()))
        } else {
            Err(EngineError::UnknownQuery(graph_id.to_string()))
        }
    }
}

/// Pending subscriber callbacks, fired after the core lock is released.
type FiredNotifications = Vec<(
    Arc<dyn Fn(&QueryNotification) + Send + Sync>,
    QueryNotification,
)>;

/// The incremental query engine.
///
/// Cheap to clone; clones share the same core.
#[derive(Clone)]
pub struct Engine {
    core: Arc<Mutex<EngineCore>>,
}

impl Default for Engine {
    fn default() -> Self {
        Engine::new()
    }
}

impl Engine {
    /// An engine with default configuration.
    pub fn new() -> Self {
        Engine::with_config(EngineConfig::default())
    }

    pub fn with_config(config: EngineConfig) -> Self {
        let batch = BatchManager::new(config.batch.flush_threshold);
        Engine {
            core: Arc::new(Mutex::new(EngineCore {
                config,
                catalog: Catalog::new(),
                providers: IndexMap::new(),
                graphs: GraphEngine::new(),
                batch,
                retired: Vec::new(),
                subscribers: HashMap::new(),
                next_subscriber_id: 0,
            })),
        }
    }

    /// An engine configured from `Leapjoin.toml` and `LEAPJOIN_*` env vars.
    pub fn from_env() -> EngineResult<Self> {
        Ok(Engine::with_config(EngineConfig::load()?))
    }

    // === Relations ===

    /// Register a base relation. Registrations last the engine's lifetime;
    /// duplicates fail.
    pub fn define_relation(&self, name: &str, schema: RelationSchema) -> EngineResult<()> {
        self.core.lock().catalog.define(name, schema)
    }

    /// The schema of a registered relation.
    pub fn relation_schema(&self, name: &str) -> EngineResult<RelationSchema> {
        self.core.lock().catalog.require(name).cloned()
    }

    // === Providers ===

    /// Register a compute provider under a name. Duplicates fail.
    pub fn register_provider(
        &self,
        name: &str,
        provider: impl ComputeProvider + 'static,
    ) -> EngineResult<()> {
        let mut core = self.core.lock();
        if core.providers.contains_key(name) {
            return Err(EngineError::DuplicateProvider(name.to_string()));
        }
        core.providers
            .insert(name.to_string(), crate::provider::share(provider));
        Ok(())
    }

    // === Ingress ===

    /// Insert rows into a base relation.
    pub fn insert(&self, relation: &str, rows: impl Into<Rows>) -> EngineResult<()> {
        self.ingest(relation, rows.into(), true)
    }

    /// Delete rows from a base relation.
    pub fn delete(&self, relation: &str, rows: impl Into<Rows>) -> EngineResult<()> {
        self.ingest(relation, rows.into(), false)
    }

    fn ingest(&self, relation: &str, rows: Rows, additive: bool) -> EngineResult<()> {
        if rows.is_empty() {
            return Ok(());
        }
        let fired = {
            let mut core = self.core.lock();
            if !core.catalog.contains(relation) {
                if core.config.auto_register_relations {
                    let arity = row_arity(&rows.0[0]);
                    let schema = RelationSchema::untyped(arity)?;
                    core.catalog.define(relation, schema)?;
                    tracing::debug!(relation, arity, "relation_auto_registered");
                } else {
                    return Err(EngineError::RelationNotDefined(relation.to_string()));
                }
            }
            let strict = core.config.validation.strict_types;
            let schema = core.catalog.require(relation)?.clone();
            let tuples = rows
                .0
                .into_iter()
                .map(|row| schema.coerce_row(relation, row, strict))
                .collect::<EngineResult<Vec<Tuple>>>()?;
            let delta = if additive {
                Delta::of_adds(tuples)
            } else {
                Delta::of_removes(tuples)
            };
            for graph in core.graphs.graphs_for_relation(relation) {
                core.batch.add(&graph, relation, delta.clone());
            }
            if core.batch.should_flush() {
                flush_core(&mut core, None)?
            } else {
                Vec::new()
            }
        };
        fire(fired);
        Ok(())
    }

    /// Deliver all pending batches to their graphs.
    pub fn flush(&self) -> EngineResult<()> {
        let fired = {
            let mut core = self.core.lock();
            flush_core(&mut core, None)?
        };
        fire(fired);
        Ok(())
    }

    /// Deliver pending batches for one graph only.
    pub fn flush_graph(&self, graph_id: &str) -> EngineResult<()> {
        let fired = {
            let mut core = self.core.lock();
            flush_core(&mut core, Some(graph_id))?
        };
        fire(fired);
        Ok(())
    }

    // === Transactions ===

    /// Enter a (possibly nested) transaction; auto-flush is suspended until
    /// the outermost one ends.
    pub fn begin_transaction(&self) {
        self.core.lock().batch.begin();
    }

    /// Whether a transaction is currently open.
    pub fn in_transaction(&self) -> bool {
        self.core.lock().batch.in_transaction()
    }

    /// Leave a transaction level; the outermost end commits pending batches.
    pub fn end_transaction(&self) -> EngineResult<()> {
        let fired = {
            let mut core = self.core.lock();
            if core.batch.end() {
                flush_core(&mut core, None)?
            } else {
                Vec::new()
            }
        };
        fire(fired);
        Ok(())
    }

    /// Run `f` inside a transaction: commit on success, discard every
    /// pending batch on error. Subscribers never observe a rolled-back
    /// batch.
    pub fn transaction<T>(
        &self,
        f: impl FnOnce(&Engine) -> anyhow::Result<T>,
    ) -> anyhow::Result<T> {
        self.begin_transaction();
        match f(self) {
            Ok(value) => {
                self.end_transaction()?;
                Ok(value)
            }
            Err(err) => {
                self.core.lock().batch.rollback();
                Err(err)
            }
        }
    }

    // === Queries ===

    /// Start building a query graph against the current catalog.
    pub fn build_query(&self, id: impl Into<String>) -> QueryBuilder {
        QueryBuilder::new(id, self.core.lock().catalog.clone())
    }

    /// Register a query graph and return its handle. Cold start follows the
    /// engine configuration.
    pub fn register(&self, graph: QueryGraph) -> EngineResult<QueryHandle> {
        self.register_with(graph, RegisterOptions::default())
    }

    /// Register a query graph with explicit options.
    pub fn register_with(
        &self,
        graph: QueryGraph,
        options: RegisterOptions,
    ) -> EngineResult<QueryHandle> {
        let mut core = self.core.lock();
        if core.graphs.contains(&graph.id) {
            return Err(EngineError::DuplicateQuery(graph.id));
        }
        let cold = options
            .cold_start
            .unwrap_or(core.config.cold_start_by_default);
        let plan = graph.plan(&core.catalog)?;
        let graph_id = plan.graph_id.clone();
        let providers = core.providers.clone();
        core.graphs.register(plan, &providers, cold)?;
        core.retired.retain(|id| id != &graph_id);
        drop(core);
        Ok(QueryHandle::new(Arc::clone(&self.core), graph_id))
    }

    // === Providers: polling ===

    /// Run one provider cycle (`delta_since`/`flips_since`) for every
    /// registered graph and propagate the resulting deltas.
    pub fn poll_providers(&self) -> EngineResult<()> {
        let fired = {
            let mut core = self.core.lock();
            let ids: Vec<String> = core.graphs.graph_ids().map(String::from).collect();
            let mut fired = Vec::new();
            for graph_id in ids {
                let outputs = core.graphs.get_mut(&graph_id)?.poll_compute()?;
                collect_notifications(&mut core, &graph_id, outputs, &mut fired);
            }
            fired
        };
        fire(fired);
        Ok(())
    }
}

fn row_arity(row: &Row) -> usize {
    match row {
        Row::Positional(values) => values.len(),
        Row::Named(map) => map.len(),
        Row::Tuple(tuple) => tuple.arity(),
    }
}

/// Drain pending batches (optionally for one graph) and push them through
/// their graphs. Returns the subscriber callbacks to fire once the lock is
/// released.
pub(crate) fn flush_core(
    core: &mut EngineCore,
    graph: Option<&str>,
) -> EngineResult<FiredNotifications> {
    let drained = core.batch.drain(graph);
    let mut fired = Vec::new();
    for (graph_id, relation, delta) in drained {
        tracing::debug!(
            graph = %graph_id,
            relation = %relation,
            tuples = delta.len(),
            "flush_delta"
        );
        let outputs = core.graphs.process_update(&graph_id, &relation, delta)?;
        collect_notifications(core, &graph_id, outputs, &mut fired);
    }
    Ok(fired)
}

/// Build one notification per subscriber of the graph, honoring its options.
fn collect_notifications(
    core: &mut EngineCore,
    graph_id: &str,
    outputs: Vec<(String, Delta)>,
    fired: &mut FiredNotifications,
) {
    if outputs.is_empty() {
        return;
    }
    let Some(subs) = core.subscribers.get(graph_id) else {
        return;
    };
    let stats = core
        .graphs
        .get(graph_id)
        .ok()
        .map(|g| g.statistics().clone());
    for sub in subs {
        let notification = QueryNotification {
            graph_id: graph_id.to_string(),
            deltas: sub.include_deltas.then(|| outputs.clone()),
            statistics: if sub.include_stats { stats.clone() } else { None },
        };
        fired.push((Arc::clone(&sub.callback), notification));
    }
}

/// Invoke collected callbacks outside the core lock, in flush order.
fn fire(fired: FiredNotifications) {
    for (callback, notification) in fired {
        callback(&notification);
    }
}
