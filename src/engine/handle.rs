//! Query handles and subscriptions.

use crate::delta::Delta;
use crate::engine::EngineCore;
use crate::error::EngineResult;
use crate::schema::RelationSchema;
use crate::stats::GraphStatistics;
use crate::value::Tuple;
use indexmap::IndexMap;
use parking_lot::Mutex;
use std::sync::{Arc, Weak};

/// What a subscriber receives at the end of a graph's flush cycle.
#[derive(Debug, Clone)]
pub struct QueryNotification {
    pub graph_id: String,
    /// Output deltas of the cycle, keyed by output node id; present when the
    /// subscription asked for deltas.
    pub deltas: Option<Vec<(String, Delta)>>,
    /// Statistics snapshot; present when the subscription asked for stats.
    pub statistics: Option<GraphStatistics>,
}

/// Subscription options.
#[derive(Debug, Clone, Copy)]
pub struct SubscribeOptions {
    pub include_deltas: bool,
    pub include_stats: bool,
}

impl Default for SubscribeOptions {
    fn default() -> Self {
        SubscribeOptions {
            include_deltas: true,
            include_stats: false,
        }
    }
}

pub(crate) struct Subscriber {
    pub(crate) id: u64,
    pub(crate) include_deltas: bool,
    pub(crate) include_stats: bool,
    pub(crate) callback: Arc<dyn Fn(&QueryNotification) + Send + Sync>,
}

/// Undo token for a subscription. Dropping it without calling
/// [`Subscription::unsubscribe`] leaves the subscription in place.
pub struct Subscription {
    core: Weak<Mutex<EngineCore>>,
    graph_id: String,
    id: u64,
}

impl Subscription {
    /// Remove the subscription.
    pub fn unsubscribe(self) {
        if let Some(core) = self.core.upgrade() {
            let mut core = core.lock();
            if let Some(subs) = core.subscribers.get_mut(&self.graph_id) {
                subs.retain(|s| s.id != self.id);
            }
        }
    }
}

/// Handle to a registered query.
///
/// Handles are views onto the engine core; clones address the same query.
/// Every operation fails with `InactiveQuery` once the query is
/// deactivated.
#[derive(Clone)]
pub struct QueryHandle {
    core: Arc<Mutex<EngineCore>>,
    graph_id: String,
}

impl QueryHandle {
    pub(crate) fn new(core: Arc<Mutex<EngineCore>>, graph_id: String) -> Self {
        QueryHandle { core, graph_id }
    }

    pub fn graph_id(&self) -> &str {
        &self.graph_id
    }

    /// Sorted snapshot of each output's current set, keyed by output node
    /// id.
    pub fn results(&self) -> EngineResult<IndexMap<String, Vec<Tuple>>> {
        let core = self.core.lock();
        core.check_active(&self.graph_id)?;
        Ok(core.graphs.get(&self.graph_id)?.results())
    }

    /// The current set of the single output, for queries with exactly one.
    pub fn output(&self) -> EngineResult<Vec<Tuple>> {
        let mut results = self.results()?;
        match results.len() {
            1 => Ok(results
                .shift_remove_index(0)
                .map(|(_, v)| v)
                .unwrap_or_default()),
            n => Err(crate::error::EngineError::AmbiguousOutput {
                graph: self.graph_id.clone(),
                count: n,
            }),
        }
    }

    /// Statistics snapshot for this query's graph.
    pub fn statistics(&self) -> EngineResult<GraphStatistics> {
        let core = self.core.lock();
        core.check_active(&self.graph_id)?;
        Ok(core.graphs.get(&self.graph_id)?.statistics().clone())
    }

    /// Current set of a scanned relation as this graph sees it.
    pub fn relation_snapshot(&self, relation: &str) -> EngineResult<Vec<Tuple>> {
        let core = self.core.lock();
        core.check_active(&self.graph_id)?;
        core.graphs.get(&self.graph_id)?.relation_snapshot(relation)
    }

    /// The schema of an output node, for callers binding columns by name.
    pub fn output_schema(&self, node_id: &str) -> EngineResult<Option<RelationSchema>> {
        let core = self.core.lock();
        core.check_active(&self.graph_id)?;
        Ok(core
            .graphs
            .get(&self.graph_id)?
            .output_schema(node_id)
            .cloned())
    }

    /// Subscribe to end-of-cycle notifications, in registration order.
    /// Returns an unsubscribe token.
    pub fn subscribe(
        &self,
        callback: impl Fn(&QueryNotification) + Send + Sync + 'static,
        options: SubscribeOptions,
    ) -> EngineResult<Subscription> {
        let mut core = self.core.lock();
        core.check_active(&self.graph_id)?;
        let id = core.next_subscriber_id;
        core.next_subscriber_id += 1;
        core.subscribers
            .entry(self.graph_id.clone())
            .or_default()
            .push(Subscriber {
                id,
                include_deltas: options.include_deltas,
                include_stats: options.include_stats,
                callback: Arc::new(callback),
            });
        Ok(Subscription {
            core: Arc::downgrade(&self.core),
            graph_id: self.graph_id.clone(),
            id,
        })
    }

    /// Clear all operator and output state, then cold start again so
    /// provider-backed sources repopulate.
    pub fn reset(&self) -> EngineResult<()> {
        let mut core = self.core.lock();
        core.check_active(&self.graph_id)?;
        let runtime = core.graphs.get_mut(&self.graph_id)?;
        runtime.reset();
        runtime.cold_start()?;
        Ok(())
    }

    /// Drop the query's runtime. Later handle operations fail with
    /// `InactiveQuery`.
    pub fn deactivate(&self) -> EngineResult<()> {
        let mut core = self.core.lock();
        core.check_active(&self.graph_id)?;
        core.graphs.deactivate(&self.graph_id)?;
        core.subscribers.remove(&self.graph_id);
        core.retired.push(self.graph_id.clone());
        Ok(())
    }
}
