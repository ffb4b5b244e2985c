//! Per-graph runtime statistics.
//!
//! Counters cover delta dispatches, provider cycles, per-node emissions, and
//! output churn. Snapshots are serializable for export and ride along on
//! subscriber notifications when requested.

use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use serde::Serialize;

/// Counters for one registered graph.
#[derive(Debug, Clone, Serialize)]
pub struct GraphStatistics {
    /// Graph id these counters belong to
    pub graph_id: String,
    /// Relation deltas dispatched into the graph
    pub updates_processed: u64,
    /// Total cycles run (cold starts, dispatches, provider polls)
    pub cycles: u64,
    /// Tuples emitted per node id, including non-output nodes
    pub node_emissions: IndexMap<String, u64>,
    /// Tuples added to output states
    pub output_added: u64,
    /// Tuples removed from output states
    pub output_removed: u64,
    /// Wall-clock time of the most recent cycle
    pub last_updated: Option<DateTime<Utc>>,
}

impl GraphStatistics {
    pub fn new(graph_id: impl Into<String>) -> Self {
        GraphStatistics {
            graph_id: graph_id.into(),
            updates_processed: 0,
            cycles: 0,
            node_emissions: IndexMap::new(),
            output_added: 0,
            output_removed: 0,
            last_updated: None,
        }
    }

    pub(crate) fn record_emission(&mut self, node_id: &str, tuples: u64) {
        *self.node_emissions.entry(node_id.to_string()).or_insert(0) += tuples;
    }

    pub(crate) fn stamp(&mut self) {
        self.last_updated = Some(Utc::now());
    }

    pub(crate) fn clear(&mut self) {
        self.updates_processed = 0;
        self.cycles = 0;
        self.node_emissions.clear();
        self.output_added = 0;
        self.output_removed = 0;
        self.last_updated = None;
    }

    /// JSON snapshot of the counters.
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or(serde_json::Value::Null)
    }
}
