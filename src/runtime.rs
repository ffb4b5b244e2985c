//! Graph runtimes and the engine that drives them.
//!
//! A [`GraphRuntime`] owns one instantiated dataflow: operator nodes wired
//! by plan index, per-node delivery queues, materialized output states, and
//! statistics. All processing is single-threaded and cooperative: one cycle
//! walks the nodes in execution order, draining each node's pending
//! deliveries before moving on, so a node never re-enters itself and
//! unaffected nodes are skipped by having nothing queued.
//!
//! [`GraphEngine`] is the registry of runtimes: it instantiates plans, cold
//! starts them, routes relation deltas to the owning scan, and runs provider
//! polling cycles.

use crate::delta::Delta;
use crate::error::{EngineError, EngineResult};
use crate::graph::{ComputeKind, GraphPlan, NodeSpec};
use crate::node::{ComputeOp, DiffOp, JoinOp, Operator, ProjectOp, RenameOp, ScanOp, UnionOp};
use crate::provider::{ProviderMode, SharedProvider};
use crate::schema::RelationSchema;
use crate::stats::GraphStatistics;
use crate::value::Tuple;
use indexmap::{IndexMap, IndexSet};
use std::collections::{HashMap, VecDeque};

/// Output deltas of one cycle, keyed by output node id.
pub(crate) type CycleOutputs = Vec<(String, Delta)>;

#[derive(Debug)]
struct RuntimeNode {
    id: String,
    op: Operator,
    /// `(consumer index, consumer edge)` in delivery order.
    downstream: Vec<(usize, usize)>,
    is_output: bool,
    schema: RelationSchema,
}

#[derive(Clone, Copy)]
enum Phase {
    Deliver,
    ColdStart,
    Poll,
}

/// One instantiated graph.
#[derive(Debug)]
pub(crate) struct GraphRuntime {
    graph_id: String,
    nodes: Vec<RuntimeNode>,
    scans: HashMap<String, usize>,
    pending: Vec<VecDeque<(usize, Delta)>>,
    output_state: IndexMap<String, IndexSet<Tuple>>,
    stats: GraphStatistics,
}

impl GraphRuntime {
    /// Instantiate operators from a plan, resolving compute providers.
    pub fn new(
        plan: GraphPlan,
        providers: &IndexMap<String, SharedProvider>,
    ) -> EngineResult<Self> {
        let mut nodes = Vec::with_capacity(plan.nodes.len());
        for node in &plan.nodes {
            let op = match &node.spec {
                NodeSpec::Scan { relation } => {
                    Operator::Scan(ScanOp::new(relation.clone(), node.schema.arity()))
                }
                NodeSpec::Project { indices } => Operator::Project(ProjectOp::new(indices.clone())),
                NodeSpec::Union => Operator::Union(UnionOp::new()),
                NodeSpec::Diff { keys } => Operator::Diff(DiffOp::new(
                    keys.iter().map(|&(l, _)| l).collect(),
                    keys.iter().map(|&(_, r)| r).collect(),
                )),
                NodeSpec::Rename { .. } => Operator::Rename(RenameOp::new()),
                NodeSpec::Join { spec } => {
                    let arities: Vec<usize> = node
                        .inputs
                        .iter()
                        .map(|&i| plan.nodes[i].schema.arity())
                        .collect();
                    Operator::Join(JoinOp::new(node.id.clone(), spec, &arities)?)
                }
                NodeSpec::Compute { provider, kind } => {
                    let shared = providers
                        .get(provider)
                        .ok_or_else(|| EngineError::UnknownProvider(provider.clone()))?
                        .clone();
                    let mode = shared.lock().mode();
                    match (kind, mode) {
                        (ComputeKind::Enumerable { .. }, ProviderMode::Enumerable) => {
                            Operator::Compute(ComputeOp::enumerable(
                                node.id.clone(),
                                provider.clone(),
                                shared,
                            ))
                        }
                        (ComputeKind::Pointwise, ProviderMode::Pointwise) => Operator::Compute(
                            ComputeOp::pointwise(node.id.clone(), provider.clone(), shared),
                        ),
                        _ => return Err(EngineError::UnknownProviderMode(provider.clone())),
                    }
                }
            };
            nodes.push(RuntimeNode {
                id: node.id.clone(),
                op,
                downstream: node.downstream.clone(),
                is_output: node.is_output,
                schema: node.schema.clone(),
            });
        }

        let pending = (0..nodes.len()).map(|_| VecDeque::new()).collect();
        let mut output_state = IndexMap::new();
        for &idx in &plan.outputs {
            output_state.insert(plan.nodes[idx].id.clone(), IndexSet::new());
        }

        Ok(GraphRuntime {
            stats: GraphStatistics::new(plan.graph_id.clone()),
            graph_id: plan.graph_id,
            nodes,
            scans: plan.scans,
            pending,
            output_state,
        })
    }

    pub fn graph_id(&self) -> &str {
        &self.graph_id
    }

    /// Route one relation delta to its scan and run the cycle.
    pub fn dispatch(&mut self, relation: &str, delta: Delta) -> EngineResult<CycleOutputs> {
        let &scan = self
            .scans
            .get(relation)
            .ok_or_else(|| EngineError::UnknownRelation(relation.to_string()))?;
        self.pending[scan].push_back((0, delta));
        self.stats.updates_processed += 1;
        self.run(Phase::Deliver)
    }

    /// Cold start: walk nodes in execution order; enumerable compute nodes
    /// emit their initial enumeration, scans emit nothing.
    pub fn cold_start(&mut self) -> EngineResult<CycleOutputs> {
        tracing::debug!(graph = %self.graph_id, "cold_start");
        self.run(Phase::ColdStart)
    }

    /// One provider cycle across every compute node.
    pub fn poll_compute(&mut self) -> EngineResult<CycleOutputs> {
        self.run(Phase::Poll)
    }

    fn run(&mut self, phase: Phase) -> EngineResult<CycleOutputs> {
        let mut emitted: IndexMap<String, Delta> = IndexMap::new();
        for idx in 0..self.nodes.len() {
            let source = match phase {
                Phase::ColdStart => self.nodes[idx].op.cold_start()?,
                Phase::Poll => self.nodes[idx].op.poll()?,
                Phase::Deliver => None,
            };
            if let Some(delta) = source {
                if !delta.is_empty() {
                    self.route(idx, delta, &mut emitted)?;
                }
            }
            while let Some((edge, delta)) = self.pending[idx].pop_front() {
                let out = self.nodes[idx].op.on_delta(edge, &delta)?;
                if out.is_empty() {
                    continue;
                }
                self.route(idx, out, &mut emitted)?;
            }
        }
        self.stats.cycles += 1;
        self.stats.stamp();
        Ok(emitted.into_iter().filter(|(_, d)| !d.is_empty()).collect())
    }

    /// Deliver one emission: update output state if the node is an output,
    /// then enqueue it for every consumer in declaration order.
    fn route(
        &mut self,
        idx: usize,
        delta: Delta,
        emitted: &mut IndexMap<String, Delta>,
    ) -> EngineResult<()> {
        let node = &self.nodes[idx];
        self.stats.record_emission(&node.id, delta.len() as u64);
        if node.is_output {
            let state = self.output_state.get_mut(&node.id).ok_or_else(|| {
                EngineError::Invariant(format!("output state missing for '{}'", node.id))
            })?;
            for t in delta.adds() {
                if !state.insert(t.clone()) {
                    return Err(EngineError::Invariant(format!(
                        "output '{}' added {t} twice",
                        node.id
                    )));
                }
            }
            for t in delta.removes() {
                if !state.shift_remove(t) {
                    return Err(EngineError::Invariant(format!(
                        "output '{}' removed absent {t}",
                        node.id
                    )));
                }
            }
            self.stats.output_added += delta.adds().len() as u64;
            self.stats.output_removed += delta.removes().len() as u64;
            emitted
                .entry(node.id.clone())
                .or_default()
                .merge(delta.clone());
        }
        let downstream = self.nodes[idx].downstream.clone();
        for (target, edge) in downstream {
            self.pending[target].push_back((edge, delta.clone()));
        }
        Ok(())
    }

    /// Sorted snapshot of each output's current set.
    pub fn results(&self) -> IndexMap<String, Vec<Tuple>> {
        self.output_state
            .iter()
            .map(|(id, set)| {
                let mut tuples: Vec<Tuple> = set.iter().cloned().collect();
                tuples.sort();
                (id.clone(), tuples)
            })
            .collect()
    }

    /// The schema of an output node, for callers binding columns by name.
    pub fn output_schema(&self, node_id: &str) -> Option<&RelationSchema> {
        self.nodes
            .iter()
            .find(|n| n.id == node_id && n.is_output)
            .map(|n| &n.schema)
    }

    /// Current set of a scanned relation within this graph.
    pub fn relation_snapshot(&self, relation: &str) -> EngineResult<Vec<Tuple>> {
        let &idx = self
            .scans
            .get(relation)
            .ok_or_else(|| EngineError::UnknownRelation(relation.to_string()))?;
        match &self.nodes[idx].op {
            Operator::Scan(scan) => Ok(scan.tuples().cloned().collect()),
            _ => Err(EngineError::Invariant(format!(
                "scan index for '{relation}' points at a non-scan node"
            ))),
        }
    }

    pub fn statistics(&self) -> &GraphStatistics {
        &self.stats
    }

    /// Clear all operator and output state, keeping the wiring.
    pub fn reset(&mut self) {
        for node in &mut self.nodes {
            node.op.reset();
        }
        for queue in &mut self.pending {
            queue.clear();
        }
        for set in self.output_state.values_mut() {
            set.clear();
        }
        self.stats.clear();
        tracing::debug!(graph = %self.graph_id, "graph_reset");
    }
}

/// Registry of graph runtimes.
#[derive(Debug, Default)]
pub(crate) struct GraphEngine {
    graphs: IndexMap<String, GraphRuntime>,
}

impl GraphEngine {
    pub fn new() -> Self {
        GraphEngine::default()
    }

    pub fn contains(&self, graph_id: &str) -> bool {
        self.graphs.contains_key(graph_id)
    }

    /// Instantiate and register a planned graph, cold starting it unless
    /// told otherwise.
    pub fn register(
        &mut self,
        plan: GraphPlan,
        providers: &IndexMap<String, SharedProvider>,
        cold_start: bool,
    ) -> EngineResult<()> {
        if self.graphs.contains_key(&plan.graph_id) {
            return Err(EngineError::DuplicateQuery(plan.graph_id));
        }
        let mut runtime = GraphRuntime::new(plan, providers)?;
        if cold_start {
            runtime.cold_start()?;
        }
        tracing::info!(graph = %runtime.graph_id(), "graph_registered");
        self.graphs.insert(runtime.graph_id().to_string(), runtime);
        Ok(())
    }

    pub fn get(&self, graph_id: &str) -> EngineResult<&GraphRuntime> {
        self.graphs
            .get(graph_id)
            .ok_or_else(|| EngineError::UnknownQuery(graph_id.to_string()))
    }

    pub fn get_mut(&mut self, graph_id: &str) -> EngineResult<&mut GraphRuntime> {
        self.graphs
            .get_mut(graph_id)
            .ok_or_else(|| EngineError::UnknownQuery(graph_id.to_string()))
    }

    /// Graphs whose scans reference the relation, in registration order.
    pub fn graphs_for_relation(&self, relation: &str) -> Vec<String> {
        self.graphs
            .values()
            .filter(|g| g.scans.contains_key(relation))
            .map(|g| g.graph_id.clone())
            .collect()
    }

    /// Route a relation delta into one graph.
    pub fn process_update(
        &mut self,
        graph_id: &str,
        relation: &str,
        delta: Delta,
    ) -> EngineResult<CycleOutputs> {
        self.get_mut(graph_id)?.dispatch(relation, delta)
    }

    /// Drop a graph's runtime entirely.
    pub fn deactivate(&mut self, graph_id: &str) -> EngineResult<()> {
        self.graphs
            .shift_remove(graph_id)
            .map(|_| tracing::info!(graph = %graph_id, "graph_deactivated"))
            .ok_or_else(|| EngineError::UnknownQuery(graph_id.to_string()))
    }

    pub fn graph_ids(&self) -> impl Iterator<Item = &str> {
        self.graphs.keys().map(String::as_str)
    }
}
