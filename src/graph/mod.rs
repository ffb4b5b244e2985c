//! # Query Graphs
//!
//! A [`QueryGraph`] is the logical description of a dataflow: named operator
//! nodes, their input edges, and a non-empty set of output nodes. Graphs are
//! built once (usually through [`QueryBuilder`]), validated against the
//! relation catalog, and *planned*: nodes are re-indexed into topological
//! order, edges become plain indices, and every node gets a resolved output
//! schema. The runtime instantiates operators from the resulting
//! [`GraphPlan`]; it never walks the logical graph again.

mod builder;

pub use builder::{NodeRef, QueryBuilder};

use crate::catalog::Catalog;
use crate::error::{EngineError, EngineResult};
use crate::schema::RelationSchema;
use petgraph::algo::toposort;
use petgraph::graph::DiGraph;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// One occurrence of a join variable: an input edge and a column within it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct VarOccurrence {
    pub input: usize,
    pub column: usize,
}

/// A join variable with the inputs that mention it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JoinVariable {
    pub name: String,
    pub occurrences: Vec<VarOccurrence>,
}

/// The atom specification of a join node: the leapfrog variable order and
/// the projection assembling output tuples from bound variables.
///
/// The variable order is fixed when the graph is built and stays stable for
/// the graph's lifetime.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JoinSpec {
    /// Variables in leapfrog order.
    pub variables: Vec<JoinVariable>,
    /// Output tuple assembly: indices into `variables`.
    pub output: Vec<usize>,
}

impl JoinSpec {
    /// Check internal consistency against the input arities: every column of
    /// every input is covered by exactly one variable, no variable touches
    /// the same input twice, and the output projection is in range.
    pub fn validate(&self, node: &str, input_arities: &[usize]) -> EngineResult<()> {
        if self.variables.is_empty() {
            return Err(EngineError::MissingAtomSpec(node.to_string()));
        }
        let mut seen: Vec<Vec<bool>> =
            input_arities.iter().map(|&a| vec![false; a]).collect();
        for var in &self.variables {
            if var.occurrences.is_empty() {
                return Err(EngineError::MissingConfig {
                    node: node.to_string(),
                    what: format!("variable '{}' has no occurrences", var.name),
                });
            }
            let mut inputs_touched = Vec::new();
            for occ in &var.occurrences {
                let arity =
                    *input_arities
                        .get(occ.input)
                        .ok_or_else(|| EngineError::MissingConfig {
                            node: node.to_string(),
                            what: format!("variable '{}' names input {}", var.name, occ.input),
                        })?;
                if occ.column >= arity {
                    return Err(EngineError::InvalidProjection {
                        index: occ.column,
                        arity,
                    });
                }
                if inputs_touched.contains(&occ.input) {
                    return Err(EngineError::MissingConfig {
                        node: node.to_string(),
                        what: format!(
                            "variable '{}' occurs twice in input {}",
                            var.name, occ.input
                        ),
                    });
                }
                inputs_touched.push(occ.input);
                if seen[occ.input][occ.column] {
                    return Err(EngineError::MissingConfig {
                        node: node.to_string(),
                        what: format!(
                            "input {} column {} is covered by two variables",
                            occ.input, occ.column
                        ),
                    });
                }
                seen[occ.input][occ.column] = true;
            }
        }
        for (input, cols) in seen.iter().enumerate() {
            if let Some(col) = cols.iter().position(|covered| !covered) {
                return Err(EngineError::MissingConfig {
                    node: node.to_string(),
                    what: format!("input {input} column {col} is not bound to any variable"),
                });
            }
        }
        for &v in &self.output {
            if v >= self.variables.len() {
                return Err(EngineError::InvalidProjection {
                    index: v,
                    arity: self.variables.len(),
                });
            }
        }
        Ok(())
    }
}

/// Compute node flavor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ComputeKind {
    /// Source node backed by an enumerable provider of the given arity.
    Enumerable { arity: usize },
    /// Filter node backed by a pointwise predicate over its single input.
    Pointwise,
}

/// Logical operator configuration of one graph node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum NodeSpec {
    Scan { relation: String },
    Project { indices: Vec<usize> },
    Join { spec: JoinSpec },
    Union,
    Diff { keys: Vec<(usize, usize)> },
    Rename { names: Vec<String> },
    Compute { provider: String, kind: ComputeKind },
}

impl NodeSpec {
    /// Human-readable operator name for diagnostics.
    pub fn kind_name(&self) -> &'static str {
        match self {
            NodeSpec::Scan { .. } => "scan",
            NodeSpec::Project { .. } => "project",
            NodeSpec::Join { .. } => "join",
            NodeSpec::Union => "union",
            NodeSpec::Diff { .. } => "diff",
            NodeSpec::Rename { .. } => "rename",
            NodeSpec::Compute { .. } => "compute",
        }
    }

    /// Acceptable input edge counts: `(min, max)`.
    fn input_bounds(&self) -> (usize, Option<usize>) {
        match self {
            NodeSpec::Scan { .. } => (0, Some(0)),
            NodeSpec::Project { .. } | NodeSpec::Rename { .. } => (1, Some(1)),
            NodeSpec::Join { .. } | NodeSpec::Union => (2, None),
            NodeSpec::Diff { .. } => (2, Some(2)),
            NodeSpec::Compute { kind, .. } => match kind {
                ComputeKind::Enumerable { .. } => (0, Some(0)),
                ComputeKind::Pointwise => (1, Some(1)),
            },
        }
    }
}

/// One logical node: a stable id, its operator, and its input edges (ids of
/// producer nodes, in edge order).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphNode {
    pub id: String,
    pub spec: NodeSpec,
    pub inputs: Vec<String>,
}

/// A logical dataflow graph with designated outputs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryGraph {
    pub id: String,
    pub nodes: Vec<GraphNode>,
    pub outputs: Vec<String>,
}

/// A planned node: operator config, resolved edges, and output schema.
#[derive(Debug, Clone)]
pub struct PlanNode {
    pub id: String,
    pub spec: NodeSpec,
    /// Plan indices of producers, in edge order.
    pub inputs: Vec<usize>,
    /// `(consumer plan index, consumer input edge)` pairs, in the order
    /// consumers were declared. Emissions are delivered in this order.
    pub downstream: Vec<(usize, usize)>,
    pub schema: RelationSchema,
    pub is_output: bool,
}

/// A validated graph in execution order.
#[derive(Debug, Clone)]
pub struct GraphPlan {
    pub graph_id: String,
    /// Nodes in topological (execution) order.
    pub nodes: Vec<PlanNode>,
    /// Plan indices of output nodes, in declaration order.
    pub outputs: Vec<usize>,
    /// Relation name -> plan index of its unique scan.
    pub scans: HashMap<String, usize>,
}

impl QueryGraph {
    /// Validate the graph against the catalog and lower it into execution
    /// order. Rejects duplicate ids, dangling edges, bad input counts,
    /// missing operator config, duplicate scans of one relation, unknown
    /// relations, empty output lists, and cycles.
    pub fn plan(&self, catalog: &Catalog) -> EngineResult<GraphPlan> {
        if self.outputs.is_empty() {
            return Err(EngineError::EmptyOutputs(self.id.clone()));
        }

        let mut index_of: HashMap<&str, usize> = HashMap::new();
        for (i, node) in self.nodes.iter().enumerate() {
            if index_of.insert(node.id.as_str(), i).is_some() {
                return Err(EngineError::DuplicateNode(node.id.clone()));
            }
        }

        // Resolve edges and check input counts up front.
        let mut resolved_inputs: Vec<Vec<usize>> = Vec::with_capacity(self.nodes.len());
        for node in &self.nodes {
            let (min, max) = node.spec.input_bounds();
            let n = node.inputs.len();
            if n < min || max.is_some_and(|m| n > m) {
                return Err(EngineError::MissingConfig {
                    node: node.id.clone(),
                    what: format!("{} takes {min}+ inputs, got {n}", node.spec.kind_name()),
                });
            }
            let mut inputs = Vec::with_capacity(n);
            for (edge, input_id) in node.inputs.iter().enumerate() {
                let &idx = index_of.get(input_id.as_str()).ok_or_else(|| {
                    EngineError::DanglingEdge {
                        node: node.id.clone(),
                        input: edge,
                        target: input_id.clone(),
                    }
                })?;
                inputs.push(idx);
            }
            resolved_inputs.push(inputs);
        }

        for output in &self.outputs {
            if !index_of.contains_key(output.as_str()) {
                return Err(EngineError::DanglingEdge {
                    node: self.id.clone(),
                    input: 0,
                    target: output.clone(),
                });
            }
        }

        // Topological order via petgraph; a cycle fails planning.
        let mut dag = DiGraph::<usize, ()>::new();
        let pg_nodes: Vec<_> = (0..self.nodes.len()).map(|i| dag.add_node(i)).collect();
        for (i, inputs) in resolved_inputs.iter().enumerate() {
            for &src in inputs {
                dag.add_edge(pg_nodes[src], pg_nodes[i], ());
            }
        }
        let order = toposort(&dag, None).map_err(|cycle| EngineError::CycleDetected {
            graph: self.id.clone(),
            node: self.nodes[dag[cycle.node_id()]].id.clone(),
        })?;

        // position[original index] = plan index
        let mut position = vec![0usize; self.nodes.len()];
        for (plan_idx, pg_idx) in order.iter().enumerate() {
            position[dag[*pg_idx]] = plan_idx;
        }

        // Propagate schemas in execution order and collect per-node config
        // errors while we are at it.
        let mut plan_nodes: Vec<Option<PlanNode>> = (0..self.nodes.len()).map(|_| None).collect();
        let mut scans: HashMap<String, usize> = HashMap::new();

        for pg_idx in &order {
            let orig = dag[*pg_idx];
            let node = &self.nodes[orig];
            let inputs: Vec<usize> = resolved_inputs[orig].iter().map(|&i| position[i]).collect();
            // Inputs precede consumers in execution order, so their plan
            // nodes are already resolved.
            let in_schemas: Vec<RelationSchema> = inputs
                .iter()
                .map(|&i| {
                    plan_nodes[i]
                        .as_ref()
                        .map(|n| n.schema.clone())
                        .ok_or_else(|| {
                            EngineError::Invariant("input planned after consumer".into())
                        })
                })
                .collect::<EngineResult<_>>()?;
            let input_schema = |edge: usize| &in_schemas[edge];

            let schema = match &node.spec {
                NodeSpec::Scan { relation } => {
                    let schema = catalog
                        .get(relation)
                        .ok_or_else(|| EngineError::UnknownRelation(relation.clone()))?
                        .clone();
                    if scans.insert(relation.clone(), position[orig]).is_some() {
                        return Err(EngineError::DuplicateScan {
                            graph: self.id.clone(),
                            relation: relation.clone(),
                        });
                    }
                    schema
                }
                NodeSpec::Project { indices } => {
                    if indices.is_empty() {
                        return Err(EngineError::MissingConfig {
                            node: node.id.clone(),
                            what: "projection indices".into(),
                        });
                    }
                    input_schema(0).project(indices)?
                }
                NodeSpec::Join { spec } => {
                    let arities: Vec<usize> =
                        in_schemas.iter().map(RelationSchema::arity).collect();
                    spec.validate(&node.id, &arities)?;
                    join_output_schema(spec, &in_schemas)?
                }
                NodeSpec::Union => {
                    let first = input_schema(0).clone();
                    for edge in 1..inputs.len() {
                        if input_schema(edge).arity() != first.arity() {
                            return Err(EngineError::ArityMismatch {
                                expected: first.arity(),
                                found: input_schema(edge).arity(),
                            });
                        }
                    }
                    first
                }
                NodeSpec::Diff { keys } => {
                    if keys.is_empty() {
                        return Err(EngineError::MissingConfig {
                            node: node.id.clone(),
                            what: "diff key attribute list".into(),
                        });
                    }
                    let left = input_schema(0).clone();
                    let right_arity = input_schema(1).arity();
                    for &(l, r) in keys {
                        if l >= left.arity() {
                            return Err(EngineError::InvalidProjection {
                                index: l,
                                arity: left.arity(),
                            });
                        }
                        if r >= right_arity {
                            return Err(EngineError::InvalidProjection {
                                index: r,
                                arity: right_arity,
                            });
                        }
                    }
                    left
                }
                NodeSpec::Rename { names } => input_schema(0).renamed(names.clone())?,
                NodeSpec::Compute { kind, .. } => match kind {
                    ComputeKind::Enumerable { arity } => RelationSchema::untyped(*arity)?,
                    ComputeKind::Pointwise => input_schema(0).clone(),
                },
            };

            plan_nodes[position[orig]] = Some(PlanNode {
                id: node.id.clone(),
                spec: node.spec.clone(),
                inputs,
                downstream: Vec::new(),
                schema,
                is_output: self.outputs.contains(&node.id),
            });
        }

        let mut nodes: Vec<PlanNode> = plan_nodes
            .into_iter()
            .map(|n| n.ok_or_else(|| EngineError::Invariant("plan node left unresolved".into())))
            .collect::<EngineResult<_>>()?;

        // Wire downstream edges in consumer declaration order.
        let edges: Vec<(usize, usize, usize)> = nodes
            .iter()
            .enumerate()
            .flat_map(|(consumer, node)| {
                node.inputs
                    .iter()
                    .enumerate()
                    .map(move |(edge, &producer)| (producer, consumer, edge))
                    .collect::<Vec<_>>()
            })
            .collect();
        for (producer, consumer, edge) in edges {
            nodes[producer].downstream.push((consumer, edge));
        }

        let outputs = self
            .outputs
            .iter()
            .map(|id| {
                nodes
                    .iter()
                    .position(|n| &n.id == id)
                    .ok_or_else(|| EngineError::Invariant("output vanished in planning".into()))
            })
            .collect::<EngineResult<Vec<_>>>()?;

        Ok(GraphPlan {
            graph_id: self.id.clone(),
            nodes,
            outputs,
            scans,
        })
    }

    /// Relation names referenced by scan nodes.
    pub fn relations(&self) -> Vec<&str> {
        self.nodes
            .iter()
            .filter_map(|n| match &n.spec {
                NodeSpec::Scan { relation } => Some(relation.as_str()),
                _ => None,
            })
            .collect()
    }
}

/// Derive a join node's output schema from its atom specification: one
/// column per output variable, typed by the variable's first occurrence.
fn join_output_schema(
    spec: &JoinSpec,
    input_schemas: &[RelationSchema],
) -> EngineResult<RelationSchema> {
    let mut entries = Vec::with_capacity(spec.output.len());
    for &v in &spec.output {
        let var = &spec.variables[v];
        let occ = var.occurrences[0];
        let col = &input_schemas[occ.input].columns()[occ.column];
        entries.push((var.name.clone(), col.column_type));
    }
    RelationSchema::new(entries)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::ColumnType;

    fn catalog() -> Catalog {
        let mut c = Catalog::new();
        c.define(
            "edge",
            RelationSchema::new(vec![("src", ColumnType::Any), ("dst", ColumnType::Any)]).unwrap(),
        )
        .unwrap();
        c
    }

    fn scan(id: &str, relation: &str) -> GraphNode {
        GraphNode {
            id: id.into(),
            spec: NodeSpec::Scan {
                relation: relation.into(),
            },
            inputs: vec![],
        }
    }

    #[test]
    fn empty_outputs_rejected() {
        let g = QueryGraph {
            id: "g".into(),
            nodes: vec![scan("s", "edge")],
            outputs: vec![],
        };
        assert!(matches!(
            g.plan(&catalog()),
            Err(EngineError::EmptyOutputs(_))
        ));
    }

    #[test]
    fn dangling_edge_rejected() {
        let g = QueryGraph {
            id: "g".into(),
            nodes: vec![GraphNode {
                id: "p".into(),
                spec: NodeSpec::Project { indices: vec![0] },
                inputs: vec!["ghost".into()],
            }],
            outputs: vec!["p".into()],
        };
        assert!(matches!(
            g.plan(&catalog()),
            Err(EngineError::DanglingEdge { .. })
        ));
    }

    #[test]
    fn cycle_rejected() {
        let g = QueryGraph {
            id: "g".into(),
            nodes: vec![
                GraphNode {
                    id: "a".into(),
                    spec: NodeSpec::Rename {
                        names: vec!["x".into(), "y".into()],
                    },
                    inputs: vec!["b".into()],
                },
                GraphNode {
                    id: "b".into(),
                    spec: NodeSpec::Rename {
                        names: vec!["x".into(), "y".into()],
                    },
                    inputs: vec!["a".into()],
                },
            ],
            outputs: vec!["a".into()],
        };
        assert!(matches!(
            g.plan(&catalog()),
            Err(EngineError::CycleDetected { .. })
        ));
    }

    #[test]
    fn unknown_relation_rejected() {
        let g = QueryGraph {
            id: "g".into(),
            nodes: vec![scan("s", "ghost")],
            outputs: vec!["s".into()],
        };
        assert!(matches!(
            g.plan(&catalog()),
            Err(EngineError::UnknownRelation(_))
        ));
    }

    #[test]
    fn duplicate_scan_rejected() {
        let g = QueryGraph {
            id: "g".into(),
            nodes: vec![scan("s1", "edge"), scan("s2", "edge")],
            outputs: vec!["s1".into()],
        };
        assert!(matches!(
            g.plan(&catalog()),
            Err(EngineError::DuplicateScan { .. })
        ));
    }

    #[test]
    fn project_without_indices_rejected() {
        let g = QueryGraph {
            id: "g".into(),
            nodes: vec![
                scan("s", "edge"),
                GraphNode {
                    id: "p".into(),
                    spec: NodeSpec::Project { indices: vec![] },
                    inputs: vec!["s".into()],
                },
            ],
            outputs: vec!["p".into()],
        };
        assert!(matches!(
            g.plan(&catalog()),
            Err(EngineError::MissingConfig { .. })
        ));
    }

    #[test]
    fn plan_orders_inputs_before_consumers() {
        let g = QueryGraph {
            id: "g".into(),
            nodes: vec![
                GraphNode {
                    id: "p".into(),
                    spec: NodeSpec::Project { indices: vec![0] },
                    inputs: vec!["s".into()],
                },
                scan("s", "edge"),
            ],
            outputs: vec!["p".into()],
        };
        let plan = g.plan(&catalog()).unwrap();
        let pos_s = plan.nodes.iter().position(|n| n.id == "s").unwrap();
        let pos_p = plan.nodes.iter().position(|n| n.id == "p").unwrap();
        assert!(pos_s < pos_p);
        assert_eq!(plan.nodes[pos_p].schema.arity(), 1);
        assert_eq!(plan.scans["edge"], pos_s);
    }
}
