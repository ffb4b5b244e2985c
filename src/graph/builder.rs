//! Fluent construction of query graphs.
//!
//! The builder resolves operator configuration against a catalog snapshot as
//! nodes are added, so arity and column errors surface at the call site
//! rather than at registration. Natural joins are declared with
//! `(left, right)` column index pairs; the builder derives the join's atom
//! specification from them (condition variables first in declaration order,
//! then the remaining left columns, then the remaining right columns).

use crate::catalog::Catalog;
use crate::error::{EngineError, EngineResult};
use crate::graph::{
    ComputeKind, GraphNode, JoinSpec, JoinVariable, NodeSpec, QueryGraph, VarOccurrence,
};
use crate::schema::RelationSchema;

/// Handle to a node under construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NodeRef(usize);

/// Builder for a [`QueryGraph`].
pub struct QueryBuilder {
    id: String,
    catalog: Catalog,
    nodes: Vec<GraphNode>,
    schemas: Vec<RelationSchema>,
    outputs: Vec<String>,
}

impl QueryBuilder {
    /// Start a graph with the given query id, resolving relations against a
    /// catalog snapshot.
    pub fn new(id: impl Into<String>, catalog: Catalog) -> Self {
        QueryBuilder {
            id: id.into(),
            catalog,
            nodes: Vec::new(),
            schemas: Vec::new(),
            outputs: Vec::new(),
        }
    }

    fn push(
        &mut self,
        kind: &str,
        spec: NodeSpec,
        inputs: Vec<NodeRef>,
        schema: RelationSchema,
    ) -> NodeRef {
        let id = format!("{kind}_{}", self.nodes.len());
        let input_ids = inputs.iter().map(|r| self.nodes[r.0].id.clone()).collect();
        self.nodes.push(GraphNode {
            id,
            spec,
            inputs: input_ids,
        });
        self.schemas.push(schema);
        NodeRef(self.nodes.len() - 1)
    }

    fn schema(&self, node: NodeRef) -> &RelationSchema {
        &self.schemas[node.0]
    }

    /// Scan a registered base relation.
    pub fn scan(&mut self, relation: &str) -> EngineResult<NodeRef> {
        let schema = self.catalog.require(relation)?.clone();
        Ok(self.push(
            "scan",
            NodeSpec::Scan {
                relation: relation.to_string(),
            },
            vec![],
            schema,
        ))
    }

    /// Project an input onto column indices.
    pub fn project(&mut self, input: NodeRef, indices: &[usize]) -> EngineResult<NodeRef> {
        if indices.is_empty() {
            return Err(EngineError::MissingConfig {
                node: format!("project_{}", self.nodes.len()),
                what: "projection indices".into(),
            });
        }
        let schema = self.schema(input).project(indices)?;
        Ok(self.push(
            "project",
            NodeSpec::Project {
                indices: indices.to_vec(),
            },
            vec![input],
            schema,
        ))
    }

    /// Project an input onto named columns.
    pub fn project_names(&mut self, input: NodeRef, names: &[&str]) -> EngineResult<NodeRef> {
        let indices = self
            .schema(input)
            .project_names(&self.nodes[input.0].id, names)?;
        self.project(input, &indices)
    }

    /// Natural join on `(left column, right column)` condition pairs.
    pub fn join(
        &mut self,
        left: NodeRef,
        right: NodeRef,
        on: &[(usize, usize)],
    ) -> EngineResult<NodeRef> {
        if on.is_empty() {
            return Err(EngineError::MissingConfig {
                node: format!("join_{}", self.nodes.len()),
                what: "join conditions".into(),
            });
        }
        let spec = derive_join_spec(self.schema(left), self.schema(right), on)?;
        let schemas = [self.schema(left).clone(), self.schema(right).clone()];
        let schema = super::join_output_schema(&spec, &schemas)?;
        Ok(self.push(
            "join",
            NodeSpec::Join { spec },
            vec![left, right],
            schema,
        ))
    }

    /// Union of two or more inputs of equal arity.
    pub fn union(&mut self, inputs: &[NodeRef]) -> EngineResult<NodeRef> {
        if inputs.len() < 2 {
            return Err(EngineError::MissingConfig {
                node: format!("union_{}", self.nodes.len()),
                what: "at least two inputs".into(),
            });
        }
        let first = self.schema(inputs[0]).clone();
        for &input in &inputs[1..] {
            if self.schema(input).arity() != first.arity() {
                return Err(EngineError::ArityMismatch {
                    expected: first.arity(),
                    found: self.schema(input).arity(),
                });
            }
        }
        Ok(self.push("union", NodeSpec::Union, inputs.to_vec(), first))
    }

    /// Left EXCEPT right on `(left column, right column)` key pairs.
    pub fn diff(
        &mut self,
        left: NodeRef,
        right: NodeRef,
        keys: &[(usize, usize)],
    ) -> EngineResult<NodeRef> {
        if keys.is_empty() {
            return Err(EngineError::MissingConfig {
                node: format!("diff_{}", self.nodes.len()),
                what: "diff key attribute list".into(),
            });
        }
        for &(l, r) in keys {
            if l >= self.schema(left).arity() {
                return Err(EngineError::InvalidProjection {
                    index: l,
                    arity: self.schema(left).arity(),
                });
            }
            if r >= self.schema(right).arity() {
                return Err(EngineError::InvalidProjection {
                    index: r,
                    arity: self.schema(right).arity(),
                });
            }
        }
        let schema = self.schema(left).clone();
        Ok(self.push(
            "diff",
            NodeSpec::Diff {
                keys: keys.to_vec(),
            },
            vec![left, right],
            schema,
        ))
    }

    /// Rename an input's columns. Tuple values pass through unchanged.
    pub fn rename(&mut self, input: NodeRef, names: &[&str]) -> EngineResult<NodeRef> {
        let schema = self
            .schema(input)
            .renamed(names.iter().map(|s| s.to_string()).collect())?;
        Ok(self.push(
            "rename",
            NodeSpec::Rename {
                names: names.iter().map(|s| s.to_string()).collect(),
            },
            vec![input],
            schema,
        ))
    }

    /// Source node backed by an enumerable compute provider.
    pub fn compute(&mut self, provider: &str, arity: usize) -> EngineResult<NodeRef> {
        let schema = RelationSchema::untyped(arity)?;
        Ok(self.push(
            "compute",
            NodeSpec::Compute {
                provider: provider.to_string(),
                kind: ComputeKind::Enumerable { arity },
            },
            vec![],
            schema,
        ))
    }

    /// Filter node backed by a pointwise compute provider.
    pub fn pointwise(&mut self, input: NodeRef, provider: &str) -> EngineResult<NodeRef> {
        let schema = self.schema(input).clone();
        Ok(self.push(
            "compute",
            NodeSpec::Compute {
                provider: provider.to_string(),
                kind: ComputeKind::Pointwise,
            },
            vec![input],
            schema,
        ))
    }

    /// Mark a node as a graph output.
    pub fn output(&mut self, node: NodeRef) -> &mut Self {
        let id = self.nodes[node.0].id.clone();
        if !self.outputs.contains(&id) {
            self.outputs.push(id);
        }
        self
    }

    /// The output schema a node will produce, for callers that bind by name.
    pub fn schema_of(&self, node: NodeRef) -> &RelationSchema {
        self.schema(node)
    }

    /// Assemble the logical graph. Full validation happens when the graph is
    /// planned at registration.
    pub fn build(self) -> QueryGraph {
        QueryGraph {
            id: self.id,
            nodes: self.nodes,
            outputs: self.outputs,
        }
    }
}

/// Build the atom specification for a natural join (see module docs for the
/// variable order).
fn derive_join_spec(
    left: &RelationSchema,
    right: &RelationSchema,
    on: &[(usize, usize)],
) -> EngineResult<JoinSpec> {
    let mut left_var = vec![None::<usize>; left.arity()];
    let mut right_var = vec![None::<usize>; right.arity()];
    let mut variables = Vec::new();

    for &(l, r) in on {
        if l >= left.arity() {
            return Err(EngineError::InvalidProjection {
                index: l,
                arity: left.arity(),
            });
        }
        if r >= right.arity() {
            return Err(EngineError::InvalidProjection {
                index: r,
                arity: right.arity(),
            });
        }
        if left_var[l].is_some() || right_var[r].is_some() {
            return Err(EngineError::InvalidSchema(format!(
                "join condition reuses column {l}={r}"
            )));
        }
        let v = variables.len();
        variables.push(JoinVariable {
            name: left.columns()[l].name.clone(),
            occurrences: vec![
                VarOccurrence { input: 0, column: l },
                VarOccurrence { input: 1, column: r },
            ],
        });
        left_var[l] = Some(v);
        right_var[r] = Some(v);
    }

    let mut taken: Vec<String> = variables.iter().map(|v| v.name.clone()).collect();
    for (c, slot) in left_var.iter_mut().enumerate() {
        if slot.is_none() {
            let v = variables.len();
            variables.push(JoinVariable {
                name: left.columns()[c].name.clone(),
                occurrences: vec![VarOccurrence { input: 0, column: c }],
            });
            taken.push(left.columns()[c].name.clone());
            *slot = Some(v);
        }
    }
    for (c, slot) in right_var.iter_mut().enumerate() {
        if slot.is_none() {
            let base = right.columns()[c].name.clone();
            let mut name = base.clone();
            let mut n = 0;
            while taken.contains(&name) {
                n += 1;
                name = format!("{base}_r{n}");
            }
            let v = variables.len();
            variables.push(JoinVariable {
                name: name.clone(),
                occurrences: vec![VarOccurrence { input: 1, column: c }],
            });
            taken.push(name);
            *slot = Some(v);
        }
    }

    // Output: the full left row, then the right row minus its join columns.
    let mut output = Vec::with_capacity(left.arity() + right.arity() - on.len());
    for slot in &left_var {
        output.push(slot.ok_or_else(|| EngineError::Invariant("unbound left column".into()))?);
    }
    for (c, slot) in right_var.iter().enumerate() {
        if on.iter().any(|&(_, r)| r == c) {
            continue;
        }
        output.push(slot.ok_or_else(|| EngineError::Invariant("unbound right column".into()))?);
    }

    Ok(JoinSpec { variables, output })
}
