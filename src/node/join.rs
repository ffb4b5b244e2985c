//! Join: delta-on-one-input Leapfrog Triejoin.
//!
//! The node is configured with an atom specification: the leapfrog variable
//! order and, for every variable, which input edges mention it and at which
//! column. Each input edge owns a private trie whose levels follow the
//! variable order (tuples are permuted on the way in), so a leapfrog pass
//! always walks levels front to back.
//!
//! Incremental processing replaces the delivering edge's trie with a trie
//! built from the delta: a remove pass runs before the edge's own state is
//! updated, an add pass after. Edges of the same upstream source receive the
//! delta one at a time, so peers ahead of the delivering edge are still at
//! their old state and peers behind it are already new - together the passes
//! compute the exact delta expansion, and the per-output support counts are
//! exact derivation counts. `0 -> 1` emits an addition, `1 -> 0` a removal.

use crate::delta::Delta;
use crate::error::{EngineError, EngineResult};
use crate::graph::JoinSpec;
use crate::iter::{LevelIterator, TrieFactory};
use crate::trie::TupleTrie;
use crate::value::{Atom, Tuple};
use indexmap::IndexMap;

/// Per-edge join configuration: the variable-order permutation.
#[derive(Debug)]
struct JoinInput {
    /// For each variable (in leapfrog order): this input's trie level for
    /// it, if the variable occurs here.
    level_of_var: Vec<Option<usize>>,
    /// Input tuple column stored at each trie level.
    columns: Vec<usize>,
}

impl JoinInput {
    fn permute(&self, tuple: &Tuple) -> Tuple {
        Tuple::new(
            self.columns
                .iter()
                .map(|&c| tuple.atoms()[c].clone())
                .collect(),
        )
    }
}

fn edge_name(edge: usize) -> String {
    format!("in{edge}")
}

/// Leapfrog Triejoin operator.
///
/// Each input edge's tuples live in a private trie (registered by edge name
/// in a [`TrieFactory`]) permuted into the join's variable order.
#[derive(Debug)]
pub(crate) struct JoinOp {
    node_id: String,
    nvars: usize,
    /// Output tuple assembly: variable indices.
    output: Vec<usize>,
    inputs: Vec<JoinInput>,
    /// Per-edge tries, keyed by edge name.
    tries: TrieFactory,
    /// Output tuple -> number of derivations currently supporting it.
    support: IndexMap<Tuple, u64>,
}

impl JoinOp {
    /// Instantiate from a validated atom specification and the arity of each
    /// input edge.
    pub fn new(
        node_id: impl Into<String>,
        spec: &JoinSpec,
        input_arities: &[usize],
    ) -> EngineResult<Self> {
        let nvars = spec.variables.len();
        let mut level_of_var = vec![vec![None; nvars]; input_arities.len()];
        let mut columns = vec![Vec::new(); input_arities.len()];
        for (v, var) in spec.variables.iter().enumerate() {
            for occ in &var.occurrences {
                level_of_var[occ.input][v] = Some(columns[occ.input].len());
                columns[occ.input].push(occ.column);
            }
        }
        let mut tries = TrieFactory::new();
        for (i, cols) in columns.iter().enumerate() {
            tries.register(&edge_name(i), cols.len())?;
        }
        let inputs: Vec<JoinInput> = level_of_var
            .into_iter()
            .zip(columns)
            .map(|(level_of_var, columns)| JoinInput {
                level_of_var,
                columns,
            })
            .collect();
        Ok(JoinOp {
            node_id: node_id.into(),
            nvars,
            output: spec.output.clone(),
            inputs,
            tries,
            support: IndexMap::new(),
        })
    }

    pub fn on_delta(&mut self, edge: usize, delta: &Delta) -> EngineResult<Delta> {
        if edge >= self.inputs.len() {
            return Err(EngineError::Invariant(format!(
                "join '{}' received a delta on edge {edge}",
                self.node_id
            )));
        }
        let adds: Vec<Tuple> = delta.adds().map(|t| self.inputs[edge].permute(t)).collect();
        let removes: Vec<Tuple> = delta
            .removes()
            .map(|t| self.inputs[edge].permute(t))
            .collect();

        let arity = self.inputs[edge].columns.len();
        let mut out = Delta::new();

        if !removes.is_empty() {
            let mut delta_trie = TupleTrie::new(arity);
            for t in &removes {
                delta_trie.insert(t)?;
            }
            for derived in self.leapfrog(edge, &delta_trie)? {
                let support = self.support.get_mut(&derived).ok_or_else(|| {
                    EngineError::Invariant(format!(
                        "join '{}' support underflow for {derived}",
                        self.node_id
                    ))
                })?;
                *support -= 1;
                if *support == 0 {
                    self.support.shift_remove(&derived);
                    out.push_remove(derived);
                }
            }
        }

        if !adds.is_empty() {
            let mut delta_trie = TupleTrie::new(arity);
            for t in &adds {
                delta_trie.insert(t)?;
            }
            for derived in self.leapfrog(edge, &delta_trie)? {
                let support = self.support.entry(derived.clone()).or_insert(0);
                *support += 1;
                if *support == 1 {
                    out.push_add(derived);
                }
            }
        }

        // Update this edge's own state last; its trie took no part in the
        // passes above.
        let trie = self.tries.require_mut(&edge_name(edge))?;
        for t in &removes {
            if trie.remove(t)?.is_none() {
                return Err(EngineError::Invariant(format!(
                    "join '{}' input {edge} removed absent tuple {t}",
                    self.node_id
                )));
            }
        }
        for t in &adds {
            if trie.insert(t)? > 1 {
                return Err(EngineError::Invariant(format!(
                    "join '{}' input {edge} added duplicate tuple {t}",
                    self.node_id
                )));
            }
        }

        tracing::debug!(
            node = %self.node_id,
            edge,
            emitted = out.len(),
            "join_delta_processed"
        );
        Ok(out)
    }

    /// Run a full leapfrog pass with `delta_trie` standing in for
    /// `delta_edge`'s relation, collecting every derived output tuple (with
    /// multiplicity: one entry per derivation).
    fn leapfrog<'a>(
        &'a self,
        delta_edge: usize,
        delta_trie: &'a TupleTrie,
    ) -> EngineResult<Vec<Tuple>> {
        let views: Vec<&TupleTrie> = (0..self.inputs.len())
            .map(|i| {
                if i == delta_edge {
                    Ok(delta_trie)
                } else {
                    self.tries.require(&edge_name(i))
                }
            })
            .collect::<EngineResult<_>>()?;
        let mut bindings: Vec<Atom> = Vec::with_capacity(self.nvars);
        let mut prefixes: Vec<Vec<Atom>> = self.inputs.iter().map(|_| Vec::new()).collect();
        let mut results = Vec::new();
        self.recurse(0, &views, &mut bindings, &mut prefixes, &mut results);
        Ok(results)
    }

    /// Bind variable `var` by leapfrog intersection, then recurse.
    fn recurse(
        &self,
        var: usize,
        views: &[&TupleTrie],
        bindings: &mut Vec<Atom>,
        prefixes: &mut [Vec<Atom>],
        results: &mut Vec<Tuple>,
    ) {
        if var == self.nvars {
            results.push(Tuple::new(
                self.output.iter().map(|&v| bindings[v].clone()).collect(),
            ));
            return;
        }

        let participants: Vec<usize> = self
            .inputs
            .iter()
            .enumerate()
            .filter(|(_, input)| input.level_of_var[var].is_some())
            .map(|(i, _)| i)
            .collect();
        let mut cursors: Vec<LevelIterator<'_>> = participants
            .iter()
            .map(|&i| LevelIterator::open(views[i], prefixes[i].len(), &prefixes[i]))
            .collect();
        if cursors.iter().any(LevelIterator::at_end) {
            return;
        }

        loop {
            // All cursors are live here; find the current frontier.
            let max = cursors
                .iter()
                .filter_map(LevelIterator::key)
                .max()
                .cloned()
                .expect("live cursors have keys");

            if cursors.iter().all(|c| c.key() == Some(&max)) {
                bindings.push(max.clone());
                for &i in &participants {
                    prefixes[i].push(max.clone());
                }
                self.recurse(var + 1, views, bindings, prefixes, results);
                bindings.pop();
                for &i in &participants {
                    prefixes[i].pop();
                }
                cursors[0].next();
                if cursors[0].at_end() {
                    return;
                }
            } else {
                for cursor in &mut cursors {
                    if cursor.key().is_some_and(|k| k < &max) {
                        cursor.seek_ge(&max);
                        if cursor.at_end() {
                            return;
                        }
                    }
                }
            }
        }
    }

    pub fn reset(&mut self) {
        self.tries.clear_all();
        self.support.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::{JoinVariable, VarOccurrence};

    fn nat_join_spec() -> JoinSpec {
        // users(uid, name) |x| orders(oid, uid, amount) on uid
        // Variable order: uid, name, oid, amount; output = (uid, name, oid, amount)
        JoinSpec {
            variables: vec![
                JoinVariable {
                    name: "uid".into(),
                    occurrences: vec![
                        VarOccurrence { input: 0, column: 0 },
                        VarOccurrence { input: 1, column: 1 },
                    ],
                },
                JoinVariable {
                    name: "name".into(),
                    occurrences: vec![VarOccurrence { input: 0, column: 1 }],
                },
                JoinVariable {
                    name: "oid".into(),
                    occurrences: vec![VarOccurrence { input: 1, column: 0 }],
                },
                JoinVariable {
                    name: "amount".into(),
                    occurrences: vec![VarOccurrence { input: 1, column: 2 }],
                },
            ],
            output: vec![0, 1, 2, 3],
        }
    }

    fn user(uid: i32, name: &str) -> Tuple {
        Tuple::new(vec![Atom::Integer(uid), Atom::String(name.into())])
    }

    fn order(oid: &str, uid: i32, amount: i32) -> Tuple {
        Tuple::new(vec![
            Atom::Id(oid.into()),
            Atom::Integer(uid),
            Atom::Integer(amount),
        ])
    }

    fn joined(uid: i32, name: &str, oid: &str, amount: i32) -> Tuple {
        Tuple::new(vec![
            Atom::Integer(uid),
            Atom::String(name.into()),
            Atom::Id(oid.into()),
            Atom::Integer(amount),
        ])
    }

    fn seeded() -> JoinOp {
        let mut op = JoinOp::new("j", &nat_join_spec(), &[2, 3]).unwrap();
        op.on_delta(0, &Delta::of_adds([user(1, "A"), user(2, "B")]))
            .unwrap();
        op.on_delta(
            1,
            &Delta::of_adds([order("o1", 1, 10), order("o2", 1, 20), order("o3", 2, 30)]),
        )
        .unwrap();
        op
    }

    #[test]
    fn natural_join_produces_all_matches() {
        let mut op = JoinOp::new("j", &nat_join_spec(), &[2, 3]).unwrap();
        let out = op
            .on_delta(0, &Delta::of_adds([user(1, "A"), user(2, "B")]))
            .unwrap();
        assert!(out.is_empty());

        let out = op
            .on_delta(
                1,
                &Delta::of_adds([order("o1", 1, 10), order("o2", 1, 20), order("o3", 2, 30)]),
            )
            .unwrap();
        let mut adds: Vec<Tuple> = out.adds().cloned().collect();
        adds.sort();
        let mut expected = vec![
            joined(1, "A", "o1", 10),
            joined(1, "A", "o2", 20),
            joined(2, "B", "o3", 30),
        ];
        expected.sort();
        assert_eq!(adds, expected);
    }

    #[test]
    fn removing_a_user_retracts_their_joins() {
        let mut op = seeded();
        let out = op.on_delta(0, &Delta::of_removes([user(1, "A")])).unwrap();
        let mut removes: Vec<Tuple> = out.removes().cloned().collect();
        removes.sort();
        let mut expected = vec![joined(1, "A", "o1", 10), joined(1, "A", "o2", 20)];
        expected.sort();
        assert_eq!(removes, expected);
        assert!(out.adds().len() == 0);

        // Re-inserting brings both join tuples back.
        let out = op.on_delta(0, &Delta::of_adds([user(1, "A")])).unwrap();
        assert_eq!(out.adds().len(), 2);
    }

    #[test]
    fn unmatched_delta_emits_nothing() {
        let mut op = seeded();
        let out = op
            .on_delta(1, &Delta::of_adds([order("o9", 42, 1)]))
            .unwrap();
        assert!(out.is_empty());
    }

    #[test]
    fn duplicate_derivations_count_per_path() {
        // T(x) as the intersection of two unary inputs.
        let spec = JoinSpec {
            variables: vec![JoinVariable {
                name: "x".into(),
                occurrences: vec![
                    VarOccurrence { input: 0, column: 0 },
                    VarOccurrence { input: 1, column: 0 },
                ],
            }],
            output: vec![0],
        };
        let one = Tuple::new(vec![Atom::Integer(1)]);
        let mut op = JoinOp::new("j", &spec, &[1, 1]).unwrap();
        op.on_delta(0, &Delta::of_adds([one.clone()])).unwrap();
        let out = op.on_delta(1, &Delta::of_adds([one.clone()])).unwrap();
        assert_eq!(out.adds().len(), 1);

        // Retract from one side only: the derivation dies with it.
        let out = op.on_delta(0, &Delta::of_removes([one.clone()])).unwrap();
        assert_eq!(out.removes().len(), 1);
    }
}
