//! Operator correctness against fully-materialized recomputation, plus
//! batching equivalence.

use leapjoin::{Atom, ColumnType, ComputeProvider, Engine, ProviderMode, RelationSchema, Tuple};
use pretty_assertions::assert_eq;
use std::collections::BTreeSet;

fn untyped(names: &[&str]) -> RelationSchema {
    RelationSchema::new(names.iter().map(|&n| (n, ColumnType::Any)).collect()).unwrap()
}

fn join_engine() -> (Engine, leapjoin::QueryHandle) {
    let engine = Engine::new();
    engine.define_relation("r", untyped(&["a", "b"])).unwrap();
    engine.define_relation("s", untyped(&["b", "c"])).unwrap();

    let mut query = engine.build_query("r_join_s");
    let r = query.scan("r").unwrap();
    let s = query.scan("s").unwrap();
    let joined = query.join(r, s, &[(1, 0)]).unwrap();
    query.output(joined);
    let handle = engine.register(query.build()).unwrap();
    (engine, handle)
}

/// Reference semantics: nested-loop natural join of the current snapshots.
/// The join output is (a, b, c): the left row, then the right row minus its
/// join column.
fn naive_join(r: &[Tuple], s: &[Tuple]) -> BTreeSet<Tuple> {
    let mut out = BTreeSet::new();
    for left in r {
        for right in s {
            if left.get(1) == right.get(0) {
                out.insert(Tuple::new(vec![
                    left.get(0).unwrap().clone(),
                    left.get(1).unwrap().clone(),
                    right.get(1).unwrap().clone(),
                ]));
            }
        }
    }
    out
}

#[test]
fn join_matches_recomputation_over_a_delta_sequence() {
    let (engine, handle) = join_engine();

    let script: &[(&str, bool, (i32, i32))] = &[
        ("r", true, (1, 10)),
        ("r", true, (2, 10)),
        ("s", true, (10, 7)),
        ("s", true, (10, 8)),
        ("r", true, (3, 11)),
        ("s", true, (11, 9)),
        ("r", false, (2, 10)),
        ("s", false, (10, 7)),
        ("r", true, (2, 10)),
        ("s", false, (11, 9)),
    ];

    for &(relation, additive, row) in script {
        if additive {
            engine.insert(relation, vec![row]).unwrap();
        } else {
            engine.delete(relation, vec![row]).unwrap();
        }
        let r = handle.relation_snapshot("r").unwrap();
        let s = handle.relation_snapshot("s").unwrap();
        let expected: Vec<Tuple> = naive_join(&r, &s).into_iter().collect();
        assert_eq!(handle.output().unwrap(), expected, "after {relation} {row:?}");
    }
}

#[test]
fn equivalent_batchings_converge() {
    // Same logical updates, three different batchings.
    let runs: Vec<Box<dyn Fn(&Engine)>> = vec![
        // One call per row.
        Box::new(|engine: &Engine| {
            engine.insert("r", vec![(1, 10)]).unwrap();
            engine.insert("r", vec![(2, 11)]).unwrap();
            engine.insert("s", vec![(10, 5)]).unwrap();
            engine.delete("r", vec![(2, 11)]).unwrap();
            engine.insert("s", vec![(11, 6)]).unwrap();
        }),
        // Bulk calls.
        Box::new(|engine: &Engine| {
            engine.insert("r", vec![(1, 10), (2, 11)]).unwrap();
            engine.insert("s", vec![(10, 5), (11, 6)]).unwrap();
            engine.delete("r", vec![(2, 11)]).unwrap();
        }),
        // One transaction; the (2, 11) row cancels before the graph runs.
        Box::new(|engine: &Engine| {
            engine
                .transaction(|tx| {
                    tx.insert("r", vec![(1, 10), (2, 11)])?;
                    tx.insert("s", vec![(10, 5), (11, 6)])?;
                    tx.delete("r", vec![(2, 11)])?;
                    Ok(())
                })
                .unwrap();
        }),
    ];

    let mut outcomes = Vec::new();
    for run in runs {
        let (engine, handle) = join_engine();
        run(&engine);
        outcomes.push(handle.output().unwrap());
    }
    assert_eq!(outcomes[0], outcomes[1]);
    assert_eq!(outcomes[1], outcomes[2]);
    assert_eq!(outcomes[0].len(), 1);
}

#[test]
fn rename_forwards_values_and_rebinds_names() {
    let engine = Engine::new();
    engine.define_relation("edge", untyped(&["src", "dst"])).unwrap();

    let mut query = engine.build_query("renamed");
    let scan = query.scan("edge").unwrap();
    let renamed = query.rename(scan, &["from", "to"]).unwrap();
    // Downstream binding uses the new names.
    let heads = query.project_names(renamed, &["to"]).unwrap();
    query.output(heads);
    let handle = engine.register(query.build()).unwrap();

    engine.insert("edge", vec![(1, 2), (3, 2)]).unwrap();
    assert_eq!(
        handle.output().unwrap(),
        vec![Tuple::new(vec![Atom::Integer(2)])]
    );
}

struct PositiveProvider;

impl ComputeProvider for PositiveProvider {
    fn mode(&self) -> ProviderMode {
        ProviderMode::Pointwise
    }

    fn eval_many(&mut self, candidates: &[Tuple]) -> anyhow::Result<Vec<Tuple>> {
        Ok(candidates
            .iter()
            .filter(|t| matches!(t.get(1), Some(Atom::Integer(v)) if *v > 0))
            .cloned()
            .collect())
    }
}

#[test]
fn pointwise_compute_filters_inside_a_graph() {
    let engine = Engine::new();
    engine.define_relation("readings", untyped(&["sensor", "value"])).unwrap();
    engine.register_provider("positive", PositiveProvider).unwrap();

    let mut query = engine.build_query("positive_readings");
    let scan = query.scan("readings").unwrap();
    let filtered = query.pointwise(scan, "positive").unwrap();
    query.output(filtered);
    let handle = engine.register(query.build()).unwrap();

    engine
        .insert("readings", vec![(1, -5), (2, 3), (3, 8)])
        .unwrap();
    assert_eq!(handle.output().unwrap().len(), 2);

    // Retraction of a false tuple is silent, of a true one visible.
    engine.delete("readings", vec![(1, -5)]).unwrap();
    assert_eq!(handle.output().unwrap().len(), 2);
    engine.delete("readings", vec![(2, 3)]).unwrap();
    assert_eq!(handle.output().unwrap().len(), 1);
}

#[test]
fn union_then_join_composes() {
    let engine = Engine::new();
    engine.define_relation("a", untyped(&["x", "y"])).unwrap();
    engine.define_relation("b", untyped(&["x", "y"])).unwrap();
    engine.define_relation("names", untyped(&["x", "label"])).unwrap();

    let mut query = engine.build_query("labeled_pairs");
    let a = query.scan("a").unwrap();
    let b = query.scan("b").unwrap();
    let merged = query.union(&[a, b]).unwrap();
    let names = query.scan("names").unwrap();
    let labeled = query.join(merged, names, &[(0, 0)]).unwrap();
    query.output(labeled);
    let handle = engine.register(query.build()).unwrap();

    engine.insert("a", vec![(1, 10)]).unwrap();
    engine.insert("b", vec![(1, 10), (2, 20)]).unwrap();
    engine.insert("names", vec![(1, "one"), (2, "two")]).unwrap();
    assert_eq!(handle.output().unwrap().len(), 2);

    // The (1, 10) tuple still has a contributor in `b`.
    engine.delete("a", vec![(1, 10)]).unwrap();
    assert_eq!(handle.output().unwrap().len(), 2);

    engine.delete("b", vec![(1, 10)]).unwrap();
    assert_eq!(handle.output().unwrap().len(), 1);
}

#[test]
fn reset_clears_and_repopulates_from_sources() {
    let (engine, handle) = join_engine();
    engine.insert("r", vec![(1, 10)]).unwrap();
    engine.insert("s", vec![(10, 5)]).unwrap();
    assert_eq!(handle.output().unwrap().len(), 1);

    handle.reset().unwrap();
    assert_eq!(handle.output().unwrap().len(), 0);

    // Scans start empty after reset; new deltas flow normally.
    engine.insert("r", vec![(4, 12)]).unwrap();
    engine.insert("s", vec![(12, 1)]).unwrap();
    assert_eq!(handle.output().unwrap().len(), 1);
}
