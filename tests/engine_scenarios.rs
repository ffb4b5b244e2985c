//! End-to-end scenarios: ingress -> batching -> graph execution -> outputs.

use leapjoin::{
    Atom, ColumnType, ComputeProvider, Engine, ProviderHandle, ProviderMode, RelationSchema,
    SubscribeOptions, Tuple,
};
use parking_lot::Mutex;
use pretty_assertions::assert_eq;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn int_tuple(values: &[i32]) -> Tuple {
    Tuple::new(values.iter().map(|&v| Atom::Integer(v)).collect())
}

fn untyped(names: &[&str]) -> RelationSchema {
    RelationSchema::new(names.iter().map(|&n| (n, ColumnType::Any)).collect()).unwrap()
}

#[test]
fn project_counting_scenario() {
    init_tracing();
    let engine = Engine::new();
    engine
        .define_relation(
            "items",
            RelationSchema::new(vec![("k", ColumnType::Integer), ("v", ColumnType::String)])
                .unwrap(),
        )
        .unwrap();

    let mut query = engine.build_query("keys");
    let scan = query.scan("items").unwrap();
    let keys = query.project(scan, &[0]).unwrap();
    query.output(keys);
    let handle = engine.register(query.build()).unwrap();

    engine
        .insert("items", vec![(1, "a"), (1, "b"), (2, "c")])
        .unwrap();
    assert_eq!(handle.output().unwrap(), vec![int_tuple(&[1]), int_tuple(&[2])]);

    // One of two supporters goes: the key stays.
    engine.delete("items", vec![(1, "a")]).unwrap();
    assert_eq!(handle.output().unwrap(), vec![int_tuple(&[1]), int_tuple(&[2])]);

    // The last supporter goes: the key goes.
    engine.delete("items", vec![(1, "b")]).unwrap();
    assert_eq!(handle.output().unwrap(), vec![int_tuple(&[2])]);
}

#[test]
fn union_contributor_counting_scenario() {
    init_tracing();
    let engine = Engine::new();
    engine.define_relation("r1", untyped(&["x"])).unwrap();
    engine.define_relation("r2", untyped(&["x"])).unwrap();

    let mut query = engine.build_query("either");
    let r1 = query.scan("r1").unwrap();
    let r2 = query.scan("r2").unwrap();
    let both = query.union(&[r1, r2]).unwrap();
    query.output(both);
    let handle = engine.register(query.build()).unwrap();

    let emissions: Arc<Mutex<Vec<(usize, usize)>>> = Arc::new(Mutex::new(Vec::new()));
    let seen = Arc::clone(&emissions);
    let _sub = handle
        .subscribe(
            move |notification| {
                if let Some(deltas) = &notification.deltas {
                    for (_, delta) in deltas {
                        seen.lock().push((delta.adds().len(), delta.removes().len()));
                    }
                }
            },
            SubscribeOptions::default(),
        )
        .unwrap();

    engine.insert("r1", vec![(1,)]).unwrap();
    engine.insert("r2", vec![(1,)]).unwrap();
    engine.delete("r1", vec![(1,)]).unwrap();
    assert_eq!(handle.output().unwrap(), vec![int_tuple(&[1])]);

    engine.delete("r2", vec![(1,)]).unwrap();
    assert_eq!(handle.output().unwrap(), Vec::<Tuple>::new());

    // Only the first insert and the last delete made it downstream.
    assert_eq!(emissions.lock().as_slice(), &[(1, 0), (0, 1)]);
}

#[test]
fn diff_multi_support_scenario() {
    init_tracing();
    let engine = Engine::new();
    engine.define_relation("left", untyped(&["k", "v"])).unwrap();
    engine.define_relation("right", untyped(&["k", "r"])).unwrap();

    let mut query = engine.build_query("unopposed");
    let left = query.scan("left").unwrap();
    let right = query.scan("right").unwrap();
    let diff = query.diff(left, right, &[(0, 0)]).unwrap();
    query.output(diff);
    let handle = engine.register(query.build()).unwrap();

    engine.insert("left", vec![(7, "v1")]).unwrap();
    assert_eq!(handle.output().unwrap().len(), 1);

    engine.insert("right", vec![(7, "r1"), (7, "r2")]).unwrap();
    assert_eq!(handle.output().unwrap().len(), 0);

    engine.delete("right", vec![(7, "r1")]).unwrap();
    assert_eq!(handle.output().unwrap().len(), 0);

    engine.delete("right", vec![(7, "r2")]).unwrap();
    let out = handle.output().unwrap();
    assert_eq!(out.len(), 1);
    assert_eq!(out[0].get(0), Some(&Atom::Integer(7)));
}

#[test]
fn lftj_join_scenario() {
    init_tracing();
    let engine = Engine::new();
    engine
        .define_relation(
            "users",
            RelationSchema::new(vec![("uid", ColumnType::Integer), ("name", ColumnType::String)])
                .unwrap(),
        )
        .unwrap();
    engine
        .define_relation(
            "orders",
            RelationSchema::new(vec![
                ("oid", ColumnType::Id),
                ("uid", ColumnType::Integer),
                ("amount", ColumnType::Integer),
            ])
            .unwrap(),
        )
        .unwrap();

    let mut query = engine.build_query("user_orders");
    let users = query.scan("users").unwrap();
    let orders = query.scan("orders").unwrap();
    let joined = query.join(users, orders, &[(0, 1)]).unwrap();
    query.output(joined);
    let handle = engine.register(query.build()).unwrap();

    engine.insert("users", vec![(1, "A"), (2, "B")]).unwrap();
    engine
        .insert("orders", vec![("o1", 1, 10), ("o2", 1, 20), ("o3", 2, 30)])
        .unwrap();
    assert_eq!(handle.output().unwrap().len(), 3);

    // Dropping a user retracts exactly their joined tuples.
    engine.delete("users", vec![(1, "A")]).unwrap();
    let out = handle.output().unwrap();
    assert_eq!(out.len(), 1);
    assert_eq!(out[0].get(0), Some(&Atom::Integer(2)));

    // Re-inserting brings them back.
    engine.insert("users", vec![(1, "A")]).unwrap();
    assert_eq!(handle.output().unwrap().len(), 3);
}

struct JournalProvider {
    base: Vec<Tuple>,
    journal: Arc<Mutex<Vec<(Vec<Tuple>, Vec<Tuple>)>>>,
}

impl ComputeProvider for JournalProvider {
    fn mode(&self) -> ProviderMode {
        ProviderMode::Enumerable
    }

    fn enumerate(&mut self) -> anyhow::Result<(Vec<Tuple>, ProviderHandle)> {
        Ok((self.base.clone(), ProviderHandle(0)))
    }

    fn delta_since(
        &mut self,
        since: ProviderHandle,
    ) -> anyhow::Result<(Vec<Tuple>, Vec<Tuple>, ProviderHandle)> {
        let journal = self.journal.lock();
        let mut adds = Vec::new();
        let mut removes = Vec::new();
        for (a, r) in journal.iter().skip(since.0 as usize) {
            adds.extend(a.iter().cloned());
            removes.extend(r.iter().cloned());
        }
        Ok((adds, removes, ProviderHandle(journal.len() as u64)))
    }
}

fn priced(id: &str, amount: i32) -> Tuple {
    Tuple::new(vec![Atom::Id(id.into()), Atom::Integer(amount)])
}

#[test]
fn enumerable_compute_cold_start_scenario() {
    init_tracing();
    let engine = Engine::new();
    let journal = Arc::new(Mutex::new(Vec::new()));
    engine
        .register_provider(
            "prices",
            JournalProvider {
                base: vec![priced("p1", 100), priced("p2", 200), priced("p3", 300)],
                journal: Arc::clone(&journal),
            },
        )
        .unwrap();

    let mut query = engine.build_query("price_feed");
    let feed = query.compute("prices", 2).unwrap();
    query.output(feed);
    let handle = engine.register(query.build()).unwrap();

    // Cold start pulled the full enumeration.
    assert_eq!(handle.output().unwrap().len(), 3);

    // The provider moves on; the next cycle emits exactly the difference.
    journal
        .lock()
        .push((vec![priced("p4", 400)], vec![priced("p2", 200)]));
    engine.poll_providers().unwrap();

    let out = handle.output().unwrap();
    assert_eq!(out.len(), 3);
    assert!(out.contains(&priced("p4", 400)));
    assert!(!out.contains(&priced("p2", 200)));
}

#[test]
fn transaction_rollback_scenario() {
    init_tracing();
    let engine = Engine::new();
    engine.define_relation("facts", untyped(&["k", "v"])).unwrap();

    let mut query = engine.build_query("all_facts");
    let scan = query.scan("facts").unwrap();
    query.output(scan);
    let handle = engine.register(query.build()).unwrap();

    engine.insert("facts", vec![(1, "A")]).unwrap();
    let before = handle.output().unwrap();
    assert_eq!(before.len(), 1);

    let notified = Arc::new(AtomicUsize::new(0));
    let count = Arc::clone(&notified);
    let _sub = handle
        .subscribe(
            move |_| {
                count.fetch_add(1, Ordering::SeqCst);
            },
            SubscribeOptions::default(),
        )
        .unwrap();

    let result: anyhow::Result<()> = engine.transaction(|tx| {
        tx.insert("facts", vec![(2, "B")])?;
        anyhow::bail!("change of plans");
    });
    assert!(result.is_err());

    // Nothing escaped the aborted batch.
    assert_eq!(handle.output().unwrap(), before);
    assert_eq!(notified.load(Ordering::SeqCst), 0);
}

#[test]
fn committed_transaction_flushes_once() {
    init_tracing();
    let engine = Engine::new();
    engine.define_relation("facts", untyped(&["k"])).unwrap();

    let mut query = engine.build_query("all_facts");
    let scan = query.scan("facts").unwrap();
    query.output(scan);
    let handle = engine.register(query.build()).unwrap();

    let notified = Arc::new(AtomicUsize::new(0));
    let count = Arc::clone(&notified);
    let _sub = handle
        .subscribe(
            move |_| {
                count.fetch_add(1, Ordering::SeqCst);
            },
            SubscribeOptions::default(),
        )
        .unwrap();

    engine
        .transaction(|tx| {
            tx.insert("facts", vec![(1,)])?;
            tx.insert("facts", vec![(2,)])?;
            // Added then removed inside the batch: never observed.
            tx.insert("facts", vec![(9,)])?;
            tx.delete("facts", vec![(9,)])?;
            Ok(())
        })
        .unwrap();

    assert_eq!(handle.output().unwrap(), vec![int_tuple(&[1]), int_tuple(&[2])]);
    assert_eq!(notified.load(Ordering::SeqCst), 1);
}
