//! Compute: external predicates in the dataflow.

use crate::delta::Delta;
use crate::error::{EngineError, EngineResult};
use crate::provider::{ProviderHandle, SharedProvider};
use crate::value::Tuple;
use indexmap::{IndexMap, IndexSet};

/// Mode-specific node state.
#[derive(Debug)]
enum ComputeState {
    /// Source node mirroring an enumerable provider's extension.
    Enumerable {
        handle: ProviderHandle,
        current: IndexSet<Tuple>,
    },
    /// Filter node judging upstream tuples through a pointwise provider.
    Pointwise {
        handle: ProviderHandle,
        /// Watched upstream tuples and their last known truth value.
        truth: IndexMap<Tuple, bool>,
    },
}

/// Wraps a shared [`crate::provider::ComputeProvider`].
///
/// Provider failures are logged and degrade the affected cycle to an empty
/// delta; they never poison the graph.
pub(crate) struct ComputeOp {
    node_id: String,
    provider_name: String,
    provider: SharedProvider,
    state: ComputeState,
}

impl std::fmt::Debug for ComputeOp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ComputeOp")
            .field("node_id", &self.node_id)
            .field("provider", &self.provider_name)
            .field("state", &self.state)
            .finish()
    }
}

impl ComputeOp {
    pub fn enumerable(
        node_id: impl Into<String>,
        provider_name: impl Into<String>,
        provider: SharedProvider,
    ) -> Self {
        let handle = provider.lock().initial_handle();
        ComputeOp {
            node_id: node_id.into(),
            provider_name: provider_name.into(),
            provider,
            state: ComputeState::Enumerable {
                handle,
                current: IndexSet::new(),
            },
        }
    }

    pub fn pointwise(
        node_id: impl Into<String>,
        provider_name: impl Into<String>,
        provider: SharedProvider,
    ) -> Self {
        let handle = provider.lock().initial_handle();
        ComputeOp {
            node_id: node_id.into(),
            provider_name: provider_name.into(),
            provider,
            state: ComputeState::Pointwise {
                handle,
                truth: IndexMap::new(),
            },
        }
    }

    fn degrade(&self, method: &str, err: &anyhow::Error) {
        tracing::warn!(
            node = %self.node_id,
            provider = %self.provider_name,
            method,
            error = %err,
            "provider_cycle_degraded"
        );
    }

    /// Cold start: enumerable nodes pull the provider's full extension as
    /// their initial add set. Pointwise nodes start empty.
    pub fn cold_start(&mut self) -> EngineResult<Option<Delta>> {
        let ComputeState::Enumerable { handle, current } = &mut self.state else {
            return Ok(None);
        };
        let pulled = self.provider.lock().enumerate();
        match pulled {
            Ok((tuples, next)) => {
                *handle = next;
                current.clear();
                current.extend(tuples);
                Ok(Some(Delta::of_adds(current.iter().cloned())))
            }
            Err(err) => {
                self.degrade("enumerate", &err);
                Ok(Some(Delta::new()))
            }
        }
    }

    /// One provider cycle: `delta_since` for enumerable nodes, `flips_since`
    /// for pointwise nodes. The handle advances only on success.
    pub fn poll(&mut self) -> EngineResult<Option<Delta>> {
        match &mut self.state {
            ComputeState::Enumerable { handle, current } => {
                let pulled = self.provider.lock().delta_since(*handle);
                match pulled {
                    Ok((adds, removes, next)) => {
                        *handle = next;
                        let mut out = Delta::new();
                        for t in adds {
                            if current.insert(t.clone()) {
                                out.push_add(t);
                            }
                        }
                        for t in removes {
                            if current.shift_remove(&t) {
                                out.push_remove(t);
                            }
                        }
                        Ok(Some(out))
                    }
                    Err(err) => {
                        self.degrade("delta_since", &err);
                        Ok(Some(Delta::new()))
                    }
                }
            }
            ComputeState::Pointwise { handle, truth } => {
                let pulled = self.provider.lock().flips_since(*handle);
                match pulled {
                    Ok((flips, next)) => {
                        *handle = next;
                        let mut out = Delta::new();
                        for t in flips {
                            if let Some(value) = truth.get_mut(&t) {
                                *value = !*value;
                                if *value {
                                    out.push_add(t);
                                } else {
                                    out.push_remove(t);
                                }
                            }
                        }
                        Ok(Some(out))
                    }
                    Err(err) => {
                        self.degrade("flips_since", &err);
                        Ok(Some(Delta::new()))
                    }
                }
            }
        }
    }

    /// Upstream delta (pointwise mode only): new tuples enter the watch set
    /// and are judged in one `eval_many` call; retracted tuples leave it.
    pub fn on_delta(&mut self, _edge: usize, delta: &Delta) -> EngineResult<Delta> {
        let ComputeState::Pointwise { truth, .. } = &mut self.state else {
            return Err(EngineError::Invariant(format!(
                "enumerable compute '{}' received an upstream delta",
                self.node_id
            )));
        };
        let mut out = Delta::new();

        let candidates: Vec<Tuple> = delta.adds().cloned().collect();
        if !candidates.is_empty() {
            let judged = self.provider.lock().eval_many(&candidates);
            match judged {
                Ok(truthy) => {
                    let truthy: IndexSet<Tuple> = truthy.into_iter().collect();
                    for t in candidates {
                        let is_true = truthy.contains(&t);
                        if truth.insert(t.clone(), is_true).is_some() {
                            return Err(EngineError::Invariant(format!(
                                "pointwise compute '{}' watched {t} twice",
                                self.node_id
                            )));
                        }
                        if is_true {
                            out.push_add(t);
                        }
                    }
                }
                Err(err) => {
                    // Watch pessimistically as false so later retractions
                    // still balance; the cycle reports no change.
                    for t in candidates {
                        truth.insert(t, false);
                    }
                    self.degrade("eval_many", &err);
                    return Ok(Delta::new());
                }
            }
        }

        for t in delta.removes() {
            match truth.shift_remove(t) {
                Some(true) => out.push_remove(t.clone()),
                Some(false) => {}
                None => {
                    return Err(EngineError::Invariant(format!(
                        "pointwise compute '{}' dropped unwatched {t}",
                        self.node_id
                    )));
                }
            }
        }
        Ok(out)
    }

    pub fn reset(&mut self) {
        let initial = self.provider.lock().initial_handle();
        match &mut self.state {
            ComputeState::Enumerable { handle, current } => {
                *handle = initial;
                current.clear();
            }
            ComputeState::Pointwise { handle, truth } => {
                *handle = initial;
                truth.clear();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::{share, ComputeProvider, ProviderMode};
    use crate::value::Atom;

    fn t(i: i32) -> Tuple {
        Tuple::new(vec![Atom::Integer(i)])
    }

    /// Enumerable provider: a base extension plus a change journal.
    struct ListProvider {
        base: Vec<Tuple>,
        history: Vec<(Vec<Tuple>, Vec<Tuple>)>,
    }

    impl ComputeProvider for ListProvider {
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
            let mut adds = Vec::new();
            let mut removes = Vec::new();
            for (a, r) in self.history.iter().skip(since.0 as usize) {
                adds.extend(a.iter().cloned());
                removes.extend(r.iter().cloned());
            }
            Ok((adds, removes, ProviderHandle(self.history.len() as u64)))
        }
    }

    #[test]
    fn enumerable_cold_start_then_delta() {
        let provider = share(ListProvider {
            base: vec![t(1), t(2)],
            history: vec![(vec![t(3)], vec![t(1)])],
        });
        let mut op = ComputeOp::enumerable("c", "list", provider);

        let out = op.cold_start().unwrap().unwrap();
        assert_eq!(out.adds().len(), 2);

        // The journal entry surfaces once...
        let out = op.poll().unwrap().unwrap();
        assert_eq!(out.adds().cloned().collect::<Vec<_>>(), vec![t(3)]);
        assert_eq!(out.removes().cloned().collect::<Vec<_>>(), vec![t(1)]);

        // ...and the advanced handle keeps later cycles quiet.
        let out = op.poll().unwrap().unwrap();
        assert!(out.is_empty());
    }

    struct EvenProvider;

    impl ComputeProvider for EvenProvider {
        fn mode(&self) -> ProviderMode {
            ProviderMode::Pointwise
        }

        fn eval_many(&mut self, candidates: &[Tuple]) -> anyhow::Result<Vec<Tuple>> {
            Ok(candidates
                .iter()
                .filter(|t| matches!(t.get(0), Some(Atom::Integer(i)) if i % 2 == 0))
                .cloned()
                .collect())
        }
    }

    #[test]
    fn pointwise_filters_upstream_tuples() {
        let mut op = ComputeOp::pointwise("c", "even", share(EvenProvider));
        let out = op
            .on_delta(0, &Delta::of_adds([t(1), t(2), t(4)]))
            .unwrap();
        let adds: Vec<Tuple> = out.adds().cloned().collect();
        assert_eq!(adds, vec![t(2), t(4)]);

        // Retracting a false tuple is silent, a true one emits.
        let out = op.on_delta(0, &Delta::of_removes([t(1)])).unwrap();
        assert!(out.is_empty());
        let out = op.on_delta(0, &Delta::of_removes([t(2)])).unwrap();
        assert_eq!(out.removes().cloned().collect::<Vec<_>>(), vec![t(2)]);
    }

    struct FailingProvider;

    impl ComputeProvider for FailingProvider {
        fn mode(&self) -> ProviderMode {
            ProviderMode::Pointwise
        }

        fn eval_many(&mut self, _candidates: &[Tuple]) -> anyhow::Result<Vec<Tuple>> {
            anyhow::bail!("backend unreachable")
        }
    }

    #[test]
    fn provider_failure_degrades_to_no_change() {
        let mut op = ComputeOp::pointwise("c", "failing", share(FailingProvider));
        let out = op.on_delta(0, &Delta::of_adds([t(1)])).unwrap();
        assert!(out.is_empty());
        // The tuple is still watched, so its retraction balances.
        let out = op.on_delta(0, &Delta::of_removes([t(1)])).unwrap();
        assert!(out.is_empty());
    }
}
