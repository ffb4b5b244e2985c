//! External predicate providers.
//!
//! A [`ComputeProvider`] feeds a compute node from outside the engine. Two
//! modes exist:
//!
//! - **Enumerable**: the provider can list its full extension
//!   ([`ComputeProvider::enumerate`]) and report what changed since an
//!   opaque state handle ([`ComputeProvider::delta_since`]).
//! - **Pointwise**: the provider judges candidate tuples
//!   ([`ComputeProvider::eval_many`]) and may report spontaneous truth flips
//!   ([`ComputeProvider::flips_since`]; optional, defaults to none).
//!
//! Handles are opaque to the engine and must advance monotonically; the
//! engine stores the last handle it saw and passes it back on the next
//! cycle. Provider failures never poison a graph: the engine logs them and
//! the affected cycle degrades to an empty delta.

use crate::error::EngineError;
use crate::value::Tuple;
use parking_lot::Mutex;
use std::sync::Arc;

/// Opaque provider state marker, advanced after each cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
pub struct ProviderHandle(pub u64);

/// Which contract a provider implements.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderMode {
    Enumerable,
    Pointwise,
}

/// External predicate source.
///
/// Implement the methods your [`ProviderMode`] requires; the defaults fail
/// with [`EngineError::NotImplemented`], which registration surfaces as a
/// configuration error when a node needs the missing method.
pub trait ComputeProvider: Send {
    fn mode(&self) -> ProviderMode;

    /// The handle cold start begins from.
    fn initial_handle(&self) -> ProviderHandle {
        ProviderHandle::default()
    }

    /// Full current extension plus the handle to poll from (Enumerable).
    fn enumerate(&mut self) -> anyhow::Result<(Vec<Tuple>, ProviderHandle)> {
        Err(EngineError::NotImplemented("enumerate").into())
    }

    /// `(adds, removes, next_handle)` since `since` (Enumerable).
    fn delta_since(
        &mut self,
        since: ProviderHandle,
    ) -> anyhow::Result<(Vec<Tuple>, Vec<Tuple>, ProviderHandle)> {
        let _ = since;
        Err(EngineError::NotImplemented("delta_since").into())
    }

    /// The truthy subset of `candidates` (Pointwise).
    fn eval_many(&mut self, candidates: &[Tuple]) -> anyhow::Result<Vec<Tuple>> {
        let _ = candidates;
        Err(EngineError::NotImplemented("eval_many").into())
    }

    /// Watched tuples whose truth flipped since `since` (Pointwise,
    /// optional). The default reports no flips.
    fn flips_since(
        &mut self,
        since: ProviderHandle,
    ) -> anyhow::Result<(Vec<Tuple>, ProviderHandle)> {
        Ok((Vec::new(), since))
    }
}

/// Providers are shared by reference across graphs; the engine never calls
/// into one reentrantly.
pub type SharedProvider = Arc<Mutex<dyn ComputeProvider>>;

/// Wrap a provider for registration.
pub fn share(provider: impl ComputeProvider + 'static) -> SharedProvider {
    Arc::new(Mutex::new(provider))
}
