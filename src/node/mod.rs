//! Runtime operator nodes.
//!
//! Every graph node is instantiated as one [`Operator`]. State mutates only
//! inside `on_delta` (and, for compute sources, `cold_start`/`poll`); the
//! runtime owns delivery order and drops empty emissions. The edge index a
//! delta arrived on is a first-class argument - Diff and Join depend on it.

mod compute;
mod diff;
mod join;
mod project;
mod rename;
mod scan;
mod union;

pub(crate) use compute::ComputeOp;
pub(crate) use diff::DiffOp;
pub(crate) use join::JoinOp;
pub(crate) use project::ProjectOp;
pub(crate) use rename::RenameOp;
pub(crate) use scan::ScanOp;
pub(crate) use union::UnionOp;

use crate::delta::Delta;
use crate::error::EngineResult;

/// A runtime operator with its counting state.
#[derive(Debug)]
pub(crate) enum Operator {
    Scan(ScanOp),
    Project(ProjectOp),
    Union(UnionOp),
    Diff(DiffOp),
    Rename(RenameOp),
    Join(JoinOp),
    Compute(ComputeOp),
}

impl Operator {
    /// Process a delta arriving on `edge` and return the emission (possibly
    /// empty; the runtime drops empty deltas). Emissions are normalized.
    pub fn on_delta(&mut self, edge: usize, delta: &Delta) -> EngineResult<Delta> {
        match self {
            Operator::Scan(op) => op.on_delta(edge, delta),
            Operator::Project(op) => op.on_delta(edge, delta),
            Operator::Union(op) => op.on_delta(edge, delta),
            Operator::Diff(op) => op.on_delta(edge, delta),
            Operator::Rename(op) => op.on_delta(edge, delta),
            Operator::Join(op) => op.on_delta(edge, delta),
            Operator::Compute(op) => op.on_delta(edge, delta),
        }
    }

    /// Initial emission during cold start. Only enumerable compute nodes
    /// produce one; scans start empty.
    pub fn cold_start(&mut self) -> EngineResult<Option<Delta>> {
        match self {
            Operator::Compute(op) => op.cold_start(),
            _ => Ok(None),
        }
    }

    /// Provider polling cycle emission (compute nodes only).
    pub fn poll(&mut self) -> EngineResult<Option<Delta>> {
        match self {
            Operator::Compute(op) => op.poll(),
            _ => Ok(None),
        }
    }

    /// Drop all operator state.
    pub fn reset(&mut self) {
        match self {
            Operator::Scan(op) => op.reset(),
            Operator::Project(op) => op.reset(),
            Operator::Union(op) => op.reset(),
            Operator::Diff(op) => op.reset(),
            Operator::Rename(op) => op.reset(),
            Operator::Join(op) => op.reset(),
            Operator::Compute(op) => op.reset(),
        }
    }
}
