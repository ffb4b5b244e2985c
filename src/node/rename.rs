//! Rename: schema rewrite, value pass-through.

use crate::delta::Delta;
use crate::error::EngineResult;

/// Renames columns for downstream binding. The new names live in the graph
/// plan's schema; at runtime the node is stateless and tuple bytes never
/// change, so the input delta is forwarded untouched.
#[derive(Debug)]
pub(crate) struct RenameOp;

impl RenameOp {
    pub fn new() -> Self {
        RenameOp
    }

    pub fn on_delta(&mut self, _edge: usize, delta: &Delta) -> EngineResult<Delta> {
        Ok(delta.clone())
    }

    pub fn reset(&mut self) {}
}
