//! Constraint propagation engine
//!
//! Moving, resizing or rotating a node drags its wires along, and through
//! them other nodes, according to each wire's rigidity and fixed-angle
//! flags. When the dust settles, changed cells get new bounding boxes and
//! every instance of them is resized, which can start the same process one
//! level up the hierarchy.
//!
//! Edits are grouped into batches:
//!
//! ```ignore
//! let mut engine = ConstraintEngine::new(PropagationConfig::default());
//! let mut batch = engine.start_batch(&mut design);
//! batch.modify_node(node, NodeDelta::rotate(900))?;
//! let report = batch.end_batch()?;
//! ```
//!
//! A batch is all-or-nothing: if any step fails, everything it changed is
//! rolled back and the batch refuses further edits.

pub mod arc_move;
pub mod arcs;
pub mod bounds;
pub mod clock;
pub mod context;
pub mod error;
pub mod mover;
pub mod ports;
pub mod transform;

use tracing::{debug, debug_span, error, trace, Span};

use crate::config::PropagationConfig;
use crate::design::{ArcId, CellId, Design, DesignError, Journal, NodeId};

pub use clock::ChangeClock;
pub use context::{PropagationContext, PropagationStats};
pub use error::{JogError, PropagationError};
pub use mover::{alter_node, NodeDelta, NodeMotion};
pub use transform::Transform;

/// Long-lived engine state: the change clock and configuration
#[derive(Debug, Clone, Default)]
pub struct ConstraintEngine {
    clock: ChangeClock,
    config: PropagationConfig,
}

/// What a finished batch did
#[derive(Debug, Clone, PartialEq)]
pub struct BatchReport {
    /// Every change made, in order; roll it back to undo the batch
    pub journal: Journal,
    pub stats: PropagationStats,
    /// Cells whose bounds differ from when the batch started
    pub resized_cells: Vec<CellId>,
}

impl BatchReport {
    /// Undo the batch
    pub fn undo(mut self, design: &mut Design) -> Result<(), DesignError> {
        self.journal.rollback(design)
    }
}

impl ConstraintEngine {
    pub fn new(config: PropagationConfig) -> Self {
        Self {
            clock: ChangeClock::new(),
            config,
        }
    }

    pub fn config(&self) -> &PropagationConfig {
        &self.config
    }

    /// Current value of the change clock
    pub fn clock(&self) -> u64 {
        self.clock.current()
    }

    /// Begin a batch of edits on `design`
    pub fn start_batch<'a>(&'a mut self, design: &'a mut Design) -> Batch<'a> {
        design.set_tolerance(self.config.tolerance);
        let ctx = PropagationContext::new(self.clock, self.config.clone(), design);
        self.clock = ctx.clock;
        let span = debug_span!("batch", clock = ctx.now());
        Batch {
            engine: self,
            design,
            ctx,
            aborted: false,
            span,
        }
    }

    /// Make an arc rigid (or flexible) for the next batch only, regardless
    /// of its persistent flag
    pub fn set_temporary_rigid(
        &self,
        design: &mut Design,
        arc: ArcId,
        rigid: bool,
    ) -> Result<(), DesignError> {
        design.arc_mut(arc)?.stamp = self.clock.temporary_stamp(rigid);
        trace!(arc = %design.describe_arc(arc), rigid, "temporary rigidity set");
        Ok(())
    }

    /// Hook for the database when an export is removed; currently nothing
    /// needs to be re-propagated
    pub fn on_export_deleted(&mut self, design: &Design, cell: CellId, export: &str) {
        trace!(cell = %cell_name(design, cell), export, "export deleted");
    }

    /// Hook for the database when a variable is attached to an object;
    /// currently nothing needs to be re-propagated
    pub fn on_variable_created(&mut self, design: &Design, cell: CellId, name: &str) {
        trace!(cell = %cell_name(design, cell), variable = name, "variable created");
    }

    /// Run a single edit as its own batch
    pub fn modify_node(
        &mut self,
        design: &mut Design,
        node: NodeId,
        delta: NodeDelta,
    ) -> Result<BatchReport, PropagationError> {
        let mut batch = self.start_batch(design);
        batch.modify_node(node, delta)?;
        batch.end_batch()
    }
}

fn cell_name(design: &Design, cell: CellId) -> String {
    design
        .cell(cell)
        .map(|c| c.name.clone())
        .unwrap_or_else(|_| cell.to_string())
}

/// An open batch of edits
pub struct Batch<'a> {
    engine: &'a mut ConstraintEngine,
    design: &'a mut Design,
    ctx: PropagationContext,
    aborted: bool,
    span: Span,
}

impl<'a> Batch<'a> {
    pub fn design(&self) -> &Design {
        &*self.design
    }

    pub fn stats(&self) -> &PropagationStats {
        &self.ctx.stats
    }

    pub fn is_aborted(&self) -> bool {
        self.aborted
    }

    /// Apply one edit and propagate it. A node can only be edited once per
    /// batch; later edits to a node the batch already moved are ignored.
    pub fn modify_node(&mut self, node: NodeId, delta: NodeDelta) -> Result<(), PropagationError> {
        self.modify_nodes(&[node], &[delta])
    }

    /// Apply several edits together: all nodes are altered before any
    /// propagation starts, so none of them is dragged before its own edit
    pub fn modify_nodes(
        &mut self,
        nodes: &[NodeId],
        deltas: &[NodeDelta],
    ) -> Result<(), PropagationError> {
        if self.aborted {
            return Err(PropagationError::BatchAborted);
        }
        if nodes.len() != deltas.len() {
            return Err(PropagationError::MismatchedDeltas {
                nodes: nodes.len(),
                deltas: deltas.len(),
            });
        }
        let span = self.span.clone();
        let _entered = span.enter();
        let result = apply(self.design, &mut self.ctx, nodes, deltas);
        self.check(result)
    }

    /// Settle the hierarchy and close the batch
    pub fn end_batch(mut self) -> Result<BatchReport, PropagationError> {
        if self.aborted {
            return Err(PropagationError::BatchAborted);
        }
        let span = self.span.clone();
        let _entered = span.enter();
        let result = bounds::update_bounds(self.design, &mut self.ctx);
        self.engine.clock = self.ctx.clock;
        self.check(result)?;

        let mut resized_cells: Vec<CellId> = Vec::new();
        for (cell, before) in &self.ctx.remembered_bounds {
            let now = self.design.cell(*cell)?.bounds;
            if !now.approx_eq(before, self.ctx.tolerance()) {
                resized_cells.push(*cell);
            }
        }
        resized_cells.sort();
        debug!(
            visits = self.ctx.stats.node_visits,
            arcs = self.ctx.stats.arc_moves,
            jogs = self.ctx.stats.jogs,
            "batch finished"
        );
        Ok(BatchReport {
            journal: std::mem::take(&mut self.ctx.journal),
            stats: self.ctx.stats,
            resized_cells,
        })
    }

    /// Abort and roll back on failure
    fn check<T>(&mut self, result: Result<T, PropagationError>) -> Result<T, PropagationError> {
        let err = match result {
            Ok(value) => return Ok(value),
            Err(err) => err,
        };
        self.aborted = true;
        error!(error = %err, "propagation failed; rolling back batch");
        if let Err(rollback) = self.ctx.journal.rollback(self.design) {
            return Err(PropagationError::RollbackFailed {
                cause: Box::new(err),
                rollback,
            });
        }
        Err(err)
    }
}

fn apply(
    design: &mut Design,
    ctx: &mut PropagationContext,
    nodes: &[NodeId],
    deltas: &[NodeDelta],
) -> Result<(), PropagationError> {
    for (&node, &delta) in nodes.iter().zip(deltas) {
        if ctx.node_modified(design, node)? {
            debug!(node = %design.describe_node(node), "node already moved in this batch; edit ignored");
            continue;
        }
        alter_node(design, ctx, node, delta)?;
        mover::enqueue(ctx, node);
    }
    arcs::run_queue(design, ctx)
}

