//! Hierarchical bounding-box maintenance
//!
//! Once direct propagation has settled, every cell touched by the batch gets
//! its bounding box recomputed. A cell whose box changed has all of its
//! instances resized to match, which is an ordinary node edit in the parent
//! and may in turn change the parent's box.
//!
//! ## Fast Path
//!
//! When every instance of the cell sits in a single parent and no cell has
//! asked for a forced look, the instances are resized directly and the walk
//! continues with that parent. This costs one step per hierarchy level.
//!
//! ## Hierarchy Sweep
//!
//! Otherwise a mark/sweep over the whole hierarchy runs. Starting from the
//! top cells (those nothing instantiates), `look_down` descends depth-first
//! and decides for every cell whether it is changed, memoizing the answer.
//! A cell is changed when it is one of the sweep's seeds, or when resizing
//! its changed sub-cell instances altered its box or moved its exports.
//! Unchanged subtrees are decided once and never descended again.
//!
//! Icon views placed inside the cell they depict are skipped throughout.

use std::collections::{BTreeSet, HashMap, HashSet};

use tracing::{debug, debug_span, trace};

use crate::design::{BoundingBox, CellId, Design, DesignError, NodeId, NodePrototype};

use super::arcs::run_queue;
use super::context::PropagationContext;
use super::error::PropagationError;
use super::mover::{alter_node, enqueue, NodeDelta};

/// Per-sweep verdict for a cell
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mark {
    Changed,
    Unchanged,
}

/// Bring every touched cell's bounds, and the instances that depend on
/// them, up to date
pub fn update_bounds(design: &mut Design, ctx: &mut PropagationContext) -> Result<(), PropagationError> {
    let _span = debug_span!("update_bounds").entered();
    let limit = 64 * (design.cell_count() + 1);
    let mut passes = 0;
    loop {
        let next = ctx
            .touched_cells
            .iter()
            .next()
            .or_else(|| ctx.forced_look.iter().next())
            .copied();
        let Some(cell) = next else {
            return Ok(());
        };
        passes += 1;
        if passes > limit {
            return Err(PropagationError::BoundsDiverged { passes });
        }
        let forced = ctx.forced_look.contains(&cell);
        compute_cell(design, ctx, cell, forced)?;
    }
}

/// Recompute one cell's bounds and carry any change up the hierarchy
pub fn compute_cell(
    design: &mut Design,
    ctx: &mut PropagationContext,
    cell: CellId,
    forced: bool,
) -> Result<(), PropagationError> {
    let tolerance = ctx.tolerance();
    let mut cell = cell;
    let mut forced = forced;
    loop {
        ctx.stats.cells_examined += 1;
        ctx.touched_cells.remove(&cell);
        let bounds = design.compute_cell_bounds(cell)?;
        let settled = settled_bounds(design, ctx, cell)?;
        if !forced && bounds.approx_eq(&settled, tolerance) {
            trace!(cell = %design.cell(cell)?.name, "bounds unchanged");
            return Ok(());
        }

        ctx.advance();
        if !design.cell(cell)?.bounds.approx_eq(&bounds, tolerance) {
            ctx.set_cell_bounds(design, cell, bounds)?;
        }
        let instances = design.instances_of(cell)?;
        let mut parents = BTreeSet::new();
        for &inst in &instances {
            parents.insert(design.node(inst)?.parent);
        }

        if forced || !ctx.forced_look.is_empty() || parents.len() > 1 {
            return hierarchy_sweep(design, ctx, cell);
        }

        debug!(
            cell = %design.cell(cell)?.name,
            instances = instances.len(),
            "resizing instances in single parent"
        );
        for &inst in &instances {
            resize_instance(design, ctx, inst, &bounds)?;
        }
        for &inst in &instances {
            enqueue(ctx, inst);
        }
        run_queue(design, ctx)?;
        ctx.settled_bounds.insert(cell, bounds);
        ctx.mark_accounted(design, cell)?;
        if !instances.is_empty() {
            ctx.stats.fast_path_resizes += 1;
        }

        match parents.into_iter().next() {
            Some(parent) => {
                forced = ctx.forced_look.contains(&parent);
                cell = parent;
            }
            None => return Ok(()),
        }
    }
}

fn settled_bounds(
    design: &Design,
    ctx: &PropagationContext,
    cell: CellId,
) -> Result<BoundingBox, DesignError> {
    match ctx.settled_bounds.get(&cell) {
        Some(bounds) => Ok(*bounds),
        None => Ok(design.cell(cell)?.bounds),
    }
}

/// Resize a cell instance so its size matches `bounds`, keeping its mirror
/// sign. Instances are anchored at the cell origin, so only the size moves.
fn resize_instance(
    design: &mut Design,
    ctx: &mut PropagationContext,
    inst: NodeId,
    bounds: &BoundingBox,
) -> Result<(), DesignError> {
    let geometry = design.node(inst)?.geometry;
    let mut dsx = bounds.width - geometry.size.x.abs();
    let mut dsy = bounds.height - geometry.size.y.abs();
    if geometry.flip_x() {
        dsx = -dsx;
    }
    if geometry.flip_y() {
        dsy = -dsy;
    }
    trace!(node = %design.describe_node(inst), dsx, dsy, "resizing instance");
    alter_node(design, ctx, inst, NodeDelta::resize(dsx, dsy))?;
    Ok(())
}

/// Mark/sweep over the whole hierarchy, seeded with `origin` and every
/// cell that asked for a forced look
fn hierarchy_sweep(
    design: &mut Design,
    ctx: &mut PropagationContext,
    origin: CellId,
) -> Result<(), PropagationError> {
    let _span = debug_span!("hierarchy_sweep", origin = %origin).entered();
    ctx.stats.hierarchy_sweeps += 1;

    let mut seeds = std::mem::take(&mut ctx.forced_look);
    seeds.insert(origin);

    let mut roots = Vec::new();
    for cell in design.cell_ids() {
        if design.instances_of(cell)?.is_empty() {
            roots.push(cell);
        }
    }
    let mut marks: HashMap<CellId, Mark> = HashMap::new();
    for root in roots {
        look_down(design, ctx, root, &seeds, &mut marks)?;
    }
    // Seeds only reachable through instancing cycles
    for &seed in &seeds {
        look_down(design, ctx, seed, &seeds, &mut marks)?;
    }

    let changed: Vec<CellId> = marks
        .iter()
        .filter(|(_, mark)| **mark == Mark::Changed)
        .map(|(cell, _)| *cell)
        .collect();
    debug!(changed = changed.len(), examined = marks.len(), "hierarchy sweep done");
    for cell in changed {
        let bounds = design.cell(cell)?.bounds;
        ctx.settled_bounds.insert(cell, bounds);
        ctx.mark_accounted(design, cell)?;
        ctx.forced_look.remove(&cell);
    }
    Ok(())
}

/// Decide whether `cell` changed, resizing instances of changed sub-cells
/// on the way up
fn look_down(
    design: &mut Design,
    ctx: &mut PropagationContext,
    cell: CellId,
    seeds: &BTreeSet<CellId>,
    marks: &mut HashMap<CellId, Mark>,
) -> Result<bool, PropagationError> {
    if let Some(mark) = marks.get(&cell) {
        return Ok(*mark == Mark::Changed);
    }
    // Provisional verdict; also stops instancing cycles
    marks.insert(cell, Mark::Unchanged);
    ctx.stats.cells_examined += 1;

    let mut subcells: Vec<(NodeId, CellId)> = Vec::new();
    for &node in &design.cell(cell)?.nodes {
        if let NodePrototype::Cell(sub) = design.node(node)?.proto {
            if !design.is_icon_self_reference(node)? {
                subcells.push((node, sub));
            }
        }
    }

    let mut changed_children = HashSet::new();
    for &(_, sub) in &subcells {
        if !changed_children.contains(&sub) && look_down(design, ctx, sub, seeds, marks)? {
            changed_children.insert(sub);
        }
    }

    let mut changed = seeds.contains(&cell);
    if !changed_children.is_empty() {
        let tolerance = ctx.tolerance();
        let mut resized: HashSet<NodeId> = HashSet::new();
        loop {
            let pending: Vec<NodeId> = subcells
                .iter()
                .filter(|(node, sub)| changed_children.contains(sub) && !resized.contains(node))
                .map(|(node, _)| *node)
                .filter(|node| design.node(*node).is_ok())
                .collect();
            if pending.is_empty() {
                break;
            }
            ctx.advance();
            for &node in &pending {
                let NodePrototype::Cell(sub) = design.node(node)?.proto else {
                    continue;
                };
                let bounds = design.cell(sub)?.bounds;
                resize_instance(design, ctx, node, &bounds)?;
                resized.insert(node);
            }
            for &node in &pending {
                enqueue(ctx, node);
            }
            run_queue(design, ctx)?;
        }

        let bounds = design.compute_cell_bounds(cell)?;
        if !design.cell(cell)?.bounds.approx_eq(&bounds, tolerance) {
            ctx.set_cell_bounds(design, cell, bounds)?;
        }
        if !bounds.approx_eq(&settled_bounds(design, ctx, cell)?, tolerance) {
            changed = true;
        }
        // Exports moved even if the box did not
        if ctx.forced_look.remove(&cell) {
            changed = true;
        }
        ctx.touched_cells.remove(&cell);
    }

    if changed {
        trace!(cell = %design.cell(cell)?.name, "cell changed");
        marks.insert(cell, Mark::Changed);
    }
    Ok(changed)
}
