//! Arc propagation
//!
//! After a node moves, every arc attached to it is repositioned. Arcs fall
//! into three classes, handled in this order:
//!
//! 1. **Interior** arcs have both ends on the moved node and simply follow it.
//! 2. **Rigid** arcs keep their shape; the node at the far end is dragged
//!    along (rotating with the mover) unless it is locked.
//! 3. **Flexible** arcs may stretch. With a fixed angle they keep their
//!    direction by moving the far node sideways, sliding along the far port,
//!    or, as a last resort, being jogged.
//!
//! Nodes that get dragged are queued and visited in turn; the clock stamp
//! set by [`alter_node`] stops the walk from revisiting anything.

use std::collections::HashSet;

use tracing::{debug, trace};

use crate::design::{ArcEnd, ArcId, ArcInst, Connection, Design, DesignError, NodeId, Point};

use super::arc_move::{do_move_arc_inst, ensure_arc_inst, FLEXIBLE_FLAVOR, RIGID_FLAVOR};
use super::context::PropagationContext;
use super::error::PropagationError;
use super::mover::{alter_node, enqueue, NodeDelta, NodeMotion};
use super::ports::current_port_position;
use super::transform::cos_sin;

/// Visit queued nodes until the queue is empty
pub fn run_queue(design: &mut Design, ctx: &mut PropagationContext) -> Result<(), PropagationError> {
    while let Some(node) = ctx.queue.pop_front() {
        ctx.stats.node_visits += 1;
        mod_node_arcs(design, ctx, node)?;
    }
    Ok(())
}

/// Reposition every arc on a node that was altered in this pass
pub fn mod_node_arcs(
    design: &mut Design,
    ctx: &mut PropagationContext,
    node: NodeId,
) -> Result<(), PropagationError> {
    let motion = NodeMotion::of(design, ctx, node)?;
    debug!(
        node = %design.describe_node(node),
        reoriented = motion.reoriented,
        "propagating node motion"
    );
    let connections = unique_connections(design, node)?;
    interior_pass(design, ctx, &motion, &connections)?;
    rigid_pass(design, ctx, &motion, &connections)?;
    flexible_pass(design, ctx, &motion, &connections)?;
    Ok(())
}

/// One connection per arc; an interior arc shows up at both of its ends
fn unique_connections(design: &Design, node: NodeId) -> Result<Vec<Connection>, DesignError> {
    let mut seen = HashSet::new();
    Ok(design
        .node(node)?
        .connections
        .iter()
        .filter(|c| seen.insert(c.arc))
        .copied()
        .collect())
}

/// The arc if it still exists and was not replaced in this batch
fn live_arc(design: &Design, ctx: &PropagationContext, id: ArcId) -> Option<ArcInst> {
    if ctx.deleted_arcs.contains(&id) {
        return None;
    }
    design.arc(id).ok().cloned()
}

fn ordered(end: ArcEnd, near: Point, far: Point) -> (Point, Point) {
    match end {
        ArcEnd::Head => (near, far),
        ArcEnd::Tail => (far, near),
    }
}

fn interior_pass(
    design: &mut Design,
    ctx: &mut PropagationContext,
    motion: &NodeMotion,
    connections: &[Connection],
) -> Result<(), PropagationError> {
    for conn in connections {
        let Some(arc) = live_arc(design, ctx, conn.arc) else {
            continue;
        };
        if !arc.is_interior() {
            continue;
        }
        if ctx.arc_stamp(&arc).moved() {
            ensure_arc_inst(design, ctx, conn.arc, RIGID_FLAVOR)?;
            continue;
        }
        let head = motion.move_point(design, ctx, arc.head().port, arc.head().location)?;
        let tail = motion.move_point(design, ctx, arc.tail().port, arc.tail().location)?;
        do_move_arc_inst(design, ctx, conn.arc, head, tail, RIGID_FLAVOR)?;
    }
    Ok(())
}

fn rigid_pass(
    design: &mut Design,
    ctx: &mut PropagationContext,
    motion: &NodeMotion,
    connections: &[Connection],
) -> Result<(), PropagationError> {
    let mut rigid_arcs = Vec::new();
    for conn in connections {
        let Some(arc) = live_arc(design, ctx, conn.arc) else {
            continue;
        };
        if arc.is_interior() || !ctx.is_rigid(&arc) {
            continue;
        }
        rigid_arcs.push(*conn);
        if ctx.arc_stamp(&arc).moved() {
            ensure_arc_inst(design, ctx, conn.arc, RIGID_FLAVOR)?;
            continue;
        }
        move_rigid_arc(design, ctx, motion, conn, &arc)?;
    }

    // Far nodes dragged by the sweep get their own full visit
    for conn in rigid_arcs {
        if ctx.rigid_modified.remove(&conn.arc) {
            if let Some(arc) = live_arc(design, ctx, conn.arc) {
                enqueue(ctx, arc.end(conn.end.other()).node);
            }
        }
    }
    Ok(())
}

fn move_rigid_arc(
    design: &mut Design,
    ctx: &mut PropagationContext,
    motion: &NodeMotion,
    conn: &Connection,
    arc: &ArcInst,
) -> Result<(), PropagationError> {
    let tolerance = ctx.tolerance();
    let near = arc.end(conn.end);
    let far = arc.end(conn.end.other());
    let new_near = motion.move_point(design, ctx, near.port, near.location)?;

    let new_far = if ctx.node_modified(design, far.node)? {
        NodeMotion::of(design, ctx, far.node)?.move_point(design, ctx, far.port, far.location)?
    } else if ctx.is_locked(design, far.node)? {
        trace!(node = %design.describe_node(far.node), "far end locked");
        far.location
    } else {
        let delta = if motion.reoriented {
            let far_geometry = design.node(far.node)?.geometry;
            let center = motion.trans.transform_point(far_geometry.center);
            let mut dangle = motion.dangle();
            if motion.parity_changed() && far_geometry.transposed() != motion.old.transposed() {
                dangle = (3600 - dangle).rem_euclid(3600);
            }
            let shift = center - far_geometry.center;
            NodeDelta::new(shift.x, shift.y, 0.0, 0.0, dangle)
        } else {
            let shift = new_near - near.location;
            NodeDelta::translate(shift.x, shift.y)
        };
        if delta.is_zero(tolerance) {
            far.location
        } else {
            alter_node(design, ctx, far.node, delta)?;
            ctx.rigid_modified.insert(conn.arc);
            NodeMotion::of(design, ctx, far.node)?.move_point(design, ctx, far.port, far.location)?
        }
    };

    let (head, tail) = ordered(conn.end, new_near, new_far);
    do_move_arc_inst(design, ctx, conn.arc, head, tail, RIGID_FLAVOR)
}

fn flexible_pass(
    design: &mut Design,
    ctx: &mut PropagationContext,
    motion: &NodeMotion,
    connections: &[Connection],
) -> Result<(), PropagationError> {
    for conn in connections {
        let Some(arc) = live_arc(design, ctx, conn.arc) else {
            continue;
        };
        if arc.is_interior() || ctx.is_rigid(&arc) {
            continue;
        }
        if ctx.arc_stamp(&arc).moved() {
            ensure_arc_inst(design, ctx, conn.arc, FLEXIBLE_FLAVOR)?;
            continue;
        }
        move_flexible_arc(design, ctx, motion, conn, &arc)?;
    }
    Ok(())
}

fn move_flexible_arc(
    design: &mut Design,
    ctx: &mut PropagationContext,
    motion: &NodeMotion,
    conn: &Connection,
    arc: &ArcInst,
) -> Result<(), PropagationError> {
    let tolerance = ctx.tolerance();
    let near = arc.end(conn.end);
    let far = arc.end(conn.end.other());

    let near_port = current_port_position(design, near.node, near.port)?;
    if arc.slidable && near_port.contains(near.location, tolerance) {
        trace!(arc = %design.describe_arc(conn.arc), "slid within port");
        return Ok(());
    }
    let moved = motion.move_point(design, ctx, near.port, near.location)?;
    let new_near = near_port.clamp(moved, tolerance);

    let new_far = if ctx.node_modified(design, far.node)? {
        NodeMotion::of(design, ctx, far.node)?.move_point(design, ctx, far.port, far.location)?
    } else if arc.fixed_angle {
        let candidate = fixed_angle_far_end(design, ctx, conn, arc, new_near)?;
        let far_port = current_port_position(design, far.node, far.port)?;
        if far_port.contains(candidate, tolerance) {
            candidate
        } else if !ctx.is_locked(design, far.node)? {
            let residual = candidate - far.location;
            alter_node(design, ctx, far.node, NodeDelta::translate(residual.x, residual.y))?;
            enqueue(ctx, far.node);
            candidate
        } else {
            far.location
        }
    } else {
        far.location
    };

    let (head, tail) = ordered(conn.end, new_near, new_far);
    do_move_arc_inst(design, ctx, conn.arc, head, tail, FLEXIBLE_FLAVOR)
}

/// Where the far end of a fixed-angle arc should go once the near end is at
/// `new_near`
fn fixed_angle_far_end(
    design: &Design,
    ctx: &PropagationContext,
    conn: &Connection,
    arc: &ArcInst,
    new_near: Point,
) -> Result<Point, DesignError> {
    let near = arc.end(conn.end);
    let far = arc.end(conn.end.other());
    match arc.angle.rem_euclid(1800) {
        0 => Ok(Point::new(far.location.x, new_near.y)),
        900 => Ok(Point::new(new_near.x, far.location.y)),
        _ => Ok(non_orthog_fix_ang(design, ctx, conn.arc, arc, far.node, new_near)?
            .unwrap_or_else(|| far.location + (new_near - near.location))),
    }
}

/// Fit a diagonal fixed-angle arc by sliding its far node along the longest
/// other arc on that node: the far end goes to the intersection of this
/// arc's line through `new_near` with the other arc's direction through the
/// current far end. `None` when there is no other arc or the lines are
/// parallel.
pub fn non_orthog_fix_ang(
    design: &Design,
    ctx: &PropagationContext,
    id: ArcId,
    arc: &ArcInst,
    far_node: NodeId,
    new_near: Point,
) -> Result<Option<Point>, DesignError> {
    let mut longest: Option<(f64, Point)> = None;
    for conn in &design.node(far_node)?.connections {
        if conn.arc == id || ctx.deleted_arcs.contains(&conn.arc) {
            continue;
        }
        let other = design.arc(conn.arc)?;
        let length = other.length();
        if longest.map_or(true, |(l, _)| length > l) {
            let (c, s) = cos_sin(other.angle);
            longest = Some((length, Point::new(c, s)));
        }
    }
    let Some((_, other_dir)) = longest else {
        return Ok(None);
    };

    let (c, s) = cos_sin(arc.angle);
    let dir = Point::new(c, s);
    let far = if arc.head().node == far_node && arc.tail().node != far_node {
        arc.head().location
    } else {
        arc.tail().location
    };
    let denom = dir.cross(other_dir);
    if denom.abs() < 1e-12 {
        return Ok(None);
    }
    // new_near + t·dir = far + u·other_dir
    let u = dir.cross(far - new_near) / -denom;
    Ok(Some(far + other_dir * u))
}
