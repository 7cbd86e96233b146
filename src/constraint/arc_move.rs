//! Moving arcs: direct updates, jogs and connectivity repair

use std::collections::BTreeMap;

use tracing::{debug, info, trace, warn};

use crate::design::{
    angle_of, ArcEndpoint, ArcId, BoundingBox, CellId, Change, Design, DesignError, NewArc,
    NewNode, NodeGeometry, NodeId, NodePrototype, Point, PortId, PrimitiveId, Size,
};

use super::context::PropagationContext;
use super::error::{JogError, PropagationError};
use super::ports::current_port_position;
use super::transform::{cos_sin, Transform};

/// Arc move requested by rigid (or interior) processing
pub const RIGID_FLAVOR: u64 = 0;
/// Arc move requested by flexible processing
pub const FLEXIBLE_FLAVOR: u64 = 1;

/// Move an arc to new end points, jogging it when a fixed angle can no
/// longer be kept by a straight segment
pub fn do_move_arc_inst(
    design: &mut Design,
    ctx: &mut PropagationContext,
    id: ArcId,
    head: Point,
    tail: Point,
    flavor: u64,
) -> Result<(), PropagationError> {
    let tolerance = ctx.tolerance();
    let arc = design.arc(id)?;
    let unchanged = arc.head().location.approx_eq(head, tolerance)
        && arc.tail().location.approx_eq(tail, tolerance);
    if unchanged && flavor == FLEXIBLE_FLAVOR {
        return Ok(());
    }

    let vector = tail - head;
    let collapsed = vector.length() <= tolerance;
    let keeps_angle = collapsed || angle_of(vector) % 1800 == arc.angle % 1800;
    // Both ends of an interior arc follow one node transform, so it never bends
    if !arc.fixed_angle || ctx.is_rigid(arc) || arc.is_interior() || keeps_angle {
        update_arc(design, ctx, id, head, tail, flavor)?;
        return Ok(());
    }
    jog_arc(design, ctx, id, head, tail)
}

/// Set new end points, journaling the arc once per pass
pub fn update_arc(
    design: &mut Design,
    ctx: &mut PropagationContext,
    id: ArcId,
    head: Point,
    tail: Point,
    flavor: u64,
) -> Result<(), DesignError> {
    ctx.record_arc(design, id)?;
    design.set_arc_ends(id, head, tail)?;
    let arc = design.arc_mut(id)?;
    arc.stamp = ctx.now() + flavor;
    let parent = arc.parent;
    ctx.touched_cells.insert(parent);
    ctx.stats.arc_moves += 1;
    trace!(
        arc = %design.describe_arc(id),
        head_x = head.x,
        head_y = head.y,
        tail_x = tail.x,
        tail_y = tail.y,
        "arc moved"
    );
    Ok(())
}

/// Replace the arc by three segments through two new pins. A failure rolls
/// back whatever the jog already created and leaves the arc as it was.
fn jog_arc(
    design: &mut Design,
    ctx: &mut PropagationContext,
    id: ArcId,
    head: Point,
    tail: Point,
) -> Result<(), PropagationError> {
    let description = design.describe_arc(id);
    let mark = ctx.journal.mark();
    match build_jog(design, ctx, id, head, tail) {
        Ok([first, middle, last]) => {
            ctx.stats.jogs += 1;
            info!(
                arc = %description,
                segments = ?[first, middle, last],
                "jogged fixed-angle arc"
            );
            Ok(())
        }
        Err(err) => {
            ctx.journal.rollback_to(design, mark)?;
            ctx.stats.failed_jogs += 1;
            warn!(arc = %description, error = %err, "could not jog arc; update abandoned");
            Ok(())
        }
    }
}

/// Pin positions for a jog from `head` to `tail` that keeps the outer
/// segments at `angle`
pub fn jog_pins(head: Point, tail: Point, angle: i32) -> (Point, Point) {
    let (c, s) = cos_sin(angle);
    let along = Point::new(c, s);
    let across = Point::new(-s, c);
    let span = tail - head;
    let a = span.dot(along);
    let b = span.dot(across);
    let first = head + along * (a / 2.0);
    (first, first + across * b)
}

fn build_jog(
    design: &mut Design,
    ctx: &mut PropagationContext,
    id: ArcId,
    head: Point,
    tail: Point,
) -> Result<[ArcId; 3], JogError> {
    let arc = design.arc(id)?.clone();
    let proto = design.arc_proto(arc.proto)?;
    let pin = proto.pin.ok_or_else(|| JogError::NoPin(proto.name.clone()))?;
    let pin_size = design.primitive(pin)?.default_size;
    let port_offset = pin_port_offset(design, pin, pin_size)?;
    let (first, second) = jog_pins(head, tail, arc.angle);
    let cell = arc.parent;

    // Pins are placed so that their port centre lands on the jog corner
    let place_pin = |design: &mut Design, ctx: &mut PropagationContext, at: Point| {
        let name = unique_node_name(design, cell, "jog");
        create_node(
            design,
            ctx,
            cell,
            NewNode {
                name,
                proto: NodePrototype::Primitive(pin),
                geometry: NodeGeometry::new(at - port_offset, pin_size, 0),
                locked: false,
            },
        )
    };
    let pin1 = place_pin(design, ctx, first)?;
    let pin2 = place_pin(design, ctx, second)?;

    let killed = design.kill_arc(id)?;
    ctx.journal.record(Change::ArcKilled {
        arc: id,
        inst: Box::new(killed),
    });

    let pin_end = |node: NodeId, location: Point| ArcEndpoint {
        node,
        port: PortId(0),
        location,
    };
    let segment = |head: ArcEndpoint, tail: ArcEndpoint, angle: i32| NewArc {
        name: None,
        proto: arc.proto,
        head,
        tail,
        width: Some(arc.width),
        rigid: arc.rigid,
        fixed_angle: arc.fixed_angle,
        slidable: arc.slidable,
        negated: [false, false],
        angle,
        variables: BTreeMap::new(),
    };

    let mut outer_head = segment(
        ArcEndpoint {
            location: head,
            ..*arc.head()
        },
        pin_end(pin1, first),
        arc.angle,
    );
    outer_head.negated[0] = arc.negated[0];
    let mut middle = segment(
        pin_end(pin1, first),
        pin_end(pin2, second),
        (arc.angle + 900).rem_euclid(3600),
    );
    middle.name = arc.name.clone();
    middle.variables = arc.variables.clone();
    let mut outer_tail = segment(
        pin_end(pin2, second),
        ArcEndpoint {
            location: tail,
            ..*arc.tail()
        },
        arc.angle,
    );
    outer_tail.negated[1] = arc.negated[1];

    let segments = [
        create_arc(design, ctx, cell, outer_head)?,
        create_arc(design, ctx, cell, middle)?,
        create_arc(design, ctx, cell, outer_tail)?,
    ];
    // Only a finished jog retires the arc; a rolled-back one is live again
    ctx.deleted_arcs.insert(id);
    Ok(segments)
}

/// Offset of a pin's first port centre from the pin centre, unrotated
fn pin_port_offset(design: &Design, pin: PrimitiveId, size: Size) -> Result<Point, DesignError> {
    let primitive = design.primitive(pin)?;
    let port = primitive
        .ports
        .first()
        .ok_or_else(|| DesignError::UnknownPort {
            node: primitive.name.clone(),
            port: 0,
        })?;
    let local = port.shape.local_box(size).center();
    Ok(Transform::for_node(&NodeGeometry::new(Point::zero(), size, 0)).transform_point(local))
}

fn unique_node_name(design: &Design, cell: CellId, base: &str) -> String {
    let mut index = 1usize;
    loop {
        let name = format!("{}{}", base, index);
        if design.find_node(cell, &name).is_none() {
            return name;
        }
        index += 1;
    }
}

/// Create a node, journaled and stamped as moved in this pass
pub fn create_node(
    design: &mut Design,
    ctx: &mut PropagationContext,
    cell: CellId,
    new: NewNode,
) -> Result<NodeId, DesignError> {
    let id = design.add_node(cell, new)?;
    ctx.journal.record(Change::NodeCreated(id));
    design.node_mut(id)?.stamp = ctx.now();
    ctx.touched_cells.insert(cell);
    Ok(id)
}

/// Create an arc, journaled and stamped as moved flexibly in this pass
pub fn create_arc(
    design: &mut Design,
    ctx: &mut PropagationContext,
    cell: CellId,
    new: NewArc,
) -> Result<ArcId, DesignError> {
    let id = design.add_arc(cell, new)?;
    ctx.journal.record(Change::ArcCreated(id));
    design.arc_mut(id)?.stamp = ctx.now() + FLEXIBLE_FLAVOR;
    ctx.touched_cells.insert(cell);
    Ok(id)
}

/// Make sure an arc already handled in this pass still touches its ports
pub fn ensure_arc_inst(
    design: &mut Design,
    ctx: &mut PropagationContext,
    id: ArcId,
    flavor: u64,
) -> Result<(), PropagationError> {
    let tolerance = ctx.tolerance();
    let arc = design.arc(id)?.clone();
    let head_port = current_port_position(design, arc.head().node, arc.head().port)?;
    let tail_port = current_port_position(design, arc.tail().node, arc.tail().port)?;
    if head_port.contains(arc.head().location, tolerance)
        && tail_port.contains(arc.tail().location, tolerance)
    {
        return Ok(());
    }

    let centers = (head_port.center(), tail_port.center());
    let (head, tail) = if arc.fixed_angle {
        manhattan_path(&head_port.bounds(), &tail_port.bounds(), arc.angle, tolerance)
            .unwrap_or(centers)
    } else {
        centers
    };
    ctx.stats.repairs += 1;
    debug!(arc = %design.describe_arc(id), "repairing arc connectivity");
    do_move_arc_inst(design, ctx, id, head, tail, flavor)
}

/// A horizontal or vertical segment joining two port boxes, through the
/// middle of the band where they overlap. The arc's current orientation is
/// tried first.
pub fn manhattan_path(
    head: &BoundingBox,
    tail: &BoundingBox,
    angle: i32,
    tolerance: f64,
) -> Option<(Point, Point)> {
    let horizontal = || {
        let low = head.y.max(tail.y);
        let high = head.top().min(tail.top());
        (low <= high + tolerance).then(|| {
            let y = (low + high) / 2.0;
            (
                Point::new(head.center().x, y),
                Point::new(tail.center().x, y),
            )
        })
    };
    let vertical = || {
        let low = head.x.max(tail.x);
        let high = head.right().min(tail.right());
        (low <= high + tolerance).then(|| {
            let x = (low + high) / 2.0;
            (
                Point::new(x, head.center().y),
                Point::new(x, tail.center().y),
            )
        })
    };
    if angle.rem_euclid(1800) == 900 {
        vertical().or_else(horizontal)
    } else {
        horizontal().or_else(vertical)
    }
}
