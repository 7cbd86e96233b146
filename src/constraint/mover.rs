//! Applying geometric deltas to single nodes

use tracing::trace;

use crate::design::{Design, DesignError, NodeGeometry, NodeId, Point, PortId, Size};

use super::context::PropagationContext;
use super::transform::{self, Transform};

/// A change to one node's placement
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct NodeDelta {
    pub dx: f64,
    pub dy: f64,
    /// Added to the signed size; crossing zero mirrors the node
    pub dsx: f64,
    pub dsy: f64,
    /// Counterclockwise, in tenths of a degree
    pub dangle: i32,
}

impl NodeDelta {
    pub fn new(dx: f64, dy: f64, dsx: f64, dsy: f64, dangle: i32) -> Self {
        Self {
            dx,
            dy,
            dsx,
            dsy,
            dangle,
        }
    }

    pub fn translate(dx: f64, dy: f64) -> Self {
        Self {
            dx,
            dy,
            ..Self::default()
        }
    }

    pub fn resize(dsx: f64, dsy: f64) -> Self {
        Self {
            dsx,
            dsy,
            ..Self::default()
        }
    }

    pub fn rotate(dangle: i32) -> Self {
        Self {
            dangle,
            ..Self::default()
        }
    }

    pub fn is_zero(&self, tolerance: f64) -> bool {
        self.dx.abs() <= tolerance
            && self.dy.abs() <= tolerance
            && self.dsx.abs() <= tolerance
            && self.dsy.abs() <= tolerance
            && self.dangle.rem_euclid(3600) == 0
    }
}

/// Keeps the sign of a zero size component when nothing is added to it
fn grow(size: f64, delta: f64) -> f64 {
    if delta == 0.0 {
        size
    } else {
        size + delta
    }
}

/// Apply `delta` to `node` and stamp it with the current clock.
///
/// A node already stamped in this pass is left alone and `false` is
/// returned. Otherwise the result tells whether the node carries exports,
/// in which case its parent cell has been queued for a forced hierarchy
/// look.
pub fn alter_node(
    design: &mut Design,
    ctx: &mut PropagationContext,
    node: NodeId,
    delta: NodeDelta,
) -> Result<bool, DesignError> {
    let inst = design.node(node)?;
    if inst.stamp == ctx.now() {
        trace!(node = %design.describe_node(node), "already altered in this pass");
        return Ok(false);
    }
    let old = inst.geometry;
    let parent = inst.parent;

    let size = Size::new(grow(old.size.x, delta.dsx), grow(old.size.y, delta.dsy));
    let flips_x = size.x.is_sign_negative() != old.size.x.is_sign_negative();
    let flips_y = size.y.is_sign_negative() != old.size.y.is_sign_negative();
    let mut dangle = delta.dangle;
    if flips_x || flips_y {
        dangle = (3600 - dangle).rem_euclid(3600);
    }
    let new = NodeGeometry {
        center: old.center + Point::new(delta.dx, delta.dy),
        size,
        angle: (old.angle + dangle).rem_euclid(3600),
    };

    ctx.record_node(design, node)?;
    design.set_node_geometry(node, new)?;
    design.node_mut(node)?.stamp = ctx.now();
    ctx.stats.nodes_altered += 1;
    ctx.touched_cells.insert(parent);

    let exposes_exports = design.node_has_exports(node)?;
    if exposes_exports {
        ctx.forced_look.insert(parent);
    }
    trace!(
        node = %design.describe_node(node),
        x = new.center.x,
        y = new.center.y,
        angle = new.angle,
        "node altered"
    );
    Ok(exposes_exports)
}

/// Queue a node for arc propagation unless it is already waiting
pub fn enqueue(ctx: &mut PropagationContext, node: NodeId) {
    if !ctx.queue.contains(&node) {
        ctx.queue.push_back(node);
    }
}

/// How a node moved in the current pass
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NodeMotion {
    pub node: NodeId,
    pub old: NodeGeometry,
    pub new: NodeGeometry,
    /// Carries points attached to the node from the old frame to the new
    pub trans: Transform,
    /// Rotation or mirroring changed
    pub reoriented: bool,
}

impl NodeMotion {
    pub fn of(design: &Design, ctx: &PropagationContext, node: NodeId) -> Result<Self, DesignError> {
        let old = ctx.old_geometry(design, node)?;
        let new = design.node(node)?.geometry;
        Ok(Self {
            node,
            old,
            new,
            trans: Transform::between(&old, &new),
            reoriented: !old.same_orientation(&new),
        })
    }

    /// Rotation applied by the move, 0..3600
    pub fn dangle(&self) -> i32 {
        (self.new.angle - self.old.angle).rem_euclid(3600)
    }

    /// The move changed the handedness of the node's frame
    pub fn parity_changed(&self) -> bool {
        self.old.transposed() != self.new.transposed()
    }

    /// Transform for points attached to `port`
    pub fn port_transform(
        &self,
        design: &Design,
        ctx: &PropagationContext,
        port: PortId,
    ) -> Result<Transform, DesignError> {
        if self.reoriented {
            Ok(self.trans)
        } else {
            transform::adjust_for_node(design, ctx, self.node, port, &self.trans)
        }
    }

    pub fn move_point(
        &self,
        design: &Design,
        ctx: &PropagationContext,
        port: PortId,
        point: Point,
    ) -> Result<Point, DesignError> {
        Ok(self.port_transform(design, ctx, port)?.transform_point(point))
    }
}
