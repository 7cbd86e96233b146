//! Affine transforms between node frames and their parent cell.
//!
//! Every node maps its local frame into its parent's frame with
//!
//! ```text
//! T = translate(center) · rotate(angle) · mirror(flip_x, flip_y)
//! ```
//!
//! where `flip_x` negates local x coordinates (the node's size is negative
//! along x) and `flip_y` negates local y. Angles are in tenths of a degree,
//! counterclockwise, with y growing upward.
//!
//! ## Exact Quarter Turns
//!
//! Manhattan layouts depend on coordinates surviving a 90° rotation
//! unchanged. The four quarter-turn angles therefore use exact sine and
//! cosine values instead of going through `f64::sin_cos`, which would leave
//! residues like `6.1e-17` in otherwise integral coordinates.
//!
//! ## Loose Bounds
//!
//! [`Transform::transform_bounds`] maps the four corners of a box and takes
//! the box around them. For the quarter turns that make up almost every real
//! layout this is exact.

use crate::design::{
    BoundingBox, Design, DesignError, NodeGeometry, NodeId, Point, Polygon, PortId, EPSILON,
};

use super::context::PropagationContext;
use super::ports;

/// A 2D affine transform: `p' = M·p + t`
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Transform {
    pub m00: f64,
    pub m01: f64,
    pub m10: f64,
    pub m11: f64,
    pub tx: f64,
    pub ty: f64,
}

/// Cosine and sine of an angle in tenths of a degree
pub fn cos_sin(angle: i32) -> (f64, f64) {
    match angle.rem_euclid(3600) {
        0 => (1.0, 0.0),
        900 => (0.0, 1.0),
        1800 => (-1.0, 0.0),
        2700 => (0.0, -1.0),
        a => {
            let (s, c) = (a as f64 / 10.0).to_radians().sin_cos();
            (c, s)
        }
    }
}

impl Transform {
    pub const IDENTITY: Transform = Transform {
        m00: 1.0,
        m01: 0.0,
        m10: 0.0,
        m11: 1.0,
        tx: 0.0,
        ty: 0.0,
    };

    pub fn translate(dx: f64, dy: f64) -> Self {
        Self {
            tx: dx,
            ty: dy,
            ..Self::IDENTITY
        }
    }

    /// Rotation and mirroring without translation; used to map deltas.
    ///
    /// The mirror is applied first (in the node's own frame), then the
    /// rotation.
    pub fn pure_rotate(angle: i32, flip_x: bool, flip_y: bool) -> Self {
        let (c, s) = cos_sin(angle);
        let fx = if flip_x { -1.0 } else { 1.0 };
        let fy = if flip_y { -1.0 } else { 1.0 };
        Self {
            m00: c * fx,
            m01: -s * fy,
            m10: s * fx,
            m11: c * fy,
            tx: 0.0,
            ty: 0.0,
        }
    }

    /// Local-to-parent transform of a node with the given placement
    pub fn for_node(geometry: &NodeGeometry) -> Self {
        Self::pure_rotate(geometry.angle, geometry.flip_x(), geometry.flip_y())
            .then(&Self::translate(geometry.center.x, geometry.center.y))
    }

    /// Transform carrying points attached to a node from its `old`
    /// placement to its `new` one
    pub fn between(old: &NodeGeometry, new: &NodeGeometry) -> Self {
        match Self::for_node(old).inverse() {
            Some(inverse) => inverse.then(&Self::for_node(new)),
            None => Self::translate(new.center.x - old.center.x, new.center.y - old.center.y),
        }
    }

    /// Map the box `old` onto the box `new`: centres coincide and each axis
    /// is scaled by the ratio of the extents. A degenerate old extent gives
    /// a scale of 1 on that axis.
    pub fn box_adjust(old: &BoundingBox, new: &BoundingBox) -> Self {
        let sx = if old.width.abs() < EPSILON {
            1.0
        } else {
            new.width / old.width
        };
        let sy = if old.height.abs() < EPSILON {
            1.0
        } else {
            new.height / old.height
        };
        let (oc, nc) = (old.center(), new.center());
        Self {
            m00: sx,
            m01: 0.0,
            m10: 0.0,
            m11: sy,
            tx: nc.x - oc.x * sx,
            ty: nc.y - oc.y * sy,
        }
    }

    /// Compose: apply `self` first, then `next`
    pub fn then(&self, next: &Transform) -> Transform {
        Transform {
            m00: next.m00 * self.m00 + next.m01 * self.m10,
            m01: next.m00 * self.m01 + next.m01 * self.m11,
            m10: next.m10 * self.m00 + next.m11 * self.m10,
            m11: next.m10 * self.m01 + next.m11 * self.m11,
            tx: next.m00 * self.tx + next.m01 * self.ty + next.tx,
            ty: next.m10 * self.tx + next.m11 * self.ty + next.ty,
        }
    }

    pub fn inverse(&self) -> Option<Transform> {
        let det = self.m00 * self.m11 - self.m01 * self.m10;
        if det.abs() < f64::EPSILON {
            return None;
        }
        let m00 = self.m11 / det;
        let m01 = -self.m01 / det;
        let m10 = -self.m10 / det;
        let m11 = self.m00 / det;
        Some(Transform {
            m00,
            m01,
            m10,
            m11,
            tx: -(m00 * self.tx + m01 * self.ty),
            ty: -(m10 * self.tx + m11 * self.ty),
        })
    }

    pub fn is_identity(&self, tolerance: f64) -> bool {
        (self.m00 - 1.0).abs() <= tolerance
            && self.m01.abs() <= tolerance
            && self.m10.abs() <= tolerance
            && (self.m11 - 1.0).abs() <= tolerance
            && self.tx.abs() <= tolerance
            && self.ty.abs() <= tolerance
    }

    pub fn transform_point(&self, p: Point) -> Point {
        Point::new(
            self.m00 * p.x + self.m01 * p.y + self.tx,
            self.m10 * p.x + self.m11 * p.y + self.ty,
        )
    }

    /// Map a displacement; translation is ignored
    pub fn transform_vector(&self, v: Point) -> Point {
        Point::new(
            self.m00 * v.x + self.m01 * v.y,
            self.m10 * v.x + self.m11 * v.y,
        )
    }

    /// Loose bounds of a transformed box (see module docs)
    pub fn transform_bounds(&self, bounds: &BoundingBox) -> BoundingBox {
        let corners = bounds.corners().map(|c| self.transform_point(c));
        let min_x = corners.iter().map(|p| p.x).fold(f64::INFINITY, f64::min);
        let max_x = corners.iter().map(|p| p.x).fold(f64::NEG_INFINITY, f64::max);
        let min_y = corners.iter().map(|p| p.y).fold(f64::INFINITY, f64::min);
        let max_y = corners.iter().map(|p| p.y).fold(f64::NEG_INFINITY, f64::max);
        BoundingBox::new(min_x, min_y, max_x - min_x, max_y - min_y)
    }

    pub fn transform_polygon(&self, polygon: &Polygon) -> Polygon {
        Polygon::new(
            polygon
                .points
                .iter()
                .map(|p| self.transform_point(*p))
                .collect(),
        )
    }
}

impl Default for Transform {
    fn default() -> Self {
        Self::IDENTITY
    }
}

/// Refine the motion `trans` of a node that kept its orientation so that it
/// also follows the port's movement relative to the node: a sub-cell whose
/// contents moved, or a primitive port that scales with the node size.
///
/// The old port box is carried by `trans` first; what remains is the
/// internal motion, expressed as a scale about the port centre plus a shift.
pub fn adjust_for_node(
    design: &Design,
    ctx: &PropagationContext,
    node: NodeId,
    port: PortId,
    trans: &Transform,
) -> Result<Transform, DesignError> {
    let old = ports::old_port_position(design, ctx, node, port)?.bounds();
    let new = ports::current_port_position(design, node, port)?.bounds();
    let carried = trans.transform_bounds(&old);
    Ok(trans.then(&Transform::box_adjust(&carried, &new)))
}
