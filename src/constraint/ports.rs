//! Port geometry, current and historical
//!
//! A port on a cell instance is an export: it resolves through the export
//! chain down to a port on a primitive, composing each level's placement
//! on the way. The "old" position uses the node's geometry from before the
//! current pass at the top level, and below the instance boundary the
//! geometry its parents last propagated.

use crate::design::{Design, DesignError, NodeId, PortId, Polygon};

use super::context::PropagationContext;

/// Port polygon as it is now, in the node's parent coordinates
pub fn current_port_position(
    design: &Design,
    node: NodeId,
    port: PortId,
) -> Result<Polygon, DesignError> {
    design.port_polygon(node, port)
}

/// Port polygon before the current pass moved anything
pub fn old_port_position(
    design: &Design,
    ctx: &PropagationContext,
    node: NodeId,
    port: PortId,
) -> Result<Polygon, DesignError> {
    design.port_polygon_with(node, port, |n, depth| {
        let geometry = if depth == 0 {
            ctx.old_geometry(design, n)
        } else {
            ctx.nested_geometry(design, n)
        };
        geometry.ok()
    })
}
