//! Plain-text listing of a design
//!
//! Output is deterministic: cells, nodes and exports are sorted by name and
//! named arcs come before unnamed ones, so two runs over the same input can
//! be diffed line by line.

use crate::design::{ArcId, ArcInst, CellId, Design, DesignError, NodePrototype, Point};

/// Print a number without trailing zeros: `2`, `2.5`, `-0.125`
pub fn format_number(value: f64) -> String {
    let rounded = format!("{:.6}", value);
    let trimmed = rounded.trim_end_matches('0').trim_end_matches('.');
    match trimmed {
        "-0" | "" => "0".to_string(),
        other => other.to_string(),
    }
}

fn format_point(p: Point) -> String {
    format!("({}, {})", format_number(p.x), format_number(p.y))
}

fn format_flags(flags: &[(&str, bool)]) -> String {
    let set: Vec<&str> = flags
        .iter()
        .filter(|(_, on)| *on)
        .map(|(name, _)| *name)
        .collect();
    if set.is_empty() {
        String::new()
    } else {
        format!(" [{}]", set.join(", "))
    }
}

/// Every cell of the design
pub fn dump(design: &Design) -> Result<String, DesignError> {
    let mut cells: Vec<CellId> = design.cell_ids().collect();
    cells.sort_by_key(|c| design.cell(*c).map(|c| c.name.clone()).unwrap_or_default());
    let mut out = String::new();
    for cell in cells {
        out.push_str(&dump_cell(design, cell)?);
    }
    Ok(out)
}

/// One cell: bounds, then nodes, arcs and exports
pub fn dump_cell(design: &Design, cell: CellId) -> Result<String, DesignError> {
    let cell_ref = design.cell(cell)?;
    let mut out = String::new();
    let icon = match cell_ref.icon_of {
        Some(of) => format!(" icon_of {}", design.cell(of)?.name),
        None => String::new(),
    };
    out.push_str(&format!(
        "cell {}{}{}\n",
        cell_ref.name,
        icon,
        format_flags(&[("locked_instances", cell_ref.locked_instances)])
    ));
    let b = cell_ref.bounds;
    out.push_str(&format!(
        "  bounds {} size ({}, {})\n",
        format_point(Point::new(b.x, b.y)),
        format_number(b.width),
        format_number(b.height)
    ));

    let mut nodes = cell_ref.nodes.clone();
    nodes.sort_by_key(|n| design.node(*n).map(|n| n.name.clone()).unwrap_or_default());
    for node in nodes {
        let inst = design.node(node)?;
        let proto = match inst.proto {
            NodePrototype::Primitive(p) => design.primitive(p)?.name.clone(),
            NodePrototype::Cell(c) => design.cell(c)?.name.clone(),
        };
        let g = inst.geometry;
        out.push_str(&format!(
            "  node {}: {} at {} size {} rotation {}{}\n",
            inst.name,
            proto,
            format_point(g.center),
            format_point(Point::new(g.size.x.abs(), g.size.y.abs())),
            g.angle,
            format_flags(&[
                ("mirror_x", g.flip_x()),
                ("mirror_y", g.flip_y()),
                ("locked", inst.locked),
            ])
        ));
    }

    let mut arcs: Vec<(ArcId, &ArcInst)> = Vec::new();
    for &arc in &cell_ref.arcs {
        arcs.push((arc, design.arc(arc)?));
    }
    arcs.sort_by(|(ia, a), (ib, b)| {
        (a.name.is_none(), &a.name, ia.0).cmp(&(b.name.is_none(), &b.name, ib.0))
    });
    for (_, arc) in arcs {
        let end = |i: usize| -> Result<String, DesignError> {
            let e = &arc.ends[i];
            Ok(format!(
                "{}.{} {}",
                design.node(e.node)?.name,
                design.port_name(e.node, e.port)?,
                format_point(e.location)
            ))
        };
        out.push_str(&format!(
            "  arc {}: {} {} -- {} angle {} width {}{}\n",
            arc.name.as_deref().unwrap_or("-"),
            design.arc_proto(arc.proto)?.name,
            end(0)?,
            end(1)?,
            arc.angle,
            format_number(arc.width),
            format_flags(&[
                ("rigid", arc.rigid),
                ("fixed_angle", arc.fixed_angle),
                ("slidable", arc.slidable),
                ("negated_head", arc.negated[0]),
                ("negated_tail", arc.negated[1]),
            ])
        ));
    }

    let mut exports: Vec<_> = cell_ref.exports.iter().collect();
    exports.sort_by(|a, b| a.name.cmp(&b.name));
    for export in exports {
        out.push_str(&format!(
            "  export {} = {}.{}\n",
            export.name,
            design.node(export.node)?.name,
            design.port_name(export.node, export.port)?
        ));
    }
    Ok(out)
}
