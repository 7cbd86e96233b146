//! Building a design and its edit scripts from a parsed document
//!
//! Declarations are processed in dependency order rather than source
//! order: the technology first, then every cell name (so a cell may
//! instantiate one declared further down), then cell contents bottom-up
//! over the instancing graph. Filling a cell in ends by computing its
//! bounds, so by the time a parent places an instance the sub-cell's size
//! is final.

pub mod error;
mod modifiers;

pub use error::LoadError;

use std::collections::HashMap;

use tracing::debug;

use crate::constraint::NodeDelta;
use crate::design::{
    ArcEndpoint, ArcId, ArcProto, CellId, Design, Edge, NewArc, NewNode, NodeGeometry, NodeId,
    NodePrototype, Point, PortId, PortShape, Primitive, PrimitiveFunction, PrimitivePort, Size,
};
use crate::parser::ast::*;

use error::at;
use modifiers::Modifiers;

/// A design ready for editing, plus the batches the document asks for
#[derive(Debug, Clone)]
pub struct LoadedDesign {
    pub design: Design,
    pub scripts: Vec<EditScript>,
}

/// One `batch { ... }` block, resolved against the design
#[derive(Debug, Clone, PartialEq)]
pub struct EditScript {
    pub span: Span,
    pub steps: Vec<EditStep>,
}

impl EditScript {
    /// The moves of the script, in order
    pub fn moves(&self) -> (Vec<NodeId>, Vec<NodeDelta>) {
        self.steps
            .iter()
            .filter_map(|step| match step {
                EditStep::Move { node, delta } => Some((*node, *delta)),
                EditStep::TemporaryRigidity { .. } => None,
            })
            .unzip()
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum EditStep {
    Move { node: NodeId, delta: NodeDelta },
    /// Override an arc's rigidity for this batch only
    TemporaryRigidity { arc: ArcId, rigid: bool },
}

const PRIMITIVE_KEYS: &[&str] = &["size", "pin", "locked"];
const PORT_KEYS: &[&str] = &["lx", "ly", "hx", "hy", "lx_add", "ly_add", "hx_add", "hy_add"];
const ARC_PROTO_KEYS: &[&str] = &["width", "pin"];
const CELL_KEYS: &[&str] = &["locked_instances", "icon_of"];
const NODE_KEYS: &[&str] = &["rotation", "mirror_x", "mirror_y", "locked", "size"];
const ARC_KEYS: &[&str] = &[
    "rigid",
    "fixed_angle",
    "slidable",
    "width",
    "head",
    "tail",
    "negated_head",
    "negated_tail",
    "angle",
];
const MOVE_KEYS: &[&str] = &["dx", "dy", "dsx", "dsy", "rotate"];

/// Build the design described by `doc`
pub fn load(doc: &Document) -> Result<LoadedDesign, LoadError> {
    let mut design = Design::new();

    for stmt in &doc.statements {
        if let Statement::Primitive(p) = &stmt.node {
            load_primitive(&mut design, p)?;
        }
    }
    for stmt in &doc.statements {
        if let Statement::ArcProto(a) = &stmt.node {
            load_arc_proto(&mut design, a)?;
        }
    }

    let mut cells: Vec<(CellId, &CellDecl)> = Vec::new();
    for stmt in &doc.statements {
        if let Statement::Cell(c) = &stmt.node {
            let name = c.name.node.as_str();
            if design.find_cell(name).is_some() || design.find_primitive(name).is_some() {
                return Err(LoadError::duplicate("cell", name, c.name.span.clone()));
            }
            cells.push((design.add_cell(name), c));
        }
    }
    for &(cell, decl) in &cells {
        load_cell_modifiers(&mut design, cell, decl)?;
    }
    for index in instancing_order(&design, &cells)? {
        let (cell, decl) = cells[index];
        load_cell_contents(&mut design, cell, decl)?;
    }

    let mut scripts = Vec::new();
    for stmt in &doc.statements {
        if let Statement::Batch(b) = &stmt.node {
            scripts.push(load_batch(&design, b, stmt.span.clone())?);
        }
    }
    debug!(
        cells = cells.len(),
        scripts = scripts.len(),
        "document loaded"
    );
    Ok(LoadedDesign { design, scripts })
}

// ── Technology ────────────────────────────────────────────────────

fn load_primitive(design: &mut Design, decl: &PrimitiveDecl) -> Result<(), LoadError> {
    let name = decl.name.node.as_str();
    if design.find_primitive(name).is_some() {
        return Err(LoadError::duplicate("primitive", name, decl.name.span.clone()));
    }
    let mods = Modifiers::new(&decl.modifiers, "primitive", PRIMITIVE_KEYS)?;
    let (w, h) = mods.pair("size")?.unwrap_or((0.0, 0.0));
    if w < 0.0 || h < 0.0 {
        let span = mods.span_of("size").unwrap_or_default();
        return Err(LoadError::invalid("size", "a non-negative size", span));
    }

    let mut ports: Vec<PrimitivePort> = Vec::new();
    for port in &decl.ports {
        let port_name = port.node.name.node.as_str();
        if ports.iter().any(|p| p.name == port_name) {
            return Err(LoadError::duplicate("port", port_name, port.node.name.span.clone()));
        }
        ports.push(PrimitivePort {
            name: port_name.to_string(),
            shape: port_shape(&port.node)?,
        });
    }

    design.add_primitive(Primitive {
        name: name.to_string(),
        default_size: Size::new(w, h),
        function: if mods.flag("pin")? {
            PrimitiveFunction::Pin
        } else {
            PrimitiveFunction::Component
        },
        locked: mods.flag("locked")?,
        ports,
    });
    Ok(())
}

/// Edges are fractions of the node size plus fixed offsets; a port with no
/// modifiers is a point at the centre
fn port_shape(decl: &PortDecl) -> Result<PortShape, LoadError> {
    let mods = Modifiers::new(&decl.modifiers, "port", PORT_KEYS)?;
    let edge = |mul: &str, add: &str| -> Result<Edge, LoadError> {
        Ok(Edge::new(
            mods.number(mul)?.unwrap_or(0.0),
            mods.number(add)?.unwrap_or(0.0),
        ))
    };
    Ok(PortShape {
        low_x: edge("lx", "lx_add")?,
        low_y: edge("ly", "ly_add")?,
        high_x: edge("hx", "hx_add")?,
        high_y: edge("hy", "hy_add")?,
    })
}

fn load_arc_proto(design: &mut Design, decl: &ArcProtoDecl) -> Result<(), LoadError> {
    let name = decl.name.node.as_str();
    if design.find_arc_proto(name).is_some() {
        return Err(LoadError::duplicate("arc prototype", name, decl.name.span.clone()));
    }
    let mods = Modifiers::new(&decl.modifiers, "arc prototype", ARC_PROTO_KEYS)?;
    let pin = match mods.name("pin")? {
        None => None,
        Some(pin) => Some(design.find_primitive(pin.node.as_str()).ok_or_else(|| {
            LoadError::undefined(
                "primitive",
                pin.node.as_str(),
                pin.span.clone(),
                find_similar(design.primitives().map(|p| p.name.as_str()), pin.node.as_str(), 2),
            )
        })?),
    };
    design.add_arc_proto(ArcProto {
        name: name.to_string(),
        default_width: mods.number("width")?.unwrap_or(0.0),
        pin,
    });
    Ok(())
}

// ── Cells ─────────────────────────────────────────────────────────

fn load_cell_modifiers(design: &mut Design, cell: CellId, decl: &CellDecl) -> Result<(), LoadError> {
    let mods = Modifiers::new(&decl.modifiers, "cell", CELL_KEYS)?;
    let icon_of = match mods.name("icon_of")? {
        None => None,
        Some(target) => Some(lookup_cell(design, target.node.as_str(), &target.span)?),
    };
    let span = decl.name.span.clone();
    let cell_ref = design.cell_mut(cell).map_err(at(&span))?;
    cell_ref.locked_instances = mods.flag("locked_instances")?;
    cell_ref.icon_of = icon_of;
    Ok(())
}

fn lookup_cell(design: &Design, name: &str, span: &Span) -> Result<CellId, LoadError> {
    design.find_cell(name).ok_or_else(|| {
        let names: Vec<String> = design
            .cell_ids()
            .filter_map(|c| design.cell(c).ok().map(|c| c.name.clone()))
            .collect();
        LoadError::undefined(
            "cell",
            name,
            span.clone(),
            find_similar(names.iter().map(String::as_str), name, 2),
        )
    })
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Visit {
    New,
    Active,
    Done,
}

/// Depth-first walk of the instancing graph yielding sub-cells before the
/// cells that place them
struct InstancingOrder<'a, 'd> {
    design: &'a Design,
    cells: &'a [(CellId, &'d CellDecl)],
    index_of: HashMap<CellId, usize>,
    state: Vec<Visit>,
    path: Vec<usize>,
    order: Vec<usize>,
}

impl InstancingOrder<'_, '_> {
    fn visit(&mut self, i: usize) -> Result<(), LoadError> {
        self.state[i] = Visit::Active;
        self.path.push(i);
        let decl = self.cells[i].1;
        for item in &decl.items {
            let CellItem::Node(node) = &item.node else {
                continue;
            };
            let proto = node.proto.node.as_str();
            if self.design.find_primitive(proto).is_some() {
                continue;
            }
            let Some(j) = self
                .design
                .find_cell(proto)
                .and_then(|sub| self.index_of.get(&sub).copied())
            else {
                continue;
            };
            match self.state[j] {
                Visit::Done => {}
                Visit::New => self.visit(j)?,
                Visit::Active => {
                    let start = self.path.iter().position(|&p| p == j).unwrap_or(0);
                    let cycle = self.path[start..]
                        .iter()
                        .chain(std::iter::once(&j))
                        .map(|&k| self.cells[k].1.name.node.to_string())
                        .collect();
                    return Err(LoadError::RecursiveInstance {
                        cycle,
                        span: node.proto.span.clone(),
                    });
                }
            }
        }
        self.path.pop();
        self.state[i] = Visit::Done;
        self.order.push(i);
        Ok(())
    }
}

fn instancing_order(design: &Design, cells: &[(CellId, &CellDecl)]) -> Result<Vec<usize>, LoadError> {
    let mut walk = InstancingOrder {
        design,
        cells,
        index_of: cells.iter().enumerate().map(|(i, (c, _))| (*c, i)).collect(),
        state: vec![Visit::New; cells.len()],
        path: Vec::new(),
        order: Vec::new(),
    };
    for i in 0..cells.len() {
        if walk.state[i] == Visit::New {
            walk.visit(i)?;
        }
    }
    Ok(walk.order)
}

fn load_cell_contents(design: &mut Design, cell: CellId, decl: &CellDecl) -> Result<(), LoadError> {
    for item in &decl.items {
        if let CellItem::Node(n) = &item.node {
            load_node(design, cell, n, &item.span)?;
        }
    }
    for item in &decl.items {
        if let CellItem::Export(e) = &item.node {
            let (node, port) = resolve_port_ref(design, cell, &e.target)?;
            design
                .add_export(cell, e.name.node.as_str(), node, port)
                .map_err(at(&item.span))?;
        }
    }
    for item in &decl.items {
        if let CellItem::Arc(a) = &item.node {
            load_arc(design, cell, a, &item.span)?;
        }
    }
    let bounds = design.compute_cell_bounds(cell).map_err(at(&decl.name.span))?;
    let cell_ref = design.cell_mut(cell).map_err(at(&decl.name.span))?;
    cell_ref.bounds = bounds;
    debug!(
        cell = %cell_ref.name,
        nodes = cell_ref.nodes.len(),
        arcs = cell_ref.arcs.len(),
        "cell loaded"
    );
    Ok(())
}

fn load_node(design: &mut Design, cell: CellId, decl: &NodeDecl, span: &Span) -> Result<(), LoadError> {
    let mods = Modifiers::new(&decl.modifiers, "node", NODE_KEYS)?;
    let proto_name = decl.proto.node.as_str();
    let (proto, (w, h)) = if let Some(p) = design.find_primitive(proto_name) {
        let default = design.primitive(p).map_err(at(span))?.default_size;
        let size = mods.pair("size")?.unwrap_or((default.x, default.y));
        (NodePrototype::Primitive(p), size)
    } else if let Some(c) = design.find_cell(proto_name) {
        if let Some(size_span) = mods.span_of("size") {
            return Err(LoadError::invalid(
                "size",
                "no size on a cell instance; it follows the cell's bounds",
                size_span,
            ));
        }
        let bounds = design.cell(c).map_err(at(span))?.bounds;
        (NodePrototype::Cell(c), (bounds.width, bounds.height))
    } else {
        let names: Vec<String> = design
            .primitives()
            .map(|p| p.name.clone())
            .chain(design.cell_ids().filter_map(|c| design.cell(c).ok().map(|c| c.name.clone())))
            .collect();
        return Err(LoadError::undefined(
            "prototype",
            proto_name,
            decl.proto.span.clone(),
            find_similar(names.iter().map(String::as_str), proto_name, 2),
        ));
    };

    let signed = |extent: f64, mirrored: bool| if mirrored { -extent.abs() } else { extent.abs() };
    let size = Size::new(signed(w, mods.flag("mirror_x")?), signed(h, mods.flag("mirror_y")?));
    let (x, y) = decl.at.as_ref().map(|a| a.node).unwrap_or((0.0, 0.0));
    let angle = mods.angle("rotation")?.unwrap_or(0).rem_euclid(3600);

    design
        .add_node(
            cell,
            NewNode {
                name: decl.name.node.to_string(),
                proto,
                geometry: NodeGeometry::new(Point::new(x, y), size, angle),
                locked: mods.flag("locked")?,
            },
        )
        .map_err(at(span))?;
    Ok(())
}

/// `node.port`, or `node` alone for its first port
fn resolve_port_ref(design: &Design, cell: CellId, r: &PortRef) -> Result<(NodeId, PortId), LoadError> {
    let node = lookup_node(design, cell, &r.node)?;
    let Some(port_name) = &r.port else {
        design.port_name(node, PortId(0)).map_err(at(&r.node.span))?;
        return Ok((node, PortId(0)));
    };
    match design.find_port(node, port_name.node.as_str()).map_err(at(&port_name.span))? {
        Some(port) => Ok((node, port)),
        None => Err(LoadError::undefined(
            "port",
            port_name.node.as_str(),
            port_name.span.clone(),
            find_similar(port_names(design, node).iter().map(String::as_str), port_name.node.as_str(), 2),
        )),
    }
}

fn port_names(design: &Design, node: NodeId) -> Vec<String> {
    (0..)
        .map(PortId)
        .map_while(|p| design.port_name(node, p).ok().map(str::to_string))
        .collect()
}

fn lookup_node(design: &Design, cell: CellId, name: &Spanned<Identifier>) -> Result<NodeId, LoadError> {
    design.find_node(cell, name.node.as_str()).ok_or_else(|| {
        let names: Vec<String> = design
            .cell(cell)
            .map(|c| {
                c.nodes
                    .iter()
                    .filter_map(|n| design.node(*n).ok().map(|n| n.name.clone()))
                    .collect()
            })
            .unwrap_or_default();
        LoadError::undefined(
            "node",
            name.node.as_str(),
            name.span.clone(),
            find_similar(names.iter().map(String::as_str), name.node.as_str(), 2),
        )
    })
}

fn load_arc(design: &mut Design, cell: CellId, decl: &ArcDecl, span: &Span) -> Result<(), LoadError> {
    let mods = Modifiers::new(&decl.modifiers, "arc", ARC_KEYS)?;
    let proto_name = decl.proto.node.as_str();
    let proto = design.find_arc_proto(proto_name).ok_or_else(|| {
        LoadError::undefined(
            "arc prototype",
            proto_name,
            decl.proto.span.clone(),
            find_similar(design.arc_protos().map(|a| a.name.as_str()), proto_name, 2),
        )
    })?;

    let endpoint = |r: &PortRef, key: &str| -> Result<ArcEndpoint, LoadError> {
        let (node, port) = resolve_port_ref(design, cell, r)?;
        let location = match mods.pair(key)? {
            Some((x, y)) => Point::new(x, y),
            None => design.port_polygon(node, port).map_err(at(span))?.center(),
        };
        Ok(ArcEndpoint {
            node,
            port,
            location,
        })
    };
    let head = endpoint(&decl.head, "head")?;
    let tail = endpoint(&decl.tail, "tail")?;

    let mut new = NewArc::new(proto, head, tail);
    new.name = decl.name.as_ref().map(|n| n.node.to_string());
    new.width = mods.number("width")?;
    new.rigid = mods.flag("rigid")?;
    new.fixed_angle = mods.flag("fixed_angle")?;
    new.slidable = mods.flag("slidable")?;
    new.negated = [mods.flag("negated_head")?, mods.flag("negated_tail")?];
    new.angle = mods.angle("angle")?.unwrap_or(0);
    design.add_arc(cell, new).map_err(at(span))?;
    Ok(())
}

// ── Edit scripts ──────────────────────────────────────────────────

fn load_batch(design: &Design, decl: &BatchDecl, span: Span) -> Result<EditScript, LoadError> {
    let mut steps = Vec::new();
    for item in &decl.items {
        let step = match &item.node {
            BatchItem::Move { target, modifiers } => {
                let cell = lookup_cell(design, target.cell.node.as_str(), &target.cell.span)?;
                let node = lookup_node(design, cell, &target.item)?;
                let mods = Modifiers::new(modifiers, "move", MOVE_KEYS)?;
                let delta = NodeDelta::new(
                    mods.number("dx")?.unwrap_or(0.0),
                    mods.number("dy")?.unwrap_or(0.0),
                    mods.number("dsx")?.unwrap_or(0.0),
                    mods.number("dsy")?.unwrap_or(0.0),
                    mods.angle("rotate")?.unwrap_or(0),
                );
                EditStep::Move { node, delta }
            }
            BatchItem::Rigid(target) => EditStep::TemporaryRigidity {
                arc: lookup_arc(design, target)?,
                rigid: true,
            },
            BatchItem::Flexible(target) => EditStep::TemporaryRigidity {
                arc: lookup_arc(design, target)?,
                rigid: false,
            },
        };
        steps.push(step);
    }
    Ok(EditScript { span, steps })
}

fn lookup_arc(design: &Design, target: &QualifiedName) -> Result<ArcId, LoadError> {
    let cell = lookup_cell(design, target.cell.node.as_str(), &target.cell.span)?;
    let name = target.item.node.as_str();
    design.find_arc(cell, name).ok_or_else(|| {
        let names: Vec<String> = design
            .cell(cell)
            .map(|c| {
                c.arcs
                    .iter()
                    .filter_map(|a| design.arc(*a).ok().and_then(|a| a.name.clone()))
                    .collect()
            })
            .unwrap_or_default();
        LoadError::undefined(
            "arc",
            name,
            target.item.span.clone(),
            find_similar(names.iter().map(String::as_str), name, 2),
        )
    })
}

// ── Suggestions ───────────────────────────────────────────────────

/// Simple Levenshtein distance for typo suggestions
fn levenshtein_distance(a: &str, b: &str) -> usize {
    let a_chars: Vec<char> = a.chars().collect();
    let b_chars: Vec<char> = b.chars().collect();
    let n = b_chars.len();
    if a_chars.is_empty() {
        return n;
    }
    if n == 0 {
        return a_chars.len();
    }

    let mut prev: Vec<usize> = (0..=n).collect();
    let mut row = vec![0usize; n + 1];
    for (i, ca) in a_chars.iter().enumerate() {
        row[0] = i + 1;
        for (j, cb) in b_chars.iter().enumerate() {
            let cost = usize::from(ca != cb);
            row[j + 1] = (prev[j + 1] + 1).min(row[j] + 1).min(prev[j] + cost);
        }
        std::mem::swap(&mut prev, &mut row);
    }
    prev[n]
}

/// Up to three names within `max_distance` edits of `target`, closest first
fn find_similar<'n>(
    names: impl IntoIterator<Item = &'n str>,
    target: &str,
    max_distance: usize,
) -> Vec<String> {
    let mut candidates: Vec<(usize, &str)> = names
        .into_iter()
        .filter_map(|name| {
            let dist = levenshtein_distance(name, target);
            (dist <= max_distance && dist > 0).then_some((dist, name))
        })
        .collect();
    candidates.sort();
    candidates.dedup();
    candidates
        .into_iter()
        .map(|(_, name)| name.to_string())
        .take(3)
        .collect()
}
