//! In-memory circuit database
//!
//! Cells own node instances, arc instances and exports. Everything is kept
//! in arenas indexed by small typed ids so the propagation engine can hold
//! ids across mutations without fighting the borrow checker.
//!
//! The engine only touches the database through the accessors and
//! low-level mutators defined here; undo bookkeeping lives in [`journal`].

pub mod error;
pub mod geometry;
pub mod journal;

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fmt;

use crate::constraint::transform::Transform;

pub use error::DesignError;
pub use geometry::{angle_of, BoundingBox, Point, Polygon, Size, EPSILON};
pub use journal::{Change, Journal};

/// Export chains deeper than this are treated as cyclic
const MAX_EXPORT_DEPTH: usize = 1024;

macro_rules! id_type {
    ($(#[$meta:meta])* $name:ident, $prefix:literal) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub struct $name(pub usize);

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, concat!($prefix, "#{}"), self.0)
            }
        }
    };
}

id_type!(
    /// Index of a cell in the design
    CellId,
    "cell"
);
id_type!(
    /// Index of a node instance in the design
    NodeId,
    "node"
);
id_type!(
    /// Index of an arc instance in the design
    ArcId,
    "arc"
);
id_type!(
    /// Index of a primitive node prototype in the technology
    PrimitiveId,
    "primitive"
);
id_type!(
    /// Index of an arc prototype in the technology
    ArcProtoId,
    "arcproto"
);
id_type!(
    /// Index into a prototype's port list: primitive ports for primitives,
    /// exports for cells
    PortId,
    "port"
);

/// What a node instance is an instance of
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NodePrototype {
    Primitive(PrimitiveId),
    Cell(CellId),
}

/// Electrical role of a primitive
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PrimitiveFunction {
    /// Zero-area connection point used to bend wires
    Pin,
    #[default]
    Component,
}

/// One edge of a port shape: `multiplier * |size| + adder`
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Edge {
    pub multiplier: f64,
    pub adder: f64,
}

impl Edge {
    pub fn new(multiplier: f64, adder: f64) -> Self {
        Self { multiplier, adder }
    }

    pub fn at(&self, extent: f64) -> f64 {
        self.multiplier * extent + self.adder
    }
}

/// Port area in the unrotated, unmirrored frame of its node
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct PortShape {
    pub low_x: Edge,
    pub low_y: Edge,
    pub high_x: Edge,
    pub high_y: Edge,
}

impl PortShape {
    /// A zero-area port at the node centre
    pub fn center() -> Self {
        Self::default()
    }

    pub fn local_box(&self, size: Size) -> BoundingBox {
        let (w, h) = size.abs();
        BoundingBox::from_corners(
            Point::new(self.low_x.at(w), self.low_y.at(h)),
            Point::new(self.high_x.at(w), self.high_y.at(h)),
        )
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PrimitivePort {
    pub name: String,
    pub shape: PortShape,
}

/// A primitive node prototype supplied by the technology
#[derive(Debug, Clone, PartialEq)]
pub struct Primitive {
    pub name: String,
    pub default_size: Size,
    pub function: PrimitiveFunction,
    /// Locked primitives only move when the configuration allows it
    pub locked: bool,
    pub ports: Vec<PrimitivePort>,
}

/// An arc prototype supplied by the technology
#[derive(Debug, Clone, PartialEq)]
pub struct ArcProto {
    pub name: String,
    pub default_width: f64,
    /// Pin primitive placed when an arc of this kind has to be jogged
    pub pin: Option<PrimitiveId>,
}

/// A named port exposed by a cell
#[derive(Debug, Clone, PartialEq)]
pub struct Export {
    pub name: String,
    pub node: NodeId,
    pub port: PortId,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Cell {
    pub name: String,
    pub nodes: Vec<NodeId>,
    pub arcs: Vec<ArcId>,
    pub exports: Vec<Export>,
    /// Cached bounding box of the contents, in cell coordinates
    pub bounds: BoundingBox,
    /// Every node instance of this cell, in any parent
    pub instances: Vec<NodeId>,
    /// Instances placed inside this cell may not be moved by propagation
    pub locked_instances: bool,
    /// Set when this cell is the icon view of another cell
    pub icon_of: Option<CellId>,
}

/// Placement of a node: anchor centre, signed size and rotation
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct NodeGeometry {
    pub center: Point,
    pub size: Size,
    /// Rotation in tenths of a degree, counterclockwise, 0..3600
    pub angle: i32,
}

impl NodeGeometry {
    pub fn new(center: Point, size: Size, angle: i32) -> Self {
        Self {
            center,
            size,
            angle,
        }
    }

    /// Mirrored about the local X axis (x coordinates negated)
    pub fn flip_x(&self) -> bool {
        self.size.x.is_sign_negative()
    }

    pub fn flip_y(&self) -> bool {
        self.size.y.is_sign_negative()
    }

    /// Odd mirror parity: the frame has the opposite handedness
    pub fn transposed(&self) -> bool {
        self.flip_x() != self.flip_y()
    }

    pub fn same_orientation(&self, other: &NodeGeometry) -> bool {
        self.angle == other.angle
            && self.flip_x() == other.flip_x()
            && self.flip_y() == other.flip_y()
    }
}

/// Which end of an arc
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ArcEnd {
    Head,
    Tail,
}

impl ArcEnd {
    pub fn index(self) -> usize {
        match self {
            ArcEnd::Head => 0,
            ArcEnd::Tail => 1,
        }
    }

    pub fn other(self) -> ArcEnd {
        match self {
            ArcEnd::Head => ArcEnd::Tail,
            ArcEnd::Tail => ArcEnd::Head,
        }
    }
}

impl fmt::Display for ArcEnd {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ArcEnd::Head => write!(f, "head"),
            ArcEnd::Tail => write!(f, "tail"),
        }
    }
}

/// An arc end attached to a node, as seen from the node
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Connection {
    pub arc: ArcId,
    pub end: ArcEnd,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NodeInst {
    pub name: String,
    pub parent: CellId,
    pub proto: NodePrototype,
    pub geometry: NodeGeometry,
    /// Hard lock: propagation never moves this node on its own
    pub locked: bool,
    /// Change-clock stamp of the last pass that modified this node
    pub stamp: u64,
    pub connections: Vec<Connection>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ArcEndpoint {
    pub node: NodeId,
    pub port: PortId,
    pub location: Point,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ArcInst {
    pub name: Option<String>,
    pub parent: CellId,
    pub proto: ArcProtoId,
    /// Head and tail, in that order
    pub ends: [ArcEndpoint; 2],
    pub width: f64,
    pub rigid: bool,
    pub fixed_angle: bool,
    pub slidable: bool,
    pub negated: [bool; 2],
    /// Direction head to tail in tenths of a degree; kept when the arc
    /// collapses to zero length
    pub angle: i32,
    /// Change-clock stamp; also encodes the temporary rigidity overrides
    pub stamp: u64,
    pub variables: BTreeMap<String, String>,
}

impl ArcInst {
    pub fn end(&self, end: ArcEnd) -> &ArcEndpoint {
        &self.ends[end.index()]
    }

    pub fn head(&self) -> &ArcEndpoint {
        &self.ends[0]
    }

    pub fn tail(&self) -> &ArcEndpoint {
        &self.ends[1]
    }

    /// Both ends attach to the same node
    pub fn is_interior(&self) -> bool {
        self.ends[0].node == self.ends[1].node
    }

    pub fn length(&self) -> f64 {
        self.ends[0].location.distance(self.ends[1].location)
    }
}

/// Parameters for creating a node instance
#[derive(Debug, Clone, PartialEq)]
pub struct NewNode {
    pub name: String,
    pub proto: NodePrototype,
    pub geometry: NodeGeometry,
    pub locked: bool,
}

/// Parameters for creating an arc instance
#[derive(Debug, Clone, PartialEq)]
pub struct NewArc {
    pub name: Option<String>,
    pub proto: ArcProtoId,
    pub head: ArcEndpoint,
    pub tail: ArcEndpoint,
    /// Falls back to the prototype's default width
    pub width: Option<f64>,
    pub rigid: bool,
    pub fixed_angle: bool,
    pub slidable: bool,
    pub negated: [bool; 2],
    /// Used only when the arc starts with zero length
    pub angle: i32,
    pub variables: BTreeMap<String, String>,
}

impl NewArc {
    pub fn new(proto: ArcProtoId, head: ArcEndpoint, tail: ArcEndpoint) -> Self {
        Self {
            name: None,
            proto,
            head,
            tail,
            width: None,
            rigid: false,
            fixed_angle: false,
            slidable: false,
            negated: [false, false],
            angle: 0,
            variables: BTreeMap::new(),
        }
    }
}

/// The complete database: technology plus cell hierarchy
#[derive(Debug, Clone, Default)]
pub struct Design {
    primitives: Vec<Primitive>,
    arc_protos: Vec<ArcProto>,
    cells: Vec<Cell>,
    nodes: Vec<Option<NodeInst>>,
    arcs: Vec<Option<ArcInst>>,
    tolerance: f64,
}

impl Design {
    pub fn new() -> Self {
        Self {
            tolerance: EPSILON,
            ..Self::default()
        }
    }

    /// Tolerance used when validating arc endpoints against ports
    pub fn tolerance(&self) -> f64 {
        self.tolerance
    }

    pub fn set_tolerance(&mut self, tolerance: f64) {
        self.tolerance = tolerance;
    }

    // ------------------------------------------------------------------
    // Technology
    // ------------------------------------------------------------------

    pub fn add_primitive(&mut self, primitive: Primitive) -> PrimitiveId {
        self.primitives.push(primitive);
        PrimitiveId(self.primitives.len() - 1)
    }

    pub fn add_arc_proto(&mut self, proto: ArcProto) -> ArcProtoId {
        self.arc_protos.push(proto);
        ArcProtoId(self.arc_protos.len() - 1)
    }

    pub fn primitive(&self, id: PrimitiveId) -> Result<&Primitive, DesignError> {
        self.primitives
            .get(id.0)
            .ok_or(DesignError::UnknownPrimitive(id))
    }

    pub fn arc_proto(&self, id: ArcProtoId) -> Result<&ArcProto, DesignError> {
        self.arc_protos
            .get(id.0)
            .ok_or(DesignError::UnknownArcProto(id))
    }

    pub fn primitives(&self) -> impl Iterator<Item = &Primitive> {
        self.primitives.iter()
    }

    pub fn arc_protos(&self) -> impl Iterator<Item = &ArcProto> {
        self.arc_protos.iter()
    }

    pub fn find_primitive(&self, name: &str) -> Option<PrimitiveId> {
        self.primitives
            .iter()
            .position(|p| p.name == name)
            .map(PrimitiveId)
    }

    pub fn find_arc_proto(&self, name: &str) -> Option<ArcProtoId> {
        self.arc_protos
            .iter()
            .position(|p| p.name == name)
            .map(ArcProtoId)
    }

    // ------------------------------------------------------------------
    // Cells
    // ------------------------------------------------------------------

    pub fn add_cell(&mut self, name: impl Into<String>) -> CellId {
        self.cells.push(Cell {
            name: name.into(),
            nodes: Vec::new(),
            arcs: Vec::new(),
            exports: Vec::new(),
            bounds: BoundingBox::zero(),
            instances: Vec::new(),
            locked_instances: false,
            icon_of: None,
        });
        CellId(self.cells.len() - 1)
    }

    pub fn cell(&self, id: CellId) -> Result<&Cell, DesignError> {
        self.cells.get(id.0).ok_or(DesignError::UnknownCell(id))
    }

    pub fn cell_mut(&mut self, id: CellId) -> Result<&mut Cell, DesignError> {
        self.cells.get_mut(id.0).ok_or(DesignError::UnknownCell(id))
    }

    pub fn cell_ids(&self) -> impl Iterator<Item = CellId> {
        (0..self.cells.len()).map(CellId)
    }

    pub fn cell_count(&self) -> usize {
        self.cells.len()
    }

    pub fn find_cell(&self, name: &str) -> Option<CellId> {
        self.cells.iter().position(|c| c.name == name).map(CellId)
    }

    pub fn add_export(
        &mut self,
        cell: CellId,
        name: impl Into<String>,
        node: NodeId,
        port: PortId,
    ) -> Result<PortId, DesignError> {
        let name = name.into();
        let inst = self.node(node)?;
        if inst.parent != cell {
            return Err(DesignError::ForeignNode {
                node: inst.name.clone(),
                cell: self.cell(cell)?.name.clone(),
            });
        }
        self.check_port(node, port)?;
        let cell_ref = self.cell_mut(cell)?;
        if cell_ref.exports.iter().any(|e| e.name == name) {
            return Err(DesignError::DuplicateName {
                name,
                cell: cell_ref.name.clone(),
            });
        }
        cell_ref.exports.push(Export { name, node, port });
        Ok(PortId(cell_ref.exports.len() - 1))
    }

    /// Node instances of `cell` placed inside the cell it is the icon of
    pub fn is_icon_self_reference(&self, node: NodeId) -> Result<bool, DesignError> {
        let inst = self.node(node)?;
        match inst.proto {
            NodePrototype::Cell(sub) => Ok(self.cell(sub)?.icon_of == Some(inst.parent)),
            NodePrototype::Primitive(_) => Ok(false),
        }
    }

    /// Instances of `cell` that carry a real geometric dependency
    pub fn instances_of(&self, cell: CellId) -> Result<Vec<NodeId>, DesignError> {
        let mut result = Vec::new();
        for &inst in &self.cell(cell)?.instances {
            if !self.is_icon_self_reference(inst)? {
                result.push(inst);
            }
        }
        Ok(result)
    }

    /// Union of every node box and arc extent in the cell
    pub fn compute_cell_bounds(&self, cell: CellId) -> Result<BoundingBox, DesignError> {
        let cell_ref = self.cell(cell)?;
        let mut bounds: Option<BoundingBox> = None;
        for &node in &cell_ref.nodes {
            let b = self.node_bounds(node)?;
            bounds = Some(bounds.map_or(b, |acc| acc.union(&b)));
        }
        for &arc in &cell_ref.arcs {
            let a = self.arc(arc)?;
            let b = BoundingBox::from_corners(a.ends[0].location, a.ends[1].location)
                .inflate(a.width / 2.0);
            bounds = Some(bounds.map_or(b, |acc| acc.union(&b)));
        }
        Ok(bounds.unwrap_or_else(BoundingBox::zero))
    }

    // ------------------------------------------------------------------
    // Nodes
    // ------------------------------------------------------------------

    pub fn add_node(&mut self, cell: CellId, new: NewNode) -> Result<NodeId, DesignError> {
        match new.proto {
            NodePrototype::Primitive(p) => {
                self.primitive(p)?;
            }
            NodePrototype::Cell(c) => {
                self.cell(c)?;
            }
        }
        let cell_ref = self.cell(cell)?;
        if cell_ref
            .nodes
            .iter()
            .filter_map(|n| self.nodes.get(n.0).and_then(|n| n.as_ref()))
            .any(|n| n.name == new.name)
        {
            return Err(DesignError::DuplicateName {
                name: new.name,
                cell: cell_ref.name.clone(),
            });
        }
        let id = NodeId(self.nodes.len());
        self.nodes.push(Some(NodeInst {
            name: new.name,
            parent: cell,
            proto: new.proto,
            geometry: new.geometry,
            locked: new.locked,
            stamp: 0,
            connections: Vec::new(),
        }));
        self.cell_mut(cell)?.nodes.push(id);
        if let NodePrototype::Cell(sub) = new.proto {
            self.cell_mut(sub)?.instances.push(id);
        }
        Ok(id)
    }

    /// Remove a node that has no arcs left; used when undoing its creation
    pub fn remove_node(&mut self, id: NodeId) -> Result<NodeInst, DesignError> {
        let inst = self.node(id)?;
        if !inst.connections.is_empty() {
            return Err(DesignError::NodeInUse(inst.name.clone()));
        }
        let parent = inst.parent;
        let proto = inst.proto;
        self.cell_mut(parent)?.nodes.retain(|n| *n != id);
        self.cell_mut(parent)?.exports.retain(|e| e.node != id);
        if let NodePrototype::Cell(sub) = proto {
            self.cell_mut(sub)?.instances.retain(|n| *n != id);
        }
        self.nodes
            .get_mut(id.0)
            .and_then(Option::take)
            .ok_or(DesignError::UnknownNode(id))
    }

    pub fn node(&self, id: NodeId) -> Result<&NodeInst, DesignError> {
        self.nodes
            .get(id.0)
            .and_then(|n| n.as_ref())
            .ok_or(DesignError::UnknownNode(id))
    }

    pub fn node_mut(&mut self, id: NodeId) -> Result<&mut NodeInst, DesignError> {
        self.nodes
            .get_mut(id.0)
            .and_then(|n| n.as_mut())
            .ok_or(DesignError::UnknownNode(id))
    }

    pub fn find_node(&self, cell: CellId, name: &str) -> Option<NodeId> {
        let cell_ref = self.cells.get(cell.0)?;
        cell_ref
            .nodes
            .iter()
            .copied()
            .find(|n| self.node(*n).map(|n| n.name == name).unwrap_or(false))
    }

    /// Low-level geometry change; no stamping or undo bookkeeping
    pub fn set_node_geometry(
        &mut self,
        id: NodeId,
        geometry: NodeGeometry,
    ) -> Result<(), DesignError> {
        self.node_mut(id)?.geometry = geometry;
        Ok(())
    }

    pub fn node_has_exports(&self, id: NodeId) -> Result<bool, DesignError> {
        let parent = self.node(id)?.parent;
        Ok(self.cell(parent)?.exports.iter().any(|e| e.node == id))
    }

    /// Whether the node is an instance of a primitive with the pin function
    pub fn is_pin(&self, id: NodeId) -> Result<bool, DesignError> {
        match self.node(id)?.proto {
            NodePrototype::Primitive(p) => {
                Ok(self.primitive(p)?.function == PrimitiveFunction::Pin)
            }
            NodePrototype::Cell(_) => Ok(false),
        }
    }

    pub fn port_name(&self, node: NodeId, port: PortId) -> Result<&str, DesignError> {
        let inst = self.node(node)?;
        let name = match inst.proto {
            NodePrototype::Primitive(p) => self
                .primitive(p)?
                .ports
                .get(port.0)
                .map(|p| p.name.as_str()),
            NodePrototype::Cell(c) => self.cell(c)?.exports.get(port.0).map(|e| e.name.as_str()),
        };
        name.ok_or_else(|| DesignError::UnknownPort {
            node: inst.name.clone(),
            port: port.0,
        })
    }

    pub fn find_port(&self, node: NodeId, name: &str) -> Result<Option<PortId>, DesignError> {
        let index = match self.node(node)?.proto {
            NodePrototype::Primitive(p) => {
                self.primitive(p)?.ports.iter().position(|p| p.name == name)
            }
            NodePrototype::Cell(c) => self.cell(c)?.exports.iter().position(|e| e.name == name),
        };
        Ok(index.map(PortId))
    }

    fn check_port(&self, node: NodeId, port: PortId) -> Result<(), DesignError> {
        self.port_name(node, port).map(|_| ())
    }

    /// Box of a node in its parent's coordinates
    pub fn node_bounds(&self, id: NodeId) -> Result<BoundingBox, DesignError> {
        let inst = self.node(id)?;
        let local = match inst.proto {
            NodePrototype::Primitive(_) => {
                let (w, h) = inst.geometry.size.abs();
                BoundingBox::new(-w / 2.0, -h / 2.0, w, h)
            }
            NodePrototype::Cell(c) => self.cell(c)?.bounds,
        };
        Ok(Transform::for_node(&inst.geometry).transform_bounds(&local))
    }

    /// Short human-readable path for diagnostics, e.g. `top:inv1`
    pub fn describe_node(&self, id: NodeId) -> String {
        match self.node(id) {
            Ok(n) => match self.cell(n.parent) {
                Ok(c) => format!("{}:{}", c.name, n.name),
                Err(_) => n.name.clone(),
            },
            Err(_) => id.to_string(),
        }
    }

    pub fn describe_arc(&self, id: ArcId) -> String {
        match self.arc(id) {
            Ok(a) => {
                let cell = self
                    .cell(a.parent)
                    .map(|c| c.name.as_str())
                    .unwrap_or("?");
                match &a.name {
                    Some(name) => format!("{}:{}", cell, name),
                    None => format!("{}:{}", cell, id),
                }
            }
            Err(_) => id.to_string(),
        }
    }

    // ------------------------------------------------------------------
    // Ports
    // ------------------------------------------------------------------

    /// Port polygon in the coordinates of the node's parent, using the
    /// node geometry supplied by `geometry_of` at every level of the export
    /// chain. `geometry_of(node, depth)` returns `None` to mean "use the
    /// current geometry"; depth 0 is the node the port was asked for.
    pub fn port_polygon_with<F>(
        &self,
        node: NodeId,
        port: PortId,
        geometry_of: F,
    ) -> Result<Polygon, DesignError>
    where
        F: Fn(NodeId, usize) -> Option<NodeGeometry>,
    {
        let mut accumulated = Transform::IDENTITY;
        let mut node = node;
        let mut port = port;
        for depth in 0..MAX_EXPORT_DEPTH {
            let inst = self.node(node)?;
            let geometry = geometry_of(node, depth).unwrap_or(inst.geometry);
            accumulated = Transform::for_node(&geometry).then(&accumulated);
            match inst.proto {
                NodePrototype::Cell(cell) => {
                    let export = self.cell(cell)?.exports.get(port.0).ok_or_else(|| {
                        DesignError::UnknownPort {
                            node: inst.name.clone(),
                            port: port.0,
                        }
                    })?;
                    node = export.node;
                    port = export.port;
                }
                NodePrototype::Primitive(prim) => {
                    let shape = self
                        .primitive(prim)?
                        .ports
                        .get(port.0)
                        .ok_or_else(|| DesignError::UnknownPort {
                            node: inst.name.clone(),
                            port: port.0,
                        })?
                        .shape;
                    let local = Polygon::from_box(&shape.local_box(geometry.size));
                    return Ok(accumulated.transform_polygon(&local));
                }
            }
        }
        Err(DesignError::ExportChainTooDeep(self.describe_node(node)))
    }

    /// Current port polygon in the node's parent coordinates
    pub fn port_polygon(&self, node: NodeId, port: PortId) -> Result<Polygon, DesignError> {
        self.port_polygon_with(node, port, |_, _| None)
    }

    // ------------------------------------------------------------------
    // Arcs
    // ------------------------------------------------------------------

    pub fn add_arc(&mut self, cell: CellId, new: NewArc) -> Result<ArcId, DesignError> {
        let proto = self.arc_proto(new.proto)?.clone();
        let cell_name = self.cell(cell)?.name.clone();
        for (end, endpoint) in [(ArcEnd::Head, &new.head), (ArcEnd::Tail, &new.tail)] {
            let inst = self.node(endpoint.node)?;
            if inst.parent != cell {
                return Err(DesignError::CrossCellArc { cell: cell_name });
            }
            let polygon = self.port_polygon(endpoint.node, endpoint.port)?;
            if !polygon.contains(endpoint.location, self.tolerance) {
                return Err(DesignError::EndpointOutsidePort {
                    arc: new.name.clone().unwrap_or_else(|| proto.name.clone()),
                    end,
                    x: endpoint.location.x,
                    y: endpoint.location.y,
                    port: self.port_name(endpoint.node, endpoint.port)?.to_string(),
                });
            }
        }
        if let Some(name) = &new.name {
            if self.find_arc(cell, name).is_some() {
                return Err(DesignError::DuplicateName {
                    name: name.clone(),
                    cell: cell_name,
                });
            }
        }
        let vector = new.tail.location - new.head.location;
        let angle = if vector.length() > self.tolerance {
            angle_of(vector)
        } else {
            new.angle.rem_euclid(3600)
        };
        let id = ArcId(self.arcs.len());
        self.arcs.push(Some(ArcInst {
            name: new.name,
            parent: cell,
            proto: new.proto,
            ends: [new.head, new.tail],
            width: new.width.unwrap_or(proto.default_width),
            rigid: new.rigid,
            fixed_angle: new.fixed_angle,
            slidable: new.slidable,
            negated: new.negated,
            angle,
            stamp: 0,
            variables: new.variables,
        }));
        self.attach_arc(id)?;
        Ok(id)
    }

    fn attach_arc(&mut self, id: ArcId) -> Result<(), DesignError> {
        let arc = self.arc(id)?;
        let parent = arc.parent;
        let [head, tail] = arc.ends;
        self.node_mut(head.node)?.connections.push(Connection {
            arc: id,
            end: ArcEnd::Head,
        });
        self.node_mut(tail.node)?.connections.push(Connection {
            arc: id,
            end: ArcEnd::Tail,
        });
        self.cell_mut(parent)?.arcs.push(id);
        Ok(())
    }

    fn detach_arc(&mut self, id: ArcId) -> Result<(), DesignError> {
        let arc = self.arc(id)?;
        let parent = arc.parent;
        let nodes = [arc.ends[0].node, arc.ends[1].node];
        for node in nodes {
            self.node_mut(node)?.connections.retain(|c| c.arc != id);
        }
        self.cell_mut(parent)?.arcs.retain(|a| *a != id);
        Ok(())
    }

    /// Delete an arc, returning its last state
    pub fn kill_arc(&mut self, id: ArcId) -> Result<ArcInst, DesignError> {
        self.detach_arc(id)?;
        self.arcs
            .get_mut(id.0)
            .and_then(Option::take)
            .ok_or(DesignError::UnknownArc(id))
    }

    /// Put a killed arc back under its old id
    pub fn restore_arc(&mut self, id: ArcId, arc: ArcInst) -> Result<(), DesignError> {
        let slot = self.arcs.get_mut(id.0).ok_or(DesignError::UnknownArc(id))?;
        *slot = Some(arc);
        self.attach_arc(id)
    }

    pub fn arc(&self, id: ArcId) -> Result<&ArcInst, DesignError> {
        self.arcs
            .get(id.0)
            .and_then(|a| a.as_ref())
            .ok_or(DesignError::UnknownArc(id))
    }

    pub fn arc_mut(&mut self, id: ArcId) -> Result<&mut ArcInst, DesignError> {
        self.arcs
            .get_mut(id.0)
            .and_then(|a| a.as_mut())
            .ok_or(DesignError::UnknownArc(id))
    }

    pub fn find_arc(&self, cell: CellId, name: &str) -> Option<ArcId> {
        let cell_ref = self.cells.get(cell.0)?;
        cell_ref.arcs.iter().copied().find(|a| {
            self.arc(*a)
                .map(|a| a.name.as_deref() == Some(name))
                .unwrap_or(false)
        })
    }

    /// Low-level endpoint change; the recorded angle follows the new
    /// direction unless the arc collapses to a point
    pub fn set_arc_ends(&mut self, id: ArcId, head: Point, tail: Point) -> Result<(), DesignError> {
        let tolerance = self.tolerance;
        let arc = self.arc_mut(id)?;
        arc.ends[0].location = head;
        arc.ends[1].location = tail;
        if (tail - head).length() > tolerance {
            arc.angle = angle_of(tail - head);
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // Connectivity
    // ------------------------------------------------------------------

    /// Electrical nets of a cell: groups of `node.port` names joined by
    /// arcs. Pins conduct but are left out of the listing, so bending a
    /// wire through pins does not change the result.
    pub fn nets(&self, cell: CellId) -> Result<Vec<Vec<String>>, DesignError> {
        let cell_ref = self.cell(cell)?;
        let mut index: HashMap<(NodeId, PortId), usize> = HashMap::new();
        let mut parent: Vec<usize> = Vec::new();

        fn find(parent: &mut [usize], i: usize) -> usize {
            let mut root = i;
            while parent[root] != root {
                root = parent[root];
            }
            let mut cur = i;
            while parent[cur] != root {
                let next = parent[cur];
                parent[cur] = root;
                cur = next;
            }
            root
        }

        let mut slot = |key: (NodeId, PortId), parent: &mut Vec<usize>| -> usize {
            *index.entry(key).or_insert_with(|| {
                parent.push(parent.len());
                parent.len() - 1
            })
        };

        for &arc in &cell_ref.arcs {
            let a = self.arc(arc)?;
            let h = slot((a.ends[0].node, a.ends[0].port), &mut parent);
            let t = slot((a.ends[1].node, a.ends[1].port), &mut parent);
            let (rh, rt) = (find(&mut parent, h), find(&mut parent, t));
            parent[rh] = rt;
        }

        let mut groups: BTreeMap<usize, BTreeSet<String>> = BTreeMap::new();
        let keys: Vec<((NodeId, PortId), usize)> = index.iter().map(|(k, v)| (*k, *v)).collect();
        for ((node, port), i) in keys {
            let root = find(&mut parent, i);
            let entry = groups.entry(root).or_default();
            if !self.is_pin(node)? {
                entry.insert(format!("{}.{}", self.node(node)?.name, self.port_name(node, port)?));
            }
        }
        let mut nets: Vec<Vec<String>> = groups
            .into_values()
            .filter(|g| !g.is_empty())
            .map(|g| g.into_iter().collect())
            .collect();
        nets.sort();
        Ok(nets)
    }
}
