//! Undo journal
//!
//! Every mutation the propagation engine makes is recorded here before it is
//! applied. Replaying the journal backwards restores the database to the
//! state it had when recording started; a [`JournalMark`] allows partial
//! rollback of a scoped region (used around jogs).

use super::{ArcId, ArcInst, BoundingBox, CellId, Design, DesignError, NodeGeometry, NodeId, Point};

/// One recorded mutation, holding the state needed to reverse it
#[derive(Debug, Clone, PartialEq)]
pub enum Change {
    NodeGeometry {
        node: NodeId,
        before: NodeGeometry,
    },
    ArcGeometry {
        arc: ArcId,
        ends: [Point; 2],
        angle: i32,
    },
    NodeCreated(NodeId),
    ArcCreated(ArcId),
    ArcKilled {
        arc: ArcId,
        inst: Box<ArcInst>,
    },
    CellBounds {
        cell: CellId,
        before: BoundingBox,
    },
}

/// Position in a journal that can be rolled back to
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct JournalMark(usize);

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Journal {
    changes: Vec<Change>,
}

impl Journal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, change: Change) {
        self.changes.push(change);
    }

    pub fn changes(&self) -> &[Change] {
        &self.changes
    }

    pub fn len(&self) -> usize {
        self.changes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }

    pub fn mark(&self) -> JournalMark {
        JournalMark(self.changes.len())
    }

    /// Undo every change recorded after `mark`, newest first
    pub fn rollback_to(&mut self, design: &mut Design, mark: JournalMark) -> Result<(), DesignError> {
        while self.changes.len() > mark.0 {
            if let Some(change) = self.changes.pop() {
                undo(design, change)?;
            }
        }
        Ok(())
    }

    /// Undo everything in the journal
    pub fn rollback(&mut self, design: &mut Design) -> Result<(), DesignError> {
        self.rollback_to(design, JournalMark(0))
    }
}

fn undo(design: &mut Design, change: Change) -> Result<(), DesignError> {
    match change {
        Change::NodeGeometry { node, before } => design.set_node_geometry(node, before),
        Change::ArcGeometry { arc, ends, angle } => {
            let inst = design.arc_mut(arc)?;
            inst.ends[0].location = ends[0];
            inst.ends[1].location = ends[1];
            inst.angle = angle;
            Ok(())
        }
        Change::NodeCreated(node) => design.remove_node(node).map(|_| ()),
        Change::ArcCreated(arc) => design.kill_arc(arc).map(|_| ()),
        Change::ArcKilled { arc, inst } => design.restore_arc(arc, *inst),
        Change::CellBounds { cell, before } => {
            design.cell_mut(cell)?.bounds = before;
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::design::{
        ArcEndpoint, ArcProto, NewArc, NewNode, NodePrototype, PortId, PortShape, Primitive,
        PrimitiveFunction, PrimitivePort, Size,
    };

    fn two_pins() -> (Design, CellId, NodeId, NodeId, ArcId) {
        let mut design = Design::new();
        let pin = design.add_primitive(Primitive {
            name: "pin".into(),
            default_size: Size::new(0.0, 0.0),
            function: PrimitiveFunction::Pin,
            locked: false,
            ports: vec![PrimitivePort {
                name: "p".into(),
                shape: PortShape::center(),
            }],
        });
        let wire = design.add_arc_proto(ArcProto {
            name: "metal".into(),
            default_width: 1.0,
            pin: Some(pin),
        });
        let cell = design.add_cell("top");
        let mut place = |name: &str, x: f64| {
            design
                .add_node(
                    cell,
                    NewNode {
                        name: name.into(),
                        proto: NodePrototype::Primitive(pin),
                        geometry: NodeGeometry::new(Point::new(x, 0.0), Size::new(0.0, 0.0), 0),
                        locked: false,
                    },
                )
                .unwrap()
        };
        let a = place("a", 0.0);
        let b = place("b", 4.0);
        let end = |node, x| ArcEndpoint {
            node,
            port: PortId(0),
            location: Point::new(x, 0.0),
        };
        let arc = design
            .add_arc(cell, NewArc::new(wire, end(a, 0.0), end(b, 4.0)))
            .unwrap();
        (design, cell, a, b, arc)
    }

    #[test]
    fn test_rollback_restores_geometry_in_reverse() {
        let (mut design, _, a, _, arc) = two_pins();
        let original = design.node(a).unwrap().geometry;
        let mut journal = Journal::new();

        journal.record(Change::NodeGeometry {
            node: a,
            before: original,
        });
        let mut moved = original;
        moved.center = Point::new(1.0, 0.0);
        design.set_node_geometry(a, moved).unwrap();

        journal.record(Change::NodeGeometry { node: a, before: moved });
        moved.center = Point::new(2.0, 0.0);
        design.set_node_geometry(a, moved).unwrap();

        journal.record(Change::ArcGeometry {
            arc,
            ends: [Point::new(0.0, 0.0), Point::new(4.0, 0.0)],
            angle: 0,
        });
        design
            .set_arc_ends(arc, Point::new(2.0, 0.0), Point::new(4.0, 0.0))
            .unwrap();

        journal.rollback(&mut design).unwrap();
        assert!(journal.is_empty());
        assert_eq!(design.node(a).unwrap().geometry, original);
        assert_eq!(design.arc(arc).unwrap().head().location, Point::new(0.0, 0.0));
    }

    #[test]
    fn test_rollback_to_mark_keeps_earlier_changes() {
        let (mut design, cell, _, _, arc) = two_pins();
        let mut journal = Journal::new();
        journal.record(Change::CellBounds {
            cell,
            before: BoundingBox::zero(),
        });
        design.cell_mut(cell).unwrap().bounds = BoundingBox::new(0.0, 0.0, 4.0, 1.0);

        let mark = journal.mark();
        let killed = design.kill_arc(arc).unwrap();
        journal.record(Change::ArcKilled {
            arc,
            inst: Box::new(killed),
        });

        journal.rollback_to(&mut design, mark).unwrap();
        assert_eq!(journal.len(), 1);
        assert!(design.arc(arc).is_ok());
        assert_eq!(design.cell(cell).unwrap().bounds.width, 4.0);
    }
}
