//! Batch-scoped propagation state
//!
//! Everything that lives for exactly one batch is kept here and threaded
//! explicitly through the engine: the clock, the undo journal, deleted and
//! rigid-modified arcs, geometry snapshots, cell bookkeeping for the bounds
//! pass, the node work queue and statistics.

use std::collections::{BTreeSet, HashMap, HashSet, VecDeque};

use crate::config::PropagationConfig;
use crate::design::{
    ArcId, ArcInst, BoundingBox, CellId, Change, Design, DesignError, Journal, NodeGeometry,
    NodeId, NodePrototype,
};

use super::clock::{ArcStamp, ChangeClock};

/// Counters describing the work one batch did
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PropagationStats {
    /// Node visits taken off the work queue
    pub node_visits: usize,
    /// Nodes whose geometry was changed
    pub nodes_altered: usize,
    pub arc_moves: usize,
    pub jogs: usize,
    pub failed_jogs: usize,
    /// `ensure_arc_inst` calls that had to move an arc
    pub repairs: usize,
    /// Cells resized through the single-parent shortcut
    pub fast_path_resizes: usize,
    /// Whole-hierarchy mark/sweep passes
    pub hierarchy_sweeps: usize,
    /// Cells visited by `compute_cell`
    pub cells_examined: usize,
}

#[derive(Debug)]
pub struct PropagationContext {
    pub clock: ChangeClock,
    pub config: PropagationConfig,
    pub journal: Journal,
    /// Arcs replaced by jogs in this batch
    pub deleted_arcs: HashSet<ArcId>,
    /// Rigid arcs whose far node was moved in the current node visit
    pub rigid_modified: HashSet<ArcId>,
    /// Geometry of a node before the pass identified by the stored clock
    pass_snapshots: HashMap<NodeId, (u64, NodeGeometry)>,
    /// Geometry of a node when the batch started
    batch_snapshots: HashMap<NodeId, NodeGeometry>,
    /// Pass in which each arc's geometry was last journaled
    arc_records: HashMap<ArcId, u64>,
    /// Geometry of nodes inside a cell as last propagated to its instances
    accounted: HashMap<NodeId, NodeGeometry>,
    /// Cell bounds when the batch started
    pub remembered_bounds: HashMap<CellId, BoundingBox>,
    /// Cell bounds that instances have already been resized to
    pub settled_bounds: HashMap<CellId, BoundingBox>,
    /// Cells containing nodes or arcs modified since the last bounds pass
    pub touched_cells: BTreeSet<CellId>,
    /// Cells whose exports moved; they need a full hierarchy look
    pub forced_look: BTreeSet<CellId>,
    pub queue: VecDeque<NodeId>,
    pub stats: PropagationStats,
}

impl PropagationContext {
    /// Start a batch: advance the clock and remember every cell's bounds
    pub fn new(mut clock: ChangeClock, config: PropagationConfig, design: &Design) -> Self {
        clock.begin_batch();
        let mut remembered_bounds = HashMap::new();
        for cell in design.cell_ids() {
            if let Ok(c) = design.cell(cell) {
                remembered_bounds.insert(cell, c.bounds);
            }
        }
        Self {
            clock,
            config,
            journal: Journal::new(),
            deleted_arcs: HashSet::new(),
            rigid_modified: HashSet::new(),
            pass_snapshots: HashMap::new(),
            batch_snapshots: HashMap::new(),
            arc_records: HashMap::new(),
            accounted: HashMap::new(),
            settled_bounds: remembered_bounds.clone(),
            remembered_bounds,
            touched_cells: BTreeSet::new(),
            forced_look: BTreeSet::new(),
            queue: VecDeque::new(),
            stats: PropagationStats::default(),
        }
    }

    pub fn now(&self) -> u64 {
        self.clock.current()
    }

    /// Start a new pass within the batch
    pub fn advance(&mut self) -> u64 {
        self.clock.begin_batch()
    }

    pub fn tolerance(&self) -> f64 {
        self.config.tolerance
    }

    pub fn arc_stamp(&self, arc: &ArcInst) -> ArcStamp {
        ArcStamp::classify(arc.stamp, self.now())
    }

    /// Whether the arc belongs to the rigid class in this pass
    pub fn is_rigid(&self, arc: &ArcInst) -> bool {
        self.arc_stamp(arc).is_rigid(arc.rigid)
    }

    pub fn node_modified(&self, design: &Design, node: NodeId) -> Result<bool, DesignError> {
        Ok(design.node(node)?.stamp == self.now())
    }

    /// Journal a node's geometry before its first change in this pass
    pub fn record_node(&mut self, design: &Design, node: NodeId) -> Result<(), DesignError> {
        let geometry = design.node(node)?.geometry;
        let now = self.now();
        if self.pass_snapshots.get(&node).map(|(clock, _)| *clock) == Some(now) {
            return Ok(());
        }
        self.pass_snapshots.insert(node, (now, geometry));
        self.batch_snapshots.entry(node).or_insert(geometry);
        self.journal.record(Change::NodeGeometry {
            node,
            before: geometry,
        });
        Ok(())
    }

    /// Geometry before the current pass changed it, or the current one
    pub fn old_geometry(&self, design: &Design, node: NodeId) -> Result<NodeGeometry, DesignError> {
        match self.pass_snapshots.get(&node) {
            Some((clock, geometry)) if *clock == self.now() => Ok(*geometry),
            _ => Ok(design.node(node)?.geometry),
        }
    }

    /// Geometry at batch start, or the current one if never changed
    pub fn batch_geometry(&self, design: &Design, node: NodeId) -> Result<NodeGeometry, DesignError> {
        match self.batch_snapshots.get(&node) {
            Some(geometry) => Ok(*geometry),
            None => Ok(design.node(node)?.geometry),
        }
    }

    /// Geometry of a node below an instance boundary, as the instance's
    /// arcs currently see it
    pub fn nested_geometry(&self, design: &Design, node: NodeId) -> Result<NodeGeometry, DesignError> {
        match self.accounted.get(&node) {
            Some(geometry) => Ok(*geometry),
            None => self.batch_geometry(design, node),
        }
    }

    /// Record that every instance of `cell` has caught up with its contents
    pub fn mark_accounted(&mut self, design: &Design, cell: CellId) -> Result<(), DesignError> {
        for &node in &design.cell(cell)?.nodes {
            self.accounted.insert(node, design.node(node)?.geometry);
        }
        Ok(())
    }

    /// Journal an arc's geometry before its first change in this pass
    pub fn record_arc(&mut self, design: &Design, arc: ArcId) -> Result<(), DesignError> {
        let now = self.now();
        if self.arc_records.get(&arc) == Some(&now) {
            return Ok(());
        }
        let inst = design.arc(arc)?;
        self.journal.record(Change::ArcGeometry {
            arc,
            ends: [inst.ends[0].location, inst.ends[1].location],
            angle: inst.angle,
        });
        self.arc_records.insert(arc, now);
        Ok(())
    }

    pub fn set_cell_bounds(
        &mut self,
        design: &mut Design,
        cell: CellId,
        bounds: BoundingBox,
    ) -> Result<(), DesignError> {
        let cell_ref = design.cell_mut(cell)?;
        self.journal.record(Change::CellBounds {
            cell,
            before: cell_ref.bounds,
        });
        cell_ref.bounds = bounds;
        Ok(())
    }

    /// Lock test shared by rigid and flexible propagation
    pub fn is_locked(&self, design: &Design, node: NodeId) -> Result<bool, DesignError> {
        let inst = design.node(node)?;
        if inst.locked {
            return Ok(true);
        }
        match inst.proto {
            NodePrototype::Cell(_) => Ok(design.cell(inst.parent)?.locked_instances),
            NodePrototype::Primitive(p) => {
                Ok(design.primitive(p)?.locked && !self.config.move_locked_primitives)
            }
        }
    }
}
