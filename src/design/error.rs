//! Database errors

use thiserror::Error;

use super::{ArcEnd, ArcId, ArcProtoId, CellId, NodeId, PrimitiveId};

#[derive(Debug, Error, Clone, PartialEq)]
pub enum DesignError {
    #[error("unknown {0}")]
    UnknownCell(CellId),

    #[error("unknown {0}")]
    UnknownNode(NodeId),

    #[error("unknown {0}")]
    UnknownArc(ArcId),

    #[error("unknown {0}")]
    UnknownPrimitive(PrimitiveId),

    #[error("unknown {0}")]
    UnknownArcProto(ArcProtoId),

    #[error("node '{node}' has no port #{port}")]
    UnknownPort { node: String, port: usize },

    #[error("node '{node}' does not belong to cell '{cell}'")]
    ForeignNode { node: String, cell: String },

    #[error("both ends of an arc must attach to nodes in cell '{cell}'")]
    CrossCellArc { cell: String },

    #[error("arc '{arc}' {end} end at ({x}, {y}) lies outside port '{port}'")]
    EndpointOutsidePort {
        arc: String,
        end: ArcEnd,
        x: f64,
        y: f64,
        port: String,
    },

    #[error("export chain through '{0}' does not end at a primitive")]
    ExportChainTooDeep(String),

    #[error("node '{0}' still has arcs attached")]
    NodeInUse(String),

    #[error("duplicate name '{name}' in cell '{cell}'")]
    DuplicateName { name: String, cell: String },
}
