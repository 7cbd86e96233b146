//! Error types for the propagation engine

use thiserror::Error;

use crate::design::DesignError;

/// Faults that abort a whole batch; the batch is rolled back when one occurs
#[derive(Debug, Error, Clone, PartialEq)]
pub enum PropagationError {
    #[error(transparent)]
    Design(#[from] DesignError),

    /// Cell bounds kept changing after every cell had been resized
    #[error("cell bounds did not settle after {passes} passes")]
    BoundsDiverged { passes: usize },

    #[error("{nodes} nodes were given {deltas} deltas")]
    MismatchedDeltas { nodes: usize, deltas: usize },

    /// An earlier error rolled this batch back; no further edits are accepted
    #[error("batch was aborted and rolled back")]
    BatchAborted,

    /// Rolling back after `cause` failed too, leaving the design inconsistent
    #[error("rollback after '{cause}' failed: {rollback}")]
    RollbackFailed {
        cause: Box<PropagationError>,
        rollback: DesignError,
    },
}

/// A jog that could not be built; logged, and only the one arc is abandoned
#[derive(Debug, Error, Clone, PartialEq)]
pub enum JogError {
    #[error("arc prototype '{0}' has no pin primitive to jog with")]
    NoPin(String),

    #[error(transparent)]
    Design(#[from] DesignError),
}
