//! Cell Constraints - constraint propagation for hierarchical circuit layouts
//!
//! This library keeps a hierarchical layout consistent while it is edited.
//! Moving, resizing or rotating a node drags the wires attached to it
//! according to their rigidity and fixed-angle flags, and a cell whose
//! contents changed size resizes every instance of itself, one hierarchy
//! level at a time.
//!
//! Designs can be built in code through [`design::Design`] or described in a
//! small text format and run end to end:
//!
//! ```rust
//! use cell_constraints::run;
//!
//! let output = run(r#"
//!     primitive pin [pin] { port p }
//!     arcproto metal [width: 1]
//!     cell top {
//!         node a: pin
//!         node b: pin at (10, 0)
//!         arc w: metal a -- b [rigid]
//!     }
//!     batch { move top.a [dy: 5] }
//! "#).unwrap();
//!
//! let top = output.design.find_cell("top").unwrap();
//! let b = output.design.find_node(top, "b").unwrap();
//! assert_eq!(output.design.node(b).unwrap().geometry.center.y, 5.0);
//! ```

pub mod check;
pub mod config;
pub mod constraint;
pub mod design;
pub mod dump;
pub mod error;
pub mod loader;
pub mod parser;

pub use check::{Defect, DefectCategory};
pub use config::{Config, ConfigError, PropagationConfig};
pub use constraint::{BatchReport, ConstraintEngine, NodeDelta, PropagationError};
pub use design::{Design, DesignError};
pub use error::ParseError;
pub use loader::{load, EditScript, EditStep, LoadError, LoadedDesign};
pub use parser::{parse, Document};

use thiserror::Error;

/// Errors that can occur during the run pipeline
#[derive(Debug, Error)]
pub enum RunError {
    /// Error during parsing
    #[error("parse errors: {}", format_parse_errors(.0))]
    Parse(Vec<ParseError>),

    /// Error while building the design
    #[error("load error: {0}")]
    Load(#[from] LoadError),

    /// A batch failed and was rolled back
    #[error("batch {batch} failed: {source}")]
    Propagation {
        batch: usize,
        source: PropagationError,
    },

    #[error("design error: {0}")]
    Design(#[from] DesignError),

    #[error("config error: {0}")]
    Config(#[from] ConfigError),
}

impl From<Vec<ParseError>> for RunError {
    fn from(errors: Vec<ParseError>) -> Self {
        RunError::Parse(errors)
    }
}

impl RunError {
    /// Format the error with source context where there is one
    pub fn format(&self, source: &str, filename: &str) -> String {
        match self {
            RunError::Parse(errors) => errors
                .iter()
                .map(|e| e.format(source, filename))
                .collect::<Vec<_>>()
                .join("\n"),
            RunError::Load(e) => e.format(source, filename),
            other => format!("Error: {}", other),
        }
    }
}

fn format_parse_errors(errors: &[ParseError]) -> String {
    errors
        .iter()
        .map(|e| e.to_string())
        .collect::<Vec<_>>()
        .join("; ")
}

/// The design after every batch has run
#[derive(Debug, Clone)]
pub struct RunOutput {
    pub design: Design,
    /// One report per batch, in order
    pub reports: Vec<BatchReport>,
    /// Lint findings on the final design
    pub defects: Vec<Defect>,
}

/// Parse, load and run a description with default configuration
pub fn run(source: &str) -> Result<RunOutput, RunError> {
    run_with_config(source, &PropagationConfig::default())
}

/// Parse, load and run a description
pub fn run_with_config(source: &str, config: &PropagationConfig) -> Result<RunOutput, RunError> {
    let doc = parse(source)?;
    let LoadedDesign {
        mut design,
        scripts,
    } = load(&doc)?;
    design.set_tolerance(config.tolerance);

    let mut engine = ConstraintEngine::new(config.clone());
    let mut reports = Vec::with_capacity(scripts.len());
    for (index, script) in scripts.iter().enumerate() {
        let report = run_script(&mut engine, &mut design, script).map_err(|source| {
            RunError::Propagation {
                batch: index + 1,
                source,
            }
        })?;
        reports.push(report);
    }

    let defects = check::check(&design)?;
    Ok(RunOutput {
        design,
        reports,
        defects,
    })
}

/// Run one edit script as a batch: rigidity overrides first, then all
/// moves together
pub fn run_script(
    engine: &mut ConstraintEngine,
    design: &mut Design,
    script: &EditScript,
) -> Result<BatchReport, PropagationError> {
    for step in &script.steps {
        if let EditStep::TemporaryRigidity { arc, rigid } = *step {
            engine.set_temporary_rigid(design, arc, rigid)?;
        }
    }
    let (nodes, deltas) = script.moves();
    let mut batch = engine.start_batch(design);
    batch.modify_nodes(&nodes, &deltas)?;
    batch.end_batch()
}
