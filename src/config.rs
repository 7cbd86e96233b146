//! Configuration for the propagation engine and the command line front end
//!
//! Settings can be built in code with the `with_*` methods or loaded from a
//! TOML file:
//!
//! ```toml
//! [propagation]
//! move_locked_primitives = false
//! tolerance = 1e-6
//!
//! [logging]
//! filter = "warn"
//! ```

use std::path::Path;

use serde::Deserialize;
use thiserror::Error;

use crate::design::EPSILON;

/// Errors that can occur when loading configuration files
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    IoError(#[from] std::io::Error),
    #[error("Failed to parse config TOML: {0}")]
    ParseError(#[from] toml::de::Error),
    #[error("tolerance must be a positive finite number, got {0}")]
    InvalidTolerance(f64),
}

/// Options that change how edits propagate
#[derive(Debug, Clone, PartialEq)]
pub struct PropagationConfig {
    /// Whether nodes of locked primitives may be moved by propagation
    pub move_locked_primitives: bool,

    /// Distance under which two coordinates are considered equal
    pub tolerance: f64,
}

impl Default for PropagationConfig {
    fn default() -> Self {
        Self {
            move_locked_primitives: false,
            tolerance: EPSILON,
        }
    }
}

impl PropagationConfig {
    /// Create a new configuration with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Allow or forbid moving locked primitives
    pub fn with_move_locked_primitives(mut self, allow: bool) -> Self {
        self.move_locked_primitives = allow;
        self
    }

    /// Set the geometric comparison tolerance
    pub fn with_tolerance(mut self, tolerance: f64) -> Self {
        self.tolerance = tolerance;
        self
    }
}

/// Complete settings file: engine options plus the log filter
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Config {
    pub propagation: PropagationConfig,
    /// `tracing_subscriber::EnvFilter` directive, e.g. `"debug"`
    pub log_filter: Option<String>,
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct TomlConfig {
    propagation: Option<TomlPropagation>,
    logging: Option<TomlLogging>,
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct TomlPropagation {
    move_locked_primitives: Option<bool>,
    tolerance: Option<f64>,
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct TomlLogging {
    filter: Option<String>,
}

impl Config {
    /// Load configuration from a TOML file
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_str(&content)
    }

    /// Load configuration from a TOML string; missing keys keep defaults
    #[allow(clippy::should_implement_trait)]
    pub fn from_str(content: &str) -> Result<Self, ConfigError> {
        let parsed: TomlConfig = toml::from_str(content)?;
        let mut propagation = PropagationConfig::default();
        if let Some(p) = parsed.propagation {
            if let Some(allow) = p.move_locked_primitives {
                propagation = propagation.with_move_locked_primitives(allow);
            }
            if let Some(tolerance) = p.tolerance {
                if !(tolerance.is_finite() && tolerance > 0.0) {
                    return Err(ConfigError::InvalidTolerance(tolerance));
                }
                propagation = propagation.with_tolerance(tolerance);
            }
        }
        Ok(Config {
            propagation,
            log_filter: parsed.logging.and_then(|l| l.filter),
        })
    }
}
