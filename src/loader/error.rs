//! Error types for building a design from a document

use thiserror::Error;

use crate::design::DesignError;
use crate::error::render_report;
use crate::parser::ast::Span;

/// Errors that can occur while loading a document
#[derive(Debug, Error, Clone, PartialEq)]
pub enum LoadError {
    /// Reference to a name that was never declared
    #[error("undefined {kind} '{name}'")]
    Undefined {
        kind: &'static str,
        name: String,
        span: Span,
        suggestions: Vec<String>,
    },

    #[error("duplicate {kind} '{name}'")]
    Duplicate {
        kind: &'static str,
        name: String,
        span: Span,
    },

    #[error("unknown modifier '{key}' on {target}")]
    UnknownModifier {
        key: String,
        target: &'static str,
        span: Span,
        suggestions: Vec<String>,
    },

    #[error("modifier '{key}' expects {expected}")]
    InvalidValue {
        key: String,
        expected: &'static str,
        span: Span,
    },

    /// A cell instantiates itself, directly or through other cells
    #[error("recursive instantiation: {}", cycle.join(" -> "))]
    RecursiveInstance { cycle: Vec<String>, span: Span },

    /// The database refused the construct
    #[error("{source}")]
    Design { source: DesignError, span: Span },
}

impl LoadError {
    pub fn undefined(
        kind: &'static str,
        name: impl Into<String>,
        span: Span,
        suggestions: Vec<String>,
    ) -> Self {
        Self::Undefined {
            kind,
            name: name.into(),
            span,
            suggestions,
        }
    }

    pub fn duplicate(kind: &'static str, name: impl Into<String>, span: Span) -> Self {
        Self::Duplicate {
            kind,
            name: name.into(),
            span,
        }
    }

    pub fn invalid(key: impl Into<String>, expected: &'static str, span: Span) -> Self {
        Self::InvalidValue {
            key: key.into(),
            expected,
            span,
        }
    }

    pub fn span(&self) -> &Span {
        match self {
            Self::Undefined { span, .. }
            | Self::Duplicate { span, .. }
            | Self::UnknownModifier { span, .. }
            | Self::InvalidValue { span, .. }
            | Self::RecursiveInstance { span, .. }
            | Self::Design { span, .. } => span,
        }
    }

    pub fn suggestions(&self) -> &[String] {
        match self {
            Self::Undefined { suggestions, .. } | Self::UnknownModifier { suggestions, .. } => {
                suggestions
            }
            _ => &[],
        }
    }

    /// Format the error with source context using ariadne
    pub fn format(&self, source: &str, filename: &str) -> String {
        let message = self.to_string();
        let label = match self.suggestions() {
            [] => message.clone(),
            names => format!("{}\nDid you mean: {}?", message, names.join(", ")),
        };
        render_report(source, filename, self.span(), &message, &label)
    }
}

/// Attach a source span to a database error
pub(crate) fn at(span: &Span) -> impl Fn(DesignError) -> LoadError + '_ {
    move |source| LoadError::Design {
        source,
        span: span.clone(),
    }
}
