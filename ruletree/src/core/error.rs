//! Error type shared by the rule-tree builder and the execution engine.
//!
//! Build-time failures (`Configuration`, `Expression`) surface before any
//! document is touched. Execution failures (`Predicate`, `Transform`) wrap the
//! caller-supplied callable's error with the label of the node that ran it and
//! are never caught inside the engine.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum RuleError {
    /// A rule spec matches none of the recognized shapes, or names something
    /// the registry cannot resolve.
    #[error("invalid rule spec at {at}: {reason}")]
    Configuration { at: String, reason: String },

    /// The expression evaluator rejected a textual predicate.
    #[error("cannot compile expression `{expression}` at {at}")]
    Expression {
        at: String,
        expression: String,
        #[source]
        source: anyhow::Error,
    },

    /// A predicate failed while classifying a document.
    #[error("predicate failed in {node}")]
    Predicate {
        node: String,
        #[source]
        source: anyhow::Error,
    },

    /// A transform failed while rewriting a document.
    #[error("transform failed in {node}")]
    Transform {
        node: String,
        #[source]
        source: anyhow::Error,
    },
}

impl RuleError {
    pub(crate) fn configuration(at: &str, reason: impl Into<String>) -> Self {
        Self::Configuration {
            at: at.to_string(),
            reason: reason.into(),
        }
    }

    /// True for errors raised while compiling a rule tree.
    pub fn is_build_error(&self) -> bool {
        matches!(self, Self::Configuration { .. } | Self::Expression { .. })
    }
}
