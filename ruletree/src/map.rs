//! Orchestration for `ruletree map` and `ruletree check`.

use std::path::{Path, PathBuf};

use anyhow::Context;
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, instrument};

use crate::core::builder::RuleBuilder;
use crate::core::error::RuleError;
use crate::core::node::MapperNode;
use crate::core::path::PathEvaluator;
use crate::core::spec::RuleSpec;
use crate::exit_codes;
use crate::io::config::{RuletreeConfig, load_config};
use crate::io::documents::{list_inputs, output_path, read_document, write_document};
use crate::io::rules_store::load_rules;

/// Command failure, split by the exit code it maps to.
#[derive(Debug, Error)]
pub enum CommandError {
    /// Rules or configuration could not be loaded or built.
    #[error("invalid rules or configuration")]
    Invalid(#[source] anyhow::Error),
    /// A document could not be read, mapped or written.
    #[error("mapping failed")]
    Failed(#[source] anyhow::Error),
}

impl CommandError {
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Invalid(_) => exit_codes::INVALID,
            Self::Failed(_) => exit_codes::FAILED,
        }
    }
}

/// Paths for one `ruletree map` invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MapRequest {
    pub config: PathBuf,
    pub rules: PathBuf,
    pub input: PathBuf,
    pub output: PathBuf,
}

/// Summary of a completed `ruletree map`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MapOutcome {
    /// Documents read and written.
    pub documents: usize,
    /// Documents whose result was the drop signal (written as `null`).
    pub dropped: usize,
}

/// Summary of a successful `ruletree check`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CheckOutcome {
    pub routing: usize,
    pub leaves: usize,
}

impl CheckOutcome {
    pub fn nodes(&self) -> usize {
        self.routing + self.leaves
    }

    fn count(&mut self, node: &MapperNode) {
        match node {
            MapperNode::Routing(routing) => {
                self.routing += 1;
                for child in routing.children() {
                    self.count(child);
                }
            }
            MapperNode::Leaf(_) => self.leaves += 1,
        }
    }
}

/// Compile `spec` with the evaluator, registry, variables and layout that
/// `config` describes. The root must be a single rule.
pub fn build_tree(config: &RuletreeConfig, spec: &RuleSpec) -> Result<MapperNode, RuleError> {
    let evaluator = PathEvaluator::new(config.layout.discriminator.as_str());
    let registry = config.registry();
    RuleBuilder::new(&evaluator, &registry)
        .with_variables(config.variables.clone())
        .with_layout(config.layout.clone())
        .build_root(spec)
}

fn prepare(config: &Path, rules: &Path) -> Result<MapperNode, CommandError> {
    let config = load_config(config).map_err(CommandError::Invalid)?;
    let spec = load_rules(rules).map_err(CommandError::Invalid)?;
    build_tree(&config, &spec)
        .with_context(|| format!("build rules {}", rules.display()))
        .map_err(CommandError::Invalid)
}

/// Build the rule tree without mapping anything.
#[instrument(skip_all)]
pub fn check_rules(config: &Path, rules: &Path) -> Result<CheckOutcome, CommandError> {
    let root = prepare(config, rules)?;
    let mut outcome = CheckOutcome::default();
    outcome.count(&root);
    Ok(outcome)
}

/// Map every input document through the rule tree.
///
/// Each document is its own context. Files are processed in order and the
/// first failure stops the run; outputs already written are kept.
#[instrument(skip_all)]
pub fn map_documents(request: &MapRequest) -> Result<MapOutcome, CommandError> {
    let root = prepare(&request.config, &request.rules)?;
    let inputs = list_inputs(&request.input).map_err(CommandError::Failed)?;
    let into_directory = request.input.is_dir();

    let mut outcome = MapOutcome::default();
    for input in &inputs {
        let target =
            output_path(&request.output, input, into_directory).map_err(CommandError::Failed)?;
        let mapped = map_file(&root, input, &target).map_err(CommandError::Failed)?;
        outcome.documents += 1;
        if mapped.is_null() {
            outcome.dropped += 1;
        }
    }
    debug!(
        documents = outcome.documents,
        dropped = outcome.dropped,
        "mapped documents"
    );
    Ok(outcome)
}

fn map_file(root: &MapperNode, input: &Path, target: &Path) -> anyhow::Result<Value> {
    let mut document = read_document(input)?;
    let context = document.clone();
    let mapped = root
        .execute(&mut document, &context)
        .with_context(|| format!("map {}", input.display()))?;
    write_document(target, &mapped)?;
    debug!(input = %input.display(), output = %target.display(), "wrote document");
    Ok(mapped)
}
