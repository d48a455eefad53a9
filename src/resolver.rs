//! Scope-aware variable resolution.
//!
//! StageLocal lookups walk from the usage stage up through its ancestors
//! and stop at the first declaring stage. A variable declared only on a
//! descendant is not visible.

use std::collections::HashSet;
use thiserror::Error;

use crate::document::{non_empty, ProjectDocument, PuzzleNode, Stage, Variable, VariableScope};

/// Where a reference is being evaluated from.
#[derive(Debug, Clone, Copy, Default)]
pub struct UsageContext<'a> {
    pub stage: Option<&'a Stage>,
    pub node: Option<&'a PuzzleNode>,
}

impl<'a> UsageContext<'a> {
    pub fn for_stage(stage: &'a Stage) -> Self {
        Self { stage: Some(stage), node: None }
    }

    /// Node context; the stage is the node's owning stage when it resolves.
    pub fn for_node(doc: &'a ProjectDocument, node: &'a PuzzleNode) -> Self {
        Self {
            stage: doc.stage(&node.stage_id),
            node: Some(node),
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub enum Resolution<'a> {
    Found(&'a Variable),
    /// Temporary variables are bound at the call site.
    Dynamic,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ResolveError {
    #[error("variable is not declared in this scope")]
    Missing,
    #[error("variable is marked for delete")]
    MarkedForDelete,
}

pub fn resolve_variable<'a>(
    doc: &'a ProjectDocument,
    variable_id: &str,
    scope: VariableScope,
    ctx: UsageContext<'a>,
) -> Result<Resolution<'a>, ResolveError> {
    let found = match scope {
        VariableScope::Temporary => return Ok(Resolution::Dynamic),
        VariableScope::Global => doc.global_variable(variable_id),
        VariableScope::NodeLocal => ctx.node.and_then(|n| n.local_variables.get(variable_id)),
        VariableScope::StageLocal => ctx.stage.and_then(|stage| {
            ancestor_chain(doc, stage)
                .into_iter()
                .find_map(|s| s.local_variables.get(variable_id))
        }),
    };

    match found {
        None => Err(ResolveError::Missing),
        Some(var) if var.state.is_marked_for_delete() => Err(ResolveError::MarkedForDelete),
        Some(var) => Ok(Resolution::Found(var)),
    }
}

/// `stage` followed by its ancestors, nearest first. Stops on a broken or
/// cyclic parent link.
pub fn ancestor_chain<'a>(doc: &'a ProjectDocument, stage: &'a Stage) -> Vec<&'a Stage> {
    let mut chain = vec![stage];
    let mut seen: HashSet<&str> = HashSet::new();
    seen.insert(stage.id.as_str());

    let mut current = stage;
    while let Some(parent_id) = non_empty(current.parent_id.as_deref()) {
        if !seen.insert(parent_id) {
            break;
        }
        match doc.stage(parent_id) {
            Some(parent) => {
                chain.push(parent);
                current = parent;
            }
            None => break,
        }
    }
    chain
}
