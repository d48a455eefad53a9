//! Concrete checkers and the location breadcrumbs they share.

mod lifecycle;
mod naming;
mod references;
mod structure;
mod temporary;
mod variables;

pub use lifecycle::LifecycleUniquenessRule;
pub use naming::NamingRule;
pub use references::ReferenceRule;
pub use structure::StructureRule;
pub use temporary::TemporaryParameterRule;
pub use variables::VariableRule;

use crate::document::{
    display_name, EventDef, PresentationGraph, PresentationNode, ProjectDocument, PuzzleNode,
    ScriptDef, Stage, StateMachine, Variable,
};
use crate::resolver::ancestor_chain;
use crate::validation::{ObjectType, Site};

pub(crate) fn stage_location(doc: &ProjectDocument, stage: &Stage) -> String {
    let mut names: Vec<&str> = ancestor_chain(doc, stage)
        .into_iter()
        .map(|s| display_name(&s.name, &s.id))
        .collect();
    names.reverse();
    format!("Stage {}", names.join(" > "))
}

pub(crate) fn node_location(doc: &ProjectDocument, node: &PuzzleNode) -> String {
    let label = display_name(&node.name, &node.id);
    match doc.stage(&node.stage_id) {
        Some(stage) => format!("{} > Node '{}'", stage_location(doc, stage), label),
        None => format!("Node '{}'", label),
    }
}

pub(crate) fn machine_location(doc: &ProjectDocument, fsm: &StateMachine) -> String {
    match doc.owner_of_machine(&fsm.id) {
        Some(node) => format!("{} > FSM", node_location(doc, node)),
        None => format!("FSM '{}'", fsm.id),
    }
}

pub(crate) fn graph_location(graph: &PresentationGraph) -> String {
    format!("Presentation Graph '{}'", display_name(&graph.name, &graph.id))
}

pub(crate) fn graph_node_location(graph: &PresentationGraph, node: &PresentationNode) -> String {
    format!(
        "{} > Node '{}'",
        graph_location(graph),
        display_name(&node.name, &node.id)
    )
}

pub(crate) fn stage_site(doc: &ProjectDocument, stage: &Stage) -> Site {
    Site::new(ObjectType::Stage, &stage.id, stage_location(doc, stage))
}

pub(crate) fn node_site(doc: &ProjectDocument, node: &PuzzleNode) -> Site {
    Site::new(ObjectType::Node, &node.id, node_location(doc, node))
}

pub(crate) fn graph_site(graph: &PresentationGraph) -> Site {
    Site::new(ObjectType::PresentationGraph, &graph.id, graph_location(graph))
}

pub(crate) fn script_site(script: &ScriptDef) -> Site {
    Site::new(
        ObjectType::Script,
        &script.id,
        format!("Scripts > '{}'", display_name(&script.name, &script.id)),
    )
}

pub(crate) fn event_site(event: &EventDef) -> Site {
    Site::new(
        ObjectType::Event,
        &event.id,
        format!("Blackboard > Events > '{}'", display_name(&event.name, &event.id)),
    )
}

pub(crate) fn global_variable_site(var: &Variable) -> Site {
    Site::new(
        ObjectType::Variable,
        &var.id,
        format!("Blackboard > Globals > '{}'", display_name(&var.name, &var.id)),
    )
}

/// A stage- or node-local variable, keyed by its owner.
pub(crate) fn local_variable_site(owner_location: &str, owner_id: &str, var: &Variable) -> Site {
    Site::new(
        ObjectType::Variable,
        &var.id,
        format!(
            "{} > Variables > '{}'",
            owner_location,
            display_name(&var.name, &var.id)
        ),
    )
    .with_context(owner_id)
}

#[cfg(test)]
pub(crate) mod fixtures {
    use crate::document::ProjectDocument;
    use serde_json::{json, Value};

    /// Minimal well-formed project: one root stage, one node with a
    /// two-state machine, one script, one event, one global.
    pub fn base() -> Value {
        json!({
            "meta": {"name": "Fixture", "formatVersion": "1.0.0"},
            "stageTree": {
                "rootId": "stage_1",
                "stages": {
                    "stage_1": {"id": "stage_1", "name": "Root", "assetName": "root_stage"}
                }
            },
            "nodes": {
                "node_1": {"id": "node_1", "name": "Door", "assetName": "door",
                           "stageId": "stage_1", "stateMachineId": "fsm_1"}
            },
            "stateMachines": {
                "fsm_1": {
                    "id": "fsm_1",
                    "initialStateId": "state_1",
                    "states": {
                        "state_1": {"id": "state_1", "name": "Closed", "assetName": "closed"},
                        "state_2": {"id": "state_2", "name": "Open", "assetName": "open"}
                    },
                    "transitions": {
                        "tr_1": {"id": "tr_1", "name": "open", "fromStateId": "state_1",
                                 "toStateId": "state_2", "triggers": [{"type": "Always"}]}
                    }
                }
            },
            "blackboard": {
                "globalVariables": {
                    "var_1": {"id": "var_1", "name": "Score", "assetName": "score", "type": "Integer"}
                },
                "events": {
                    "event_1": {"id": "event_1", "name": "Knock", "assetName": "knock"}
                }
            },
            "scripts": {
                "script_1": {"id": "script_1", "name": "Play", "assetName": "play_anim",
                             "parameters": [{"name": "speed", "type": "Float"}]}
            }
        })
    }

    pub fn doc(value: Value) -> ProjectDocument {
        serde_json::from_value(value).unwrap()
    }
}
