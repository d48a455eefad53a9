//! Structural integrity of the stage tree, state machines and
//! presentation graphs. The three passes are independent.

use std::collections::HashMap;

use super::*;
use crate::document::{non_empty, PresentationNodeKind};
use crate::traversal::find_cycles;
use crate::validation::{DiagnosticKind, Diagnostics, ValidationResult, ValidationRule};

pub struct StructureRule;

impl ValidationRule for StructureRule {
    fn name(&self) -> &'static str { "structure" }

    fn validate(&self, doc: &ProjectDocument) -> Vec<ValidationResult> {
        let mut diags = Diagnostics::new();
        check_stage_tree(doc, &mut diags);
        check_node_ownership(doc, &mut diags);
        for fsm in doc.state_machines.values() {
            check_state_machine(doc, fsm, &mut diags);
        }
        for graph in doc.presentation_graphs.values() {
            check_presentation_graph(graph, &mut diags);
        }
        check_graph_reference_cycles(doc, &mut diags);
        diags.into_results()
    }
}

fn check_stage_tree(doc: &ProjectDocument, diags: &mut Diagnostics) {
    let tree = &doc.stage_tree;
    let tree_site = Site::new(ObjectType::Stage, "stageTree", "Stage Tree");

    if tree.stages.is_empty() {
        diags.error(
            DiagnosticKind::InvalidStructure,
            &tree_site,
            "stages",
            "Project has no stages",
        );
    }

    let root_id = non_empty(tree.root_id.as_deref());
    match root_id {
        None => diags.error(
            DiagnosticKind::MissingField,
            &tree_site,
            "rootId",
            "Stage tree has no rootId",
        ),
        Some(id) => match doc.stage(id) {
            None => diags.error(
                DiagnosticKind::MissingReference,
                &tree_site,
                "rootId",
                format!("Root stage '{}' does not exist", id),
            ),
            Some(root) if non_empty(root.parent_id.as_deref()).is_some() => diags.error(
                DiagnosticKind::InvalidStructure,
                &stage_site(doc, root),
                "rootParent",
                "Root stage must not have a parent",
            ),
            Some(_) => {}
        },
    }

    for stage in tree.stages.values() {
        let site = stage_site(doc, stage);
        match non_empty(stage.parent_id.as_deref()) {
            Some(parent_id) if doc.stage(parent_id).is_none() => diags.error(
                DiagnosticKind::MissingReference,
                &site,
                "parentId",
                format!("Parent stage '{}' does not exist", parent_id),
            ),
            None if Some(stage.id.as_str()) != root_id => diags.error(
                DiagnosticKind::InvalidStructure,
                &site,
                "parentId",
                "Stage is not the root and has no parent",
            ),
            _ => {}
        }
        for child_id in &stage.children_ids {
            if doc.stage(child_id).is_none() {
                diags.error(
                    DiagnosticKind::MissingReference,
                    &site,
                    &format!("child:{}", child_id),
                    format!("Child stage '{}' does not exist", child_id),
                );
            }
        }
    }

    let starts = root_id
        .filter(|id| doc.stage(id).is_some())
        .into_iter()
        .chain(tree.stages.keys().map(String::as_str));
    let cycles = find_cycles(starts, |id| {
        doc.stage(id)
            .map(|s| {
                s.children_ids
                    .iter()
                    .map(String::as_str)
                    .filter(|c| doc.stage(c).is_some())
                    .collect::<Vec<_>>()
            })
            .unwrap_or_default()
    });
    for path in cycles {
        let Some(stage) = path.last().and_then(|id| doc.stage(id)) else {
            continue;
        };
        diags.error(
            DiagnosticKind::StructuralCycle,
            &stage_site(doc, stage),
            &format!("cycle:{}", path.join(">")),
            format!("Stage hierarchy contains a cycle: {}", path.join(" > ")),
        );
    }
}

fn check_node_ownership(doc: &ProjectDocument, diags: &mut Diagnostics) {
    let mut owners: HashMap<&str, Vec<&str>> = HashMap::new();

    for node in doc.nodes.values() {
        let site = node_site(doc, node);
        match non_empty(Some(node.stage_id.as_str())) {
            None => diags.error(
                DiagnosticKind::MissingField,
                &site,
                "stageId",
                "Node does not belong to a stage",
            ),
            Some(stage_id) if doc.stage(stage_id).is_none() => diags.error(
                DiagnosticKind::MissingReference,
                &site,
                "stageId",
                format!("Owning stage '{}' does not exist", stage_id),
            ),
            Some(_) => {}
        }

        if let Some(fsm_id) = non_empty(node.state_machine_id.as_deref()) {
            if doc.state_machine(fsm_id).is_none() {
                diags.error(
                    DiagnosticKind::MissingReference,
                    &site,
                    "stateMachineId",
                    format!("State machine '{}' does not exist", fsm_id),
                );
            } else {
                owners.entry(fsm_id).or_default().push(&node.id);
            }
        }
    }

    for fsm in doc.state_machines.values() {
        if !owners.contains_key(fsm.id.as_str()) {
            diags.warning(
                DiagnosticKind::UnreachableNode,
                &machine_site(doc, fsm),
                "owner",
                "State machine is not owned by any node",
            );
        }
    }
}

/// Machine-level findings are attached to the owning node.
fn machine_site(doc: &ProjectDocument, fsm: &StateMachine) -> Site {
    let owner_id = doc
        .owner_of_machine(&fsm.id)
        .map(|n| n.id.as_str())
        .unwrap_or(fsm.id.as_str());
    Site::new(ObjectType::Node, owner_id, machine_location(doc, fsm)).with_context(&fsm.id)
}

fn check_state_machine(doc: &ProjectDocument, fsm: &StateMachine, diags: &mut Diagnostics) {
    if fsm.states.is_empty() {
        return;
    }
    let location = machine_location(doc, fsm);

    let initial = non_empty(fsm.initial_state_id.as_deref());
    match initial {
        None => diags.error(
            DiagnosticKind::MissingField,
            &machine_site(doc, fsm),
            "initialStateId",
            "State machine has states but no initial state",
        ),
        Some(id) if !fsm.states.contains_key(id) => diags.error(
            DiagnosticKind::MissingReference,
            &machine_site(doc, fsm),
            "initialStateId",
            format!("Initial state '{}' does not exist in this state machine", id),
        ),
        Some(_) => {}
    }

    let mut in_degree: HashMap<&str, usize> = HashMap::new();

    for transition in fsm.transitions.values() {
        let site = Site::new(
            ObjectType::Transition,
            &transition.id,
            format!(
                "{} > Transition '{}'",
                location,
                display_name(&transition.name, &transition.id)
            ),
        )
        .with_context(&fsm.id);

        for (field, state_id) in [
            ("fromStateId", transition.from_state_id.as_str()),
            ("toStateId", transition.to_state_id.as_str()),
        ] {
            match non_empty(Some(state_id)) {
                None => diags.error(
                    DiagnosticKind::MissingField,
                    &site,
                    field,
                    format!("Transition has no {}", field),
                ),
                Some(id) if !fsm.states.contains_key(id) => diags.error(
                    DiagnosticKind::MissingReference,
                    &site,
                    field,
                    format!("{} '{}' does not exist in this state machine", field, id),
                ),
                Some(_) => {}
            }
        }

        if fsm.states.contains_key(transition.to_state_id.as_str()) {
            *in_degree.entry(transition.to_state_id.as_str()).or_default() += 1;
        }
    }

    for state in fsm.states.values() {
        if Some(state.id.as_str()) == initial {
            continue;
        }
        if in_degree.get(state.id.as_str()).copied().unwrap_or(0) == 0 {
            let site = Site::new(
                ObjectType::State,
                &state.id,
                format!("{} > State '{}'", location, display_name(&state.name, &state.id)),
            )
            .with_context(&fsm.id);
            diags.warning(
                DiagnosticKind::UnreachableNode,
                &site,
                "inDegree",
                "State is unreachable: no transition leads to it",
            );
        }
    }
}

fn check_presentation_graph(graph: &PresentationGraph, diags: &mut Diagnostics) {
    if graph.nodes.is_empty() {
        return;
    }
    let graph_site = graph_site(graph);

    let start = non_empty(graph.start_node_id.as_deref());
    match start {
        None => diags.error(
            DiagnosticKind::MissingField,
            &graph_site,
            "startNodeId",
            "Presentation graph has nodes but no start node",
        ),
        Some(id) if !graph.nodes.contains_key(id) => diags.error(
            DiagnosticKind::MissingReference,
            &graph_site,
            "startNodeId",
            format!("Start node '{}' does not exist in this graph", id),
        ),
        Some(_) => {}
    }

    let mut in_degree: HashMap<&str, usize> = HashMap::new();

    for node in graph.nodes.values() {
        let site = Site::new(
            ObjectType::PresentationGraph,
            &graph.id,
            graph_node_location(graph, node),
        )
        .with_context(&node.id);

        let mut valid_edges = 0;
        for next_id in &node.next_ids {
            if graph.nodes.contains_key(next_id.as_str()) {
                valid_edges += 1;
                *in_degree.entry(next_id.as_str()).or_default() += 1;
            } else {
                diags.error(
                    DiagnosticKind::MissingReference,
                    &site,
                    &format!("next:{}", next_id),
                    format!("Next node '{}' does not exist in this graph", next_id),
                );
            }
        }

        match node.kind {
            PresentationNodeKind::Branch => {
                if valid_edges < 2 {
                    diags.warning(
                        DiagnosticKind::InvalidStructure,
                        &site,
                        "branchEdges",
                        format!(
                            "Branch node should have at least 2 outgoing edges, found {}",
                            valid_edges
                        ),
                    );
                }
                if node.condition.is_none() {
                    diags.warning(
                        DiagnosticKind::MissingField,
                        &site,
                        "branchCondition",
                        "Branch node has no condition",
                    );
                }
            }
            PresentationNodeKind::Parallel => {}
            PresentationNodeKind::Unspecified => diags.error(
                DiagnosticKind::MissingField,
                &site,
                "nodeType",
                "Presentation node type is unknown",
            ),
            PresentationNodeKind::ScriptCall | PresentationNodeKind::Wait => {
                if valid_edges > 1 {
                    diags.warning(
                        DiagnosticKind::InvalidStructure,
                        &site,
                        "fanOut",
                        format!(
                            "Node has {} outgoing edges; only the first will execute",
                            valid_edges
                        ),
                    );
                }
            }
        }
    }

    for node in graph.nodes.values() {
        if Some(node.id.as_str()) == start {
            continue;
        }
        if in_degree.get(node.id.as_str()).copied().unwrap_or(0) == 0 {
            let site = Site::new(
                ObjectType::PresentationGraph,
                &graph.id,
                graph_node_location(graph, node),
            )
            .with_context(&node.id);
            diags.warning(
                DiagnosticKind::UnreachableNode,
                &site,
                "inDegree",
                "Node is unreachable: no edge leads to it",
            );
        }
    }

    let starts = start
        .filter(|id| graph.nodes.contains_key(*id))
        .into_iter()
        .chain(graph.nodes.keys().map(String::as_str));
    let cycles = find_cycles(starts, |id| {
        graph
            .nodes
            .get(id)
            .map(|n| {
                n.next_ids
                    .iter()
                    .map(String::as_str)
                    .filter(|next| graph.nodes.contains_key(*next))
                    .collect::<Vec<_>>()
            })
            .unwrap_or_default()
    });
    for path in cycles {
        let Some(node) = path.last().and_then(|id| graph.nodes.get(*id)) else {
            continue;
        };
        let site = Site::new(
            ObjectType::PresentationGraph,
            &graph.id,
            graph_node_location(graph, node),
        )
        .with_context(&node.id);
        diags.warning(
            DiagnosticKind::StructuralCycle,
            &site,
            &format!("cycle:{}", path.join(">")),
            format!("Presentation graph loops: {}", path.join(" > ")),
        );
    }
}

/// Graph A binding graph B binding A again. Looped playback can be
/// intentional, so this is a warning.
fn check_graph_reference_cycles(doc: &ProjectDocument, diags: &mut Diagnostics) {
    let cycles = find_cycles(doc.presentation_graphs.keys().map(String::as_str), |id| {
        doc.graph(id)
            .map(|g| {
                g.nodes
                    .values()
                    .filter_map(|n| n.presentation.as_ref().and_then(|b| b.graph_id()))
                    .filter(|nested| doc.graph(nested).is_some())
                    .collect::<Vec<_>>()
            })
            .unwrap_or_default()
    });
    for path in cycles {
        let Some(graph) = path.last().and_then(|id| doc.graph(id)) else {
            continue;
        };
        diags.warning(
            DiagnosticKind::StructuralCycle,
            &graph_site(graph),
            &format!("graphCycle:{}", path.join(">")),
            format!("Presentation graphs reference each other in a loop: {}", path.join(" > ")),
        );
    }
}
