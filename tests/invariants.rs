//! Contract Invariant Tests
//!
//! These tests verify the non-negotiable guarantees.

use std::io::Write;

use serde_json::{json, Value};

use puzzleforge_core::{
    can_transition_resource_state, canonical_json, validate_project, DiagnosticKind, ExportError,
    ExportPipeline, ObjectType, ProjectDocument, ResourceState, Severity, ValidationResult,
};

fn base_project() -> Value {
    json!({
        "meta": {"name": "Invariants", "formatVersion": "1.0.0"},
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
            }
        },
        "scripts": {
            "script_1": {"id": "script_1", "name": "Play", "assetName": "play_anim",
                         "parameters": [{"name": "speed", "type": "Float"}]}
        }
    })
}

fn doc(value: Value) -> ProjectDocument {
    serde_json::from_value(value).unwrap()
}

fn errors(results: &[ValidationResult]) -> Vec<&ValidationResult> {
    results.iter().filter(|r| r.level == Severity::Error).collect()
}

/// node_1 declares NodeLocal `v`; its transition plays `graph_1`, whose
/// only step reads `v`. node_2 lacks `v` and optionally plays it too.
fn shared_graph_project(bind_node_2: bool) -> Value {
    let mut value = base_project();
    value["nodes"]["node_1"]["localVariables"] =
        json!({"v": {"id": "v", "assetName": "v", "scope": "NodeLocal"}});
    value["stateMachines"]["fsm_1"]["transitions"]["tr_1"]["presentation"] =
        json!({"type": "Graph", "graphId": "graph_1"});
    value["nodes"]["node_2"] = json!({
        "id": "node_2", "name": "Window", "assetName": "window",
        "stageId": "stage_1", "stateMachineId": "fsm_2"
    });
    let presentation = if bind_node_2 {
        json!({"type": "Graph", "graphId": "graph_1"})
    } else {
        Value::Null
    };
    value["stateMachines"]["fsm_2"] = json!({
        "id": "fsm_2",
        "initialStateId": "s_a",
        "states": {"s_a": {"id": "s_a", "assetName": "ajar"}, "s_b": {"id": "s_b", "assetName": "shut"}},
        "transitions": {"tr_2": {"id": "tr_2", "fromStateId": "s_a", "toStateId": "s_b",
                                 "presentation": presentation}}
    });
    value["presentationGraphs"] = json!({
        "graph_1": {"id": "graph_1", "name": "Shared", "startNodeId": "p1", "nodes": {
            "p1": {"id": "p1", "presentation": {
                "type": "Script", "scriptId": "script_1",
                "parameters": [{"paramName": "speed",
                                "source": {"type": "VariableRef", "variableId": "v", "scope": "NodeLocal"}}]
            }}
        }}
    });
    value
}

fn unused_graph_project(condition: Value) -> Value {
    let mut value = base_project();
    value["presentationGraphs"] = json!({
        "graph_1": {"id": "graph_1", "startNodeId": "p1", "nodes": {
            "p1": {"id": "p1", "type": "Branch", "condition": condition}
        }}
    });
    value
}

#[test]
fn invariant_clean_project_has_no_findings() {
    assert!(validate_project(&doc(base_project())).is_empty());
}

#[test]
fn invariant_empty_document_reports_only_tree_errors() {
    let results = validate_project(&doc(json!({})));

    assert_eq!(results.len(), 2);
    assert!(results.iter().all(|r| r.level == Severity::Error));
    let messages: Vec<_> = results.iter().map(|r| r.message.as_str()).collect();
    assert!(messages.contains(&"Project has no stages"));
    assert!(messages.contains(&"Stage tree has no rootId"));
}

#[test]
fn invariant_missing_to_state_is_one_error() {
    let mut value = base_project();
    value["stateMachines"]["fsm_1"]["transitions"]["tr_1"]["toStateId"] = "state_404".into();
    let results = validate_project(&doc(value));

    let errs = errors(&results);
    assert_eq!(errs.len(), 1);
    assert_eq!(errs[0].object_type, ObjectType::Transition);
    assert_eq!(errs[0].object_id, "tr_1");
    assert!(errs[0].message.contains("state_404"));
}

#[test]
fn invariant_stage_cycle_reported_once() {
    let mut value = base_project();
    value["stageTree"]["stages"]["stage_1"]["childrenIds"] = json!(["stage_2"]);
    value["stageTree"]["stages"]["stage_2"] = json!({
        "id": "stage_2", "name": "Loop", "assetName": "loop_stage",
        "parentId": "stage_1", "childrenIds": ["stage_1"]
    });
    let results = validate_project(&doc(value));

    let cycles: Vec<_> = results
        .iter()
        .filter(|r| r.kind == DiagnosticKind::StructuralCycle)
        .collect();
    assert_eq!(cycles.len(), 1);
    assert_eq!(cycles[0].level, Severity::Error);
    assert_eq!(cycles[0].object_type, ObjectType::Stage);
}

#[test]
fn invariant_shared_graph_checked_in_every_context() {
    let results = validate_project(&doc(shared_graph_project(true)));

    let errs = errors(&results);
    assert_eq!(errs.len(), 1);
    assert_eq!(errs[0].object_id, "graph_1");
    assert_eq!(errs[0].context_id.as_deref(), Some("node_2"));
    assert!(errs[0].location.contains("Node 'Window'"));
}

#[test]
fn invariant_shared_graph_single_context_passes() {
    let results = validate_project(&doc(shared_graph_project(false)));
    assert!(errors(&results).is_empty());
}

#[test]
fn invariant_unused_graph_with_local_reference() {
    let value = unused_graph_project(
        json!({"type": "VariableRef", "variableId": "x", "scope": "StageLocal"}),
    );
    let results = validate_project(&doc(value));

    let orphaned = results
        .iter()
        .filter(|r| r.level == Severity::Warning && r.message.contains("orphaned"))
        .count();
    assert_eq!(orphaned, 1);
    let errs = errors(&results);
    assert_eq!(errs.len(), 1);
    assert!(errs[0].message.contains("no context to resolve"));
}

#[test]
fn invariant_unused_graph_with_global_reference() {
    let value = unused_graph_project(
        json!({"type": "VariableRef", "variableId": "var_1", "scope": "Global"}),
    );
    let results = validate_project(&doc(value));

    assert!(errors(&results).is_empty());
    assert!(results.iter().any(|r| r.message.contains("orphaned")));
}

#[test]
fn invariant_validation_deterministic() {
    let value = shared_graph_project(true);
    let first = validate_project(&doc(value.clone()));
    let second = validate_project(&doc(value));

    assert!(!first.is_empty());
    assert_eq!(first, second);
}

#[test]
fn invariant_diagnostic_ids_unique_within_pass() {
    let mut value = base_project();
    value["stageTree"]["stages"]["stage_1"]["lifecycleScriptId"] = "script_1".into();
    value["nodes"]["node_1"]["lifecycleScriptId"] = "script_1".into();
    value["stateMachines"]["fsm_1"]["transitions"]["tr_1"]["triggers"] = json!([
        {"type": "OnEvent", "eventId": "missing_a"},
        {"type": "OnEvent", "eventId": "missing_b"}
    ]);
    let results = validate_project(&doc(value));

    let mut ids: Vec<_> = results.iter().map(|r| r.id.as_str()).collect();
    let total = ids.len();
    ids.sort();
    ids.dedup();
    assert_eq!(ids.len(), total);
}

#[test]
fn invariant_diagnostic_ids_unique_for_graph_and_modifier_findings() {
    let mut value = shared_graph_project(true);
    let graph_nodes = &mut value["presentationGraphs"]["graph_1"]["nodes"];
    graph_nodes["p1"]["nextIds"] = json!(["p2"]);
    graph_nodes["p2"] = graph_nodes["p1"].clone();
    graph_nodes["p2"]["id"] = "p2".into();
    graph_nodes["p2"]["nextIds"] = json!([]);
    value["blackboard"]["events"] = json!({"event_1": {"id": "event_1", "assetName": "knock"}});
    value["stateMachines"]["fsm_1"]["transitions"]["tr_1"]["parameterModifiers"] = json!([
        {"targetVariableId": "var_1", "operation": "Set", "source": {"type": "VariableRef"}}
    ]);
    value["nodes"]["node_1"]["eventListeners"] = json!([
        {"eventId": "event_1", "parameterModifiers": [
            {"targetVariableId": "var_1", "operation": "Add", "source": {"type": "VariableRef"}}
        ]}
    ]);
    let results = validate_project(&doc(value));

    let graph_errors = results
        .iter()
        .filter(|r| r.object_id == "graph_1" && r.level == Severity::Error)
        .count();
    assert_eq!(graph_errors, 2);
    let empty_sources = results
        .iter()
        .filter(|r| r.message.contains("no variable selected"))
        .count();
    assert_eq!(empty_sources, 2);

    let ids: std::collections::HashSet<_> = results.iter().map(|r| r.id.as_str()).collect();
    assert_eq!(ids.len(), results.len());
}

#[test]
fn invariant_untyped_tree_nodes_are_diagnostics() {
    let mut value = base_project();
    value["stateMachines"]["fsm_1"]["transitions"]["tr_1"]["triggers"] =
        json!([{"eventId": "event_1"}]);
    value["stateMachines"]["fsm_1"]["transitions"]["tr_1"]["presentation"] =
        json!({"graphId": "graph_1"});
    let project = ProjectDocument::from_json_str(&value.to_string()).unwrap();
    let results = validate_project(&project);

    let errs = errors(&results);
    assert_eq!(errs.len(), 2);
    assert!(errs.iter().all(|r| r.kind == DiagnosticKind::MissingField));
    assert!(errs.iter().all(|r| r.message.contains("type is empty or unknown")));
}

#[test]
fn invariant_resource_lifecycle_table() {
    assert!(!can_transition_resource_state(ResourceState::Implemented, ResourceState::Draft));
    assert!(can_transition_resource_state(
        ResourceState::Implemented,
        ResourceState::MarkedForDelete
    ));
    assert!(can_transition_resource_state(
        ResourceState::MarkedForDelete,
        ResourceState::MarkedForDelete
    ));
    assert!(!can_transition_resource_state(ResourceState::MarkedForDelete, ResourceState::Draft));
}

#[test]
fn invariant_export_refuses_on_error() {
    let mut value = base_project();
    value["stateMachines"]["fsm_1"]["transitions"]["tr_1"]["toStateId"] = "state_404".into();

    let result = ExportPipeline::default().export(&doc(value));
    let err = result.unwrap_err();
    assert!(matches!(err, ExportError::ValidationFailed(_)));
    assert!(err.to_string().contains("Validation failed"));
}

#[test]
fn invariant_export_bundle_hash_stable() {
    let pipeline = ExportPipeline::default();
    let project = doc(base_project());

    let a = pipeline.export(&project).unwrap();
    let b = pipeline.export(&project).unwrap();

    assert_ne!(a.id, b.id);
    assert_eq!(a.document_hash, b.document_hash);
    assert_eq!(a.payload_base64, b.payload_base64);
}

#[test]
fn invariant_canonical_json_deterministic() {
    let obj1 = json!({"z": 1, "a": 2, "m": {"b": 1, "a": 2}});
    let obj2 = json!({"a": 2, "m": {"a": 2, "b": 1}, "z": 1});

    assert_eq!(canonical_json(&obj1).unwrap(), canonical_json(&obj2).unwrap());
}

#[test]
fn invariant_document_loads_from_file() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    write!(file, "{}", base_project()).unwrap();

    let loaded = ProjectDocument::load(file.path()).unwrap();
    assert_eq!(loaded.meta.name, "Invariants");
    assert!(validate_project(&loaded).is_empty());
}
