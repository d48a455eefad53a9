//! Variable references and context propagation through shared graphs.
//!
//! A presentation graph can be bound from many sites, and its StageLocal
//! or NodeLocal references only mean something relative to the site
//! using it. The pass runs in three phases:
//!
//! 1. Collect: every `Graph` binding met while checking stages and nodes
//!    records its usage context against the bound graph.
//! 2. Propagate: contexts flow from each bound graph into the graphs it
//!    nests, transitively. Contexts live in an arena and are merged by
//!    index, so diamonds never duplicate them.
//! 3. Validate: each local reference inside a graph must resolve in
//!    every context that reaches the graph. The first failing context is
//!    reported and the rest are skipped for that reference.

use indexmap::{IndexMap, IndexSet};
use std::collections::HashSet;

use super::*;
use crate::document::{non_empty, ParameterModifier, VariableScope};
use crate::resolver::{resolve_variable, ResolveError, UsageContext};
use crate::validation::{DiagnosticKind, Diagnostics, ValidationResult, ValidationRule};
use crate::walker::{binding_leaves, condition_leaves, modifier_leaves, trigger_leaves, Found, Leaf};

pub struct VariableRule;

impl ValidationRule for VariableRule {
    fn name(&self) -> &'static str { "variables" }

    fn validate(&self, doc: &ProjectDocument) -> Vec<ValidationResult> {
        let mut checker = VarChecker::new(doc);
        checker.collect_stages();
        checker.collect_nodes();
        checker.propagate();
        checker.validate_graphs();
        checker.diags.into_results()
    }
}

/// Modifier leaves that name a variable. An empty source id is a
/// structural gap the reference checker owns.
fn modifier_refs<'a>(modifier: &'a ParameterModifier, origin: &str) -> Vec<Found<'a>> {
    modifier_leaves(modifier, origin)
        .into_iter()
        .filter(|(leaf, _)| !matches!(leaf, Leaf::Variable { variable_id: None, .. }))
        .collect()
}

/// One binding site of a presentation graph.
struct BoundContext<'a> {
    ctx: UsageContext<'a>,
    owner_id: &'a str,
    location: String,
}

struct VarChecker<'a> {
    doc: &'a ProjectDocument,
    diags: Diagnostics,
    arena: Vec<BoundContext<'a>>,
    graph_contexts: IndexMap<&'a str, IndexSet<usize>>,
}

impl<'a> VarChecker<'a> {
    fn new(doc: &'a ProjectDocument) -> Self {
        Self {
            doc,
            diags: Diagnostics::new(),
            arena: Vec::new(),
            graph_contexts: IndexMap::new(),
        }
    }

    fn collect_stages(&mut self) {
        let doc = self.doc;
        for stage in doc.stage_tree.stages.values() {
            let ctx = UsageContext::for_stage(stage);
            let site = stage_site(doc, stage);

            if let Some(condition) = &stage.unlock_condition {
                self.check_leaves(&site, ctx, condition_leaves(condition, "Unlock Condition"));
            }
            for (i, trigger) in stage.unlock_triggers.iter().enumerate() {
                let origin = format!("Unlock Trigger #{}", i + 1);
                self.check_leaves(&site, ctx, trigger_leaves(trigger, &origin));
            }
            for (origin, binding) in [
                ("On Enter", &stage.on_enter_presentation),
                ("On Exit", &stage.on_exit_presentation),
            ] {
                if let Some(binding) = binding {
                    let location = format!("{} > {}", site.location, origin);
                    let leaves = binding_leaves(binding, origin);
                    self.bind_leaves(&site, ctx, &stage.id, &location, leaves);
                }
            }
        }
    }

    fn collect_nodes(&mut self) {
        let doc = self.doc;
        let mut owned: HashSet<&str> = HashSet::new();

        for node in doc.nodes.values() {
            let ctx = UsageContext::for_node(doc, node);
            let site = node_site(doc, node);

            for (i, listener) in node.event_listeners.iter().enumerate() {
                for (j, modifier) in listener.parameter_modifiers.iter().enumerate() {
                    let origin = format!("Event Listener #{} > Modifier #{}", i + 1, j + 1);
                    self.check_leaves(&site, ctx, modifier_refs(modifier, &origin));
                }
            }

            let Some(fsm) = non_empty(node.state_machine_id.as_deref())
                .and_then(|id| doc.state_machine(id))
            else {
                continue;
            };
            owned.insert(fsm.id.as_str());
            self.collect_machine(fsm, Some(ctx), &node.id);
        }

        for fsm in doc.state_machines.values() {
            if !owned.contains(fsm.id.as_str()) {
                self.collect_machine(fsm, None, &fsm.id);
            }
        }
    }

    /// `ctx` is `None` for a machine no node owns.
    fn collect_machine(
        &mut self,
        fsm: &'a StateMachine,
        ctx: Option<UsageContext<'a>>,
        owner_id: &'a str,
    ) {
        let location = machine_location(self.doc, fsm);
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

            let mut leaves: Vec<Found<'a>> = Vec::new();
            for (i, trigger) in transition.triggers.iter().enumerate() {
                leaves.extend(trigger_leaves(trigger, &format!("Trigger #{}", i + 1)));
            }
            if let Some(condition) = &transition.condition {
                leaves.extend(condition_leaves(condition, "Condition"));
            }
            for (i, modifier) in transition.parameter_modifiers.iter().enumerate() {
                leaves.extend(modifier_refs(modifier, &format!("Modifier #{}", i + 1)));
            }

            match ctx {
                Some(ctx) => {
                    self.check_leaves(&site, ctx, leaves);
                    if let Some(binding) = &transition.presentation {
                        let at = format!("{} > Presentation", site.location);
                        let bound = binding_leaves(binding, "Presentation");
                        self.bind_leaves(&site, ctx, owner_id, &at, bound);
                    }
                }
                None => {
                    if let Some(binding) = &transition.presentation {
                        leaves.extend(
                            binding_leaves(binding, "Presentation")
                                .into_iter()
                                .filter(|(leaf, _)| matches!(leaf, Leaf::Variable { .. })),
                        );
                    }
                    let why = "its state machine is not owned by any node";
                    self.check_without_context(&site, leaves, why);
                }
            }
        }
    }

    /// Checks variable leaves and records graph leaves as binding sites.
    fn bind_leaves(
        &mut self,
        site: &Site,
        ctx: UsageContext<'a>,
        owner_id: &'a str,
        location: &str,
        leaves: Vec<Found<'a>>,
    ) {
        for (leaf, origin) in leaves {
            match leaf {
                Leaf::Graph { graph_id: Some(graph_id) } if self.doc.graph(graph_id).is_some() => {
                    let index = self.arena.len();
                    self.arena.push(BoundContext {
                        ctx,
                        owner_id,
                        location: location.to_string(),
                    });
                    self.graph_contexts.entry(graph_id).or_default().insert(index);
                }
                Leaf::Variable { .. } => self.check_leaf(site, ctx, leaf, &origin),
                Leaf::Graph { .. } | Leaf::Script { .. } | Leaf::Malformed { .. } => {}
            }
        }
    }

    fn check_leaves(&mut self, site: &Site, ctx: UsageContext<'a>, leaves: Vec<Found<'a>>) {
        for (leaf, origin) in leaves {
            self.check_leaf(site, ctx, leaf, &origin);
        }
    }

    fn check_leaf(&mut self, site: &Site, ctx: UsageContext<'a>, leaf: Leaf<'a>, origin: &str) {
        let Leaf::Variable { variable_id, scope } = leaf else {
            return;
        };
        let Some(variable_id) = variable_id else {
            self.missing_variable_id(site, origin);
            return;
        };
        if let Err(err) = resolve_variable(self.doc, variable_id, scope, ctx) {
            let detail = format!("{}|{}", origin, variable_id);
            self.unresolved(site, &detail, origin, variable_id, scope, err, None);
        }
    }

    fn missing_variable_id(&mut self, site: &Site, origin: &str) {
        self.diags.error(
            DiagnosticKind::MissingField,
            site,
            origin,
            format!("{}: variable reference has no variable selected", origin),
        );
    }

    /// `from` names the binding site when the reference sits in a graph.
    #[allow(clippy::too_many_arguments)]
    fn unresolved(
        &mut self,
        site: &Site,
        detail: &str,
        origin: &str,
        variable_id: &str,
        scope: VariableScope,
        err: ResolveError,
        from: Option<&str>,
    ) {
        let used_from = from.map(|f| format!(" when used from {}", f)).unwrap_or_default();
        match err {
            ResolveError::Missing => self.diags.error(
                DiagnosticKind::MissingReference,
                site,
                detail,
                format!(
                    "{}: {:?} variable '{}' is not visible{}",
                    origin, scope, variable_id, used_from
                ),
            ),
            ResolveError::MarkedForDelete => self.diags.error(
                DiagnosticKind::DeletedReference,
                site,
                detail,
                format!(
                    "{}: {:?} variable '{}' is marked for delete{}",
                    origin, scope, variable_id, used_from
                ),
            ),
        }
    }

    /// Globals are checked for existence; anything local cannot be resolved.
    fn check_without_context(&mut self, site: &Site, leaves: Vec<Found<'a>>, why: &str) {
        for (leaf, origin) in leaves {
            let Leaf::Variable { variable_id, scope } = leaf else {
                continue;
            };
            let Some(variable_id) = variable_id else {
                self.missing_variable_id(site, &origin);
                continue;
            };
            match scope {
                VariableScope::Temporary => {}
                VariableScope::Global => {
                    let ctx = UsageContext::default();
                    let global = resolve_variable(self.doc, variable_id, scope, ctx);
                    if let Err(err) = global {
                        let detail = format!("{}|{}", origin, variable_id);
                        self.unresolved(site, &detail, &origin, variable_id, scope, err, None);
                    }
                }
                VariableScope::StageLocal | VariableScope::NodeLocal => self.diags.error(
                    DiagnosticKind::MissingReference,
                    site,
                    &format!("{}|{}", origin, variable_id),
                    format!(
                        "{}: {:?} variable '{}' has no context to resolve it; {}",
                        origin, scope, variable_id, why
                    ),
                ),
            }
        }
    }

    /// Pushes every bound graph's contexts into the graphs it nests.
    fn propagate(&mut self) {
        let doc = self.doc;
        let roots: Vec<&'a str> = self.graph_contexts.keys().copied().collect();

        for root in roots {
            let mut visited: HashSet<&'a str> = HashSet::new();
            visited.insert(root);
            let mut work = vec![root];

            while let Some(graph_id) = work.pop() {
                let Some(graph) = doc.graph(graph_id) else {
                    continue;
                };
                let inherited = self.graph_contexts.get(graph_id).cloned().unwrap_or_default();

                for node in graph.nodes.values() {
                    let Some(nested) = node.presentation.as_ref().and_then(|b| b.graph_id()) else {
                        continue;
                    };
                    if doc.graph(nested).is_none() {
                        continue;
                    }
                    self.graph_contexts
                        .entry(nested)
                        .or_default()
                        .extend(inherited.iter().copied());
                    if visited.insert(nested) {
                        work.push(nested);
                    }
                }
            }
        }

        tracing::debug!(
            bindings = self.arena.len(),
            graphs = self.graph_contexts.len(),
            "Propagated graph usage contexts"
        );
    }

    fn validate_graphs(&mut self) {
        let doc = self.doc;
        for graph in doc.presentation_graphs.values() {
            let contexts: Vec<usize> = self
                .graph_contexts
                .get(graph.id.as_str())
                .map(|set| set.iter().copied().collect())
                .unwrap_or_default();

            if contexts.is_empty() {
                self.diags.warning(
                    DiagnosticKind::UnreachableNode,
                    &graph_site(graph),
                    "orphaned",
                    "Presentation graph is orphaned: no stage, transition or graph uses it",
                );
            }

            for node in graph.nodes.values() {
                let site = Site::new(
                    ObjectType::PresentationGraph,
                    &graph.id,
                    graph_node_location(graph, node),
                )
                .with_context(&node.id);

                let mut leaves: Vec<Found<'a>> = Vec::new();
                if let Some(binding) = &node.presentation {
                    leaves.extend(binding_leaves(binding, "Presentation"));
                }
                if let Some(condition) = &node.condition {
                    leaves.extend(condition_leaves(condition, "Branch Condition"));
                }

                if contexts.is_empty() {
                    self.check_without_context(&site, leaves, "the graph is not used anywhere");
                    continue;
                }
                for (leaf, origin) in leaves {
                    self.check_in_all_contexts(&site, &contexts, leaf, &origin);
                }
            }
        }
    }

    /// The reference must resolve in every context; only the first
    /// failing context is reported.
    fn check_in_all_contexts(
        &mut self,
        site: &Site,
        contexts: &[usize],
        leaf: Leaf<'a>,
        origin: &str,
    ) {
        let Leaf::Variable { variable_id, scope } = leaf else {
            return;
        };
        let Some(variable_id) = variable_id else {
            self.missing_variable_id(site, origin);
            return;
        };

        for &index in contexts {
            let bound = &self.arena[index];
            let Err(err) = resolve_variable(self.doc, variable_id, scope, bound.ctx) else {
                continue;
            };
            let failing = Site {
                object_type: site.object_type,
                object_id: site.object_id.clone(),
                context_id: Some(bound.owner_id.to_string()),
                location: bound.location.clone(),
            };
            // context_id now names the owner; the graph node stays in the id
            let graph_node = site.context_id.as_deref().unwrap_or_default();
            let detail = format!("{}|{}|{}", graph_node, origin, variable_id);
            let from = format!("{} (graph node {})", bound.location, site.location);
            self.unresolved(&failing, &detail, origin, variable_id, scope, err, Some(&from));
            break;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rules::fixtures;
    use crate::validation::Severity;
    use serde_json::{json, Value};

    fn run(value: Value) -> Vec<ValidationResult> {
        VariableRule.validate(&fixtures::doc(value))
    }

    /// Two nodes on the root stage, each with its own machine whose only
    /// transition plays `graph_id`. Only node_1 declares `v`.
    fn shared_graph_project(bind_node_2: bool) -> Value {
        let mut value = fixtures::base();
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
            "states": {"s_a": {"id": "s_a", "assetName": "a"}, "s_b": {"id": "s_b", "assetName": "b"}},
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

    #[test]
    fn test_clean_fixture_has_no_findings() {
        assert!(run(fixtures::base()).is_empty());
    }

    #[test]
    fn test_shared_graph_fails_in_one_context() {
        let results = run(shared_graph_project(true));
        assert_eq!(results.len(), 1);
        let err = &results[0];
        assert_eq!(err.level, Severity::Error);
        assert_eq!(err.object_type, ObjectType::PresentationGraph);
        assert_eq!(err.object_id, "graph_1");
        assert_eq!(err.context_id.as_deref(), Some("node_2"));
        assert!(err.location.contains("Node 'Window'"));
    }

    #[test]
    fn test_shared_graph_bound_only_where_declared() {
        assert!(run(shared_graph_project(false)).is_empty());
    }

    #[test]
    fn test_context_inherited_through_nested_graph() {
        let mut value = shared_graph_project(true);
        // node_2 now plays an outer graph that nests graph_1
        value["stateMachines"]["fsm_2"]["transitions"]["tr_2"]["presentation"] =
            json!({"type": "Graph", "graphId": "graph_outer"});
        value["presentationGraphs"]["graph_outer"] = json!({
            "id": "graph_outer", "startNodeId": "o1", "nodes": {
                "o1": {"id": "o1", "presentation": {"type": "Graph", "graphId": "graph_1"}}
            }
        });
        let results = run(value);
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].object_id, "graph_1");
        assert_eq!(results[0].context_id.as_deref(), Some("node_2"));
    }

    #[test]
    fn test_failing_graph_nodes_keep_distinct_ids() {
        let mut value = shared_graph_project(true);
        value["presentationGraphs"]["graph_1"]["nodes"]["p1"]["nextIds"] = json!(["p2"]);
        value["presentationGraphs"]["graph_1"]["nodes"]["p2"] =
            value["presentationGraphs"]["graph_1"]["nodes"]["p1"].clone();
        value["presentationGraphs"]["graph_1"]["nodes"]["p2"]["id"] = "p2".into();
        value["presentationGraphs"]["graph_1"]["nodes"]["p2"]["nextIds"] = json!([]);
        let results = run(value);

        assert_eq!(results.len(), 2);
        assert!(results.iter().all(|r| r.context_id.as_deref() == Some("node_2")));
        assert!(results[0].message.contains("'p1'"));
        assert!(results[1].message.contains("'p2'"));
        assert_ne!(results[0].id, results[1].id);
    }

    #[test]
    fn test_empty_modifier_source_not_reported_here() {
        let mut value = fixtures::base();
        value["stateMachines"]["fsm_1"]["transitions"]["tr_1"]["parameterModifiers"] = json!([
            {"targetVariableId": "var_1", "operation": "Set", "source": {"type": "VariableRef"}}
        ]);
        value["nodes"]["node_1"]["eventListeners"] = json!([
            {"eventId": "event_1", "parameterModifiers": [
                {"targetVariableId": "var_1", "operation": "Add", "source": {"type": "VariableRef"}}
            ]}
        ]);
        assert!(run(value).is_empty());
    }

    #[test]
    fn test_self_referencing_graph_terminates() {
        let mut value = shared_graph_project(false);
        value["presentationGraphs"]["graph_1"]["nodes"]["p2"] =
            json!({"id": "p2", "presentation": {"type": "Graph", "graphId": "graph_1"}});
        assert!(run(value).is_empty());
    }

    #[test]
    fn test_unused_graph_with_local_reference() {
        let mut value = fixtures::base();
        value["presentationGraphs"] = json!({
            "graph_1": {"id": "graph_1", "startNodeId": "p1", "nodes": {
                "p1": {"id": "p1", "type": "Branch", "nextIds": [],
                       "condition": {"type": "VariableRef", "variableId": "x", "scope": "StageLocal"}}
            }}
        });
        let results = run(value);
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].level, Severity::Warning);
        assert!(results[0].message.contains("orphaned"));
        assert_eq!(results[1].level, Severity::Error);
        assert!(results[1].message.contains("no context to resolve"));
    }

    #[test]
    fn test_unused_graph_with_global_reference() {
        let mut value = fixtures::base();
        value["presentationGraphs"] = json!({
            "graph_1": {"id": "graph_1", "startNodeId": "p1", "nodes": {
                "p1": {"id": "p1", "type": "Branch",
                       "condition": {"type": "VariableRef", "variableId": "var_1", "scope": "Global"}}
            }}
        });
        let results = run(value);
        assert_eq!(results.len(), 1);
        assert!(results[0].message.contains("orphaned"));
    }

    #[test]
    fn test_stage_local_from_ancestor_in_transition() {
        let mut value = fixtures::base();
        value["stageTree"]["stages"]["stage_1"]["childrenIds"] = json!(["stage_2"]);
        value["stageTree"]["stages"]["stage_1"]["localVariables"] =
            json!({"lv": {"id": "lv", "assetName": "lv", "scope": "StageLocal"}});
        value["stageTree"]["stages"]["stage_2"] =
            json!({"id": "stage_2", "assetName": "child", "parentId": "stage_1"});
        value["nodes"]["node_1"]["stageId"] = "stage_2".into();
        value["stateMachines"]["fsm_1"]["transitions"]["tr_1"]["condition"] = json!({
            "type": "And", "children": [
                {"type": "VariableRef", "variableId": "lv", "scope": "StageLocal"},
                {"type": "VariableRef", "variableId": "nope", "scope": "StageLocal"},
                {"type": "VariableRef", "variableId": "tmp", "scope": "Temporary"}
            ]
        });
        let results = run(value);
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].object_type, ObjectType::Transition);
        assert!(results[0].message.starts_with("Condition > Sub #2"));
        assert!(results[0].message.contains("nope"));
    }

    #[test]
    fn test_deleted_global_in_modifier() {
        let mut value = fixtures::base();
        value["blackboard"]["globalVariables"]["var_1"]["state"] = "MarkedForDelete".into();
        value["stateMachines"]["fsm_1"]["transitions"]["tr_1"]["parameterModifiers"] = json!([
            {"targetVariableId": "var_1", "operation": "Toggle"}
        ]);
        let results = run(value);
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].kind, DiagnosticKind::DeletedReference);
        assert!(results[0].message.starts_with("Modifier #1 > Target"));
    }

    #[test]
    fn test_stage_enter_binding_gives_stage_context_only() {
        let mut value = fixtures::base();
        value["stageTree"]["stages"]["stage_1"]["onEnterPresentation"] =
            json!({"type": "Graph", "graphId": "graph_1"});
        value["presentationGraphs"] = json!({
            "graph_1": {"id": "graph_1", "startNodeId": "p1", "nodes": {
                "p1": {"id": "p1", "type": "Branch",
                       "condition": {"type": "VariableRef", "variableId": "v", "scope": "NodeLocal"}}
            }}
        });
        let results = run(value);
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].context_id.as_deref(), Some("stage_1"));
        assert!(results[0].location.ends_with("On Enter"));
    }

    #[test]
    fn test_diamond_keeps_contexts_bounded() {
        let mut value = shared_graph_project(false);
        value["presentationGraphs"]["graph_1"]["nodes"]["p1"]["presentation"] = Value::Null;
        value["stateMachines"]["fsm_1"]["transitions"]["tr_1"]["presentation"] =
            json!({"type": "Graph", "graphId": "g_top"});
        value["presentationGraphs"]["g_top"] = json!({"id": "g_top", "startNodeId": "t1", "nodes": {
            "t1": {"id": "t1", "type": "Parallel", "nextIds": ["t2"],
                   "presentation": {"type": "Graph", "graphId": "g_left"}},
            "t2": {"id": "t2", "presentation": {"type": "Graph", "graphId": "g_right"}}
        }});
        value["presentationGraphs"]["g_left"] = json!({"id": "g_left", "startNodeId": "l1", "nodes": {
            "l1": {"id": "l1", "presentation": {"type": "Graph", "graphId": "graph_1"}}
        }});
        value["presentationGraphs"]["g_right"] = json!({"id": "g_right", "startNodeId": "r1", "nodes": {
            "r1": {"id": "r1", "presentation": {"type": "Graph", "graphId": "graph_1"}}
        }});

        let doc = fixtures::doc(value);
        let mut checker = VarChecker::new(&doc);
        checker.collect_stages();
        checker.collect_nodes();
        checker.propagate();
        assert_eq!(checker.arena.len(), 1);
        assert_eq!(checker.graph_contexts["graph_1"].len(), 1);
        assert_eq!(checker.graph_contexts["g_left"].len(), 1);
    }
}
