//! Temporary-parameter consistency.
//!
//! A Temporary variable passed into a script parameter takes that
//! parameter's declared type. Every call site must agree on it.

use indexmap::{IndexMap, IndexSet};

use super::*;
use crate::document::{
    non_empty, ParameterBinding, PresentationBinding, Trigger, ValueSource, VariableScope,
    VariableType,
};
use crate::validation::{DiagnosticKind, Diagnostics, ValidationResult, ValidationRule};

pub struct TemporaryParameterRule;

struct Usage {
    value_type: VariableType,
    site: Site,
    origin: String,
}

#[derive(Default)]
struct UsageMap<'a> {
    by_temp: IndexMap<&'a str, Vec<Usage>>,
}

impl<'a> UsageMap<'a> {
    fn record(
        &mut self,
        doc: &ProjectDocument,
        site: &Site,
        origin: &str,
        script_id: Option<&str>,
        parameters: &'a [ParameterBinding],
    ) {
        let Some(script) = non_empty(script_id).and_then(|id| doc.script(id)) else {
            return;
        };
        for param in parameters {
            let Some(ValueSource::VariableRef {
                variable_id,
                scope: VariableScope::Temporary,
            }) = &param.source
            else {
                continue;
            };
            let Some(temp_id) = non_empty(variable_id.as_deref()) else {
                continue;
            };
            let Some(declared) = script.parameter(&param.param_name) else {
                continue;
            };
            self.by_temp.entry(temp_id).or_default().push(Usage {
                value_type: declared.value_type,
                site: site.clone(),
                origin: format!("{} > Param '{}'", origin, param.param_name),
            });
        }
    }

    fn binding(
        &mut self,
        doc: &ProjectDocument,
        site: &Site,
        origin: &str,
        binding: &'a PresentationBinding,
    ) {
        if let PresentationBinding::Script { script_id, parameters } = binding {
            self.record(doc, site, origin, script_id.as_deref(), parameters);
        }
    }

    fn trigger(&mut self, doc: &ProjectDocument, site: &Site, origin: &str, trigger: &'a Trigger) {
        if let Trigger::CustomScript { script_id, parameters } = trigger {
            self.record(doc, site, origin, script_id.as_deref(), parameters);
        }
    }
}

impl ValidationRule for TemporaryParameterRule {
    fn name(&self) -> &'static str { "temporary-parameters" }

    fn validate(&self, doc: &ProjectDocument) -> Vec<ValidationResult> {
        let mut usages = UsageMap::default();

        for stage in doc.stage_tree.stages.values() {
            let site = stage_site(doc, stage);
            for (i, trigger) in stage.unlock_triggers.iter().enumerate() {
                usages.trigger(doc, &site, &format!("Unlock Trigger #{}", i + 1), trigger);
            }
            if let Some(binding) = &stage.on_enter_presentation {
                usages.binding(doc, &site, "On Enter", binding);
            }
            if let Some(binding) = &stage.on_exit_presentation {
                usages.binding(doc, &site, "On Exit", binding);
            }
        }

        for fsm in doc.state_machines.values() {
            let location = machine_location(doc, fsm);
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
                for (i, trigger) in transition.triggers.iter().enumerate() {
                    usages.trigger(doc, &site, &format!("Trigger #{}", i + 1), trigger);
                }
                if let Some(binding) = &transition.presentation {
                    usages.binding(doc, &site, "Presentation", binding);
                }
            }
        }

        for graph in doc.presentation_graphs.values() {
            for node in graph.nodes.values() {
                if let Some(binding) = &node.presentation {
                    let site = Site::new(
                        ObjectType::PresentationGraph,
                        &graph.id,
                        graph_node_location(graph, node),
                    )
                    .with_context(&node.id);
                    usages.binding(doc, &site, "Presentation", binding);
                }
            }
        }

        let mut diags = Diagnostics::new();
        for (temp_id, uses) in &usages.by_temp {
            let types: IndexSet<VariableType> = uses.iter().map(|u| u.value_type).collect();
            if types.len() < 2 {
                continue;
            }
            let listing: Vec<String> = uses
                .iter()
                .map(|u| format!("{} at {} > {}", u.value_type.label(), u.site.location, u.origin))
                .collect();
            for usage in uses {
                diags.error(
                    DiagnosticKind::TypeConflict,
                    &usage.site,
                    &format!("{}|{}", usage.origin, temp_id),
                    format!(
                        "{}: temporary '{}' is bound as {} here but used with \
                         conflicting types: {}",
                        usage.origin,
                        temp_id,
                        usage.value_type.label(),
                        listing.join("; ")
                    ),
                );
            }
        }
        diags.into_results()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rules::fixtures;
    use serde_json::json;

    fn with_temp_bindings(second_param: &str) -> serde_json::Value {
        let mut value = fixtures::base();
        value["scripts"]["script_2"] = json!({
            "id": "script_2", "assetName": "say",
            "parameters": [{"name": "line", "type": "String"}, {"name": "rate", "type": "Float"}]
        });
        value["stateMachines"]["fsm_1"]["transitions"]["tr_1"]["presentation"] = json!({
            "type": "Script", "scriptId": "script_1",
            "parameters": [{"paramName": "speed",
                            "source": {"type": "VariableRef", "variableId": "t_speed", "scope": "Temporary"}}]
        });
        value["stageTree"]["stages"]["stage_1"]["onEnterPresentation"] = json!({
            "type": "Script", "scriptId": "script_2",
            "parameters": [{"paramName": second_param,
                            "source": {"type": "VariableRef", "variableId": "t_speed", "scope": "Temporary"}}]
        });
        value
    }

    #[test]
    fn test_consistent_types_pass() {
        let doc = fixtures::doc(with_temp_bindings("rate"));
        assert!(TemporaryParameterRule.validate(&doc).is_empty());
    }

    #[test]
    fn test_conflict_reported_at_every_site() {
        let doc = fixtures::doc(with_temp_bindings("line"));
        let results = TemporaryParameterRule.validate(&doc);

        assert_eq!(results.len(), 2);
        assert!(results.iter().all(|r| r.kind == DiagnosticKind::TypeConflict));
        assert_eq!(results[0].object_type, ObjectType::Stage);
        assert_eq!(results[1].object_type, ObjectType::Transition);
        assert!(results[0].message.contains("string"));
        assert!(results[0].message.contains("float"));
    }

    #[test]
    fn test_non_temporary_sources_ignored() {
        let mut value = with_temp_bindings("line");
        let binding = &mut value["stageTree"]["stages"]["stage_1"]["onEnterPresentation"];
        binding["parameters"][0]["source"]["scope"] = "Global".into();
        assert!(TemporaryParameterRule.validate(&fixtures::doc(value)).is_empty());
    }
}
