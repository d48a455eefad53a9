//! A lifecycle script may drive at most one host object.

use indexmap::IndexMap;

use super::*;
use crate::document::non_empty;
use crate::validation::{DiagnosticKind, Diagnostics, ValidationResult, ValidationRule};

pub struct LifecycleUniquenessRule;

impl ValidationRule for LifecycleUniquenessRule {
    fn name(&self) -> &'static str { "lifecycle-uniqueness" }

    fn validate(&self, doc: &ProjectDocument) -> Vec<ValidationResult> {
        let mut usages: IndexMap<&str, Vec<Site>> = IndexMap::new();

        for stage in doc.stage_tree.stages.values() {
            if let Some(script_id) = non_empty(stage.lifecycle_script_id.as_deref()) {
                usages.entry(script_id).or_default().push(stage_site(doc, stage));
            }
        }
        for node in doc.nodes.values() {
            if let Some(script_id) = non_empty(node.lifecycle_script_id.as_deref()) {
                usages.entry(script_id).or_default().push(node_site(doc, node));
            }
        }
        for fsm in doc.state_machines.values() {
            let location = machine_location(doc, fsm);
            for state in fsm.states.values() {
                if let Some(script_id) = non_empty(state.lifecycle_script_id.as_deref()) {
                    let site = Site::new(
                        ObjectType::State,
                        &state.id,
                        format!("{} > State '{}'", location, display_name(&state.name, &state.id)),
                    )
                    .with_context(&fsm.id);
                    usages.entry(script_id).or_default().push(site);
                }
            }
        }

        let mut diags = Diagnostics::new();
        for (script_id, sites) in usages {
            if sites.len() < 2 {
                continue;
            }
            let script_label = doc
                .script(script_id)
                .map(|s| display_name(&s.name, &s.id))
                .unwrap_or(script_id);
            let all: Vec<&str> = sites.iter().map(|s| s.location.as_str()).collect();
            for site in &sites {
                diags.error(
                    DiagnosticKind::UniquenessViolation,
                    site,
                    &format!("lifecycle:{}", script_id),
                    format!(
                        "Lifecycle script '{}' is bound to {} objects: {}",
                        script_label,
                        sites.len(),
                        all.join("; ")
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

    #[test]
    fn test_single_use_is_fine() {
        let mut value = fixtures::base();
        value["nodes"]["node_1"]["lifecycleScriptId"] = "script_1".into();
        assert!(LifecycleUniquenessRule.validate(&fixtures::doc(value)).is_empty());
    }

    #[test]
    fn test_one_error_per_usage_site() {
        let mut value = fixtures::base();
        value["stageTree"]["stages"]["stage_1"]["lifecycleScriptId"] = "script_1".into();
        value["nodes"]["node_1"]["lifecycleScriptId"] = "script_1".into();
        value["stateMachines"]["fsm_1"]["states"]["state_2"]["lifecycleScriptId"] =
            "script_1".into();
        let results = LifecycleUniquenessRule.validate(&fixtures::doc(value));

        assert_eq!(results.len(), 3);
        let types: Vec<_> = results.iter().map(|r| r.object_type).collect();
        assert_eq!(types, vec![ObjectType::Stage, ObjectType::Node, ObjectType::State]);
        for r in &results {
            assert_eq!(r.kind, DiagnosticKind::UniquenessViolation);
            assert!(r.message.contains("3 objects"));
            assert!(r.message.contains("State 'Open'"));
        }
    }
}
