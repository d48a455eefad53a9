//! Reference integrity: scripts, events, triggers, graphs and parameter
//! modifiers must point at live resources.

use super::*;
use crate::document::{
    non_empty, ConditionExpression, EventListener, ModifierOperation, ParameterModifier,
    PresentationBinding, ScriptCategory, Trigger, ValueSource,
};
use crate::validation::{DiagnosticKind, Diagnostics, ValidationResult, ValidationRule};
use crate::walker::{binding_leaves, condition_leaves, modifier_leaves, trigger_leaves, Leaf};

pub struct ReferenceRule;

impl ValidationRule for ReferenceRule {
    fn name(&self) -> &'static str { "references" }

    fn validate(&self, doc: &ProjectDocument) -> Vec<ValidationResult> {
        let mut checker = RefChecker { doc, diags: Diagnostics::new() };

        for stage in doc.stage_tree.stages.values() {
            let site = stage_site(doc, stage);
            checker.lifecycle_script(&site, stage.lifecycle_script_id.as_deref());
            for (i, trigger) in stage.unlock_triggers.iter().enumerate() {
                checker.trigger(&site, &format!("Unlock Trigger #{}", i + 1), trigger);
            }
            if let Some(condition) = &stage.unlock_condition {
                checker.condition(&site, "Unlock Condition", condition);
            }
            if let Some(binding) = &stage.on_enter_presentation {
                checker.binding(&site, "On Enter", binding);
            }
            if let Some(binding) = &stage.on_exit_presentation {
                checker.binding(&site, "On Exit", binding);
            }
        }

        for node in doc.nodes.values() {
            let site = node_site(doc, node);
            checker.lifecycle_script(&site, node.lifecycle_script_id.as_deref());
            for (i, listener) in node.event_listeners.iter().enumerate() {
                checker.event_listener(&site, &format!("Event Listener #{}", i + 1), listener);
            }
        }

        for fsm in doc.state_machines.values() {
            let location = machine_location(doc, fsm);
            for state in fsm.states.values() {
                let site = Site::new(
                    ObjectType::State,
                    &state.id,
                    format!("{} > State '{}'", location, display_name(&state.name, &state.id)),
                )
                .with_context(&fsm.id);
                checker.lifecycle_script(&site, state.lifecycle_script_id.as_deref());
            }
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
                    checker.trigger(&site, &format!("Trigger #{}", i + 1), trigger);
                }
                if let Some(condition) = &transition.condition {
                    checker.condition(&site, "Condition", condition);
                }
                if let Some(binding) = &transition.presentation {
                    checker.binding(&site, "Presentation", binding);
                }
                for (i, modifier) in transition.parameter_modifiers.iter().enumerate() {
                    checker.modifier(&site, &format!("Modifier #{}", i + 1), modifier);
                }
            }
        }

        for graph in doc.presentation_graphs.values() {
            for node in graph.nodes.values() {
                let site = Site::new(
                    ObjectType::PresentationGraph,
                    &graph.id,
                    graph_node_location(graph, node),
                )
                .with_context(&node.id);
                if let Some(binding) = &node.presentation {
                    checker.binding(&site, "Presentation", binding);
                }
                if let Some(condition) = &node.condition {
                    checker.condition(&site, "Branch Condition", condition);
                }
            }
        }

        checker.diags.into_results()
    }
}

struct RefChecker<'a> {
    doc: &'a ProjectDocument,
    diags: Diagnostics,
}

impl<'a> RefChecker<'a> {
    fn lifecycle_script(&mut self, site: &Site, script_id: Option<&str>) {
        let Some(script_id) = non_empty(script_id) else {
            return;
        };
        let found = self.script(site, "Lifecycle Script", Some(script_id));
        if let Some(script) = found {
            if script.category != ScriptCategory::Lifecycle {
                self.diags.warning(
                    DiagnosticKind::InvalidStructure,
                    site,
                    "Lifecycle Script:category",
                    format!(
                        "Lifecycle Script: script '{}' is a {:?} script, not a Lifecycle script",
                        display_name(&script.name, &script.id),
                        script.category
                    ),
                );
            }
        }
    }

    /// Resolves a script reference, reporting missing or deleted targets.
    fn script(
        &mut self,
        site: &Site,
        origin: &str,
        script_id: Option<&str>,
    ) -> Option<&'a ScriptDef> {
        let Some(script_id) = non_empty(script_id) else {
            self.diags.error(
                DiagnosticKind::MissingField,
                site,
                origin,
                format!("{}: no script selected", origin),
            );
            return None;
        };
        match self.doc.script(script_id) {
            None => {
                self.diags.error(
                    DiagnosticKind::MissingReference,
                    site,
                    origin,
                    format!("{}: script '{}' does not exist", origin, script_id),
                );
                None
            }
            Some(script) if script.state.is_marked_for_delete() => {
                self.diags.error(
                    DiagnosticKind::DeletedReference,
                    site,
                    origin,
                    format!("{}: script '{}' is marked for delete", origin, script_id),
                );
                None
            }
            Some(script) => Some(script),
        }
    }

    fn event(&mut self, site: &Site, origin: &str, event_id: Option<&str>) {
        let Some(event_id) = non_empty(event_id) else {
            self.diags.error(
                DiagnosticKind::MissingField,
                site,
                origin,
                format!("{}: no event selected", origin),
            );
            return;
        };
        match self.doc.event(event_id) {
            None => self.diags.error(
                DiagnosticKind::MissingReference,
                site,
                origin,
                format!("{}: event '{}' does not exist", origin, event_id),
            ),
            Some(event) if event.state.is_marked_for_delete() => self.diags.error(
                DiagnosticKind::DeletedReference,
                site,
                origin,
                format!("{}: event '{}' is marked for delete", origin, event_id),
            ),
            Some(_) => {}
        }
    }

    fn graph(&mut self, site: &Site, origin: &str, graph_id: Option<&str>) {
        match graph_id {
            None => self.diags.error(
                DiagnosticKind::MissingField,
                site,
                origin,
                format!("{}: no presentation graph selected", origin),
            ),
            Some(id) if self.doc.graph(id).is_none() => self.diags.error(
                DiagnosticKind::MissingReference,
                site,
                origin,
                format!("{}: presentation graph '{}' does not exist", origin, id),
            ),
            Some(_) => {}
        }
    }

    /// Script and graph leaves of any walkable tree.
    fn leaf(&mut self, site: &Site, leaf: Leaf<'_>, origin: &str) {
        match leaf {
            Leaf::Script { script_id } => {
                self.script(site, origin, script_id);
            }
            Leaf::Graph { graph_id } => self.graph(site, origin, graph_id),
            Leaf::Malformed { what } => self.diags.error(
                DiagnosticKind::MissingField,
                site,
                &format!("{}|type", origin),
                format!("{}: {} type is empty or unknown", origin, what),
            ),
            Leaf::Variable { .. } => {}
        }
    }

    fn condition(&mut self, site: &Site, origin: &str, condition: &ConditionExpression) {
        for (leaf, at) in condition_leaves(condition, origin) {
            self.leaf(site, leaf, &at);
        }
    }

    fn binding(&mut self, site: &Site, origin: &str, binding: &PresentationBinding) {
        for (leaf, at) in binding_leaves(binding, origin) {
            self.leaf(site, leaf, &at);
        }

        if let PresentationBinding::Script { script_id, parameters } = binding {
            let doc = self.doc;
            let Some(script) = non_empty(script_id.as_deref()).and_then(|id| doc.script(id)) else {
                return;
            };
            for param in parameters {
                if script.parameter(&param.param_name).is_none() {
                    let at = format!("{} > Param '{}'", origin, param.param_name);
                    self.diags.warning(
                        DiagnosticKind::MissingReference,
                        site,
                        &at,
                        format!(
                            "{}: script '{}' declares no parameter '{}'",
                            at,
                            display_name(&script.name, &script.id),
                            param.param_name
                        ),
                    );
                }
            }
        }
    }

    fn trigger(&mut self, site: &Site, origin: &str, trigger: &Trigger) {
        match trigger {
            Trigger::Unspecified => {
                self.diags.error(
                    DiagnosticKind::MissingField,
                    site,
                    origin,
                    format!("{}: trigger type is empty or unknown", origin),
                );
                return;
            }
            Trigger::OnEvent { event_id } => self.event(site, origin, event_id.as_deref()),
            Trigger::Condition { condition: None } => self.diags.error(
                DiagnosticKind::MissingField,
                site,
                origin,
                format!("{}: condition trigger has no condition", origin),
            ),
            Trigger::Always | Trigger::CustomScript { .. } | Trigger::Condition { .. } => {}
        }

        for (leaf, at) in trigger_leaves(trigger, origin) {
            self.leaf(site, leaf, &at);
        }
    }

    fn event_listener(&mut self, site: &Site, origin: &str, listener: &EventListener) {
        self.event(site, &format!("{} > Event", origin), listener.event_id.as_deref());
        if non_empty(listener.script_id.as_deref()).is_some() {
            self.script(site, &format!("{} > Script", origin), listener.script_id.as_deref());
        }
        for (i, modifier) in listener.parameter_modifiers.iter().enumerate() {
            self.modifier(site, &format!("{} > Modifier #{}", origin, i + 1), modifier);
        }
    }

    /// Structural completeness only; the target variable itself is
    /// resolved by the variable checker.
    fn modifier(&mut self, site: &Site, origin: &str, modifier: &ParameterModifier) {
        if non_empty(modifier.target_variable_id.as_deref()).is_none() {
            self.diags.error(
                DiagnosticKind::MissingField,
                site,
                &format!("{} > Target", origin),
                format!("{}: no target variable selected", origin),
            );
        }
        match modifier.operation {
            None => self.diags.error(
                DiagnosticKind::MissingField,
                site,
                &format!("{} > Operation", origin),
                format!("{}: no operation selected", origin),
            ),
            Some(ModifierOperation::Toggle) => {}
            Some(_) if modifier.source.is_none() => self.diags.error(
                DiagnosticKind::MissingField,
                site,
                &format!("{} > Source", origin),
                format!("{}: operation needs a value source", origin),
            ),
            Some(_) => {}
        }
        if let Some(ValueSource::VariableRef { variable_id, .. }) = &modifier.source {
            if non_empty(variable_id.as_deref()).is_none() {
                self.diags.error(
                    DiagnosticKind::MissingField,
                    site,
                    &format!("{} > Source", origin),
                    format!("{}: source variable reference has no variable selected", origin),
                );
            }
        }
        for (leaf, at) in modifier_leaves(modifier, origin) {
            self.leaf(site, leaf, &at);
        }
    }
}
