//! Expression walker over condition trees, bindings and modifiers.
//!
//! Every checker that needs the variable, script or graph ids buried in
//! a tree goes through here, so the recursion lives in one place. Absent
//! children are skipped; reporting them is the caller's business.

use crate::document::{
    non_empty, ConditionExpression, ParameterModifier, PresentationBinding, Trigger, ValueSource,
    VariableScope,
};

/// A reference leaf found during a walk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Leaf<'a> {
    Variable {
        variable_id: Option<&'a str>,
        scope: VariableScope,
    },
    Script {
        script_id: Option<&'a str>,
    },
    Graph {
        graph_id: Option<&'a str>,
    },
    /// A tree node whose `type` was missing or unknown.
    Malformed {
        what: &'static str,
    },
}

pub fn walk_condition<'a, F>(expr: &'a ConditionExpression, origin: &str, visit: &mut F)
where
    F: FnMut(Leaf<'a>, &str),
{
    match expr {
        ConditionExpression::And { children } | ConditionExpression::Or { children } => {
            for (i, child) in children.iter().enumerate() {
                walk_condition(child, &format!("{} > Sub #{}", origin, i + 1), visit);
            }
        }
        ConditionExpression::Not { operand } => {
            if let Some(operand) = operand {
                walk_condition(operand, &format!("{} > Not", origin), visit);
            }
        }
        ConditionExpression::Comparison { left, right, .. } => {
            if let Some(left) = left {
                walk_value_source(left, &format!("{} > Left", origin), visit);
            }
            if let Some(right) = right {
                walk_value_source(right, &format!("{} > Right", origin), visit);
            }
        }
        ConditionExpression::ScriptRef { script_id } => {
            visit(Leaf::Script { script_id: non_empty(script_id.as_deref()) }, origin);
        }
        ConditionExpression::VariableRef { variable_id, scope } => {
            visit(
                Leaf::Variable {
                    variable_id: non_empty(variable_id.as_deref()),
                    scope: *scope,
                },
                origin,
            );
        }
        ConditionExpression::Literal { .. } => {}
        ConditionExpression::Unspecified => visit(Leaf::Malformed { what: "condition" }, origin),
    }
}

pub fn walk_value_source<'a, F>(source: &'a ValueSource, origin: &str, visit: &mut F)
where
    F: FnMut(Leaf<'a>, &str),
{
    match source {
        ValueSource::Constant { .. } => {}
        ValueSource::Unspecified => visit(Leaf::Malformed { what: "value source" }, origin),
        ValueSource::VariableRef { variable_id, scope } => {
            visit(
                Leaf::Variable {
                    variable_id: non_empty(variable_id.as_deref()),
                    scope: *scope,
                },
                origin,
            );
        }
    }
}

pub fn walk_binding<'a, F>(binding: &'a PresentationBinding, origin: &str, visit: &mut F)
where
    F: FnMut(Leaf<'a>, &str),
{
    match binding {
        PresentationBinding::Script { script_id, parameters } => {
            visit(Leaf::Script { script_id: non_empty(script_id.as_deref()) }, origin);
            for param in parameters {
                if let Some(source) = &param.source {
                    let at = format!("{} > Param '{}'", origin, param.param_name);
                    walk_value_source(source, &at, visit);
                }
            }
        }
        PresentationBinding::Graph { graph_id } => {
            visit(Leaf::Graph { graph_id: non_empty(graph_id.as_deref()) }, origin);
        }
        PresentationBinding::Unspecified => {
            visit(Leaf::Malformed { what: "presentation binding" }, origin);
        }
    }
}

pub fn walk_modifier<'a, F>(modifier: &'a ParameterModifier, origin: &str, visit: &mut F)
where
    F: FnMut(Leaf<'a>, &str),
{
    if let Some(target) = non_empty(modifier.target_variable_id.as_deref()) {
        visit(
            Leaf::Variable {
                variable_id: Some(target),
                scope: modifier.target_scope,
            },
            &format!("{} > Target", origin),
        );
    }
    if let Some(source) = &modifier.source {
        walk_value_source(source, &format!("{} > Source", origin), visit);
    }
}

/// Script and condition leaves inside a trigger. `OnEvent` has none.
pub fn walk_trigger<'a, F>(trigger: &'a Trigger, origin: &str, visit: &mut F)
where
    F: FnMut(Leaf<'a>, &str),
{
    match trigger {
        Trigger::CustomScript { script_id, parameters } => {
            visit(Leaf::Script { script_id: non_empty(script_id.as_deref()) }, origin);
            for param in parameters {
                if let Some(source) = &param.source {
                    let at = format!("{} > Param '{}'", origin, param.param_name);
                    walk_value_source(source, &at, visit);
                }
            }
        }
        Trigger::Condition { condition: Some(condition) } => {
            walk_condition(condition, &format!("{} > Condition", origin), visit);
        }
        Trigger::Condition { condition: None }
        | Trigger::Always
        | Trigger::OnEvent { .. }
        | Trigger::Unspecified => {}
    }
}

/// Leaf paired with its origin breadcrumb.
pub type Found<'a> = (Leaf<'a>, String);

pub fn condition_leaves<'a>(expr: &'a ConditionExpression, origin: &str) -> Vec<Found<'a>> {
    let mut out = Vec::new();
    walk_condition(expr, origin, &mut |leaf, at| out.push((leaf, at.to_string())));
    out
}

pub fn binding_leaves<'a>(binding: &'a PresentationBinding, origin: &str) -> Vec<Found<'a>> {
    let mut out = Vec::new();
    walk_binding(binding, origin, &mut |leaf, at| out.push((leaf, at.to_string())));
    out
}

pub fn modifier_leaves<'a>(modifier: &'a ParameterModifier, origin: &str) -> Vec<Found<'a>> {
    let mut out = Vec::new();
    walk_modifier(modifier, origin, &mut |leaf, at| out.push((leaf, at.to_string())));
    out
}

pub fn trigger_leaves<'a>(trigger: &'a Trigger, origin: &str) -> Vec<Found<'a>> {
    let mut out = Vec::new();
    walk_trigger(trigger, origin, &mut |leaf, at| out.push((leaf, at.to_string())));
    out
}
