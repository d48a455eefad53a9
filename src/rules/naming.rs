//! Asset-name format and per-category uniqueness.

use indexmap::IndexMap;
use regex::Regex;
use std::sync::LazyLock;

use super::*;
use crate::validation::{DiagnosticKind, Diagnostics, ValidationResult, ValidationRule};

static ASSET_NAME_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[a-zA-Z_][a-zA-Z0-9_]*$").unwrap());

pub fn is_valid_asset_name(name: &str) -> bool {
    ASSET_NAME_RE.is_match(name)
}

pub struct NamingRule;

impl ValidationRule for NamingRule {
    fn name(&self) -> &'static str { "naming" }

    fn validate(&self, doc: &ProjectDocument) -> Vec<ValidationResult> {
        let mut diags = Diagnostics::new();

        let globals = doc
            .blackboard
            .global_variables
            .values()
            .map(|v| (v.asset_name.as_str(), global_variable_site(v)));
        check_category("global variables", globals, &mut diags);

        let events = doc
            .blackboard
            .events
            .values()
            .map(|e| (e.asset_name.as_str(), event_site(e)));
        check_category("events", events, &mut diags);

        let scripts = doc
            .scripts
            .values()
            .map(|s| (s.asset_name.as_str(), script_site(s)));
        check_category("scripts", scripts, &mut diags);

        let stages = doc
            .stage_tree
            .stages
            .values()
            .map(|s| (s.asset_name.as_str(), stage_site(doc, s)));
        check_category("stages", stages, &mut diags);

        let nodes = doc
            .nodes
            .values()
            .map(|n| (n.asset_name.as_str(), node_site(doc, n)));
        check_category("nodes", nodes, &mut diags);

        for fsm in doc.state_machines.values() {
            let location = machine_location(doc, fsm);
            let states = fsm.states.values().map(|s| {
                let site = Site::new(
                    ObjectType::State,
                    &s.id,
                    format!("{} > State '{}'", location, display_name(&s.name, &s.id)),
                )
                .with_context(&fsm.id);
                (s.asset_name.as_str(), site)
            });
            check_category("states in this state machine", states, &mut diags);
        }

        for stage in doc.stage_tree.stages.values() {
            let location = stage_location(doc, stage);
            let locals = stage
                .local_variables
                .values()
                .map(|v| (v.asset_name.as_str(), local_variable_site(&location, &stage.id, v)));
            check_category("variables on this stage", locals, &mut diags);
        }

        for node in doc.nodes.values() {
            let location = node_location(doc, node);
            let locals = node
                .local_variables
                .values()
                .map(|v| (v.asset_name.as_str(), local_variable_site(&location, &node.id, v)));
            check_category("variables on this node", locals, &mut diags);
        }

        diags.into_results()
    }
}

fn check_category<'a>(
    category: &str,
    items: impl Iterator<Item = (&'a str, Site)>,
    diags: &mut Diagnostics,
) {
    let mut by_name: IndexMap<&str, Vec<Site>> = IndexMap::new();

    for (asset_name, site) in items {
        let trimmed = asset_name.trim();
        if trimmed.is_empty() {
            diags.error(
                DiagnosticKind::MissingField,
                &site,
                "assetName",
                "Asset name is required",
            );
            continue;
        }
        if !is_valid_asset_name(asset_name) {
            diags.error(
                DiagnosticKind::InvalidFormat,
                &site,
                "assetName",
                format!(
                    "Asset name '{}' must start with a letter or underscore and contain \
                     only letters, digits and underscores",
                    asset_name
                ),
            );
        }
        by_name.entry(asset_name).or_default().push(site);
    }

    for (asset_name, sites) in by_name {
        if sites.len() < 2 {
            continue;
        }
        let ids: Vec<&str> = sites.iter().map(|s| s.object_id.as_str()).collect();
        for site in &sites {
            diags.error(
                DiagnosticKind::DuplicateName,
                site,
                "assetName",
                format!(
                    "Asset name '{}' is shared by {} {} ({})",
                    asset_name,
                    sites.len(),
                    category,
                    ids.join(", ")
                ),
            );
        }
    }
}
