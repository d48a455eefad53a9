//! Document Model - the project snapshot every checker reads
//!
//! The editor owns the document; this crate only ever borrows it. Every
//! field is defaulted so a half-authored project still loads and the
//! checkers, not the parser, report what is missing.

use indexmap::IndexMap;
use serde::{de, Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Map, Value};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::lifecycle::ResourceState;

pub type StageId = String;
pub type NodeId = String;
pub type FsmId = String;
pub type StateId = String;
pub type TransitionId = String;
pub type GraphId = String;
pub type PresentationNodeId = String;
pub type VariableId = String;
pub type EventId = String;
pub type ScriptId = String;

#[derive(Debug, Error)]
pub enum DocumentError {
    #[error("Failed to read project file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid project document: {0}")]
    Parse(#[from] serde_json::Error),
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectDocument {
    #[serde(default)]
    pub meta: ProjectMeta,
    #[serde(default)]
    pub stage_tree: StageTree,
    #[serde(default)]
    pub nodes: IndexMap<NodeId, PuzzleNode>,
    #[serde(default)]
    pub state_machines: IndexMap<FsmId, StateMachine>,
    #[serde(default)]
    pub presentation_graphs: IndexMap<GraphId, PresentationGraph>,
    #[serde(default)]
    pub blackboard: Blackboard,
    #[serde(default)]
    pub scripts: IndexMap<ScriptId, ScriptDef>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectMeta {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub format_version: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StageTree {
    #[serde(default)]
    pub root_id: Option<StageId>,
    #[serde(default)]
    pub stages: IndexMap<StageId, Stage>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Stage {
    pub id: StageId,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub asset_name: String,
    #[serde(default)]
    pub parent_id: Option<StageId>,
    #[serde(default)]
    pub children_ids: Vec<StageId>,
    #[serde(default)]
    pub local_variables: IndexMap<VariableId, Variable>,
    #[serde(default)]
    pub lifecycle_script_id: Option<ScriptId>,
    #[serde(default)]
    pub unlock_condition: Option<ConditionExpression>,
    #[serde(default)]
    pub unlock_triggers: Vec<Trigger>,
    #[serde(default)]
    pub on_enter_presentation: Option<PresentationBinding>,
    #[serde(default)]
    pub on_exit_presentation: Option<PresentationBinding>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PuzzleNode {
    pub id: NodeId,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub asset_name: String,
    #[serde(default)]
    pub stage_id: StageId,
    #[serde(default)]
    pub state_machine_id: Option<FsmId>,
    #[serde(default)]
    pub local_variables: IndexMap<VariableId, Variable>,
    #[serde(default)]
    pub lifecycle_script_id: Option<ScriptId>,
    #[serde(default)]
    pub event_listeners: Vec<EventListener>,
}

/// Reaction of a node to a blackboard event.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventListener {
    #[serde(default)]
    pub event_id: Option<EventId>,
    #[serde(default)]
    pub script_id: Option<ScriptId>,
    #[serde(default)]
    pub parameter_modifiers: Vec<ParameterModifier>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StateMachine {
    pub id: FsmId,
    #[serde(default)]
    pub states: IndexMap<StateId, State>,
    #[serde(default)]
    pub transitions: IndexMap<TransitionId, Transition>,
    #[serde(default)]
    pub initial_state_id: Option<StateId>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct State {
    pub id: StateId,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub asset_name: String,
    #[serde(default)]
    pub lifecycle_script_id: Option<ScriptId>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Transition {
    pub id: TransitionId,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub from_state_id: StateId,
    #[serde(default)]
    pub to_state_id: StateId,
    #[serde(default)]
    pub triggers: Vec<Trigger>,
    #[serde(default)]
    pub condition: Option<ConditionExpression>,
    #[serde(default)]
    pub presentation: Option<PresentationBinding>,
    #[serde(default)]
    pub parameter_modifiers: Vec<ParameterModifier>,
}

/// What fires a transition or unlocks a stage.
///
/// A missing, empty or unrecognised `type` lands in `Unspecified` so it
/// can be reported instead of failing the whole load.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", remote = "Self")]
pub enum Trigger {
    Always,
    #[serde(rename_all = "camelCase")]
    OnEvent {
        #[serde(default)]
        event_id: Option<EventId>,
    },
    #[serde(rename_all = "camelCase")]
    CustomScript {
        #[serde(default)]
        script_id: Option<ScriptId>,
        #[serde(default)]
        parameters: Vec<ParameterBinding>,
    },
    Condition {
        #[serde(default)]
        condition: Option<ConditionExpression>,
    },
    #[serde(other)]
    Unspecified,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", remote = "Self")]
pub enum ConditionExpression {
    And {
        #[serde(default)]
        children: Vec<ConditionExpression>,
    },
    Or {
        #[serde(default)]
        children: Vec<ConditionExpression>,
    },
    Not {
        #[serde(default)]
        operand: Option<Box<ConditionExpression>>,
    },
    Comparison {
        #[serde(default)]
        left: Option<ValueSource>,
        #[serde(default)]
        operator: Option<ComparisonOperator>,
        #[serde(default)]
        right: Option<ValueSource>,
    },
    #[serde(rename_all = "camelCase")]
    ScriptRef {
        #[serde(default)]
        script_id: Option<ScriptId>,
    },
    Literal {
        #[serde(default)]
        value: bool,
    },
    #[serde(rename_all = "camelCase")]
    VariableRef {
        #[serde(default)]
        variable_id: Option<VariableId>,
        #[serde(default)]
        scope: VariableScope,
    },
    #[serde(other)]
    Unspecified,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ComparisonOperator {
    #[serde(rename = "==")]
    Eq,
    #[serde(rename = "!=")]
    Ne,
    #[serde(rename = "<")]
    Lt,
    #[serde(rename = "<=")]
    Le,
    #[serde(rename = ">")]
    Gt,
    #[serde(rename = ">=")]
    Ge,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", remote = "Self")]
pub enum ValueSource {
    Constant {
        #[serde(default)]
        value: Value,
    },
    #[serde(rename_all = "camelCase")]
    VariableRef {
        #[serde(default)]
        variable_id: Option<VariableId>,
        #[serde(default)]
        scope: VariableScope,
    },
    #[serde(other)]
    Unspecified,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", remote = "Self")]
pub enum PresentationBinding {
    #[serde(rename_all = "camelCase")]
    Script {
        #[serde(default)]
        script_id: Option<ScriptId>,
        #[serde(default)]
        parameters: Vec<ParameterBinding>,
    },
    #[serde(rename_all = "camelCase")]
    Graph {
        #[serde(default)]
        graph_id: Option<GraphId>,
    },
    #[serde(other)]
    Unspecified,
}

/// Tagged unions accept a missing or non-string `type` by treating it as
/// empty, which lands in `Unspecified` for the checkers to report.
fn with_type_tag(mut value: Value) -> Value {
    if !value.is_object() {
        value = Value::Object(Map::new());
    }
    if let Value::Object(map) = &mut value {
        if !matches!(map.get("type"), Some(Value::String(_))) {
            map.insert("type".to_string(), Value::String(String::new()));
        }
    }
    value
}

macro_rules! lenient_tagged {
    ($($ty:ident),* $(,)?) => {$(
        impl Serialize for $ty {
            fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
                $ty::serialize(self, serializer)
            }
        }

        impl<'de> Deserialize<'de> for $ty {
            fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
                let value = with_type_tag(Value::deserialize(deserializer)?);
                $ty::deserialize(value).map_err(de::Error::custom)
            }
        }
    )*};
}

lenient_tagged!(Trigger, ConditionExpression, ValueSource, PresentationBinding);

impl PresentationBinding {
    pub fn graph_id(&self) -> Option<&str> {
        match self {
            PresentationBinding::Graph { graph_id } => non_empty(graph_id.as_deref()),
            PresentationBinding::Script { .. } | PresentationBinding::Unspecified => None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParameterBinding {
    #[serde(default)]
    pub param_name: String,
    #[serde(default)]
    pub source: Option<ValueSource>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParameterModifier {
    #[serde(default)]
    pub target_variable_id: Option<VariableId>,
    #[serde(default)]
    pub target_scope: VariableScope,
    #[serde(default)]
    pub operation: Option<ModifierOperation>,
    #[serde(default)]
    pub source: Option<ValueSource>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ModifierOperation {
    Set,
    Add,
    Subtract,
    Toggle,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PresentationGraph {
    pub id: GraphId,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub start_node_id: Option<PresentationNodeId>,
    #[serde(default)]
    pub nodes: IndexMap<PresentationNodeId, PresentationNode>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PresentationNode {
    pub id: PresentationNodeId,
    #[serde(default)]
    pub name: String,
    #[serde(rename = "type", default)]
    pub kind: PresentationNodeKind,
    #[serde(default)]
    pub next_ids: Vec<PresentationNodeId>,
    #[serde(default)]
    pub presentation: Option<PresentationBinding>,
    #[serde(default)]
    pub condition: Option<ConditionExpression>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum PresentationNodeKind {
    #[default]
    ScriptCall,
    Wait,
    Branch,
    Parallel,
    #[serde(other)]
    Unspecified,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Blackboard {
    #[serde(default)]
    pub global_variables: IndexMap<VariableId, Variable>,
    #[serde(default)]
    pub events: IndexMap<EventId, EventDef>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum VariableScope {
    #[default]
    Global,
    StageLocal,
    NodeLocal,
    Temporary,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum VariableType {
    #[default]
    Boolean,
    Integer,
    Float,
    String,
    Enum,
}

impl VariableType {
    pub fn label(self) -> &'static str {
        match self {
            VariableType::Boolean => "boolean",
            VariableType::Integer => "integer",
            VariableType::Float => "float",
            VariableType::String => "string",
            VariableType::Enum => "enum",
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Variable {
    pub id: VariableId,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub asset_name: String,
    #[serde(default)]
    pub scope: VariableScope,
    #[serde(rename = "type", default)]
    pub value_type: VariableType,
    #[serde(default)]
    pub value: Option<Value>,
    #[serde(default)]
    pub default_value: Value,
    #[serde(default)]
    pub state: ResourceState,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventDef {
    pub id: EventId,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub asset_name: String,
    #[serde(default)]
    pub state: ResourceState,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum ScriptCategory {
    #[default]
    Performance,
    Lifecycle,
    Condition,
    Trigger,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScriptDef {
    pub id: ScriptId,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub asset_name: String,
    #[serde(default)]
    pub category: ScriptCategory,
    #[serde(default)]
    pub state: ResourceState,
    #[serde(default)]
    pub parameters: Vec<ScriptParameter>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScriptParameter {
    pub name: String,
    #[serde(rename = "type", default)]
    pub value_type: VariableType,
}

impl ScriptDef {
    pub fn parameter(&self, name: &str) -> Option<&ScriptParameter> {
        self.parameters.iter().find(|p| p.name == name)
    }
}

/// Treats `Some("")` like `None`; the editor writes empty strings for unset ids.
pub fn non_empty(id: Option<&str>) -> Option<&str> {
    id.filter(|s| !s.trim().is_empty())
}

/// Display label for an entity, falling back to its id.
pub fn display_name<'a>(name: &'a str, id: &'a str) -> &'a str {
    if name.trim().is_empty() {
        id
    } else {
        name
    }
}

impl ProjectDocument {
    pub fn from_json_str(content: &str) -> Result<Self, DocumentError> {
        Ok(serde_json::from_str(content)?)
    }

    pub fn load(path: &Path) -> Result<Self, DocumentError> {
        let content = fs::read_to_string(path).map_err(|source| DocumentError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let doc = Self::from_json_str(&content)?;
        tracing::debug!(
            path = %path.display(),
            stages = doc.stage_tree.stages.len(),
            nodes = doc.nodes.len(),
            graphs = doc.presentation_graphs.len(),
            "Loaded project document"
        );
        Ok(doc)
    }

    pub fn stage(&self, id: &str) -> Option<&Stage> {
        self.stage_tree.stages.get(id)
    }

    pub fn node(&self, id: &str) -> Option<&PuzzleNode> {
        self.nodes.get(id)
    }

    pub fn state_machine(&self, id: &str) -> Option<&StateMachine> {
        self.state_machines.get(id)
    }

    pub fn graph(&self, id: &str) -> Option<&PresentationGraph> {
        self.presentation_graphs.get(id)
    }

    pub fn script(&self, id: &str) -> Option<&ScriptDef> {
        self.scripts.get(id)
    }

    pub fn event(&self, id: &str) -> Option<&EventDef> {
        self.blackboard.events.get(id)
    }

    pub fn global_variable(&self, id: &str) -> Option<&Variable> {
        self.blackboard.global_variables.get(id)
    }

    /// The node owning a state machine, if any.
    pub fn owner_of_machine(&self, fsm_id: &str) -> Option<&PuzzleNode> {
        self.nodes
            .values()
            .find(|n| n.state_machine_id.as_deref() == Some(fsm_id))
    }

    /// Every entity id in the document, in document order.
    pub fn all_ids(&self) -> Vec<&str> {
        let mut ids: Vec<&str> = Vec::new();
        for stage in self.stage_tree.stages.values() {
            ids.push(&stage.id);
            ids.extend(stage.local_variables.keys().map(String::as_str));
        }
        for node in self.nodes.values() {
            ids.push(&node.id);
            ids.extend(node.local_variables.keys().map(String::as_str));
        }
        for fsm in self.state_machines.values() {
            ids.push(&fsm.id);
            ids.extend(fsm.states.keys().map(String::as_str));
            ids.extend(fsm.transitions.keys().map(String::as_str));
        }
        for graph in self.presentation_graphs.values() {
            ids.push(&graph.id);
            ids.extend(graph.nodes.keys().map(String::as_str));
        }
        ids.extend(self.blackboard.global_variables.keys().map(String::as_str));
        ids.extend(self.blackboard.events.keys().map(String::as_str));
        ids.extend(self.scripts.keys().map(String::as_str));
        ids
    }
}
