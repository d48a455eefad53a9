//! Validation System - Checkers and Orchestration
//!
//! Checkers produce diagnostics; they never mutate the document.
//! The orchestrator runs them in a fixed order and concatenates output.

use serde::{Deserialize, Serialize};

use crate::document::ProjectDocument;
use crate::hashing::diagnostic_id;
use crate::rules::{
    LifecycleUniquenessRule, NamingRule, ReferenceRule, StructureRule, TemporaryParameterRule,
    VariableRule,
};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Error,
    Warning,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ObjectType {
    Stage,
    Node,
    State,
    Transition,
    PresentationGraph,
    Script,
    Variable,
    Event,
}

impl ObjectType {
    pub fn as_str(self) -> &'static str {
        match self {
            ObjectType::Stage => "STAGE",
            ObjectType::Node => "NODE",
            ObjectType::State => "STATE",
            ObjectType::Transition => "TRANSITION",
            ObjectType::PresentationGraph => "PRESENTATION_GRAPH",
            ObjectType::Script => "SCRIPT",
            ObjectType::Variable => "VARIABLE",
            ObjectType::Event => "EVENT",
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "kebab-case")]
pub enum DiagnosticKind {
    MissingReference,
    DeletedReference,
    StructuralCycle,
    UnreachableNode,
    DuplicateName,
    InvalidFormat,
    UniquenessViolation,
    TypeConflict,
    MissingField,
    InvalidStructure,
}

impl DiagnosticKind {
    pub fn as_str(self) -> &'static str {
        match self {
            DiagnosticKind::MissingReference => "missing-reference",
            DiagnosticKind::DeletedReference => "deleted-reference",
            DiagnosticKind::StructuralCycle => "structural-cycle",
            DiagnosticKind::UnreachableNode => "unreachable-node",
            DiagnosticKind::DuplicateName => "duplicate-name",
            DiagnosticKind::InvalidFormat => "invalid-format",
            DiagnosticKind::UniquenessViolation => "uniqueness-violation",
            DiagnosticKind::TypeConflict => "type-conflict",
            DiagnosticKind::MissingField => "missing-field",
            DiagnosticKind::InvalidStructure => "invalid-structure",
        }
    }
}

/// One reported issue.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ValidationResult {
    pub id: String,
    pub level: Severity,
    pub kind: DiagnosticKind,
    pub message: String,
    pub object_type: ObjectType,
    pub object_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context_id: Option<String>,
    pub location: String,
}

impl ValidationResult {
    pub fn is_error(&self) -> bool {
        self.level == Severity::Error
    }
}

/// The object a diagnostic is attached to.
#[derive(Debug, Clone)]
pub struct Site {
    pub object_type: ObjectType,
    pub object_id: String,
    pub context_id: Option<String>,
    pub location: String,
}

impl Site {
    pub fn new(object_type: ObjectType, object_id: &str, location: impl Into<String>) -> Self {
        Self {
            object_type,
            object_id: object_id.to_string(),
            context_id: None,
            location: location.into(),
        }
    }

    pub fn with_context(mut self, context_id: &str) -> Self {
        self.context_id = Some(context_id.to_string());
        self
    }
}

/// Collector shared by every checker.
///
/// `detail` feeds the stable id only: it must tell apart two findings of
/// the same kind on the same object.
#[derive(Debug, Default)]
pub struct Diagnostics {
    results: Vec<ValidationResult>,
}

impl Diagnostics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(
        &mut self,
        level: Severity,
        kind: DiagnosticKind,
        site: &Site,
        detail: &str,
        message: impl Into<String>,
    ) {
        let context = site.context_id.as_deref().unwrap_or("");
        let id = diagnostic_id(
            kind.as_str(),
            site.object_type.as_str(),
            &site.object_id,
            &format!("{}|{}", context, detail),
        );
        self.results.push(ValidationResult {
            id,
            level,
            kind,
            message: message.into(),
            object_type: site.object_type,
            object_id: site.object_id.clone(),
            context_id: site.context_id.clone(),
            location: site.location.clone(),
        });
    }

    pub fn error(
        &mut self,
        kind: DiagnosticKind,
        site: &Site,
        detail: &str,
        message: impl Into<String>,
    ) {
        self.push(Severity::Error, kind, site, detail, message);
    }

    pub fn warning(
        &mut self,
        kind: DiagnosticKind,
        site: &Site,
        detail: &str,
        message: impl Into<String>,
    ) {
        self.push(Severity::Warning, kind, site, detail, message);
    }

    pub fn into_results(self) -> Vec<ValidationResult> {
        self.results
    }
}

/// Aggregate of one validation pass.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationReport {
    pub valid: bool,
    pub error_count: usize,
    pub warning_count: usize,
    pub results: Vec<ValidationResult>,
}

impl ValidationReport {
    pub fn from_results(results: Vec<ValidationResult>) -> Self {
        let error_count = results.iter().filter(|r| r.is_error()).count();
        Self {
            valid: error_count == 0,
            error_count,
            warning_count: results.len() - error_count,
            results,
        }
    }

    pub fn errors(&self) -> impl Iterator<Item = &ValidationResult> {
        self.results.iter().filter(|r| r.is_error())
    }

    pub fn warnings(&self) -> impl Iterator<Item = &ValidationResult> {
        self.results.iter().filter(|r| !r.is_error())
    }
}

/// Validation rule trait - produces diagnostics
pub trait ValidationRule {
    fn name(&self) -> &'static str;
    fn validate(&self, doc: &ProjectDocument) -> Vec<ValidationResult>;
}

/// Validator orchestrates rules in a fixed order
pub struct Validator {
    rules: Vec<Box<dyn ValidationRule>>,
}

impl Validator {
    pub fn new() -> Self {
        Self {
            rules: vec![
                Box::new(NamingRule),
                Box::new(StructureRule),
                Box::new(ReferenceRule),
                Box::new(VariableRule),
                Box::new(LifecycleUniquenessRule),
                Box::new(TemporaryParameterRule),
            ],
        }
    }

    pub fn rule_names(&self) -> Vec<&'static str> {
        self.rules.iter().map(|r| r.name()).collect()
    }

    pub fn validate(&self, doc: &ProjectDocument) -> Vec<ValidationResult> {
        let mut all_results = vec![];

        for rule in &self.rules {
            let results = rule.validate(doc);
            tracing::debug!(rule = rule.name(), count = results.len(), "Rule finished");
            all_results.extend(results);
        }

        all_results
    }

    pub fn report(&self, doc: &ProjectDocument) -> ValidationReport {
        let report = ValidationReport::from_results(self.validate(doc));
        tracing::info!(
            errors = report.error_count,
            warnings = report.warning_count,
            "Validation pass complete"
        );
        report
    }
}

impl Default for Validator {
    fn default() -> Self {
        Self::new()
    }
}

/// Run every checker over `doc`.
pub fn validate_project(doc: &ProjectDocument) -> Vec<ValidationResult> {
    Validator::new().validate(doc)
}
