//! PuzzleForge Core - Project Validation Engine
//!
//! # Ground Rules
//! 1. The Document Is Read-Only To Checkers
//! 2. Every Reference Resolves Or Is Reported
//! 3. Shared Graphs Are Checked In Every Context
//! 4. Deterministic Output
//! 5. Export Always Validates

pub mod document;
pub mod lifecycle;
pub mod ids;
pub mod hashing;
pub mod walker;
pub mod resolver;
pub mod traversal;
pub mod validation;
pub mod rules;
pub mod config;
pub mod pipeline;

pub use document::{DocumentError, ProjectDocument};
pub use lifecycle::{can_transition_resource_state, DeletionPolicy, ResourceState};
pub use ids::next_id;
pub use hashing::{canonical_json, diagnostic_id, document_hash};
pub use validation::{
    validate_project, DiagnosticKind, ObjectType, Severity, ValidationReport, ValidationResult,
    ValidationRule, Validator,
};
pub use config::{ConfigError, ExportConfig};
pub use pipeline::{ExportBundle, ExportError, ExportPipeline};

pub const ENGINE_VERSION: &str = env!("CARGO_PKG_VERSION");
pub const MIN_FORMAT_VERSION: &str = "1.0.0";
