//! Export Pipeline - Single Entry Point
//!
//! CRITICAL: export MUST call validate internally. No bypass.

use base64::Engine as _;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::config::ExportConfig;
use crate::document::{non_empty, ProjectDocument};
use crate::hashing::{canonical_json, document_hash};
use crate::validation::{ValidationReport, ValidationResult, Validator};
use crate::ENGINE_VERSION;

#[cfg(feature = "test-hooks")]
use std::sync::atomic::{AtomicU32, Ordering};

#[cfg(feature = "test-hooks")]
static VALIDATION_CALL_COUNT: AtomicU32 = AtomicU32::new(0);

#[cfg(feature = "test-hooks")]
pub fn get_validation_call_count() -> u32 {
    VALIDATION_CALL_COUNT.load(Ordering::SeqCst)
}

#[cfg(feature = "test-hooks")]
pub fn reset_validation_call_count() {
    VALIDATION_CALL_COUNT.store(0, Ordering::SeqCst);
}

#[derive(Debug, Error)]
pub enum ExportError {
    #[error("Validation failed: {0}")]
    ValidationFailed(String),

    #[error("Document format {found} is older than the minimum supported {minimum}")]
    FormatVersionMismatch { found: String, minimum: String },

    #[error("Invalid format version '{0}'")]
    InvalidVersion(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// What an accepted export hands to the runtime.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportBundle {
    pub id: String,
    pub project_name: String,
    pub format_version: String,
    pub engine_version: String,
    pub created_at: DateTime<Utc>,
    pub document_hash: String,
    pub warnings: Vec<ValidationResult>,
    pub payload_base64: String,
}

impl ExportBundle {
    pub fn decode_payload(&self) -> Result<Vec<u8>, base64::DecodeError> {
        base64::engine::general_purpose::STANDARD.decode(&self.payload_base64)
    }
}

/// The export gate.
pub struct ExportPipeline {
    validator: Validator,
    config: ExportConfig,
}

impl ExportPipeline {
    pub fn new(config: ExportConfig) -> Self {
        Self {
            validator: Validator::new(),
            config,
        }
    }

    pub fn config(&self) -> &ExportConfig {
        &self.config
    }

    pub fn validator(&self) -> &Validator {
        &self.validator
    }

    /// Validate a document.
    ///
    /// This is the ONLY validation entry point.
    pub fn validate(&self, doc: &ProjectDocument) -> Result<ValidationReport, ExportError> {
        #[cfg(feature = "test-hooks")]
        VALIDATION_CALL_COUNT.fetch_add(1, Ordering::SeqCst);

        self.check_format_version(doc)?;

        Ok(self.validator.report(doc))
    }

    /// Export a document.
    ///
    /// CRITICAL: This ALWAYS calls validate internally. No bypass possible.
    pub fn export(&self, doc: &ProjectDocument) -> Result<ExportBundle, ExportError> {
        let report = self.validate(doc)?;

        let blocking: Vec<&ValidationResult> = if self.config.deny_warnings {
            report.results.iter().collect()
        } else {
            report.errors().collect()
        };
        if !blocking.is_empty() {
            tracing::warn!(
                project = %doc.meta.name,
                errors = report.error_count,
                warnings = report.warning_count,
                deny_warnings = self.config.deny_warnings,
                "Export refused"
            );
            let messages: Vec<_> = blocking
                .iter()
                .map(|r| format!("{}: {}", r.location, r.message))
                .collect();
            return Err(ExportError::ValidationFailed(messages.join("; ")));
        }

        let payload = canonical_json(doc)?;
        let bundle = ExportBundle {
            id: Uuid::new_v4().to_string(),
            project_name: doc.meta.name.clone(),
            format_version: doc.meta.format_version.clone().unwrap_or_default(),
            engine_version: ENGINE_VERSION.to_string(),
            created_at: Utc::now(),
            document_hash: document_hash(doc)?,
            warnings: report.warnings().cloned().collect(),
            payload_base64: base64::engine::general_purpose::STANDARD.encode(payload.as_bytes()),
        };
        tracing::info!(
            project = %bundle.project_name,
            hash = %bundle.document_hash,
            warnings = bundle.warnings.len(),
            "Export accepted"
        );
        Ok(bundle)
    }

    fn check_format_version(&self, doc: &ProjectDocument) -> Result<(), ExportError> {
        let found = non_empty(doc.meta.format_version.as_deref())
            .ok_or_else(|| ExportError::InvalidVersion(String::new()))?;
        let found_ver = semver::Version::parse(found)
            .map_err(|_| ExportError::InvalidVersion(found.to_string()))?;
        let min_ver = semver::Version::parse(&self.config.min_format_version)
            .map_err(|_| ExportError::InvalidVersion(self.config.min_format_version.clone()))?;

        if found_ver < min_ver {
            return Err(ExportError::FormatVersionMismatch {
                found: found.to_string(),
                minimum: self.config.min_format_version.clone(),
            });
        }

        Ok(())
    }
}

impl Default for ExportPipeline {
    fn default() -> Self {
        Self::new(ExportConfig::default())
    }
}
